//! `Table`: a stored-procedure result set as returned over the wire.
//!
//! The wire shape (all offsets relative to the start of the table's own
//! region of the invocation response): a 4-byte non-inclusive header
//! size, a 1-byte status code (set by the procedure, default `i8::MIN`),
//! a 2-byte column count, one tag byte per column, one length-prefixed
//! name per column, a 4-byte row count, then that many rows, each a
//! 4-byte non-inclusive row length followed by the row's column bodies
//! in schema order.

use std::sync::Arc;

use crate::buffer::{BufferView, SharedBuffer};
use crate::error::{ClientError, Result};
use crate::row::Row;
use crate::schema::Schema;
use crate::value::WireTag;

pub const DEFAULT_STATUS_CODE: i8 = i8::MIN;

#[derive(Clone)]
pub struct Table {
    schema: Arc<Schema>,
    status_code: i8,
    rows: Vec<Row>,
}

impl Table {
    pub fn parse(buffer: SharedBuffer) -> Result<Table> {
        let bytes = buffer.as_window_slice();
        let base = buffer.position();
        let mut view = BufferView::new(bytes);

        let header_size = view.read_i32()?;
        if header_size < 0 {
            return Err(ClientError::protocol("negative table header size"));
        }
        let status_code = view.read_i8()?;
        let column_count = view.read_i16()?;
        if column_count <= 0 {
            return Err(ClientError::protocol("table has no columns"));
        }
        let column_count = column_count as usize;

        let mut tags = Vec::with_capacity(column_count);
        for _ in 0..column_count {
            tags.push(WireTag::from_i8(view.read_i8()?)?);
        }
        let mut columns = Vec::with_capacity(column_count);
        for tag in tags {
            let name = view
                .read_string()?
                .ok_or_else(|| ClientError::protocol("table column name was NULL"))?;
            let name = String::from_utf8(name.to_vec())
                .map_err(|_| ClientError::protocol("table column name was not UTF-8"))?;
            columns.push((name, tag));
        }
        let schema = Arc::new(Schema::new(columns));

        let row_count_position = header_size as usize + 4;
        view.set_position(row_count_position)?;
        let row_count = view.read_i32()?;
        if row_count < 0 {
            return Err(ClientError::protocol("negative row count"));
        }

        let mut rows = Vec::with_capacity(row_count as usize);
        let mut offset = view.position();
        for _ in 0..row_count {
            let mut cursor = BufferView::new(&bytes[offset..]);
            let row_len = cursor.read_i32()?;
            if row_len < 0 {
                return Err(ClientError::protocol("negative row length"));
            }
            let row_len = row_len as usize;
            let window = buffer.window(base + offset + 4, row_len)?;
            rows.push(Row::new(schema.clone(), window));
            offset += 4 + row_len;
        }

        Ok(Table {
            schema,
            status_code,
            rows,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn status_code(&self) -> i8 {
        self.status_code
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Result<&Row> {
        self.rows
            .get(index)
            .ok_or_else(|| ClientError::InvalidColumn(index.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::OwnedBuffer;
    use crate::value::Value;

    fn build_table_bytes() -> Vec<u8> {
        let mut buf = OwnedBuffer::new();
        buf.write_i32(0).unwrap(); // header size placeholder
        buf.write_i8(DEFAULT_STATUS_CODE).unwrap();
        buf.write_i16(2).unwrap();
        buf.write_i8(WireTag::Integer as i8).unwrap();
        buf.write_i8(WireTag::String as i8).unwrap();
        buf.write_string(Some(b"id")).unwrap();
        buf.write_string(Some(b"name")).unwrap();
        let row_count_position = buf.position();
        buf.put_i32(0, (row_count_position - 4) as i32).unwrap();
        buf.write_i32(2).unwrap(); // row count

        let mut row1 = OwnedBuffer::new();
        Value::Integer(1).write_body(&mut row1).unwrap();
        Value::String(Some(b"alice".to_vec()))
            .write_body(&mut row1)
            .unwrap();
        buf.write_i32(row1.position() as i32).unwrap();
        buf.write_bytes(row1.as_written()).unwrap();

        let mut row2 = OwnedBuffer::new();
        Value::Integer(2).write_body(&mut row2).unwrap();
        Value::String(None).write_body(&mut row2).unwrap();
        buf.write_i32(row2.position() as i32).unwrap();
        buf.write_bytes(row2.as_written()).unwrap();

        buf.as_written().to_vec()
    }

    #[test]
    fn parses_rows_and_columns() {
        let bytes = build_table_bytes();
        let table = Table::parse(SharedBuffer::from_vec(bytes)).unwrap();
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.status_code(), DEFAULT_STATUS_CODE);
        assert_eq!(table.schema().len(), 2);
        assert_eq!(table.row(0).unwrap().get(0).unwrap(), Value::Integer(1));
        assert_eq!(
            table.row(0).unwrap().get_by_name("name").unwrap(),
            Value::String(Some(b"alice".to_vec()))
        );
        assert_eq!(table.row(1).unwrap().get(1).unwrap(), Value::String(None));
    }
}
