//! A single row of a [`crate::table::Table`].
//!
//! A row does not eagerly decode its columns. It holds a cheap `Arc` clone
//! of the table's backing buffer windowed to just this row's bytes, and a
//! shared reference to the table's schema; [`Row::get`] scans forward
//! through the row's column bodies to the requested index on each call.
//! Tables are read start-to-end far more often than randomly, so this
//! keeps the common case allocation-free beyond the `Value` itself.

use std::sync::Arc;

use crate::buffer::{BufferView, SharedBuffer};
use crate::error::Result;
use crate::schema::Schema;
use crate::value::Value;

#[derive(Clone)]
pub struct Row {
    schema: Arc<Schema>,
    data: SharedBuffer,
}

impl Row {
    pub(crate) fn new(schema: Arc<Schema>, data: SharedBuffer) -> Self {
        Row { schema, data }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn get(&self, index: usize) -> Result<Value> {
        let mut view = BufferView::new(self.data.as_window_slice());
        for col in 0..=index {
            let tag = self.schema.column_type(col)?;
            let value = Value::read_body(&mut view, tag)?;
            if col == index {
                return Ok(value);
            }
        }
        unreachable!("loop always returns at col == index")
    }

    pub fn get_by_name(&self, name: &str) -> Result<Value> {
        let index = self.schema.column_index(name)?;
        self.get(index)
    }

    /// Decodes every column in order; the allocation this avoids in the
    /// common case of reading a handful of columns out of a wide row.
    pub fn values(&self) -> Result<Vec<Value>> {
        let mut view = BufferView::new(self.data.as_window_slice());
        let mut values = Vec::with_capacity(self.schema.len());
        for col in 0..self.schema.len() {
            let tag = self.schema.column_type(col)?;
            values.push(Value::read_body(&mut view, tag)?);
        }
        Ok(values)
    }
}

/// Decodes a [`Row`] into a plain struct, one field per named column.
/// Implemented by hand for ad-hoc decoding, or generated by
/// `#[derive(FromRow)]` for a struct whose field names match column
/// names.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> Result<Self>;
}
