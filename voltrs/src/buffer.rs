//! Byte buffer / codec primitives (C1).
//!
//! Three distinct flavors, matching the three `ByteBuffer` subclasses in
//! the system this client talks to: a non-owning [`BufferView`] over
//! someone else's bytes, an exclusively-owned, growable [`OwnedBuffer`],
//! and a reference-counted, growable [`SharedBuffer`]. Only the latter two
//! may grow; growth always doubles capacity until sufficient and preserves
//! bytes `[0, position)`.
//!
//! All reads/writes are big-endian. Every fallible operation returns an
//! explicit `Result` instead of partially mutating the buffer on error.

use std::sync::Arc;

use crate::error::{ClientError, Result};

fn check_seq(position: usize, limit: usize, len: usize) -> Result<usize> {
    if limit.saturating_sub(position) < len {
        return Err(ClientError::Overflow {
            requested: len,
            remaining: limit.saturating_sub(position),
        });
    }
    Ok(position)
}

fn check_abs(index: usize, limit: usize, len: usize) -> Result<usize> {
    if index > limit || len > limit - index {
        return Err(ClientError::IndexOutOfBounds { index, limit });
    }
    Ok(index)
}

macro_rules! cursor_core {
    () => {
        pub fn position(&self) -> usize {
            self.position
        }

        pub fn limit(&self) -> usize {
            self.limit
        }

        pub fn remaining(&self) -> usize {
            self.limit - self.position
        }

        pub fn has_remaining(&self) -> bool {
            self.position < self.limit
        }

        pub fn set_position(&mut self, position: usize) -> Result<()> {
            check_abs(position, self.limit, 0)?;
            self.position = position;
            Ok(())
        }

        pub fn set_limit(&mut self, limit: usize) -> Result<()> {
            if limit > self.capacity() {
                return Err(ClientError::IndexOutOfBounds {
                    index: limit,
                    limit: self.capacity(),
                });
            }
            self.limit = limit;
            if self.position > self.limit {
                self.position = self.limit;
            }
            Ok(())
        }

        /// `limit <- position; position <- 0`.
        pub fn flip(&mut self) {
            self.limit = self.position;
            self.position = 0;
        }

        /// `limit <- capacity; position <- 0`.
        pub fn clear(&mut self) {
            self.limit = self.capacity();
            self.position = 0;
        }
    };
}

macro_rules! typed_rw {
    ($get:ident, $get_at:ident, $put:ident, $put_at:ident, $ty:ty, $width:expr) => {
        pub fn $get(&mut self) -> Result<$ty> {
            let idx = check_seq(self.position, self.limit, $width)?;
            self.position += $width;
            let mut bytes = [0u8; $width];
            bytes.copy_from_slice(&self.as_slice()[idx..idx + $width]);
            Ok(<$ty>::from_be_bytes(bytes))
        }

        pub fn $get_at(&self, index: usize) -> Result<$ty> {
            let idx = check_abs(index, self.limit, $width)?;
            let mut bytes = [0u8; $width];
            bytes.copy_from_slice(&self.as_slice()[idx..idx + $width]);
            Ok(<$ty>::from_be_bytes(bytes))
        }
    };
}

macro_rules! typed_rw_mut {
    ($put:ident, $put_at:ident, $ty:ty, $width:expr) => {
        pub fn $put(&mut self, value: $ty) -> Result<()> {
            self.ensure_remaining($width)?;
            let idx = check_seq(self.position, self.limit, $width)?;
            self.position += $width;
            self.as_mut_slice()[idx..idx + $width].copy_from_slice(&value.to_be_bytes());
            Ok(())
        }

        pub fn $put_at(&mut self, index: usize, value: $ty) -> Result<()> {
            let idx = check_abs(index, self.limit, $width)?;
            self.as_mut_slice()[idx..idx + $width].copy_from_slice(&value.to_be_bytes());
            Ok(())
        }
    };
}

/// A non-owning, non-growable cursor over someone else's bytes.
pub struct BufferView<'a> {
    data: &'a [u8],
    position: usize,
    limit: usize,
}

impl<'a> BufferView<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        let limit = data.len();
        BufferView {
            data,
            position: 0,
            limit,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    fn as_slice(&self) -> &[u8] {
        self.data
    }

    cursor_core!();
    typed_rw!(read_i8, get_i8, write_i8_unused, put_i8_unused, i8, 1);
    typed_rw!(read_u8, get_u8, write_u8_unused, put_u8_unused, u8, 1);
    typed_rw!(read_i16, get_i16, write_i16_unused, put_i16_unused, i16, 2);
    typed_rw!(read_i32, get_i32, write_i32_unused, put_i32_unused, i32, 4);
    typed_rw!(read_i64, get_i64, write_i64_unused, put_i64_unused, i64, 8);
    typed_rw!(read_f64, get_f64, write_f64_unused, put_f64_unused, f64, 8);

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let idx = check_seq(self.position, self.limit, len)?;
        self.position += len;
        Ok(&self.data[idx..idx + len])
    }

    /// Reads a length-prefixed (signed i32, -1 == NULL) byte string.
    pub fn read_string(&mut self) -> Result<Option<&'a [u8]>> {
        let len = self.read_i32()?;
        if len == -1 {
            return Ok(None);
        }
        if len < 0 {
            return Err(ClientError::protocol(format!("negative string length {len}")));
        }
        Ok(Some(self.read_bytes(len as usize)?))
    }

    /// Advances past the remaining bytes and returns a view over them.
    pub fn slice(&mut self) -> BufferView<'a> {
        let view = BufferView {
            data: &self.data[self.position..self.limit],
            position: 0,
            limit: self.limit - self.position,
        };
        self.position = self.limit;
        view
    }

    /// Carves off exactly `len` bytes as their own view, advancing past them.
    pub fn slice_len(&mut self, len: usize) -> Result<BufferView<'a>> {
        let bytes = self.read_bytes(len)?;
        Ok(BufferView {
            data: bytes,
            position: 0,
            limit: bytes.len(),
        })
    }
}

/// An exclusively-owned, growable buffer, used to build outbound frames.
pub struct OwnedBuffer {
    data: Vec<u8>,
    position: usize,
    limit: usize,
}

impl OwnedBuffer {
    pub fn new() -> Self {
        Self::with_capacity(8 * 1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        OwnedBuffer {
            data: vec![0u8; capacity],
            position: 0,
            limit: capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    fn as_slice(&self) -> &[u8] {
        &self.data
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn ensure_remaining(&mut self, additional: usize) -> Result<()> {
        if self.limit - self.position >= additional {
            return Ok(());
        }
        let needed = self.position + additional;
        let mut new_cap = self.data.len().max(1);
        while new_cap < needed {
            new_cap *= 2;
        }
        self.data.resize(new_cap, 0);
        self.limit = new_cap;
        Ok(())
    }

    cursor_core!();
    typed_rw!(read_i8, get_i8, write_i8_unused, put_i8_unused, i8, 1);
    typed_rw!(read_u8, get_u8, write_u8_unused, put_u8_unused, u8, 1);
    typed_rw!(read_i16, get_i16, write_i16_unused, put_i16_unused, i16, 2);
    typed_rw!(read_i32, get_i32, write_i32_unused, put_i32_unused, i32, 4);
    typed_rw!(read_i64, get_i64, write_i64_unused, put_i64_unused, i64, 8);
    typed_rw!(read_f64, get_f64, write_f64_unused, put_f64_unused, f64, 8);

    typed_rw_mut!(write_i8, put_i8, i8, 1);
    typed_rw_mut!(write_u8, put_u8, u8, 1);
    typed_rw_mut!(write_i16, put_i16, i16, 2);
    typed_rw_mut!(write_i32, put_i32, i32, 4);
    typed_rw_mut!(write_i64, put_i64, i64, 8);
    typed_rw_mut!(write_f64, put_f64, f64, 8);

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_remaining(bytes.len())?;
        let idx = check_seq(self.position, self.limit, bytes.len())?;
        self.position += bytes.len();
        self.data[idx..idx + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Writes a length-prefixed (signed i32, -1 == NULL) byte string.
    pub fn write_string(&mut self, value: Option<&[u8]>) -> Result<()> {
        match value {
            None => self.write_i32(-1),
            Some(bytes) => {
                if bytes.len() as i64 > i32::MAX as i64 {
                    return Err(ClientError::protocol("string longer than 2^31 bytes"));
                }
                self.write_i32(bytes.len() as i32)?;
                self.write_bytes(bytes)
            }
        }
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&[u8]> {
        let idx = check_seq(self.position, self.limit, len)?;
        self.position += len;
        Ok(&self.data[idx..idx + len])
    }

    pub fn as_written(&self) -> &[u8] {
        &self.data[..self.position]
    }

    pub fn view(&self) -> BufferView<'_> {
        BufferView::new(&self.data[..self.limit])
    }
}

impl Default for OwnedBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// A reference-counted, growable buffer. Frames read off the wire are
/// parsed into one of these; [`crate::table::Table`] clones the `Arc` and
/// keeps an `(offset, len)` window into it rather than copying rows. A
/// grow on a buffer that other holders have already cloned always
/// produces a fresh backing region (via [`Arc::make_mut`]) and leaves
/// those holders' view untouched.
#[derive(Clone)]
pub struct SharedBuffer {
    data: Arc<Vec<u8>>,
    position: usize,
    limit: usize,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::with_capacity(8 * 1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        SharedBuffer {
            data: Arc::new(vec![0u8; capacity]),
            position: 0,
            limit: capacity,
        }
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        let limit = data.len();
        SharedBuffer {
            data: Arc::new(data),
            position: 0,
            limit,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    fn as_slice(&self) -> &[u8] {
        &self.data
    }

    fn ensure_remaining(&mut self, additional: usize) -> Result<()> {
        if self.limit - self.position >= additional {
            return Ok(());
        }
        let needed = self.position + additional;
        let mut new_cap = self.data.len().max(1);
        while new_cap < needed {
            new_cap *= 2;
        }
        Arc::make_mut(&mut self.data).resize(new_cap, 0);
        self.limit = new_cap;
        Ok(())
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        Arc::make_mut(&mut self.data)
    }

    cursor_core!();
    typed_rw!(read_i8, get_i8, write_i8_unused, put_i8_unused, i8, 1);
    typed_rw!(read_u8, get_u8, write_u8_unused, put_u8_unused, u8, 1);
    typed_rw!(read_i16, get_i16, write_i16_unused, put_i16_unused, i16, 2);
    typed_rw!(read_i32, get_i32, write_i32_unused, put_i32_unused, i32, 4);
    typed_rw!(read_i64, get_i64, write_i64_unused, put_i64_unused, i64, 8);
    typed_rw!(read_f64, get_f64, write_f64_unused, put_f64_unused, f64, 8);

    typed_rw_mut!(write_i8, put_i8, i8, 1);
    typed_rw_mut!(write_u8, put_u8, u8, 1);
    typed_rw_mut!(write_i16, put_i16, i16, 2);
    typed_rw_mut!(write_i32, put_i32, i32, 4);
    typed_rw_mut!(write_i64, put_i64, i64, 8);
    typed_rw_mut!(write_f64, put_f64, f64, 8);

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_remaining(bytes.len())?;
        let idx = check_seq(self.position, self.limit, bytes.len())?;
        self.position += bytes.len();
        self.as_mut_slice()[idx..idx + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&[u8]> {
        let idx = check_seq(self.position, self.limit, len)?;
        self.position += len;
        Ok(&self.data[idx..idx + len])
    }

    /// Reads a length-prefixed (signed i32, -1 == NULL) byte string.
    pub fn read_string(&mut self) -> Result<Option<Vec<u8>>> {
        let len = self.read_i32()?;
        if len == -1 {
            return Ok(None);
        }
        if len < 0 {
            return Err(ClientError::protocol(format!("negative string length {len}")));
        }
        Ok(Some(self.read_bytes(len as usize)?.to_vec()))
    }

    /// Slices off `[offset, offset+len)` of the *whole backing buffer*
    /// (not relative to the cursor), sharing the same `Arc`. Used to hand
    /// a table its own window into a received frame without copying.
    pub fn window(&self, offset: usize, len: usize) -> Result<SharedBuffer> {
        check_abs(offset, self.data.len(), len)?;
        Ok(SharedBuffer {
            data: self.data.clone(),
            position: offset,
            limit: offset + len,
        })
    }

    pub fn as_window_slice(&self) -> &[u8] {
        &self.data[self.position..self.limit]
    }
}

impl Default for SharedBuffer {
    fn default() -> Self {
        Self::new()
    }
}
