//! Column schema shared by every row of a [`crate::table::Table`].

use indexmap::IndexMap;

use crate::error::{ClientError, Result};
use crate::value::WireTag;

/// Ordered name -> wire type mapping. Order matches the column order on
/// the wire; `IndexMap` gives us both name lookup and positional access
/// without keeping two separate vectors in sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: IndexMap<String, WireTag>,
}

impl Schema {
    pub fn new(columns: Vec<(String, WireTag)>) -> Self {
        Schema {
            columns: columns.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_type(&self, index: usize) -> Result<WireTag> {
        self.columns
            .get_index(index)
            .map(|(_, ty)| *ty)
            .ok_or_else(|| ClientError::InvalidColumn(index.to_string()))
    }

    pub fn column_name(&self, index: usize) -> Result<&str> {
        self.columns
            .get_index(index)
            .map(|(name, _)| name.as_str())
            .ok_or_else(|| ClientError::InvalidColumn(index.to_string()))
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .get_index_of(name)
            .ok_or_else(|| ClientError::InvalidColumn(name.to_string()))
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, WireTag)> {
        self.columns.iter().map(|(name, ty)| (name.as_str(), *ty))
    }
}
