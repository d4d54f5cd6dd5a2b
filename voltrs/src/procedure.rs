//! Stored procedures and the parameter sets used to invoke them.
//!
//! Parameters must be supplied in declaration order, one per position;
//! [`ParameterSet::add`] enforces the type at each position against the
//! [`Procedure`]'s declared signature (a `NULL` value is always accepted,
//! regardless of declared type, since the wire's `NULL` tag carries no
//! type information of its own).

use crate::buffer::OwnedBuffer;
use crate::error::{ClientError, Result};
use crate::value::{Value, WireTag};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Procedure {
    name: String,
    parameter_types: Vec<WireTag>,
}

impl Procedure {
    pub fn new(name: impl Into<String>, parameter_types: Vec<WireTag>) -> Self {
        Procedure {
            name: name.into(),
            parameter_types,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameter_types(&self) -> &[WireTag] {
        &self.parameter_types
    }

    pub fn params(&self) -> ParameterSet {
        ParameterSet::new(self.parameter_types.clone())
    }
}

#[derive(Debug, Clone)]
pub struct ParameterSet {
    expected: Vec<WireTag>,
    values: Vec<Value>,
}

impl ParameterSet {
    fn new(expected: Vec<WireTag>) -> Self {
        ParameterSet {
            expected,
            values: Vec::new(),
        }
    }

    pub fn add(&mut self, value: Value) -> Result<&mut Self> {
        let position = self.values.len();
        let expected = self
            .expected
            .get(position)
            .copied()
            .ok_or_else(|| ClientError::ParamMismatch {
                expected: "<no more parameters>".to_string(),
                position,
            })?;
        if !value.is_null() && value.wire_tag() != expected {
            return Err(ClientError::ParamMismatch {
                expected: format!("{expected:?}"),
                position,
            });
        }
        self.values.push(value);
        Ok(self)
    }

    /// Clears every parameter already set, so the same `ParameterSet` can
    /// be reused for another invocation of the same procedure.
    pub fn reset(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn ensure_complete(&self) -> Result<()> {
        if self.values.len() != self.expected.len() {
            return Err(ClientError::UninitializedParams);
        }
        Ok(())
    }

    pub fn values(&self) -> Result<&[Value]> {
        self.ensure_complete()?;
        Ok(&self.values)
    }

    pub fn serialize_to(&self, buf: &mut OwnedBuffer) -> Result<()> {
        self.ensure_complete()?;
        buf.write_i16(self.values.len() as i16)?;
        for value in &self.values {
            value.write_tagged(buf)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_type() {
        let proc = Procedure::new("Insert", vec![WireTag::BigInt, WireTag::String]);
        let mut params = proc.params();
        assert!(params.add(Value::Integer(1)).is_err());
    }

    #[test]
    fn accepts_null_for_any_declared_type() {
        let proc = Procedure::new("Insert", vec![WireTag::BigInt]);
        let mut params = proc.params();
        assert!(params.add(Value::Null).is_ok());
    }

    #[test]
    fn serialize_requires_all_params_set() {
        let proc = Procedure::new("Insert", vec![WireTag::BigInt, WireTag::String]);
        let mut params = proc.params();
        params.add(Value::BigInt(1)).unwrap();
        let mut buf = OwnedBuffer::new();
        assert!(params.serialize_to(&mut buf).is_err());
        params
            .add(Value::String(Some(b"hi".to_vec())))
            .unwrap();
        assert!(params.serialize_to(&mut buf).is_ok());
    }

    #[test]
    fn reset_allows_reuse() {
        let proc = Procedure::new("Insert", vec![WireTag::BigInt]);
        let mut params = proc.params();
        params.add(Value::BigInt(1)).unwrap();
        params.reset();
        assert!(params.is_empty());
        params.add(Value::BigInt(2)).unwrap();
        assert_eq!(params.values().unwrap(), &[Value::BigInt(2)]);
    }
}
