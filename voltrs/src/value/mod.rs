//! The dynamically-typed scalar model (C2): wire tags, null sentinels, and
//! the [`Value`] enum every column, parameter, and array element is built
//! from.

mod decimal;
mod geo;
mod timestamp;

pub use decimal::Decimal;
pub use geo::{Geography, GeographyPoint, Ring, DEFAULT_EPSILON};
pub use timestamp::Timestamp;

use crate::buffer::{BufferView, OwnedBuffer};
use crate::error::{ClientError, Result};

/// Single-byte type tags as they appear on the wire, ahead of every value
/// and in column/parameter type arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum WireTag {
    Invalid = -98,
    Array = -99,
    Null = 1,
    TinyInt = 3,
    SmallInt = 4,
    Integer = 5,
    BigInt = 6,
    Float = 8,
    String = 9,
    Timestamp = 11,
    Decimal = 22,
    Varbinary = 25,
    GeographyPoint = 26,
    Geography = 27,
}

impl WireTag {
    pub fn from_i8(tag: i8) -> Result<WireTag> {
        Ok(match tag {
            -99 => WireTag::Array,
            -98 => WireTag::Invalid,
            1 => WireTag::Null,
            3 => WireTag::TinyInt,
            4 => WireTag::SmallInt,
            5 => WireTag::Integer,
            6 => WireTag::BigInt,
            8 => WireTag::Float,
            9 => WireTag::String,
            11 => WireTag::Timestamp,
            22 => WireTag::Decimal,
            25 => WireTag::Varbinary,
            26 => WireTag::GeographyPoint,
            27 => WireTag::Geography,
            other => return Err(ClientError::UnsupportedType(format!("wire tag {other}"))),
        })
    }
}

/// Null sentinel used in place of an actual value for each fixed-width
/// numeric kind: the minimum representable value of that width (and, for
/// `FLOAT`, VoltDB's historical `<= -1.7E+308` convention rather than a
/// bit pattern).
pub const NULL_TINYINT: i8 = i8::MIN;
pub const NULL_SMALLINT: i16 = i16::MIN;
pub const NULL_INTEGER: i32 = i32::MIN;
pub const NULL_BIGINT: i64 = i64::MIN;
pub const NULL_FLOAT: f64 = -1.7E+308;

/// A dynamically-typed scalar. `Array` only appears as a parameter value
/// (result tables never nest arrays in a column); its element tag is
/// carried alongside so an empty array still serializes with a type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    TinyInt(i8),
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    Float(f64),
    String(Option<Vec<u8>>),
    Timestamp(Timestamp),
    Decimal(Decimal),
    Varbinary(Option<Vec<u8>>),
    GeographyPoint(GeographyPoint),
    Geography(Geography),
    Array(WireTag, Vec<Value>),
}

impl Value {
    pub fn wire_tag(&self) -> WireTag {
        match self {
            Value::Null => WireTag::Null,
            Value::TinyInt(_) => WireTag::TinyInt,
            Value::SmallInt(_) => WireTag::SmallInt,
            Value::Integer(_) => WireTag::Integer,
            Value::BigInt(_) => WireTag::BigInt,
            Value::Float(_) => WireTag::Float,
            Value::String(_) => WireTag::String,
            Value::Timestamp(_) => WireTag::Timestamp,
            Value::Decimal(_) => WireTag::Decimal,
            Value::Varbinary(_) => WireTag::Varbinary,
            Value::GeographyPoint(_) => WireTag::GeographyPoint,
            Value::Geography(_) => WireTag::Geography,
            Value::Array(tag, _) => *tag,
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::TinyInt(v) => *v == NULL_TINYINT,
            Value::SmallInt(v) => *v == NULL_SMALLINT,
            Value::Integer(v) => *v == NULL_INTEGER,
            Value::BigInt(v) => *v == NULL_BIGINT,
            Value::Float(v) => *v <= NULL_FLOAT,
            Value::String(v) | Value::Varbinary(v) => v.is_none(),
            Value::Timestamp(v) => v.is_null(),
            Value::Decimal(v) => v.is_null(),
            Value::GeographyPoint(v) => v.is_null(),
            Value::Geography(v) => v.is_null(),
            Value::Array(_, _) => false,
        }
    }

    /// Writes the value's body, without a leading type tag (used inside
    /// tables, where the column type is already known).
    pub fn write_body(&self, buf: &mut OwnedBuffer) -> Result<()> {
        match self {
            Value::Null => Ok(()),
            Value::TinyInt(v) => buf.write_i8(*v),
            Value::SmallInt(v) => buf.write_i16(*v),
            Value::Integer(v) => buf.write_i32(*v),
            Value::BigInt(v) => buf.write_i64(*v),
            Value::Float(v) => buf.write_f64(*v),
            Value::String(v) | Value::Varbinary(v) => buf.write_string(v.as_deref()),
            Value::Timestamp(v) => buf.write_i64(v.micros()),
            Value::Decimal(v) => {
                let unscaled = v.unscaled();
                buf.write_bytes(&unscaled.to_be_bytes())
            }
            Value::GeographyPoint(v) => {
                buf.write_f64(v.longitude())?;
                buf.write_f64(v.latitude())
            }
            Value::Geography(v) => v.serialize_to(buf),
            Value::Array(element_tag, items) => {
                buf.write_i8(*element_tag as i8)?;
                buf.write_i16(items.len() as i16)?;
                for item in items {
                    item.write_body(buf)?;
                }
                Ok(())
            }
        }
    }

    /// Writes the type tag followed by the body, the shape used for
    /// parameters in a stored-procedure invocation.
    pub fn write_tagged(&self, buf: &mut OwnedBuffer) -> Result<()> {
        if self.is_null() && !matches!(self, Value::Array(_, _)) {
            buf.write_i8(WireTag::Null as i8)?;
            return Ok(());
        }
        buf.write_i8(self.wire_tag() as i8)?;
        self.write_body(buf)
    }

    pub fn read_body(view: &mut BufferView<'_>, tag: WireTag) -> Result<Value> {
        Ok(match tag {
            WireTag::Null => Value::Null,
            WireTag::TinyInt => Value::TinyInt(view.read_i8()?),
            WireTag::SmallInt => Value::SmallInt(view.read_i16()?),
            WireTag::Integer => Value::Integer(view.read_i32()?),
            WireTag::BigInt => Value::BigInt(view.read_i64()?),
            WireTag::Float => Value::Float(view.read_f64()?),
            WireTag::String => Value::String(view.read_string()?.map(|b| b.to_vec())),
            WireTag::Varbinary => Value::Varbinary(view.read_string()?.map(|b| b.to_vec())),
            WireTag::Timestamp => Value::Timestamp(Timestamp::from_micros(view.read_i64()?)),
            WireTag::Decimal => {
                let bytes = view.read_bytes(16)?;
                let mut arr = [0u8; 16];
                arr.copy_from_slice(bytes);
                Value::Decimal(Decimal::from_unscaled(i128::from_be_bytes(arr)))
            }
            WireTag::GeographyPoint => {
                let longitude = view.read_f64()?;
                let latitude = view.read_f64()?;
                if longitude == 360.0 && latitude == 360.0 {
                    Value::GeographyPoint(GeographyPoint::null())
                } else {
                    Value::GeographyPoint(
                        GeographyPoint::new(longitude, latitude)
                            .map_err(|_| ClientError::protocol("invalid geography point"))?,
                    )
                }
            }
            WireTag::Geography => Value::Geography(Geography::deserialize_from(view)?),
            WireTag::Array => {
                let element_tag = WireTag::from_i8(view.read_i8()?)?;
                let count = view.read_i16()?;
                if count < 0 {
                    return Err(ClientError::protocol("negative array length"));
                }
                let mut items = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    items.push(Value::read_body(view, element_tag)?);
                }
                Value::Array(element_tag, items)
            }
            WireTag::Invalid => return Err(ClientError::UnsupportedType("INVALID".to_string())),
        })
    }

    pub fn read_tagged(view: &mut BufferView<'_>) -> Result<Value> {
        let tag = WireTag::from_i8(view.read_i8()?)?;
        Value::read_body(view, tag)
    }
}

/// Converts a decoded column [`Value`] into a concrete Rust type. Used by
/// the `#[derive(FromRow)]` macro so a result-table row can be decoded
/// straight into a plain struct instead of matched by hand column by
/// column.
///
/// `Option<T>` implementations pass `Value::Null` (or the fixed-width
/// null sentinel) through as `None`; the non-`Option` implementations
/// reject it with `ClientError::UnsupportedType`, since a caller who
/// wrote a bare `i64` field meant to assert the column is never null.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self>;
}

macro_rules! from_value_int {
    ($ty:ty, $variant:ident) => {
        impl FromValue for $ty {
            fn from_value(value: Value) -> Result<Self> {
                if value.is_null() {
                    return Err(ClientError::UnsupportedType(format!(
                        "unexpected NULL for non-optional {}",
                        stringify!($variant)
                    )));
                }
                match value {
                    Value::$variant(v) => Ok(v),
                    other => Err(ClientError::UnsupportedType(format!(
                        "expected {}, got {:?}",
                        stringify!($variant),
                        other.wire_tag()
                    ))),
                }
            }
        }
    };
}

from_value_int!(i8, TinyInt);
from_value_int!(i16, SmallInt);
from_value_int!(i32, Integer);
from_value_int!(i64, BigInt);
from_value_int!(f64, Float);
from_value_int!(Timestamp, Timestamp);
from_value_int!(Decimal, Decimal);
from_value_int!(GeographyPoint, GeographyPoint);
from_value_int!(Geography, Geography);

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(Some(bytes)) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            other => Err(ClientError::UnsupportedType(format!(
                "expected a non-null STRING, got {:?}",
                other.wire_tag()
            ))),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Varbinary(Some(bytes)) | Value::String(Some(bytes)) => Ok(bytes),
            other => Err(ClientError::UnsupportedType(format!(
                "expected non-null bytes, got {:?}",
                other.wire_tag()
            ))),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            Ok(Some(T::from_value(value)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_value_rejects_null_for_non_option_field() {
        assert!(i64::from_value(Value::BigInt(NULL_BIGINT)).is_err());
    }

    #[test]
    fn from_value_passes_null_through_for_option_field() {
        assert_eq!(
            Option::<i64>::from_value(Value::BigInt(NULL_BIGINT)).unwrap(),
            None
        );
        assert_eq!(
            Option::<i64>::from_value(Value::BigInt(7)).unwrap(),
            Some(7)
        );
    }

    #[test]
    fn integer_round_trips() {
        let v = Value::Integer(42);
        let mut buf = OwnedBuffer::new();
        v.write_tagged(&mut buf).unwrap();
        buf.flip();
        let mut view = buf.view();
        assert_eq!(Value::read_tagged(&mut view).unwrap(), v);
    }

    #[test]
    fn null_bigint_round_trips_as_null_tag() {
        let v = Value::BigInt(NULL_BIGINT);
        assert!(v.is_null());
        let mut buf = OwnedBuffer::new();
        v.write_tagged(&mut buf).unwrap();
        buf.flip();
        let mut view = buf.view();
        assert_eq!(Value::read_tagged(&mut view).unwrap(), Value::Null);
    }

    #[test]
    fn string_round_trips() {
        let v = Value::String(Some(b"hello world".to_vec()));
        let mut buf = OwnedBuffer::new();
        v.write_tagged(&mut buf).unwrap();
        buf.flip();
        let mut view = buf.view();
        assert_eq!(Value::read_tagged(&mut view).unwrap(), v);
    }

    #[test]
    fn array_of_bigint_round_trips() {
        let v = Value::Array(
            WireTag::BigInt,
            vec![Value::BigInt(1), Value::BigInt(2), Value::BigInt(3)],
        );
        let mut buf = OwnedBuffer::new();
        v.write_tagged(&mut buf).unwrap();
        buf.flip();
        let mut view = buf.view();
        assert_eq!(Value::read_tagged(&mut view).unwrap(), v);
    }

    #[test]
    fn decimal_round_trips() {
        let v = Value::Decimal("3.1459".parse().unwrap());
        let mut buf = OwnedBuffer::new();
        v.write_tagged(&mut buf).unwrap();
        buf.flip();
        let mut view = buf.view();
        assert_eq!(Value::read_tagged(&mut view).unwrap(), v);
    }
}
