//! `TIMESTAMP`: microseconds since the Unix epoch, stored as a signed 64-bit
//! integer. `NULL` is `i64::MIN`, the same convention as every other
//! fixed-width integer column.

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(i64);

const NULL_MICROS: i64 = i64::MIN;

impl Timestamp {
    pub fn from_micros(micros: i64) -> Self {
        Timestamp(micros)
    }

    pub fn micros(&self) -> i64 {
        self.0
    }

    pub fn null() -> Self {
        Timestamp(NULL_MICROS)
    }

    pub fn is_null(&self) -> bool {
        self.0 == NULL_MICROS
    }
}

#[cfg(feature = "chrono")]
mod chrono_interop {
    use super::Timestamp;
    use chrono::{DateTime, Utc};

    impl From<DateTime<Utc>> for Timestamp {
        fn from(dt: DateTime<Utc>) -> Self {
            Timestamp::from_micros(dt.timestamp_micros())
        }
    }

    impl TryFrom<Timestamp> for DateTime<Utc> {
        type Error = crate::error::ClientError;

        fn try_from(ts: Timestamp) -> Result<Self, Self::Error> {
            if ts.is_null() {
                return Err(crate::error::ClientError::protocol(
                    "cannot convert a NULL timestamp to chrono::DateTime",
                ));
            }
            DateTime::from_timestamp_micros(ts.micros())
                .ok_or_else(|| crate::error::ClientError::protocol("timestamp out of range"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_is_i64_min() {
        assert!(Timestamp::null().is_null());
        assert_eq!(Timestamp::null().micros(), i64::MIN);
    }

    #[test]
    fn round_trips_micros() {
        let ts = Timestamp::from_micros(1_700_000_000_000_000);
        assert_eq!(ts.micros(), 1_700_000_000_000_000);
        assert!(!ts.is_null());
    }
}
