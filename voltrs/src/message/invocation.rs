//! Stored-procedure invocation requests and their responses.

use crate::buffer::{BufferView, OwnedBuffer, SharedBuffer};
use crate::error::{ClientError, Result};
use crate::procedure::ParameterSet;
use crate::table::Table;

const FIELD_STATUS_STRING: u8 = 1 << 5;
const FIELD_EXCEPTION: u8 = 1 << 6;
const FIELD_APP_STATUS_STRING: u8 = 1 << 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Success,
    UserAbort,
    GracefulFailure,
    UnexpectedFailure,
    ConnectionLost,
    ConnectionTimeout,
}

impl StatusCode {
    pub fn from_i8(code: i8) -> StatusCode {
        match code {
            1 => StatusCode::Success,
            -1 => StatusCode::UserAbort,
            -2 => StatusCode::GracefulFailure,
            -3 => StatusCode::UnexpectedFailure,
            -4 => StatusCode::ConnectionLost,
            -5 => StatusCode::ConnectionTimeout,
            _ => StatusCode::UnexpectedFailure,
        }
    }

    pub fn as_i8(self) -> i8 {
        match self {
            StatusCode::Success => 1,
            StatusCode::UserAbort => -1,
            StatusCode::GracefulFailure => -2,
            StatusCode::UnexpectedFailure => -3,
            StatusCode::ConnectionLost => -4,
            StatusCode::ConnectionTimeout => -5,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, StatusCode::Success)
    }

    fn name(self) -> &'static str {
        match self {
            StatusCode::Success => "SUCCESS",
            StatusCode::UserAbort => "USER_ABORT",
            StatusCode::GracefulFailure => "GRACEFUL_FAILURE",
            StatusCode::UnexpectedFailure => "UNEXPECTED_FAILURE",
            StatusCode::ConnectionLost => "CONNECTION_LOST",
            StatusCode::ConnectionTimeout => "CONNECTION_TIMEOUT",
        }
    }
}

pub struct InvocationRequest<'a> {
    pub procedure_name: &'a str,
    pub client_data: i64,
    pub params: &'a ParameterSet,
}

impl<'a> InvocationRequest<'a> {
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = OwnedBuffer::new();
        buf.write_i32(0)?; // length placeholder
        buf.write_i8(0)?; // version
        buf.write_string(Some(self.procedure_name.as_bytes()))?;
        buf.write_i64(self.client_data)?;
        self.params.serialize_to(&mut buf)?;
        buf.flip();
        let len = buf.remaining() as i32 - 4;
        buf.put_i32(0, len)?;
        Ok(buf.as_written().to_vec())
    }
}

#[derive(Clone)]
pub struct InvocationResponse {
    pub client_data: i64,
    pub status_code: StatusCode,
    pub status_string: Option<String>,
    pub app_status_code: i8,
    pub app_status_string: Option<String>,
    pub cluster_round_trip_time: i32,
    pub results: Vec<Table>,
}

impl InvocationResponse {
    pub fn success(&self) -> bool {
        self.status_code.is_success()
    }

    /// Builds a structured [`ClientError::ServerException`] out of a
    /// failed invocation's already-decoded fields, for callers that want
    /// an error rather than matching on `status_code`/`status_string`
    /// themselves. Returns `None` on success; the wire itself carries no
    /// stack trace for a remote procedure failure, so that field is
    /// always empty.
    pub fn server_exception(&self) -> Option<ClientError> {
        if self.success() {
            return None;
        }
        Some(ClientError::ServerException {
            code: self.app_status_code as i32,
            name: self.status_code.name().to_string(),
            message: self
                .status_string
                .clone()
                .unwrap_or_else(|| "no status string provided".to_string()),
            stack_trace: String::new(),
            has_nested: false,
        })
    }

    /// A response synthesized locally rather than received from a server,
    /// used when a connection is lost or a request times out while
    /// in-flight. `client_data` is filled in by the caller so it still
    /// matches the pending request it completes.
    pub fn synthetic(client_data: i64, status_code: StatusCode, status_string: &str) -> Self {
        InvocationResponse {
            client_data,
            status_code,
            status_string: Some(status_string.to_string()),
            app_status_code: i8::MIN,
            app_status_string: None,
            cluster_round_trip_time: 0,
            results: Vec::new(),
        }
    }

    /// Parses the frame body (the length prefix has already been
    /// consumed by the connection's frame reader).
    pub fn parse(body: SharedBuffer) -> Result<InvocationResponse> {
        let bytes = body.as_window_slice();
        let base = body.position();
        let mut view = BufferView::new(bytes);

        let version = view.read_i8()?;
        if version != 0 {
            return Err(ClientError::protocol(format!(
                "unexpected invocation response version {version}"
            )));
        }
        let client_data = view.read_i64()?;
        let present_fields = view.read_u8()?;
        let status_code = StatusCode::from_i8(view.read_i8()?);
        let status_string = if present_fields & FIELD_STATUS_STRING != 0 {
            view.read_string()?
                .map(|b| String::from_utf8_lossy(b).into_owned())
        } else {
            None
        };
        let app_status_code = view.read_i8()?;
        let app_status_string = if present_fields & FIELD_APP_STATUS_STRING != 0 {
            view.read_string()?
                .map(|b| String::from_utf8_lossy(b).into_owned())
        } else {
            None
        };
        let cluster_round_trip_time = view.read_i32()?;
        if present_fields & FIELD_EXCEPTION != 0 {
            let exception_len = view.read_i32()?;
            if exception_len < 0 {
                return Err(ClientError::protocol("negative exception length"));
            }
            let _ = view.read_bytes(exception_len as usize)?;
        }

        let result_count = view.read_i16()?;
        if result_count < 0 {
            return Err(ClientError::protocol("negative result table count"));
        }
        let mut results = Vec::with_capacity(result_count as usize);
        for _ in 0..result_count {
            let table_len = view.read_i32()?;
            if table_len < 4 {
                return Err(ClientError::protocol("table shorter than its own header"));
            }
            let table_start = view.position();
            let window = body.window(base + table_start, table_len as usize)?;
            results.push(Table::parse(window)?);
            view.set_position(table_start + table_len as usize)?;
        }

        Ok(InvocationResponse {
            client_data,
            status_code,
            status_string,
            app_status_code,
            app_status_string,
            cluster_round_trip_time,
            results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::procedure::Procedure;
    use crate::value::{Value, WireTag};

    #[test]
    fn request_round_trips_length_prefix() {
        let proc = Procedure::new("Insert", vec![WireTag::BigInt]);
        let mut params = proc.params();
        params.add(Value::BigInt(42)).unwrap();
        let req = InvocationRequest {
            procedure_name: proc.name(),
            client_data: 7,
            params: &params,
        };
        let bytes = req.serialize().unwrap();
        let len = i32::from_be_bytes(bytes[0..4].try_into().unwrap());
        assert_eq!(len as usize, bytes.len() - 4);
    }

    #[test]
    fn parses_success_with_no_results() {
        let mut buf = OwnedBuffer::new();
        buf.write_i8(0).unwrap(); // version
        buf.write_i64(99).unwrap(); // client data
        buf.write_u8(0).unwrap(); // present fields
        buf.write_i8(1).unwrap(); // status success
        buf.write_i8(i8::MIN).unwrap(); // app status
        buf.write_i32(3).unwrap(); // round trip time
        buf.write_i16(0).unwrap(); // result count
        buf.flip();
        let resp = InvocationResponse::parse(SharedBuffer::from_vec(buf.as_written().to_vec()))
            .unwrap();
        assert!(resp.success());
        assert_eq!(resp.client_data, 99);
        assert!(resp.results.is_empty());
    }

    #[test]
    fn parses_graceful_failure_with_status_string() {
        let mut buf = OwnedBuffer::new();
        buf.write_i8(0).unwrap();
        buf.write_i64(1).unwrap();
        buf.write_u8(FIELD_STATUS_STRING).unwrap();
        buf.write_i8(-2).unwrap();
        buf.write_string(Some(b"constraint violation")).unwrap();
        buf.write_i8(i8::MIN).unwrap();
        buf.write_i32(1).unwrap();
        buf.write_i16(0).unwrap();
        buf.flip();
        let resp = InvocationResponse::parse(SharedBuffer::from_vec(buf.as_written().to_vec()))
            .unwrap();
        assert!(!resp.success());
        assert_eq!(resp.status_code, StatusCode::GracefulFailure);
        assert_eq!(resp.status_string.as_deref(), Some("constraint violation"));

        match resp.server_exception().unwrap() {
            ClientError::ServerException { name, message, .. } => {
                assert_eq!(name, "GRACEFUL_FAILURE");
                assert_eq!(message, "constraint violation");
            }
            other => panic!("expected ServerException, got {other:?}"),
        }
    }

    #[test]
    fn server_exception_is_none_on_success() {
        let resp = InvocationResponse::synthetic(1, StatusCode::Success, "ignored");
        assert!(resp.server_exception().is_none());
    }
}
