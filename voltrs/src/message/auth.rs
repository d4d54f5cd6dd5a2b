//! The login handshake: a single non-inclusive-length-prefixed request
//! and response, exchanged once per connection before any invocation may
//! be sent.

use crate::buffer::{BufferView, OwnedBuffer};
use crate::error::{ClientError, Result};
use crate::hash::{sha1, sha256};

/// Which password digest to send. VoltDB only accepts these two; legacy
/// cleartext or MD5 schemes are not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashScheme {
    Sha1,
    Sha256,
}

impl HashScheme {
    fn version_byte(self) -> i8 {
        match self {
            HashScheme::Sha1 => 0,
            HashScheme::Sha256 => 1,
        }
    }

    fn hash(self, password: &str) -> Vec<u8> {
        match self {
            HashScheme::Sha1 => sha1(password.as_bytes()).to_vec(),
            HashScheme::Sha256 => sha256(password.as_bytes()).to_vec(),
        }
    }
}

pub struct AuthRequest<'a> {
    pub service: &'a str,
    pub username: &'a str,
    pub password: &'a str,
    pub scheme: HashScheme,
}

impl<'a> AuthRequest<'a> {
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = OwnedBuffer::new();
        buf.write_i32(0)?; // length placeholder
        buf.write_i8(self.scheme.version_byte())?;
        buf.write_string(Some(self.service.as_bytes()))?;
        buf.write_string(Some(self.username.as_bytes()))?;
        buf.write_bytes(&self.scheme.hash(self.password))?;
        buf.flip();
        let len = buf.remaining() as i32 - 4;
        buf.put_i32(0, len)?;
        Ok(buf.as_written().to_vec())
    }
}

#[derive(Debug, Clone)]
pub struct AuthResponse {
    pub result_code: i8,
    pub host_id: i32,
    pub connection_id: i64,
    pub cluster_start_time: i64,
    pub leader_address: i32,
    pub build_string: String,
}

impl AuthResponse {
    pub fn success(&self) -> bool {
        self.result_code == 0
    }

    /// Parses the frame body (the connection has already stripped the
    /// leading length prefix from the TCP stream).
    pub fn parse(body: &[u8]) -> Result<AuthResponse> {
        let mut view = BufferView::new(body);
        let version = view.read_i8()?;
        if version != 0 {
            return Err(ClientError::protocol(format!(
                "unexpected auth response version {version}"
            )));
        }
        let result_code = view.read_i8()?;
        if result_code != 0 {
            return Ok(AuthResponse {
                result_code,
                host_id: 0,
                connection_id: 0,
                cluster_start_time: 0,
                leader_address: 0,
                build_string: String::new(),
            });
        }
        let host_id = view.read_i32()?;
        let connection_id = view.read_i64()?;
        let cluster_start_time = view.read_i64()?;
        let leader_address = view.read_i32()?;
        let build_string = view
            .read_string()?
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default();
        Ok(AuthResponse {
            result_code,
            host_id,
            connection_id,
            cluster_start_time,
            leader_address,
            build_string,
        })
    }
}
