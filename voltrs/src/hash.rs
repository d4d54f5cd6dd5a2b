//! Thin wrappers around the hashing kernels this client needs: MurmurHash3
//! (the partition hashinator) and SHA-1/SHA-256 (password hashing for the
//! login handshake). The kernels themselves are out of scope; these three
//! functions are the entire public surface, so callers never see
//! `murmur3`/`sha1`/`sha2` directly.

use std::io::Cursor;

use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::error::{ClientError, Result};

/// 32-bit MurmurHash3, seed 0, matching the elastic hashinator's
/// convention for hashing partition key bytes.
pub fn murmur3_32(bytes: &[u8]) -> Result<i32> {
    let mut cursor = Cursor::new(bytes);
    murmur3::murmur3_32(&mut cursor, 0)
        .map(|v| v as i32)
        .map_err(|e| ClientError::protocol(format!("murmur3 hashing failed: {e}")))
}

pub fn sha1(password: &[u8]) -> [u8; 20] {
    use sha1::Digest as _;
    let digest = Sha1::digest(password);
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest);
    out
}

pub fn sha256(password: &[u8]) -> [u8; 32] {
    let digest = Sha256::digest(password);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha1_is_20_bytes_and_deterministic() {
        assert_eq!(sha1(b"password"), sha1(b"password"));
        assert_eq!(sha1(b"password").len(), 20);
    }

    #[test]
    fn sha256_is_32_bytes_and_deterministic() {
        assert_eq!(sha256(b"password"), sha256(b"password"));
        assert_eq!(sha256(b"password").len(), 32);
    }

    #[test]
    fn murmur3_is_deterministic() {
        assert_eq!(murmur3_32(b"partitionkey").unwrap(), murmur3_32(b"partitionkey").unwrap());
    }
}
