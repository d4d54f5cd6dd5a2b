//! Wire messages (C3): the login handshake and stored-procedure
//! invocation request/response pair. Every message is a big-endian,
//! non-inclusive-length-prefixed frame; [`crate::connection`] owns the
//! framing loop and hands each frame's body to these parsers.

pub mod auth;
pub mod invocation;
