//! Error taxonomy for the client runtime.
//!
//! One `thiserror`-derived enum for the whole crate: a single flat enum
//! with `#[from]` conversions at the transport boundary, and everything
//! else constructed explicitly at the point of failure.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    // --- C1: byte buffer / codec ---
    #[error("buffer overflow/underflow: requested {requested} bytes, {remaining} remaining")]
    Overflow { requested: usize, remaining: usize },
    #[error("index {index} out of bounds for limit {limit}")]
    IndexOutOfBounds { index: usize, limit: usize },
    #[error("attempted to grow a non-expandable buffer")]
    NonExpandableBuffer,

    // --- C2: value & schema model ---
    #[error("invalid column: {0}")]
    InvalidColumn(String),
    #[error("no more rows")]
    NoMoreRows,
    #[error("could not parse decimal string: {0}")]
    StringToDecimal(String),
    #[error("{0} out of range")]
    CoordinateOutOfRange(&'static str),
    #[error("unsupported value type: {0}")]
    UnsupportedType(String),

    // --- procedure / parameter set ---
    #[error("not all declared parameters were set before serialization")]
    UninitializedParams,
    #[error("parameter {position} expected type {expected}")]
    ParamMismatch { expected: String, position: usize },

    // --- C4: transport lifecycle ---
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("failed to connect: {0}")]
    Connect(String),
    #[error("no authenticated connections available")]
    NoConnections,
    #[error("protocol error: {0}")]
    ProtocolError(String),
    #[error("frame of {len} bytes exceeds the 64 MiB limit")]
    FrameTooLarge { len: u32 },
    #[error("server exception {code} ({name}): {message}")]
    ServerException {
        code: i32,
        name: String,
        message: String,
        stack_trace: String,
        /// VoltDB's wire shape for a server-side exception carries a fifth
        /// field flagging whether another exception is nested underneath.
        /// Nothing in the invocation response this crate decodes exposes a
        /// structured nested exception, so this is always `false` today.
        has_nested: bool,
    },

    // --- C5: router / cluster topology ---
    #[error("two connections reported inconsistent cluster identity")]
    ClusterInstanceMismatch,
    #[error("server reported a LEGACY hashinator, only ELASTIC is supported")]
    ElasticModeMismatch,
    #[error("unknown procedure: {0}")]
    UnknownProcedure(String),

    // --- C6: client façade / reactor ---
    #[error("callback must not be null")]
    NullCallback,
    #[error("connection handle used from the wrong owning thread")]
    MisplacedClient,
    #[error("reactor failure: {0}")]
    Reactor(String),

    #[cfg(feature = "tls")]
    #[error("tls error: {0}")]
    Tls(String),
}

impl ClientError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        ClientError::ProtocolError(msg.into())
    }
}
