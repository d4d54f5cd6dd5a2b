//! Status listener: a caller-supplied sink for connection and
//! backpressure events, distinct from the per-request callback stream.

use crate::error::ClientError;
use crate::message::invocation::InvocationResponse;

/// Notified of events outside the per-request callback stream. Any
/// method may return `true` to request that the client's event loop
/// break. Default implementations are no-ops that never request a
/// break, so callers only override what they care about.
pub trait StatusListener: Send + Sync {
    /// A connection finished authenticating and joined the pool.
    fn connection_active(&self, _host_name: &str, _host_id: i32) {}

    /// A previously-authenticated connection was lost.
    /// `connections_left` is the number of connections still open.
    fn connection_lost(&self, _host_name: &str, _connections_left: i32) -> bool {
        false
    }

    /// Backpressure began (`true`) or ended (`false`) on some connection.
    fn backpressure(&self, _has_backpressure: bool) -> bool {
        false
    }

    /// A user callback panicked, or a reactor-internal error needs
    /// reporting. `response` is the response that was being delivered
    /// when the failure occurred, if any.
    fn uncaught_exception(
        &self,
        _error: &ClientError,
        _response: Option<&InvocationResponse>,
    ) -> bool {
        false
    }
}

/// A listener that never overrides any default, used where a client is
/// configured without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullListener;

impl StatusListener for NullListener {}
