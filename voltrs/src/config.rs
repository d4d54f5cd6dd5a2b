//! Client-wide configuration (C6 support).

use std::sync::Arc;
use std::time::Duration;

use crate::listener::{NullListener, StatusListener};
use crate::message::auth::HashScheme;

pub const DEFAULT_PORT: u16 = 21212;
pub const DEFAULT_SERVICE: &str = "database";

/// A plain, cloneable options record: no behavior, just knobs, with a
/// hand-written `Default`.
#[derive(Clone)]
pub struct ClientConfig {
    pub username: String,
    pub password: String,
    pub hash_scheme: HashScheme,
    pub service: String,
    /// Soft cap on in-flight requests before backpressure/abandon kicks in.
    pub max_outstanding_requests: usize,
    /// If true, saturated invocations whose callback permits it are
    /// dropped locally with `AbandonReason::TooBusy` instead of queued.
    pub enable_abandon: bool,
    /// Enables the local-deadline path for read-only requests.
    pub enable_query_timeout: bool,
    pub timeout: Duration,
    pub timeout_scan_interval: Duration,
    pub use_ssl: bool,
    pub listener: Arc<dyn StatusListener>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("hash_scheme", &self.hash_scheme)
            .field("service", &self.service)
            .field("max_outstanding_requests", &self.max_outstanding_requests)
            .field("enable_abandon", &self.enable_abandon)
            .field("enable_query_timeout", &self.enable_query_timeout)
            .field("timeout", &self.timeout)
            .field("timeout_scan_interval", &self.timeout_scan_interval)
            .field("use_ssl", &self.use_ssl)
            .finish()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            username: String::new(),
            password: String::new(),
            hash_scheme: HashScheme::Sha256,
            service: DEFAULT_SERVICE.to_string(),
            max_outstanding_requests: 3_000,
            enable_abandon: false,
            enable_query_timeout: false,
            timeout: Duration::from_secs(2),
            timeout_scan_interval: Duration::from_secs(1),
            use_ssl: false,
            listener: Arc::new(NullListener),
        }
    }
}
