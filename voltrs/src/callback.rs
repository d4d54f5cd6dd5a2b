//! Per-invocation completion callbacks (C6 support).
//!
//! The system this client talks to models callbacks as an abstract base
//! class carrying a routing-metadata struct. A tagged sum plus a plain
//! data record does the same job without a vtable: either the internal
//! sync-invoke slot, or a user closure with its own abandon policy.

use tokio::sync::oneshot;

use crate::message::invocation::InvocationResponse;

/// Routing metadata attached to a callback at submission time: useful
/// for status-listener diagnostics and for asserting routing decisions
/// in tests.
#[derive(Debug, Clone, Default)]
pub struct InvokeInfo {
    pub procedure_name: String,
    pub host_name: String,
    pub host_id: i32,
    pub partition: i32,
    pub read_only: bool,
    pub multi_part: bool,
}

/// Why a request was abandoned instead of completed normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonReason {
    TooBusy,
}

pub(crate) enum Callback {
    /// The internal slot used by a blocking sync-invoke caller.
    Sync(oneshot::Sender<InvocationResponse>),
    /// A user-supplied closure plus its abandon policy.
    User {
        info: InvokeInfo,
        allow_abandon: bool,
        on_complete: Box<dyn FnOnce(InvocationResponse) + Send>,
        on_abandon: Option<Box<dyn FnOnce(AbandonReason) + Send>>,
    },
}

impl Callback {
    pub(crate) fn info(&self) -> Option<&InvokeInfo> {
        match self {
            Callback::Sync(_) => None,
            Callback::User { info, .. } => Some(info),
        }
    }

    /// Whether this request may be dropped locally with `TooBusy` when
    /// the client is saturated. Defaults to true unless the caller's own
    /// callback overrides it.
    pub(crate) fn allows_abandon(&self) -> bool {
        matches!(
            self,
            Callback::User {
                allow_abandon: true,
                ..
            }
        )
    }

    pub(crate) fn complete(self, response: InvocationResponse) {
        match self {
            Callback::Sync(tx) => {
                let _ = tx.send(response);
            }
            Callback::User { on_complete, .. } => on_complete(response),
        }
    }

    pub(crate) fn abandon(self, reason: AbandonReason) {
        if let Callback::User {
            on_abandon: Some(cb),
            ..
        } = self
        {
            cb(reason);
        }
    }
}
