//! The dispatcher's own event vocabulary: re-emitted
//! per-client events decorated with an index, plus synthesized
//! dispatcher-level events.

use fleetcast_client::ClientEvent;
use fleetcast_types::ClientId;

use crate::selection::SelectionMode;

#[derive(Debug, Clone, PartialEq)]
pub enum DispatcherEvent {
    /// A client was appended, before its async `init()` completes.
    Added { index: usize },
    /// `init()` completed and the first status frame has been observed.
    Ready { index: usize },
    /// A client was removed.
    Removed { index: usize },
    /// The selection policy changed.
    ChangeMode { mode: SelectionMode },
    /// A job was enqueued.
    AddJob,
    /// A status frame with `queue_remaining > 0` was observed.
    HaveJob,
    /// Every known client's `queue_remaining` reached zero.
    Idle,
    /// A client's event, decorated with its dispatcher index.
    Client { index: usize, event: ClientEvent },
    /// A job attempt failed; `will_retry` mirrors the failover decision.
    ExecutionError {
        client_id: ClientId,
        will_retry: bool,
        attempt: u32,
        max_retries: u32,
    },
}
