//! The event vocabulary a [`crate::BackendClient`] fans out over its
//! [`fleetcast_types::EventHub`].
//!
//! One enum covers every backend event rather than a string-keyed custom
//! event plus a synthetic `all` fan-out: every subscriber already sees every
//! variant, so there is nothing further to "also echo on `all`".

use std::sync::Arc;

use fleetcast_types::PromptId;
use serde_json::Value;

/// MIME kind carried by a binary preview frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewMime {
    Jpeg,
    Png,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// First successful streaming channel open.
    Connected,
    /// A later successful open, following one or more disconnects.
    Reconnected,
    /// The channel went down; the client is attempting to recover.
    Disconnected { message: String },
    /// The reconnect attempt budget (10 attempts) was exhausted.
    ReconnectionFailed,

    /// A 401 was observed during a credential probe.
    AuthError,
    /// A `queuePrompt` call returned a non-2xx response.
    QueueError { message: String },

    /// Server-assigned session id rebinding (`data.sid` on a text frame).
    SessionRebound { client_id: String },

    /// A `status` text frame, or a synthesized one from the polling
    /// fallback. `queue_remaining` drives the dispatcher's `have_job` /
    /// `idle` synthesis.
    Status { queue_remaining: u64 },

    /// `execution_start{promptId}`.
    ExecutionStart { prompt_id: PromptId },
    /// `progress{promptId, node, value, max}`. The lifecycle only
    /// counts these; it never interprets `value`/`max` ordering.
    Progress {
        prompt_id: PromptId,
        node: String,
        value: u64,
        max: u64,
    },
    /// `executed{promptId, node, output}`.
    Executed {
        prompt_id: PromptId,
        node: String,
        output: Value,
    },
    /// `execution_cached{promptId, nodes}`.
    ExecutionCached { prompt_id: PromptId, nodes: Vec<String> },
    /// `execution_error{promptId, …}`.
    ExecutionError { prompt_id: PromptId, message: String },
    /// `execution_interrupted{promptId, …}`.
    ExecutionInterrupted { prompt_id: PromptId },
    /// `execution_success{promptId}`.
    ExecutionSuccess { prompt_id: PromptId },

    /// A binary preview-image frame.
    Preview {
        mime: PreviewMime,
        bytes: Arc<[u8]>,
    },
    /// A `logs` text frame, carrying the first log entry if any.
    Terminal { line: Option<String> },

    /// An unrecognized binary event type was received and discarded; the
    /// channel is otherwise unaffected.
    UnknownFrame { event_type: u32 },
}
