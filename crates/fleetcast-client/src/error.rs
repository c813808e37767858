use fleetcast_types::ClientId;
use thiserror::Error;

/// Errors raised by [`crate::BackendClient`] operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Socket creation, open, or read failure. Recoverable via reconnect or
    /// the polling fallback.
    #[error("transport error on client {client_id}: {message}")]
    Transport { client_id: ClientId, message: String },

    /// A non-2xx response from the backend's HTTP surface.
    #[error("backend {client_id} returned HTTP {status}: {body}")]
    Http {
        client_id: ClientId,
        status: u16,
        body: String,
    },

    /// A 401 encountered during the credential probe in `init`.
    #[error("authentication rejected by backend {client_id}")]
    Auth { client_id: ClientId },

    /// The client has been destroyed and refuses further operations.
    #[error("client {client_id} has been destroyed")]
    Destroyed { client_id: ClientId },

    /// `init` exhausted its bounded retry budget without a successful probe.
    #[error("client {client_id} failed to become ready after {attempts} attempts")]
    InitTimedOut { client_id: ClientId, attempts: u32 },

    /// The underlying HTTP client rejected the request before it reached
    /// the network (malformed URL, body encoding, etc).
    #[error("request build failure for client {client_id}: {source}")]
    Request {
        client_id: ClientId,
        #[source]
        source: reqwest::Error,
    },
}

impl ClientError {
    pub fn client_id(&self) -> &ClientId {
        match self {
            ClientError::Transport { client_id, .. }
            | ClientError::Http { client_id, .. }
            | ClientError::Auth { client_id }
            | ClientError::Destroyed { client_id }
            | ClientError::InitTimedOut { client_id, .. }
            | ClientError::Request { client_id, .. } => client_id,
        }
    }

    /// Whether the dispatcher's failover logic should treat this as
    /// retryable on another client.
    pub fn is_failover_eligible(&self) -> bool {
        matches!(self, ClientError::Transport { .. } | ClientError::InitTimedOut { .. })
    }
}
