//! Opaque identifiers threaded through the dispatcher, client, and lifecycle.

use std::fmt;

/// Opaque identifier returned by a backend at submission time
/// (`QueuePromptResponse.prompt_id`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PromptId(pub String);

impl fmt::Display for PromptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for PromptId {
    fn from(value: String) -> Self {
        PromptId(value)
    }
}

impl From<&str> for PromptId {
    fn from(value: &str) -> Self {
        PromptId(value.to_string())
    }
}

/// Stable identifier for one backend client: either assigned by the caller
/// or derived from the host at construction time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub String);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ClientId {
    fn from(value: String) -> Self {
        ClientId(value)
    }
}

impl From<&str> for ClientId {
    fn from(value: &str) -> Self {
        ClientId(value.to_string())
    }
}
