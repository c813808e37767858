use fleetcast_types::PromptId;
use thiserror::Error;

/// Why a call ended in `failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// `queuePrompt` itself failed.
    Submit,
    /// The backend reported `execution_error`.
    Execution,
    /// The backend reported `execution_interrupted`.
    Interrupted,
    /// `execution_success` arrived but a declared output was never
    /// produced, even after consulting history once.
    Incomplete,
    /// A `cancel()` call's grace window elapsed with no
    /// `execution_interrupted`.
    CancelTimeout,
    /// The event stream ended (client destroyed or channel closed) before
    /// a terminal event arrived.
    StreamClosed,
}

/// Errors and terminal outcomes of [`crate::CallWrapper::run`].
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("call failed ({kind:?}) for prompt {prompt_id:?}: {cause}")]
    Failed {
        kind: FailureKind,
        prompt_id: Option<PromptId>,
        cause: String,
    },

    #[error("backend client error: {0}")]
    Client(#[from] fleetcast_client::ClientError),

    #[error("template error: {0}")]
    Template(#[from] fleetcast_template::TemplateError),
}

impl LifecycleError {
    pub fn failed(kind: FailureKind, prompt_id: Option<PromptId>, cause: impl Into<String>) -> Self {
        LifecycleError::Failed {
            kind,
            prompt_id,
            cause: cause.into(),
        }
    }

    pub fn kind(&self) -> Option<&FailureKind> {
        match self {
            LifecycleError::Failed { kind, .. } => Some(kind),
            _ => None,
        }
    }
}
