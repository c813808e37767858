use thiserror::Error;

/// Errors raised by [`crate::PromptTemplate`] operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TemplateError {
    /// A binding referenced a name that was never registered at
    /// construction time.
    #[error("unknown input/output name: {0}")]
    UnknownName(String),

    /// A path segment was empty, or named a reserved internal-object
    /// representation.
    #[error("invalid path: {0}")]
    InvalidPath(String),
}
