//! The prompt call lifecycle: submit a finalized workflow, correlate
//! streamed events by prompt id, and surface a typed outcome.

pub mod call;
pub mod error;
pub mod outcome;

pub use call::CallWrapper;
pub use error::{FailureKind, LifecycleError};
pub use outcome::Outcome;
