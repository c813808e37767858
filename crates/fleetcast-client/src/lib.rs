//! Per-backend connection manager: HTTP control plane, streaming
//! channel, liveness watchdog, reconnect ladder, and polling fallback.

pub mod client;
pub mod error;
pub mod events;
pub mod extensions;
pub mod http;
pub mod polling;
pub mod reconnect;
pub mod transport;
pub mod watchdog;

pub use client::BackendClient;
pub use error::ClientError;
pub use events::{ClientEvent, PreviewMime};
pub use http::{HttpApi, QueuePosition, QueuePromptResponse, QueueSnapshot, QueueStatus, UploadResult};
