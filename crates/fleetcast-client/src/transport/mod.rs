//! Streaming channel abstraction.
//!
//! The core must not assume a specific streaming library, so the duplex
//! channel to a backend is modeled as a trait rather than a concrete
//! `tokio-tungstenite` type. [`ws::WsChannel`] is the one implementation
//! this crate ships; a test double lives alongside the client's own tests.

pub mod frame;
pub mod ws;

use async_trait::async_trait;

use crate::error::ClientError;
use crate::events::ClientEvent;

/// One inbound item off a channel: either a decoded event, or the raw
/// `(type, data)` of a text frame this layer doesn't interpret itself (left
/// for [`crate::client::BackendClient`] to dispatch by name, e.g.
/// `execution_start`/`progress`/`executed`).
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelItem {
    Event(ClientEvent),
    Named { kind: String, data: serde_json::Value },
}

/// A duplex streaming channel to one backend.
///
/// Implementations must make [`Channel::close`] with `force = true`
/// complete at least as fast as a polite close — the reconnect ladder
/// depends on the previous channel being torn down quickly before the
/// next attempt opens.
#[async_trait]
pub trait Channel: Send {
    /// Open the channel against `url`, applying `headers` to the upgrade
    /// request where the transport supports it.
    async fn open(
        &mut self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<(), ClientError>;

    /// Wait for and decode the next inbound item. Returns `Ok(None)` on a
    /// clean remote close.
    async fn recv(&mut self) -> Result<Option<ChannelItem>, ClientError>;

    /// Close the channel. `force = true` requests an abortive termination
    /// (dropping the connection rather than completing a close handshake).
    async fn close(&mut self, force: bool);
}
