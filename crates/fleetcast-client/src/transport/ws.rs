//! `tokio-tungstenite` implementation of [`Channel`] (`ws[s]://host/ws?clientId={id}`).

use async_trait::async_trait;
use fleetcast_types::ClientId;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::ClientError;
use crate::events::ClientEvent;
use crate::transport::{frame, Channel, ChannelItem};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A live or not-yet-opened WebSocket channel.
pub struct WsChannel {
    client_id: ClientId,
    socket: Option<Socket>,
}

impl WsChannel {
    pub fn new(client_id: ClientId) -> Self {
        Self { client_id, socket: None }
    }
}

#[async_trait]
impl Channel for WsChannel {
    async fn open(
        &mut self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<(), ClientError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| ClientError::Transport {
                client_id: self.client_id.clone(),
                message: e.to_string(),
            })?;

        for (name, value) in headers {
            if let (Ok(name), Ok(value)) = (
                http::header::HeaderName::from_bytes(name.as_bytes()),
                http::header::HeaderValue::from_str(value),
            ) {
                request.headers_mut().insert(name, value);
            }
        }

        let (socket, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| ClientError::Transport {
                client_id: self.client_id.clone(),
                message: e.to_string(),
            })?;

        self.socket = Some(socket);
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<ChannelItem>, ClientError> {
        let Some(socket) = self.socket.as_mut() else {
            return Err(ClientError::Transport {
                client_id: self.client_id.clone(),
                message: "recv on unopened channel".to_string(),
            });
        };

        loop {
            let Some(message) = socket.next().await else {
                return Ok(None);
            };
            let message = message.map_err(|e| ClientError::Transport {
                client_id: self.client_id.clone(),
                message: e.to_string(),
            })?;

            match message {
                Message::Binary(bytes) => {
                    if let Some(event) = frame::parse_binary(&bytes) {
                        return Ok(Some(ChannelItem::Event(event)));
                    }
                    // Too short to contain even a header; keep listening
                    // rather than treat it as a channel error.
                }
                Message::Text(text) => {
                    let (kind, data) = frame::parse_text(&text).map_err(|e| {
                        ClientError::Transport {
                            client_id: self.client_id.clone(),
                            message: format!("malformed text frame: {e}"),
                        }
                    })?;
                    if let Some(sid) = frame::session_rebind(&data) {
                        return Ok(Some(ChannelItem::Event(ClientEvent::SessionRebound {
                            client_id: sid,
                        })));
                    }
                    return Ok(Some(ChannelItem::Named { kind, data }));
                }
                Message::Close(_) => return Ok(None),
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }

    async fn close(&mut self, force: bool) {
        if let Some(mut socket) = self.socket.take() {
            if force {
                // Drop without a close handshake: faster than `.close()`,
                // required for the reconnect bound (trait doc).
                drop(socket);
            } else {
                let _ = socket.close(None).await;
            }
        }
    }
}
