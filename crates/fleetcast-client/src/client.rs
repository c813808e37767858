//! The per-backend connection manager: ties the HTTP accessor
//! surface, streaming channel, liveness watchdog, reconnect ladder, and
//! polling fallback into one `ready`/`destroyed` lifecycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fleetcast_types::{ClientId, Credentials, EventHub, OsType};
use serde_json::Value;
use tokio::sync::{broadcast, Notify, RwLock};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::events::ClientEvent;
use crate::extensions::Extensions;
use crate::http::{HttpApi, QueuePosition, QueuePromptResponse, QueueSnapshot, QueueStatus, UploadResult};
use crate::reconnect;
use crate::transport::ws::WsChannel;
use crate::transport::{Channel, ChannelItem};
use crate::watchdog::LivenessWatchdog;

const DEFAULT_WS_TIMEOUT: Duration = Duration::from_secs(10);

/// One backend connection and its ready/destroyed lifecycle state.
pub struct BackendClient {
    id: ClientId,
    host: String,
    http: HttpApi,
    credentials: Credentials,
    os_type: RwLock<OsType>,
    ready: AtomicBool,
    destroyed: AtomicBool,
    watchdog: Arc<LivenessWatchdog>,
    extensions: Extensions,
    hub: EventHub<ClientEvent>,
    client_id_slot: RwLock<String>,
    shutdown: Arc<Notify>,
    /// Woken by the watchdog task when the connection has gone stale;
    /// `drain_channel` races this against `channel.recv()` so staleness
    /// tears the channel down and falls into the reconnect ladder just
    /// like a real disconnect would.
    stale: Arc<Notify>,
}

impl BackendClient {
    pub fn new(id: ClientId, host: impl Into<String>, credentials: Credentials) -> Arc<Self> {
        let host = host.into();
        let client_id_string = id.0.clone();
        Arc::new(Self {
            http: HttpApi::new(id.clone(), host.clone(), credentials.clone()),
            id,
            host,
            credentials,
            os_type: RwLock::new(OsType::Unknown),
            ready: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            watchdog: Arc::new(LivenessWatchdog::new(DEFAULT_WS_TIMEOUT)),
            extensions: Extensions::new(),
            hub: EventHub::default(),
            client_id_slot: RwLock::new(client_id_string),
            shutdown: Arc::new(Notify::new()),
            stale: Arc::new(Notify::new()),
        })
    }

    pub fn id(&self) -> &ClientId {
        &self.id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.hub.subscribe()
    }

    pub async fn os_type(&self) -> OsType {
        *self.os_type.read().await
    }

    /// The server-assigned session id, if a `sid` rebind has been observed
    /// on the streaming channel; otherwise the client-assigned id.
    pub async fn session_client_id(&self) -> String {
        self.client_id_slot.read().await.clone()
    }

    fn guard_destroyed(&self) -> Result<(), ClientError> {
        if self.is_destroyed() {
            return Err(ClientError::Destroyed { client_id: self.id.clone() });
        }
        Ok(())
    }

    /// Health-probe until success or `max_tries` is reached, then discover
    /// OS type, probe optional features, and open the streaming channel
    /// (falling back to polling). Idempotent.
    ///
    /// Takes `self` by an owned `Arc` (the streaming and watchdog tasks it
    /// spawns each need their own strong reference) — callers that still
    /// need the client afterward pass `client.clone().init(...)`.
    pub async fn init(
        self: Arc<Self>,
        max_tries: u32,
        delay: Duration,
    ) -> Result<(), ClientError> {
        if self.is_ready() {
            return Ok(());
        }
        self.guard_destroyed()?;

        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.http.get_prompt_status().await {
                Ok(_) => break,
                Err(ClientError::Auth { .. }) => {
                    self.hub.emit(ClientEvent::AuthError);
                    return Err(ClientError::Auth { client_id: self.id.clone() });
                }
                Err(err) if attempts >= max_tries => {
                    warn!(client_id = %self.id, attempts, error = %err, "init probe exhausted");
                    return Err(ClientError::InitTimedOut {
                        client_id: self.id.clone(),
                        attempts,
                    });
                }
                Err(_) => sleep(delay).await,
            }
        }

        if let Ok(stats) = self.http.get_system_stats().await {
            let os = stats
                .get("system")
                .and_then(|s| s.get("os"))
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            *self.os_type.write().await = OsType::from_system_stats(os);
        }

        self.extensions
            .manager
            .set_supported(self.http.get_node_defs(None).await.is_ok());
        let monitor_supported = self
            .http
            .get_extensions()
            .await
            .unwrap_or_default()
            .iter()
            .any(|name| name.to_lowercase().contains("monitor"));
        self.extensions.monitor.set_supported(monitor_supported);

        if let Err(err) = self.http.set_logs_subscription(true).await {
            warn!(client_id = %self.id, error = %err, "failed to set terminal-log subscription");
        }

        let client = self.clone();
        tokio::spawn(async move { client.run_streaming().await });

        let watchdog = self.watchdog.clone();
        let shutdown = self.shutdown.clone();
        let stale = self.stale.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = watchdog.run(stale) => {},
                _ = shutdown.notified() => {},
            }
        });

        self.ready.store(true, Ordering::SeqCst);
        info!(client_id = %self.id, "backend client ready");
        Ok(())
    }

    fn ws_url(&self) -> String {
        let scheme = if self.host.starts_with("https") { "wss" } else { "ws" };
        let rest = self
            .host
            .trim_start_matches("https://")
            .trim_start_matches("http://");
        format!("{scheme}://{rest}/ws?clientId={}", self.id)
    }

    async fn run_streaming(self: Arc<Self>) {
        let mut channel = WsChannel::new(self.id.clone());
        let headers = self.credentials.as_headers();

        if channel.open(&self.ws_url(), &headers).await.is_ok() {
            self.hub.emit(ClientEvent::Connected);
            self.watchdog.touch().await;
            self.drain_channel(&mut channel).await;
        }

        // Either the initial open failed, or the channel dropped later:
        // fall back to polling while reconnect attempts continue.
        self.reconnect_with_polling(channel).await;
    }

    async fn drain_channel(&self, channel: &mut WsChannel) {
        loop {
            tokio::select! {
                _ = self.stale.notified() => {
                    self.hub.emit(ClientEvent::Disconnected {
                        message: "watchdog detected a stale connection".to_string(),
                    });
                    return;
                }
                received = channel.recv() => {
                    match received {
                        Ok(Some(item)) => {
                            self.watchdog.touch().await;
                            self.dispatch(item).await;
                        }
                        Ok(None) => {
                            self.hub.emit(ClientEvent::Disconnected {
                                message: "channel closed".to_string(),
                            });
                            return;
                        }
                        Err(err) => {
                            self.hub.emit(ClientEvent::Disconnected {
                                message: err.to_string(),
                            });
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn dispatch(&self, item: ChannelItem) {
        match item {
            ChannelItem::Event(ClientEvent::SessionRebound { client_id }) => {
                *self.client_id_slot.write().await = client_id.clone();
                self.hub.emit(ClientEvent::SessionRebound { client_id });
            }
            ChannelItem::Event(event) => self.hub.emit(event),
            ChannelItem::Named { kind, data } => {
                if let Some(event) = named_event(&kind, &data) {
                    self.hub.emit(event);
                } else {
                    debug!(kind = %kind, "unrecognized named frame");
                }
            }
        }
    }

    async fn reconnect_with_polling(self: Arc<Self>, mut channel: WsChannel) {
        channel.close(true).await;

        let mut attempt = 1u32;
        loop {
            if self.is_destroyed() {
                return;
            }
            if !reconnect::within_budget(attempt) {
                self.hub.emit(ClientEvent::ReconnectionFailed);
                break;
            }
            let delay = reconnect::delay_for_attempt(attempt, reconnect::sample_jitter());
            sleep(delay).await;

            let mut candidate = WsChannel::new(self.id.clone());
            let headers = self.credentials.as_headers();
            if candidate.open(&self.ws_url(), &headers).await.is_ok() {
                self.hub.emit(ClientEvent::Reconnected);
                self.watchdog.touch().await;
                self.drain_channel(&mut candidate).await;
                channel = candidate;
                channel.close(true).await;
                attempt = 1;
                continue;
            }
            attempt += 1;
        }

        let this = self.clone();
        crate::polling::run(
            || {
                let this = this.clone();
                async move {
                    if let Ok(QueueStatus { exec_info }) = this.http.get_prompt_status().await {
                        let remaining = exec_info
                            .get("queue_remaining")
                            .and_then(Value::as_u64)
                            .unwrap_or(0);
                        this.watchdog.touch().await;
                        this.hub.emit(ClientEvent::Status { queue_remaining: remaining });
                    }
                }
            },
            || {
                let this = this.clone();
                async move {
                    if this.is_destroyed() {
                        return true;
                    }
                    let mut candidate = WsChannel::new(this.id.clone());
                    let headers = this.credentials.as_headers();
                    if candidate.open(&this.ws_url(), &headers).await.is_ok() {
                        this.hub.emit(ClientEvent::Reconnected);
                        this.watchdog.touch().await;
                        let spawned = this.clone();
                        tokio::spawn(async move {
                            let mut candidate = candidate;
                            spawned.drain_channel(&mut candidate).await;
                            spawned.reconnect_with_polling(candidate).await;
                        });
                        true
                    } else {
                        false
                    }
                }
            },
        )
        .await;
    }

    pub async fn queue_prompt(
        &self,
        position: QueuePosition,
        workflow: &Value,
    ) -> Result<QueuePromptResponse, ClientError> {
        self.guard_destroyed()?;
        match self.http.queue_prompt(position, workflow).await {
            Ok(response) => Ok(response),
            Err(err) => {
                self.hub.emit(ClientEvent::QueueError {
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    pub async fn get_queue(&self) -> Result<QueueSnapshot, ClientError> {
        self.guard_destroyed()?;
        self.http.get_queue().await
    }

    pub async fn get_histories(&self, max_items: u64) -> Result<Value, ClientError> {
        self.guard_destroyed()?;
        self.http.get_histories(max_items).await
    }

    pub async fn get_history(&self, prompt_id: &str) -> Result<Value, ClientError> {
        self.guard_destroyed()?;
        self.http.get_history(prompt_id).await
    }

    pub async fn interrupt(&self) -> Result<(), ClientError> {
        self.guard_destroyed()?;
        self.http.interrupt().await
    }

    pub async fn free_memory(&self, unload_models: bool, free_memory: bool) -> Result<bool, ClientError> {
        self.guard_destroyed()?;
        self.http.free_memory(unload_models, free_memory).await
    }

    pub async fn get_system_stats(&self) -> Result<Value, ClientError> {
        self.guard_destroyed()?;
        self.http.get_system_stats().await
    }

    pub async fn get_checkpoints(&self) -> Result<Vec<String>, ClientError> {
        self.guard_destroyed()?;
        self.http.get_checkpoints().await
    }

    pub async fn get_loras(&self) -> Result<Vec<String>, ClientError> {
        self.guard_destroyed()?;
        self.http.get_loras().await
    }

    pub async fn get_embeddings(&self) -> Result<Vec<String>, ClientError> {
        self.guard_destroyed()?;
        self.http.get_embeddings().await
    }

    pub async fn get_sampler_info(&self) -> Result<Value, ClientError> {
        self.guard_destroyed()?;
        self.http.get_sampler_info().await
    }

    pub async fn get_node_defs(&self, node_name: Option<&str>) -> Result<Value, ClientError> {
        self.guard_destroyed()?;
        self.http.get_node_defs(node_name).await
    }

    pub async fn upload_image(
        &self,
        bytes: Vec<u8>,
        filename: impl Into<String>,
        subfolder: Option<String>,
        overwrite: Option<bool>,
    ) -> Result<UploadResult, ClientError> {
        self.guard_destroyed()?;
        self.http.upload_image(bytes, filename, subfolder, overwrite).await
    }

    pub async fn upload_mask(
        &self,
        bytes: Vec<u8>,
        filename: impl Into<String>,
        original_ref: &Value,
    ) -> Result<UploadResult, ClientError> {
        self.guard_destroyed()?;
        self.http.upload_mask(bytes, filename, original_ref).await
    }

    pub fn get_path_image(&self, info: &Value) -> Result<String, ClientError> {
        self.guard_destroyed()?;
        Ok(self.http.get_path_image(info))
    }

    pub async fn get_image(&self, info: &Value) -> Result<Vec<u8>, ClientError> {
        self.guard_destroyed()?;
        self.http.get_image(info).await
    }

    /// Idempotent teardown: stops timers, closes the streaming channel
    /// forcefully, unsubscribes extensions, marks destroyed.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.ready.store(false, Ordering::SeqCst);
        self.extensions.destroy_all();
        self.shutdown.notify_waiters();
    }
}

/// Map a named text frame to its [`ClientEvent`].
fn named_event(kind: &str, data: &Value) -> Option<ClientEvent> {
    let prompt_id = || data.get("prompt_id").and_then(Value::as_str).map(fleetcast_types::PromptId::from);

    match kind {
        "status" => Some(ClientEvent::Status {
            queue_remaining: data
                .get("status")
                .and_then(|s| s.get("exec_info"))
                .and_then(|e| e.get("queue_remaining"))
                .and_then(Value::as_u64)
                .unwrap_or(0),
        }),
        "execution_start" => prompt_id().map(|prompt_id| ClientEvent::ExecutionStart { prompt_id }),
        "progress" => prompt_id().map(|prompt_id| ClientEvent::Progress {
            prompt_id,
            node: data.get("node").and_then(Value::as_str).unwrap_or_default().to_string(),
            value: data.get("value").and_then(Value::as_u64).unwrap_or(0),
            max: data.get("max").and_then(Value::as_u64).unwrap_or(0),
        }),
        "executed" => prompt_id().map(|prompt_id| ClientEvent::Executed {
            prompt_id,
            node: data.get("node").and_then(Value::as_str).unwrap_or_default().to_string(),
            output: data.get("output").cloned().unwrap_or(Value::Null),
        }),
        "execution_cached" => prompt_id().map(|prompt_id| ClientEvent::ExecutionCached {
            prompt_id,
            nodes: data
                .get("nodes")
                .and_then(Value::as_array)
                .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default(),
        }),
        "execution_error" => prompt_id().map(|prompt_id| ClientEvent::ExecutionError {
            prompt_id,
            message: data.to_string(),
        }),
        "execution_interrupted" => {
            prompt_id().map(|prompt_id| ClientEvent::ExecutionInterrupted { prompt_id })
        }
        "execution_success" => {
            prompt_id().map(|prompt_id| ClientEvent::ExecutionSuccess { prompt_id })
        }
        "logs" => Some(ClientEvent::Terminal {
            line: data
                .get("entries")
                .and_then(Value::as_array)
                .and_then(|arr| arr.first())
                .and_then(Value::as_str)
                .map(str::to_string),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn named_event_maps_execution_start() {
        let data = json!({"prompt_id": "p1"});
        match named_event("execution_start", &data).unwrap() {
            ClientEvent::ExecutionStart { prompt_id } => assert_eq!(prompt_id.0, "p1"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn named_event_unknown_kind_is_none() {
        assert!(named_event("something_else", &json!({})).is_none());
    }

    #[tokio::test]
    async fn fresh_client_is_not_ready_or_destroyed() {
        let client = BackendClient::new(ClientId::from("c1"), "http://localhost:8188", Credentials::None);
        assert!(!client.is_ready());
        assert!(!client.is_destroyed());
    }

    #[tokio::test]
    async fn destroy_is_idempotent_and_rejects_further_operations() {
        let client = BackendClient::new(ClientId::from("c1"), "http://localhost:8188", Credentials::None);
        client.destroy();
        client.destroy();
        assert!(client.is_destroyed());
        let err = client.interrupt().await.unwrap_err();
        assert!(matches!(err, ClientError::Destroyed { .. }));
    }

    #[tokio::test]
    async fn init_probes_monitor_extension_and_subscribes_logs() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/prompt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"exec_info": {}})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/system_stats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"system": {"os": "posix"}})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/object_info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/extensions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(["custom/monitor-ui.js"])))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/internal/logs/subscribe"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = BackendClient::new(ClientId::from("c1"), server.uri(), Credentials::None);
        client.clone().init(1, Duration::from_millis(1)).await.unwrap();

        assert!(client.is_ready());
        assert!(client.extensions.monitor.is_supported());
        assert_eq!(client.os_type().await, OsType::Posix);

        let requests = server.received_requests().await.unwrap();
        assert!(requests.iter().any(|r| r.url.path() == "/internal/logs/subscribe"));
    }
}
