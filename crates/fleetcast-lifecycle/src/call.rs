//! The prompt call lifecycle: submission, per-`promptId` event
//! correlation, and a typed terminal outcome.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use fleetcast_client::{BackendClient, ClientEvent, QueuePosition};
use fleetcast_template::PromptTemplate;
use fleetcast_types::PromptId;
use serde_json::Value;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{FailureKind, LifecycleError};
use crate::outcome::Outcome;

/// How long to wait, after all declared outputs are satisfied from cache
/// and no `execution_success` has arrived, before consulting history.
const CACHE_GRACE_WINDOW: Duration = Duration::from_millis(500);

/// How long [`CallWrapper::run_with_deadline`] waits for
/// `execution_interrupted` after calling `interrupt()` before giving up.
const CANCEL_GRACE_WINDOW: Duration = Duration::from_secs(5);

type PendingCb = Box<dyn FnMut(&PromptId) + Send>;
type StartCb = Box<dyn FnMut() + Send>;
type ProgressCb = Box<dyn FnMut(&str, u64, u64) + Send>;
type FinishedCb = Box<dyn FnMut(&Outcome) + Send>;
type FailedCb = Box<dyn FnMut(&LifecycleError) + Send>;

/// Fluent builder over one `(client, template)` prompt submission:
/// `CallWrapper(client, template).onPending/onStart/onProgress/onFinished/
/// onFailed.run()`. Each callback setter consumes and returns `Self` so
/// calls chain without an intermediate binding.
pub struct CallWrapper {
    client: Arc<BackendClient>,
    template: PromptTemplate,
    on_pending: Option<PendingCb>,
    on_start: Option<StartCb>,
    on_progress: Option<ProgressCb>,
    on_finished: Option<FinishedCb>,
    on_failed: Option<FailedCb>,
}

impl CallWrapper {
    pub fn new(client: Arc<BackendClient>, template: PromptTemplate) -> Self {
        Self {
            client,
            template,
            on_pending: None,
            on_start: None,
            on_progress: None,
            on_finished: None,
            on_failed: None,
        }
    }

    pub fn on_pending(mut self, f: impl FnMut(&PromptId) + Send + 'static) -> Self {
        self.on_pending = Some(Box::new(f));
        self
    }

    pub fn on_start(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_start = Some(Box::new(f));
        self
    }

    pub fn on_progress(mut self, f: impl FnMut(&str, u64, u64) + Send + 'static) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }

    pub fn on_finished(mut self, f: impl FnMut(&Outcome) + Send + 'static) -> Self {
        self.on_finished = Some(Box::new(f));
        self
    }

    pub fn on_failed(mut self, f: impl FnMut(&LifecycleError) + Send + 'static) -> Self {
        self.on_failed = Some(Box::new(f));
        self
    }

    /// Drive the call to completion with no cancellation deadline.
    pub async fn run(self) -> Result<Outcome, LifecycleError> {
        self.run_with_deadline(None).await
    }

    /// Drive the call to completion, calling `interrupt()` if `deadline`
    /// elapses first.
    pub async fn run_with_deadline(
        mut self,
        deadline: Option<Duration>,
    ) -> Result<Outcome, LifecycleError> {
        let workflow = self.template.finalize();
        let mut receiver = self.client.subscribe();

        let submission = self
            .client
            .queue_prompt(QueuePosition::Back, &workflow.as_value())
            .await;
        let prompt_id = match submission {
            Ok(response) => PromptId::from(response.prompt_id),
            Err(err) => {
                let failure = LifecycleError::failed(FailureKind::Submit, None, err.to_string());
                if let Some(cb) = self.on_failed.as_mut() {
                    cb(&failure);
                }
                return Err(failure);
            }
        };

        if let Some(cb) = self.on_pending.as_mut() {
            cb(&prompt_id);
        }

        let declared_outputs: BTreeMap<String, String> = self
            .template
            .output_node_ids()
            .map(|(name, node)| (name.to_string(), node.to_string()))
            .collect();

        let result = match deadline {
            None => {
                self.correlate(&prompt_id, &declared_outputs, &mut receiver)
                    .await
            }
            Some(deadline) => {
                match timeout(
                    deadline,
                    self.correlate(&prompt_id, &declared_outputs, &mut receiver),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => self.cancel(&prompt_id, &mut receiver).await,
                }
            }
        };

        match &result {
            Ok(outcome) => {
                if let Some(cb) = self.on_finished.as_mut() {
                    cb(outcome);
                }
            }
            Err(failure) => {
                if let Some(cb) = self.on_failed.as_mut() {
                    cb(failure);
                }
            }
        }
        result
    }

    /// Correlate events by `promptId` and assemble the terminal outcome.
    async fn correlate(
        &mut self,
        prompt_id: &PromptId,
        declared_outputs: &BTreeMap<String, String>,
        receiver: &mut tokio::sync::broadcast::Receiver<ClientEvent>,
    ) -> Result<Outcome, LifecycleError> {
        let mut started = false;
        let mut by_node: BTreeMap<String, Value> = BTreeMap::new();
        let mut cached_nodes: Vec<String> = Vec::new();

        loop {
            let event = match receiver.recv().await {
                Ok(event) => event,
                Err(_) => {
                    return Err(LifecycleError::failed(
                        FailureKind::StreamClosed,
                        Some(prompt_id.clone()),
                        "event stream ended before a terminal event",
                    ))
                }
            };

            if !event_prompt_id(&event).is_some_and(|id| id == prompt_id) {
                continue;
            }

            // The first `progress`/`executed` frame for this id synthesizes
            // `start` if `execution_start` never arrived.
            if !started
                && matches!(event, ClientEvent::Progress { .. } | ClientEvent::Executed { .. })
            {
                started = true;
                if let Some(cb) = self.on_start.as_mut() {
                    cb();
                }
            }

            match event {
                ClientEvent::ExecutionStart { .. } => {
                    if !started {
                        started = true;
                        if let Some(cb) = self.on_start.as_mut() {
                            cb();
                        }
                    }
                }
                ClientEvent::Progress { node, value, max, .. } => {
                    if let Some(cb) = self.on_progress.as_mut() {
                        cb(&node, value, max);
                    }
                }
                ClientEvent::Executed { node, output, .. } => {
                    by_node.insert(node, output);
                }
                ClientEvent::ExecutionCached { nodes, .. } => {
                    cached_nodes.extend(nodes);
                    let all_cached = declared_outputs
                        .values()
                        .all(|node| by_node.contains_key(node) || cached_nodes.contains(node));
                    if all_cached {
                        // Grace window for a trailing `execution_success`;
                        // proceed to history regardless of outcome.
                        let _ = timeout(CACHE_GRACE_WINDOW, wait_for_success(receiver, prompt_id)).await;
                        return finalize(&self.client, prompt_id, declared_outputs, &by_node).await;
                    }
                }
                ClientEvent::ExecutionError { message, .. } => {
                    return Err(LifecycleError::failed(
                        FailureKind::Execution,
                        Some(prompt_id.clone()),
                        message,
                    ));
                }
                ClientEvent::ExecutionInterrupted { .. } => {
                    return Err(LifecycleError::failed(
                        FailureKind::Interrupted,
                        Some(prompt_id.clone()),
                        "execution interrupted",
                    ));
                }
                ClientEvent::ExecutionSuccess { .. } => {
                    return finalize(&self.client, prompt_id, declared_outputs, &by_node).await;
                }
                _ => {}
            }
        }
    }

    async fn cancel(
        &self,
        prompt_id: &PromptId,
        receiver: &mut tokio::sync::broadcast::Receiver<ClientEvent>,
    ) -> Result<Outcome, LifecycleError> {
        if let Err(err) = self.client.interrupt().await {
            warn!(prompt_id = %prompt_id, error = %err, "interrupt call failed during cancel");
        }
        match timeout(CANCEL_GRACE_WINDOW, wait_for_interrupted(receiver, prompt_id)).await {
            Ok(()) => Err(LifecycleError::failed(
                FailureKind::Interrupted,
                Some(prompt_id.clone()),
                "cancelled",
            )),
            Err(_) => Err(LifecycleError::failed(
                FailureKind::CancelTimeout,
                Some(prompt_id.clone()),
                "no execution_interrupted within the cancel grace window",
            )),
        }
    }
}

async fn wait_for_success(receiver: &mut tokio::sync::broadcast::Receiver<ClientEvent>, prompt_id: &PromptId) {
    loop {
        if matches!(receiver.recv().await, Ok(ClientEvent::ExecutionSuccess { prompt_id: p }) if p == *prompt_id) {
            return;
        }
    }
}

async fn wait_for_interrupted(receiver: &mut tokio::sync::broadcast::Receiver<ClientEvent>, prompt_id: &PromptId) {
    loop {
        if matches!(receiver.recv().await, Ok(ClientEvent::ExecutionInterrupted { prompt_id: p }) if p == *prompt_id) {
            return;
        }
    }
}

async fn finalize(
    client: &Arc<BackendClient>,
    prompt_id: &PromptId,
    declared_outputs: &BTreeMap<String, String>,
    by_node: &BTreeMap<String, Value>,
) -> Result<Outcome, LifecycleError> {
    let mut outputs = BTreeMap::new();
    let mut missing = Vec::new();

    for (name, node) in declared_outputs {
        match by_node.get(node) {
            Some(value) => {
                outputs.insert(name.clone(), value.clone());
            }
            None => missing.push((name.clone(), node.clone())),
        }
    }

    if !missing.is_empty() {
        let history = client.get_history(&prompt_id.0).await.ok();
        missing.retain(|(name, node)| {
            let found = history
                .as_ref()
                .and_then(|h| h.get(&prompt_id.0))
                .and_then(|h| h.get("outputs"))
                .and_then(|o| o.get(node))
                .cloned();
            if let Some(value) = found {
                outputs.insert(name.clone(), value);
                false
            } else {
                true
            }
        });
    }

    if !missing.is_empty() {
        debug!(prompt_id = %prompt_id, ?missing, "declared outputs missing after history lookup");
        return Err(LifecycleError::failed(
            FailureKind::Incomplete,
            Some(prompt_id.clone()),
            format!("missing outputs: {missing:?}"),
        ));
    }

    Ok(Outcome { outputs })
}

fn event_prompt_id(event: &ClientEvent) -> Option<&PromptId> {
    match event {
        ClientEvent::ExecutionStart { prompt_id }
        | ClientEvent::Progress { prompt_id, .. }
        | ClientEvent::Executed { prompt_id, .. }
        | ClientEvent::ExecutionCached { prompt_id, .. }
        | ClientEvent::ExecutionError { prompt_id, .. }
        | ClientEvent::ExecutionInterrupted { prompt_id }
        | ClientEvent::ExecutionSuccess { prompt_id } => Some(prompt_id),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetcast_types::{Credentials, Workflow};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_against(host: &str) -> Arc<BackendClient> {
        BackendClient::new(fleetcast_types::ClientId::from("test-client"), host, Credentials::None)
    }

    fn declared(name: &str, node: &str) -> BTreeMap<String, String> {
        BTreeMap::from([(name.to_string(), node.to_string())])
    }

    #[test]
    fn event_prompt_id_extracts_from_lifecycle_variants() {
        let id = PromptId::from("p1");
        let event = ClientEvent::ExecutionSuccess { prompt_id: id.clone() };
        assert_eq!(event_prompt_id(&event), Some(&id));
        assert_eq!(event_prompt_id(&ClientEvent::Connected), None);
    }

    #[tokio::test]
    async fn finalize_assembles_outputs_already_buffered() {
        let server = MockServer::start().await;
        let client = client_against(&server.uri());
        let prompt_id = PromptId::from("p1");
        let mut by_node = BTreeMap::new();
        by_node.insert("9".to_string(), json!({"images": ["a.png"]}));

        let outcome = finalize(&client, &prompt_id, &declared("images", "9"), &by_node)
            .await
            .unwrap();
        assert_eq!(outcome.get("images"), Some(&json!({"images": ["a.png"]})));
    }

    #[tokio::test]
    async fn finalize_falls_back_to_history_when_buffer_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/history/p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "p1": {"outputs": {"9": {"images": ["from-history.png"]}}}
            })))
            .mount(&server)
            .await;

        let client = client_against(&server.uri());
        let prompt_id = PromptId::from("p1");
        let outcome = finalize(&client, &prompt_id, &declared("images", "9"), &BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(outcome.get("images"), Some(&json!({"images": ["from-history.png"]})));
    }

    #[tokio::test]
    async fn finalize_fails_incomplete_when_history_also_lacks_output(
    ) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/history/p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"p1": {"outputs": {}}})))
            .mount(&server)
            .await;

        let client = client_against(&server.uri());
        let prompt_id = PromptId::from("p1");
        let err = finalize(&client, &prompt_id, &declared("images", "9"), &BTreeMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(&FailureKind::Incomplete));
    }

    #[tokio::test]
    async fn run_surfaces_submit_failure_on_non_2xx_queue_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/prompt"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = client_against(&server.uri());
        let mut workflow = Workflow::new();
        workflow.insert_raw("4", json!({"class_type": "CheckpointLoaderSimple", "inputs": {}}));
        let template = PromptTemplate::new(&workflow, Vec::<String>::new(), Vec::<String>::new());

        let err = CallWrapper::new(client, template).run().await.unwrap_err();
        assert_eq!(err.kind(), Some(&FailureKind::Submit));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_times_out_without_an_interrupted_event() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/interrupt"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = client_against(&server.uri());
        let mut receiver = client.subscribe();
        let prompt_id = PromptId::from("p1");

        let wrapper = CallWrapper::new(client.clone(), PromptTemplate::new(&Workflow::new(), Vec::<String>::new(), Vec::<String>::new()));
        let cancel = tokio::spawn(async move {
            tokio::time::advance(CANCEL_GRACE_WINDOW + Duration::from_millis(1)).await;
        });
        let result = wrapper.cancel(&prompt_id, &mut receiver).await;
        cancel.await.unwrap();
        assert_eq!(result.unwrap_err().kind(), Some(&FailureKind::CancelTimeout));
    }
}
