//! The fleet dispatcher: selection, the background job loop, and
//! failover. A command loop owns one `Arc`-shared state object with a
//! background task per concern; selection itself (not just submission)
//! can block, so the loop condition-waits on an explicit job queue rather
//! than draining a single command channel.

use std::any::Any;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use fleetcast_client::{BackendClient, ClientEvent};
use fleetcast_types::ClientId;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::PoolError;
use crate::events::DispatcherEvent;
use crate::queue::{Deliver, JobFn, JobItem};
use crate::selection::{self, Candidate, SelectionMode};
use crate::state::PoolState;

const STATUS_TICK: Duration = Duration::from_secs(5);
const DEFAULT_MAX_QUEUE_SIZE: usize = 1000;
const DEFAULT_INIT_TRIES: u32 = 5;
const DEFAULT_INIT_DELAY: Duration = Duration::from_millis(500);

/// Per-job filter restricting which clients a job may run on.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub include_ids: Vec<ClientId>,
    pub exclude_ids: Vec<ClientId>,
}

/// Per-job failover policy. `None` fields take their defaults: failover
/// enabled, `maxRetries = |onlineClients|`, `retryDelay = 1s`.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub enable_failover: Option<bool>,
    pub max_retries: Option<u32>,
    pub retry_delay: Option<Duration>,
    /// Bound on how long a job may wait for an eligible client before
    /// `run` gives up and returns [`PoolError::NoClient`]. `None` waits
    /// indefinitely.
    pub select_timeout: Option<Duration>,
}

/// Handle to a running fleet dispatcher. Cloning shares the same
/// background loop and client set.
#[derive(Clone)]
pub struct Pool {
    state: Arc<PoolState>,
    loop_handle: Arc<JoinHandle<()>>,
}

impl Pool {
    pub fn new(mode: SelectionMode) -> Self {
        Self::with_max_queue_size(mode, DEFAULT_MAX_QUEUE_SIZE)
    }

    pub fn with_max_queue_size(mode: SelectionMode, max_queue_size: usize) -> Self {
        let state = PoolState::new(mode, max_queue_size);
        let loop_handle = tokio::spawn(Self::run_loop(state.clone()));
        Self { state, loop_handle: Arc::new(loop_handle) }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DispatcherEvent> {
        self.state.hub.subscribe()
    }

    /// Append a client, spawning its background initialization and
    /// per-client event listener. Returns its dispatcher index. `added` is
    /// emitted synchronously; `ready` follows once `init()` and the first
    /// status frame both land.
    pub async fn add_client(&self, client: Arc<BackendClient>) -> usize {
        let index = {
            let mut slots = self.state.slots.write().await;
            let index = slots.len();
            slots.push(crate::state::ClientSlot::new(client.clone()));
            index
        };
        self.state.hub.emit(DispatcherEvent::Added { index });

        let listener_state = self.state.clone();
        let listener_rx = client.subscribe();
        tokio::spawn(Self::watch_client(listener_state, index, listener_rx));

        let init_state = self.state.clone();
        let init_client = client.clone();
        tokio::spawn(async move {
            match init_client.clone().init(DEFAULT_INIT_TRIES, DEFAULT_INIT_DELAY).await {
                Ok(()) => {
                    let already_online = {
                        let slots = init_state.slots.read().await;
                        slots[index].init_done.store(true, Ordering::SeqCst);
                        slots[index].online.load(Ordering::SeqCst)
                    };
                    if already_online {
                        Self::mark_ready(&init_state, index).await;
                    }
                    init_state.notify.notify_waiters();
                }
                Err(err) => {
                    warn!(index, error = %err, "client failed to initialize; left offline");
                }
            }
        });

        index
    }

    /// Emit `Ready` for `index` the first time it is both initialized and
    /// online; idempotent across later reconnects.
    async fn mark_ready(state: &Arc<PoolState>, index: usize) {
        let should_emit = {
            let slots = state.slots.read().await;
            let Some(slot) = slots.get(index) else { return };
            !slot.ready_emitted.swap(true, Ordering::SeqCst)
        };
        if should_emit {
            state.hub.emit(DispatcherEvent::Ready { index });
        }
    }

    pub async fn remove_client_by_index(&self, index: usize) {
        let client = {
            let slots = self.state.slots.read().await;
            match slots.get(index) {
                Some(slot) => {
                    slot.online.store(false, Ordering::SeqCst);
                    slot.locked.store(false, Ordering::SeqCst);
                    slot.client.clone()
                }
                None => return,
            }
        };
        client.destroy();
        self.state.hub.emit(DispatcherEvent::Removed { index });
        self.state.notify.notify_waiters();
    }

    pub async fn remove_client(&self, id: &ClientId) -> Result<(), PoolError> {
        let index = {
            let slots = self.state.slots.read().await;
            slots.iter().position(|s| &s.id == id)
        };
        match index {
            Some(index) => {
                self.remove_client_by_index(index).await;
                Ok(())
            }
            None => Err(PoolError::UnknownClient(id.clone())),
        }
    }

    /// Swap the selection policy; in-flight jobs are unaffected.
    pub async fn change_mode(&self, mode: SelectionMode) {
        *self.state.mode.write().await = mode;
        self.state.hub.emit(DispatcherEvent::ChangeMode { mode });
        self.state.notify.notify_waiters();
    }

    /// Schedule one job and await its eventual typed result.
    pub async fn run<T, F, Fut>(
        &self,
        job_fn: F,
        weight: i64,
        filter: JobFilter,
        opts: RunOptions,
    ) -> Result<T, PoolError>
    where
        F: Fn(Arc<BackendClient>, usize) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<T, PoolError>> + Send + 'static,
        T: Send + 'static,
    {
        if self.state.destroyed.load(Ordering::SeqCst) {
            return Err(PoolError::Destroyed);
        }

        let online_count = {
            let slots = self.state.slots.read().await;
            slots.iter().filter(|s| s.online.load(Ordering::SeqCst)).count() as u32
        };

        let (tx, rx) = tokio::sync::oneshot::channel();
        let job_fn = Arc::new(job_fn);
        let execute: JobFn = {
            let job_fn = job_fn.clone();
            Box::new(move |client, index| {
                let job_fn = job_fn.clone();
                Box::pin(async move {
                    job_fn(client, index)
                        .await
                        .map(|value| Box::new(value) as Box<dyn Any + Send>)
                        .map_err(|err| err.to_string())
                })
            })
        };
        let deliver: Deliver = Box::new(move |result| {
            let _ = tx.send(result);
        });

        let job_id = self.state.job_counter.fetch_add(1, Ordering::SeqCst);
        let item = JobItem {
            id: job_id,
            weight,
            include_ids: filter.include_ids,
            exclude_ids: filter.exclude_ids,
            attempt: 0,
            max_retries: opts.max_retries.unwrap_or(online_count),
            enable_failover: opts.enable_failover.unwrap_or(true),
            retry_delay: opts.retry_delay.unwrap_or(Duration::from_secs(1)),
            execute,
            deliver: Some(deliver),
        };

        {
            let mut queue = self.state.queue.lock().await;
            queue.enqueue(item)?;
        }
        self.state.hub.emit(DispatcherEvent::AddJob);
        self.state.notify.notify_waiters();

        let outcome = match opts.select_timeout {
            None => rx.await,
            Some(timeout) => match tokio::time::timeout(timeout, &mut rx).await {
                Ok(received) => received,
                Err(_elapsed) => {
                    let still_queued = {
                        let mut queue = self.state.queue.lock().await;
                        queue.remove(job_id).is_some()
                    };
                    if still_queued {
                        return Err(PoolError::NoClient);
                    }
                    // Already claimed by a client between the timeout firing
                    // and the queue lock above; let it run to completion.
                    rx.await
                }
            },
        };

        match outcome {
            Ok(Ok(value)) => Ok(*value.downcast::<T>().expect("pool job result type mismatch")),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(PoolError::Destroyed),
        }
    }

    /// Run each job in turn, collecting every result; fails fast on the
    /// first unrecoverable error.
    pub async fn batch<T, F, Fut>(
        &self,
        job_fns: Vec<F>,
        weight: i64,
        filter: JobFilter,
    ) -> Result<Vec<T>, PoolError>
    where
        F: Fn(Arc<BackendClient>, usize) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<T, PoolError>> + Send + 'static,
        T: Send + 'static,
    {
        let mut results = Vec::with_capacity(job_fns.len());
        for job_fn in job_fns {
            results.push(self.run(job_fn, weight, filter.clone(), RunOptions::default()).await?);
        }
        Ok(results)
    }

    /// Cancel every pending job, destroy every client, and stop the
    /// background loop.
    pub async fn destroy(&self) {
        self.state.destroyed.store(true, Ordering::SeqCst);

        let pending: Vec<JobItem> = {
            let mut queue = self.state.queue.lock().await;
            queue.drain().collect()
        };
        for mut item in pending {
            if let Some(deliver) = item.deliver.take() {
                deliver(Err(PoolError::Destroyed));
            }
        }

        let slots = self.state.slots.read().await;
        for slot in slots.iter() {
            slot.client.destroy();
            slot.online.store(false, Ordering::SeqCst);
        }
        drop(slots);

        self.state.notify.notify_waiters();
        self.loop_handle.abort();
    }

    /// One per-client event listener, driving the slot's `locked`/`online`/
    /// `queue_depth` transitions. Runs for the lifetime of the client's
    /// subscription.
    async fn watch_client(state: Arc<PoolState>, index: usize, mut rx: broadcast::Receiver<ClientEvent>) {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return,
            };

            let mode = *state.mode.read().await;
            let mut became_online = false;
            {
                let slots = state.slots.read().await;
                let Some(slot) = slots.get(index) else { return };
                match &event {
                    ClientEvent::Connected | ClientEvent::Reconnected => {
                        became_online = !slot.online.swap(true, Ordering::SeqCst);
                        if matches!(event, ClientEvent::Reconnected) {
                            slot.locked.store(false, Ordering::SeqCst);
                        }
                    }
                    ClientEvent::Disconnected { .. } | ClientEvent::ReconnectionFailed => {
                        slot.online.store(false, Ordering::SeqCst);
                        slot.locked.store(false, Ordering::SeqCst);
                    }
                    ClientEvent::Status { queue_remaining } => {
                        became_online = !slot.online.swap(true, Ordering::SeqCst);
                        slot.queue_depth.store(*queue_remaining, Ordering::SeqCst);
                        if mode != SelectionMode::PickZero {
                            slot.locked.store(false, Ordering::SeqCst);
                        }
                        if *queue_remaining > 0 {
                            state.hub.emit(DispatcherEvent::HaveJob);
                        } else {
                            state.hub.emit(DispatcherEvent::Idle);
                        }
                    }
                    ClientEvent::ExecutionSuccess { .. }
                    | ClientEvent::ExecutionError { .. }
                    | ClientEvent::ExecutionInterrupted { .. }
                    | ClientEvent::QueueError { .. } => {
                        slot.locked.store(false, Ordering::SeqCst);
                    }
                    _ => {}
                }
            }

            // `init()` may still be in flight the first time a status frame
            // arrives; `mark_ready` only actually emits once both this and
            // `init_done` are true.
            if became_online {
                let init_done = {
                    let slots = state.slots.read().await;
                    slots.get(index).map(|s| s.init_done.load(Ordering::SeqCst)).unwrap_or(false)
                };
                if init_done {
                    Self::mark_ready(&state, index).await;
                }
            }

            state.hub.emit(DispatcherEvent::Client { index, event });
            state.notify.notify_waiters();
        }
    }

    /// Try to find and atomically claim an eligible client for `item`.
    async fn select_client(
        state: &Arc<PoolState>,
        item: &JobItem,
    ) -> Option<(usize, ClientId, Arc<BackendClient>)> {
        let slots = state.slots.read().await;
        let candidates: Vec<Candidate> = slots
            .iter()
            .enumerate()
            .map(|(index, slot)| Candidate {
                index,
                id: slot.id.clone(),
                queue_depth: slot.queue_depth.load(Ordering::SeqCst),
                locked: slot.locked.load(Ordering::SeqCst),
                online: slot.online.load(Ordering::SeqCst),
            })
            .collect();

        let mode = *state.mode.read().await;
        let chosen = match mode {
            SelectionMode::PickZero => {
                selection::pick_zero(&candidates, &item.include_ids, &item.exclude_ids)
            }
            SelectionMode::PickLowest => {
                selection::pick_lowest(&candidates, &item.include_ids, &item.exclude_ids)
            }
            SelectionMode::PickRoutine => {
                let mut cursor = state.routine_cursor.load(Ordering::SeqCst);
                let picked = selection::pick_routine(
                    &candidates,
                    &item.include_ids,
                    &item.exclude_ids,
                    &mut cursor,
                );
                state.routine_cursor.store(cursor, Ordering::SeqCst);
                picked
            }
        }?;

        let slot = &slots[chosen];
        // Claim atomically: if another concurrent selection beat us to this
        // slot since the snapshot above, back off and let the caller retry.
        slot.locked
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        Some((chosen, slot.id.clone(), slot.client.clone()))
    }

    /// The background job loop. The popped job is held locally (never
    /// dropped) until either a client is claimed or it is re-enqueued, so
    /// it is never lost between dequeue and selection.
    async fn run_loop(state: Arc<PoolState>) {
        let mut status_tick = tokio::time::interval(STATUS_TICK);
        loop {
            if state.destroyed.load(Ordering::SeqCst) {
                return;
            }

            let mut item = {
                let mut queue = state.queue.lock().await;
                queue.pop_front()
            };

            let Some(job) = item.take() else {
                tokio::select! {
                    _ = state.notify.notified() => {}
                    _ = status_tick.tick() => {}
                }
                continue;
            };

            let Some((index, client_id, client)) = Self::select_client(&state, &job).await else {
                let mut queue = state.queue.lock().await;
                let _ = queue.enqueue(job);
                drop(queue);
                tokio::select! {
                    _ = state.notify.notified() => {}
                    _ = status_tick.tick() => {}
                }
                continue;
            };

            // Spawn so the loop can keep selecting for other clients while
            // this job runs; multiple jobs run in parallel this way.
            tokio::spawn(Self::execute_job(state.clone(), job, index, client_id, client));
        }
    }

    async fn execute_job(
        state: Arc<PoolState>,
        mut job: JobItem,
        index: usize,
        client_id: ClientId,
        client: Arc<BackendClient>,
    ) {
        let outcome = (job.execute)(client, index).await;

        // The event-driven unlock in `watch_client` races with this, but a
        // job's own future only resolves after one of the same terminal
        // events fires, so clearing here too is a harmless idempotent
        // backstop rather than a second source of truth.
        {
            let slots = state.slots.read().await;
            if let Some(slot) = slots.get(index) {
                slot.locked.store(false, Ordering::SeqCst);
            }
        }
        state.notify.notify_waiters();

        match outcome {
            Ok(value) => {
                if let Some(deliver) = job.deliver.take() {
                    deliver(Ok(value));
                }
            }
            Err(message) => {
                job.exclude_ids.push(client_id.clone());
                let remaining_online = {
                    let slots = state.slots.read().await;
                    slots
                        .iter()
                        .filter(|s| s.online.load(Ordering::SeqCst) && !job.exclude_ids.contains(&s.id))
                        .count()
                };
                let would_exceed = job.attempt + 1 > job.max_retries;

                if !job.enable_failover || would_exceed || remaining_online == 0 {
                    state.hub.emit(DispatcherEvent::ExecutionError {
                        client_id,
                        will_retry: false,
                        attempt: job.attempt,
                        max_retries: job.max_retries,
                    });
                    if let Some(deliver) = job.deliver.take() {
                        deliver(Err(PoolError::Execution(message)));
                    }
                } else {
                    job.attempt += 1;
                    state.hub.emit(DispatcherEvent::ExecutionError {
                        client_id,
                        will_retry: true,
                        attempt: job.attempt,
                        max_retries: job.max_retries,
                    });
                    let retry_delay = job.retry_delay;
                    let state = state.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(retry_delay).await;
                        let mut queue = state.queue.lock().await;
                        let _ = queue.enqueue(job);
                        drop(queue);
                        state.notify.notify_waiters();
                    });
                }
            }
        }
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        if Arc::strong_count(&self.loop_handle) == 1 && !self.state.destroyed.load(Ordering::Relaxed) {
            info!("last Pool handle dropped without destroy(); background loop left running");
        }
    }
}
