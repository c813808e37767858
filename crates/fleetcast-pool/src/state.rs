//! Dispatcher-owned per-client bookkeeping.
//!
//! `locked`/`online`/`queue_depth` here are the dispatcher's own view of a
//! client, distinct from [`fleetcast_client::BackendClient`]'s internal
//! `ready`/`destroyed` flags: a client can be `ready` from the client
//! crate's perspective yet `locked` from the pool's, because it currently
//! owns an in-flight job from this dispatcher.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize};
use std::sync::Arc;

use fleetcast_client::BackendClient;
use fleetcast_types::{ClientId, EventHub};
use tokio::sync::{Mutex, Notify, RwLock};

use crate::events::DispatcherEvent;
use crate::queue::JobQueue;
use crate::selection::SelectionMode;

/// One dispatcher-tracked client slot.
pub struct ClientSlot {
    pub id: ClientId,
    pub client: Arc<BackendClient>,
    pub queue_depth: AtomicU64,
    pub locked: AtomicBool,
    pub online: AtomicBool,
    /// Set once `init()` has returned successfully. `online`/`ready_emitted`
    /// only turn on once this is also true.
    pub init_done: AtomicBool,
    /// Set once a `Ready` event has been emitted for this slot, so a later
    /// reconnect never re-emits it.
    pub ready_emitted: AtomicBool,
}

impl ClientSlot {
    pub fn new(client: Arc<BackendClient>) -> Self {
        Self {
            id: client.id().clone(),
            client,
            queue_depth: AtomicU64::new(0),
            locked: AtomicBool::new(false),
            online: AtomicBool::new(false),
            init_done: AtomicBool::new(false),
            ready_emitted: AtomicBool::new(false),
        }
    }
}

/// Shared state behind every [`crate::Pool`] handle and its background
/// tasks: one `Arc`-shared state object a handle and its spawned loop both
/// hold, rather than message-passing every read.
pub struct PoolState {
    pub slots: RwLock<Vec<ClientSlot>>,
    pub mode: RwLock<SelectionMode>,
    pub routine_cursor: AtomicUsize,
    pub queue: Mutex<JobQueue>,
    pub notify: Notify,
    pub destroyed: AtomicBool,
    pub hub: EventHub<DispatcherEvent>,
    /// Monotonic source for `JobItem::id`, so a timed-out selection can find
    /// and remove its own still-queued job without ambiguity.
    pub job_counter: AtomicU64,
}

impl PoolState {
    pub fn new(mode: SelectionMode, max_queue_size: usize) -> Arc<Self> {
        Arc::new(Self {
            slots: RwLock::new(Vec::new()),
            mode: RwLock::new(mode),
            routine_cursor: AtomicUsize::new(0),
            queue: Mutex::new(JobQueue::new(max_queue_size)),
            notify: Notify::new(),
            destroyed: AtomicBool::new(false),
            hub: EventHub::default(),
            job_counter: AtomicU64::new(0),
        })
    }
}
