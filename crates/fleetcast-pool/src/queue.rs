//! The weighted job queue.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use fleetcast_client::BackendClient;
use fleetcast_types::ClientId;

use crate::error::PoolError;

/// Type-erased job outcome: `Ok` carries the caller's `T`, boxed, so one
/// queue can hold jobs of unrelated result types. `run<T>` downcasts back to
/// `T` before returning to its caller (mirroring how a panicking
/// `tokio::task::JoinHandle` carries its payload as `Box<dyn Any>`).
pub type AnyResult = Result<Box<dyn std::any::Any + Send>, String>;
pub type JobFuture = Pin<Box<dyn Future<Output = AnyResult> + Send>>;
pub type JobFn = Box<dyn Fn(Arc<BackendClient>, usize) -> JobFuture + Send + Sync>;
pub type Deliver = Box<dyn FnOnce(Result<Box<dyn std::any::Any + Send>, PoolError>) + Send>;

/// One scheduled unit of work.
pub struct JobItem {
    pub id: u64,
    pub weight: i64,
    pub include_ids: Vec<ClientId>,
    pub exclude_ids: Vec<ClientId>,
    pub attempt: u32,
    pub max_retries: u32,
    pub enable_failover: bool,
    pub retry_delay: Duration,
    pub execute: JobFn,
    pub deliver: Option<Deliver>,
}

/// Ascending-by-weight queue with a submission-order tie-break and a bound
/// on the number of enqueued jobs (default 1000).
pub struct JobQueue {
    items: VecDeque<JobItem>,
    max_size: usize,
}

impl JobQueue {
    pub fn new(max_size: usize) -> Self {
        Self { items: VecDeque::new(), max_size }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Insert before the first strictly-greater-weight item, so equal-weight
    /// items keep submission order.
    pub fn enqueue(&mut self, item: JobItem) -> Result<(), PoolError> {
        if self.items.len() >= self.max_size {
            return Err(PoolError::QueueFull { max: self.max_size });
        }
        let position = self
            .items
            .iter()
            .position(|existing| existing.weight > item.weight)
            .unwrap_or(self.items.len());
        self.items.insert(position, item);
        Ok(())
    }

    pub fn pop_front(&mut self) -> Option<JobItem> {
        self.items.pop_front()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = JobItem> + '_ {
        self.items.drain(..)
    }

    /// Remove the still-queued job with this id, if it hasn't already been
    /// dequeued for execution.
    pub fn remove(&mut self, id: u64) -> Option<JobItem> {
        let position = self.items.iter().position(|item| item.id == id)?;
        self.items.remove(position)
    }

    #[cfg(test)]
    pub fn weights(&self) -> Vec<i64> {
        self.items.iter().map(|i| i.weight).collect()
    }
}
