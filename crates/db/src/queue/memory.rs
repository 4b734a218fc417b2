use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use pixelforge_core::types::DbId;
use tokio::time::Instant;

use super::{Delivery, QueueError, RetryPolicy, TaskMessage, TaskQueue};

#[derive(Debug, Clone)]
struct Entry {
    id: DbId,
    message: TaskMessage,
    /// Claims so far, settled or not.
    attempts: u32,
    ready_at: Instant,
}

#[derive(Default)]
struct Inner {
    next_id: DbId,
    ready: VecDeque<Entry>,
    in_flight: BTreeMap<DbId, TaskMessage>,
    dead: Vec<TaskMessage>,
}

impl Inner {
    /// Put back an unsuccessful delivery: retry after backoff, or
    /// dead-letter once its attempts are used up.
    fn give_back(&mut self, mut entry: Entry, policy: &RetryPolicy) {
        self.in_flight.remove(&entry.id);
        if entry.attempts >= policy.max_attempts {
            tracing::error!(
                task_id = entry.id,
                attempts = entry.attempts,
                "Task exhausted its attempts, dead-lettered",
            );
            self.dead.push(entry.message);
        } else {
            entry.ready_at = Instant::now() + policy.backoff(entry.attempts);
            self.ready.push_back(entry);
        }
    }
}

/// In-process [`TaskQueue`] with the same settle semantics as the Postgres
/// queue, including the attempt charged to a dropped delivery.
#[derive(Clone)]
pub struct MemoryTaskQueue {
    inner: Arc<Mutex<Inner>>,
    policy: RetryPolicy,
}

impl MemoryTaskQueue {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            policy,
        }
    }

    /// Tasks waiting to be claimed, including ones still backing off.
    pub fn len(&self) -> usize {
        self.inner.lock().ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Claimed deliveries not yet settled.
    pub fn in_flight(&self) -> usize {
        self.inner.lock().in_flight.len()
    }

    pub fn dead_letters(&self) -> Vec<TaskMessage> {
        self.inner.lock().dead.clone()
    }
}

impl Default for MemoryTaskQueue {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn enqueue(&self, message: &TaskMessage) -> Result<DbId, QueueError> {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.ready.push_back(Entry {
            id,
            message: message.clone(),
            attempts: 0,
            ready_at: Instant::now(),
        });
        Ok(id)
    }

    async fn dequeue(&self) -> Result<Option<Box<dyn Delivery>>, QueueError> {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        let Some(pos) = inner.ready.iter().position(|e| e.ready_at <= now) else {
            return Ok(None);
        };
        let Some(mut entry) = inner.ready.remove(pos) else {
            return Ok(None);
        };
        entry.attempts += 1;
        inner.in_flight.insert(entry.id, entry.message.clone());
        Ok(Some(Box::new(MemoryDelivery {
            inner: Arc::clone(&self.inner),
            policy: self.policy,
            entry,
            settled: false,
        })))
    }

    async fn has_live_task(&self, message: &TaskMessage) -> Result<bool, QueueError> {
        let inner = self.inner.lock();
        Ok(inner.ready.iter().any(|e| &e.message == message)
            || inner.in_flight.values().any(|m| m == message))
    }

    async fn dead_letter_count(&self) -> Result<i64, QueueError> {
        Ok(self.inner.lock().dead.len() as i64)
    }
}

struct MemoryDelivery {
    inner: Arc<Mutex<Inner>>,
    policy: RetryPolicy,
    entry: Entry,
    settled: bool,
}

#[async_trait]
impl Delivery for MemoryDelivery {
    fn message(&self) -> &TaskMessage {
        &self.entry.message
    }

    fn attempt(&self) -> u32 {
        self.entry.attempts
    }

    fn max_attempts(&self) -> u32 {
        self.policy.max_attempts
    }

    async fn ack(self: Box<Self>) -> Result<(), QueueError> {
        let mut this = self;
        this.settled = true;
        this.inner.lock().in_flight.remove(&this.entry.id);
        Ok(())
    }

    async fn nack(self: Box<Self>) -> Result<(), QueueError> {
        let mut this = self;
        this.settled = true;
        let entry = this.entry.clone();
        this.inner.lock().give_back(entry, &this.policy);
        Ok(())
    }
}

impl Drop for MemoryDelivery {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!(
                task_id = self.entry.id,
                attempt = self.entry.attempts,
                "Delivery dropped unsettled, counting it as a failed attempt",
            );
            let entry = self.entry.clone();
            self.inner.lock().give_back(entry, &self.policy);
        }
    }
}
