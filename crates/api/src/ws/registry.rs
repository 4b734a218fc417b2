//! The Live Connection Registry.
//!
//! A per-process table from job id to the connections subscribed to that
//! job. All mutation happens under one short, synchronous lock that is never
//! held across an await: subscribe/unsubscribe from connection lifecycle and
//! `deliver` from the fan-out listener are serialized against each other, so
//! a connection cannot be added or removed halfway through a delivery sweep.
//!
//! Outbound frames go through each connection's unbounded channel, which
//! keeps `deliver` non-blocking. A send only fails once the connection's
//! writer task is gone, and that connection is evicted on the spot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::Message;
use parking_lot::Mutex;
use pixelforge_core::types::DbId;
use tokio::sync::mpsc;

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// Process-unique connection id.
pub type ConnId = u64;

#[derive(Default)]
pub struct LiveRegistry {
    next_conn_id: AtomicU64,
    jobs: Mutex<HashMap<DbId, HashMap<ConnId, WsSender>>>,
}

impl LiveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a connection id.
    pub fn next_conn_id(&self) -> ConnId {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Add `conn_id` to the subscribers of `job_id`. Re-subscribing replaces
    /// the sender.
    pub fn subscribe(&self, job_id: DbId, conn_id: ConnId, sender: WsSender) {
        self.jobs
            .lock()
            .entry(job_id)
            .or_default()
            .insert(conn_id, sender);
    }

    /// Remove a subscription; the job's entry is dropped once it is empty.
    pub fn unsubscribe(&self, job_id: DbId, conn_id: ConnId) {
        let mut jobs = self.jobs.lock();
        if let Some(conns) = jobs.get_mut(&job_id) {
            conns.remove(&conn_id);
            if conns.is_empty() {
                jobs.remove(&job_id);
            }
        }
    }

    /// Open a connection subscribed to `job_id`.
    ///
    /// Returns a guard that unsubscribes when dropped, plus the receiver the
    /// connection's writer task drains.
    pub fn register(
        self: &Arc<Self>,
        job_id: DbId,
    ) -> (Subscription, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn_id = self.next_conn_id();
        self.subscribe(job_id, conn_id, tx.clone());
        let guard = Subscription {
            registry: Arc::clone(self),
            job_id,
            conn_id,
            sender: tx,
        };
        (guard, rx)
    }

    /// Forward `message` to every connection subscribed to `job_id`.
    ///
    /// Connections whose channel is closed are evicted. Returns the number
    /// of connections the message reached.
    pub fn deliver(&self, job_id: DbId, message: Message) -> usize {
        let mut jobs = self.jobs.lock();
        let Some(conns) = jobs.get_mut(&job_id) else {
            return 0;
        };

        let before = conns.len();
        conns.retain(|conn_id, sender| {
            let alive = sender.send(message.clone()).is_ok();
            if !alive {
                tracing::debug!(job_id, conn_id, "Evicting closed connection");
            }
            alive
        });
        let delivered = conns.len();

        if conns.is_empty() {
            jobs.remove(&job_id);
        }
        if delivered < before {
            tracing::debug!(job_id, evicted = before - delivered, "Evicted connections");
        }
        delivered
    }

    /// Number of connections subscribed to `job_id`.
    pub fn subscriber_count(&self, job_id: DbId) -> usize {
        self.jobs.lock().get(&job_id).map_or(0, HashMap::len)
    }

    /// Number of job ids with at least one subscriber.
    pub fn job_count(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Total number of live connections.
    pub fn connection_count(&self) -> usize {
        self.jobs.lock().values().map(HashMap::len).sum()
    }

    /// Send a Ping frame to every connection.
    pub fn ping_all(&self) {
        let jobs = self.jobs.lock();
        for sender in jobs.values().flat_map(HashMap::values) {
            let _ = sender.send(Message::Ping(Bytes::new()));
        }
    }

    /// Send a Close frame to every connection, then clear the table.
    pub fn shutdown_all(&self) {
        let mut jobs = self.jobs.lock();
        let mut count = 0;
        for sender in jobs.values().flat_map(HashMap::values) {
            let _ = sender.send(Message::Close(None));
            count += 1;
        }
        jobs.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }
}

/// One connection's subscription. Dropping it unsubscribes.
pub struct Subscription {
    registry: Arc<LiveRegistry>,
    job_id: DbId,
    conn_id: ConnId,
    sender: WsSender,
}

impl Subscription {
    pub fn job_id(&self) -> DbId {
        self.job_id
    }

    pub fn conn_id(&self) -> ConnId {
        self.conn_id
    }

    /// Queue a frame for this connection only, behind anything the registry
    /// already delivered to it. Returns false once the writer is gone.
    pub fn send(&self, message: Message) -> bool {
        self.sender.send(message).is_ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.unsubscribe(self.job_id, self.conn_id);
    }
}
