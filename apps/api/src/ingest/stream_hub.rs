//! In-process fan-out of run progress to SSE subscribers.
//!
//! Each run gets a broadcast channel on first subscribe. A run's channel is closed when
//! the run reaches a terminal status, which ends every open event stream for it.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

const DEFAULT_CAPACITY: usize = 256;

/// Per-run broadcast channels. Cloning shares the same channels.
#[derive(Clone)]
pub struct StreamHub {
    runs: Arc<RwLock<HashMap<Uuid, broadcast::Sender<Value>>>>,
    capacity: usize,
}

impl StreamHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// `capacity` bounds how far a slow subscriber may fall behind before it lags.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            runs: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Events for runs nobody watches are dropped.
    pub async fn publish(&self, run_id: Uuid, event: Value) {
        if let Some(tx) = self.runs.read().await.get(&run_id) {
            let _ = tx.send(event);
        }
    }

    pub async fn subscribe(&self, run_id: Uuid) -> broadcast::Receiver<Value> {
        let mut runs = self.runs.write().await;
        runs.entry(run_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Drops the run's channel. Subscribers drain what is buffered, then see the end.
    pub async fn close(&self, run_id: Uuid) {
        self.runs.write().await.remove(&run_id);
    }

    /// Drops channels whose subscribers have all gone.
    pub async fn cleanup(&self) {
        self.runs.write().await.retain(|_, tx| tx.receiver_count() > 0);
    }

    pub async fn watched_runs(&self) -> usize {
        self.runs.read().await.len()
    }
}

impl Default for StreamHub {
    fn default() -> Self {
        Self::new()
    }
}
