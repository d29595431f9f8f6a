use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{error, info, instrument, warn};

use crate::{
    execution::{CurrentTask, QueueShard},
    observability::MetricsSnapshot,
    DispatchConfig, DispatchError, DispatchEvent, DispatchKey, DispatchResult, Dispatched,
    GenerationKind, ObservabilityLayer, StartHook, Submission, Ticket, Work,
};

#[derive(Default)]
struct ShardMap {
    shards: HashMap<DispatchKey, Arc<QueueShard>>,
    closed: bool,
}

/// Routes generation work to one FIFO shard per dispatch key.
///
/// Build one at startup, share it behind an `Arc` with whatever submits
/// work, and call [`shutdown_all`](Self::shutdown_all) once on the way out.
pub struct QueueRegistry {
    shards: RwLock<ShardMap>,
    config: DispatchConfig,
    observability: ObservabilityLayer,
}

impl QueueRegistry {
    pub fn new(config: DispatchConfig) -> Self {
        let observability = ObservabilityLayer::new(config.event_capacity);
        Self {
            shards: RwLock::new(ShardMap::default()),
            config,
            observability,
        }
    }

    /// Queue work and return its ticket without waiting.
    ///
    /// Must be called from within a Tokio runtime: the first submission under
    /// a key spawns that key's worker. After shutdown the ticket resolves to
    /// [`DispatchError::Cancelled`].
    pub fn enqueue<W: Work>(&self, submission: Submission<W>) -> Ticket<W::Output> {
        let key = submission.dispatch_key().clone();
        let (task, rx) = submission.into_task(self.config.retry_policy());
        let task = Arc::new(task);
        let task_id = task.id.clone();
        let kind = task.kind;

        let accepted = match self.shard_for(&key) {
            // A worker that died after the lookup is replaced once.
            Some(shard) => shard.enqueue(task).or_else(|task| match self.shard_for(&key) {
                Some(shard) => shard.enqueue(task),
                None => Err(task),
            }),
            None => Err(task),
        };

        let position = match accepted {
            Ok(position) => {
                self.observability.record_enqueued(&task_id, &key, kind, position);
                info!(task_id = %task_id, key = %key, kind = %kind, position, "Task enqueued");
                position
            }
            Err(task) => {
                warn!(task_id = %task_id, key = %key, "Rejected task: dispatch queue is shut down");
                self.observability.record_cancelled(&task_id, kind);
                task.settle(Err(DispatchError::Cancelled));
                0
            }
        };

        Ticket::new(task_id, kind, key, position, rx)
    }

    /// Queue a submission and wait for it to settle
    pub async fn dispatch<W: Work>(&self, submission: Submission<W>) -> DispatchResult<Dispatched<W::Output>> {
        let ticket = self.enqueue(submission);
        let task_id = ticket.id().clone();
        let position = ticket.position();
        let output = ticket.wait().await?;

        Ok(Dispatched {
            task_id,
            output,
            position,
        })
    }

    /// Run `work` on the shard for `key` (shared shard when `None`)
    #[instrument(skip(self, work, on_start))]
    pub async fn submit<W: Work>(
        &self,
        kind: GenerationKind,
        work: W,
        key: Option<DispatchKey>,
        on_start: Option<StartHook>,
    ) -> DispatchResult<Dispatched<W::Output>> {
        let mut submission = Submission::new(kind, work).key(key.unwrap_or_default());
        if let Some(hook) = on_start {
            submission = submission.on_start(hook);
        }
        self.dispatch(submission).await
    }

    /// Tasks waiting to start on `key`'s shard; 0 for unknown keys
    pub fn depth(&self, key: &DispatchKey) -> usize {
        self.shards
            .read()
            .shards
            .get(key)
            .map(|shard| shard.depth())
            .unwrap_or(0)
    }

    /// Task currently executing on `key`'s shard
    pub fn current(&self, key: &DispatchKey) -> Option<CurrentTask> {
        self.shards.read().shards.get(key).and_then(|shard| shard.current())
    }

    /// Number of live shards
    pub fn shard_count(&self) -> usize {
        self.shards.read().shards.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shards.read().closed
    }

    /// Lifecycle events from every shard, starting now
    pub fn subscribe(&self) -> BroadcastStream<DispatchEvent> {
        self.observability.event_stream()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.observability.metrics().snapshot()
    }

    /// Stop every worker and settle everything they held as cancelled.
    ///
    /// Returns once all workers have exited. Later submissions are cancelled
    /// immediately.
    #[instrument(skip(self))]
    pub async fn shutdown_all(&self) {
        let shards: Vec<Arc<QueueShard>> = {
            let mut map = self.shards.write();
            map.closed = true;
            map.shards.drain().map(|(_, shard)| shard).collect()
        };

        info!(shards = shards.len(), "Shutting down dispatch shards");

        // Signal all first so shards wind down in parallel.
        for shard in &shards {
            shard.cancel();
        }
        futures::future::join_all(shards.iter().map(|shard| shard.shutdown())).await;

        info!("Dispatch shards stopped");
    }

    /// Live shard for `key`, spawning or replacing as needed; `None` once closed
    fn shard_for(&self, key: &DispatchKey) -> Option<Arc<QueueShard>> {
        {
            let map = self.shards.read();
            if map.closed {
                return None;
            }
            if let Some(shard) = map.shards.get(key).filter(|shard| !shard.is_stopped()) {
                return Some(shard.clone());
            }
        }

        // Re-check under the write lock: another producer may have won.
        let mut map = self.shards.write();
        if map.closed {
            return None;
        }
        if let Some(shard) = map.shards.get(key) {
            if !shard.is_stopped() {
                return Some(shard.clone());
            }
            error!(key = %key, "Shard worker exited unexpectedly, respawning");
        }

        let shard = Arc::new(QueueShard::spawn(key.clone(), &self.config, self.observability.clone()));
        map.shards.insert(key.clone(), shard.clone());
        Some(shard)
    }
}

impl Default for QueueRegistry {
    fn default() -> Self {
        Self::new(DispatchConfig::default())
    }
}

impl Drop for QueueRegistry {
    fn drop(&mut self) {
        // Workers settle their tasks as cancelled on their own once signalled.
        for shard in self.shards.get_mut().shards.values() {
            shard.cancel();
        }
    }
}
