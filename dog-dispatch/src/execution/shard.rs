use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    execution::{retry::saturating_millis, RetryDecision},
    task::Task,
    BackendError, DispatchConfig, DispatchError, DispatchKey, GenerationKind, ObservabilityLayer, TaskId,
};

/// Task a shard worker is executing right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentTask {
    pub task_id: TaskId,
    pub kind: GenerationKind,
    pub started_at: DateTime<Utc>,
}

/// Counters shared between producers and the worker
#[derive(Debug, Default)]
struct ShardState {
    /// Enqueued, not yet picked up
    pending: AtomicUsize,
    /// Enqueued or executing, not yet settled
    outstanding: AtomicUsize,
    current: Mutex<Option<CurrentTask>>,
}

/// One FIFO queue and the single worker draining it
pub struct QueueShard {
    key: DispatchKey,
    sender: mpsc::UnboundedSender<Arc<Task>>,
    state: Arc<ShardState>,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl QueueShard {
    /// Create the shard and start its worker. Must run inside a Tokio runtime.
    pub(crate) fn spawn(key: DispatchKey, config: &DispatchConfig, observability: ObservabilityLayer) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let state = Arc::new(ShardState::default());
        let shutdown = CancellationToken::new();

        let worker = ShardWorker {
            key: key.clone(),
            receiver,
            state: state.clone(),
            shutdown: shutdown.clone(),
            poll_interval: config.poll_interval,
            start_hook_timeout: config.start_hook_timeout,
            observability,
        };
        let join_handle = tokio::spawn(worker.run());

        info!(key = %key, "Started dispatch shard");

        Self {
            key,
            sender,
            state,
            shutdown,
            worker: Mutex::new(Some(join_handle)),
        }
    }

    pub fn key(&self) -> &DispatchKey {
        &self.key
    }

    /// Queue a task, returning how many unsettled tasks are ahead of it.
    ///
    /// Hands the task back if the worker has already stopped.
    pub(crate) fn enqueue(&self, task: Arc<Task>) -> Result<usize, Arc<Task>> {
        let position = self.state.outstanding.fetch_add(1, Ordering::AcqRel);
        self.state.pending.fetch_add(1, Ordering::AcqRel);

        match self.sender.send(task) {
            Ok(()) => Ok(position),
            Err(mpsc::error::SendError(task)) => {
                self.state.pending.fetch_sub(1, Ordering::AcqRel);
                self.state.outstanding.fetch_sub(1, Ordering::AcqRel);
                Err(task)
            }
        }
    }

    /// Tasks waiting to start
    pub fn depth(&self) -> usize {
        self.state.pending.load(Ordering::Acquire)
    }

    pub fn current(&self) -> Option<CurrentTask> {
        self.state.current.lock().clone()
    }

    /// Ask the worker to stop without waiting for it
    pub(crate) fn cancel(&self) {
        self.shutdown.cancel();
    }

    /// Stop the worker and wait until every task it held is settled
    pub(crate) async fn shutdown(&self) {
        self.shutdown.cancel();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(key = %self.key, "Shard worker join error: {}", e);
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.sender.is_closed()
    }
}

/// The cooperative loop behind a shard
struct ShardWorker {
    key: DispatchKey,
    receiver: mpsc::UnboundedReceiver<Arc<Task>>,
    state: Arc<ShardState>,
    shutdown: CancellationToken,
    poll_interval: Duration,
    start_hook_timeout: Duration,
    observability: ObservabilityLayer,
}

impl ShardWorker {
    async fn run(mut self) {
        debug!(key = %self.key, "Shard worker running");

        loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                next = tokio::time::timeout(self.poll_interval, self.receiver.recv()) => next,
            };

            let task = match next {
                Ok(Some(task)) => task,
                // Every sender is gone: the shard was dropped.
                Ok(None) => break,
                Err(_) => continue,
            };

            self.state.pending.fetch_sub(1, Ordering::AcqRel);
            *self.state.current.lock() = Some(CurrentTask {
                task_id: task.id.clone(),
                kind: task.kind,
                started_at: Utc::now(),
            });

            let interrupted = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => true,
                outcome = self.process(task.clone()) => {
                    self.finish(&task, outcome);
                    false
                }
            };

            if interrupted {
                warn!(key = %self.key, task_id = %task.id, "Task interrupted by shutdown");
                self.finish(&task, Err(DispatchError::Cancelled));
            }

            *self.state.current.lock() = None;
            self.state.outstanding.fetch_sub(1, Ordering::AcqRel);

            if interrupted {
                break;
            }
        }

        self.drain();
        info!(key = %self.key, "Shard worker stopped");
    }

    /// Start hook, then attempts under the task's retry policy
    async fn process(&self, task: Arc<Task>) -> Result<(), DispatchError> {
        info!(key = %self.key, task_id = %task.id, kind = %task.kind, "Processing task");
        self.observability.record_started(&task.id, task.kind);

        if let Some(hook) = task.take_start_hook() {
            let guarded = AssertUnwindSafe(async move { hook.call().await }).catch_unwind();
            match tokio::time::timeout(self.start_hook_timeout, guarded).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => warn!(task_id = %task.id, "Start hook failed: {}", e),
                Ok(Err(_)) => warn!(task_id = %task.id, "Start hook panicked"),
                Err(_) => warn!(task_id = %task.id, "Start hook timed out after {:?}", self.start_hook_timeout),
            }
        }

        loop {
            let result = AssertUnwindSafe(task.attempt())
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(BackendError::fatal("generation work panicked")));

            let failure = match result {
                Ok(()) => return Ok(()),
                Err(failure) => failure,
            };

            match task.policy.decide(failure.clone(), task.retry_count()) {
                RetryDecision::Retry { attempt, delay } => {
                    task.record_retry();
                    let delay_ms = saturating_millis(delay);
                    warn!(
                        key = %self.key,
                        task_id = %task.id,
                        kind = %task.kind,
                        attempt,
                        max_retries = task.policy.max_retries,
                        delay_ms,
                        "Retryable failure, backing off: {}",
                        failure
                    );
                    self.observability.record_retrying(
                        &task.id,
                        task.kind,
                        attempt,
                        delay_ms,
                        failure.to_string(),
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::Settle(err) => return Err(err),
            }
        }
    }

    fn finish(&self, task: &Task, outcome: Result<(), DispatchError>) {
        match &outcome {
            Ok(()) => {
                info!(task_id = %task.id, attempts = task.attempts(), "Task completed");
                self.observability.record_completed(&task.id, task.kind, task.attempts());
            }
            Err(err) if err.is_cancelled() => {
                self.observability.record_cancelled(&task.id, task.kind);
            }
            Err(err) => {
                error!(task_id = %task.id, attempts = task.attempts(), reason = err.label(), "Task failed: {}", err);
                self.observability.record_settled_error(&task.id, task.kind, err);
            }
        }
        task.settle(outcome);
    }

    /// Settle whatever is still queued once the loop has exited
    fn drain(&mut self) {
        self.receiver.close();
        let mut drained = 0usize;
        while let Ok(task) = self.receiver.try_recv() {
            self.state.pending.fetch_sub(1, Ordering::AcqRel);
            self.state.outstanding.fetch_sub(1, Ordering::AcqRel);
            self.finish(&task, Err(DispatchError::Cancelled));
            drained += 1;
        }
        if drained > 0 {
            info!(key = %self.key, drained, "Cancelled pending tasks");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::RetryPolicy;
    use crate::{work_fn, Submission, Ticket};
    use std::sync::atomic::AtomicU32;
    use tracing_test::traced_test;

    fn shard() -> QueueShard {
        QueueShard::spawn(DispatchKey::shared(), &DispatchConfig::default(), ObservabilityLayer::default())
    }

    fn enqueue_value(shard: &QueueShard, value: u32) -> Ticket<u32> {
        let work = work_fn(move || async move { Ok::<_, BackendError>(value) });
        let (task, rx) = Submission::new(GenerationKind::Text, work).into_task(RetryPolicy::default());
        let task = Arc::new(task);
        let id = task.id.clone();
        let position = shard.enqueue(task).unwrap_or(0);
        Ticket::new(id, GenerationKind::Text, shard.key().clone(), position, rx)
    }

    #[tokio::test]
    async fn test_shard_runs_tasks_in_order() {
        let shard = shard();
        let first = enqueue_value(&shard, 1);
        let second = enqueue_value(&shard, 2);

        assert_eq!(first.position(), 0);
        assert_eq!(second.position(), 1);
        assert_eq!(shard.depth(), 2);

        assert_eq!(first.wait().await, Ok(1));
        assert_eq!(second.wait().await, Ok(2));
        assert_eq!(shard.depth(), 0);
        assert!(shard.current().is_none());
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_hands_task_back() {
        let shard = shard();
        shard.shutdown().await;
        assert!(shard.is_stopped());

        let work = work_fn(|| async { Ok::<_, BackendError>(()) });
        let (task, _rx) = Submission::new(GenerationKind::Text, work).into_task(RetryPolicy::default());
        assert!(shard.enqueue(Arc::new(task)).is_err());
        assert_eq!(shard.depth(), 0);
    }

    #[tokio::test]
    async fn test_panicking_work_settles_as_fatal() {
        let shard = shard();
        let work = work_fn(|| async {
            if true {
                panic!("backend client bug");
            }
            Ok::<u32, BackendError>(0)
        });
        let (task, rx) = Submission::new(GenerationKind::Image, work).into_task(RetryPolicy::default());
        let task = Arc::new(task);
        let id = task.id.clone();
        let position = shard.enqueue(task).unwrap_or(0);
        let ticket = Ticket::new(id, GenerationKind::Image, shard.key().clone(), position, rx);

        assert!(matches!(ticket.wait().await, Err(DispatchError::Fatal { .. })));

        // The worker survives the panic.
        assert_eq!(enqueue_value(&shard, 3).wait().await, Ok(3));
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_retries_are_logged_with_backoff() {
        let shard = shard();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let work = work_fn(move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(BackendError::rate_limited("slow down"))
                } else {
                    Ok(7u32)
                }
            }
        });
        let (task, rx) = Submission::new(GenerationKind::Text, work).into_task(RetryPolicy::default());
        let task = Arc::new(task);
        let id = task.id.clone();
        let position = shard.enqueue(task).unwrap_or(0);
        let ticket = Ticket::new(id, GenerationKind::Text, shard.key().clone(), position, rx);

        assert_eq!(ticket.wait().await, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(logs_contain("Retryable failure, backing off"));
        assert!(logs_contain("delay_ms=2000"));
        assert!(logs_contain("Task completed"));
    }
}
