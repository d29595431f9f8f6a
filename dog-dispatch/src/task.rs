//! Tasks and the completion handles that bridge them back to submitters.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::{
    execution::RetryPolicy, BackendError, DispatchError, DispatchKey, DispatchResult,
    GenerationKind, StartHook, TaskId, Work,
};

/// Everything needed to enqueue one piece of work
pub struct Submission<W: Work> {
    kind: GenerationKind,
    work: W,
    key: DispatchKey,
    task_id: Option<TaskId>,
    on_start: Option<StartHook>,
    max_retries: Option<u32>,
    base_delay: Option<Duration>,
}

impl<W: Work> Submission<W> {
    /// Submission on the shared key with default retry settings
    pub fn new(kind: GenerationKind, work: W) -> Self {
        Self {
            kind,
            work,
            key: DispatchKey::shared(),
            task_id: None,
            on_start: None,
            max_retries: None,
            base_delay: None,
        }
    }

    pub fn key(mut self, key: DispatchKey) -> Self {
        self.key = key;
        self
    }

    pub fn task_id(mut self, id: TaskId) -> Self {
        self.task_id = Some(id);
        self
    }

    pub fn on_start(mut self, hook: StartHook) -> Self {
        self.on_start = Some(hook);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = Some(delay);
        self
    }

    pub fn dispatch_key(&self) -> &DispatchKey {
        &self.key
    }

    pub(crate) fn into_task(self, defaults: RetryPolicy) -> (Task, oneshot::Receiver<DispatchResult<W::Output>>) {
        let (tx, rx) = oneshot::channel();
        let policy = RetryPolicy {
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            base_delay: self.base_delay.unwrap_or(defaults.base_delay),
        };

        let task = Task {
            id: self.task_id.unwrap_or_default(),
            kind: self.kind,
            policy,
            retry_count: AtomicU32::new(0),
            on_start: Mutex::new(self.on_start),
            body: Box::new(Bound {
                work: self.work,
                output: Mutex::new(None),
                completion: Mutex::new(Some(tx)),
            }),
        };
        (task, rx)
    }
}

/// Type-erased view of a task's work and completion
#[async_trait]
trait Attempt: Send + Sync {
    async fn attempt(&self) -> Result<(), BackendError>;

    fn settle(&self, outcome: Result<(), DispatchError>) -> bool;
}

/// Work bound to the typed sender of its submitter
struct Bound<W: Work> {
    work: W,
    output: Mutex<Option<W::Output>>,
    completion: Mutex<Option<oneshot::Sender<DispatchResult<W::Output>>>>,
}

#[async_trait]
impl<W: Work> Attempt for Bound<W> {
    async fn attempt(&self) -> Result<(), BackendError> {
        let value = self.work.execute().await?;
        *self.output.lock() = Some(value);
        Ok(())
    }

    fn settle(&self, outcome: Result<(), DispatchError>) -> bool {
        let Some(tx) = self.completion.lock().take() else {
            return false;
        };
        let result = match outcome {
            Ok(()) => match self.output.lock().take() {
                Some(value) => Ok(value),
                None => Err(DispatchError::Fatal {
                    message: "work finished without producing a value".to_string(),
                    status: None,
                }),
            },
            Err(err) => Err(err),
        };
        // The submitter may have stopped waiting; that is not our concern.
        let _ = tx.send(result);
        true
    }
}

/// A submission as seen by a shard worker
pub(crate) struct Task {
    pub(crate) id: TaskId,
    pub(crate) kind: GenerationKind,
    pub(crate) policy: RetryPolicy,
    retry_count: AtomicU32,
    on_start: Mutex<Option<StartHook>>,
    body: Box<dyn Attempt>,
}

impl Task {
    pub(crate) fn retry_count(&self) -> u32 {
        self.retry_count.load(Ordering::Acquire)
    }

    pub(crate) fn record_retry(&self) -> u32 {
        self.retry_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Attempts made so far, including the one in progress
    pub(crate) fn attempts(&self) -> u32 {
        self.retry_count() + 1
    }

    pub(crate) fn take_start_hook(&self) -> Option<StartHook> {
        self.on_start.lock().take()
    }

    pub(crate) async fn attempt(&self) -> Result<(), BackendError> {
        self.body.attempt().await
    }

    /// Resolve the completion; false if it was already resolved
    pub(crate) fn settle(&self, outcome: Result<(), DispatchError>) -> bool {
        self.body.settle(outcome)
    }
}

/// Completion handle returned by [`QueueRegistry::enqueue`](crate::QueueRegistry::enqueue)
#[derive(Debug)]
pub struct Ticket<T> {
    id: TaskId,
    kind: GenerationKind,
    key: DispatchKey,
    position: usize,
    rx: oneshot::Receiver<DispatchResult<T>>,
}

impl<T> Ticket<T> {
    pub(crate) fn new(
        id: TaskId,
        kind: GenerationKind,
        key: DispatchKey,
        position: usize,
        rx: oneshot::Receiver<DispatchResult<T>>,
    ) -> Self {
        Self {
            id,
            kind,
            key,
            position,
            rx,
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn kind(&self) -> GenerationKind {
        self.kind
    }

    pub fn key(&self) -> &DispatchKey {
        &self.key
    }

    /// Tasks ahead of this one when it was enqueued (advisory)
    pub fn position(&self) -> usize {
        self.position
    }

    /// Suspend until the task settles
    pub async fn wait(self) -> DispatchResult<T> {
        match self.rx.await {
            Ok(result) => result,
            // Sender dropped without settling: the shard went away.
            Err(_) => Err(DispatchError::Cancelled),
        }
    }
}

/// Successful result of [`QueueRegistry::submit`](crate::QueueRegistry::submit)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched<T> {
    pub task_id: TaskId,
    pub output: T,
    pub position: usize,
}
