use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

use crate::{DispatchError, DispatchEvent, DispatchKey, GenerationKind, TaskId};

/// Event fan-out plus live counters, shared by the registry and every shard
#[derive(Clone)]
pub struct ObservabilityLayer {
    event_broadcaster: broadcast::Sender<DispatchEvent>,
    metrics: Arc<super::LiveMetrics>,
}

impl ObservabilityLayer {
    /// Create new observability layer buffering `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (event_broadcaster, _) = broadcast::channel(capacity.max(1));

        Self {
            event_broadcaster,
            metrics: Arc::new(super::LiveMetrics::new()),
        }
    }

    fn publish(&self, event: DispatchEvent) {
        debug!(event = event.event_name(), task_id = %event.task_id(), "Publishing dispatch event");
        // No subscribers is the normal case.
        let _ = self.event_broadcaster.send(event);
    }

    pub fn record_enqueued(&self, task_id: &TaskId, key: &DispatchKey, kind: GenerationKind, position: usize) {
        self.publish(DispatchEvent::Enqueued {
            task_id: task_id.clone(),
            key: key.clone(),
            kind,
            position,
            at: Utc::now(),
        });
        self.metrics.increment_enqueued(kind);
    }

    pub fn record_started(&self, task_id: &TaskId, kind: GenerationKind) {
        self.publish(DispatchEvent::Started {
            task_id: task_id.clone(),
            kind,
            at: Utc::now(),
        });
    }

    pub fn record_retrying(&self, task_id: &TaskId, kind: GenerationKind, attempt: u32, delay_ms: u64, error: String) {
        self.publish(DispatchEvent::Retrying {
            task_id: task_id.clone(),
            kind,
            attempt,
            delay_ms,
            error,
            at: Utc::now(),
        });
        self.metrics.increment_retried(kind);
    }

    pub fn record_completed(&self, task_id: &TaskId, kind: GenerationKind, attempts: u32) {
        self.publish(DispatchEvent::Completed {
            task_id: task_id.clone(),
            kind,
            attempts,
            at: Utc::now(),
        });
        self.metrics.increment_completed(kind);
    }

    /// Record a settled error, routing cancellation to its own counter
    pub fn record_settled_error(&self, task_id: &TaskId, kind: GenerationKind, error: &DispatchError) {
        if error.is_cancelled() {
            self.record_cancelled(task_id, kind);
            return;
        }
        self.publish(DispatchEvent::Failed {
            task_id: task_id.clone(),
            kind,
            error: error.to_string(),
            at: Utc::now(),
        });
        self.metrics.increment_failed(kind);
    }

    pub fn record_cancelled(&self, task_id: &TaskId, kind: GenerationKind) {
        self.publish(DispatchEvent::Cancelled {
            task_id: task_id.clone(),
            kind,
            at: Utc::now(),
        });
        self.metrics.increment_cancelled(kind);
    }

    /// Events published from now on, as a stream
    pub fn event_stream(&self) -> BroadcastStream<DispatchEvent> {
        BroadcastStream::new(self.event_broadcaster.subscribe())
    }

    /// Get live metrics
    pub fn metrics(&self) -> &super::LiveMetrics {
        &self.metrics
    }
}

impl Default for ObservabilityLayer {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn test_events_reach_subscribers() {
        let layer = ObservabilityLayer::default();
        let mut events = layer.event_stream();
        let task_id = TaskId::from("t-1");

        layer.record_enqueued(&task_id, &DispatchKey::shared(), GenerationKind::Text, 0);
        layer.record_settled_error(&task_id, GenerationKind::Text, &DispatchError::Cancelled);

        assert_eq!(events.next().await.unwrap().unwrap().event_name(), "enqueued");
        assert_eq!(events.next().await.unwrap().unwrap().event_name(), "cancelled");
        assert_eq!(layer.metrics().tasks_cancelled(), 1);
        assert_eq!(layer.metrics().tasks_failed(), 0);
    }
}
