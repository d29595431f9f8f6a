use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DispatchKey, GenerationKind, TaskId};

/// Lifecycle events published by every shard
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DispatchEvent {
    /// Task accepted by a shard
    Enqueued {
        task_id: TaskId,
        key: DispatchKey,
        kind: GenerationKind,
        position: usize,
        at: DateTime<Utc>,
    },

    /// Worker picked the task up
    Started {
        task_id: TaskId,
        kind: GenerationKind,
        at: DateTime<Utc>,
    },

    /// Attempt failed with a retryable error, backing off
    Retrying {
        task_id: TaskId,
        kind: GenerationKind,
        attempt: u32,
        delay_ms: u64,
        error: String,
        at: DateTime<Utc>,
    },

    /// Task settled with a value
    Completed {
        task_id: TaskId,
        kind: GenerationKind,
        attempts: u32,
        at: DateTime<Utc>,
    },

    /// Task settled with an error other than cancellation
    Failed {
        task_id: TaskId,
        kind: GenerationKind,
        error: String,
        at: DateTime<Utc>,
    },

    /// Task settled by shutdown
    Cancelled {
        task_id: TaskId,
        kind: GenerationKind,
        at: DateTime<Utc>,
    },
}

impl DispatchEvent {
    /// Get event type name as string
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Enqueued { .. } => "enqueued",
            Self::Started { .. } => "started",
            Self::Retrying { .. } => "retrying",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::Cancelled { .. } => "cancelled",
        }
    }

    /// Get the task ID from any event
    pub fn task_id(&self) -> &TaskId {
        match self {
            Self::Enqueued { task_id, .. }
            | Self::Started { task_id, .. }
            | Self::Retrying { task_id, .. }
            | Self::Completed { task_id, .. }
            | Self::Failed { task_id, .. }
            | Self::Cancelled { task_id, .. } => task_id,
        }
    }

    /// Serialize for log shipping
    #[cfg(feature = "json")]
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_accessors() {
        let started = DispatchEvent::Started {
            task_id: TaskId::from("t-1"),
            kind: GenerationKind::Text,
            at: Utc::now(),
        };
        let cancelled = DispatchEvent::Cancelled {
            task_id: TaskId::from("t-1"),
            kind: GenerationKind::Text,
            at: Utc::now(),
        };

        assert_eq!(started.event_name(), "started");
        assert_eq!(cancelled.event_name(), "cancelled");
        assert_eq!(cancelled.task_id().as_str(), "t-1");
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_event_json_is_tagged() {
        let event = DispatchEvent::Retrying {
            task_id: TaskId::from("t-2"),
            kind: GenerationKind::Image,
            attempt: 2,
            delay_ms: 4000,
            error: "Rate limited: busy".to_string(),
            at: Utc::now(),
        };

        let json = event.to_json().unwrap();
        assert!(json.contains("\"event\":\"retrying\""));
        assert!(json.contains("\"kind\":\"image\""));
    }
}
