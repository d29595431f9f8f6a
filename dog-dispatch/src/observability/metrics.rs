use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::GenerationKind;

/// Live counters for dispatch activity
#[derive(Debug, Default)]
pub struct LiveMetrics {
    tasks_enqueued: AtomicU64,
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,
    tasks_retried: AtomicU64,
    tasks_cancelled: AtomicU64,

    // Per-kind metrics
    kind_metrics: RwLock<HashMap<GenerationKind, KindMetrics>>,
}

impl LiveMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_enqueued(&self, kind: GenerationKind) {
        self.tasks_enqueued.fetch_add(1, Ordering::Relaxed);
        self.kind_metrics.write().entry(kind).or_default().enqueued += 1;
    }

    pub fn increment_completed(&self, kind: GenerationKind) {
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
        self.kind_metrics.write().entry(kind).or_default().completed += 1;
    }

    pub fn increment_failed(&self, kind: GenerationKind) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
        self.kind_metrics.write().entry(kind).or_default().failed += 1;
    }

    pub fn increment_retried(&self, kind: GenerationKind) {
        self.tasks_retried.fetch_add(1, Ordering::Relaxed);
        self.kind_metrics.write().entry(kind).or_default().retried += 1;
    }

    pub fn increment_cancelled(&self, kind: GenerationKind) {
        self.tasks_cancelled.fetch_add(1, Ordering::Relaxed);
        self.kind_metrics.write().entry(kind).or_default().cancelled += 1;
    }

    pub fn tasks_enqueued(&self) -> u64 {
        self.tasks_enqueued.load(Ordering::Relaxed)
    }

    pub fn tasks_completed(&self) -> u64 {
        self.tasks_completed.load(Ordering::Relaxed)
    }

    pub fn tasks_failed(&self) -> u64 {
        self.tasks_failed.load(Ordering::Relaxed)
    }

    pub fn tasks_retried(&self) -> u64 {
        self.tasks_retried.load(Ordering::Relaxed)
    }

    pub fn tasks_cancelled(&self) -> u64 {
        self.tasks_cancelled.load(Ordering::Relaxed)
    }

    /// Collect current snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            global: GlobalMetrics {
                tasks_enqueued: self.tasks_enqueued(),
                tasks_completed: self.tasks_completed(),
                tasks_failed: self.tasks_failed(),
                tasks_retried: self.tasks_retried(),
                tasks_cancelled: self.tasks_cancelled(),
            },
            kinds: self.kind_metrics.read().clone(),
        }
    }
}

/// Counters for one generation kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KindMetrics {
    pub enqueued: u64,
    pub completed: u64,
    pub failed: u64,
    pub retried: u64,
    pub cancelled: u64,
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub global: GlobalMetrics,
    pub kinds: HashMap<GenerationKind, KindMetrics>,
}

/// Totals across every shard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalMetrics {
    pub tasks_enqueued: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub tasks_retried: u64,
    pub tasks_cancelled: u64,
}
