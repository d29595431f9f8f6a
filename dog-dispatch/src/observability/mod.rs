pub mod metrics;
pub mod analytics;

#[cfg(feature = "tracing-basic")]
pub mod logging;

pub use metrics::{LiveMetrics, KindMetrics, GlobalMetrics, MetricsSnapshot};
pub use analytics::ObservabilityLayer;
