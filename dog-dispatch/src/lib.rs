//! # dog-dispatch: Per-Credential Generation Queue
//!
//! **Serializes calls to a rate-limited text/image backend, one FIFO shard per credential**
//!
//! Chat-bot handlers hand their generation work to a [`QueueRegistry`]. Work
//! submitted under the same [`DispatchKey`] runs strictly one at a time in
//! submission order, which keeps each credential under the backend's
//! concurrency ceiling, while distinct keys proceed in parallel.
//!
//! ## Features
//!
//! - **One worker per key**: shards are created lazily and never duplicated
//! - **Classified retries**: `RateLimited` and `TransientTimeout` back off
//!   linearly (2 s, 4 s, 6 s by default); `Fatal` surfaces immediately
//! - **Queue positions**: every submission reports how many tasks were ahead
//!   of it, so users can be told where they stand
//! - **Start hooks**: a one-shot callback when the worker picks a task up
//! - **Graceful teardown**: [`QueueRegistry::shutdown_all`] settles everything
//!   still queued or running as [`DispatchError::Cancelled`]
//! - **Structured observability**: lifecycle event stream and live counters
//!
//! ## Quick Start
//!
//! ```rust
//! use dog_dispatch::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let registry = QueueRegistry::new(DispatchConfig::default());
//!
//! let work = work_fn(|| async { Ok::<_, BackendError>("Join our Saturday clean-up!".to_string()) });
//! let key = DispatchKey::for_credential(None);
//!
//! let done = registry
//!     .submit(GenerationKind::Text, work, Some(key), None)
//!     .await
//!     .unwrap();
//! assert_eq!(done.position, 0);
//!
//! registry.shutdown_all().await;
//! # }
//! ```

pub mod types;
pub mod error;
pub mod config;
pub mod work;
pub mod backend;
pub mod task;
pub mod execution;
pub mod registry;
pub mod observability;

// Core API exports
pub use registry::QueueRegistry;
pub use types::{TaskId, DispatchKey, GenerationKind, DispatchEvent};
pub use error::{BackendError, DispatchError, DispatchResult, ConfigError, BoxError, OWN_CREDENTIAL_HINT};
pub use config::DispatchConfig;
pub use work::{Work, FnWork, StartHook, work_fn};
pub use backend::{GenerationBackend, BackendCall};
pub use task::{Submission, Ticket, Dispatched};
pub use execution::{RetryPolicy, RetryDecision, CurrentTask};

// Observability exports
pub use observability::{ObservabilityLayer, LiveMetrics, MetricsSnapshot};

/// Everything a bot handler needs to submit generation work
pub mod prelude {
    pub use crate::{
        QueueRegistry, DispatchConfig, Submission, Ticket, Dispatched,
    };

    pub use crate::{
        Work, work_fn, StartHook, GenerationBackend, BackendCall,
    };

    pub use crate::{
        DispatchKey, GenerationKind, TaskId,
    };

    pub use crate::{
        BackendError, DispatchError, DispatchResult,
    };

    pub use async_trait::async_trait;
}
