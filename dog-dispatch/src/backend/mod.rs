//! Backend adapter seam.
//!
//! Generation clients implement [`GenerationBackend`] and classify their own
//! protocol failures into [`BackendError`]. The queue core only ever sees the
//! tagged outcome.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::{BackendError, Work};

/// Rate-limited text/image generation service
#[async_trait]
pub trait GenerationBackend: Send + Sync + 'static {
    type Request: Send + Sync + 'static;
    type Response: Send + 'static;

    /// Perform one call, failures already classified
    async fn call(&self, request: &Self::Request) -> Result<Self::Response, BackendError>;
}

/// A backend plus the request to send it, usable as [`Work`]
pub struct BackendCall<B: GenerationBackend> {
    backend: Arc<B>,
    request: B::Request,
    time_budget: Option<Duration>,
}

impl<B: GenerationBackend> BackendCall<B> {
    pub fn new(backend: Arc<B>, request: B::Request) -> Self {
        Self {
            backend,
            request,
            time_budget: None,
        }
    }

    /// Fail an attempt with `TransientTimeout` once it runs past `budget`
    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = Some(budget);
        self
    }
}

#[async_trait]
impl<B: GenerationBackend> Work for BackendCall<B> {
    type Output = B::Response;

    async fn execute(&self) -> Result<B::Response, BackendError> {
        let call = self.backend.call(&self.request);
        match self.time_budget {
            Some(budget) => tokio::time::timeout(budget, call)
                .await
                .map_err(|_| BackendError::timeout(format!("no answer within {:?}", budget)))?,
            None => call.await,
        }
    }
}
