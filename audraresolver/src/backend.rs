//! Backend capability and ordered failover pool

use crate::error::Result;
use crate::models::{Rendition, ResolutionResult, TrackId};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// An upstream able to produce renditions for a track
///
/// New providers are added by implementing this trait and appending the
/// implementation to a [`BackendPool`].
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// How long renditions from this backend stay valid in the resolution cache
    fn cache_ttl(&self) -> Duration;

    /// Queries the upstream
    ///
    /// `Ok` with an empty list means the upstream answered but had no audio.
    async fn resolve(&self, track_id: &TrackId) -> Result<Vec<Rendition>>;
}

/// Successful outcome of a pool query
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Non-empty renditions from the first backend that had any
    pub result: ResolutionResult,
    /// Name of the backend that produced them
    pub backend: String,
    /// Cache lifetime advertised by that backend
    pub ttl: Duration,
}

/// Ordered list of backends queried with early exit
#[derive(Clone, Default)]
pub struct BackendPool {
    backends: Vec<Arc<dyn Backend>>,
}

impl BackendPool {
    pub fn new(backends: Vec<Arc<dyn Backend>>) -> Self {
        Self { backends }
    }

    /// Appends a backend after the existing ones
    pub fn push(&mut self, backend: Arc<dyn Backend>) {
        self.backends.push(backend);
    }

    /// Backends in query order
    pub fn backends(&self) -> &[Arc<dyn Backend>] {
        &self.backends
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Queries backends in order and returns the first non-empty answer
    ///
    /// Individual failures are logged and skipped. `None` means every backend
    /// failed or came back empty; it is never an error.
    pub async fn resolve(&self, track_id: &TrackId) -> Option<Resolution> {
        for backend in &self.backends {
            match backend.resolve(track_id).await {
                Ok(renditions) if !renditions.is_empty() => {
                    info!(
                        track_id = %track_id,
                        backend = backend.name(),
                        renditions = renditions.len(),
                        "Resolved track"
                    );
                    return Some(Resolution {
                        result: ResolutionResult::new(renditions),
                        backend: backend.name().to_string(),
                        ttl: backend.cache_ttl(),
                    });
                }
                Ok(_) => {
                    debug!(track_id = %track_id, backend = backend.name(), "No audio stream");
                }
                Err(e) => {
                    warn!(
                        track_id = %track_id,
                        backend = backend.name(),
                        timeout = e.is_timeout(),
                        "Backend failed: {}",
                        e
                    );
                }
            }
        }

        warn!(
            track_id = %track_id,
            backends = self.backends.len(),
            "All backends exhausted"
        );
        None
    }
}

impl std::fmt::Debug for BackendPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.backends.iter().map(|b| b.name()))
            .finish()
    }
}
