use crate::catalog_store::{CatalogStore, CollectionStore};
use crate::server::metrics;
use crate::server_store::ServerStore;
use crate::user::{FavoritesStore, UserRegistry};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Latest completion percentage of each running job.
#[derive(Clone, Default)]
pub struct JobProgressTracker {
    values: Arc<Mutex<HashMap<String, f64>>>,
}

impl JobProgressTracker {
    pub fn set(&self, job_id: &str, percent: f64) {
        let percent = percent.clamp(0.0, 100.0);
        self.values
            .lock()
            .unwrap()
            .insert(job_id.to_string(), percent);
        metrics::set_background_job_progress(job_id, percent);
    }

    pub fn get(&self, job_id: &str) -> Option<f64> {
        self.values.lock().unwrap().get(job_id).copied()
    }

    pub fn clear(&self, job_id: &str) {
        self.values.lock().unwrap().remove(job_id);
    }
}

/// Context provided to jobs during execution.
///
/// Contains references to shared resources and a cancellation token
/// for graceful shutdown handling.
#[derive(Clone)]
pub struct JobContext {
    /// Token to check for cancellation/shutdown requests.
    pub cancellation_token: CancellationToken,

    /// Read access to movies, collections and items.
    pub catalog_store: Arc<dyn CatalogStore>,

    /// Write access to collections.
    pub collection_store: Arc<dyn CollectionStore>,

    pub user_registry: Arc<dyn UserRegistry>,

    pub favorites_store: Arc<dyn FavoritesStore>,

    /// Access to server-side state (job history, schedules, plugin configuration).
    pub server_store: Arc<dyn ServerStore>,

    pub progress: JobProgressTracker,
}

impl JobContext {
    /// Create a new job context with the given dependencies.
    pub fn new(
        cancellation_token: CancellationToken,
        catalog_store: Arc<dyn CatalogStore>,
        collection_store: Arc<dyn CollectionStore>,
        user_registry: Arc<dyn UserRegistry>,
        favorites_store: Arc<dyn FavoritesStore>,
        server_store: Arc<dyn ServerStore>,
    ) -> Self {
        Self {
            cancellation_token,
            catalog_store,
            collection_store,
            user_registry,
            favorites_store,
            server_store,
            progress: JobProgressTracker::default(),
        }
    }

    /// Same context with a different cancellation token.
    pub fn with_cancellation_token(&self, cancellation_token: CancellationToken) -> Self {
        Self {
            cancellation_token,
            ..self.clone()
        }
    }

    /// Check if cancellation has been requested.
    ///
    /// Jobs should periodically check this during long-running operations
    /// and return early with `JobError::Cancelled` if true.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    pub fn report_progress(&self, job_id: &str, percent: f64) {
        self.progress.set(job_id, percent);
    }
}
