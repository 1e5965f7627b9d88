//! Genre collection reconciliation.
//!
//! A run walks every real movie of the library and makes sure that, for each
//! of its genre tags, a collection with that name exists and contains the
//! movie. The run only ever adds: collections are never deleted and links
//! are never removed.

use super::genre::{normalize_genre, CollectionIndex, NameMatching};
use crate::catalog_store::{CatalogStore, CollectionStore, Movie, MovieQuery};
use serde::Serialize;
use std::sync::{Arc, Mutex, TryLockError};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Receives completion percentages in `[0, 100]`.
pub trait ProgressSink: Send + Sync {
    fn report(&self, percent: f64);
}

impl<F> ProgressSink for F
where
    F: Fn(f64) + Send + Sync,
{
    fn report(&self, percent: f64) {
        self(percent)
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to read catalog: {0:#}")]
    CatalogRead(#[source] anyhow::Error),
    #[error("reconciliation cancelled")]
    Cancelled,
    #[error("a reconciliation run is already in progress")]
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    CreateFailed,
    LinkFailed,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::CreateFailed => "create_failed",
            FailureKind::LinkFailed => "link_failed",
        }
    }
}

/// A per-tag problem that was logged and skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoverableFailure {
    pub genre: String,
    pub movie_id: Uuid,
    pub kind: FailureKind,
    pub reason: String,
}

/// Result of handling one (movie, genre) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagOutcome {
    Linked { collection_id: Uuid, created: bool },
    AlreadyLinked { collection_id: Uuid, created: bool },
    Failed(RecoverableFailure),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub movies_total: usize,
    pub movies_processed: usize,
    pub movies_without_genres: usize,
    pub collections_created: usize,
    pub links_added: usize,
    pub already_linked: usize,
    pub failures: Vec<RecoverableFailure>,
}

impl ReconcileReport {
    fn record(&mut self, outcome: TagOutcome) {
        match outcome {
            TagOutcome::Linked { created, .. } => {
                self.links_added += 1;
                self.collections_created += created as usize;
            }
            TagOutcome::AlreadyLinked { created, .. } => {
                self.already_linked += 1;
                self.collections_created += created as usize;
            }
            TagOutcome::Failed(failure) => self.failures.push(failure),
        }
    }
}

pub struct GenreReconciler {
    catalog: Arc<dyn CatalogStore>,
    collections: Arc<dyn CollectionStore>,
    matching: NameMatching,
    run_lock: Arc<Mutex<()>>,
}

impl GenreReconciler {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        collections: Arc<dyn CollectionStore>,
        matching: NameMatching,
    ) -> Self {
        Self {
            catalog,
            collections,
            matching,
            run_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Shares the single-flight guard with every reconciler built on `lock`,
    /// so runs started from separate instances still exclude each other.
    pub fn with_run_lock(mut self, lock: Arc<Mutex<()>>) -> Self {
        self.run_lock = lock;
        self
    }

    pub fn matching(&self) -> NameMatching {
        self.matching
    }

    /// Runs one reconciliation pass.
    ///
    /// Catalog read failures abort the run. Failures to create or link a
    /// single collection are logged, recorded in the report and skipped.
    /// Cancellation is checked before each movie; work already done is kept.
    pub fn run(
        &self,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<ReconcileReport, ReconcileError> {
        let _guard = match self.run_lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return Err(ReconcileError::AlreadyRunning),
        };

        let movies = self
            .catalog
            .list_movies(&MovieQuery::all_movies())
            .map_err(ReconcileError::CatalogRead)?;

        let mut report = ReconcileReport {
            movies_total: movies.len(),
            ..Default::default()
        };

        if movies.is_empty() {
            info!("No movies in the catalog, nothing to reconcile");
            progress.report(100.0);
            return Ok(report);
        }

        let existing = self
            .catalog
            .list_collections()
            .map_err(ReconcileError::CatalogRead)?;
        let mut index = CollectionIndex::build(self.matching, existing.iter());
        info!(
            "Reconciling genre collections for {} movies ({} existing collection names)",
            movies.len(),
            index.len()
        );

        let total = movies.len() as f64;
        for (position, movie) in movies.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(
                    "Reconciliation cancelled after {} of {} movies",
                    position,
                    movies.len()
                );
                return Err(ReconcileError::Cancelled);
            }

            if movie.genres.is_empty() {
                debug!("Movie {} ({}) has no genres, skipping", movie.name, movie.id);
                report.movies_without_genres += 1;
            } else {
                for tag in &movie.genres {
                    let Some(genre) = normalize_genre(tag) else {
                        continue;
                    };
                    let outcome = self.reconcile_tag(&mut index, movie, genre);
                    report.record(outcome);
                }
            }

            report.movies_processed += 1;
            progress.report((position + 1) as f64 / total * 100.0);
        }

        progress.report(100.0);
        info!(
            "Genre reconciliation done: {} movies, {} collections created, {} links added, {} already linked, {} failures",
            report.movies_processed,
            report.collections_created,
            report.links_added,
            report.already_linked,
            report.failures.len()
        );
        Ok(report)
    }

    fn reconcile_tag(&self, index: &mut CollectionIndex, movie: &Movie, genre: &str) -> TagOutcome {
        let (collection_id, created) = match self.resolve_collection(index, genre) {
            Ok(resolved) => resolved,
            Err(reason) => {
                warn!(
                    "Could not create collection {:?} for movie {}: {}",
                    genre, movie.id, reason
                );
                return TagOutcome::Failed(RecoverableFailure {
                    genre: genre.to_string(),
                    movie_id: movie.id,
                    kind: FailureKind::CreateFailed,
                    reason,
                });
            }
        };

        match self.link(&collection_id, &movie.id) {
            Ok(true) => {
                debug!("Linked movie {} into collection {:?}", movie.id, genre);
                TagOutcome::Linked {
                    collection_id,
                    created,
                }
            }
            Ok(false) => TagOutcome::AlreadyLinked {
                collection_id,
                created,
            },
            Err(reason) => {
                warn!(
                    "Could not add movie {} to collection {:?}: {}",
                    movie.id, genre, reason
                );
                TagOutcome::Failed(RecoverableFailure {
                    genre: genre.to_string(),
                    movie_id: movie.id,
                    kind: FailureKind::LinkFailed,
                    reason,
                })
            }
        }
    }

    /// Returns the collection for `genre` and whether it was just created.
    fn resolve_collection(
        &self,
        index: &mut CollectionIndex,
        genre: &str,
    ) -> Result<(Uuid, bool), String> {
        if let Some(id) = index.get(genre) {
            return Ok((id, false));
        }

        // The index is a snapshot; another writer may have added the collection since.
        match self.catalog.find_collection_by_name(genre, self.matching) {
            Ok(Some(found)) => {
                index.insert(genre, found.id);
                return Ok((found.id, false));
            }
            Ok(None) => {}
            Err(e) => return Err(format!("lookup failed: {:#}", e)),
        }

        let collection = self
            .collections
            .create_collection(genre)
            .map_err(|e| e.to_string())?;
        info!("Created collection {:?} ({})", genre, collection.id);
        index.insert(genre, collection.id);
        Ok((collection.id, true))
    }

    /// Links the movie unless the collection already contains it.
    /// Returns whether a link was added.
    fn link(&self, collection_id: &Uuid, movie_id: &Uuid) -> Result<bool, String> {
        let collection = self
            .catalog
            .get_collection(collection_id)
            .map_err(|e| format!("{:#}", e))?
            .ok_or_else(|| format!("collection {} no longer exists", collection_id))?;

        if collection.contains(movie_id) {
            return Ok(false);
        }

        self.collections
            .add_to_collection(collection_id, std::slice::from_ref(movie_id))
            .map_err(|e| e.to_string())?;
        Ok(true)
    }
}
