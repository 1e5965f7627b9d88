//! Genre collections background job.
//!
//! Periodically makes sure every movie genre has a collection and every
//! movie is linked into the collections of its genres.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError, JobSchedule, ShutdownBehavior},
    JobAuditLogger,
};
use crate::collections::{GenreReconciler, NameMatching, ReconcileError};
use crate::config::GenreCollectionsJobSettings;
use crate::server::metrics;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

/// Progress is written to the audit log at each quarter of a run.
const AUDIT_PROGRESS_STEP: f64 = 25.0;

const SECONDS_PER_HOUR: u64 = 60 * 60;

pub struct GenreCollectionsJob {
    interval_hours: u64,
    name_matching: NameMatching,
    /// Held for the whole of a run, across every `execute` call.
    run_lock: Arc<Mutex<()>>,
}

impl GenreCollectionsJob {
    pub fn from_settings(settings: &GenreCollectionsJobSettings) -> Self {
        Self {
            interval_hours: settings.interval_hours,
            name_matching: settings.name_matching,
            run_lock: Arc::new(Mutex::new(())),
        }
    }
}

impl BackgroundJob for GenreCollectionsJob {
    fn id(&self) -> &'static str {
        "genre_collections"
    }

    fn name(&self) -> &'static str {
        "Create Genre Collections"
    }

    fn description(&self) -> &'static str {
        "Create a collection for every movie genre and link movies into them"
    }

    fn category(&self) -> &'static str {
        "Library"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Interval(Duration::from_secs(
            self.interval_hours.saturating_mul(SECONDS_PER_HOUR),
        ))
    }

    fn shutdown_behavior(&self) -> ShutdownBehavior {
        // Work done before cancellation is kept; the next run picks up the rest.
        ShutdownBehavior::Cancellable
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        let audit = JobAuditLogger::new(Arc::clone(&ctx.server_store), self.id());
        audit.log_started(Some(serde_json::json!({
            "name_matching": self.name_matching,
        })));

        let reconciler = GenreReconciler::new(
            Arc::clone(&ctx.catalog_store),
            Arc::clone(&ctx.collection_store),
            self.name_matching,
        )
        .with_run_lock(Arc::clone(&self.run_lock));
        let job_id = self.id();
        let last_step = AtomicU8::new(0);
        let progress = |percent: f64| {
            ctx.report_progress(job_id, percent);
            let step = (percent / AUDIT_PROGRESS_STEP).floor() as u8;
            if step > 0 && step < 4 && last_step.fetch_max(step, Ordering::SeqCst) < step {
                audit.log_progress(serde_json::json!({
                    "percent": step as f64 * AUDIT_PROGRESS_STEP,
                }));
            }
        };

        match reconciler.run(&progress, &ctx.cancellation_token) {
            Ok(report) => {
                metrics::record_genre_reconcile(&report);
                if !report.failures.is_empty() {
                    warn!(
                        "Genre collections run finished with {} skipped tags",
                        report.failures.len()
                    );
                }
                info!(
                    "Genre collections: {} movies, {} collections created, {} links added",
                    report.movies_total, report.collections_created, report.links_added
                );
                audit.log_completed(serde_json::to_value(&report).ok());
                Ok(())
            }
            Err(ReconcileError::Cancelled) => {
                audit.log_failed("cancelled", None);
                Err(JobError::Cancelled)
            }
            Err(ReconcileError::AlreadyRunning) => {
                audit.log_failed("another run is in progress", None);
                Err(JobError::AlreadyRunning)
            }
            Err(e) => {
                let error_msg = e.to_string();
                audit.log_failed(&error_msg, None);
                Err(JobError::ExecutionFailed(error_msg))
            }
        }
    }
}
