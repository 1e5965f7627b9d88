use super::context::JobContext;
use super::handle::{SchedulerCommand, SchedulerHandle, SharedJobState};
use super::job::{BackgroundJob, HookEvent, JobError, ShutdownBehavior};
use crate::server::metrics;
use crate::server_store::{JobRunStatus, JobScheduleState, ServerStore};
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Longest time the scheduler sleeps without re-checking schedules.
const MAX_SLEEP: Duration = Duration::from_secs(60);

/// How long shutdown waits for each running job.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Audit entries older than this are pruned when the scheduler starts.
const AUDIT_RETENTION_DAYS: i64 = 30;

const COMMAND_CHANNEL_CAPACITY: usize = 100;

/// Longer intervals are shortened to this so the next run time stays representable.
const MAX_INTERVAL_DAYS: i64 = 100 * 365;
const MAX_INTERVAL: Duration = Duration::from_secs(MAX_INTERVAL_DAYS as u64 * 24 * 60 * 60);

/// How a finished run is recorded in history and metrics.
struct RunOutcome {
    status: JobRunStatus,
    error: Option<String>,
    metric_label: &'static str,
}

impl RunOutcome {
    fn from_join(
        job_id: &str,
        elapsed: Duration,
        result: Result<Result<(), JobError>, JoinError>,
    ) -> Self {
        let (status, error, metric_label) = match result {
            Ok(Ok(())) => {
                info!("Job {} finished in {:?}", job_id, elapsed);
                (JobRunStatus::Completed, None, "success")
            }
            Ok(Err(JobError::Cancelled)) => {
                info!("Job {} stopped on cancellation after {:?}", job_id, elapsed);
                (JobRunStatus::Cancelled, Some("Cancelled".to_string()), "cancelled")
            }
            Ok(Err(e)) => {
                error!("Job {} failed after {:?}: {}", job_id, elapsed, e);
                (JobRunStatus::Failed, Some(e.to_string()), "failed")
            }
            Err(e) => {
                error!("Job {} panicked after {:?}: {}", job_id, elapsed, e);
                (JobRunStatus::Failed, Some(format!("Task panic: {}", e)), "panic")
            }
        };
        Self {
            status,
            error,
            metric_label,
        }
    }
}

/// Owns the registered jobs and decides when each one runs.
///
/// Work arrives from four places: elapsed intervals, hook events, manual
/// triggers sent through a [`SchedulerHandle`], and the shutdown token.
pub struct JobScheduler {
    shared_state: Arc<RwLock<SharedJobState>>,
    /// Run id and task of every run still in flight, by job id.
    running_handles: HashMap<String, (i64, JoinHandle<()>)>,
    job_cancel_tokens: HashMap<String, CancellationToken>,
    /// Hook events that arrived while their job was busy, replayed once it finishes.
    pending_hooks: HashMap<String, HookEvent>,
    /// Each run task sends its job id and run id here as its last step.
    finished_tx: mpsc::UnboundedSender<(String, i64)>,
    finished_rx: mpsc::UnboundedReceiver<(String, i64)>,
    server_store: Arc<dyn ServerStore>,
    hook_receiver: mpsc::Receiver<HookEvent>,
    command_receiver: mpsc::Receiver<SchedulerCommand>,
    shutdown_token: CancellationToken,
    job_context: JobContext,
}

impl JobScheduler {
    pub fn new(
        server_store: Arc<dyn ServerStore>,
        hook_receiver: mpsc::Receiver<HookEvent>,
        command_receiver: mpsc::Receiver<SchedulerCommand>,
        shutdown_token: CancellationToken,
        job_context: JobContext,
        shared_state: Arc<RwLock<SharedJobState>>,
    ) -> Self {
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        Self {
            shared_state,
            running_handles: HashMap::new(),
            job_cancel_tokens: HashMap::new(),
            pending_hooks: HashMap::new(),
            finished_tx,
            finished_rx,
            server_store,
            hook_receiver,
            command_receiver,
            shutdown_token,
            job_context,
        }
    }

    pub async fn register_job(&mut self, job: Arc<dyn BackgroundJob>) {
        info!("Registered job {} ({})", job.id(), job.name());
        self.shared_state
            .write()
            .await
            .jobs
            .insert(job.id().to_string(), job);
    }

    pub async fn job_count(&self) -> usize {
        self.shared_state.read().await.jobs.len()
    }

    /// Main scheduler loop. Returns after the shutdown token is cancelled.
    pub async fn run(&mut self) {
        info!("Scheduler up with {} jobs", self.job_count().await);

        self.housekeep_store();
        self.trigger_jobs_for_hook(HookEvent::OnStartup).await;

        loop {
            let sleep_for = self.time_until_next_scheduled_job().await;
            debug!("Next scheduler wake-up in {:?}", sleep_for);

            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => self.run_due_jobs().await,
                Some(event) = self.hook_receiver.recv() => {
                    debug!("Hook fired: {}", event);
                    self.trigger_jobs_for_hook(event).await;
                }
                Some(command) = self.command_receiver.recv() => self.handle_command(command).await,
                Some((job_id, run_id)) = self.finished_rx.recv() => {
                    self.on_run_finished(&job_id, run_id).await;
                }
                _ = self.shutdown_token.cancelled() => {
                    self.shutdown().await;
                    break;
                }
            }
        }

        info!("Scheduler stopped");
    }

    /// Fails runs orphaned by a previous process and prunes the audit trail.
    fn housekeep_store(&self) {
        match self.server_store.mark_stale_jobs_failed() {
            Ok(0) => {}
            Ok(count) => info!("{} runs left over from a previous process marked failed", count),
            Err(e) => error!("Could not fail stale runs: {}", e),
        }

        let cutoff = Utc::now() - chrono::Duration::days(AUDIT_RETENTION_DAYS);
        match self
            .server_store
            .cleanup_old_job_audit_entries(cutoff.timestamp())
        {
            Ok(0) => {}
            Ok(count) => info!(
                "Pruned {} job audit entries older than {} days",
                count, AUDIT_RETENTION_DAYS
            ),
            Err(e) => warn!("Failed to prune job audit log: {}", e),
        }
    }

    async fn handle_command(&mut self, command: SchedulerCommand) {
        match command {
            SchedulerCommand::TriggerJob {
                job_id,
                params,
                response,
            } => {
                let result = self.trigger_job(&job_id, params).await;
                // The caller may have given up waiting.
                let _ = response.send(result);
            }
        }
    }

    async fn trigger_job(&mut self, job_id: &str, params: Option<JsonValue>) -> Result<(), JobError> {
        {
            let state = self.shared_state.read().await;
            if !state.jobs.contains_key(job_id) {
                return Err(JobError::NotFound);
            }
            if state.running_jobs.contains(job_id) {
                return Err(JobError::AlreadyRunning);
            }
        }

        self.spawn_job(job_id, "manual", params).await;
        Ok(())
    }

    /// Registered jobs with no run in flight.
    async fn idle_jobs(&self) -> Vec<(String, Arc<dyn BackgroundJob>)> {
        let state = self.shared_state.read().await;
        state
            .jobs
            .iter()
            .filter(|(job_id, _)| !state.running_jobs.contains(*job_id))
            .map(|(job_id, job)| (job_id.clone(), Arc::clone(job)))
            .collect()
    }

    async fn time_until_next_scheduled_job(&self) -> Duration {
        let now = Utc::now();
        let mut soonest = MAX_SLEEP;

        for (job_id, job) in self.idle_jobs().await {
            let Some(next_run) = self.get_next_run_time(&job_id, job.as_ref()) else {
                continue;
            };
            if next_run <= now {
                return Duration::ZERO;
            }
            let wait = (next_run - now).to_std().unwrap_or(Duration::from_secs(1));
            soonest = soonest.min(wait);
        }

        soonest
    }

    /// Next run of an interval job; `None` for hook-only jobs.
    /// A job with no stored schedule has never run and is overdue.
    fn get_next_run_time(&self, job_id: &str, job: &dyn BackgroundJob) -> Option<DateTime<Utc>> {
        job.schedule().interval()?;
        match self.server_store.get_schedule_state(job_id) {
            Ok(Some(state)) => Some(state.next_run_at),
            Ok(None) => Some(DateTime::<Utc>::MIN_UTC),
            Err(e) => {
                warn!("Failed to read schedule state for {}: {}", job_id, e);
                None
            }
        }
    }

    async fn run_due_jobs(&mut self) {
        let now = Utc::now();
        let due: Vec<String> = self
            .idle_jobs()
            .await
            .into_iter()
            .filter(|(job_id, job)| {
                self.get_next_run_time(job_id, job.as_ref())
                    .is_some_and(|next_run| next_run <= now)
            })
            .map(|(job_id, _)| job_id)
            .collect();

        for job_id in due {
            self.spawn_job(&job_id, "schedule", None).await;
        }
    }

    /// Starts every idle job subscribed to `event`. A subscribed job that is
    /// already running gets one more run queued for when it finishes.
    async fn trigger_jobs_for_hook(&mut self, event: HookEvent) {
        let (busy, idle): (Vec<String>, Vec<String>) = {
            let state = self.shared_state.read().await;
            state
                .jobs
                .iter()
                .filter(|(_, job)| job.schedule().listens_to(event))
                .map(|(job_id, _)| job_id.clone())
                .partition(|job_id| state.running_jobs.contains(job_id))
        };

        for job_id in busy {
            debug!("{} is running, queueing a re-run for {}", job_id, event);
            self.pending_hooks.insert(job_id, event);
        }

        let trigger = format!("hook:{}", event);
        for job_id in idle {
            self.spawn_job(&job_id, &trigger, None).await;
        }
    }

    /// Pushes the next run of an interval job one interval into the future.
    fn schedule_next_run(&self, job: &dyn BackgroundJob, last_run_at: Option<DateTime<Utc>>) {
        let Some(interval) = job.schedule().interval() else {
            return;
        };
        let delta = chrono::Duration::from_std(interval.min(MAX_INTERVAL))
            .unwrap_or_else(|_| chrono::Duration::days(MAX_INTERVAL_DAYS));
        let schedule_state = JobScheduleState {
            job_id: job.id().to_string(),
            next_run_at: Utc::now() + delta,
            last_run_at,
        };
        if let Err(e) = self.server_store.update_schedule_state(&schedule_state) {
            error!("Failed to update schedule state for {}: {}", job.id(), e);
        }
    }

    async fn spawn_job(&mut self, job_id: &str, triggered_by: &str, params: Option<JsonValue>) {
        let Some(job) = self.shared_state.read().await.jobs.get(job_id).cloned() else {
            error!("Cannot start unregistered job {}", job_id);
            return;
        };

        let run_id = match self.server_store.record_job_start(job_id, triggered_by) {
            Ok(id) => id,
            Err(e) => {
                error!("Not starting {}, its run could not be recorded: {}", job_id, e);
                return;
            }
        };
        info!("Run {} of {} started ({})", run_id, job_id, triggered_by);

        self.shared_state
            .write()
            .await
            .running_jobs
            .insert(job_id.to_string());

        // Set before the run so a slow job is not picked up again by the next loop iteration.
        self.schedule_next_run(job.as_ref(), None);

        metrics::set_background_job_running(job_id, true);
        self.job_context.progress.set(job_id, 0.0);

        let cancel_token = self.job_context.cancellation_token.child_token();
        self.job_cancel_tokens
            .insert(job_id.to_string(), cancel_token.clone());
        let ctx = self.job_context.with_cancellation_token(cancel_token);

        let server_store = Arc::clone(&self.server_store);
        let shared_state = Arc::clone(&self.shared_state);
        let progress = self.job_context.progress.clone();
        let finished_tx = self.finished_tx.clone();
        let id = job_id.to_string();

        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let result =
                tokio::task::spawn_blocking(move || job.execute_with_params(&ctx, params)).await;
            let elapsed = started.elapsed();
            let outcome = RunOutcome::from_join(&id, elapsed, result);

            metrics::record_background_job_execution(&id, outcome.metric_label, elapsed);
            metrics::set_background_job_running(&id, false);
            progress.clear(&id);

            // A run recorded as finished must already be out of the running set.
            shared_state.write().await.running_jobs.remove(&id);

            if let Err(e) = server_store.record_job_finish(run_id, outcome.status, outcome.error) {
                error!("Run {} of {} finished but was not recorded: {}", run_id, id, e);
            }
            let _ = finished_tx.send((id, run_id));
        });

        self.running_handles
            .insert(job_id.to_string(), (run_id, handle));
    }

    /// Reaps a finished run, starts the next interval from its end time and
    /// replays a hook that fired while it was running.
    async fn on_run_finished(&mut self, job_id: &str, run_id: i64) {
        // A manual trigger can start a newer run before this message is read.
        let tracked = self
            .running_handles
            .get(job_id)
            .map(|(current, _)| *current == run_id);
        match tracked {
            Some(true) => {
                if let Some((_, handle)) = self.running_handles.remove(job_id) {
                    let _ = handle.await;
                }
                self.job_cancel_tokens.remove(job_id);
            }
            Some(false) => return,
            None => {}
        }

        let job = self.shared_state.read().await.jobs.get(job_id).cloned();
        if let Some(job) = job {
            self.schedule_next_run(job.as_ref(), Some(Utc::now()));
        }

        if let Some(event) = self.pending_hooks.remove(job_id) {
            let trigger = format!("hook:{}", event);
            self.spawn_job(job_id, &trigger, None).await;
        }
    }

    /// Cancels cancellable jobs and waits for all running jobs to finish.
    async fn shutdown(&mut self) {
        info!("Scheduler shutting down, {} runs in flight", self.running_handles.len());

        let mut in_flight = Vec::new();
        {
            let state = self.shared_state.read().await;
            for (job_id, (_, handle)) in self.running_handles.drain() {
                let behavior = state
                    .jobs
                    .get(&job_id)
                    .map(|job| job.shutdown_behavior())
                    .unwrap_or_default();
                match (behavior, self.job_cancel_tokens.get(&job_id)) {
                    (ShutdownBehavior::Cancellable, Some(token)) => {
                        debug!("Cancelling {}", job_id);
                        token.cancel();
                    }
                    (ShutdownBehavior::Cancellable, None) => {}
                    (ShutdownBehavior::WaitForCompletion, _) => {
                        info!("Letting {} finish before exit", job_id);
                    }
                }
                in_flight.push((job_id, handle));
            }
        }

        for (job_id, handle) in in_flight {
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await.is_err() {
                warn!("Job {} did not stop within {:?}", job_id, SHUTDOWN_TIMEOUT);
            }
        }

        self.job_cancel_tokens.clear();
        self.pending_hooks.clear();
    }
}

/// Builds a scheduler and the handle the HTTP layer talks to it through.
pub fn create_scheduler(
    server_store: Arc<dyn ServerStore>,
    hook_receiver: mpsc::Receiver<HookEvent>,
    shutdown_token: CancellationToken,
    job_context: JobContext,
) -> (JobScheduler, SchedulerHandle) {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let shared_state = Arc::new(RwLock::new(SharedJobState {
        jobs: HashMap::new(),
        running_jobs: HashSet::new(),
    }));
    let progress = job_context.progress.clone();

    let scheduler = JobScheduler::new(
        Arc::clone(&server_store),
        hook_receiver,
        command_rx,
        shutdown_token,
        job_context,
        Arc::clone(&shared_state),
    );
    let handle = SchedulerHandle::new(command_tx, shared_state, server_store, progress);

    (scheduler, handle)
}
