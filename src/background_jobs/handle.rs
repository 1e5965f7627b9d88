use super::context::JobProgressTracker;
use super::job::{BackgroundJob, HookEvent, JobError, JobSchedule};
use crate::server_store::{JobAuditEntry, JobRun, ServerStore};
use anyhow::Result;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};

/// A registered job as reported by the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub schedule: JobScheduleInfo,
    pub is_running: bool,
    /// Completion percentage of the current run, if one is in progress.
    pub progress: Option<f64>,
    pub last_run: Option<JobRunInfo>,
    pub next_run_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobScheduleInfo {
    #[serde(rename = "type")]
    pub schedule_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hooks: Option<Vec<String>>,
}

fn hook_names(hooks: &[HookEvent]) -> Vec<String> {
    hooks.iter().map(HookEvent::to_string).collect()
}

impl From<JobSchedule> for JobScheduleInfo {
    fn from(schedule: JobSchedule) -> Self {
        let (kind, hooks) = match &schedule {
            JobSchedule::Interval(_) => ("interval", None),
            JobSchedule::Hook(event) => ("hook", Some(hook_names(std::slice::from_ref(event)))),
            JobSchedule::Combined { hooks, .. } => ("combined", Some(hook_names(hooks))),
        };
        JobScheduleInfo {
            schedule_type: kind.to_string(),
            value_secs: schedule.interval().map(|every| every.as_secs()),
            hooks,
        }
    }
}

/// One row of a job's run history, timestamps in RFC 3339.
#[derive(Debug, Clone, Serialize)]
pub struct JobRunInfo {
    pub started_at: String,
    pub finished_at: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
    pub triggered_by: String,
}

impl From<JobRun> for JobRunInfo {
    fn from(run: JobRun) -> Self {
        let status = run.status.as_str().to_string();
        JobRunInfo {
            started_at: run.started_at.to_rfc3339(),
            finished_at: run.finished_at.as_ref().map(|at| at.to_rfc3339()),
            status,
            error_message: run.error_message,
            triggered_by: run.triggered_by,
        }
    }
}

pub enum SchedulerCommand {
    TriggerJob {
        job_id: String,
        params: Option<JsonValue>,
        response: oneshot::Sender<Result<(), JobError>>,
    },
}

/// Registry of jobs plus the set currently executing, owned by the scheduler
/// and read by every handle.
pub struct SharedJobState {
    pub jobs: HashMap<String, Arc<dyn BackgroundJob>>,
    pub running_jobs: HashSet<String>,
}

/// Cloneable front door to the scheduler used by the HTTP layer.
#[derive(Clone)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
    shared_state: Arc<RwLock<SharedJobState>>,
    server_store: Arc<dyn ServerStore>,
    progress: JobProgressTracker,
}

impl SchedulerHandle {
    pub fn new(
        command_tx: mpsc::Sender<SchedulerCommand>,
        shared_state: Arc<RwLock<SharedJobState>>,
        server_store: Arc<dyn ServerStore>,
        progress: JobProgressTracker,
    ) -> Self {
        Self {
            command_tx,
            shared_state,
            server_store,
            progress,
        }
    }

    fn job_info(&self, state: &SharedJobState, job_id: &str) -> Result<Option<JobInfo>> {
        let Some(job) = state.jobs.get(job_id) else {
            return Ok(None);
        };
        let is_running = state.running_jobs.contains(job_id);
        let last_run = self.server_store.get_last_run(job_id)?.map(JobRunInfo::from);
        let next_run_at = self
            .server_store
            .get_schedule_state(job_id)?
            .map(|schedule| schedule.next_run_at.to_rfc3339());

        Ok(Some(JobInfo {
            id: job_id.to_string(),
            name: job.name().to_string(),
            description: job.description().to_string(),
            category: job.category().to_string(),
            schedule: job.schedule().into(),
            is_running,
            progress: is_running.then(|| self.progress.get(job_id)).flatten(),
            last_run,
            next_run_at,
        }))
    }

    /// All registered jobs, sorted by id.
    pub async fn list_jobs(&self) -> Result<Vec<JobInfo>> {
        let state = self.shared_state.read().await;
        let mut ids: Vec<&String> = state.jobs.keys().collect();
        ids.sort();

        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            jobs.extend(self.job_info(&state, id)?);
        }
        Ok(jobs)
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Option<JobInfo>> {
        let state = self.shared_state.read().await;
        self.job_info(&state, job_id)
    }

    /// Asks the scheduler to start `job_id` now and waits for its verdict.
    pub async fn trigger_job(&self, job_id: &str, params: Option<JsonValue>) -> Result<(), JobError> {
        let (response, verdict) = oneshot::channel();
        let command = SchedulerCommand::TriggerJob {
            job_id: job_id.to_owned(),
            params,
            response,
        };

        if self.command_tx.send(command).await.is_err() {
            return Err(JobError::ExecutionFailed(
                "Scheduler is not accepting commands".to_string(),
            ));
        }
        verdict.await.unwrap_or_else(|_| {
            Err(JobError::ExecutionFailed(
                "Scheduler dropped the trigger request".to_string(),
            ))
        })
    }

    pub fn get_job_history(&self, job_id: &str, limit: usize) -> Result<Vec<JobRunInfo>> {
        let runs = self.server_store.get_job_history(job_id, limit)?;
        Ok(runs.into_iter().map(Into::into).collect())
    }

    pub async fn is_job_running(&self, job_id: &str) -> bool {
        self.shared_state.read().await.running_jobs.contains(job_id)
    }

    pub async fn job_exists(&self, job_id: &str) -> bool {
        self.shared_state.read().await.jobs.contains_key(job_id)
    }

    pub fn get_job_audit_log(&self, limit: usize, offset: usize) -> Result<Vec<JobAuditEntry>> {
        self.server_store.get_job_audit_log(limit, offset)
    }

    pub fn get_job_audit_log_by_job(
        &self,
        job_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<JobAuditEntry>> {
        self.server_store.get_job_audit_log_by_job(job_id, limit, offset)
    }
}
