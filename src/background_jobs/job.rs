use super::context::JobContext;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub enum JobSchedule {
    /// Every `Duration`. The next due time is persisted across restarts.
    Interval(Duration),
    /// Only when the event fires.
    Hook(HookEvent),
    Combined {
        interval: Option<Duration>,
        hooks: Vec<HookEvent>,
    },
}

impl JobSchedule {
    pub fn interval(&self) -> Option<Duration> {
        match self {
            JobSchedule::Interval(interval) => Some(*interval),
            JobSchedule::Combined { interval, .. } => *interval,
            JobSchedule::Hook(_) => None,
        }
    }

    pub fn listens_to(&self, event: HookEvent) -> bool {
        match self {
            JobSchedule::Hook(hook_event) => *hook_event == event,
            JobSchedule::Combined { hooks, .. } => hooks.contains(&event),
            JobSchedule::Interval(_) => false,
        }
    }
}

/// Server events a job can subscribe to through its schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    OnStartup,
    /// Plugin configuration was saved through the admin API or at boot.
    OnConfigurationChanged,
}

impl HookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookEvent::OnStartup => "OnStartup",
            HookEvent::OnConfigurationChanged => "OnConfigurationChanged",
        }
    }
}

impl std::fmt::Display for HookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the scheduler does with a running job when the server stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownBehavior {
    /// Cancel its token and stop waiting for it.
    #[default]
    Cancellable,
    /// Let it finish before the scheduler returns.
    WaitForCompletion,
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job not found")]
    NotFound,
    #[error("Job is already running")]
    AlreadyRunning,
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
    #[error("Job was cancelled")]
    Cancelled,
}

/// A unit of work the scheduler can run on its own or on request.
///
/// `execute` runs on a blocking thread. Jobs that loop over many items
/// should poll `ctx.is_cancelled()` and bail out with `JobError::Cancelled`.
pub trait BackgroundJob: Send + Sync {
    /// Stable key used in URLs, history rows and metric labels.
    fn id(&self) -> &'static str;

    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Grouping shown in the admin job list.
    fn category(&self) -> &'static str {
        "General"
    }

    fn schedule(&self) -> JobSchedule;

    fn shutdown_behavior(&self) -> ShutdownBehavior {
        ShutdownBehavior::Cancellable
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError>;

    /// Entry point for manual triggers that carry a JSON body. Jobs without
    /// parameters keep the default, which ignores them.
    fn execute_with_params(&self, ctx: &JobContext, params: Option<Value>) -> Result<(), JobError> {
        let _ = params;
        self.execute(ctx)
    }
}
