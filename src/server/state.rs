use axum::extract::FromRef;

use crate::background_jobs::SchedulerHandle;
use crate::config::ConfigurationManager;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedConfigurationManager = Arc<ConfigurationManager>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub scheduler_handle: SchedulerHandle,
    pub configuration: GuardedConfigurationManager,
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}

impl FromRef<ServerState> for SchedulerHandle {
    fn from_ref(input: &ServerState) -> Self {
        input.scheduler_handle.clone()
    }
}

impl FromRef<ServerState> for GuardedConfigurationManager {
    fn from_ref(input: &ServerState) -> Self {
        input.configuration.clone()
    }
}
