//! Pinned collections background job.
//!
//! Runs whenever the plugin configuration is saved and marks the pinned
//! collections as favorites of every user.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, HookEvent, JobError, JobSchedule},
    JobAuditLogger,
};
use crate::collections::PinSynchronizer;
use crate::config::ConfigurationManager;
use crate::server::metrics;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use uuid::Uuid;

/// Body accepted by a manual trigger, overriding the saved pin list.
#[derive(Debug, Deserialize)]
struct PinParams {
    pinned_collection_ids: Vec<Uuid>,
}

#[derive(Default)]
pub struct PinnedCollectionsJob;

impl PinnedCollectionsJob {
    pub fn new() -> Self {
        Self
    }

    fn apply(&self, ctx: &JobContext, pinned_ids: &[Uuid]) -> Result<(), JobError> {
        let audit = JobAuditLogger::new(Arc::clone(&ctx.server_store), self.id());
        audit.log_started(Some(serde_json::json!({
            "pinned_collection_ids": pinned_ids,
        })));
        ctx.report_progress(self.id(), 0.0);

        let synchronizer = PinSynchronizer::new(
            Arc::clone(&ctx.catalog_store),
            Arc::clone(&ctx.user_registry),
            Arc::clone(&ctx.favorites_store),
        );

        match synchronizer.apply_pins(pinned_ids) {
            Ok(report) => {
                metrics::record_favorites_set(report.favorites_set);
                ctx.report_progress(self.id(), 100.0);
                audit.log_completed(serde_json::to_value(&report).ok());
                Ok(())
            }
            Err(e) => {
                let error_msg = format!("{:#}", e);
                audit.log_failed(&error_msg, None);
                Err(JobError::ExecutionFailed(error_msg))
            }
        }
    }
}

impl BackgroundJob for PinnedCollectionsJob {
    fn id(&self) -> &'static str {
        "pinned_collections"
    }

    fn name(&self) -> &'static str {
        "Apply Pinned Collections"
    }

    fn description(&self) -> &'static str {
        "Mark the configured pinned collections as favorites for every user"
    }

    fn category(&self) -> &'static str {
        "Library"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Hook(HookEvent::OnConfigurationChanged)
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }
        let configuration = ConfigurationManager::new(Arc::clone(&ctx.server_store), None)
            .load()
            .map_err(|e| JobError::ExecutionFailed(format!("{:#}", e)))?;
        self.apply(ctx, &configuration.pinned_collection_ids)
    }

    fn execute_with_params(
        &self,
        ctx: &JobContext,
        params: Option<JsonValue>,
    ) -> Result<(), JobError> {
        match params {
            None => self.execute(ctx),
            Some(value) => {
                let params: PinParams = serde_json::from_value(value)
                    .map_err(|e| JobError::InvalidParams(e.to_string()))?;
                self.apply(ctx, &params.pinned_collection_ids)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::test_support::{InMemoryCatalog, InMemoryUsers};
    use crate::config::PluginConfiguration;
    use crate::server_store::SqliteServerStore;
    use std::collections::HashSet;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    struct Fixture {
        catalog: Arc<InMemoryCatalog>,
        users: Arc<InMemoryUsers>,
        ctx: JobContext,
        _temp_dir: TempDir,
    }

    fn fixture() -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let catalog = Arc::new(InMemoryCatalog::default());
        let users = Arc::new(InMemoryUsers::default());
        let server_store =
            Arc::new(SqliteServerStore::new(temp_dir.path().join("server.db")).unwrap());
        let ctx = JobContext::new(
            CancellationToken::new(),
            catalog.clone(),
            catalog.clone(),
            users.clone(),
            users.clone(),
            server_store,
        );
        Fixture {
            catalog,
            users,
            ctx,
            _temp_dir: temp_dir,
        }
    }

    #[test]
    fn test_job_metadata() {
        let job = PinnedCollectionsJob::new();
        assert_eq!(job.id(), "pinned_collections");
        assert_eq!(job.category(), "Library");
        assert!(matches!(
            job.schedule(),
            JobSchedule::Hook(HookEvent::OnConfigurationChanged)
        ));
    }

    #[test]
    fn test_execute_applies_saved_configuration() {
        let f = fixture();
        let drama = f.catalog.add_collection("Drama", &[]);
        let alice = f.users.add_user("alice");
        ConfigurationManager::new(f.ctx.server_store.clone(), None)
            .save(&PluginConfiguration {
                pinned_collection_ids: vec![drama],
                ..Default::default()
            })
            .unwrap();

        PinnedCollectionsJob::new().execute(&f.ctx).unwrap();

        assert_eq!(f.users.favorites_of(alice), HashSet::from([drama]));
    }

    #[test]
    fn test_execute_without_configuration_is_a_no_op() {
        let f = fixture();
        f.users.add_user("alice");

        PinnedCollectionsJob::new().execute(&f.ctx).unwrap();

        assert_eq!(f.users.set_calls(), 0);
    }

    #[test]
    fn test_params_override_saved_list() {
        let f = fixture();
        let drama = f.catalog.add_collection("Drama", &[]);
        let comedy = f.catalog.add_collection("Comedy", &[]);
        let alice = f.users.add_user("alice");
        ConfigurationManager::new(f.ctx.server_store.clone(), None)
            .save(&PluginConfiguration {
                pinned_collection_ids: vec![drama],
                ..Default::default()
            })
            .unwrap();

        let params = serde_json::json!({ "pinned_collection_ids": [comedy] });
        PinnedCollectionsJob::new()
            .execute_with_params(&f.ctx, Some(params))
            .unwrap();

        assert_eq!(f.users.favorites_of(alice), HashSet::from([comedy]));
    }

    #[test]
    fn test_invalid_params_are_rejected() {
        let f = fixture();
        let params = serde_json::json!({ "pinned_collection_ids": ["not-a-uuid"] });

        let result = PinnedCollectionsJob::new().execute_with_params(&f.ctx, Some(params));

        assert!(matches!(result, Err(JobError::InvalidParams(_))));
    }

    #[test]
    fn test_user_listing_failure_fails_job() {
        let f = fixture();
        let drama = f.catalog.add_collection("Drama", &[]);
        f.users.fail_list_users();

        let params = serde_json::json!({ "pinned_collection_ids": [drama] });
        let result = PinnedCollectionsJob::new().execute_with_params(&f.ctx, Some(params));

        assert!(matches!(result, Err(JobError::ExecutionFailed(_))));
    }
}
