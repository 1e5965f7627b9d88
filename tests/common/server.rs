//! Test server lifecycle management
//!
//! Each test gets an isolated scheduler and router backed by its own
//! SQLite databases in a temp directory.

use super::fixtures::{create_test_catalog, create_test_users, TestCatalog};
use genre_collections::background_jobs::jobs::{GenreCollectionsJob, PinnedCollectionsJob};
use genre_collections::background_jobs::{create_scheduler, JobContext, SchedulerHandle};
use genre_collections::catalog_store::SqliteCatalogStore;
use genre_collections::config::{ConfigurationManager, GenreCollectionsJobSettings};
use genre_collections::server::state::ServerState;
use genre_collections::server::{make_app, RequestsLoggingLevel, ServerConfig};
use genre_collections::server_store::SqliteServerStore;
use genre_collections::user::SqliteUserStore;
use axum::Router;
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Test server instance with isolated databases.
///
/// When dropped, the scheduler is shut down and temp resources are cleaned up.
pub struct TestServer {
    pub app: Router,
    pub scheduler_handle: SchedulerHandle,
    pub catalog_store: Arc<SqliteCatalogStore>,
    pub user_store: Arc<SqliteUserStore>,
    pub server_store: Arc<SqliteServerStore>,
    pub catalog: TestCatalog,
    pub alice: usize,
    pub bob: usize,

    shutdown_token: CancellationToken,
    scheduler_task: Option<JoinHandle<()>>,
    _temp_dir: TempDir,
}

impl TestServer {
    /// Spawns a server with the default genre job settings.
    ///
    /// The genre job has never run in a fresh database, so it starts
    /// right away.
    pub async fn spawn() -> Self {
        Self::spawn_with_settings(GenreCollectionsJobSettings::default()).await
    }

    pub async fn spawn_with_settings(settings: GenreCollectionsJobSettings) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let (catalog_store, catalog) =
            create_test_catalog(temp_dir.path()).expect("Failed to create test catalog");
        let (user_store, alice, bob) =
            create_test_users(temp_dir.path()).expect("Failed to create test users");
        let catalog_store = Arc::new(catalog_store);
        let user_store = Arc::new(user_store);
        let server_store = Arc::new(
            SqliteServerStore::new(temp_dir.path().join("server.db"))
                .expect("Failed to create server store"),
        );

        let shutdown_token = CancellationToken::new();
        let (hook_sender, hook_receiver) = tokio::sync::mpsc::channel(100);

        let job_context = JobContext::new(
            shutdown_token.child_token(),
            catalog_store.clone(),
            catalog_store.clone(),
            user_store.clone(),
            user_store.clone(),
            server_store.clone(),
        );
        let (mut scheduler, scheduler_handle) = create_scheduler(
            server_store.clone(),
            hook_receiver,
            shutdown_token.clone(),
            job_context,
        );
        scheduler
            .register_job(Arc::new(GenreCollectionsJob::from_settings(&settings)))
            .await;
        scheduler
            .register_job(Arc::new(PinnedCollectionsJob::new()))
            .await;
        let scheduler_task = tokio::spawn(async move { scheduler.run().await });

        let state = ServerState {
            config: ServerConfig {
                requests_logging_level: RequestsLoggingLevel::None,
                port: 0,
            },
            start_time: Instant::now(),
            scheduler_handle: scheduler_handle.clone(),
            configuration: Arc::new(ConfigurationManager::new(
                server_store.clone(),
                Some(hook_sender),
            )),
        };

        TestServer {
            app: make_app(state),
            scheduler_handle,
            catalog_store,
            user_store,
            server_store,
            catalog,
            alice,
            bob,
            shutdown_token,
            scheduler_task: Some(scheduler_task),
            _temp_dir: temp_dir,
        }
    }

    /// Cancels the scheduler and waits for running jobs to wind down.
    pub async fn shutdown(mut self) {
        self.shutdown_token.cancel();
        if let Some(task) = self.scheduler_task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}
