use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use genre_collections::background_jobs::jobs::{GenreCollectionsJob, PinnedCollectionsJob};
use genre_collections::background_jobs::{create_scheduler, JobContext};
use genre_collections::catalog_store::{ItemKind, SqliteCatalogStore};
use genre_collections::collections::NameMatching;
use genre_collections::config::{self, ConfigurationManager};
use genre_collections::server::{metrics, run_server, RequestsLoggingLevel};
use genre_collections::server_store::SqliteServerStore;
use genre_collections::user::SqliteUserStore;

/// Makes `s` absolute against the working directory without requiring it to exist.
fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(s);
    match path.canonicalize() {
        Ok(resolved) => Ok(resolved),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => std::env::current_dir()
            .map(|cwd| cwd.join(&path))
            .map_err(|e| format!("Cannot resolve '{}' against the working directory: {}", s, e)),
        Err(e) => Err(format!("Cannot resolve '{}': {}", s, e)),
    }
}

fn parse_dir(s: &str) -> Result<PathBuf, String> {
    let path = parse_path(s)?;
    if path.is_dir() {
        Ok(path)
    } else {
        Err(format!("'{}' is not an existing directory", s))
    }
}

const HOOK_CHANNEL_CAPACITY: usize = 100;

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to a TOML config file. Values in the file override CLI flags.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding catalog.db, user.db and server.db.
    #[clap(long, value_parser = parse_dir)]
    pub db_dir: Option<PathBuf>,

    /// Admin API port.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// How much of each admin request to log.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Hours between genre collection runs.
    #[clap(long)]
    pub genre_interval_hours: Option<u64>,

    /// How genre names are matched against existing collection names.
    #[clap(long)]
    pub name_matching: Option<NameMatching>,
}

impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            db_dir: args.db_dir.clone(),
            port: args.port,
            logging_level: args.logging_level.clone(),
            genre_interval_hours: args.genre_interval_hours,
            name_matching: args.name_matching,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    let file_config = cli_args
        .config
        .as_deref()
        .map(|path| {
            info!("Reading config file {}", path.display());
            config::FileConfig::load(path)
        })
        .transpose()?;
    let app_config = config::AppConfig::resolve(&config::CliConfig::from(&cli_args), file_config)?;

    let genre_settings = &app_config.background_jobs.genre_collections;
    info!(
        "db_dir={} port={} genre_interval={}h name_matching={:?}",
        app_config.db_dir.display(),
        app_config.port,
        genre_settings.interval_hours,
        genre_settings.name_matching
    );

    for (label, path) in [
        ("catalog", app_config.catalog_db_path()),
        ("user", app_config.user_db_path()),
        ("server", app_config.server_db_path()),
    ] {
        if !path.exists() {
            info!("No {} database yet, creating {}", label, path.display());
        }
    }
    let catalog_store = Arc::new(SqliteCatalogStore::new(app_config.catalog_db_path())?);
    let user_store = Arc::new(SqliteUserStore::new(app_config.user_db_path())?);
    let server_store = Arc::new(SqliteServerStore::new(app_config.server_db_path())?);

    metrics::init_metrics();
    metrics::init_catalog_metrics(
        catalog_store.count_items(ItemKind::Movie)?,
        catalog_store.count_items(ItemKind::Collection)?,
    );

    let shutdown_token = CancellationToken::new();
    let (hook_sender, hook_receiver) = tokio::sync::mpsc::channel(HOOK_CHANNEL_CAPACITY);

    let configuration = ConfigurationManager::new(server_store.clone(), Some(hook_sender));
    if let Some(plugin) = &app_config.plugin {
        let current = configuration.load()?;
        if &current != plugin {
            info!("Applying plugin configuration from config file");
            configuration.save(plugin)?;
        }
    }

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
        .register_job(Arc::new(GenreCollectionsJob::from_settings(
            &app_config.background_jobs.genre_collections,
        )))
        .await;
    scheduler
        .register_job(Arc::new(PinnedCollectionsJob::new()))
        .await;

    let scheduler_task = tokio::spawn(async move { scheduler.run().await });

    info!("Admin API listening on port {}", app_config.port);

    let result = tokio::select! {
        result = run_server(
            scheduler_handle,
            configuration,
            app_config.logging_level.clone(),
            app_config.port,
        ) => {
            warn!("Admin API stopped on its own");
            result
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            Ok(())
        }
    };

    shutdown_token.cancel();
    match scheduler_task.await {
        Ok(()) => info!("Scheduler stopped"),
        Err(e) => warn!("Scheduler task ended abnormally: {}", e),
    }

    if let Err(e) = &result {
        error!("Exiting with error: {:#}", e);
    }
    result
}
