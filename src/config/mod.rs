mod file_config;
mod plugin;

pub use file_config::{BackgroundJobsConfig, FileConfig};
pub use plugin::{
    ConfigurationManager, PluginConfiguration, SomeOptions, PLUGIN_CONFIGURATION_KEY,
};

use crate::collections::NameMatching;
use crate::server::RequestsLoggingLevel;
use anyhow::{anyhow, bail, Result};
use clap::ValueEnum;
use std::path::{Path, PathBuf};

const CATALOG_DB_FILE: &str = "catalog.db";
const USER_DB_FILE: &str = "user.db";
const SERVER_DB_FILE: &str = "server.db";

/// Ten years.
pub const MAX_GENRE_INTERVAL_HOURS: u64 = 10 * 365 * 24;

/// The subset of command line flags that a TOML file may override.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub genre_interval_hours: Option<u64>,
    pub name_matching: Option<NameMatching>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,

    pub background_jobs: BackgroundJobsSettings,

    /// Plugin configuration from the TOML file, if it has a `[plugin]` table.
    pub plugin: Option<PluginConfiguration>,
}

impl AppConfig {
    /// Merges the command line with the optional TOML file. A value present
    /// in the file wins over the flag.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = match file.db_dir {
            Some(dir) => PathBuf::from(dir),
            None => cli
                .db_dir
                .clone()
                .ok_or_else(|| anyhow!("No database directory: pass --db-dir or set db_dir"))?,
        };
        check_db_dir(&db_dir)?;

        let logging_level = match file.logging_level.as_deref().map(parse_logging_level) {
            Some(Some(level)) => level,
            _ => cli.logging_level.clone(),
        };

        let jobs = file.background_jobs.unwrap_or_default();
        let defaults = GenreCollectionsJobSettings::default();
        let genre_collections = GenreCollectionsJobSettings {
            interval_hours: jobs
                .genre_collections_interval_hours
                .or(cli.genre_interval_hours)
                .unwrap_or(defaults.interval_hours),
            name_matching: jobs
                .name_matching
                .or(cli.name_matching)
                .unwrap_or(defaults.name_matching),
        };
        if genre_collections.interval_hours == 0 {
            bail!("genre_collections_interval_hours must be greater than zero");
        }
        if genre_collections.interval_hours > MAX_GENRE_INTERVAL_HOURS {
            bail!(
                "genre_collections_interval_hours must be at most {}",
                MAX_GENRE_INTERVAL_HOURS
            );
        }

        Ok(Self {
            db_dir,
            port: file.port.unwrap_or(cli.port),
            logging_level,
            background_jobs: BackgroundJobsSettings { genre_collections },
            plugin: file.plugin,
        })
    }

    pub fn catalog_db_path(&self) -> PathBuf {
        self.db_dir.join(CATALOG_DB_FILE)
    }

    pub fn user_db_path(&self) -> PathBuf {
        self.db_dir.join(USER_DB_FILE)
    }

    pub fn server_db_path(&self) -> PathBuf {
        self.db_dir.join(SERVER_DB_FILE)
    }
}

fn check_db_dir(dir: &Path) -> Result<()> {
    match std::fs::metadata(dir) {
        Err(_) => bail!("Database directory {} is missing", dir.display()),
        Ok(meta) if !meta.is_dir() => bail!("Database path {} is a file", dir.display()),
        Ok(_) => Ok(()),
    }
}

#[derive(Debug, Clone, Default)]
pub struct BackgroundJobsSettings {
    pub genre_collections: GenreCollectionsJobSettings,
}

#[derive(Debug, Clone)]
pub struct GenreCollectionsJobSettings {
    pub interval_hours: u64,
    pub name_matching: NameMatching,
}

impl Default for GenreCollectionsJobSettings {
    fn default() -> Self {
        Self {
            interval_hours: 24,
            name_matching: NameMatching::Exact,
        }
    }
}

/// Case-insensitive; unknown names yield `None`.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
