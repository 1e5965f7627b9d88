use super::plugin::PluginConfiguration;
use crate::collections::NameMatching;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub port: Option<u16>,
    pub logging_level: Option<String>,

    pub background_jobs: Option<BackgroundJobsConfig>,

    /// Saved to the server store at startup when present.
    pub plugin: Option<PluginConfiguration>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct BackgroundJobsConfig {
    pub genre_collections_interval_hours: Option<u64>,
    pub name_matching: Option<NameMatching>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::plugin::SomeOptions;
    use std::io::Write;
    use uuid::Uuid;

    #[test]
    fn parses_full_file() {
        let pinned = Uuid::new_v4();
        let content = format!(
            r#"
db_dir = "/data"
port = 4000
logging_level = "headers"

[background_jobs]
genre_collections_interval_hours = 6
name_matching = "case_insensitive"

[plugin]
pinned_collection_ids = ["{pinned}"]
true_false_setting = true
an_integer = 7
a_string = "hello"
options = "another_option"
"#
        );

        let config: FileConfig = toml::from_str(&content).unwrap();

        assert_eq!(config.db_dir.as_deref(), Some("/data"));
        assert_eq!(config.port, Some(4000));
        let jobs = config.background_jobs.unwrap();
        assert_eq!(jobs.genre_collections_interval_hours, Some(6));
        assert_eq!(jobs.name_matching, Some(NameMatching::CaseInsensitive));
        let plugin = config.plugin.unwrap();
        assert_eq!(plugin.pinned_collection_ids, vec![pinned]);
        assert!(plugin.true_false_setting);
        assert_eq!(plugin.an_integer, 7);
        assert_eq!(plugin.options, SomeOptions::AnotherOption);
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let config: FileConfig = toml::from_str("").unwrap();
        assert!(config.db_dir.is_none());
        assert!(config.background_jobs.is_none());
        assert!(config.plugin.is_none());
    }

    #[test]
    fn partial_plugin_section_uses_defaults() {
        let config: FileConfig = toml::from_str("[plugin]\nan_integer = 3\n").unwrap();
        let plugin = config.plugin.unwrap();
        assert_eq!(plugin.an_integer, 3);
        assert!(plugin.pinned_collection_ids.is_empty());
        assert_eq!(plugin.options, SomeOptions::OneOption);
    }

    #[test]
    fn load_reports_parse_errors_with_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = \"not a number\"").unwrap();

        let err = FileConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn load_missing_file_fails() {
        let err = FileConfig::load(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
