//! Plugin configuration persisted in the server store.
//!
//! Saving a configuration notifies the scheduler with
//! [`HookEvent::OnConfigurationChanged`], which is what re-applies the
//! pinned collections.

use crate::background_jobs::HookEvent;
use crate::server_store::ServerStore;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Server state key holding the JSON encoded [`PluginConfiguration`].
pub const PLUGIN_CONFIGURATION_KEY: &str = "plugin_configuration";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SomeOptions {
    #[default]
    OneOption,
    AnotherOption,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfiguration {
    /// Collections every user gets as favorites.
    pub pinned_collection_ids: Vec<Uuid>,

    // Example settings, not read by any job.
    pub true_false_setting: bool,
    pub an_integer: i64,
    pub a_string: String,
    pub options: SomeOptions,
}

impl Default for PluginConfiguration {
    fn default() -> Self {
        Self {
            pinned_collection_ids: Vec::new(),
            true_false_setting: true,
            an_integer: 2,
            a_string: "string".to_string(),
            options: SomeOptions::OneOption,
        }
    }
}

/// Loads and saves the plugin configuration.
#[derive(Clone)]
pub struct ConfigurationManager {
    server_store: Arc<dyn ServerStore>,
    hook_sender: Option<mpsc::Sender<HookEvent>>,
}

impl ConfigurationManager {
    pub fn new(
        server_store: Arc<dyn ServerStore>,
        hook_sender: Option<mpsc::Sender<HookEvent>>,
    ) -> Self {
        Self {
            server_store,
            hook_sender,
        }
    }

    /// The saved configuration, or the default one if nothing was saved yet.
    pub fn load(&self) -> Result<PluginConfiguration> {
        match self.server_store.get_state(PLUGIN_CONFIGURATION_KEY)? {
            Some(json) => serde_json::from_str(&json)
                .context("Failed to parse stored plugin configuration"),
            None => Ok(PluginConfiguration::default()),
        }
    }

    pub fn save(&self, configuration: &PluginConfiguration) -> Result<()> {
        let json = serde_json::to_string(configuration)
            .context("Failed to serialize plugin configuration")?;
        self.server_store
            .set_state(PLUGIN_CONFIGURATION_KEY, &json)?;
        info!(
            "Plugin configuration saved ({} pinned collections)",
            configuration.pinned_collection_ids.len()
        );

        if let Some(sender) = &self.hook_sender {
            if let Err(e) = sender.try_send(HookEvent::OnConfigurationChanged) {
                warn!("Failed to notify scheduler of configuration change: {}", e);
            }
        }
        Ok(())
    }
}
