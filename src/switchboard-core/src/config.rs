//! Switchboard configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::catalog::{FeatureCatalog, FeatureDefinition};
use crate::env::{EnvironmentCodec, DEFAULT_DISABLED_VAR, DEFAULT_ENABLED_VAR};
use crate::legacy::LegacyXmlFile;
use crate::persistence::{FeaturePersistence, DEFAULT_KEY_PREFIX};
use crate::store::TomlSettingsStore;
use crate::{FeatureError, Result};

/// Environment variable pointing at an alternative config file.
pub const CONFIG_ENV_VAR: &str = "SWITCHBOARD_CONFIG";

const APP_DIR: &str = "switchboard";
const CONFIG_FILE: &str = "config.toml";
const SETTINGS_FILE: &str = "settings.toml";

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchboardConfig {
    pub environment: EnvironmentConfig,
    pub store: StoreConfig,
    pub restart: RestartConfig,
    /// Features the tool declares, with their defaults.
    pub catalog: Vec<FeatureDefinition>,
}

/// Names of the feature list variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub enabled_var: String,
    pub disabled_var: String,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            enabled_var: DEFAULT_ENABLED_VAR.to_string(),
            disabled_var: DEFAULT_DISABLED_VAR.to_string(),
        }
    }
}

/// Where persisted feature choices live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Settings file; defaults to `settings.toml` in the config directory.
    pub path: Option<PathBuf>,
    pub key_prefix: String,
    /// Legacy XML document kept in sync when it exists.
    pub legacy_xml: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            legacy_xml: None,
        }
    }
}

/// Command used to restart the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartConfig {
    /// Program and arguments; empty disables restarting.
    pub command: Vec<String>,
    /// Extra argument passed when the previous state should be reopened.
    pub reopen_arg: Option<String>,
}

impl SwitchboardConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load from a TOML file, using defaults when it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Config file to use: explicit path, then `SWITCHBOARD_CONFIG`, then
    /// the platform config directory.
    pub fn resolve_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
        explicit
            .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from))
            .or_else(|| app_dir().map(|dir| dir.join(CONFIG_FILE)))
    }

    /// Settings file backing the feature store.
    pub fn settings_path(&self) -> Result<PathBuf> {
        self.store
            .path
            .clone()
            .or_else(|| app_dir().map(|dir| dir.join(SETTINGS_FILE)))
            .ok_or_else(|| {
                FeatureError::Config("could not determine a settings file location".to_string())
            })
    }

    pub fn codec(&self) -> EnvironmentCodec {
        EnvironmentCodec::new(
            self.environment.enabled_var.clone(),
            self.environment.disabled_var.clone(),
        )
    }

    pub fn catalog(&self) -> Result<FeatureCatalog> {
        FeatureCatalog::from_definitions(self.catalog.clone())
    }

    /// Open the settings store and wrap it for feature persistence.
    pub fn persistence(&self) -> Result<FeaturePersistence> {
        let store = TomlSettingsStore::open(self.settings_path()?);
        let mut persistence =
            FeaturePersistence::new(Arc::new(store)).with_key_prefix(self.store.key_prefix.clone());
        if let Some(legacy) = &self.store.legacy_xml {
            persistence = persistence.with_legacy(LegacyXmlFile::new(legacy));
        }
        Ok(persistence)
    }
}

fn app_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR))
}
