//! Feature enablement persisted in a settings store.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::features::{feature_key, validate_name};
use crate::legacy::LegacyXmlFile;
use crate::store::{SettingsStore, get_tri_state};
use crate::{FeatureState, Result, TriState};

/// Default prefix for feature keys in the settings store.
pub const DEFAULT_KEY_PREFIX: &str = "feature.";

/// Reads and writes feature tri-states through a [`SettingsStore`].
#[derive(Clone)]
pub struct FeaturePersistence {
    store: Arc<dyn SettingsStore>,
    key_prefix: String,
    legacy: Option<LegacyXmlFile>,
}

impl FeaturePersistence {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self {
            store,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            legacy: None,
        }
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Also read, and keep up to date, a legacy XML document.
    pub fn with_legacy(mut self, legacy: LegacyXmlFile) -> Self {
        self.legacy = Some(legacy);
        self
    }

    pub fn store(&self) -> &Arc<dyn SettingsStore> {
        &self.store
    }

    /// Store key for a feature name.
    pub fn key_for(&self, name: &str) -> String {
        format!("{}{}", self.key_prefix, name)
    }

    /// Load every persisted feature.
    ///
    /// Legacy entries are read first and overridden by the settings store
    /// for names present in both. Empty or malformed values load as
    /// unspecified.
    pub fn load(&self) -> Result<Vec<(String, TriState)>> {
        let mut merged: BTreeMap<String, (String, TriState)> = BTreeMap::new();

        if let Some(legacy) = &self.legacy {
            match legacy.read() {
                Ok(features) => {
                    debug!(
                        "Read {} features from legacy file {}",
                        features.len(),
                        legacy.path().display()
                    );
                    for (name, enabled) in features {
                        if validate_name(&name).is_ok() {
                            merged.insert(feature_key(&name), (name, enabled));
                        } else {
                            warn!("Skipping legacy feature with invalid name '{}'", name);
                        }
                    }
                }
                Err(e) => warn!(
                    "Failed to read legacy feature file {}: {}",
                    legacy.path().display(),
                    e
                ),
            }
        }

        for key in self.store.keys()? {
            let Some(name) = key.strip_prefix(&self.key_prefix) else {
                continue;
            };
            if validate_name(name).is_err() {
                warn!("Skipping persisted feature with invalid key '{}'", key);
                continue;
            }
            let enabled = match get_tri_state(self.store.as_ref(), &key, TriState::Unspecified) {
                Ok(Ok(enabled)) => enabled,
                Ok(Err(e)) => {
                    warn!(
                        "Unable to read feature enabled configuration: name={}, enabled={}",
                        name, e.0
                    );
                    TriState::Unspecified
                }
                Err(e) => {
                    warn!("Skipping persisted feature '{}': {}", name, e);
                    continue;
                }
            };
            merged.insert(feature_key(name), (name.to_string(), enabled));
        }

        Ok(merged.into_values().collect())
    }

    /// Persist every feature, including disabled and unspecified ones.
    ///
    /// Writing only truthy values would lose features the user turned off
    /// or has not decided on yet.
    pub fn save(&self, features: &[FeatureState]) -> Result<()> {
        for feature in features {
            self.store
                .set(&self.key_for(&feature.name), feature.enabled.as_str())?;
        }
        self.store.save()?;
        debug!("Persisted {} features", features.len());

        if let Some(legacy) = &self.legacy {
            if legacy.exists() {
                legacy.write(features)?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for FeaturePersistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeaturePersistence")
            .field("key_prefix", &self.key_prefix)
            .field("legacy", &self.legacy)
            .finish_non_exhaustive()
    }
}
