//! Declared feature catalog.
//!
//! A catalog lists the features a tool ships with and their defaults. It is
//! the discovery source used when no live component registry is available.

use serde::{Deserialize, Serialize};

use crate::discovery::{FeatureDiscovery, KnownFeature};
use crate::features::{feature_key, validate_name};
use crate::{FeatureError, Result};

/// A feature declared in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureDefinition {
    /// Feature name.
    pub name: String,
    /// Description shown next to the switch.
    #[serde(default)]
    pub description: String,
    /// Default enabled state.
    #[serde(default)]
    pub default_enabled: bool,
    /// Whether changes only take effect after a restart.
    #[serde(default)]
    pub requires_restart: bool,
}

impl FeatureDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            default_enabled: false,
            requires_restart: false,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn default_enabled(mut self, enabled: bool) -> Self {
        self.default_enabled = enabled;
        self
    }

    pub fn requires_restart(mut self) -> Self {
        self.requires_restart = true;
        self
    }
}

/// Catalog of declared features.
#[derive(Debug, Clone, Default)]
pub struct FeatureCatalog {
    features: Vec<FeatureDefinition>,
}

impl FeatureCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog, rejecting invalid or duplicate names.
    pub fn from_definitions(definitions: Vec<FeatureDefinition>) -> Result<Self> {
        let mut catalog = Self::new();
        for definition in definitions {
            catalog.register(definition)?;
        }
        Ok(catalog)
    }

    /// Register a feature.
    pub fn register(&mut self, definition: FeatureDefinition) -> Result<()> {
        validate_name(&definition.name)?;
        if self.get(&definition.name).is_some() {
            return Err(FeatureError::Config(format!(
                "Feature '{}' is declared more than once",
                definition.name
            )));
        }
        self.features.push(definition);
        Ok(())
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&FeatureDefinition> {
        let key = feature_key(name);
        self.features.iter().find(|f| feature_key(&f.name) == key)
    }

    pub fn definitions(&self) -> &[FeatureDefinition] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl FeatureDiscovery for FeatureCatalog {
    fn list_known_features(&self) -> Result<Vec<KnownFeature>> {
        Ok(self
            .features
            .iter()
            .map(|f| KnownFeature::new(f.name.clone(), None, f.default_enabled))
            .collect())
    }
}
