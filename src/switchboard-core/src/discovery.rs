//! Discovery of features already registered by running components.

use serde::{Deserialize, Serialize};

use crate::{Result, TriState};

/// A feature a live component has registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownFeature {
    pub name: String,
    /// Value the component currently holds, if it has settled on one.
    pub current: Option<bool>,
    /// Compile-time default.
    pub default: bool,
}

impl KnownFeature {
    pub fn new(name: impl Into<String>, current: Option<bool>, default: bool) -> Self {
        Self {
            name: name.into(),
            current,
            default,
        }
    }

    /// What a component reading this feature observes right now.
    pub fn effective(&self) -> TriState {
        TriState::from(self.current.unwrap_or(self.default))
    }
}

/// Enumerates features known to the running process.
pub trait FeatureDiscovery: Send + Sync {
    fn list_known_features(&self) -> Result<Vec<KnownFeature>>;
}

/// Discovery over a fixed list.
#[derive(Debug, Clone, Default)]
pub struct StaticDiscovery {
    features: Vec<KnownFeature>,
}

impl StaticDiscovery {
    pub fn new(features: Vec<KnownFeature>) -> Self {
        Self { features }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

impl FeatureDiscovery for StaticDiscovery {
    fn list_known_features(&self) -> Result<Vec<KnownFeature>> {
        Ok(self.features.clone())
    }
}
