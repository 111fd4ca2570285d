//! Feature switch registry.
//!
//! Reconciles feature enablement from the process environment, a persisted
//! settings store and the features live components have registered, then
//! writes the result back to the environment so components that read their
//! flags directly see the same state.

pub mod catalog;
pub mod config;
pub mod discovery;
pub mod env;
pub mod error;
pub mod features;
pub mod legacy;
pub mod panel;
pub mod persistence;
pub mod registry;
pub mod restart;
pub mod store;

pub use catalog::{FeatureCatalog, FeatureDefinition};
pub use config::SwitchboardConfig;
pub use discovery::{FeatureDiscovery, KnownFeature, StaticDiscovery};
pub use env::{EnvironmentCodec, EnvironmentSnapshot};
pub use error::{FeatureError, Result, StoreError};
pub use features::{FeatureState, TriState};
pub use legacy::{LegacyXmlFile, parse_legacy_xml, render_legacy_xml};
pub use panel::{ApplyReport, FeaturePanel, FeatureRow, RESTART_NOTICE};
pub use persistence::FeaturePersistence;
pub use registry::{ChangeReport, FeatureRegistry, RegistryPhase};
pub use restart::{NoRestart, Restarter};
pub use store::{MemorySettingsStore, SettingsStore, TomlSettingsStore};
