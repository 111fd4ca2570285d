//! Feature registry.
//!
//! Merges three sources into one authoritative map, in this order:
//!
//! 1. the feature variables the process was launched with,
//! 2. features registered by live components (discovery), for names the
//!    environment did not mention,
//! 3. values persisted in the settings store, which override both.
//!
//! After every change the map is written back to the environment so that
//! components reading their flags directly observe the same state.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::discovery::FeatureDiscovery;
use crate::env::{join_names, split_names, EnvironmentCodec, EnvironmentSnapshot};
use crate::features::{feature_key, validate_name};
use crate::persistence::FeaturePersistence;
use crate::{FeatureError, FeatureState, Result, TriState};

/// Lifecycle phase of a registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RegistryPhase {
    #[default]
    Initializing,
    Ready,
}

/// Outcome of a user-driven change.
///
/// The in-memory change always stands; `failures` lists the propagation
/// steps (environment, settings store) that did not complete.
#[derive(Debug)]
pub struct ChangeReport {
    pub feature: FeatureState,
    pub failures: Vec<FeatureError>,
}

impl ChangeReport {
    /// Whether the change reached both the environment and the store.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    phase: RegistryPhase,
    entries: HashMap<String, FeatureState>,
    /// Pre-override value of every name seen this session. Never recomputed.
    originals: HashMap<String, TriState>,
    /// Feature variables as the launcher set them.
    launch_env: Option<EnvironmentSnapshot>,
    force_enabled: bool,
    /// Set once the enabled variable has been force-enabled this session.
    force_modified: bool,
}

/// Authoritative feature map for the process.
pub struct FeatureRegistry {
    codec: EnvironmentCodec,
    persistence: FeaturePersistence,
    discovery: Arc<dyn FeatureDiscovery>,
    state: Mutex<RegistryState>,
    /// Serializes mutating calls; the map lock is never held across I/O.
    mutation: Mutex<()>,
}

impl FeatureRegistry {
    pub fn new(
        codec: EnvironmentCodec,
        persistence: FeaturePersistence,
        discovery: Arc<dyn FeatureDiscovery>,
    ) -> Self {
        Self {
            codec,
            persistence,
            discovery,
            state: Mutex::new(RegistryState::default()),
            mutation: Mutex::new(()),
        }
    }

    pub fn codec(&self) -> &EnvironmentCodec {
        &self.codec
    }

    pub fn phase(&self) -> RegistryPhase {
        self.state.lock().phase
    }

    /// Reconcile all sources and publish the result to the environment.
    ///
    /// Source failures are logged and the source is treated as empty; the
    /// registry always reaches [`RegistryPhase::Ready`]. Calling this again
    /// with unchanged sources yields the same map.
    pub fn initialize(&self) {
        let _serial = self.mutation.lock();
        let launch_env = self.launch_environment();

        let discovered = self.discover();
        let persisted = match self.persistence.load() {
            Ok(persisted) => persisted,
            Err(e) => {
                warn!("Failed to load persisted feature settings: {}", e);
                Vec::new()
            }
        };

        let snapshot = {
            let mut state = self.state.lock();
            let entries = reconcile(&state.originals, &launch_env, &discovered, persisted);
            for (key, feature) in &entries {
                state
                    .originals
                    .entry(key.clone())
                    .or_insert(feature.originally_enabled);
            }
            state.entries = entries;
            state.phase = RegistryPhase::Ready;
            sorted(&state.entries)
        };

        info!("Feature registry ready with {} features", snapshot.len());
        if let Err(e) = self.publish_environment(&snapshot, &launch_env) {
            warn!("Failed to update feature environment variables: {}", e);
        }
    }

    /// All features, sorted by name.
    pub fn get_features(&self) -> Vec<FeatureState> {
        sorted(&self.state.lock().entries)
    }

    /// Case-insensitive lookup.
    pub fn get_feature(&self, name: &str) -> Option<FeatureState> {
        self.state.lock().entries.get(&feature_key(name)).cloned()
    }

    /// Record a user's choice for a feature.
    ///
    /// An existing entry keeps its name and original enablement; a new name
    /// takes `enabled` as its original since nothing else has observed it.
    /// The environment and the settings store are updated before returning.
    pub fn set_feature(&self, name: &str, enabled: TriState) -> Result<ChangeReport> {
        validate_name(name)?;
        let _serial = self.mutation.lock();
        let launch_env = self.launch_environment();
        let key = feature_key(name);

        let (feature, snapshot) = {
            let mut state = self.state.lock();
            let (name, originally) = match state.entries.get(&key) {
                Some(existing) => (existing.name.clone(), existing.originally_enabled),
                None => (
                    name.to_string(),
                    state.originals.get(&key).copied().unwrap_or(enabled),
                ),
            };
            let feature = FeatureState::new(name, enabled, originally);
            state.originals.entry(key.clone()).or_insert(originally);
            state.entries.insert(key, feature.clone());
            (feature, sorted(&state.entries))
        };
        debug!("Set {}", feature);

        let mut failures = Vec::new();
        if let Err(e) = self.publish_environment(&snapshot, &launch_env) {
            warn!("Failed to update feature environment variables: {}", e);
            failures.push(e);
        }
        if let Err(e) = self.persistence.save(&snapshot) {
            warn!("Failed to persist feature settings: {}", e);
            failures.push(e);
        }

        Ok(ChangeReport { feature, failures })
    }

    /// Feature variables as first seen by this registry.
    fn launch_environment(&self) -> EnvironmentSnapshot {
        if let Some(snapshot) = &self.state.lock().launch_env {
            return snapshot.clone();
        }
        let snapshot = self.codec.snapshot();
        debug!("Launch environment: {:?}", snapshot);
        self.state
            .lock()
            .launch_env
            .get_or_insert(snapshot)
            .clone()
    }

    fn discover(&self) -> Vec<(String, TriState)> {
        match self.discovery.list_known_features() {
            Ok(features) => features
                .into_iter()
                .filter_map(|feature| match validate_name(&feature.name) {
                    Ok(()) => Some((feature.name.clone(), feature.effective())),
                    Err(e) => {
                        warn!("Ignoring discovered feature: {}", e);
                        None
                    }
                })
                .collect(),
            Err(e) => {
                warn!("Failed to discover registered features: {}", e);
                Vec::new()
            }
        }
    }

    /// Write the map to the environment, force-enabling where needed.
    fn publish_environment(
        &self,
        features: &[FeatureState],
        launch_env: &EnvironmentSnapshot,
    ) -> Result<()> {
        let forced: Vec<&str> = features
            .iter()
            .filter(|f| f.needs_force_enable())
            .map(|f| f.name.as_str())
            .collect();

        // Once force-modified, the variable keeps the launch value even
        // after nothing needs forcing any more.
        let force_modified = self.state.lock().force_modified;
        let (enabled, disabled) = EnvironmentCodec::encode_values(features);
        let enabled = if forced.is_empty() && !force_modified {
            enabled
        } else {
            force_enable_value(launch_env.enabled.as_deref(), &enabled)
        };

        self.codec.write(&enabled, &disabled)?;

        let was_forced = {
            let mut state = self.state.lock();
            state.force_modified |= !forced.is_empty();
            std::mem::replace(&mut state.force_enabled, !forced.is_empty())
        };
        if !forced.is_empty() {
            info!("Force-enabled features: {}", forced.join(";"));
        } else if was_forced {
            info!(
                "No features need force-enabling, restored launch value of {}",
                self.codec.enabled_var()
            );
        }
        Ok(())
    }
}

/// Merge the sources into a fresh map keyed by folded name.
///
/// `originals` holds values already recorded this session and always wins
/// for `originally_enabled`.
fn reconcile(
    originals: &HashMap<String, TriState>,
    launch_env: &EnvironmentSnapshot,
    discovered: &[(String, TriState)],
    persisted: Vec<(String, TriState)>,
) -> HashMap<String, FeatureState> {
    let known: HashMap<String, TriState> = discovered
        .iter()
        .map(|(name, value)| (feature_key(name), *value))
        .collect();
    let mut entries: HashMap<String, FeatureState> = HashMap::new();

    // Disabled names are decoded last and overwrite enabled ones.
    let mut seeds: HashMap<String, (String, bool)> = HashMap::new();
    for (name, enabled) in EnvironmentCodec::decode_values(
        launch_env.enabled.as_deref(),
        launch_env.disabled.as_deref(),
    ) {
        seeds.insert(feature_key(&name), (name, enabled));
    }
    for (key, (name, enabled)) in seeds {
        let enabled = TriState::from(enabled);
        let originally = originals
            .get(&key)
            .or_else(|| known.get(&key))
            .copied()
            .unwrap_or(enabled);
        entries.insert(key, FeatureState::new(name, enabled, originally));
    }

    for (name, value) in discovered {
        let key = feature_key(name);
        if entries.contains_key(&key) {
            continue;
        }
        let originally = originals.get(&key).copied().unwrap_or(*value);
        entries.insert(key, FeatureState::new(name.clone(), *value, originally));
    }

    for (name, enabled) in persisted {
        let key = feature_key(&name);
        let originally = originals
            .get(&key)
            .copied()
            .or_else(|| entries.get(&key).map(|f| f.originally_enabled))
            .or_else(|| known.get(&key).copied())
            .unwrap_or(TriState::Unspecified);
        entries.insert(key, FeatureState::new(name, enabled, originally));
    }

    entries
}

/// Launch value of the enabled variable followed by every enabled name,
/// without case-insensitive duplicates.
fn force_enable_value(launch: Option<&str>, enabled: &str) -> String {
    let mut seen = std::collections::HashSet::new();
    join_names(
        split_names(launch.unwrap_or_default())
            .chain(split_names(enabled))
            .filter(|name| seen.insert(feature_key(name))),
    )
}

fn sorted(entries: &HashMap<String, FeatureState>) -> Vec<FeatureState> {
    let mut features: Vec<FeatureState> = entries.values().cloned().collect();
    features.sort();
    features
}
