//! Integration tests for feature reconciliation.
//!
//! Every test uses its own pair of environment variables and runs serially,
//! since the registry writes to the real process environment.

use std::collections::BTreeSet;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use serial_test::serial;
use tempfile::TempDir;

use switchboard_core::{
    EnvironmentCodec, FeatureDiscovery, FeatureError, FeaturePersistence, FeatureRegistry,
    FeatureState, KnownFeature, LegacyXmlFile, MemorySettingsStore, RegistryPhase,
    SettingsStore, StaticDiscovery, StoreError, SwitchboardConfig, TomlSettingsStore, TriState,
};

// =============================================================================
// Helpers
// =============================================================================

/// Owns a pair of test variables and clears them on drop.
struct TestEnv {
    codec: EnvironmentCodec,
}

impl TestEnv {
    fn new(tag: &str) -> Self {
        let env = Self {
            codec: EnvironmentCodec::new(
                format!("SWITCHBOARD_IT_{tag}_ENABLED"),
                format!("SWITCHBOARD_IT_{tag}_DISABLED"),
            ),
        };
        env.clear();
        env
    }

    fn with_enabled(self, value: &str) -> Self {
        // SAFETY: test-only variable, tests are serial.
        unsafe { std::env::set_var(self.codec.enabled_var(), value) };
        self
    }

    fn with_disabled(self, value: &str) -> Self {
        // SAFETY: test-only variable, tests are serial.
        unsafe { std::env::set_var(self.codec.disabled_var(), value) };
        self
    }

    fn enabled(&self) -> String {
        std::env::var(self.codec.enabled_var()).unwrap_or_default()
    }

    fn disabled(&self) -> String {
        std::env::var(self.codec.disabled_var()).unwrap_or_default()
    }

    fn enabled_names(&self) -> BTreeSet<String> {
        self.enabled()
            .split(';')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn clear(&self) {
        // SAFETY: test-only variables, tests are serial.
        unsafe {
            std::env::remove_var(self.codec.enabled_var());
            std::env::remove_var(self.codec.disabled_var());
        }
    }
}

impl Drop for TestEnv {
    fn drop(&mut self) {
        self.clear();
    }
}

fn registry(
    env: &TestEnv,
    store: Arc<dyn SettingsStore>,
    discovery: Arc<dyn FeatureDiscovery>,
) -> FeatureRegistry {
    FeatureRegistry::new(
        env.codec.clone(),
        FeaturePersistence::new(store),
        discovery,
    )
}

fn discovery(features: &[(&str, Option<bool>, bool)]) -> Arc<dyn FeatureDiscovery> {
    Arc::new(StaticDiscovery::new(
        features
            .iter()
            .map(|(name, current, default)| KnownFeature::new(*name, *current, *default))
            .collect(),
    ))
}

fn assert_force_enable_invariant(registry: &FeatureRegistry, env: &TestEnv) {
    let emitted = env.enabled_names();
    for feature in registry.get_features() {
        if feature.needs_force_enable() {
            assert!(
                emitted.contains(&feature.name),
                "{} needs force-enable but {} is '{}'",
                feature.name,
                env.codec.enabled_var(),
                env.enabled()
            );
        }
    }
}

/// Settings store whose reads or saves fail on demand.
#[derive(Default)]
struct FlakyStore {
    inner: MemorySettingsStore,
    fail_reads: bool,
    fail_saves: bool,
}

impl SettingsStore for FlakyStore {
    fn keys(&self) -> Result<Vec<String>, StoreError> {
        if self.fail_reads {
            return Err(StoreError::Unavailable("store is locked".to_string()));
        }
        self.inner.keys()
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner.set(key, value)
    }

    fn save(&self) -> Result<(), StoreError> {
        if self.fail_saves {
            return Err(StoreError::Io {
                path: "settings.toml".into(),
                source: std::io::Error::other("disk full"),
            });
        }
        self.inner.save()
    }
}

struct BrokenDiscovery;

impl FeatureDiscovery for BrokenDiscovery {
    fn list_known_features(&self) -> switchboard_core::Result<Vec<KnownFeature>> {
        Err(FeatureError::Discovery("component registry unavailable".to_string()))
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
#[serial]
fn test_environment_enabled_feature_with_off_default_is_force_enabled() {
    let env = TestEnv::new("SCENARIO1").with_enabled("foo;bar");
    let registry = registry(
        &env,
        Arc::new(MemorySettingsStore::new()),
        discovery(&[("foo", None, false)]),
    );

    registry.initialize();

    let foo = registry.get_feature("foo").unwrap();
    assert!(foo.needs_force_enable());
    assert!(env.enabled_names().contains("foo"));
    assert!(!registry.get_feature("bar").unwrap().needs_force_enable());
    assert_force_enable_invariant(&registry, &env);
}

#[test]
#[serial]
fn test_persisted_disable_over_enabled_component() {
    let env = TestEnv::new("SCENARIO2");
    let store = Arc::new(MemorySettingsStore::with_values([("feature.X", "false")]));
    let registry = registry(&env, store, discovery(&[("X", Some(true), true)]));

    registry.initialize();

    let x = registry.get_feature("X").unwrap();
    assert_eq!(x.originally_enabled, TriState::True);
    assert_eq!(x.enabled, TriState::False);
    assert!(!x.needs_force_enable());
    assert_eq!(env.disabled(), "X");
}

#[test]
#[serial]
fn test_set_unknown_feature_records_own_original() {
    let env = TestEnv::new("SCENARIO3");
    let registry = registry(
        &env,
        Arc::new(MemorySettingsStore::new()),
        discovery(&[]),
    );
    registry.initialize();

    let report = registry.set_feature("Z", TriState::True).unwrap();

    assert!(report.is_complete());
    assert_eq!(
        report.feature,
        FeatureState::new("Z", TriState::True, TriState::True)
    );
    assert!(!report.feature.needs_force_enable());
    assert_eq!(env.enabled(), "Z");
}

#[test]
#[serial]
fn test_failed_save_keeps_in_memory_change() {
    let env = TestEnv::new("SCENARIO4");
    let store = Arc::new(FlakyStore {
        fail_saves: true,
        ..FlakyStore::default()
    });
    let registry = registry(&env, store, discovery(&[("Y", None, true)]));
    registry.initialize();

    let report = registry.set_feature("y", TriState::False).unwrap();

    assert!(!report.is_complete());
    assert_eq!(report.failures.len(), 1);
    assert!(matches!(report.failures[0], FeatureError::Store(_)));

    let y = registry.get_feature("Y").unwrap();
    assert_eq!(y.name, "Y");
    assert_eq!(y.enabled, TriState::False);
    assert_eq!(y.originally_enabled, TriState::True);
    // The environment still carries the change.
    assert_eq!(env.disabled(), "Y");
}

// =============================================================================
// Properties
// =============================================================================

#[test]
#[serial]
fn test_disabled_list_wins_over_enabled_list() {
    let env = TestEnv::new("PRECEDENCE")
        .with_enabled("both;only_on")
        .with_disabled("BOTH");
    let registry = registry(
        &env,
        Arc::new(MemorySettingsStore::new()),
        discovery(&[]),
    );

    registry.initialize();

    assert_eq!(registry.get_feature("both").unwrap().enabled, TriState::False);
    assert_eq!(registry.get_feature("only_on").unwrap().enabled, TriState::True);
    assert_eq!(registry.get_features().len(), 2);
}

#[test]
#[serial]
fn test_force_enable_invariant_across_edits() {
    let env = TestEnv::new("INVARIANT").with_enabled("launcher");
    let registry = registry(
        &env,
        Arc::new(MemorySettingsStore::new()),
        discovery(&[("a", None, false), ("b", Some(false), true), ("c", None, true)]),
    );

    registry.initialize();
    assert_force_enable_invariant(&registry, &env);

    for (name, enabled) in [
        ("a", TriState::True),
        ("b", TriState::True),
        ("c", TriState::False),
        ("a", TriState::Unspecified),
        ("new", TriState::True),
        ("b", TriState::False),
        ("a", TriState::True),
    ] {
        registry.set_feature(name, enabled).unwrap();
        assert_force_enable_invariant(&registry, &env);
    }
}

#[test]
#[serial]
fn test_force_enable_appends_to_launch_value_and_restores_it() {
    let env = TestEnv::new("RESTORE").with_enabled("launcher_only;foo");
    let store = Arc::new(MemorySettingsStore::with_values([(
        "feature.launcher_only",
        "false",
    )]));
    let registry = registry(&env, store, discovery(&[("foo", None, false)]));

    registry.initialize();
    assert!(registry.get_feature("foo").unwrap().needs_force_enable());
    assert_eq!(env.enabled(), "launcher_only;foo");
    assert_eq!(env.disabled(), "launcher_only");

    // Nothing needs forcing any more: the launch value comes back.
    registry.set_feature("foo", TriState::False).unwrap();
    assert_eq!(env.enabled(), "launcher_only;foo");
    assert_eq!(env.disabled(), "foo;launcher_only");

    // The registry's own enabled names still follow the launch value.
    registry.set_feature("extra", TriState::True).unwrap();
    assert_eq!(env.enabled(), "launcher_only;foo;extra");
    assert_force_enable_invariant(&registry, &env);
}

#[test]
#[serial]
fn test_launch_value_untouched_without_force_enable() {
    let env = TestEnv::new("NOFORCE").with_enabled("launcher_only");
    let store = Arc::new(MemorySettingsStore::with_values([(
        "feature.launcher_only",
        "false",
    )]));
    let registry = registry(&env, store, discovery(&[("on", None, true)]));

    registry.initialize();
    assert_eq!(env.enabled(), "on");
    assert_eq!(env.disabled(), "launcher_only");
}

#[test]
#[serial]
fn test_persistence_completeness_across_registries() {
    let env = TestEnv::new("COMPLETE");
    let store: Arc<MemorySettingsStore> = Arc::new(MemorySettingsStore::new());

    let first = registry(&env, store.clone(), discovery(&[("D", None, true)]));
    first.initialize();
    first.set_feature("On", TriState::True).unwrap();
    first.set_feature("Off", TriState::False).unwrap();
    first.set_feature("Unset", TriState::Unspecified).unwrap();
    let saved: Vec<(String, TriState)> = first
        .get_features()
        .into_iter()
        .map(|f| (f.name, f.enabled))
        .collect();

    let loaded = FeaturePersistence::new(store.clone()).load().unwrap();
    assert_eq!(loaded, saved);
    assert_eq!(store.values().get("feature.Unset").map(String::as_str), Some(""));
}

#[test]
#[serial]
fn test_reinitialize_is_idempotent() {
    let env = TestEnv::new("IDEMPOTENT")
        .with_enabled("foo;bar")
        .with_disabled("baz");
    let store = Arc::new(MemorySettingsStore::with_values([
        ("feature.bar", "false"),
        ("feature.qux", ""),
    ]));
    let registry = registry(
        &env,
        store,
        discovery(&[("foo", None, false), ("extra", Some(true), false)]),
    );

    registry.initialize();
    let first = registry.get_features();
    let first_env = (env.enabled(), env.disabled());

    registry.initialize();
    assert_eq!(registry.get_features(), first);
    assert_eq!((env.enabled(), env.disabled()), first_env);

    let names: Vec<_> = first.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["bar", "baz", "extra", "foo", "qux"]);
}

#[test]
#[serial]
fn test_original_survives_user_edits_and_reinitialize() {
    let env = TestEnv::new("ORIGINAL");
    let store = Arc::new(MemorySettingsStore::new());
    let registry = registry(&env, store, discovery(&[("feat", None, false)]));

    registry.initialize();
    registry.set_feature("feat", TriState::True).unwrap();
    registry.set_feature("feat", TriState::False).unwrap();
    registry.set_feature("FEAT", TriState::True).unwrap();
    registry.initialize();

    let feat = registry.get_feature("feat").unwrap();
    assert_eq!(feat.name, "feat");
    assert_eq!(feat.originally_enabled, TriState::False);
    assert!(feat.needs_force_enable());
    assert_force_enable_invariant(&registry, &env);
}

// =============================================================================
// Degraded sources
// =============================================================================

#[test]
#[serial]
fn test_discovery_failure_does_not_block_ready() {
    let env = TestEnv::new("NODISCOVERY").with_enabled("envonly");
    let store = Arc::new(MemorySettingsStore::with_values([("feature.stored", "true")]));
    let registry = registry(&env, store, Arc::new(BrokenDiscovery));

    assert_eq!(registry.phase(), RegistryPhase::Initializing);
    registry.initialize();

    assert_eq!(registry.phase(), RegistryPhase::Ready);
    let names: Vec<_> = registry.get_features().into_iter().map(|f| f.name).collect();
    assert_eq!(names, vec!["envonly", "stored"]);
}

#[test]
#[serial]
fn test_unreadable_store_does_not_block_ready() {
    let env = TestEnv::new("NOSTORE");
    let store = Arc::new(FlakyStore {
        fail_reads: true,
        ..FlakyStore::default()
    });
    let registry = registry(&env, store, discovery(&[("known", None, true)]));

    registry.initialize();

    assert_eq!(registry.phase(), RegistryPhase::Ready);
    assert_eq!(
        registry.get_features(),
        vec![FeatureState::new("known", TriState::True, TriState::True)]
    );
    assert_eq!(env.enabled(), "known");
}

#[test]
#[serial]
fn test_corrupt_settings_file_does_not_block_ready() {
    let env = TestEnv::new("CORRUPTSTORE").with_enabled("envonly");
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.toml");
    std::fs::write(&path, "not = [valid").unwrap();

    let mut config = SwitchboardConfig::new();
    config.environment.enabled_var = env.codec.enabled_var().to_string();
    config.environment.disabled_var = env.codec.disabled_var().to_string();
    config.store.path = Some(path.clone());

    let registry = FeatureRegistry::new(
        config.codec(),
        config.persistence().unwrap(),
        discovery(&[("known", None, false)]),
    );
    registry.initialize();

    assert_eq!(registry.phase(), RegistryPhase::Ready);
    let names: Vec<_> = registry.get_features().into_iter().map(|f| f.name).collect();
    assert_eq!(names, vec!["envonly", "known"]);

    // The first save replaces the file and keeps the unreadable copy.
    let report = registry.set_feature("known", TriState::True).unwrap();
    assert!(report.is_complete());
    assert_eq!(
        std::fs::read_to_string(dir.path().join("settings.toml.corrupt")).unwrap(),
        "not = [valid"
    );
    let reloaded = TomlSettingsStore::open(&path);
    assert_eq!(
        reloaded.get("feature.known").unwrap().as_deref(),
        Some("true")
    );
}

#[test]
#[serial]
fn test_malformed_legacy_file_does_not_block_ready() {
    let env = TestEnv::new("BADLEGACY");
    let dir = TempDir::new().unwrap();
    let legacy = LegacyXmlFile::new(dir.path().join("features.xml"));
    std::fs::write(
        legacy.path(),
        r#"<Features><Feature name="Legacy" enabled="true""#,
    )
    .unwrap();

    let store = Arc::new(MemorySettingsStore::with_values([("feature.stored", "false")]));
    let registry = FeatureRegistry::new(
        env.codec.clone(),
        FeaturePersistence::new(store).with_legacy(legacy),
        discovery(&[("known", None, true)]),
    );
    registry.initialize();

    assert_eq!(registry.phase(), RegistryPhase::Ready);
    assert!(registry.get_feature("Legacy").is_none());
    assert_eq!(
        registry.get_features(),
        vec![
            FeatureState::new("known", TriState::True, TriState::True),
            FeatureState::new("stored", TriState::False, TriState::Unspecified),
        ]
    );
}

#[test]
#[serial]
fn test_invalid_names_are_rejected() {
    let env = TestEnv::new("INVALID");
    let registry = registry(
        &env,
        Arc::new(MemorySettingsStore::new()),
        discovery(&[("ok", None, true), ("bad;name", None, true)]),
    );
    registry.initialize();

    assert!(registry.get_feature("bad;name").is_none());
    assert!(matches!(
        registry.set_feature("", TriState::True),
        Err(FeatureError::InvalidName(_))
    ));
    assert!(matches!(
        registry.set_feature("a;b", TriState::True),
        Err(FeatureError::InvalidName(_))
    ));
}

#[test]
#[serial]
fn test_concurrent_reads_during_edits() {
    let env = TestEnv::new("CONCURRENT");
    let registry = Arc::new(registry(
        &env,
        Arc::new(MemorySettingsStore::new()),
        discovery(&[]),
    ));
    registry.initialize();

    std::thread::scope(|scope| {
        let writer = Arc::clone(&registry);
        scope.spawn(move || {
            for i in 0..50 {
                writer
                    .set_feature(&format!("f{i:02}"), TriState::from(i % 2 == 0))
                    .unwrap();
            }
        });
        let reader = Arc::clone(&registry);
        scope.spawn(move || {
            for _ in 0..50 {
                let snapshot = reader.get_features();
                let mut sorted = snapshot.clone();
                sorted.sort();
                assert_eq!(snapshot, sorted);
            }
        });
    });

    assert_eq!(registry.get_features().len(), 50);
}
