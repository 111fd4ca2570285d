//! Environment variable codec for enabled/disabled feature lists.
//!
//! Two variables carry `;`-delimited feature names. They are the only
//! channel that reaches components reading their flags directly from the
//! process environment, so the registry re-emits them after every change.

use tracing::{debug, warn};

use crate::{FeatureError, FeatureState, Result};

/// Default variable listing enabled features.
pub const DEFAULT_ENABLED_VAR: &str = "MD_FEATURES_ENABLED";

/// Default variable listing disabled features.
pub const DEFAULT_DISABLED_VAR: &str = "MD_FEATURES_DISABLED";

/// Separator between feature names.
pub const SEPARATOR: char = ';';

/// Raw values of the two feature variables at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentSnapshot {
    pub enabled: Option<String>,
    pub disabled: Option<String>,
}

/// Reads and writes the feature list variables.
#[derive(Debug, Clone)]
pub struct EnvironmentCodec {
    enabled_var: String,
    disabled_var: String,
}

impl EnvironmentCodec {
    pub fn new(enabled_var: impl Into<String>, disabled_var: impl Into<String>) -> Self {
        Self {
            enabled_var: enabled_var.into(),
            disabled_var: disabled_var.into(),
        }
    }

    pub fn enabled_var(&self) -> &str {
        &self.enabled_var
    }

    pub fn disabled_var(&self) -> &str {
        &self.disabled_var
    }

    /// Capture the current raw values of both variables.
    pub fn snapshot(&self) -> EnvironmentSnapshot {
        EnvironmentSnapshot {
            enabled: read_var(&self.enabled_var),
            disabled: read_var(&self.disabled_var),
        }
    }

    /// Decode the live environment.
    ///
    /// Enabled names come first, then disabled names, so a map write in
    /// iteration order lets disabled win for names present in both lists.
    pub fn decode(&self) -> Vec<(String, bool)> {
        let snapshot = self.snapshot();
        Self::decode_values(snapshot.enabled.as_deref(), snapshot.disabled.as_deref())
    }

    /// Decode captured variable values.
    pub fn decode_values(enabled: Option<&str>, disabled: Option<&str>) -> Vec<(String, bool)> {
        let enabled = split_names(enabled.unwrap_or_default()).map(|name| (name.to_string(), true));
        let disabled =
            split_names(disabled.unwrap_or_default()).map(|name| (name.to_string(), false));
        enabled.chain(disabled).collect()
    }

    /// Partition features into the enabled and disabled variable values.
    ///
    /// Unspecified features appear in neither list.
    pub fn encode_values<'a, I>(features: I) -> (String, String)
    where
        I: IntoIterator<Item = &'a FeatureState>,
    {
        let mut enabled = Vec::new();
        let mut disabled = Vec::new();
        for feature in features {
            match feature.enabled.as_bool() {
                Some(true) => enabled.push(feature.name.as_str()),
                Some(false) => disabled.push(feature.name.as_str()),
                None => {}
            }
        }
        (join_names(enabled), join_names(disabled))
    }

    /// Encode the features and write both variables.
    pub fn encode<'a, I>(&self, features: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a FeatureState>,
    {
        let (enabled, disabled) = Self::encode_values(features);
        self.write(&enabled, &disabled)
    }

    /// Write already encoded values to both variables.
    pub fn write(&self, enabled: &str, disabled: &str) -> Result<()> {
        write_var(&self.enabled_var, enabled)?;
        write_var(&self.disabled_var, disabled)?;
        debug!(
            "Updated {}={} {}={}",
            self.enabled_var, enabled, self.disabled_var, disabled
        );
        Ok(())
    }
}

impl Default for EnvironmentCodec {
    fn default() -> Self {
        Self::new(DEFAULT_ENABLED_VAR, DEFAULT_DISABLED_VAR)
    }
}

/// Split a variable value into names, skipping empty segments.
pub fn split_names(value: &str) -> impl Iterator<Item = &str> {
    value.split(SEPARATOR).filter(|name| !name.is_empty())
}

/// Join names with the separator.
pub fn join_names<'a, I>(names: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    names.into_iter().collect::<Vec<_>>().join(";")
}

fn read_var(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) => Some(value),
        Err(std::env::VarError::NotPresent) => None,
        Err(std::env::VarError::NotUnicode(raw)) => {
            warn!(
                "Ignoring environment variable {} with non-UTF-8 value {:?}",
                name, raw
            );
            None
        }
    }
}

fn write_var(name: &str, value: &str) -> Result<()> {
    if name.is_empty() || name.contains('=') || name.contains('\0') {
        return Err(FeatureError::Environment {
            variable: name.to_string(),
            message: "invalid variable name".to_string(),
        });
    }
    if value.contains('\0') {
        return Err(FeatureError::Environment {
            variable: name.to_string(),
            message: "value contains NUL".to_string(),
        });
    }
    // SAFETY: the registry serializes every environment write behind its
    // mutation lock, and only the two feature variables are touched.
    unsafe {
        std::env::set_var(name, value);
    }
    Ok(())
}
