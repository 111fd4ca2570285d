//! Feature state definitions.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;

use crate::{FeatureError, Result};

/// Enablement that keeps "no opinion" distinct from "explicitly off".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<bool>", into = "Option<bool>")]
pub enum TriState {
    True,
    False,
    /// No source has expressed an opinion.
    #[default]
    Unspecified,
}

impl TriState {
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Self::True => Some(true),
            Self::False => Some(false),
            Self::Unspecified => None,
        }
    }

    pub fn is_true(self) -> bool {
        self == Self::True
    }

    pub fn is_false(self) -> bool {
        self == Self::False
    }

    pub fn is_unspecified(self) -> bool {
        self == Self::Unspecified
    }

    /// Text form used by the settings store and the legacy XML format.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::True => "true",
            Self::False => "false",
            Self::Unspecified => "",
        }
    }
}

impl From<bool> for TriState {
    fn from(value: bool) -> Self {
        if value { Self::True } else { Self::False }
    }
}

impl From<Option<bool>> for TriState {
    fn from(value: Option<bool>) -> Self {
        value.map_or(Self::Unspecified, Self::from)
    }
}

impl From<TriState> for Option<bool> {
    fn from(value: TriState) -> Self {
        value.as_bool()
    }
}

impl std::fmt::Display for TriState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "true"),
            Self::False => write!(f, "false"),
            Self::Unspecified => write!(f, "unspecified"),
        }
    }
}

/// Error for text that is neither a boolean nor empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTriStateError(pub String);

impl std::fmt::Display for ParseTriStateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'{}' is not true, false or empty", self.0)
    }
}

impl std::error::Error for ParseTriStateError {}

impl FromStr for TriState {
    type Err = ParseTriStateError;

    /// Empty (or blank) text is `Unspecified`; booleans are case-insensitive.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            Ok(Self::Unspecified)
        } else if trimmed.eq_ignore_ascii_case("true") {
            Ok(Self::True)
        } else if trimmed.eq_ignore_ascii_case("false") {
            Ok(Self::False)
        } else {
            Err(ParseTriStateError(s.to_string()))
        }
    }
}

/// State of a single named feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureState {
    /// Feature name, case-insensitive for lookups.
    pub name: String,
    /// Current enablement.
    pub enabled: TriState,
    /// Enablement before any user override was applied.
    pub originally_enabled: TriState,
}

impl FeatureState {
    pub fn new(name: impl Into<String>, enabled: TriState, originally_enabled: TriState) -> Self {
        Self {
            name: name.into(),
            enabled,
            originally_enabled,
        }
    }

    /// The user wants this feature on while components that initialized
    /// before the override still treat it as off.
    pub fn needs_force_enable(&self) -> bool {
        self.enabled.is_true() && self.originally_enabled.is_false()
    }

    /// Lookup key for this feature's name.
    pub fn key(&self) -> String {
        feature_key(&self.name)
    }
}

impl PartialOrd for FeatureState {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FeatureState {
    /// Ordinal by name; ties broken by the remaining fields to stay consistent with `Eq`.
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.enabled.as_str().cmp(other.enabled.as_str()))
            .then_with(|| {
                self.originally_enabled
                    .as_str()
                    .cmp(other.originally_enabled.as_str())
            })
    }
}

impl std::fmt::Display for FeatureState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Feature={} Enabled={}", self.name, self.enabled)
    }
}

/// Case-folded key used for all name comparisons.
pub fn feature_key(name: &str) -> String {
    name.to_lowercase()
}

/// Check that a feature name can travel through every source.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(';') || name.contains('\0') {
        return Err(FeatureError::InvalidName(name.to_string()));
    }
    Ok(())
}
