//! Headless model of the feature settings panel.
//!
//! Rows mirror the registry; checkbox edits are staged until `apply`, which
//! pushes each changed row into the registry. Restarting is a separate,
//! explicit request since most features are read once at startup.

use std::sync::Arc;
use tracing::{debug, info};

use crate::features::feature_key;
use crate::registry::{ChangeReport, FeatureRegistry};
use crate::restart::Restarter;
use crate::{FeatureError, Result, TriState};

/// Shown under the feature list.
pub const RESTART_NOTICE: &str = "Some features may require a restart to take effect.";

/// One line of the panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureRow {
    pub name: String,
    /// Enablement in the registry when the row was loaded.
    pub enabled: TriState,
    /// Checkbox value set by the user, if touched.
    pub staged: Option<bool>,
    pub needs_force_enable: bool,
}

impl FeatureRow {
    /// Checkbox state as displayed.
    pub fn checked(&self) -> bool {
        self.staged.unwrap_or(self.enabled.is_true())
    }

    /// Whether applying this row would change the registry.
    pub fn is_changed(&self) -> bool {
        matches!(self.staged, Some(value) if TriState::from(value) != self.enabled)
    }
}

/// Result of applying staged edits.
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub changes: Vec<ChangeReport>,
}

impl ApplyReport {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Every change reached the environment and the settings store.
    pub fn is_complete(&self) -> bool {
        self.changes.iter().all(ChangeReport::is_complete)
    }
}

/// Settings panel bound to a registry.
pub struct FeaturePanel {
    registry: Arc<FeatureRegistry>,
    restarter: Arc<dyn Restarter>,
    rows: Vec<FeatureRow>,
}

impl FeaturePanel {
    pub fn new(registry: Arc<FeatureRegistry>, restarter: Arc<dyn Restarter>) -> Self {
        let mut panel = Self {
            registry,
            restarter,
            rows: Vec::new(),
        };
        panel.reload();
        panel
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    /// Reload rows from the registry, discarding staged edits.
    pub fn reload(&mut self) {
        self.rows = self
            .registry
            .get_features()
            .into_iter()
            .map(|feature| FeatureRow {
                needs_force_enable: feature.needs_force_enable(),
                name: feature.name,
                enabled: feature.enabled,
                staged: None,
            })
            .collect();
    }

    /// Stage a checkbox change.
    pub fn stage(&mut self, name: &str, enabled: bool) -> Result<()> {
        let key = feature_key(name);
        let row = self
            .rows
            .iter_mut()
            .find(|row| feature_key(&row.name) == key)
            .ok_or_else(|| FeatureError::NotFound(name.to_string()))?;
        row.staged = Some(enabled);
        debug!("Staged {}={}", row.name, enabled);
        Ok(())
    }

    /// Whether any staged edit differs from the registry.
    pub fn is_dirty(&self) -> bool {
        self.rows.iter().any(FeatureRow::is_changed)
    }

    /// Push staged edits into the registry and reload.
    pub fn apply(&mut self) -> Result<ApplyReport> {
        let mut report = ApplyReport::default();
        for row in self.rows.iter().filter(|row| row.is_changed()) {
            let enabled = TriState::from(row.checked());
            report
                .changes
                .push(self.registry.set_feature(&row.name, enabled)?);
        }
        if !report.is_empty() {
            info!("Applied {} feature changes", report.changes.len());
        }
        self.reload();
        Ok(report)
    }

    pub fn can_restart(&self) -> bool {
        self.restarter.can_restart()
    }

    /// Ask the host to restart.
    pub fn restart(&self, reopen_state: bool) -> Result<()> {
        if !self.restarter.can_restart() {
            return Err(FeatureError::RestartUnavailable);
        }
        info!("Requesting restart (reopen_state={})", reopen_state);
        self.restarter.restart(reopen_state)
    }
}
