//! Restart capability requested after applying feature changes.

use crate::{FeatureError, Result};

/// Restarts the hosting process. The registry itself never restarts.
pub trait Restarter: Send + Sync {
    /// Whether a restart can be requested at all.
    fn can_restart(&self) -> bool;

    /// Restart, reopening the previous session state if `reopen_state`.
    fn restart(&self, reopen_state: bool) -> Result<()>;
}

/// Host without restart support.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRestart;

impl Restarter for NoRestart {
    fn can_restart(&self) -> bool {
        false
    }

    fn restart(&self, _reopen_state: bool) -> Result<()> {
        Err(FeatureError::RestartUnavailable)
    }
}
