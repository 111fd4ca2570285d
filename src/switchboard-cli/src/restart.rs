//! Restart by launching the configured host command.

use std::process::Command;

use switchboard_core::config::RestartConfig;
use switchboard_core::{FeatureError, Restarter, Result};
use tracing::info;

/// Spawns `[restart] command`, adding `reopen_arg` when the previous
/// session should be reopened.
#[derive(Debug, Clone, Default)]
pub struct CommandRestarter {
    command: Vec<String>,
    reopen_arg: Option<String>,
}

impl CommandRestarter {
    pub fn new(command: Vec<String>, reopen_arg: Option<String>) -> Self {
        Self {
            command,
            reopen_arg,
        }
    }

    pub fn from_config(config: &RestartConfig) -> Self {
        Self::new(config.command.clone(), config.reopen_arg.clone())
    }

    /// Program and arguments for a restart.
    pub fn argv(&self, reopen_state: bool) -> Vec<String> {
        let mut argv = self.command.clone();
        if reopen_state {
            if let Some(arg) = &self.reopen_arg {
                argv.push(arg.clone());
            }
        }
        argv
    }
}

impl Restarter for CommandRestarter {
    fn can_restart(&self) -> bool {
        !self.command.is_empty()
    }

    fn restart(&self, reopen_state: bool) -> Result<()> {
        let argv = self.argv(reopen_state);
        let (program, args) = argv.split_first().ok_or(FeatureError::RestartUnavailable)?;

        info!("Restarting: {}", argv.join(" "));
        Command::new(program)
            .args(args)
            .spawn()
            .map_err(|e| FeatureError::Restart(format!("{program}: {e}")))?;
        Ok(())
    }
}
