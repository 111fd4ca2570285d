//! Subcommands of the `switchboard` binary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use switchboard_core::{
    ChangeReport, FeatureCatalog, FeatureDiscovery, FeatureError, FeaturePanel, FeatureRegistry,
    FeatureState, LegacyXmlFile, RESTART_NOTICE, SwitchboardConfig, TriState,
};
use tracing::{debug, warn};

use crate::restart::CommandRestarter;

/// Feature switch subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List every known feature
    #[command(visible_alias = "ls")]
    List(ListArgs),

    /// Show a single feature
    Get(GetArgs),

    /// Set a feature to true, false or unset
    Set(SetArgs),

    /// Toggle several features at once, optionally restarting the host
    Apply(ApplyArgs),

    /// Print the feature environment variables for child processes
    Env,

    /// Write the current features as a legacy XML document
    ExportLegacy(ExportLegacyArgs),
}

/// Arguments for the list command.
#[derive(Debug, Parser)]
pub struct ListArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the get command.
#[derive(Debug, Parser)]
pub struct GetArgs {
    /// Feature name (case-insensitive)
    pub name: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the set command.
#[derive(Debug, Parser)]
pub struct SetArgs {
    /// Feature name (case-insensitive)
    pub name: String,

    /// `true`, `false` or `unset`
    #[arg(value_parser = parse_tri_state)]
    pub value: TriState,
}

/// Arguments for the apply command.
#[derive(Debug, Parser)]
pub struct ApplyArgs {
    /// Changes as `name=true` or `name=false`
    #[arg(required = true, value_parser = parse_assignment)]
    pub changes: Vec<(String, bool)>,

    /// Restart the host after applying
    #[arg(long)]
    pub restart: bool,

    /// Reopen the previous session when restarting
    #[arg(long, requires = "restart")]
    pub reopen: bool,
}

/// Arguments for the export-legacy command.
#[derive(Debug, Parser)]
pub struct ExportLegacyArgs {
    /// Destination file
    pub path: PathBuf,
}

/// A feature as printed by `list --json` and `get --json`.
#[derive(Debug, Serialize, PartialEq)]
pub struct FeatureRecord {
    pub name: String,
    pub enabled: Option<bool>,
    pub originally_enabled: Option<bool>,
    pub needs_force_enable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FeatureRecord {
    fn new(feature: &FeatureState, catalog: &FeatureCatalog) -> Self {
        Self {
            name: feature.name.clone(),
            enabled: feature.enabled.as_bool(),
            originally_enabled: feature.originally_enabled.as_bool(),
            needs_force_enable: feature.needs_force_enable(),
            description: catalog
                .get(&feature.name)
                .map(|definition| definition.description.clone())
                .filter(|description| !description.is_empty()),
        }
    }
}

/// An initialized registry plus what the commands need around it.
pub struct Session {
    config: SwitchboardConfig,
    catalog: Arc<FeatureCatalog>,
    registry: Arc<FeatureRegistry>,
}

impl Session {
    /// Build the registry from `config` and initialize it.
    pub fn open(config: SwitchboardConfig) -> Result<Self> {
        let catalog = Arc::new(config.catalog().context("invalid feature catalog")?);
        let persistence = config
            .persistence()
            .context("failed to open settings store")?;
        let discovery: Arc<dyn FeatureDiscovery> = catalog.clone();
        let registry = Arc::new(FeatureRegistry::new(
            config.codec(),
            persistence,
            discovery,
        ));
        registry.initialize();
        debug!("Registry ready with {} features", registry.get_features().len());

        Ok(Self {
            config,
            catalog,
            registry,
        })
    }

    pub fn run(&self, command: Command) -> Result<()> {
        match command {
            Command::List(args) => self.list(&args),
            Command::Get(args) => self.get(&args),
            Command::Set(args) => self.set(&args),
            Command::Apply(args) => self.apply(&args),
            Command::Env => {
                print!("{}", self.render_env());
                Ok(())
            }
            Command::ExportLegacy(args) => self.export_legacy(&args),
        }
    }

    fn list(&self, args: &ListArgs) -> Result<()> {
        let features = self.registry.get_features();
        if args.json {
            let records: Vec<_> = features
                .iter()
                .map(|feature| FeatureRecord::new(feature, &self.catalog))
                .collect();
            println!("{}", serde_json::to_string_pretty(&records)?);
        } else if features.is_empty() {
            println!("No features found.");
        } else {
            print!("{}", render_table(&features));
        }
        Ok(())
    }

    fn get(&self, args: &GetArgs) -> Result<()> {
        let Some(feature) = self.registry.get_feature(&args.name) else {
            bail!("Feature not found: {}", args.name);
        };
        let record = FeatureRecord::new(&feature, &self.catalog);
        if args.json {
            println!("{}", serde_json::to_string_pretty(&record)?);
        } else {
            println!("{}: {}", record.name, feature.enabled);
            if let Some(description) = &record.description {
                println!("  {description}");
            }
            if record.needs_force_enable {
                println!("  force-enabled for components that started with it off");
            }
        }
        Ok(())
    }

    fn set(&self, args: &SetArgs) -> Result<()> {
        let report = self.registry.set_feature(&args.name, args.value)?;
        println!("{}={}", report.feature.name, report.feature.enabled);
        check_report(&report)
    }

    fn apply(&self, args: &ApplyArgs) -> Result<()> {
        let restarter = Arc::new(CommandRestarter::from_config(&self.config.restart));
        let mut panel = FeaturePanel::new(self.registry.clone(), restarter);

        for (name, enabled) in &args.changes {
            panel.stage(name, *enabled)?;
        }

        if !panel.is_dirty() {
            println!("No changes.");
        } else {
            let report = panel.apply()?;
            for change in &report.changes {
                println!("{}={}", change.feature.name, change.feature.enabled);
            }
            for change in &report.changes {
                check_report(change)?;
            }
            if !args.restart {
                println!("{RESTART_NOTICE}");
            }
        }

        if args.restart {
            panel.restart(args.reopen)?;
        }
        Ok(())
    }

    fn export_legacy(&self, args: &ExportLegacyArgs) -> Result<()> {
        let features = self.registry.get_features();
        LegacyXmlFile::new(&args.path)
            .write(&features)
            .with_context(|| format!("failed to write {}", args.path.display()))?;
        println!("Wrote {} features to {}", features.len(), args.path.display());
        Ok(())
    }

    /// `VAR=value` lines for both feature variables as currently published.
    fn render_env(&self) -> String {
        let codec = self.registry.codec();
        let snapshot = codec.snapshot();
        format!(
            "{}={}\n{}={}\n",
            codec.enabled_var(),
            snapshot.enabled.unwrap_or_default(),
            codec.disabled_var(),
            snapshot.disabled.unwrap_or_default()
        )
    }
}

/// A change that did not reach the settings store is an error for a
/// one-shot process; environment failures only warn.
fn check_report(report: &ChangeReport) -> Result<()> {
    let mut unsaved = Vec::new();
    for failure in &report.failures {
        match failure {
            FeatureError::Environment { .. } => {
                warn!("{}: {}", report.feature.name, failure);
            }
            other => unsaved.push(other.to_string()),
        }
    }
    if !unsaved.is_empty() {
        bail!(
            "{} was not saved: {}",
            report.feature.name,
            unsaved.join("; ")
        );
    }
    Ok(())
}

fn render_table(features: &[FeatureState]) -> String {
    let width = features
        .iter()
        .map(|feature| feature.name.len())
        .max()
        .unwrap_or(0)
        .max("NAME".len());

    let mut out = format!("{:<width$}  {:<11}  {:<11}\n", "NAME", "ENABLED", "ORIGINAL");
    for feature in features {
        let marker = if feature.needs_force_enable() {
            "  (forced)"
        } else {
            ""
        };
        out.push_str(&format!(
            "{:<width$}  {:<11}  {:<11}{}\n",
            feature.name,
            feature.enabled.to_string(),
            feature.originally_enabled.to_string(),
            marker
        ));
    }
    out
}

/// `true`, `false`, `unset` (or empty) into a tri-state.
pub fn parse_tri_state(value: &str) -> std::result::Result<TriState, String> {
    if value.trim().eq_ignore_ascii_case("unset") {
        return Ok(TriState::Unspecified);
    }
    value.parse::<TriState>().map_err(|e| e.to_string())
}

/// `name=true|false`.
pub fn parse_assignment(value: &str) -> std::result::Result<(String, bool), String> {
    let (name, enabled) = value
        .split_once('=')
        .ok_or_else(|| format!("expected name=true|false, got '{value}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing feature name in '{value}'"));
    }
    match enabled.parse::<TriState>().map_err(|e| e.to_string())?.as_bool() {
        Some(enabled) => Ok((name.to_string(), enabled)),
        None => Err(format!("expected true or false for '{name}'")),
    }
}
