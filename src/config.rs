//! Configuration loading
//!
//! Provisioning defaults (shell, home root, policy root) come from, in
//! increasing priority:
//! 1. Built-in defaults (`/bin/bash`, `/home`, `/etc/systemd/system`)
//! 2. A config file given with `--config` or `USERSLICE_CONFIG`
//! 3. Command-line flags
//!
//! Path values may use `~` and environment variables.

use anyhow::{Context, Result, bail};
use provision::ProvisionConfig;
use std::fs;
use std::path::{Path, PathBuf};

use crate::cli::Cli;

/// Supported config file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "toml" => Some(ConfigFormat::Toml),
            "json" => Some(ConfigFormat::Json),
            _ => None,
        }
    }
}

/// Load a config file, picking the parser from its extension
pub fn load_file(path: &Path) -> Result<ProvisionConfig> {
    let Some(format) = ConfigFormat::from_path(path) else {
        bail!(
            "Unsupported config format for {} (expected .toml or .json)",
            path.display()
        );
    };

    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read {}", path.display()))?;

    let config: ProvisionConfig = match format {
        ConfigFormat::Toml => toml::from_str(&content)
            .with_context(|| format!("Invalid TOML in {}", path.display()))?,
        ConfigFormat::Json => serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON in {}", path.display()))?,
    };

    log::debug!("Loaded config from {}", path.display());
    Ok(config)
}

/// Build the effective configuration for this invocation
pub fn resolve(cli: &Cli) -> Result<ProvisionConfig> {
    let mut config = match &cli.config {
        Some(path) => load_file(&expand(&path.to_string_lossy()))?,
        None => ProvisionConfig::default(),
    };

    if let Some(shell) = &cli.shell {
        config.shell.clone_from(shell);
    }
    if let Some(root) = &cli.home_root {
        config.home_root = PathBuf::from(root);
    }
    if let Some(root) = &cli.policy_root {
        config.policy_root = PathBuf::from(root);
    }

    config.home_root = expand(&config.home_root.to_string_lossy());
    config.policy_root = expand(&config.policy_root.to_string_lossy());

    validate(&config)?;
    log::debug!("Effective config: {:?}", config);
    Ok(config)
}

fn validate(config: &ProvisionConfig) -> Result<()> {
    if config.shell.is_empty() {
        bail!("Login shell must not be empty");
    }
    if !config.home_root.is_absolute() {
        bail!("home_root must be absolute: {}", config.home_root.display());
    }
    if !config.policy_root.is_absolute() {
        bail!("policy_root must be absolute: {}", config.policy_root.display());
    }
    Ok(())
}

/// Expand ~ and environment variables in a path string.
///
/// Unresolvable variables leave the string unchanged.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}
