//! Configuration loading.
//!
//! This is the ambient layer that the core sandbox engine deliberately
//! does not own (spec §1 lists configuration loading, environment
//! variables and structured logging as external collaborators). It
//! exists here only so the CLI entry point has somewhere to get a
//! `engine_url` and a `Vec<Profile>` from before calling
//! [`crate::profile::configure`].

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::profile::Profile;

/// Top-level daemon configuration, loaded from a TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct Configuration {
    /// URL of the container engine (e.g. `unix:///var/run/docker.sock`).
    /// `None` means "use the platform default" (see `EngineClient::new`).
    #[serde(default)]
    pub engine_url: Option<String>,

    /// Container name prefix; production uses `"epicbox-"`, the test
    /// harness uses `"epicbox-test-"` so GC can filter by prefix.
    #[serde(default = "default_prefix")]
    pub container_prefix: String,

    /// Declared profiles, keyed by name.
    #[serde(default)]
    pub profiles: HashMap<String, ProfileConfiguration>,
}

fn default_prefix() -> String {
    "epicbox-".to_string()
}

/// On-disk shape of a single profile entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileConfiguration {
    pub image: String,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub network_disabled: bool,
}

fn default_user() -> String {
    "sandbox".to_string()
}

impl Configuration {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Configuration =
            toml::from_str(&content).with_context(|| "failed to parse configuration")?;
        Ok(config)
    }

    /// Turn the declared profile table into `Profile` values ready for
    /// [`crate::profile::configure`].
    pub fn profiles(&self) -> Vec<Profile> {
        self.profiles
            .iter()
            .map(|(name, p)| Profile {
                name: name.clone(),
                image: p.image.clone(),
                default_command: p.command.clone(),
                user: p.user.clone(),
                read_only: p.read_only,
                network_disabled: p.network_disabled,
            })
            .collect()
    }
}
