use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Recorded outcome of previous runs, stored as TOML next to the
/// manifest.
///
/// The state file is what plan compares the manifest against; a record
/// is created on first apply and removed on destroy.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StateFile {
    #[serde(default)]
    pub builds: HashMap<String, BuildRecord>,

    #[serde(default)]
    pub hosts: HashMap<String, HostRecord>,

    /// Last time the state was written
    pub last_updated: DateTime<Utc>,
}

/// Last known state of one `[build.<name>]`.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct BuildRecord {
    /// Stable identifier assigned on creation
    pub id: String,

    /// Store path produced by the last successful build
    pub store_path: Option<String>,

    /// Result symlink left behind, if one was requested
    pub out_link: Option<String>,

    /// Expression file that was built
    pub expression_path: String,

    /// Whether nixverge materialized the expression file (and may
    /// therefore delete it)
    #[serde(default)]
    pub owns_expression: bool,
}

/// Last known state of one `[host.<name>]`.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct HostRecord {
    /// Stable identifier assigned on creation
    pub id: String,

    /// Store path of the system observed active after the last switch
    pub nixos_system: Option<String>,

    /// Address the system was activated on
    pub target_host: String,

    /// Configuration entry point that was built
    pub config_path: String,

    /// Whether nixverge materialized the configuration file
    #[serde(default)]
    pub owns_config: bool,

    /// Digest of the hooks that ran at the last switch
    #[serde(default)]
    pub hooks_digest: String,
}

impl StateFile {
    /// Load state from `path`, or return empty state if the file does
    /// not exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("state file {} does not exist, starting empty", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file {}", path.display()))?;

        let state: StateFile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse state file {}", path.display()))?;

        log::debug!("loaded state from {}", path.display());
        Ok(state)
    }

    /// Save state to `path`, creating parent directories as needed.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.last_updated = Utc::now();

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory {}", dir.display()))?;
        }

        let content = toml::to_string_pretty(&self).context("Failed to serialize state to TOML")?;
        fs::write(path, &content)
            .with_context(|| format!("Failed to write state file {}", path.display()))?;

        log::debug!("saved state to {}", path.display());
        Ok(())
    }
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            builds: HashMap::new(),
            hosts: HashMap::new(),
            last_updated: Utc::now(),
        }
    }
}

/// Generate a stable record identifier: 32 random bytes as hex.
pub fn random_id() -> String {
    let bytes: [u8; 32] = rand::random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
