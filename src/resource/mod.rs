//! Controllers for the two managed resource kinds: built expressions
//! and converged NixOS hosts.

pub mod build;
pub mod nixos;

#[cfg(test)]
pub mod testutil;

use anyhow::{Context, Result};
use std::io;
use std::path::Path;

/// What a non-mutating preview concluded about one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preview {
    /// Recorded state matches the manifest; nothing to do
    Unchanged,

    /// No record exists yet
    Create,

    /// Known difference between record and manifest
    Update { detail: String },

    /// The preview could not determine the outcome (typically a build
    /// failure); apply must assume a change
    Unknown { reason: String },
}

impl Preview {
    pub fn needs_apply(&self) -> bool {
        !matches!(self, Preview::Unchanged)
    }
}

/// Remove a file or symlink, succeeding when it is already gone.
///
/// Checked via `remove_file` rather than `exists()` so dangling symlinks
/// are removed too.
pub fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            log::debug!("removed {}", path.display());
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("Failed to remove {}", path.display())),
    }
}
