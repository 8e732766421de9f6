//! Backend abstraction for build and switch operations.
//!
//! The [`NixBackend`] trait defines the interface for everything that
//! shells out — nix-build, nixos-rebuild, ssh — allowing the
//! reconciliation logic to run against a mock in tests.

pub mod cli;

use std::path::Path;
use std::time::Duration;

use crate::error::Result;
use crate::types::RebuildConfig;

/// Backend trait for the operations that drive external tools.
///
/// Each method is stateless given its inputs and maps to one subprocess
/// invocation (plus a scoped temporary directory where an output link or
/// hook script is needed).
pub trait NixBackend: Send + Sync {
    /// Build a nix expression file, returning the resulting store path.
    ///
    /// With `out_link` the build leaves a persistent result symlink;
    /// without it, `--no-link` keeps the preview path non-mutating.
    fn build_expression(
        &self,
        nix_path: &str,
        expression_path: &Path,
        out_link: Option<&Path>,
    ) -> Result<String>;

    /// Build the full system configuration, returning its store path
    /// without activating anything.
    fn build_system(&self, cfg: &RebuildConfig) -> Result<String>;

    /// Read the store path of the system currently active on the target.
    fn current_system(&self, cfg: &RebuildConfig) -> Result<String>;

    /// Build and activate the configuration on the target, running the
    /// pre- and post-switch hooks around it.
    fn switch_system(&self, cfg: &RebuildConfig) -> Result<()>;

    /// Reclaim storage on the target for store paths no longer referenced.
    fn collect_garbage(&self, user: &str, host: &str, ssh_opts: &str) -> Result<()>;

    /// Block until the target accepts commands or `timeout` elapses.
    fn wait_for_ssh(&self, user: &str, host: &str, ssh_opts: &str, timeout: Duration)
    -> Result<()>;
}

/// Get the default backend (real subprocess invocations).
pub fn default_backend() -> cli::CliBackend {
    cli::CliBackend::new()
}
