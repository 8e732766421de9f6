//! # Nixkit
//!
//! Subprocess plumbing for driving Nix and NixOS tooling on local and
//! remote machines.
//!
//! This crate wraps the external tools — `nix-build`, `nixos-rebuild`,
//! `ssh` — behind a small trait so the reconciliation logic above it can
//! run against a mock in tests.
//!
//! ## Core pieces
//!
//! - **[`NixBackend`]**: the operations that shell out (build, switch,
//!   probe, garbage-collect)
//! - **[`run_logged`] / [`run_capture`]**: streamed, line-tagged
//!   subprocess execution with complete-output guarantees
//! - **[`BoundedCapture`]**: first-and-last-bytes recorder that keeps
//!   error diagnostics readable for arbitrarily large stderr streams
//! - **[`wait_for_ssh`]**: endpoint resolution plus TCP polling plus an
//!   ssh liveness check, bounded by a deadline
//!
//! ## Example
//!
//! ```ignore
//! use nixkit::{default_backend, NixBackend, RebuildConfig};
//!
//! let backend = default_backend();
//! let cfg = RebuildConfig {
//!     target_host: "web1".into(),
//!     target_user: "root".into(),
//!     build_host: "localhost".into(),
//!     nixos_config: "/etc/nixos/web1.nix".into(),
//!     ..Default::default()
//! };
//! let built = backend.build_system(&cfg)?;
//! let active = backend.current_system(&cfg)?;
//! if built != active {
//!     backend.switch_system(&cfg)?;
//! }
//! ```

pub mod backend;
pub mod capture;
pub mod error;
pub mod runner;
pub mod ssh;
pub mod types;

// Re-export main types at crate root
pub use backend::{NixBackend, cli::CliBackend, default_backend};
pub use capture::BoundedCapture;
pub use error::{Error, Result};
pub use runner::{STDERR_CAPTURE_BUDGET, run_capture, run_logged};
pub use ssh::{DIAL_TIMEOUT, Endpoint, RETRY_INTERVAL, resolve_endpoint, wait_for_port, wait_for_ssh};
pub use types::RebuildConfig;
