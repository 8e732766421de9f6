//! Error types for subprocess-driven Nix operations.
//!
//! Child-process failures carry a bounded stderr diagnostic instead of the
//! raw stream, so errors stay readable even when a build produces megabytes
//! of output.

use thiserror::Error;

/// Errors that can occur while driving nix-build, nixos-rebuild or ssh.
#[derive(Debug, Error)]
pub enum Error {
    /// A child process exited with a non-zero status.
    ///
    /// `diagnostic` holds the first and last bytes of the process's stderr,
    /// with an elision marker in between when the stream exceeded the
    /// capture budget.
    #[error("{command} failed: {diagnostic}")]
    CommandFailed {
        /// Rendered command line that failed
        command: String,
        /// Bounded stderr diagnostic
        diagnostic: String,
    },

    /// A child process could not be started at all.
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        /// Rendered command line that could not be started
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The ssh client's config-resolution output did not yield a usable
    /// endpoint. Not retried: this indicates broken ssh configuration.
    #[error("could not resolve ssh endpoint for {destination}: {message}")]
    EndpointResolve {
        /// The `user@host` destination being resolved
        destination: String,
        /// What was missing or malformed
        message: String,
    },

    /// The remote did not accept a TCP connection before the deadline.
    #[error("ssh server on {host} down or not responsive")]
    RemoteUnresponsive {
        /// Effective host the probe dialed
        host: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this failure means the remote could not be reached, as
    /// opposed to an operation that ran and failed.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::RemoteUnresponsive { .. })
    }
}

/// Result type for Nix operations.
pub type Result<T> = std::result::Result<T, Error>;
