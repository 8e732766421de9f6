//! Scripted backend for controller and planner tests.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use nixkit::error::{Error, Result};
use nixkit::{NixBackend, RebuildConfig};

/// Backend whose answers are fixed up front and whose calls are
/// recorded, so tests can assert both outcomes and the exact sequence
/// of operations.
pub struct MockBackend {
    store_path: String,
    fail_builds: bool,
    silent_remote: bool,
    current_system: Mutex<Option<String>>,
    calls: Mutex<Vec<String>>,
}

impl MockBackend {
    /// Every build returns `store_path`; the remote reports no active
    /// system until a switch happens.
    pub fn returning(store_path: &str) -> Self {
        Self {
            store_path: store_path.to_string(),
            fail_builds: false,
            silent_remote: false,
            current_system: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every build fails.
    pub fn failing() -> Self {
        Self {
            fail_builds: true,
            ..Self::returning("/nix/store/unused")
        }
    }

    /// Pretend the remote already runs `store_path`.
    pub fn with_active_system(self, store_path: &str) -> Self {
        *self.current_system.lock().unwrap() = Some(store_path.to_string());
        self
    }

    /// The remote never answers `current_system`, even after a switch.
    pub fn with_silent_remote(mut self) -> Self {
        self.silent_remote = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn build_result(&self, call: String) -> Result<String> {
        self.record(call);
        if self.fail_builds {
            return Err(Error::CommandFailed {
                command: "nix-build".to_string(),
                diagnostic: "mock build failure".to_string(),
            });
        }
        Ok(self.store_path.clone())
    }
}

impl NixBackend for MockBackend {
    fn build_expression(
        &self,
        _nix_path: &str,
        expression_path: &Path,
        out_link: Option<&Path>,
    ) -> Result<String> {
        self.build_result(format!(
            "build_expression {} link={}",
            expression_path.display(),
            out_link.is_some()
        ))
    }

    fn build_system(&self, cfg: &RebuildConfig) -> Result<String> {
        self.build_result(format!("build_system {}", cfg.target_host))
    }

    fn current_system(&self, cfg: &RebuildConfig) -> Result<String> {
        self.record(format!("current_system {}", cfg.target_host));
        if self.silent_remote {
            return Err(Error::CommandFailed {
                command: "ssh readlink".to_string(),
                diagnostic: "mock: remote not answering".to_string(),
            });
        }
        self.current_system
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::CommandFailed {
                command: "ssh readlink".to_string(),
                diagnostic: "mock: no active system".to_string(),
            })
    }

    fn switch_system(&self, cfg: &RebuildConfig) -> Result<()> {
        self.record(format!("switch_system {}", cfg.destination()));
        // A switch builds the system first, so build failures fail it too.
        if self.fail_builds {
            return Err(Error::CommandFailed {
                command: "nixos-rebuild switch".to_string(),
                diagnostic: "mock build failure".to_string(),
            });
        }
        *self.current_system.lock().unwrap() = Some(self.store_path.clone());
        Ok(())
    }

    fn collect_garbage(&self, user: &str, host: &str, _ssh_opts: &str) -> Result<()> {
        self.record(format!("collect_garbage {user}@{host}"));
        Ok(())
    }

    fn wait_for_ssh(
        &self,
        user: &str,
        host: &str,
        _ssh_opts: &str,
        _timeout: Duration,
    ) -> Result<()> {
        self.record(format!("wait_for_ssh {user}@{host}"));
        Ok(())
    }
}
