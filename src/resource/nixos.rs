//! Controller for `[host.<name>]` entries: a NixOS machine converged on
//! a declared configuration.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use nixkit::NixBackend;

use crate::config::{HostConfig, Manifest};
use crate::resource::{Preview, remove_if_exists};
use crate::state::{HostRecord, random_id};

pub struct NixosHost<'a> {
    pub name: &'a str,
    pub config: &'a HostConfig,
    pub manifest: &'a Manifest,
}

impl NixosHost<'_> {
    /// The configuration entry point: the declared path, or the managed
    /// location inline text is materialized to.
    pub fn config_path(&self) -> PathBuf {
        match &self.config.config {
            Some(raw) => self.manifest.resolve(raw),
            None => self
                .manifest
                .data_dir()
                .join("configs")
                .join(format!("{}.nix", self.name)),
        }
    }

    fn owns_config(&self) -> bool {
        self.config.config_text.is_some()
    }

    fn ssh_timeout(&self) -> Duration {
        Duration::from_secs(self.config.ssh_timeout)
    }

    /// Decide what apply would do, without switching anything.
    ///
    /// Cheap checks come first (inline text, target address, hooks); only
    /// when those match is the system built for a store-path comparison.
    /// A failing preview build downgrades to [`Preview::Unknown`].
    pub fn preview(&self, backend: &dyn NixBackend, record: Option<&HostRecord>) -> Preview {
        let Some(record) = record else {
            return Preview::Create;
        };

        if let Some(text) = &self.config.config_text {
            let on_disk = fs::read_to_string(self.config_path()).unwrap_or_default();
            if on_disk != *text {
                return Preview::Unknown {
                    reason: "configuration text changed".to_string(),
                };
            }
        }

        if record.target_host != self.config.target_host {
            return Preview::Update {
                detail: format!("target host {} → {}", record.target_host, self.config.target_host),
            };
        }

        if record.hooks_digest != self.config.hooks_digest() {
            return Preview::Update {
                detail: "switch hooks changed".to_string(),
            };
        }

        let cfg = self.config.rebuild_config(&self.config_path());
        match backend.build_system(&cfg) {
            Ok(store_path) => {
                if record.nixos_system.as_deref() == Some(store_path.as_str()) {
                    Preview::Unchanged
                } else {
                    Preview::Update {
                        detail: format!(
                            "{} → {store_path}",
                            record.nixos_system.as_deref().unwrap_or("(unknown)")
                        ),
                    }
                }
            }
            Err(err) => {
                log::warn!("preview build for {} failed, assuming change: {err}", self.name);
                Preview::Unknown {
                    reason: "system build failed during preview".to_string(),
                }
            }
        }
    }

    /// Converge the host and return the updated record.
    ///
    /// Sequence: materialize configuration, wait for the host, optionally
    /// garbage-collect, switch, then read back the active system. A
    /// failed read-back leaves the observed system unknown rather than
    /// failing the apply; the switch itself already succeeded.
    pub fn apply(
        &self,
        backend: &dyn NixBackend,
        previous: Option<&HostRecord>,
    ) -> Result<HostRecord> {
        let config_path = self.config_path();

        if let Some(text) = &self.config.config_text {
            if let Some(dir) = config_path.parent() {
                fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
            }
            fs::write(&config_path, text)
                .with_context(|| format!("Failed to write {}", config_path.display()))?;
        }

        if let Some(previous) = previous
            && previous.owns_config
            && Path::new(&previous.config_path) != config_path
        {
            remove_if_exists(Path::new(&previous.config_path))?;
        }

        let cfg = self.config.rebuild_config(&config_path);

        backend.wait_for_ssh(
            &cfg.target_user,
            &cfg.target_host,
            &cfg.ssh_opts,
            self.ssh_timeout(),
        )?;

        if self.config.collect_garbage {
            backend.collect_garbage(&cfg.target_user, &cfg.target_host, &cfg.ssh_opts)?;
        }

        backend.switch_system(&cfg)?;
        log::info!("switched {} on {}", self.name, cfg.destination());

        // The switch may have replaced the kernel; give the host time to
        // come back before asking what is running.
        let observed = backend
            .wait_for_ssh(
                &cfg.target_user,
                &cfg.target_host,
                &cfg.ssh_opts,
                self.ssh_timeout(),
            )
            .and_then(|()| backend.current_system(&cfg));
        let nixos_system = match observed {
            Ok(store_path) => Some(store_path),
            Err(err) => {
                log::warn!("could not read back active system on {}: {err}", self.name);
                None
            }
        };

        Ok(HostRecord {
            id: previous.map_or_else(random_id, |p| p.id.clone()),
            nixos_system,
            target_host: self.config.target_host.clone(),
            config_path: config_path.to_string_lossy().into_owned(),
            owns_config: self.owns_config(),
            hooks_digest: self.config.hooks_digest(),
        })
    }

    /// Remove the materialized configuration, if this record owns one.
    /// Nothing on the remote machine is touched.
    pub fn destroy(record: &HostRecord) -> Result<()> {
        if record.owns_config {
            remove_if_exists(Path::new(&record.config_path))?;
        }
        Ok(())
    }
}
