//! Controller for `[build.<name>]` entries: a Nix expression built into
//! the store, optionally pinned by a result symlink.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use nixkit::NixBackend;

use crate::config::{BuildConfig, Manifest};
use crate::resource::{Preview, remove_if_exists};
use crate::state::{BuildRecord, random_id};

pub struct BuildArtifact<'a> {
    pub name: &'a str,
    pub config: &'a BuildConfig,
    pub manifest: &'a Manifest,
}

impl BuildArtifact<'_> {
    /// The expression file to build: the declared path, or the managed
    /// location inline text is materialized to.
    pub fn expression_path(&self) -> PathBuf {
        match &self.config.expression {
            Some(raw) => self.manifest.resolve(raw),
            None => self
                .manifest
                .data_dir()
                .join("expressions")
                .join(format!("{}.nix", self.name)),
        }
    }

    fn owns_expression(&self) -> bool {
        self.config.expression_text.is_some()
    }

    pub fn out_link(&self) -> Option<PathBuf> {
        self.config.out_link.as_ref().map(|raw| self.manifest.resolve(raw))
    }

    /// Decide what apply would do, without mutating anything.
    ///
    /// The preview rebuilds with `--no-link` and compares store paths;
    /// a failing preview build downgrades to [`Preview::Unknown`] rather
    /// than aborting the plan, since apply may still succeed once the
    /// expression file is rematerialized.
    pub fn preview(&self, backend: &dyn NixBackend, record: Option<&BuildRecord>) -> Preview {
        let Some(record) = record else {
            return Preview::Create;
        };

        if let Some(text) = &self.config.expression_text {
            let on_disk = fs::read_to_string(self.expression_path()).unwrap_or_default();
            if on_disk != *text {
                return Preview::Unknown {
                    reason: "expression text changed".to_string(),
                };
            }
        }

        // metadata() follows the symlink, so a dangling link counts as
        // broken too.
        if let Some(link) = self.out_link()
            && fs::metadata(&link).is_err()
        {
            return Preview::Update {
                detail: format!("restore result link {}", link.display()),
            };
        }

        match backend.build_expression(&self.config.nix_path(), &self.expression_path(), None) {
            Ok(store_path) => {
                if record.store_path.as_deref() == Some(store_path.as_str()) {
                    Preview::Unchanged
                } else {
                    Preview::Update {
                        detail: format!(
                            "{} → {store_path}",
                            record.store_path.as_deref().unwrap_or("(none)")
                        ),
                    }
                }
            }
            Err(err) => {
                log::warn!("preview build of {} failed, assuming change: {err}", self.name);
                Preview::Unknown {
                    reason: "build failed during preview".to_string(),
                }
            }
        }
    }

    /// Build the expression and return the updated record.
    pub fn apply(
        &self,
        backend: &dyn NixBackend,
        previous: Option<&BuildRecord>,
    ) -> Result<BuildRecord> {
        let expression_path = self.expression_path();

        if let Some(text) = &self.config.expression_text {
            if let Some(dir) = expression_path.parent() {
                fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
            }
            fs::write(&expression_path, text)
                .with_context(|| format!("Failed to write {}", expression_path.display()))?;
        }

        let out_link = self.out_link();

        // Clean up artifacts left at locations the manifest no longer
        // points at.
        if let Some(previous) = previous {
            if let Some(old_link) = &previous.out_link
                && out_link.as_deref() != Some(Path::new(old_link))
            {
                remove_if_exists(Path::new(old_link))?;
            }
            if previous.owns_expression
                && Path::new(&previous.expression_path) != expression_path
            {
                remove_if_exists(Path::new(&previous.expression_path))?;
            }
        }

        let store_path = backend.build_expression(
            &self.config.nix_path(),
            &expression_path,
            out_link.as_deref(),
        )?;
        log::info!("built {} at {store_path}", self.name);

        Ok(BuildRecord {
            id: previous.map_or_else(random_id, |p| p.id.clone()),
            store_path: Some(store_path),
            out_link: out_link.map(|p| p.to_string_lossy().into_owned()),
            expression_path: expression_path.to_string_lossy().into_owned(),
            owns_expression: self.owns_expression(),
        })
    }

    /// Remove everything a record says this build left on disk. Paths
    /// already gone are fine.
    pub fn destroy(record: &BuildRecord) -> Result<()> {
        if let Some(link) = &record.out_link {
            remove_if_exists(Path::new(link))?;
        }
        if record.owns_expression {
            remove_if_exists(Path::new(&record.expression_path))?;
        }
        Ok(())
    }
}
