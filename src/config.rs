use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use nixkit::RebuildConfig;

/// ssh options applied when neither the manifest nor `NIX_SSHOPTS`
/// provides any.
pub const DEFAULT_SSH_OPTS: &str = "-o StrictHostKeyChecking=accept-new -o BatchMode=yes";

/// Default deadline for a host to become reachable, in seconds.
pub const DEFAULT_SSH_TIMEOUT: u64 = 180;

/// The manifest: every build and host this working directory declares.
///
/// Paths in the manifest are tilde-expanded and resolved relative to the
/// manifest file's own directory, so a manifest can be applied from
/// anywhere.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub build: BTreeMap<String, BuildConfig>,

    #[serde(default)]
    pub host: BTreeMap<String, HostConfig>,

    /// Directory the manifest was loaded from
    #[serde(skip)]
    pub root: PathBuf,
}

/// A Nix expression to build, declared as `[build.<name>]`.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    /// Path to the expression file to build
    pub expression: Option<String>,

    /// Inline expression text, materialized to a managed file
    pub expression_text: Option<String>,

    /// Where to leave the result symlink; without it the output is not
    /// protected from garbage collection
    pub out_link: Option<String>,

    pub nix_path: Option<String>,
}

/// A NixOS machine to converge, declared as `[host.<name>]`.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct HostConfig {
    /// Address the built system is activated on
    pub target_host: String,

    #[serde(default = "default_target_user")]
    pub target_user: String,

    /// Where the build runs; "localhost" builds locally and copies over
    #[serde(default = "default_build_host")]
    pub build_host: String,

    /// Path to the NixOS configuration entry point
    pub config: Option<String>,

    /// Inline configuration text, materialized to a managed file
    pub config_text: Option<String>,

    pub nix_path: Option<String>,

    pub ssh_opts: Option<String>,

    /// Seconds to wait for the host to accept connections
    #[serde(default = "default_ssh_timeout")]
    pub ssh_timeout: u64,

    /// Run `nix-collect-garbage -d` on the target before switching
    #[serde(default = "default_collect_garbage")]
    pub collect_garbage: bool,

    /// Script run on this machine before the switch
    #[serde(default)]
    pub pre_switch_hook: String,

    /// Script run on this machine after a successful switch
    #[serde(default)]
    pub post_switch_hook: String,
}

fn default_target_user() -> String {
    "root".to_string()
}

fn default_build_host() -> String {
    "localhost".to_string()
}

fn default_ssh_timeout() -> u64 {
    DEFAULT_SSH_TIMEOUT
}

fn default_collect_garbage() -> bool {
    true
}

impl Manifest {
    /// Load and validate the manifest at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read manifest {}", path.display()))?;

        let mut manifest: Manifest = toml::from_str(&content)
            .with_context(|| format!("Invalid manifest {}", path.display()))?;

        manifest.root = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<()> {
        for (name, build) in &self.build {
            if build.expression.is_some() == build.expression_text.is_some() {
                bail!("build.{name}: declare exactly one of 'expression' or 'expression_text'");
            }
        }
        for (name, host) in &self.host {
            if host.config.is_some() == host.config_text.is_some() {
                bail!("host.{name}: declare exactly one of 'config' or 'config_text'");
            }
            if host.target_host.is_empty() {
                bail!("host.{name}: 'target_host' must not be empty");
            }
        }
        Ok(())
    }

    /// Directory for everything nixverge writes next to the manifest:
    /// state, materialized expressions and configurations.
    pub fn data_dir(&self) -> PathBuf {
        self.root.join(".nixverge")
    }

    /// Tilde-expand `raw` and resolve it relative to the manifest.
    pub fn resolve(&self, raw: &str) -> PathBuf {
        let expanded = shellexpand::tilde(raw);
        let path = Path::new(expanded.as_ref());
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl BuildConfig {
    pub fn nix_path(&self) -> String {
        resolve_nix_path(self.nix_path.as_deref())
    }
}

impl HostConfig {
    pub fn nix_path(&self) -> String {
        resolve_nix_path(self.nix_path.as_deref())
    }

    /// Effective ssh options: manifest, then `NIX_SSHOPTS`, then the
    /// built-in default.
    pub fn ssh_opts(&self) -> String {
        if let Some(opts) = &self.ssh_opts {
            return opts.clone();
        }
        std::env::var("NIX_SSHOPTS").unwrap_or_else(|_| DEFAULT_SSH_OPTS.to_string())
    }

    /// Content digest of both hooks; a changed hook means the host must
    /// be re-converged even when the system itself is unchanged.
    pub fn hooks_digest(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.pre_switch_hook.as_bytes());
        hasher.update(&[0]);
        hasher.update(self.post_switch_hook.as_bytes());
        hasher.finalize().to_hex().to_string()
    }

    /// Assemble the rebuild configuration for this host, with the
    /// configuration entry point already resolved to `config_path`.
    pub fn rebuild_config(&self, config_path: &Path) -> RebuildConfig {
        RebuildConfig {
            target_host: self.target_host.clone(),
            target_user: self.target_user.clone(),
            build_host: self.build_host.clone(),
            nixos_config: config_path.to_string_lossy().into_owned(),
            nix_path: self.nix_path(),
            ssh_opts: self.ssh_opts(),
            pre_switch_hook: self.pre_switch_hook.clone(),
            post_switch_hook: self.post_switch_hook.clone(),
        }
    }
}

fn resolve_nix_path(declared: Option<&str>) -> String {
    if let Some(nix_path) = declared {
        return nix_path.to_string();
    }
    std::env::var("NIX_PATH").unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_text: &str) -> Manifest {
        let mut manifest: Manifest = toml::from_str(toml_text).unwrap();
        manifest.root = PathBuf::from("/manifests");
        manifest.validate().unwrap();
        manifest
    }

    #[test]
    fn minimal_host_gets_defaults() {
        let manifest = parse(
            r#"
            [host.web1]
            target_host = "web1.example"
            config = "./web1.nix"
            "#,
        );
        let host = &manifest.host["web1"];
        assert_eq!(host.target_user, "root");
        assert_eq!(host.build_host, "localhost");
        assert_eq!(host.ssh_timeout, DEFAULT_SSH_TIMEOUT);
        assert!(host.collect_garbage);
        assert!(host.pre_switch_hook.is_empty());
    }

    #[test]
    fn build_requires_exactly_one_expression_source() {
        let both: Manifest = toml::from_str(
            r#"
            [build.x]
            expression = "./x.nix"
            expression_text = "1 + 1"
            "#,
        )
        .unwrap();
        assert!(both.validate().is_err());

        let neither: Manifest = toml::from_str("[build.x]\n").unwrap();
        assert!(neither.validate().is_err());
    }

    #[test]
    fn host_requires_exactly_one_config_source() {
        let neither: Manifest = toml::from_str(
            r#"
            [host.web1]
            target_host = "web1.example"
            "#,
        )
        .unwrap();
        assert!(neither.validate().is_err());
    }

    #[test]
    fn relative_paths_resolve_against_the_manifest_directory() {
        let manifest = parse(
            r#"
            [build.hello]
            expression = "./hello.nix"
            "#,
        );
        assert_eq!(manifest.resolve("./hello.nix"), PathBuf::from("/manifests/./hello.nix"));
        assert_eq!(manifest.resolve("/abs/hello.nix"), PathBuf::from("/abs/hello.nix"));
    }

    #[test]
    fn hooks_digest_tracks_hook_content() {
        let manifest = parse(
            r#"
            [host.web1]
            target_host = "web1.example"
            config = "./web1.nix"
            "#,
        );
        let base = manifest.host["web1"].hooks_digest();

        let mut changed = manifest.host["web1"].clone();
        changed.pre_switch_hook = "echo pre".to_string();
        assert_ne!(base, changed.hooks_digest());

        // Swapping the two hooks must not collide.
        let mut pre_only = manifest.host["web1"].clone();
        pre_only.pre_switch_hook = "echo x".to_string();
        let mut post_only = manifest.host["web1"].clone();
        post_only.post_switch_hook = "echo x".to_string();
        assert_ne!(pre_only.hooks_digest(), post_only.hooks_digest());
    }

    #[test]
    fn explicit_ssh_opts_win() {
        let manifest = parse(
            r#"
            [host.web1]
            target_host = "web1.example"
            config = "./web1.nix"
            ssh_opts = "-o BatchMode=no"
            "#,
        );
        assert_eq!(manifest.host["web1"].ssh_opts(), "-o BatchMode=no");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result: std::result::Result<Manifest, _> = toml::from_str(
            r#"
            [host.web1]
            target_host = "web1.example"
            config = "./web1.nix"
            tearget_user = "admin"
            "#,
        );
        assert!(result.is_err());
    }
}
