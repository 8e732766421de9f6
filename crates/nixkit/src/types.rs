//! Configuration types shared across operations.

/// Everything `nixos-rebuild` needs to build and switch one machine.
///
/// `nixos_config` is the on-disk path of the configuration entry point;
/// materializing inline configuration text to that path is the caller's
/// job.
#[derive(Debug, Clone, Default)]
pub struct RebuildConfig {
    pub target_host: String,
    pub target_user: String,
    pub build_host: String,
    pub nixos_config: String,
    pub nix_path: String,
    pub ssh_opts: String,
    pub pre_switch_hook: String,
    pub post_switch_hook: String,
}

impl RebuildConfig {
    /// Environment overrides applied to every `nixos-rebuild` invocation
    /// and to hook scripts.
    ///
    /// These are set explicitly from the target's configuration so an
    /// ambient `NIX_PATH` or `NIX_SSHOPTS` can never select a different
    /// tool or transport than the one declared.
    pub fn env(&self) -> Vec<(&'static str, String)> {
        vec![
            ("NIX_PATH", self.nix_path.clone()),
            ("NIX_TARGET_HOST", self.target_host.clone()),
            ("NIX_TARGET_USER", self.target_user.clone()),
            ("NIX_SSHOPTS", self.ssh_opts.clone()),
            ("NIXOS_CONFIG", self.nixos_config.clone()),
        ]
    }

    /// The `user@host` ssh destination of the machine being converged.
    pub fn destination(&self) -> String {
        format!("{}@{}", self.target_user, self.target_host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_sets_every_nix_variable_from_the_config() {
        let cfg = RebuildConfig {
            target_host: "web1".to_string(),
            target_user: "root".to_string(),
            build_host: "localhost".to_string(),
            nixos_config: "/etc/nixos/web1.nix".to_string(),
            nix_path: "nixpkgs=/nix/channel".to_string(),
            ssh_opts: "-o BatchMode=yes".to_string(),
            ..Default::default()
        };
        let env = cfg.env();
        let get = |k: &str| env.iter().find(|(key, _)| *key == k).map(|(_, v)| v.clone());
        assert_eq!(get("NIX_PATH").as_deref(), Some("nixpkgs=/nix/channel"));
        assert_eq!(get("NIX_TARGET_HOST").as_deref(), Some("web1"));
        assert_eq!(get("NIX_TARGET_USER").as_deref(), Some("root"));
        assert_eq!(get("NIX_SSHOPTS").as_deref(), Some("-o BatchMode=yes"));
        assert_eq!(get("NIXOS_CONFIG").as_deref(), Some("/etc/nixos/web1.nix"));
        assert_eq!(cfg.destination(), "root@web1");
    }
}
