//! Real backend executing nix-build, nixos-rebuild and ssh.

use std::io;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use crate::backend::NixBackend;
use crate::error::Result;
use crate::runner;
use crate::ssh;
use crate::types::RebuildConfig;

/// Backend that runs the real external tools.
#[derive(Debug, Default)]
pub struct CliBackend;

impl CliBackend {
    pub fn new() -> Self {
        Self
    }
}

impl NixBackend for CliBackend {
    fn build_expression(
        &self,
        nix_path: &str,
        expression_path: &Path,
        out_link: Option<&Path>,
    ) -> Result<String> {
        let mut cmd = Command::new("nix-build");
        match out_link {
            Some(link) => {
                cmd.arg("-o").arg(link);
            }
            None => {
                cmd.arg("--no-link");
            }
        }
        cmd.arg(expression_path);

        // Minimal environment: only the declared search path, plus PATH so
        // the tool itself can be found.
        cmd.env_clear();
        if let Some(path) = std::env::var_os("PATH") {
            cmd.env("PATH", path);
        }
        cmd.env("NIX_PATH", nix_path);

        let output = runner::run_capture(cmd)?;
        Ok(output.trim().to_string())
    }

    fn build_system(&self, cfg: &RebuildConfig) -> Result<String> {
        let tmp = tempfile::tempdir()?;
        let out_link = tmp.path().join("result");

        let mut cmd = Command::new("nixos-rebuild");
        cmd.args(["build", "--build-host", &cfg.build_host])
            .current_dir(tmp.path())
            .envs(cfg.env());
        runner::run_logged(cmd, &mut io::sink())?;

        // nixos-rebuild leaves a `result` symlink in the working directory;
        // its target is the system's store path.
        let store_path = std::fs::read_link(&out_link)?;
        Ok(store_path.to_string_lossy().into_owned())
    }

    fn current_system(&self, cfg: &RebuildConfig) -> Result<String> {
        let cmd = remote_shell(
            &cfg.ssh_opts,
            &cfg.destination(),
            "readlink /run/current-system",
            true,
        );
        let output = runner::run_capture(cmd)?;
        Ok(output.trim().to_string())
    }

    fn switch_system(&self, cfg: &RebuildConfig) -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let hook_path = tmp.path().join("hook");

        run_hook(&hook_path, &cfg.pre_switch_hook, cfg)?;

        let mut cmd = Command::new("nixos-rebuild");
        cmd.args([
            "switch",
            "--build-host",
            &cfg.build_host,
            "--target-host",
            &cfg.destination(),
        ])
        .envs(cfg.env());
        runner::run_logged(cmd, &mut io::sink())?;

        run_hook(&hook_path, &cfg.post_switch_hook, cfg)
    }

    fn collect_garbage(&self, user: &str, host: &str, ssh_opts: &str) -> Result<()> {
        let cmd = remote_shell(
            ssh_opts,
            &format!("{user}@{host}"),
            "nix-collect-garbage -d",
            false,
        );
        runner::run_logged(cmd, &mut io::sink())
    }

    fn wait_for_ssh(
        &self,
        user: &str,
        host: &str,
        ssh_opts: &str,
        timeout: Duration,
    ) -> Result<()> {
        ssh::wait_for_ssh(user, host, ssh_opts, timeout)
    }
}

/// Build a `sh -c "exec [timeout 10s] ssh ..."` command for a remote
/// operation. `bounded` wraps the call in an external timeout for commands
/// that must answer quickly.
fn remote_shell(ssh_opts: &str, destination: &str, remote_cmd: &str, bounded: bool) -> Command {
    let script = remote_script(ssh_opts, destination, remote_cmd, bounded);
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(script);
    cmd
}

fn remote_script(ssh_opts: &str, destination: &str, remote_cmd: &str, bounded: bool) -> String {
    if bounded {
        format!("exec timeout 10s ssh {ssh_opts} {destination} -- {remote_cmd}")
    } else {
        format!("exec ssh {ssh_opts} {destination} -- {remote_cmd}")
    }
}

/// Write `text` to `path` as a mode-0700 script and run it with the
/// rebuild environment. Empty hook text is a no-op.
fn run_hook(path: &Path, text: &str, cfg: &RebuildConfig) -> Result<()> {
    if text.is_empty() {
        return Ok(());
    }

    std::fs::write(path, text)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    }

    let mut cmd = Command::new(path);
    cmd.envs(cfg.env());
    runner::run_logged(cmd, &mut io::sink())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_script_with_timeout_wrapper() {
        let script = remote_script(
            "-o BatchMode=yes",
            "root@web1",
            "readlink /run/current-system",
            true,
        );
        assert_eq!(
            script,
            "exec timeout 10s ssh -o BatchMode=yes root@web1 -- readlink /run/current-system"
        );
    }

    #[test]
    fn remote_script_without_timeout_wrapper() {
        let script = remote_script("", "root@web1", "nix-collect-garbage -d", false);
        assert_eq!(script, "exec ssh  root@web1 -- nix-collect-garbage -d");
    }

    #[test]
    fn empty_hook_is_a_no_op() {
        let tmp = tempfile::tempdir().unwrap();
        let hook_path = tmp.path().join("hook");
        run_hook(&hook_path, "", &RebuildConfig::default()).unwrap();
        assert!(!hook_path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn hook_script_runs_with_rebuild_environment() {
        let tmp = tempfile::tempdir().unwrap();
        let hook_path = tmp.path().join("hook");
        let witness = tmp.path().join("witness");
        let cfg = RebuildConfig {
            target_host: "web1".to_string(),
            ..Default::default()
        };
        run_hook(
            &hook_path,
            &format!("#!/bin/sh\necho \"$NIX_TARGET_HOST\" > {}\n", witness.display()),
            &cfg,
        )
        .unwrap();
        let recorded = std::fs::read_to_string(&witness).unwrap();
        assert_eq!(recorded.trim(), "web1");
    }

    #[cfg(unix)]
    #[test]
    fn failing_hook_surfaces_its_stderr() {
        let tmp = tempfile::tempdir().unwrap();
        let hook_path = tmp.path().join("hook");
        let err = run_hook(
            &hook_path,
            "#!/bin/sh\necho hook exploded >&2\nexit 1\n",
            &RebuildConfig::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("hook exploded"), "{err}");
    }
}
