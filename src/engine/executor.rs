//! Plan execution with state persistence after every step.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

use nixkit::NixBackend;

use crate::config::Manifest;
use crate::resource::build::BuildArtifact;
use crate::resource::nixos::NixosHost;
use crate::state::StateFile;
use crate::ui;

use super::planner::{Action, Kind, Plan};

#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Skip confirmation prompts
    pub yes: bool,
}

/// Summary of execution results
#[derive(Debug, Default)]
pub struct ExecuteSummary {
    pub applied: usize,
    pub removed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ExecuteSummary {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Carry out every pending entry of `plan`, in plan order.
///
/// State is saved after each successful entry, so a failure partway
/// through leaves completed work recorded and untouched entries exactly
/// as they were. Failures do not stop the run; they are counted and
/// reported at the end.
pub fn execute(
    manifest: &Manifest,
    state: &mut StateFile,
    state_path: &Path,
    backend: &dyn NixBackend,
    plan: &Plan,
    opts: &ExecuteOptions,
) -> Result<ExecuteSummary> {
    let mut summary = ExecuteSummary::default();

    if plan.is_converged() {
        return Ok(summary);
    }

    if !opts.yes && !confirm_proceed()? {
        println!();
        println!("  {} Aborted", "✗".red());
        summary.skipped = plan.pending_count();
        return Ok(summary);
    }

    for entry in plan.entries.iter().filter(|e| e.pending()) {
        let removing = entry.action == Action::Remove;
        let outcome = match entry.kind {
            Kind::Build => apply_build(manifest, state, backend, &entry.name, removing),
            Kind::Host => apply_host(manifest, state, backend, &entry.name, removing),
        };

        match outcome {
            Ok(()) => {
                if removing {
                    ui::success(&format!("removed {} {}", entry.kind.label(), entry.name));
                    summary.removed += 1;
                } else {
                    ui::success(&format!("applied {} {}", entry.kind.label(), entry.name));
                    summary.applied += 1;
                }
                state.save(state_path)?;
            }
            Err(err) => {
                ui::error(&format!("{} {}: {err:#}", entry.kind.label(), entry.name));
                summary.failed += 1;
            }
        }
    }

    print_summary(&summary);
    Ok(summary)
}

fn apply_build(
    manifest: &Manifest,
    state: &mut StateFile,
    backend: &dyn NixBackend,
    name: &str,
    removing: bool,
) -> Result<()> {
    if removing {
        if let Some(record) = state.builds.get(name) {
            BuildArtifact::destroy(record)?;
        }
        state.builds.remove(name);
        return Ok(());
    }

    let config = manifest
        .build
        .get(name)
        .with_context(|| format!("build.{name} is not declared"))?;
    let artifact = BuildArtifact { name, config, manifest };
    let record = artifact.apply(backend, state.builds.get(name))?;
    state.builds.insert(name.to_string(), record);
    Ok(())
}

fn apply_host(
    manifest: &Manifest,
    state: &mut StateFile,
    backend: &dyn NixBackend,
    name: &str,
    removing: bool,
) -> Result<()> {
    if removing {
        if let Some(record) = state.hosts.get(name) {
            NixosHost::destroy(record)?;
        }
        state.hosts.remove(name);
        return Ok(());
    }

    let config = manifest
        .host
        .get(name)
        .with_context(|| format!("host.{name} is not declared"))?;
    let host = NixosHost { name, config, manifest };
    let record = host.apply(backend, state.hosts.get(name))?;
    state.hosts.insert(name.to_string(), record);
    Ok(())
}

/// Remove every recorded build and host (optionally narrowed to
/// `target`), deleting the artifacts their records point at. Running
/// against empty state is a no-op.
pub fn destroy(
    state: &mut StateFile,
    state_path: &Path,
    target: Option<&str>,
    yes: bool,
) -> Result<ExecuteSummary> {
    let selected = |name: &str| target.is_none_or(|t| t == name);
    let build_names: Vec<String> = state
        .builds
        .keys()
        .filter(|n| selected(n.as_str()))
        .cloned()
        .collect();
    let host_names: Vec<String> = state
        .hosts
        .keys()
        .filter(|n| selected(n.as_str()))
        .cloned()
        .collect();

    let mut summary = ExecuteSummary::default();
    if build_names.is_empty() && host_names.is_empty() {
        println!();
        println!("  {} Nothing to destroy", "✓".green());
        return Ok(summary);
    }

    if !yes && !confirm_proceed()? {
        println!();
        println!("  {} Aborted", "✗".red());
        summary.skipped = build_names.len() + host_names.len();
        return Ok(summary);
    }

    for name in &build_names {
        if let Some(record) = state.builds.get(name) {
            match BuildArtifact::destroy(record) {
                Ok(()) => {
                    state.builds.remove(name);
                    state.save(state_path)?;
                    ui::success(&format!("removed build {name}"));
                    summary.removed += 1;
                }
                Err(err) => {
                    ui::error(&format!("build {name}: {err:#}"));
                    summary.failed += 1;
                }
            }
        }
    }
    for name in &host_names {
        if let Some(record) = state.hosts.get(name) {
            match NixosHost::destroy(record) {
                Ok(()) => {
                    state.hosts.remove(name);
                    state.save(state_path)?;
                    ui::success(&format!("removed host {name}"));
                    summary.removed += 1;
                }
                Err(err) => {
                    ui::error(&format!("host {name}: {err:#}"));
                    summary.failed += 1;
                }
            }
        }
    }

    Ok(summary)
}

/// Confirm with user
fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(true)
        .interact()?;

    Ok(confirmed)
}

fn print_summary(summary: &ExecuteSummary) {
    println!();
    if summary.is_success() {
        println!("  {} Converged", "✓".green().bold());
    } else {
        println!("  {} Converged with errors", "⚠".yellow().bold());
    }
    if summary.applied > 0 {
        println!("    • {} applied", summary.applied);
    }
    if summary.removed > 0 {
        println!("    • {} removed", summary.removed);
    }
    if summary.skipped > 0 {
        println!("    • {} skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {}", summary.failed, "failed".red());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::planner;
    use crate::resource::testutil::MockBackend;

    fn manifest_with_root(toml_text: &str, root: &Path) -> Manifest {
        let mut manifest: Manifest = toml::from_str(toml_text).unwrap();
        manifest.root = root.to_path_buf();
        manifest
    }

    const TWO_RESOURCES: &str = r#"
        [build.sum]
        expression_text = "1 + 1"
        out_link = "./result-sum"

        [host.web1]
        target_host = "web1.example"
        config_text = "{ }"
    "#;

    #[test]
    fn execute_applies_everything_and_persists_state() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = manifest_with_root(TWO_RESOURCES, dir.path());
        let state_path = manifest.data_dir().join("state.toml");

        let backend = MockBackend::returning("/nix/store/abc");
        let mut state = StateFile::default();
        let plan = planner::plan(&manifest, &state, &backend, None);

        let opts = ExecuteOptions { yes: true };
        let summary =
            execute(&manifest, &mut state, &state_path, &backend, &plan, &opts).unwrap();

        assert_eq!(summary.applied, 2);
        assert!(summary.is_success());
        assert!(state.builds.contains_key("sum"));
        assert!(state.hosts.contains_key("web1"));

        let reloaded = StateFile::load(&state_path).unwrap();
        assert_eq!(reloaded.builds.len(), 1);
        assert_eq!(reloaded.hosts.len(), 1);
    }

    #[test]
    fn converged_plan_executes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = manifest_with_root(TWO_RESOURCES, dir.path());
        let state_path = manifest.data_dir().join("state.toml");

        let backend = MockBackend::returning("/nix/store/abc");
        let mut state = StateFile::default();
        let opts = ExecuteOptions { yes: true };

        let plan = planner::plan(&manifest, &state, &backend, None);
        execute(&manifest, &mut state, &state_path, &backend, &plan, &opts).unwrap();
        // The mock backend does not create the result link; stand in for
        // nix-build so the preview sees it.
        std::fs::write(dir.path().join("result-sum"), "").unwrap();

        // The remote now runs the built system; a second round must not
        // switch again.
        let calls_after_first = backend.calls().len();
        let second = planner::plan(&manifest, &state, &backend, None);
        assert!(second.is_converged());
        let summary =
            execute(&manifest, &mut state, &state_path, &backend, &second, &opts).unwrap();
        assert_eq!(summary.applied, 0);
        let switches = backend
            .calls()
            .iter()
            .skip(calls_after_first)
            .filter(|c| c.starts_with("switch_system"))
            .count();
        assert_eq!(switches, 0);
    }

    #[test]
    fn failures_are_counted_and_leave_state_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = manifest_with_root(TWO_RESOURCES, dir.path());
        let state_path = manifest.data_dir().join("state.toml");

        let backend = MockBackend::failing();
        let mut state = StateFile::default();
        let plan = planner::plan(&manifest, &state, &backend, None);
        let opts = ExecuteOptions { yes: true };
        let summary =
            execute(&manifest, &mut state, &state_path, &backend, &plan, &opts).unwrap();

        // The build fails; the host apply never reaches a build (mock
        // fails build_system too).
        assert_eq!(summary.failed, 2);
        assert!(state.builds.is_empty());
        assert!(state.hosts.is_empty());
    }

    #[test]
    fn destroy_removes_records_and_artifacts_idempotently() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = manifest_with_root(TWO_RESOURCES, dir.path());
        let state_path = manifest.data_dir().join("state.toml");

        let backend = MockBackend::returning("/nix/store/abc");
        let mut state = StateFile::default();
        let plan = planner::plan(&manifest, &state, &backend, None);
        let opts = ExecuteOptions { yes: true };
        execute(&manifest, &mut state, &state_path, &backend, &plan, &opts).unwrap();

        let expression = manifest.data_dir().join("expressions").join("sum.nix");
        assert!(expression.exists());

        let summary = destroy(&mut state, &state_path, None, true).unwrap();
        assert_eq!(summary.removed, 2);
        assert!(state.builds.is_empty());
        assert!(state.hosts.is_empty());
        assert!(!expression.exists());

        // Destroying again finds nothing and succeeds.
        let again = destroy(&mut state, &state_path, None, true).unwrap();
        assert_eq!(again.removed, 0);
        assert!(again.is_success());
    }
}
