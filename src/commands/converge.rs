//! The plan / apply / destroy cycle.

use anyhow::{Result, bail};
use std::path::Path;

use crate::Context;
use crate::commands::state_path_for;
use crate::config::Manifest;
use crate::engine::executor::{self, ExecuteOptions};
use crate::engine::{differ, planner};
use crate::state::StateFile;

pub fn plan(ctx: &Context, manifest_path: &Path, target: Option<&str>) -> Result<()> {
    let manifest = Manifest::load(manifest_path)?;
    let state = StateFile::load(&state_path_for(manifest_path))?;
    check_target(&manifest, &state, target)?;

    let backend = nixkit::default_backend();
    let plan = planner::plan(&manifest, &state, &backend, target);
    differ::display_plan(&plan, ctx.quiet);
    Ok(())
}

pub fn apply(ctx: &Context, manifest_path: &Path, target: Option<&str>, yes: bool) -> Result<()> {
    let manifest = Manifest::load(manifest_path)?;
    let state_path = state_path_for(manifest_path);
    let mut state = StateFile::load(&state_path)?;
    check_target(&manifest, &state, target)?;

    let backend = nixkit::default_backend();
    let plan = planner::plan(&manifest, &state, &backend, target);
    differ::display_plan(&plan, ctx.quiet);

    let opts = ExecuteOptions { yes };
    let summary = executor::execute(&manifest, &mut state, &state_path, &backend, &plan, &opts)?;
    if !summary.is_success() {
        bail!("{} resource(s) failed to converge", summary.failed);
    }
    Ok(())
}

pub fn destroy(manifest_path: &Path, target: Option<&str>, yes: bool) -> Result<()> {
    let state_path = state_path_for(manifest_path);
    let mut state = StateFile::load(&state_path)?;

    let summary = executor::destroy(&mut state, &state_path, target, yes)?;
    if !summary.is_success() {
        bail!("{} resource(s) could not be removed", summary.failed);
    }
    Ok(())
}

/// A target must name something the manifest declares or the state
/// remembers; anything else is a typo worth stopping on.
fn check_target(manifest: &Manifest, state: &StateFile, target: Option<&str>) -> Result<()> {
    let Some(name) = target else {
        return Ok(());
    };
    let known = manifest.build.contains_key(name)
        || manifest.host.contains_key(name)
        || state.builds.contains_key(name)
        || state.hosts.contains_key(name);
    if !known {
        bail!("unknown target '{name}': not in the manifest and not in recorded state");
    }
    Ok(())
}
