pub mod converge;
pub mod show;

use std::path::{Path, PathBuf};

/// State lives next to the manifest, under `.nixverge/`.
pub fn state_path_for(manifest_path: &Path) -> PathBuf {
    let dir = manifest_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    dir.join(".nixverge").join("state.toml")
}
