//! Plan computation: compare the manifest against recorded state.

use nixkit::NixBackend;

use crate::config::Manifest;
use crate::resource::build::BuildArtifact;
use crate::resource::nixos::NixosHost;
use crate::resource::Preview;
use crate::state::StateFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Build,
    Host,
}

impl Kind {
    pub fn label(self) -> &'static str {
        match self {
            Kind::Build => "build",
            Kind::Host => "host",
        }
    }
}

/// What apply would do for one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Unchanged,
    Create,
    Update { detail: String },
    /// Preview could not determine the outcome; apply assumes a change
    Unknown { reason: String },
    /// Recorded but no longer declared; its artifacts are removed
    Remove,
}

impl From<Preview> for Action {
    fn from(preview: Preview) -> Self {
        match preview {
            Preview::Unchanged => Action::Unchanged,
            Preview::Create => Action::Create,
            Preview::Update { detail } => Action::Update { detail },
            Preview::Unknown { reason } => Action::Unknown { reason },
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlanEntry {
    pub kind: Kind,
    pub name: String,
    pub action: Action,
}

impl PlanEntry {
    pub fn pending(&self) -> bool {
        !matches!(self.action, Action::Unchanged)
    }
}

#[derive(Debug, Default)]
pub struct Plan {
    pub entries: Vec<PlanEntry>,
}

impl Plan {
    pub fn pending_count(&self) -> usize {
        self.entries.iter().filter(|e| e.pending()).count()
    }

    pub fn is_converged(&self) -> bool {
        self.pending_count() == 0
    }
}

/// Preview every declared build and host (optionally narrowed to
/// `target`) and mark recorded entries the manifest no longer declares
/// for removal.
pub fn plan(
    manifest: &Manifest,
    state: &StateFile,
    backend: &dyn NixBackend,
    target: Option<&str>,
) -> Plan {
    let selected = |name: &str| target.is_none_or(|t| t == name);
    let mut entries = Vec::new();

    for (name, config) in &manifest.build {
        if !selected(name) {
            continue;
        }
        let artifact = BuildArtifact { name, config, manifest };
        let preview = artifact.preview(backend, state.builds.get(name));
        entries.push(PlanEntry {
            kind: Kind::Build,
            name: name.clone(),
            action: preview.into(),
        });
    }

    for (name, config) in &manifest.host {
        if !selected(name) {
            continue;
        }
        let host = NixosHost { name, config, manifest };
        let preview = host.preview(backend, state.hosts.get(name));
        entries.push(PlanEntry {
            kind: Kind::Host,
            name: name.clone(),
            action: preview.into(),
        });
    }

    let mut orphans: Vec<PlanEntry> = state
        .builds
        .keys()
        .filter(|name| selected(name.as_str()) && !manifest.build.contains_key(*name))
        .map(|name| PlanEntry {
            kind: Kind::Build,
            name: name.clone(),
            action: Action::Remove,
        })
        .chain(
            state
                .hosts
                .keys()
                .filter(|name| selected(name.as_str()) && !manifest.host.contains_key(*name))
                .map(|name| PlanEntry {
                    kind: Kind::Host,
                    name: name.clone(),
                    action: Action::Remove,
                }),
        )
        .collect();
    orphans.sort_by(|a, b| a.name.cmp(&b.name));
    entries.extend(orphans);

    Plan { entries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::testutil::MockBackend;
    use std::path::Path;

    fn manifest_with_root(toml_text: &str, root: &Path) -> Manifest {
        let mut manifest: Manifest = toml::from_str(toml_text).unwrap();
        manifest.root = root.to_path_buf();
        manifest
    }

    #[test]
    fn fresh_manifest_plans_creates_for_everything() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = manifest_with_root(
            r#"
            [build.sum]
            expression_text = "1 + 1"

            [host.web1]
            target_host = "web1.example"
            config_text = "{ }"
            "#,
            dir.path(),
        );

        let backend = MockBackend::returning("/nix/store/abc");
        let plan = plan(&manifest, &StateFile::default(), &backend, None);

        assert_eq!(plan.entries.len(), 2);
        assert!(plan.entries.iter().all(|e| e.action == Action::Create));
        assert_eq!(plan.pending_count(), 2);
    }

    #[test]
    fn second_plan_after_apply_is_converged() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = manifest_with_root(
            r#"
            [build.sum]
            expression_text = "1 + 1"
            "#,
            dir.path(),
        );

        let backend = MockBackend::returning("/nix/store/abc-sum");
        let mut state = StateFile::default();

        let config = &manifest.build["sum"];
        let artifact = BuildArtifact { name: "sum", config, manifest: &manifest };
        let record = artifact.apply(&backend, None).unwrap();
        state.builds.insert("sum".to_string(), record);

        let plan = plan(&manifest, &state, &backend, None);
        assert!(plan.is_converged());
    }

    #[test]
    fn target_narrows_the_plan_to_one_entry() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = manifest_with_root(
            r#"
            [build.sum]
            expression_text = "1 + 1"

            [host.web1]
            target_host = "web1.example"
            config_text = "{ }"
            "#,
            dir.path(),
        );

        let backend = MockBackend::returning("/nix/store/abc");
        let plan = plan(&manifest, &StateFile::default(), &backend, Some("web1"));
        assert_eq!(plan.entries.len(), 1);
        assert_eq!(plan.entries[0].name, "web1");
        assert_eq!(plan.entries[0].kind, Kind::Host);
    }

    #[test]
    fn undeclared_records_are_planned_for_removal() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = manifest_with_root("", dir.path());

        let mut state = StateFile::default();
        state.builds.insert(
            "gone".to_string(),
            crate::state::BuildRecord {
                expression_path: "/tmp/gone.nix".to_string(),
                ..Default::default()
            },
        );

        let backend = MockBackend::returning("/nix/store/abc");
        let plan = plan(&manifest, &state, &backend, None);
        assert_eq!(plan.entries.len(), 1);
        assert_eq!(plan.entries[0].action, Action::Remove);
    }
}
