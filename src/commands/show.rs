//! Display recorded state.

use anyhow::Result;
use std::path::Path;

use crate::commands::state_path_for;
use crate::state::StateFile;
use crate::ui;

pub fn run(manifest_path: &Path, target: Option<&str>) -> Result<()> {
    let state = StateFile::load(&state_path_for(manifest_path))?;
    let selected = |name: &str| target.is_none_or(|t| t == name);

    let builds: Vec<_> = state.builds.iter().filter(|(n, _)| selected(n.as_str())).collect();
    let hosts: Vec<_> = state.hosts.iter().filter(|(n, _)| selected(n.as_str())).collect();

    if builds.is_empty() && hosts.is_empty() {
        ui::info("No recorded state");
        return Ok(());
    }

    if !builds.is_empty() {
        ui::header("Builds");
        for (name, record) in builds {
            println!();
            println!("  {name}");
            ui::kv("id", &record.id);
            ui::kv("store path", record.store_path.as_deref().unwrap_or("(none)"));
            if let Some(link) = &record.out_link {
                ui::kv("result link", link);
            }
            ui::kv("expression", &record.expression_path);
        }
    }

    if !hosts.is_empty() {
        ui::header("Hosts");
        for (name, record) in hosts {
            println!();
            println!("  {name}");
            ui::kv("id", &record.id);
            ui::kv("target host", &record.target_host);
            ui::kv("configuration", &record.config_path);
            match &record.nixos_system {
                Some(system) => ui::kv("active system", system),
                None => {
                    ui::kv("active system", "(unknown)");
                    ui::warn(&format!(
                        "{name}: last switch could not be confirmed; run apply again"
                    ));
                }
            }
        }
    }

    Ok(())
}
