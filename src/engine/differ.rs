//! Plan display.

use colored::Colorize;

use super::planner::{Action, Plan};

/// Print the plan, one line per entry, with a trailing summary.
pub fn display_plan(plan: &Plan, quiet: bool) {
    if plan.is_converged() {
        println!();
        println!("  {} Everything up to date", "✓".green());
        return;
    }

    println!();
    for entry in &plan.entries {
        let line = match &entry.action {
            Action::Unchanged => {
                if quiet {
                    continue;
                }
                format!("{} {:<6} {}", "○".dimmed(), entry.kind.label(), entry.name)
            }
            Action::Create => format!(
                "{} {:<6} {} {}",
                "+".green(),
                entry.kind.label(),
                entry.name,
                "(new)".dimmed()
            ),
            Action::Update { detail } => format!(
                "{} {:<6} {} {}",
                "~".yellow(),
                entry.kind.label(),
                entry.name,
                detail.dimmed()
            ),
            Action::Unknown { reason } => format!(
                "{} {:<6} {} {}",
                "?".yellow(),
                entry.kind.label(),
                entry.name,
                reason.dimmed()
            ),
            Action::Remove => format!(
                "{} {:<6} {} {}",
                "-".red(),
                entry.kind.label(),
                entry.name,
                "(no longer declared)".dimmed()
            ),
        };
        println!("  {line}");
    }

    let pending = plan.pending_count();
    let unchanged = plan.entries.len() - pending;
    println!();
    println!(
        "  {} pending, {} unchanged",
        pending.to_string().bold(),
        unchanged
    );
}
