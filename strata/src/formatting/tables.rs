//! Table formatting utilities using comfy-table.

use std::time::Duration;

use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};
use owo_colors::OwoColorize;
use strata_core::release::{BumpType, ReleasePlan};
use strata_core::{Package, RunResult, TaskGraph, Violation};

use super::output::format_duration;
use super::status::Status;

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(*h).add_attribute(Attribute::Bold))
                .collect::<Vec<_>>(),
        )
        .load_preset(comfy_table::presets::UTF8_FULL)
        .apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Packages with their layer, version and tasks.
pub fn print_package_table(packages: &[Package]) {
    let mut table = new_table(&["Package", "Layer", "Version", "Tasks"]);

    for package in packages {
        let tasks = if package.tasks.is_empty() {
            "(no tasks)".bright_black().to_string()
        } else {
            package
                .tasks
                .iter()
                .map(|t| t.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        table.add_row(vec![
            Cell::new(&package.name).fg(Color::White),
            Cell::new(&package.layer).fg(Color::Cyan),
            Cell::new(package.version.as_deref().unwrap_or("-")).fg(Color::DarkGrey),
            Cell::new(tasks),
        ]);
    }

    println!("{}", table);
}

/// Prints a simple list of names, one per line.
pub fn print_package_list(packages: &[&str]) {
    if packages.is_empty() {
        println!("  {} {}", "→".cyan(), "(none)".bright_black());
        return;
    }

    for pkg in packages {
        println!("  {} {}", "→".cyan(), pkg.bold().white());
    }
}

/// Tasks in execution order with what each one waits for.
pub fn print_task_order_table(graph: &TaskGraph) {
    let mut table = new_table(&["#", "Task", "Runner", "Waits for"]);

    for (position, node) in graph.topological_order().into_iter().enumerate() {
        let waits_for = graph
            .predecessors(&node.id)
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        table.add_row(vec![
            Cell::new(position + 1).fg(Color::DarkGrey),
            Cell::new(node.id.to_string()).fg(Color::White),
            Cell::new(&node.runner).fg(Color::Cyan),
            Cell::new(waits_for),
        ]);
    }

    println!("{}", table);
}

/// Final status of every task in a run.
pub fn print_task_results(result: &RunResult) {
    let mut table = new_table(&["Status", "Task", "Duration", "Details"]);

    for task in &result.tasks {
        let status = Status::from(task.status);
        let details = match (&task.error, &task.blocked_by) {
            (Some(error), _) => {
                let stderr = task.stderr.trim();
                if stderr.is_empty() {
                    error.clone()
                } else {
                    format!("{}\n{}", error, stderr)
                }
            }
            (None, Some(blocker)) => format!("blocked by {}", blocker),
            (None, None) => task.status.as_str().to_string(),
        };
        table.add_row(vec![
            Cell::new(status.symbol()).fg(status.color()),
            Cell::new(task.id.to_string()).fg(Color::White),
            Cell::new(format_duration(Duration::from_millis(task.duration_ms))).fg(Color::DarkGrey),
            Cell::new(details).fg(status.color()),
        ]);
    }

    println!("{}", table);
}

pub fn print_violation_table(violations: &[Violation]) {
    let mut table = new_table(&["Kind", "Violation"]);

    for violation in violations {
        let kind = match violation {
            Violation::Layer { .. } => "layer",
            Violation::Cycle { .. } => "cycle",
        };
        table.add_row(vec![
            Cell::new(kind).fg(Color::Red),
            Cell::new(violation.to_string()),
        ]);
    }

    println!("{}", table);
}

pub fn print_plan_table(plan: &ReleasePlan) {
    let mut table = new_table(&["Type", "Package", "Version"]);

    for pkg in &plan.packages {
        let old_ver = pkg.old_version.as_deref().unwrap_or("(new)");
        let version_str = format!("{} → {}", old_ver, pkg.new_version);
        let (type_label, type_color) = match pkg.bump_type {
            BumpType::Major => ("MAJOR", Color::Red),
            BumpType::Minor => ("MINOR", Color::Yellow),
            BumpType::Patch => ("PATCH", Color::Green),
        };
        table.add_row(vec![
            Cell::new(type_label).fg(type_color),
            Cell::new(&pkg.name).fg(Color::White),
            Cell::new(version_str).fg(Color::Cyan),
        ]);
    }

    println!("{}", table);
}
