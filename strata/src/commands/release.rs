//! `release`: drives the release machine against the workspace.

use std::path::Path;

use anyhow::Result;
use owo_colors::OwoColorize;
use serde::Serialize;
use strata_core::release::{
    BumpType, ReleaseDriver, ReleasePlan, ReleaseRun, ReleaseState, WorkspaceReleaseActions,
};

use crate::formatting::{
    print_error, print_key_value, print_plan_table, print_section_header, print_success,
    SectionStyle,
};

use super::load_context;

pub struct ReleaseOptions {
    pub package: Option<String>,
    pub dry_run: bool,
    pub no_tag: bool,
    pub json: bool,
}

#[derive(Serialize)]
struct ReleaseReport<'a> {
    #[serde(flatten)]
    run: &'a ReleaseRun,
    #[serde(skip_serializing_if = "Option::is_none")]
    plan: Option<&'a ReleasePlan>,
    dry_run: bool,
}

pub fn cmd_release(root: &Path, kind: BumpType, options: ReleaseOptions) -> Result<bool> {
    let ctx = load_context(root)?;
    let driver = ReleaseDriver::default();
    let mut actions = WorkspaceReleaseActions::new(&ctx, kind)
        .with_target(options.package)
        .with_dry_run(options.dry_run)
        .with_tag(!options.no_tag);

    let run = driver.drive(kind, &mut actions)?;

    if options.json {
        let report = ReleaseReport {
            run: &run,
            plan: actions.plan(),
            dry_run: options.dry_run,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(run.is_complete());
    }

    let title = if options.dry_run {
        format!("Release {} (Dry Run)", kind)
    } else {
        format!("Release {}", kind)
    };
    print_section_header(&title, SectionStyle::Primary);

    if let Some(plan) = actions.plan() {
        print_key_value("Packages to update", &plan.packages.len().to_string());
        println!();
        print_plan_table(plan);
        println!();
    }

    let arrow = " → ".bright_black().to_string();
    let path = run
        .visited
        .iter()
        .map(|state| match state {
            ReleaseState::ReleaseComplete => state.name().green().bold().to_string(),
            ReleaseState::ReleaseFailed => state.name().red().bold().to_string(),
            _ => state.name().to_string(),
        })
        .collect::<Vec<_>>()
        .join(arrow.as_str());
    print_key_value("States", "");
    println!("  {}", path);
    println!();

    for message in &run.messages {
        println!("  {} {}", "│".bright_black(), message);
    }
    println!();

    if run.is_complete() {
        print_success("Release completed successfully");
    } else {
        print_error("Release failed");
    }
    println!();

    Ok(run.is_complete())
}
