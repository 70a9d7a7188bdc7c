//! `check-layers`: architectural layer rules and dependency cycles.

use std::path::Path;

use anyhow::Result;
use serde::Serialize;
use strata_core::{LayerChecker, Violation};

use crate::formatting::{
    print_error, print_key_value, print_section_header, print_success, print_violation_table,
    print_warning, SectionStyle,
};

use super::load_context;

#[derive(Serialize)]
struct LayerReport<'a> {
    valid: bool,
    violations: &'a [Violation],
}

pub fn cmd_check_layers(root: &Path, json: bool) -> Result<bool> {
    let ctx = load_context(root)?;
    let graph = ctx.load_graph()?;
    let violations = LayerChecker::check(&graph, &ctx.layer_rules);

    if json {
        let report = LayerReport {
            valid: violations.is_empty(),
            violations: &violations,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(violations.is_empty());
    }

    if ctx.layer_rules.is_empty() {
        print_warning(
            "No [layers] table in the workspace file; every cross-package edge is a violation",
        );
        println!();
    }

    if violations.is_empty() {
        print_section_header("Layer Check", SectionStyle::Success);
        print_key_value("Packages", &graph.len().to_string());
        print_success("No layer violations");
        print_success("No dependency cycles");
        println!();
        return Ok(true);
    }

    print_section_header("Layer Check", SectionStyle::Error);
    print_violation_table(&violations);
    println!();
    print_error(&format!("{} violations found", violations.len()));
    println!();
    Ok(false)
}
