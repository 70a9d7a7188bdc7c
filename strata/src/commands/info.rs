//! Information and management commands.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use serde::Serialize;
use strata_core::{EdgeKind, TaskGraph};

use crate::formatting::{
    print_key_value, print_package_list, print_package_table, print_section_header,
    print_separator_with_spacing, print_success, print_task_order_table, print_warning,
    SectionStyle,
};

use super::load_context;

#[derive(Serialize)]
struct GraphEntry {
    id: String,
    runner: String,
    command: String,
    waits_for: Vec<String>,
}

#[derive(Serialize)]
struct EdgeEntry {
    from: String,
    to: String,
    kind: EdgeKind,
}

#[derive(Serialize)]
struct GraphReport {
    order: Vec<GraphEntry>,
    edges: Vec<EdgeEntry>,
}

pub fn cmd_graph(root: &Path, json: bool) -> Result<bool> {
    let ctx = load_context(root)?;
    let tasks = TaskGraph::build(&ctx.load_graph()?)?;

    if json {
        let report = GraphReport {
            order: tasks
                .topological_order()
                .into_iter()
                .map(|node| GraphEntry {
                    id: node.id.to_string(),
                    runner: node.runner.clone(),
                    command: node.command.clone(),
                    waits_for: tasks
                        .predecessors(&node.id)
                        .iter()
                        .map(|id| id.to_string())
                        .collect(),
                })
                .collect(),
            edges: tasks
                .edges()
                .into_iter()
                .map(|(from, to, kind)| EdgeEntry {
                    from: from.to_string(),
                    to: to.to_string(),
                    kind,
                })
                .collect(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(true);
    }

    print_section_header("Task Graph", SectionStyle::Primary);
    if tasks.is_empty() {
        print_warning("No tasks found");
    } else {
        print_task_order_table(&tasks);
    }
    println!();
    Ok(true)
}

#[derive(Serialize)]
struct PackageEntry<'a> {
    layer: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<&'a str>,
    dependencies: Vec<&'a str>,
    tasks: Vec<&'a str>,
}

pub fn cmd_list(root: &Path, json: bool) -> Result<bool> {
    let ctx = load_context(root)?;
    let graph = ctx.load_graph()?;

    if json {
        let mut entries = BTreeMap::new();
        for package in graph.packages() {
            entries.insert(
                package.name.as_str(),
                PackageEntry {
                    layer: &package.layer,
                    version: package.version.as_deref(),
                    dependencies: graph.dependencies_of(&package.name)?,
                    tasks: package.tasks.iter().map(|t| t.name.as_str()).collect(),
                },
            );
        }
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(true);
    }

    print_section_header("Packages", SectionStyle::Primary);
    if graph.is_empty() {
        print_warning("No packages found");
    } else {
        print_package_table(graph.packages());
    }
    println!();
    Ok(true)
}

pub fn cmd_why(root: &Path, package: &str) -> Result<bool> {
    let ctx = load_context(root)?;
    let graph = ctx.load_graph()?;

    let deps = graph.dependencies_of(package)?;
    let dependents = graph.dependents_of(package)?;
    let mut transitive: Vec<String> = graph.all_dependents(package)?.into_iter().collect();
    transitive.sort();

    print_section_header("Package Dependencies", SectionStyle::Primary);
    print_key_value("Package", package);
    print_key_value("Layer", graph.layer_of(package)?);
    print_separator_with_spacing();

    print_key_value("Depends on", &format!("{} packages", deps.len()));
    print_package_list(&deps);
    println!();

    print_key_value("Depended on by", &format!("{} packages", dependents.len()));
    print_package_list(&dependents);
    println!();

    print_key_value(
        "Rebuilt when it changes",
        &format!("{} packages", transitive.len()),
    );
    let transitive: Vec<&str> = transitive.iter().map(String::as_str).collect();
    print_package_list(&transitive);
    println!();

    Ok(true)
}

pub fn cmd_clean(root: &Path) -> Result<bool> {
    let ctx = load_context(root)?;
    let store = ctx.fingerprint_store();
    store.clear()?;
    print_success(&format!(
        "Removed fingerprint store at {}",
        store.cache_dir().display()
    ));
    Ok(true)
}
