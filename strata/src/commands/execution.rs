//! Task execution commands: `build`, `test` and `run`.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Result};
use crossbeam::channel::{unbounded, Receiver};
use strata_core::{Context, Scheduler, TaskEvent, TaskGraph, TaskStatus};
use tracing::warn;

use crate::formatting::{
    create_progress_bar, format_duration, print_section_header_with_subtitle,
    print_separator_with_spacing, print_success, print_summary_box, print_task_results,
    print_warning, SectionStyle,
};

use super::load_context;

/// Flags shared by the task-running commands.
pub struct RunOptions {
    pub packages: Vec<String>,
    pub parallel: Option<usize>,
    pub stop_on_failure: bool,
    pub json: bool,
}

fn install_cancel_handler() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&flag);
    if let Err(e) = ctrlc::set_handler(move || handler_flag.store(true, Ordering::SeqCst)) {
        warn!(error = %e, "could not install the Ctrl-C handler");
    }
    flag
}

fn show_progress(events: Receiver<TaskEvent>, total: u64) {
    let pb = create_progress_bar(total);
    for event in events {
        match event {
            TaskEvent::Started { id } => pb.set_message(id.to_string()),
            TaskEvent::Finished { id, status, .. } => {
                if status == TaskStatus::Failed {
                    pb.println(format!("  ✗ {} failed", id));
                }
                pb.inc(1);
            }
        }
    }
    pb.finish_and_clear();
}

fn select_tasks(ctx: &Context, tasks: &[String], packages: &[String]) -> Result<TaskGraph> {
    let graph = ctx.load_graph()?;
    for name in packages {
        if graph.get_package(name).is_none() {
            bail!(strata_core::Error::PackageNotFound {
                name: name.clone(),
                available: graph
                    .packages()
                    .iter()
                    .map(|p| p.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }
    }
    Ok(TaskGraph::build(&graph)?.select(tasks, packages)?)
}

/// Runs `tasks` (and everything they wait for) and reports the outcome.
pub fn cmd_run(root: &Path, tasks: Vec<String>, options: RunOptions) -> Result<bool> {
    let ctx = load_context(root)?
        .with_concurrency(options.parallel)
        .with_stop_on_failure(options.stop_on_failure);
    let selected = select_tasks(&ctx, &tasks, &options.packages)?;

    if !options.json {
        print_section_header_with_subtitle(
            &format!("Running {}", tasks.join(", ")),
            &format!(
                "{} tasks, {} workers, {}",
                selected.len(),
                ctx.concurrency,
                ctx.root.display()
            ),
            SectionStyle::Primary,
        );
    }

    let store = ctx.fingerprint_store();
    let registry = ctx.registry();
    let cancel = install_cancel_handler();

    let result = thread::scope(|scope| {
        let scheduler = Scheduler::new(&store, &registry, ctx.concurrency, ctx.stop_on_failure)
            .with_cancel_flag(Arc::clone(&cancel));
        if options.json {
            return scheduler.run(&selected);
        }

        let (sender, receiver) = unbounded();
        let total = selected.len() as u64;
        scope.spawn(move || show_progress(receiver, total));
        // Dropping the scheduler closes the channel and ends the progress thread.
        scheduler.with_events(sender).run(&selected)
    })?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(result.is_success());
    }

    print_task_results(&result);
    print_separator_with_spacing();

    let summary = result.summary();
    print_summary_box(
        "Summary",
        &[
            ("Succeeded", summary.succeeded.to_string()),
            ("Skipped", summary.skipped.to_string()),
            ("Failed", summary.failed.to_string()),
            ("Blocked", summary.blocked.to_string()),
            ("Cancelled", summary.cancelled.to_string()),
            ("Duration", format_duration(Duration::from_millis(result.duration_ms))),
        ],
    );
    println!();

    if result.is_success() {
        print_success(&format!("All {} tasks are up to date", summary.total));
    } else {
        print_warning(&format!(
            "{} of {} tasks did not complete",
            summary.total - summary.succeeded - summary.skipped,
            summary.total
        ));
    }
    println!();

    Ok(result.is_success())
}
