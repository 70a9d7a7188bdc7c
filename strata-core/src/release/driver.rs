//! Drives the release machine with side-effecting actions.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::process::Command;

use serde::Serialize;
use tracing::{info, warn};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::fs_util::write_atomic;
use crate::graph::PackageGraph;
use crate::layers::LayerChecker;
use crate::release::machine::{ReleaseEvent, ReleaseMachine, ReleaseState};
use crate::release::version::{plan_release, BumpType, ReleasePlan};
use crate::scheduler::Scheduler;
use crate::task_graph::TaskGraph;

/// The work done in each non-terminal state.
///
/// Implementations return [`ReleaseEvent::Ok`] or [`ReleaseEvent::Failed`];
/// an `Err` is treated as `Failed` and its text kept in the run log.
pub trait ReleaseActions {
    fn perform(&mut self, state: ReleaseState, log: &mut Vec<String>) -> Result<ReleaseEvent>;
}

/// States visited by one release and how it ended.
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseRun {
    pub kind: BumpType,
    pub visited: Vec<ReleaseState>,
    pub final_state: ReleaseState,
    pub messages: Vec<String>,
}

impl ReleaseRun {
    pub fn is_complete(&self) -> bool {
        self.final_state == ReleaseState::ReleaseComplete
    }
}

pub struct ReleaseDriver {
    machine: ReleaseMachine,
}

impl Default for ReleaseDriver {
    fn default() -> Self {
        Self::new(ReleaseMachine::standard())
    }
}

impl ReleaseDriver {
    pub fn new(machine: ReleaseMachine) -> Self {
        Self { machine }
    }

    pub fn machine(&self) -> &ReleaseMachine {
        &self.machine
    }

    /// Runs a release of `kind` from `Init` to a terminal state.
    ///
    /// # Errors
    ///
    /// Fails without running any action if no terminal state is reachable
    /// from the start state, and with [`Error::Release`] if an action yields
    /// an event the current state has no transition for.
    pub fn drive<A: ReleaseActions>(&self, kind: BumpType, actions: &mut A) -> Result<ReleaseRun> {
        let start = self.machine.start_for(kind)?;
        let terminals = self.machine.reachable_terminals(start)?;
        if terminals.is_empty() {
            return Err(Error::Release(format!(
                "No terminal state is reachable from {}",
                start
            )));
        }

        let mut visited = vec![ReleaseState::Init, start];
        let mut messages = Vec::new();
        let mut state = start;
        info!(kind = %kind, "starting release");

        // The walk above proved the path acyclic, so it is bounded by the
        // number of states.
        for _ in 0..ReleaseState::ALL.len() {
            if self.machine.is_terminal(state) {
                break;
            }
            let event = match actions.perform(state, &mut messages) {
                Ok(event) => event,
                Err(e) => {
                    warn!(state = %state, error = %e, "release step failed");
                    messages.push(format!("{}: {}", state, e));
                    ReleaseEvent::Failed
                }
            };
            state = self.machine.next(state, event).ok_or_else(|| {
                Error::Release(format!("No '{}' transition from {}", event, state))
            })?;
            visited.push(state);
        }

        info!(final_state = %state, "release finished");
        Ok(ReleaseRun {
            kind,
            visited,
            final_state: state,
            messages,
        })
    }
}

/// Production actions: plan against the workspace, gate on layers and
/// check tasks, rewrite descriptor versions and tag the commit.
pub struct WorkspaceReleaseActions<'a> {
    ctx: &'a Context,
    kind: BumpType,
    target: Option<String>,
    dry_run: bool,
    create_tag: bool,
    graph: Option<PackageGraph>,
    plan: Option<ReleasePlan>,
}

impl<'a> WorkspaceReleaseActions<'a> {
    pub fn new(ctx: &'a Context, kind: BumpType) -> Self {
        Self {
            ctx,
            kind,
            target: None,
            dry_run: false,
            create_tag: true,
            graph: None,
            plan: None,
        }
    }

    /// Releases `package` and patch-bumps its dependents instead of
    /// bumping every versioned package.
    pub fn with_target(mut self, package: Option<String>) -> Self {
        self.target = package;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_tag(mut self, create_tag: bool) -> Self {
        self.create_tag = create_tag;
        self
    }

    pub fn plan(&self) -> Option<&ReleasePlan> {
        self.plan.as_ref()
    }

    fn graph(&self) -> Result<&PackageGraph> {
        self.graph
            .as_ref()
            .ok_or_else(|| Error::Release("Workspace has not been loaded".to_string()))
    }

    fn planned(&self) -> Result<&ReleasePlan> {
        self.plan
            .as_ref()
            .ok_or_else(|| Error::Release("No release plan".to_string()))
    }

    /// Tag names for the planned release.
    pub fn tags(&self) -> Result<Vec<String>> {
        let plan = self.planned()?;
        let prefix = &self.ctx.release.tag_prefix;
        if let Some(target) = &self.target {
            let package = plan
                .get(target)
                .ok_or_else(|| Error::Release(format!("{} is not part of the plan", target)))?;
            return Ok(vec![format!("{}@{}{}", package.name, prefix, package.new_version)]);
        }

        let versions: BTreeSet<&str> = plan
            .packages
            .iter()
            .map(|p| p.new_version.as_str())
            .collect();
        match versions.iter().next() {
            Some(version) if versions.len() == 1 => Ok(vec![format!("{}{}", prefix, version)]),
            _ => Ok(plan
                .packages
                .iter()
                .map(|p| format!("{}@{}{}", p.name, prefix, p.new_version))
                .collect()),
        }
    }

    fn prepare(&mut self, log: &mut Vec<String>) -> Result<ReleaseEvent> {
        let graph = self.ctx.load_graph()?;
        let plan = plan_release(&graph, self.kind, self.target.as_deref())?;
        if plan.is_empty() {
            log.push("no package declares a version".to_string());
            return Ok(ReleaseEvent::Failed);
        }
        for package in &plan.packages {
            log.push(format!(
                "plan {} {} -> {} ({})",
                package.name,
                package.old_version.as_deref().unwrap_or("unversioned"),
                package.new_version,
                package.bump_type
            ));
        }
        self.graph = Some(graph);
        self.plan = Some(plan);
        Ok(ReleaseEvent::Ok)
    }

    fn check_dependents(&self, log: &mut Vec<String>) -> Result<ReleaseEvent> {
        let graph = self.graph()?;
        let plan = self.planned()?;
        let mut missing = Vec::new();

        for package in plan.packages.iter().filter(|p| p.bump_type == BumpType::Major) {
            for dependent in graph.all_dependents(&package.name)? {
                let versioned = graph
                    .get_package(&dependent)
                    .is_some_and(|p| p.version.is_some());
                if versioned && plan.get(&dependent).is_none() {
                    missing.push(format!("{} (depends on {})", dependent, package.name));
                }
            }
        }

        if missing.is_empty() {
            log.push("all dependents of major bumps are part of the release".to_string());
            Ok(ReleaseEvent::Ok)
        } else {
            missing.sort();
            for entry in missing {
                log.push(format!("dependent not released: {}", entry));
            }
            Ok(ReleaseEvent::Failed)
        }
    }

    fn check_workspace(&mut self, log: &mut Vec<String>) -> Result<ReleaseEvent> {
        let graph = self.ctx.load_graph()?;
        TaskGraph::build(&graph)?;

        let plan = self.planned()?;
        for package in &plan.packages {
            let current = graph.get_package(&package.name).ok_or_else(|| {
                Error::Release(format!("{} disappeared from the workspace", package.name))
            })?;
            if current.version != package.old_version {
                log.push(format!("version of {} changed since planning", package.name));
                return Ok(ReleaseEvent::Failed);
            }
        }

        log.push(format!("workspace loads cleanly ({} packages)", graph.len()));
        self.graph = Some(graph);
        Ok(ReleaseEvent::Ok)
    }

    fn check_layers(&self, log: &mut Vec<String>) -> Result<ReleaseEvent> {
        let violations = LayerChecker::check(self.graph()?, &self.ctx.layer_rules);
        if violations.is_empty() {
            log.push("no layer violations".to_string());
            return Ok(ReleaseEvent::Ok);
        }
        log.extend(violations.iter().map(|v| format!("violation: {}", v)));
        Ok(ReleaseEvent::Failed)
    }

    fn run_checks(&self, log: &mut Vec<String>) -> Result<ReleaseEvent> {
        let graph = self.graph()?;
        let tasks = TaskGraph::build(graph)?;

        let declared: Vec<String> = self
            .ctx
            .release
            .check_tasks
            .iter()
            .filter(|name| tasks.nodes().any(|n| &n.id.task == *name))
            .cloned()
            .collect();
        if declared.is_empty() {
            log.push("no check tasks declared".to_string());
            return Ok(ReleaseEvent::Ok);
        }

        let selected = tasks.select(&declared, &[])?;
        let store = self.ctx.fingerprint_store();
        let registry = self.ctx.registry();
        let result = Scheduler::new(&store, &registry, self.ctx.concurrency, true).run(&selected)?;
        let summary = result.summary();
        log.push(format!(
            "checks: {} succeeded, {} skipped, {} failed, {} blocked, {} cancelled",
            summary.succeeded, summary.skipped, summary.failed, summary.blocked, summary.cancelled
        ));

        if result.is_success() {
            Ok(ReleaseEvent::Ok)
        } else {
            log.extend(
                result
                    .failures()
                    .map(|t| format!("check {} {}", t.id, t.status.as_str())),
            );
            Ok(ReleaseEvent::Failed)
        }
    }

    fn bump_versions(&self, log: &mut Vec<String>) -> Result<ReleaseEvent> {
        let graph = self.graph()?;
        for package in &self.planned()?.packages {
            let descriptor = &graph
                .get_package(&package.name)
                .ok_or_else(|| Error::Release(format!("{} is not in the workspace", package.name)))?
                .descriptor;
            if self.dry_run {
                log.push(format!("would set {} to {}", package.name, package.new_version));
            } else {
                set_descriptor_version(descriptor, &package.new_version)?;
                log.push(format!("set {} to {}", package.name, package.new_version));
            }
        }
        Ok(ReleaseEvent::Ok)
    }

    /// Tags the current HEAD. The descriptors rewritten by
    /// [`Self::bump_versions`] are not committed, so the tag does not contain
    /// them; callers that want the bump tagged commit first and disable
    /// tagging here.
    fn create_tags(&self, log: &mut Vec<String>) -> Result<ReleaseEvent> {
        let tags = self.tags()?;
        if self.dry_run || !self.create_tag {
            log.extend(tags.iter().map(|t| format!("skipped tag {}", t)));
            return Ok(ReleaseEvent::Ok);
        }

        for tag in tags {
            let status = Command::new("git")
                .args(["tag", "-a", &tag, "-m", &format!("Release {}", tag)])
                .current_dir(&self.ctx.root)
                .status()?;
            if !status.success() {
                log.push(format!("git tag {} failed", tag));
                return Ok(ReleaseEvent::Failed);
            }
            log.push(format!("tagged {}", tag));
        }
        Ok(ReleaseEvent::Ok)
    }
}

impl ReleaseActions for WorkspaceReleaseActions<'_> {
    fn perform(&mut self, state: ReleaseState, log: &mut Vec<String>) -> Result<ReleaseEvent> {
        match state {
            ReleaseState::DoPatchRelease
            | ReleaseState::DoMinorRelease
            | ReleaseState::DoMajorRelease => self.prepare(log),
            ReleaseState::CheckDependents => self.check_dependents(log),
            ReleaseState::CheckWorkspace => self.check_workspace(log),
            ReleaseState::CheckLayers => self.check_layers(log),
            ReleaseState::RunChecks => self.run_checks(log),
            ReleaseState::BumpVersions => self.bump_versions(log),
            ReleaseState::CreateTag => self.create_tags(log),
            ReleaseState::Init | ReleaseState::ReleaseComplete | ReleaseState::ReleaseFailed => {
                Err(Error::Release(format!("{} has no action", state)))
            }
        }
    }
}

/// Rewrites the top-level `version` of a descriptor.
pub fn set_descriptor_version(descriptor: &Path, version: &str) -> Result<()> {
    semver::Version::parse(version)
        .map_err(|e| Error::Release(format!("Invalid version format '{}': {}", version, e)))?;

    let content = fs::read_to_string(descriptor)?;
    let mut table: toml::Table = toml::from_str(&content)
        .map_err(|e| Error::config(descriptor, e.message().to_string()))?;
    table.insert("version".to_string(), toml::Value::String(version.to_string()));

    let rendered = toml::to_string_pretty(&table)
        .map_err(|e| Error::Release(format!("Failed to render {}: {}", descriptor.display(), e)))?;
    write_atomic(descriptor, rendered.as_bytes())
}
