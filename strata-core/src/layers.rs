//! Architectural layer rules and the checker enforcing them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::cycles::{cyclic_components, rotate_to_min, shortest_cycle};
use crate::graph::PackageGraph;

/// Which layers each layer may depend on.
///
/// A layer missing from the map may depend on nothing. A package may depend
/// on another package of its own layer only if that layer lists itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LayerRules {
    allowed: BTreeMap<String, BTreeSet<String>>,
}

impl LayerRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map<I, K, V, S>(rules: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let allowed = rules
            .into_iter()
            .map(|(from, to)| (from.into(), to.into_iter().map(Into::into).collect()))
            .collect();
        Self { allowed }
    }

    /// Adds a rule letting `from` depend on `to`.
    pub fn with(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.allowed.entry(from.into()).or_default().insert(to.into());
        self
    }

    pub fn allows(&self, from_layer: &str, to_layer: &str) -> bool {
        self.allowed
            .get(from_layer)
            .is_some_and(|targets| targets.contains(to_layer))
    }

    pub fn layers(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> + '_ {
        self.allowed.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }
}

/// A breach of the layer rules, or a package dependency cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Violation {
    Layer {
        from: String,
        to: String,
        from_layer: String,
        to_layer: String,
    },
    Cycle {
        members: Vec<String>,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::Layer {
                from,
                to,
                from_layer,
                to_layer,
            } => write!(
                f,
                "{} ({}) depends on {} ({}), but layer '{}' may not depend on '{}'",
                from, from_layer, to, to_layer, from_layer, to_layer
            ),
            Violation::Cycle { members } => {
                write!(f, "dependency cycle: {}", members.join(" -> "))?;
                if let Some(first) = members.first() {
                    write!(f, " -> {}", first)?;
                }
                Ok(())
            }
        }
    }
}

pub struct LayerChecker;

impl LayerChecker {
    /// Reports every violation in `graph`: layer breaches in edge order,
    /// then one minimal cycle per cyclic component.
    pub fn check(graph: &PackageGraph, rules: &LayerRules) -> Vec<Violation> {
        let mut violations: Vec<Violation> = graph
            .edges()
            .filter(|(from, to)| !rules.allows(&from.layer, &to.layer))
            .map(|(from, to)| Violation::Layer {
                from: from.name.clone(),
                to: to.name.clone(),
                from_layer: from.layer.clone(),
                to_layer: to.layer.clone(),
            })
            .collect();

        let inner = graph.inner();
        let mut cycles: Vec<Vec<String>> = cyclic_components(inner)
            .into_iter()
            .map(|component| {
                let members: Vec<String> = shortest_cycle(inner, &component)
                    .into_iter()
                    .map(|i| inner[i].clone())
                    .collect();
                rotate_to_min(members, |name| name.clone())
            })
            .collect();
        cycles.sort();

        violations.extend(cycles.into_iter().map(|members| Violation::Cycle { members }));
        debug!(violations = violations.len(), "checked layers");
        violations
    }
}
