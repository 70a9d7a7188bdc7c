//! The release flow as an explicit state machine.
//!
//! The machine is pure data: a closed set of states, a transition table
//! labelled by events and a set of terminal states. It performs no I/O; the
//! [`super::driver::ReleaseDriver`] advances it from the outcome of each
//! side-effecting step.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::release::version::BumpType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ReleaseState {
    Init,
    DoPatchRelease,
    DoMinorRelease,
    DoMajorRelease,
    CheckDependents,
    CheckWorkspace,
    CheckLayers,
    RunChecks,
    BumpVersions,
    CreateTag,
    ReleaseComplete,
    ReleaseFailed,
}

impl ReleaseState {
    pub const ALL: [ReleaseState; 12] = [
        ReleaseState::Init,
        ReleaseState::DoPatchRelease,
        ReleaseState::DoMinorRelease,
        ReleaseState::DoMajorRelease,
        ReleaseState::CheckDependents,
        ReleaseState::CheckWorkspace,
        ReleaseState::CheckLayers,
        ReleaseState::RunChecks,
        ReleaseState::BumpVersions,
        ReleaseState::CreateTag,
        ReleaseState::ReleaseComplete,
        ReleaseState::ReleaseFailed,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ReleaseState::Init => "Init",
            ReleaseState::DoPatchRelease => "DoPatchRelease",
            ReleaseState::DoMinorRelease => "DoMinorRelease",
            ReleaseState::DoMajorRelease => "DoMajorRelease",
            ReleaseState::CheckDependents => "CheckDependents",
            ReleaseState::CheckWorkspace => "CheckWorkspace",
            ReleaseState::CheckLayers => "CheckLayers",
            ReleaseState::RunChecks => "RunChecks",
            ReleaseState::BumpVersions => "BumpVersions",
            ReleaseState::CreateTag => "CreateTag",
            ReleaseState::ReleaseComplete => "ReleaseComplete",
            ReleaseState::ReleaseFailed => "ReleaseFailed",
        }
    }
}

impl fmt::Display for ReleaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ReleaseState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ReleaseState::ALL
            .iter()
            .copied()
            .find(|state| state.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::Release(format!("Unknown release state '{}'", s)))
    }
}

/// Label selecting one outgoing transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseEvent {
    Patch,
    Minor,
    Major,
    Ok,
    Failed,
}

impl ReleaseEvent {
    pub fn for_bump(kind: BumpType) -> Self {
        match kind {
            BumpType::Patch => ReleaseEvent::Patch,
            BumpType::Minor => ReleaseEvent::Minor,
            BumpType::Major => ReleaseEvent::Major,
        }
    }
}

impl fmt::Display for ReleaseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReleaseEvent::Patch => "patch",
            ReleaseEvent::Minor => "minor",
            ReleaseEvent::Major => "major",
            ReleaseEvent::Ok => "ok",
            ReleaseEvent::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub event: ReleaseEvent,
    pub to: ReleaseState,
}

/// Static transition table with declared terminal states.
#[derive(Debug, Clone)]
pub struct ReleaseMachine {
    transitions: BTreeMap<ReleaseState, Vec<Transition>>,
    terminals: BTreeSet<ReleaseState>,
}

impl ReleaseMachine {
    /// The release policy used by `strata release`.
    pub fn standard() -> Self {
        use ReleaseEvent::{Failed, Major, Minor, Ok, Patch};
        use ReleaseState::*;

        let step = |ok: ReleaseState| {
            vec![
                Transition { event: Ok, to: ok },
                Transition {
                    event: Failed,
                    to: ReleaseFailed,
                },
            ]
        };

        let transitions = BTreeMap::from([
            (
                Init,
                vec![
                    Transition {
                        event: Patch,
                        to: DoPatchRelease,
                    },
                    Transition {
                        event: Minor,
                        to: DoMinorRelease,
                    },
                    Transition {
                        event: Major,
                        to: DoMajorRelease,
                    },
                ],
            ),
            (DoPatchRelease, step(CheckWorkspace)),
            (DoMinorRelease, step(CheckWorkspace)),
            (DoMajorRelease, step(CheckDependents)),
            (CheckDependents, step(CheckWorkspace)),
            (CheckWorkspace, step(CheckLayers)),
            (CheckLayers, step(RunChecks)),
            (RunChecks, step(BumpVersions)),
            (BumpVersions, step(CreateTag)),
            (CreateTag, step(ReleaseComplete)),
        ]);

        Self {
            transitions,
            terminals: BTreeSet::from([ReleaseComplete, ReleaseFailed]),
        }
    }

    /// Builds a machine from an arbitrary table, e.g. to exercise validation.
    pub fn from_parts(
        transitions: impl IntoIterator<Item = (ReleaseState, Vec<Transition>)>,
        terminals: impl IntoIterator<Item = ReleaseState>,
    ) -> Self {
        Self {
            transitions: transitions.into_iter().collect(),
            terminals: terminals.into_iter().collect(),
        }
    }

    pub fn is_terminal(&self, state: ReleaseState) -> bool {
        self.terminals.contains(&state)
    }

    pub fn transitions_from(&self, state: ReleaseState) -> &[Transition] {
        self.transitions
            .get(&state)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The distinct states directly reachable from `state`.
    pub fn exits(&self, state: ReleaseState) -> BTreeSet<ReleaseState> {
        self.transitions_from(state).iter().map(|t| t.to).collect()
    }

    pub fn next(&self, state: ReleaseState, event: ReleaseEvent) -> Option<ReleaseState> {
        self.transitions_from(state)
            .iter()
            .find(|t| t.event == event)
            .map(|t| t.to)
    }

    /// The state a release of `kind` enters from [`ReleaseState::Init`].
    pub fn start_for(&self, kind: BumpType) -> Result<ReleaseState> {
        self.next(ReleaseState::Init, ReleaseEvent::for_bump(kind))
            .ok_or_else(|| {
                Error::Release(format!("No transition from Init for a {} release", kind))
            })
    }

    /// Every terminal state reachable from `start`.
    ///
    /// Walks the table with an explicit stack; a state met again while still
    /// on the current path is a cycle and fails with [`Error::Cycle`].
    pub fn reachable_terminals(&self, start: ReleaseState) -> Result<BTreeSet<ReleaseState>> {
        let mut terminals = BTreeSet::new();
        let mut done: BTreeSet<ReleaseState> = BTreeSet::new();
        let mut on_path: Vec<ReleaseState> = Vec::new();
        // (state, index of the next exit to explore)
        let mut stack: Vec<(ReleaseState, usize)> = vec![(start, 0)];
        on_path.push(start);

        while let Some((state, cursor)) = stack.last().copied() {
            if self.is_terminal(state) {
                terminals.insert(state);
            }
            let exits: Vec<ReleaseState> = self.exits(state).into_iter().collect();

            if let Some(&next) = exits.get(cursor) {
                if let Some(last) = stack.last_mut() {
                    last.1 += 1;
                }
                if let Some(pos) = on_path.iter().position(|s| *s == next) {
                    return Err(Error::Cycle {
                        members: on_path[pos..].iter().map(|s| s.name().to_string()).collect(),
                    });
                }
                if !done.contains(&next) {
                    stack.push((next, 0));
                    on_path.push(next);
                }
            } else {
                done.insert(state);
                stack.pop();
                on_path.pop();
            }
        }

        Ok(terminals)
    }

    /// Checks the structural invariants of the table: terminal states have
    /// no exits, other states have at least one, every state is reachable
    /// from `Init` and no cycle is reachable.
    pub fn validate(&self) -> Result<()> {
        for state in ReleaseState::ALL {
            let exits = self.transitions_from(state);
            if self.is_terminal(state) && !exits.is_empty() {
                return Err(Error::Release(format!(
                    "Terminal state {} has outgoing transitions",
                    state
                )));
            }
            if !self.is_terminal(state) && exits.is_empty() {
                return Err(Error::Release(format!(
                    "Non-terminal state {} has no outgoing transitions",
                    state
                )));
            }
            let mut events = BTreeSet::new();
            if let Some(t) = exits.iter().find(|t| !events.insert(t.event)) {
                return Err(Error::Release(format!(
                    "State {} has more than one '{}' transition",
                    state, t.event
                )));
            }
        }

        self.reachable_terminals(ReleaseState::Init)?;

        let mut seen = BTreeSet::from([ReleaseState::Init]);
        let mut stack = vec![ReleaseState::Init];
        while let Some(state) = stack.pop() {
            for next in self.exits(state) {
                if seen.insert(next) {
                    stack.push(next);
                }
            }
        }
        if let Some(state) = ReleaseState::ALL.iter().find(|s| !seen.contains(*s)) {
            return Err(Error::Release(format!(
                "State {} is unreachable from Init",
                state
            )));
        }

        Ok(())
    }
}
