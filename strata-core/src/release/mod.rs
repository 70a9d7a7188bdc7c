//! Release flow: the state machine, version planning and the driver that
//! connects them to the workspace.

pub mod driver;
pub mod machine;
pub mod version;

pub use driver::{
    set_descriptor_version, ReleaseActions, ReleaseDriver, ReleaseRun, WorkspaceReleaseActions,
};
pub use machine::{ReleaseEvent, ReleaseMachine, ReleaseState, Transition};
pub use version::{bump_version, plan_release, BumpType, ReleasePackage, ReleasePlan};
