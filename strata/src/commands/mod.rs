//! Command implementations for the CLI.
//!
//! Every command returns `Ok(true)` on success and `Ok(false)` when it ran
//! to completion but the outcome should fail the process (failed tasks,
//! layer violations, a failed release).

mod execution;
mod info;
mod layers;
mod release;

use std::path::Path;

use anyhow::{Context as _, Result};
use strata_core::Context;

pub use execution::{cmd_run, RunOptions};
pub use info::{cmd_clean, cmd_graph, cmd_list, cmd_why};
pub use layers::cmd_check_layers;
pub use release::{cmd_release, ReleaseOptions};

fn load_context(root: &Path) -> Result<Context> {
    Context::load(root)
        .with_context(|| format!("Failed to load workspace at {}", root.display()))
}
