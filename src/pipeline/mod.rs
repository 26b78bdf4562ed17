//! Resumable pipeline: stages, their artifacts and the coordinator.

pub mod tools;
pub mod paths;
pub mod stage;
pub mod preflight;
pub mod actions;
pub mod coord;

use crate::{
    config::RunConfig,
    samples::Inventory,
};
pub use stage::Stage;
pub use coord::Coordinator;
pub use actions::ToolActions;

/// Everything a stage needs to know about the run.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    pub config: &'a RunConfig,
    pub inventory: &'a Inventory,
}

impl<'a> Context<'a> {
    pub fn new(config: &'a RunConfig, inventory: &'a Inventory) -> Self {
        Self { config, inventory }
    }

    pub fn paths(&self) -> paths::ArtifactPaths<'a> {
        paths::ArtifactPaths::new(self.config)
    }
}

/// Performs the work of a single stage.
/// Stage preconditions are already checked and stale outputs are removed when `run` is called.
pub trait Actions: Sync {
    fn run(&self, stage: Stage, ctx: &Context) -> crate::Result<()>;
}
