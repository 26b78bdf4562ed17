//! Pipeline coordinator: executes stages in order, checks their preconditions, and runs the finalization.

use std::{
    io::Write,
    time::Instant,
};
use crate::{
    Error,
    ext,
};
use super::{
    Actions, Context, Stage,
    actions,
    stage::require_all,
    paths::Shared,
};

/// Name of the fixed finalization step (missing-data filter).
pub const FINALIZATION: &'static str = "filter_missing";

pub struct Coordinator<'a, A> {
    ctx: Context<'a>,
    actions: &'a A,
}

impl<'a, A: Actions> Coordinator<'a, A> {
    pub fn new(ctx: Context<'a>, actions: &'a A) -> Self {
        Self { ctx, actions }
    }

    /// Saves run parameters. On a resumed run, warns about parameters that changed since the previous run.
    fn save_params(&self, resumed: bool) -> crate::Result<()> {
        let paths = self.ctx.paths();
        ext::sys::mkdir(paths.out_dir())?;
        let params_path = paths.shared(Shared::Params);
        if resumed && params_path.exists() {
            let changed = self.ctx.config.compare_with_saved(&params_path);
            if !changed.is_empty() {
                log::warn!("Artifacts of the earlier stages were produced with different parameters");
            }
        }
        self.ctx.config.save(&params_path)
    }

    /// Runs a single stage: checks its precondition, removes stale outputs and executes the action.
    fn run_stage(&self, stage: Stage, i: usize, n: usize) -> crate::Result<()> {
        log::info!("[{}/{}] {}", i + 1, n, stage);
        stage.precondition(&self.ctx).map_err(|unmet| Error::PreconditionNotMet(stage.name(), unmet.to_string()))?;
        for path in stage.outputs(&self.ctx) {
            ext::sys::remove_artifact(&path)?;
        }
        let timer = Instant::now();
        self.actions.run(stage, &self.ctx)?;
        log::info!("    Finished {} in {}", stage, ext::fmt::Duration(timer.elapsed()));
        Ok(())
    }

    /// Missing-data filter over the site alignment, followed by the success marker.
    fn finalize(&self) -> crate::Result<()> {
        log::info!("Filtering sites with more than {} missing taxa", self.ctx.config.missing);
        let paths = self.ctx.paths();
        require_all([paths.shared(Shared::Alignment), paths.shared(Shared::AlignmentLocs)])
            .map_err(|unmet| Error::PreconditionNotMet(FINALIZATION, unmet.to_string()))?;
        for artifact in [Shared::FilteredAlignment, Shared::FilteredLocs, Shared::BiallelicAlignment, Shared::Success] {
            ext::sys::remove_artifact(&paths.shared(artifact))?;
        }
        actions::filter_missing(&self.ctx)?;
        write_success_file(&paths.shared(Shared::Success))
    }

    /// Executes stages one after another, stopping at the first failure, and then runs the finalization.
    pub fn run(&self, stages: &[Stage]) -> crate::Result<()> {
        let resumed = stages.first().map(|&stage| stage != Stage::Subsample).unwrap_or(false);
        self.save_params(resumed)?;
        let timer = Instant::now();
        let n = stages.len();
        for (i, &stage) in stages.iter().enumerate() {
            self.run_stage(stage, i, n)?;
        }
        self.finalize()?;
        log::info!("Success. Total time: {}", ext::fmt::Duration(timer.elapsed()));
        Ok(())
    }
}

fn write_success_file(path: &std::path::Path) -> crate::Result<()> {
    let mut f = ext::sys::create_file(path)?;
    writeln!(f, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"))
        .and_then(|_| f.flush())
        .map_err(crate::err::add_path!(path))
}
