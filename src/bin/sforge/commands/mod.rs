mod run;

use run::run_pipeline;

use anyhow::Result;

use shift_forge::PipelineConfig;

use crate::cli::Cli;
use crate::display::Context;

pub fn dispatch(cli: Cli, config: PipelineConfig, ctx: Context) -> Result<()> {
    run_pipeline(cli, config, ctx)
}
