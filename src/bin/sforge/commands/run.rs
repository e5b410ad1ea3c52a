use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use shift_forge::{Pipeline, PipelineConfig, Representation};

use crate::cli::Cli;
use crate::display::{
    Context as DisplayContext, Progress, print_registry, print_results, print_run_summary,
};

pub fn run_pipeline(cli: Cli, config: PipelineConfig, ctx: DisplayContext) -> Result<()> {
    if !cli.input.is_file() {
        bail!(
            "Input file not found: {}\n\nUsage: sforge <INPUT.csv> [-r 1h|13c|fp|hybrid]",
            cli.input.display()
        );
    }

    let representation = Representation::from(cli.representation);
    let pipeline = Pipeline::new(config);

    let total_steps = pipeline.planned_stages(representation).len();
    let mut progress = Progress::new(ctx.interactive, total_steps);

    let summary = match pipeline.run(&cli.input, representation, &mut progress) {
        Ok(summary) => summary,
        Err(e) => {
            progress.fail();
            return Err(e).with_context(|| format!("{representation} run failed"));
        }
    };
    progress.finish();

    if ctx.interactive {
        print_run_summary(&summary);
    }
    print_results(&summary.dispatch);
    for structure in &summary.dispatch.structures {
        for p in &structure.properties {
            info!(
                structure = %structure.id,
                "{}: {:.2} ± {:.2} ({} models)",
                p.property,
                p.average,
                p.std_dev,
                p.models.len()
            );
        }
    }

    if cli.models {
        match &summary.registry {
            Some(registry) => print_registry(registry),
            None => warn!(
                path = %pipeline.config().registry_path(representation.tag()).display(),
                "no model registry to list"
            ),
        }
    }

    Ok(())
}
