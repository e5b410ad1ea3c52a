use std::process::ExitCode;

mod cli;
mod commands;
mod config;
mod display;
mod io;
mod logging;
mod util;

fn main() -> ExitCode {
    let cli = cli::parse();

    let ctx = display::Context::detect().with_quiet(cli.quiet);
    if ctx.interactive {
        display::print_banner();
    }

    let config = match config::build_pipeline_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            display::print_error(&e);
            return ExitCode::FAILURE;
        }
    };
    logging::init(cli.verbose, &config.work_dir);

    match commands::dispatch(cli, config, ctx) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::info!("run failed: {e:#}");
            display::print_error(&e);
            ExitCode::FAILURE
        }
    }
}
