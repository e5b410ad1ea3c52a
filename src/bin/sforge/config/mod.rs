use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use shift_forge::PipelineConfig;

use crate::cli::Cli;

/// Loads the configuration file, if any, and applies command-line overrides.
pub fn build_pipeline_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.paths.config {
        Some(path) => load_file(path)?,
        None => PipelineConfig::default(),
    };

    if let Some(dir) = &cli.paths.work_dir {
        config.work_dir = dir.clone();
    }
    if let Some(dir) = &cli.paths.results_dir {
        config.results_dir = dir.clone();
    }
    if let Some(dir) = &cli.paths.models_dir {
        config.models_dir = dir.clone();
    }
    if cli.keep_intermediates {
        config.keep_intermediates = true;
    }

    let selected = cli.backends.selected();
    if !selected.is_empty() {
        config.backends = selected.into_iter().collect();
    }

    Ok(config)
}

fn load_file(path: &Path) -> Result<PipelineConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;
    PipelineConfig::from_toml(&text)
        .with_context(|| format!("Invalid configuration file: {}", path.display()))
}
