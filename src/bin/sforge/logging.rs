use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::Subscriber;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Transcript of the latest run, kept in the work directory.
pub const RUN_LOG: &str = "RUN_LOG_FILE.log";

/// Creates the run log in `work_dir`, truncating the one from an earlier run.
pub fn create_run_log(work_dir: &Path) -> io::Result<(PathBuf, File)> {
    fs::create_dir_all(work_dir)?;
    let path = work_dir.join(RUN_LOG);
    let file = File::create(&path)?;
    Ok((path, file))
}

/// Stderr gets warnings and above, widened by `-v`; `RUST_LOG` wins. The run
/// log records info and above (debug with `-vv`) without color codes.
pub fn subscriber(verbose: u8, run_log: Option<File>) -> impl Subscriber + Send + Sync + 'static {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let console_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let console = fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .with_filter(console_filter);

    let transcript_level = if verbose >= 2 {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let transcript = run_log.map(|file| {
        fmt::layer()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_target(false)
            .with_filter(transcript_level)
    });

    tracing_subscriber::registry().with(console).with(transcript)
}

pub fn init(verbose: u8, work_dir: &Path) {
    match create_run_log(work_dir) {
        Ok((path, file)) => {
            subscriber(verbose, Some(file)).init();
            tracing::debug!(path = %path.display(), "writing run log");
        }
        Err(e) => {
            subscriber(verbose, None).init();
            tracing::warn!(dir = %work_dir.display(), "run log unavailable: {e}");
        }
    }
}
