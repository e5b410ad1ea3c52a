use std::io::{self, Write};
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

use shift_forge::pipeline::{Observer, Stage};
use shift_forge::progress::Progress as ItemProgress;

pub struct StepSpinner {
    bar: Option<ProgressBar>,
    start: Instant,
    step: usize,
    total_steps: usize,
    step_start: Instant,
    description: String,
}

impl StepSpinner {
    pub fn new(total_steps: usize) -> Self {
        let now = Instant::now();
        Self {
            bar: None,
            start: now,
            step: 0,
            total_steps,
            step_start: now,
            description: String::new(),
        }
    }

    pub fn step(&mut self, description: &str) {
        self.clear();

        self.step += 1;
        self.step_start = Instant::now();
        self.description = description.to_string();

        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("  {spinner:.cyan} {msg}")
                .expect("invalid template")
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        bar.enable_steady_tick(Duration::from_millis(80));
        bar.set_message(format!(
            "[{}/{}] {}...",
            self.step, self.total_steps, description
        ));

        self.bar = Some(bar);
    }

    /// Turns the current spinner into a bar over `total` items.
    pub fn set_items(&mut self, total: usize) {
        if let Some(bar) = &self.bar {
            bar.set_length(total as u64);
            bar.set_position(0);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("  {spinner:.cyan} {msg} [{bar:25.green/white}] {pos}/{len} ({percent}%)")
                    .expect("invalid template")
                    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                    .progress_chars("█▓-"),
            );
        }
    }

    pub fn set_done(&mut self, done: usize) {
        if let Some(bar) = &self.bar {
            bar.set_position(done as u64);
        }
    }

    pub fn complete_step(&mut self, description: &str, substeps: &[String]) {
        self.clear();

        let elapsed = self.step_start.elapsed();
        let mut stderr = io::stderr().lock();

        let _ = writeln!(
            stderr,
            "  \x1b[32m✓\x1b[0m {:<44} {:>5.1}s",
            description,
            elapsed.as_secs_f64()
        );

        for substep in substeps {
            let _ = writeln!(stderr, "      \x1b[2m·\x1b[0m {}", substep);
        }
    }

    /// Marks the running step as failed.
    pub fn fail(mut self) {
        self.clear();
        if self.description.is_empty() {
            return;
        }
        let _ = writeln!(
            io::stderr().lock(),
            "  \x1b[31m✗\x1b[0m {:<44} {:>5.1}s",
            self.description,
            self.step_start.elapsed().as_secs_f64()
        );
    }

    pub fn finish(mut self) {
        self.clear();
        print_footer(self.start.elapsed());
    }

    fn clear(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

fn print_footer(elapsed: Duration) {
    let mut stderr = io::stderr().lock();

    let _ = writeln!(stderr);
    let _ = writeln!(
        stderr,
        "  \x1b[2m╺━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━╸\x1b[0m"
    );
    let _ = writeln!(stderr);
    let _ = writeln!(
        stderr,
        "  \x1b[32m✓\x1b[0m Run complete {:>37}",
        format!("Total: {:.2}s", elapsed.as_secs_f64())
    );
    let _ = writeln!(stderr);
}

/// Step display for a pipeline run: a spinner on a terminal, nothing otherwise.
pub enum Progress {
    Interactive(StepSpinner),
    Silent,
}

impl Progress {
    pub fn new(interactive: bool, total_steps: usize) -> Self {
        if interactive {
            Self::Interactive(StepSpinner::new(total_steps))
        } else {
            Self::Silent
        }
    }

    pub fn fail(self) {
        if let Self::Interactive(s) = self {
            s.fail();
        }
    }

    pub fn finish(self) {
        if let Self::Interactive(s) = self {
            s.finish();
        }
    }
}

impl ItemProgress for Progress {
    fn set_total(&mut self, total: usize) {
        if let Self::Interactive(s) = self {
            s.set_items(total);
        }
    }

    fn advance(&mut self, done: usize) {
        if let Self::Interactive(s) = self {
            s.set_done(done);
        }
    }
}

impl Observer for Progress {
    fn stage_started(&mut self, stage: &Stage) {
        if let Self::Interactive(s) = self {
            s.step(&stage.to_string());
        }
    }

    fn stage_completed(&mut self, stage: &Stage, details: &[String]) {
        if let Self::Interactive(s) = self {
            s.complete_step(&stage.to_string(), details);
        }
    }
}
