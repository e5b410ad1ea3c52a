use std::io::{self, Write};

use anyhow::Error;

use shift_forge::PipelineError;
use shift_forge::normalize::Error as NormalizeError;
use shift_forge::pipeline::Stage;
use shift_forge::process::ToolError;

use crate::util::text::wrap;

#[rustfmt::skip]
pub fn print_error(err: &Error) {
    let mut stderr = io::stderr().lock();

    let _ = writeln!(stderr);
    let _ = writeln!(stderr, "   ╔══════════════════════════════════════════════════════════════╗");
    let _ = writeln!(stderr, "   ║  ✗ Error                                                     ║");
    let _ = writeln!(stderr, "   ╟──────────────────────────────────────────────────────────────╢");

    if let Some(stage) = failed_stage(err) {
        for line in wrap(&format!("Stage: {stage}"), 59) {
            let _ = writeln!(stderr, "   ║  {:<59} ║", line);
        }
        let _ = writeln!(stderr, "   ╟──────────────────────────────────────────────────────────────╢");
    }

    let msg = err.to_string();
    for line in wrap(&msg, 59) {
        let _ = writeln!(stderr, "   ║  {:<59} ║", line);
    }

    let mut source = err.source();
    while let Some(cause) = source {
        let _ = writeln!(stderr, "   ╟──────────────────────────────────────────────────────────────╢");
        let _ = writeln!(stderr, "   ║  Caused by:                                                  ║");
        for line in wrap(&cause.to_string(), 59) {
            let _ = writeln!(stderr, "   ║    {:<57} ║", line);
        }
        source = cause.source();
    }

    if let Some(hints) = HintCollector::collect(err) {
        let _ = writeln!(stderr, "   ╟──────────────────────────────────────────────────────────────╢");
        let _ = writeln!(stderr, "   ║  Hints:                                                      ║");
        for hint in hints {
            let wrapped = wrap(&hint, 55);
            if let Some((first, rest)) = wrapped.split_first() {
                let _ = writeln!(stderr, "   ║    • {:<55} ║", first);
                for line in rest {
                    let _ = writeln!(stderr, "   ║      {:<55} ║", line);
                }
            }
        }
    }

    let _ = writeln!(stderr, "   ╚══════════════════════════════════════════════════════════════╝");
    let _ = writeln!(stderr);
}

fn failed_stage(err: &Error) -> Option<Stage> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<PipelineError>())
        .and_then(|e| e.failed_stage().copied())
}

struct HintCollector {
    hints: Vec<String>,
    has_typed_hints: bool,
}

impl HintCollector {
    fn new() -> Self {
        Self {
            hints: Vec::new(),
            has_typed_hints: false,
        }
    }

    fn collect(err: &Error) -> Option<Vec<String>> {
        let mut collector = Self::new();

        for cause in err.chain() {
            if let Some(e) = cause.downcast_ref::<PipelineError>() {
                collector.collect_pipeline_hints(e);
            } else if let Some(e) = cause.downcast_ref::<NormalizeError>() {
                collector.collect_input_hints(e);
            } else if let Some(e) = cause.downcast_ref::<ToolError>() {
                collector.collect_tool_hints(e);
            } else if let Some(e) = cause.downcast_ref::<std::io::Error>() {
                collector.collect_std_io_hints(e);
            }
        }

        if !collector.has_typed_hints {
            collector.collect_fallback_hints(err);
        }

        if collector.hints.is_empty() {
            None
        } else {
            Some(collector.hints)
        }
    }

    fn add(&mut self, hint: impl Into<String>) {
        let hint = hint.into();
        if !self.hints.contains(&hint) {
            self.hints.push(hint);
        }
    }

    fn mark_typed(&mut self) {
        self.has_typed_hints = true;
    }

    fn collect_pipeline_hints(&mut self, err: &PipelineError) {
        self.mark_typed();

        match err {
            PipelineError::Config(_) => {
                self.add("The configuration file is not valid TOML or has unknown keys");
                self.add("Sections: [embedding], [layout_tool], [shift_predictor], [fingerprint]");
            }

            PipelineError::Input(_) => {
                self.add("The input must be a CSV with MOLECULE_NAME and SMILES columns");
            }

            PipelineError::ExternalTool { stage, .. } => match stage {
                Stage::Embed => {
                    self.add("Structures with hazards are laid out by Open Babel (obabel)");
                    self.add("Install Open Babel or point layout_tool.program at it");
                }
                Stage::PredictShifts(_) => {
                    self.add("Shift prediction runs a Java batch predictor");
                    self.add("Check that java is on PATH and the jars in shift_predictor.classpath exist");
                    self.add("Set shift_predictor.compile = false to run precompiled classes without javac");
                }
                _ => {}
            },

            PipelineError::Stage { stage, .. } => {
                if matches!(stage, Stage::Merge(_)) {
                    self.add("No per-structure feature files were produced");
                    self.add("See mol_creation_error.log for structures that failed to embed");
                }
                if matches!(stage, Stage::Dispatch) {
                    self.add("Registries need the columns model_path;model_name;ML_algorithm;property");
                }
            }

            PipelineError::HybridIncomplete { failures } => {
                for (nucleus, _) in failures {
                    self.add(format!(
                        "Run with -r {} alone to inspect the failing sub-run",
                        nucleus.tag().to_lowercase()
                    ));
                }
                for (_, failure) in failures {
                    self.collect_pipeline_hints(failure);
                }
            }
        }
    }

    fn collect_input_hints(&mut self, err: &NormalizeError) {
        self.mark_typed();

        match err {
            NormalizeError::Read { .. } => {
                self.add("Check that the input path is correct and readable");
            }
            NormalizeError::Empty { .. } => {
                self.add("The input file is empty");
            }
            NormalizeError::Csv { .. } => {
                self.add("The file could not be parsed as delimited text");
                self.add("Supported delimiters: comma, semicolon, tab");
            }
            NormalizeError::TooFewColumns { .. } => {
                self.add("At least two columns are needed: an identifier and a SMILES string");
                self.add("Check that the delimiter is used consistently");
            }
            NormalizeError::NoRows { .. } => {
                self.add("Every row was malformed or had a missing value");
                self.add("Run with -v to see which rows were dropped");
            }
            NormalizeError::Write { .. } => {
                self.add("The normalized copy could not be written to the work directory");
                self.add("Check --work-dir permissions and free space");
            }
        }
    }

    fn collect_tool_hints(&mut self, err: &ToolError) {
        self.mark_typed();

        match err {
            ToolError::Spawn { program, source } => {
                if source.kind() == std::io::ErrorKind::NotFound {
                    self.add(format!("'{program}' was not found on PATH"));
                } else {
                    self.add(format!("'{program}' could not be started"));
                }
            }
            ToolError::Timeout { .. } => {
                self.add("Raise timeout_secs in the configuration for large inputs");
            }
            ToolError::Failed { .. } => {
                self.add("The tool's own error output is shown above");
            }
            ToolError::Wait { .. } => {
                self.add("The external process ended unexpectedly");
            }
        }
    }

    fn collect_std_io_hints(&mut self, source: &std::io::Error) {
        use std::io::ErrorKind;

        match source.kind() {
            ErrorKind::NotFound => {
                self.add("File or directory not found");
                self.add("Check the path spelling and ensure the file exists");
            }

            ErrorKind::PermissionDenied => {
                self.add("Permission denied accessing the file");
                self.add("Check file permissions with `ls -la`");
            }

            ErrorKind::WriteZero => {
                self.add("Failed to write data (disk full?)");
                self.add("Check available disk space");
            }

            _ => {}
        }
    }

    fn collect_fallback_hints(&mut self, err: &Error) {
        let msg = error_chain_text(err);

        if msg.contains("no such file") || msg.contains("not found") {
            self.add("Check that the file path is correct");
            self.add("Verify the file exists and is readable");
            return;
        }

        if msg.contains("permission denied") {
            self.add("Check file permissions with `ls -la`");
            self.add("Ensure you have the required access rights");
        }
    }
}

fn error_chain_text(err: &Error) -> String {
    let mut text = String::new();

    text.push_str(&err.to_string());

    let mut source = err.source();
    while let Some(cause) = source {
        text.push('\n');
        text.push_str(&cause.to_string());
        source = cause.source();
    }

    text.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shift_forge::Nucleus;

    fn tool_failure() -> PipelineError {
        PipelineError::external_tool(
            Stage::PredictShifts(Nucleus::Carbon),
            ToolError::Spawn {
                program: "java".into(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            },
        )
    }

    #[test]
    fn stage_is_found_through_context() {
        let err = anyhow::Error::new(tool_failure()).context("Pipeline run failed");
        assert_eq!(failed_stage(&err), Some(Stage::PredictShifts(Nucleus::Carbon)));
    }

    #[test]
    fn tool_hints_name_the_missing_program() {
        let err = anyhow::Error::new(tool_failure());
        let hints = HintCollector::collect(&err).unwrap();
        assert!(hints.iter().any(|h| h.contains("java is on PATH")));
        assert!(hints.iter().any(|h| h == "'java' was not found on PATH"));
    }

    #[test]
    fn hybrid_failures_suggest_single_runs() {
        let err = anyhow::Error::new(PipelineError::HybridIncomplete {
            failures: vec![(Nucleus::Carbon, tool_failure())],
        });
        let hints = HintCollector::collect(&err).unwrap();
        assert!(hints.iter().any(|h| h.contains("-r 13c")));
        assert_eq!(failed_stage(&err), None);
    }

    #[test]
    fn untyped_errors_fall_back_to_message_hints() {
        let err = anyhow::anyhow!("permission denied while opening output");
        let hints = HintCollector::collect(&err).unwrap();
        assert!(hints.iter().any(|h| h.contains("ls -la")));
    }
}
