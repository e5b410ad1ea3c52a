//! Blocking invocation of external command-line tools.

use std::ffi::OsString;
use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const STDERR_TAIL: usize = 2000;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to launch '{program}': {source}")]
    Spawn { program: String, source: io::Error },

    #[error("'{program}' did not finish within {}s and was killed", timeout.as_secs())]
    Timeout { program: String, timeout: Duration },

    #[error("'{program}' exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("lost track of '{program}': {source}")]
    Wait { program: String, source: io::Error },
}

#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// An external program invocation: executable plus argument vector, no shell.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: OsString,
    args: Vec<OsString>,
    timeout: Duration,
}

impl ToolCommand {
    pub fn new(program: impl Into<OsString>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program_name(&self) -> String {
        Path::new(&self.program)
            .file_name()
            .unwrap_or(self.program.as_os_str())
            .to_string_lossy()
            .into_owned()
    }

    pub fn command_line(&self) -> String {
        std::iter::once(&self.program)
            .chain(&self.args)
            .map(|s| s.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Runs the tool to completion, killing it once the timeout elapses.
    pub fn run(&self) -> Result<ToolOutput, ToolError> {
        let program = self.program_name();
        debug!(command = %self.command_line(), "launching external tool");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ToolError::Spawn {
                program: program.clone(),
                source,
            })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match wait_with_deadline(&mut child, self.timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ToolError::Timeout {
                    program,
                    timeout: self.timeout,
                });
            }
            Err(source) => return Err(ToolError::Wait { program, source }),
        };

        let output = ToolOutput {
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
        };

        if !status.success() {
            return Err(ToolError::Failed {
                program,
                status,
                stderr: tail(&output.stderr, STDERR_TAIL),
            });
        }
        Ok(output)
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn wait_with_deadline(child: &mut Child, timeout: Duration) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn tail(text: &str, max: usize) -> String {
    let trimmed = text.trim();
    if trimmed.len() <= max {
        return trimmed.to_string();
    }
    let mut start = trimmed.len() - max;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &trimmed[start..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_joins_program_and_args() {
        let cmd = ToolCommand::new("/usr/bin/obabel", Duration::from_secs(1))
            .arg("in.mol")
            .args(["-O", "out.mol"]);
        assert_eq!(cmd.program_name(), "obabel");
        assert_eq!(cmd.command_line(), "/usr/bin/obabel in.mol -O out.mol");
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let cmd = ToolCommand::new("definitely-not-a-real-tool-7f3a", Duration::from_secs(1));
        assert!(matches!(cmd.run(), Err(ToolError::Spawn { .. })));
    }

    #[test]
    fn tail_keeps_the_end_of_long_output() {
        let text = "a".repeat(10) + "xyz";
        assert_eq!(tail(&text, 3), "...xyz");
        assert_eq!(tail("  short \n", 100), "short");
    }

    #[cfg(unix)]
    #[test]
    fn captures_stdout_of_successful_run() {
        let out = ToolCommand::new("sh", Duration::from_secs(10))
            .args(["-c", "echo hello"])
            .run()
            .unwrap();
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_reports_stderr() {
        let err = ToolCommand::new("sh", Duration::from_secs(10))
            .args(["-c", "echo broken >&2; exit 3"])
            .run()
            .unwrap_err();
        match err {
            ToolError::Failed { stderr, status, .. } => {
                assert_eq!(stderr, "broken");
                assert_eq!(status.code(), Some(3));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn slow_tool_is_killed_at_deadline() {
        let err = ToolCommand::new("sleep", Duration::from_millis(200))
            .arg("5")
            .run()
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }));
    }
}
