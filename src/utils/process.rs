//! External process execution
//!
//! Native tools run to completion with their output captured, so a failure
//! can be reported together with what the tool printed.

use crate::error::{PackagerError, Result};
use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, info, instrument};

/// Runs the native tools driven by the build stage
#[derive(Debug)]
pub struct ProcessRunner {
    debug: bool,
}

/// Output of a command that exited successfully
#[derive(Debug, Default)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ProcessRunner {
    /// Create a runner; with `debug` the captured output is logged
    #[must_use]
    pub const fn new(debug: bool) -> Self {
        Self { debug }
    }

    /// Run `command` and wait for it.
    ///
    /// A non-zero exit becomes [`PackagerError::Process`] holding both
    /// streams; see [`PackagerError::output_tail`].
    #[instrument(skip(self))]
    pub fn run(&self, command: &str, args: &[&str]) -> Result<ProcessOutput> {
        let command_line = std::iter::once(command)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        info!("+ {}", command_line);

        let output = Command::new(command).args(args).output().map_err(|e| {
            PackagerError::process(
                command_line.clone(),
                None,
                String::new(),
                format!("could not start {command}: {e}"),
            )
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if self.debug {
            for line in stdout.lines().chain(stderr.lines()) {
                debug!("  | {}", line);
            }
        }

        if !output.status.success() {
            let exit_code = output.status.code();
            debug!("{} exited with {:?}", command, exit_code);
            return Err(PackagerError::process(command_line, exit_code, stdout, stderr));
        }
        Ok(ProcessOutput { stdout, stderr })
    }

    /// Locate an executable on `PATH`
    #[instrument(skip(self))]
    pub fn find_command(&self, command: &str) -> Option<PathBuf> {
        let paths = std::env::var_os("PATH")?;
        let candidates: Vec<String> = if cfg!(windows) {
            vec![format!("{command}.exe"), command.to_string()]
        } else {
            vec![command.to_string()]
        };

        let found = std::env::split_paths(&paths)
            .flat_map(|dir| candidates.iter().map(move |name| dir.join(name)))
            .find(|candidate| candidate.is_file());
        debug!("Command '{}' resolved to {:?}", command, found);
        found
    }

    /// Whether `command` resolves on `PATH`
    pub fn command_exists(&self, command: &str) -> bool {
        self.find_command(command).is_some()
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_run_captures_output() {
        let runner = ProcessRunner::new(true);
        let output = runner.run("echo", &["hello", "world"]).unwrap();
        assert_eq!(output.stdout.trim(), "hello world");
        assert!(output.stderr.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_exists() {
        let runner = ProcessRunner::default();
        assert!(runner.command_exists("sh"));
        assert!(!runner.command_exists("nonexistent_command_12345"));
    }

    #[cfg(unix)]
    #[test]
    fn test_failure_keeps_diagnostics() {
        let runner = ProcessRunner::new(false);
        let err = runner
            .run("sh", &["-c", "echo building; echo 'spline.cpp:3: error: boom' >&2; exit 2"])
            .unwrap_err();

        match &err {
            PackagerError::Process {
                command, exit_code, stdout, ..
            } => {
                assert!(command.starts_with("sh -c"));
                assert_eq!(*exit_code, Some(2));
                assert_eq!(stdout.trim(), "building");
            }
            other => panic!("expected process error, got {other:?}"),
        }
        assert_eq!(err.output_tail(10).unwrap(), "spline.cpp:3: error: boom");
    }

    #[test]
    fn test_missing_executable_is_process_error() {
        let runner = ProcessRunner::new(false);
        let err = runner.run("nonexistent_command_12345", &[]).unwrap_err();
        assert!(matches!(err, PackagerError::Process { exit_code: None, .. }));
    }
}
