//! OS command execution

use std::process::Command;
use thiserror::Error;
use tracing::debug;

/// Command errors
#[derive(Debug, Clone, Error)]
pub enum CommandError {
    #[error("Empty command")]
    Empty,

    #[error("Failed to spawn: {0}")]
    Spawn(String),

    #[error("Exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
}

/// Runs one OS command and reports its output
pub trait CommandRunner: Send + Sync {
    /// Run `argv` (program first) to completion, returning stdout
    fn run(&self, argv: &[String]) -> Result<String, CommandError>;
}

/// Runs commands on the host
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, argv: &[String]) -> Result<String, CommandError> {
        let (program, args) = argv.split_first().ok_or(CommandError::Empty)?;
        debug!("exec: {}", format_command(argv));

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| CommandError::Spawn(e.to_string()))?;

        if !output.status.success() {
            return Err(CommandError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Render `argv` as a single shell-like line for diagnostics
pub fn format_command(argv: &[String]) -> String {
    argv.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_format_command() {
        assert_eq!(
            format_command(&argv(&["route", "add", "default", "-interface", "utun9"])),
            "route add default -interface utun9"
        );
    }

    #[test]
    fn test_empty_command() {
        assert!(matches!(SystemRunner.run(&[]), Err(CommandError::Empty)));
    }

    #[test]
    fn test_missing_program() {
        let result = SystemRunner.run(&argv(&["lanlink-no-such-program-xyz"]));
        assert!(matches!(result, Err(CommandError::Spawn(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_success_and_failure() {
        let out = SystemRunner.run(&argv(&["sh", "-c", "echo hello"])).unwrap();
        assert_eq!(out.trim(), "hello");

        let result = SystemRunner.run(&argv(&["sh", "-c", "echo oops >&2; exit 3"]));
        match result {
            Err(CommandError::Failed { stderr, .. }) => assert_eq!(stderr, "oops"),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
