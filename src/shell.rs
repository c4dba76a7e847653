use std::path::Path;
use std::process::{Command, Output};

use crate::error::ExecError;

/// Runs an external command to completion and fails on a non-zero exit.
pub fn run(program: &str, args: &[&str]) -> Result<Output, ExecError> {
    let out = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| ExecError::Spawn {
            program: program.to_string(),
            source: e,
        })?;
    check_status(program, out)
}

/// Like [`run`], but with the working directory set.
pub fn run_in(dir: &Path, program: &str, args: &[&str]) -> Result<Output, ExecError> {
    let out = Command::new(program)
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| ExecError::Spawn {
            program: program.to_string(),
            source: e,
        })?;
    check_status(program, out)
}

/// Runs a command and returns the raw output even on failure.
/// Only spawn errors are reported.
pub fn run_allow_failure(program: &str, args: &[&str]) -> Result<Output, ExecError> {
    Command::new(program)
        .args(args)
        .output()
        .map_err(|e| ExecError::Spawn {
            program: program.to_string(),
            source: e,
        })
}

/// Runs a command with extra environment variables set.
pub fn run_in_with_env(
    dir: &Path,
    program: &str,
    args: &[&str],
    envs: &[(&str, &str)],
) -> Result<Output, ExecError> {
    let mut cmd = Command::new(program);
    cmd.args(args).current_dir(dir);
    for (key, value) in envs {
        cmd.env(key, value);
    }
    let out = cmd.output().map_err(|e| ExecError::Spawn {
        program: program.to_string(),
        source: e,
    })?;
    check_status(program, out)
}

/// Trimmed stdout of a successful command.
pub fn stdout_line(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

fn check_status(program: &str, out: Output) -> Result<Output, ExecError> {
    if !out.status.success() {
        return Err(ExecError::Failed {
            program: program.to_string(),
            code: out.status.code(),
            stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
        });
    }
    Ok(out)
}
