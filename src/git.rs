//! Thin wrapper over the external `git` client. All operations are
//! synchronous and addressed by working directory (`git -C`).

use std::path::Path;

use crate::error::ExecError;
use crate::shell;

/// True when `dir` is the root of a git checkout.
pub fn is_checkout(dir: &Path) -> bool {
    dir.join(".git").exists()
}

pub fn clone(url: &str, dest: &Path) -> Result<(), ExecError> {
    shell::run("git", &["clone", url, &dest.to_string_lossy()])?;
    Ok(())
}

pub fn fetch(dir: &Path) -> Result<(), ExecError> {
    shell::run("git", &["-C", &dir.to_string_lossy(), "fetch", "--quiet"])?;
    Ok(())
}

/// Revision identifier of the local HEAD.
pub fn local_rev(dir: &Path) -> Result<String, ExecError> {
    let out = shell::run("git", &["-C", &dir.to_string_lossy(), "rev-parse", "HEAD"])?;
    Ok(shell::stdout_line(&out))
}

/// Revision identifier of the remote tracking ref. Falls back to
/// `FETCH_HEAD` when no upstream is configured.
pub fn remote_rev(dir: &Path) -> Result<String, ExecError> {
    let dir_str = dir.to_string_lossy();
    let out = shell::run_allow_failure("git", &["-C", &dir_str, "rev-parse", "@{u}"])?;
    if out.status.success() {
        return Ok(shell::stdout_line(&out));
    }
    let out = shell::run("git", &["-C", &dir_str, "rev-parse", "FETCH_HEAD"])?;
    Ok(shell::stdout_line(&out))
}

/// Hard-resets the checkout to `rev`, discarding local changes.
pub fn reset_hard(dir: &Path, rev: &str) -> Result<(), ExecError> {
    shell::run("git", &["-C", &dir.to_string_lossy(), "reset", "--hard", rev])?;
    Ok(())
}

pub fn checkout(dir: &Path, rev: &str) -> Result<(), ExecError> {
    shell::run("git", &["-C", &dir.to_string_lossy(), "checkout", rev])?;
    Ok(())
}
