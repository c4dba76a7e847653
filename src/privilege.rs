//! Privilege broker: decides per target directory whether an operation
//! may write directly, needs elevation, or must fail, and wraps
//! external commands and filesystem mutations accordingly.
//!
//! Decisions are derived at the time of use and never cached, since
//! privileges can change underneath a long-running invocation.

use std::path::{Path, PathBuf};
use std::process::Output;

use tracing::debug;

use crate::error::PrivilegeError;
use crate::shell;
use crate::util;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivilegeDecision {
    /// The directory is writable by the current effective user.
    Direct,
    /// Not directly writable, but passwordless elevation is available.
    Elevated,
    /// Neither writable nor elevatable.
    Denied,
}

/// Computes the privilege decision for `dir`. When the directory does
/// not exist yet, the check walks up to its nearest existing ancestor.
pub fn check_privilege(dir: &Path) -> PrivilegeDecision {
    let probe = nearest_existing(dir);
    let decision = if is_writable(&probe) {
        PrivilegeDecision::Direct
    } else if elevation_available() {
        PrivilegeDecision::Elevated
    } else {
        PrivilegeDecision::Denied
    };
    debug!(dir = %dir.display(), probe = %probe.display(), ?decision, "privilege check");
    decision
}

/// Runs `program` with write access to `dir`, re-deriving the decision
/// at call time. `Denied` is a hard error, never a silent skip.
pub fn exec_privileged(dir: &Path, program: &str, args: &[&str]) -> Result<Output, PrivilegeError> {
    match check_privilege(dir) {
        PrivilegeDecision::Direct => Ok(shell::run(program, args)?),
        PrivilegeDecision::Elevated => {
            let mut full = vec!["-n", program];
            full.extend_from_slice(args);
            Ok(shell::run("sudo", &full)?)
        }
        PrivilegeDecision::Denied => Err(PrivilegeError::Insufficient {
            dir: dir.to_path_buf(),
        }),
    }
}

/// `mkdir -p` under the broker.
pub fn make_dir_all(dir: &Path) -> Result<(), PrivilegeError> {
    match check_privilege(dir) {
        PrivilegeDecision::Direct => std::fs::create_dir_all(dir).map_err(|e| PrivilegeError::Io {
            context: format!("creating `{}`", dir.display()),
            source: e,
        }),
        PrivilegeDecision::Elevated => {
            shell::run("sudo", &["-n", "mkdir", "-p", &dir.to_string_lossy()])?;
            Ok(())
        }
        PrivilegeDecision::Denied => Err(PrivilegeError::Insufficient {
            dir: dir.to_path_buf(),
        }),
    }
}

/// Removes a file or directory tree under the broker. Missing paths
/// are not an error.
pub fn remove_all(path: &Path) -> Result<(), PrivilegeError> {
    if path.symlink_metadata().is_err() {
        return Ok(());
    }
    let parent = path.parent().unwrap_or(Path::new("/"));
    match check_privilege(parent) {
        PrivilegeDecision::Direct => {
            let result = if path.is_dir() && !path.is_symlink() {
                std::fs::remove_dir_all(path)
            } else {
                std::fs::remove_file(path)
            };
            result.map_err(|e| PrivilegeError::Io {
                context: format!("removing `{}`", path.display()),
                source: e,
            })
        }
        PrivilegeDecision::Elevated => {
            shell::run("sudo", &["-n", "rm", "-rf", &path.to_string_lossy()])?;
            Ok(())
        }
        PrivilegeDecision::Denied => Err(PrivilegeError::Insufficient {
            dir: parent.to_path_buf(),
        }),
    }
}

/// Recursive copy of `src` into `dst` under the broker.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<(), PrivilegeError> {
    let parent = dst.parent().unwrap_or(Path::new("/"));
    match check_privilege(parent) {
        PrivilegeDecision::Direct => util::copy_dir_recursive(src, dst).map_err(|e| {
            PrivilegeError::Io {
                context: format!("copying `{}` to `{}`", src.display(), dst.display()),
                source: e,
            }
        }),
        PrivilegeDecision::Elevated => {
            shell::run(
                "sudo",
                &["-n", "cp", "-R", &src.to_string_lossy(), &dst.to_string_lossy()],
            )?;
            Ok(())
        }
        PrivilegeDecision::Denied => Err(PrivilegeError::Insufficient {
            dir: parent.to_path_buf(),
        }),
    }
}

/// Creates a symlink at `link` pointing to `target` under the broker.
#[cfg(unix)]
pub fn symlink(target: &Path, link: &Path) -> Result<(), PrivilegeError> {
    let parent = link.parent().unwrap_or(Path::new("/"));
    match check_privilege(parent) {
        PrivilegeDecision::Direct => {
            std::os::unix::fs::symlink(target, link).map_err(|e| PrivilegeError::Io {
                context: format!("linking `{}` -> `{}`", link.display(), target.display()),
                source: e,
            })
        }
        PrivilegeDecision::Elevated => {
            shell::run(
                "sudo",
                &["-n", "ln", "-s", &target.to_string_lossy(), &link.to_string_lossy()],
            )?;
            Ok(())
        }
        PrivilegeDecision::Denied => Err(PrivilegeError::Insufficient {
            dir: parent.to_path_buf(),
        }),
    }
}

/// Writes `contents` to `path` under the broker.
pub fn write_file(path: &Path, contents: &str) -> Result<(), PrivilegeError> {
    let parent = path.parent().unwrap_or(Path::new("/"));
    match check_privilege(parent) {
        PrivilegeDecision::Direct => std::fs::write(path, contents).map_err(|e| {
            PrivilegeError::Io {
                context: format!("writing `{}`", path.display()),
                source: e,
            }
        }),
        PrivilegeDecision::Elevated => {
            let mut tmp = tempfile::NamedTempFile::new().map_err(|e| PrivilegeError::Io {
                context: "creating staging file".to_string(),
                source: e,
            })?;
            use std::io::Write;
            tmp.write_all(contents.as_bytes())
                .map_err(|e| PrivilegeError::Io {
                    context: "writing staging file".to_string(),
                    source: e,
                })?;
            shell::run(
                "sudo",
                &["-n", "cp", &tmp.path().to_string_lossy(), &path.to_string_lossy()],
            )?;
            Ok(())
        }
        PrivilegeDecision::Denied => Err(PrivilegeError::Insufficient {
            dir: parent.to_path_buf(),
        }),
    }
}

/// The user who invoked the tool, looking through `sudo`. Falls through
/// `SUDO_USER`, `USER`, `LOGNAME` and an `id -un` query before giving
/// up with the `unknown` sentinel.
pub fn invoking_user() -> String {
    for var in ["SUDO_USER", "USER", "LOGNAME"] {
        if let Ok(value) = std::env::var(var)
            && !value.trim().is_empty()
        {
            return value;
        }
    }
    if let Ok(out) = shell::run_allow_failure("id", &["-un"])
        && out.status.success()
    {
        let name = shell::stdout_line(&out);
        if !name.is_empty() {
            return name;
        }
    }
    "unknown".to_string()
}

/// Home directory of the invoking user, preferring the pre-elevation
/// identity over the effective one.
pub fn invoking_home() -> PathBuf {
    if let Ok(sudo_user) = std::env::var("SUDO_USER")
        && !sudo_user.trim().is_empty()
    {
        if let Some(home) = passwd_home(&sudo_user) {
            return home;
        }
        return PathBuf::from(format!("/home/{sudo_user}"));
    }
    if let Ok(home) = std::env::var("HOME")
        && !home.trim().is_empty()
    {
        return PathBuf::from(home);
    }
    if let Some(base) = directories::BaseDirs::new() {
        return base.home_dir().to_path_buf();
    }
    PathBuf::from("/")
}

fn passwd_home(user: &str) -> Option<PathBuf> {
    let out = shell::run_allow_failure("getent", &["passwd", user]).ok()?;
    if !out.status.success() {
        return None;
    }
    let line = shell::stdout_line(&out);
    let home = line.split(':').nth(5)?;
    if home.is_empty() {
        return None;
    }
    Some(PathBuf::from(home))
}

fn nearest_existing(dir: &Path) -> PathBuf {
    let mut current = dir;
    loop {
        if current.exists() {
            return current.to_path_buf();
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => return PathBuf::from("/"),
        }
    }
}

/// Actually tries to create a file rather than trusting mode bits, so
/// read-only mounts and ACLs are caught too.
fn is_writable(dir: &Path) -> bool {
    tempfile::tempfile_in(dir).is_ok()
}

fn elevation_available() -> bool {
    shell::run_allow_failure("sudo", &["-n", "true"])
        .map(|out| out.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writable_directory_is_direct() {
        let dir = tempdir().unwrap();
        assert_eq!(check_privilege(dir.path()), PrivilegeDecision::Direct);
    }

    #[test]
    fn missing_directory_uses_nearest_ancestor() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("does/not/exist/yet");
        assert_eq!(check_privilege(&nested), PrivilegeDecision::Direct);
    }

    #[test]
    fn nearest_existing_walks_up() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        assert_eq!(nearest_existing(&nested), dir.path().to_path_buf());
    }

    #[test]
    fn exec_privileged_runs_directly_in_writable_dir() {
        let dir = tempdir().unwrap();
        let out = exec_privileged(dir.path(), "true", &[]).unwrap();
        assert!(out.status.success());
    }

    #[test]
    fn invoking_user_never_panics() {
        let user = invoking_user();
        assert!(!user.is_empty());
    }
}
