//! Update/rollback orchestrator. One state-machine run per invocation:
//!
//! `CHECK -> (no change: DONE) | BACKUP -> APPLY -> VERIFY ->
//!  (pass: RESTART -> DONE) | (fail: ROLLBACK -> DONE)`
//!
//! The whole mutating section runs under an exclusive cross-process
//! lock scoped to the technology's state directory, since a scheduled
//! run and a manual run may race on the same clone.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::UpdateError;
use crate::target::InstallationTarget;
use crate::{backup, git, installer, privilege, shell};

const LOCK_FILE: &str = "update.lock";

/// Exclusive lock over a technology's update critical section. Held
/// for the lifetime of the value; releases on every exit path.
pub struct UpdateLock {
    path: PathBuf,
}

impl UpdateLock {
    pub fn acquire(state_dir: &Path) -> Result<Self, UpdateError> {
        std::fs::create_dir_all(state_dir).map_err(|e| UpdateError::Io {
            context: format!("creating `{}`", state_dir.display()),
            source: e,
        })?;
        let path = state_dir.join(LOCK_FILE);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let _ = writeln!(file, "{}", std::process::id());
                debug!(lock = %path.display(), "update lock acquired");
                Ok(UpdateLock { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(UpdateError::LockHeld { path })
            }
            Err(e) => Err(UpdateError::Io {
                context: format!("creating lock `{}`", path.display()),
                source: e,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UpdateLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
        debug!(lock = %self.path.display(), "update lock released");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Local and remote revisions already match.
    UpToDate,
    /// New revision applied and verified.
    Updated,
    /// New revision failed verification; previous state restored.
    RolledBack,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// User declined the confirmation prompt.
    Aborted,
    /// Most recent backup restored and reinstalled.
    RestoredBackup,
    /// Named revision checked out and reinstalled.
    CheckedOut(String),
}

/// Runs one update cycle for the target.
pub fn run_update(target: &InstallationTarget) -> Result<UpdateOutcome, UpdateError> {
    let _lock = UpdateLock::acquire(&target.state_dir)?;

    let clone_dir = &target.clone_dir;
    if !git::is_checkout(clone_dir) {
        return Err(UpdateError::MissingClone(clone_dir.clone()));
    }

    // CHECK
    git::fetch(clone_dir)?;
    let local = git::local_rev(clone_dir)?;
    let remote = git::remote_rev(clone_dir)?;
    if local == remote {
        info!(tech = %target.tech_name, rev = %local, "no update needed");
        return Ok(UpdateOutcome::UpToDate);
    }
    info!(tech = %target.tech_name, from = %local, to = %remote, "update available");

    // BACKUP; failure here is fatal and blocks APPLY
    backup::create(target)?;

    // APPLY
    git::reset_hard(clone_dir, &remote)?;
    installer::install_from_clone(target)?;

    // VERIFY, the rollback trigger
    if installer::verify_artifact(&target.install_path()) {
        restart_service(target);
        if let Err(e) = backup::prune(target, backup::DEFAULT_RETENTION) {
            warn!(error = %e, "backup pruning failed");
        }
        info!(tech = %target.tech_name, rev = %remote, "update verified");
        Ok(UpdateOutcome::Updated)
    } else {
        warn!(tech = %target.tech_name, "verification failed, rolling back");
        restore_latest_and_reinstall(target)?;
        Ok(UpdateOutcome::RolledBack)
    }
}

/// Explicit, user-invoked rollback. With a version and a git checkout,
/// checks out that revision; otherwise restores the most recent backup.
pub fn rollback(
    target: &InstallationTarget,
    version: Option<&str>,
    assume_yes: bool,
) -> Result<RollbackOutcome, UpdateError> {
    let what = match version {
        Some(v) => format!("roll back `{}` to revision {v}", target.tech_name),
        None => format!("roll back `{}` to the most recent backup", target.tech_name),
    };
    if !assume_yes && !crate::util::confirm(&format!("Really {what}?")) {
        return Ok(RollbackOutcome::Aborted);
    }

    let _lock = UpdateLock::acquire(&target.state_dir)?;
    match version {
        Some(rev) if git::is_checkout(&target.clone_dir) => {
            git::fetch(&target.clone_dir)?;
            git::checkout(&target.clone_dir, rev)?;
            installer::install_from_clone(target)?;
            installer::warn_unless_verified(&target.install_path());
            Ok(RollbackOutcome::CheckedOut(rev.to_string()))
        }
        _ => {
            restore_latest_and_reinstall(target)?;
            Ok(RollbackOutcome::RestoredBackup)
        }
    }
}

fn restore_latest_and_reinstall(target: &InstallationTarget) -> Result<(), UpdateError> {
    let snapshot = backup::latest(target)?.ok_or(UpdateError::NoBackup)?;
    backup::restore(target, &snapshot)?;
    installer::install_from_clone(target)?;
    installer::warn_unless_verified(&target.install_path());
    Ok(())
}

/// Restarts the technology's service unit if one is registered. A
/// failed restart never fails the update.
fn restart_service(target: &InstallationTarget) {
    let unit = format!("{}.service", target.tech_name);
    match shell::run_allow_failure("systemctl", &["--user", "restart", &unit]) {
        Ok(out) if out.status.success() => {
            info!(unit = %unit, "user service restarted");
            return;
        }
        _ => debug!(unit = %unit, "no restartable user unit"),
    }
    // fall back to the system manager through the broker
    match privilege::exec_privileged(Path::new("/run"), "systemctl", &["restart", &unit]) {
        Ok(_) => info!(unit = %unit, "system service restarted"),
        Err(e) => warn!(unit = %unit, error = %e, "service restart skipped"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::XdgDirs;
    use tempfile::tempdir;

    fn target_in(root: &Path) -> InstallationTarget {
        let xdg = XdgDirs::resolve_from(root, |_| None);
        InstallationTarget::init("mytool", "https://x/y.git", "mytool.sh", "", &xdg).unwrap()
    }

    fn git_in(dir: &Path, args: &[&str]) {
        shell::run_in(dir, "git", args).unwrap();
    }

    fn commit_all(dir: &Path, message: &str) {
        git_in(dir, &["add", "."]);
        git_in(
            dir,
            &[
                "-c",
                "user.email=dev@localhost",
                "-c",
                "user.name=dev",
                "commit",
                "--quiet",
                "-m",
                message,
            ],
        );
    }

    /// Local upstream repo with one committed script, cloned into the
    /// target's clone directory so the tracking ref is set up the same
    /// way `install` leaves it.
    fn cloned_target(root: &Path) -> (InstallationTarget, PathBuf) {
        let upstream = root.join("upstream");
        std::fs::create_dir_all(&upstream).unwrap();
        git_in(&upstream, &["init", "--quiet"]);
        std::fs::write(upstream.join("mytool.sh"), "#!/bin/sh\necho 1.0.0\n").unwrap();
        commit_all(&upstream, "v1");

        let target = target_in(root);
        target.ensure_dirs().unwrap();
        git::clone(&upstream.to_string_lossy(), &target.clone_dir).unwrap();
        (target, upstream)
    }

    #[test]
    fn identical_revisions_terminate_without_a_backup() {
        let root = tempdir().unwrap();
        let (target, _upstream) = cloned_target(root.path());

        assert_eq!(run_update(&target).unwrap(), UpdateOutcome::UpToDate);
        assert!(backup::list(&target).unwrap().is_empty());
    }

    #[test]
    fn failed_verification_restores_the_previous_clone() {
        let root = tempdir().unwrap();
        let (target, upstream) = cloned_target(root.path());
        installer::install_from_clone(&target).unwrap();
        let v1 = std::fs::read_to_string(target.clone_dir.join("mytool.sh")).unwrap();

        // new upstream revision whose artifact fails the version probe
        std::fs::write(upstream.join("mytool.sh"), "#!/bin/sh\nexit 1\n").unwrap();
        commit_all(&upstream, "v2");

        assert_eq!(run_update(&target).unwrap(), UpdateOutcome::RolledBack);
        assert_eq!(
            std::fs::read_to_string(target.clone_dir.join("mytool.sh")).unwrap(),
            v1
        );
        // the installed artifact was reinstalled from the restored clone
        assert_eq!(std::fs::read_to_string(target.install_path()).unwrap(), v1);
    }

    #[test]
    fn lock_is_exclusive_per_state_dir() {
        let dir = tempdir().unwrap();
        let first = UpdateLock::acquire(dir.path()).unwrap();
        assert!(matches!(
            UpdateLock::acquire(dir.path()),
            Err(UpdateError::LockHeld { .. })
        ));
        let lock_path = first.path().to_path_buf();
        drop(first);
        assert!(!lock_path.exists());
        // released on drop, so a second acquisition now succeeds
        UpdateLock::acquire(dir.path()).unwrap();
    }

    #[test]
    fn update_without_a_clone_is_rejected() {
        let root = tempdir().unwrap();
        let target = target_in(root.path());
        assert!(matches!(
            run_update(&target),
            Err(UpdateError::MissingClone(_))
        ));
        // the lock must have been released on the error path
        assert!(!target.state_dir.join(super::LOCK_FILE).exists());
    }

    #[test]
    fn explicit_rollback_without_backup_reports_no_backup() {
        let root = tempdir().unwrap();
        let target = target_in(root.path());
        std::fs::create_dir_all(&target.state_dir).unwrap();
        assert!(matches!(
            rollback(&target, None, true),
            Err(UpdateError::NoBackup)
        ));
    }

    #[test]
    fn rollback_restores_backup_and_reinstalls() {
        let root = tempdir().unwrap();
        let target = target_in(root.path());
        std::fs::create_dir_all(&target.clone_dir).unwrap();
        std::fs::create_dir_all(&target.state_dir).unwrap();
        std::fs::create_dir_all(&target.install_dir).unwrap();
        std::fs::create_dir_all(&target.data_dir).unwrap();

        std::fs::write(target.clone_dir.join("mytool.sh"), "#!/bin/sh\necho v1\n").unwrap();
        backup::create(&target).unwrap();
        std::fs::write(target.clone_dir.join("mytool.sh"), "#!/bin/sh\necho broken\n").unwrap();

        let outcome = rollback(&target, None, true).unwrap();
        assert_eq!(outcome, RollbackOutcome::RestoredBackup);
        assert_eq!(
            std::fs::read_to_string(target.clone_dir.join("mytool.sh")).unwrap(),
            "#!/bin/sh\necho v1\n"
        );
        // the reinstalled artifact matches the pre-update clone
        assert_eq!(
            std::fs::read_to_string(target.install_path()).unwrap(),
            "#!/bin/sh\necho v1\n"
        );
    }
}
