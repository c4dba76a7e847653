//! Timestamped snapshots of the clone directory, taken before every
//! mutating update and consumed by rollback. Retention is bounded;
//! the oldest snapshots go first.

use std::path::PathBuf;

use tracing::{debug, info};

use crate::error::BackupError;
use crate::target::InstallationTarget;
use crate::util;

pub const DEFAULT_RETENTION: usize = 5;

const LAST_BACKUP_FILE: &str = "last-backup";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backup {
    pub timestamp: String,
    pub path: PathBuf,
}

fn backups_root(target: &InstallationTarget) -> PathBuf {
    target.state_dir.join("backups")
}

fn last_backup_file(target: &InstallationTarget) -> PathBuf {
    target.state_dir.join(LAST_BACKUP_FILE)
}

/// Snapshots the clone directory. The new backup's path is recorded in
/// the state file so a later `rollback` without arguments finds it.
pub fn create(target: &InstallationTarget) -> Result<Backup, BackupError> {
    let source = &target.clone_dir;
    if !source.is_dir() {
        return Err(BackupError::MissingSource(source.clone()));
    }
    let root = backups_root(target);
    std::fs::create_dir_all(&root).map_err(|e| BackupError::Io {
        context: format!("creating `{}`", root.display()),
        source: e,
    })?;

    let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
    let path = root.join(format!("{}-{}", target.tech_name, timestamp));
    util::copy_dir_recursive(source, &path).map_err(|e| BackupError::Io {
        context: format!("snapshotting `{}`", source.display()),
        source: e,
    })?;

    std::fs::write(last_backup_file(target), format!("{}\n", path.display())).map_err(|e| {
        BackupError::Io {
            context: "recording latest backup".to_string(),
            source: e,
        }
    })?;
    info!(backup = %path.display(), "clone snapshot created");
    Ok(Backup { timestamp, path })
}

/// All backups for the target, oldest first. Timestamped names sort
/// chronologically.
pub fn list(target: &InstallationTarget) -> Result<Vec<Backup>, BackupError> {
    let root = backups_root(target);
    if !root.is_dir() {
        return Ok(Vec::new());
    }
    let mut backups = Vec::new();
    let entries = std::fs::read_dir(&root).map_err(|e| BackupError::Io {
        context: format!("listing `{}`", root.display()),
        source: e,
    })?;
    let prefix = format!("{}-", target.tech_name);
    for entry in entries {
        let entry = entry.map_err(|e| BackupError::Io {
            context: format!("listing `{}`", root.display()),
            source: e,
        })?;
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if let Some(timestamp) = name.strip_prefix(&prefix) {
            backups.push(Backup {
                timestamp: timestamp.to_string(),
                path: entry.path(),
            });
        }
    }
    backups.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    Ok(backups)
}

/// Most recent backup: the state file's record when it still exists on
/// disk, otherwise the newest timestamped directory.
pub fn latest(target: &InstallationTarget) -> Result<Option<Backup>, BackupError> {
    let record = last_backup_file(target);
    if let Ok(recorded) = std::fs::read_to_string(&record) {
        let path = PathBuf::from(recorded.trim());
        if path.is_dir()
            && let Some(name) = path.file_name()
        {
            let prefix = format!("{}-", target.tech_name);
            let name = name.to_string_lossy();
            let timestamp = name.strip_prefix(&prefix).unwrap_or_default().to_string();
            return Ok(Some(Backup { timestamp, path }));
        }
    }
    Ok(list(target)?.pop())
}

/// Replaces the clone directory with the backup's contents.
pub fn restore(target: &InstallationTarget, backup: &Backup) -> Result<(), BackupError> {
    let clone_dir = &target.clone_dir;
    if clone_dir.exists() {
        std::fs::remove_dir_all(clone_dir).map_err(|e| BackupError::Io {
            context: format!("clearing `{}`", clone_dir.display()),
            source: e,
        })?;
    }
    util::copy_dir_recursive(&backup.path, clone_dir).map_err(|e| BackupError::Io {
        context: format!("restoring `{}`", backup.path.display()),
        source: e,
    })?;
    info!(backup = %backup.path.display(), "clone restored from snapshot");
    Ok(())
}

/// Drops backups beyond `keep`, oldest first. Returns how many were
/// removed.
pub fn prune(target: &InstallationTarget, keep: usize) -> Result<usize, BackupError> {
    let backups = list(target)?;
    if backups.len() <= keep {
        return Ok(0);
    }
    let excess = backups.len() - keep;
    for backup in &backups[..excess] {
        debug!(backup = %backup.path.display(), "pruning old backup");
        std::fs::remove_dir_all(&backup.path).map_err(|e| BackupError::Io {
            context: format!("pruning `{}`", backup.path.display()),
            source: e,
        })?;
    }
    Ok(excess)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::XdgDirs;
    use std::path::Path;
    use tempfile::tempdir;

    fn target_in(root: &Path) -> InstallationTarget {
        let xdg = XdgDirs::resolve_from(root, |_| None);
        let target =
            InstallationTarget::init("mytool", "https://x/y.git", "mytool.sh", "", &xdg).unwrap();
        std::fs::create_dir_all(&target.clone_dir).unwrap();
        std::fs::create_dir_all(&target.state_dir).unwrap();
        target
    }

    #[test]
    fn create_fails_without_a_clone() {
        let root = tempdir().unwrap();
        let target = target_in(root.path());
        std::fs::remove_dir_all(&target.clone_dir).unwrap();
        assert!(matches!(
            create(&target),
            Err(BackupError::MissingSource(_))
        ));
    }

    #[test]
    fn create_then_latest_round_trips() {
        let root = tempdir().unwrap();
        let target = target_in(root.path());
        std::fs::write(target.clone_dir.join("mytool.sh"), "v1").unwrap();

        let backup = create(&target).unwrap();
        assert!(backup.path.join("mytool.sh").is_file());

        let latest = latest(&target).unwrap().unwrap();
        assert_eq!(latest.path, backup.path);
    }

    #[test]
    fn restore_brings_back_previous_contents() {
        let root = tempdir().unwrap();
        let target = target_in(root.path());
        std::fs::write(target.clone_dir.join("mytool.sh"), "v1").unwrap();
        let backup = create(&target).unwrap();

        std::fs::write(target.clone_dir.join("mytool.sh"), "v2-broken").unwrap();
        std::fs::write(target.clone_dir.join("junk.tmp"), "x").unwrap();

        restore(&target, &backup).unwrap();
        assert_eq!(
            std::fs::read_to_string(target.clone_dir.join("mytool.sh")).unwrap(),
            "v1"
        );
        assert!(!target.clone_dir.join("junk.tmp").exists());
    }

    #[test]
    fn prune_removes_oldest_first() {
        let root = tempdir().unwrap();
        let target = target_in(root.path());
        let backups_dir = target.state_dir.join("backups");
        std::fs::create_dir_all(&backups_dir).unwrap();
        for ts in ["20240101-000000", "20240102-000000", "20240103-000000"] {
            std::fs::create_dir(backups_dir.join(format!("mytool-{ts}"))).unwrap();
        }

        let removed = prune(&target, 2).unwrap();
        assert_eq!(removed, 1);
        let remaining = list(&target).unwrap();
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining[0].timestamp, "20240102-000000");
    }

    #[test]
    fn latest_falls_back_to_newest_directory() {
        let root = tempdir().unwrap();
        let target = target_in(root.path());
        let backups_dir = target.state_dir.join("backups");
        std::fs::create_dir_all(&backups_dir).unwrap();
        std::fs::create_dir(backups_dir.join("mytool-20240101-000000")).unwrap();
        std::fs::create_dir(backups_dir.join("mytool-20240105-000000")).unwrap();

        let found = latest(&target).unwrap().unwrap();
        assert_eq!(found.timestamp, "20240105-000000");
    }
}
