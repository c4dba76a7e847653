use std::io::Write;
use std::path::Path;
use walkdir::WalkDir;

/// Recursively copies `src` into `dst`, preserving Unix permissions.
/// `dst` is created if missing; existing files are overwritten.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(std::io::Error::other)?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(std::io::Error::other)?;
        let dest_path = dst.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&dest_path)?;
        } else if entry.file_type().is_symlink() {
            let link = std::fs::read_link(entry.path())?;
            if dest_path.exists() {
                std::fs::remove_file(&dest_path)?;
            }
            #[cfg(unix)]
            std::os::unix::fs::symlink(link, &dest_path)?;
        } else {
            if let Some(parent) = dest_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &dest_path)?;
        }
    }
    Ok(())
}

/// Checks if a given path is an executable file on Unix.
#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Sets the executable bits on a file.
#[cfg(unix)]
pub fn set_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o755);
    std::fs::set_permissions(path, perms)
}

/// Asks the user a yes/no question on stdin. Anything but `y`/`yes`
/// counts as no.
pub fn confirm(prompt: &str) -> bool {
    print!("{prompt} [y/N] ");
    let _ = std::io::stdout().flush();
    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn copy_dir_recursive_copies_nested_tree() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        std::fs::create_dir_all(src.path().join("a/b")).unwrap();
        std::fs::write(src.path().join("a/b/file.txt"), "content").unwrap();
        std::fs::write(src.path().join("top.txt"), "top").unwrap();

        let dest = dst.path().join("copy");
        copy_dir_recursive(src.path(), &dest).unwrap();

        assert_eq!(
            std::fs::read_to_string(dest.join("a/b/file.txt")).unwrap(),
            "content"
        );
        assert_eq!(std::fs::read_to_string(dest.join("top.txt")).unwrap(), "top");
    }

    #[test]
    fn copy_dir_recursive_preserves_permissions() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        let script = src.path().join("run.sh");
        std::fs::write(&script, "#!/bin/sh\n").unwrap();
        set_executable(&script).unwrap();

        let dest = dst.path().join("copy");
        copy_dir_recursive(src.path(), &dest).unwrap();
        assert!(is_executable(&dest.join("run.sh")));
    }

    #[test]
    fn set_executable_marks_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tool");
        std::fs::write(&path, "").unwrap();
        assert!(!is_executable(&path));
        set_executable(&path).unwrap();
        assert!(is_executable(&path));
    }
}
