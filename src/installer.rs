//! Installation driver: produces a clean clone of a technology's
//! source and installs it with one of four strategies, chosen by
//! probing the clone for project markers.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::{CloneError, InstallError};
use crate::manifest::ProjectConfig;
use crate::target::InstallationTarget;
use crate::{git, privilege, shell, util};

/// Install strategy, dispatched over the capability set rather than a
/// type hierarchy. Exactly one applies per clone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallKind {
    RawScript,
    NodeJs,
    Rust,
    Go,
}

impl std::fmt::Display for InstallKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            InstallKind::RawScript => "script",
            InstallKind::NodeJs => "nodejs",
            InstallKind::Rust => "rust",
            InstallKind::Go => "go",
        };
        write!(f, "{label}")
    }
}

/// Probes the clone for project markers, in fixed order: entry script,
/// Node.js, Rust, Go.
pub fn detect_kind(clone_dir: &Path, main_script: &str) -> Result<InstallKind, InstallError> {
    if !main_script.is_empty() && clone_dir.join(main_script).is_file() {
        Ok(InstallKind::RawScript)
    } else if clone_dir.join("package.json").is_file() {
        Ok(InstallKind::NodeJs)
    } else if clone_dir.join("Cargo.toml").is_file() {
        Ok(InstallKind::Rust)
    } else if clone_dir.join("go.mod").is_file() {
        Ok(InstallKind::Go)
    } else {
        Err(InstallError::UnknownProjectType {
            dir: clone_dir.to_path_buf(),
        })
    }
}

/// Guarantees a pristine clone at the target's clone directory.
///
/// When invoked from inside the clone directory itself and that
/// directory is a checkout, it is refreshed in place (fetch plus hard
/// reset, skipped when local and remote revisions already match); if it
/// is the working directory but not a checkout, the call fails rather
/// than deleting the directory underneath the process. Otherwise any
/// existing clone is deleted and re-cloned from scratch so no stale
/// files survive a reinstall.
pub fn ensure_clean_clone(target: &InstallationTarget) -> Result<(), CloneError> {
    let cwd = std::env::current_dir().ok();
    ensure_clean_clone_at(target, cwd.as_deref())
}

fn ensure_clean_clone_at(target: &InstallationTarget, cwd: Option<&Path>) -> Result<(), CloneError> {
    let clone_dir = &target.clone_dir;
    let in_clone = cwd == Some(clone_dir.as_path());

    if in_clone {
        if git::is_checkout(clone_dir) {
            refresh_in_place(clone_dir)?;
        } else {
            return Err(CloneError::CwdConflict {
                dir: clone_dir.clone(),
            });
        }
    } else {
        if clone_dir.exists() {
            debug!(dir = %clone_dir.display(), "removing stale clone");
            std::fs::remove_dir_all(clone_dir).map_err(|e| CloneError::Io {
                context: format!("removing stale clone `{}`", clone_dir.display()),
                source: e,
            })?;
        }
        if let Some(parent) = clone_dir.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CloneError::Io {
                context: format!("creating `{}`", parent.display()),
                source: e,
            })?;
        }
        git::clone(&target.repo_url, clone_dir).map_err(|e| CloneError::CloneFailed {
            url: target.repo_url.clone(),
            dest: clone_dir.clone(),
            source: e,
        })?;
    }

    // A declared entry script must exist unless a build-type project
    // marker explains its absence.
    let script_present = clone_dir.join(&target.main_script).is_file();
    let build_marker = clone_dir.join("package.json").is_file()
        || clone_dir.join("Cargo.toml").is_file()
        || clone_dir.join("go.mod").is_file();
    if !script_present && !build_marker {
        return Err(CloneError::MissingEntryScript {
            dir: clone_dir.clone(),
            script: target.main_script.clone(),
        });
    }
    Ok(())
}

fn refresh_in_place(clone_dir: &Path) -> Result<(), CloneError> {
    let wrap = |e| CloneError::RefreshFailed {
        dir: clone_dir.to_path_buf(),
        source: e,
    };
    git::fetch(clone_dir).map_err(wrap)?;
    let local = git::local_rev(clone_dir).map_err(wrap)?;
    let remote = git::remote_rev(clone_dir).map_err(wrap)?;
    if local == remote {
        debug!(dir = %clone_dir.display(), rev = %local, "checkout already current");
        return Ok(());
    }
    git::reset_hard(clone_dir, &remote).map_err(wrap)
}

/// Installs the technology from its (already clean) clone and returns
/// the strategy that was applied.
pub fn install_from_clone(target: &InstallationTarget) -> Result<InstallKind, InstallError> {
    let dest = target.install_path();
    privilege::make_dir_all(&target.install_dir)?;

    let kind = detect_kind(&target.clone_dir, &target.main_script)?;
    info!(tech = %target.tech_name, strategy = %kind, "installing");
    match kind {
        InstallKind::RawScript => install_raw_script(&target.clone_dir, &dest, target)?,
        InstallKind::NodeJs => install_nodejs(&target.clone_dir, &dest, target)?,
        InstallKind::Rust => install_rust(&target.clone_dir, &dest)?,
        InstallKind::Go => install_go(&target.clone_dir, &dest)?,
    }
    Ok(kind)
}

/// Smoke test: the installed artifact answers a version probe. Not all
/// artifacts support one, so this is advisory only.
pub fn verify_artifact(path: &Path) -> bool {
    match shell::run_allow_failure(&path.to_string_lossy(), &["--version"]) {
        Ok(out) => out.status.success(),
        Err(_) => false,
    }
}

fn install_raw_script(
    clone_dir: &Path,
    dest: &Path,
    target: &InstallationTarget,
) -> Result<(), InstallError> {
    let config = ProjectConfig::load_from(clone_dir)
        .map_err(|e| InstallError::Io {
            context: format!("reading sidecar config in `{}`", clone_dir.display()),
            source: std::io::Error::other(e),
        })?
        .unwrap_or_default();

    if let Some(hook) = &config.hooks.pre_install {
        run_hook(clone_dir, "pre_install", hook)?;
    }

    copy_artifact(&clone_dir.join(&target.main_script), dest)?;

    for file in &config.additional_files {
        let src = clone_dir.join(file);
        let name = src
            .file_name()
            .ok_or_else(|| InstallError::Io {
                context: format!("bad additional file `{file}`"),
                source: std::io::Error::other("no file name"),
            })?
            .to_owned();
        copy_artifact(&src, &target.install_dir.join(name))?;
    }

    for file in &config.legacy_files {
        let stale = target.install_dir.join(file);
        if stale.exists() {
            debug!(file = %stale.display(), "removing legacy file");
            privilege::remove_all(&stale)?;
        }
    }

    for dir in &config.directories {
        let src = clone_dir.join(dir);
        if src.is_dir() {
            util::copy_dir_recursive(&src, &target.data_dir.join(dir)).map_err(|e| {
                InstallError::Io {
                    context: format!("copying project directory `{dir}`"),
                    source: e,
                }
            })?;
        }
    }

    if let Some(hook) = &config.hooks.post_install {
        run_hook(clone_dir, "post_install", hook)?;
    }
    Ok(())
}

fn install_nodejs(
    clone_dir: &Path,
    dest: &Path,
    target: &InstallationTarget,
) -> Result<(), InstallError> {
    toolchain_available("node")?;
    toolchain_available("npm")?;

    shell::run_in(clone_dir, "npm", &["install", "--omit=dev"]).map_err(|e| {
        InstallError::Step {
            step: "npm install".to_string(),
            source: e,
        }
    })?;

    let entry = node_entry_point(clone_dir)?;
    let wrapper = node_wrapper(clone_dir, &entry, target);
    privilege::write_file(dest, &wrapper)?;
    make_executable(dest)?;
    Ok(())
}

/// Entry point resolution: sidecar override, then package.json `main`,
/// then the default `index.js`.
fn node_entry_point(clone_dir: &Path) -> Result<String, InstallError> {
    if let Ok(Some(config)) = ProjectConfig::load_from(clone_dir)
        && let Some(entry) = config.entry_point
    {
        return Ok(entry);
    }
    let package_json = clone_dir.join("package.json");
    let raw = std::fs::read_to_string(&package_json).map_err(|e| InstallError::Io {
        context: format!("reading `{}`", package_json.display()),
        source: e,
    })?;
    let parsed: serde_json::Value =
        serde_json::from_str(&raw).map_err(|e| InstallError::Io {
            context: format!("parsing `{}`", package_json.display()),
            source: std::io::Error::other(e),
        })?;
    if let Some(main) = parsed.get("main").and_then(|m| m.as_str())
        && !main.is_empty()
    {
        return Ok(main.to_string());
    }
    if clone_dir.join("index.js").is_file() {
        return Ok("index.js".to_string());
    }
    Err(InstallError::NoEntryPoint {
        dir: clone_dir.to_path_buf(),
    })
}

/// Small launcher exporting the XDG roots before handing off to node,
/// so the technology sees the same directory layout we manage.
fn node_wrapper(clone_dir: &Path, entry: &str, target: &InstallationTarget) -> String {
    format!(
        "#!/bin/sh\n\
         export XDG_CONFIG_HOME=\"${{XDG_CONFIG_HOME:-$HOME/.config}}\"\n\
         export XDG_DATA_HOME=\"${{XDG_DATA_HOME:-$HOME/.local/share}}\"\n\
         export XDG_STATE_HOME=\"${{XDG_STATE_HOME:-$HOME/.local/state}}\"\n\
         export XDG_CACHE_HOME=\"${{XDG_CACHE_HOME:-$HOME/.cache}}\"\n\
         export TECHUP_DATA_DIR=\"{data}\"\n\
         exec node \"{clone}/{entry}\" \"$@\"\n",
        data = target.data_dir.display(),
        clone = clone_dir.display(),
        entry = entry,
    )
}

fn install_rust(clone_dir: &Path, dest: &Path) -> Result<(), InstallError> {
    toolchain_available("cargo")?;
    shell::run_in(clone_dir, "cargo", &["build", "--release"]).map_err(|e| InstallError::Step {
        step: "cargo build --release".to_string(),
        source: e,
    })?;
    let bin_name = rust_binary_name(clone_dir)?;
    let built = clone_dir.join("target/release").join(&bin_name);
    copy_artifact(&built, dest)
}

fn rust_binary_name(clone_dir: &Path) -> Result<String, InstallError> {
    let cargo_toml = clone_dir.join("Cargo.toml");
    let raw = std::fs::read_to_string(&cargo_toml).map_err(|e| InstallError::Io {
        context: format!("reading `{}`", cargo_toml.display()),
        source: e,
    })?;
    let parsed: toml::Value = toml::from_str(&raw).map_err(|e| InstallError::Io {
        context: format!("parsing `{}`", cargo_toml.display()),
        source: std::io::Error::other(e),
    })?;
    parsed
        .get("package")
        .and_then(|p| p.get("name"))
        .and_then(|n| n.as_str())
        .map(|n| n.to_string())
        .ok_or_else(|| InstallError::NoEntryPoint {
            dir: clone_dir.to_path_buf(),
        })
}

fn install_go(clone_dir: &Path, dest: &Path) -> Result<(), InstallError> {
    toolchain_available("go")?;
    let built = clone_dir.join(".techup-out");
    shell::run_in(clone_dir, "go", &["build", "-o", &built.to_string_lossy(), "."]).map_err(
        |e| InstallError::Step {
            step: "go build".to_string(),
            source: e,
        },
    )?;
    let result = copy_artifact(&built, dest);
    let _ = std::fs::remove_file(&built);
    result
}

fn copy_artifact(src: &Path, dest: &Path) -> Result<(), InstallError> {
    match privilege::check_privilege(dest.parent().unwrap_or(Path::new("/"))) {
        privilege::PrivilegeDecision::Direct => {
            std::fs::copy(src, dest).map_err(|e| InstallError::Io {
                context: format!("copying `{}` to `{}`", src.display(), dest.display()),
                source: e,
            })?;
        }
        _ => {
            privilege::exec_privileged(
                dest.parent().unwrap_or(Path::new("/")),
                "cp",
                &[&src.to_string_lossy(), &dest.to_string_lossy()],
            )?;
        }
    }
    make_executable(dest)
}

fn make_executable(path: &Path) -> Result<(), InstallError> {
    match util::set_executable(path) {
        Ok(()) => Ok(()),
        Err(_) => {
            // read-only for us; chmod through the broker instead
            privilege::exec_privileged(
                path.parent().unwrap_or(Path::new("/")),
                "chmod",
                &["755", &path.to_string_lossy()],
            )?;
            Ok(())
        }
    }
}

fn toolchain_available(tool: &str) -> Result<(), InstallError> {
    let found = shell::run_allow_failure("sh", &["-c", &format!("command -v {tool}")])
        .map(|out| out.status.success())
        .unwrap_or(false);
    if found {
        Ok(())
    } else {
        Err(InstallError::MissingToolchain {
            tool: tool.to_string(),
        })
    }
}

fn run_hook(dir: &Path, name: &str, script: &str) -> Result<(), InstallError> {
    debug!(hook = name, "running project hook");
    shell::run_in(dir, "sh", &["-c", script]).map_err(|e| InstallError::Step {
        step: format!("{name} hook"),
        source: e,
    })?;
    Ok(())
}

/// Post-install smoke check, logged only; absence of a `--version`
/// flag must not fail a fresh installation.
pub fn warn_unless_verified(path: &Path) {
    if verify_artifact(path) {
        debug!(artifact = %path.display(), "version probe succeeded");
    } else {
        warn!(
            artifact = %path.display(),
            "installed artifact did not answer a version probe; continuing"
        );
    }
}
