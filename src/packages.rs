//! Package scope manager. Packages are installed into one of three
//! independent filesystem roots and toggled on and off through a
//! symlink indirection in the scope's `enabled` directory, separate
//! from installation itself.

use std::path::{Path, PathBuf};

use clap::ValueEnum;
use tracing::{debug, info, warn};

use crate::error::PackageError;
use crate::manifest::{PACKAGE_MANIFEST_FILE, PackageManifest};
use crate::paths::XdgDirs;
use crate::{git, privilege, shell};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scope {
    /// Project-relative hidden directory.
    Local,
    /// Per-user XDG data root.
    User,
    /// Shared root; writes go through the privilege broker.
    System,
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Scope::Local => "local",
            Scope::User => "user",
            Scope::System => "system",
        };
        write!(f, "{label}")
    }
}

const SYSTEM_ROOT: &str = "/usr/local/share/techup";

/// A parsed package source URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPackage {
    pub name: String,
    pub source: PackageSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageSource {
    Git { url: String, reference: Option<String> },
    LocalPath(PathBuf),
}

/// Scheme dispatch: `gh:`/`gl:` shorthands (with optional `@ref`),
/// verbatim `https://`, and `file://` local copies. Anything else is
/// rejected.
pub fn parse_package_url(url: &str) -> Result<ParsedPackage, PackageError> {
    if let Some(rest) = url.strip_prefix("gh:") {
        return parse_shorthand(url, rest, "https://github.com");
    }
    if let Some(rest) = url.strip_prefix("gl:") {
        return parse_shorthand(url, rest, "https://gitlab.com");
    }
    if url.starts_with("https://") {
        let name = url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .trim_end_matches(".git");
        if name.is_empty() {
            return Err(PackageError::UnsupportedUrl(url.to_string()));
        }
        return Ok(ParsedPackage {
            name: name.to_string(),
            source: PackageSource::Git {
                url: url.to_string(),
                reference: None,
            },
        });
    }
    if let Some(rest) = url.strip_prefix("file://") {
        let path = PathBuf::from(rest);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if name.is_empty() {
            return Err(PackageError::UnsupportedUrl(url.to_string()));
        }
        return Ok(ParsedPackage {
            name,
            source: PackageSource::LocalPath(path),
        });
    }
    Err(PackageError::UnsupportedUrl(url.to_string()))
}

fn parse_shorthand(raw: &str, rest: &str, base: &str) -> Result<ParsedPackage, PackageError> {
    let (path, reference) = match rest.split_once('@') {
        Some((path, r)) => (path, Some(r.to_string())),
        None => (rest, None),
    };
    let mut segments = path.split('/');
    let (Some(owner), Some(repo), None) = (segments.next(), segments.next(), segments.next())
    else {
        return Err(PackageError::UnsupportedUrl(raw.to_string()));
    };
    if owner.is_empty() || repo.is_empty() {
        return Err(PackageError::UnsupportedUrl(raw.to_string()));
    }
    Ok(ParsedPackage {
        name: repo.to_string(),
        source: PackageSource::Git {
            url: format!("{base}/{owner}/{repo}.git"),
            reference,
        },
    })
}

/// Enabled-state as derived from the filesystem, including the
/// inconsistent case of a link whose package root is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnabledState {
    Enabled,
    Disabled,
    /// Enabled link present but its target no longer exists.
    Stale,
}

/// Result of an enable/disable call; both are safe to repeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Changed,
    AlreadyInState,
}

#[derive(Debug, Clone)]
pub struct PackageStatus {
    pub name: String,
    pub version: String,
    pub installed: bool,
    pub state: EnabledState,
}

/// Filesystem view of one scope's package root and enabled directory.
#[derive(Debug, Clone)]
pub struct PackageStore {
    pub scope: Scope,
    pub packages_dir: PathBuf,
    pub enabled_dir: PathBuf,
}

impl PackageStore {
    pub fn for_scope(scope: Scope, xdg: &XdgDirs, project_root: &Path) -> Self {
        let base = match scope {
            Scope::Local => project_root.join(".techup"),
            Scope::User => xdg.data_root(),
            Scope::System => PathBuf::from(SYSTEM_ROOT),
        };
        PackageStore {
            scope,
            packages_dir: base.join("packages"),
            enabled_dir: base.join("enabled"),
        }
    }

    pub fn package_root(&self, name: &str) -> PathBuf {
        self.packages_dir.join(name)
    }

    pub fn manifest_path(&self, name: &str) -> PathBuf {
        self.package_root(name).join(PACKAGE_MANIFEST_FILE)
    }

    pub fn enabled_link(&self, name: &str) -> PathBuf {
        self.enabled_dir.join(name)
    }

    /// Installed means: a manifest file exists under the scope's
    /// package root. Never cached.
    pub fn is_installed(&self, name: &str) -> bool {
        self.manifest_path(name).is_file()
    }

    /// Enabled means: the indirection link exists. Never cached.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled_state(name) == EnabledState::Enabled
    }

    pub fn enabled_state(&self, name: &str) -> EnabledState {
        let link = self.enabled_link(name);
        match link.symlink_metadata() {
            Err(_) => EnabledState::Disabled,
            Ok(_) => {
                // the link counts as live only while its target exists
                if link.exists() && self.package_root(name).exists() {
                    EnabledState::Enabled
                } else {
                    EnabledState::Stale
                }
            }
        }
    }

    /// Installs a package from a parsed source. Refuses to overwrite an
    /// installed package of the same name; remove first, there is no
    /// upgrade-in-place. The package is enabled by default.
    pub fn install(&self, package: &ParsedPackage) -> Result<(), PackageError> {
        let name = &package.name;
        if self.is_installed(name) {
            return Err(PackageError::AlreadyInstalled {
                name: name.clone(),
                scope: self.scope,
            });
        }
        privilege::make_dir_all(&self.packages_dir)?;
        privilege::make_dir_all(&self.enabled_dir)?;

        let root = self.package_root(name);
        if root.exists() {
            // leftover without a manifest from an interrupted install
            warn!(package = name, "clearing partial package root");
            privilege::remove_all(&root)?;
        }

        let source_str = match &package.source {
            PackageSource::Git { url, reference } => {
                // git always runs unprivileged; the package root may
                // need elevation, so the clone lands via the broker
                let staging = tempfile::tempdir().map_err(|e| PackageError::Io {
                    context: "creating staging directory".to_string(),
                    source: e,
                })?;
                let checkout = staging.path().join(name);
                git::clone(url, &checkout)?;
                if let Some(rev) = reference {
                    git::checkout(&checkout, rev)?;
                }
                privilege::copy_tree(&checkout, &root)?;
                url.clone()
            }
            PackageSource::LocalPath(path) => {
                privilege::copy_tree(path, &root)?;
                format!("file://{}", path.display())
            }
        };

        let manifest_path = self.manifest_path(name);
        let manifest = if manifest_path.is_file() {
            PackageManifest::load(&manifest_path).map_err(|e| PackageError::Io {
                context: format!("reading `{}`", manifest_path.display()),
                source: std::io::Error::other(e),
            })?
        } else {
            let synthesized = PackageManifest::synthesize(name, &source_str);
            let rendered = synthesized.to_toml_string().map_err(|e| PackageError::Io {
                context: "rendering synthesized manifest".to_string(),
                source: std::io::Error::other(e),
            })?;
            privilege::write_file(&manifest_path, &rendered)?;
            synthesized
        };

        self.run_hook(name, &manifest, "install")?;
        info!(package = name, scope = %self.scope, "package installed");
        self.enable(name)?;
        Ok(())
    }

    /// Removes an installed package: uninstall hook, disable, then
    /// delete the package root.
    pub fn remove(&self, name: &str) -> Result<(), PackageError> {
        if !self.is_installed(name) {
            return Err(PackageError::NotInstalled {
                name: name.to_string(),
                scope: self.scope,
            });
        }
        let manifest = self.load_manifest(name)?;
        // a broken uninstall hook must not make a package unremovable
        if let Err(e) = self.run_hook(name, &manifest, "uninstall") {
            warn!(package = name, error = %e, "uninstall hook failed, removing anyway");
        }
        self.disable(name)?;
        privilege::remove_all(&self.package_root(name))?;
        info!(package = name, scope = %self.scope, "package removed");
        Ok(())
    }

    /// Creates the single indirection link for the package, running its
    /// enable hook first. Repeat calls are a no-op.
    pub fn enable(&self, name: &str) -> Result<ToggleOutcome, PackageError> {
        if !self.is_installed(name) {
            return Err(PackageError::NotInstalled {
                name: name.to_string(),
                scope: self.scope,
            });
        }
        match self.enabled_state(name) {
            EnabledState::Enabled => Ok(ToggleOutcome::AlreadyInState),
            state => {
                if state == EnabledState::Stale {
                    warn!(package = name, "replacing stale enabled link");
                    privilege::remove_all(&self.enabled_link(name))?;
                }
                let manifest = self.load_manifest(name)?;
                self.run_hook(name, &manifest, "enable")?;
                privilege::make_dir_all(&self.enabled_dir)?;
                privilege::symlink(&self.package_root(name), &self.enabled_link(name))?;
                info!(package = name, scope = %self.scope, "package enabled");
                Ok(ToggleOutcome::Changed)
            }
        }
    }

    /// Removes only the indirection link; the package root is left
    /// untouched. A stale link is removed too, with a warning, since a
    /// dangling enabled entry is an inconsistency worth surfacing.
    pub fn disable(&self, name: &str) -> Result<ToggleOutcome, PackageError> {
        match self.enabled_state(name) {
            EnabledState::Disabled => {
                if self.is_installed(name) {
                    Ok(ToggleOutcome::AlreadyInState)
                } else {
                    Err(PackageError::NotInstalled {
                        name: name.to_string(),
                        scope: self.scope,
                    })
                }
            }
            EnabledState::Stale => {
                warn!(package = name, scope = %self.scope, "removing stale enabled link");
                privilege::remove_all(&self.enabled_link(name))?;
                Ok(ToggleOutcome::Changed)
            }
            EnabledState::Enabled => {
                let manifest = self.load_manifest(name)?;
                if let Err(e) = self.run_hook(name, &manifest, "disable") {
                    warn!(package = name, error = %e, "disable hook failed, unlinking anyway");
                }
                privilege::remove_all(&self.enabled_link(name))?;
                info!(package = name, scope = %self.scope, "package disabled");
                Ok(ToggleOutcome::Changed)
            }
        }
    }

    /// Status of every package root and enabled link in the scope,
    /// including stale links whose package is gone.
    pub fn list(&self) -> Result<Vec<PackageStatus>, PackageError> {
        let mut statuses = Vec::new();
        let mut seen = Vec::new();

        if self.packages_dir.is_dir() {
            let entries = std::fs::read_dir(&self.packages_dir).map_err(|e| PackageError::Io {
                context: format!("listing `{}`", self.packages_dir.display()),
                source: e,
            })?;
            for entry in entries {
                let entry = entry.map_err(|e| PackageError::Io {
                    context: format!("listing `{}`", self.packages_dir.display()),
                    source: e,
                })?;
                let name = entry.file_name().to_string_lossy().to_string();
                let version = self
                    .load_manifest(&name)
                    .map(|m| m.version)
                    .unwrap_or_default();
                statuses.push(PackageStatus {
                    installed: self.is_installed(&name),
                    state: self.enabled_state(&name),
                    version,
                    name: name.clone(),
                });
                seen.push(name);
            }
        }

        if self.enabled_dir.is_dir() {
            let entries = std::fs::read_dir(&self.enabled_dir).map_err(|e| PackageError::Io {
                context: format!("listing `{}`", self.enabled_dir.display()),
                source: e,
            })?;
            for entry in entries {
                let entry = entry.map_err(|e| PackageError::Io {
                    context: format!("listing `{}`", self.enabled_dir.display()),
                    source: e,
                })?;
                let name = entry.file_name().to_string_lossy().to_string();
                if !seen.contains(&name) {
                    // enabled link without a package root
                    statuses.push(PackageStatus {
                        name,
                        version: String::new(),
                        installed: false,
                        state: EnabledState::Stale,
                    });
                }
            }
        }

        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(statuses)
    }

    fn load_manifest(&self, name: &str) -> Result<PackageManifest, PackageError> {
        let path = self.manifest_path(name);
        PackageManifest::load(&path).map_err(|e| PackageError::Io {
            context: format!("reading `{}`", path.display()),
            source: std::io::Error::other(e),
        })
    }

    fn run_hook(
        &self,
        name: &str,
        manifest: &PackageManifest,
        hook: &str,
    ) -> Result<(), PackageError> {
        let script = match hook {
            "install" => &manifest.scripts.install,
            "uninstall" => &manifest.scripts.uninstall,
            "enable" => &manifest.scripts.enable,
            "disable" => &manifest.scripts.disable,
            _ => &None,
        };
        let Some(script) = script else {
            return Ok(());
        };
        debug!(package = name, hook, "running package hook");
        let root = self.package_root(name);
        shell::run_in_with_env(
            &root,
            "sh",
            &["-c", script],
            &[
                ("TECHUP_PKG_ROOT", &root.to_string_lossy()),
                ("TECHUP_PKG_NAME", name),
                ("TECHUP_PKG_SCOPE", &self.scope.to_string()),
            ],
        )
        .map_err(|e| PackageError::Hook {
            name: name.to_string(),
            hook: hook.to_string(),
            source: e,
        })?;
        Ok(())
    }
}
