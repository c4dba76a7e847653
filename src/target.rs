use std::path::PathBuf;

use crate::error::TargetError;
use crate::manifest::TechManifest;
use crate::paths::XdgDirs;

/// A resolved installation target for one technology. Constructed once
/// per invocation and immutable afterward; the directories it names are
/// created during installation but never renamed.
#[derive(Debug, Clone)]
pub struct InstallationTarget {
    pub tech_name: String,
    pub repo_url: String,
    pub main_script: String,
    pub service_description: String,
    /// Destination directory for installed artifacts.
    pub install_dir: PathBuf,
    /// Clean clone of the technology's source.
    pub clone_dir: PathBuf,
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    /// Holds backups, the latest-backup record and the update lock.
    pub state_dir: PathBuf,
}

impl InstallationTarget {
    /// Builds a target from its identifying fields. All fields except
    /// the service description must be non-empty; directories derive
    /// deterministically from the technology name and the XDG roots.
    pub fn init(
        tech_name: &str,
        repo_url: &str,
        main_script: &str,
        service_description: &str,
        xdg: &XdgDirs,
    ) -> Result<Self, TargetError> {
        if tech_name.trim().is_empty() {
            return Err(TargetError::EmptyField("tech_name"));
        }
        if repo_url.trim().is_empty() {
            return Err(TargetError::EmptyField("repo_url"));
        }
        if main_script.trim().is_empty() {
            return Err(TargetError::EmptyField("main_script"));
        }
        Ok(InstallationTarget {
            tech_name: tech_name.to_string(),
            repo_url: repo_url.to_string(),
            main_script: main_script.to_string(),
            service_description: service_description.to_string(),
            install_dir: xdg.data_root().join("bin"),
            clone_dir: xdg.data_root().join("src").join(tech_name),
            config_dir: xdg.config_root().join(tech_name),
            data_dir: xdg.data_root().join(tech_name),
            state_dir: xdg.state_root().join(tech_name),
        })
    }

    pub fn from_manifest(manifest: &TechManifest, xdg: &XdgDirs) -> Result<Self, TargetError> {
        Self::init(
            &manifest.name,
            &manifest.repository,
            &manifest.main_script,
            &manifest.description,
            xdg,
        )
    }

    /// Path of the installed artifact.
    pub fn install_path(&self) -> PathBuf {
        self.install_dir.join(&self.tech_name)
    }

    /// Creates every directory the target names.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [
            &self.install_dir,
            &self.config_dir,
            &self.data_dir,
            &self.state_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        if let Some(parent) = self.clone_dir.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn xdg() -> XdgDirs {
        XdgDirs::resolve_from(Path::new("/home/u"), |_| None)
    }

    #[test]
    fn directories_derive_from_name_and_roots() {
        let target =
            InstallationTarget::init("mytool", "https://x/y.git", "mytool.sh", "", &xdg()).unwrap();
        assert_eq!(
            target.clone_dir,
            PathBuf::from("/home/u/.local/share/techup/src/mytool")
        );
        assert_eq!(
            target.install_path(),
            PathBuf::from("/home/u/.local/share/techup/bin/mytool")
        );
        assert_eq!(
            target.state_dir,
            PathBuf::from("/home/u/.local/state/techup/mytool")
        );
        assert_eq!(
            target.config_dir,
            PathBuf::from("/home/u/.config/techup/mytool")
        );
    }

    #[test]
    fn empty_required_fields_are_rejected() {
        assert!(matches!(
            InstallationTarget::init("", "url", "s.sh", "", &xdg()),
            Err(TargetError::EmptyField("tech_name"))
        ));
        assert!(matches!(
            InstallationTarget::init("t", " ", "s.sh", "", &xdg()),
            Err(TargetError::EmptyField("repo_url"))
        ));
        assert!(matches!(
            InstallationTarget::init("t", "url", "", "", &xdg()),
            Err(TargetError::EmptyField("main_script"))
        ));
    }

    #[test]
    fn description_may_be_empty() {
        assert!(InstallationTarget::init("t", "url", "s.sh", "", &xdg()).is_ok());
    }
}
