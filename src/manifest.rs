use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Manifest describing one managed technology, created by `init` and
/// stored under the technology's config directory.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TechManifest {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub template: String,
    /// Clone URL of the technology's source repository.
    pub repository: String,
    /// Entry script relative to the clone root, for script-type installs.
    pub main_script: String,
    /// Declared but not resolved; kept for forward compatibility.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

pub const TECH_MANIFEST_FILE: &str = "manifest.toml";

impl TechManifest {
    pub fn new(name: &str, repository: &str, main_script: &str, description: &str) -> Self {
        TechManifest {
            name: name.to_string(),
            version: String::from("0.1.0"),
            description: description.to_string(),
            template: String::new(),
            repository: repository.to_string(),
            main_script: main_script.to_string(),
            dependencies: Vec::new(),
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_str = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<TechManifest> {
        let toml_str = std::fs::read_to_string(path)?;
        toml::from_str(&toml_str).map_err(|e| e.into())
    }
}

/// Manifest shipped inside (or synthesized for) an installable package.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct PackageManifest {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub license: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub scripts: PackageScripts,
    #[serde(default)]
    pub xdg: PackageXdg,
    #[serde(default)]
    pub posix: PackagePosix,
    #[serde(default)]
    pub scopes: PackageScopes,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct PackageScripts {
    pub install: Option<String>,
    pub uninstall: Option<String>,
    pub enable: Option<String>,
    pub disable: Option<String>,
    pub test: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct PackageXdg {
    pub config_dir: Option<String>,
    pub data_dir: Option<String>,
    pub cache_dir: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct PackagePosix {
    #[serde(default)]
    pub shells: Vec<String>,
    #[serde(default)]
    pub required_commands: Vec<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct PackageScopes {
    #[serde(default)]
    pub supports: Vec<String>,
    pub default: Option<String>,
}

pub const PACKAGE_MANIFEST_FILE: &str = "package.toml";

impl PackageManifest {
    /// Minimal manifest for a source that ships none of its own.
    pub fn synthesize(name: &str, source: &str) -> Self {
        PackageManifest {
            name: name.to_string(),
            version: String::from("0.0.0"),
            source: source.to_string(),
            ..Default::default()
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_str = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<PackageManifest> {
        let toml_str = std::fs::read_to_string(path)?;
        toml::from_str(&toml_str).map_err(|e| e.into())
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Optional sidecar config read from a technology's clone root by the
/// raw-script install strategy.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct ProjectConfig {
    /// Extra files copied next to the entry script and made executable.
    #[serde(default)]
    pub additional_files: Vec<String>,
    /// Files from earlier versions to delete from the install dir.
    #[serde(default)]
    pub legacy_files: Vec<String>,
    /// Directories copied recursively into the technology's data dir.
    #[serde(default)]
    pub directories: Vec<String>,
    /// Overrides the Node.js entry point detection.
    pub entry_point: Option<String>,
    #[serde(default)]
    pub hooks: ProjectHooks,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct ProjectHooks {
    pub pre_install: Option<String>,
    pub post_install: Option<String>,
}

pub const PROJECT_CONFIG_FILE: &str = "techup.toml";

impl ProjectConfig {
    /// Loads the sidecar from a clone root, if present.
    pub fn load_from(clone_dir: &Path) -> Result<Option<ProjectConfig>> {
        let path = clone_dir.join(PROJECT_CONFIG_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let toml_str = std::fs::read_to_string(path)?;
        Ok(Some(toml::from_str(&toml_str)?))
    }
}
