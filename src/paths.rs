//! XDG base-directory resolution. Each root honors its environment
//! variable and falls back to the POSIX default under the invoking
//! user's home, so paths stay stable across `sudo` boundaries.

use std::path::{Path, PathBuf};

use crate::privilege;

pub const APP_DIR: &str = "techup";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XdgDirs {
    pub config: PathBuf,
    pub data: PathBuf,
    pub state: PathBuf,
    pub cache: PathBuf,
}

impl XdgDirs {
    /// Resolves the four roots from the process environment.
    pub fn resolve() -> Self {
        let home = privilege::invoking_home();
        Self::resolve_from(&home, |key| std::env::var(key).ok())
    }

    /// Resolution against an explicit home and environment lookup,
    /// so the fallback chain is testable without touching process env.
    pub fn resolve_from(home: &Path, getenv: impl Fn(&str) -> Option<String>) -> Self {
        let pick = |var: &str, default: PathBuf| -> PathBuf {
            match getenv(var) {
                Some(v) if !v.trim().is_empty() => PathBuf::from(v),
                _ => default,
            }
        };
        XdgDirs {
            config: pick("XDG_CONFIG_HOME", home.join(".config")),
            data: pick("XDG_DATA_HOME", home.join(".local/share")),
            state: pick("XDG_STATE_HOME", home.join(".local/state")),
            cache: pick("XDG_CACHE_HOME", home.join(".cache")),
        }
    }

    pub fn config_root(&self) -> PathBuf {
        self.config.join(APP_DIR)
    }

    pub fn data_root(&self) -> PathBuf {
        self.data.join(APP_DIR)
    }

    pub fn state_root(&self) -> PathBuf {
        self.state.join(APP_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_win() {
        let dirs = XdgDirs::resolve_from(Path::new("/home/u"), |key| match key {
            "XDG_CONFIG_HOME" => Some("/custom/config".to_string()),
            "XDG_DATA_HOME" => Some("/custom/data".to_string()),
            _ => None,
        });
        assert_eq!(dirs.config, PathBuf::from("/custom/config"));
        assert_eq!(dirs.data, PathBuf::from("/custom/data"));
        assert_eq!(dirs.state, PathBuf::from("/home/u/.local/state"));
        assert_eq!(dirs.cache, PathBuf::from("/home/u/.cache"));
    }

    #[test]
    fn empty_env_values_fall_back_to_defaults() {
        let dirs = XdgDirs::resolve_from(Path::new("/home/u"), |key| match key {
            "XDG_CONFIG_HOME" => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(dirs.config, PathBuf::from("/home/u/.config"));
    }

    #[test]
    fn app_roots_nest_under_the_bases() {
        let dirs = XdgDirs::resolve_from(Path::new("/home/u"), |_| None);
        assert_eq!(dirs.config_root(), PathBuf::from("/home/u/.config/techup"));
        assert_eq!(
            dirs.data_root(),
            PathBuf::from("/home/u/.local/share/techup")
        );
        assert_eq!(
            dirs.state_root(),
            PathBuf::from("/home/u/.local/state/techup")
        );
    }
}
