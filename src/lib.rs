//! # Techup Core Library
//!
//! This crate contains the core logic of the `techup` tool – a framework that
//! standardizes installing, updating and rolling back third-party technologies
//! (scripts, Node.js/Rust/Go tools) from their source repositories.
//!
//! `techup` keeps one clean clone per technology under the XDG data root,
//! installs it with a strategy picked from the project's markers, and updates
//! it through a backup/apply/verify/rollback cycle. Packages can additionally
//! be installed into independent local/user/system scopes and toggled via
//! symlink indirection.
//!
//! This library is built for the `techup` CLI, but you can also reuse it as a
//! backend in other tools.
//!
//! ## Modules Overview
//! - [`modules`] – Module registry and dependency loader with cycle detection
//! - [`privilege`] – Per-directory privilege decisions and elevated execution
//! - [`paths`] – XDG base-directory resolution
//! - [`manifest`] – Technology manifests, package manifests, sidecar configs
//! - [`target`] – Resolved installation targets (`init`)
//! - [`installer`] – Clean clones and install-strategy dispatch
//! - [`backup`] – Timestamped clone snapshots and retention
//! - [`update`] – Update/rollback orchestrator and its cross-process lock
//! - [`packages`] – Scoped package installation and enable/disable toggles
//! - [`shell`] / [`git`] – Synchronous external command plumbing
//! - [`error`] – Error taxonomy shared by all of the above
//! - [`util`] – Shared helpers (recursive copy, permissions, prompts)

pub mod backup;
pub mod error;
pub mod git;
pub mod installer;
pub mod manifest;
pub mod modules;
pub mod packages;
pub mod paths;
pub mod privilege;
pub mod shell;
pub mod target;
pub mod update;
pub mod util;

pub use backup::*;
pub use error::*;
pub use installer::*;
pub use manifest::*;
pub use modules::*;
pub use packages::*;
pub use paths::*;
pub use privilege::*;
pub use target::*;
pub use update::*;
pub use util::*;
