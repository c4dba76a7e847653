use std::path::PathBuf;
use thiserror::Error;

use crate::packages::Scope;

/// Errors raised while resolving and loading modules.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("module `{0}` is not registered")]
    ModuleNotFound(String),
    #[error("cyclic module dependency: {}", .path.join(" -> "))]
    CyclicDependency { path: Vec<String> },
    #[error("failed to load dependency `{dependency}` of module `{module}`")]
    DependencyLoad {
        module: String,
        dependency: String,
        #[source]
        source: Box<LoadError>,
    },
    #[error("init hook of module `{module}` failed: {reason}")]
    ModuleInit { module: String, reason: String },
}

/// Failure of a synchronous external command invocation.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{program}` exited with code {code:?}: {stderr}")]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
}

#[derive(Debug, Error)]
pub enum PrivilegeError {
    #[error(
        "insufficient privileges for `{}`: not writable and passwordless elevation unavailable",
        .dir.display()
    )]
    Insufficient { dir: PathBuf },
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors while producing a clean clone of a technology's source tree.
#[derive(Debug, Error)]
pub enum CloneError {
    #[error("cloning {url} into `{}` failed", .dest.display())]
    CloneFailed {
        url: String,
        dest: PathBuf,
        #[source]
        source: ExecError,
    },
    #[error("refreshing existing checkout `{}` failed", .dir.display())]
    RefreshFailed {
        dir: PathBuf,
        #[source]
        source: ExecError,
    },
    #[error("entry script `{script}` missing from fresh clone at `{}`", .dir.display())]
    MissingEntryScript { dir: PathBuf, script: String },
    #[error(
        "`{}` is the current working directory but not a checkout; refusing to replace it",
        .dir.display()
    )]
    CwdConflict { dir: PathBuf },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum InstallError {
    #[error(
        "no known project type in `{}`: no entry script, package.json, Cargo.toml or go.mod",
        .dir.display()
    )]
    UnknownProjectType { dir: PathBuf },
    #[error("required toolchain command `{tool}` is not available")]
    MissingToolchain { tool: String },
    #[error("{step} failed")]
    Step {
        step: String,
        #[source]
        source: ExecError,
    },
    #[error("could not determine entry point for `{}`", .dir.display())]
    NoEntryPoint { dir: PathBuf },
    #[error(transparent)]
    Privilege(#[from] PrivilegeError),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

/// Fatal failure while snapshotting the clone directory.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("nothing to back up: clone directory `{}` does not exist", .0.display())]
    MissingSource(PathBuf),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("another update is already running (lock file at `{}`)", .path.display())]
    LockHeld { path: PathBuf },
    #[error("`{}` has no clone to update; run install first", .0.display())]
    MissingClone(PathBuf),
    #[error("backup operation failed: {0}")]
    Backup(#[from] BackupError),
    #[error("rollback impossible: no backup available")]
    NoBackup,
    #[error(transparent)]
    Install(#[from] InstallError),
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("unsupported package url `{0}` (expected gh:, gl:, https:// or file://)")]
    UnsupportedUrl(String),
    #[error("package `{name}` is already installed in {scope} scope; remove it first")]
    AlreadyInstalled { name: String, scope: Scope },
    #[error("package `{name}` is not installed in {scope} scope")]
    NotInstalled { name: String, scope: Scope },
    #[error("{hook} hook of package `{name}` failed")]
    Hook {
        name: String,
        hook: String,
        #[source]
        source: ExecError,
    },
    #[error(transparent)]
    Privilege(#[from] PrivilegeError),
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

/// Validation failure while constructing an installation target.
#[derive(Debug, Error)]
pub enum TargetError {
    #[error("installation target field `{0}` must not be empty")]
    EmptyField(&'static str),
}
