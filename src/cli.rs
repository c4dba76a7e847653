use clap::{Parser, Subcommand};

use techup::packages::Scope;

#[derive(Debug, Parser, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct CLI {
    #[command(subcommand)]
    pub(crate) command: TechCommand,
}

#[derive(Debug, Subcommand, Clone, PartialEq)]
pub enum TechCommand {
    /// Registers a technology: writes its manifest and prepares its directories
    Init {
        name: String,
        /// Clone URL of the technology's source repository
        #[clap(long)]
        repo: String,
        /// Entry script relative to the clone root (for script-type installs)
        #[clap(long)]
        script: String,
        #[clap(long, default_value = "")]
        description: String,
    },
    /// Produces a clean clone and installs the technology
    Install {
        name: String,
    },
    /// Checks for upstream changes and applies them with backup and rollback
    Update {
        name: String,
    },
    /// Restores a previous state: a named revision, or the latest backup
    Rollback {
        name: String,
        /// VCS revision to check out; the latest backup is used when omitted
        version: Option<String>,
        /// Skip the confirmation prompt
        #[clap(short, long)]
        yes: bool,
    },
    /// Shows manifest, artifact, clone and backup state of a technology
    Status {
        name: String,
    },
    /// Manages scoped add-on packages
    Pkg {
        #[command(subcommand)]
        command: PkgCommand,
    },
}

#[derive(Debug, Subcommand, Clone, PartialEq)]
pub enum PkgCommand {
    /// Installs a package from gh:/gl: shorthand, an https URL or file://
    Install {
        url: String,
        #[clap(long, value_enum, default_value_t = Scope::User)]
        scope: Scope,
    },
    /// Uninstalls a package (disable, then delete its root)
    Remove {
        name: String,
        #[clap(long, value_enum, default_value_t = Scope::User)]
        scope: Scope,
    },
    /// Creates the enabled-link for an installed package
    Enable {
        name: String,
        #[clap(long, value_enum, default_value_t = Scope::User)]
        scope: Scope,
    },
    /// Removes the enabled-link; the package stays installed
    Disable {
        name: String,
        #[clap(long, value_enum, default_value_t = Scope::User)]
        scope: Scope,
    },
    /// Lists packages in a scope, flagging stale enabled-links
    List {
        #[clap(long, value_enum, default_value_t = Scope::User)]
        scope: Scope,
    },
}
