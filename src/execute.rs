use anyhow::{Context, Result, bail};
use colored::Colorize;

use techup::backup;
use techup::installer;
use techup::manifest::{TECH_MANIFEST_FILE, TechManifest};
use techup::modules::{Loader, Registry};
use techup::packages::{EnabledState, PackageStore, ToggleOutcome, parse_package_url};
use techup::paths::XdgDirs;
use techup::target::InstallationTarget;
use techup::update::{self, RollbackOutcome, UpdateOutcome};
use techup::git;

use crate::cli::{CLI, PkgCommand, TechCommand};

/// Capability table: which modules each operation needs, resolved
/// before dispatch instead of probed reactively.
fn required_modules(command: &TechCommand) -> &'static [&'static str] {
    match command {
        TechCommand::Init { .. } => &["cli", "config"],
        TechCommand::Install { .. } => &["cli", "install"],
        TechCommand::Update { .. } | TechCommand::Rollback { .. } => &["cli", "update"],
        TechCommand::Status { .. } => &["cli", "backup"],
        TechCommand::Pkg { .. } => &["cli", "packages"],
    }
}

pub fn execute(cli: CLI) -> Result<()> {
    let registry = Registry::builtin();
    let mut loader = Loader::new(&registry);
    loader
        .load_many(required_modules(&cli.command))
        .context("loading required modules")?;

    match cli.command {
        TechCommand::Init {
            name,
            repo,
            script,
            description,
        } => execute_init(&name, &repo, &script, &description),
        TechCommand::Install { name } => execute_install(&name),
        TechCommand::Update { name } => execute_update(&name),
        TechCommand::Rollback { name, version, yes } => {
            execute_rollback(&name, version.as_deref(), yes)
        }
        TechCommand::Status { name } => execute_status(&name),
        TechCommand::Pkg { command } => execute_pkg(command),
    }
}

fn load_target(name: &str) -> Result<InstallationTarget> {
    let xdg = XdgDirs::resolve();
    let manifest_path = xdg.config_root().join(name).join(TECH_MANIFEST_FILE);
    if !manifest_path.exists() {
        bail!("technology `{name}` is not registered. Run `techup init {name}` first.");
    }
    let manifest = TechManifest::load(&manifest_path)
        .with_context(|| format!("reading {}", manifest_path.display()))?;
    Ok(InstallationTarget::from_manifest(&manifest, &xdg)?)
}

fn execute_init(name: &str, repo: &str, script: &str, description: &str) -> Result<()> {
    let xdg = XdgDirs::resolve();
    let target = InstallationTarget::init(name, repo, script, description, &xdg)?;
    target.ensure_dirs()?;

    let manifest = TechManifest::new(name, repo, script, description);
    let manifest_path = target.config_dir.join(TECH_MANIFEST_FILE);
    manifest.save(&manifest_path)?;

    println!("{} registered `{}`", "ok:".green().bold(), name);
    println!("  manifest: {}", manifest_path.display());
    println!("  clone:    {}", target.clone_dir.display());
    println!("  artifact: {}", target.install_path().display());
    Ok(())
}

fn execute_install(name: &str) -> Result<()> {
    let target = load_target(name)?;
    target.ensure_dirs()?;

    installer::ensure_clean_clone(&target)
        .with_context(|| format!("cloning `{}`", target.repo_url))?;
    let kind = installer::install_from_clone(&target)
        .with_context(|| format!("installing `{name}`"))?;
    installer::warn_unless_verified(&target.install_path());

    println!(
        "{} installed `{}` ({}) to {}",
        "ok:".green().bold(),
        name,
        kind,
        target.install_path().display()
    );
    Ok(())
}

fn execute_update(name: &str) -> Result<()> {
    let target = load_target(name)?;
    match update::run_update(&target)? {
        UpdateOutcome::UpToDate => {
            println!("{} `{}` is already up to date", "ok:".green().bold(), name);
        }
        UpdateOutcome::Updated => {
            println!("{} `{}` updated and verified", "ok:".green().bold(), name);
        }
        UpdateOutcome::RolledBack => {
            println!(
                "{} update of `{}` failed verification; previous state restored",
                "warning:".yellow().bold(),
                name
            );
        }
    }
    Ok(())
}

fn execute_rollback(name: &str, version: Option<&str>, yes: bool) -> Result<()> {
    let target = load_target(name)?;
    match update::rollback(&target, version, yes)? {
        RollbackOutcome::Aborted => {
            println!("aborted");
        }
        RollbackOutcome::RestoredBackup => {
            println!(
                "{} `{}` restored from the most recent backup",
                "ok:".green().bold(),
                name
            );
        }
        RollbackOutcome::CheckedOut(rev) => {
            println!("{} `{}` rolled back to {}", "ok:".green().bold(), name, rev);
        }
    }
    Ok(())
}

fn execute_status(name: &str) -> Result<()> {
    let target = load_target(name)?;
    println!("{name}: {}", target.service_description);
    println!("  repository: {}", target.repo_url);

    let artifact = target.install_path();
    if artifact.is_file() {
        println!("  artifact:   {} {}", artifact.display(), "(installed)".green());
    } else {
        println!("  artifact:   {}", "not installed".yellow());
    }

    if git::is_checkout(&target.clone_dir) {
        match git::local_rev(&target.clone_dir) {
            Ok(rev) => println!("  clone:      {} @ {}", target.clone_dir.display(), rev),
            Err(_) => println!("  clone:      {}", target.clone_dir.display()),
        }
    } else {
        println!("  clone:      {}", "missing".yellow());
    }

    let backups = backup::list(&target)?;
    println!("  backups:    {}", backups.len());
    if let Some(latest) = backups.last() {
        println!("  latest:     {}", latest.timestamp);
    }
    Ok(())
}

fn execute_pkg(command: PkgCommand) -> Result<()> {
    let xdg = XdgDirs::resolve();
    let project_root = std::env::current_dir()?;

    match command {
        PkgCommand::Install { url, scope } => {
            let parsed = parse_package_url(&url)?;
            let store = PackageStore::for_scope(scope, &xdg, &project_root);
            store.install(&parsed)?;
            println!(
                "{} installed `{}` into {} scope (enabled)",
                "ok:".green().bold(),
                parsed.name,
                scope
            );
        }
        PkgCommand::Remove { name, scope } => {
            let store = PackageStore::for_scope(scope, &xdg, &project_root);
            store.remove(&name)?;
            println!("{} removed `{}` from {} scope", "ok:".green().bold(), name, scope);
        }
        PkgCommand::Enable { name, scope } => {
            let store = PackageStore::for_scope(scope, &xdg, &project_root);
            match store.enable(&name)? {
                ToggleOutcome::Changed => {
                    println!("{} enabled `{}`", "ok:".green().bold(), name);
                }
                ToggleOutcome::AlreadyInState => {
                    println!("`{name}` is already enabled");
                }
            }
        }
        PkgCommand::Disable { name, scope } => {
            let store = PackageStore::for_scope(scope, &xdg, &project_root);
            match store.disable(&name)? {
                ToggleOutcome::Changed => {
                    println!("{} disabled `{}`", "ok:".green().bold(), name);
                }
                ToggleOutcome::AlreadyInState => {
                    println!("`{name}` is already disabled");
                }
            }
        }
        PkgCommand::List { scope } => {
            let store = PackageStore::for_scope(scope, &xdg, &project_root);
            let statuses = store.list()?;
            if statuses.is_empty() {
                println!("no packages in {scope} scope");
                return Ok(());
            }
            for status in statuses {
                let state = match status.state {
                    EnabledState::Enabled => "enabled".green(),
                    EnabledState::Disabled => "disabled".normal(),
                    EnabledState::Stale => "stale link".red(),
                };
                let version = if status.version.is_empty() {
                    String::new()
                } else {
                    format!(" {}", status.version)
                };
                println!("{}{} [{}]", status.name, version, state);
            }
        }
    }
    Ok(())
}
