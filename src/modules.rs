//! Module registry and dependency loader.
//!
//! The registry is a static table of [`ModuleDescriptor`]s built at
//! startup; the [`Loader`] resolves a requested module depth-first,
//! dependencies before dependents, running each module's one-time init
//! hook on first load. Loader state is owned per instance, so several
//! independent loaders can coexist in one process.

use tracing::debug;

use crate::error::LoadError;
use crate::paths::XdgDirs;

type InitHook = Box<dyn Fn() -> Result<(), String>>;

pub struct ModuleDescriptor {
    pub name: String,
    pub dependencies: Vec<String>,
    init: Option<InitHook>,
}

impl ModuleDescriptor {
    pub fn new(name: &str, dependencies: &[&str]) -> Self {
        ModuleDescriptor {
            name: name.to_string(),
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
            init: None,
        }
    }

    pub fn with_init(
        name: &str,
        dependencies: &[&str],
        init: impl Fn() -> Result<(), String> + 'static,
    ) -> Self {
        ModuleDescriptor {
            init: Some(Box::new(init)),
            ..Self::new(name, dependencies)
        }
    }
}

impl std::fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("has_init", &self.init.is_some())
            .finish()
    }
}

/// The set of known modules. Fixed after construction.
#[derive(Debug, Default)]
pub struct Registry {
    modules: Vec<ModuleDescriptor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: ModuleDescriptor) {
        self.modules.push(descriptor);
    }

    pub fn get(&self, name: &str) -> Option<&ModuleDescriptor> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// The builtin module table. Dependency lists are declared here as
    /// literal data, not discovered at runtime.
    pub fn builtin() -> Self {
        let mut registry = Registry::new();
        registry.register(ModuleDescriptor::new("core", &[]));
        registry.register(ModuleDescriptor::with_init("config", &["core"], || {
            let dirs = XdgDirs::resolve();
            std::fs::create_dir_all(dirs.config_root())
                .and_then(|_| std::fs::create_dir_all(dirs.state_root()))
                .map_err(|e| format!("preparing config/state roots: {e}"))
        }));
        registry.register(ModuleDescriptor::new("privilege", &["core"]));
        registry.register(ModuleDescriptor::new("vcs", &["core"]));
        registry.register(ModuleDescriptor::new(
            "install",
            &["config", "privilege", "vcs"],
        ));
        registry.register(ModuleDescriptor::new("backup", &["config"]));
        registry.register(ModuleDescriptor::new("update", &["install", "backup"]));
        registry.register(ModuleDescriptor::new(
            "packages",
            &["config", "privilege", "vcs"],
        ));
        registry.register(ModuleDescriptor::new("cli", &["config"]));
        registry
    }
}

/// Per-invocation loader state. `loaded` only ever grows, and a module
/// enters it only after its init hook has succeeded.
pub struct Loader<'r> {
    registry: &'r Registry,
    loaded: Vec<String>,
    visiting: Vec<String>,
}

impl<'r> Loader<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Loader {
            registry,
            loaded: Vec::new(),
            visiting: Vec::new(),
        }
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.iter().any(|m| m == name)
    }

    /// Loaded module names in load order.
    pub fn loaded(&self) -> &[String] {
        &self.loaded
    }

    /// Loads `name` and its transitive dependencies, depth-first in
    /// declaration order. Idempotent for already-loaded modules; a
    /// revisit while still resolving is a cycle and fails fast.
    pub fn load(&mut self, name: &str) -> Result<(), LoadError> {
        if self.is_loaded(name) {
            return Ok(());
        }
        if let Some(pos) = self.visiting.iter().position(|m| m == name) {
            let mut path: Vec<String> = self.visiting[pos..].to_vec();
            path.push(name.to_string());
            return Err(LoadError::CyclicDependency { path });
        }

        let registry = self.registry;
        let descriptor = registry
            .get(name)
            .ok_or_else(|| LoadError::ModuleNotFound(name.to_string()))?;

        self.visiting.push(name.to_string());
        for dep in &descriptor.dependencies {
            if let Err(e) = self.load(dep) {
                self.visiting.pop();
                return Err(LoadError::DependencyLoad {
                    module: name.to_string(),
                    dependency: dep.clone(),
                    source: Box::new(e),
                });
            }
        }
        self.visiting.pop();

        if let Some(init) = &descriptor.init {
            init().map_err(|reason| LoadError::ModuleInit {
                module: name.to_string(),
                reason,
            })?;
        }
        self.loaded.push(name.to_string());
        debug!(module = name, "module loaded");
        Ok(())
    }

    /// Loads each named module in order, short-circuiting on the first
    /// failure.
    pub fn load_many(&mut self, names: &[&str]) -> Result<(), LoadError> {
        for name in names {
            self.load(name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn chain_registry() -> Registry {
        // cli -> config -> core
        let mut registry = Registry::new();
        registry.register(ModuleDescriptor::new("core", &[]));
        registry.register(ModuleDescriptor::new("config", &["core"]));
        registry.register(ModuleDescriptor::new("cli", &["config"]));
        registry
    }

    #[test]
    fn loads_dependencies_before_dependents_in_order() {
        let registry = chain_registry();
        let mut loader = Loader::new(&registry);
        loader.load("cli").unwrap();
        assert_eq!(loader.loaded(), &["core", "config", "cli"]);
    }

    #[test]
    fn load_is_idempotent_and_runs_init_once() {
        let counter = Rc::new(Cell::new(0));
        let seen = counter.clone();
        let mut registry = Registry::new();
        registry.register(ModuleDescriptor::with_init("core", &[], move || {
            seen.set(seen.get() + 1);
            Ok(())
        }));

        let mut loader = Loader::new(&registry);
        loader.load("core").unwrap();
        loader.load("core").unwrap();
        assert_eq!(counter.get(), 1);
        assert_eq!(loader.loaded(), &["core"]);
    }

    #[test]
    fn missing_module_is_reported() {
        let registry = chain_registry();
        let mut loader = Loader::new(&registry);
        match loader.load("nope") {
            Err(LoadError::ModuleNotFound(name)) => assert_eq!(name, "nope"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn missing_dependency_propagates_as_dependency_load() {
        let mut registry = Registry::new();
        registry.register(ModuleDescriptor::new("top", &["gone"]));
        let mut loader = Loader::new(&registry);
        match loader.load("top") {
            Err(LoadError::DependencyLoad {
                module,
                dependency,
                source,
            }) => {
                assert_eq!(module, "top");
                assert_eq!(dependency, "gone");
                assert!(matches!(*source, LoadError::ModuleNotFound(_)));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn cycle_fails_fast_with_the_cycle_path() {
        let mut registry = Registry::new();
        registry.register(ModuleDescriptor::new("a", &["b"]));
        registry.register(ModuleDescriptor::new("b", &["a"]));
        let mut loader = Loader::new(&registry);
        match loader.load("a") {
            Err(LoadError::DependencyLoad { source, .. }) => {
                // unwrap the wrapping layers down to the cycle itself
                let mut inner: &LoadError = &source;
                while let LoadError::DependencyLoad { source, .. } = inner {
                    inner = source;
                }
                match inner {
                    LoadError::CyclicDependency { path } => {
                        assert_eq!(path, &["a", "b", "a"]);
                    }
                    other => panic!("unexpected: {other:?}"),
                }
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(loader.loaded().is_empty());
    }

    #[test]
    fn failed_init_leaves_module_unloaded_and_retryable() {
        let attempts = Rc::new(Cell::new(0));
        let seen = attempts.clone();
        let mut registry = Registry::new();
        registry.register(ModuleDescriptor::with_init("flaky", &[], move || {
            seen.set(seen.get() + 1);
            if seen.get() == 1 {
                Err("first attempt fails".to_string())
            } else {
                Ok(())
            }
        }));

        let mut loader = Loader::new(&registry);
        assert!(matches!(
            loader.load("flaky"),
            Err(LoadError::ModuleInit { .. })
        ));
        assert!(!loader.is_loaded("flaky"));

        // a retry runs the hook again instead of treating it as loaded
        loader.load("flaky").unwrap();
        assert!(loader.is_loaded("flaky"));
        assert_eq!(attempts.get(), 2);
    }

    #[test]
    fn load_many_short_circuits() {
        let registry = chain_registry();
        let mut loader = Loader::new(&registry);
        let result = loader.load_many(&["config", "missing", "cli"]);
        assert!(result.is_err());
        assert_eq!(loader.loaded(), &["core", "config"]);
    }

    #[test]
    fn diamond_dependencies_initialize_once() {
        // top -> left, right; both -> base
        let count = Rc::new(Cell::new(0));
        let seen = count.clone();
        let mut registry = Registry::new();
        registry.register(ModuleDescriptor::with_init("base", &[], move || {
            seen.set(seen.get() + 1);
            Ok(())
        }));
        registry.register(ModuleDescriptor::new("left", &["base"]));
        registry.register(ModuleDescriptor::new("right", &["base"]));
        registry.register(ModuleDescriptor::new("top", &["left", "right"]));

        let mut loader = Loader::new(&registry);
        loader.load("top").unwrap();
        assert_eq!(count.get(), 1);
        assert_eq!(loader.loaded(), &["base", "left", "right", "top"]);
    }

    #[test]
    fn builtin_registry_resolves_update_chain() {
        let registry = Registry::builtin();
        let descriptor = registry.get("update").unwrap();
        assert_eq!(descriptor.dependencies, &["install", "backup"]);
    }
}
