//! The engine context: named namespaces, latest strategies and conflict
//! managers, with the engine-wide defaults.
//!
//! Resolvers receive the context explicitly (see
//! [`ResolverBase::bind`](crate::resolver::ResolverBase::bind)); nothing here
//! is global.

use std::collections::HashMap;
use std::sync::Arc;

use globset::{Glob, GlobMatcher};

use ivory_core::config::{EngineConfig, ModuleRule};
use ivory_core::id::ModuleId;
use ivory_util::errors::{IvoryError, IvoryResult};

use crate::conflict::{builtin_conflict_managers, ConflictManager, LatestRevisionConflictManager};
use crate::latest::{builtin_strategies, LatestRevisionStrategy, LatestStrategy};
use crate::namespace::Namespace;

/// A `[[module]]` rule with compiled glob patterns.
#[derive(Debug, Clone)]
struct ModuleRouting {
    organisation: GlobMatcher,
    name: GlobMatcher,
    resolver: Option<String>,
    conflict_manager: Option<String>,
}

impl ModuleRouting {
    fn compile(rule: &ModuleRule) -> IvoryResult<Self> {
        Ok(Self {
            organisation: compile_glob(&rule.organisation)?,
            name: compile_glob(&rule.name)?,
            resolver: rule.resolver.clone(),
            conflict_manager: rule.conflict_manager.clone(),
        })
    }

    fn matches(&self, module: &ModuleId) -> bool {
        self.organisation.is_match(&module.organisation) && self.name.is_match(&module.name)
    }
}

/// Compile a glob used to match organisation or module names.
pub fn compile_glob(pattern: &str) -> IvoryResult<GlobMatcher> {
    Glob::new(pattern)
        .map(|g| g.compile_matcher())
        .map_err(|e| IvoryError::config(format!("invalid pattern '{pattern}': {e}")).into())
}

/// Registries shared by every resolver of an engine.
#[derive(Debug, Clone)]
pub struct EngineContext {
    namespaces: HashMap<String, Arc<Namespace>>,
    strategies: HashMap<String, Arc<dyn LatestStrategy>>,
    conflict_managers: HashMap<String, Arc<dyn ConflictManager>>,
    default_strategy: Arc<dyn LatestStrategy>,
    default_conflict_manager: Arc<dyn ConflictManager>,
    system: Arc<Namespace>,
    modules: Vec<ModuleRouting>,
    validate: bool,
}

impl Default for EngineContext {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineContext {
    /// Built-in strategies and managers, `latest-revision` defaults, no namespaces.
    pub fn new() -> Self {
        Self {
            namespaces: HashMap::new(),
            strategies: builtin_strategies()
                .into_iter()
                .map(|s| (s.name().to_string(), s))
                .collect(),
            conflict_managers: builtin_conflict_managers()
                .into_iter()
                .map(|m| (m.name().to_string(), m))
                .collect(),
            default_strategy: Arc::new(LatestRevisionStrategy),
            default_conflict_manager: Arc::new(LatestRevisionConflictManager),
            system: Arc::new(Namespace::system()),
            modules: Vec::new(),
            validate: true,
        }
    }

    /// Build the context described by the settings file.
    ///
    /// Unknown default strategy or conflict manager names are logged and the
    /// built-in default is kept. Invalid patterns are errors.
    pub fn from_config(config: &EngineConfig) -> IvoryResult<Self> {
        let mut ctx = Self::new();
        for ns in &config.namespaces {
            ctx.add_namespace(Namespace::from_config(ns)?);
        }
        for rule in &config.modules {
            ctx.modules.push(ModuleRouting::compile(rule)?);
        }

        let settings = &config.settings;
        match ctx.latest_strategy(&settings.default_latest_strategy) {
            Some(s) => ctx.default_strategy = s,
            None => tracing::error!(
                "unknown latest strategy: {}, using {}",
                settings.default_latest_strategy,
                ctx.default_strategy.name()
            ),
        }
        match ctx.conflict_manager(&settings.default_conflict_manager) {
            Some(m) => ctx.default_conflict_manager = m,
            None => tracing::error!(
                "unknown conflict manager: {}, using {}",
                settings.default_conflict_manager,
                ctx.default_conflict_manager.name()
            ),
        }
        ctx.validate = settings.validate;
        Ok(ctx)
    }

    pub fn add_namespace(&mut self, namespace: Namespace) {
        self.namespaces
            .insert(namespace.name.clone(), Arc::new(namespace));
    }

    pub fn add_latest_strategy(&mut self, strategy: Arc<dyn LatestStrategy>) {
        self.strategies.insert(strategy.name().to_string(), strategy);
    }

    pub fn add_conflict_manager(&mut self, manager: Arc<dyn ConflictManager>) {
        self.conflict_managers
            .insert(manager.name().to_string(), manager);
    }

    pub fn set_default_latest_strategy(&mut self, strategy: Arc<dyn LatestStrategy>) {
        self.default_strategy = strategy;
    }

    pub fn set_default_conflict_manager(&mut self, manager: Arc<dyn ConflictManager>) {
        self.default_conflict_manager = manager;
    }

    pub fn set_validate(&mut self, validate: bool) {
        self.validate = validate;
    }

    pub fn namespace(&self, name: &str) -> Option<Arc<Namespace>> {
        self.namespaces.get(name).cloned()
    }

    pub fn system_namespace(&self) -> Arc<Namespace> {
        self.system.clone()
    }

    pub fn latest_strategy(&self, name: &str) -> Option<Arc<dyn LatestStrategy>> {
        self.strategies.get(name).cloned()
    }

    pub fn default_latest_strategy(&self) -> Arc<dyn LatestStrategy> {
        self.default_strategy.clone()
    }

    pub fn conflict_manager(&self, name: &str) -> Option<Arc<dyn ConflictManager>> {
        self.conflict_managers.get(name).cloned()
    }

    pub fn default_conflict_manager(&self) -> Arc<dyn ConflictManager> {
        self.default_conflict_manager.clone()
    }

    /// Ambient validation flag for resolvers that leave theirs unset.
    pub fn validate(&self) -> bool {
        self.validate
    }

    /// Conflict manager named by the first `[[module]]` rule matching `module`.
    pub fn module_conflict_manager(&self, module: &ModuleId) -> Option<Arc<dyn ConflictManager>> {
        let name = self
            .modules
            .iter()
            .filter(|r| r.matches(module))
            .find_map(|r| r.conflict_manager.as_deref())?;
        let manager = self.conflict_manager(name);
        if manager.is_none() {
            tracing::error!("unknown conflict manager: {name} (module rule for {module})");
        }
        manager
    }

    /// Resolver named by the first `[[module]]` rule matching `module`.
    pub fn module_resolver(&self, module: &ModuleId) -> Option<&str> {
        self.modules
            .iter()
            .filter(|r| r.matches(module))
            .find_map(|r| r.resolver.as_deref())
    }

    /// Names of the registered namespaces, strategies and managers, sorted.
    pub fn names(&self) -> (Vec<String>, Vec<String>, Vec<String>) {
        let sorted = |mut v: Vec<String>| {
            v.sort();
            v
        };
        (
            sorted(self.namespaces.keys().cloned().collect()),
            sorted(self.strategies.keys().cloned().collect()),
            sorted(self.conflict_managers.keys().cloned().collect()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_latest_revision() {
        let ctx = EngineContext::new();
        assert_eq!(ctx.default_latest_strategy().name(), "latest-revision");
        assert_eq!(ctx.default_conflict_manager().name(), "latest-revision");
        assert!(ctx.latest_strategy("latest-lexico").is_some());
        assert!(ctx.conflict_manager("strict").is_some());
        assert!(ctx.validate());
    }

    #[test]
    fn from_config_applies_settings() {
        let config = EngineConfig::from_str(
            r#"
[settings]
default-latest-strategy = "latest-time"
default-conflict-manager = "all"
validate = false

[[namespace]]
name = "maven"

[[module]]
org = "org.legacy*"
conflict-manager = "strict"
resolver = "old"
"#,
        )
        .unwrap();
        let ctx = EngineContext::from_config(&config).unwrap();
        assert_eq!(ctx.default_latest_strategy().name(), "latest-time");
        assert_eq!(ctx.default_conflict_manager().name(), "all");
        assert!(!ctx.validate());
        assert!(ctx.namespace("maven").is_some());

        let legacy = ModuleId::new("org.legacy.core", "x");
        assert_eq!(ctx.module_conflict_manager(&legacy).unwrap().name(), "strict");
        assert_eq!(ctx.module_resolver(&legacy), Some("old"));
        assert!(ctx.module_resolver(&ModuleId::new("org.other", "x")).is_none());
    }

    #[test]
    fn unknown_defaults_fall_back() {
        let config = EngineConfig::from_str(
            r#"
[settings]
default-latest-strategy = "nope"
default-conflict-manager = "nope"
"#,
        )
        .unwrap();
        let ctx = EngineContext::from_config(&config).unwrap();
        assert_eq!(ctx.default_latest_strategy().name(), "latest-revision");
        assert_eq!(ctx.default_conflict_manager().name(), "latest-revision");
    }

    #[test]
    fn invalid_glob_is_an_error() {
        let config = EngineConfig::from_str(
            r#"
[[module]]
org = "[unclosed"
"#,
        )
        .unwrap();
        assert!(EngineContext::from_config(&config).is_err());
    }
}
