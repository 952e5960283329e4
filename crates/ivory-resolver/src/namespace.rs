//! Namespaces: bidirectional rewriting between the system identifier space and
//! a repository's local identifier space.
//!
//! A [`Namespace`] is an ordered list of [`NamespaceRule`]s. Each rule carries
//! at most one `fromsystem` and one `tosystem` transform; the two must be
//! inverses of each other for the round trip `to_system(from_system(m)) == m`
//! to hold. [`NamespaceRule::renaming`] builds such a pair by construction.

use std::collections::BTreeMap;

use regex::Regex;

use ivory_core::config::{FieldPattern, NamespaceConfig, NamespaceRuleConfig, TransformConfig};
use ivory_core::id::{ModuleId, ModuleRevisionId};
use ivory_util::errors::{IvoryError, IvoryResult};

/// Name of the identity namespace.
pub const SYSTEM_NAMESPACE: &str = "system";

/// A regex matched against a whole field and its replacement template.
#[derive(Debug, Clone)]
struct FieldRule {
    pattern: Regex,
    replacement: String,
}

impl FieldRule {
    fn new(from: &str, to: &str) -> IvoryResult<Self> {
        let pattern = Regex::new(&format!("^(?:{from})$")).map_err(|e| {
            IvoryError::config(format!("invalid namespace pattern '{from}': {e}"))
        })?;
        Ok(Self {
            pattern,
            replacement: to.to_string(),
        })
    }

    /// Matches `from` literally and replaces it with `to` literally.
    fn literal(from: &str, to: &str) -> IvoryResult<Self> {
        Self::new(&regex::escape(from), &to.replace('$', "$$"))
    }

    fn from_config(p: &FieldPattern) -> IvoryResult<Self> {
        Self::new(&p.from, &p.to)
    }

    fn apply(&self, value: &str) -> Option<String> {
        self.pattern
            .is_match(value)
            .then(|| self.pattern.replace(value, self.replacement.as_str()).into_owned())
    }
}

/// Per-field rewrite of a module revision id.
///
/// Fields without a pattern match anything and are left unchanged. A rule
/// applies only when every declared pattern matches; a branch pattern is only
/// consulted when the id has a branch, and attribute patterns only when the
/// attribute is present.
#[derive(Debug, Clone, Default)]
pub struct MridTransformationRule {
    organisation: Option<FieldRule>,
    module: Option<FieldRule>,
    revision: Option<FieldRule>,
    branch: Option<FieldRule>,
    attributes: BTreeMap<String, FieldRule>,
    rename_attributes: BTreeMap<String, String>,
}

impl MridTransformationRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn organisation(mut self, from: &str, to: &str) -> IvoryResult<Self> {
        self.organisation = Some(FieldRule::new(from, to)?);
        Ok(self)
    }

    pub fn module(mut self, from: &str, to: &str) -> IvoryResult<Self> {
        self.module = Some(FieldRule::new(from, to)?);
        Ok(self)
    }

    pub fn revision(mut self, from: &str, to: &str) -> IvoryResult<Self> {
        self.revision = Some(FieldRule::new(from, to)?);
        Ok(self)
    }

    pub fn branch(mut self, from: &str, to: &str) -> IvoryResult<Self> {
        self.branch = Some(FieldRule::new(from, to)?);
        Ok(self)
    }

    /// Rewrite the value of an extra attribute.
    pub fn attribute(mut self, name: &str, from: &str, to: &str) -> IvoryResult<Self> {
        self.attributes.insert(name.to_string(), FieldRule::new(from, to)?);
        Ok(self)
    }

    /// Rename an extra attribute key (after value rewrites).
    pub fn rename_attribute(mut self, from: &str, to: &str) -> Self {
        self.rename_attributes.insert(from.to_string(), to.to_string());
        self
    }

    pub fn from_config(config: &TransformConfig) -> IvoryResult<Self> {
        let opt = |p: &Option<FieldPattern>| p.as_ref().map(FieldRule::from_config).transpose();
        let mut attributes = BTreeMap::new();
        for (name, p) in &config.attributes {
            attributes.insert(name.clone(), FieldRule::from_config(p)?);
        }
        Ok(Self {
            organisation: opt(&config.organisation)?,
            module: opt(&config.module)?,
            revision: opt(&config.revision)?,
            branch: opt(&config.branch)?,
            attributes,
            rename_attributes: config.rename_attributes.clone(),
        })
    }

    /// Rewrite `mrid`, or `None` when the rule does not match it.
    pub fn transform(&self, mrid: &ModuleRevisionId) -> Option<ModuleRevisionId> {
        let field = |rule: &Option<FieldRule>, value: &str| match rule {
            Some(r) => r.apply(value),
            None => Some(value.to_string()),
        };

        let organisation = field(&self.organisation, mrid.organisation())?;
        let name = field(&self.module, mrid.name())?;
        let revision = field(&self.revision, &mrid.revision)?;
        let branch = match mrid.branch {
            Some(ref b) => Some(field(&self.branch, b)?),
            None => None,
        };

        let mut extra = BTreeMap::new();
        for (key, value) in &mrid.extra {
            let value = match self.attributes.get(key) {
                Some(rule) => rule.apply(value)?,
                None => value.clone(),
            };
            let key = self.rename_attributes.get(key).unwrap_or(key).clone();
            extra.insert(key, value);
        }

        Some(ModuleRevisionId {
            module: ModuleId::new(organisation, name),
            revision,
            branch,
            extra,
        })
    }
}

/// One rule of a namespace: an optional `fromsystem` transform and an
/// optional `tosystem` transform.
#[derive(Debug, Clone, Default)]
pub struct NamespaceRule {
    pub description: Option<String>,
    from_system: Option<MridTransformationRule>,
    to_system: Option<MridTransformationRule>,
}

impl NamespaceRule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the system → local transform. A rule holds only one; a second call
    /// fails and leaves the first in place.
    pub fn add_from_system(&mut self, rule: MridTransformationRule) -> IvoryResult<()> {
        if self.from_system.is_some() {
            return Err(IvoryError::config("only one fromsystem is allowed per rule").into());
        }
        self.from_system = Some(rule);
        Ok(())
    }

    /// Set the local → system transform. Same single-assignment rule as
    /// [`add_from_system`](Self::add_from_system).
    pub fn add_to_system(&mut self, rule: MridTransformationRule) -> IvoryResult<()> {
        if self.to_system.is_some() {
            return Err(IvoryError::config("only one tosystem is allowed per rule").into());
        }
        self.to_system = Some(rule);
        Ok(())
    }

    pub fn from_system(&self) -> Option<&MridTransformationRule> {
        self.from_system.as_ref()
    }

    pub fn to_system(&self) -> Option<&MridTransformationRule> {
        self.to_system.as_ref()
    }

    /// A rule renaming organisation and/or module literally, with the
    /// `tosystem` side the exact inverse of the `fromsystem` side.
    ///
    /// Each pair is `(system, local)`.
    pub fn renaming(
        organisation: Option<(&str, &str)>,
        module: Option<(&str, &str)>,
    ) -> IvoryResult<Self> {
        let mut from = MridTransformationRule::new();
        let mut to = MridTransformationRule::new();
        if let Some((system, local)) = organisation {
            from.organisation = Some(FieldRule::literal(system, local)?);
            to.organisation = Some(FieldRule::literal(local, system)?);
        }
        if let Some((system, local)) = module {
            from.module = Some(FieldRule::literal(system, local)?);
            to.module = Some(FieldRule::literal(local, system)?);
        }
        Ok(Self {
            description: None,
            from_system: Some(from),
            to_system: Some(to),
        })
    }

    /// Build a rule from settings. Duplicate transforms are reported as
    /// errors and the first one is kept.
    pub fn from_config(config: &NamespaceRuleConfig) -> IvoryResult<Self> {
        let mut rule = match config.rename {
            Some(ref rename) => Self::renaming(
                rename
                    .organisation
                    .as_ref()
                    .map(|p| (p.system.as_str(), p.local.as_str())),
                rename
                    .module
                    .as_ref()
                    .map(|p| (p.system.as_str(), p.local.as_str())),
            )?,
            None => Self::new(),
        };
        rule.description = config.description.clone();

        for t in &config.fromsystem {
            if let Err(e) = rule.add_from_system(MridTransformationRule::from_config(t)?) {
                tracing::error!("{e}");
            }
        }
        for t in &config.tosystem {
            if let Err(e) = rule.add_to_system(MridTransformationRule::from_config(t)?) {
                tracing::error!("{e}");
            }
        }
        Ok(rule)
    }
}

/// A named, ordered set of rules.
#[derive(Debug, Clone)]
pub struct Namespace {
    pub name: String,
    /// Apply every matching rule in sequence instead of stopping at the first.
    pub chain_rules: bool,
    rules: Vec<NamespaceRule>,
}

impl Namespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chain_rules: false,
            rules: Vec::new(),
        }
    }

    /// The identity namespace.
    pub fn system() -> Self {
        Self::new(SYSTEM_NAMESPACE)
    }

    pub fn with_rule(mut self, rule: NamespaceRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn add_rule(&mut self, rule: NamespaceRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[NamespaceRule] {
        &self.rules
    }

    pub fn is_identity(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn from_config(config: &NamespaceConfig) -> IvoryResult<Self> {
        let mut ns = Self::new(config.name.clone());
        ns.chain_rules = config.chain_rules;
        for rule in &config.rules {
            ns.add_rule(NamespaceRule::from_config(rule)?);
        }
        Ok(ns)
    }

    /// Rewrite a system-space id into this namespace's local space.
    pub fn from_system(&self, mrid: &ModuleRevisionId) -> ModuleRevisionId {
        self.apply(mrid, NamespaceRule::from_system)
    }

    /// Rewrite a local-space id back into the system space.
    pub fn to_system(&self, mrid: &ModuleRevisionId) -> ModuleRevisionId {
        self.apply(mrid, NamespaceRule::to_system)
    }

    /// Module-level form of [`from_system`](Self::from_system), used for listings.
    pub fn module_from_system(&self, module: &ModuleId) -> ModuleId {
        self.from_system(&module.at("")).module
    }

    pub fn module_to_system(&self, module: &ModuleId) -> ModuleId {
        self.to_system(&module.at("")).module
    }

    /// Fails when `mrid` does not survive a system → local → system round trip.
    pub fn check_round_trip(&self, mrid: &ModuleRevisionId) -> IvoryResult<()> {
        let local = self.from_system(mrid);
        let back = self.to_system(&local);
        if &back != mrid {
            return Err(IvoryError::config(format!(
                "namespace '{}' is not reversible: {mrid} -> {local} -> {back}",
                self.name
            ))
            .into());
        }
        Ok(())
    }

    fn apply(
        &self,
        mrid: &ModuleRevisionId,
        side: fn(&NamespaceRule) -> Option<&MridTransformationRule>,
    ) -> ModuleRevisionId {
        let mut current = mrid.clone();
        for rule in &self.rules {
            let Some(transform) = side(rule) else {
                continue;
            };
            if let Some(next) = transform.transform(&current) {
                current = next;
                if !self.chain_rules {
                    break;
                }
            }
        }
        current
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::system()
    }
}
