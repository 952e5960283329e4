//! Module descriptors: configurations, dependencies, artifacts and metadata.
//!
//! Descriptors are produced by a repository backend (a `module.toml` file or a
//! Maven POM) and consumed by the resolve engine. This module also reads the
//! TOML module file format.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;
use crate::id::{ModuleId, ModuleRevisionId};

/// Name of the configuration a module has when it declares none.
pub const DEFAULT_CONF: &str = "default";

/// Known module statuses, from least to most mature.
pub const STATUSES: [&str; 3] = ["integration", "milestone", "release"];

/// Position of a status in [`STATUSES`]; unknown statuses rank lowest.
pub fn status_rank(status: &str) -> usize {
    STATUSES.iter().position(|s| *s == status).unwrap_or(0)
}

/// A license declared by a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// A named subset of a module's dependencies and artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    pub name: String,
    #[serde(default)]
    pub extends: Vec<String>,
    /// Private configurations are not reachable through `*` from callers.
    #[serde(default = "default_public")]
    pub public: bool,
}

fn default_public() -> bool {
    true
}

impl Configuration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extends: Vec::new(),
            public: true,
        }
    }

    pub fn extending(mut self, parents: &[&str]) -> Self {
        self.extends = parents.iter().map(|p| p.to_string()).collect();
        self
    }
}

/// Maps the caller's configurations to the dependency's configurations.
///
/// Written `a,b->c;d->e`. `*` on the left matches every caller configuration;
/// `*` on the right means every public configuration of the dependency; `@`
/// on the right means the configuration with the caller's name. A side with no
/// arrow maps to itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfMapping {
    entries: BTreeMap<String, Vec<String>>,
}

impl ConfMapping {
    /// The mapping used when a dependency declares none: `*->*`.
    pub fn all() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert("*".to_string(), vec!["*".to_string()]);
        Self { entries }
    }

    pub fn parse(spec: &str) -> Self {
        let mut mapping = Self::default();
        for part in spec.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (lhs, rhs) = part.split_once("->").unwrap_or((part, part));
            let targets: Vec<String> = rhs
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
            for source in lhs.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                mapping.add(source, targets.clone());
            }
        }
        mapping
    }

    pub fn add(&mut self, caller_conf: &str, dependency_confs: Vec<String>) {
        let slot = self.entries.entry(caller_conf.to_string()).or_default();
        for conf in dependency_confs {
            if !slot.contains(&conf) {
                slot.push(conf);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dependency configurations requested from the given caller configuration.
    ///
    /// `@` is substituted with the caller configuration; `*` is returned as is
    /// and expanded against the dependency's descriptor later.
    pub fn targets(&self, caller_conf: &str) -> Vec<String> {
        let mut out = Vec::new();
        for key in [caller_conf, "*"] {
            if let Some(targets) = self.entries.get(key) {
                for t in targets {
                    let t = if t == "@" { caller_conf } else { t.as_str() };
                    if !out.iter().any(|o: &String| o == t) {
                        out.push(t.to_string());
                    }
                }
            }
        }
        out
    }

    /// Caller configurations this mapping mentions, `*` included.
    pub fn caller_confs(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl std::fmt::Display for ConfMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .entries
            .iter()
            .map(|(k, v)| format!("{k}->{}", v.join(",")))
            .collect();
        f.write_str(&parts.join(";"))
    }
}

/// A dependency declared by a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyDescriptor {
    /// The identifier as written by the declaring module (possibly dynamic).
    pub asked: ModuleRevisionId,
    #[serde(default = "ConfMapping::all")]
    pub mapping: ConfMapping,
    /// Extra attributes on the declaration itself (not on the target module).
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
    /// Forced dependencies win conflicts regardless of the conflict manager.
    #[serde(default)]
    pub force: bool,
    /// Whether the dependency's own dependencies are followed.
    #[serde(default = "default_public")]
    pub transitive: bool,
}

impl DependencyDescriptor {
    pub fn new(asked: ModuleRevisionId) -> Self {
        Self {
            asked,
            mapping: ConfMapping::all(),
            extra: BTreeMap::new(),
            force: false,
            transitive: true,
        }
    }

    pub fn with_mapping(mut self, spec: &str) -> Self {
        self.mapping = ConfMapping::parse(spec);
        self
    }
}

/// A conflict manager override declared by a module for matching dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRule {
    /// Glob pattern on the organisation.
    #[serde(default = "match_all")]
    pub organisation: String,
    /// Glob pattern on the module name.
    #[serde(default = "match_all")]
    pub module: String,
    pub manager: String,
}

fn match_all() -> String {
    "*".to_string()
}

/// Everything known about one module revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    pub id: ModuleRevisionId,
    pub status: String,
    pub publication: Option<DateTime<Utc>>,
    pub home_page: Option<String>,
    pub description: Option<String>,
    pub licenses: Vec<License>,
    pub configurations: Vec<Configuration>,
    pub dependencies: Vec<DependencyDescriptor>,
    pub artifacts: Vec<Artifact>,
    pub conflict_rules: Vec<ConflictRule>,
    /// Extra attributes declared on the module itself.
    pub extra: BTreeMap<String, String>,
    /// True when synthesised because the repository had no descriptor.
    pub default: bool,
}

impl ModuleDescriptor {
    pub fn new(id: ModuleRevisionId) -> Self {
        Self {
            extra: id.extra.clone(),
            id,
            status: STATUSES[0].to_string(),
            publication: None,
            home_page: None,
            description: None,
            licenses: Vec::new(),
            configurations: Vec::new(),
            dependencies: Vec::new(),
            artifacts: Vec::new(),
            conflict_rules: Vec::new(),
            default: false,
        }
    }

    /// Descriptor for a module that has artifacts but no descriptor file.
    pub fn synthesised(id: ModuleRevisionId) -> Self {
        let mut md = Self::new(id);
        md.default = true;
        md
    }

    pub fn module_id(&self) -> &ModuleId {
        self.id.module_id()
    }

    /// Declared configuration names, or `default` when none are declared.
    pub fn configuration_names(&self) -> Vec<String> {
        if self.configurations.is_empty() {
            return vec![DEFAULT_CONF.to_string()];
        }
        self.configurations.iter().map(|c| c.name.clone()).collect()
    }

    pub fn configuration(&self, name: &str) -> Option<&Configuration> {
        self.configurations.iter().find(|c| c.name == name)
    }

    pub fn has_configuration(&self, name: &str) -> bool {
        self.configuration_names().iter().any(|c| c == name)
    }

    /// Resolve requested configuration names against this descriptor.
    ///
    /// `*` expands to every public configuration. Unknown names are returned in
    /// the second vector so the caller can report them.
    pub fn select_confs(&self, requested: &[String]) -> (BTreeSet<String>, Vec<String>) {
        let mut found = BTreeSet::new();
        let mut missing = Vec::new();
        for conf in requested {
            if conf == "*" {
                if self.configurations.is_empty() {
                    found.insert(DEFAULT_CONF.to_string());
                }
                found.extend(
                    self.configurations
                        .iter()
                        .filter(|c| c.public)
                        .map(|c| c.name.clone()),
                );
            } else if self.has_configuration(conf) {
                found.insert(conf.clone());
            } else {
                missing.push(conf.clone());
            }
        }
        (found, missing)
    }

    /// A configuration plus every configuration it extends, transitively.
    pub fn expand_conf(&self, conf: &str) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        let mut stack = vec![conf.to_string()];
        while let Some(name) = stack.pop() {
            if !out.insert(name.clone()) {
                continue;
            }
            if let Some(c) = self.configuration(&name) {
                stack.extend(c.extends.iter().cloned());
            }
        }
        out
    }

    /// Dependencies pulled in by a module configuration.
    ///
    /// Each entry carries the caller configurations that matched (after
    /// `extends` expansion) and the dependency configurations they map to.
    pub fn dependencies_for(
        &self,
        conf: &str,
    ) -> Vec<(&DependencyDescriptor, Vec<String>, Vec<String>)> {
        let expanded = self.expand_conf(conf);
        let mut out = Vec::new();
        for dd in &self.dependencies {
            let mut caller_confs = Vec::new();
            let mut targets = Vec::new();
            for c in &expanded {
                let t = dd.mapping.targets(c);
                if t.is_empty() {
                    continue;
                }
                caller_confs.push(c.clone());
                for target in t {
                    if !targets.contains(&target) {
                        targets.push(target);
                    }
                }
            }
            if !targets.is_empty() {
                out.push((dd, caller_confs, targets));
            }
        }
        out
    }

    /// Artifacts published in a module configuration (after `extends`).
    ///
    /// A descriptor without declared artifacts publishes its default artifact.
    pub fn artifacts_for(&self, conf: &str) -> Vec<Artifact> {
        if self.artifacts.is_empty() {
            return vec![Artifact::default_for(&self.id)];
        }
        let expanded = self.expand_conf(conf);
        self.artifacts
            .iter()
            .filter(|a| expanded.iter().any(|c| a.in_conf(c)))
            .cloned()
            .collect()
    }

    /// Parse a TOML module file.
    pub fn from_toml_str(content: &str) -> miette::Result<Self> {
        let file: ModuleFile =
            toml::from_str(content).map_err(|e| ivory_util::errors::IvoryError::Descriptor {
                message: format!("Failed to parse module file: {e}"),
            })?;
        file.into_descriptor()
    }

    /// Load and parse a TOML module file from disk.
    pub fn from_path(path: &Path) -> miette::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ivory_util::errors::IvoryError::Descriptor {
                message: format!("Failed to read {}: {e}", path.display()),
            }
        })?;
        Self::from_toml_str(&content)
    }
}

/// On-disk shape of a `module.toml` file.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ModuleFile {
    module: ModuleSection,
    #[serde(default)]
    license: Vec<License>,
    #[serde(default)]
    configurations: BTreeMap<String, ConfSection>,
    #[serde(default)]
    dependency: Vec<DependencySection>,
    #[serde(default)]
    artifact: Vec<ArtifactSection>,
    #[serde(default)]
    conflict: Vec<ConflictRule>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ModuleSection {
    organisation: String,
    name: String,
    revision: String,
    #[serde(default)]
    branch: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    publication: Option<DateTime<Utc>>,
    #[serde(default)]
    home_page: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    extra: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfSection {
    #[serde(default)]
    extends: Vec<String>,
    #[serde(default)]
    visibility: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DependencySection {
    org: String,
    name: String,
    rev: String,
    #[serde(default)]
    branch: Option<String>,
    #[serde(default)]
    conf: Option<String>,
    #[serde(default)]
    force: bool,
    #[serde(default = "default_public")]
    transitive: bool,
    /// Attributes identifying the target module (part of the asked id).
    #[serde(default)]
    attributes: BTreeMap<String, String>,
    /// Attributes on the declaration only.
    #[serde(default)]
    extra: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ArtifactSection {
    name: Option<String>,
    #[serde(default, rename = "type")]
    type_: Option<String>,
    #[serde(default)]
    ext: Option<String>,
    #[serde(default)]
    conf: Vec<String>,
    #[serde(default)]
    extra: BTreeMap<String, String>,
}

impl ModuleFile {
    fn into_descriptor(self) -> miette::Result<ModuleDescriptor> {
        let m = self.module;
        let mut id = ModuleRevisionId::new(m.organisation, m.name, m.revision);
        id.branch = m.branch;
        id.extra = m.extra;

        if let Some(ref status) = m.status {
            if !STATUSES.contains(&status.as_str()) {
                tracing::warn!("{id}: unknown status '{status}', treating as integration");
            }
        }

        let mut md = ModuleDescriptor::new(id);
        md.status = m.status.unwrap_or_else(|| STATUSES[0].to_string());
        md.publication = m.publication;
        md.home_page = m.home_page;
        md.description = m.description;
        md.licenses = self.license;
        md.conflict_rules = self.conflict;

        for (name, section) in self.configurations {
            md.configurations.push(Configuration {
                name,
                extends: section.extends,
                public: section.visibility.as_deref() != Some("private"),
            });
        }

        for dep in self.dependency {
            let mut asked = ModuleRevisionId::new(dep.org, dep.name, dep.rev);
            asked.branch = dep.branch;
            asked.extra = dep.attributes;
            md.dependencies.push(DependencyDescriptor {
                asked,
                mapping: dep
                    .conf
                    .as_deref()
                    .map(ConfMapping::parse)
                    .unwrap_or_else(ConfMapping::all),
                extra: dep.extra,
                force: dep.force,
                transitive: dep.transitive,
            });
        }

        for art in self.artifact {
            md.artifacts.push(Artifact {
                module: md.id.clone(),
                name: art.name.unwrap_or_else(|| md.id.name().to_string()),
                type_: art.type_.unwrap_or_else(|| "jar".to_string()),
                ext: art.ext.unwrap_or_else(|| "jar".to_string()),
                confs: art.conf,
                extra: art.extra,
            });
        }

        let declared = md.configuration_names();
        for conf in md.configurations.iter().flat_map(|c| c.extends.iter()) {
            if !declared.contains(conf) {
                return Err(ivory_util::errors::IvoryError::Descriptor {
                    message: format!("{}: configuration '{conf}' is extended but not declared", md.id),
                }
                .into());
            }
        }

        Ok(md)
    }
}
