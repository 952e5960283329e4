//! Resolution reports: what each configuration resolved, evicted and failed.
//!
//! Reports are plain serializable values built from the node registry at the
//! end of a run; nothing in here refers back to the registry.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use petgraph::graph::NodeIndex;
use serde::Serialize;

use ivory_core::artifact::{Artifact, ArtifactDownloadReport};
use ivory_core::descriptor::License;
use ivory_core::id::{ModuleId, ModuleRevisionId};

use crate::conflict::{ConflictReport, ModuleConflict};
use crate::graph::{Node, NodeRegistry};

/// Outcome of a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct ResolveReport {
    pub root: ModuleRevisionId,
    pub resolve_id: String,
    pub date: DateTime<Utc>,
    pub confs: Vec<String>,
    pub configurations: Vec<ConfigurationReport>,
    /// Run-level problems (unknown configurations, missing resolvers...).
    pub problems: Vec<String>,
}

/// Outcome of one root configuration.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigurationReport {
    pub conf: String,
    /// Modules in first-seen order.
    pub modules: Vec<ModuleReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleReport {
    pub module: ModuleId,
    /// Resolver of the first revision that has one.
    pub resolver: Option<String>,
    pub revisions: Vec<RevisionReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RevisionReport {
    pub id: ModuleRevisionId,
    pub status: Option<String>,
    pub publication: Option<DateTime<Utc>>,
    pub resolver: Option<String>,
    pub artifact_resolver: Option<String>,
    pub evicted: Option<EvictionReport>,
    pub error: Option<String>,
    pub home_page: Option<String>,
    pub description: Option<String>,
    pub extra: BTreeMap<String, String>,
    pub downloaded: bool,
    pub searched: bool,
    /// Descriptor was synthesised.
    pub default: bool,
    /// Module configurations pulled into this root configuration.
    pub confs: Vec<String>,
    /// Position in the configuration's revision listing.
    pub position: usize,
    pub depth: usize,
    pub licenses: Vec<License>,
    pub callers: Vec<CallerReport>,
    pub artifacts: Vec<ArtifactDownloadReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvictionReport {
    /// Conflict manager name, or `transitive`.
    pub manager: String,
    pub reason: String,
    /// Winning revisions.
    pub selected: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallerReport {
    pub organisation: String,
    pub name: String,
    /// Caller configurations that pulled the dependency in.
    pub confs: Vec<String>,
    /// Revision asked by the caller.
    pub rev: String,
    /// Revision of the caller itself.
    pub callerrev: String,
    pub extra: BTreeMap<String, String>,
}

impl ResolveReport {
    /// Archive the registry of a finished run.
    pub fn build(
        registry: &NodeRegistry,
        confs: &[String],
        problems: Vec<String>,
        date: DateTime<Utc>,
    ) -> Self {
        let root = registry.node(registry.root()).id.clone();
        Self {
            resolve_id: format!("{}-{}", root.organisation(), root.name()),
            root,
            date,
            confs: confs.to_vec(),
            configurations: confs
                .iter()
                .map(|c| ConfigurationReport::build(registry, c))
                .collect(),
            problems,
        }
    }

    pub fn configuration(&self, conf: &str) -> Option<&ConfigurationReport> {
        self.configurations.iter().find(|c| c.conf == conf)
    }

    pub fn has_error(&self) -> bool {
        !self.problems.is_empty() || self.configurations.iter().any(|c| c.has_error())
    }

    /// Every problem of the run, run-level first, each reported once.
    pub fn all_problems(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let node_problems = self.configurations.iter().flat_map(|c| {
            c.revisions()
                .filter_map(|r| r.error.as_ref().map(|e| format!("{}: {e}", r.id)))
                .chain(c.failed_artifacts().map(|a| {
                    format!(
                        "{}: {}",
                        a.artifact,
                        a.message.as_deref().unwrap_or("download failed")
                    )
                }))
        });
        for p in self.problems.iter().cloned().chain(node_problems) {
            if seen.insert(p.clone()) {
                out.push(p);
            }
        }
        out
    }

    /// Distinct module revisions across all configurations.
    pub fn revision_count(&self) -> usize {
        self.configurations
            .iter()
            .flat_map(|c| c.revisions().map(|r| &r.id))
            .collect::<HashSet<_>>()
            .len()
    }
}

impl ConfigurationReport {
    fn build(registry: &NodeRegistry, conf: &str) -> Self {
        let mut modules: Vec<ModuleReport> = Vec::new();
        let mut slot: HashMap<ModuleId, usize> = HashMap::new();
        let mut position = 0;

        for idx in registry.nodes_in(conf) {
            let node = registry.node(idx);
            let revision = revision_report(registry, idx, node, conf, position);
            position += 1;
            let i = *slot.entry(node.module_id().clone()).or_insert_with(|| {
                modules.push(ModuleReport {
                    module: node.module_id().clone(),
                    resolver: None,
                    revisions: Vec::new(),
                });
                modules.len() - 1
            });
            let module = &mut modules[i];
            if module.resolver.is_none() {
                module.resolver = revision.resolver.clone();
            }
            module.revisions.push(revision);
        }

        Self {
            conf: conf.to_string(),
            modules,
        }
    }

    pub fn revisions(&self) -> impl Iterator<Item = &RevisionReport> {
        self.modules.iter().flat_map(|m| m.revisions.iter())
    }

    pub fn revision(&self, id: &ModuleRevisionId) -> Option<&RevisionReport> {
        self.revisions().find(|r| &r.id == id)
    }

    pub fn module_ids(&self) -> Vec<&ModuleId> {
        self.modules.iter().map(|m| &m.module).collect()
    }

    /// Resolved, non-evicted revisions.
    pub fn retained(&self) -> impl Iterator<Item = &RevisionReport> {
        self.revisions()
            .filter(|r| r.evicted.is_none() && r.error.is_none())
    }

    pub fn evicted(&self) -> impl Iterator<Item = &RevisionReport> {
        self.revisions().filter(|r| r.evicted.is_some())
    }

    /// Revisions that could not be resolved or loaded.
    pub fn unresolved(&self) -> impl Iterator<Item = &RevisionReport> {
        self.revisions()
            .filter(|r| r.error.is_some() && r.evicted.is_none())
    }

    pub fn failed_artifacts(&self) -> impl Iterator<Item = &ArtifactDownloadReport> {
        self.retained()
            .flat_map(|r| r.artifacts.iter())
            .filter(|a| a.is_failed())
    }

    pub fn has_error(&self) -> bool {
        self.unresolved().next().is_some() || self.failed_artifacts().next().is_some()
    }

    /// Evictions grouped per module.
    pub fn conflicts(&self) -> ConflictReport {
        let mut report = ConflictReport::new();
        for module in &self.modules {
            let mut by_manager: BTreeMap<String, ModuleConflict> = BTreeMap::new();
            for r in &module.revisions {
                let Some(ref ev) = r.evicted else {
                    continue;
                };
                let entry = by_manager
                    .entry(ev.manager.clone())
                    .or_insert_with(|| ModuleConflict {
                        module: module.module.clone(),
                        evicted: Vec::new(),
                        selected: ev.selected.clone(),
                        manager: ev.manager.clone(),
                    });
                entry.evicted.push(r.id.revision.clone());
            }
            for (_, conflict) in by_manager {
                report.add(conflict);
            }
        }
        report
    }

    /// Render the dependency tree of this configuration below `root`.
    ///
    /// Evicted revisions are shown only when `show_evicted` is set; a module
    /// reached again below itself is printed once and not expanded.
    pub fn print_tree(&self, root: &ModuleRevisionId, show_evicted: bool) -> String {
        let mut output = format!("{root} [{}]\n", self.conf);
        let children = self.children_index();
        let top = self.children_of(&children, root, show_evicted);
        let mut visited = HashSet::new();
        visited.insert(key_of(root));
        let count = top.len();
        for (i, r) in top.into_iter().enumerate() {
            self.print_subtree(&mut output, &children, r, "", i == count - 1, show_evicted, &mut visited);
        }
        output
    }

    /// Render who pulled `target` (`org#name` or just `name`) in, one branch
    /// per caller path up to the root.
    pub fn print_inverted_tree(&self, target: &str) -> String {
        let mut output = String::new();
        let matches: Vec<&RevisionReport> = self
            .revisions()
            .filter(|r| r.id.module_id().to_string() == target || r.id.name() == target)
            .collect();
        for r in matches {
            output.push_str(&format!("{}{}\n", r.id, annotation(r)));
            let mut visited = HashSet::new();
            visited.insert(key_of(&r.id));
            let count = r.callers.len();
            for (i, caller) in r.callers.iter().enumerate() {
                self.print_inverted_subtree(&mut output, caller, "", i == count - 1, &mut visited);
            }
        }
        output
    }

    fn children_index(&self) -> HashMap<String, Vec<&RevisionReport>> {
        let mut index: HashMap<String, Vec<&RevisionReport>> = HashMap::new();
        for r in self.revisions() {
            for c in &r.callers {
                index
                    .entry(format!("{}#{};{}", c.organisation, c.name, c.callerrev))
                    .or_default()
                    .push(r);
            }
        }
        index
    }

    fn children_of<'a>(
        &self,
        index: &HashMap<String, Vec<&'a RevisionReport>>,
        parent: &ModuleRevisionId,
        show_evicted: bool,
    ) -> Vec<&'a RevisionReport> {
        index
            .get(&key_of(parent))
            .map(|v| {
                v.iter()
                    .copied()
                    .filter(|r| show_evicted || r.evicted.is_none())
                    .collect()
            })
            .unwrap_or_default()
    }

    #[allow(clippy::too_many_arguments)]
    fn print_subtree(
        &self,
        output: &mut String,
        index: &HashMap<String, Vec<&RevisionReport>>,
        node: &RevisionReport,
        prefix: &str,
        is_last: bool,
        show_evicted: bool,
        visited: &mut HashSet<String>,
    ) {
        let connector = if is_last { "└── " } else { "├── " };
        output.push_str(&format!("{prefix}{connector}{}{}\n", node.id, annotation(node)));

        if node.evicted.is_some() || !visited.insert(key_of(&node.id)) {
            return;
        }

        let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
        let children = self.children_of(index, &node.id, show_evicted);
        let count = children.len();
        for (i, child) in children.into_iter().enumerate() {
            self.print_subtree(output, index, child, &child_prefix, i == count - 1, show_evicted, visited);
        }

        visited.remove(&key_of(&node.id));
    }

    fn print_inverted_subtree(
        &self,
        output: &mut String,
        caller: &CallerReport,
        prefix: &str,
        is_last: bool,
        visited: &mut HashSet<String>,
    ) {
        let connector = if is_last { "└── " } else { "├── " };
        let key = format!("{}#{};{}", caller.organisation, caller.name, caller.callerrev);
        output.push_str(&format!("{prefix}{connector}{key} (asked {})\n", caller.rev));

        if !visited.insert(key.clone()) {
            return;
        }

        let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
        let parent = self.revisions().find(|r| key_of(&r.id) == key);
        if let Some(parent) = parent {
            let count = parent.callers.len();
            for (i, c) in parent.callers.iter().enumerate() {
                self.print_inverted_subtree(output, c, &child_prefix, i == count - 1, visited);
            }
        }

        visited.remove(&key);
    }
}

fn key_of(id: &ModuleRevisionId) -> String {
    format!("{}#{};{}", id.organisation(), id.name(), id.revision)
}

fn annotation(r: &RevisionReport) -> String {
    if let Some(ref ev) = r.evicted {
        return format!(" (evicted: {})", ev.manager);
    }
    if let Some(ref e) = r.error {
        return format!(" (error: {e})");
    }
    String::new()
}

fn revision_report(
    registry: &NodeRegistry,
    idx: NodeIndex,
    node: &Node,
    conf: &str,
    position: usize,
) -> RevisionReport {
    let data = node.conf(conf);
    let md = node.descriptor.as_deref();
    let module_confs: Vec<String> = data
        .map(|d| d.module_confs.iter().cloned().collect())
        .unwrap_or_default();

    let wanted: Vec<Artifact> = md
        .map(|md| {
            module_confs
                .iter()
                .flat_map(|c| md.artifacts_for(c))
                .collect()
        })
        .unwrap_or_default();
    let artifacts = node
        .artifacts
        .iter()
        .filter(|a| wanted.contains(&a.artifact))
        .cloned()
        .collect();

    let callers = registry
        .callers(idx, conf)
        .into_iter()
        .map(|(caller, edge)| {
            let caller = &registry.node(caller).id;
            CallerReport {
                organisation: caller.organisation().to_string(),
                name: caller.name().to_string(),
                confs: edge.caller_confs.clone(),
                rev: edge.asked.revision.clone(),
                callerrev: caller.revision.clone(),
                extra: edge.extra.clone(),
            }
        })
        .collect();

    RevisionReport {
        id: node.id.clone(),
        status: md.map(|m| m.status.clone()),
        publication: md.and_then(|m| m.publication),
        resolver: node.resolver.clone(),
        artifact_resolver: node.artifact_resolver.clone(),
        evicted: node.eviction(conf).map(|ev| EvictionReport {
            manager: ev.manager_name().to_string(),
            reason: ev.detail.clone(),
            selected: ev.selected.iter().map(|s| s.revision.clone()).collect(),
        }),
        error: node.problem_in(conf).map(str::to_string),
        home_page: md.and_then(|m| m.home_page.clone()),
        description: md.and_then(|m| m.description.clone()),
        extra: md.map(|m| m.extra.clone()).unwrap_or_else(|| node.id.extra.clone()),
        downloaded: data.is_some_and(|d| d.downloaded),
        searched: data.is_some_and(|d| d.searched),
        default: md.is_some_and(|m| m.default),
        confs: module_confs,
        position,
        depth: data.map_or(0, |d| d.depth),
        licenses: md.map(|m| m.licenses.clone()).unwrap_or_default(),
        callers,
        artifacts,
    }
}
