//! The node registry of a resolution run.
//!
//! One node per distinct resolved module revision, stored in a petgraph arena
//! and indexed by id. Edges go from caller to dependency and are tagged with
//! the root configuration they were discovered in, so one graph serves every
//! configuration of the run.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use ivory_core::artifact::ArtifactDownloadReport;
use ivory_core::descriptor::ModuleDescriptor;
use ivory_core::id::{ModuleId, ModuleRevisionId};

use crate::conflict::ConflictManager;

/// A caller edge: who asked for the dependency, how, and in which root conf.
#[derive(Debug, Clone)]
pub struct CallerEdge {
    /// Root configuration this edge belongs to.
    pub conf: String,
    /// The id as written by the caller.
    pub asked: ModuleRevisionId,
    /// Caller configurations that pulled the dependency in.
    pub caller_confs: Vec<String>,
    /// Extra attributes on the caller's dependency declaration.
    pub extra: BTreeMap<String, String>,
    pub force: bool,
}

/// Why a node lost in a configuration.
#[derive(Debug, Clone)]
pub struct EvictionData {
    /// `None` when the node was only evicted because its callers were.
    pub conflict_manager: Option<Arc<dyn ConflictManager>>,
    pub detail: String,
    pub selected: Vec<ModuleRevisionId>,
}

impl EvictionData {
    pub fn transitive() -> Self {
        Self {
            conflict_manager: None,
            detail: "evicted by transitivity".to_string(),
            selected: Vec::new(),
        }
    }

    pub fn is_transitive(&self) -> bool {
        self.conflict_manager.is_none()
    }

    /// Manager name, or `transitive`.
    pub fn manager_name(&self) -> &str {
        self.conflict_manager
            .as_ref()
            .map_or("transitive", |m| m.name())
    }
}

/// Per root configuration state of a node.
#[derive(Debug, Clone, Default)]
pub struct NodeConfData {
    /// Configurations of the module pulled into this root configuration.
    pub module_confs: BTreeSet<String>,
    /// Shortest distance from the root.
    pub depth: usize,
    pub eviction: Option<EvictionData>,
    /// Failure that only holds in this configuration (a strict conflict).
    pub problem: Option<String>,
    /// A repository listing was consulted to pick this revision.
    pub searched: bool,
    /// At least one of this configuration's artifacts was transferred.
    pub downloaded: bool,
}

/// One module revision encountered during a run.
#[derive(Debug, Clone)]
pub struct Node {
    /// Resolved id, or the asked id when resolution failed.
    pub id: ModuleRevisionId,
    /// The first ask that produced this node.
    pub asked: ModuleRevisionId,
    pub descriptor: Option<Arc<ModuleDescriptor>>,
    /// Failure shared by every configuration (lookup or descriptor errors).
    pub problem: Option<String>,
    pub resolver: Option<String>,
    pub artifact_resolver: Option<String>,
    pub artifacts: Vec<ArtifactDownloadReport>,
    confs: BTreeMap<String, NodeConfData>,
}

impl Node {
    fn new(id: ModuleRevisionId, asked: ModuleRevisionId) -> Self {
        Self {
            id,
            asked,
            descriptor: None,
            problem: None,
            resolver: None,
            artifact_resolver: None,
            artifacts: Vec::new(),
            confs: BTreeMap::new(),
        }
    }

    pub fn module_id(&self) -> &ModuleId {
        self.id.module_id()
    }

    pub fn is_loaded(&self) -> bool {
        self.descriptor.is_some()
    }

    /// Loaded without problem: eligible to win a conflict.
    pub fn is_candidate(&self) -> bool {
        self.is_loaded() && self.problem.is_none()
    }

    pub fn conf(&self, conf: &str) -> Option<&NodeConfData> {
        self.confs.get(conf)
    }

    /// Enter a root configuration at `depth`, keeping the shortest depth seen.
    pub fn enter_conf(&mut self, conf: &str, depth: usize) -> &mut NodeConfData {
        let data = self
            .confs
            .entry(conf.to_string())
            .or_insert_with(|| NodeConfData {
                depth,
                ..NodeConfData::default()
            });
        data.depth = data.depth.min(depth);
        data
    }

    pub fn conf_mut(&mut self, conf: &str) -> Option<&mut NodeConfData> {
        self.confs.get_mut(conf)
    }

    pub fn in_conf(&self, conf: &str) -> bool {
        self.confs.contains_key(conf)
    }

    /// Root configurations this node takes part in.
    pub fn root_confs(&self) -> impl Iterator<Item = &str> {
        self.confs.keys().map(String::as_str)
    }

    pub fn eviction(&self, conf: &str) -> Option<&EvictionData> {
        self.confs.get(conf).and_then(|d| d.eviction.as_ref())
    }

    pub fn is_evicted(&self, conf: &str) -> bool {
        self.eviction(conf).is_some()
    }

    pub fn set_problem(&mut self, problem: impl Into<String>) {
        if self.problem.is_none() {
            self.problem = Some(problem.into());
        }
    }

    /// The node's problem as seen from `conf`: the shared one first.
    pub fn problem_in(&self, conf: &str) -> Option<&str> {
        self.problem
            .as_deref()
            .or_else(|| self.confs.get(conf).and_then(|d| d.problem.as_deref()))
    }
}

/// Arena of nodes keyed by resolved id.
#[derive(Debug)]
pub struct NodeRegistry {
    graph: DiGraph<Node, CallerEdge>,
    index: HashMap<ModuleRevisionId, NodeIndex>,
    root: NodeIndex,
}

impl NodeRegistry {
    /// A registry holding only the root module.
    pub fn new(root: Arc<ModuleDescriptor>) -> Self {
        let mut graph = DiGraph::new();
        let mut node = Node::new(root.id.clone(), root.id.clone());
        node.descriptor = Some(root.clone());
        let idx = graph.add_node(node);
        let mut index = HashMap::new();
        index.insert(root.id.clone(), idx);
        Self {
            graph,
            index,
            root: idx,
        }
    }

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn node(&self, idx: NodeIndex) -> &Node {
        &self.graph[idx]
    }

    pub fn node_mut(&mut self, idx: NodeIndex) -> &mut Node {
        &mut self.graph[idx]
    }

    pub fn find(&self, id: &ModuleRevisionId) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }

    /// The node for `id`, creating it on first encounter. The boolean is true
    /// when the node was created.
    pub fn get_or_insert(
        &mut self,
        id: &ModuleRevisionId,
        asked: &ModuleRevisionId,
    ) -> (NodeIndex, bool) {
        if let Some(&idx) = self.index.get(id) {
            return (idx, false);
        }
        let idx = self.graph.add_node(Node::new(id.clone(), asked.clone()));
        self.index.insert(id.clone(), idx);
        (idx, true)
    }

    /// Record that `caller` depends on `callee`. An existing edge for the same
    /// configuration and asked id absorbs the new caller configurations.
    pub fn add_caller(&mut self, caller: NodeIndex, callee: NodeIndex, edge: CallerEdge) {
        let existing = self
            .graph
            .edges_connecting(caller, callee)
            .find(|e| e.weight().conf == edge.conf && e.weight().asked == edge.asked)
            .map(|e| e.id());
        match existing {
            Some(id) => {
                let weight = &mut self.graph[id];
                for c in edge.caller_confs {
                    if !weight.caller_confs.contains(&c) {
                        weight.caller_confs.push(c);
                    }
                }
                weight.force |= edge.force;
                weight.extra.extend(edge.extra);
            }
            None => {
                self.graph.add_edge(caller, callee, edge);
            }
        }
    }

    /// Callers of a node within a root configuration.
    pub fn callers(&self, idx: NodeIndex, conf: &str) -> Vec<(NodeIndex, &CallerEdge)> {
        self.graph
            .edges_directed(idx, Direction::Incoming)
            .filter(|e| e.weight().conf == conf)
            .map(|e| (e.source(), e.weight()))
            .collect()
    }

    /// Dependencies of a node within a root configuration.
    pub fn dependencies(&self, idx: NodeIndex, conf: &str) -> Vec<(NodeIndex, &CallerEdge)> {
        let mut deps: Vec<(NodeIndex, &CallerEdge)> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .filter(|e| e.weight().conf == conf)
            .map(|e| (e.target(), e.weight()))
            .collect();
        deps.sort_by_key(|(target, _)| *target);
        deps
    }

    /// Every node index, in creation order.
    pub fn indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    /// Non-root nodes taking part in a configuration, in creation order.
    pub fn nodes_in(&self, conf: &str) -> Vec<NodeIndex> {
        self.graph
            .node_indices()
            .filter(|&idx| idx != self.root && self.graph[idx].in_conf(conf))
            .collect()
    }

    /// Nodes reachable from the root in `conf` without passing through an
    /// evicted node. The root is always live.
    pub fn live_nodes(&self, conf: &str) -> HashSet<NodeIndex> {
        let mut live = HashSet::new();
        let mut queue = VecDeque::new();
        live.insert(self.root);
        queue.push_back(self.root);
        while let Some(idx) = queue.pop_front() {
            for (target, _) in self.dependencies(idx, conf) {
                if self.graph[target].is_evicted(conf) || !live.insert(target) {
                    continue;
                }
                queue.push_back(target);
            }
        }
        live
    }

    /// Shortest-path ancestors of `idx` in `conf`, nearest first, root last
    /// (when reachable). Only non-evicted callers are followed.
    pub fn ancestors(&self, idx: NodeIndex, conf: &str) -> Vec<NodeIndex> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut queue = VecDeque::from([idx]);
        seen.insert(idx);
        while let Some(current) = queue.pop_front() {
            for (caller, _) in self.callers(current, conf) {
                if self.graph[caller].is_evicted(conf) || !seen.insert(caller) {
                    continue;
                }
                out.push(caller);
                queue.push_back(caller);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn md(org: &str, name: &str, rev: &str) -> Arc<ModuleDescriptor> {
        Arc::new(ModuleDescriptor::new(ModuleRevisionId::new(org, name, rev)))
    }

    fn edge(conf: &str, asked: &ModuleRevisionId) -> CallerEdge {
        CallerEdge {
            conf: conf.to_string(),
            asked: asked.clone(),
            caller_confs: vec![conf.to_string()],
            extra: BTreeMap::new(),
            force: false,
        }
    }

    #[test]
    fn one_node_per_resolved_id() {
        let mut reg = NodeRegistry::new(md("org", "app", "1.0"));
        let b = ModuleRevisionId::new("org", "b", "1.0");
        let (first, created) = reg.get_or_insert(&b, &b);
        assert!(created);
        let asked = ModuleRevisionId::new("org", "b", "[1.0,2.0)");
        let (second, created) = reg.get_or_insert(&b, &asked);
        assert!(!created);
        assert_eq!(first, second);
        assert_eq!(reg.len(), 2);
        // the first ask is kept
        assert_eq!(reg.node(first).asked, b);
    }

    #[test]
    fn duplicate_caller_edges_merge() {
        let mut reg = NodeRegistry::new(md("org", "app", "1.0"));
        let root = reg.root();
        let b = ModuleRevisionId::new("org", "b", "1.0");
        let (idx, _) = reg.get_or_insert(&b, &b);
        reg.add_caller(root, idx, edge("default", &b));
        let mut again = edge("default", &b);
        again.caller_confs = vec!["runtime".to_string()];
        reg.add_caller(root, idx, again);
        let callers = reg.callers(idx, "default");
        assert_eq!(callers.len(), 1);
        assert_eq!(callers[0].1.caller_confs, vec!["default", "runtime"]);
        assert!(reg.callers(idx, "test").is_empty());
    }

    #[test]
    fn live_nodes_skip_evicted_subtrees() {
        let mut reg = NodeRegistry::new(md("org", "app", "1.0"));
        let root = reg.root();
        let a = ModuleRevisionId::new("org", "a", "1.0");
        let c = ModuleRevisionId::new("org", "c", "1.0");
        let (ia, _) = reg.get_or_insert(&a, &a);
        let (ic, _) = reg.get_or_insert(&c, &c);
        reg.add_caller(root, ia, edge("default", &a));
        reg.add_caller(ia, ic, edge("default", &c));
        reg.node_mut(ia).enter_conf("default", 1);
        reg.node_mut(ic).enter_conf("default", 2);

        assert_eq!(reg.live_nodes("default").len(), 3);
        reg.node_mut(ia).enter_conf("default", 1).eviction = Some(EvictionData::transitive());
        let live = reg.live_nodes("default");
        assert!(live.contains(&root));
        assert!(!live.contains(&ia));
        assert!(!live.contains(&ic));
    }

    #[test]
    fn enter_conf_keeps_shortest_depth() {
        let mut reg = NodeRegistry::new(md("org", "app", "1.0"));
        let a = ModuleRevisionId::new("org", "a", "1.0");
        let (ia, _) = reg.get_or_insert(&a, &a);
        reg.node_mut(ia).enter_conf("default", 3);
        reg.node_mut(ia).enter_conf("default", 1);
        reg.node_mut(ia).enter_conf("default", 2);
        assert_eq!(reg.node(ia).conf("default").unwrap().depth, 1);
        assert_eq!(reg.nodes_in("default"), vec![ia]);
    }

    #[test]
    fn ancestors_nearest_first() {
        let mut reg = NodeRegistry::new(md("org", "app", "1.0"));
        let root = reg.root();
        let a = ModuleRevisionId::new("org", "a", "1.0");
        let b = ModuleRevisionId::new("org", "b", "1.0");
        let (ia, _) = reg.get_or_insert(&a, &a);
        let (ib, _) = reg.get_or_insert(&b, &b);
        reg.add_caller(root, ia, edge("default", &a));
        reg.add_caller(ia, ib, edge("default", &b));
        assert_eq!(reg.ancestors(ib, "default"), vec![ia, root]);
    }
}
