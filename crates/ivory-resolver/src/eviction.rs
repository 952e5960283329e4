//! Conflict resolution and eviction for one configuration.
//!
//! Runs after the configuration's closure is discovered. Transitive
//! evictions are recomputed from scratch every round: whatever is no longer
//! reachable from the root through nodes that did not lose a conflict is
//! evicted by transitivity. A decided module whose retained revisions all
//! became unreachable this way is reopened and decided again among the
//! candidates still alive. Otherwise the shallowest undecided conflict group
//! is handed to its conflict manager. The loop ends when nothing changes.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use petgraph::graph::NodeIndex;

use ivory_core::descriptor::ModuleDescriptor;
use ivory_core::id::ModuleId;

use crate::conflict::{Candidate, ConflictDecision, ConflictManager};
use crate::context::{compile_glob, EngineContext};
use crate::graph::{EvictionData, NodeRegistry};

/// Decide every conflict of `conf` and mark the losers.
pub fn resolve_conflicts(registry: &mut NodeRegistry, conf: &str, ctx: &EngineContext) {
    let mut decided: HashSet<ModuleId> = HashSet::new();
    let mut reopened: HashMap<ModuleId, usize> = HashMap::new();
    loop {
        let live = settle_transitive(registry, conf);

        if let Some(module) = stranded_module(registry, conf, &live, &decided) {
            let count = reopened.entry(module.clone()).or_default();
            *count += 1;
            let limit = registry.nodes_in(conf).len();
            if *count <= limit {
                tracing::debug!("{conf}: every retained revision of {module} was evicted, deciding again");
                reopen(registry, conf, &module);
                decided.remove(&module);
                continue;
            }
            if *count == limit + 1 {
                tracing::warn!("{conf}: {module} keeps losing its retained revisions, giving up");
            }
        }

        let Some((module, group)) = next_group(registry, conf, &live, &decided) else {
            break;
        };
        decide(registry, conf, ctx, &module, &group, &live);
        decided.insert(module);
    }
}

/// Drop every transitive eviction of `conf`, then evict again whatever the
/// conflict losers cut off from the root. Returns the live nodes.
fn settle_transitive(registry: &mut NodeRegistry, conf: &str) -> HashSet<NodeIndex> {
    let nodes = registry.nodes_in(conf);
    for &idx in &nodes {
        if let Some(data) = registry.node_mut(idx).conf_mut(conf) {
            if data.eviction.as_ref().is_some_and(EvictionData::is_transitive) {
                data.eviction = None;
            }
        }
    }
    let live = registry.live_nodes(conf);
    for idx in nodes {
        if live.contains(&idx) || registry.node(idx).is_evicted(conf) {
            continue;
        }
        let node = registry.node_mut(idx);
        tracing::debug!("{conf}: {} evicted by transitivity", node.id);
        if let Some(data) = node.conf_mut(conf) {
            data.eviction = Some(EvictionData::transitive());
        }
    }
    live
}

/// A decided module that lost a conflict but has no live retained revision
/// left.
fn stranded_module(
    registry: &NodeRegistry,
    conf: &str,
    live: &HashSet<NodeIndex>,
    decided: &HashSet<ModuleId>,
) -> Option<ModuleId> {
    let mut by_module: BTreeMap<&ModuleId, (bool, bool)> = BTreeMap::new();
    for idx in registry.nodes_in(conf) {
        let node = registry.node(idx);
        if !decided.contains(node.module_id()) {
            continue;
        }
        let entry = by_module.entry(node.module_id()).or_default();
        match node.eviction(conf) {
            Some(ev) if !ev.is_transitive() => entry.0 = true,
            None if live.contains(&idx) => entry.1 = true,
            _ => {}
        }
    }
    by_module
        .into_iter()
        .find(|(_, (lost, retained))| *lost && !*retained)
        .map(|(m, _)| m.clone())
}

/// Undo the conflict evictions of `module` in `conf`.
fn reopen(registry: &mut NodeRegistry, conf: &str, module: &ModuleId) {
    for idx in registry.nodes_in(conf) {
        let node = registry.node_mut(idx);
        if node.module_id() != module {
            continue;
        }
        if let Some(data) = node.conf_mut(conf) {
            if data.eviction.as_ref().is_some_and(|ev| !ev.is_transitive()) {
                data.eviction = None;
            }
        }
    }
}

/// The shallowest group of live candidates sharing a module id that has not
/// been decided yet.
fn next_group(
    registry: &NodeRegistry,
    conf: &str,
    live: &HashSet<NodeIndex>,
    decided: &HashSet<ModuleId>,
) -> Option<(ModuleId, Vec<NodeIndex>)> {
    let mut groups: BTreeMap<ModuleId, Vec<NodeIndex>> = BTreeMap::new();
    for idx in registry.nodes_in(conf) {
        let node = registry.node(idx);
        if live.contains(&idx) && node.is_candidate() && !decided.contains(node.module_id()) {
            groups.entry(node.module_id().clone()).or_default().push(idx);
        }
    }
    let depth = |group: &[NodeIndex]| {
        group
            .iter()
            .filter_map(|&i| registry.node(i).conf(conf).map(|d| d.depth))
            .min()
            .unwrap_or(usize::MAX)
    };
    groups
        .into_iter()
        .filter(|(_, g)| g.len() > 1)
        .min_by(|(ma, a), (mb, b)| depth(a).cmp(&depth(b)).then_with(|| ma.cmp(mb)))
}

fn decide(
    registry: &mut NodeRegistry,
    conf: &str,
    ctx: &EngineContext,
    module: &ModuleId,
    group: &[NodeIndex],
    live: &HashSet<NodeIndex>,
) {
    let manager = select_manager(registry, conf, ctx, module, group);
    let candidates: Vec<Candidate> = group
        .iter()
        .map(|&idx| {
            let node = registry.node(idx);
            Candidate {
                id: node.id.clone(),
                publication: node.descriptor.as_ref().and_then(|d| d.publication),
            }
        })
        .collect();

    let forced: Vec<usize> = (0..group.len())
        .filter(|&i| {
            registry
                .callers(group[i], conf)
                .iter()
                .any(|(caller, edge)| edge.force && live.contains(caller))
        })
        .collect();

    if forced.len() > 1 {
        let revisions: Vec<&str> = forced.iter().map(|&i| candidates[i].id.revision.as_str()).collect();
        tracing::warn!(
            "{conf}: {module} is forced to several revisions ({}), ignoring force and using {}",
            revisions.join(", "),
            manager.name()
        );
    }
    let (decision, reason) = if forced.len() == 1 {
        (ConflictDecision::Retain(forced), "forced")
    } else {
        (manager.resolve_conflicts(&candidates), "conflict")
    };

    match decision {
        ConflictDecision::Retain(keep) if !keep.is_empty() => {
            let selected: Vec<_> = keep.iter().map(|&i| candidates[i].id.clone()).collect();
            let names: Vec<String> = selected.iter().map(|s| s.revision.clone()).collect();
            for (i, &idx) in group.iter().enumerate() {
                if keep.contains(&i) {
                    continue;
                }
                let node = registry.node_mut(idx);
                tracing::debug!(
                    "{conf}: {} evicted by {} in favor of {}",
                    node.id,
                    manager.name(),
                    names.join(", ")
                );
                if let Some(data) = node.conf_mut(conf) {
                    data.eviction = Some(EvictionData {
                        conflict_manager: Some(manager.clone()),
                        detail: format!("{reason} with {}", names.join(", ")),
                        selected: selected.clone(),
                    });
                }
            }
        }
        ConflictDecision::Retain(_) => {
            tracing::warn!("{conf}: {} selected nothing for {module}, keeping all", manager.name());
        }
        ConflictDecision::Fail(message) => {
            tracing::warn!("{conf}: {module}: {message}");
            for &idx in group {
                if let Some(data) = registry.node_mut(idx).conf_mut(conf) {
                    data.problem.get_or_insert_with(|| message.clone());
                }
            }
        }
    }
}

/// Manager for a module: the nearest ancestor declaring a matching rule, then
/// the engine's module rules, then the engine default.
fn select_manager(
    registry: &NodeRegistry,
    conf: &str,
    ctx: &EngineContext,
    module: &ModuleId,
    group: &[NodeIndex],
) -> Arc<dyn ConflictManager> {
    let mut nearest: Option<(usize, Arc<dyn ConflictManager>)> = None;
    for &idx in group {
        let declared = registry
            .ancestors(idx, conf)
            .into_iter()
            .enumerate()
            .find_map(|(distance, anc)| {
                let md = registry.node(anc).descriptor.as_ref()?;
                declared_manager(md, module, ctx).map(|m| (distance, m))
            });
        if let Some((distance, m)) = declared {
            if nearest.as_ref().map_or(true, |(d, _)| distance < *d) {
                nearest = Some((distance, m));
            }
        }
    }
    nearest
        .map(|(_, m)| m)
        .or_else(|| ctx.module_conflict_manager(module))
        .unwrap_or_else(|| ctx.default_conflict_manager())
}

fn declared_manager(
    md: &ModuleDescriptor,
    module: &ModuleId,
    ctx: &EngineContext,
) -> Option<Arc<dyn ConflictManager>> {
    for rule in &md.conflict_rules {
        let (Ok(org), Ok(name)) = (compile_glob(&rule.organisation), compile_glob(&rule.module)) else {
            tracing::error!("{}: invalid conflict rule pattern", md.id);
            continue;
        };
        if !org.is_match(&module.organisation) || !name.is_match(&module.name) {
            continue;
        }
        match ctx.conflict_manager(&rule.manager) {
            Some(m) => return Some(m),
            None => tracing::error!("{}: unknown conflict manager: {}", md.id, rule.manager),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::CallerEdge;
    use ivory_core::descriptor::ConflictRule;
    use ivory_core::id::ModuleRevisionId;
    use std::collections::BTreeMap as Map;

    const CONF: &str = "default";

    struct Fixture {
        reg: NodeRegistry,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_root(ModuleDescriptor::new(ModuleRevisionId::new("org", "app", "1.0")))
        }

        fn with_root(md: ModuleDescriptor) -> Self {
            Self {
                reg: NodeRegistry::new(Arc::new(md)),
            }
        }

        fn node(&mut self, name: &str, rev: &str, depth: usize) -> NodeIndex {
            let id = ModuleRevisionId::new("org", name, rev);
            let (idx, _) = self.reg.get_or_insert(&id, &id);
            let node = self.reg.node_mut(idx);
            node.descriptor = Some(Arc::new(ModuleDescriptor::new(id)));
            node.enter_conf(CONF, depth).module_confs.insert(CONF.to_string());
            idx
        }

        fn dep(&mut self, from: NodeIndex, to: NodeIndex, force: bool) {
            let asked = self.reg.node(to).id.clone();
            self.reg.add_caller(
                from,
                to,
                CallerEdge {
                    conf: CONF.to_string(),
                    asked,
                    caller_confs: vec![CONF.to_string()],
                    extra: Map::new(),
                    force,
                },
            );
        }

        fn evicted(&self, idx: NodeIndex) -> Option<&EvictionData> {
            self.reg.node(idx).eviction(CONF)
        }
    }

    #[test]
    fn latest_revision_evicts_older() {
        let mut f = Fixture::new();
        let root = f.reg.root();
        let b19 = f.node("b", "1.9", 1);
        let c = f.node("c", "1.0", 1);
        let b15 = f.node("b", "1.5", 2);
        f.dep(root, b19, false);
        f.dep(root, c, false);
        f.dep(c, b15, false);

        resolve_conflicts(&mut f.reg, CONF, &EngineContext::new());

        assert!(f.evicted(b19).is_none());
        let ev = f.evicted(b15).unwrap();
        assert_eq!(ev.manager_name(), "latest-revision");
        assert_eq!(ev.selected, vec![ModuleRevisionId::new("org", "b", "1.9")]);
        assert!(f.evicted(c).is_none());
    }

    #[test]
    fn eviction_propagates_to_sole_dependents() {
        let mut f = Fixture::new();
        let root = f.reg.root();
        let a2 = f.node("a", "2.0", 1);
        let x = f.node("x", "1.0", 1);
        let a1 = f.node("a", "1.0", 2);
        let only_a1 = f.node("d", "1.0", 3);
        let shared = f.node("s", "1.0", 2);
        f.dep(root, a2, false);
        f.dep(root, x, false);
        f.dep(x, a1, false);
        f.dep(a1, only_a1, false);
        f.dep(a1, shared, false);
        f.dep(a2, shared, false);

        resolve_conflicts(&mut f.reg, CONF, &EngineContext::new());

        assert!(!f.evicted(a1).unwrap().is_transitive());
        let d = f.evicted(only_a1).unwrap();
        assert!(d.is_transitive());
        assert_eq!(d.manager_name(), "transitive");
        assert!(f.evicted(shared).is_none());
    }

    #[test]
    fn transitively_evicted_nodes_leave_their_conflicts() {
        // root -> a1.0 -> c1.0 ; root -> x -> a2.0 ; root -> c0.5
        // a1.0 loses to a2.0, so c1.0 goes away and c0.5 has no conflict left
        let mut f = Fixture::new();
        let root = f.reg.root();
        let a1 = f.node("a", "1.0", 1);
        let x = f.node("x", "1.0", 1);
        let c05 = f.node("c", "0.5", 1);
        let a2 = f.node("a", "2.0", 2);
        let c1 = f.node("c", "1.0", 2);
        f.dep(root, a1, false);
        f.dep(root, x, false);
        f.dep(root, c05, false);
        f.dep(x, a2, false);
        f.dep(a1, c1, false);

        resolve_conflicts(&mut f.reg, CONF, &EngineContext::new());

        assert!(f.evicted(a1).is_some());
        assert!(f.evicted(c1).unwrap().is_transitive());
        assert!(f.evicted(c05).is_none());
    }

    #[test]
    fn module_whose_winner_is_cut_off_is_decided_again() {
        // root -> b1.0 ; root -> x -> a1.0 -> b2.0 ; root -> y -> a2.0
        // b2.0 beats b1.0 first, then a1.0 loses to a2.0 and takes b2.0 with it
        let mut f = Fixture::new();
        let root = f.reg.root();
        let b1 = f.node("b", "1.0", 1);
        let x = f.node("x", "1.0", 1);
        let y = f.node("y", "1.0", 1);
        let a1 = f.node("a", "1.0", 2);
        let a2 = f.node("a", "2.0", 2);
        let b2 = f.node("b", "2.0", 3);
        f.dep(root, b1, false);
        f.dep(root, x, false);
        f.dep(root, y, false);
        f.dep(x, a1, false);
        f.dep(y, a2, false);
        f.dep(a1, b2, false);

        resolve_conflicts(&mut f.reg, CONF, &EngineContext::new());

        assert_eq!(f.evicted(a1).unwrap().manager_name(), "latest-revision");
        assert!(f.evicted(a2).is_none());
        assert!(f.evicted(b2).unwrap().is_transitive());
        assert!(f.evicted(b1).is_none());
    }

    #[test]
    fn competing_forces_fall_back_to_manager() {
        let mut f = Fixture::new();
        let root = f.reg.root();
        let x = f.node("x", "1.0", 1);
        let old = f.node("b", "1.0", 1);
        let new = f.node("b", "2.0", 2);
        f.dep(root, old, true);
        f.dep(root, x, false);
        f.dep(x, new, true);

        resolve_conflicts(&mut f.reg, CONF, &EngineContext::new());
        assert!(f.evicted(new).is_none());
        assert!(f.evicted(old).unwrap().detail.starts_with("conflict"));
    }

    #[test]
    fn partition_is_complete_and_disjoint() {
        let mut f = Fixture::new();
        let root = f.reg.root();
        let revs = ["1.0", "3.0", "2.0"];
        let idxs: Vec<_> = revs.iter().map(|r| f.node("b", r, 1)).collect();
        for &i in &idxs {
            f.dep(root, i, false);
        }
        resolve_conflicts(&mut f.reg, CONF, &EngineContext::new());

        let retained: Vec<_> = idxs.iter().filter(|&&i| f.evicted(i).is_none()).collect();
        let evicted: Vec<_> = idxs.iter().filter(|&&i| f.evicted(i).is_some()).collect();
        assert_eq!(retained.len(), 1);
        assert_eq!(evicted.len(), 2);
        assert_eq!(f.reg.node(*retained[0]).id.revision, "3.0");
    }

    #[test]
    fn identical_revisions_are_all_retained() {
        let mut f = Fixture::new();
        let root = f.reg.root();
        let x = f.node("x", "1.0", 1);
        let y = f.node("y", "1.0", 1);
        let id_a = ModuleRevisionId::new("org", "b", "1.0").with_extra("flavor", "a");
        let id_b = ModuleRevisionId::new("org", "b", "1.0").with_extra("flavor", "b");
        let mut add = |id: &ModuleRevisionId| {
            let (idx, _) = f.reg.get_or_insert(id, id);
            let node = f.reg.node_mut(idx);
            node.descriptor = Some(Arc::new(ModuleDescriptor::new(id.clone())));
            node.enter_conf(CONF, 2);
            idx
        };
        let ba = add(&id_a);
        let bb = add(&id_b);
        f.dep(root, x, false);
        f.dep(root, y, false);
        f.dep(x, ba, false);
        f.dep(y, bb, false);

        resolve_conflicts(&mut f.reg, CONF, &EngineContext::new());
        assert!(f.evicted(ba).is_none());
        assert!(f.evicted(bb).is_none());
    }

    #[test]
    fn forced_dependency_wins() {
        let mut f = Fixture::new();
        let root = f.reg.root();
        let old = f.node("b", "1.0", 1);
        let x = f.node("x", "1.0", 1);
        let new = f.node("b", "2.0", 2);
        f.dep(root, old, true);
        f.dep(root, x, false);
        f.dep(x, new, false);

        resolve_conflicts(&mut f.reg, CONF, &EngineContext::new());
        assert!(f.evicted(old).is_none());
        let ev = f.evicted(new).unwrap();
        assert!(ev.detail.starts_with("forced"));
    }

    #[test]
    fn strict_manager_flags_all_candidates() {
        let mut ctx = EngineContext::new();
        ctx.set_default_conflict_manager(Arc::new(crate::conflict::StrictConflictManager));
        let mut f = Fixture::new();
        let root = f.reg.root();
        let a = f.node("b", "1.0", 1);
        let b = f.node("b", "2.0", 1);
        f.dep(root, a, false);
        f.dep(root, b, false);

        resolve_conflicts(&mut f.reg, CONF, &ctx);
        for idx in [a, b] {
            assert!(f.evicted(idx).is_none());
            assert!(f.reg.node(idx).problem.is_none());
            assert!(f.reg.node(idx).problem_in(CONF).unwrap().contains("strict conflict"));
        }
    }

    #[test]
    fn root_rule_selects_manager() {
        let mut root_md = ModuleDescriptor::new(ModuleRevisionId::new("org", "app", "1.0"));
        root_md.conflict_rules.push(ConflictRule {
            organisation: "org".to_string(),
            module: "b*".to_string(),
            manager: "all".to_string(),
        });
        let mut f = Fixture::with_root(root_md);
        let root = f.reg.root();
        let a = f.node("b", "1.0", 1);
        let b = f.node("b", "2.0", 1);
        f.dep(root, a, false);
        f.dep(root, b, false);

        resolve_conflicts(&mut f.reg, CONF, &EngineContext::new());
        assert!(f.evicted(a).is_none());
        assert!(f.evicted(b).is_none());
    }

    #[test]
    fn failed_nodes_do_not_compete() {
        let mut f = Fixture::new();
        let root = f.reg.root();
        let ok = f.node("b", "1.0", 1);
        let broken = f.node("b", "2.0", 1);
        f.reg.node_mut(broken).set_problem("descriptor unreadable");
        f.dep(root, ok, false);
        f.dep(root, broken, false);

        resolve_conflicts(&mut f.reg, CONF, &EngineContext::new());
        assert!(f.evicted(ok).is_none());
        assert!(f.evicted(broken).is_none());
    }
}
