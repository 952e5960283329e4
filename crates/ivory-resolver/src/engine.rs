//! The resolve engine: drives a run from a root descriptor to a report.
//!
//! Discovery is breadth-first, one depth level at a time. The resolver
//! lookups of a level run concurrently on a `JoinSet` bounded by a semaphore;
//! the registry is only written on the driving task once the level is joined.
//! Conflicts of a configuration are resolved after its closure, then the
//! retained modules' artifacts are downloaded.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use petgraph::graph::NodeIndex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use ivory_core::artifact::{Artifact, ArtifactDownloadReport, DownloadStatus};
use ivory_core::descriptor::{DependencyDescriptor, ModuleDescriptor};
use ivory_core::id::{ModuleId, ModuleRevisionId};
use ivory_util::errors::{IvoryError, IvoryResult};

use crate::cache::{FetchCache, FetchOutcome};
use crate::context::EngineContext;
use crate::eviction;
use crate::graph::{CallerEdge, Node, NodeRegistry};
use crate::report::ResolveReport;
use crate::resolver::{find_module, DependencyResolver, DownloadOptions, ResolvedModule};
use crate::version::is_dynamic;

const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Knobs of a single run.
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Root configurations to resolve; `*` means every public one.
    pub confs: Vec<String>,
    /// Download the retained artifacts after resolution.
    pub download: bool,
    pub max_concurrency: usize,
    pub download_timeout: Duration,
    pub cache_root: PathBuf,
}

impl ResolveOptions {
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            confs: vec!["*".to_string()],
            download: true,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            download_timeout: Duration::from_secs(120),
            cache_root: cache_root.into(),
        }
    }

    pub fn with_confs(mut self, confs: Vec<String>) -> Self {
        if !confs.is_empty() {
            self.confs = confs;
        }
        self
    }

    pub fn with_download(mut self, download: bool) -> Self {
        self.download = download;
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }
}

/// Resolvers plus the context they were bound to.
#[derive(Debug, Clone)]
pub struct ResolveEngine {
    context: Arc<EngineContext>,
    resolvers: BTreeMap<String, Arc<dyn DependencyResolver>>,
    default_resolver: Option<String>,
}

/// A dependency waiting to be looked up, as declared by its caller.
#[derive(Debug, Clone)]
struct Pending {
    caller: NodeIndex,
    dependency: DependencyDescriptor,
    caller_confs: Vec<String>,
    targets: Vec<String>,
    depth: usize,
}

impl ResolveEngine {
    pub fn new(context: Arc<EngineContext>) -> Self {
        Self {
            context,
            resolvers: BTreeMap::new(),
            default_resolver: None,
        }
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.context
    }

    /// Register a resolver. The first one registered becomes the default
    /// until another is chosen.
    pub fn add_resolver(&mut self, resolver: Arc<dyn DependencyResolver>) {
        let name = resolver.name().to_string();
        if self.default_resolver.is_none() {
            self.default_resolver = Some(name.clone());
        }
        self.resolvers.insert(name, resolver);
    }

    pub fn set_default_resolver(&mut self, name: impl Into<String>) {
        self.default_resolver = Some(name.into());
    }

    pub fn default_resolver(&self) -> Option<&str> {
        self.default_resolver.as_deref()
    }

    pub fn resolver(&self, name: &str) -> Option<Arc<dyn DependencyResolver>> {
        self.resolvers.get(name).cloned()
    }

    pub fn resolvers(&self) -> impl Iterator<Item = &Arc<dyn DependencyResolver>> {
        self.resolvers.values()
    }

    /// Resolver in charge of `module`: the first matching module rule, else
    /// the default resolver.
    pub fn resolver_for(&self, module: &ModuleId) -> Option<Arc<dyn DependencyResolver>> {
        if let Some(name) = self.context.module_resolver(module) {
            match self.resolver(name) {
                Some(r) => return Some(r),
                None => tracing::error!("unknown resolver: {name} (module rule for {module})"),
            }
        }
        self.default_resolver.as_deref().and_then(|n| self.resolver(n))
    }

    /// Resolve `root` and, unless disabled, download the retained artifacts.
    pub async fn resolve(
        &self,
        root: ModuleDescriptor,
        options: &ResolveOptions,
    ) -> IvoryResult<ResolveReport> {
        let root = Arc::new(root);
        let (confs, missing) = root.select_confs(&options.confs);
        let mut problems: Vec<String> = missing
            .iter()
            .map(|c| format!("unknown configuration '{c}' in {}", root.id))
            .collect();
        for p in &problems {
            tracing::warn!("{p}");
        }
        if self.resolvers.is_empty() && !root.dependencies.is_empty() {
            problems.push("no resolver configured".to_string());
        }

        tracing::info!("resolving {} [{}]", root.id, confs.iter().cloned().collect::<Vec<_>>().join(", "));

        let mut registry = NodeRegistry::new(root.clone());
        let cache = Arc::new(FetchCache::new());
        let semaphore = Arc::new(Semaphore::new(options.max_concurrency.max(1)));

        for conf in &confs {
            self.discover(&mut registry, conf, &cache, &semaphore).await;
            eviction::resolve_conflicts(&mut registry, conf, &self.context);
        }
        tracing::debug!("{} nodes, {} descriptor fetches", registry.len(), cache.fetch_count());

        let confs: Vec<String> = confs.into_iter().collect();
        if options.download {
            self.download(&mut registry, &confs, options, &semaphore).await;
        }

        Ok(ResolveReport::build(&registry, &confs, problems, Utc::now()))
    }

    /// Breadth-first closure of `conf` from the root.
    async fn discover(
        &self,
        registry: &mut NodeRegistry,
        conf: &str,
        cache: &Arc<FetchCache>,
        semaphore: &Arc<Semaphore>,
    ) {
        let root = registry.root();
        let mut expanded: HashSet<(NodeIndex, String)> = HashSet::new();
        let mut level = Vec::new();
        registry
            .node_mut(root)
            .enter_conf(conf, 0)
            .module_confs
            .insert(conf.to_string());
        expanded.insert((root, conf.to_string()));
        if let Some(md) = registry.node(root).descriptor.clone() {
            queue_dependencies(&mut level, root, &md, conf, 1);
        }

        while !level.is_empty() {
            let outcomes = self.fetch_level(&level, cache, semaphore).await;
            let mut next = Vec::new();
            for pending in level {
                let outcome = outcomes
                    .get(&pending.dependency.asked)
                    .cloned()
                    .unwrap_or_else(|| Err("lookup did not complete".to_string()));
                self.record(registry, conf, pending, outcome, &mut expanded, &mut next);
            }
            level = next;
        }
    }

    /// Look up every distinct ask of a level concurrently.
    async fn fetch_level(
        &self,
        level: &[Pending],
        cache: &Arc<FetchCache>,
        semaphore: &Arc<Semaphore>,
    ) -> HashMap<ModuleRevisionId, FetchOutcome> {
        let asks: HashSet<&ModuleRevisionId> = level.iter().map(|p| &p.dependency.asked).collect();
        let mut join_set = JoinSet::new();
        for asked in asks {
            let asked = asked.clone();
            let resolver = self.resolver_for(asked.module_id());
            let cache = cache.clone();
            let sem = semaphore.clone();
            let validate = self.context.validate();
            join_set.spawn(async move {
                let _permit = sem.acquire().await;
                let outcome = fetch_module(resolver, &cache, &asked, validate).await;
                (asked, outcome)
            });
        }

        let mut outcomes = HashMap::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((asked, outcome)) => {
                    outcomes.insert(asked, outcome);
                }
                Err(e) => tracing::error!("resolver task failed: {e}"),
            }
        }
        outcomes
    }

    /// Merge one looked-up dependency into the registry and queue its own
    /// dependencies for the next level.
    fn record(
        &self,
        registry: &mut NodeRegistry,
        conf: &str,
        pending: Pending,
        outcome: FetchOutcome,
        expanded: &mut HashSet<(NodeIndex, String)>,
        next: &mut Vec<Pending>,
    ) {
        let asked = &pending.dependency.asked;
        let idx = match outcome {
            Ok(Some(found)) => {
                let (idx, created) = registry.get_or_insert(&found.descriptor.id, asked);
                if created {
                    let node = registry.node_mut(idx);
                    node.resolver = Some(found.resolver);
                    node.artifact_resolver = Some(found.artifact_resolver);
                    node.descriptor = Some(found.descriptor);
                }
                idx
            }
            Ok(None) => {
                let (idx, _) = registry.get_or_insert(asked, asked);
                registry
                    .node_mut(idx)
                    .set_problem(format!("module not found: {asked}"));
                idx
            }
            Err(message) => {
                let (idx, _) = registry.get_or_insert(asked, asked);
                registry.node_mut(idx).set_problem(message);
                idx
            }
        };

        registry.add_caller(
            pending.caller,
            idx,
            CallerEdge {
                conf: conf.to_string(),
                asked: asked.clone(),
                caller_confs: pending.caller_confs.clone(),
                extra: pending.dependency.extra.clone(),
                force: pending.dependency.force,
            },
        );

        let node = registry.node_mut(idx);
        node.enter_conf(conf, pending.depth).searched |= is_dynamic(&asked.revision);
        let Some(md) = node.descriptor.clone() else {
            return;
        };

        let mut module_confs = Vec::new();
        for target in &pending.targets {
            let (found, missing) = md.select_confs(std::slice::from_ref(target));
            for m in missing {
                node.set_problem(format!(
                    "configuration not found in {}: '{m}', required from {}",
                    md.id,
                    pending.caller_confs.join(",")
                ));
            }
            module_confs.extend(found);
        }

        let Some(data) = node.conf_mut(conf) else {
            return;
        };
        data.module_confs.extend(module_confs.iter().cloned());

        if !pending.dependency.transitive {
            return;
        }
        for mconf in module_confs {
            if expanded.insert((idx, mconf.clone())) {
                queue_dependencies(next, idx, &md, &mconf, pending.depth + 1);
            }
        }
    }

    /// Download the artifacts of every node retained in at least one
    /// configuration.
    async fn download(
        &self,
        registry: &mut NodeRegistry,
        confs: &[String],
        options: &ResolveOptions,
        semaphore: &Arc<Semaphore>,
    ) {
        let download_options =
            DownloadOptions::new(options.cache_root.clone()).with_timeout(options.download_timeout);
        let mut join_set = JoinSet::new();

        for idx in registry.indices().collect::<Vec<_>>() {
            if idx == registry.root() {
                continue;
            }
            let node = registry.node(idx);
            let Some(md) = node.descriptor.as_ref().filter(|_| node.problem.is_none()) else {
                continue;
            };
            let mut wanted: Vec<Artifact> = Vec::new();
            for conf in confs {
                let Some(data) = node
                    .conf(conf)
                    .filter(|d| d.eviction.is_none() && d.problem.is_none())
                else {
                    continue;
                };
                for mconf in &data.module_confs {
                    for a in md.artifacts_for(mconf) {
                        if !wanted.contains(&a) {
                            wanted.push(a);
                        }
                    }
                }
            }
            if wanted.is_empty() {
                continue;
            }

            let resolver = node
                .artifact_resolver
                .as_deref()
                .and_then(|n| self.resolver(n))
                .or_else(|| self.resolver_for(node.module_id()));
            for (position, artifact) in wanted.into_iter().enumerate() {
                let resolver = resolver.clone();
                let sem = semaphore.clone();
                let opts = download_options.clone();
                join_set.spawn(async move {
                    let _permit = sem.acquire().await;
                    let report = download_artifact(resolver, &artifact, &opts).await;
                    (idx, position, report)
                });
            }
        }

        let mut reports: Vec<(NodeIndex, usize, ArtifactDownloadReport)> = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(r) => reports.push(r),
                Err(e) => tracing::error!("download task failed: {e}"),
            }
        }
        reports.sort_by_key(|(idx, position, _)| (idx.index(), *position));

        for (idx, _, report) in reports {
            let node = registry.node_mut(idx);
            if report.status == DownloadStatus::Successful {
                let wanted_in: Vec<String> = confs
                    .iter()
                    .filter(|c| node_wants(&*node, c, &report.artifact))
                    .cloned()
                    .collect();
                for conf in wanted_in {
                    if let Some(data) = node.conf_mut(&conf) {
                        data.downloaded = true;
                    }
                }
            }
            node.artifacts.push(report);
        }
    }
}

/// Whether `artifact` belongs to the node as retained in `conf`.
fn node_wants(node: &Node, conf: &str, artifact: &Artifact) -> bool {
    let (Some(md), Some(data)) = (node.descriptor.as_ref(), node.conf(conf)) else {
        return false;
    };
    data.eviction.is_none()
        && data.problem.is_none()
        && data
            .module_confs
            .iter()
            .any(|m| md.artifacts_for(m).contains(artifact))
}

fn queue_dependencies(
    queue: &mut Vec<Pending>,
    caller: NodeIndex,
    md: &ModuleDescriptor,
    conf: &str,
    depth: usize,
) {
    for (dependency, caller_confs, targets) in md.dependencies_for(conf) {
        queue.push(Pending {
            caller,
            dependency: dependency.clone(),
            caller_confs,
            targets,
            depth,
        });
    }
}

/// Resolve a system-space ask through the fetch cache.
///
/// Every concrete descriptor is fetched under its own id, including the
/// candidates tried while searching a dynamic ask, so a revision reached both
/// ways is fetched once. The search itself is cached under the asked id.
async fn fetch_module(
    resolver: Option<Arc<dyn DependencyResolver>>,
    cache: &FetchCache,
    asked: &ModuleRevisionId,
    validate: bool,
) -> FetchOutcome {
    let Some(resolver) = resolver else {
        return Err(format!("no resolver found for {}", asked.module_id()));
    };
    let resolver = &*resolver;
    if !is_dynamic(&asked.revision) {
        return fetch_concrete(resolver, cache, asked, validate).await;
    }
    cache
        .get_or_fetch(asked, || search(resolver, cache, asked, validate))
        .await
}

/// Pick the revision of a dynamic ask; candidates go through the cache.
async fn search(
    resolver: &dyn DependencyResolver,
    cache: &FetchCache,
    asked: &ModuleRevisionId,
    validate: bool,
) -> FetchOutcome {
    let namespace = resolver.base().namespace();
    let local = namespace.from_system(asked);
    tracing::debug!("{}: searching {local}", resolver.name());

    let fetch = |candidate: ModuleRevisionId| {
        let system = namespace.to_system(&candidate);
        async move {
            let outcome: IvoryResult<Option<ResolvedModule>> = fetch_concrete(resolver, cache, &system, validate)
                .await
                .map_err(|message| IvoryError::resolution(message).into());
            outcome
        }
    };
    match find_module(resolver, &local, fetch).await {
        Ok(Some(found)) => Ok(Some(found)),
        Ok(None) => {
            resolver.report_failure(None);
            Ok(None)
        }
        Err(e) => Err(e.to_string()),
    }
}

async fn fetch_concrete(
    resolver: &dyn DependencyResolver,
    cache: &FetchCache,
    id: &ModuleRevisionId,
    validate: bool,
) -> FetchOutcome {
    cache.get_or_fetch(id, || lookup(resolver, id, validate)).await
}

/// One descriptor query for a concrete revision, translated into and out of
/// the resolver's namespace.
async fn lookup(
    resolver: &dyn DependencyResolver,
    asked: &ModuleRevisionId,
    ambient_validate: bool,
) -> FetchOutcome {
    let namespace = resolver.base().namespace();
    let local = namespace.from_system(asked);
    tracing::debug!("{}: looking up {local}", resolver.name());

    let found = match resolver.find_descriptor(&local).await {
        Ok(Some(found)) => found,
        Ok(None) => {
            resolver.report_failure(None);
            return Ok(None);
        }
        Err(e) => {
            resolver.report_failure(None);
            return Err(format!("{}: {e}", resolver.name()));
        }
    };

    let mut md = (*found.descriptor).clone();
    md.id = namespace.to_system(&md.id);
    if md.id.extra.is_empty() && !asked.extra.is_empty() {
        md.id.extra = asked.extra.clone();
    }
    if md.extra.is_empty() {
        md.extra = md.id.extra.clone();
    }
    for dd in &mut md.dependencies {
        dd.asked = namespace.to_system(&dd.asked);
    }
    for artifact in &mut md.artifacts {
        artifact.module = md.id.clone();
    }

    if resolver.base().is_validate_with(ambient_validate) {
        if md.module_id() != asked.module_id() {
            return Err(format!(
                "bad descriptor found by {}: expected {} found {}",
                resolver.name(),
                asked.module_id(),
                md.module_id()
            ));
        }
        if md.id.revision != asked.revision {
            return Err(format!(
                "bad descriptor found by {}: expected revision {} found {}",
                resolver.name(),
                asked.revision,
                md.id.revision
            ));
        }
    }

    Ok(Some(ResolvedModule {
        descriptor: Arc::new(md),
        resolver: found.resolver,
        artifact_resolver: found.artifact_resolver,
    }))
}

/// Download one artifact (system space) with a timeout. The report always
/// refers to the artifact as it was asked.
async fn download_artifact(
    resolver: Option<Arc<dyn DependencyResolver>>,
    artifact: &Artifact,
    options: &DownloadOptions,
) -> ArtifactDownloadReport {
    let Some(resolver) = resolver else {
        return ArtifactDownloadReport::failed(artifact, "no resolver found");
    };
    let mut local = artifact.clone();
    local.module = resolver.base().namespace().from_system(&artifact.module);

    let outcome = tokio::time::timeout(
        options.timeout,
        resolver.download(std::slice::from_ref(&local), options),
    )
    .await;
    let mut report = match outcome {
        Ok(report) => report.artifact_report(&local).cloned().unwrap_or_else(|| {
            ArtifactDownloadReport::failed(artifact, format!("{} returned no report", resolver.name()))
        }),
        Err(_) => ArtifactDownloadReport::failed(
            artifact,
            format!("download timed out after {}s", options.timeout.as_secs()),
        ),
    };
    if report.is_failed() {
        resolver.report_failure(Some(&local));
        tracing::warn!("{}: {}", artifact, report.message.as_deref().unwrap_or("download failed"));
    }
    report.artifact = artifact.clone();
    report
}
