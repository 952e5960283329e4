use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use ivory_core::artifact::{Artifact, ArtifactDownloadReport, DownloadReport, DownloadStatus};
use ivory_core::descriptor::{Configuration, DependencyDescriptor, ModuleDescriptor};
use ivory_core::id::{ModuleId, ModuleRevisionId};
use ivory_resolver::chain::ChainResolver;
use ivory_resolver::context::EngineContext;
use ivory_resolver::latest::LatestLexicoStrategy;
use ivory_resolver::namespace::{Namespace, NamespaceRule};
use ivory_resolver::resolver::{
    DependencyResolver, DownloadOptions, ModuleEntry, OrganisationEntry, ResolvedModule,
    ResolverBase, RevisionEntry,
};
use ivory_resolver::{ResolveEngine, ResolveOptions};
use ivory_util::errors::IvoryResult;

/// An in-memory repository that records every descriptor lookup.
#[derive(Debug)]
struct MemoryResolver {
    base: ResolverBase,
    modules: Vec<ModuleDescriptor>,
    lookups: Mutex<Vec<ModuleRevisionId>>,
    /// Artifact names whose download never finishes.
    hanging: HashSet<String>,
}

impl MemoryResolver {
    fn new(base: ResolverBase, modules: Vec<ModuleDescriptor>) -> Self {
        Self {
            base,
            modules,
            lookups: Mutex::new(Vec::new()),
            hanging: HashSet::new(),
        }
    }

    fn lookups_of(&self, id: &ModuleRevisionId) -> usize {
        self.lookups.lock().unwrap().iter().filter(|l| *l == id).count()
    }
}

#[async_trait]
impl DependencyResolver for MemoryResolver {
    fn base(&self) -> &ResolverBase {
        &self.base
    }

    async fn list_organisations(&self) -> IvoryResult<Vec<OrganisationEntry>> {
        let orgs: HashSet<&str> = self.modules.iter().map(|m| m.id.organisation()).collect();
        Ok(orgs
            .into_iter()
            .map(|o| OrganisationEntry {
                organisation: o.to_string(),
                resolver: self.name().to_string(),
            })
            .collect())
    }

    async fn list_modules(&self, organisation: &str) -> IvoryResult<Vec<ModuleEntry>> {
        Ok(self
            .modules
            .iter()
            .filter(|m| m.id.organisation() == organisation)
            .map(|m| ModuleEntry {
                module: m.module_id().clone(),
                resolver: self.name().to_string(),
            })
            .collect())
    }

    async fn list_revisions(&self, module: &ModuleId) -> IvoryResult<Vec<RevisionEntry>> {
        Ok(self
            .modules
            .iter()
            .filter(|m| m.module_id() == module)
            .map(|m| RevisionEntry {
                module: module.clone(),
                revision: m.id.revision.clone(),
                resolver: self.name().to_string(),
            })
            .collect())
    }

    async fn find_descriptor(&self, mrid: &ModuleRevisionId) -> IvoryResult<Option<ResolvedModule>> {
        self.lookups.lock().unwrap().push(mrid.clone());
        Ok(self
            .modules
            .iter()
            .find(|m| m.module_id() == mrid.module_id() && m.id.revision == mrid.revision)
            .map(|m| ResolvedModule::new(m.clone(), self.name())))
    }

    async fn exists(&self, artifact: &Artifact) -> bool {
        self.modules.iter().any(|m| m.id == artifact.module)
    }

    async fn download(&self, artifacts: &[Artifact], options: &DownloadOptions) -> DownloadReport {
        let mut report = DownloadReport::new();
        for a in artifacts {
            if self.hanging.contains(&a.name) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            report.add(ArtifactDownloadReport {
                artifact: a.clone(),
                status: DownloadStatus::Successful,
                size: 42,
                origin: None,
                local_file: Some(options.cache_root.join(a.file_name())),
                message: None,
            });
        }
        report
    }
}

fn mrid(org: &str, name: &str, rev: &str) -> ModuleRevisionId {
    ModuleRevisionId::new(org, name, rev)
}

fn module(id: ModuleRevisionId, deps: &[ModuleRevisionId]) -> ModuleDescriptor {
    let mut md = ModuleDescriptor::new(id);
    md.dependencies = deps.iter().cloned().map(DependencyDescriptor::new).collect();
    md
}

fn engine(ctx: Arc<EngineContext>, resolvers: Vec<Arc<dyn DependencyResolver>>) -> ResolveEngine {
    let mut engine = ResolveEngine::new(ctx);
    for r in resolvers {
        engine.add_resolver(r);
    }
    engine
}

fn offline() -> ResolveOptions {
    ResolveOptions::new(std::env::temp_dir()).with_download(false)
}

#[tokio::test]
async fn range_and_fixed_request_resolve_to_latest_revision() {
    let ctx = Arc::new(EngineContext::new());
    let repo = Arc::new(MemoryResolver::new(
        ResolverBase::new("local").unwrap().bind(ctx.clone()),
        vec![
            module(mrid("org", "b", "1.0"), &[]),
            module(mrid("org", "b", "1.5"), &[]),
            module(mrid("org", "b", "1.9"), &[]),
            module(mrid("org", "c", "1.0"), &[mrid("org", "b", "1.5")]),
        ],
    ));
    let engine = engine(ctx, vec![repo.clone()]);
    let root = module(
        mrid("org", "a", "1.0"),
        &[mrid("org", "b", "[1.0,2.0)"), mrid("org", "c", "1.0")],
    );

    let report = engine.resolve(root, &offline()).await.unwrap();
    assert!(!report.has_error(), "{:?}", report.all_problems());

    let conf = report.configuration("default").unwrap();
    let retained: Vec<String> = conf.retained().map(|r| r.id.to_string()).collect();
    assert!(retained.contains(&"org#b;1.9".to_string()));
    assert!(retained.contains(&"org#c;1.0".to_string()));

    let evicted: Vec<_> = conf.evicted().collect();
    assert_eq!(evicted.len(), 1);
    assert_eq!(evicted[0].id, mrid("org", "b", "1.5"));
    let eviction = evicted[0].evicted.as_ref().unwrap();
    assert_eq!(eviction.manager, "latest-revision");
    assert_eq!(eviction.selected, vec!["1.9".to_string()]);

    let winner = conf.revision(&mrid("org", "b", "1.9")).unwrap();
    assert!(winner.searched);
    assert_eq!(winner.depth, 1);
    assert!(conf.revision(&mrid("org", "b", "1.0")).is_none());
}

#[tokio::test]
async fn shared_dependency_is_fetched_once() {
    let ctx = Arc::new(EngineContext::new());
    let b = mrid("org", "b", "1.5");
    let repo = Arc::new(MemoryResolver::new(
        ResolverBase::new("local").unwrap().bind(ctx.clone()),
        vec![
            module(b.clone(), &[]),
            module(mrid("org", "c", "1.0"), &[b.clone()]),
            module(mrid("org", "d", "1.0"), &[b.clone()]),
        ],
    ));
    let engine = engine(ctx, vec![repo.clone()]);
    let root = module(
        mrid("org", "a", "1.0"),
        &[mrid("org", "c", "1.0"), mrid("org", "d", "1.0")],
    );

    let report = engine.resolve(root, &offline()).await.unwrap();
    let conf = report.configuration("default").unwrap();
    let shared: Vec<_> = conf.revisions().filter(|r| r.id == b).collect();
    assert_eq!(shared.len(), 1);
    assert_eq!(shared[0].callers.len(), 2);
    assert_eq!(shared[0].depth, 2);
    assert_eq!(repo.lookups_of(&b), 1);
}

#[tokio::test]
async fn dynamic_ask_reuses_an_already_fetched_revision() {
    let ctx = Arc::new(EngineContext::new());
    let b19 = mrid("org", "b", "1.9");
    let repo = Arc::new(MemoryResolver::new(
        ResolverBase::new("local").unwrap().bind(ctx.clone()),
        vec![
            module(mrid("org", "b", "1.0"), &[]),
            module(b19.clone(), &[]),
            module(mrid("org", "c", "1.0"), &[mrid("org", "b", "[1.0,2.0)")]),
        ],
    ));
    let engine = engine(ctx, vec![repo.clone()]);
    let root = module(mrid("org", "a", "1.0"), &[b19.clone(), mrid("org", "c", "1.0")]);

    let report = engine.resolve(root, &offline()).await.unwrap();
    assert!(!report.has_error(), "{:?}", report.all_problems());
    let conf = report.configuration("default").unwrap();
    let b = conf.revision(&b19).unwrap();
    assert_eq!(b.callers.len(), 2);
    assert!(b.evicted.is_none());
    assert_eq!(repo.lookups_of(&b19), 1);
    assert_eq!(repo.lookups_of(&mrid("org", "b", "1.0")), 0);
}

#[tokio::test]
async fn conflict_winner_cut_off_later_gives_way_to_the_loser() {
    // a;1.0 loses to a;2.0 and takes b;2.0 down with it, so b;1.0 must stay
    let ctx = Arc::new(EngineContext::new());
    let repo = Arc::new(MemoryResolver::new(
        ResolverBase::new("local").unwrap().bind(ctx.clone()),
        vec![
            module(mrid("org", "b", "1.0"), &[]),
            module(mrid("org", "b", "2.0"), &[]),
            module(mrid("org", "a", "1.0"), &[mrid("org", "b", "2.0")]),
            module(mrid("org", "a", "2.0"), &[]),
            module(mrid("org", "x", "1.0"), &[mrid("org", "a", "1.0")]),
            module(mrid("org", "y", "1.0"), &[mrid("org", "a", "2.0")]),
        ],
    ));
    let engine = engine(ctx, vec![repo]);
    let root = module(
        mrid("org", "app", "1.0"),
        &[mrid("org", "b", "1.0"), mrid("org", "x", "1.0"), mrid("org", "y", "1.0")],
    );

    let report = engine.resolve(root, &offline()).await.unwrap();
    assert!(!report.has_error(), "{:?}", report.all_problems());
    let conf = report.configuration("default").unwrap();
    let retained: Vec<String> = conf.retained().map(|r| r.id.to_string()).collect();
    assert!(retained.contains(&"org#b;1.0".to_string()));
    assert!(retained.contains(&"org#a;2.0".to_string()));

    let b2 = conf.revision(&mrid("org", "b", "2.0")).unwrap();
    assert_eq!(b2.evicted.as_ref().unwrap().manager, "transitive");
    let a1 = conf.revision(&mrid("org", "a", "1.0")).unwrap();
    assert_eq!(a1.evicted.as_ref().unwrap().manager, "latest-revision");
}

#[tokio::test]
async fn configurations_settle_conflicts_independently() {
    let config = ivory_core::config::EngineConfig::from_str(
        r#"
        [[module]]
        organisation = "org"
        name = "b"
        conflict-manager = "strict"
        "#,
    )
    .unwrap();
    let ctx = Arc::new(EngineContext::from_config(&config).unwrap());
    let b1 = mrid("org", "b", "1.0");
    let repo = Arc::new(MemoryResolver::new(
        ResolverBase::new("local").unwrap().bind(ctx.clone()),
        vec![
            module(b1.clone(), &[]),
            module(mrid("org", "b", "2.0"), &[]),
            module(mrid("org", "c", "1.0"), &[mrid("org", "b", "2.0")]),
        ],
    ));
    let engine = engine(ctx, vec![repo]);
    let mut root = ModuleDescriptor::new(mrid("org", "app", "1.0"));
    root.configurations = vec![Configuration::new("compile"), Configuration::new("test")];
    root.dependencies = vec![
        DependencyDescriptor::new(b1.clone()).with_mapping("compile->*;test->*"),
        DependencyDescriptor::new(mrid("org", "c", "1.0")).with_mapping("test->*"),
    ];
    let tmp = tempfile::tempdir().unwrap();

    let report = engine.resolve(root, &ResolveOptions::new(tmp.path())).await.unwrap();
    assert!(report.has_error());

    let compile = report.configuration("compile").unwrap();
    assert!(!compile.has_error(), "{:?}", compile.unresolved().collect::<Vec<_>>());
    let b = compile.revision(&b1).unwrap();
    assert!(b.error.is_none());
    assert!(b.downloaded);

    let test = report.configuration("test").unwrap();
    assert_eq!(test.unresolved().count(), 2);
    let b = test.revision(&b1).unwrap();
    assert!(b.error.as_deref().unwrap().contains("strict conflict"));
    assert!(!b.downloaded);
}

#[tokio::test]
async fn dependency_cycles_terminate() {
    let ctx = Arc::new(EngineContext::new());
    let repo = Arc::new(MemoryResolver::new(
        ResolverBase::new("local").unwrap().bind(ctx.clone()),
        vec![
            module(mrid("org", "b", "1.0"), &[mrid("org", "c", "1.0")]),
            module(mrid("org", "c", "1.0"), &[mrid("org", "b", "1.0")]),
        ],
    ));
    let engine = engine(ctx, vec![repo]);
    let root = module(mrid("org", "a", "1.0"), &[mrid("org", "b", "1.0")]);

    let report = engine.resolve(root, &offline()).await.unwrap();
    let conf = report.configuration("default").unwrap();
    assert_eq!(conf.retained().count(), 2);
    let b = conf.revision(&mrid("org", "b", "1.0")).unwrap();
    assert_eq!(b.callers.len(), 2);
}

#[tokio::test]
async fn missing_module_is_reported_as_error() {
    let ctx = Arc::new(EngineContext::new());
    let repo = Arc::new(MemoryResolver::new(
        ResolverBase::new("local").unwrap().bind(ctx.clone()),
        Vec::new(),
    ));
    let engine = engine(ctx, vec![repo]);
    let root = module(mrid("org", "a", "1.0"), &[mrid("org", "ghost", "1.+")]);

    let report = engine.resolve(root, &offline()).await.unwrap();
    assert!(report.has_error());
    let conf = report.configuration("default").unwrap();
    let unresolved: Vec<_> = conf.unresolved().collect();
    assert_eq!(unresolved.len(), 1);
    assert_eq!(unresolved[0].id, mrid("org", "ghost", "1.+"));
    assert!(report.all_problems()[0].contains("module not found"));
}

#[tokio::test]
async fn unknown_root_configuration_is_a_problem() {
    let ctx = Arc::new(EngineContext::new());
    let engine = engine(ctx, Vec::new());
    let root = module(mrid("org", "a", "1.0"), &[]);
    let options = offline().with_confs(vec!["test".to_string()]);

    let report = engine.resolve(root, &options).await.unwrap();
    assert!(report.has_error());
    assert!(report.problems[0].contains("unknown configuration 'test'"));
}

#[tokio::test]
async fn non_transitive_dependency_is_not_expanded() {
    let ctx = Arc::new(EngineContext::new());
    let repo = Arc::new(MemoryResolver::new(
        ResolverBase::new("local").unwrap().bind(ctx.clone()),
        vec![
            module(mrid("org", "b", "1.0"), &[mrid("org", "c", "1.0")]),
            module(mrid("org", "c", "1.0"), &[]),
        ],
    ));
    let engine = engine(ctx, vec![repo]);
    let mut root = module(mrid("org", "a", "1.0"), &[mrid("org", "b", "1.0")]);
    root.dependencies[0].transitive = false;

    let report = engine.resolve(root, &offline()).await.unwrap();
    let conf = report.configuration("default").unwrap();
    assert_eq!(conf.module_ids().len(), 1);
}

#[tokio::test]
async fn chain_stops_at_first_child_with_descriptor() {
    let ctx = Arc::new(EngineContext::new());
    let b = mrid("org", "b", "1.0");
    let first = Arc::new(MemoryResolver::new(
        ResolverBase::new("first").unwrap().bind(ctx.clone()),
        vec![module(b.clone(), &[])],
    ));
    let second = Arc::new(MemoryResolver::new(
        ResolverBase::new("second").unwrap().bind(ctx.clone()),
        vec![module(b.clone(), &[])],
    ));
    let chain = Arc::new(ChainResolver::new(
        ResolverBase::new("main").unwrap().bind(ctx.clone()),
        vec![first.clone(), second.clone()],
    ));
    let engine = engine(ctx, vec![chain]);
    let root = module(mrid("org", "a", "1.0"), &[b.clone()]);

    let report = engine
        .resolve(root, &ResolveOptions::new(std::env::temp_dir()))
        .await
        .unwrap();
    let conf = report.configuration("default").unwrap();
    let r = conf.revision(&b).unwrap();
    assert_eq!(r.resolver.as_deref(), Some("first"));
    assert_eq!(second.lookups_of(&b), 0);
    assert_eq!(r.artifacts.len(), 1);
    assert_eq!(r.artifacts[0].status, DownloadStatus::Successful);
    assert!(r.downloaded);
}

#[tokio::test]
async fn chain_compares_dynamic_revisions_across_children() {
    let ctx = Arc::new(EngineContext::new());
    let first = Arc::new(MemoryResolver::new(
        ResolverBase::new("first").unwrap().bind(ctx.clone()),
        vec![module(mrid("org", "b", "1.1"), &[])],
    ));
    let second = Arc::new(MemoryResolver::new(
        ResolverBase::new("second").unwrap().bind(ctx.clone()),
        vec![module(mrid("org", "b", "1.4"), &[])],
    ));
    let chain = Arc::new(ChainResolver::new(
        ResolverBase::new("main").unwrap().bind(ctx.clone()),
        vec![first, second],
    ));
    let engine = engine(ctx, vec![chain]);
    let root = module(mrid("org", "a", "1.0"), &[mrid("org", "b", "1.+")]);

    let report = engine.resolve(root, &offline()).await.unwrap();
    let conf = report.configuration("default").unwrap();
    let r = conf.retained().next().unwrap();
    assert_eq!(r.id, mrid("org", "b", "1.4"));
    assert_eq!(r.resolver.as_deref(), Some("second"));
}

#[tokio::test]
async fn resolver_namespace_is_applied_both_ways() {
    let ctx = Arc::new(EngineContext::new());
    let namespace = Namespace::new("maven")
        .with_rule(NamespaceRule::renaming(Some(("apache", "org.apache")), None).unwrap());
    let repo = Arc::new(MemoryResolver::new(
        ResolverBase::new("remote")
            .unwrap()
            .with_namespace(Arc::new(namespace))
            .bind(ctx.clone()),
        vec![
            module(
                mrid("org.apache", "commons", "2.0"),
                &[mrid("org.apache", "io", "1.0")],
            ),
            module(mrid("org.apache", "io", "1.0"), &[]),
        ],
    ));
    let engine = engine(ctx, vec![repo.clone()]);
    let root = module(mrid("org", "a", "1.0"), &[mrid("apache", "commons", "2.0")]);

    let report = engine.resolve(root, &offline()).await.unwrap();
    assert!(!report.has_error(), "{:?}", report.all_problems());
    let conf = report.configuration("default").unwrap();
    let ids: Vec<String> = conf.retained().map(|r| r.id.to_string()).collect();
    assert_eq!(ids, vec!["apache#commons;2.0", "apache#io;1.0"]);
    assert_eq!(repo.lookups_of(&mrid("org.apache", "io", "1.0")), 1);
}

#[tokio::test]
async fn unknown_latest_strategy_falls_back_to_default() {
    let ctx = Arc::new(EngineContext::new());
    let modules = vec![
        module(mrid("org", "b", "1.9"), &[]),
        module(mrid("org", "b", "1.10"), &[]),
    ];
    let repo = Arc::new(MemoryResolver::new(
        ResolverBase::new("local")
            .unwrap()
            .with_latest_name("no-such-strategy")
            .bind(ctx.clone()),
        modules.clone(),
    ));
    let engine1 = engine(ctx.clone(), vec![repo.clone()]);
    let root = module(mrid("org", "a", "1.0"), &[mrid("org", "b", "latest.integration")]);

    let report = engine1.resolve(root.clone(), &offline()).await.unwrap();
    let conf = report.configuration("default").unwrap();
    assert_eq!(conf.retained().next().unwrap().id.revision, "1.10");
    assert_eq!(repo.base().latest_strategy().unwrap().name(), "latest-revision");

    let lexico = Arc::new(MemoryResolver::new(
        ResolverBase::new("local")
            .unwrap()
            .with_latest(Arc::new(LatestLexicoStrategy))
            .bind(ctx.clone()),
        modules,
    ));
    let engine2 = engine(ctx, vec![lexico]);
    let report = engine2.resolve(root, &offline()).await.unwrap();
    let conf = report.configuration("default").unwrap();
    assert_eq!(conf.retained().next().unwrap().id.revision, "1.9");
}

#[tokio::test]
async fn hanging_download_fails_alone() {
    let ctx = Arc::new(EngineContext::new());
    let id = mrid("org", "b", "1.0");
    let mut md = module(id.clone(), &[]);
    let fast = Artifact::default_for(&id);
    let mut slow = Artifact::default_for(&id);
    slow.name = "b-sources".to_string();
    md.artifacts = vec![fast.clone(), slow.clone()];

    let mut repo = MemoryResolver::new(
        ResolverBase::new("local").unwrap().bind(ctx.clone()),
        vec![md],
    );
    repo.hanging.insert("b-sources".to_string());
    let engine = engine(ctx, vec![Arc::new(repo)]);
    let root = module(mrid("org", "a", "1.0"), &[id.clone()]);
    let tmp = tempfile::tempdir().unwrap();
    let options = ResolveOptions::new(tmp.path()).with_download_timeout(Duration::from_millis(100));

    let report = engine.resolve(root, &options).await.unwrap();
    let conf = report.configuration("default").unwrap();
    let r = conf.revision(&id).unwrap();
    assert_eq!(r.artifacts.len(), 2);
    let status = |name: &str| {
        r.artifacts
            .iter()
            .find(|a| a.artifact.name == name)
            .map(|a| a.status)
            .unwrap()
    };
    assert_eq!(status("b"), DownloadStatus::Successful);
    assert_eq!(status("b-sources"), DownloadStatus::Failed);
    assert!(r.downloaded);
    assert!(report.has_error());
    assert!(report.all_problems().iter().any(|p| p.contains("timed out")));
}

#[tokio::test]
async fn strict_module_rule_surfaces_conflict_as_errors() {
    let config = ivory_core::config::EngineConfig::from_str(
        r#"
        [[module]]
        organisation = "org"
        name = "b"
        conflict-manager = "strict"
        "#,
    )
    .unwrap();
    let ctx = Arc::new(EngineContext::from_config(&config).unwrap());
    let repo = Arc::new(MemoryResolver::new(
        ResolverBase::new("local").unwrap().bind(ctx.clone()),
        vec![
            module(mrid("org", "b", "1.0"), &[]),
            module(mrid("org", "b", "2.0"), &[]),
            module(mrid("org", "c", "1.0"), &[mrid("org", "b", "2.0")]),
        ],
    ));
    let engine = engine(ctx, vec![repo]);
    let root = module(
        mrid("org", "a", "1.0"),
        &[mrid("org", "b", "1.0"), mrid("org", "c", "1.0")],
    );

    let report = engine.resolve(root, &offline()).await.unwrap();
    assert!(report.has_error());
    let conf = report.configuration("default").unwrap();
    assert_eq!(conf.evicted().count(), 0);
    assert_eq!(conf.unresolved().count(), 2);
}
