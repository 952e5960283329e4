//! The resolver abstraction: a named repository access capability bound to a
//! namespace and a latest strategy.
//!
//! Resolver methods speak the resolver's *local* identifier space. Callers
//! translate with [`ResolverBase::namespace`] on the way in and out; the
//! engine does this once per request.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use ivory_core::artifact::{Artifact, DownloadReport};
use ivory_core::descriptor::ModuleDescriptor;
use ivory_core::id::{ModuleId, ModuleRevisionId};
use ivory_util::errors::{IvoryError, IvoryResult};

use crate::context::EngineContext;
use crate::latest::{ArtifactInfo, LatestStrategy};
use crate::namespace::Namespace;
use crate::version::{compare_revisions, RevisionMatcher};

/// An organisation known to a resolver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct OrganisationEntry {
    pub organisation: String,
    pub resolver: String,
}

/// A module known to a resolver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ModuleEntry {
    pub module: ModuleId,
    pub resolver: String,
}

/// A revision of a module known to a resolver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RevisionEntry {
    pub module: ModuleId,
    pub revision: String,
    pub resolver: String,
}

/// A descriptor found by a resolver, tagged with who found it.
#[derive(Debug, Clone)]
pub struct ResolvedModule {
    pub descriptor: Arc<ModuleDescriptor>,
    /// Resolver that supplied the descriptor (a chain reports its child).
    pub resolver: String,
    /// Resolver that will supply the artifacts.
    pub artifact_resolver: String,
}

impl ResolvedModule {
    pub fn new(descriptor: ModuleDescriptor, resolver: &str) -> Self {
        Self {
            descriptor: Arc::new(descriptor),
            resolver: resolver.to_string(),
            artifact_resolver: resolver.to_string(),
        }
    }
}

/// Where and how artifacts are downloaded.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Root of the local artifact cache.
    pub cache_root: PathBuf,
    /// Per-artifact timeout.
    pub timeout: Duration,
}

impl DownloadOptions {
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A repository access capability.
///
/// Listing defaults to "knows nothing"; descriptor lookup, existence and
/// download are required.
#[async_trait]
pub trait DependencyResolver: Send + Sync + fmt::Debug {
    fn base(&self) -> &ResolverBase;

    fn name(&self) -> &str {
        self.base().name()
    }

    async fn list_organisations(&self) -> IvoryResult<Vec<OrganisationEntry>> {
        Ok(Vec::new())
    }

    async fn list_modules(&self, _organisation: &str) -> IvoryResult<Vec<ModuleEntry>> {
        Ok(Vec::new())
    }

    async fn list_revisions(&self, _module: &ModuleId) -> IvoryResult<Vec<RevisionEntry>> {
        Ok(Vec::new())
    }

    /// Descriptor of a concrete revision, `None` when the module is unknown.
    async fn find_descriptor(&self, mrid: &ModuleRevisionId) -> IvoryResult<Option<ResolvedModule>>;

    /// Revisions worth trying for a dynamic ask of `module`.
    async fn candidate_revisions(&self, module: &ModuleId) -> IvoryResult<Vec<String>> {
        Ok(self
            .list_revisions(module)
            .await?
            .into_iter()
            .map(|e| e.revision)
            .collect())
    }

    async fn exists(&self, artifact: &Artifact) -> bool;

    /// Download each artifact; the report has one entry per requested artifact.
    async fn download(&self, artifacts: &[Artifact], options: &DownloadOptions) -> DownloadReport;

    /// Diagnostic hook called when an artifact (or the module itself) could not
    /// be obtained.
    fn report_failure(&self, artifact: Option<&Artifact>) {
        match artifact {
            Some(a) => tracing::debug!("{}: no failure report for {a}", self.name()),
            None => tracing::debug!("{}: no failure report", self.name()),
        }
    }

    /// One-line configuration dump.
    fn describe(&self) -> String {
        self.base().describe()
    }
}

/// Validation flag that may defer to the engine setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Validate {
    Set(bool),
    #[default]
    Unset,
}

impl Validate {
    pub fn resolve(self, ambient: bool) -> bool {
        match self {
            Validate::Set(v) => v,
            Validate::Unset => ambient,
        }
    }
}

impl From<Option<bool>> for Validate {
    fn from(v: Option<bool>) -> Self {
        v.map_or(Validate::Unset, Validate::Set)
    }
}

/// State shared by every resolver: name, validation, namespace and latest
/// strategy references, and the bound engine context.
#[derive(Debug)]
pub struct ResolverBase {
    name: String,
    validate: Validate,
    namespace_name: Option<String>,
    namespace: Option<Arc<Namespace>>,
    latest_name: Option<String>,
    latest: Option<Arc<dyn LatestStrategy>>,
    context: Option<Arc<EngineContext>>,
    resolved_namespace: OnceLock<Arc<Namespace>>,
    resolved_latest: OnceLock<Arc<dyn LatestStrategy>>,
}

impl ResolverBase {
    pub fn new(name: impl Into<String>) -> IvoryResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(IvoryError::config("resolver name is required").into());
        }
        Ok(Self {
            name,
            validate: Validate::Unset,
            namespace_name: None,
            namespace: None,
            latest_name: None,
            latest: None,
            context: None,
            resolved_namespace: OnceLock::new(),
            resolved_latest: OnceLock::new(),
        })
    }

    pub fn with_validate(mut self, validate: Validate) -> Self {
        self.validate = validate;
        self
    }

    pub fn with_namespace_name(mut self, name: impl Into<String>) -> Self {
        self.namespace_name = Some(name.into());
        self
    }

    pub fn with_namespace(mut self, namespace: Arc<Namespace>) -> Self {
        self.namespace = Some(namespace);
        self
    }

    pub fn with_latest_name(mut self, name: impl Into<String>) -> Self {
        self.latest_name = Some(name.into());
        self
    }

    pub fn with_latest(mut self, strategy: Arc<dyn LatestStrategy>) -> Self {
        self.latest = Some(strategy);
        self
    }

    /// Attach the engine context used for named lookups.
    pub fn bind(mut self, context: Arc<EngineContext>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn validate(&self) -> Validate {
        self.validate
    }

    /// Validation flag with an unset value meaning `true`.
    pub fn is_validate(&self) -> bool {
        self.validate.resolve(true)
    }

    /// Validation flag with an unset value taken from `ambient`.
    pub fn is_validate_with(&self, ambient: bool) -> bool {
        self.validate.resolve(ambient)
    }

    pub fn context(&self) -> Option<&Arc<EngineContext>> {
        self.context.as_ref()
    }

    pub fn namespace_name(&self) -> Option<&str> {
        self.namespace_name.as_deref()
    }

    pub fn latest_name(&self) -> Option<&str> {
        self.latest_name.as_deref()
    }

    /// The namespace this resolver speaks, resolved once.
    pub fn namespace(&self) -> Arc<Namespace> {
        self.resolved_namespace
            .get_or_init(|| {
                select_namespace(
                    self.namespace.as_ref(),
                    self.namespace_name.as_deref(),
                    self.context.as_deref(),
                )
            })
            .clone()
    }

    /// The latest strategy, resolved once.
    ///
    /// Fails when no strategy was set and no engine context is bound.
    pub fn latest_strategy(&self) -> IvoryResult<Arc<dyn LatestStrategy>> {
        if let Some(s) = self.resolved_latest.get() {
            return Ok(s.clone());
        }
        let selected = select_latest_strategy(
            self.latest.as_ref(),
            self.latest_name.as_deref(),
            self.context.as_deref(),
        )?;
        Ok(self.resolved_latest.get_or_init(|| selected).clone())
    }

    pub fn describe(&self) -> String {
        let validate = match self.validate {
            Validate::Set(v) => v.to_string(),
            Validate::Unset => "inherit".to_string(),
        };
        format!(
            "{} [namespace={}, latest={}, validate={validate}]",
            self.name,
            self.namespace_name.as_deref().unwrap_or("system"),
            self.latest_name.as_deref().unwrap_or("default"),
        )
    }
}

/// Namespace to use: explicit, else named in `context`, else the system one.
///
/// An unknown name is logged as an error and the system namespace returned.
pub fn select_namespace(
    explicit: Option<&Arc<Namespace>>,
    name: Option<&str>,
    context: Option<&EngineContext>,
) -> Arc<Namespace> {
    if let Some(ns) = explicit {
        return ns.clone();
    }
    let system = || {
        context
            .map(EngineContext::system_namespace)
            .unwrap_or_else(|| Arc::new(Namespace::system()))
    };
    match (name, context) {
        (Some(name), Some(ctx)) => ctx.namespace(name).unwrap_or_else(|| {
            tracing::error!("unknown namespace: {name}");
            ctx.system_namespace()
        }),
        (Some(name), None) => {
            tracing::debug!("no engine context to look up namespace {name}: using system");
            system()
        }
        (None, _) => {
            tracing::debug!("no namespace defined: using system");
            system()
        }
    }
}

/// Latest strategy to use: explicit, else named in `context`, else the
/// context's default. The name `default` also means the context's default.
///
/// An unknown name is logged as an error and the default returned. With no
/// explicit strategy and no context there is nothing to fall back on.
pub fn select_latest_strategy(
    explicit: Option<&Arc<dyn LatestStrategy>>,
    name: Option<&str>,
    context: Option<&EngineContext>,
) -> IvoryResult<Arc<dyn LatestStrategy>> {
    if let Some(s) = explicit {
        return Ok(s.clone());
    }
    let Some(ctx) = context else {
        return Err(IvoryError::illegal_state(
            "no engine context bound and no latest strategy set",
        )
        .into());
    };
    match name {
        None | Some("default") => {
            tracing::debug!("using default latest strategy {}", ctx.default_latest_strategy().name());
            Ok(ctx.default_latest_strategy())
        }
        Some(name) => Ok(ctx.latest_strategy(name).unwrap_or_else(|| {
            tracing::error!("unknown latest strategy: {name}");
            ctx.default_latest_strategy()
        })),
    }
}

/// Existence check by attempting a real download: anything but a failed
/// status means the artifact exists.
pub async fn exists_via_download<R>(resolver: &R, artifact: &Artifact, options: &DownloadOptions) -> bool
where
    R: DependencyResolver + ?Sized,
{
    let report = resolver
        .download(std::slice::from_ref(artifact), options)
        .await;
    report
        .artifact_report(artifact)
        .is_some_and(|r| !r.is_failed())
}

/// Resolve `asked` (local space) against `resolver`.
///
/// Fixed revisions are handed to `fetch` as they are. Dynamic ones ask the
/// resolver for candidate revisions and hand the matching ones to `fetch`
/// from latest to oldest; the first descriptor found (and, for
/// `latest.<status>`, mature enough) wins. `fetch` receives local ids.
pub async fn find_module<R, F, Fut>(
    resolver: &R,
    asked: &ModuleRevisionId,
    mut fetch: F,
) -> IvoryResult<Option<ResolvedModule>>
where
    R: DependencyResolver + ?Sized,
    F: FnMut(ModuleRevisionId) -> Fut,
    Fut: Future<Output = IvoryResult<Option<ResolvedModule>>>,
{
    let matcher = RevisionMatcher::parse(&asked.revision);
    if !matcher.is_dynamic() {
        return fetch(asked.clone()).await;
    }
    let listed = resolver.candidate_revisions(asked.module_id()).await?;
    let strategy = resolver.base().latest_strategy()?;
    let ranked = rank_candidates(&matcher, listed, strategy.as_ref());
    if ranked.is_empty() {
        tracing::debug!("{}: no revision of {} matches {}", resolver.name(), asked.module_id(), asked.revision);
        return Ok(None);
    }

    for revision in ranked {
        let Some(found) = fetch(asked.with_revision(revision.as_str())).await? else {
            continue;
        };
        if matcher.accepts_status(&found.descriptor.status) {
            tracing::debug!("{}: {} resolved to {}", resolver.name(), asked, revision);
            return Ok(Some(found));
        }
    }
    Ok(None)
}

/// Revisions of `listed` accepted by `matcher`, latest first according to
/// `strategy`.
pub fn rank_candidates(
    matcher: &RevisionMatcher,
    mut listed: Vec<String>,
    strategy: &dyn LatestStrategy,
) -> Vec<String> {
    listed.sort_by(|a, b| compare_revisions(a, b));
    listed.dedup();
    let candidates: Vec<ArtifactInfo> = listed
        .into_iter()
        .filter(|r| matcher.accepts(r))
        .map(ArtifactInfo::new)
        .collect();
    strategy
        .sort(candidates)
        .into_iter()
        .rev()
        .map(|c| c.revision)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::latest::LatestLexicoStrategy;

    #[test]
    fn empty_name_is_rejected() {
        assert!(ResolverBase::new("").is_err());
        assert!(ResolverBase::new("  ").is_err());
        assert_eq!(ResolverBase::new("local").unwrap().name(), "local");
    }

    #[test]
    fn validate_tri_state() {
        let base = ResolverBase::new("r").unwrap();
        assert_eq!(base.validate(), Validate::Unset);
        assert!(base.is_validate());
        assert!(!base.is_validate_with(false));

        let off = ResolverBase::new("r").unwrap().with_validate(Validate::Set(false));
        assert!(!off.is_validate());
        assert!(!off.is_validate_with(true));

        assert_eq!(Validate::from(Some(true)), Validate::Set(true));
        assert_eq!(Validate::from(None), Validate::Unset);
    }

    #[test]
    fn namespace_selection_order() {
        let mut ctx = EngineContext::new();
        ctx.add_namespace(Namespace::new("maven"));
        let explicit = Arc::new(Namespace::new("explicit"));

        assert_eq!(select_namespace(Some(&explicit), Some("maven"), Some(&ctx)).name, "explicit");
        assert_eq!(select_namespace(None, Some("maven"), Some(&ctx)).name, "maven");
        assert_eq!(select_namespace(None, Some("unknown"), Some(&ctx)).name, "system");
        assert_eq!(select_namespace(None, Some("maven"), None).name, "system");
        assert_eq!(select_namespace(None, None, Some(&ctx)).name, "system");
    }

    #[test]
    fn latest_strategy_selection_order() {
        let ctx = EngineContext::new();
        let explicit: Arc<dyn LatestStrategy> = Arc::new(LatestLexicoStrategy);

        let s = select_latest_strategy(Some(&explicit), Some("latest-time"), None).unwrap();
        assert_eq!(s.name(), "latest-lexico");
        let s = select_latest_strategy(None, Some("latest-time"), Some(&ctx)).unwrap();
        assert_eq!(s.name(), "latest-time");
        let s = select_latest_strategy(None, None, Some(&ctx)).unwrap();
        assert_eq!(s.name(), "latest-revision");
        let s = select_latest_strategy(None, Some("default"), Some(&ctx)).unwrap();
        assert_eq!(s.name(), "latest-revision");
        let s = select_latest_strategy(None, Some("bogus"), Some(&ctx)).unwrap();
        assert_eq!(s.name(), "latest-revision");
    }

    #[test]
    fn latest_strategy_without_context_is_illegal_state() {
        let err = select_latest_strategy(None, Some("latest-time"), None).unwrap_err();
        assert!(err.to_string().contains("Illegal state"));

        let base = ResolverBase::new("unbound").unwrap();
        assert!(base.latest_strategy().is_err());
    }

    #[test]
    fn base_memoizes_lookups() {
        let mut ctx = EngineContext::new();
        ctx.add_namespace(Namespace::new("ns"));
        let base = ResolverBase::new("r")
            .unwrap()
            .with_namespace_name("ns")
            .with_latest_name("latest-lexico")
            .bind(Arc::new(ctx));
        let first = base.namespace();
        let second = base.namespace();
        assert!(Arc::ptr_eq(&first, &second));
        let a = base.latest_strategy().unwrap();
        let b = base.latest_strategy().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.name(), "latest-lexico");
    }

    #[test]
    fn describe_lists_references() {
        let base = ResolverBase::new("local")
            .unwrap()
            .with_namespace_name("maven")
            .with_validate(Validate::Set(false));
        assert_eq!(
            base.describe(),
            "local [namespace=maven, latest=default, validate=false]"
        );
    }

    #[test]
    fn candidates_ranked_latest_first() {
        let matcher = RevisionMatcher::parse("[1.0,2.0)");
        let listed = vec!["1.9".into(), "2.0".into(), "1.10".into(), "0.9".into(), "1.9".into()];
        let ranked = rank_candidates(&matcher, listed, &crate::latest::LatestRevisionStrategy);
        assert_eq!(ranked, vec!["1.10", "1.9"]);

        let ranked = rank_candidates(&matcher, vec!["1.9".into(), "1.10".into()], &LatestLexicoStrategy);
        assert_eq!(ranked, vec!["1.9", "1.10"]);
    }
}
