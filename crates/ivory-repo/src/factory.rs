//! Building a ready-to-use engine from settings.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use ivory_core::config::{EngineConfig, ResolverConfig, ResolverKind};
use ivory_resolver::chain::ChainResolver;
use ivory_resolver::context::EngineContext;
use ivory_resolver::resolver::{DependencyResolver, ResolverBase, Validate};
use ivory_resolver::ResolveEngine;
use ivory_util::errors::{IvoryError, IvoryResult};

use crate::cache::LocalCache;
use crate::download;
use crate::filesystem::FilesystemResolver;
use crate::maven::MavenResolver;

/// Build the engine context and every declared resolver.
///
/// Chains may reference resolvers declared after them; a child that is not
/// declared, or a chain that contains itself, is a configuration error.
pub fn build_engine(config: &EngineConfig) -> IvoryResult<ResolveEngine> {
    let context = Arc::new(EngineContext::from_config(config)?);
    let mut builder = Builder {
        config,
        context: context.clone(),
        client: None,
        cache: LocalCache::new(config.cache_dir()),
        built: BTreeMap::new(),
        building: Vec::new(),
    };

    let mut engine = ResolveEngine::new(context);
    for rc in &config.resolvers {
        let resolver = builder.build(&rc.name)?;
        engine.add_resolver(resolver);
    }

    if let Some(ref name) = config.settings.default_resolver {
        if engine.resolver(name).is_none() {
            return Err(IvoryError::config(format!("unknown default resolver: {name}")).into());
        }
        engine.set_default_resolver(name.clone());
    }
    tracing::debug!(
        "engine built with {} resolver(s), default {:?}",
        config.resolvers.len(),
        engine.default_resolver()
    );
    Ok(engine)
}

struct Builder<'a> {
    config: &'a EngineConfig,
    context: Arc<EngineContext>,
    client: Option<Client>,
    cache: LocalCache,
    built: BTreeMap<String, Arc<dyn DependencyResolver>>,
    building: Vec<String>,
}

impl Builder<'_> {
    fn build(&mut self, name: &str) -> IvoryResult<Arc<dyn DependencyResolver>> {
        if let Some(r) = self.built.get(name) {
            return Ok(r.clone());
        }
        if self.building.iter().any(|n| n == name) {
            return Err(IvoryError::config(format!(
                "resolver cycle: {} -> {name}",
                self.building.join(" -> ")
            ))
            .into());
        }
        let Some(rc) = self.config.resolver(name) else {
            return Err(IvoryError::config(format!("unknown resolver: {name}")).into());
        };

        self.building.push(name.to_string());
        let resolver = self.build_kind(rc);
        self.building.pop();

        let resolver = resolver?;
        self.built.insert(name.to_string(), resolver.clone());
        Ok(resolver)
    }

    fn build_kind(&mut self, rc: &ResolverConfig) -> IvoryResult<Arc<dyn DependencyResolver>> {
        let base = self.base(rc)?;
        let resolver: Arc<dyn DependencyResolver> = match rc.kind {
            ResolverKind::Filesystem => {
                let Some(ref root) = rc.root else {
                    return Err(IvoryError::config(format!(
                        "filesystem resolver '{}' needs a root",
                        rc.name
                    ))
                    .into());
                };
                let mut r = FilesystemResolver::new(base, PathBuf::from(root))
                    .with_checksums(rc.checksums);
                if let Some(ref p) = rc.ivy_pattern {
                    r = r.with_ivy_pattern(p.clone());
                }
                if let Some(ref p) = rc.artifact_pattern {
                    r = r.with_artifact_pattern(p.clone());
                }
                Arc::new(r)
            }
            ResolverKind::Maven => {
                let client = self.client()?;
                Arc::new(
                    MavenResolver::new(base, rc.url.as_deref(), client, self.cache.clone())
                        .with_checksums(rc.checksums),
                )
            }
            ResolverKind::Chain => {
                let children = rc
                    .children
                    .iter()
                    .map(|child| self.build(child))
                    .collect::<IvoryResult<Vec<_>>>()?;
                Arc::new(ChainResolver::new(base, children).with_return_first(rc.return_first))
            }
        };
        Ok(resolver)
    }

    fn base(&self, rc: &ResolverConfig) -> IvoryResult<ResolverBase> {
        let mut base = ResolverBase::new(rc.name.clone())?.with_validate(Validate::from(rc.validate));
        if let Some(ref ns) = rc.namespace {
            base = base.with_namespace_name(ns.clone());
        }
        if let Some(ref latest) = rc.latest {
            base = base.with_latest_name(latest.clone());
        }
        Ok(base.bind(self.context.clone()))
    }

    /// One HTTP client shared by every Maven resolver.
    fn client(&mut self) -> IvoryResult<Client> {
        if let Some(ref c) = self.client {
            return Ok(c.clone());
        }
        let timeout = Duration::from_secs(self.config.settings.download_timeout);
        let client = download::build_client(timeout)?;
        self.client = Some(client.clone());
        Ok(client)
    }
}
