//! Operation: list what a resolver knows about.
//!
//! Listings are asked in the resolver's own namespace and translated back,
//! so names are printed the way the rest of the engine sees them.

use std::sync::Arc;

use ivory_core::id::ModuleId;
use ivory_resolver::version::compare_revisions;
use ivory_resolver::DependencyResolver;
use ivory_util::errors::{IvoryError, IvoryResult};

use crate::Session;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListQuery {
    Organisations,
    Modules { organisation: String },
    Revisions { organisation: String, module: String },
}

/// Entries matching `query`, sorted; revisions oldest first.
pub async fn list(session: &Session, query: &ListQuery, resolver: Option<&str>) -> IvoryResult<Vec<String>> {
    let r = pick(session, resolver)?;
    let ns = r.base().namespace();
    let mut out: Vec<String> = match query {
        ListQuery::Organisations => r
            .list_organisations()
            .await?
            .into_iter()
            .map(|e| ns.module_to_system(&ModuleId::new(e.organisation, "")).organisation)
            .collect(),
        ListQuery::Modules { organisation } => {
            let local = ns.module_from_system(&ModuleId::new(organisation.clone(), ""));
            r.list_modules(&local.organisation)
                .await?
                .into_iter()
                .map(|e| ns.module_to_system(&e.module).name)
                .collect()
        }
        ListQuery::Revisions {
            organisation,
            module,
        } => {
            let system = ModuleId::new(organisation.clone(), module.clone());
            let local = ns.module_from_system(&system);
            let mut revs: Vec<String> = r
                .list_revisions(&local)
                .await?
                .into_iter()
                .map(|e| ns.to_system(&e.module.at(e.revision)).revision)
                .collect();
            revs.sort_by(|a, b| compare_revisions(a, b));
            revs.dedup();
            return Ok(revs);
        }
    };
    out.sort();
    out.dedup();
    Ok(out)
}

fn pick(session: &Session, name: Option<&str>) -> IvoryResult<Arc<dyn DependencyResolver>> {
    let name = match name.or(session.engine.default_resolver()) {
        Some(n) => n,
        None => return Err(IvoryError::config("no resolver configured").into()),
    };
    session
        .engine
        .resolver(name)
        .ok_or_else(|| IvoryError::config(format!("unknown resolver: {name}")).into())
}
