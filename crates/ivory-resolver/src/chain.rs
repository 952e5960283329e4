//! A resolver delegating to an ordered list of child resolvers.
//!
//! The chain speaks a single local identifier space: its own namespace is
//! applied at the chain boundary and children are called with the chain's
//! local ids as they are.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;

use ivory_core::artifact::{Artifact, ArtifactDownloadReport, DownloadReport};
use ivory_core::id::{ModuleId, ModuleRevisionId};
use ivory_util::errors::IvoryResult;

use crate::resolver::{
    DependencyResolver, DownloadOptions, ModuleEntry, OrganisationEntry, ResolvedModule,
    ResolverBase, RevisionEntry,
};

#[derive(Debug)]
pub struct ChainResolver {
    base: ResolverBase,
    children: Vec<Arc<dyn DependencyResolver>>,
    return_first: bool,
}

impl ChainResolver {
    pub fn new(base: ResolverBase, children: Vec<Arc<dyn DependencyResolver>>) -> Self {
        Self {
            base,
            children,
            return_first: false,
        }
    }

    /// Resolve dynamic revisions from the first child that lists the module
    /// instead of comparing every child's revisions.
    pub fn with_return_first(mut self, return_first: bool) -> Self {
        self.return_first = return_first;
        self
    }

    pub fn children(&self) -> &[Arc<dyn DependencyResolver>] {
        &self.children
    }
}

#[async_trait]
impl DependencyResolver for ChainResolver {
    fn base(&self) -> &ResolverBase {
        &self.base
    }

    async fn list_organisations(&self) -> IvoryResult<Vec<OrganisationEntry>> {
        for child in &self.children {
            let found = child.list_organisations().await?;
            if !found.is_empty() {
                return Ok(found);
            }
        }
        Ok(Vec::new())
    }

    async fn list_modules(&self, organisation: &str) -> IvoryResult<Vec<ModuleEntry>> {
        for child in &self.children {
            let found = child.list_modules(organisation).await?;
            if !found.is_empty() {
                return Ok(found);
            }
        }
        Ok(Vec::new())
    }

    async fn list_revisions(&self, module: &ModuleId) -> IvoryResult<Vec<RevisionEntry>> {
        for child in &self.children {
            let found = child.list_revisions(module).await?;
            if !found.is_empty() {
                return Ok(found);
            }
        }
        Ok(Vec::new())
    }

    /// First child that knows the revision wins. Child errors are skipped;
    /// the first one is returned only if no child found the module.
    async fn find_descriptor(&self, mrid: &ModuleRevisionId) -> IvoryResult<Option<ResolvedModule>> {
        let mut first_error = None;
        for child in &self.children {
            match child.find_descriptor(mrid).await {
                Ok(Some(found)) => return Ok(Some(found)),
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!("{}: {} failed on {mrid}: {e}", self.name(), child.name());
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }

    /// With `return_first` the first child listing anything decides;
    /// otherwise the listings of every child are merged.
    async fn candidate_revisions(&self, module: &ModuleId) -> IvoryResult<Vec<String>> {
        if self.return_first {
            return Ok(self
                .list_revisions(module)
                .await?
                .into_iter()
                .map(|e| e.revision)
                .collect());
        }
        let mut listed = BTreeSet::new();
        for child in &self.children {
            match child.list_revisions(module).await {
                Ok(entries) => listed.extend(entries.into_iter().map(|e| e.revision)),
                Err(e) => tracing::debug!("{}: listing {module} failed: {e}", child.name()),
            }
        }
        Ok(listed.into_iter().collect())
    }

    async fn exists(&self, artifact: &Artifact) -> bool {
        for child in &self.children {
            if child.exists(artifact).await {
                return true;
            }
        }
        false
    }

    /// Each artifact comes from the first child that does not fail it.
    async fn download(&self, artifacts: &[Artifact], options: &DownloadOptions) -> DownloadReport {
        let mut outcome: Vec<Option<ArtifactDownloadReport>> = vec![None; artifacts.len()];
        let mut pending: Vec<usize> = (0..artifacts.len()).collect();

        for child in &self.children {
            if pending.is_empty() {
                break;
            }
            let batch: Vec<Artifact> = pending.iter().map(|&i| artifacts[i].clone()).collect();
            let report = child.download(&batch, options).await;
            pending.retain(|&i| {
                let Some(r) = report.artifact_report(&artifacts[i]) else {
                    return true;
                };
                let failed = r.is_failed();
                outcome[i] = Some(r.clone());
                failed
            });
        }

        let mut report = DownloadReport::new();
        for (artifact, r) in artifacts.iter().zip(outcome) {
            report.add(r.unwrap_or_else(|| {
                ArtifactDownloadReport::failed(artifact, format!("no resolver in {} has it", self.name()))
            }));
        }
        report
    }

    fn report_failure(&self, artifact: Option<&Artifact>) {
        for child in &self.children {
            child.report_failure(artifact);
        }
    }

    fn describe(&self) -> String {
        let names: Vec<&str> = self.children.iter().map(|c| c.name()).collect();
        format!("{} (chain: {})", self.base.describe(), names.join(", "))
    }
}
