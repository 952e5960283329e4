//! A resolver reading a directory tree laid out by patterns.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use ivory_core::artifact::{
    Artifact, ArtifactDownloadReport, ArtifactOrigin, DownloadReport, DownloadStatus,
};
use ivory_core::descriptor::ModuleDescriptor;
use ivory_core::id::{ModuleId, ModuleRevisionId};
use ivory_resolver::resolver::{
    DependencyResolver, DownloadOptions, ModuleEntry, OrganisationEntry, ResolvedModule,
    ResolverBase, RevisionEntry,
};
use ivory_util::errors::{IvoryError, IvoryResult};

use crate::cache::LocalCache;
use crate::checksum;
use crate::pattern::{self, DEFAULT_ARTIFACT_PATTERN, DEFAULT_IVY_PATTERN};

#[derive(Debug)]
pub struct FilesystemResolver {
    base: ResolverBase,
    root: PathBuf,
    ivy_pattern: String,
    artifact_pattern: String,
    checksums: bool,
}

impl FilesystemResolver {
    pub fn new(base: ResolverBase, root: impl Into<PathBuf>) -> Self {
        Self {
            base,
            root: root.into(),
            ivy_pattern: DEFAULT_IVY_PATTERN.to_string(),
            artifact_pattern: DEFAULT_ARTIFACT_PATTERN.to_string(),
            checksums: true,
        }
    }

    pub fn with_ivy_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.ivy_pattern = pattern.into();
        self
    }

    pub fn with_artifact_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.artifact_pattern = pattern.into();
        self
    }

    pub fn with_checksums(mut self, checksums: bool) -> Self {
        self.checksums = checksums;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn descriptor_path(&self, mrid: &ModuleRevisionId) -> IvoryResult<PathBuf> {
        let rel = pattern::substitute(&self.ivy_pattern, &pattern::module_tokens(mrid))?;
        Ok(self.root.join(rel))
    }

    fn artifact_path(&self, artifact: &Artifact) -> IvoryResult<PathBuf> {
        let rel = pattern::substitute(&self.artifact_pattern, &pattern::artifact_tokens(artifact))?;
        Ok(self.root.join(rel))
    }

    fn copy_to_cache(&self, artifact: &Artifact, cache: &LocalCache) -> ArtifactDownloadReport {
        let source = match self.artifact_path(artifact) {
            Ok(p) => p,
            Err(e) => return ArtifactDownloadReport::failed(artifact, e.to_string()),
        };
        if !source.is_file() {
            return ArtifactDownloadReport::failed(
                artifact,
                format!("not found at {}", source.display()),
            );
        }
        let origin = Some(ArtifactOrigin {
            location: source.display().to_string(),
            is_local: true,
        });
        let target = cache.artifact_path(artifact);

        let source_len = std::fs::metadata(&source).map(|m| m.len()).unwrap_or(0);
        if target.is_file() && std::fs::metadata(&target).map(|m| m.len()).ok() == Some(source_len) {
            return ArtifactDownloadReport {
                artifact: artifact.clone(),
                status: DownloadStatus::NoOp,
                size: source_len,
                origin,
                local_file: Some(target),
                message: None,
            };
        }

        match self.copy_verified(&source, &target) {
            Ok(size) => ArtifactDownloadReport {
                artifact: artifact.clone(),
                status: DownloadStatus::Successful,
                size,
                origin,
                local_file: Some(target),
                message: None,
            },
            Err(e) => ArtifactDownloadReport {
                origin,
                ..ArtifactDownloadReport::failed(artifact, e.to_string())
            },
        }
    }

    fn copy_verified(&self, source: &Path, target: &Path) -> IvoryResult<u64> {
        if self.checksums {
            let data = std::fs::read(source).map_err(IvoryError::Io)?;
            checksum::verify_local(source, &data)?;
        }
        Ok(ivory_util::fs::copy_file(source, target).map_err(IvoryError::Io)?)
    }
}

#[async_trait]
impl DependencyResolver for FilesystemResolver {
    fn base(&self) -> &ResolverBase {
        &self.base
    }

    async fn list_organisations(&self) -> IvoryResult<Vec<OrganisationEntry>> {
        let orgs = pattern::list_token_values(
            &self.root,
            &self.ivy_pattern,
            pattern::ORGANISATION,
            &BTreeMap::new(),
        )?;
        Ok(orgs
            .into_iter()
            .map(|organisation| OrganisationEntry {
                organisation,
                resolver: self.name().to_string(),
            })
            .collect())
    }

    async fn list_modules(&self, organisation: &str) -> IvoryResult<Vec<ModuleEntry>> {
        let mut known = BTreeMap::new();
        known.insert(pattern::ORGANISATION.to_string(), organisation.to_string());
        let modules =
            pattern::list_token_values(&self.root, &self.ivy_pattern, pattern::MODULE, &known)?;
        Ok(modules
            .into_iter()
            .map(|name| ModuleEntry {
                module: ModuleId::new(organisation, name),
                resolver: self.name().to_string(),
            })
            .collect())
    }

    async fn list_revisions(&self, module: &ModuleId) -> IvoryResult<Vec<RevisionEntry>> {
        let mut known = BTreeMap::new();
        known.insert(pattern::ORGANISATION.to_string(), module.organisation.clone());
        known.insert(pattern::MODULE.to_string(), module.name.clone());
        let mut revisions =
            pattern::list_token_values(&self.root, &self.ivy_pattern, pattern::REVISION, &known)?;
        if revisions.is_empty() {
            revisions = pattern::list_token_values(
                &self.root,
                &self.artifact_pattern,
                pattern::REVISION,
                &known,
            )?;
        }
        Ok(revisions
            .into_iter()
            .map(|revision| RevisionEntry {
                module: module.clone(),
                revision,
                resolver: self.name().to_string(),
            })
            .collect())
    }

    /// Reads the module file; a module with a default artifact but no module
    /// file gets a synthesised descriptor.
    async fn find_descriptor(&self, mrid: &ModuleRevisionId) -> IvoryResult<Option<ResolvedModule>> {
        let path = self.descriptor_path(mrid)?;
        if path.is_file() {
            tracing::debug!("{}: reading {}", self.name(), path.display());
            let md = ModuleDescriptor::from_path(&path)?;
            return Ok(Some(ResolvedModule::new(md, self.name())));
        }
        let artifact = self.artifact_path(&Artifact::default_for(mrid))?;
        if artifact.is_file() {
            tracing::debug!("{}: no module file for {mrid}, using its artifact", self.name());
            return Ok(Some(ResolvedModule::new(
                ModuleDescriptor::synthesised(mrid.clone()),
                self.name(),
            )));
        }
        Ok(None)
    }

    async fn exists(&self, artifact: &Artifact) -> bool {
        self.artifact_path(artifact).is_ok_and(|p| p.is_file())
    }

    async fn download(&self, artifacts: &[Artifact], options: &DownloadOptions) -> DownloadReport {
        let cache = LocalCache::new(&options.cache_root);
        let mut report = DownloadReport::new();
        for artifact in artifacts {
            report.add(self.copy_to_cache(artifact, &cache));
        }
        report
    }

    fn describe(&self) -> String {
        format!(
            "{} (filesystem: {}, {})",
            self.base.describe(),
            self.root.display(),
            self.ivy_pattern
        )
    }
}
