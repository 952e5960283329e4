//! A resolver for remote Maven-layout repositories.
//!
//! Descriptors are POM files translated to module descriptors; revisions are
//! listed from `maven-metadata.xml`. Fetched POMs are kept in the local cache.

use async_trait::async_trait;
use reqwest::Client;

use ivory_core::artifact::{
    Artifact, ArtifactDownloadReport, ArtifactOrigin, DownloadReport, DownloadStatus,
};
use ivory_core::id::{ModuleId, ModuleRevisionId};
use ivory_resolver::resolver::{
    DependencyResolver, DownloadOptions, ResolvedModule, ResolverBase, RevisionEntry,
};
use ivory_util::errors::IvoryResult;

use crate::cache::LocalCache;
use crate::{checksum, download, metadata, pom};

/// Maven Central base URL.
pub const MAVEN_CENTRAL_URL: &str = "https://repo.maven.apache.org/maven2";

#[derive(Debug)]
pub struct MavenResolver {
    base: ResolverBase,
    url: String,
    client: Client,
    cache: LocalCache,
    checksums: bool,
}

impl MavenResolver {
    pub fn new(base: ResolverBase, url: Option<&str>, client: Client, cache: LocalCache) -> Self {
        Self {
            base,
            url: url.unwrap_or(MAVEN_CENTRAL_URL).trim_end_matches('/').to_string(),
            client,
            cache,
            checksums: true,
        }
    }

    pub fn with_checksums(mut self, checksums: bool) -> Self {
        self.checksums = checksums;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// `org.example:lib` becomes `<url>/org/example/lib`.
    fn module_url(&self, module: &ModuleId) -> String {
        format!(
            "{}/{}/{}",
            self.url,
            module.organisation.replace('.', "/"),
            module.name
        )
    }

    pub fn pom_url(&self, mrid: &ModuleRevisionId) -> String {
        format!(
            "{}/{}/{}-{}.pom",
            self.module_url(mrid.module_id()),
            mrid.revision,
            mrid.name(),
            mrid.revision
        )
    }

    pub fn metadata_url(&self, module: &ModuleId) -> String {
        format!("{}/maven-metadata.xml", self.module_url(module))
    }

    pub fn artifact_url(&self, artifact: &Artifact) -> String {
        let file = match artifact.extra.get("classifier") {
            Some(c) => format!(
                "{}-{}-{c}.{}",
                artifact.name, artifact.module.revision, artifact.ext
            ),
            None => artifact.file_name(),
        };
        format!(
            "{}/{}/{file}",
            self.module_url(artifact.module.module_id()),
            artifact.module.revision
        )
    }

    async fn fetch_pom(&self, mrid: &ModuleRevisionId) -> IvoryResult<Option<(String, Option<chrono::DateTime<chrono::Utc>>)>> {
        if let Some(cached) = self.cache.get_descriptor(mrid, "pom") {
            tracing::debug!("{}: cached pom for {mrid}", self.name());
            return Ok(Some((cached, None)));
        }
        let url = self.pom_url(mrid);
        tracing::debug!("{}: fetching {url}", self.name());
        let Some(fetched) = download::fetch(&self.client, &url, None).await? else {
            return Ok(None);
        };
        if self.checksums {
            checksum::verify_remote(&self.client, &url, &fetched.bytes).await?;
        }
        let text = String::from_utf8_lossy(&fetched.bytes).into_owned();
        if let Err(e) = self.cache.put_descriptor(mrid, "pom", &text) {
            tracing::warn!("could not cache pom of {mrid}: {e}");
        }
        Ok(Some((text, fetched.last_modified)))
    }

    async fn download_one(&self, artifact: &Artifact, cache: &LocalCache) -> ArtifactDownloadReport {
        let url = self.artifact_url(artifact);
        let origin = Some(ArtifactOrigin {
            location: url.clone(),
            is_local: false,
        });

        if let Some(path) = cache.get(artifact) {
            let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            return ArtifactDownloadReport {
                artifact: artifact.clone(),
                status: DownloadStatus::NoOp,
                size,
                origin,
                local_file: Some(path),
                message: None,
            };
        }

        let label = artifact.file_name();
        let fetched = match download::fetch(&self.client, &url, Some(&label)).await {
            Ok(Some(f)) => f,
            Ok(None) => return ArtifactDownloadReport::failed(artifact, format!("not found at {url}")),
            Err(e) => return ArtifactDownloadReport::failed(artifact, e.to_string()),
        };
        if self.checksums {
            if let Err(e) = checksum::verify_remote(&self.client, &url, &fetched.bytes).await {
                return ArtifactDownloadReport::failed(artifact, e.to_string());
            }
        }
        match cache.put(artifact, &fetched.bytes) {
            Ok(path) => ArtifactDownloadReport {
                artifact: artifact.clone(),
                status: DownloadStatus::Successful,
                size: fetched.bytes.len() as u64,
                origin,
                local_file: Some(path),
                message: None,
            },
            Err(e) => ArtifactDownloadReport::failed(artifact, e.to_string()),
        }
    }
}

#[async_trait]
impl DependencyResolver for MavenResolver {
    fn base(&self) -> &ResolverBase {
        &self.base
    }

    async fn list_revisions(&self, module: &ModuleId) -> IvoryResult<Vec<RevisionEntry>> {
        let url = self.metadata_url(module);
        let Some(xml) = download::fetch_text(&self.client, &url).await? else {
            tracing::debug!("{}: no metadata at {url}", self.name());
            return Ok(Vec::new());
        };
        let meta = metadata::parse_metadata(&xml)?;
        Ok(meta
            .versions
            .into_iter()
            .map(|revision| RevisionEntry {
                module: module.clone(),
                revision,
                resolver: self.name().to_string(),
            })
            .collect())
    }

    async fn find_descriptor(&self, mrid: &ModuleRevisionId) -> IvoryResult<Option<ResolvedModule>> {
        let Some((xml, last_modified)) = self.fetch_pom(mrid).await? else {
            return Ok(None);
        };
        let parsed = pom::parse_pom(&xml)?;
        let mut md = parsed.to_descriptor(mrid);
        if md.publication.is_none() {
            md.publication = last_modified;
        }
        Ok(Some(ResolvedModule::new(md, self.name())))
    }

    async fn exists(&self, artifact: &Artifact) -> bool {
        download::head(&self.client, &self.artifact_url(artifact)).await
    }

    async fn download(&self, artifacts: &[Artifact], options: &DownloadOptions) -> DownloadReport {
        let cache = LocalCache::new(&options.cache_root);
        let mut report = DownloadReport::new();
        for artifact in artifacts {
            report.add(self.download_one(artifact, &cache).await);
        }
        report
    }

    fn report_failure(&self, artifact: Option<&Artifact>) {
        match artifact {
            Some(a) => tracing::debug!("{}: tried {}", self.name(), self.artifact_url(a)),
            None => tracing::debug!("{}: nothing found under {}", self.name(), self.url),
        }
    }

    fn describe(&self) -> String {
        format!("{} (maven: {})", self.base.describe(), self.url)
    }
}
