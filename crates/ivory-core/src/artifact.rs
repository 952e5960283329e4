//! Published artifacts and the per-artifact download report.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::id::ModuleRevisionId;

/// A file published by a module revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Artifact {
    pub module: ModuleRevisionId,
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub ext: String,
    /// Module configurations publishing this artifact; empty means all of them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub confs: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl Artifact {
    /// The implicit artifact of a module that declares none: `<name>.jar`.
    pub fn default_for(module: &ModuleRevisionId) -> Self {
        Self {
            module: module.clone(),
            name: module.name().to_string(),
            type_: "jar".to_string(),
            ext: "jar".to_string(),
            confs: Vec::new(),
            extra: BTreeMap::new(),
        }
    }

    /// File name in the conventional `<name>-<revision>.<ext>` form.
    pub fn file_name(&self) -> String {
        format!("{}-{}.{}", self.name, self.module.revision, self.ext)
    }

    /// Whether this artifact is published in the given module configuration.
    pub fn in_conf(&self, conf: &str) -> bool {
        self.confs.is_empty() || self.confs.iter().any(|c| c == conf || c == "*")
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}.{}({})", self.module, self.name, self.ext, self.type_)
    }
}

/// Outcome of fetching one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    /// Bytes were transferred into the cache.
    Successful,
    /// The artifact could not be obtained.
    Failed,
    /// The artifact was already present; nothing was transferred.
    NoOp,
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DownloadStatus::Successful => "successful",
            DownloadStatus::Failed => "failed",
            DownloadStatus::NoOp => "no",
        })
    }
}

/// Where an artifact came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactOrigin {
    pub location: String,
    pub is_local: bool,
}

/// Per-artifact result of a download request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactDownloadReport {
    pub artifact: Artifact,
    pub status: DownloadStatus,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<ArtifactOrigin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ArtifactDownloadReport {
    pub fn failed(artifact: &Artifact, message: impl Into<String>) -> Self {
        Self {
            artifact: artifact.clone(),
            status: DownloadStatus::Failed,
            size: 0,
            origin: None,
            local_file: None,
            message: Some(message.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == DownloadStatus::Failed
    }
}

/// Result of downloading a batch of artifacts; one entry per requested artifact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadReport {
    pub artifacts: Vec<ArtifactDownloadReport>,
}

impl DownloadReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, report: ArtifactDownloadReport) {
        self.artifacts.push(report);
    }

    /// Report for a given artifact, if it was part of the request.
    pub fn artifact_report(&self, artifact: &Artifact) -> Option<&ArtifactDownloadReport> {
        self.artifacts.iter().find(|r| &r.artifact == artifact)
    }

    pub fn failed(&self) -> impl Iterator<Item = &ArtifactDownloadReport> {
        self.artifacts.iter().filter(|r| r.is_failed())
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }
}
