//! Local artifact cache.
//!
//! Layout: `<root>/<organisation>/<module>/<revision>/<name>-<revision>.<ext>`.
//! Descriptors fetched from remote repositories are kept next to the
//! artifacts so repeated runs do not hit the network.

use std::fs;
use std::path::{Path, PathBuf};

use ivory_core::artifact::Artifact;
use ivory_core::id::ModuleRevisionId;
use ivory_util::errors::{IvoryError, IvoryResult};

#[derive(Debug, Clone)]
pub struct LocalCache {
    root: PathBuf,
}

impl LocalCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every file of one module revision.
    pub fn module_dir(&self, mrid: &ModuleRevisionId) -> PathBuf {
        self.root
            .join(mrid.organisation())
            .join(mrid.name())
            .join(&mrid.revision)
    }

    pub fn artifact_path(&self, artifact: &Artifact) -> PathBuf {
        self.module_dir(&artifact.module).join(artifact.file_name())
    }

    /// Cached copy of `artifact`, if any.
    pub fn get(&self, artifact: &Artifact) -> Option<PathBuf> {
        let path = self.artifact_path(artifact);
        path.is_file().then_some(path)
    }

    pub fn put(&self, artifact: &Artifact, data: &[u8]) -> IvoryResult<PathBuf> {
        let path = self.artifact_path(artifact);
        write(&path, data)?;
        Ok(path)
    }

    /// Path of a cached descriptor file (`<module>-<revision>.<ext>`).
    pub fn descriptor_path(&self, mrid: &ModuleRevisionId, ext: &str) -> PathBuf {
        self.module_dir(mrid)
            .join(format!("{}-{}.{ext}", mrid.name(), mrid.revision))
    }

    pub fn get_descriptor(&self, mrid: &ModuleRevisionId, ext: &str) -> Option<String> {
        fs::read_to_string(self.descriptor_path(mrid, ext)).ok()
    }

    pub fn put_descriptor(
        &self,
        mrid: &ModuleRevisionId,
        ext: &str,
        content: &str,
    ) -> IvoryResult<PathBuf> {
        let path = self.descriptor_path(mrid, ext);
        write(&path, content.as_bytes())?;
        Ok(path)
    }

    /// Total size of the cache in bytes.
    pub fn size(&self) -> u64 {
        dir_size(&self.root)
    }
}

fn write(path: &Path, data: &[u8]) -> IvoryResult<()> {
    if let Some(dir) = path.parent() {
        ivory_util::fs::ensure_dir(dir).map_err(IvoryError::Io)?;
    }
    fs::write(path, data).map_err(IvoryError::Io)?;
    Ok(())
}

fn dir_size(path: &Path) -> u64 {
    let Ok(entries) = fs::read_dir(path) else {
        return 0;
    };
    entries
        .flatten()
        .filter_map(|e| e.metadata().ok().map(|m| (e.path(), m)))
        .map(|(p, m)| if m.is_dir() { dir_size(&p) } else { m.len() })
        .sum()
}
