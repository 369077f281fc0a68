//! Local backup storage layout.

use std::path::{Path, PathBuf};

use log::debug;

use crate::artifact::{ArtifactKind, ArtifactSpec};
use crate::error::StorageError;

/// Default storage root, relative to the working directory.
pub const DEFAULT_STORAGE_ROOT: &str = "mikrotik_backups";

/// Where downloaded artifacts live: one directory per [`ArtifactKind`]
/// under a common root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    /// Layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding artifacts of `kind`.
    pub fn dir_for(&self, kind: ArtifactKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    /// One spec per artifact kind, in production order.
    pub fn specs(&self) -> Vec<ArtifactSpec> {
        ArtifactKind::ALL
            .iter()
            .map(|&kind| ArtifactSpec::new(kind, self.dir_for(kind)))
            .collect()
    }

    /// Create every category directory that does not exist yet.
    pub fn ensure(&self) -> Result<(), StorageError> {
        for kind in ArtifactKind::ALL {
            let dir = self.dir_for(kind);
            std::fs::create_dir_all(&dir)
                .map_err(|source| StorageError::CreateDir { path: dir.clone(), source })?;
            debug!("Storage directory ready: {}", dir.display());
        }
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self::new(DEFAULT_STORAGE_ROOT)
    }
}
