//! Per-conversion scratch directory.
//!
//! One `WorkspaceDir` per in-flight conversion, uniquely named under the
//! scratch root with a recognizable prefix. It is removed by `remove()` on
//! the normal path and by its drop guard on early returns; removal errors
//! are ignored. A hard kill can leave it behind.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::error::IoResultExt;
use crate::{ConvertError, Result};

pub struct WorkspaceDir {
    dir: TempDir,
}

impl WorkspaceDir {
    /// Create a fresh workspace with its snapshot and FP16 sub-areas.
    pub fn create(scratch_root: &Path) -> Result<Self> {
        std::fs::create_dir_all(scratch_root).with_path(scratch_root)?;
        let dir = tempfile::Builder::new()
            .prefix(PipelineConfig::WORKSPACE_PREFIX)
            .tempdir_in(scratch_root)
            .map_err(|e| ConvertError::io("creating workspace", scratch_root, e))?;

        let workspace = Self { dir };
        let fp16 = workspace.fp16_dir();
        std::fs::create_dir_all(&fp16).with_path(&fp16)?;
        debug!("Workspace created at {}", workspace.path().display());
        Ok(workspace)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Where the raw checkpoint snapshot is downloaded.
    pub fn snapshot_dir(&self) -> PathBuf {
        self.path().join(PipelineConfig::SNAPSHOT_DIR_NAME)
    }

    /// Where the FP16 intermediate shard set is written.
    pub fn fp16_dir(&self) -> PathBuf {
        self.path().join(PipelineConfig::FP16_DIR_NAME)
    }

    /// Recursively delete the workspace, ignoring failures.
    pub fn remove(self) {
        let path = self.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => debug!("Workspace {} removed", path.display()),
            Err(e) => warn!("Failed to remove workspace {}: {}", path.display(), e),
        }
    }
}
