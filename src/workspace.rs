//! Per-run scratch directory.
//!
//! Every intake or distribution run gets its own directory under the
//! configured temp root, named by a fresh UUID. The directory is removed by
//! `cleanup()`, or on drop if the run never got that far.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::error::WorkspaceError;
use crate::storage::{NodeMetadata, RemoteNode};

/// Exclusively owned temporary directory for one pipeline run.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    removed: bool,
}

impl Workspace {
    /// Create `<base>/<uuid>`.
    pub async fn create(base: &Path) -> Result<Self, WorkspaceError> {
        let base = std::path::absolute(base).map_err(|source| WorkspaceError::Create {
            path: base.to_path_buf(),
            source,
        })?;
        let root = base.join(Uuid::new_v4().to_string());
        fs::create_dir_all(&root)
            .await
            .map_err(|source| WorkspaceError::Create {
                path: root.clone(),
                source,
            })?;
        debug!(path = %root.display(), "Workspace created");
        Ok(Self {
            root,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Path of `name` inside the workspace.
    pub fn resolve(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Every regular file under the workspace, sorted by path.
    pub async fn list_files(&self) -> Result<Vec<RemoteNode>, WorkspaceError> {
        list_files(&self.root).await
    }

    /// Remove the workspace and everything in it.
    pub async fn cleanup(mut self) {
        self.removed = true;
        match fs::remove_dir_all(&self.root).await {
            Ok(()) => debug!(path = %self.root.display(), "Workspace removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.root.display(), error = %e, "Failed to remove workspace"),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if !self.removed && self.root.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.root) {
                warn!(path = %self.root.display(), error = %e, "Failed to remove workspace on drop");
            }
        }
    }
}

/// Recursively list the regular files under `dir`.
pub async fn list_files(dir: &Path) -> Result<Vec<RemoteNode>, WorkspaceError> {
    if !dir.exists() {
        return Err(WorkspaceError::Listing(format!(
            "{} does not exist",
            dir.display()
        )));
    }

    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut nodes = Vec::new();
        for entry in WalkDir::new(&dir).sort_by_file_name() {
            let entry = entry.map_err(|e| WorkspaceError::Listing(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let meta = entry
                .metadata()
                .map_err(|e| WorkspaceError::Listing(e.to_string()))?;
            nodes.push(RemoteNode {
                full_path: entry.into_path(),
                is_directory: false,
                metadata: NodeMetadata::from(&meta),
            });
        }
        Ok(nodes)
    })
    .await
    .map_err(|e| WorkspaceError::Listing(format!("listing task failed: {e}")))?
}
