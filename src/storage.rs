//! Collaborator seams for remote file transfer, PGP and rasterization.
//!
//! The pipeline only depends on these traits. `LocalStorage` is the one
//! bundled `RemoteStorage`: a drop folder mounted on the local filesystem.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{CryptoError, StorageError};

// ── Nodes ───────────────────────────────────────────────────────────

/// Filesystem facts captured when a tree was listed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

impl From<&std::fs::Metadata> for NodeMetadata {
    fn from(meta: &std::fs::Metadata) -> Self {
        Self {
            size: meta.len(),
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
        }
    }
}

/// One entry of a listed remote or local tree. Never refreshed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteNode {
    pub full_path: PathBuf,
    pub is_directory: bool,
    pub metadata: NodeMetadata,
}

impl RemoteNode {
    /// Path with every separator turned into `/`.
    pub fn normalized_path(&self) -> String {
        self.full_path.to_string_lossy().replace('\\', "/")
    }

    /// Final path component.
    pub fn file_name(&self) -> &str {
        self.full_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }
}

// ── Traits ──────────────────────────────────────────────────────────

/// Remote file transfer (SFTP or a mounted share).
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    /// Paths of the regular files directly inside `dir`.
    async fn list_files(&self, dir: &str) -> Result<Vec<String>, StorageError>;

    /// Copy `remote` into the local file `local`.
    async fn get(&self, local: &Path, remote: &str) -> Result<(), StorageError>;

    /// Write `content` to `remote`, replacing any existing file.
    async fn put(&self, remote: &str, content: Vec<u8>) -> Result<(), StorageError>;

    /// Delete `remote`.
    async fn remove(&self, remote: &str) -> Result<(), StorageError>;
}

/// PGP encryption service. Payloads are opaque bytes.
#[async_trait]
pub trait Encryption: Send + Sync {
    async fn encrypt(&self, plaintext: Vec<u8>, public_key_armored: &str) -> Result<Vec<u8>, CryptoError>;

    async fn decrypt(
        &self,
        ciphertext: Vec<u8>,
        private_key_armored: &SecretString,
    ) -> Result<Vec<u8>, CryptoError>;
}

/// Image to single-page PDF conversion.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    async fn image_to_pdf(&self, image: &Path) -> Result<Vec<u8>, String>;
}

// ── Local filesystem storage ────────────────────────────────────────

/// `RemoteStorage` over a directory tree. Remote paths are relative to `root`.
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, remote: &str) -> PathBuf {
        self.root.join(remote.trim_start_matches('/'))
    }
}

#[async_trait]
impl RemoteStorage for LocalStorage {
    async fn list_files(&self, dir: &str) -> Result<Vec<String>, StorageError> {
        let full = self.resolve(dir);
        if !full.exists() {
            return Err(StorageError::NotFound(dir.to_string()));
        }

        let mut files = Vec::new();
        let mut read_dir = fs::read_dir(&full).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            if entry.metadata().await?.is_file() {
                let name = entry.file_name().to_string_lossy().to_string();
                files.push(format!("{}/{}", dir.trim_end_matches('/'), name));
            }
        }
        files.sort();
        Ok(files)
    }

    async fn get(&self, local: &Path, remote: &str) -> Result<(), StorageError> {
        let source = self.resolve(remote);
        if !source.exists() {
            return Err(StorageError::NotFound(remote.to_string()));
        }
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(&source, local).await.map_err(|e| StorageError::Transfer {
            path: remote.to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    async fn put(&self, remote: &str, content: Vec<u8>) -> Result<(), StorageError> {
        let target = self.resolve(remote);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&target, content).await?;
        Ok(())
    }

    async fn remove(&self, remote: &str) -> Result<(), StorageError> {
        let target = self.resolve(remote);
        match fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(remote.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
