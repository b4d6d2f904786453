//! On-disk caches for OCR results.
//!
//! `ResponseCache` keeps raw analysis responses as `<sha256-hex>.json` under a
//! shared directory. The key is a pure function of the document bytes, so an
//! entry never needs invalidating; writes go through a temp file and a rename
//! so readers never see a partial entry.
//!
//! The sidecar cache stores the final `FieldMap` next to the source document
//! as `<source>.json`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use tokio::fs;
use uuid::Uuid;

use crate::error::OcrError;
use crate::ocr::types::{AnalysisResponse, FieldMap};

/// Lowercase hex SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hash-keyed store of raw analysis responses.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    dir: PathBuf,
}

impl ResponseCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn entry_path(&self, hash: &str) -> PathBuf {
        self.dir.join(format!("{hash}.json"))
    }

    /// Cached response for `hash`, or `None` on a miss.
    pub async fn load(&self, hash: &str) -> Result<Option<AnalysisResponse>, OcrError> {
        read_json(&self.entry_path(hash)).await
    }

    pub async fn store(&self, hash: &str, response: &AnalysisResponse) -> Result<(), OcrError> {
        fs::create_dir_all(&self.dir).await?;
        write_json_atomic(&self.entry_path(hash), response).await
    }
}

/// Path of the sidecar cache for `source`.
pub fn sidecar_path(source: &Path) -> PathBuf {
    let mut name = source.as_os_str().to_owned();
    name.push(".json");
    PathBuf::from(name)
}

pub async fn load_sidecar(source: &Path) -> Result<Option<FieldMap>, OcrError> {
    read_json(&sidecar_path(source)).await
}

pub async fn store_sidecar(source: &Path, fields: &FieldMap) -> Result<(), OcrError> {
    write_json_atomic(&sidecar_path(source), fields).await
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, OcrError> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| OcrError::CacheCorrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), OcrError> {
    let body = serde_json::to_vec(value)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(format!(".{}.tmp", Uuid::new_v4()));
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, body).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}
