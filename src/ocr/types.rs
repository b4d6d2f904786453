//! OCR response model and service seams.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{OcrError, StorageError};

/// Field name → concatenated value, as read off one form.
pub type FieldMap = HashMap<String, String>;

// ── Block graph ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockType {
    Word,
    Line,
    KeyValueSet,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Key,
    Value,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    Child,
    Value,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Relationship {
    #[serde(rename = "Type")]
    pub kind: RelationshipType,
    #[serde(default)]
    pub ids: Vec<String>,
}

/// One node of the OCR response graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Block {
    pub id: String,
    pub block_type: BlockType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entity_types: Vec<EntityType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<Relationship>,
}

impl Block {
    /// First declared entity type, if any.
    pub fn entity_type(&self) -> Option<EntityType> {
        self.entity_types.first().copied()
    }

    /// Ids of every relationship of kind `kind`, in declaration order.
    pub fn related(&self, kind: RelationshipType) -> impl Iterator<Item = &str> {
        self.relationships
            .iter()
            .filter(move |r| r.kind == kind)
            .flat_map(|r| r.ids.iter().map(String::as_str))
    }
}

/// Raw analysis result, persisted verbatim in the content-hash cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AnalysisResponse {
    #[serde(default)]
    pub blocks: Vec<Block>,
}

// ── Jobs ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    InProgress,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeatureType {
    Forms,
}

/// Result of one status poll.
#[derive(Debug, Clone)]
pub struct JobPoll {
    pub status: JobStatus,
    pub response: AnalysisResponse,
}

/// Handle to an object in temporary blob storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobRef {
    pub bucket: String,
    pub key: String,
}

// ── Seams ───────────────────────────────────────────────────────────

/// Asynchronous document analysis provider.
#[async_trait]
pub trait OcrService: Send + Sync {
    /// Start analysing the document stored at `blob`. Returns a job id.
    async fn start_analysis(&self, blob: &BlobRef, features: &[FeatureType]) -> Result<String, OcrError>;

    /// Fetch the current status of `job_id`.
    async fn poll(&self, job_id: &str) -> Result<JobPoll, OcrError>;
}

/// Object store the OCR provider reads documents from.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put_temp(&self, key: &str, content: Vec<u8>, content_type: &str) -> Result<BlobRef, StorageError>;

    async fn delete(&self, blob: &BlobRef) -> Result<(), StorageError>;
}
