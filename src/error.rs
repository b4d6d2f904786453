//! Error types for the policy intake pipeline.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    #[error("Period error: {0}")]
    Period(#[from] PeriodError),

    #[error("Webhook error: {0}")]
    Webhook(#[from] WebhookError),

    #[error("Distribution error: {0}")]
    Distribution(#[from] DistributionError),

    #[error("Intake error: {0}")]
    Intake(#[from] IntakeError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Remote storage and blob store errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Remote path not found: {0}")]
    NotFound(String),

    #[error("Transfer of {path} failed: {reason}")]
    Transfer { path: String, reason: String },

    #[error("Blob operation failed: {0}")]
    Blob(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encryption service errors.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Encryption failed: {0}")]
    Encrypt(String),

    #[error("Decryption failed: {0}")]
    Decrypt(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

/// Archive extraction errors.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("{entry}: illegal file path, resolves outside {dest}")]
    IllegalPath { entry: String, dest: PathBuf },

    #[error("Malformed archive: {0}")]
    Malformed(String),

    #[error("Extraction task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<zip::result::ZipError> for ArchiveError {
    fn from(e: zip::result::ZipError) -> Self {
        match e {
            zip::result::ZipError::Io(io) => ArchiveError::Io(io),
            other => ArchiveError::Malformed(other.to_string()),
        }
    }
}

/// OCR extraction errors.
#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("Failed to start analysis job: {0}")]
    SubmitFailed(String),

    #[error("Failed to poll job {job_id}: {reason}")]
    PollFailed { job_id: String, reason: String },

    #[error("Analysis job {job_id} failed")]
    JobFailed { job_id: String },

    #[error("Analysis job {job_id} still running after {waited:?}")]
    Timeout { job_id: String, waited: Duration },

    #[error("Temporary blob upload failed: {0}")]
    Blob(#[from] StorageError),

    #[error("Cache entry {path} unreadable: {reason}")]
    CacheCorrupt { path: PathBuf, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Insurance period parsing errors.
#[derive(Debug, thiserror::Error)]
pub enum PeriodError {
    #[error("No ' to ' separator in period: {0:?}")]
    MissingSeparator(String),

    #[error("Unparseable {side} date {value:?}: {source}")]
    InvalidDate {
        side: &'static str,
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Date {0:?} has no representation at UTC+8")]
    Unrepresentable(String),
}

/// Webhook callback errors.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Webhook {url} rejected upload with status {status}")]
    Status { url: String, status: u16 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Distribution orchestrator errors.
#[derive(Debug, thiserror::Error)]
pub enum DistributionError {
    #[error("Workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("Download of {url} failed: {reason}")]
    Download { url: String, reason: String },

    #[error("Rasterization of {path} failed: {reason}")]
    Rasterize { path: PathBuf, reason: String },

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid file name: {0:?}")]
    InvalidFileName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-run workspace errors.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("Failed to create workspace at {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Workspace listing failed: {0}")]
    Listing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Intake pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("Workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Failed to read private key {path}: {source}")]
    PrivateKey {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the pipeline.
pub type Result<T> = std::result::Result<T, Error>;
