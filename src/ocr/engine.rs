//! OCR extraction engine.
//!
//! Flow for one document:
//! 1. Sidecar cache (`<source>.json`), when extracting from a file
//! 2. Content-hash cache of raw responses
//! 3. Temp blob upload → FORMS analysis job → poll until terminal
//! 4. Graph reconstruction into a `FieldMap`
//!
//! The temp blob is deleted whatever the job outcome. Errors are returned to
//! the caller; nothing is retried here.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{Instrument, Span, debug, info, info_span, warn};
use uuid::Uuid;

use crate::config::OcrConfig;
use crate::error::OcrError;
use crate::ocr::blocks::extract_key_values;
use crate::ocr::cache::{self, ResponseCache, content_hash};
use crate::ocr::types::{
    AnalysisResponse, BlobRef, BlobStore, FeatureType, FieldMap, JobStatus, OcrService,
};

/// Anything that can turn a document on disk into form fields.
#[async_trait]
pub trait FieldExtractor: Send + Sync {
    async fn extract_from_file(&self, path: &Path) -> Result<FieldMap, OcrError>;
}

/// Cached, blob-backed OCR form extraction.
pub struct OcrEngine {
    service: Arc<dyn OcrService>,
    blobs: Arc<dyn BlobStore>,
    cache: ResponseCache,
    poll_interval: Duration,
    poll_timeout: Option<Duration>,
    span: Span,
}

impl OcrEngine {
    pub fn new(service: Arc<dyn OcrService>, blobs: Arc<dyn BlobStore>, config: &OcrConfig) -> Self {
        Self {
            service,
            blobs,
            cache: ResponseCache::new(&config.cache_dir),
            poll_interval: config.poll_interval,
            poll_timeout: config.poll_timeout,
            span: info_span!("ocr", cache_dir = %config.cache_dir.display()),
        }
    }

    /// Field map for a document's bytes, consulting the content-hash cache.
    pub async fn extract_fields(&self, document: &[u8]) -> Result<FieldMap, OcrError> {
        self.extract_inner(document).instrument(self.span.clone()).await
    }

    async fn extract_inner(&self, document: &[u8]) -> Result<FieldMap, OcrError> {
        let hash = content_hash(document);

        if let Some(response) = self.cache.load(&hash).await? {
            debug!(hash = %hash, "OCR cache hit");
            return Ok(extract_key_values(&response));
        }

        let response = self.analyze(document).await?;
        self.cache.store(&hash, &response).await?;
        info!(hash = %hash, blocks = response.blocks.len(), "OCR response cached");

        Ok(extract_key_values(&response))
    }

    /// Upload to a temp blob, run the job, and always delete the blob.
    async fn analyze(&self, document: &[u8]) -> Result<AnalysisResponse, OcrError> {
        let key = format!("{}.pdf", Uuid::new_v4());
        let blob = self
            .blobs
            .put_temp(&key, document.to_vec(), "application/pdf")
            .await?;
        debug!(key = %blob.key, "Uploaded temp blob");

        let result = self.run_job(&blob).await;

        if let Err(e) = self.blobs.delete(&blob).await {
            warn!(key = %blob.key, error = %e, "Failed to delete temp blob");
        }
        result
    }

    async fn run_job(&self, blob: &BlobRef) -> Result<AnalysisResponse, OcrError> {
        let job_id = self
            .service
            .start_analysis(blob, &[FeatureType::Forms])
            .await?;
        info!(job_id = %job_id, "Started document analysis");

        let started = Instant::now();
        loop {
            let poll = self.service.poll(&job_id).await?;
            match poll.status {
                JobStatus::Succeeded => return Ok(poll.response),
                JobStatus::Failed => return Err(OcrError::JobFailed { job_id }),
                JobStatus::InProgress => {
                    if let Some(limit) = self.poll_timeout {
                        let waited = started.elapsed();
                        if waited >= limit {
                            return Err(OcrError::Timeout { job_id, waited });
                        }
                    }
                    debug!(job_id = %job_id, "Analysis in progress");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }
}

#[async_trait]
impl FieldExtractor for OcrEngine {
    /// Field map for a file, consulting its sidecar cache first.
    async fn extract_from_file(&self, path: &Path) -> Result<FieldMap, OcrError> {
        match cache::load_sidecar(path).await {
            Ok(Some(fields)) => {
                debug!(parent: &self.span, path = %path.display(), "Sidecar cache hit");
                return Ok(fields);
            }
            Ok(None) => {}
            Err(e) => warn!(parent: &self.span, path = %path.display(), error = %e, "Ignoring unreadable sidecar"),
        }

        let document = tokio::fs::read(path).await?;
        let fields = self.extract_fields(&document).await?;
        cache::store_sidecar(path, &fields).await?;
        Ok(fields)
    }
}
