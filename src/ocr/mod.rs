//! OCR form extraction: provider seams, block-graph reconstruction and caching.

pub mod blocks;
pub mod cache;
pub mod engine;
pub mod types;

pub use blocks::{PERIOD_OF_INSURANCE, extract_key_values};
pub use cache::{ResponseCache, content_hash};
pub use engine::{FieldExtractor, OcrEngine};
pub use types::{AnalysisResponse, BlobRef, BlobStore, FeatureType, FieldMap, JobPoll, JobStatus, OcrService};
