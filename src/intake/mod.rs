//! Inbound policy document intake: classification, grouping and the run
//! that ties download, decryption, extraction and callbacks together.

pub mod classifier;
pub mod grouper;
pub mod period;
pub mod pipeline;

pub use classifier::{ClassifiedDocument, DocType, classify, classify_all};
pub use grouper::{PolicyGroup, PolicyGrouper};
pub use period::{InsurancePeriod, split_effective_and_expire};
pub use pipeline::{IntakePipeline, IntakeReport};
