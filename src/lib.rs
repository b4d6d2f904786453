//! Policy Intake: insurance policy document intake, OCR extraction and
//! distribution.

pub mod archive;
pub mod config;
pub mod distribution;
pub mod error;
pub mod intake;
pub mod ocr;
pub mod storage;
pub mod telemetry;
pub mod webhook;
pub mod worker;
pub mod workspace;
