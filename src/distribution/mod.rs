//! Outbound distribution of files to a deploy environment.

pub mod notify;
pub mod orchestrator;

pub use notify::{NotifyOutcome, notify_with_retry};
pub use orchestrator::{DistributionReport, Distributor, RemoteFile, is_image};
