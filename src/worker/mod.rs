//! Worker primitives shared by the intake and distribution stages.

pub mod pool;

pub use pool::{PoolOutcome, run_bounded, run_unbounded};
