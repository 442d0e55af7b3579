//! Pipeline orchestration: one independent loop per source partition.

mod router;
mod worker;

pub use router::RouterEngine;
pub use worker::{PartitionSummary, WorkerState};
