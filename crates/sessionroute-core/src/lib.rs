//! sessionroute core - partition-aware session routing pipeline
//!
//! Ingests shopping-session events from a partitioned source log,
//! enriches each with derived metrics, classifies it by country, and
//! republishes it to one of two destination logs:
//!
//! - One independent poll/decode/enrich/route/publish loop per partition
//! - Per-record fault isolation: bad records are logged and skipped
//! - Per-partition fault isolation: a dead cursor stops one loop only
//! - Cooperative shutdown that never abandons a fetched batch

pub mod config;
pub mod decode;
pub mod engine;
pub mod enrich;
pub mod error;
pub mod health;
pub mod memory;
pub mod metrics;
pub mod model;
pub mod publish;
pub mod retry;
pub mod route;
pub mod source;

// Re-export commonly used types
pub use config::Config;
pub use error::{DecodeError, EnrichError, PublishError, RouteError, SourceError};
pub use error::{Error, Result};
pub use model::{EnrichedSession, LineItem, RawRecord, Session};
