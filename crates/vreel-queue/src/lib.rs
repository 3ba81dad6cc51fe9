//! Redis Streams job queue.
//!
//! This crate provides:
//! - Typed jobs for ingestion, video generation, render resubmission and
//!   the second-stage overlay burn-in
//! - Enqueueing with idempotency-key deduplication
//! - Consumer-group reads, crash recovery claims, retry counters and a DLQ

pub mod error;
pub mod job;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use job::{GenerateVideoJob, IngestAssetJob, OverlayBurnInJob, QueueJob, ResubmitRenderJob};
pub use queue::{JobPublisher, JobQueue, QueueConfig, DEDUP_TTL_SECS};
