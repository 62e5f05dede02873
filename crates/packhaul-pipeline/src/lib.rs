//! Batch pipeline orchestration for packhaul.
//!
//! This crate sequences patching, compression, upload and link conversion
//! across many independent work items: the patch and archive passes run
//! sequentially (shared file-system state), while publishing runs on a
//! bounded worker pool with per-item retry and cancellation. Progress from
//! all of it is funnelled through one thread-safe estimator that produces a
//! single monotonic overall percentage.
//!
//! # Architecture
//!
//! - **Orchestrator**: composes the stages into one run and aggregates results
//! - **Stages**: patch/archive loops, publish worker tasks, link conversion
//! - **Slots**: semaphore-bounded upload admission with per-slot cancellation
//! - **Progress**: the estimator plus a rate-limiting throttle

pub mod cleaner;
pub mod orchestrator;
pub mod progress;
pub mod slots;
pub mod stages;

pub use cleaner::{ArtifactCleaner, CleanReport};
pub use orchestrator::{BatchPipeline, BatchPipelineDeps};
pub use progress::{ProgressEstimator, ProgressThrottle, WorkPlan};
pub use slots::{SlotSnapshot, SlotStats, UploadSlots};
pub use stages::PublishOutcome;

// Silence unused dev-dependency warnings until we add mock-based tests
#[cfg(test)]
use mockall as _;
#[cfg(test)]
use tokio_test as _;
