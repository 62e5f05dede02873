//! Core domain types and port definitions for packhaul.
//!
//! This crate contains pure data types (work items, run settings, progress
//! snapshots, outcomes, errors), the batch event stream, and the port traits
//! the pipeline uses to talk to external collaborators. No I/O lives here.

pub mod batch;
pub mod events;
pub mod ports;

// Re-export commonly used types for convenience
pub use batch::{
    ArchiveFormat, CompressionLevel, ConvertRetrySettings, ItemId, ItemOutcome, PatchEngine,
    Phase, PhaseCounts, PhaseStatus, PipelineError, PipelineResult, ProgressSnapshot, RunResult,
    RunSettings, WorkItem,
};
pub use events::BatchEvent;
pub use ports::{
    ArchiveJob, ArchiverPort, BatchEventEmitterPort, ConvertPoll, LinkConverterPort,
    NoopBatchEmitter, PatchJob, PatchProviderPort, PatchReport, PercentFn, StatusFn,
    TransferFn, TransferSample, UploaderPort,
};

// Silence unused dev-dependency warnings until we add mock-based tests
#[cfg(test)]
use mockall as _;
