//! Pipeline stages.
//!
//! - `patch` and `archive` are strictly sequential passes over the item
//!   list (shared file-system state, single disk)
//! - `publish` tasks are spawned by the archive pass as soon as each
//!   archive lands, and run concurrently under the slot pool
//! - `convert` is the per-upload link-conversion retry loop
//!
//! Stage workers operate on value types and cloned Arc dependencies, with
//! no references back into the orchestrator.

pub(crate) mod archive;
pub(crate) mod convert;
pub(crate) mod patch;
pub(crate) mod publish;

pub use publish::PublishOutcome;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use packhaul_core::batch::RunSettings;
use packhaul_core::ports::{
    ArchiverPort, BatchEventEmitterPort, LinkConverterPort, PatchProviderPort, UploaderPort,
};

use crate::progress::ProgressEstimator;
use crate::slots::UploadSlots;

/// Shared dependencies handed to every stage.
///
/// Cloned Arc references, so publish tasks can be spawned without
/// borrowing from the orchestrator.
#[derive(Clone)]
pub(crate) struct StageDeps {
    pub settings: RunSettings,
    pub patcher: Arc<dyn PatchProviderPort>,
    pub archiver: Arc<dyn ArchiverPort>,
    pub uploader: Arc<dyn UploaderPort>,
    pub converter: Arc<dyn LinkConverterPort>,
    pub emitter: Arc<dyn BatchEventEmitterPort>,
    pub estimator: Arc<ProgressEstimator>,
    pub slots: Arc<UploadSlots>,
    /// Run-level cancellation: checked at phase and attempt boundaries.
    pub cancel: CancellationToken,
}
