//! Uploader port.
//!
//! The wire-level upload transport is out of scope; the pipeline drives it
//! through this trait and owns retries, slots and cancellation policy.

use async_trait::async_trait;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use super::TransferFn;
use crate::batch::PipelineError;

/// One byte-based progress observation from an in-flight upload.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TransferSample {
    /// Bytes transferred so far.
    pub bytes_done: u64,
    /// Total bytes to transfer.
    pub total_bytes: u64,
    /// Instantaneous transfer speed in bytes per second.
    pub speed_bps: f64,
}

impl TransferSample {
    /// Create a sample.
    #[must_use]
    pub const fn new(bytes_done: u64, total_bytes: u64, speed_bps: f64) -> Self {
        Self {
            bytes_done,
            total_bytes,
            speed_bps,
        }
    }
}

/// Port for the external upload transport.
#[async_trait]
pub trait UploaderPort: Send + Sync {
    /// Upload one archive file.
    ///
    /// Returns the public link on success, or `None` when the host accepted
    /// the transfer but produced no usable link (the pipeline treats that
    /// as a failed attempt). Implementations should observe `cancel` for
    /// prompt aborts; the pipeline additionally checks it at every attempt
    /// boundary.
    async fn upload(
        &self,
        path: &Path,
        on_progress: TransferFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, PipelineError>;
}
