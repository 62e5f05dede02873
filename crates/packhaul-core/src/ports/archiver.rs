//! Archiver port.
//!
//! The external compressor that turns an installation folder into an
//! archive file. Codec and container details are out of scope.

use async_trait::async_trait;
use std::path::PathBuf;

use super::PercentFn;
use crate::batch::{ArchiveFormat, CompressionLevel, PipelineError};

/// Everything the archiver needs for one compression job.
#[derive(Clone, Debug)]
pub struct ArchiveJob {
    /// Folder to compress.
    pub source_path: PathBuf,
    /// Where the archive should be written.
    pub output_path: PathBuf,
    /// Container format.
    pub format: ArchiveFormat,
    /// Compression level.
    pub level: CompressionLevel,
    /// Password-protect the archive.
    pub password_protect: bool,
}

/// Port for the external archiver.
///
/// Invocations are sequential (single disk, shared file-system state); the
/// pipeline guarantees one call at a time.
#[async_trait]
pub trait ArchiverPort: Send + Sync {
    /// Compress one folder into an archive.
    ///
    /// `on_percent` receives completion percentages in 0.0..=100.0 as the
    /// archiver makes progress.
    async fn compress(
        &self,
        job: &ArchiveJob,
        on_percent: PercentFn<'_>,
    ) -> Result<(), PipelineError>;
}
