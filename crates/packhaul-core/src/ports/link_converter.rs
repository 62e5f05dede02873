//! Link converter port.
//!
//! Converts a raw upload link into a higher-throughput mirror link. One
//! call is one attempt; the retry loop (with size-scaled delays) lives in
//! the pipeline crate.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::batch::PipelineError;

/// Outcome of a single conversion attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConvertPoll {
    /// The mirror link is ready.
    Ready(String),
    /// The upstream host is still processing the upload; retry later.
    Pending,
}

/// Port for the external link conversion backend.
#[async_trait]
pub trait LinkConverterPort: Send + Sync {
    /// Attempt one conversion of `link`.
    ///
    /// `file_size_bytes` lets the backend (and the pipeline's retry shape)
    /// account for the upstream host's size-dependent scan time. `Err` is
    /// terminal: the caller falls back to the raw link without retrying.
    async fn convert(
        &self,
        link: &str,
        file_size_bytes: u64,
        cancel: &CancellationToken,
    ) -> Result<ConvertPoll, PipelineError>;
}
