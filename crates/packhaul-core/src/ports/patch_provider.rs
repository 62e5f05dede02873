//! Patch provider port.
//!
//! The external tool that mutates a game installation in place. The
//! byte-level patch logic is out of scope for this system; the pipeline
//! only sequences invocations.

use async_trait::async_trait;
use std::path::PathBuf;

use super::StatusFn;
use crate::batch::{PatchEngine, PipelineError};

/// Everything the provider needs for one patch invocation.
#[derive(Clone, Debug)]
pub struct PatchJob {
    /// Installation folder to patch.
    pub source_path: PathBuf,
    /// Detected external id, if any (some engines need it).
    pub external_id: Option<String>,
    /// Which engine the provider should use.
    pub engine: PatchEngine,
}

/// What the provider reports back for one item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatchReport {
    /// Whether the patch was applied.
    pub success: bool,
    /// Why it was not, when `success` is false.
    pub reason: Option<String>,
}

impl PatchReport {
    /// A successful report.
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            success: true,
            reason: None,
        }
    }

    /// A failed report with a reason.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: Some(reason.into()),
        }
    }
}

/// Port for the external patch provider.
///
/// Invocations are strictly sequential: the provider mutates shared binary
/// state per item, and parallel patch attempts on overlapping files are
/// unsafe. The pipeline guarantees one call at a time.
#[async_trait]
pub trait PatchProviderPort: Send + Sync {
    /// Apply the patch to one installation.
    ///
    /// `on_status` receives free-text progress lines for display. A
    /// provider-reported failure comes back as `Ok` with
    /// `PatchReport::success == false`; `Err` is reserved for invocation
    /// failures (tool missing, I/O).
    async fn patch(
        &self,
        job: &PatchJob,
        on_status: StatusFn<'_>,
    ) -> Result<PatchReport, PipelineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_constructors() {
        assert!(PatchReport::ok().success);
        let failed = PatchReport::failed("unsupported layout");
        assert!(!failed.success);
        assert_eq!(failed.reason.as_deref(), Some("unsupported layout"));
    }
}
