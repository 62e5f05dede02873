//! Publish worker task.
//!
//! One task per archived item with the publish intent, admitted through the
//! bounded slot pool. Each task owns its attempt loop: linear backoff
//! between attempts, cancellation checked before every attempt and inside
//! every backoff sleep, and the slot released by the guard's `Drop` on
//! every exit path.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use packhaul_core::batch::{Phase, PhaseStatus, PipelineError, WorkItem};
use packhaul_core::events::BatchEvent;
use packhaul_core::ports::TransferSample;

use super::{convert, StageDeps};

/// A publish task's input: the item plus the archive the archive pass
/// produced for it.
pub(crate) struct PublishJob {
    /// Index of the item in the run's item list.
    pub index: usize,
    /// The item being published.
    pub item: WorkItem,
    /// The archive to upload.
    pub archive_path: PathBuf,
}

/// What a publish task reports back through the join barrier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishOutcome {
    /// How the publish phase ended.
    pub status: PhaseStatus,
    /// Raw upload link on success.
    pub upload_link: Option<String>,
    /// Converted mirror link, when conversion was enabled and succeeded.
    pub converted_link: Option<String>,
    /// Retries that were needed (0 = first attempt worked).
    pub retries_used: u32,
    /// Human-readable failure reason.
    pub error: Option<String>,
}

impl PublishOutcome {
    fn cancelled() -> Self {
        Self {
            status: PhaseStatus::Cancelled,
            upload_link: None,
            converted_link: None,
            retries_used: 0,
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            status: PhaseStatus::Failed,
            upload_link: None,
            converted_link: None,
            retries_used: 0,
            error: Some(error),
        }
    }
}

/// Run one publish task to completion.
pub(crate) async fn run(job: PublishJob, deps: StageDeps) -> (usize, PublishOutcome) {
    let outcome = execute(&job, &deps).await;

    let success = outcome.status == PhaseStatus::Succeeded;
    deps.estimator.publish_finished(&job.item.name, success);
    match outcome.status {
        PhaseStatus::Cancelled => {
            deps.emitter
                .emit(BatchEvent::upload_cancelled(&job.item.name));
        }
        _ => {
            deps.emitter.emit(BatchEvent::item_completed(
                &job.item.name,
                Phase::Publishing,
                success,
            ));
        }
    }

    (job.index, outcome)
}

async fn execute(job: &PublishJob, deps: &StageDeps) -> PublishOutcome {
    let id = job.item.id();

    // Admission control. A run-level cancel while waiting here means the
    // task never starts.
    let Ok(slot) = deps.slots.acquire(id.clone(), &deps.cancel).await else {
        tracing::info!(item = %job.item.name, "Upload cancelled before starting");
        return PublishOutcome::cancelled();
    };
    // `slot` is held for the rest of this function; its Drop releases the
    // permit and deregisters the item no matter how we leave.

    // Fail fast when the archive vanished between archiving and here.
    let archive_bytes = match fs::metadata(&job.archive_path) {
        Ok(meta) => meta.len(),
        Err(_) => {
            let err = PipelineError::missing_archive(job.archive_path.display().to_string());
            tracing::warn!(item = %job.item.name, error = %err, "Publish aborted");
            return PublishOutcome::failed(err.user_message());
        }
    };

    deps.emitter.emit(BatchEvent::upload_started(&job.item.name));
    deps.estimator.upload_started(&job.item.name, archive_bytes);

    let name = job.item.name.clone();
    let slots = &deps.slots;
    let estimator = &deps.estimator;
    let slot_id = id.clone();
    let on_progress = move |sample: TransferSample| {
        slots.record_transfer(&slot_id, sample);
        estimator.upload_progress(&name, sample);
    };

    let max_attempts = deps.settings.max_upload_attempts;
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        // Both cancellation levels are checked at the attempt boundary:
        // the run-level flag and this slot's own token.
        if deps.cancel.is_cancelled() || slot.cancel_token().is_cancelled() {
            tracing::info!(item = %job.item.name, attempt, "Upload cancelled");
            return PublishOutcome::cancelled();
        }

        tracing::debug!(item = %job.item.name, attempt, max_attempts, "Upload attempt");

        let result = deps
            .uploader
            .upload(&job.archive_path, &on_progress, slot.cancel_token())
            .await;

        match result {
            Ok(Some(link)) if !link.is_empty() => {
                tracing::info!(item = %job.item.name, attempt, link = %link, "Upload succeeded");
                let converted_link = if deps.settings.convert_links {
                    convert::run(
                        deps.converter.as_ref(),
                        &deps.estimator,
                        &job.item.name,
                        &link,
                        archive_bytes,
                        &deps.settings.convert_retry,
                        slot.cancel_token(),
                    )
                    .await
                } else {
                    None
                };
                return PublishOutcome {
                    status: PhaseStatus::Succeeded,
                    upload_link: Some(link),
                    converted_link,
                    retries_used: attempt - 1,
                    error: None,
                };
            }
            Ok(_) => {
                last_error = "uploader returned no link".to_string();
            }
            Err(e) if e.is_cancelled() => {
                tracing::info!(item = %job.item.name, attempt, "Upload cancelled mid-transfer");
                return PublishOutcome::cancelled();
            }
            Err(e) => {
                last_error = e.user_message();
            }
        }

        if attempt < max_attempts {
            // Linear backoff; the sleep itself is a cancellation point.
            let delay = deps.settings.retry_base_delay * attempt;
            tracing::debug!(
                item = %job.item.name,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %last_error,
                "Upload attempt failed, backing off"
            );
            if cancellable_sleep(delay, deps, &slot).await.is_err() {
                return PublishOutcome::cancelled();
            }
        }
    }

    let err = PipelineError::retries_exhausted(max_attempts, last_error);
    tracing::warn!(item = %job.item.name, error = %err, "Upload failed");
    PublishOutcome::failed(err.user_message())
}

/// Sleep that aborts early when either cancellation level fires.
async fn cancellable_sleep(
    delay: Duration,
    deps: &StageDeps,
    slot: &crate::slots::SlotGuard,
) -> Result<(), PipelineError> {
    tokio::select! {
        biased;

        () = deps.cancel.cancelled() => Err(PipelineError::Cancelled),
        () = slot.cancel_token().cancelled() => Err(PipelineError::Cancelled),
        () = tokio::time::sleep(delay) => Ok(()),
    }
}
