//! Top-level batch pipeline driver.
//!
//! Composes the cleaner and the stages into one run: Clean -> Patch
//! (sequential) -> Archive (sequential, spawning publish tasks) -> join all
//! publish tasks -> aggregate. The join is the single synchronization
//! barrier: the driver never returns while a background task could still be
//! producing results.

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use packhaul_core::batch::{
    ItemId, ItemOutcome, PhaseStatus, RunResult, RunSettings, WorkItem,
};
use packhaul_core::events::BatchEvent;
use packhaul_core::ports::{
    ArchiverPort, BatchEventEmitterPort, LinkConverterPort, PatchProviderPort, UploaderPort,
};

use crate::cleaner::ArtifactCleaner;
use crate::progress::{ProgressEstimator, WorkPlan};
use crate::slots::{SlotSnapshot, UploadSlots};
use crate::stages::{self, PublishOutcome, StageDeps};

/// External collaborators the pipeline drives.
///
/// This struct bundles all the ports needed to construct a
/// [`BatchPipeline`].
pub struct BatchPipelineDeps {
    /// The external patch provider.
    pub patcher: Arc<dyn PatchProviderPort>,
    /// The external archiver.
    pub archiver: Arc<dyn ArchiverPort>,
    /// The external upload transport.
    pub uploader: Arc<dyn UploaderPort>,
    /// The external link conversion backend.
    pub converter: Arc<dyn LinkConverterPort>,
    /// Where run events go (UI, CLI renderer, log bridge).
    pub emitter: Arc<dyn BatchEventEmitterPort>,
}

/// The batch pipeline orchestrator.
pub struct BatchPipeline {
    deps: BatchPipelineDeps,
    settings: RunSettings,
    slots: Arc<UploadSlots>,
}

impl BatchPipeline {
    /// Create a pipeline for one batch run.
    #[must_use]
    pub fn new(deps: BatchPipelineDeps, settings: RunSettings) -> Self {
        let slots = Arc::new(UploadSlots::new(settings.max_concurrent_uploads));
        Self {
            deps,
            settings,
            slots,
        }
    }

    /// Cancel one in-flight upload ("skip this one").
    ///
    /// Returns whether the item currently holds an upload slot.
    pub fn cancel_upload(&self, item: &ItemId) -> bool {
        self.slots.cancel_item(item)
    }

    /// Cancel every in-flight upload immediately.
    ///
    /// Pair with cancelling the run token to also stop everything that has
    /// not started yet.
    pub fn cancel_all_uploads(&self) {
        self.slots.cancel_all();
    }

    /// Live view of the occupied upload slots.
    #[must_use]
    pub fn upload_slots(&self) -> Vec<SlotSnapshot> {
        self.slots.snapshot()
    }

    /// Run the batch.
    ///
    /// Per-item failures are recorded in the item's outcome and never abort
    /// the run; a publish task that dies is absorbed at the join barrier
    /// and reported in `failures`. The accumulated `RunResult` is returned
    /// even when the run was cancelled or ended early - bookkeeping for
    /// completed work is never lost.
    pub async fn run(&self, items: &[WorkItem], cancel: CancellationToken) -> RunResult {
        let started = Instant::now();

        if let Err(e) = self.settings.validate() {
            tracing::error!(error = %e, "Refusing to run with invalid settings");
            return RunResult {
                failures: vec![e.user_message()],
                ..RunResult::default()
            };
        }

        // Enforce `publish => archive` up front rather than failing
        // mid-run.
        let items: Vec<WorkItem> = items
            .iter()
            .map(|item| {
                let (fixed, corrected) = item.normalized();
                if corrected {
                    tracing::warn!(
                        item = %item.name,
                        "Publish requires an archive; enabling archive intent"
                    );
                }
                fixed
            })
            .collect();

        let total_items = u32::try_from(items.len()).unwrap_or(u32::MAX);
        self.deps.emitter.emit(BatchEvent::run_started(total_items));
        tracing::info!(items = items.len(), "Batch run started");

        let estimator = Arc::new(ProgressEstimator::new(
            Arc::clone(&self.deps.emitter),
            WorkPlan::from_items(&items),
        ));

        let mut outcomes: Vec<ItemOutcome> =
            items.iter().map(|item| ItemOutcome::new(item.id())).collect();

        let stage_deps = StageDeps {
            settings: self.settings.clone(),
            patcher: Arc::clone(&self.deps.patcher),
            archiver: Arc::clone(&self.deps.archiver),
            uploader: Arc::clone(&self.deps.uploader),
            converter: Arc::clone(&self.deps.converter),
            emitter: Arc::clone(&self.deps.emitter),
            estimator: Arc::clone(&estimator),
            slots: Arc::clone(&self.slots),
            cancel: cancel.clone(),
        };

        // Clean: best-effort pre-pass, nothing here can fail the run.
        let cleaner = ArtifactCleaner::new();
        for item in &items {
            if cancel.is_cancelled() {
                break;
            }
            estimator.cleaning(&item.name);
            cleaner.clean(&item.source_path);
        }

        // Patch: strictly sequential.
        stages::patch::run(&items, &mut outcomes, &stage_deps).await;

        // Archive: sequential, spawning publish tasks as archives land.
        let mut publish_tasks: JoinSet<(usize, PublishOutcome)> = JoinSet::new();
        stages::archive::run(&items, &mut outcomes, &stage_deps, &mut publish_tasks).await;

        // The barrier: every spawned publish task finishes before
        // aggregation, however early in the archive pass it was started.
        let mut task_failures: Vec<String> = Vec::new();
        while let Some(joined) = publish_tasks.join_next().await {
            match joined {
                Ok((index, publish)) => apply_publish(&mut outcomes[index], publish),
                Err(e) => {
                    tracing::error!(error = %e, "Publish task aborted");
                    task_failures.push(format!("publish task aborted: {e}"));
                }
            }
        }

        estimator.complete();

        let mut result = RunResult::from_outcomes(outcomes, started.elapsed());
        result.failures.extend(task_failures);

        let (succeeded, failed, cancelled) = item_tallies(&result.outcomes);
        self.deps.emitter.emit(BatchEvent::run_completed(
            succeeded,
            failed,
            cancelled,
            u64::try_from(result.elapsed.as_millis()).unwrap_or(u64::MAX),
        ));
        tracing::info!(
            succeeded,
            failed,
            cancelled,
            elapsed_ms = u64::try_from(result.elapsed.as_millis()).unwrap_or(u64::MAX),
            "Batch run finished"
        );

        result
    }
}

/// Copy a publish task's report into the item's outcome.
fn apply_publish(outcome: &mut ItemOutcome, publish: PublishOutcome) {
    outcome.publish = publish.status;
    outcome.upload_link = publish.upload_link;
    outcome.converted_link = publish.converted_link;
    outcome.retries_used = publish.retries_used;
    if let Some(error) = publish.error {
        outcome.record_error(error);
    }
}

/// Per-item tallies for the run-completed event. An item counts as failed
/// if any requested phase failed, cancelled if any was cancelled (and none
/// failed), succeeded otherwise.
fn item_tallies(outcomes: &[ItemOutcome]) -> (u32, u32, u32) {
    let mut succeeded = 0;
    let mut failed = 0;
    let mut cancelled = 0;
    for outcome in outcomes {
        let statuses = [outcome.patch, outcome.archive, outcome.publish];
        if statuses.contains(&PhaseStatus::Failed) {
            failed += 1;
        } else if statuses.contains(&PhaseStatus::Cancelled) {
            cancelled += 1;
        } else {
            succeeded += 1;
        }
    }
    (succeeded, failed, cancelled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use packhaul_core::batch::ItemId;

    fn outcome_with(publish: PhaseStatus) -> ItemOutcome {
        let mut outcome = ItemOutcome::new(ItemId::new("x"));
        outcome.publish = publish;
        outcome
    }

    #[test]
    fn tallies_prefer_failed_over_cancelled() {
        let mut both = outcome_with(PhaseStatus::Failed);
        both.patch = PhaseStatus::Cancelled;
        let (succeeded, failed, cancelled) = item_tallies(&[both]);
        assert_eq!((succeeded, failed, cancelled), (0, 1, 0));
    }

    #[test]
    fn tallies_count_idle_items_as_succeeded() {
        let (succeeded, failed, cancelled) =
            item_tallies(&[ItemOutcome::new(ItemId::new("idle"))]);
        assert_eq!((succeeded, failed, cancelled), (1, 0, 0));
    }

    #[test]
    fn apply_publish_copies_links_and_error() {
        let mut outcome = ItemOutcome::new(ItemId::new("x"));
        apply_publish(
            &mut outcome,
            PublishOutcome {
                status: PhaseStatus::Succeeded,
                upload_link: Some("https://host/file".into()),
                converted_link: None,
                retries_used: 2,
                error: None,
            },
        );
        assert_eq!(outcome.publish, PhaseStatus::Succeeded);
        assert_eq!(outcome.retries_used, 2);
        assert_eq!(outcome.best_link(), Some("https://host/file"));
    }
}
