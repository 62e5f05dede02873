//! Sequential patch pass.
//!
//! The patch provider mutates shared binary state per item; parallel patch
//! attempts on overlapping files are unsafe, so this pass is strictly one
//! item at a time. A failure is recorded against the item and the pass
//! moves on - it never aborts the run.

use packhaul_core::batch::{ItemOutcome, Phase, PhaseStatus, WorkItem};
use packhaul_core::events::BatchEvent;
use packhaul_core::ports::PatchJob;

use super::StageDeps;

/// Run the patch pass over every item with the patch intent.
pub(crate) async fn run(items: &[WorkItem], outcomes: &mut [ItemOutcome], deps: &StageDeps) {
    for (index, item) in items.iter().enumerate() {
        if !item.patch {
            continue;
        }

        if deps.cancel.is_cancelled() {
            tracing::info!(item = %item.name, "Skipping patch: run cancelled");
            outcomes[index].patch = PhaseStatus::Cancelled;
            continue;
        }

        deps.estimator.patch_started(&item.name);

        let job = PatchJob {
            source_path: item.source_path.clone(),
            external_id: item.external_id.clone(),
            engine: deps.settings.patch_engine,
        };

        let estimator = &deps.estimator;
        let name = item.name.clone();
        let on_status = move |status: &str| estimator.patch_status(&name, status);

        let status = match deps.patcher.patch(&job, &on_status).await {
            Ok(report) if report.success => PhaseStatus::Succeeded,
            Ok(report) => {
                let reason = report
                    .reason
                    .unwrap_or_else(|| "patch provider reported failure".to_string());
                tracing::warn!(item = %item.name, reason = %reason, "Patch failed");
                outcomes[index].record_error(reason);
                PhaseStatus::Failed
            }
            Err(e) if e.is_cancelled() => PhaseStatus::Cancelled,
            Err(e) => {
                tracing::warn!(item = %item.name, error = %e, "Patch invocation failed");
                outcomes[index].record_error(e.user_message());
                PhaseStatus::Failed
            }
        };

        outcomes[index].patch = status;
        deps.estimator
            .patch_finished(&item.name, status == PhaseStatus::Succeeded);
        deps.emitter.emit(BatchEvent::item_completed(
            &item.name,
            Phase::Patching,
            status == PhaseStatus::Succeeded,
        ));
    }
}
