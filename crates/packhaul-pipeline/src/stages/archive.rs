//! Sequential archive pass.
//!
//! Compresses one item at a time, and the moment an archive lands for an
//! item that also publishes, spawns its publish task into the shared join
//! set without waiting for it - while item N+1 is being compressed, item
//! N's upload may already be running. The orchestrator joins every spawned
//! task at a single barrier before aggregation.

use std::fs;
use std::path::PathBuf;

use tokio::task::JoinSet;

use packhaul_core::batch::{ArchiveFormat, ItemOutcome, Phase, PhaseStatus, WorkItem};
use packhaul_core::events::BatchEvent;
use packhaul_core::ports::ArchiveJob;

use super::publish::{self, PublishJob, PublishOutcome};
use super::StageDeps;

/// Where an item's archive is written: next to the source folder, named
/// after it.
pub(crate) fn archive_output_path(item: &WorkItem, format: ArchiveFormat) -> PathBuf {
    let file_name = item
        .source_path
        .file_name()
        .map_or_else(|| item.name.clone(), |n| n.to_string_lossy().into_owned());
    let parent = item
        .source_path
        .parent()
        .map_or_else(|| PathBuf::from("."), PathBuf::from);
    parent.join(format!("{file_name}.{}", format.extension()))
}

/// Run the archive pass, spawning publish tasks as archives complete.
pub(crate) async fn run(
    items: &[WorkItem],
    outcomes: &mut [ItemOutcome],
    deps: &StageDeps,
    publish_tasks: &mut JoinSet<(usize, PublishOutcome)>,
) {
    for (index, item) in items.iter().enumerate() {
        if !item.archive {
            continue;
        }

        if deps.cancel.is_cancelled() {
            tracing::info!(item = %item.name, "Skipping archive: run cancelled");
            outcomes[index].archive = PhaseStatus::Cancelled;
            if item.publish {
                outcomes[index].publish = PhaseStatus::Cancelled;
            }
            continue;
        }

        deps.estimator.archive_started(&item.name);

        let output_path = archive_output_path(item, deps.settings.archive_format);
        let job = ArchiveJob {
            source_path: item.source_path.clone(),
            output_path: output_path.clone(),
            format: deps.settings.archive_format,
            level: deps.settings.compression_level,
            password_protect: deps.settings.password_protect,
        };

        let estimator = &deps.estimator;
        let name = item.name.clone();
        let on_percent = move |percent: f64| estimator.archive_progress(&name, percent);

        match deps.archiver.compress(&job, &on_percent).await {
            Ok(()) => {
                let archive_bytes = fs::metadata(&output_path).map(|m| m.len()).ok();
                outcomes[index].archive = PhaseStatus::Succeeded;
                deps.estimator
                    .archive_finished(&item.name, true, archive_bytes);
                deps.emitter.emit(BatchEvent::item_completed(
                    &item.name,
                    Phase::Archiving,
                    true,
                ));

                // The pipelining point: hand off to publish immediately.
                if item.publish {
                    let job = PublishJob {
                        index,
                        item: item.clone(),
                        archive_path: output_path,
                    };
                    publish_tasks.spawn(publish::run(job, deps.clone()));
                }
            }
            Err(e) if e.is_cancelled() => {
                outcomes[index].archive = PhaseStatus::Cancelled;
                if item.publish {
                    outcomes[index].publish = PhaseStatus::Cancelled;
                }
                deps.estimator.archive_finished(&item.name, false, None);
            }
            Err(e) => {
                tracing::warn!(item = %item.name, error = %e, "Archive failed");
                outcomes[index].archive = PhaseStatus::Failed;
                outcomes[index].record_error(e.user_message());
                if item.publish {
                    // Nothing to upload; counts the publish as failed rather
                    // than silently dropping the intent.
                    outcomes[index].publish = PhaseStatus::Failed;
                }
                deps.estimator.archive_finished(&item.name, false, None);
                deps.emitter.emit(BatchEvent::item_completed(
                    &item.name,
                    Phase::Archiving,
                    false,
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_path_sits_next_to_source() {
        let item = WorkItem::new("My Game", "/games/My Game");
        let path = archive_output_path(&item, ArchiveFormat::SevenZip);
        assert_eq!(path, PathBuf::from("/games/My Game.7z"));
    }

    #[test]
    fn output_path_follows_format() {
        let item = WorkItem::new("G", "/games/G");
        let path = archive_output_path(&item, ArchiveFormat::Zip);
        assert_eq!(path, PathBuf::from("/games/G.zip"));
    }
}
