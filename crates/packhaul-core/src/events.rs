//! Batch events - discriminated union for all run state changes.

use serde::{Deserialize, Serialize};

use crate::batch::{Phase, ProgressSnapshot};

/// Single discriminated union for everything a consumer (UI, CLI renderer,
/// log bridge) needs to observe about a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchEvent {
    /// A batch run has started.
    RunStarted {
        /// Number of items in the run.
        total_items: u32,
    },

    /// A progress observation. `snapshot.overall_percent` is authoritative
    /// and monotonic.
    Progress {
        /// The snapshot.
        snapshot: ProgressSnapshot,
    },

    /// An upload task has been admitted to a slot and begun.
    UploadStarted {
        /// Item display name.
        item: String,
    },

    /// An upload task ended in cancellation (per-slot or global).
    UploadCancelled {
        /// Item display name.
        item: String,
    },

    /// One item finished one phase.
    ItemCompleted {
        /// Item display name.
        item: String,
        /// The phase that finished.
        phase: Phase,
        /// Whether the phase succeeded.
        success: bool,
    },

    /// The run has finished.
    RunCompleted {
        /// Items whose requested phases all succeeded.
        succeeded: u32,
        /// Items with at least one failed phase.
        failed: u32,
        /// Items with at least one cancelled phase.
        cancelled: u32,
        /// Total wall-clock time in milliseconds.
        elapsed_ms: u64,
    },
}

impl BatchEvent {
    /// Create a run started event.
    #[must_use]
    pub const fn run_started(total_items: u32) -> Self {
        Self::RunStarted { total_items }
    }

    /// Create a progress event.
    #[must_use]
    pub const fn progress(snapshot: ProgressSnapshot) -> Self {
        Self::Progress { snapshot }
    }

    /// Create an upload started event.
    pub fn upload_started(item: impl Into<String>) -> Self {
        Self::UploadStarted { item: item.into() }
    }

    /// Create an upload cancelled event.
    pub fn upload_cancelled(item: impl Into<String>) -> Self {
        Self::UploadCancelled { item: item.into() }
    }

    /// Create an item completed event.
    pub fn item_completed(item: impl Into<String>, phase: Phase, success: bool) -> Self {
        Self::ItemCompleted {
            item: item.into(),
            phase,
            success,
        }
    }

    /// Create a run completed event.
    #[must_use]
    pub const fn run_completed(succeeded: u32, failed: u32, cancelled: u32, elapsed_ms: u64) -> Self {
        Self::RunCompleted {
            succeeded,
            failed,
            cancelled,
            elapsed_ms,
        }
    }

    /// Get the event name for wire protocols.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "batch:run_started",
            Self::Progress { .. } => "batch:progress",
            Self::UploadStarted { .. } => "batch:upload_started",
            Self::UploadCancelled { .. } => "batch:upload_cancelled",
            Self::ItemCompleted { .. } => "batch:item_completed",
            Self::RunCompleted { .. } => "batch:run_completed",
        }
    }

    /// Get the item name from any event type that carries one.
    #[must_use]
    pub fn item(&self) -> Option<&str> {
        match self {
            Self::RunStarted { .. } | Self::RunCompleted { .. } => None,
            Self::Progress { snapshot } => snapshot.item.as_deref(),
            Self::UploadStarted { item }
            | Self::UploadCancelled { item }
            | Self::ItemCompleted { item, .. } => Some(item),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_tags() {
        let event = BatchEvent::upload_started("Game");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"upload_started\""));
        assert!(json.contains("Game"));
    }

    #[test]
    fn test_event_item_extraction() {
        assert_eq!(BatchEvent::upload_started("g").item(), Some("g"));
        assert!(BatchEvent::run_started(3).item().is_none());

        let snap = ProgressSnapshot::new(Phase::Patching, "working").with_item("g");
        assert_eq!(BatchEvent::progress(snap).item(), Some("g"));
    }

    #[test]
    fn test_event_names() {
        assert_eq!(
            BatchEvent::run_completed(1, 0, 0, 10).event_name(),
            "batch:run_completed"
        );
    }
}
