//! Progress snapshot types.

use serde::{Deserialize, Serialize};

/// The pipeline phase a snapshot belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Pre-pass artifact cleanup.
    Cleaning,
    /// Sequential patch pass.
    Patching,
    /// Sequential compression pass.
    Archiving,
    /// Concurrent upload pass.
    Publishing,
    /// Link conversion for an uploaded item.
    Converting,
    /// The run has finished.
    Complete,
}

impl Phase {
    /// String representation for logs and wire protocols.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cleaning => "cleaning",
            Self::Patching => "patching",
            Self::Archiving => "archiving",
            Self::Publishing => "publishing",
            Self::Converting => "converting",
            Self::Complete => "complete",
        }
    }
}

/// One progress observation pushed to the consumer.
///
/// `overall_percent` is authoritative and monotonic non-decreasing within a
/// run; it stays below 100 until the final `Complete` snapshot sets exactly
/// 100. A UI must never show progress going backward, so consumers should
/// trust this value rather than recomputing their own.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Current phase.
    pub phase: Phase,
    /// Display name of the item being worked on, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<String>,
    /// Per-item percent (0-100) within the current phase.
    pub item_percent: f64,
    /// Overall run percent (0-100, monotonic non-decreasing).
    pub overall_percent: f64,
    /// Free-text status message.
    pub message: String,
}

impl ProgressSnapshot {
    /// Create a snapshot for the given phase.
    pub fn new(phase: Phase, message: impl Into<String>) -> Self {
        Self {
            phase,
            item: None,
            item_percent: 0.0,
            overall_percent: 0.0,
            message: message.into(),
        }
    }

    /// Set the current item name.
    #[must_use]
    pub fn with_item(mut self, item: impl Into<String>) -> Self {
        self.item = Some(item.into());
        self
    }

    /// Set the per-item percent.
    #[must_use]
    pub const fn with_item_percent(mut self, percent: f64) -> Self {
        self.item_percent = percent;
        self
    }

    /// Set the overall percent.
    #[must_use]
    pub const fn with_overall_percent(mut self, percent: f64) -> Self {
        self.overall_percent = percent;
        self
    }
}
