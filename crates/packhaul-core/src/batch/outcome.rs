//! Per-item outcomes and aggregate run results.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::ItemId;

/// Result of one phase for one item.
///
/// Cancellation is its own category so callers can distinguish "failed"
/// from "user-cancelled".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    /// The item did not request this phase.
    #[default]
    NotRequested,
    /// The phase completed successfully.
    Succeeded,
    /// The phase failed.
    Failed,
    /// The phase was cancelled before or during execution.
    Cancelled,
}

impl PhaseStatus {
    /// Whether the phase was requested at all.
    #[must_use]
    pub const fn was_requested(&self) -> bool {
        !matches!(self, Self::NotRequested)
    }
}

/// Per-item record of what happened in each phase it requested.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemOutcome {
    /// The item's identifier.
    pub id: ItemId,
    /// Patch phase result.
    pub patch: PhaseStatus,
    /// Archive phase result.
    pub archive: PhaseStatus,
    /// Publish phase result.
    pub publish: PhaseStatus,
    /// Raw upload link, if the upload succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_link: Option<String>,
    /// Converted mirror link. Optional even on publish success: conversion
    /// failure falls back to `upload_link`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub converted_link: Option<String>,
    /// Number of upload retries that were needed (0 = first attempt worked).
    pub retries_used: u32,
    /// Human-readable reason for the first failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ItemOutcome {
    /// Create an empty outcome for an item.
    #[must_use]
    pub const fn new(id: ItemId) -> Self {
        Self {
            id,
            patch: PhaseStatus::NotRequested,
            archive: PhaseStatus::NotRequested,
            publish: PhaseStatus::NotRequested,
            upload_link: None,
            converted_link: None,
            retries_used: 0,
            error: None,
        }
    }

    /// The link a consumer should present: the converted link when
    /// available, otherwise the raw upload link.
    #[must_use]
    pub fn best_link(&self) -> Option<&str> {
        self.converted_link
            .as_deref()
            .or(self.upload_link.as_deref())
    }

    /// Record a failure reason, keeping the first one.
    pub fn record_error(&mut self, reason: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(reason.into());
        }
    }
}

/// Succeeded/failed/cancelled counters for one phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseCounts {
    /// Items that completed the phase.
    pub succeeded: u32,
    /// Items that failed the phase.
    pub failed: u32,
    /// Items cancelled before or during the phase.
    pub cancelled: u32,
}

impl PhaseCounts {
    /// Total items that requested this phase.
    #[must_use]
    pub const fn requested(&self) -> u32 {
        self.succeeded + self.failed + self.cancelled
    }

    /// Tally one phase status into the counters.
    pub fn record(&mut self, status: PhaseStatus) {
        match status {
            PhaseStatus::NotRequested => {}
            PhaseStatus::Succeeded => self.succeeded += 1,
            PhaseStatus::Failed => self.failed += 1,
            PhaseStatus::Cancelled => self.cancelled += 1,
        }
    }
}

/// Aggregate result of one batch run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Patch phase counters.
    pub patch: PhaseCounts,
    /// Archive phase counters.
    pub archive: PhaseCounts,
    /// Publish phase counters.
    pub publish: PhaseCounts,
    /// Per-item outcomes, in input order.
    pub outcomes: Vec<ItemOutcome>,
    /// Human-readable failure reasons, in the order they occurred.
    pub failures: Vec<String>,
    /// Total wall-clock time for the run.
    pub elapsed: Duration,
}

impl RunResult {
    /// Build the aggregate from a list of outcomes.
    #[must_use]
    pub fn from_outcomes(outcomes: Vec<ItemOutcome>, elapsed: Duration) -> Self {
        let mut result = Self {
            elapsed,
            ..Self::default()
        };
        for outcome in &outcomes {
            result.patch.record(outcome.patch);
            result.archive.record(outcome.archive);
            result.publish.record(outcome.publish);
            if let Some(reason) = &outcome.error {
                result.failures.push(format!("{}: {reason}", outcome.id));
            }
        }
        result.outcomes = outcomes;
        result
    }

    /// Whether every requested phase of every item succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
            && self.patch.failed == 0
            && self.archive.failed == 0
            && self.publish.failed == 0
            && self.patch.cancelled == 0
            && self.archive.cancelled == 0
            && self.publish.cancelled == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_conserve_requested_items() {
        let mut a = ItemOutcome::new(ItemId::new("a"));
        a.patch = PhaseStatus::Succeeded;
        let mut b = ItemOutcome::new(ItemId::new("b"));
        b.patch = PhaseStatus::Failed;
        b.record_error("patcher rejected binary");
        let c = ItemOutcome::new(ItemId::new("c"));

        let result = RunResult::from_outcomes(vec![a, b, c], Duration::from_secs(1));
        assert_eq!(result.patch.requested(), 2);
        assert_eq!(result.patch.succeeded, 1);
        assert_eq!(result.patch.failed, 1);
        assert_eq!(result.archive.requested(), 0);
        assert_eq!(result.failures.len(), 1);
        assert!(result.failures[0].contains("patcher rejected"));
        assert!(!result.is_clean());
    }

    #[test]
    fn best_link_prefers_converted() {
        let mut outcome = ItemOutcome::new(ItemId::new("a"));
        outcome.upload_link = Some("https://host/raw".into());
        assert_eq!(outcome.best_link(), Some("https://host/raw"));

        outcome.converted_link = Some("https://mirror/fast".into());
        assert_eq!(outcome.best_link(), Some("https://mirror/fast"));
    }

    #[test]
    fn record_error_keeps_first_reason() {
        let mut outcome = ItemOutcome::new(ItemId::new("a"));
        outcome.record_error("first");
        outcome.record_error("second");
        assert_eq!(outcome.error.as_deref(), Some("first"));
    }

    #[test]
    fn cancelled_is_not_failed() {
        let mut outcome = ItemOutcome::new(ItemId::new("a"));
        outcome.publish = PhaseStatus::Cancelled;
        let result = RunResult::from_outcomes(vec![outcome], Duration::ZERO);
        assert_eq!(result.publish.cancelled, 1);
        assert_eq!(result.publish.failed, 0);
    }
}
