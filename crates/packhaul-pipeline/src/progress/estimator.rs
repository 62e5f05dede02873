//! The run-wide progress model.
//!
//! Converts raw phase events (items done, percent done, bytes done) into a
//! single monotonic overall percentage and an ETA-style remaining estimate.
//! All mutation happens behind one mutex; snapshots are emitted while the
//! lock is held so the outgoing event stream is strictly ordered.
//!
//! The overall percentage is clamped to `max(new, last)` and to at most 99
//! until [`ProgressEstimator::complete`] emits the final 100. Phase-mix
//! estimates are noisy; a consumer must never see progress go backward.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use packhaul_core::batch::{Phase, ProgressSnapshot};
use packhaul_core::events::BatchEvent;
use packhaul_core::ports::{BatchEventEmitterPort, TransferSample};
use packhaul_core::WorkItem;

use super::ProgressThrottle;

/// EWA smoothing factor (20% of the new sample, 80% of the previous rate).
const EWA_SMOOTHING: f64 = 0.2;

/// Seed assumption: seconds to patch one item.
const DEFAULT_PATCH_SECS_PER_ITEM: f64 = 20.0;

/// Seed assumption: seconds to archive one item.
const DEFAULT_ARCHIVE_SECS_PER_ITEM: f64 = 90.0;

/// Seed assumption: upload throughput in bytes per second (4 MiB/s).
const DEFAULT_UPLOAD_BYTES_PER_SEC: f64 = 4.0 * 1024.0 * 1024.0;

/// Assumed archive size for uploads that have not started yet (1 GiB),
/// used until real archive sizes are known.
const DEFAULT_ASSUMED_ARCHIVE_BYTES: f64 = 1024.0 * 1024.0 * 1024.0;

/// Overall percent is pinned below this until the run fully completes.
const PRE_COMPLETION_CAP: f64 = 99.0;

/// How much work of each kind one run contains.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkPlan {
    /// Items with the patch intent.
    pub patch_items: u32,
    /// Items with the archive intent.
    pub archive_items: u32,
    /// Items with the publish intent.
    pub publish_items: u32,
}

impl WorkPlan {
    /// Count intents across a (normalized) item list.
    #[must_use]
    pub fn from_items(items: &[WorkItem]) -> Self {
        let mut plan = Self::default();
        for item in items {
            if item.patch {
                plan.patch_items += 1;
            }
            if item.archive {
                plan.archive_items += 1;
            }
            if item.publish {
                plan.publish_items += 1;
            }
        }
        plan
    }
}

/// A per-phase throughput estimate: seeded with a default assumption,
/// overwritten by the first real sample, then exponentially smoothed.
#[derive(Clone, Copy, Debug)]
struct PhaseRate {
    rate: f64,
    measured: bool,
}

impl PhaseRate {
    const fn seeded(rate: f64) -> Self {
        Self {
            rate,
            measured: false,
        }
    }

    fn observe(&mut self, sample: f64) {
        if !sample.is_finite() || sample <= 0.0 {
            return;
        }
        if self.measured {
            self.rate = EWA_SMOOTHING.mul_add(sample, (1.0 - EWA_SMOOTHING) * self.rate);
        } else {
            self.rate = sample;
            self.measured = true;
        }
    }

    fn get(&self) -> f64 {
        self.rate.max(f64::MIN_POSITIVE)
    }
}

struct EstimatorState {
    started_at: Instant,
    plan: WorkPlan,

    patch_done: u32,
    patch_mark: Option<Instant>,

    archive_done: u32,
    archive_current_pct: f64,
    archive_mark: Option<(Instant, f64)>,
    completed_archive_bytes: Vec<u64>,

    publish_done: u32,
    /// In-flight uploads: item name -> (bytes done, total bytes).
    uploads: HashMap<String, (u64, u64)>,

    patch_rate: PhaseRate,
    archive_rate: PhaseRate,
    upload_rate: PhaseRate,

    last_overall: f64,
    finished: bool,
    throttle: ProgressThrottle,
}

impl EstimatorState {
    fn new(plan: WorkPlan) -> Self {
        Self {
            started_at: Instant::now(),
            plan,
            patch_done: 0,
            patch_mark: None,
            archive_done: 0,
            archive_current_pct: 0.0,
            archive_mark: None,
            completed_archive_bytes: Vec::new(),
            publish_done: 0,
            uploads: HashMap::new(),
            patch_rate: PhaseRate::seeded(1.0 / DEFAULT_PATCH_SECS_PER_ITEM),
            archive_rate: PhaseRate::seeded(100.0 / DEFAULT_ARCHIVE_SECS_PER_ITEM),
            upload_rate: PhaseRate::seeded(DEFAULT_UPLOAD_BYTES_PER_SEC),
            last_overall: 0.0,
            finished: false,
            throttle: ProgressThrottle::default_interval(),
        }
    }

    /// Estimated seconds of work left across all phases still pending.
    #[allow(clippy::cast_precision_loss)]
    fn total_remaining_secs(&self) -> f64 {
        let patch_left = f64::from(self.plan.patch_items.saturating_sub(self.patch_done));
        let patch_secs = patch_left / self.patch_rate.get();

        let archive_pts_left = (f64::from(self.plan.archive_items.saturating_sub(self.archive_done))
            * 100.0
            - self.archive_current_pct)
            .max(0.0);
        let archive_secs = archive_pts_left / self.archive_rate.get();

        let inflight_bytes: f64 = self
            .uploads
            .values()
            .map(|(done, total)| total.saturating_sub(*done) as f64)
            .sum();
        let started = self.publish_done + u32::try_from(self.uploads.len()).unwrap_or(u32::MAX);
        let queued = f64::from(self.plan.publish_items.saturating_sub(started));
        let assumed = if self.completed_archive_bytes.is_empty() {
            DEFAULT_ASSUMED_ARCHIVE_BYTES
        } else {
            self.completed_archive_bytes.iter().sum::<u64>() as f64
                / self.completed_archive_bytes.len() as f64
        };
        let publish_secs = queued.mul_add(assumed, inflight_bytes) / self.upload_rate.get();

        patch_secs + archive_secs + publish_secs
    }

    /// The monotonic, capped overall percentage.
    fn overall_percent(&mut self) -> f64 {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        let remaining = self.total_remaining_secs();
        let raw = if elapsed + remaining > 0.0 {
            elapsed / (elapsed + remaining) * 100.0
        } else {
            0.0
        };
        let clamped = raw.max(self.last_overall).min(PRE_COMPLETION_CAP);
        self.last_overall = clamped;
        clamped
    }
}

/// Thread-safe progress model for one run.
///
/// Every provider callback, from any execution context, ends up in one of
/// the methods below. A single mutex serializes them; call frequency is low
/// enough that no finer-grained locking is warranted.
pub struct ProgressEstimator {
    emitter: Arc<dyn BatchEventEmitterPort>,
    inner: Mutex<EstimatorState>,
}

impl ProgressEstimator {
    /// Create an estimator for a run with the given work plan.
    pub fn new(emitter: Arc<dyn BatchEventEmitterPort>, plan: WorkPlan) -> Self {
        Self {
            emitter,
            inner: Mutex::new(EstimatorState::new(plan)),
        }
    }

    fn state(&self) -> MutexGuard<'_, EstimatorState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Emit a snapshot while holding the lock, so the event stream stays
    /// strictly ordered. `force` bypasses the sample throttle.
    fn emit_locked(
        &self,
        state: &mut EstimatorState,
        phase: Phase,
        item: Option<&str>,
        item_percent: f64,
        message: String,
        force: bool,
    ) {
        if state.finished {
            return;
        }
        let overall = state.overall_percent();
        if !force && !state.throttle.should_emit() {
            return;
        }
        let mut snapshot = ProgressSnapshot::new(phase, message)
            .with_item_percent(item_percent.clamp(0.0, 100.0))
            .with_overall_percent(overall);
        if let Some(item) = item {
            snapshot = snapshot.with_item(item);
        }
        self.emitter.emit(BatchEvent::progress(snapshot));
    }

    /// Cleaning pass reached an item.
    pub fn cleaning(&self, item: &str) {
        let mut state = self.state();
        self.emit_locked(
            &mut state,
            Phase::Cleaning,
            Some(item),
            0.0,
            format!("Cleaning {item}"),
            true,
        );
    }

    /// Patch pass reached an item.
    pub fn patch_started(&self, item: &str) {
        let mut state = self.state();
        if state.patch_mark.is_none() {
            state.patch_mark = Some(Instant::now());
        }
        self.emit_locked(
            &mut state,
            Phase::Patching,
            Some(item),
            0.0,
            format!("Patching {item}"),
            true,
        );
    }

    /// Free-text status from the patch provider.
    pub fn patch_status(&self, item: &str, status: &str) {
        let mut state = self.state();
        self.emit_locked(
            &mut state,
            Phase::Patching,
            Some(item),
            50.0,
            status.to_string(),
            false,
        );
    }

    /// One item finished the patch phase.
    pub fn patch_finished(&self, item: &str, success: bool) {
        let mut state = self.state();
        let now = Instant::now();
        if let Some(mark) = state.patch_mark {
            let dt = now.duration_since(mark).as_secs_f64();
            if dt > 0.0 {
                let sample = 1.0 / dt;
                state.patch_rate.observe(sample);
            }
        }
        state.patch_mark = Some(now);
        state.patch_done += 1;
        let message = if success {
            format!("Patched {item}")
        } else {
            format!("Patch failed for {item}")
        };
        self.emit_locked(&mut state, Phase::Patching, Some(item), 100.0, message, true);
    }

    /// Archive pass reached an item.
    pub fn archive_started(&self, item: &str) {
        let mut state = self.state();
        state.archive_current_pct = 0.0;
        if state.archive_mark.is_none() {
            state.archive_mark = Some((Instant::now(), 0.0));
        }
        self.emit_locked(
            &mut state,
            Phase::Archiving,
            Some(item),
            0.0,
            format!("Compressing {item}"),
            true,
        );
    }

    /// Percent-complete callback from the archiver. Throttled.
    pub fn archive_progress(&self, item: &str, percent: f64) {
        let mut state = self.state();
        let percent = percent.clamp(0.0, 100.0);
        state.archive_current_pct = percent;
        let cumulative = f64::from(state.archive_done).mul_add(100.0, percent);
        Self::observe_archive_points(&mut state, cumulative);
        self.emit_locked(
            &mut state,
            Phase::Archiving,
            Some(item),
            percent,
            format!("Compressing {item} ({percent:.0}%)"),
            false,
        );
    }

    /// One item finished the archive phase.
    ///
    /// `archive_bytes` is the size of the produced archive, used to refine
    /// the size assumption for uploads that have not started yet.
    pub fn archive_finished(&self, item: &str, success: bool, archive_bytes: Option<u64>) {
        let mut state = self.state();
        let cumulative = f64::from(state.archive_done + 1) * 100.0;
        Self::observe_archive_points(&mut state, cumulative);
        state.archive_done += 1;
        state.archive_current_pct = 0.0;
        if let Some(bytes) = archive_bytes {
            state.completed_archive_bytes.push(bytes);
        }
        let message = if success {
            format!("Compressed {item}")
        } else {
            format!("Compression failed for {item}")
        };
        self.emit_locked(&mut state, Phase::Archiving, Some(item), 100.0, message, true);
    }

    fn observe_archive_points(state: &mut EstimatorState, cumulative: f64) {
        let now = Instant::now();
        if let Some((mark, last_cumulative)) = state.archive_mark {
            let dt = now.duration_since(mark).as_secs_f64();
            let delta = cumulative - last_cumulative;
            if dt > 0.0 && delta > 0.0 {
                let sample = delta / dt;
                state.archive_rate.observe(sample);
            }
        }
        state.archive_mark = Some((now, cumulative));
    }

    /// An upload was admitted to a slot and is about to start.
    pub fn upload_started(&self, item: &str, total_bytes: u64) {
        let mut state = self.state();
        state.uploads.insert(item.to_string(), (0, total_bytes));
        self.emit_locked(
            &mut state,
            Phase::Publishing,
            Some(item),
            0.0,
            format!("Uploading {item}"),
            true,
        );
    }

    /// Byte-level sample from an in-flight upload. Throttled.
    #[allow(clippy::cast_precision_loss)]
    pub fn upload_progress(&self, item: &str, sample: TransferSample) {
        let mut state = self.state();
        state
            .uploads
            .insert(item.to_string(), (sample.bytes_done, sample.total_bytes));
        state.upload_rate.observe(sample.speed_bps);
        let item_percent = if sample.total_bytes > 0 {
            sample.bytes_done as f64 / sample.total_bytes as f64 * 100.0
        } else {
            0.0
        };
        let done_mib = sample.bytes_done as f64 / (1024.0 * 1024.0);
        let total_mib = sample.total_bytes as f64 / (1024.0 * 1024.0);
        self.emit_locked(
            &mut state,
            Phase::Publishing,
            Some(item),
            item_percent,
            format!("Uploading {item} ({done_mib:.1}/{total_mib:.1} MiB)"),
            false,
        );
    }

    /// One item's publish task ended (success, failure or cancellation).
    pub fn publish_finished(&self, item: &str, success: bool) {
        let mut state = self.state();
        state.uploads.remove(item);
        state.publish_done += 1;
        let message = if success {
            format!("Published {item}")
        } else {
            format!("Publish did not complete for {item}")
        };
        self.emit_locked(
            &mut state,
            Phase::Publishing,
            Some(item),
            100.0,
            message,
            true,
        );
    }

    /// Status line from the link-conversion countdown.
    pub fn converting(&self, item: &str, message: String) {
        let mut state = self.state();
        self.emit_locked(&mut state, Phase::Converting, Some(item), 100.0, message, true);
    }

    /// The run is fully complete: emit the final snapshot at exactly 100.
    pub fn complete(&self) {
        let mut state = self.state();
        if state.finished {
            return;
        }
        let snapshot = ProgressSnapshot::new(Phase::Complete, "Run complete")
            .with_item_percent(100.0)
            .with_overall_percent(100.0);
        state.finished = true;
        state.last_overall = 100.0;
        self.emitter.emit(BatchEvent::progress(snapshot));
    }

    /// The last overall percentage handed to the consumer.
    pub fn last_overall_percent(&self) -> f64 {
        self.state().last_overall
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Clone, Default)]
    struct CaptureEmitter {
        events: Arc<StdMutex<Vec<BatchEvent>>>,
    }

    impl BatchEventEmitterPort for CaptureEmitter {
        fn emit(&self, event: BatchEvent) {
            self.events.lock().unwrap().push(event);
        }

        fn clone_box(&self) -> Box<dyn BatchEventEmitterPort> {
            Box::new(self.clone())
        }
    }

    fn overall_percents(events: &[BatchEvent]) -> Vec<f64> {
        events
            .iter()
            .filter_map(|e| match e {
                BatchEvent::Progress { snapshot } => Some(snapshot.overall_percent),
                _ => None,
            })
            .collect()
    }

    fn new_estimator(plan: WorkPlan) -> (ProgressEstimator, CaptureEmitter) {
        let emitter = CaptureEmitter::default();
        let estimator = ProgressEstimator::new(Arc::new(emitter.clone()), plan);
        (estimator, emitter)
    }

    #[test]
    fn overall_percent_is_monotonic_and_caps_at_99() {
        let (estimator, emitter) = new_estimator(WorkPlan {
            patch_items: 2,
            archive_items: 1,
            publish_items: 1,
        });

        estimator.patch_started("a");
        estimator.patch_finished("a", true);
        estimator.patch_started("b");
        estimator.patch_finished("b", false);
        estimator.archive_started("a");
        estimator.archive_finished("a", true, Some(1000));
        estimator.upload_started("a", 1000);
        estimator.publish_finished("a", true);

        let percents = overall_percents(&emitter.events.lock().unwrap());
        assert!(!percents.is_empty());
        for pair in percents.windows(2) {
            assert!(pair[1] >= pair[0], "progress went backward: {pair:?}");
        }
        for pct in &percents {
            assert!(*pct <= PRE_COMPLETION_CAP, "exceeded cap before complete");
        }
    }

    #[test]
    fn complete_emits_exactly_100_once() {
        let (estimator, emitter) = new_estimator(WorkPlan::default());
        estimator.complete();
        estimator.complete();

        let percents = overall_percents(&emitter.events.lock().unwrap());
        assert_eq!(percents, vec![100.0]);
    }

    #[test]
    fn events_after_complete_are_dropped() {
        let (estimator, emitter) = new_estimator(WorkPlan {
            patch_items: 1,
            ..WorkPlan::default()
        });
        estimator.complete();
        estimator.patch_started("late");

        let events = emitter.events.lock().unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn phase_rate_seeds_then_smooths() {
        let mut rate = PhaseRate::seeded(10.0);
        assert!((rate.get() - 10.0).abs() < f64::EPSILON);

        rate.observe(100.0);
        assert!((rate.get() - 100.0).abs() < f64::EPSILON, "first sample replaces seed");

        rate.observe(50.0);
        let expected = EWA_SMOOTHING.mul_add(50.0, (1.0 - EWA_SMOOTHING) * 100.0);
        assert!((rate.get() - expected).abs() < 1e-9);
    }

    #[test]
    fn phase_rate_ignores_bad_samples() {
        let mut rate = PhaseRate::seeded(10.0);
        rate.observe(0.0);
        rate.observe(-5.0);
        rate.observe(f64::NAN);
        assert!((rate.get() - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn work_plan_counts_intents() {
        let items = vec![
            WorkItem::new("a", "/a").with_patch(true),
            WorkItem::new("b", "/b").with_archive(true).with_publish(true),
            WorkItem::new("c", "/c"),
        ];
        let plan = WorkPlan::from_items(&items);
        assert_eq!(plan.patch_items, 1);
        assert_eq!(plan.archive_items, 1);
        assert_eq!(plan.publish_items, 1);
    }
}
