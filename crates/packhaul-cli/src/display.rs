//! Console progress rendering.
//!
//! Implements the batch event sink with an indicatif bar driven by the
//! pipeline's monotonic overall percentage.

use indicatif::{ProgressBar, ProgressStyle};

use packhaul_core::batch::Phase;
use packhaul_core::events::BatchEvent;
use packhaul_core::ports::BatchEventEmitterPort;

/// Progress bar sink for batch events.
#[derive(Clone)]
pub struct ConsoleProgress {
    bar: ProgressBar,
}

impl ConsoleProgress {
    /// Create the bar (0-100, message area for the current status line).
    #[must_use]
    pub fn new() -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template("{bar:40.cyan/blue} {percent:>3}% {wide_msg}")
                .expect("static template is valid"),
        );
        Self { bar }
    }

    /// Finish and clear the bar.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }

    fn phase_label(phase: Phase) -> &'static str {
        match phase {
            Phase::Cleaning => "clean",
            Phase::Patching => "patch",
            Phase::Archiving => "archive",
            Phase::Publishing => "publish",
            Phase::Converting => "convert",
            Phase::Complete => "done",
        }
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchEventEmitterPort for ConsoleProgress {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn emit(&self, event: BatchEvent) {
        match event {
            BatchEvent::RunStarted { total_items } => {
                self.bar.println(format!("Processing {total_items} item(s)"));
            }
            BatchEvent::Progress { snapshot } => {
                self.bar.set_position(snapshot.overall_percent.round() as u64);
                self.bar.set_message(format!(
                    "[{}] {}",
                    Self::phase_label(snapshot.phase),
                    snapshot.message
                ));
            }
            BatchEvent::UploadStarted { item } => {
                self.bar.println(format!("  ↑ uploading {item}"));
            }
            BatchEvent::UploadCancelled { item } => {
                self.bar.println(format!("  ✗ upload cancelled: {item}"));
            }
            BatchEvent::ItemCompleted {
                item,
                phase,
                success,
            } => {
                let mark = if success { "✓" } else { "✗" };
                self.bar
                    .println(format!("  {mark} {}: {item}", Self::phase_label(phase)));
            }
            BatchEvent::RunCompleted {
                succeeded,
                failed,
                cancelled,
                elapsed_ms,
            } => {
                self.bar.println(format!(
                    "Done in {:.1}s: {succeeded} ok, {failed} failed, {cancelled} cancelled",
                    elapsed_ms as f64 / 1000.0
                ));
            }
        }
    }

    fn clone_box(&self) -> Box<dyn BatchEventEmitterPort> {
        Box::new(self.clone())
    }
}
