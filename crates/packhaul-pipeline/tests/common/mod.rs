//! Shared test doubles for the pipeline integration tests.
//!
//! Hand-rolled capturing fakes: each implements one port, records its
//! invocations, and can be steered per item name.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use packhaul_core::batch::{PipelineError, WorkItem};
use packhaul_core::events::BatchEvent;
use packhaul_core::ports::{
    ArchiveJob, ArchiverPort, BatchEventEmitterPort, ConvertPoll, LinkConverterPort, PatchJob,
    PatchProviderPort, PatchReport, PercentFn, StatusFn, TransferFn, TransferSample, UploaderPort,
};

/// Captures every emitted event for later assertions.
#[derive(Clone, Default)]
pub struct CaptureEmitter {
    pub events: Arc<Mutex<Vec<BatchEvent>>>,
}

impl CaptureEmitter {
    pub fn events(&self) -> Vec<BatchEvent> {
        self.events.lock().unwrap().clone()
    }

    /// All overall percentages, in emission order.
    pub fn overall_percents(&self) -> Vec<f64> {
        self.events()
            .iter()
            .filter_map(|e| match e {
                BatchEvent::Progress { snapshot } => Some(snapshot.overall_percent),
                _ => None,
            })
            .collect()
    }
}

impl BatchEventEmitterPort for CaptureEmitter {
    fn emit(&self, event: BatchEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn clone_box(&self) -> Box<dyn BatchEventEmitterPort> {
        Box::new(self.clone())
    }
}

fn item_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Patch provider fake: succeeds unless the item name is in `fail`.
#[derive(Default)]
pub struct FakePatcher {
    pub fail: HashSet<String>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl PatchProviderPort for FakePatcher {
    async fn patch(
        &self,
        job: &PatchJob,
        on_status: StatusFn<'_>,
    ) -> Result<PatchReport, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        on_status("swapping client layer");
        let name = item_name(&job.source_path);
        if self.fail.contains(&name) {
            Ok(PatchReport::failed("unsupported binary layout"))
        } else {
            Ok(PatchReport::ok())
        }
    }
}

/// Archiver fake: writes a real archive file (the publish stage stats it),
/// reports a few percent samples, and bumps `completed` on success.
pub struct FakeArchiver {
    pub fail: HashSet<String>,
    /// Skip writing the output file (to exercise the missing-archive path).
    pub skip_write: bool,
    pub archive_bytes: usize,
    pub calls: AtomicUsize,
    pub completed: Arc<AtomicUsize>,
}

impl Default for FakeArchiver {
    fn default() -> Self {
        Self {
            fail: HashSet::new(),
            skip_write: false,
            archive_bytes: 2048,
            calls: AtomicUsize::new(0),
            completed: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl ArchiverPort for FakeArchiver {
    async fn compress(
        &self,
        job: &ArchiveJob,
        on_percent: PercentFn<'_>,
    ) -> Result<(), PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        on_percent(25.0);
        on_percent(75.0);
        let name = item_name(&job.source_path);
        if self.fail.contains(&name) {
            return Err(PipelineError::archive("compressor exited with code 2"));
        }
        if !self.skip_write {
            fs::write(&job.output_path, vec![0u8; self.archive_bytes])
                .map_err(|e| PipelineError::from_io_error(&e))?;
        }
        on_percent(100.0);
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Decrements a counter on drop, so concurrency tracking survives every
/// exit path of the fake uploader.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Uploader fake with per-item scripted failures, concurrency tracking,
/// and optional run-cancel triggering for the cancellation scenario.
#[derive(Default)]
pub struct FakeUploader {
    /// Fail this many attempts per item before succeeding.
    pub fail_attempts: u32,
    /// How long each upload takes.
    pub delay: Duration,
    /// Block each upload until this counter reaches the target (lets a
    /// test hold uploads in flight until every archive has landed).
    pub wait_for: Option<(Arc<AtomicUsize>, usize)>,
    /// Block each upload until this many uploads are in flight at once.
    pub wait_for_peers: Option<usize>,
    /// Cancel this token once the waits above are satisfied
    /// (global-cancel tests).
    pub cancel_once_started: Option<CancellationToken>,
    pub calls: AtomicUsize,
    pub current: AtomicUsize,
    pub max_concurrent: AtomicUsize,
    pub attempts: Mutex<HashMap<String, u32>>,
}

#[async_trait]
impl UploaderPort for FakeUploader {
    async fn upload(
        &self,
        path: &Path,
        on_progress: TransferFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(current, Ordering::SeqCst);
        let _in_flight = InFlight(&self.current);

        if let Some((counter, target)) = &self.wait_for {
            while counter.load(Ordering::SeqCst) < *target {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        }
        if let Some(peers) = self.wait_for_peers {
            while self.current.load(Ordering::SeqCst) < peers {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        }
        if let Some(token) = &self.cancel_once_started {
            token.cancel();
        }

        let total = fs::metadata(path).map_or(100, |m| m.len());
        on_progress(TransferSample::new(0, total, 1_000_000.0));

        tokio::time::sleep(self.delay).await;
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        on_progress(TransferSample::new(total / 2, total, 1_000_000.0));
        on_progress(TransferSample::new(total, total, 1_000_000.0));

        let name = item_name(path);
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let entry = attempts.entry(name.clone()).or_insert(0);
            *entry += 1;
            *entry
        };
        if attempt <= self.fail_attempts {
            return Err(PipelineError::upload_with_status("host rejected transfer", 503));
        }

        Ok(Some(format!("https://files.example/{name}")))
    }
}

/// Converter fake: `Pending` a scripted number of times, then `Ready`.
#[derive(Default)]
pub struct FakeConverter {
    /// `None` = never ready; `Some(n)` = ready after n pending polls.
    pub ready_after: Option<u32>,
    /// Fail terminally on every call.
    pub error: bool,
    pub calls: AtomicUsize,
    pub polls: Mutex<HashMap<String, u32>>,
}

#[async_trait]
impl LinkConverterPort for FakeConverter {
    async fn convert(
        &self,
        link: &str,
        _file_size_bytes: u64,
        _cancel: &CancellationToken,
    ) -> Result<ConvertPoll, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.error {
            return Err(PipelineError::other("converter rejected the link"));
        }
        let poll = {
            let mut polls = self.polls.lock().unwrap();
            let entry = polls.entry(link.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };
        match self.ready_after {
            Some(n) if poll > n => Ok(ConvertPoll::Ready(format!("{link}?mirror"))),
            _ => Ok(ConvertPoll::Pending),
        }
    }
}

/// Create a source folder (with one file inside) for each named item and
/// return the matching work items.
pub fn make_items(root: &Path, names: &[&str]) -> Vec<WorkItem> {
    names
        .iter()
        .map(|name| {
            let dir = root.join(name);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("game.bin"), b"binary").unwrap();
            WorkItem::new(*name, dir)
        })
        .collect()
}
