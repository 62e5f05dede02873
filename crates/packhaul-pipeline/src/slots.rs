//! Bounded upload slot pool.
//!
//! Publishing is the only parallel phase. Admission is a counting semaphore
//! sized `max_concurrent_uploads`; each admitted task gets a slot carrying
//! its own cancellation token and live transfer stats. The slot token is
//! deliberately independent of the run-level token: a global cancel is
//! checked at attempt boundaries and lets already-dispatched transfers
//! finish, while the slot token is the immediate-abort path wired into the
//! transport.
//!
//! Slot release must happen on every exit path - success, failure,
//! cancellation, panic - so it is tied to the [`SlotGuard`]'s `Drop`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use packhaul_core::batch::{ItemId, PipelineError};
use packhaul_core::ports::TransferSample;

/// Live transfer stats for one occupied slot.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SlotStats {
    /// Bytes transferred so far.
    pub bytes_done: u64,
    /// Total bytes to transfer.
    pub total_bytes: u64,
    /// Instantaneous transfer speed in bytes per second.
    pub speed_bps: f64,
}

/// A point-in-time view of one occupied slot.
#[derive(Clone, Debug)]
pub struct SlotSnapshot {
    /// The item occupying the slot.
    pub item: ItemId,
    /// Its transfer stats.
    pub stats: SlotStats,
}

struct SlotHandle {
    cancel: CancellationToken,
    stats: SlotStats,
}

type Registry = Arc<Mutex<HashMap<ItemId, SlotHandle>>>;

/// The bounded pool of upload slots.
pub struct UploadSlots {
    semaphore: Arc<Semaphore>,
    registry: Registry,
}

impl UploadSlots {
    /// Create a pool bounding concurrency to `max_concurrent`.
    #[must_use]
    pub fn new(max_concurrent: u32) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent as usize)),
            registry: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Claim a slot for `item`, waiting until one frees up.
    ///
    /// Returns `PipelineError::Cancelled` if the run-level token fires
    /// while waiting - a cancel-all must prevent any not-yet-started
    /// publish task from beginning.
    pub async fn acquire(
        &self,
        item: ItemId,
        run_cancel: &CancellationToken,
    ) -> Result<SlotGuard, PipelineError> {
        let permit = tokio::select! {
            biased;

            () = run_cancel.cancelled() => return Err(PipelineError::Cancelled),

            permit = Arc::clone(&self.semaphore).acquire_owned() => {
                permit.map_err(|_| PipelineError::Cancelled)?
            }
        };

        let cancel = CancellationToken::new();
        lock(&self.registry).insert(
            item.clone(),
            SlotHandle {
                cancel: cancel.clone(),
                stats: SlotStats::default(),
            },
        );

        Ok(SlotGuard {
            _permit: permit,
            item,
            cancel,
            registry: Arc::clone(&self.registry),
        })
    }

    /// Cancel one occupied slot ("skip this one").
    ///
    /// Returns whether the item currently holds a slot.
    pub fn cancel_item(&self, item: &ItemId) -> bool {
        let registry = lock(&self.registry);
        registry.get(item).is_some_and(|handle| {
            handle.cancel.cancel();
            tracing::info!(item = %item, "Cancelled upload slot");
            true
        })
    }

    /// Cancel every occupied slot.
    ///
    /// Queued tasks are stopped by the run-level token they wait on in
    /// [`UploadSlots::acquire`].
    pub fn cancel_all(&self) {
        let registry = lock(&self.registry);
        for handle in registry.values() {
            handle.cancel.cancel();
        }
        tracing::info!(count = registry.len(), "Cancelled all upload slots");
    }

    /// Update the stats of an occupied slot.
    pub fn record_transfer(&self, item: &ItemId, sample: TransferSample) {
        let mut registry = lock(&self.registry);
        if let Some(handle) = registry.get_mut(item) {
            handle.stats = SlotStats {
                bytes_done: sample.bytes_done,
                total_bytes: sample.total_bytes,
                speed_bps: sample.speed_bps,
            };
        }
    }

    /// Number of occupied slots.
    pub fn active(&self) -> usize {
        lock(&self.registry).len()
    }

    /// Point-in-time view of all occupied slots.
    pub fn snapshot(&self) -> Vec<SlotSnapshot> {
        lock(&self.registry)
            .iter()
            .map(|(item, handle)| SlotSnapshot {
                item: item.clone(),
                stats: handle.stats,
            })
            .collect()
    }
}

fn lock(registry: &Registry) -> std::sync::MutexGuard<'_, HashMap<ItemId, SlotHandle>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An occupied slot. Dropping it releases the semaphore permit and
/// deregisters the item, on every exit path.
pub struct SlotGuard {
    _permit: OwnedSemaphorePermit,
    item: ItemId,
    cancel: CancellationToken,
    registry: Registry,
}

impl SlotGuard {
    /// This slot's cancellation token (fires on per-slot cancel or
    /// cancel-all; independent of the run-level token).
    pub const fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// The item occupying this slot.
    pub const fn item(&self) -> &ItemId {
        &self.item
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        lock(&self.registry).remove(&self.item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_registers_and_drop_releases() {
        let slots = UploadSlots::new(2);
        let run_cancel = CancellationToken::new();

        let guard = slots
            .acquire(ItemId::new("a"), &run_cancel)
            .await
            .unwrap();
        assert_eq!(slots.active(), 1);

        drop(guard);
        assert_eq!(slots.active(), 0);
    }

    #[tokio::test]
    async fn acquire_blocks_at_capacity_until_release() {
        let slots = Arc::new(UploadSlots::new(1));
        let run_cancel = CancellationToken::new();

        let first = slots
            .acquire(ItemId::new("a"), &run_cancel)
            .await
            .unwrap();

        let slots2 = Arc::clone(&slots);
        let cancel2 = run_cancel.clone();
        let second = tokio::spawn(async move {
            slots2.acquire(ItemId::new("b"), &cancel2).await
        });

        // The second acquire cannot complete while the first holds the permit.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!second.is_finished());

        drop(first);
        assert!(second.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn run_cancel_aborts_waiting_acquire() {
        let slots = Arc::new(UploadSlots::new(1));
        let run_cancel = CancellationToken::new();

        let _held = slots
            .acquire(ItemId::new("a"), &run_cancel)
            .await
            .unwrap();

        let slots2 = Arc::clone(&slots);
        let cancel2 = run_cancel.clone();
        let waiting = tokio::spawn(async move {
            slots2.acquire(ItemId::new("b"), &cancel2).await
        });

        run_cancel.cancel();
        let result = waiting.await.unwrap();
        assert!(matches!(result, Err(PipelineError::Cancelled)));
    }

    #[tokio::test]
    async fn cancel_item_fires_slot_token_only() {
        let slots = UploadSlots::new(2);
        let run_cancel = CancellationToken::new();

        let a = slots.acquire(ItemId::new("a"), &run_cancel).await.unwrap();
        let b = slots.acquire(ItemId::new("b"), &run_cancel).await.unwrap();

        assert!(slots.cancel_item(&ItemId::new("a")));
        assert!(a.cancel_token().is_cancelled());
        assert!(!b.cancel_token().is_cancelled());
        assert!(!run_cancel.is_cancelled());

        assert!(!slots.cancel_item(&ItemId::new("missing")));
    }

    #[tokio::test]
    async fn run_cancel_does_not_abort_occupied_slots() {
        // Already-dispatched transfers finish their current attempt; only
        // the slot token reaches the transport.
        let slots = UploadSlots::new(2);
        let run_cancel = CancellationToken::new();

        let a = slots.acquire(ItemId::new("a"), &run_cancel).await.unwrap();
        run_cancel.cancel();
        assert!(!a.cancel_token().is_cancelled());
    }

    #[tokio::test]
    async fn cancel_all_fires_every_occupied_slot() {
        let slots = UploadSlots::new(2);
        let run_cancel = CancellationToken::new();

        let a = slots.acquire(ItemId::new("a"), &run_cancel).await.unwrap();
        let b = slots.acquire(ItemId::new("b"), &run_cancel).await.unwrap();

        slots.cancel_all();
        assert!(a.cancel_token().is_cancelled());
        assert!(b.cancel_token().is_cancelled());
    }

    #[tokio::test]
    async fn record_transfer_updates_snapshot() {
        let slots = UploadSlots::new(1);
        let run_cancel = CancellationToken::new();
        let id = ItemId::new("a");

        let _guard = slots.acquire(id.clone(), &run_cancel).await.unwrap();
        slots.record_transfer(&id, TransferSample::new(50, 100, 2048.0));

        let snapshot = slots.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].stats.bytes_done, 50);
        assert_eq!(snapshot[0].stats.total_bytes, 100);
    }
}
