//! Batch event emitter port.
//!
//! This port abstracts event emission so the pipeline can report progress
//! without coupling to transport details (CLI rendering, IPC, log bridge).

use crate::events::BatchEvent;

/// Port for emitting batch events.
///
/// Implementations handle the actual delivery (progress bars, channels,
/// IPC events). `emit` must not block: the pipeline calls it from hot
/// progress paths.
pub trait BatchEventEmitterPort: Send + Sync {
    /// Emit a batch event.
    fn emit(&self, event: BatchEvent);

    /// Clone this emitter into a boxed trait object.
    ///
    /// This enables cloning of `Arc<dyn BatchEventEmitterPort>` without
    /// requiring the underlying type to implement Clone.
    fn clone_box(&self) -> Box<dyn BatchEventEmitterPort>;
}

/// A no-op event emitter for tests and headless contexts.
#[derive(Debug, Clone, Default)]
pub struct NoopBatchEmitter;

impl NoopBatchEmitter {
    /// Create a new no-op emitter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl BatchEventEmitterPort for NoopBatchEmitter {
    fn emit(&self, _event: BatchEvent) {
        // Intentionally do nothing
    }

    fn clone_box(&self) -> Box<dyn BatchEventEmitterPort> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;


    use super::*;

    #[test]
    fn test_noop_emitter() {
        let emitter = NoopBatchEmitter::new();

        // Should not panic
        emitter.emit(BatchEvent::run_started(3));
    }

    #[test]
    fn test_noop_emitter_clone_box() {
        let emitter = NoopBatchEmitter::new();
        let _boxed: Box<dyn BatchEventEmitterPort> = emitter.clone_box();
    }

    #[test]
    fn test_arc_emitter() {
        let emitter: Arc<dyn BatchEventEmitterPort> = Arc::new(NoopBatchEmitter::new());
        emitter.emit(BatchEvent::run_started(1));
    }
}
