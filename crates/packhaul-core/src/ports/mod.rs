//! Port definitions (trait abstractions) for external collaborators.
//!
//! Ports define the interfaces the pipeline expects from the outside world:
//! the patch provider, the archiver, the uploader, the link converter, and
//! the event sink a consumer plugs in.
//!
//! # Design Rules
//!
//! - Only domain types in signatures
//! - No transport or file-format details leak through
//! - Progress callbacks are plain `Fn` references, invoked from whatever
//!   execution context the implementation uses; the pipeline funnels them
//!   through one thread-safe sink

pub mod archiver;
pub mod event_emitter;
pub mod link_converter;
pub mod patch_provider;
pub mod uploader;

pub use archiver::{ArchiveJob, ArchiverPort};
pub use event_emitter::{BatchEventEmitterPort, NoopBatchEmitter};
pub use link_converter::{ConvertPoll, LinkConverterPort};
pub use patch_provider::{PatchJob, PatchProviderPort, PatchReport};
pub use uploader::{TransferSample, UploaderPort};

/// Status-text callback handed to providers that report free-text progress.
pub type StatusFn<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// Percent-complete callback (0.0 - 100.0).
pub type PercentFn<'a> = &'a (dyn Fn(f64) + Send + Sync);

/// Transfer-sample callback for byte-based progress.
pub type TransferFn<'a> = &'a (dyn Fn(TransferSample) + Send + Sync);
