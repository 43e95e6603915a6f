//! Observer trait for per-item batch events.
//!
//! Inject an [`Arc<dyn BatchObserver>`] via
//! [`crate::batch::BatchRunner::with_observer`] to receive events as the
//! runner processes each image. The library itself never installs a global
//! logger: where results go (tracing, a progress bar, a database) is decided
//! by the observer.
//!
//! # Example
//!
//! ```rust
//! use receipt2json::{BatchObserver, ExtractError};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct FailureCounter {
//!     failed: AtomicUsize,
//! }
//!
//! impl BatchObserver for FailureCounter {
//!     fn on_item_error(&self, _index: usize, _total: usize, id: &str, error: &ExtractError) {
//!         self.failed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{id}: {error}");
//!     }
//! }
//!
//! let observer: Arc<dyn BatchObserver> = Arc::new(FailureCounter {
//!     failed: AtomicUsize::new(0),
//! });
//! ```

use crate::error::ExtractError;
use crate::output::BatchReport;
use crate::schema::ExtractionResult;
use std::sync::Arc;
use tracing::{error, info};

/// Called by the batch runner as it processes each image.
///
/// All methods have default no-op implementations so implementors only
/// override what they care about.
///
/// # Thread safety
///
/// With `concurrency > 1`, the per-item methods may be called concurrently.
/// Implementations must protect shared mutable state (`Mutex`, atomics).
pub trait BatchObserver: Send + Sync {
    /// Called once before the first image is processed.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called before the first model call for an image.
    ///
    /// # Arguments
    /// * `index` — 0-based position in the batch
    /// * `total` — batch size
    /// * `id`    — image identifier
    fn on_item_start(&self, index: usize, total: usize, id: &str) {
        let _ = (index, total, id);
    }

    /// Called when an image produced a validated result.
    fn on_item_success(&self, index: usize, total: usize, id: &str, result: &ExtractionResult) {
        let _ = (index, total, id, result);
    }

    /// Called when an image failed after all retries.
    fn on_item_error(&self, index: usize, total: usize, id: &str, error: &ExtractError) {
        let _ = (index, total, id, error);
    }

    /// Called once after every image has been attempted.
    fn on_batch_complete(&self, report: &BatchReport) {
        let _ = report;
    }
}

/// Observer that ignores every event. Default for [`crate::batch::BatchRunner`].
pub struct NoopObserver;

impl BatchObserver for NoopObserver {}

/// Observer that writes each result as a structured `tracing` record:
/// the pretty JSON block at `info`, failures at `error`.
pub struct TracingObserver;

impl BatchObserver for TracingObserver {
    fn on_batch_start(&self, total: usize) {
        info!(total, "Processing {} image(s)", total);
    }

    fn on_item_success(&self, index: usize, total: usize, id: &str, result: &ExtractionResult) {
        info!(
            index,
            id,
            document_type = %result.document_type(),
            ocr_quality = %result.ocr_quality(),
            "[{}/{}] {}\n{}",
            index + 1,
            total,
            id,
            result.to_pretty_json()
        );
    }

    fn on_item_error(&self, index: usize, total: usize, id: &str, error: &ExtractError) {
        error!(index, id, kind = error.kind(), "[{}/{}] {} failed: {}", index + 1, total, id, error);
    }

    fn on_batch_complete(&self, report: &BatchReport) {
        info!(
            attempted = report.attempted(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Batch complete: {}",
            report.summary()
        );
    }
}

/// Convenience alias for the type stored by the batch runner.
pub type SharedObserver = Arc<dyn BatchObserver>;
