//! Progress-callback trait for per-card export events.
//!
//! Inject an [`Arc<dyn ExportProgressCallback>`] via
//! [`crate::config::CardConfigBuilder::progress_callback`] to receive events
//! as the export pipeline captures each card of a batch.
//!
//! # Example
//!
//! ```rust
//! use lexicard::{ExportProgressCallback, CardConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl ExportProgressCallback for CountingCallback {
//!     fn on_item_complete(&self, index: usize, total: usize, png_len: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Card {}/{} done ({} bytes)", index, total, png_len);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = CardConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExportProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the export pipeline as it processes each card.
///
/// Cards are exported strictly one after another, so calls never overlap
/// for one export. All methods default to no-ops.
pub trait ExportProgressCallback: Send + Sync {
    /// Called once before the first card is presented.
    fn on_export_start(&self, total: usize) {
        let _ = total;
    }

    /// Called before a card is presented on the surface.
    ///
    /// # Arguments
    /// * `index`: 1-based card position
    /// * `total`: number of cards in the job
    fn on_item_start(&self, index: usize, total: usize) {
        let _ = (index, total);
    }

    /// Called after a card has been captured.
    ///
    /// # Arguments
    /// * `index`  : 1-based card position
    /// * `total`  : number of cards in the job
    /// * `png_len`: size of the encoded PNG in bytes
    fn on_item_complete(&self, index: usize, total: usize, png_len: usize) {
        let _ = (index, total, png_len);
    }

    /// Called when a card is skipped because its capture failed.
    fn on_item_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once after every card has been attempted.
    fn on_export_complete(&self, total: usize, success_count: usize) {
        let _ = (total, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExportProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::CardConfig`].
pub type ProgressCallback = Arc<dyn ExportProgressCallback>;
