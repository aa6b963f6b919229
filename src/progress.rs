//! Progress-callback trait for batch conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as [`crate::convert_batch`] works through its inputs.
//!
//! # Example
//!
//! ```rust
//! use edgequake_doc2md::{ConversionProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_file_complete(&self, index: usize, total: usize, markdown_len: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Document {}/{} done ({} bytes)", index + 1, total, markdown_len);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by [`crate::convert_batch`] as it converts each document.
///
/// Documents are converted concurrently, so `on_file_*` methods may be
/// called from several tasks at once and in any order. Implementations must
/// protect shared mutable state (e.g. `Mutex`, `AtomicUsize`). All methods
/// default to no-ops.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once before any document is sent.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called just before a document is sent to the parsing service.
    ///
    /// # Arguments
    /// * `index`: 0-based position of the document in the batch
    /// * `total`: batch size
    /// * `path`: the document being converted
    fn on_file_start(&self, index: usize, total: usize, path: &Path) {
        let _ = (index, total, path);
    }

    /// Called when a document converted successfully.
    ///
    /// `markdown_len` is the byte length of the produced Markdown.
    fn on_file_complete(&self, index: usize, total: usize, markdown_len: usize) {
        let _ = (index, total, markdown_len);
    }

    /// Called when a document failed; `error` is its display text.
    fn on_file_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once after every document has been attempted.
    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let _ = (total, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
