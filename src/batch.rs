//! Concurrent conversion of several documents.
//!
//! Each input is an independent unit of work with its own client; one
//! document failing never affects another. Up to `config.concurrency`
//! uploads are in flight at once. Results come back in input order
//! regardless of completion order.

use crate::config::ConversionConfig;
use crate::convert::convert;
use crate::error::ConversionError;
use crate::output::ConversionOutput;
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use tracing::{info, warn};

/// The outcome for one input of [`convert_batch`].
#[derive(Debug)]
pub struct BatchItem {
    /// Position of the input in the slice passed to [`convert_batch`].
    pub index: usize,
    pub path: PathBuf,
    pub result: Result<ConversionOutput, ConversionError>,
}

impl BatchItem {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Convert every input, returning one [`BatchItem`] per input in input order.
///
/// Progress events are sent to `config.progress_callback` as documents start
/// and finish; `on_file_*` events arrive in completion order.
pub async fn convert_batch(inputs: &[PathBuf], config: &ConversionConfig) -> Vec<BatchItem> {
    let total = inputs.len();
    info!(
        "Starting batch of {} document(s), concurrency {}",
        total, config.concurrency
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let mut items: Vec<BatchItem> = stream::iter(inputs.iter().cloned().enumerate().map(
        |(index, path)| async move {
            if let Some(ref cb) = config.progress_callback {
                cb.on_file_start(index, total, &path);
            }

            let result = convert(&path, config).await;

            match &result {
                Ok(output) => {
                    if let Some(ref cb) = config.progress_callback {
                        cb.on_file_complete(index, total, output.markdown.len());
                    }
                }
                Err(e) => {
                    warn!("{}: {}", path.display(), e);
                    if let Some(ref cb) = config.progress_callback {
                        cb.on_file_error(index, total, &e.to_string());
                    }
                }
            }

            BatchItem {
                index,
                path,
                result,
            }
        },
    ))
    .buffer_unordered(config.concurrency.max(1))
    .collect()
    .await;

    items.sort_by_key(|item| item.index);

    let success_count = items.iter().filter(|item| item.is_ok()).count();
    info!(
        "Batch complete: {}/{} document(s) converted",
        success_count, total
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total, success_count);
    }
    items
}
