//! # edgequake-doc2md
//!
//! Convert office documents (`.docx`, `.pptx`, `.xlsx`, …) and PDFs to
//! Markdown through an Unstructured-style document parsing service.
//!
//! The service does the hard part: it splits a document into typed
//! elements (titles, headers, paragraphs, list items, tables, images). This
//! crate uploads the document, survives the service's bad moments with a
//! bounded retry policy, and renders the element list as clean Markdown.
//!
//! ## Pipeline Overview
//!
//! ```text
//! document
//!  │
//!  ├─ 1. Upload  multipart POST to the parsing service (timeout + retries)
//!  ├─ 2. Decode  JSON element list → Document, tolerating odd fields
//!  ├─ 3. Render  fold elements into Markdown blocks
//!  └─ 4. Output  Markdown + timing stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_doc2md::{convert, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // config.yaml (if present) plus UNSTRUCTURED_* environment variables
//!     let config = ConversionConfig::load(None)?;
//!     let output = convert("report.docx", &config).await?;
//!     println!("{}", output.markdown);
//!     eprintln!("{} elements in {}ms",
//!         output.stats.element_count,
//!         output.stats.total_duration_ms);
//!     Ok(())
//! }
//! ```
//!
//! Rendering alone needs no service:
//!
//! ```rust
//! use edgequake_doc2md::{render, DocumentElement, ElementKind};
//!
//! let elements = vec![
//!     DocumentElement::new(ElementKind::Title, "Report"),
//!     DocumentElement::new(ElementKind::NarrativeText, "Intro text."),
//! ];
//! assert_eq!(render(&elements), "# Report\n\nIntro text.\n");
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `doc2md` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-doc2md = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod convert;
pub mod element;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{convert_batch, BatchItem};
pub use config::{ConversionConfig, ConversionConfigBuilder, ParseStrategy};
pub use convert::{
    convert, convert_bytes, convert_json, convert_sync, convert_to_file, write_markdown,
};
pub use element::{Document, DocumentElement, ElementKind};
pub use error::ConversionError;
pub use output::{markdown_file_name, ConversionOutput, ConversionStats};
pub use pipeline::client::{RemoteParseClient, RetryPolicy};
pub use pipeline::render::{render, render_document};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
