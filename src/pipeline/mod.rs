//! Pipeline stages for document-to-Markdown conversion.
//!
//! Each submodule implements exactly one transformation step.
//!
//! ## Data Flow
//!
//! ```text
//! file ──▶ client ──▶ decode ──▶ render ──▶ Markdown
//!        (multipart)   (JSON)   (fold)
//! ```
//!
//! 1. [`client`] uploads the document to the parsing service with
//!    timeout, retry and backoff; the only stage with network I/O
//! 2. [`decode`] turns the response body into a [`crate::Document`],
//!    degrading odd fields instead of failing
//! 3. [`render`] folds the elements into Markdown, using
//!    [`normalize`] to tidy element text first

pub mod client;
pub mod decode;
pub mod normalize;
pub mod render;
