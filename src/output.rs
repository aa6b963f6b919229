//! Conversion results.

use serde::Serialize;
use std::path::Path;

/// Longest file stem kept by [`markdown_file_name`].
const MAX_STEM_CHARS: usize = 100;

/// The result of converting one document.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionOutput {
    /// The rendered Markdown. Depends only on the service's response.
    pub markdown: String,
    /// Timing and size figures for diagnostics.
    pub stats: ConversionStats,
}

/// Figures gathered while converting one document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversionStats {
    /// Size of the uploaded document.
    pub input_bytes: usize,
    /// Elements the service returned.
    pub element_count: usize,
    /// Elements whose type had no dedicated rendering rule.
    pub unknown_elements: usize,
    /// Time spent on the remote call, retries included.
    pub remote_duration_ms: u64,
    /// Time spent rendering Markdown.
    pub render_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Download name for the Markdown made from `original`: `<stem>_converted.md`.
///
/// Characters other than alphanumerics, `-`, `_` and space become `_`. An
/// empty or overly long stem falls back to `converted`.
pub fn markdown_file_name(original: &Path) -> String {
    let stem = original
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();

    let safe: String = stem
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let safe = safe.trim();

    let base = if safe.is_empty() || safe.chars().count() > MAX_STEM_CHARS {
        "converted"
    } else {
        safe
    };
    format!("{base}_converted.md")
}
