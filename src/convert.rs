//! Conversion entry points.
//!
//! Every entry point runs the same two stages: the remote client turns a
//! document into an element list, then the renderer turns the list into
//! Markdown. Client errors pass through unchanged; no fallback Markdown is
//! ever produced for a failed upload.

use crate::config::ConversionConfig;
use crate::element::Document;
use crate::error::ConversionError;
use crate::output::{ConversionOutput, ConversionStats};
use crate::pipeline::client::RemoteParseClient;
use crate::pipeline::{decode, render};
use std::io::Write;
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Convert a document on disk to Markdown.
///
/// The caller guarantees the file exists and has passed upload validation;
/// this function only reads it.
///
/// # Errors
/// - [`ConversionError::RequestRejected`]: the service refused the upload
/// - [`ConversionError::ServiceUnavailable`]: retries exhausted
/// - [`ConversionError::MalformedResponse`]: undecodable success body
/// - [`ConversionError::FileRead`]: the file vanished or is unreadable
pub async fn convert(
    input: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConversionError> {
    let total_start = Instant::now();
    let path = input.as_ref();
    info!("Starting conversion: {}", path.display());

    // ── Step 1: Remote parse ─────────────────────────────────────────────
    let client = RemoteParseClient::from_config(config)?;
    let remote_start = Instant::now();
    let document = client.parse(path).await?;
    let remote_duration_ms = remote_start.elapsed().as_millis() as u64;
    let input_bytes = tokio::fs::metadata(path)
        .await
        .map(|m| m.len() as usize)
        .unwrap_or(0);

    // ── Step 2: Render ───────────────────────────────────────────────────
    Ok(finish(
        &path.display().to_string(),
        &document,
        input_bytes,
        remote_duration_ms,
        total_start,
    ))
}

/// Convert an in-memory upload to Markdown.
///
/// `file_name` is only used for the content type, the OCR decision and as
/// the name reported to the service.
pub async fn convert_bytes(
    file_name: &str,
    bytes: &[u8],
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConversionError> {
    let total_start = Instant::now();
    info!("Starting conversion: {}", file_name);

    // ── Step 1: Remote parse ─────────────────────────────────────────────
    let client = RemoteParseClient::from_config(config)?;
    let remote_start = Instant::now();
    let document = client.parse_bytes(file_name, bytes).await?;
    let remote_duration_ms = remote_start.elapsed().as_millis() as u64;

    // ── Step 2: Render ───────────────────────────────────────────────────
    Ok(finish(
        file_name,
        &document,
        bytes.len(),
        remote_duration_ms,
        total_start,
    ))
}

/// Render a saved service response without calling the service.
///
/// # Errors
/// [`ConversionError::MalformedResponse`] when `json` is not an element list.
pub fn convert_json(json: &[u8]) -> Result<ConversionOutput, ConversionError> {
    let start = Instant::now();
    let document = decode::decode_elements(json)?;
    let mut output = render_with_stats(&document);
    output.stats.input_bytes = json.len();
    output.stats.total_duration_ms = start.elapsed().as_millis() as u64;
    Ok(output)
}

/// Convert a document and write the Markdown to `output_path`.
///
/// Uses an atomic write (temp file in the target directory, then rename) so
/// readers never observe a partial file.
pub async fn convert_to_file(
    input: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionStats, ConversionError> {
    let output = convert(input, config).await?;
    write_markdown(output_path.as_ref(), &output.markdown).await?;
    Ok(output.stats)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConversionError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ConversionError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input, config))
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn finish(
    label: &str,
    document: &Document,
    input_bytes: usize,
    remote_duration_ms: u64,
    total_start: Instant,
) -> ConversionOutput {
    let mut output = render_with_stats(document);
    output.stats.input_bytes = input_bytes;
    output.stats.remote_duration_ms = remote_duration_ms;
    output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    info!(
        "Conversion complete: {} → {} elements, {} bytes of Markdown, {}ms total",
        label,
        output.stats.element_count,
        output.markdown.len(),
        output.stats.total_duration_ms
    );
    output
}

fn render_with_stats(document: &Document) -> ConversionOutput {
    let render_start = Instant::now();
    let markdown = render::render_document(document);
    ConversionOutput {
        markdown,
        stats: ConversionStats {
            element_count: document.len(),
            unknown_elements: document.unknown_count(),
            render_duration_ms: render_start.elapsed().as_millis() as u64,
            ..Default::default()
        },
    }
}

/// Write Markdown to `path` atomically: temp file beside it, then persist
/// over it. Missing parent directories are created.
pub async fn write_markdown(path: &Path, markdown: &str) -> Result<(), ConversionError> {
    let path_buf = path.to_path_buf();
    let markdown = markdown.to_string();
    let write_err = |source: std::io::Error| ConversionError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let parent = match path_buf.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => std::path::PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
        tmp.write_all(markdown.as_bytes())?;
        tmp.persist(&path_buf).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| ConversionError::Internal(format!("Write task panicked: {}", e)))?
    .map_err(write_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convert_json_renders_saved_response() {
        let json = br#"[
            {"type": "Title", "text": "Report"},
            {"type": "NarrativeText", "text": "Intro text."}
        ]"#;
        let out = convert_json(json).unwrap();
        assert_eq!(out.markdown, "# Report\n\nIntro text.\n");
        assert_eq!(out.stats.element_count, 2);
        assert_eq!(out.stats.input_bytes, json.len());
    }

    #[test]
    fn convert_json_counts_unknown_elements() {
        let out = convert_json(br#"[{"type": "Formula", "text": "x^2"}]"#).unwrap();
        assert_eq!(out.markdown, "x^2\n");
        assert_eq!(out.stats.unknown_elements, 1);
    }

    #[test]
    fn convert_json_rejects_non_list() {
        let err = convert_json(br#"{"elements": []}"#).unwrap_err();
        assert!(matches!(err, ConversionError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn write_markdown_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested/out/doc_converted.md");
        write_markdown(&target, "# Hi\n").await.unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "# Hi\n");

        write_markdown(&target, "# Replaced\n").await.unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "# Replaced\n");
    }

    #[tokio::test]
    async fn convert_missing_file_is_file_read_error() {
        let err = convert("/no/such/file.pdf", &ConversionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ConversionError::FileRead { .. }));
    }
}
