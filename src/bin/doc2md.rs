//! CLI binary for edgequake-doc2md.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_doc2md::{
    convert_batch, convert_json, markdown_file_name, write_markdown, BatchItem, ConversionConfig,
    ConversionConfigBuilder, ConversionError, ConversionOutput, ConversionProgressCallback,
    ParseStrategy, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar for the batch plus a log line per
/// document. Documents finish out of order, so per-file state is keyed by
/// batch index.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Start time and display name per in-flight document.
    in_flight: Mutex<HashMap<usize, (Instant, String)>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(SPINNER);

        bar.set_style(style);
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    fn take(&self, index: usize) -> (f64, String) {
        let entry = self
            .in_flight
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index));
        match entry {
            Some((start, name)) => (start.elapsed().as_secs_f64(), name),
            None => (0.0, format!("#{}", index + 1)),
        }
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {total} document(s)…"))
        ));
    }

    fn on_file_start(&self, index: usize, _total: usize, path: &Path) {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.bar.set_message(name.clone());
        if let Ok(mut m) = self.in_flight.lock() {
            m.insert(index, (Instant::now(), name));
        }
    }

    fn on_file_complete(&self, index: usize, _total: usize, markdown_len: usize) {
        let (secs, name) = self.take(index);
        self.bar.println(format!(
            "  {} {:<40}  {:<12}  {}",
            green("✓"),
            name,
            dim(&format!("{markdown_len:>7} bytes")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, index: usize, _total: usize, error: &str) {
        let (secs, name) = self.take(index);

        let msg: String = if error.chars().count() > 80 {
            let head: String = error.chars().take(79).collect();
            format!("{head}\u{2026}")
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:<40}  {}  {}",
            red("✗"),
            name,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let failed = total.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} document(s) converted successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} document(s) converted  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert one document (stdout)
  doc2md report.docx

  # Convert to a file
  doc2md report.docx -o report.md

  # Convert several documents into a directory
  doc2md slides.pptx budget.xlsx scan.pdf -o out/

  # Scanned PDF: request OCR
  doc2md --ocr scan.pdf -o scan.md

  # Render a saved service response without calling the service
  doc2md --from-json elements.json

  # JSON output with stats
  doc2md --json report.docx > report.json

CONFIGURATION (lowest to highest precedence):
  1. Built-in defaults (service at http://localhost:8000/general/v0/general)
  2. config.yaml, or the file named by --config / CONFIG_PATH:
       unstructured:
         api_url: "https://api.unstructured.io/general/v0/general"
         api_key: "..."
         timeout: 60
         max_retries: 3
         default_strategy: "fast"
  3. Environment variables
  4. Command-line flags

ENVIRONMENT VARIABLES:
  UNSTRUCTURED_API_URL      Parsing service endpoint
  UNSTRUCTURED_API_KEY      API key sent in the unstructured-api-key header
  UNSTRUCTURED_TIMEOUT      Per-attempt timeout in seconds
  UNSTRUCTURED_MAX_RETRIES  Retries after the first attempt
  UNSTRUCTURED_STRATEGY     auto, fast, hi_res or ocr_only
  CONFIG_PATH               Config file to load
  RUST_LOG                  Log filter (overrides -v / -q)
"#;

/// Convert office documents and PDFs to Markdown through a document parsing service.
#[derive(Parser, Debug)]
#[command(
    name = "doc2md",
    version,
    about = "Convert office documents and PDFs to Markdown through a document parsing service",
    long_about = "Convert Word, PowerPoint, Excel and PDF documents to clean Markdown. \
Documents are split into typed elements by an Unstructured-compatible parsing service, \
then rendered locally.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Documents to convert (or saved JSON responses with --from-json).
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output file for a single input, or output directory for several.
    #[arg(short, long, env = "DOC2MD_OUTPUT")]
    output: Option<PathBuf>,

    /// YAML config file (default: $CONFIG_PATH, then ./config.yaml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Parsing service endpoint.
    #[arg(long)]
    api_url: Option<String>,

    /// Parsing service API key.
    #[arg(long)]
    api_key: Option<String>,

    /// Per-attempt timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,

    /// Retries after the first attempt on transient failures.
    #[arg(long)]
    max_retries: Option<u32>,

    /// Partitioning strategy requested from the service.
    #[arg(long, value_enum)]
    strategy: Option<StrategyArg>,

    /// Request OCR for PDFs (uses the hi_res strategy).
    #[arg(long)]
    ocr: bool,

    /// Number of documents converted concurrently.
    #[arg(short, long, env = "DOC2MD_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Treat inputs as saved service responses and render them offline.
    #[arg(long)]
    from_json: bool,

    /// Output structured JSON (ConversionOutput) instead of Markdown.
    #[arg(long, env = "DOC2MD_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOC2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOC2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOC2MD_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum StrategyArg {
    Auto,
    Fast,
    HiRes,
    OcrOnly,
}

impl From<StrategyArg> for ParseStrategy {
    fn from(v: StrategyArg) -> Self {
        match v {
            StrategyArg::Auto => ParseStrategy::Auto,
            StrategyArg::Fast => ParseStrategy::Fast,
            StrategyArg::HiRes => ParseStrategy::HiRes,
            StrategyArg::OcrOnly => ParseStrategy::OcrOnly,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.from_json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let destination = Destination::resolve(&cli)?;

    // ── Offline rendering ────────────────────────────────────────────────
    if cli.from_json {
        let mut items = Vec::with_capacity(cli.inputs.len());
        for (index, path) in cli.inputs.iter().enumerate() {
            let result = match tokio::fs::read(path).await {
                Ok(bytes) => convert_json(&bytes),
                Err(source) => Err(ConversionError::FileRead {
                    path: path.clone(),
                    source,
                }),
            };
            items.push(BatchItem {
                index,
                path: path.clone(),
                result,
            });
        }
        return emit(&cli, &destination, items, false).await;
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;
    tracing::debug!("Using {:?}", config);

    // ── Run conversion ───────────────────────────────────────────────────
    let items = convert_batch(&cli.inputs, &config).await;
    emit(&cli, &destination, items, show_progress).await
}

/// Where converted Markdown goes.
enum Destination {
    Stdout,
    File(PathBuf),
    Directory(PathBuf),
}

impl Destination {
    fn resolve(cli: &Cli) -> Result<Self> {
        let Some(ref output) = cli.output else {
            return Ok(Self::Stdout);
        };
        let looks_like_dir = output.is_dir()
            || output
                .to_str()
                .is_some_and(|s| s.ends_with('/') || s.ends_with(std::path::MAIN_SEPARATOR));

        if cli.inputs.len() > 1 || looks_like_dir {
            if output.is_file() {
                anyhow::bail!(
                    "{} is a file; several inputs need an output directory",
                    output.display()
                );
            }
            Ok(Self::Directory(output.clone()))
        } else {
            Ok(Self::File(output.clone()))
        }
    }
}

/// Write or print every result, then fail if any document failed.
///
/// `progress_shown` means the progress bar already reported failures.
async fn emit(
    cli: &Cli,
    destination: &Destination,
    items: Vec<BatchItem>,
    progress_shown: bool,
) -> Result<()> {
    let total = items.len();
    let mut failed = 0usize;
    let mut json_items = Vec::new();

    for item in items {
        let BatchItem { path, result, .. } = item;
        match result {
            Ok(output) => {
                if cli.json {
                    json_items.push(serde_json::json!({
                        "path": path.display().to_string(),
                        "output": &output,
                    }));
                    continue;
                }
                write_output(cli, destination, &path, &output).await?;
            }
            Err(e) => {
                failed += 1;
                if cli.json {
                    json_items.push(serde_json::json!({
                        "path": path.display().to_string(),
                        "error": e.to_string(),
                        "status": e.http_status(),
                    }));
                } else if !progress_shown {
                    eprintln!("{} {}: {}", red("✗"), path.display(), e);
                }
            }
        }
    }

    if cli.json {
        let value = if json_items.len() == 1 && total == 1 {
            json_items.remove(0)
        } else {
            serde_json::Value::Array(json_items)
        };
        let json = serde_json::to_string_pretty(&value).context("Failed to serialise output")?;
        match destination {
            Destination::File(path) => write_markdown(path, &format!("{json}\n"))
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?,
            _ => println!("{json}"),
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {total} document(s) failed to convert");
    }
    Ok(())
}

async fn write_output(
    cli: &Cli,
    destination: &Destination,
    input: &Path,
    output: &ConversionOutput,
) -> Result<()> {
    let target = match destination {
        Destination::Stdout => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(output.markdown.as_bytes())
                .context("Failed to write to stdout")?;
            return Ok(());
        }
        Destination::File(path) => path.clone(),
        Destination::Directory(dir) => dir.join(markdown_file_name(input)),
    };

    write_markdown(&target, &output.markdown)
        .await
        .with_context(|| format!("Failed to write {}", target.display()))?;

    if !cli.quiet {
        eprintln!(
            "{}  {}  {} elements  {}ms  →  {}",
            green("✔"),
            input.display(),
            output.stats.element_count,
            output.stats.total_duration_ms,
            bold(&target.display().to_string()),
        );
    }
    Ok(())
}

/// Map CLI args onto the loaded configuration.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let base = ConversionConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let mut builder = ConversionConfigBuilder::from_config(base);

    if let Some(ref url) = cli.api_url {
        builder = builder.api_url(url);
    }
    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key);
    }
    if let Some(secs) = cli.timeout {
        builder = builder.api_timeout_secs(secs);
    }
    if let Some(n) = cli.max_retries {
        builder = builder.max_retries(n);
    }
    if let Some(strategy) = cli.strategy {
        builder = builder.strategy(strategy.into());
    }
    if cli.ocr {
        builder = builder.ocr(true);
    }
    if let Some(n) = cli.concurrency {
        builder = builder.concurrency(n);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
