//! Configuration types for document-to-Markdown conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`] or loaded with
//! [`ConversionConfig::load`].
//!
//! # Sources and precedence
//!
//! 1. Built-in defaults
//! 2. The `unstructured:` section of a YAML file (`config.yaml`)
//! 3. Environment variables (`UNSTRUCTURED_API_URL`, `UNSTRUCTURED_API_KEY`,
//!    `UNSTRUCTURED_TIMEOUT`, `UNSTRUCTURED_MAX_RETRIES`,
//!    `UNSTRUCTURED_STRATEGY`)
//!
//! Later sources override earlier ones. The CLI applies its own flags on top
//! through the builder.

use crate::error::ConversionError;
use crate::progress::ProgressCallback;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Default parsing endpoint of a locally hosted Unstructured API.
pub const DEFAULT_API_URL: &str = "http://localhost:8000/general/v0/general";

/// Header the Unstructured API reads its key from.
pub const DEFAULT_API_KEY_HEADER: &str = "unstructured-api-key";

/// Config file looked up in the working directory when none is named.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "CONFIG_PATH";

pub const ENV_API_URL: &str = "UNSTRUCTURED_API_URL";
pub const ENV_API_KEY: &str = "UNSTRUCTURED_API_KEY";
pub const ENV_TIMEOUT: &str = "UNSTRUCTURED_TIMEOUT";
pub const ENV_MAX_RETRIES: &str = "UNSTRUCTURED_MAX_RETRIES";
pub const ENV_STRATEGY: &str = "UNSTRUCTURED_STRATEGY";

/// Configuration for a conversion.
///
/// # Example
/// ```rust
/// use edgequake_doc2md::{ConversionConfig, ParseStrategy};
///
/// let config = ConversionConfig::builder()
///     .api_url("https://api.unstructured.io/general/v0/general")
///     .api_key("secret")
///     .api_timeout_secs(30)
///     .max_retries(2)
///     .strategy(ParseStrategy::HiRes)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_retries, 2);
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Parsing endpoint. Default: [`DEFAULT_API_URL`].
    pub api_url: String,

    /// API credential sent with every request, if any.
    pub api_key: Option<String>,

    /// Header carrying `api_key`. Default: [`DEFAULT_API_KEY_HEADER`].
    pub api_key_header: String,

    /// Upper bound for one request attempt, including reading the body. Default: 60 s.
    pub api_timeout: Duration,

    /// Retries after the first attempt on transient failures. Default: 3.
    ///
    /// A conversion therefore makes at most `max_retries + 1` requests.
    pub max_retries: u32,

    /// Delay before the first retry; doubles for each further retry. Default: 1000 ms.
    pub retry_backoff_ms: u64,

    /// Ceiling for a single retry delay. Default: 30 000 ms.
    pub max_backoff_ms: u64,

    /// Parsing strategy sent to the service. Default: [`ParseStrategy::Fast`].
    pub strategy: ParseStrategy,

    /// Upgrade PDFs to [`ParseStrategy::HiRes`] so scanned pages get OCR. Default: false.
    pub ocr: bool,

    /// Number of documents converted at once by [`crate::convert_batch`]. Default: 4.
    pub concurrency: usize,

    /// Optional observer for batch progress.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            api_key_header: DEFAULT_API_KEY_HEADER.to_string(),
            api_timeout: Duration::from_secs(60),
            max_retries: 3,
            retry_backoff_ms: 1000,
            max_backoff_ms: 30_000,
            strategy: ParseStrategy::default(),
            ocr: false,
            concurrency: 4,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_key_header", &self.api_key_header)
            .field("api_timeout", &self.api_timeout)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("max_backoff_ms", &self.max_backoff_ms)
            .field("strategy", &self.strategy)
            .field("ocr", &self.ocr)
            .field("concurrency", &self.concurrency)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Load defaults, then a YAML file, then environment overrides.
    ///
    /// The file is `path` when given, else `$CONFIG_PATH`, else
    /// `config.yaml` in the working directory. A file that was named
    /// explicitly must exist; the implicit `config.yaml` is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConversionError> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));

        let mut config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Read a YAML config file on top of the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConversionError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConversionError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        let config = Self::from_yaml(&content).map_err(|e| match e {
            ConversionError::InvalidConfig(msg) => {
                ConversionError::InvalidConfig(format!("{}: {msg}", path.display()))
            }
            other => other,
        })?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse YAML text on top of the defaults.
    pub fn from_yaml(content: &str) -> Result<Self, ConversionError> {
        let file: FileConfig = serde_yaml::from_str(content)
            .map_err(|e| ConversionError::InvalidConfig(format!("invalid YAML: {e}")))?;

        let mut config = Self::default();
        if let Some(section) = file.unstructured {
            section.apply(&mut config);
        }
        Ok(config)
    }

    /// Override fields from environment-style lookups.
    ///
    /// Empty values are ignored so `UNSTRUCTURED_API_KEY=` does not blank a
    /// key from the file.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConversionError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(ENV_API_URL) {
            self.api_url = url;
        }
        if let Some(key) = get(ENV_API_KEY) {
            self.api_key = Some(key);
        }
        if let Some(raw) = get(ENV_TIMEOUT) {
            self.api_timeout = Duration::from_secs(parse_env(ENV_TIMEOUT, &raw)?);
        }
        if let Some(raw) = get(ENV_MAX_RETRIES) {
            self.max_retries = parse_env(ENV_MAX_RETRIES, &raw)?;
        }
        if let Some(raw) = get(ENV_STRATEGY) {
            self.strategy = parse_env(ENV_STRATEGY, &raw)?;
        }
        Ok(())
    }

    /// Check constraints the builder cannot enforce by clamping.
    pub fn validate(&self) -> Result<(), ConversionError> {
        let url = Url::parse(&self.api_url).map_err(|e| {
            ConversionError::InvalidConfig(format!("api_url '{}' is not a URL: {e}", self.api_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConversionError::InvalidConfig(format!(
                "api_url must be http or https, got '{}'",
                url.scheme()
            )));
        }
        if self.api_timeout.is_zero() {
            return Err(ConversionError::InvalidConfig(
                "API timeout must be greater than zero".into(),
            ));
        }
        if self.retry_backoff_ms == 0 || self.max_backoff_ms == 0 {
            return Err(ConversionError::InvalidConfig(
                "Retry backoff must be at least 1 ms".into(),
            ));
        }
        if self.concurrency == 0 {
            return Err(ConversionError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        HeaderName::from_bytes(self.api_key_header.as_bytes()).map_err(|_| {
            ConversionError::InvalidConfig(format!(
                "'{}' is not a valid header name",
                self.api_key_header
            ))
        })?;
        if let Some(ref key) = self.api_key {
            HeaderValue::from_str(key).map_err(|_| {
                ConversionError::InvalidConfig("api_key contains invalid header characters".into())
            })?;
        }
        Ok(())
    }

    /// Strategy to request for `file_name`, honouring the OCR switch.
    pub fn strategy_for(&self, file_name: &str) -> ParseStrategy {
        strategy_for_file(self.strategy, self.ocr, file_name)
    }
}

/// PDFs are upgraded to [`ParseStrategy::HiRes`] when OCR is wanted; office
/// formats always carry a text layer and keep `default`.
pub fn strategy_for_file(default: ParseStrategy, ocr: bool, file_name: &str) -> ParseStrategy {
    let is_pdf = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
    if ocr && is_pdf {
        ParseStrategy::HiRes
    } else {
        default
    }
}

fn parse_env<T>(key: &str, raw: &str) -> Result<T, ConversionError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim().parse().map_err(|e| {
        ConversionError::InvalidConfig(format!("{key}='{raw}' is not valid: {e}"))
    })
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    /// Start from an already loaded config instead of the defaults.
    pub fn from_config(config: ConversionConfig) -> Self {
        Self { config }
    }

    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_url = url.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn api_key_header(mut self, header: impl Into<String>) -> Self {
        self.config.api_key_header = header.into();
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout = Duration::from_secs(secs.max(1));
        self
    }

    /// Sub-second timeouts; mostly useful against local services.
    pub fn api_timeout(mut self, timeout: Duration) -> Self {
        self.config.api_timeout = timeout.max(Duration::from_millis(1));
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms.max(1);
        self
    }

    pub fn max_backoff_ms(mut self, ms: u64) -> Self {
        self.config.max_backoff_ms = ms.max(1);
        self
    }

    pub fn strategy(mut self, strategy: ParseStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    pub fn ocr(mut self, v: bool) -> Self {
        self.config.ocr = v;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, ConversionError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// ── YAML file layout ─────────────────────────────────────────────────────

/// Top level of `config.yaml`. Sections other than `unstructured`
/// (upload, server, logging) belong to the hosting service and are ignored.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    unstructured: Option<ServiceSection>,
}

#[derive(Debug, Default, Deserialize)]
struct ServiceSection {
    api_url: Option<String>,
    api_key: Option<String>,
    api_key_header: Option<String>,
    /// Seconds.
    timeout: Option<u64>,
    max_retries: Option<u32>,
    retry_backoff_ms: Option<u64>,
    max_backoff_ms: Option<u64>,
    default_strategy: Option<ParseStrategy>,
}

impl ServiceSection {
    fn apply(self, config: &mut ConversionConfig) {
        if let Some(url) = self.api_url {
            config.api_url = url;
        }
        if let Some(key) = self.api_key.filter(|k| !k.is_empty()) {
            config.api_key = Some(key);
        }
        if let Some(header) = self.api_key_header {
            config.api_key_header = header;
        }
        if let Some(secs) = self.timeout {
            config.api_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = self.max_retries {
            config.max_retries = n;
        }
        if let Some(ms) = self.retry_backoff_ms {
            config.retry_backoff_ms = ms;
        }
        if let Some(ms) = self.max_backoff_ms {
            config.max_backoff_ms = ms;
        }
        if let Some(strategy) = self.default_strategy {
            config.strategy = strategy;
        }
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Partitioning strategy requested from the parsing service.
///
/// | Strategy | Use case |
/// |----------|----------|
/// | `fast` | Documents with an embedded text layer (default) |
/// | `hi_res` | Layout-model parsing with OCR, for scans and complex PDFs |
/// | `ocr_only` | Force OCR even when a text layer exists |
/// | `auto` | Let the service choose |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStrategy {
    Auto,
    #[default]
    Fast,
    HiRes,
    OcrOnly,
}

impl ParseStrategy {
    /// Value of the `strategy` form field.
    pub fn as_str(self) -> &'static str {
        match self {
            ParseStrategy::Auto => "auto",
            ParseStrategy::Fast => "fast",
            ParseStrategy::HiRes => "hi_res",
            ParseStrategy::OcrOnly => "ocr_only",
        }
    }
}

impl fmt::Display for ParseStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParseStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(ParseStrategy::Auto),
            "fast" => Ok(ParseStrategy::Fast),
            "hi_res" | "hires" => Ok(ParseStrategy::HiRes),
            "ocr_only" => Ok(ParseStrategy::OcrOnly),
            other => Err(format!(
                "unknown strategy '{other}' (expected auto, fast, hi_res or ocr_only)"
            )),
        }
    }
}
