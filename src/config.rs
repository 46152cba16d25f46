//! Configuration types for parcel-sync

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

use crate::error::{Error, Result};

/// Carrier site configuration (lookup endpoint, extraction, browser shape)
///
/// Groups everything the browser driver needs to know about the carrier's web
/// interface. Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CarrierConfig {
    /// Lookup URL template; `{tracking}` is replaced with the percent-encoded
    /// tracking number (default: the Interrapidísimo tracking page)
    #[serde(default = "default_lookup_url")]
    pub lookup_url: String,

    /// CSS selectors holding the status text, tried in order; the first one
    /// that yields non-blank text wins
    #[serde(default = "default_status_selectors")]
    pub status_selectors: Vec<String>,

    /// How long to keep polling the selectors after navigation before
    /// concluding the page carries no status (default: 5s)
    #[serde(default = "default_selector_wait", with = "duration_serde")]
    pub selector_wait: Duration,

    /// Resource classes blocked before navigation to cut bandwidth and memory
    #[serde(default = "default_blocked_resources")]
    pub blocked_resources: Vec<ResourceClass>,

    /// Extra Chrome launch arguments
    #[serde(default = "default_browser_args")]
    pub browser_args: Vec<String>,

    /// Tracking numbers must match this pattern to be fetched; rows failing it
    /// short-circuit to an empty outcome (None = only the blank check applies)
    #[serde(default)]
    pub tracking_pattern: Option<String>,
}

impl Default for CarrierConfig {
    fn default() -> Self {
        Self {
            lookup_url: default_lookup_url(),
            status_selectors: default_status_selectors(),
            selector_wait: default_selector_wait(),
            blocked_resources: default_blocked_resources(),
            browser_args: default_browser_args(),
            tracking_pattern: None,
        }
    }
}

/// Page resource classes that can be blocked during a lookup
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceClass {
    /// Raster and vector images
    Image,
    /// Audio and video
    Media,
    /// Web fonts
    Font,
    /// CSS
    Stylesheet,
}

/// Scrape run-shape configuration (row range, pacing, batching)
///
/// These are the defaults a [`ScrapeOptions`] overlay can override per
/// invocation. Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScrapeConfig {
    /// First row to process, 1-based (default: 2; row 1 is the header)
    #[serde(default = "default_start_row")]
    pub start_row: u32,

    /// Last row to process, inclusive (None = to the last row with a
    /// non-blank tracking number)
    #[serde(default)]
    pub end_row: Option<u32>,

    /// Only process rows whose recorded status is blank
    #[serde(default)]
    pub only_empty: bool,

    /// Maximum lookups in flight at once (default: 2)
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Global request ceiling across all workers, in requests per second;
    /// 0 disables the ceiling (default: 0.8)
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,

    /// Extra attempts per row after an empty or transiently failed lookup
    /// (default: 1)
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Deadline for a single lookup, navigation and extraction included
    /// (default: 25s)
    #[serde(default = "default_fetch_timeout", with = "duration_serde")]
    pub fetch_timeout: Duration,

    /// Rows per browser session; the session is torn down and relaunched at
    /// batch boundaries (default: 1500)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause between batches so the OS can reclaim browser memory; zero
    /// disables the pause (default: 15s)
    #[serde(default = "default_sleep_between_batches", with = "duration_serde")]
    pub sleep_between_batches: Duration,

    /// Re-fetch rows that came back empty once more within the same batch
    /// before persisting it (default: true)
    #[serde(default = "default_true")]
    pub second_pass: bool,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            start_row: default_start_row(),
            end_row: None,
            only_empty: false,
            max_concurrency: default_max_concurrency(),
            requests_per_second: default_requests_per_second(),
            retries: default_retries(),
            fetch_timeout: default_fetch_timeout(),
            batch_size: default_batch_size(),
            sleep_between_batches: default_sleep_between_batches(),
            second_pass: true,
        }
    }
}

/// Reconciliation defaults (row range, filtering, report naming)
///
/// Used as a nested sub-config within [`Config`]; [`CompareOptions`] and
/// [`ReportOptions`] overlay these per invocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// First row to compare, 1-based (default: 2)
    #[serde(default = "default_start_row")]
    pub start_row: u32,

    /// Last row to compare, inclusive (None = to the last row with a
    /// non-blank tracking number)
    #[serde(default)]
    pub end_row: Option<u32>,

    /// Emit only rows whose statuses disagree (default: true)
    #[serde(default = "default_true")]
    pub only_mismatches: bool,

    /// Report artifact name prefix; the prefix carries its own separator
    /// (default: "Informe_")
    #[serde(default = "default_report_prefix")]
    pub report_prefix: String,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            start_row: default_start_row(),
            end_row: None,
            only_mismatches: true,
            report_prefix: default_report_prefix(),
        }
    }
}

/// Status vocabulary extension files
///
/// Both files are JSON objects keyed by canonical status with keyword arrays
/// as values, e.g. `{"DEVUELTO": ["siniestro"]}`. Used as a nested sub-config
/// within [`Config`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusMapConfig {
    /// Extra override phrases, checked before every keyword table
    #[serde(default)]
    pub overrides_path: Option<PathBuf>,

    /// Extra keywords, checked before the built-in keyword table
    #[serde(default)]
    pub keywords_path: Option<PathBuf>,
}

/// Process-level directories (locks, report artifacts)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Directory holding the per-operation single-instance lock files
    /// (default: "locks")
    #[serde(default = "default_lock_dir")]
    pub lock_dir: PathBuf,

    /// Directory the shipped JSON report sink writes into (default: "reports")
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            lock_dir: default_lock_dir(),
            report_dir: default_report_dir(),
        }
    }
}

/// Main configuration for parcel-sync
///
/// Fields are organized into logical sub-configs:
/// - [`carrier`](CarrierConfig) — lookup endpoint, extraction, browser shape
/// - [`scrape`](ScrapeConfig) — row range, pacing, batching defaults
/// - [`reconcile`](ReconcileConfig) — comparison and report defaults
/// - [`status_map`](StatusMapConfig) — vocabulary extension files
/// - [`runtime`](RuntimeConfig) — lock and report directories
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Carrier site configuration
    #[serde(default)]
    pub carrier: CarrierConfig,

    /// Scrape run-shape defaults
    #[serde(default)]
    pub scrape: ScrapeConfig,

    /// Reconciliation defaults
    #[serde(default)]
    pub reconcile: ReconcileConfig,

    /// Status vocabulary extension files
    #[serde(default)]
    pub status_map: StatusMapConfig,

    /// Process-level directories
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read config file {}: {e}", path.display()),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&text).map_err(|e| Error::Config {
            message: format!("invalid config file {}: {e}", path.display()),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field for values the engine cannot run with.
    ///
    /// Returns the first offense as [`Error::Config`] naming the key.
    pub fn validate(&self) -> Result<()> {
        validate_lookup_url(&self.carrier.lookup_url)?;
        if self.carrier.status_selectors.is_empty()
            || self.carrier.status_selectors.iter().any(|s| s.trim().is_empty())
        {
            return Err(Error::config(
                "at least one non-blank status selector is required",
                "carrier.status_selectors",
            ));
        }
        if let Some(pattern) = &self.carrier.tracking_pattern {
            compile_tracking_pattern(pattern)?;
        }
        validate_scrape_shape(
            self.scrape.start_row,
            self.scrape.end_row,
            self.scrape.max_concurrency,
            self.scrape.requests_per_second,
            self.scrape.fetch_timeout,
            self.scrape.batch_size,
        )?;
        validate_row_range(self.reconcile.start_row, self.reconcile.end_row, "reconcile")?;
        Ok(())
    }

    /// Resolve a scrape invocation: overlay `options` on the configured
    /// defaults, re-check the merged values, and compile the tracking pattern.
    pub fn scrape_run(&self, options: &ScrapeOptions) -> Result<RunConfig> {
        let run = RunConfig {
            start_row: options.start_row.unwrap_or(self.scrape.start_row),
            end_row: options.end_row.or(self.scrape.end_row),
            only_empty: options.only_empty.unwrap_or(self.scrape.only_empty),
            max_concurrency: options
                .max_concurrency
                .unwrap_or(self.scrape.max_concurrency),
            requests_per_second: options
                .requests_per_second
                .unwrap_or(self.scrape.requests_per_second),
            retries: options.retries.unwrap_or(self.scrape.retries),
            fetch_timeout: options
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(self.scrape.fetch_timeout),
            batch_size: options.batch_size.unwrap_or(self.scrape.batch_size),
            sleep_between_batches: options
                .sleep_between_batches
                .map(Duration::from_secs_f64)
                .unwrap_or(self.scrape.sleep_between_batches),
            second_pass: self.scrape.second_pass,
            tracking_pattern: self
                .carrier
                .tracking_pattern
                .as_deref()
                .map(compile_tracking_pattern)
                .transpose()?,
        };
        validate_scrape_shape(
            run.start_row,
            run.end_row,
            run.max_concurrency,
            run.requests_per_second,
            run.fetch_timeout,
            run.batch_size,
        )?;
        Ok(run)
    }

    /// Resolve a compare invocation against the reconcile defaults.
    pub fn compare_run(&self, options: &CompareOptions) -> Result<CompareRun> {
        let run = CompareRun {
            start_row: options.start_row.unwrap_or(self.reconcile.start_row),
            end_row: options.end_row.or(self.reconcile.end_row),
            only_mismatches: options
                .only_mismatches
                .unwrap_or(self.reconcile.only_mismatches),
            prefix: self.reconcile.report_prefix.clone(),
        };
        validate_row_range(run.start_row, run.end_row, "reconcile")?;
        Ok(run)
    }

    /// Resolve a report invocation; like [`Config::compare_run`] but the
    /// artifact prefix can be overridden.
    pub fn report_run(&self, options: &ReportOptions) -> Result<CompareRun> {
        let run = CompareRun {
            start_row: options.start_row.unwrap_or(self.reconcile.start_row),
            end_row: options.end_row.or(self.reconcile.end_row),
            only_mismatches: options
                .only_mismatches
                .unwrap_or(self.reconcile.only_mismatches),
            prefix: options
                .prefix
                .clone()
                .unwrap_or_else(|| self.reconcile.report_prefix.clone()),
        };
        validate_row_range(run.start_row, run.end_row, "reconcile")?;
        Ok(run)
    }
}

/// Per-invocation overrides for the `scrape` operation
///
/// Every field is optional; unset fields fall back to [`ScrapeConfig`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrapeOptions {
    /// Override for [`ScrapeConfig::start_row`]
    #[serde(default)]
    pub start_row: Option<u32>,
    /// Override for [`ScrapeConfig::end_row`]
    #[serde(default)]
    pub end_row: Option<u32>,
    /// Override for [`ScrapeConfig::only_empty`]
    #[serde(default)]
    pub only_empty: Option<bool>,
    /// Override for [`ScrapeConfig::max_concurrency`]
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    /// Override for [`ScrapeConfig::requests_per_second`]
    #[serde(default)]
    pub requests_per_second: Option<f64>,
    /// Override for [`ScrapeConfig::retries`]
    #[serde(default)]
    pub retries: Option<u32>,
    /// Override for [`ScrapeConfig::fetch_timeout`], in milliseconds
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Override for [`ScrapeConfig::batch_size`]
    #[serde(default)]
    pub batch_size: Option<usize>,
    /// Override for [`ScrapeConfig::sleep_between_batches`], in seconds
    #[serde(default)]
    pub sleep_between_batches: Option<f64>,
}

/// Per-invocation overrides for the `compare` operation
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CompareOptions {
    /// Override for [`ReconcileConfig::start_row`]
    #[serde(default)]
    pub start_row: Option<u32>,
    /// Override for [`ReconcileConfig::end_row`]
    #[serde(default)]
    pub end_row: Option<u32>,
    /// Override for [`ReconcileConfig::only_mismatches`]
    #[serde(default)]
    pub only_mismatches: Option<bool>,
}

/// Per-invocation overrides for the `report` operation
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportOptions {
    /// Override for [`ReconcileConfig::start_row`]
    #[serde(default)]
    pub start_row: Option<u32>,
    /// Override for [`ReconcileConfig::end_row`]
    #[serde(default)]
    pub end_row: Option<u32>,
    /// Override for [`ReconcileConfig::only_mismatches`]
    #[serde(default)]
    pub only_mismatches: Option<bool>,
    /// Override for [`ReconcileConfig::report_prefix`]
    #[serde(default)]
    pub prefix: Option<String>,
}

/// Per-invocation overrides for the `all` operation (scrape, then report)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AllOptions {
    /// Overrides for the scrape leg
    #[serde(default)]
    pub scrape: ScrapeOptions,
    /// Overrides for the report leg
    #[serde(default)]
    pub report: ReportOptions,
}

/// Immutable snapshot of one scrape run's shape
///
/// Produced by [`Config::scrape_run`]; never mutated while the run is live.
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// First row to process, 1-based
    pub start_row: u32,
    /// Last row to process, inclusive; None = to the last row with a
    /// non-blank tracking number
    pub end_row: Option<u32>,
    /// Only process rows whose recorded status is blank
    pub only_empty: bool,
    /// Maximum lookups in flight at once
    pub max_concurrency: usize,
    /// Global request ceiling, in requests per second; 0 disables it
    pub requests_per_second: f64,
    /// Extra attempts per row after an empty or transient failure
    pub retries: u32,
    /// Deadline for a single lookup
    pub fetch_timeout: Duration,
    /// Rows per browser session
    pub batch_size: usize,
    /// Pause between batches; zero disables the pause
    pub sleep_between_batches: Duration,
    /// Re-fetch empty rows once more within each batch
    pub second_pass: bool,
    /// Compiled tracking number shape, when configured
    pub tracking_pattern: Option<regex::Regex>,
}

/// Immutable snapshot of one compare/report run's shape
#[derive(Clone, Debug, PartialEq)]
pub struct CompareRun {
    /// First row to compare, 1-based
    pub start_row: u32,
    /// Last row to compare, inclusive; None = to the last row with a
    /// non-blank tracking number
    pub end_row: Option<u32>,
    /// Emit only rows whose statuses disagree
    pub only_mismatches: bool,
    /// Report artifact name prefix (ignored by `compare`)
    pub prefix: String,
}

fn validate_lookup_url(template: &str) -> Result<()> {
    if !template.contains("{tracking}") {
        return Err(Error::config(
            "lookup URL template must contain the {tracking} placeholder",
            "carrier.lookup_url",
        ));
    }
    let sample = template.replace("{tracking}", "TEST123");
    url::Url::parse(&sample).map_err(|e| {
        Error::config(
            format!("invalid lookup URL template: {e}"),
            "carrier.lookup_url",
        )
    })?;
    Ok(())
}

fn compile_tracking_pattern(pattern: &str) -> Result<regex::Regex> {
    regex::Regex::new(pattern).map_err(|e| {
        Error::config(
            format!("invalid tracking number pattern: {e}"),
            "carrier.tracking_pattern",
        )
    })
}

fn validate_scrape_shape(
    start_row: u32,
    end_row: Option<u32>,
    max_concurrency: usize,
    requests_per_second: f64,
    fetch_timeout: Duration,
    batch_size: usize,
) -> Result<()> {
    validate_row_range(start_row, end_row, "scrape")?;
    if max_concurrency == 0 {
        return Err(Error::config(
            "max concurrency must be at least 1",
            "scrape.max_concurrency",
        ));
    }
    if !requests_per_second.is_finite() || requests_per_second < 0.0 {
        return Err(Error::config(
            "requests per second must be a finite value >= 0",
            "scrape.requests_per_second",
        ));
    }
    if fetch_timeout.is_zero() {
        return Err(Error::config(
            "fetch timeout must be greater than zero",
            "scrape.fetch_timeout",
        ));
    }
    if batch_size == 0 {
        return Err(Error::config(
            "batch size must be at least 1",
            "scrape.batch_size",
        ));
    }
    Ok(())
}

fn validate_row_range(start_row: u32, end_row: Option<u32>, section: &str) -> Result<()> {
    if start_row == 0 {
        return Err(Error::config(
            "rows are 1-based; start row must be at least 1",
            format!("{section}.start_row"),
        ));
    }
    if let Some(end) = end_row {
        if end < start_row {
            return Err(Error::config(
                format!("end row {end} is before start row {start_row}"),
                format!("{section}.end_row"),
            ));
        }
    }
    Ok(())
}

fn default_lookup_url() -> String {
    "https://interrapidisimo.com/sigue-tu-envio/?guia={tracking}".to_string()
}

fn default_status_selectors() -> Vec<String> {
    vec![
        "div.content p.title-current-state ~ p.font-weight-600".to_string(),
        "p.font-weight-600".to_string(),
        "p.guide-WhitOut-Novelty".to_string(),
    ]
}

fn default_selector_wait() -> Duration {
    Duration::from_secs(5)
}

fn default_blocked_resources() -> Vec<ResourceClass> {
    vec![
        ResourceClass::Image,
        ResourceClass::Media,
        ResourceClass::Font,
        ResourceClass::Stylesheet,
    ]
}

fn default_browser_args() -> Vec<String> {
    vec![
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-blink-features=AutomationControlled".to_string(),
        "--window-size=1280,800".to_string(),
    ]
}

fn default_start_row() -> u32 {
    2
}

fn default_max_concurrency() -> usize {
    2
}

fn default_requests_per_second() -> f64 {
    0.8
}

fn default_retries() -> u32 {
    1
}

fn default_fetch_timeout() -> Duration {
    Duration::from_millis(25_000)
}

fn default_batch_size() -> usize {
    1500
}

fn default_sleep_between_batches() -> Duration {
    Duration::from_secs(15)
}

fn default_report_prefix() -> String {
    "Informe_".to_string()
}

fn default_lock_dir() -> PathBuf {
    PathBuf::from("locks")
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("reports")
}

fn default_true() -> bool {
    true
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
