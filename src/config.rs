use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{
    collector::{DEFAULT_PAIRING, Feed, WorkerOptions},
    error::{CollectorError, Result},
    presenter::{Layout, RenderHints},
    schema::SeriesParams,
    util,
};

/// Shortest polling interval the host accepts, in seconds.
pub const MIN_INTERVAL_SECS: u64 = 3;

// ------------------------------------------------------------
// Root configuration
// ------------------------------------------------------------
//
// This is the top-level configuration structure loaded from
// `config.json`.
//
// It defines:
// - Which data source to poll and which assets
// - The operating mode and polling cadence
// - Output hints for the presenter
// - Optional debug configuration
//
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Data source name (e.g. "bitstamp")
    #[serde(default = "default_source")]
    pub source: String,

    /// Asset symbols polled, one worker each
    #[serde(default)]
    pub assets: Vec<String>,

    /// Optional file with one asset symbol per line
    pub assets_file: Option<PathBuf>,

    /// Quote asset completing every pair
    #[serde(default = "default_pairing")]
    pub pairing: String,

    #[serde(default)]
    pub mode: RunMode,

    /// Polling interval in seconds (clamped, see `interval`)
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Per-request wait budget in seconds
    pub request_budget_secs: Option<u64>,

    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,

    /// Field allow-list; empty shows everything
    #[serde(default)]
    pub fields: Vec<String>,

    /// Series request parameters (candles, matrix and download modes)
    #[serde(default)]
    pub series: SeriesParams,

    #[serde(default)]
    pub output: OutputConfig,

    /// Optional debug configuration
    pub debug: Option<DebugConfig>,
}

// ------------------------------------------------------------
// Operating modes
// ------------------------------------------------------------
//
// - market:   streaming latest ticker per asset
// - candles:  streaming series per asset
// - matrix:   synchronized rounds rendered as one matrix
// - download: a single synchronized round, optionally saved as CSV
//
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Market,
    Candles,
    Matrix,
    Download,
}

impl RunMode {
    pub fn is_synchronized(self) -> bool {
        matches!(self, RunMode::Matrix | RunMode::Download)
    }
}

// ------------------------------------------------------------
// Output configuration
// ------------------------------------------------------------
#[derive(Debug, Deserialize, Clone, Default)]
pub struct OutputConfig {
    #[serde(default)]
    pub layout: Layout,

    /// Field shown per asset in matrix mode
    pub matrix_field: Option<String>,

    /// Directory receiving CSV files in download mode
    pub csv_dir: Option<PathBuf>,
}

// ------------------------------------------------------------
// Debug configuration
// ------------------------------------------------------------
//
// Optional debug flags used during development and testing.
//
#[derive(Debug, Deserialize, Clone, Default)]
pub struct DebugConfig {
    /// Enables debug-level logging
    pub log: Option<bool>,
}

fn default_source() -> String {
    "bitstamp".to_string()
}

fn default_pairing() -> String {
    DEFAULT_PAIRING.to_string()
}

fn default_interval() -> u64 {
    5
}

fn default_timestamp_field() -> String {
    "timestamp".to_string()
}

impl Config {
    /// Loads and parses a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
            .map_err(|e| CollectorError::Configuration(format!("{}: {}", path.display(), e)))
    }

    pub fn parse(content: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    pub fn debug_log(&self) -> bool {
        self.debug.as_ref().is_some_and(|d| d.log.unwrap_or(false))
    }

    /// Polling interval; anything under three seconds becomes three.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(MIN_INTERVAL_SECS))
    }

    pub fn request_budget(&self) -> Option<Duration> {
        self.request_budget_secs.map(Duration::from_secs)
    }

    /// Inline assets followed by the ones from `assets_file`.
    ///
    /// An empty result is a configuration error.
    pub fn resolve_assets(&self) -> Result<Vec<String>> {
        let mut assets: Vec<String> = self
            .assets
            .iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();

        if let Some(path) = &self.assets_file {
            assets.extend(util::read_asset_lines(path)?);
        }

        if assets.is_empty() {
            return Err(CollectorError::Configuration(
                "no assets configured (assets / assets_file)".to_string(),
            ));
        }
        Ok(assets)
    }

    pub fn render_hints(&self) -> RenderHints {
        RenderHints {
            fields: self.fields.clone(),
            timestamp_field: self.timestamp_field.clone(),
            layout: self.output.layout,
            matrix_field: match self.mode {
                RunMode::Matrix => Some(
                    self.output
                        .matrix_field
                        .clone()
                        .unwrap_or_else(|| "close".to_string()),
                ),
                _ => None,
            },
            csv_dir: match self.mode {
                RunMode::Download => self.output.csv_dir.clone(),
                _ => None,
            },
        }
    }

    pub fn worker_options(&self) -> WorkerOptions {
        WorkerOptions {
            pairing: self.pairing.clone(),
            interval: self.interval(),
            request_budget: self.request_budget(),
            fields: self.fields.clone(),
            timestamp_field: self.timestamp_field.clone(),
            feed: match self.mode {
                RunMode::Market => Feed::Latest,
                _ => Feed::Series(self.series.clone()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn minimal_config_gets_defaults() {
        let config = Config::parse(r#"{ "assets": ["BTC"] }"#).unwrap();

        assert_eq!(config.source, "bitstamp");
        assert_eq!(config.pairing, "USD");
        assert_eq!(config.mode, RunMode::Market);
        assert_eq!(config.interval(), Duration::from_secs(5));
        assert!(!config.debug_log());
        assert_eq!(config.worker_options().feed, Feed::Latest);
    }

    #[test]
    fn short_intervals_are_clamped() {
        for secs in [0, 1, 2, 3] {
            let config = Config::parse(&format!(r#"{{ "interval_secs": {secs} }}"#)).unwrap();
            assert_eq!(config.interval(), Duration::from_secs(3));
        }
    }

    #[test]
    fn matrix_mode_defaults_to_close_and_series_feed() {
        let config = Config::parse(
            r#"{
                "mode": "matrix",
                "assets": ["BTC", "ETH"],
                "series": { "step": "60", "limit": "5" },
                "output": { "layout": "csv", "csv_dir": "/tmp/out" },
                "debug": { "log": true }
            }"#,
        )
        .unwrap();

        let hints = config.render_hints();
        assert_eq!(hints.matrix_field.as_deref(), Some("close"));
        assert_eq!(hints.layout, Layout::Csv);
        // csv files are a download-mode feature
        assert!(hints.csv_dir.is_none());
        assert!(config.debug_log());
        assert!(config.mode.is_synchronized());

        match config.worker_options().feed {
            Feed::Series(params) => assert_eq!(params.get("limit").map(String::as_str), Some("5")),
            other => panic!("unexpected feed {other:?}"),
        }
    }

    #[test]
    fn assets_are_merged_inline_first() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "XRP\n\nLTC ").unwrap();

        let mut config = Config::parse(r#"{ "assets": ["BTC", " "] }"#).unwrap();
        config.assets_file = Some(file.path().to_path_buf());

        assert_eq!(config.resolve_assets().unwrap(), vec!["BTC", "XRP", "LTC"]);
    }

    #[test]
    fn empty_asset_list_is_rejected() {
        let config = Config::parse("{}").unwrap();
        assert!(matches!(config.resolve_assets(), Err(CollectorError::Configuration(_))));
    }

    #[test]
    fn load_reports_the_file_on_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        match Config::load(&path) {
            Err(CollectorError::Configuration(msg)) => assert!(msg.contains("config.json")),
            other => panic!("unexpected result {other:?}"),
        }
    }
}
