//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml
//!
//! Every section and field is optional. Out-of-range values are clamped.

use crate::services::parser::{DecimalCorrection, ParserSettings, Tokenizer};
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct SamplingConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Recorded recognizer output, one frame per line
    #[serde(default)]
    pub replay_file: Option<String>,
    /// Simulated recognition latency per replayed frame
    #[serde(default)]
    pub replay_latency_ms: u64,
    #[serde(default)]
    pub replay_loop: bool,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            replay_file: None,
            replay_latency_ms: 0,
            replay_loop: false,
        }
    }
}

fn default_interval_ms() -> u64 {
    200
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParserConfig {
    #[serde(default = "default_min_token_len")]
    pub min_token_len: usize,
    #[serde(default)]
    pub tokenizer: Tokenizer,
    #[serde(default = "default_key_precision")]
    pub key_precision: usize,
    #[serde(default)]
    pub decimal_correction: DecimalCorrection,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            min_token_len: default_min_token_len(),
            tokenizer: Tokenizer::default(),
            key_precision: default_key_precision(),
            decimal_correction: DecimalCorrection::default(),
        }
    }
}

fn default_min_token_len() -> usize {
    4
}

fn default_key_precision() -> usize {
    3
}

#[derive(Debug, Clone, Deserialize)]
pub struct StabilizerConfig {
    #[serde(default = "default_grow_step")]
    pub grow_step: u8,
    #[serde(default = "default_decay_step")]
    pub decay_step: u8,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self { grow_step: default_grow_step(), decay_step: default_decay_step() }
    }
}

fn default_grow_step() -> u8 {
    25
}

fn default_decay_step() -> u8 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_haptic_ms")]
    pub haptic_ms: u64,
    #[serde(default = "default_zoom_hint")]
    pub zoom_hint: u8,
    #[serde(default = "default_display_precision")]
    pub display_precision: usize,
    #[serde(default)]
    pub axis_swap: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            haptic_ms: default_haptic_ms(),
            zoom_hint: default_zoom_hint(),
            display_precision: default_display_precision(),
            axis_swap: false,
        }
    }
}

fn default_haptic_ms() -> u64 {
    200
}

fn default_zoom_hint() -> u8 {
    16
}

fn default_display_precision() -> usize {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeocoderConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_geocoder_url")]
    pub base_url: String,
    #[serde(default = "default_geocoder_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_geocoder_queue_size")]
    pub queue_size: usize,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_geocoder_url(),
            timeout_ms: default_geocoder_timeout_ms(),
            user_agent: default_user_agent(),
            queue_size: default_geocoder_queue_size(),
        }
    }
}

fn default_geocoder_url() -> String {
    "https://nominatim.openstreetmap.org".to_string()
}

fn default_geocoder_timeout_ms() -> u64 {
    5000
}

fn default_user_agent() -> String {
    format!("coord-lock/{}", env!("CARGO_PKG_VERSION"))
}

fn default_geocoder_queue_size() -> usize {
    16
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// CSV export written on shutdown (empty to disable)
    #[serde(default = "default_export_csv")]
    pub export_csv: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { export_csv: default_export_csv() }
    }
}

fn default_export_csv() -> String {
    "locks.csv".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    30
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub stabilizer: StabilizerConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub geocoder: GeocoderConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    config_file: String,
    interval_ms: u64,
    replay_file: Option<String>,
    replay_latency_ms: u64,
    replay_loop: bool,
    parser: ParserSettings,
    grow_step: u8,
    decay_step: u8,
    haptic_ms: u64,
    zoom_hint: u8,
    display_precision: usize,
    axis_swap: bool,
    geocoder_enabled: bool,
    geocoder_url: String,
    geocoder_timeout_ms: u64,
    geocoder_user_agent: String,
    geocoder_queue_size: usize,
    export_csv: Option<String>,
    metrics_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default")
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: &str) -> Self {
        let TomlConfig { sampling, parser, stabilizer, dispatch, geocoder, log, metrics } =
            toml_config;

        Self {
            config_file: config_file.to_string(),
            interval_ms: sampling.interval_ms.max(1),
            replay_file: sampling.replay_file.filter(|path| !path.is_empty()),
            replay_latency_ms: sampling.replay_latency_ms,
            replay_loop: sampling.replay_loop,
            parser: ParserSettings {
                min_token_len: parser.min_token_len,
                tokenizer: parser.tokenizer,
                decimal_correction: parser.decimal_correction,
                key_precision: parser.key_precision.min(9),
            },
            grow_step: stabilizer.grow_step.clamp(1, 100),
            decay_step: stabilizer.decay_step.min(100),
            haptic_ms: dispatch.haptic_ms,
            zoom_hint: dispatch.zoom_hint,
            display_precision: dispatch.display_precision.min(9),
            axis_swap: dispatch.axis_swap,
            geocoder_enabled: geocoder.enabled,
            geocoder_url: geocoder.base_url,
            geocoder_timeout_ms: geocoder.timeout_ms,
            geocoder_user_agent: geocoder.user_agent,
            geocoder_queue_size: geocoder.queue_size.max(1),
            export_csv: Some(log.export_csv).filter(|path| !path.is_empty()),
            metrics_interval_secs: metrics.interval_secs.max(1),
        }
    }

    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, &path.display().to_string()))
    }

    /// Load configuration from a path, falling back to defaults
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    pub fn replay_file(&self) -> Option<&str> {
        self.replay_file.as_deref()
    }

    pub fn replay_latency(&self) -> Duration {
        Duration::from_millis(self.replay_latency_ms)
    }

    pub fn replay_loop(&self) -> bool {
        self.replay_loop
    }

    pub fn parser_settings(&self) -> &ParserSettings {
        &self.parser
    }

    pub fn grow_step(&self) -> u8 {
        self.grow_step
    }

    pub fn decay_step(&self) -> u8 {
        self.decay_step
    }

    pub fn haptic_duration(&self) -> Duration {
        Duration::from_millis(self.haptic_ms)
    }

    pub fn zoom_hint(&self) -> u8 {
        self.zoom_hint
    }

    pub fn display_precision(&self) -> usize {
        self.display_precision
    }

    pub fn axis_swap(&self) -> bool {
        self.axis_swap
    }

    pub fn geocoder_enabled(&self) -> bool {
        self.geocoder_enabled
    }

    pub fn geocoder_url(&self) -> &str {
        &self.geocoder_url
    }

    pub fn geocoder_timeout(&self) -> Duration {
        Duration::from_millis(self.geocoder_timeout_ms)
    }

    pub fn geocoder_user_agent(&self) -> &str {
        &self.geocoder_user_agent
    }

    pub fn geocoder_queue_size(&self) -> usize {
        self.geocoder_queue_size
    }

    pub fn export_csv(&self) -> Option<&str> {
        self.export_csv.as_deref()
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_interval_secs)
    }

    /// Builder method to override the sampling interval
    pub fn with_interval_ms(mut self, ms: u64) -> Self {
        self.interval_ms = ms.max(1);
        self
    }

    /// Builder method to override the replay file
    pub fn with_replay_file(mut self, path: &str) -> Self {
        self.replay_file = Some(path.to_string());
        self
    }

    /// Builder method to override the CSV export path
    pub fn with_export_csv(mut self, path: &str) -> Self {
        self.export_csv = Some(path.to_string()).filter(|p| !p.is_empty());
        self
    }

    /// Builder method to set stabilizer steps
    pub fn with_steps(mut self, grow_step: u8, decay_step: u8) -> Self {
        self.grow_step = grow_step.clamp(1, 100);
        self.decay_step = decay_step.min(100);
        self
    }
}
