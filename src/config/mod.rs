//! Configuration module for the FIFO readout
//!
//! This module handles readout configuration:
//! - [`ReadoutConfig`] - Engine tunables (cadences, thresholds, buffering),
//!   serializable and loadable from TOML
//! - [`StartOptions`] - Per-run options including the sink and error
//!   callbacks, which cannot be serialized
//!
//! # Defaults
//!
//! | Key                      | Default |
//! |--------------------------|---------|
//! | `readout_interval_secs`  | 0.05    |
//! | `write_interval_secs`    | 1.0     |
//! | `watchdog_interval_secs` | 1.0     |
//! | `rate_window_secs`       | 10.0    |
//! | `empty_reads`            | 3       |
//! | `stop_timeout_secs`      | 10.0    |
//! | `fill_buffer`            | false   |
//!
//! # Example
//!
//! ```toml
//! fifos = ["SITCP_FIFO"]
//! readout_interval_secs = 0.05
//! no_data_timeout_secs = 30.0
//!
//! [[pipeline]]
//! select = "SITCP_FIFO"
//! filter = { mask = 0xFF000000, value = 0x20000000 }
//! ```

pub mod options;

pub use options::{DataSink, ErrorSink, StartOptions};

use crate::error::{ReadoutError, Result, ResultExt};
use crate::pipeline::{FifoSelect, PipelineSpec, WordMask};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default FIFO polling period in seconds
pub const DEFAULT_READOUT_INTERVAL_SECS: f64 = 0.05;

/// Default minimum time between sink invocations in seconds
pub const DEFAULT_WRITE_INTERVAL_SECS: f64 = 1.0;

/// Default watchdog polling period in seconds
pub const DEFAULT_WATCHDOG_INTERVAL_SECS: f64 = 1.0;

/// Default moving-average window for throughput in seconds
pub const DEFAULT_RATE_WINDOW_SECS: f64 = 10.0;

/// Default number of consecutive empty reads before a stopping reader exits
pub const DEFAULT_EMPTY_READS: u32 = 3;

/// Default shutdown deadline for readers in seconds
pub const DEFAULT_STOP_TIMEOUT_SECS: f64 = 10.0;

/// Convert float seconds to a Duration, values rejected by `validate` become zero
pub(crate) fn secs_to_duration(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
}

/// A pipeline entry of a config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PipelineConfig {
    /// FIFO feeding the pipeline, all FIFOs if absent
    #[serde(default)]
    pub select: Option<String>,
    /// Optional mask/value word filter
    #[serde(default)]
    pub filter: Option<WordMask>,
}

impl PipelineConfig {
    /// Build the runtime pipeline spec
    pub fn to_spec(&self) -> PipelineSpec {
        let select = match &self.select {
            Some(name) => FifoSelect::fifo(name.clone()),
            None => FifoSelect::All,
        };
        let spec = PipelineSpec::new(select);
        match self.filter {
            Some(mask) => spec.with_filter(move |w| mask.matches(w)),
            None => spec,
        }
    }
}

/// Readout engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadoutConfig {
    /// FIFO polling period in seconds
    pub readout_interval_secs: f64,

    /// Minimum time between sink invocations in seconds, 0 flushes every chunk
    pub write_interval_secs: f64,

    /// Watchdog polling period in seconds
    pub watchdog_interval_secs: f64,

    /// Moving-average window for throughput in seconds
    pub rate_window_secs: f64,

    /// Consecutive empty reads after stop before a reader exits
    pub empty_reads: u32,

    /// Shutdown deadline for readers in seconds
    pub stop_timeout_secs: f64,

    /// Retain every converted chunk for retrieval after the run
    pub fill_buffer: bool,

    /// No-data timeout in seconds (disabled if absent)
    pub no_data_timeout_secs: Option<f64>,

    /// Receiver channels to enable, all channels of the source if absent
    pub enabled_channels: Option<Vec<String>>,

    /// FIFOs to read out
    pub fifos: Vec<String>,

    /// Pipelines, one identity pipeline per FIFO if empty
    #[serde(rename = "pipeline")]
    pub pipelines: Vec<PipelineConfig>,
}

impl Default for ReadoutConfig {
    fn default() -> Self {
        Self {
            readout_interval_secs: DEFAULT_READOUT_INTERVAL_SECS,
            write_interval_secs: DEFAULT_WRITE_INTERVAL_SECS,
            watchdog_interval_secs: DEFAULT_WATCHDOG_INTERVAL_SECS,
            rate_window_secs: DEFAULT_RATE_WINDOW_SECS,
            empty_reads: DEFAULT_EMPTY_READS,
            stop_timeout_secs: DEFAULT_STOP_TIMEOUT_SECS,
            fill_buffer: false,
            no_data_timeout_secs: None,
            enabled_channels: None,
            fifos: Vec::new(),
            pipelines: Vec::new(),
        }
    }
}

impl ReadoutConfig {
    /// Parse a config from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the config to TOML text
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(ReadoutError::from)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    /// Save the config to a file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = self.to_toml_string()?;
        std::fs::write(path, content)
            .map_err(ReadoutError::from)
            .with_context(|| format!("Failed to write config {}", path.display()))
    }

    /// Check all values
    pub fn validate(&self) -> Result<()> {
        // Every value must also be representable as a Duration
        fn positive(name: &str, value: f64) -> Result<()> {
            match Duration::try_from_secs_f64(value) {
                Ok(duration) if !duration.is_zero() => Ok(()),
                _ => Err(ReadoutError::Configuration(format!(
                    "\"{}\" must be a positive number of seconds, got {}",
                    name, value
                ))),
            }
        }
        fn non_negative(name: &str, value: f64) -> Result<()> {
            match Duration::try_from_secs_f64(value) {
                Ok(_) => Ok(()),
                Err(_) => Err(ReadoutError::Configuration(format!(
                    "\"{}\" must be a non-negative number of seconds, got {}",
                    name, value
                ))),
            }
        }

        positive("readout_interval_secs", self.readout_interval_secs)?;
        positive("watchdog_interval_secs", self.watchdog_interval_secs)?;
        positive("rate_window_secs", self.rate_window_secs)?;
        non_negative("write_interval_secs", self.write_interval_secs)?;
        non_negative("stop_timeout_secs", self.stop_timeout_secs)?;
        if let Some(timeout) = self.no_data_timeout_secs {
            positive("no_data_timeout_secs", timeout)?;
        }
        Ok(())
    }

    /// FIFO polling period
    pub fn readout_interval(&self) -> Duration {
        secs_to_duration(self.readout_interval_secs)
    }

    /// Minimum time between sink invocations
    pub fn write_interval(&self) -> Duration {
        secs_to_duration(self.write_interval_secs)
    }

    /// Watchdog polling period
    pub fn watchdog_interval(&self) -> Duration {
        secs_to_duration(self.watchdog_interval_secs)
    }

    /// Moving-average window
    pub fn rate_window(&self) -> Duration {
        secs_to_duration(self.rate_window_secs)
    }

    /// Shutdown deadline for readers
    pub fn stop_timeout(&self) -> Duration {
        secs_to_duration(self.stop_timeout_secs)
    }

    /// Number of samples kept per pipeline rate window
    pub fn rate_window_len(&self) -> usize {
        ((self.rate_window_secs / self.readout_interval_secs).round() as usize).max(1)
    }

    /// Runtime pipeline specs, one identity pipeline per FIFO if none are configured
    pub fn pipeline_specs(&self) -> Option<Vec<PipelineSpec>> {
        if self.pipelines.is_empty() {
            None
        } else {
            Some(self.pipelines.iter().map(PipelineConfig::to_spec).collect())
        }
    }

    /// Builder: set the polling period
    pub fn with_readout_interval(mut self, interval: Duration) -> Self {
        self.readout_interval_secs = interval.as_secs_f64();
        self
    }

    /// Builder: set the write interval
    pub fn with_write_interval(mut self, interval: Duration) -> Self {
        self.write_interval_secs = interval.as_secs_f64();
        self
    }

    /// Builder: set the watchdog period
    pub fn with_watchdog_interval(mut self, interval: Duration) -> Self {
        self.watchdog_interval_secs = interval.as_secs_f64();
        self
    }

    /// Builder: set the rate window
    pub fn with_rate_window(mut self, window: Duration) -> Self {
        self.rate_window_secs = window.as_secs_f64();
        self
    }

    /// Builder: enable the data buffer
    pub fn with_fill_buffer(mut self, fill_buffer: bool) -> Self {
        self.fill_buffer = fill_buffer;
        self
    }
}
