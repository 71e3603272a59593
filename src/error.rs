//! Error handling for the FIFO readout
//!
//! This module defines the error taxonomy shared by the engine controller and
//! every readout unit, together with a Result alias for use throughout the
//! crate.

use thiserror::Error;

/// Main error type for readout operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReadoutError {
    /// Invalid start arguments, detected before any unit is spawned
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// start/stop called in the wrong engine state
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    /// A FIFO or pipeline delivered no data for longer than the configured timeout
    #[error("No data timeout: received no data for {timeout_secs:.1} second(s) from {origin}")]
    NoDataTimeout { origin: String, timeout_secs: f64 },

    /// A reader did not finish within the shutdown deadline and was force-stopped
    #[error("Stop timeout: stopping {fifo} readout thread timed out after {timeout_secs:.1}s")]
    StopTimeout { fifo: String, timeout_secs: f64 },

    /// Hardware error counters reported by the watchdog
    #[error("Hardware error: {0}")]
    Hardware(String),

    /// Errors returned by the hardware source adapter
    #[error("Source error: {0}")]
    Source(String),

    /// Errors returned by the caller's sink callback
    #[error("Sink error: {0}")]
    Sink(String),

    /// A readout unit panicked
    #[error("Unit '{unit}' panicked")]
    UnitPanic { unit: String },

    /// IO errors (thread spawning, config files)
    #[error("IO error: {0}")]
    Io(String),

    /// Configuration file parse/serialize errors
    #[error("Config file error: {0}")]
    ConfigFile(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ReadoutError>,
    },
}

impl ReadoutError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ReadoutError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Strip any context wrappers and return the underlying error
    pub fn root(&self) -> &ReadoutError {
        match self {
            ReadoutError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether this is a no-data timeout (possibly wrapped in context)
    pub fn is_no_data_timeout(&self) -> bool {
        matches!(self.root(), ReadoutError::NoDataTimeout { .. })
    }

    /// Create a sink error from the callback's error, keeping the cause chain
    pub fn from_sink_error(err: anyhow::Error) -> Self {
        ReadoutError::Sink(format!("{:#}", err))
    }
}

impl From<std::io::Error> for ReadoutError {
    fn from(err: std::io::Error) -> Self {
        ReadoutError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for ReadoutError {
    fn from(err: toml::de::Error) -> Self {
        ReadoutError::ConfigFile(err.to_string())
    }
}

impl From<toml::ser::Error> for ReadoutError {
    fn from(err: toml::ser::Error) -> Self {
        ReadoutError::ConfigFile(err.to_string())
    }
}

/// Result type alias for readout operations
pub type Result<T> = std::result::Result<T, ReadoutError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
