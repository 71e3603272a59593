//! Per-run start options
//!
//! Everything that is only valid for one run of the engine: the sink and
//! error callbacks, the pipeline list, the enabled receiver channels and the
//! no-data timeout. Closures cannot be serialized, so these live apart from
//! [`ReadoutConfig`](super::ReadoutConfig); [`StartOptions::from_config`]
//! seeds the serializable parts from a config file.

use super::{secs_to_duration, ReadoutConfig};
use crate::error::ReadoutError;
use crate::pipeline::{ClassifierFn, PipelineSpec};
use crate::types::ConvertedChunk;
use std::sync::Arc;
use std::time::Duration;

/// Sink callback: receives one slot per pipeline, `None` for pipelines with nothing new
pub type DataSink = Arc<dyn Fn(&[Option<Vec<ConvertedChunk>>]) -> anyhow::Result<()> + Send + Sync>;

/// Error callback
pub type ErrorSink = Arc<dyn Fn(ReadoutError) + Send + Sync>;

/// Options for a single run
#[derive(Clone, Default)]
pub struct StartOptions {
    pub(crate) sink: Option<DataSink>,
    pub(crate) err_sink: Option<ErrorSink>,
    pub(crate) pipelines: Option<Vec<PipelineSpec>>,
    pub(crate) enabled_channels: Option<Vec<String>>,
    pub(crate) no_data_timeout: Option<Duration>,
    pub(crate) classifier: Option<ClassifierFn>,
    pub(crate) reset_channels: bool,
    pub(crate) reset_fifos: bool,
}

impl StartOptions {
    /// Create empty options
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed pipelines, enabled channels and the no-data timeout from a config
    pub fn from_config(config: &ReadoutConfig) -> Self {
        Self {
            pipelines: config.pipeline_specs(),
            enabled_channels: config.enabled_channels.clone(),
            no_data_timeout: config.no_data_timeout_secs.map(secs_to_duration),
            ..Self::default()
        }
    }

    /// Set the sink callback
    pub fn with_sink<F>(mut self, sink: F) -> Self
    where
        F: Fn(&[Option<Vec<ConvertedChunk>>]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Set the error callback
    pub fn with_err_sink<F>(mut self, err_sink: F) -> Self
    where
        F: Fn(ReadoutError) + Send + Sync + 'static,
    {
        self.err_sink = Some(Arc::new(err_sink));
        self
    }

    /// Replace the pipeline list
    pub fn with_pipelines(mut self, pipelines: Vec<PipelineSpec>) -> Self {
        self.pipelines = Some(pipelines);
        self
    }

    /// Append a pipeline
    pub fn with_pipeline(mut self, pipeline: PipelineSpec) -> Self {
        self.pipelines.get_or_insert_with(Vec::new).push(pipeline);
        self
    }

    /// Set the receiver channels to enable during the run
    pub fn with_enabled_channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enabled_channels = Some(channels.into_iter().map(Into::into).collect());
        self
    }

    /// Set the no-data timeout, a zero duration disables it
    pub fn with_no_data_timeout(mut self, timeout: Duration) -> Self {
        self.no_data_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Set the source classifier used by the writers' no-data bookkeeping
    pub fn with_classifier<F>(mut self, classifier: F) -> Self
    where
        F: Fn(&crate::types::ChunkData) -> Vec<u32> + Send + Sync + 'static,
    {
        self.classifier = Some(Arc::new(classifier));
        self
    }

    /// Reset the receiver channels before the run
    pub fn with_reset_channels(mut self, reset: bool) -> Self {
        self.reset_channels = reset;
        self
    }

    /// Reset the FIFOs before the run
    pub fn with_reset_fifos(mut self, reset: bool) -> Self {
        self.reset_fifos = reset;
        self
    }

    /// Whether an error callback is set
    pub fn has_err_sink(&self) -> bool {
        self.err_sink.is_some()
    }

    /// Configured no-data timeout
    pub fn no_data_timeout(&self) -> Option<Duration> {
        self.no_data_timeout
    }
}

impl std::fmt::Debug for StartOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartOptions")
            .field("sink", &self.sink.is_some())
            .field("err_sink", &self.err_sink.is_some())
            .field("pipelines", &self.pipelines)
            .field("enabled_channels", &self.enabled_channels)
            .field("no_data_timeout", &self.no_data_timeout)
            .field("classifier", &self.classifier.is_some())
            .field("reset_channels", &self.reset_channels)
            .field("reset_fifos", &self.reset_fifos)
            .finish()
    }
}
