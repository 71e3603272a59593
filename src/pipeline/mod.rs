//! Conversion pipeline descriptors.
//!
//! A pipeline is a logical output stream fed by one FIFO or by all FIFOs.
//! Every raw chunk read from a selected FIFO passes through the pipeline's
//! optional filter (per-word predicate) and then its optional converter; an
//! absent stage is the identity.
//!
//! # Architecture
//!
//! ```text
//! FIFO_A ──► [filter → converter] (pipeline 0, selects FIFO_A)
//!        └─► [filter → converter] (pipeline 1, selects All)
//! FIFO_B ──► [filter → converter] (pipeline 1, selects All)
//! ```
//!
//! Specs are immutable once a run starts; workers share them through `Arc`.

pub mod words;

pub use words::{is_m26_word, is_trigger_word, m26_plane_id, m26_plane_ids, WordMask};

use crate::error::{ReadoutError, Result};
use crate::types::{ChunkData, ConvertedChunk, RawChunk};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Per-word filter predicate, `true` keeps the word
pub type FilterFn = Arc<dyn Fn(u32) -> bool + Send + Sync>;

/// Converter applied to the filtered words
pub type ConverterFn = Arc<dyn Fn(&[u32]) -> ChunkData + Send + Sync>;

/// Source classifier used by the writer's no-data bookkeeping.
///
/// Returns the identifiers of every source (e.g. detector plane) that
/// contributed to a chunk.
pub type ClassifierFn = Arc<dyn Fn(&ChunkData) -> Vec<u32> + Send + Sync>;

/// Which FIFOs feed a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FifoSelect {
    /// Every FIFO of the run
    #[default]
    All,
    /// A single named FIFO
    Fifo(String),
}

impl FifoSelect {
    /// Select a single FIFO by name
    pub fn fifo(name: impl Into<String>) -> Self {
        FifoSelect::Fifo(name.into())
    }

    /// Whether chunks from `fifo` feed this pipeline
    pub fn matches(&self, fifo: &str) -> bool {
        match self {
            FifoSelect::All => true,
            FifoSelect::Fifo(name) => name == fifo,
        }
    }
}

impl std::fmt::Display for FifoSelect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FifoSelect::All => write!(f, "all"),
            FifoSelect::Fifo(name) => write!(f, "{}", name),
        }
    }
}

/// Filter, converter and FIFO selection of one logical pipeline
#[derive(Clone, Default)]
pub struct PipelineSpec {
    filter: Option<FilterFn>,
    converter: Option<ConverterFn>,
    select: FifoSelect,
}

impl PipelineSpec {
    /// Identity pipeline for the given selection
    pub fn new(select: FifoSelect) -> Self {
        Self {
            filter: None,
            converter: None,
            select,
        }
    }

    /// Identity pipeline fed by every FIFO
    pub fn all() -> Self {
        Self::new(FifoSelect::All)
    }

    /// Identity pipeline fed by a single FIFO
    pub fn for_fifo(name: impl Into<String>) -> Self {
        Self::new(FifoSelect::fifo(name))
    }

    /// Set the per-word filter
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(u32) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Set the converter
    pub fn with_converter<C>(mut self, converter: C) -> Self
    where
        C: Fn(&[u32]) -> ChunkData + Send + Sync + 'static,
    {
        self.converter = Some(Arc::new(converter));
        self
    }

    /// Set an already shared filter (or clear it)
    pub fn with_shared_filter(mut self, filter: Option<FilterFn>) -> Self {
        self.filter = filter;
        self
    }

    /// Set an already shared converter (or clear it)
    pub fn with_shared_converter(mut self, converter: Option<ConverterFn>) -> Self {
        self.converter = converter;
        self
    }

    /// FIFO selection
    pub fn select(&self) -> &FifoSelect {
        &self.select
    }

    /// Whether a filter is set
    pub fn has_filter(&self) -> bool {
        self.filter.is_some()
    }

    /// Whether a converter is set
    pub fn has_converter(&self) -> bool {
        self.converter.is_some()
    }

    /// Filter and convert a word array
    pub fn convert(&self, words: &[u32]) -> ChunkData {
        convert_words(words, self.filter.as_ref(), self.converter.as_ref())
    }

    /// Convert a raw chunk; timestamps and status pass through unchanged
    pub fn apply(&self, chunk: &RawChunk) -> ConvertedChunk {
        ConvertedChunk {
            data: self.convert(&chunk.words),
            t_start: chunk.t_start,
            t_stop: chunk.t_stop,
            status: chunk.status,
        }
    }
}

impl std::fmt::Debug for PipelineSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineSpec")
            .field("select", &self.select)
            .field("filter", &self.filter.is_some())
            .field("converter", &self.converter.is_some())
            .finish()
    }
}

/// Build pipeline specs from parallel filter/converter/select lists.
///
/// All three lists must have the same length.
pub fn pipelines_from_lists(
    filters: Vec<Option<FilterFn>>,
    converters: Vec<Option<ConverterFn>>,
    selects: Vec<FifoSelect>,
) -> Result<Vec<PipelineSpec>> {
    if filters.len() != converters.len() {
        return Err(ReadoutError::Configuration(
            "Length of \"filter\" and \"converter\" lists not equal".to_string(),
        ));
    }
    if filters.len() != selects.len() {
        return Err(ReadoutError::Configuration(
            "Length of \"filter\" and \"select\" lists not equal".to_string(),
        ));
    }

    Ok(filters
        .into_iter()
        .zip(converters)
        .zip(selects)
        .map(|((filter, converter), select)| {
            PipelineSpec::new(select)
                .with_shared_filter(filter)
                .with_shared_converter(converter)
        })
        .collect())
}

/// Default pipelines: one identity pipeline per FIFO
pub fn default_pipelines(fifos: &[String]) -> Vec<PipelineSpec> {
    fifos.iter().map(PipelineSpec::for_fifo).collect()
}

/// Validate FIFO names and pipeline selections before a run
pub fn validate_pipelines(fifos: &[String], pipelines: &[PipelineSpec]) -> Result<()> {
    if fifos.is_empty() {
        return Err(ReadoutError::Configuration(
            "\"fifos\" parameter is empty".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    let mut duplicates: Vec<&str> = fifos
        .iter()
        .filter(|fifo| !seen.insert(fifo.as_str()))
        .map(String::as_str)
        .collect();
    if !duplicates.is_empty() {
        duplicates.sort_unstable();
        duplicates.dedup();
        return Err(ReadoutError::Configuration(format!(
            "The following FIFOs occur multiple times: {}",
            duplicates.join(", ")
        )));
    }

    if pipelines.is_empty() {
        return Err(ReadoutError::Configuration(
            "At least one pipeline is required".to_string(),
        ));
    }

    let mut unknown: Vec<&str> = pipelines
        .iter()
        .filter_map(|spec| match spec.select() {
            FifoSelect::Fifo(name) if !seen.contains(name.as_str()) => Some(name.as_str()),
            _ => None,
        })
        .collect();
    if !unknown.is_empty() {
        unknown.sort_unstable();
        unknown.dedup();
        return Err(ReadoutError::Configuration(format!(
            "The following FIFOs have filters/converters set but are not read out: {}",
            unknown.join(", ")
        )));
    }

    Ok(())
}

/// Filter and convert a word array
pub fn convert_words(
    words: &[u32],
    filter: Option<&FilterFn>,
    converter: Option<&ConverterFn>,
) -> ChunkData {
    match (filter, converter) {
        (None, None) => ChunkData::Words(words.to_vec()),
        (None, Some(converter)) => converter(words),
        (Some(filter), converter) => {
            let kept: Vec<u32> = words.iter().copied().filter(|&w| filter(w)).collect();
            match converter {
                Some(converter) => converter(&kept),
                None => ChunkData::Words(kept),
            }
        }
    }
}

/// Convert every chunk of a sequence, keeping timestamps and status
pub fn convert_chunks(
    chunks: &[RawChunk],
    filter: Option<&FilterFn>,
    converter: Option<&ConverterFn>,
) -> Vec<ConvertedChunk> {
    chunks
        .iter()
        .map(|chunk| ConvertedChunk {
            data: convert_words(&chunk.words, filter, converter),
            t_start: chunk.t_start,
            t_stop: chunk.t_stop,
            status: chunk.status,
        })
        .collect()
}

/// Concatenate the words of a chunk sequence.
///
/// Chunks whose payload is not [`ChunkData::Words`] contribute nothing.
pub fn concat_words(chunks: &[ConvertedChunk]) -> Vec<u32> {
    let total = chunks.iter().filter_map(|c| c.data.as_words()).map(<[u32]>::len).sum();
    let mut words = Vec::with_capacity(total);
    for chunk in chunks {
        if let Some(chunk_words) = chunk.data.as_words() {
            words.extend_from_slice(chunk_words);
        }
    }
    words
}
