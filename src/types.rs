//! Core data types for the FIFO readout
//!
//! This module contains the data structures that flow between the readout
//! units and the types the engine exposes to callers.
//!
//! # Main Types
//!
//! - [`RawChunk`] - Words from one FIFO poll with read timestamps and status
//! - [`ChunkData`] - Payload of a converted chunk (words, values or columns)
//! - [`ConvertedChunk`] - A raw chunk after a pipeline's filter and converter
//! - [`EngineState`] - Lifecycle state of the engine
//! - [`EngineStatus`] - Read-only snapshot returned by `status()`
//!
//! # Timestamps
//!
//! Read timestamps are float seconds since the Unix epoch, see [`float_time`].

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Status code of a nominal read
pub const STATUS_OK: u32 = 0;

/// Current wall-clock time as float seconds since the Unix epoch (microsecond resolution)
pub fn float_time() -> f64 {
    Utc::now().timestamp_micros() as f64 * 1e-6
}

/// One batch of words read from a FIFO in a single poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChunk {
    /// Data words
    pub words: Vec<u32>,
    /// Timestamp of the previous poll
    pub t_start: f64,
    /// Timestamp of this poll
    pub t_stop: f64,
    /// Adapter status code, [`STATUS_OK`] for nominal reads
    pub status: u32,
}

impl RawChunk {
    /// Create a new nominal chunk
    pub fn new(words: Vec<u32>, t_start: f64, t_stop: f64) -> Self {
        Self {
            words,
            t_start,
            t_stop,
            status: STATUS_OK,
        }
    }

    /// Number of data words in the chunk
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Whether the chunk carries no words
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Payload of a converted chunk
///
/// Converters may keep the 32-bit words, change the element type, or split
/// the words into several parallel arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChunkData {
    /// Raw or filtered 32-bit words
    Words(Vec<u32>),
    /// Converted numeric values
    Values(Vec<f64>),
    /// Parallel arrays, e.g. (column, row, plane) hit tables
    Columns(Vec<ChunkData>),
}

impl ChunkData {
    /// Number of entries, the length of the first column for [`ChunkData::Columns`]
    pub fn len(&self) -> usize {
        match self {
            ChunkData::Words(words) => words.len(),
            ChunkData::Values(values) => values.len(),
            ChunkData::Columns(columns) => columns.first().map_or(0, ChunkData::len),
        }
    }

    /// Whether there are no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the words if this is a [`ChunkData::Words`] payload
    pub fn as_words(&self) -> Option<&[u32]> {
        match self {
            ChunkData::Words(words) => Some(words),
            _ => None,
        }
    }

    /// Take the words if this is a [`ChunkData::Words`] payload
    pub fn into_words(self) -> Option<Vec<u32>> {
        match self {
            ChunkData::Words(words) => Some(words),
            _ => None,
        }
    }
}

impl From<Vec<u32>> for ChunkData {
    fn from(words: Vec<u32>) -> Self {
        ChunkData::Words(words)
    }
}

/// A raw chunk after a pipeline's filter and converter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertedChunk {
    /// Converted payload
    pub data: ChunkData,
    /// Timestamp of the previous poll
    pub t_start: f64,
    /// Timestamp of the poll that produced the raw chunk
    pub t_stop: f64,
    /// Adapter status code, passed through unchanged
    pub status: u32,
}

impl ConvertedChunk {
    /// Number of entries in the payload
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// The batch set handed to the sink: one slot per pipeline, `None` when a
/// pipeline has nothing new
pub type BatchSet = Vec<Option<Vec<ConvertedChunk>>>;

/// Lifecycle state of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EngineState {
    /// No run active (initial and terminal state)
    #[default]
    Idle,
    /// Units are running
    Running,
    /// stop() is in progress
    Stopping,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Idle => write!(f, "Idle"),
            EngineState::Running => write!(f, "Running"),
            EngineState::Stopping => write!(f, "Stopping"),
        }
    }
}

/// Snapshot of a single FIFO
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FifoStatus {
    /// FIFO name
    pub name: String,
    /// Words pending in the hardware FIFO, `None` if the query failed
    pub hardware_size: Option<usize>,
    /// Raw chunks waiting for the worker
    pub queue_size: usize,
    /// Whether the reader was force-stopped
    pub force_stopped: bool,
}

/// Snapshot of a single logical pipeline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineStatus {
    /// Pipeline index
    pub index: usize,
    /// Converted chunks waiting for the writer
    pub queue_size: usize,
    /// Trailing moving-average throughput in words per second
    pub words_per_second: f64,
}

/// Read-only snapshot of the engine
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct EngineStatus {
    /// Whether a run is active
    pub running: bool,
    /// Lifecycle state
    pub state: EngineState,
    /// Per-FIFO state (empty when idle)
    pub fifos: Vec<FifoStatus>,
    /// Per-pipeline state (empty when idle)
    pub pipelines: Vec<PipelineStatus>,
}

impl EngineStatus {
    /// Sum of all pipeline throughputs in words per second
    pub fn total_words_per_second(&self) -> f64 {
        self.pipelines.iter().map(|p| p.words_per_second).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_time_is_epoch_seconds() {
        let t = float_time();
        // 2020-01-01 as a sanity floor
        assert!(t > 1_577_836_800.0);
        let t2 = float_time();
        assert!(t2 >= t);
    }

    #[test]
    fn test_raw_chunk() {
        let chunk = RawChunk::new(vec![1, 2, 3], 1.0, 2.0);
        assert_eq!(chunk.len(), 3);
        assert_eq!(chunk.status, STATUS_OK);
        assert!(!chunk.is_empty());
    }

    #[test]
    fn test_chunk_data_len() {
        assert_eq!(ChunkData::Words(vec![1, 2]).len(), 2);
        assert_eq!(ChunkData::Values(vec![1.0]).len(), 1);
        let columns = ChunkData::Columns(vec![
            ChunkData::Words(vec![1, 2, 3]),
            ChunkData::Values(vec![0.5, 0.5, 0.5]),
        ]);
        assert_eq!(columns.len(), 3);
        assert!(ChunkData::Columns(vec![]).is_empty());
    }

    #[test]
    fn test_chunk_data_words_access() {
        let data: ChunkData = vec![7u32, 8].into();
        assert_eq!(data.as_words(), Some(&[7u32, 8][..]));
        assert_eq!(ChunkData::Values(vec![1.0]).as_words(), None);
        assert_eq!(data.into_words(), Some(vec![7, 8]));
    }

    #[test]
    fn test_engine_state_display() {
        assert_eq!(EngineState::default(), EngineState::Idle);
        assert_eq!(EngineState::Stopping.to_string(), "Stopping");
    }

    #[test]
    fn test_status_total_rate() {
        let status = EngineStatus {
            running: true,
            state: EngineState::Running,
            fifos: Vec::new(),
            pipelines: vec![
                PipelineStatus {
                    index: 0,
                    queue_size: 0,
                    words_per_second: 10.0,
                },
                PipelineStatus {
                    index: 1,
                    queue_size: 2,
                    words_per_second: 5.5,
                },
            ],
        };
        assert!((status.total_words_per_second() - 15.5).abs() < 1e-9);
    }
}
