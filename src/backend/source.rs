//! FifoSource trait for the hardware source adapter
//!
//! This module provides the narrow interface the readout engine needs from
//! the hardware: non-blocking FIFO reads, FIFO depth queries, gating of the
//! receiver channels that produce data, and the receivers' error counters.
//! Both real hardware adapters and the simulated source implement it.

use crate::error::Result;

/// Unified interface for hardware data sources
///
/// Readers for different FIFOs call into the same source concurrently, so
/// all methods take `&self`; implementations synchronize internally.
///
/// # Example
///
/// ```ignore
/// fn drain(source: &dyn FifoSource, fifo: &str) -> Result<Vec<u32>> {
///     let mut words = Vec::new();
///     while source.size(fifo)? > 0 {
///         words.extend(source.read(fifo)?);
///     }
///     Ok(words)
/// }
/// ```
#[cfg_attr(test, mockall::automock)]
pub trait FifoSource: Send + Sync {
    /// Read all words currently pending in a FIFO
    ///
    /// Must not wait for data: returns an empty vector if nothing is pending.
    fn read(&self, fifo: &str) -> Result<Vec<u32>>;

    /// Number of words pending in a FIFO (diagnostic only)
    fn size(&self, fifo: &str) -> Result<usize>;

    /// Names of all receiver channels of the device
    fn channels(&self) -> Vec<String>;

    /// Enable data production of the given receiver channels
    fn enable_channels(&self, channels: &[String]) -> Result<()>;

    /// Disable data production of the given receiver channels
    fn disable_channels(&self, channels: &[String]) -> Result<()>;

    /// Whether a receiver channel is enabled
    fn is_channel_enabled(&self, channel: &str) -> Result<bool>;

    /// Error (discard) counters of the given receiver channels, in order
    fn error_counts(&self, channels: &[String]) -> Result<Vec<u32>>;

    /// Reset a FIFO, discarding pending words
    fn reset_fifo(&self, fifo: &str) -> Result<()>;

    /// Reset the given receiver channels
    fn reset_channels(&self, channels: &[String]) -> Result<()>;
}
