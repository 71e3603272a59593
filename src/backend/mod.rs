//! Backend module for concurrent FIFO readout
//!
//! This module runs the readout units, each in its own thread, connected by
//! crossbeam channels.
//!
//! # Architecture
//!
//! ```text
//! FifoSource ──► Reader ──► Worker ──► Writer ──► sink callback
//!   (per FIFO)   (per FIFO)   (per pipeline)
//!
//! FifoSource ──► Watchdog ──► error callback
//! ```
//!
//! - [`FifoReadout`] - Engine controller: validates options, spawns and joins units
//! - [`FifoSource`] - Hardware adapter interface consumed by readers and the watchdog
//! - [`SimSource`] - In-memory source for tests and the demo (feature-gated)
//! - [`RateWindow`] - Moving-average throughput per pipeline
//!
//! Every queue carries [`StageMessage`]s; a producer that exits pushes
//! [`StageMessage::EndOfStream`] so its consumer never waits on a dead
//! producer.
//!
//! # Example
//!
//! ```ignore
//! use fifo_readout::backend::{FifoReadout, SimSource};
//! use fifo_readout::config::{ReadoutConfig, StartOptions};
//!
//! let source = Arc::new(SimSource::new().with_fifo("SITCP_FIFO"));
//! let readout = FifoReadout::new(source, ReadoutConfig::default());
//!
//! readout.start(["SITCP_FIFO"], StartOptions::new().with_sink(|batches| {
//!     // write batches to disk
//!     Ok(())
//! }))?;
//! // ... take data ...
//! readout.stop(Duration::from_secs(10))?;
//! ```

pub mod engine;
pub mod rate;
pub mod reader;
pub mod signal;
#[cfg(feature = "sim-source")]
pub mod sim_source;
pub mod source;
pub mod watchdog;
pub mod worker;
pub mod writer;

pub use engine::FifoReadout;
pub use rate::{RateSample, RateWindow, SharedRateWindow};
pub use signal::Signal;
#[cfg(feature = "sim-source")]
pub use sim_source::{SimPattern, SimSource};
pub use source::FifoSource;
pub use writer::NoDataMonitor;

use crate::config::ErrorSink;
use crate::error::{ReadoutError, Result};
use std::thread::JoinHandle;

/// Message carried by every inter-stage queue
#[derive(Debug, Clone, PartialEq)]
pub enum StageMessage<T> {
    /// A chunk of data
    Chunk(T),
    /// The producer has exited
    EndOfStream,
}

/// Route an error to the error callback, or log it if there is none
pub(crate) fn report_error(err_sink: Option<&ErrorSink>, err: ReadoutError) {
    match err_sink {
        Some(err_sink) => err_sink(err),
        None => tracing::error!("{}", err),
    }
}

/// Route an error to the error callback, or hand it back if there is none
pub(crate) fn forward_error(err_sink: Option<&ErrorSink>, err: ReadoutError) -> Result<()> {
    match err_sink {
        Some(err_sink) => {
            err_sink(err);
            Ok(())
        }
        None => Err(err),
    }
}

/// Spawn a named unit thread
pub(crate) fn spawn_unit<T, F>(name: String, f: F) -> Result<JoinHandle<T>>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    std::thread::Builder::new()
        .name(name.clone())
        .spawn(f)
        .map_err(|e| ReadoutError::from(e).with_context(format!("Failed to spawn {}", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_forward_error_without_sink() {
        let err = ReadoutError::Source("boom".to_string());
        assert_eq!(forward_error(None, err.clone()), Err(err));
    }

    #[test]
    fn test_forward_error_with_sink() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = received.clone();
        let err_sink: ErrorSink = Arc::new(move |e| received_clone.lock().unwrap().push(e));

        let err = ReadoutError::Hardware("discard".to_string());
        assert_eq!(forward_error(Some(&err_sink), err.clone()), Ok(()));
        report_error(Some(&err_sink), err.clone());
        assert_eq!(*received.lock().unwrap(), vec![err.clone(), err]);
    }

    #[test]
    fn test_spawn_unit_names_thread() {
        let handle = spawn_unit("reader-FIFO_A".to_string(), || {
            std::thread::current().name().map(str::to_string)
        })
        .unwrap();
        assert_eq!(handle.join().unwrap(), Some("reader-FIFO_A".to_string()));
    }
}
