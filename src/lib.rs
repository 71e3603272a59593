//! # fifo-readout: Concurrent FIFO Readout Engine
//!
//! A readout engine for pixel-detector telescopes. It continuously drains
//! hardware data FIFOs, fans the raw 32-bit words out to one or more
//! conversion pipelines and hands batches of converted data to a
//! caller-provided sink, while watching the receivers for discard errors.
//!
//! ## Architecture
//!
//! - **Readers**: One thread per FIFO polling the hardware source
//! - **Workers**: One thread per FIFO applying the pipelines' filters and converters
//! - **Writers**: One thread per pipeline batching converted chunks for the sink
//! - **Watchdog**: Polls the receivers' discard counters
//! - **Communication**: Crossbeam channels carrying chunks and end-of-stream markers
//!
//! ## Example
//!
//! ```ignore
//! use fifo_readout::{
//!     backend::{FifoReadout, SimSource},
//!     config::{ReadoutConfig, StartOptions},
//!     pipeline::{PipelineSpec, WordMask},
//! };
//! use std::sync::Arc;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = ReadoutConfig::load("readout.toml")?;
//!     let source = Arc::new(SimSource::new().with_fifo("SITCP_FIFO"));
//!     let readout = FifoReadout::new(source, config.clone());
//!
//!     let m26 = WordMask::m26();
//!     readout.start(
//!         ["SITCP_FIFO"],
//!         StartOptions::from_config(&config)
//!             .with_pipeline(PipelineSpec::all().with_filter(move |w| m26.matches(w)))
//!             .with_sink(|batches| {
//!                 // store batches
//!                 Ok(())
//!             })
//!             .with_err_sink(|err| tracing::error!("{}", err)),
//!     )?;
//!
//!     std::thread::sleep(std::time::Duration::from_secs(10));
//!     readout.stop(config.stop_timeout())?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod types;

// Re-export commonly used types
pub use backend::{FifoReadout, FifoSource};
pub use config::{ReadoutConfig, StartOptions};
pub use error::{ReadoutError, Result};
pub use pipeline::{FifoSelect, PipelineSpec};
pub use types::{ChunkData, ConvertedChunk, EngineState, EngineStatus, RawChunk};
