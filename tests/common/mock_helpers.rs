//! Sink and source construction helpers

use fifo_readout::types::{BatchSet, ConvertedChunk};
use fifo_readout::ReadoutError;
use std::sync::{Arc, Mutex};

#[cfg(feature = "sim-source")]
use fifo_readout::backend::SimSource;

/// Every batch set the sink was called with
pub type SinkLog = Arc<Mutex<Vec<BatchSet>>>;

/// Every error the error callback received
pub type ErrorLog = Arc<Mutex<Vec<ReadoutError>>>;

/// A sink that records its calls
pub fn recording_sink() -> (
    impl Fn(&[Option<Vec<ConvertedChunk>>]) -> anyhow::Result<()> + Send + Sync + 'static,
    SinkLog,
) {
    let log: SinkLog = Arc::new(Mutex::new(Vec::new()));
    let log_clone = log.clone();
    let sink = move |batches: &[Option<Vec<ConvertedChunk>>]| {
        log_clone.lock().unwrap().push(batches.to_vec());
        Ok(())
    };
    (sink, log)
}

/// An error callback that records every error
pub fn recording_err_sink() -> (impl Fn(ReadoutError) + Send + Sync + 'static, ErrorLog) {
    let log: ErrorLog = Arc::new(Mutex::new(Vec::new()));
    let log_clone = log.clone();
    (move |err| log_clone.lock().unwrap().push(err), log)
}

/// Chunks delivered to pipeline `index`, in sink call order
pub fn delivered(log: &SinkLog, index: usize) -> Vec<ConvertedChunk> {
    log.lock()
        .unwrap()
        .iter()
        .filter_map(|call| call.get(index).cloned().flatten())
        .flatten()
        .collect()
}

/// Words delivered to pipeline `index`, in order
pub fn delivered_words(log: &SinkLog, index: usize) -> Vec<u32> {
    fifo_readout::pipeline::concat_words(&delivered(log, index))
}

#[cfg(feature = "sim-source")]
pub fn create_test_source(fifos: &[&str], channels: &[&str]) -> Arc<SimSource> {
    let mut source = SimSource::new().with_channels(channels.iter().copied());
    for fifo in fifos {
        source = source.with_fifo(*fifo);
    }
    Arc::new(source)
}
