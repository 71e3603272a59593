//! Worker unit: fans one FIFO's raw chunks out to its pipelines
//!
//! For every raw chunk the worker applies, in pipeline order, the filter and
//! converter of each pipeline that selects its FIFO, records the result in
//! that pipeline's rate window and forwards it to the pipeline's writer.
//! Chunk order is preserved per pipeline.
//!
//! The worker exits on [`StageMessage::EndOfStream`] (or when every reader
//! handle is gone) and forwards one end-of-stream to each of its pipelines.

use super::{SharedRateWindow, StageMessage};
use crate::pipeline::PipelineSpec;
use crate::types::{ConvertedChunk, RawChunk};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// Delivery target of one pipeline fed by this worker
pub(crate) struct Route {
    pub index: usize,
    pub spec: PipelineSpec,
    pub tx: Sender<StageMessage<ConvertedChunk>>,
    pub rate: SharedRateWindow,
}

/// State of one worker thread
pub(crate) struct WorkerUnit {
    pub fifo: String,
    pub rx: Receiver<StageMessage<RawChunk>>,
    pub routes: Vec<Route>,
    pub wait: Duration,
}

impl WorkerUnit {
    /// Process raw chunks until end-of-stream
    pub fn run(self) {
        tracing::debug!(
            "Starting worker thread for {} ({} pipeline(s))",
            self.fifo,
            self.routes.len()
        );

        loop {
            match self.rx.recv_timeout(self.wait) {
                Ok(StageMessage::Chunk(chunk)) => self.dispatch(&chunk),
                Ok(StageMessage::EndOfStream) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }
        }

        for route in &self.routes {
            let _ = route.tx.send(StageMessage::EndOfStream);
        }
        tracing::debug!("Stopped worker thread for {}", self.fifo);
    }

    fn dispatch(&self, chunk: &RawChunk) {
        for route in &self.routes {
            let converted = route.spec.apply(chunk);
            route
                .rate
                .record(converted.len(), converted.t_start, converted.t_stop);
            if route.tx.send(StageMessage::Chunk(converted)).is_err() {
                tracing::trace!("Writer of pipeline {} is gone, dropping chunk", route.index);
            }
        }
    }
}
