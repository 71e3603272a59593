//! Writer unit: batches one pipeline's converted chunks for the sink
//!
//! The writer accumulates the converted chunks of its pipeline and hands
//! them to the sink callback at most once per write interval (on every chunk
//! when the interval is zero). Each call receives one slot per pipeline; only
//! the writer's own slot is filled, every other slot is `None`.
//!
//! A pipeline fed by several FIFOs has several workers; the writer finishes
//! after the end-of-stream of every one of them, flushing what is left once.
//!
//! # No-data bookkeeping
//!
//! With a no-data timeout configured, [`NoDataMonitor`] tracks when each
//! data source was last seen in this pipeline's output and raises a single
//! [`ReadoutError::NoDataTimeout`] per run.

use super::{forward_error, StageMessage};
use crate::config::{DataSink, ErrorSink};
use crate::error::{ReadoutError, Result};
use crate::pipeline::ClassifierFn;
use crate::types::{BatchSet, ChunkData, ConvertedChunk};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Tracks when the sources of a pipeline last delivered data
///
/// Without a classifier any non-empty chunk counts as "all sources seen".
/// With one, each source id returned by the classifier is tracked on its
/// own, and the aggregate time only advances once `expected_sources`
/// distinct sources have been seen.
pub struct NoDataMonitor {
    origin: String,
    timeout: Duration,
    classifier: Option<ClassifierFn>,
    expected_sources: usize,
    last_seen: BTreeMap<u32, Instant>,
    last_all: Instant,
    fired: bool,
}

impl NoDataMonitor {
    /// Create a monitor; `origin` names the pipeline in the timeout error
    pub fn new(
        origin: impl Into<String>,
        timeout: Duration,
        classifier: Option<ClassifierFn>,
        expected_sources: usize,
        now: Instant,
    ) -> Self {
        Self {
            origin: origin.into(),
            timeout,
            classifier,
            expected_sources,
            last_seen: BTreeMap::new(),
            last_all: now,
            fired: false,
        }
    }

    /// Record a converted payload observed at `now`
    pub fn observe(&mut self, data: &ChunkData, now: Instant) {
        if self.fired {
            return;
        }
        match &self.classifier {
            Some(classifier) => {
                for id in classifier(data) {
                    self.last_seen.insert(id, now);
                }
                if self.last_seen.len() >= self.expected_sources {
                    self.last_all = now;
                }
            }
            None => {
                if !data.is_empty() {
                    self.last_all = now;
                }
            }
        }
    }

    /// Check for a timeout at `now`; returns the error at most once
    pub fn check(&mut self, now: Instant) -> Option<ReadoutError> {
        if self.fired {
            return None;
        }
        let stale_source = self
            .last_seen
            .iter()
            .find(|(_, seen)| now.saturating_duration_since(**seen) > self.timeout)
            .map(|(&id, _)| id);

        let origin = match stale_source {
            Some(id) => format!("source {} of {}", id, self.origin),
            None if now.saturating_duration_since(self.last_all) > self.timeout => {
                let missing = self.expected_sources.saturating_sub(self.last_seen.len());
                if self.classifier.is_some() && missing > 0 {
                    format!("{} source(s) of {}", missing, self.origin)
                } else {
                    self.origin.clone()
                }
            }
            None => return None,
        };

        self.fired = true;
        Some(ReadoutError::NoDataTimeout {
            origin,
            timeout_secs: self.timeout.as_secs_f64(),
        })
    }
}

/// What a writer hands back when it is joined
pub(crate) struct WriterOutput {
    /// Every chunk received, if the data buffer is enabled
    pub buffer: Vec<ConvertedChunk>,
    /// Fatal error, if the writer ended on one
    pub result: Result<()>,
}

/// State of one writer thread
pub(crate) struct WriterUnit {
    pub index: usize,
    pub n_pipelines: usize,
    pub rx: Receiver<StageMessage<ConvertedChunk>>,
    pub producers: usize,
    pub sink: Option<DataSink>,
    pub err_sink: Option<ErrorSink>,
    pub write_interval: Duration,
    pub wait: Duration,
    pub no_data: Option<NoDataMonitor>,
    pub fill_buffer: bool,
}

impl WriterUnit {
    /// Batch chunks until every producer has finished
    pub fn run(mut self) -> WriterOutput {
        tracing::debug!(
            "Starting writer thread for pipeline {} ({} producer(s))",
            self.index,
            self.producers
        );

        let mut batch: BatchSet = vec![None; self.n_pipelines];
        let mut buffer = Vec::new();
        let mut last_write = Instant::now();
        let mut remaining = self.producers;

        let result = loop {
            if let Some(err) = self.no_data.as_mut().and_then(|m| m.check(Instant::now())) {
                if let Err(err) = forward_error(self.err_sink.as_ref(), err) {
                    break Err(err);
                }
            }

            match self.rx.recv_timeout(self.wait) {
                Ok(StageMessage::Chunk(chunk)) => {
                    if let Some(monitor) = self.no_data.as_mut() {
                        monitor.observe(&chunk.data, Instant::now());
                    }
                    if self.fill_buffer {
                        buffer.push(chunk.clone());
                    }
                    batch[self.index].get_or_insert_with(Vec::new).push(chunk);
                }
                Ok(StageMessage::EndOfStream) => {
                    remaining = remaining.saturating_sub(1);
                    if remaining == 0 {
                        break self.flush(&mut batch);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break self.flush(&mut batch),
                Err(RecvTimeoutError::Timeout) => {}
            }

            let due = self.write_interval.is_zero() || last_write.elapsed() >= self.write_interval;
            if due && batch[self.index].is_some() {
                last_write = Instant::now();
                if let Err(err) = self.flush(&mut batch) {
                    break Err(err);
                }
            }
        };

        tracing::debug!("Stopped writer thread for pipeline {}", self.index);
        WriterOutput { buffer, result }
    }

    /// Hand the pending batch to the sink.
    ///
    /// On a sink failure the batch is kept for the next flush if an error
    /// callback takes the error; otherwise the error ends the writer.
    fn flush(&self, batch: &mut BatchSet) -> Result<()> {
        if batch[self.index].is_none() {
            return Ok(());
        }
        let Some(sink) = &self.sink else {
            batch[self.index] = None;
            return Ok(());
        };
        match sink(batch.as_slice()) {
            Ok(()) => {
                batch[self.index] = None;
                Ok(())
            }
            Err(err) => {
                let err = ReadoutError::from_sink_error(err)
                    .with_context(format!("Writing pipeline {} failed", self.index));
                forward_error(self.err_sink.as_ref(), err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{unbounded, Sender};
    use std::sync::{Arc, Mutex};

    type Calls = Arc<Mutex<Vec<BatchSet>>>;

    fn recording_sink() -> (DataSink, Calls) {
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let calls_clone = calls.clone();
        let sink: DataSink = Arc::new(move |batch: &[Option<Vec<ConvertedChunk>>]| {
            calls_clone.lock().unwrap().push(batch.to_vec());
            Ok(())
        });
        (sink, calls)
    }

    fn writer(
        index: usize,
        n_pipelines: usize,
        producers: usize,
        sink: Option<DataSink>,
    ) -> (WriterUnit, Sender<StageMessage<ConvertedChunk>>) {
        let (tx, rx) = unbounded();
        let unit = WriterUnit {
            index,
            n_pipelines,
            rx,
            producers,
            sink,
            err_sink: None,
            write_interval: Duration::ZERO,
            wait: Duration::from_millis(5),
            no_data: None,
            fill_buffer: false,
        };
        (unit, tx)
    }

    fn chunk(words: Vec<u32>) -> StageMessage<ConvertedChunk> {
        StageMessage::Chunk(ConvertedChunk {
            data: ChunkData::Words(words),
            t_start: 0.0,
            t_stop: 1.0,
            status: 0,
        })
    }

    #[test]
    fn test_zero_interval_flushes_every_chunk() {
        let (sink, calls) = recording_sink();
        let (unit, tx) = writer(1, 3, 1, Some(sink));
        tx.send(chunk(vec![1])).unwrap();
        tx.send(chunk(vec![2])).unwrap();
        tx.send(StageMessage::EndOfStream).unwrap();

        let output = unit.run();
        assert!(output.result.is_ok());

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        for call in calls.iter() {
            assert_eq!(call.len(), 3);
            assert!(call[0].is_none());
            assert!(call[2].is_none());
            assert_eq!(call[1].as_ref().map(Vec::len), Some(1));
        }
    }

    #[test]
    fn test_long_interval_flushes_once_at_end() {
        let (sink, calls) = recording_sink();
        let (mut unit, tx) = writer(0, 1, 1, Some(sink));
        unit.write_interval = Duration::from_secs(60);
        for i in 0..4 {
            tx.send(chunk(vec![i])).unwrap();
        }
        tx.send(StageMessage::EndOfStream).unwrap();
        unit.run();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let words: Vec<u32> = calls[0][0]
            .as_ref()
            .unwrap()
            .iter()
            .flat_map(|c| c.data.as_words().unwrap().to_vec())
            .collect();
        assert_eq!(words, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_waits_for_every_producer() {
        let (sink, calls) = recording_sink();
        let (mut unit, tx) = writer(0, 1, 2, Some(sink));
        unit.write_interval = Duration::from_secs(60);
        tx.send(chunk(vec![1])).unwrap();
        tx.send(StageMessage::EndOfStream).unwrap();
        tx.send(chunk(vec![2])).unwrap();
        tx.send(StageMessage::EndOfStream).unwrap();
        unit.run();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][0].as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn test_empty_chunk_still_delivered() {
        let (sink, calls) = recording_sink();
        let (unit, tx) = writer(0, 1, 1, Some(sink));
        tx.send(chunk(Vec::new())).unwrap();
        tx.send(StageMessage::EndOfStream).unwrap();
        unit.run();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0][0].as_ref().unwrap()[0].is_empty());
    }

    #[test]
    fn test_fill_buffer_keeps_chunks() {
        let (unit, tx) = {
            let (mut unit, tx) = writer(0, 1, 1, None);
            unit.fill_buffer = true;
            (unit, tx)
        };
        tx.send(chunk(vec![5])).unwrap();
        tx.send(chunk(vec![6])).unwrap();
        drop(tx);
        let output = unit.run();
        assert_eq!(output.buffer.len(), 2);
        assert_eq!(output.buffer[1].data, ChunkData::Words(vec![6]));
    }

    #[test]
    fn test_sink_error_without_err_sink_ends_writer() {
        let sink: DataSink = Arc::new(|_: &[Option<Vec<ConvertedChunk>>]| {
            Err(anyhow::anyhow!("disk full"))
        });
        let (unit, tx) = writer(0, 1, 1, Some(sink));
        tx.send(chunk(vec![1])).unwrap();
        let output = unit.run();
        let err = output.result.unwrap_err();
        assert!(matches!(err.root(), ReadoutError::Sink(msg) if msg.contains("disk full")));
    }

    #[test]
    fn test_sink_error_with_err_sink_retries() {
        let attempts = Arc::new(Mutex::new(0));
        let attempts_clone = attempts.clone();
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let delivered_clone = delivered.clone();
        let sink: DataSink = Arc::new(move |batch: &[Option<Vec<ConvertedChunk>>]| {
            let mut attempts = attempts_clone.lock().unwrap();
            *attempts += 1;
            if *attempts == 1 {
                anyhow::bail!("transient");
            }
            delivered_clone
                .lock()
                .unwrap()
                .extend(batch[0].clone().unwrap_or_default());
            Ok(())
        });

        let errors = Arc::new(Mutex::new(Vec::new()));
        let errors_clone = errors.clone();
        let (mut unit, tx) = writer(0, 1, 1, Some(sink));
        unit.err_sink = Some(Arc::new(move |e| errors_clone.lock().unwrap().push(e)));
        tx.send(chunk(vec![1])).unwrap();
        tx.send(chunk(vec![2])).unwrap();
        tx.send(StageMessage::EndOfStream).unwrap();

        assert!(unit.run().result.is_ok());
        assert_eq!(errors.lock().unwrap().len(), 1);
        // Nothing lost: the failed batch went out with the next one
        assert_eq!(delivered.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_monitor_without_classifier() {
        let start = Instant::now();
        let mut monitor = NoDataMonitor::new("pipeline 0", Duration::from_secs(1), None, 0, start);
        assert!(monitor.check(start + Duration::from_millis(500)).is_none());

        monitor.observe(&ChunkData::Words(Vec::new()), start + Duration::from_millis(900));
        let err = monitor.check(start + Duration::from_millis(1100)).unwrap();
        assert!(matches!(&err, ReadoutError::NoDataTimeout { origin, .. } if origin == "pipeline 0"));
        // Fires once
        assert!(monitor.check(start + Duration::from_secs(5)).is_none());
    }

    #[test]
    fn test_monitor_data_keeps_it_quiet() {
        let start = Instant::now();
        let mut monitor = NoDataMonitor::new("pipeline 0", Duration::from_secs(1), None, 0, start);
        for ms in (0..3000).step_by(500) {
            let now = start + Duration::from_millis(ms);
            monitor.observe(&ChunkData::Words(vec![1]), now);
            assert!(monitor.check(now).is_none());
        }
    }

    #[test]
    fn test_monitor_per_source() {
        let start = Instant::now();
        let classifier: ClassifierFn = Arc::new(|data: &ChunkData| {
            data.as_words().map(|w| w.to_vec()).unwrap_or_default()
        });
        let mut monitor = NoDataMonitor::new(
            "pipeline 0",
            Duration::from_secs(1),
            Some(classifier),
            2,
            start,
        );

        // Only source 1 shows up: aggregate never advances
        for ms in [200, 600, 1000] {
            monitor.observe(&ChunkData::Words(vec![1]), start + Duration::from_millis(ms));
        }
        let err = monitor.check(start + Duration::from_millis(1200)).unwrap();
        assert!(matches!(&err, ReadoutError::NoDataTimeout { origin, .. } if origin == "1 source(s) of pipeline 0"));
    }

    #[test]
    fn test_monitor_stale_source() {
        let start = Instant::now();
        let classifier: ClassifierFn = Arc::new(|data: &ChunkData| {
            data.as_words().map(|w| w.to_vec()).unwrap_or_default()
        });
        let mut monitor = NoDataMonitor::new(
            "pipeline 0",
            Duration::from_secs(1),
            Some(classifier),
            2,
            start,
        );
        monitor.observe(&ChunkData::Words(vec![1, 2]), start);
        monitor.observe(&ChunkData::Words(vec![1]), start + Duration::from_millis(800));
        let err = monitor.check(start + Duration::from_millis(1100)).unwrap();
        assert!(matches!(&err, ReadoutError::NoDataTimeout { origin, .. } if origin == "source 2 of pipeline 0"));
    }
}
