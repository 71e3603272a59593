//! Reader unit: polls one hardware FIFO
//!
//! The reader polls its FIFO at the readout interval and forwards every
//! non-empty read as a [`RawChunk`] to the FIFO's worker.
//!
//! # Termination
//!
//! - **Graceful**: once the global stop signal is set, the reader keeps
//!   polling until it sees `empty_reads` consecutive empty reads, so data
//!   still in flight after the channels are disabled is drained.
//! - **Forced**: the per-FIFO force-stop signal ends the loop at the next
//!   wait.
//!
//! Both paths push [`StageMessage::EndOfStream`]. A reader that exits with an
//! error does not; the controller pushes it on its behalf.
//!
//! # Timestamps
//!
//! Chunks tile time: `t_start` of a chunk is the `t_stop` of the previous
//! non-empty read (the run start for the first one).

use super::{forward_error, Signal, StageMessage};
use crate::backend::FifoSource;
use crate::config::ErrorSink;
use crate::error::{ReadoutError, Result};
use crate::types::{float_time, RawChunk};
use crossbeam_channel::Sender;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// State of one reader thread
pub(crate) struct ReaderUnit {
    pub fifo: String,
    pub source: Arc<dyn FifoSource>,
    pub tx: Sender<StageMessage<RawChunk>>,
    pub stop: Signal,
    pub force_stop: Signal,
    pub err_sink: Option<ErrorSink>,
    pub interval: Duration,
    pub empty_reads: u32,
    pub no_data_timeout: Option<Duration>,
    pub last_timestamp: f64,
}

impl ReaderUnit {
    /// Run the poll loop until stopped
    pub fn run(mut self) -> Result<()> {
        tracing::info!("Starting readout thread for {}", self.fifo);
        self.poll_loop()?;
        let _ = self.tx.send(StageMessage::EndOfStream);
        tracing::info!("Stopped readout thread for {}", self.fifo);
        Ok(())
    }

    fn poll_loop(&mut self) -> Result<()> {
        let mut time_wait = Duration::ZERO;
        let mut empty_reads = 0u32;
        let mut last_data = Instant::now();
        let mut no_data_timeout = self.no_data_timeout;

        while !self.force_stop.wait_timeout(time_wait) {
            let time_read = Instant::now();
            match self.poll_once(no_data_timeout, last_data) {
                Ok(words) if !words.is_empty() => {
                    last_data = Instant::now();
                    empty_reads = 0;
                    let chunk = self.stamp(words);
                    if self.tx.send(StageMessage::Chunk(chunk)).is_err() {
                        tracing::warn!("Worker for {} is gone, stopping readout", self.fifo);
                        return Ok(());
                    }
                }
                Ok(_) => {
                    if self.stop.is_set() {
                        empty_reads += 1;
                        if empty_reads >= self.empty_reads {
                            break;
                        }
                    }
                }
                Err(err) if err.is_no_data_timeout() => {
                    // Fires once per run
                    no_data_timeout = None;
                    forward_error(self.err_sink.as_ref(), err)?;
                }
                Err(err) => {
                    let err = err.with_context(format!("Failed to read {}", self.fifo));
                    forward_error(self.err_sink.as_ref(), err)?;
                    if self.stop.is_set() {
                        break;
                    }
                }
            }
            time_wait = self.interval.saturating_sub(time_read.elapsed());
        }
        Ok(())
    }

    fn poll_once(&self, no_data_timeout: Option<Duration>, last_data: Instant) -> Result<Vec<u32>> {
        if let Some(timeout) = no_data_timeout {
            if last_data.elapsed() > timeout {
                return Err(ReadoutError::NoDataTimeout {
                    origin: format!("FIFO '{}'", self.fifo),
                    timeout_secs: timeout.as_secs_f64(),
                });
            }
        }
        self.source.read(&self.fifo)
    }

    fn stamp(&mut self, words: Vec<u32>) -> RawChunk {
        let t_start = self.last_timestamp;
        let t_stop = float_time();
        self.last_timestamp = t_stop;
        RawChunk::new(words, t_start, t_stop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::source::MockFifoSource;
    use crossbeam_channel::{unbounded, Receiver};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn reader(source: MockFifoSource) -> (ReaderUnit, Receiver<StageMessage<RawChunk>>) {
        let (tx, rx) = unbounded();
        let unit = ReaderUnit {
            fifo: "FIFO_A".to_string(),
            source: Arc::new(source),
            tx,
            stop: Signal::new(),
            force_stop: Signal::new(),
            err_sink: None,
            interval: Duration::from_millis(1),
            empty_reads: 3,
            no_data_timeout: None,
            last_timestamp: float_time(),
        };
        (unit, rx)
    }

    fn drain(rx: &Receiver<StageMessage<RawChunk>>) -> Vec<StageMessage<RawChunk>> {
        rx.try_iter().collect()
    }

    #[test]
    fn test_drains_then_exits_after_empty_reads() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let mut source = MockFifoSource::new();
        source.expect_read().returning(move |_| {
            let n = calls_clone.fetch_add(1, Ordering::SeqCst);
            Ok(if n < 2 { vec![n as u32; 4] } else { Vec::new() })
        });

        let (unit, rx) = reader(source);
        unit.stop.set();
        unit.run().unwrap();

        let messages = drain(&rx);
        assert_eq!(messages.len(), 3);
        assert!(matches!(&messages[0], StageMessage::Chunk(c) if c.words == vec![0; 4]));
        assert!(matches!(&messages[1], StageMessage::Chunk(c) if c.words == vec![1; 4]));
        assert_eq!(messages[2], StageMessage::EndOfStream);
        // 2 data reads + 3 empty reads
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_timestamps_tile() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let mut source = MockFifoSource::new();
        source.expect_read().returning(move |_| {
            let n = calls_clone.fetch_add(1, Ordering::SeqCst);
            Ok(if n < 3 { vec![1] } else { Vec::new() })
        });

        let (unit, rx) = reader(source);
        let t0 = unit.last_timestamp;
        unit.stop.set();
        unit.run().unwrap();

        let chunks: Vec<RawChunk> = drain(&rx)
            .into_iter()
            .filter_map(|m| match m {
                StageMessage::Chunk(c) => Some(c),
                StageMessage::EndOfStream => None,
            })
            .collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].t_start, t0);
        for pair in chunks.windows(2) {
            assert_eq!(pair[1].t_start, pair[0].t_stop);
            assert!(pair[0].t_stop >= pair[0].t_start);
        }
    }

    #[test]
    fn test_force_stop_ends_loop() {
        let mut source = MockFifoSource::new();
        source.expect_read().returning(|_| Ok(Vec::new()));

        let (unit, rx) = reader(source);
        unit.force_stop.set();
        unit.run().unwrap();
        assert_eq!(drain(&rx), vec![StageMessage::EndOfStream]);
    }

    #[test]
    fn test_no_data_timeout_without_err_sink_propagates() {
        let mut source = MockFifoSource::new();
        source.expect_read().returning(|_| Ok(Vec::new()));

        let (mut unit, rx) = reader(source);
        unit.no_data_timeout = Some(Duration::from_millis(5));
        let err = unit.run().unwrap_err();
        assert!(err.is_no_data_timeout());
        // No sentinel on the error path
        assert!(drain(&rx).is_empty());
    }

    #[test]
    fn test_no_data_timeout_reported_once() {
        let mut source = MockFifoSource::new();
        source.expect_read().returning(|_| Ok(Vec::new()));

        let errors = Arc::new(Mutex::new(Vec::new()));
        let errors_clone = errors.clone();
        let (mut unit, _rx) = reader(source);
        unit.no_data_timeout = Some(Duration::from_millis(5));
        unit.err_sink = Some(Arc::new(move |e| errors_clone.lock().unwrap().push(e)));

        let stop = unit.stop.clone();
        let handle = std::thread::spawn(move || unit.run());
        std::thread::sleep(Duration::from_millis(60));
        stop.set();
        handle.join().unwrap().unwrap();

        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].is_no_data_timeout());
    }

    #[test]
    fn test_read_error_routed_and_loop_continues() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let mut source = MockFifoSource::new();
        source.expect_read().returning(move |_| {
            match calls_clone.fetch_add(1, Ordering::SeqCst) {
                0 => Err(ReadoutError::Source("bus timeout".to_string())),
                1 => Ok(vec![42]),
                _ => Ok(Vec::new()),
            }
        });

        let errors = Arc::new(Mutex::new(Vec::new()));
        let errors_clone = errors.clone();
        let (mut unit, rx) = reader(source);
        unit.err_sink = Some(Arc::new(move |e| errors_clone.lock().unwrap().push(e)));

        let stop = unit.stop.clone();
        let handle = std::thread::spawn(move || unit.run());
        std::thread::sleep(Duration::from_millis(30));
        stop.set();
        handle.join().unwrap().unwrap();

        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].root(), &ReadoutError::Source("bus timeout".to_string()));
        let messages = drain(&rx);
        assert!(matches!(&messages[0], StageMessage::Chunk(c) if c.words == vec![42]));
    }

    #[test]
    fn test_read_error_without_err_sink_is_fatal() {
        let mut source = MockFifoSource::new();
        source
            .expect_read()
            .returning(|_| Err(ReadoutError::Source("gone".to_string())));

        let (unit, rx) = reader(source);
        let err = unit.run().unwrap_err();
        assert!(err.to_string().contains("Failed to read FIFO_A"));
        assert!(drain(&rx).is_empty());
    }
}
