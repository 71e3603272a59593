//! Readout engine controller
//!
//! [`FifoReadout`] owns the lifecycle of a run: it validates the start
//! options, allocates the queues, spawns the units and tears everything down
//! again on [`FifoReadout::stop`].
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──start()──► Running ──stop()──► Stopping ──► Idle
//! ```
//!
//! `start` while running and `stop` while idle are rejected with a
//! [`ReadoutError::Lifecycle`] error and change nothing.
//!
//! # Shutdown
//!
//! `stop(timeout)` disables the receiver channels, sets the global stop
//! signal and waits until every reader has drained its FIFO, sharing one
//! deadline between all readers. A reader still running at the deadline is
//! force-stopped and reported with [`ReadoutError::StopTimeout`]; if it does
//! not react within one readout interval (e.g. it is blocked in the source),
//! it is detached and its worker is ended by the controller. Workers,
//! writers and the watchdog are then joined; each of them is guaranteed an
//! end-of-stream, so `stop` returns within `timeout` plus one readout
//! interval.
//!
//! `stop` may be called from the error callback. The unit running the
//! callback is detached rather than joined.

use super::reader::ReaderUnit;
use super::watchdog::WatchdogUnit;
use super::worker::{Route, WorkerUnit};
use super::writer::{NoDataMonitor, WriterOutput, WriterUnit};
use super::{report_error, spawn_unit, FifoSource, RateWindow, SharedRateWindow, Signal};
use super::StageMessage;
use crate::config::{ErrorSink, ReadoutConfig, StartOptions};
use crate::error::{ReadoutError, Result, ResultExt};
use crate::pipeline::{concat_words, convert_words, default_pipelines, validate_pipelines};
use crate::pipeline::{ConverterFn, FilterFn, PipelineSpec};
use crate::types::{float_time, ChunkData, ConvertedChunk, EngineState, EngineStatus};
use crate::types::{FifoStatus, PipelineStatus, RawChunk};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Whether `handle` is the thread we are running on, i.e. stop() was called
/// from a unit's error callback
fn on_current_thread<T>(handle: &JoinHandle<T>) -> bool {
    handle.thread().id() == thread::current().id()
}

/// A spawned reader and the channel that disconnects when it exits
struct ReaderHandle {
    handle: JoinHandle<Result<()>>,
    done: Receiver<()>,
}

/// Controller-side handles of one FIFO
struct FifoHandles {
    name: String,
    raw_tx: Sender<StageMessage<RawChunk>>,
    force_stop: Signal,
    reader: Option<ReaderHandle>,
}

/// Everything a running engine has to join on stop
struct ActiveRun {
    fifos: Vec<FifoHandles>,
    workers: Vec<(String, JoinHandle<()>)>,
    writers: Vec<(usize, JoinHandle<WriterOutput>)>,
    watchdog: Option<JoinHandle<()>>,
    stop: Signal,
    enabled_channels: Vec<String>,
    err_sink: Option<ErrorSink>,
}

/// Read-only view used by `status()` and friends
struct RunMonitor {
    fifos: Vec<FifoMonitor>,
    pipelines: Vec<PipelineMonitor>,
}

struct FifoMonitor {
    name: String,
    queue: Receiver<StageMessage<RawChunk>>,
    force_stop: Signal,
}

struct PipelineMonitor {
    queue: Receiver<StageMessage<ConvertedChunk>>,
    rate: SharedRateWindow,
}

/// Queue ends handed to the units at spawn time
struct Wiring {
    raw_rxs: Vec<Receiver<StageMessage<RawChunk>>>,
    converted: Vec<(
        Sender<StageMessage<ConvertedChunk>>,
        Receiver<StageMessage<ConvertedChunk>>,
        SharedRateWindow,
    )>,
}

/// Concurrent readout engine for a set of hardware FIFOs
///
/// # Example
///
/// ```ignore
/// let readout = FifoReadout::new(source, ReadoutConfig::default());
/// readout.start(
///     ["SITCP_FIFO"],
///     StartOptions::new()
///         .with_sink(|batches| write_raw_data(batches))
///         .with_err_sink(|err| tracing::error!("{}", err)),
/// )?;
/// std::thread::sleep(Duration::from_secs(60));
/// readout.stop(readout.config().stop_timeout())?;
/// ```
pub struct FifoReadout {
    source: Arc<dyn FifoSource>,
    config: ReadoutConfig,
    state: Mutex<EngineState>,
    run: Mutex<Option<ActiveRun>>,
    monitor: Mutex<Option<Arc<RunMonitor>>>,
    buffers: Mutex<Vec<Vec<ConvertedChunk>>>,
    force_stopped: Mutex<Vec<String>>,
}

/// Puts the engine back to idle when a stop ends, also when it unwinds
struct IdleOnDrop<'a>(&'a FifoReadout);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        *lock(&self.0.monitor) = None;
        *lock(&self.0.state) = EngineState::Idle;
    }
}

impl FifoReadout {
    /// Create an idle engine on top of a hardware source
    pub fn new(source: Arc<dyn FifoSource>, config: ReadoutConfig) -> Self {
        Self {
            source,
            config,
            state: Mutex::new(EngineState::Idle),
            run: Mutex::new(None),
            monitor: Mutex::new(None),
            buffers: Mutex::new(Vec::new()),
            force_stopped: Mutex::new(Vec::new()),
        }
    }

    /// Engine configuration
    pub fn config(&self) -> &ReadoutConfig {
        &self.config
    }

    /// Hardware source
    pub fn source(&self) -> &Arc<dyn FifoSource> {
        &self.source
    }

    /// Current lifecycle state
    pub fn state(&self) -> EngineState {
        *lock(&self.state)
    }

    /// Whether a run is active
    pub fn is_running(&self) -> bool {
        self.state() == EngineState::Running
    }

    /// Start a run reading out `fifos`.
    ///
    /// Configuration errors are detected before anything is spawned. If
    /// spawning or enabling the receiver channels fails, whatever was already
    /// spawned is torn down again and the engine stays idle.
    pub fn start<I, S>(&self, fifos: I, options: StartOptions) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut run_slot = lock(&self.run);
        match self.state() {
            EngineState::Idle if run_slot.is_none() => {}
            EngineState::Stopping => {
                return Err(ReadoutError::Lifecycle(
                    "FIFO readout threads still stopping".to_string(),
                ))
            }
            _ => {
                return Err(ReadoutError::Lifecycle(
                    "FIFO readout threads already started: use stop()".to_string(),
                ))
            }
        }
        self.config.validate()?;

        let fifos: Vec<String> = fifos.into_iter().map(Into::into).collect();
        let pipelines = options
            .pipelines
            .clone()
            .unwrap_or_else(|| default_pipelines(&fifos));
        validate_pipelines(&fifos, &pipelines)?;

        let enabled_channels = options
            .enabled_channels
            .clone()
            .unwrap_or_else(|| self.source.channels());

        if options.reset_channels {
            self.reset_channels(&enabled_channels)?;
        }
        for fifo in &fifos {
            if options.reset_fifos {
                self.reset_fifo(fifo)?;
            }
            match self.source.size(fifo) {
                Ok(0) => {}
                Ok(size) => tracing::warn!("{} contains data: FIFO_SIZE = {}", fifo, size),
                Err(e) => tracing::warn!("Failed to query size of {}: {}", fifo, e),
            }
        }
        lock(&self.buffers).clear();
        lock(&self.force_stopped).clear();

        let (mut run, wiring, monitor) =
            self.allocate(&fifos, &pipelines, enabled_channels, &options);
        let spawned = self
            .spawn_units(&mut run, wiring, &pipelines, &options)
            .and_then(|()| {
                self.source
                    .enable_channels(&run.enabled_channels)
                    .context("Failed to enable receiver channels")
            });
        if let Err(err) = spawned {
            tracing::error!("Failed to start FIFO readout: {}", err);
            self.shutdown(run, Duration::ZERO);
            return Err(err);
        }

        tracing::info!(
            "Started FIFO readout: {} FIFO(s), {} pipeline(s), {} channel(s) enabled",
            fifos.len(),
            pipelines.len(),
            run.enabled_channels.len()
        );
        *lock(&self.monitor) = Some(monitor);
        *run_slot = Some(run);
        *lock(&self.state) = EngineState::Running;
        Ok(())
    }

    /// Stop the run, waiting at most `timeout` for the readers to drain.
    ///
    /// Readers that miss the deadline are force-stopped and reported through
    /// the error callback (or the log) as [`ReadoutError::StopTimeout`]; the
    /// call itself still succeeds.
    ///
    /// May be called from the error callback. The unit the callback runs on
    /// is then detached instead of joined.
    pub fn stop(&self, timeout: Duration) -> Result<()> {
        let run = {
            let mut run_slot = lock(&self.run);
            let Some(run) = run_slot.take() else {
                return Err(ReadoutError::Lifecycle(
                    "FIFO readout threads not running: use start()".to_string(),
                ));
            };
            *lock(&self.state) = EngineState::Stopping;
            run
        };

        let _idle = IdleOnDrop(self);
        tracing::info!("Stopping FIFO readout (timeout {:.1}s)", timeout.as_secs_f64());
        self.shutdown(run, timeout);
        tracing::info!("Stopped FIFO readout");
        Ok(())
    }

    /// Snapshot of the engine; never blocks on a running stop()
    pub fn status(&self) -> EngineStatus {
        let state = self.state();
        let Some(monitor) = lock(&self.monitor).clone() else {
            return EngineStatus {
                running: false,
                state,
                ..EngineStatus::default()
            };
        };

        let fifos = monitor
            .fifos
            .iter()
            .map(|fifo| FifoStatus {
                name: fifo.name.clone(),
                hardware_size: self.source.size(&fifo.name).ok(),
                queue_size: fifo.queue.len(),
                force_stopped: fifo.force_stop.is_set(),
            })
            .collect();
        let pipelines = monitor
            .pipelines
            .iter()
            .enumerate()
            .map(|(index, pipeline)| PipelineStatus {
                index,
                queue_size: pipeline.queue.len(),
                words_per_second: pipeline.rate.throughput(),
            })
            .collect();

        EngineStatus {
            running: state == EngineState::Running,
            state,
            fifos,
            pipelines,
        }
    }

    /// FIFOs whose readers had to be force-stopped during the last stop
    pub fn force_stopped_fifos(&self) -> Vec<String> {
        lock(&self.force_stopped).clone()
    }

    /// Per-pipeline throughput in words per second (empty when idle)
    pub fn words_per_second(&self) -> Vec<f64> {
        lock(&self.monitor)
            .as_ref()
            .map(|m| m.pipelines.iter().map(|p| p.rate.throughput()).collect())
            .unwrap_or_default()
    }

    /// Converted chunks of the last run, one list per pipeline.
    ///
    /// Only filled when the data buffer is enabled in the config; not
    /// available while a run is active.
    pub fn data_from_buffer(&self) -> Result<Vec<Vec<ConvertedChunk>>> {
        self.ensure_idle("Data buffer")?;
        if !self.config.fill_buffer {
            tracing::warn!("Data buffer is not enabled, buffer is empty");
        }
        Ok(lock(&self.buffers).clone())
    }

    /// Words of the last run concatenated per pipeline, then filtered and converted
    pub fn raw_data_from_buffer(
        &self,
        filter: Option<&FilterFn>,
        converter: Option<&ConverterFn>,
    ) -> Result<Vec<ChunkData>> {
        Ok(self
            .data_from_buffer()?
            .iter()
            .map(|chunks| convert_words(&concat_words(chunks), filter, converter))
            .collect())
    }

    /// Reset a FIFO, warning if it is not empty afterwards
    pub fn reset_fifo(&self, fifo: &str) -> Result<()> {
        let size = self.source.size(fifo)?;
        if size != 0 {
            tracing::info!("{} contains data: FIFO_SIZE = {}, resetting", fifo, size);
        }
        self.source
            .reset_fifo(fifo)
            .with_context(|| format!("Failed to reset {}", fifo))?;
        match self.source.size(fifo)? {
            0 => Ok(()),
            size => {
                tracing::warn!("{} not empty after reset: FIFO_SIZE = {}", fifo, size);
                Ok(())
            }
        }
    }

    /// Reset receiver channels
    pub fn reset_channels(&self, channels: &[String]) -> Result<()> {
        tracing::debug!("Resetting {} receiver channel(s)", channels.len());
        self.source
            .reset_channels(channels)
            .context("Failed to reset receiver channels")
    }

    /// Log a FIFO and receiver status table
    pub fn log_readout_status(&self) {
        self.log_fifo_status();
        self.log_channel_status();
    }

    fn log_fifo_status(&self) {
        let status = self.status();
        if status.fifos.is_empty() {
            tracing::info!("FIFO readout not running");
            return;
        }
        let names: Vec<&str> = status.fifos.iter().map(|f| f.name.as_str()).collect();
        let sizes: Vec<String> = status
            .fifos
            .iter()
            .map(|f| f.hardware_size.map_or_else(|| "?".to_string(), |s| s.to_string()))
            .collect();
        let queues: Vec<String> = status.fifos.iter().map(|f| f.queue_size.to_string()).collect();
        let widths: Vec<usize> = names
            .iter()
            .zip(&sizes)
            .zip(&queues)
            .map(|((n, s), q)| n.len().max(s.len()).max(q.len()))
            .collect();

        tracing::info!("FIFO:            {}", table_row(&names, &widths));
        tracing::info!("FIFO size:       {}", table_row(&sizes, &widths));
        tracing::info!("Raw queue size:  {}", table_row(&queues, &widths));
        let rates: Vec<String> = status
            .pipelines
            .iter()
            .map(|p| format!("{:.0}", p.words_per_second))
            .collect();
        tracing::info!("Words/s per pipeline: {}", rates.join(" | "));
    }

    fn log_channel_status(&self) {
        let channels = self.source.channels();
        if channels.is_empty() {
            return;
        }
        let enabled: Vec<String> = channels
            .iter()
            .map(|c| match self.source.is_channel_enabled(c) {
                Ok(true) => "1".to_string(),
                Ok(false) => "0".to_string(),
                Err(_) => "?".to_string(),
            })
            .collect();
        let counts: Vec<String> = match self.source.error_counts(&channels) {
            Ok(counts) => counts.iter().map(u32::to_string).collect(),
            Err(e) => {
                tracing::warn!("Failed to read receiver error counters: {}", e);
                vec!["?".to_string(); channels.len()]
            }
        };
        let widths: Vec<usize> = channels
            .iter()
            .zip(&counts)
            .map(|(c, n)| c.len().max(n.len()))
            .collect();

        tracing::info!("Channel:         {}", table_row(&channels, &widths));
        tracing::info!("Enabled:         {}", table_row(&enabled, &widths));
        tracing::info!("Discard counter: {}", table_row(&counts, &widths));
        if counts.iter().any(|c| c != "0" && c != "?") {
            tracing::warn!("Receiver discard counter(s) non-zero");
        }
    }

    fn ensure_idle(&self, what: &str) -> Result<()> {
        match self.state() {
            EngineState::Idle => Ok(()),
            state => Err(ReadoutError::Lifecycle(format!(
                "{} not available while {}",
                what, state
            ))),
        }
    }

    /// Create every queue and signal of a run
    fn allocate(
        &self,
        fifos: &[String],
        pipelines: &[PipelineSpec],
        enabled_channels: Vec<String>,
        options: &StartOptions,
    ) -> (ActiveRun, Wiring, Arc<RunMonitor>) {
        let now = float_time();
        let mut fifo_handles = Vec::with_capacity(fifos.len());
        let mut fifo_monitors = Vec::with_capacity(fifos.len());
        let mut raw_rxs = Vec::with_capacity(fifos.len());
        for name in fifos {
            let (raw_tx, raw_rx) = unbounded();
            let force_stop = Signal::new();
            fifo_monitors.push(FifoMonitor {
                name: name.clone(),
                queue: raw_rx.clone(),
                force_stop: force_stop.clone(),
            });
            fifo_handles.push(FifoHandles {
                name: name.clone(),
                raw_tx,
                force_stop,
                reader: None,
            });
            raw_rxs.push(raw_rx);
        }

        let mut converted = Vec::with_capacity(pipelines.len());
        let mut pipeline_monitors = Vec::with_capacity(pipelines.len());
        for spec in pipelines {
            let (tx, rx) = unbounded();
            // One sample per poll of every FIFO feeding the pipeline
            let producers = fifos.iter().filter(|f| spec.select().matches(f)).count();
            let rate = SharedRateWindow::new(RateWindow::new(
                self.config.rate_window_len() * producers.max(1),
                self.config.rate_window_secs,
                now,
            ));
            pipeline_monitors.push(PipelineMonitor {
                queue: rx.clone(),
                rate: rate.clone(),
            });
            converted.push((tx, rx, rate));
        }

        let run = ActiveRun {
            fifos: fifo_handles,
            workers: Vec::new(),
            writers: Vec::new(),
            watchdog: None,
            stop: Signal::new(),
            enabled_channels,
            err_sink: options.err_sink.clone(),
        };
        let wiring = Wiring { raw_rxs, converted };
        let monitor = Arc::new(RunMonitor {
            fifos: fifo_monitors,
            pipelines: pipeline_monitors,
        });
        (run, wiring, monitor)
    }

    /// Spawn watchdog, writers, workers and readers, in that order
    fn spawn_units(
        &self,
        run: &mut ActiveRun,
        wiring: Wiring,
        pipelines: &[PipelineSpec],
        options: &StartOptions,
    ) -> Result<()> {
        let interval = self.config.readout_interval();
        let Wiring { raw_rxs, converted } = wiring;

        if let Some(err_sink) = &options.err_sink {
            let unit = WatchdogUnit {
                source: self.source.clone(),
                channels: run.enabled_channels.clone(),
                stop: run.stop.clone(),
                err_sink: err_sink.clone(),
                interval: self.config.watchdog_interval(),
            };
            run.watchdog = Some(spawn_unit("watchdog".to_string(), move || unit.run())?);
        }

        let now = Instant::now();
        for (index, (spec, (_, rx, _))) in pipelines.iter().zip(&converted).enumerate() {
            let producers = run
                .fifos
                .iter()
                .filter(|f| spec.select().matches(&f.name))
                .count();
            let no_data = options.no_data_timeout.map(|timeout| {
                NoDataMonitor::new(
                    format!("pipeline {}", index),
                    timeout,
                    options.classifier.clone(),
                    run.enabled_channels.len(),
                    now,
                )
            });
            let unit = WriterUnit {
                index,
                n_pipelines: pipelines.len(),
                rx: rx.clone(),
                producers,
                sink: options.sink.clone(),
                err_sink: options.err_sink.clone(),
                write_interval: self.config.write_interval(),
                wait: interval,
                no_data,
                fill_buffer: self.config.fill_buffer,
            };
            let handle = spawn_unit(format!("writer-{}", index), move || unit.run())?;
            run.writers.push((index, handle));
        }

        for (fifo, raw_rx) in run.fifos.iter().zip(raw_rxs) {
            let routes = pipelines
                .iter()
                .zip(&converted)
                .enumerate()
                .filter(|(_, (spec, _))| spec.select().matches(&fifo.name))
                .map(|(index, (spec, (tx, _, rate)))| Route {
                    index,
                    spec: spec.clone(),
                    tx: tx.clone(),
                    rate: rate.clone(),
                })
                .collect();
            let unit = WorkerUnit {
                fifo: fifo.name.clone(),
                rx: raw_rx,
                routes,
                wait: interval,
            };
            let handle = spawn_unit(format!("worker-{}", fifo.name), move || unit.run())?;
            run.workers.push((fifo.name.clone(), handle));
        }
        // Writers see a disconnect once every worker is gone
        drop(converted);

        for fifo in &mut run.fifos {
            let (done_tx, done_rx) = unbounded::<()>();
            let unit = ReaderUnit {
                fifo: fifo.name.clone(),
                source: self.source.clone(),
                tx: fifo.raw_tx.clone(),
                stop: run.stop.clone(),
                force_stop: fifo.force_stop.clone(),
                err_sink: options.err_sink.clone(),
                interval,
                empty_reads: self.config.empty_reads,
                no_data_timeout: options.no_data_timeout,
                last_timestamp: float_time(),
            };
            let handle = spawn_unit(format!("reader-{}", fifo.name), move || {
                let _done = done_tx;
                unit.run()
            })?;
            fifo.reader = Some(ReaderHandle {
                handle,
                done: done_rx,
            });
        }
        Ok(())
    }

    /// Stop and join every unit of a run
    fn shutdown(&self, mut run: ActiveRun, timeout: Duration) {
        let err_sink = run.err_sink.clone();

        if let Err(err) = self.source.disable_channels(&run.enabled_channels) {
            report_error(
                err_sink.as_ref(),
                err.with_context("Failed to disable receiver channels"),
            );
        }
        run.stop.set();

        // Phase 1: graceful drain, one deadline for every reader
        let deadline = Instant::now() + timeout;
        let mut overdue = Vec::new();
        for (i, fifo) in run.fifos.iter_mut().enumerate() {
            let Some(reader) = fifo.reader.take() else {
                let _ = fifo.raw_tx.send(StageMessage::EndOfStream);
                continue;
            };
            if on_current_thread(&reader.handle) {
                tracing::debug!("Stop called from readout thread for {}, detaching", fifo.name);
                fifo.force_stop.set();
                lock(&self.force_stopped).push(fifo.name.clone());
                let _ = fifo.raw_tx.send(StageMessage::EndOfStream);
                continue;
            }
            match reader.done.recv_deadline(deadline) {
                Err(RecvTimeoutError::Disconnected) => {
                    Self::join_reader(fifo, reader.handle, err_sink.as_ref());
                }
                Ok(()) | Err(RecvTimeoutError::Timeout) => {
                    fifo.force_stop.set();
                    lock(&self.force_stopped).push(fifo.name.clone());
                    report_error(
                        err_sink.as_ref(),
                        ReadoutError::StopTimeout {
                            fifo: fifo.name.clone(),
                            timeout_secs: timeout.as_secs_f64(),
                        },
                    );
                    overdue.push((i, reader));
                }
            }
        }

        // Phase 2: force-stopped readers get one readout interval to react
        let grace = Instant::now() + self.config.readout_interval();
        for (i, reader) in overdue {
            let fifo = &run.fifos[i];
            match reader.done.recv_deadline(grace) {
                Err(RecvTimeoutError::Disconnected) => {
                    Self::join_reader(fifo, reader.handle, err_sink.as_ref());
                }
                Ok(()) | Err(RecvTimeoutError::Timeout) => {
                    tracing::warn!("Readout thread for {} did not terminate, detaching", fifo.name);
                    let _ = fifo.raw_tx.send(StageMessage::EndOfStream);
                }
            }
        }

        for (name, handle) in run.workers.drain(..) {
            if on_current_thread(&handle) {
                continue;
            }
            if handle.join().is_err() {
                report_error(
                    err_sink.as_ref(),
                    ReadoutError::UnitPanic {
                        unit: format!("worker-{}", name),
                    },
                );
            }
        }

        let mut buffers = vec![Vec::new(); run.writers.len()];
        for (index, handle) in run.writers.drain(..) {
            if on_current_thread(&handle) {
                tracing::debug!("Stop called from writer thread {}, detaching", index);
                continue;
            }
            match handle.join() {
                Ok(WriterOutput { buffer, result }) => {
                    buffers[index] = buffer;
                    if let Err(err) = result {
                        report_error(err_sink.as_ref(), err);
                    }
                }
                Err(_) => report_error(
                    err_sink.as_ref(),
                    ReadoutError::UnitPanic {
                        unit: format!("writer-{}", index),
                    },
                ),
            }
        }
        *lock(&self.buffers) = buffers;

        if let Some(handle) = run.watchdog.take().filter(|h| !on_current_thread(h)) {
            if handle.join().is_err() {
                report_error(
                    err_sink.as_ref(),
                    ReadoutError::UnitPanic {
                        unit: "watchdog".to_string(),
                    },
                );
            }
        }
    }

    /// Join a finished reader; a reader that ended on an error gets its
    /// end-of-stream from here
    fn join_reader(
        fifo: &FifoHandles,
        handle: JoinHandle<Result<()>>,
        err_sink: Option<&ErrorSink>,
    ) {
        let failure = match handle.join() {
            Ok(Ok(())) => return,
            Ok(Err(err)) => err.with_context(format!("Readout thread for {} failed", fifo.name)),
            Err(_) => ReadoutError::UnitPanic {
                unit: format!("reader-{}", fifo.name),
            },
        };
        report_error(err_sink, failure);
        let _ = fifo.raw_tx.send(StageMessage::EndOfStream);
    }
}

impl Drop for FifoReadout {
    fn drop(&mut self) {
        if lock(&self.run).is_some() {
            tracing::warn!("FIFO readout dropped while running, stopping");
            let _ = self.stop(Duration::ZERO);
        }
    }
}

fn table_row<S: AsRef<str>>(cells: &[S], widths: &[usize]) -> String {
    cells
        .iter()
        .zip(widths)
        .map(|(cell, &width)| format!("{:>width$}", cell.as_ref(), width = width))
        .collect::<Vec<_>>()
        .join(" | ")
}
