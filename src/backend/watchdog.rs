//! Watchdog unit: polls the receivers' error counters
//!
//! Runs only when an error callback is set. Every watchdog interval it reads
//! the discard counters of the enabled channels and reports a
//! [`ReadoutError::Hardware`] while any of them is non-zero.

use super::Signal;
use crate::backend::FifoSource;
use crate::config::ErrorSink;
use crate::error::ReadoutError;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// State of the watchdog thread
pub(crate) struct WatchdogUnit {
    pub source: Arc<dyn FifoSource>,
    pub channels: Vec<String>,
    pub stop: Signal,
    pub err_sink: ErrorSink,
    pub interval: Duration,
}

impl WatchdogUnit {
    /// Poll until the stop signal is set
    pub fn run(self) {
        tracing::debug!("Starting watchdog thread ({} channel(s))", self.channels.len());
        let mut time_wait = Duration::ZERO;
        while !self.stop.wait_timeout(time_wait) {
            let time_check = Instant::now();
            if let Some(err) = self.check() {
                (self.err_sink)(err);
            }
            time_wait = self.interval.saturating_sub(time_check.elapsed());
        }
        tracing::debug!("Stopped watchdog thread");
    }

    fn check(&self) -> Option<ReadoutError> {
        let counts = match self.source.error_counts(&self.channels) {
            Ok(counts) => counts,
            Err(err) => return Some(err.with_context("Failed to read receiver error counters")),
        };
        let failing: Vec<String> = self
            .channels
            .iter()
            .zip(&counts)
            .filter(|(_, count)| **count > 0)
            .map(|(channel, count)| format!("{}={}", channel, count))
            .collect();
        if failing.is_empty() {
            None
        } else {
            Some(ReadoutError::Hardware(format!(
                "Receiver discard error(s) detected: {}",
                failing.join(", ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::source::MockFifoSource;
    use std::sync::Mutex;

    fn watchdog(source: MockFifoSource) -> (WatchdogUnit, Arc<Mutex<Vec<ReadoutError>>>) {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let errors_clone = errors.clone();
        let unit = WatchdogUnit {
            source: Arc::new(source),
            channels: vec!["M26_RX1".to_string(), "M26_RX2".to_string()],
            stop: Signal::new(),
            err_sink: Arc::new(move |e| errors_clone.lock().unwrap().push(e)),
            interval: Duration::from_millis(5),
        };
        (unit, errors)
    }

    #[test]
    fn test_reports_nonzero_counters() {
        let mut source = MockFifoSource::new();
        source
            .expect_error_counts()
            .returning(|channels| Ok(channels.iter().map(|c| u32::from(c.as_str() == "M26_RX2")).collect()));

        let (unit, _errors) = watchdog(source);
        assert_eq!(
            unit.check(),
            Some(ReadoutError::Hardware(
                "Receiver discard error(s) detected: M26_RX2=1".to_string()
            ))
        );
    }

    #[test]
    fn test_quiet_when_counters_zero() {
        let mut source = MockFifoSource::new();
        source
            .expect_error_counts()
            .returning(|channels| Ok(vec![0; channels.len()]));

        let (unit, errors) = watchdog(source);
        let stop = unit.stop.clone();
        let handle = std::thread::spawn(move || unit.run());
        std::thread::sleep(Duration::from_millis(30));
        stop.set();
        handle.join().unwrap();
        assert!(errors.lock().unwrap().is_empty());
    }

    #[test]
    fn test_run_routes_errors_until_stopped() {
        let mut source = MockFifoSource::new();
        source
            .expect_error_counts()
            .returning(|_| Err(ReadoutError::Source("register read failed".to_string())));

        let (unit, errors) = watchdog(source);
        let stop = unit.stop.clone();
        let handle = std::thread::spawn(move || unit.run());
        std::thread::sleep(Duration::from_millis(30));
        stop.set();
        handle.join().unwrap();

        let errors = errors.lock().unwrap();
        assert!(!errors.is_empty());
        assert_eq!(
            errors[0].root(),
            &ReadoutError::Source("register read failed".to_string())
        );
    }
}
