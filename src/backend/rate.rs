//! Moving-average throughput per pipeline.
//!
//! Each pipeline owns a fixed-capacity ring of `(word_count, timestamp)`
//! samples. The ring is seeded with zero-count samples stamped with the run
//! start, so throughput reads 0 right after start.

use crate::types::float_time;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

/// One rate sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateSample {
    /// Words delivered to the pipeline
    pub words: usize,
    /// Read start time (float seconds)
    pub t_start: f64,
    /// Read stop time (float seconds)
    pub t_stop: f64,
}

/// Fixed-capacity ring of rate samples
#[derive(Debug, Clone)]
pub struct RateWindow {
    samples: VecDeque<RateSample>,
    capacity: usize,
    window_secs: f64,
}

impl RateWindow {
    /// Create a window of `capacity` samples seeded at time `now`
    pub fn new(capacity: usize, window_secs: f64, now: f64) -> Self {
        let capacity = capacity.max(1);
        let seed = RateSample {
            words: 0,
            t_start: now,
            t_stop: now,
        };
        Self {
            samples: std::iter::repeat(seed).take(capacity).collect(),
            capacity,
            window_secs,
        }
    }

    /// Record a sample, evicting the oldest one
    pub fn record(&mut self, words: usize, t_start: f64, t_stop: f64) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(RateSample {
            words,
            t_start,
            t_stop,
        });
    }

    /// Throughput in words per second at time `now`
    pub fn throughput_at(&self, now: f64) -> f64 {
        if self.window_secs <= 0.0 {
            return 0.0;
        }
        let cutoff = now - self.window_secs;
        let words: usize = self
            .samples
            .iter()
            .filter(|s| s.t_stop > cutoff)
            .map(|s| s.words)
            .sum();
        words as f64 / self.window_secs
    }

    /// Throughput in words per second now
    pub fn throughput(&self) -> f64 {
        self.throughput_at(float_time())
    }

    /// Maximum number of samples
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Averaging window in seconds
    pub fn window_secs(&self) -> f64 {
        self.window_secs
    }

    /// Most recent sample
    pub fn latest(&self) -> Option<&RateSample> {
        self.samples.back()
    }
}

/// Rate window shared between the workers feeding a pipeline and `status()`
#[derive(Debug, Clone)]
pub struct SharedRateWindow(Arc<Mutex<RateWindow>>);

impl SharedRateWindow {
    /// Wrap a window
    pub fn new(window: RateWindow) -> Self {
        Self(Arc::new(Mutex::new(window)))
    }

    /// Record a sample
    pub fn record(&self, words: usize, t_start: f64, t_stop: f64) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(words, t_start, t_stop);
    }

    /// Throughput in words per second now
    pub fn throughput(&self) -> f64 {
        self.throughput_at(float_time())
    }

    /// Throughput in words per second at time `now`
    pub fn throughput_at(&self, now: f64) -> f64 {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .throughput_at(now)
    }
    /// Maximum number of samples
    pub fn capacity(&self) -> usize {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).capacity()
    }
}
