//! Simulated FIFO source for testing
//!
//! [`SimSource`] implements [`FifoSource`] without hardware. Each FIFO is an
//! in-memory word queue that tests fill explicitly with
//! [`SimSource::push_words`] or that a [`SimPattern`] generator fills at a
//! fixed rate while at least one receiver channel is enabled.
//!
//! # Fault injection
//!
//! - [`SimSource::set_discard_count`] - Non-zero receiver error counters
//! - [`SimSource::fail_reads`] - Make reads of a FIFO fail
//! - [`SimSource::stall`] - Block reads of a FIFO until [`SimSource::release`]
//!
//! # Example
//!
//! ```ignore
//! use fifo_readout::backend::{SimPattern, SimSource};
//!
//! let source = SimSource::new()
//!     .with_fifo("SITCP_FIFO")
//!     .with_channels(["M26_RX1", "M26_RX2", "M26_RX3"]);
//! source.set_pattern("SITCP_FIFO", SimPattern::Telescope {
//!     planes: 3,
//!     words_per_second: 50_000.0,
//! })?;
//! ```
//!
//! # Enabling
//!
//! The simulated source is only available with the `sim-source` feature
//! (on by default).

use super::FifoSource;
use crate::error::{ReadoutError, Result};
use crate::pipeline::words::{M26_HEADER, M26_PLANE_ID_MASK, TRIGGER_WORD_FLAG};
use std::collections::{HashMap, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Word generator of a simulated FIFO
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimPattern {
    /// Incrementing counter words
    Counter { words_per_second: f64 },
    /// Mimosa26 words cycling over planes `1..=planes`, one trigger word per cycle.
    ///
    /// Plane `p` only produces words while the `p`-th receiver channel is
    /// enabled (all planes if the source has no channels).
    Telescope { planes: u32, words_per_second: f64 },
}

impl SimPattern {
    fn words_per_second(&self) -> f64 {
        match self {
            SimPattern::Counter { words_per_second } => *words_per_second,
            SimPattern::Telescope {
                words_per_second, ..
            } => *words_per_second,
        }
    }
}

#[derive(Debug)]
struct SimFifo {
    pending: VecDeque<u32>,
    pattern: Option<SimPattern>,
    last_generate: Instant,
    carry: f64,
    counter: u32,
    stalled: bool,
    read_error: Option<String>,
    reads: usize,
}

impl SimFifo {
    fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            pattern: None,
            last_generate: Instant::now(),
            carry: 0.0,
            counter: 0,
            stalled: false,
            read_error: None,
            reads: 0,
        }
    }

    /// Append the words the generator produced since the last call
    fn generate(&mut self, enabled: &[bool]) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_generate).as_secs_f64();
        self.last_generate = now;
        let Some(pattern) = self.pattern else {
            return;
        };
        if !enabled.is_empty() && !enabled.iter().any(|&e| e) {
            self.carry = 0.0;
            return;
        }

        let wanted = self.carry + elapsed * pattern.words_per_second();
        let count = wanted.floor();
        self.carry = wanted - count;

        for _ in 0..count as u64 {
            let word = match pattern {
                SimPattern::Counter { .. } => self.counter,
                SimPattern::Telescope { planes, .. } => {
                    let planes = planes.max(1);
                    let slot = self.counter % (planes + 1);
                    if slot == planes {
                        TRIGGER_WORD_FLAG | (self.counter / (planes + 1) & 0x7FFF_FFFF)
                    } else {
                        let plane = slot + 1;
                        let plane_enabled = enabled.is_empty()
                            || enabled.get(slot as usize).copied().unwrap_or(false);
                        if !plane_enabled {
                            self.counter = self.counter.wrapping_add(1);
                            continue;
                        }
                        M26_HEADER | ((plane << 20) & M26_PLANE_ID_MASK) | (self.counter & 0xF_FFFF)
                    }
                }
            };
            self.pending.push_back(word);
            self.counter = self.counter.wrapping_add(1);
        }
    }
}

#[derive(Debug, Default)]
struct SimState {
    fifos: HashMap<String, SimFifo>,
    channels: Vec<SimChannel>,
}

#[derive(Debug)]
struct SimChannel {
    name: String,
    enabled: bool,
    discard_count: u32,
    resets: usize,
}

impl SimState {
    fn fifo_mut(&mut self, fifo: &str) -> Result<&mut SimFifo> {
        self.fifos
            .get_mut(fifo)
            .ok_or_else(|| ReadoutError::Source(format!("Unknown FIFO '{}'", fifo)))
    }

    fn channel_mut(&mut self, channel: &str) -> Result<&mut SimChannel> {
        self.channels
            .iter_mut()
            .find(|c| c.name == channel)
            .ok_or_else(|| ReadoutError::Source(format!("Unknown channel '{}'", channel)))
    }

    fn enabled_mask(&self) -> Vec<bool> {
        self.channels.iter().map(|c| c.enabled).collect()
    }
}

/// In-memory [`FifoSource`]
#[derive(Debug, Default)]
pub struct SimSource {
    state: Mutex<SimState>,
    released: Condvar,
}

impl SimSource {
    /// Create a source without FIFOs or channels
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a FIFO
    pub fn with_fifo(self, fifo: impl Into<String>) -> Self {
        self.add_fifo(fifo);
        self
    }

    /// Builder: add receiver channels (disabled)
    pub fn with_channels<I, S>(self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        {
            let mut state = self.lock();
            for name in channels {
                state.channels.push(SimChannel {
                    name: name.into(),
                    enabled: false,
                    discard_count: 0,
                    resets: 0,
                });
            }
        }
        self
    }

    /// Add a FIFO
    pub fn add_fifo(&self, fifo: impl Into<String>) {
        self.lock().fifos.entry(fifo.into()).or_insert_with(SimFifo::new);
    }

    /// Queue words for the next read of a FIFO
    pub fn push_words(&self, fifo: &str, words: &[u32]) -> Result<()> {
        self.lock().fifo_mut(fifo)?.pending.extend(words.iter().copied());
        Ok(())
    }

    /// Set (or clear) the word generator of a FIFO
    pub fn set_pattern(&self, fifo: &str, pattern: impl Into<Option<SimPattern>>) -> Result<()> {
        let mut state = self.lock();
        let sim = state.fifo_mut(fifo)?;
        sim.pattern = pattern.into();
        sim.last_generate = Instant::now();
        sim.carry = 0.0;
        Ok(())
    }

    /// Set the discard error counter of a channel
    pub fn set_discard_count(&self, channel: &str, count: u32) -> Result<()> {
        self.lock().channel_mut(channel)?.discard_count = count;
        Ok(())
    }

    /// Make reads of a FIFO fail with `message`, or succeed again with `None`
    pub fn fail_reads(&self, fifo: &str, message: Option<&str>) -> Result<()> {
        self.lock().fifo_mut(fifo)?.read_error = message.map(str::to_string);
        Ok(())
    }

    /// Block every read of a FIFO until [`SimSource::release`]
    pub fn stall(&self, fifo: &str) -> Result<()> {
        self.lock().fifo_mut(fifo)?.stalled = true;
        Ok(())
    }

    /// Unblock reads of a FIFO
    pub fn release(&self, fifo: &str) -> Result<()> {
        self.lock().fifo_mut(fifo)?.stalled = false;
        self.released.notify_all();
        Ok(())
    }

    /// Number of completed reads of a FIFO
    pub fn read_count(&self, fifo: &str) -> usize {
        self.lock().fifos.get(fifo).map_or(0, |f| f.reads)
    }

    /// Names of the enabled channels
    pub fn enabled_channels(&self) -> Vec<String> {
        self.lock()
            .channels
            .iter()
            .filter(|c| c.enabled)
            .map(|c| c.name.clone())
            .collect()
    }

    /// Number of resets of a channel
    pub fn channel_resets(&self, channel: &str) -> usize {
        self.lock()
            .channels
            .iter()
            .find(|c| c.name == channel)
            .map_or(0, |c| c.resets)
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_enabled(&self, channels: &[String], enabled: bool) -> Result<()> {
        let mut state = self.lock();
        for channel in channels {
            state.channel_mut(channel)?.enabled = enabled;
        }
        // Generators restart from now
        let now = Instant::now();
        for fifo in state.fifos.values_mut() {
            fifo.last_generate = now;
        }
        Ok(())
    }
}

impl FifoSource for SimSource {
    fn read(&self, fifo: &str) -> Result<Vec<u32>> {
        let mut state = self.lock();
        while state.fifo_mut(fifo)?.stalled {
            state = self
                .released
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }

        let enabled = state.enabled_mask();
        let sim = state.fifo_mut(fifo)?;
        if let Some(message) = &sim.read_error {
            return Err(ReadoutError::Source(message.clone()));
        }
        sim.generate(&enabled);
        sim.reads += 1;
        Ok(sim.pending.drain(..).collect())
    }

    fn size(&self, fifo: &str) -> Result<usize> {
        Ok(self.lock().fifo_mut(fifo)?.pending.len())
    }

    fn channels(&self) -> Vec<String> {
        self.lock().channels.iter().map(|c| c.name.clone()).collect()
    }

    fn enable_channels(&self, channels: &[String]) -> Result<()> {
        self.set_enabled(channels, true)
    }

    fn disable_channels(&self, channels: &[String]) -> Result<()> {
        self.set_enabled(channels, false)
    }

    fn is_channel_enabled(&self, channel: &str) -> Result<bool> {
        Ok(self.lock().channel_mut(channel)?.enabled)
    }

    fn error_counts(&self, channels: &[String]) -> Result<Vec<u32>> {
        let mut state = self.lock();
        channels
            .iter()
            .map(|c| state.channel_mut(c).map(|c| c.discard_count))
            .collect()
    }

    fn reset_fifo(&self, fifo: &str) -> Result<()> {
        self.lock().fifo_mut(fifo)?.pending.clear();
        Ok(())
    }

    fn reset_channels(&self, channels: &[String]) -> Result<()> {
        let mut state = self.lock();
        for channel in channels {
            let channel = state.channel_mut(channel)?;
            channel.resets += 1;
            channel.discard_count = 0;
        }
        Ok(())
    }
}
