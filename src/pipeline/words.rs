//! Data word helpers for the telescope readout.
//!
//! The readout core never interprets data words itself. These helpers are
//! ready-made filters and a source classifier for the Mimosa26 data format
//! produced by the readout firmware: trigger words carry bit 31, Mimosa26
//! words carry header `0x20` in the top byte and the plane identifier in bits
//! 20..24.

use crate::types::ChunkData;
use serde::{Deserialize, Serialize};

/// Trigger word flag
pub const TRIGGER_WORD_FLAG: u32 = 0x8000_0000;

/// Header mask of Mimosa26 words
pub const M26_HEADER_MASK: u32 = 0xFF00_0000;

/// Header value of Mimosa26 words (set in the firmware)
pub const M26_HEADER: u32 = 0x2000_0000;

/// Plane identifier bits of Mimosa26 words
pub const M26_PLANE_ID_MASK: u32 = 0x00F0_0000;

/// Whether a word is a trigger word
#[inline]
pub fn is_trigger_word(word: u32) -> bool {
    word & TRIGGER_WORD_FLAG == TRIGGER_WORD_FLAG
}

/// Whether a word is a Mimosa26 data word
#[inline]
pub fn is_m26_word(word: u32) -> bool {
    word & M26_HEADER_MASK == M26_HEADER
}

/// Plane identifier of a Mimosa26 word
#[inline]
pub fn m26_plane_id(word: u32) -> u32 {
    (word & M26_PLANE_ID_MASK) >> 20
}

/// Sorted, unique plane identifiers of all Mimosa26 words in a payload.
///
/// Usable as a source classifier for the writer's no-data bookkeeping.
/// Payloads that are not words yield no identifiers.
pub fn m26_plane_ids(data: &ChunkData) -> Vec<u32> {
    let Some(words) = data.as_words() else {
        return Vec::new();
    };
    let mut ids: Vec<u32> = words
        .iter()
        .copied()
        .filter(|&w| is_m26_word(w))
        .map(m26_plane_id)
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Mask/value word filter, configurable from a config file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordMask {
    /// Bits to compare
    pub mask: u32,
    /// Expected value of the masked bits
    pub value: u32,
}

impl WordMask {
    /// Create a new mask filter
    pub fn new(mask: u32, value: u32) -> Self {
        Self { mask, value }
    }

    /// Filter selecting Mimosa26 words
    pub fn m26() -> Self {
        Self::new(M26_HEADER_MASK, M26_HEADER)
    }

    /// Filter selecting trigger words
    pub fn trigger() -> Self {
        Self::new(TRIGGER_WORD_FLAG, TRIGGER_WORD_FLAG)
    }

    /// Whether a word passes the filter
    #[inline]
    pub fn matches(&self, word: u32) -> bool {
        word & self.mask == self.value
    }
}
