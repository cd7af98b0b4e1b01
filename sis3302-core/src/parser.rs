//! Low-level extraction of SIS3302 fields from raw 32-bit words.
//!
//! Every function here is a pure mask/shift over a single word. Offsets are
//! resolved by [`crate::layout`]; this module only knows bit positions.

use crate::utils::bit_concat;

// ============================================================================
// Envelope word 0 (generic long-form record header)
// Bits: [31:18] data id | [17:0] record length in words
// ============================================================================

const DATA_ID_SHIFT: u32 = 18;
const RECORD_LENGTH_MASK: u32 = 0x0003_FFFF;

/// Extracts the data id from envelope word 0.
#[inline]
pub fn envelope_data_id(word: u32) -> u32 {
    word >> DATA_ID_SHIFT
}

/// Extracts the total record length (words, envelope included).
#[inline]
pub fn envelope_record_length(word: u32) -> u32 {
    word & RECORD_LENGTH_MASK
}

// ============================================================================
// Envelope word 1
// Bits: [0] buffer wrap (extended pre-trigger) enabled
// ============================================================================

/// Returns true when the wrap-mode bit is set.
#[inline]
pub fn wrap_enabled(word: u32) -> bool {
    word & 0x1 == 0x1
}

// ============================================================================
// Header word 0
// Bits: [31:16] timestamp[47:32] | [15:2] board id | [2:0] channel
// ============================================================================

/// Extracts the board id. The shift discards the low bits shared with the
/// channel field; bit 2 is visible in both.
#[inline]
pub fn board_id(word: u32) -> u16 {
    ((word & 0xFFFF) >> 2) as u16
}

/// Extracts the channel number.
#[inline]
pub fn channel(word: u32) -> u16 {
    (word & 0x7) as u16
}

/// Timestamp bits [47:32].
#[inline]
pub fn timestamp_hi(header_word0: u32) -> u16 {
    (header_word0 >> 16) as u16
}

// ============================================================================
// Header word 1
// Bits: [31:16] timestamp[31:16] | [15:0] timestamp[15:0]
// ============================================================================

/// Timestamp bits [15:0].
#[inline]
pub fn timestamp_lo(header_word1: u32) -> u16 {
    (header_word1 & 0xFFFF) as u16
}

/// Timestamp bits [31:16].
#[inline]
pub fn timestamp_mid(header_word1: u32) -> u16 {
    (header_word1 >> 16) as u16
}

/// Assembles the 48-bit timestamp from the two header words.
///
/// The low and middle lanes both come from header word 1; only the high
/// lane is taken from header word 0, whose low half holds board and channel.
#[inline]
pub fn timestamp(header_word0: u32, header_word1: u32) -> u64 {
    bit_concat(&[
        (timestamp_lo(header_word1) as u64, 16),
        (timestamp_mid(header_word1) as u64, 16),
        (timestamp_hi(header_word0) as u64, 16),
    ])
}

// ============================================================================
// Trailer flags word
// Bits: [31] pileup | [30] retrigger | [29] ADC N+1 trigger |
//       [28] ADC N-1 trigger | [27:24] fast trigger counter | [0] trigger
// ============================================================================

pub const FLAG_PILEUP: u32 = 0x8000_0000;
pub const FLAG_RETRIGGER: u32 = 0x4000_0000;
pub const FLAG_ADC_N_PLUS_ONE_TRIGGER: u32 = 0x2000_0000;
pub const FLAG_ADC_N_MINUS_ONE_TRIGGER: u32 = 0x1000_0000;
pub const FLAG_TRIGGER: u32 = 0x0000_0001;
const FAST_TRIGGER_COUNTER_MASK: u32 = 0x0F00_0000;
const FAST_TRIGGER_COUNTER_SHIFT: u32 = 24;

/// Extracts the 4-bit fast trigger counter.
#[inline]
pub fn fast_trigger_counter(flags: u32) -> u16 {
    ((flags & FAST_TRIGGER_COUNTER_MASK) >> FAST_TRIGGER_COUNTER_SHIFT) as u16
}

// ============================================================================
// Waveform words
// Bits: [31:16] sample 2n+1 | [15:0] sample 2n
// ============================================================================

/// Splits a packed waveform word into its (first, second) samples.
#[inline]
pub fn unpack_samples(word: u32) -> (u16, u16) {
    ((word & 0xFFFF) as u16, (word >> 16) as u16)
}

/// Returns sample `index` from a packed waveform segment, if present.
#[inline]
pub fn packed_sample(words: &[u32], index: usize) -> Option<u16> {
    let (lo, hi) = unpack_samples(*words.get(index / 2)?);
    Some(if index % 2 == 0 { lo } else { hi })
}
