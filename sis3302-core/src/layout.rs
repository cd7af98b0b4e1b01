//! Record layout computation.
//!
//! A SIS3302 record is not fixed-offset. The wrap-mode bit in envelope word 1
//! selects a 2- or 4-word buffer header, and the trailer follows two
//! variable-length payload segments:
//!
//! ```text
//! [0..4)              envelope (data id/length, wrap bit, waveform words, energy words)
//! [4..4+H)            buffer header, H = 2 (no wrap) or 4 (wrap)
//! [..+W)              raw waveform, W words, two 16-bit samples per word
//! [..+E)              energy-filter waveform, E words, one sample per word
//! [..+4)              trailer: energy max, energy initial, flags, 0xDEADBEEF
//! ```
//!
//! [`RecordLayout::compute`] reads the wrap bit exactly once and checks that
//! the buffer is long enough for every derived offset, so accessors built on
//! the layout can index without further bounds checks.

use crate::parser;
use thiserror::Error;

/// Length of the generic envelope preceding the buffer header.
pub const ENVELOPE_LEN: usize = 4;
/// Buffer header length with wrap mode disabled.
pub const NO_WRAP_HEADER_LEN: usize = 2;
/// Buffer header length with wrap mode enabled.
pub const WRAP_HEADER_LEN: usize = 4;
/// Trailer length.
pub const TRAILER_LEN: usize = 4;
/// Trailer sentinel value.
pub const TRAILER_MAGIC: u32 = 0xDEAD_BEEF;

// Absolute word indices into the record.
const WRAP_FLAG_WORD: usize = 1;
const WAVEFORM_LEN_WORD: usize = 2;
const ENERGY_LEN_WORD: usize = 3;
const WRAP_SAMPLES_WORD: usize = 6;
const WRAP_START_WORD: usize = 7;

/// Errors raised while computing a record layout.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutError {
    #[error("record too short: layout needs {needed} words, buffer has {available}")]
    Truncated { needed: usize, available: usize },

    #[error("segment lengths overflow the addressable range")]
    Overflow,
}

/// Buffer header variant, decided once per record by the wrap-mode bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderMode {
    /// Standard 2-word header.
    NoWrap,
    /// Extended pre-trigger mode: 4-word header carrying the wrap geometry.
    Wrap { num_samples: u32, start_index: u32 },
}

impl HeaderMode {
    /// Header length in words.
    #[inline]
    pub fn header_len(&self) -> usize {
        match self {
            Self::NoWrap => NO_WRAP_HEADER_LEN,
            Self::Wrap { .. } => WRAP_HEADER_LEN,
        }
    }
}

/// Segment boundaries of one record, all in word units.
///
/// Holds no reference to the buffer it was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLayout {
    mode: HeaderMode,
    waveform_words: usize,
    energy_words: usize,
}

impl RecordLayout {
    /// Computes the layout of `words` and checks the buffer covers it.
    pub fn compute(words: &[u32]) -> Result<Self, LayoutError> {
        ensure_len(words, ENVELOPE_LEN)?;

        let mode = if parser::wrap_enabled(words[WRAP_FLAG_WORD]) {
            ensure_len(words, ENVELOPE_LEN + WRAP_HEADER_LEN)?;
            HeaderMode::Wrap {
                num_samples: words[WRAP_SAMPLES_WORD],
                start_index: words[WRAP_START_WORD],
            }
        } else {
            HeaderMode::NoWrap
        };

        let layout = Self {
            mode,
            waveform_words: words[WAVEFORM_LEN_WORD] as usize,
            energy_words: words[ENERGY_LEN_WORD] as usize,
        };

        let needed = layout
            .header_offset()
            .checked_add(mode.header_len())
            .and_then(|n| n.checked_add(layout.waveform_words))
            .and_then(|n| n.checked_add(layout.energy_words))
            .and_then(|n| n.checked_add(TRAILER_LEN))
            .ok_or(LayoutError::Overflow)?;
        ensure_len(words, needed)?;

        Ok(layout)
    }

    #[inline]
    pub fn mode(&self) -> HeaderMode {
        self.mode
    }

    #[inline]
    pub fn is_wrap_enabled(&self) -> bool {
        matches!(self.mode, HeaderMode::Wrap { .. })
    }

    #[inline]
    pub fn header_offset(&self) -> usize {
        ENVELOPE_LEN
    }

    #[inline]
    pub fn header_len(&self) -> usize {
        self.mode.header_len()
    }

    /// Number of wrap samples; 0 unless wrap mode is enabled.
    #[inline]
    pub fn num_wrap_samples(&self) -> u32 {
        match self.mode {
            HeaderMode::Wrap { num_samples, .. } => num_samples,
            HeaderMode::NoWrap => 0,
        }
    }

    /// Wrap start index; 0 unless wrap mode is enabled.
    #[inline]
    pub fn wrap_start_index(&self) -> u32 {
        match self.mode {
            HeaderMode::Wrap { start_index, .. } => start_index,
            HeaderMode::NoWrap => 0,
        }
    }

    /// Number of 16-bit raw waveform samples (two per word).
    #[inline]
    pub fn waveform_sample_count(&self) -> usize {
        self.waveform_words * 2
    }

    /// Number of energy-filter samples (one per word).
    #[inline]
    pub fn energy_waveform_sample_count(&self) -> usize {
        self.energy_words
    }

    #[inline]
    pub fn waveform_word_offset(&self) -> usize {
        self.header_offset() + self.header_len()
    }

    #[inline]
    pub fn energy_waveform_word_offset(&self) -> usize {
        self.waveform_word_offset() + self.waveform_sample_count() / 2
    }

    #[inline]
    pub fn trailer_word_offset(&self) -> usize {
        self.energy_waveform_word_offset() + self.energy_waveform_sample_count()
    }

    /// Total words covered by the layout, trailer included.
    #[inline]
    pub fn total_len(&self) -> usize {
        self.trailer_word_offset() + TRAILER_LEN
    }
}

#[inline]
fn ensure_len(words: &[u32], needed: usize) -> Result<(), LayoutError> {
    if words.len() < needed {
        return Err(LayoutError::Truncated {
            needed,
            available: words.len(),
        });
    }
    Ok(())
}
