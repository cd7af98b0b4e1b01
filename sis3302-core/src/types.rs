//! Core types for decoded SIS3302 data.

use crate::parser;

/// Data-object path under which the energy records are registered.
pub const DATA_OBJECT_PATH: &str = "ORSIS3302:Energy";
/// Dictionary path of the per-run card/channel model settings.
pub const DICTIONARY_OBJECT_PATH: &str = "ORSIS3302Model";
/// Dictionary path of the configured trigger source.
pub const TRIGGER_MODE_PATH: &str = "ORSIS3302Model:TriggerMode";
/// Sampling frequency in GHz (100 MHz ADC).
pub const SAMPLING_FREQUENCY_GHZ: f64 = 0.1;
/// ADC resolution in bits.
pub const BIT_RESOLUTION: u16 = 16;

/// Trigger source configured on the card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TriggerMode {
    Internal = 0,
    External = 1,
    Validation = 2,
}

impl TriggerMode {
    #[inline]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Internal),
            1 => Some(Self::External),
            2 => Some(Self::Validation),
            _ => None,
        }
    }

    /// Parses a dictionary value holding the numeric mode.
    pub fn from_dictionary(value: &str) -> Option<Self> {
        value.trim().parse::<u8>().ok().and_then(Self::from_u8)
    }
}

/// The trailer flags word.
///
/// Each lane is independent; any combination may be set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TriggerFlags(pub u32);

impl TriggerFlags {
    #[inline]
    pub fn bits(&self) -> u32 {
        self.0
    }

    #[inline]
    pub fn is_pileup(&self) -> bool {
        self.0 & parser::FLAG_PILEUP != 0
    }

    #[inline]
    pub fn is_retrigger(&self) -> bool {
        self.0 & parser::FLAG_RETRIGGER != 0
    }

    /// Trigger from the neighbouring ADC N+1.
    #[inline]
    pub fn is_adc_n_plus_one_trigger(&self) -> bool {
        self.0 & parser::FLAG_ADC_N_PLUS_ONE_TRIGGER != 0
    }

    /// Trigger from the neighbouring ADC N-1.
    #[inline]
    pub fn is_adc_n_minus_one_trigger(&self) -> bool {
        self.0 & parser::FLAG_ADC_N_MINUS_ONE_TRIGGER != 0
    }

    #[inline]
    pub fn is_triggered(&self) -> bool {
        self.0 & parser::FLAG_TRIGGER != 0
    }

    #[inline]
    pub fn fast_trigger_counter(&self) -> u16 {
        parser::fast_trigger_counter(self.0)
    }
}

/// A fully decoded SIS3302 energy record.
#[derive(Debug, Clone, PartialEq)]
pub struct Sis3302Event {
    /// 48-bit timestamp in ADC clock ticks
    pub timestamp: u64,
    pub board_id: u16,
    pub channel: u16,
    /// Maximum of the energy filter inside the gate
    pub energy_max: u32,
    /// Energy filter value at the first gate sample
    pub energy_initial: u32,
    pub flags: TriggerFlags,
    /// Wrap geometry as (number of samples, start index); zero when wrap mode is off
    pub wrap: (u32, u32),
    /// Raw ADC samples, present when waveform capture is enabled
    pub waveform: Option<Vec<u16>>,
    /// Energy-filter samples, present when waveform capture is enabled
    pub energy_waveform: Option<Vec<f64>>,
}

/// Record counters accumulated while decoding a stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Records framed from the stream
    pub records: u64,
    /// Records whose trailer sentinel did not match
    pub invalid: u64,
    /// Records shorter than their computed layout
    pub truncated: u64,
    /// Records skipped by the data-id filter
    pub skipped: u64,
    /// Trailing words that did not form a complete record
    pub leftover_words: u64,
    /// Trailing bytes that did not fill a word
    pub leftover_bytes: u64,
}

/// Result of decoding a record stream.
#[derive(Debug)]
pub struct DecodeResult {
    pub events: Vec<Sis3302Event>,
    pub stats: DecodeStats,
}
