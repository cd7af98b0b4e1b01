//! SIS3302 record view.
//!
//! [`Sis3302Record`] borrows one record buffer and its precomputed
//! [`RecordLayout`]. Binding a new buffer means constructing a new view, so a
//! layout can never outlive or mismatch the words it describes.

use crate::digitizer::DigitizerRecord;
use crate::layout::{LayoutError, RecordLayout, TRAILER_MAGIC};
use crate::parser;
use crate::types::{
    Sis3302Event, TriggerFlags, BIT_RESOLUTION, SAMPLING_FREQUENCY_GHZ,
};
use std::fmt;

/// Borrowed, layout-resolved view over a single SIS3302 record.
#[derive(Debug, Clone, Copy)]
pub struct Sis3302Record<'a> {
    words: &'a [u32],
    layout: RecordLayout,
}

impl<'a> Sis3302Record<'a> {
    /// Binds a record buffer, computing its layout once.
    ///
    /// Fails if the buffer is shorter than the layout its own length fields
    /// describe. Words past the trailer are ignored.
    pub fn bind(words: &'a [u32]) -> Result<Self, LayoutError> {
        let layout = RecordLayout::compute(words)?;
        Ok(Self {
            words: &words[..layout.total_len()],
            layout,
        })
    }

    #[inline]
    pub fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    /// The record words covered by the layout.
    #[inline]
    pub fn words(&self) -> &'a [u32] {
        self.words
    }

    // ------------------------------------------------------------------
    // Envelope and buffer header
    // ------------------------------------------------------------------

    #[inline]
    pub fn data_id(&self) -> u32 {
        parser::envelope_data_id(self.words[0])
    }

    /// Record length declared in the envelope. Not checked against the layout.
    #[inline]
    pub fn declared_length(&self) -> u32 {
        parser::envelope_record_length(self.words[0])
    }

    #[inline]
    pub fn is_wrap_enabled(&self) -> bool {
        self.layout.is_wrap_enabled()
    }

    #[inline]
    pub fn num_wrap_samples(&self) -> u32 {
        self.layout.num_wrap_samples()
    }

    #[inline]
    pub fn wrap_start_index(&self) -> u32 {
        self.layout.wrap_start_index()
    }

    #[inline]
    fn header_word(&self, index: usize) -> u32 {
        self.words[self.layout.header_offset() + index]
    }

    #[inline]
    pub fn board_id(&self) -> u16 {
        parser::board_id(self.header_word(0))
    }

    #[inline]
    pub fn channel_num(&self) -> u16 {
        parser::channel(self.header_word(0))
    }

    #[inline]
    pub fn timestamp_lo(&self) -> u16 {
        parser::timestamp_lo(self.header_word(1))
    }

    #[inline]
    pub fn timestamp_mid(&self) -> u16 {
        parser::timestamp_mid(self.header_word(1))
    }

    #[inline]
    pub fn timestamp_hi(&self) -> u16 {
        parser::timestamp_hi(self.header_word(0))
    }

    /// 48-bit timestamp.
    #[inline]
    pub fn timestamp(&self) -> u64 {
        parser::timestamp(self.header_word(0), self.header_word(1))
    }

    // ------------------------------------------------------------------
    // Trailer
    // ------------------------------------------------------------------

    #[inline]
    fn trailer_word(&self, index: usize) -> u32 {
        self.words[self.layout.trailer_word_offset() + index]
    }

    /// Maximum energy found in the gate.
    #[inline]
    pub fn energy_max(&self) -> u32 {
        self.trailer_word(0)
    }

    /// Energy at the first point of the gate.
    #[inline]
    pub fn energy_initial(&self) -> u32 {
        self.trailer_word(1)
    }

    #[inline]
    pub fn flags(&self) -> u32 {
        self.trailer_word(2)
    }

    #[inline]
    pub fn trigger_flags(&self) -> TriggerFlags {
        TriggerFlags(self.flags())
    }

    #[inline]
    pub fn trailer(&self) -> u32 {
        self.trailer_word(3)
    }

    #[inline]
    pub fn is_pileup(&self) -> bool {
        self.trigger_flags().is_pileup()
    }

    #[inline]
    pub fn is_retrigger(&self) -> bool {
        self.trigger_flags().is_retrigger()
    }

    #[inline]
    pub fn is_adc_n_plus_one_trigger(&self) -> bool {
        self.trigger_flags().is_adc_n_plus_one_trigger()
    }

    #[inline]
    pub fn is_adc_n_minus_one_trigger(&self) -> bool {
        self.trigger_flags().is_adc_n_minus_one_trigger()
    }

    #[inline]
    pub fn is_triggered(&self) -> bool {
        self.trigger_flags().is_triggered()
    }

    #[inline]
    pub fn fast_trigger_counter(&self) -> u16 {
        self.trigger_flags().fast_trigger_counter()
    }

    /// True iff the trailer sentinel is intact. Says nothing about other fields.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.trailer() == TRAILER_MAGIC
    }

    // ------------------------------------------------------------------
    // Waveforms
    // ------------------------------------------------------------------

    /// Raw waveform length in 16-bit samples.
    #[inline]
    pub fn waveform_len(&self) -> usize {
        self.layout.waveform_sample_count()
    }

    /// Packed raw waveform words, two samples each.
    #[inline]
    pub fn waveform_words(&self) -> &'a [u32] {
        let start = self.layout.waveform_word_offset();
        &self.words[start..self.layout.energy_waveform_word_offset()]
    }

    /// Raw samples in acquisition order (low half of each word first).
    pub fn waveform_samples(&self) -> impl Iterator<Item = u16> + 'a {
        self.waveform_words().iter().flat_map(|&word| {
            let (first, second) = parser::unpack_samples(word);
            [first, second]
        })
    }

    /// Copies up to `dest.len()` raw samples, returning the number copied.
    pub fn copy_waveform(&self, dest: &mut [u16]) -> usize {
        let mut copied = 0;
        for (slot, sample) in dest.iter_mut().zip(self.waveform_samples()) {
            *slot = sample;
            copied += 1;
        }
        copied
    }

    /// As [`copy_waveform`](Self::copy_waveform), widening each sample to `f64`.
    pub fn copy_waveform_f64(&self, dest: &mut [f64]) -> usize {
        let mut copied = 0;
        for (slot, sample) in dest.iter_mut().zip(self.waveform_samples()) {
            *slot = f64::from(sample);
            copied += 1;
        }
        copied
    }

    /// Energy-filter waveform length in samples.
    #[inline]
    pub fn energy_waveform_len(&self) -> usize {
        self.layout.energy_waveform_sample_count()
    }

    /// Energy-filter words, one sample each.
    #[inline]
    pub fn energy_waveform_words(&self) -> &'a [u32] {
        let start = self.layout.energy_waveform_word_offset();
        &self.words[start..self.layout.trailer_word_offset()]
    }

    /// Copies up to `dest.len()` energy-filter samples as `f64`.
    pub fn copy_energy_waveform_f64(&self, dest: &mut [f64]) -> usize {
        let src = self.energy_waveform_words();
        let n = src.len().min(dest.len());
        for (slot, &word) in dest[..n].iter_mut().zip(src) {
            *slot = f64::from(word);
        }
        n
    }

    // ------------------------------------------------------------------
    // Conversion and diagnostics
    // ------------------------------------------------------------------

    /// Builds an owned event, optionally capturing both waveforms.
    pub fn to_event(&self, capture_waveforms: bool) -> Sis3302Event {
        let (waveform, energy_waveform) = if capture_waveforms {
            (
                Some(self.waveform_samples().collect()),
                Some(
                    self.energy_waveform_words()
                        .iter()
                        .map(|&w| f64::from(w))
                        .collect(),
                ),
            )
        } else {
            (None, None)
        };

        Sis3302Event {
            timestamp: self.timestamp(),
            board_id: self.board_id(),
            channel: self.channel_num(),
            energy_max: self.energy_max(),
            energy_initial: self.energy_initial(),
            flags: self.trigger_flags(),
            wrap: (self.num_wrap_samples(), self.wrap_start_index()),
            waveform,
            energy_waveform,
        }
    }

    /// Renders the buffer header and trailer fields for debug output.
    pub fn dump_buffer_header(&self) -> BufferHeaderDump<'_, 'a> {
        BufferHeaderDump { record: self }
    }
}

/// Multi-line rendering of a record's header and trailer fields.
pub struct BufferHeaderDump<'r, 'a> {
    record: &'r Sis3302Record<'a>,
}

impl fmt::Display for BufferHeaderDump<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = self.record;
        writeln!(f, "SIS3302 buffer header:")?;
        writeln!(f, "  wrap enabled:     {}", r.is_wrap_enabled())?;
        writeln!(f, "  header length:    {}", r.layout.header_len())?;
        if r.is_wrap_enabled() {
            writeln!(f, "  wrap samples:     {}", r.num_wrap_samples())?;
            writeln!(f, "  wrap start index: {}", r.wrap_start_index())?;
        }
        writeln!(f, "  board id:         {}", r.board_id())?;
        writeln!(f, "  channel:          {}", r.channel_num())?;
        writeln!(f, "  timestamp:        {}", r.timestamp())?;
        writeln!(f, "  waveform length:  {}", r.waveform_len())?;
        writeln!(f, "  energy length:    {}", r.energy_waveform_len())?;
        writeln!(f, "  energy max:       {}", r.energy_max())?;
        writeln!(f, "  energy initial:   {}", r.energy_initial())?;
        writeln!(f, "  flags:            0x{:08x}", r.flags())?;
        write!(f, "  trailer:          0x{:08x}", r.trailer())
    }
}

impl DigitizerRecord for Sis3302Record<'_> {
    fn sampling_frequency(&self) -> f64 {
        SAMPLING_FREQUENCY_GHZ
    }

    fn bit_resolution(&self) -> u16 {
        BIT_RESOLUTION
    }

    fn waveform_is_signed(&self) -> bool {
        false
    }

    fn event_count(&self) -> usize {
        1
    }

    fn event_time(&self, _event: usize) -> u64 {
        self.timestamp()
    }

    fn event_energy(&self, _event: usize) -> u32 {
        self.energy_max()
    }

    fn event_channel(&self, _event: usize) -> u16 {
        self.channel_num()
    }

    fn event_flags(&self, _event: usize) -> u32 {
        self.flags()
    }

    fn event_waveform_length(&self, _event: usize) -> usize {
        self.waveform_len()
    }

    fn event_waveform_point(&self, _event: usize, point: usize) -> Option<u32> {
        parser::packed_sample(self.waveform_words(), point).map(u32::from)
    }
}
