//! Format-independent view over digitizer records.
//!
//! Some digitizers pack many events into one buffer, others exactly one.
//! Downstream code works against [`DigitizerRecord`] and indexes events
//! without knowing which hardware produced them.

/// Capability set shared by all digitizer record formats.
///
/// Single-event formats ignore the `event` index.
pub trait DigitizerRecord {
    /// Sampling frequency in GHz.
    fn sampling_frequency(&self) -> f64;

    /// ADC resolution in bits.
    fn bit_resolution(&self) -> u16;

    /// Whether waveform samples are two's-complement encoded.
    fn waveform_is_signed(&self) -> bool;

    fn event_count(&self) -> usize;

    fn event_time(&self, event: usize) -> u64;

    fn event_energy(&self, event: usize) -> u32;

    fn event_channel(&self, event: usize) -> u16;

    fn event_flags(&self, event: usize) -> u32;

    fn event_waveform_length(&self, event: usize) -> usize;

    /// Waveform sample `point` of `event`, or `None` past the end.
    fn event_waveform_point(&self, event: usize, point: usize) -> Option<u32>;
}

/// Per-event summary read through [`DigitizerRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventView {
    pub time: u64,
    pub energy: u32,
    pub channel: u16,
    pub flags: u32,
    pub waveform_length: usize,
}

/// Iterates over every event of a record.
pub fn event_views(record: &dyn DigitizerRecord) -> impl Iterator<Item = EventView> + '_ {
    (0..record.event_count()).map(move |event| EventView {
        time: record.event_time(event),
        energy: record.event_energy(event),
        channel: record.event_channel(event),
        flags: record.event_flags(event),
        waveform_length: record.event_waveform_length(event),
    })
}
