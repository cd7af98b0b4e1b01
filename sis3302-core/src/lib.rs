//! SIS3302 record decoder library.
//!
//! This crate decodes the energy records written by the Struck SIS3302
//! waveform digitizer: timestamps, trigger flags, raw ADC waveforms and the
//! on-board energy-filter output. The record layout depends on a wrap-mode
//! bit inside the record and on two variable-length payload segments, so
//! every record is bound to a freshly computed [`layout::RecordLayout`]
//! before any field is read.
//!
//! # Example
//!
//! ```no_run
//! use sis3302_core::decoder::Sis3302Decoder;
//!
//! let mut decoder = Sis3302Decoder::new();
//! let result = decoder.decode_file("run_1234.dat").unwrap();
//!
//! println!("Decoded {} events", result.events.len());
//! println!("Discarded {} corrupt records", result.stats.invalid);
//! ```
//!
//! # Features
//!
//! - Wrap (extended pre-trigger) and standard buffer headers
//! - Borrowed record views with bounds checked once at bind time
//! - Format-independent [`DigitizerRecord`] view for generic consumers
//! - Run/processor pipeline with severity-coded results
//! - CSV, waveform CSV and binary output

pub mod decoder;
pub mod digitizer;
pub mod layout;
pub mod output;
pub mod parser;
pub mod processor;
pub mod record;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use decoder::{DecodeError, DecoderConfig, Sis3302Decoder};
pub use digitizer::DigitizerRecord;
pub use layout::{LayoutError, RecordLayout};
pub use output::{ColumnSet, OutputError};
pub use processor::{
    DataProcessor, EnergyProcessor, EnergyProcessorConfig, ProcessorManager, ReturnCode,
    RunContext, StreamStats,
};
pub use record::Sis3302Record;
pub use types::{DecodeResult, DecodeStats, Sis3302Event, TriggerFlags};
