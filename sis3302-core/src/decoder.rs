//! Record stream decoder.
//!
//! Walks a contiguous stream of SIS3302 records, framing each one by the
//! length in its envelope, and turns every intact record into a
//! [`Sis3302Event`]. Damaged records are counted and skipped; only a broken
//! framing word stops the walk.

use crate::layout::{LayoutError, ENVELOPE_LEN};
use crate::parser;
use crate::record::Sis3302Record;
use crate::types::{DecodeResult, DecodeStats, Sis3302Event};
use crate::utils::normalize_words;
use byteorder::{ByteOrder, NativeEndian};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur during SIS3302 decoding.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Layout error: {0}")]
    Layout(#[from] LayoutError),

    #[error("Invalid trailer: expected 0xdeadbeef, found {found:#010x}")]
    InvalidTrailer { found: u32 },
}

/// Word size on the wire.
const WORD_SIZE: usize = 4;

/// Decoder configuration.
#[derive(Debug, Clone, Default)]
pub struct DecoderConfig {
    /// Copy raw and energy waveforms into each event
    pub capture_waveforms: bool,
    /// Only decode records carrying this data id
    pub data_id: Option<u32>,
    /// Log every buffer header at debug level
    pub dump_records: bool,
}

/// SIS3302 record stream decoder.
///
/// Each record is bound independently; the only state carried between
/// records is the running [`DecodeStats`].
#[derive(Debug, Default)]
pub struct Sis3302Decoder {
    config: DecoderConfig,
    stats: DecodeStats,
}

impl Sis3302Decoder {
    /// Creates a decoder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: DecoderConfig) -> Self {
        Self {
            config,
            stats: DecodeStats::default(),
        }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    /// Clears the accumulated counters.
    pub fn reset(&mut self) {
        self.stats = DecodeStats::default();
    }

    /// Decodes a single record.
    ///
    /// Fails if the buffer cannot hold its own layout or the trailer
    /// sentinel is wrong. Both are recoverable: the caller drops the record.
    pub fn decode_record(&self, words: &[u32]) -> Result<Sis3302Event, DecodeError> {
        let record = bind_valid(words)?;

        if self.config.dump_records {
            debug!("{}", record.dump_buffer_header());
        }

        Ok(record.to_event(self.config.capture_waveforms))
    }

    /// Decodes a buffer of concatenated records, appending to `events`.
    pub fn decode_buffer(&mut self, words: &[u32], events: &mut Vec<Sis3302Event>) {
        let mut frames = RecordFrames::new(words);

        for record in frames.by_ref() {
            let index = self.stats.records;
            self.stats.records += 1;

            if let Some(wanted) = self.config.data_id {
                if parser::envelope_data_id(record[0]) != wanted {
                    self.stats.skipped += 1;
                    continue;
                }
            }

            match self.decode_record(record) {
                Ok(event) => events.push(event),
                Err(e) => self.stats.count_discarded(index, &e),
            }
        }

        self.stats.leftover_words += frames.leftover() as u64;
    }

    /// Decodes little-endian record bytes.
    ///
    /// Trailing bytes that do not fill a word are counted in `leftover_bytes`.
    pub fn decode_bytes(&mut self, bytes: &[u8]) -> DecodeResult {
        let words = bytes_to_words(bytes);
        let tail = bytes.len() % WORD_SIZE;
        if tail != 0 {
            warn!(bytes = tail, "input length is not a whole number of words");
            self.stats.leftover_bytes += tail as u64;
        }

        let mut events = Vec::new();
        self.decode_buffer(&words, &mut events);

        DecodeResult {
            events,
            stats: self.stats,
        }
    }

    /// Decodes a record file from disk.
    pub fn decode_file<P: AsRef<Path>>(&mut self, path: P) -> Result<DecodeResult, DecodeError> {
        let bytes = std::fs::read(path.as_ref())?;
        debug!(
            path = %path.as_ref().display(),
            bytes = bytes.len(),
            "read record file"
        );
        Ok(self.decode_bytes(&bytes))
    }
}

/// Binds a record and checks its trailer sentinel.
///
/// Shared by the stream decoder and the record processors.
pub fn bind_valid(words: &[u32]) -> Result<Sis3302Record<'_>, DecodeError> {
    let record = Sis3302Record::bind(words)?;
    if !record.is_valid() {
        return Err(DecodeError::InvalidTrailer {
            found: record.trailer(),
        });
    }
    Ok(record)
}

impl DecodeStats {
    /// Counts a rejected record under `invalid` or `truncated` and logs why.
    pub fn count_discarded(&mut self, index: u64, error: &DecodeError) {
        match error {
            DecodeError::InvalidTrailer { found } => {
                self.invalid += 1;
                warn!(
                    record = index,
                    trailer = *found,
                    "discarding record with corrupt trailer"
                );
            }
            _ => {
                self.truncated += 1;
                warn!(record = index, error = %error, "discarding record");
            }
        }
    }
}

/// Splits a word stream into records using the envelope length field.
///
/// Iteration ends at the first framing word that is shorter than an
/// envelope or runs past the end of the stream; the unconsumed words are
/// reported by [`leftover`](Self::leftover).
#[derive(Debug)]
pub struct RecordFrames<'a> {
    words: &'a [u32],
    offset: usize,
    leftover: usize,
}

impl<'a> RecordFrames<'a> {
    pub fn new(words: &'a [u32]) -> Self {
        Self {
            words,
            offset: 0,
            leftover: 0,
        }
    }

    /// Words left unframed once iteration has stopped.
    pub fn leftover(&self) -> usize {
        self.leftover
    }
}

impl<'a> Iterator for RecordFrames<'a> {
    type Item = &'a [u32];

    fn next(&mut self) -> Option<Self::Item> {
        let words = self.words;
        let remaining = &words[self.offset..];
        let first = *remaining.first()?;
        let length = parser::envelope_record_length(first) as usize;

        if length < ENVELOPE_LEN {
            warn!(
                offset = self.offset,
                length,
                "record length shorter than envelope, stream desynchronised"
            );
        } else if length > remaining.len() {
            warn!(
                offset = self.offset,
                length,
                available = remaining.len(),
                "incomplete record at end of buffer"
            );
        } else {
            self.offset += length;
            return Some(&remaining[..length]);
        }

        self.leftover = remaining.len();
        self.offset = self.words.len();
        None
    }
}

/// Converts little-endian bytes into host-order words.
///
/// The words are read in native order and then normalised, mirroring how
/// the acquisition host writes them.
pub fn bytes_to_words(bytes: &[u8]) -> Vec<u32> {
    let n = bytes.len() / WORD_SIZE;
    let mut words = vec![0u32; n];
    NativeEndian::read_u32_into(&bytes[..n * WORD_SIZE], &mut words);
    normalize_words(&mut words);
    words
}
