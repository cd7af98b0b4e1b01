//! Output format writers for decoded SIS3302 events.
//!
//! Supports CSV with a selectable column set, a waveform CSV and a compact
//! binary format.

use crate::types::Sis3302Event;
use byteorder::{LittleEndian, WriteBytesExt};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during output writing.
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// A single CSV column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Timestamp,
    Board,
    Channel,
    EnergyMax,
    EnergyInitial,
    Flags,
    Pileup,
    FastTriggerCounter,
}

impl Column {
    fn name(&self) -> &'static str {
        match self {
            Self::Timestamp => "timestamp",
            Self::Board => "board",
            Self::Channel => "channel",
            Self::EnergyMax => "energy",
            Self::EnergyInitial => "energy_initial",
            Self::Flags => "flags",
            Self::Pileup => "pileup",
            Self::FastTriggerCounter => "fast_triggers",
        }
    }

    fn value(&self, event: &Sis3302Event) -> u64 {
        match self {
            Self::Timestamp => event.timestamp,
            Self::Board => event.board_id as u64,
            Self::Channel => event.channel as u64,
            Self::EnergyMax => event.energy_max as u64,
            Self::EnergyInitial => event.energy_initial as u64,
            Self::Flags => event.flags.bits() as u64,
            Self::Pileup => event.flags.is_pileup() as u64,
            Self::FastTriggerCounter => event.flags.fast_trigger_counter() as u64,
        }
    }
}

/// Ordered set of CSV columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSet(Vec<Column>);

impl Default for ColumnSet {
    /// t, board, ch, e, flags
    fn default() -> Self {
        Self(vec![
            Column::Timestamp,
            Column::Board,
            Column::Channel,
            Column::EnergyMax,
            Column::Flags,
        ])
    }
}

impl std::str::FromStr for ColumnSet {
    type Err = OutputError;

    /// Parses a column list like "t,board,ch,e".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut columns = Vec::new();

        for part in s.split(',').map(|p| p.trim().to_lowercase()) {
            let column = match part.as_str() {
                "t" | "time" | "timestamp" => Column::Timestamp,
                "b" | "board" => Column::Board,
                "ch" | "channel" => Column::Channel,
                "e" | "energy" | "emax" => Column::EnergyMax,
                "ei" | "energy_initial" => Column::EnergyInitial,
                "f" | "flags" => Column::Flags,
                "p" | "pileup" => Column::Pileup,
                "ft" | "fast_triggers" => Column::FastTriggerCounter,
                "" => {
                    return Err(OutputError::InvalidFormat(
                        "Empty column name".to_string(),
                    ))
                }
                _ => {
                    return Err(OutputError::InvalidFormat(format!(
                        "Unknown column: {}. Use t, board, ch, e, ei, flags, pileup, ft",
                        part
                    )))
                }
            };

            if columns.contains(&column) {
                return Err(OutputError::InvalidFormat(format!(
                    "Duplicate column: {}",
                    part
                )));
            }
            columns.push(column);
        }

        Ok(Self(columns))
    }
}

impl ColumnSet {
    pub fn columns(&self) -> &[Column] {
        &self.0
    }

    /// Returns the CSV header line for this column set.
    pub fn header(&self) -> String {
        self.0
            .iter()
            .map(Column::name)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// CSV output writer for events.
pub struct CsvWriter<W: Write> {
    writer: BufWriter<W>,
    columns: ColumnSet,
}

impl<W: Write> CsvWriter<W> {
    /// Creates a new CSV writer.
    pub fn new(writer: W, columns: ColumnSet) -> Self {
        Self {
            writer: BufWriter::new(writer),
            columns,
        }
    }

    /// Writes the CSV header.
    pub fn write_header(&mut self) -> Result<(), OutputError> {
        writeln!(self.writer, "{}", self.columns.header())?;
        Ok(())
    }

    /// Writes a batch of events.
    pub fn write_events(&mut self, events: &[Sis3302Event]) -> Result<(), OutputError> {
        for event in events {
            self.write_event(event)?;
        }
        Ok(())
    }

    #[inline]
    fn write_event(&mut self, event: &Sis3302Event) -> Result<(), OutputError> {
        for (i, column) in self.columns.columns().iter().enumerate() {
            if i > 0 {
                self.writer.write_all(b",")?;
            }
            write!(self.writer, "{}", column.value(event))?;
        }
        writeln!(self.writer)?;
        Ok(())
    }

    /// Flushes the writer.
    pub fn flush(&mut self) -> Result<(), OutputError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// CSV writer for raw waveforms, one event per line.
///
/// Line format: `index,timestamp,channel,sample0,sample1,...`. Events without
/// a captured waveform are skipped.
pub struct WaveformCsvWriter<W: Write> {
    writer: BufWriter<W>,
}

impl<W: Write> WaveformCsvWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
        }
    }

    /// Writes every captured waveform, returning how many were written.
    pub fn write_events(&mut self, events: &[Sis3302Event]) -> Result<usize, OutputError> {
        let mut written = 0;
        for (index, event) in events.iter().enumerate() {
            let Some(waveform) = &event.waveform else {
                continue;
            };
            write!(self.writer, "{},{},{}", index, event.timestamp, event.channel)?;
            for sample in waveform {
                write!(self.writer, ",{}", sample)?;
            }
            writeln!(self.writer)?;
            written += 1;
        }
        Ok(written)
    }

    pub fn flush(&mut self) -> Result<(), OutputError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Binary output format for events.
///
/// Header: magic `SIS3302B`, version u32, event count u64.
/// Each event is a packed little-endian record:
/// - timestamp: u64 (8 bytes)
/// - board: u16 (2 bytes)
/// - channel: u16 (2 bytes)
/// - energy max: u32 (4 bytes)
/// - energy initial: u32 (4 bytes)
/// - flags: u32 (4 bytes)
///   Total: 24 bytes per event
pub struct BinaryWriter<W: Write> {
    writer: BufWriter<W>,
}

/// Magic bytes opening a binary output file.
pub const BINARY_MAGIC: &[u8; 8] = b"SIS3302B";
/// Size of one binary event record in bytes.
pub const BINARY_EVENT_SIZE: usize = 24;
/// Binary format version written after the magic.
pub const BINARY_VERSION: u32 = 1;

impl<W: Write> BinaryWriter<W> {
    /// Creates a new binary writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
        }
    }

    /// Writes the file header.
    pub fn write_header(&mut self, event_count: u64) -> Result<(), OutputError> {
        self.writer.write_all(BINARY_MAGIC)?;
        self.writer.write_u32::<LittleEndian>(BINARY_VERSION)?;
        self.writer.write_u64::<LittleEndian>(event_count)?;
        Ok(())
    }

    /// Writes a batch of events.
    pub fn write_events(&mut self, events: &[Sis3302Event]) -> Result<(), OutputError> {
        for event in events {
            let w = &mut self.writer;
            w.write_u64::<LittleEndian>(event.timestamp)?;
            w.write_u16::<LittleEndian>(event.board_id)?;
            w.write_u16::<LittleEndian>(event.channel)?;
            w.write_u32::<LittleEndian>(event.energy_max)?;
            w.write_u32::<LittleEndian>(event.energy_initial)?;
            w.write_u32::<LittleEndian>(event.flags.bits())?;
        }
        Ok(())
    }

    /// Flushes the writer.
    pub fn flush(&mut self) -> Result<(), OutputError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Writes events to a CSV file.
pub fn write_csv<P: AsRef<Path>>(
    path: P,
    events: &[Sis3302Event],
    columns: ColumnSet,
) -> Result<(), OutputError> {
    let file = File::create(path)?;
    let mut writer = CsvWriter::new(file, columns);
    writer.write_header()?;
    writer.write_events(events)?;
    writer.flush()?;
    Ok(())
}

/// Writes captured waveforms to a CSV file, returning how many were written.
pub fn write_waveform_csv<P: AsRef<Path>>(
    path: P,
    events: &[Sis3302Event],
) -> Result<usize, OutputError> {
    let file = File::create(path)?;
    let mut writer = WaveformCsvWriter::new(file);
    let written = writer.write_events(events)?;
    writer.flush()?;
    Ok(written)
}

/// Writes events to a binary file.
pub fn write_binary<P: AsRef<Path>>(path: P, events: &[Sis3302Event]) -> Result<(), OutputError> {
    let file = File::create(path)?;
    let mut writer = BinaryWriter::new(file);
    writer.write_header(events.len() as u64)?;
    writer.write_events(events)?;
    writer.flush()?;
    Ok(())
}
