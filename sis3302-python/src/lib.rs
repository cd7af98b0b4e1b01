//! Python bindings for the SIS3302 decoder with numpy support.
//!
//! Decoded events are exposed in columnar form (one array per field), which
//! maps directly onto numpy arrays and pandas DataFrames.

use numpy::{IntoPyArray, PyArray1};
use pyo3::exceptions::{PyIOError, PyIndexError};
use pyo3::prelude::*;
use pyo3::types::PyDict;
use sis3302_core::{DecodeStats, DecoderConfig, Sis3302Decoder, Sis3302Event};
use std::path::PathBuf;

/// Container for decoded events.
///
/// Scalar fields are stored as separate columns; waveforms, when captured,
/// are kept per event and fetched with `waveform(i)`.
#[pyclass]
pub struct Events {
    timestamp: Vec<u64>,
    board: Vec<u16>,
    channel: Vec<u16>,
    energy: Vec<u32>,
    energy_initial: Vec<u32>,
    flags: Vec<u32>,
    waveforms: Vec<Option<Vec<u16>>>,
    energy_waveforms: Vec<Option<Vec<f64>>>,
    stats: DecodeStats,
}

#[pymethods]
impl Events {
    /// Returns the number of events.
    fn __len__(&self) -> usize {
        self.timestamp.len()
    }

    /// Returns a string representation.
    fn __repr__(&self) -> String {
        format!(
            "Events(count={}, records={}, corrupt={})",
            self.timestamp.len(),
            self.stats.records,
            self.stats.invalid
        )
    }

    /// Returns the 48-bit timestamps as a numpy array.
    #[getter]
    fn timestamp<'py>(&self, py: Python<'py>) -> &'py PyArray1<u64> {
        self.timestamp.clone().into_pyarray(py)
    }

    /// Returns the board ids as a numpy array.
    #[getter]
    fn board<'py>(&self, py: Python<'py>) -> &'py PyArray1<u16> {
        self.board.clone().into_pyarray(py)
    }

    /// Returns the channel numbers as a numpy array.
    #[getter]
    fn channel<'py>(&self, py: Python<'py>) -> &'py PyArray1<u16> {
        self.channel.clone().into_pyarray(py)
    }

    /// Returns the maximum energies as a numpy array.
    #[getter]
    fn energy<'py>(&self, py: Python<'py>) -> &'py PyArray1<u32> {
        self.energy.clone().into_pyarray(py)
    }

    /// Returns the energies at the start of the gate as a numpy array.
    #[getter]
    fn energy_initial<'py>(&self, py: Python<'py>) -> &'py PyArray1<u32> {
        self.energy_initial.clone().into_pyarray(py)
    }

    /// Returns the raw flags words as a numpy array.
    #[getter]
    fn flags<'py>(&self, py: Python<'py>) -> &'py PyArray1<u32> {
        self.flags.clone().into_pyarray(py)
    }

    /// Returns the number of corrupt records that were discarded.
    #[getter]
    fn corrupt_records(&self) -> u64 {
        self.stats.invalid
    }

    /// Returns the raw waveform of event `index`, or None if not captured.
    fn waveform<'py>(&self, py: Python<'py>, index: usize) -> PyResult<Option<&'py PyArray1<u16>>> {
        let waveform = self
            .waveforms
            .get(index)
            .ok_or_else(|| PyIndexError::new_err("event index out of range"))?;
        Ok(waveform.clone().map(|w| w.into_pyarray(py)))
    }

    /// Returns the energy-filter waveform of event `index`, or None if not captured.
    fn energy_waveform<'py>(
        &self,
        py: Python<'py>,
        index: usize,
    ) -> PyResult<Option<&'py PyArray1<f64>>> {
        let waveform = self
            .energy_waveforms
            .get(index)
            .ok_or_else(|| PyIndexError::new_err("event index out of range"))?;
        Ok(waveform.clone().map(|w| w.into_pyarray(py)))
    }

    /// Returns all scalar columns as a dictionary.
    ///
    /// This is useful for creating a pandas DataFrame.
    fn to_dict<'py>(&self, py: Python<'py>) -> PyResult<PyObject> {
        let dict = PyDict::new(py);
        dict.set_item("timestamp", self.timestamp.clone().into_pyarray(py))?;
        dict.set_item("board", self.board.clone().into_pyarray(py))?;
        dict.set_item("channel", self.channel.clone().into_pyarray(py))?;
        dict.set_item("energy", self.energy.clone().into_pyarray(py))?;
        dict.set_item("energy_initial", self.energy_initial.clone().into_pyarray(py))?;
        dict.set_item("flags", self.flags.clone().into_pyarray(py))?;
        Ok(dict.into())
    }
}

impl Events {
    /// Creates an Events container from decoded events.
    fn from_events(events: Vec<Sis3302Event>, stats: DecodeStats) -> Self {
        let len = events.len();
        let mut out = Self {
            timestamp: Vec::with_capacity(len),
            board: Vec::with_capacity(len),
            channel: Vec::with_capacity(len),
            energy: Vec::with_capacity(len),
            energy_initial: Vec::with_capacity(len),
            flags: Vec::with_capacity(len),
            waveforms: Vec::with_capacity(len),
            energy_waveforms: Vec::with_capacity(len),
            stats,
        };

        for event in events {
            out.timestamp.push(event.timestamp);
            out.board.push(event.board_id);
            out.channel.push(event.channel);
            out.energy.push(event.energy_max);
            out.energy_initial.push(event.energy_initial);
            out.flags.push(event.flags.bits());
            out.waveforms.push(event.waveform);
            out.energy_waveforms.push(event.energy_waveform);
        }

        out
    }
}

fn decoder(waveforms: bool, data_id: Option<u32>) -> Sis3302Decoder {
    Sis3302Decoder::with_config(DecoderConfig {
        capture_waveforms: waveforms,
        data_id,
        ..Default::default()
    })
}

/// Decodes a SIS3302 record file and returns the events.
///
/// Args:
///     path: Path to the record file
///     waveforms: Capture raw and energy-filter waveforms (default: False)
///     data_id: Only decode records with this data id (default: all)
///
/// Returns:
///     Events: Container with timestamp, board, channel, energy and flags arrays
///
/// Example:
///     >>> import sis3302
///     >>> events = sis3302.decode_file("run_1234.dat", waveforms=True)
///     >>> print(f"Decoded {len(events)} events")
///     >>> trace = events.waveform(0)
#[pyfunction]
#[pyo3(signature = (path, waveforms=false, data_id=None))]
fn decode_file(
    py: Python<'_>,
    path: &str,
    waveforms: bool,
    data_id: Option<u32>,
) -> PyResult<Py<Events>> {
    let path = PathBuf::from(path);

    let result = decoder(waveforms, data_id)
        .decode_file(&path)
        .map_err(|e| PyIOError::new_err(format!("Failed to decode file: {}", e)))?;

    Py::new(py, Events::from_events(result.events, result.stats))
}

/// Decodes raw SIS3302 record bytes and returns the events.
///
/// Args:
///     data: Little-endian bytes containing concatenated records
///     waveforms: Capture raw and energy-filter waveforms (default: False)
///
/// Returns:
///     Events: Container with decoded events
#[pyfunction]
#[pyo3(signature = (data, waveforms=false))]
fn decode_bytes(py: Python<'_>, data: &[u8], waveforms: bool) -> PyResult<Py<Events>> {
    let result = decoder(waveforms, None).decode_bytes(data);
    Py::new(py, Events::from_events(result.events, result.stats))
}

/// SIS3302 decoder module for Python.
#[pymodule]
fn sis3302(_py: Python<'_>, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(decode_file, m)?)?;
    m.add_function(wrap_pyfunction!(decode_bytes, m)?)?;
    m.add_class::<Events>()?;
    Ok(())
}
