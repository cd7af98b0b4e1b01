//! Integration tests for the SIS3302 decoder using synthetic record files.
//!
//! Run with: cargo test --test integration_tests

use sis3302_core::layout::TRAILER_MAGIC;
use sis3302_core::output;
use sis3302_core::{
    ColumnSet, DecoderConfig, EnergyProcessor, EnergyProcessorConfig, ProcessorManager,
    ReturnCode, RunContext, Sis3302Decoder, Sis3302Record,
};
use std::io::Write;
use std::str::FromStr;

const DATA_ID: u32 = 12;

/// Builds one record: `samples` raw samples ramping from `channel * 100`,
/// `energy_samples` filter samples, and the given trailer sentinel.
fn build_record(
    wrap: bool,
    channel: u32,
    timestamp: u64,
    samples: usize,
    energy_samples: usize,
    sentinel: u32,
) -> Vec<u32> {
    let hw0 = (((timestamp >> 32) as u32) << 16) | (7 << 3) | channel;
    let hw1 = timestamp as u32;

    let mut words = vec![0, wrap as u32, (samples / 2) as u32, energy_samples as u32, hw0, hw1];
    if wrap {
        words.extend_from_slice(&[samples as u32 / 4, 0]);
    }
    let base = channel * 100;
    for i in (0..samples as u32).step_by(2) {
        words.push((base + i) | ((base + i + 1) << 16));
    }
    words.extend((0..energy_samples as u32).map(|i| 5000 + i));
    words.extend_from_slice(&[900 + channel, 100 + channel, 0x0000_0001, sentinel]);
    words[0] = (DATA_ID << 18) | words.len() as u32;
    words
}

fn write_words(words: &[u32]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    for word in words {
        file.write_all(&word.to_le_bytes()).unwrap();
    }
    file.flush().unwrap();
    file
}

fn mixed_run() -> Vec<u32> {
    let mut words = Vec::new();
    words.extend(build_record(false, 0, 1_000, 16, 4, TRAILER_MAGIC));
    words.extend(build_record(true, 1, 2_000, 32, 8, TRAILER_MAGIC));
    words.extend(build_record(false, 2, 3_000, 8, 2, 0x0BAD_F00D));
    words.extend(build_record(true, 3, 0x0000_7FFF_0000_0001, 64, 0, TRAILER_MAGIC));
    words
}

/// Decoding a file with both header variants and one corrupt record.
#[test]
fn test_decode_file_mixed_headers() {
    let file = write_words(&mixed_run());

    let mut decoder = Sis3302Decoder::new();
    let result = decoder
        .decode_file(file.path())
        .expect("Failed to decode file");

    assert_eq!(result.stats.records, 4);
    assert_eq!(result.stats.invalid, 1);
    assert_eq!(result.stats.leftover_words, 0);

    let channels: Vec<u16> = result.events.iter().map(|e| e.channel).collect();
    assert_eq!(channels, vec![0, 1, 3]);

    let wrapped = &result.events[1];
    assert_eq!(wrapped.wrap, (8, 0));
    assert_eq!(wrapped.energy_max, 901);
    assert_eq!(wrapped.energy_initial, 101);

    assert_eq!(result.events[2].timestamp, 0x0000_7FFF_0000_0001);
    for event in &result.events {
        assert_eq!(event.board_id, 0b1110);
        assert!(event.flags.is_triggered());
        assert!(event.waveform.is_none());
    }
}

/// Waveforms captured through the stream decoder match the record view.
#[test]
fn test_waveform_capture_matches_record_view() {
    let words = build_record(true, 2, 42, 32, 8, TRAILER_MAGIC);
    let file = write_words(&words);

    let mut decoder = Sis3302Decoder::with_config(DecoderConfig {
        capture_waveforms: true,
        ..Default::default()
    });
    let result = decoder.decode_file(file.path()).unwrap();
    let event = &result.events[0];

    let record = Sis3302Record::bind(&words).unwrap();
    let mut samples = vec![0u16; record.waveform_len()];
    assert_eq!(record.copy_waveform(&mut samples), 32);

    assert_eq!(event.waveform.as_deref(), Some(&samples[..]));
    assert_eq!(samples[0], 200);
    assert_eq!(samples[31], 231);

    let energy = event.energy_waveform.as_ref().unwrap();
    assert_eq!(energy.len(), 8);
    assert_eq!(energy[7], 5007.0);
}

/// A truncated final record is reported as leftover, not decoded.
#[test]
fn test_truncated_file_tail() {
    let mut words = build_record(false, 0, 1, 8, 2, TRAILER_MAGIC);
    let second = build_record(false, 1, 2, 8, 2, TRAILER_MAGIC);
    words.extend_from_slice(&second[..second.len() - 3]);
    let file = write_words(&words);

    let mut decoder = Sis3302Decoder::new();
    let result = decoder.decode_file(file.path()).unwrap();

    assert_eq!(result.events.len(), 1);
    assert_eq!(result.stats.leftover_words, (second.len() - 3) as u64);
}

/// The processor pipeline produces the same events as the stream decoder.
#[test]
fn test_processor_pipeline_matches_decoder() {
    let words = mixed_run();

    let mut decoder = Sis3302Decoder::new();
    let mut expected = Vec::new();
    decoder.decode_buffer(&words, &mut expected);

    let mut processor = EnergyProcessor::new(EnergyProcessorConfig::default());
    {
        let mut manager = ProcessorManager::new();
        manager.add(&mut processor);
        assert_eq!(manager.start_processing(), ReturnCode::Success);
        let context = RunContext::new(77).with_entry(
            sis3302_core::types::DATA_OBJECT_PATH,
            DATA_ID.to_string(),
        );
        assert_eq!(manager.start_run(&context), ReturnCode::Success);
        assert_eq!(manager.process_stream(&words), ReturnCode::Failure);
        manager.end_run();
        manager.end_processing();
    }

    assert_eq!(processor.events(), &expected[..]);
    assert_eq!(processor.stats().invalid, 1);
}

/// Both decoding paths report the same framing counters for a cut-off file.
#[test]
fn test_processor_pipeline_reports_truncated_tail() {
    let mut words = mixed_run();
    let partial = build_record(false, 5, 9, 8, 2, TRAILER_MAGIC);
    words.extend_from_slice(&partial[..7]);

    let mut decoder = Sis3302Decoder::new();
    let mut expected = Vec::new();
    decoder.decode_buffer(&words, &mut expected);

    let mut processor = EnergyProcessor::new(EnergyProcessorConfig::default());
    let stream = {
        let mut manager = ProcessorManager::new();
        manager.add(&mut processor);
        manager.start_processing();
        manager.start_run(&RunContext::new(78));
        manager.process_stream(&words);
        manager.end_run();
        manager.stream_stats()
    };

    assert_eq!(stream.leftover_words, 7);
    assert_eq!(stream.leftover_words, decoder.stats().leftover_words);
    assert_eq!(stream.records, decoder.stats().records);
    assert_eq!(stream.skipped, 0);
    assert_eq!(processor.events(), &expected[..]);
}

/// Records with another data id never reach the energy processor.
#[test]
fn test_processor_ignores_foreign_data_id() {
    let words = mixed_run();

    let mut processor = EnergyProcessor::default();
    let stream = {
        let mut manager = ProcessorManager::new();
        manager.add(&mut processor);
        manager.start_processing();
        let context = RunContext::new(1).with_entry(sis3302_core::types::DATA_OBJECT_PATH, "3");
        manager.start_run(&context);
        assert_eq!(manager.process_stream(&words), ReturnCode::Success);
        manager.stream_stats()
    };

    assert!(processor.events().is_empty());
    assert_eq!(processor.stats().records, 0);
    assert_eq!(stream.skipped, 4);
}

/// CSV and binary outputs written from a decoded file.
#[test]
fn test_outputs_round_trip_counts() {
    let file = write_words(&mixed_run());
    let mut decoder = Sis3302Decoder::with_config(DecoderConfig {
        capture_waveforms: true,
        ..Default::default()
    });
    let result = decoder.decode_file(file.path()).unwrap();

    let dir = tempfile::tempdir().unwrap();

    let csv_path = dir.path().join("events.csv");
    output::write_csv(&csv_path, &result.events, ColumnSet::from_str("ch,e").unwrap()).unwrap();
    let csv = std::fs::read_to_string(&csv_path).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines, vec!["channel,energy", "0,900", "1,901", "3,903"]);

    let wf_path = dir.path().join("waveforms.csv");
    let written = output::write_waveform_csv(&wf_path, &result.events).unwrap();
    assert_eq!(written, 3);
    let wf = std::fs::read_to_string(&wf_path).unwrap();
    let first = wf.lines().next().unwrap();
    assert_eq!(first.split(',').count(), 3 + 16);

    let bin_path = dir.path().join("events.bin");
    output::write_binary(&bin_path, &result.events).unwrap();
    let data = std::fs::read(&bin_path).unwrap();
    assert_eq!(&data[0..8], output::BINARY_MAGIC);
    let count = u64::from_le_bytes(data[12..20].try_into().unwrap());
    assert_eq!(count, 3);
    assert_eq!(data.len(), 20 + 3 * output::BINARY_EVENT_SIZE);
}
