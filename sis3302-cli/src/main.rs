//! SIS3302 decoder CLI application.
//!
//! Decodes SIS3302 digitizer record files to CSV or binary event tables.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use sis3302_core::decoder::bytes_to_words;
use sis3302_core::types::DATA_OBJECT_PATH;
use sis3302_core::{
    output, ColumnSet, DataProcessor, EnergyProcessor, EnergyProcessorConfig, ProcessorManager,
    ReturnCode, RunContext,
};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// SIS3302 record file decoder.
///
/// Decodes a stream of SIS3302 energy records into a human-readable CSV or a
/// compact binary event table.
#[derive(Parser, Debug)]
#[command(name = "sis3302")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input record file (little-endian 32-bit words)
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output file path (.csv, .bin)
    ///
    /// The output format is determined by the file extension:
    /// - .csv: Comma-separated values (human-readable)
    /// - .bin: Binary format (efficient, for programmatic access)
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Columns for CSV output.
    ///
    /// Comma-separated column names: t, board, ch, e, ei, flags, pileup, ft
    #[arg(short, long, default_value = "t,board,ch,e,flags", env = "SIS3302_COLUMNS")]
    columns: String,

    /// Write raw waveforms to this CSV file
    #[arg(short, long, value_name = "PATH")]
    waveforms: Option<PathBuf>,

    /// Only decode records with this data id
    #[arg(short, long, env = "SIS3302_DATA_ID")]
    data_id: Option<u32>,

    /// Run number reported in logs
    #[arg(short, long, default_value_t = 0)]
    run: u32,

    /// Consecutive bad records tolerated before aborting (0 = never abort)
    #[arg(long, default_value_t = 1000, env = "SIS3302_MAX_FAILURES")]
    max_failures: u32,

    /// Log every record header at debug level
    #[arg(long)]
    dump: bool,

    /// Suppress progress output
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let columns = ColumnSet::from_str(&args.columns)
        .context("Invalid column list. Use comma-separated: t,board,ch,e")?;

    let progress = if args.quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .context("Invalid progress template")?,
        );
        pb.set_message("Decoding...");
        pb
    };

    let start_time = Instant::now();

    progress.set_message(format!(
        "Reading {:?}...",
        args.input.file_name().unwrap_or_default()
    ));
    let bytes = std::fs::read(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let leftover_bytes = bytes.len() % 4;
    if leftover_bytes != 0 {
        warn!(
            bytes = leftover_bytes,
            "input length is not a whole number of words"
        );
    }
    let words = bytes_to_words(&bytes);

    let mut processor = EnergyProcessor::new(EnergyProcessorConfig {
        capture_waveforms: args.waveforms.is_some(),
        max_consecutive_failures: (args.max_failures > 0).then_some(args.max_failures),
    });
    processor.state_mut().set_debug_record(args.dump);

    let mut context = RunContext::new(args.run);
    if let Some(id) = args.data_id {
        context = context.with_entry(DATA_OBJECT_PATH, id.to_string());
    }

    progress.set_message(format!("Decoding {} words...", words.len()));
    let (code, stream) = {
        let mut manager = ProcessorManager::new();
        manager.add(&mut processor);
        manager.start_processing();
        manager.start_run(&context);
        let code = manager.process_stream(&words);
        manager.end_run();
        manager.end_processing();
        (code, manager.stream_stats())
    };

    if code == ReturnCode::Alarm {
        progress.abandon_with_message("Aborted: too many consecutive bad records");
        anyhow::bail!(
            "Decoding aborted after {} consecutive bad records",
            args.max_failures
        );
    }

    let stats = processor.stats();
    let events = processor.take_events();
    let decode_duration = start_time.elapsed();

    if !args.quiet {
        progress.set_message(format!(
            "Decoded {} events from {} records in {:.2}s",
            events.len(),
            stream.records,
            decode_duration.as_secs_f64()
        ));
    }

    let output_ext = args
        .output
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("csv");

    progress.set_message(format!(
        "Writing to {:?}...",
        args.output.file_name().unwrap_or_default()
    ));

    match output_ext.to_lowercase().as_str() {
        "csv" => {
            output::write_csv(&args.output, &events, columns)
                .context("Failed to write CSV output")?;
        }
        "bin" => {
            output::write_binary(&args.output, &events)
                .context("Failed to write binary output")?;
        }
        _ => {
            anyhow::bail!(
                "Unsupported output format: .{}. Use .csv or .bin",
                output_ext
            );
        }
    }

    if let Some(waveform_path) = &args.waveforms {
        let written = output::write_waveform_csv(waveform_path, &events)
            .context("Failed to write waveform CSV")?;
        info!(waveforms = written, path = %waveform_path.display(), "wrote waveforms");
    }

    let total_duration = start_time.elapsed();

    progress.finish_with_message(format!(
        "Done! Decoded {} events in {:.2}s",
        events.len(),
        total_duration.as_secs_f64()
    ));

    if !args.quiet {
        let records_per_sec = stream.records as f64 / total_duration.as_secs_f64();
        eprintln!();
        eprintln!("Summary:");
        eprintln!("  Input:        {:?}", args.input);
        eprintln!("  Output:       {:?}", args.output);
        eprintln!("  Run:          {}", args.run);
        if let Some(mode) = processor.trigger_mode() {
            eprintln!("  Trigger mode: {:?}", mode);
        }
        eprintln!("  Records:      {}", stream.records);
        eprintln!("  Events:       {}", events.len());
        eprintln!("  Skipped:      {}", stream.skipped);
        eprintln!("  Corrupt:      {}", stats.invalid);
        eprintln!("  Truncated:    {}", stats.truncated);
        eprintln!("  Leftover:     {} words, {} bytes", stream.leftover_words, leftover_bytes);
        eprintln!("  Duration:     {:.3}s", total_duration.as_secs_f64());
        eprintln!("  Throughput:   {:.0} records/s", records_per_sec);
    }

    Ok(())
}
