//! Record processing pipeline.
//!
//! A [`DataProcessor`] consumes records of one data type across a run. The
//! [`ProcessorManager`] drives the processors through their lifecycle:
//!
//! ```text
//! start_processing -> (start_run -> process_record* -> end_run)* -> end_processing
//! ```
//!
//! and owns the privileged operations, installing the run context and
//! resolving each processor's data id, that processors cannot perform on
//! themselves.

use crate::decoder::{bind_valid, RecordFrames};
use crate::digitizer::event_views;
use crate::parser;
use crate::types::{
    DecodeStats, Sis3302Event, TriggerMode, DATA_OBJECT_PATH, DICTIONARY_OBJECT_PATH,
    TRIGGER_MODE_PATH,
};
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

/// Result of a processing step, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ReturnCode {
    /// Normal execution
    #[default]
    Success,
    /// Something failed, but processing may continue
    Failure,
    /// Stop handling the current record and move on to the next one
    Break,
    /// Something is wrong; stop processing data
    Alarm,
}

/// Run-scoped identity and dictionary.
///
/// The dictionary is an opaque path-keyed lookup supplied by the run host.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    run_number: u32,
    dictionary: BTreeMap<String, String>,
}

impl RunContext {
    pub fn new(run_number: u32) -> Self {
        Self {
            run_number,
            dictionary: BTreeMap::new(),
        }
    }

    /// Adds a dictionary entry.
    pub fn with_entry(mut self, path: impl Into<String>, value: impl Into<String>) -> Self {
        self.dictionary.insert(path.into(), value.into());
        self
    }

    pub fn run_number(&self) -> u32 {
        self.run_number
    }

    pub fn lookup(&self, path: &str) -> Option<&str> {
        self.dictionary.get(path).map(String::as_str)
    }
}

/// Bookkeeping shared by every processor.
#[derive(Debug, Clone)]
pub struct ProcessorState {
    data_id: Option<u32>,
    do_process: bool,
    do_process_run: bool,
    run_context: Option<RunContext>,
    debug_record: bool,
}

impl Default for ProcessorState {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessorState {
    pub fn new() -> Self {
        Self {
            data_id: None,
            do_process: true,
            do_process_run: true,
            run_context: None,
            debug_record: false,
        }
    }

    /// Data id this processor accepts. `None` accepts every record.
    pub fn data_id(&self) -> Option<u32> {
        self.data_id
    }

    pub fn run_context(&self) -> Option<&RunContext> {
        self.run_context.as_ref()
    }

    /// True while the processor is alive for both the session and the run.
    pub fn is_active(&self) -> bool {
        self.do_process && self.do_process_run
    }

    pub fn is_processing(&self) -> bool {
        self.do_process
    }

    /// Disables the processor for the rest of the session.
    pub fn kill_processor(&mut self) {
        self.do_process = false;
    }

    /// Disables the processor until the next run.
    pub fn kill_run(&mut self) {
        self.do_process_run = false;
    }

    pub fn set_debug_record(&mut self, debug: bool) {
        self.debug_record = debug;
    }

    pub fn debug_record(&self) -> bool {
        self.debug_record
    }

    pub(crate) fn set_do_process(&mut self) {
        self.do_process = true;
        self.do_process_run = true;
    }

    pub(crate) fn set_do_process_run(&mut self) {
        self.do_process_run = true;
    }

    pub(crate) fn set_run_context(&mut self, context: RunContext) {
        self.run_context = Some(context);
    }

    pub(crate) fn set_data_id(&mut self, data_id: Option<u32>) {
        self.data_id = data_id;
    }
}

/// A consumer of one record type.
///
/// Lifecycle hooks default to [`ReturnCode::Success`].
pub trait DataProcessor {
    /// Name used in log messages.
    fn name(&self) -> &str;

    /// Dictionary path under which the run host registers this record type.
    fn data_object_path(&self) -> &str;

    fn state(&self) -> &ProcessorState;

    fn state_mut(&mut self) -> &mut ProcessorState;

    fn start_processing(&mut self) -> ReturnCode {
        ReturnCode::Success
    }

    fn start_run(&mut self) -> ReturnCode {
        ReturnCode::Success
    }

    /// Handles one record already matched to this processor's data id.
    fn process_my_record(&mut self, record: &[u32]) -> ReturnCode;

    fn end_run(&mut self) -> ReturnCode {
        ReturnCode::Success
    }

    fn end_processing(&mut self) -> ReturnCode {
        ReturnCode::Success
    }
}

/// Framing counters kept by the [`ProcessorManager`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Records handed to the manager
    pub records: u64,
    /// Records no live processor accepted
    pub skipped: u64,
    /// Trailing words that did not form a complete record
    pub leftover_words: u64,
}

/// Drives a set of processors through a session.
///
/// The manager borrows its processors, so callers keep ownership and can
/// collect results once the session ends.
#[derive(Default)]
pub struct ProcessorManager<'p> {
    processors: Vec<&'p mut dyn DataProcessor>,
    stats: StreamStats,
}

impl<'p> ProcessorManager<'p> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters accumulated over the session.
    pub fn stream_stats(&self) -> StreamStats {
        self.stats
    }

    pub fn add(&mut self, processor: &'p mut dyn DataProcessor) {
        self.processors.push(processor);
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Starts every processor. One returning `Failure` or worse is killed
    /// for the session.
    pub fn start_processing(&mut self) -> ReturnCode {
        let mut worst = ReturnCode::Success;
        for processor in self.processors.iter_mut() {
            processor.state_mut().set_do_process();
            let code = processor.start_processing();
            if code >= ReturnCode::Failure {
                warn!(processor = processor.name(), ?code, "start failed, processor disabled");
                processor.state_mut().kill_processor();
            }
            worst = worst.max(code);
        }
        worst
    }

    /// Installs the run context, resolves data ids and starts the run.
    ///
    /// A processor whose data-object path is absent from the dictionary
    /// accepts every record. One failing `start_run` sits the run out.
    pub fn start_run(&mut self, context: &RunContext) -> ReturnCode {
        info!(run = context.run_number(), "starting run");
        let mut worst = ReturnCode::Success;
        for processor in self.processors.iter_mut() {
            if !processor.state().is_processing() {
                continue;
            }

            let data_id = context
                .lookup(processor.data_object_path())
                .and_then(|value| value.trim().parse::<u32>().ok());
            debug!(processor = processor.name(), ?data_id, "resolved data id");

            let state = processor.state_mut();
            state.set_do_process_run();
            state.set_run_context(context.clone());
            state.set_data_id(data_id);

            let code = processor.start_run();
            if code >= ReturnCode::Failure {
                warn!(processor = processor.name(), ?code, "run start failed");
                processor.state_mut().kill_run();
            }
            worst = worst.max(code);
        }
        worst
    }

    /// Forwards one record to every live processor that accepts its data id.
    ///
    /// A processor returning `Break` ends delivery of this record; `Alarm`
    /// also disables that processor for the rest of the run. A record no
    /// processor accepts is counted as skipped.
    pub fn process_record(&mut self, record: &[u32]) -> ReturnCode {
        let Some(&first) = record.first() else {
            return ReturnCode::Failure;
        };
        let data_id = parser::envelope_data_id(first);
        self.stats.records += 1;

        let mut worst = ReturnCode::Success;
        let mut delivered = false;
        for processor in self.processors.iter_mut() {
            let state = processor.state();
            if !state.is_active() || state.data_id().is_some_and(|id| id != data_id) {
                continue;
            }

            delivered = true;
            let code = processor.process_my_record(record);
            worst = worst.max(code);
            match code {
                ReturnCode::Alarm => {
                    error!(processor = processor.name(), "alarm raised, stopping run");
                    processor.state_mut().kill_run();
                }
                ReturnCode::Break => break,
                _ => {}
            }
        }

        if !delivered {
            self.stats.skipped += 1;
        }
        worst
    }

    /// Frames a word stream and forwards each record.
    ///
    /// Stops early once no processor is live for the run. Words left after
    /// the last complete record are added to `leftover_words`.
    pub fn process_stream(&mut self, words: &[u32]) -> ReturnCode {
        let mut worst = ReturnCode::Success;
        let mut frames = RecordFrames::new(words);
        for record in frames.by_ref() {
            worst = worst.max(self.process_record(record));
            if !self.processors.iter().any(|p| p.state().is_active()) {
                break;
            }
        }
        self.stats.leftover_words += frames.leftover() as u64;
        worst
    }

    pub fn end_run(&mut self) -> ReturnCode {
        let mut worst = ReturnCode::Success;
        for processor in self.processors.iter_mut() {
            if processor.state().is_processing() {
                worst = worst.max(processor.end_run());
            }
        }
        worst
    }

    pub fn end_processing(&mut self) -> ReturnCode {
        let mut worst = ReturnCode::Success;
        for processor in self.processors.iter_mut() {
            if processor.state().is_processing() {
                worst = worst.max(processor.end_processing());
            }
        }
        worst
    }
}

/// Configuration for [`EnergyProcessor`].
#[derive(Debug, Clone)]
pub struct EnergyProcessorConfig {
    /// Copy raw and energy waveforms into each event
    pub capture_waveforms: bool,
    /// Consecutive bad records tolerated before raising an alarm; `None` never alarms
    pub max_consecutive_failures: Option<u32>,
}

impl Default for EnergyProcessorConfig {
    fn default() -> Self {
        Self {
            capture_waveforms: false,
            max_consecutive_failures: Some(1000),
        }
    }
}

/// Collects SIS3302 energy events.
#[derive(Debug, Default)]
pub struct EnergyProcessor {
    config: EnergyProcessorConfig,
    state: ProcessorState,
    events: Vec<Sis3302Event>,
    stats: DecodeStats,
    consecutive_failures: u32,
    trigger_mode: Option<TriggerMode>,
}

impl EnergyProcessor {
    pub fn new(config: EnergyProcessorConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn events(&self) -> &[Sis3302Event] {
        &self.events
    }

    /// Takes the collected events, leaving the processor empty.
    pub fn take_events(&mut self) -> Vec<Sis3302Event> {
        std::mem::take(&mut self.events)
    }

    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    /// Trigger source registered for the current run, if the dictionary has one.
    pub fn trigger_mode(&self) -> Option<TriggerMode> {
        self.trigger_mode
    }

    fn record_failure(&mut self) -> ReturnCode {
        self.consecutive_failures += 1;
        match self.config.max_consecutive_failures {
            Some(max) if self.consecutive_failures >= max => {
                error!(
                    failures = self.consecutive_failures,
                    "too many consecutive bad records"
                );
                ReturnCode::Alarm
            }
            _ => ReturnCode::Failure,
        }
    }
}

impl DataProcessor for EnergyProcessor {
    fn name(&self) -> &str {
        "sis3302-energy"
    }

    fn data_object_path(&self) -> &str {
        DATA_OBJECT_PATH
    }

    fn state(&self) -> &ProcessorState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ProcessorState {
        &mut self.state
    }

    fn start_run(&mut self) -> ReturnCode {
        self.consecutive_failures = 0;
        self.trigger_mode = None;
        if let Some(context) = self.state.run_context() {
            let run = context.run_number();
            match context.lookup(DICTIONARY_OBJECT_PATH) {
                Some(model) => debug!(run, model, "card model settings"),
                None => debug!(run, "no card model settings in dictionary"),
            }
            match context.lookup(TRIGGER_MODE_PATH) {
                Some(value) => match TriggerMode::from_dictionary(value) {
                    Some(mode) => {
                        info!(run, ?mode, "trigger mode");
                        self.trigger_mode = Some(mode);
                    }
                    None => warn!(run, value, "unrecognised trigger mode"),
                },
                None => debug!(run, "no trigger mode in dictionary"),
            }
        }
        ReturnCode::Success
    }

    fn process_my_record(&mut self, words: &[u32]) -> ReturnCode {
        let index = self.stats.records;
        self.stats.records += 1;

        let record = match bind_valid(words) {
            Ok(record) => record,
            Err(e) => {
                self.stats.count_discarded(index, &e);
                return self.record_failure();
            }
        };

        if self.state.debug_record() {
            debug!("{}", record.dump_buffer_header());
            for view in event_views(&record) {
                debug!(
                    time = view.time,
                    energy = view.energy,
                    channel = view.channel,
                    flags = view.flags,
                    samples = view.waveform_length,
                    "event"
                );
            }
        }

        self.consecutive_failures = 0;
        self.events.push(record.to_event(self.config.capture_waveforms));
        ReturnCode::Success
    }

    fn end_run(&mut self) -> ReturnCode {
        info!(
            records = self.stats.records,
            events = self.events.len(),
            invalid = self.stats.invalid,
            truncated = self.stats.truncated,
            "run finished"
        );
        ReturnCode::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::TRAILER_MAGIC;
    use crate::record::tests::build_record;

    fn record(data_id: u32, channel: u32, valid: bool) -> Vec<u32> {
        let sentinel = if valid { TRAILER_MAGIC } else { 0 };
        let mut words = build_record(false, 2, 1, [channel, 0], [50, 40, 0x1, sentinel]);
        words[0] |= data_id << 18;
        words
    }

    /// Counts records and returns a fixed code.
    struct Counter {
        state: ProcessorState,
        code: ReturnCode,
        start: ReturnCode,
        seen: usize,
    }

    impl Counter {
        fn new(code: ReturnCode) -> Self {
            Self {
                state: ProcessorState::new(),
                code,
                start: ReturnCode::Success,
                seen: 0,
            }
        }
    }

    impl DataProcessor for Counter {
        fn name(&self) -> &str {
            "counter"
        }
        fn data_object_path(&self) -> &str {
            "Counter:Data"
        }
        fn state(&self) -> &ProcessorState {
            &self.state
        }
        fn state_mut(&mut self) -> &mut ProcessorState {
            &mut self.state
        }
        fn start_processing(&mut self) -> ReturnCode {
            self.start
        }
        fn process_my_record(&mut self, _record: &[u32]) -> ReturnCode {
            self.seen += 1;
            self.code
        }
    }

    #[test]
    fn test_return_code_ordering() {
        assert!(ReturnCode::Success < ReturnCode::Failure);
        assert!(ReturnCode::Failure < ReturnCode::Break);
        assert!(ReturnCode::Break < ReturnCode::Alarm);
        assert_eq!(ReturnCode::default(), ReturnCode::Success);
    }

    #[test]
    fn test_run_context_lookup() {
        let context = RunContext::new(42).with_entry(DATA_OBJECT_PATH, "7");
        assert_eq!(context.run_number(), 42);
        assert_eq!(context.lookup(DATA_OBJECT_PATH), Some("7"));
        assert_eq!(context.lookup("missing"), None);
    }

    #[test]
    fn test_failed_start_kills_processor() {
        let mut bad = Counter::new(ReturnCode::Success);
        bad.start = ReturnCode::Failure;
        let mut good = Counter::new(ReturnCode::Success);

        {
            let mut manager = ProcessorManager::new();
            manager.add(&mut bad);
            manager.add(&mut good);
            assert_eq!(manager.start_processing(), ReturnCode::Failure);
            manager.start_run(&RunContext::new(1));
            manager.process_record(&record(0, 0, true));
        }

        assert_eq!(bad.seen, 0);
        assert!(!bad.state().is_processing());
        assert_eq!(good.seen, 1);
        assert!(good.state().run_context().is_some());
    }

    #[test]
    fn test_data_id_routing() {
        let mut energy = EnergyProcessor::default();
        let mut other = Counter::new(ReturnCode::Success);

        {
            let mut manager = ProcessorManager::new();
            manager.add(&mut energy);
            manager.add(&mut other);
            manager.start_processing();
            let context = RunContext::new(3)
                .with_entry(DATA_OBJECT_PATH, "5")
                .with_entry("Counter:Data", "9");
            manager.start_run(&context);

            let mut words = record(5, 1, true);
            words.extend(record(9, 2, true));
            words.extend(record(5, 3, true));
            assert_eq!(manager.process_stream(&words), ReturnCode::Success);
            manager.end_run();
            manager.end_processing();
        }

        assert_eq!(energy.state().data_id(), Some(5));
        let channels: Vec<u16> = energy.events().iter().map(|e| e.channel).collect();
        assert_eq!(channels, vec![1, 3]);
        assert_eq!(other.seen, 1);
    }

    #[test]
    fn test_break_stops_delivery() {
        let mut first = Counter::new(ReturnCode::Break);
        let mut second = Counter::new(ReturnCode::Success);

        {
            let mut manager = ProcessorManager::new();
            manager.add(&mut first);
            manager.add(&mut second);
            manager.start_processing();
            manager.start_run(&RunContext::new(1));
            assert_eq!(manager.process_record(&record(0, 0, true)), ReturnCode::Break);
        }

        assert_eq!(first.seen, 1);
        assert_eq!(second.seen, 0);
    }

    #[test]
    fn test_energy_processor_failures() {
        let mut energy = EnergyProcessor::default();
        assert_eq!(energy.process_my_record(&record(0, 1, false)), ReturnCode::Failure);
        assert_eq!(energy.process_my_record(&[0, 0]), ReturnCode::Failure);
        assert_eq!(energy.process_my_record(&record(0, 2, true)), ReturnCode::Success);

        let stats = energy.stats();
        assert_eq!(stats.records, 3);
        assert_eq!(stats.invalid, 1);
        assert_eq!(stats.truncated, 1);
        assert_eq!(energy.take_events().len(), 1);
        assert!(energy.events().is_empty());
    }

    #[test]
    fn test_alarm_after_consecutive_failures() {
        let mut energy = EnergyProcessor::new(EnergyProcessorConfig {
            max_consecutive_failures: Some(2),
            ..Default::default()
        });

        {
            let mut manager = ProcessorManager::new();
            manager.add(&mut energy);
            manager.start_processing();
            manager.start_run(&RunContext::new(8));

            let mut words = record(0, 1, false);
            words.extend(record(0, 2, false));
            words.extend(record(0, 3, true));
            assert_eq!(manager.process_stream(&words), ReturnCode::Alarm);
        }

        assert!(!energy.state().is_active());
        assert!(energy.events().is_empty());
        assert_eq!(energy.stats().records, 2);
    }

    #[test]
    fn test_stream_reports_partial_tail() {
        let mut energy = EnergyProcessor::default();
        let stream = {
            let mut manager = ProcessorManager::new();
            manager.add(&mut energy);
            manager.start_processing();
            manager.start_run(&RunContext::new(2));

            let mut words = record(0, 1, true);
            words.extend_from_slice(&record(0, 2, true)[..5]);
            assert_eq!(manager.process_stream(&words), ReturnCode::Success);
            manager.stream_stats()
        };

        assert_eq!(stream.records, 1);
        assert_eq!(stream.skipped, 0);
        assert_eq!(stream.leftover_words, 5);
        assert_eq!(energy.events().len(), 1);
    }

    #[test]
    fn test_unaccepted_records_counted_as_skipped() {
        let mut energy = EnergyProcessor::default();
        let stream = {
            let mut manager = ProcessorManager::new();
            manager.add(&mut energy);
            manager.start_processing();
            manager.start_run(&RunContext::new(4).with_entry(DATA_OBJECT_PATH, "5"));

            let mut words = record(5, 1, true);
            words.extend(record(9, 2, true));
            words.extend(record(9, 3, true));
            manager.process_stream(&words);
            manager.stream_stats()
        };

        assert_eq!(stream.records, 3);
        assert_eq!(stream.skipped, 2);
        assert_eq!(energy.stats().records, 1);
    }

    #[test]
    fn test_trigger_mode_from_dictionary() {
        let mut energy = EnergyProcessor::default();
        {
            let mut manager = ProcessorManager::new();
            manager.add(&mut energy);
            manager.start_processing();
            manager.start_run(&RunContext::new(5).with_entry(TRIGGER_MODE_PATH, "2"));
        }
        assert_eq!(energy.trigger_mode(), Some(TriggerMode::Validation));

        {
            let mut manager = ProcessorManager::new();
            manager.add(&mut energy);
            manager.start_processing();
            manager.start_run(&RunContext::new(6).with_entry(TRIGGER_MODE_PATH, "7"));
        }
        assert_eq!(energy.trigger_mode(), None);
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let mut energy = EnergyProcessor::new(EnergyProcessorConfig {
            max_consecutive_failures: Some(2),
            ..Default::default()
        });
        assert_eq!(energy.process_my_record(&record(0, 1, false)), ReturnCode::Failure);
        assert_eq!(energy.process_my_record(&record(0, 2, true)), ReturnCode::Success);
        assert_eq!(energy.process_my_record(&record(0, 3, false)), ReturnCode::Failure);
    }
}
