//! CSV output format for interpreted traces
//!
//! One row per sequence for spreadsheet analysis, plus a per-class table for
//! `-c` mode.

use crate::sequence::EventSequence;
use crate::stats::StatsTracker;

/// CSV record for a single sequence
#[derive(Debug, Clone)]
pub struct CsvSequence {
    pub id: String,
    pub class: String,
    pub pid: Option<u32>,
    pub tid: Option<u32>,
    pub target: String,
    pub start: String,
    pub duration_us: u64,
    pub members: usize,
    pub incomplete: usize,
    pub bytes: Option<u64>,
}

impl From<&EventSequence> for CsvSequence {
    fn from(sequence: &EventSequence) -> Self {
        Self {
            id: sequence.id.clone(),
            class: sequence.class.clone(),
            pid: sequence.pid,
            tid: sequence.tid,
            target: sequence.target.label(),
            start: sequence.start.to_string(),
            duration_us: sequence.duration_nanos() / 1_000,
            members: sequence.member_count(),
            incomplete: sequence.incomplete_members(),
            bytes: sequence.bytes,
        }
    }
}

/// CSV output formatter
#[derive(Debug, Default)]
pub struct CsvOutput {
    sequences: Vec<CsvSequence>,
}

impl CsvOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sequence(&mut self, sequence: CsvSequence) {
        self.sequences.push(sequence);
    }

    fn header() -> &'static str {
        "id,class,pid,tid,target,start,duration_us,members,incomplete,bytes"
    }

    /// Escape CSV field (handle commas, quotes, newlines)
    pub(crate) fn escape_field(field: &str) -> String {
        if field.contains(',') || field.contains('"') || field.contains('\n') {
            format!("\"{}\"", field.replace('"', "\"\""))
        } else {
            field.to_string()
        }
    }

    fn format_sequence(sequence: &CsvSequence) -> String {
        let fields = [
            Self::escape_field(&sequence.id),
            Self::escape_field(&sequence.class),
            optional(sequence.pid),
            optional(sequence.tid),
            Self::escape_field(&sequence.target),
            sequence.start.clone(),
            sequence.duration_us.to_string(),
            sequence.members.to_string(),
            sequence.incomplete.to_string(),
            optional(sequence.bytes),
        ];
        fields.join(",")
    }

    /// Generate CSV output as string
    pub fn to_csv(&self) -> String {
        let mut output = String::new();
        output.push_str(Self::header());
        output.push('\n');
        for sequence in &self.sequences {
            output.push_str(&Self::format_sequence(sequence));
            output.push('\n');
        }
        output
    }
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// CSV statistics output formatter (for -c mode)
#[derive(Debug)]
pub struct CsvStatsOutput<'a> {
    tracker: &'a StatsTracker,
}

impl<'a> CsvStatsOutput<'a> {
    pub fn new(tracker: &'a StatsTracker) -> Self {
        Self { tracker }
    }

    pub fn to_csv(&self) -> String {
        let mut output = String::from("class,operations,sequences,errors,incomplete,bytes,total_time\n");
        for (class, stats) in self.tracker.stats_map() {
            output.push_str(&format!(
                "{},{},{},{},{},{},{}us\n",
                CsvOutput::escape_field(class),
                stats.operations,
                stats.sequences,
                stats.errors,
                stats.incomplete,
                stats.bytes,
                stats.total_time_ns / 1_000
            ));
        }
        output
    }
}
