//! Per-class operation statistics and run diagnostics
//!
//! `StatsTracker` backs the `-c` summary table; `RunStats` gathers every
//! stage's counters into one report so a run always states how much of the
//! input it could not interpret.

use crate::actors::RegistryStats;
use crate::context::ContextStats;
use crate::descriptors::TableStats;
use crate::operation::{Operation, Outcome};
use crate::parser::ParseStats;
use crate::sequence::{BuilderStats, EventSequence};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Statistics for a single operation class
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClassStats {
    pub operations: u64,
    pub sequences: u64,
    /// Operations whose call returned an error
    pub errors: u64,
    /// Operations with no observed exit
    pub incomplete: u64,
    pub bytes: u64,
    /// Total time inside the calls (nanoseconds)
    pub total_time_ns: u64,
}

/// Summary totals across classes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatTotals {
    pub operations: u64,
    pub sequences: u64,
    pub errors: u64,
    pub total_time_ns: u64,
}

/// Tracks statistics for every operation class
#[derive(Debug, Default)]
pub struct StatsTracker {
    stats: BTreeMap<String, ClassStats>,
}

impl StatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sequence(&mut self, sequence: &EventSequence) {
        self.stats.entry(sequence.class.clone()).or_default().sequences += 1;
        for op in &sequence.members {
            self.record(op);
        }
    }

    /// Record one operation
    pub fn record(&mut self, op: &Operation) {
        let entry = self.stats.entry(op.class.clone()).or_default();
        entry.operations += 1;
        entry.total_time_ns += op.duration_nanos();
        entry.bytes += op.bytes.unwrap_or(0);
        if matches!(op.outcome, Outcome::Failure { .. }) {
            entry.errors += 1;
        }
        if !op.complete {
            entry.incomplete += 1;
        }
    }

    pub fn stats_map(&self) -> &BTreeMap<String, ClassStats> {
        &self.stats
    }

    pub fn totals(&self) -> StatTotals {
        self.stats.values().fold(StatTotals::default(), |acc, s| StatTotals {
            operations: acc.operations + s.operations,
            sequences: acc.sequences + s.sequences,
            errors: acc.errors + s.errors,
            total_time_ns: acc.total_time_ns + s.total_time_ns,
        })
    }

    /// strace-style summary table
    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        if self.stats.is_empty() {
            out.push_str("No operations recorded.\n");
            return out;
        }

        let totals = self.totals();

        // Sort by operation count (descending), then name
        let mut sorted: Vec<_> = self.stats.iter().collect();
        sorted.sort_by(|a, b| b.1.operations.cmp(&a.1.operations).then(a.0.cmp(b.0)));

        let rule = "------ ----------- ----------- --------- --------- --------- ------------ ----------------";
        let _ = writeln!(
            out,
            "% time     seconds  usecs/call       ops      seqs    errors        bytes class"
        );
        let _ = writeln!(out, "{}", rule);

        for (name, stats) in sorted {
            let time_percent = if totals.total_time_ns > 0 {
                (stats.total_time_ns as f64 / totals.total_time_ns as f64) * 100.0
            } else {
                0.0
            };
            let usecs_per_call = if stats.operations > 0 {
                stats.total_time_ns / stats.operations / 1_000
            } else {
                0
            };
            let _ = writeln!(
                out,
                "{:6.2} {:>11.6} {:>11} {:>9} {:>9} {:>9} {:>12} {}",
                time_percent,
                stats.total_time_ns as f64 / 1e9,
                usecs_per_call,
                stats.operations,
                stats.sequences,
                blank_if_zero(stats.errors),
                blank_if_zero(stats.bytes),
                name
            );
        }

        let _ = writeln!(out, "{}", rule);
        let avg_usecs = if totals.operations > 0 {
            totals.total_time_ns / totals.operations / 1_000
        } else {
            0
        };
        let _ = writeln!(
            out,
            "100.00 {:>11.6} {:>11} {:>9} {:>9} {:>9} {:>12} total",
            totals.total_time_ns as f64 / 1e9,
            avg_usecs,
            totals.operations,
            totals.sequences,
            blank_if_zero(totals.errors),
            ""
        );
        out
    }
}

fn blank_if_zero(v: u64) -> String {
    if v > 0 {
        v.to_string()
    } else {
        String::new()
    }
}

/// Every stage's counters for one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub parse: ParseStats,
    pub context: ContextStats,
    pub registry: RegistryStats,
    pub descriptors: TableStats,
    pub builder: BuilderStats,
    /// Entries loaded from the pre-trace snapshot
    pub snapshot_entries: u64,
    /// Snapshot name records that produced no entry
    pub snapshot_skipped: u64,
    pub actors: u64,
    pub sequences: u64,
}

impl RunStats {
    /// Lines that could not be parsed
    pub fn parse_errors(&self) -> u64 {
        self.parse.malformed_lines
    }

    pub fn implicit_actors(&self) -> u64 {
        self.registry.implicit_processes + self.registry.implicit_threads
    }

    pub fn unresolved_operations(&self) -> u64 {
        self.builder.unresolved_targets
    }

    /// Human-readable diagnostics block
    pub fn render(&self) -> String {
        let p = &self.builder.pairing;
        let mut out = String::new();
        let _ = writeln!(out, "=== Run diagnostics ===");
        let _ = writeln!(
            out,
            "lines: {} total, {} events, {} malformed, {} ignored, {} out of order",
            self.parse.total_lines,
            self.parse.events,
            self.parse.malformed_lines,
            self.parse.ignored_lines,
            self.parse.out_of_order
        );
        let _ = writeln!(
            out,
            "context: {} enriched, {} without owner",
            self.context.enriched, self.context.misses
        );
        let _ = writeln!(
            out,
            "actors: {} ({} implicit, {} pid reuse boundaries, {} tid reuse boundaries)",
            self.actors,
            self.implicit_actors(),
            self.registry.pid_reuse,
            self.registry.tid_reuse
        );
        let _ = writeln!(
            out,
            "syscalls: {} entries, {} paired, {} incomplete, {} orphan exits, {} unclassified",
            p.entries,
            p.paired,
            p.incomplete,
            p.orphan_exits,
            self.builder.unclassified_operations
        );
        let _ = writeln!(
            out,
            "targets: {} resolved, {} unresolved, {} untargeted",
            self.builder.resolved_targets,
            self.builder.unresolved_targets,
            self.builder.untargeted
        );
        let _ = writeln!(
            out,
            "descriptors: {} observed, {} inherited, {} from snapshot ({} skipped)",
            self.descriptors.created,
            self.descriptors.inherited,
            self.descriptors.from_snapshot,
            self.snapshot_skipped
        );
        let _ = writeln!(out, "sequences: {}", self.sequences);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Fields, Timestamp};
    use crate::operation::Target;

    fn op(class: &str, start_us: u64, dur_us: u64, ret: i64, bytes: Option<u64>) -> Operation {
        Operation {
            class: class.to_string(),
            syscall: class.to_string(),
            pid: Some(1),
            tid: Some(1),
            cpu: Some(0),
            target: Target::Untargeted,
            start: Timestamp::from_micros(start_us),
            end: Timestamp::from_micros(start_us + dur_us),
            bytes,
            outcome: Outcome::from_ret(Some(ret)),
            complete: true,
            return_value: Some(ret),
            entry_fields: Fields::new(),
            exit_fields: Fields::new(),
        }
    }

    #[test]
    fn test_stats_tracker_records_operations() {
        let mut tracker = StatsTracker::new();
        tracker.record(&op("open", 0, 100, 3, None));
        tracker.record(&op("read", 0, 50, 10, Some(10)));
        tracker.record(&op("read", 0, 75, 10, Some(10)));

        let read = tracker.stats_map().get("read").unwrap();
        assert_eq!(read.operations, 2);
        assert_eq!(read.total_time_ns, 125_000);
        assert_eq!(read.bytes, 20);
        assert_eq!(tracker.stats_map().get("open").unwrap().operations, 1);
    }

    #[test]
    fn test_stats_tracker_records_errors() {
        let mut tracker = StatsTracker::new();
        tracker.record(&op("open", 0, 10, -2, None));
        tracker.record(&op("open", 0, 10, 3, None));
        assert_eq!(tracker.stats_map().get("open").unwrap().errors, 1);
        assert_eq!(tracker.totals().errors, 1);
    }

    #[test]
    fn test_totals() {
        let mut tracker = StatsTracker::new();
        tracker.record(&op("open", 0, 100, 3, None));
        tracker.record(&op("write", 0, 300, 3, Some(3)));
        let totals = tracker.totals();
        assert_eq!(totals.operations, 2);
        assert_eq!(totals.total_time_ns, 400_000);
    }

    #[test]
    fn test_render_summary() {
        let mut tracker = StatsTracker::new();
        tracker.record(&op("write", 0, 300, 3, Some(3)));
        tracker.record(&op("write", 0, 100, 3, Some(3)));
        tracker.record(&op("open", 0, 100, -13, None));

        let text = tracker.render_summary();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("% time"));
        assert!(lines[2].ends_with(" write"));
        assert!(lines[2].contains(" 80.00 "));
        assert!(lines[3].ends_with(" open"));
        assert!(lines.last().unwrap().ends_with("total"));
    }

    #[test]
    fn test_empty_summary() {
        assert_eq!(
            StatsTracker::new().render_summary(),
            "No operations recorded.\n"
        );
    }

    #[test]
    fn test_run_stats_render() {
        let mut stats = RunStats::default();
        stats.parse.total_lines = 10;
        stats.parse.malformed_lines = 2;
        stats.registry.implicit_processes = 1;
        stats.registry.implicit_threads = 1;
        stats.builder.unresolved_targets = 4;

        assert_eq!(stats.parse_errors(), 2);
        assert_eq!(stats.implicit_actors(), 2);
        assert_eq!(stats.unresolved_operations(), 4);

        let text = stats.render();
        assert!(text.contains("10 total"));
        assert!(text.contains("2 malformed"));
        assert!(text.contains("4 unresolved"));
    }
}
