//! End-to-end interpretation of one trace
//!
//! parse -> context enrichment -> registry pass (actors + descriptor table)
//! -> sequence pass. The table is complete and read-only before the sequence
//! pass starts. With `pipelined` set, parsing runs on its own thread and feeds
//! the rest through a bounded channel; the result is identical either way.

use crate::actors::{ActorRegistry, ActorSnapshot};
use crate::context::ContextTracker;
use crate::descriptors::{DescriptorSnapshot, DescriptorTable};
use crate::error::{Result, TraceError};
use crate::event::KernelEvent;
use crate::grouping::GroupingRules;
use crate::parser::{ParseStats, TraceParser};
use crate::sequence::{EventSequence, SequenceBuilder, DEFAULT_PAIRING_WINDOW_MS};
use crate::stats::RunStats;
use crossbeam::channel;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Pipeline settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Longest entry-to-exit distance still paired
    pub pairing_window_ms: u64,
    /// Sequence syscalls without a class under `other`
    pub include_unclassified: bool,
    /// Parse on a separate thread
    pub pipelined: bool,
    /// Bounded channel size between the parse thread and the passes
    pub channel_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pairing_window_ms: DEFAULT_PAIRING_WINDOW_MS,
            include_unclassified: false,
            pipelined: false,
            channel_capacity: 4096,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.pairing_window_ms == 0 {
            return Err("pairing_window_ms must be greater than 0".to_string());
        }
        if self.pipelined && self.channel_capacity == 0 {
            return Err("channel_capacity must be greater than 0 when pipelined".to_string());
        }
        Ok(())
    }
}

/// Everything one run produces
#[derive(Debug)]
pub struct PipelineOutput {
    pub actors: ActorSnapshot,
    pub sequences: Vec<EventSequence>,
    /// Final descriptor table, for audit and verification
    pub descriptors: DescriptorTable,
    pub stats: RunStats,
    /// SHA-256 over the serialized actors and sequences
    pub digest: String,
}

/// Configured interpretation pipeline
#[derive(Debug, Clone)]
pub struct Pipeline {
    rules: GroupingRules,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(rules: GroupingRules, config: PipelineConfig) -> Result<Self> {
        config.validate().map_err(TraceError::InvalidConfig)?;
        Ok(Self { rules, config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Interpret the trace file at `trace`
    pub fn run(&self, trace: &Path, snapshot: Option<&DescriptorSnapshot>) -> Result<PipelineOutput> {
        let file = File::open(trace).map_err(|e| TraceError::io(trace, e))?;
        tracing::info!(path = %trace.display(), "interpreting trace");
        self.run_reader(BufReader::new(file), snapshot)
    }

    /// Interpret a trace from any buffered reader
    pub fn run_reader<R>(&self, reader: R, snapshot: Option<&DescriptorSnapshot>) -> Result<PipelineOutput>
    where
        R: BufRead + Send,
    {
        let mut context = ContextTracker::new();
        let (mut events, parse) = if self.config.pipelined {
            self.collect_pipelined(reader, &mut context)?
        } else {
            collect_sequential(reader, &mut context)?
        };

        if parse.out_of_order > 0 {
            tracing::warn!(
                count = parse.out_of_order,
                "trace contains out-of-order events, sorting by timestamp"
            );
            events.sort_by_key(|e| e.timestamp);
        }
        tracing::info!(
            events = events.len(),
            malformed = parse.malformed_lines,
            "parse complete"
        );

        let mut table = DescriptorTable::new();
        let (snapshot_entries, snapshot_skipped) = match snapshot {
            Some(s) => {
                table.load_snapshot(s);
                (s.len() as u64, s.skipped())
            }
            None => (0, 0),
        };

        let mut registry = ActorRegistry::new();
        for event in &events {
            registry.observe(event, &mut table);
        }
        let actors = registry.snapshot();
        tracing::info!(
            actors = actors.len(),
            implicit = actors.implicit_count(),
            bindings = table.len(),
            "registry pass complete"
        );

        let overlaps = table.verify();
        if !overlaps.is_empty() {
            tracing::error!(count = overlaps.len(), "descriptor bindings overlap");
        }

        let builder = SequenceBuilder::new(self.rules.clone())
            .with_pairing_window_ms(self.config.pairing_window_ms)
            .with_unclassified(self.config.include_unclassified);
        let built = builder.build(events, &table);
        tracing::info!(sequences = built.sequences.len(), "sequence pass complete");

        let digest = digest(&actors, &built.sequences)?;
        let stats = RunStats {
            parse,
            context: context.stats().clone(),
            registry: registry.stats().clone(),
            descriptors: table.stats().clone(),
            builder: built.stats,
            snapshot_entries,
            snapshot_skipped,
            actors: actors.len() as u64,
            sequences: built.sequences.len() as u64,
        };

        Ok(PipelineOutput {
            actors,
            sequences: built.sequences,
            descriptors: table,
            stats,
            digest,
        })
    }

    fn collect_pipelined<R>(
        &self,
        reader: R,
        context: &mut ContextTracker,
    ) -> Result<(Vec<KernelEvent>, ParseStats)>
    where
        R: BufRead + Send,
    {
        let (tx, rx) = channel::bounded(self.config.channel_capacity);

        std::thread::scope(|scope| {
            let parse_stage = scope.spawn(move || {
                let mut parser = TraceParser::new(reader);
                for item in parser.by_ref() {
                    if tx.send(item).is_err() {
                        break;
                    }
                }
                parser.into_stats()
            });

            let mut events = Vec::new();
            let mut failure = None;
            for item in rx.iter() {
                match item {
                    Ok(event) => events.push(context.enrich(event)),
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }
            drop(rx);

            let stats = parse_stage
                .join()
                .map_err(|_| TraceError::StageDisconnected)?;
            match failure {
                Some(e) => Err(e),
                None => Ok((events, stats)),
            }
        })
    }
}

fn collect_sequential<R: BufRead>(
    reader: R,
    context: &mut ContextTracker,
) -> Result<(Vec<KernelEvent>, ParseStats)> {
    let mut parser = TraceParser::new(reader);
    let mut events = Vec::new();
    for item in parser.by_ref() {
        events.push(context.enrich(item?));
    }
    Ok((events, parser.into_stats()))
}

/// Fingerprint of a run's actors and sequences
pub fn digest(actors: &ActorSnapshot, sequences: &[EventSequence]) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(actors)?);
    hasher.update(serde_json::to_vec(sequences)?);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const TRACE: &str = "\
[10:00:00.000000000] h sched_process_fork: { cpu_id = 0 }, { pid = 1, tid = 1, procname = \"sh\" }, { parent_comm = \"sh\", parent_tid = 1, parent_pid = 1, child_comm = \"sh\", child_tid = 10, child_pid = 10 }
[10:00:00.001000000] h syscall_entry_openat: { cpu_id = 0 }, { pid = 10, tid = 10, procname = \"app\" }, { dfd = -100, filename = \"/tmp/x\", flags = 577, mode = 420 }
[10:00:00.001001000] h syscall_exit_openat: { cpu_id = 0 }, { pid = 10, tid = 10, procname = \"app\" }, { ret = 4 }
[10:00:00.010000000] h syscall_entry_write: { cpu_id = 0 }, { pid = 10, tid = 10, procname = \"app\" }, { fd = 4, count = 100 }
[10:00:00.010001000] h syscall_exit_write: { cpu_id = 0 }, { pid = 10, tid = 10, procname = \"app\" }, { ret = 100 }
[10:00:00.020000000] h syscall_entry_write: { cpu_id = 0 }, { pid = 10, tid = 10, procname = \"app\" }, { fd = 4, count = 100 }
[10:00:00.020001000] h syscall_exit_write: { cpu_id = 0 }, { pid = 10, tid = 10, procname = \"app\" }, { ret = 100 }
[10:00:00.030000000] h syscall_entry_close: { cpu_id = 0 }, { pid = 10, tid = 10, procname = \"app\" }, { fd = 4 }
[10:00:00.030001000] h syscall_exit_close: { cpu_id = 0 }, { pid = 10, tid = 10, procname = \"app\" }, { ret = 0 }
";

    fn pipeline(config: PipelineConfig) -> Pipeline {
        Pipeline::new(GroupingRules::default_rules().unwrap(), config).unwrap()
    }

    #[test]
    fn test_config_validation() {
        assert!(PipelineConfig::default().validate().is_ok());

        let config = PipelineConfig {
            pairing_window_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(matches!(
            Pipeline::new(GroupingRules::default_rules().unwrap(), config),
            Err(TraceError::InvalidConfig(_))
        ));

        let config = PipelineConfig {
            pipelined: true,
            channel_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_run_reader() {
        let output = pipeline(PipelineConfig::default())
            .run_reader(Cursor::new(TRACE), None)
            .unwrap();

        let classes: Vec<&str> = output.sequences.iter().map(|s| s.class.as_str()).collect();
        assert_eq!(classes, vec!["open", "write", "close"]);
        assert_eq!(output.sequences[1].bytes, Some(200));
        assert_eq!(output.stats.parse.events, 9);
        assert_eq!(output.stats.sequences, 3);
        assert_eq!(output.digest.len(), 64);
        assert!(output.descriptors.verify().is_empty());
    }

    #[test]
    fn test_pipelined_matches_sequential() {
        let sequential = pipeline(PipelineConfig::default())
            .run_reader(Cursor::new(TRACE), None)
            .unwrap();
        let pipelined = pipeline(PipelineConfig {
            pipelined: true,
            channel_capacity: 2,
            ..Default::default()
        })
        .run_reader(Cursor::new(TRACE), None)
        .unwrap();

        assert_eq!(sequential.digest, pipelined.digest);
        assert_eq!(sequential.stats, pipelined.stats);
    }

    #[test]
    fn test_out_of_order_events_are_sorted() {
        let trace = "\
[10:00:00.000000200] h syscall_entry_read: { cpu_id = 1 }, { pid = 3, tid = 3 }, { fd = 0, count = 1 }
[10:00:00.000000100] h syscall_entry_write: { cpu_id = 0 }, { pid = 2, tid = 2 }, { fd = 1, count = 1 }
";
        let output = pipeline(PipelineConfig::default())
            .run_reader(Cursor::new(trace), None)
            .unwrap();
        assert_eq!(output.stats.parse.out_of_order, 1);
        assert_eq!(output.sequences[0].class, "write");
    }

    #[test]
    fn test_missing_trace_file() {
        let result = pipeline(PipelineConfig::default())
            .run(Path::new("/nonexistent/ktrace.txt"), None);
        assert!(matches!(result, Err(TraceError::Io { .. })));
    }
}
