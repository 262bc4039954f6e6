//! Hand-off of a run's results to a persistence layer
//!
//! A sink receives actors, then sequences, then statistics, then `finish`.
//! The graph store behind a real sink is external; the sinks here write
//! documents for it (or for a human) to consume.

use crate::actors::ActorSnapshot;
use crate::csv_output::{CsvOutput, CsvSequence, CsvStatsOutput};
use crate::error::Result;
use crate::json_output::JsonOutput;
use crate::pipeline::PipelineOutput;
use crate::sequence::EventSequence;
use crate::stats::{RunStats, StatsTracker};
use std::io::Write;

/// Consumer of interpreted trace results
pub trait IngestSink {
    fn ingest_actors(&mut self, actors: &ActorSnapshot) -> Result<()>;

    fn ingest_sequences(&mut self, sequences: &[EventSequence]) -> Result<()>;

    fn ingest_stats(&mut self, stats: &RunStats, digest: &str) -> Result<()>;

    /// Flush whatever the sink buffered
    fn finish(&mut self) -> Result<()>;
}

/// Feed a whole run to `sink` in order
pub fn ingest(output: &PipelineOutput, sink: &mut dyn IngestSink) -> Result<()> {
    sink.ingest_actors(&output.actors)?;
    sink.ingest_sequences(&output.sequences)?;
    sink.ingest_stats(&output.stats, &output.digest)?;
    sink.finish()
}

/// Writes one `ktrace-json-v1` document on finish
pub struct JsonSink<W: Write> {
    writer: W,
    output: JsonOutput,
}

impl<W: Write> JsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            output: JsonOutput::new(),
        }
    }
}

impl<W: Write> IngestSink for JsonSink<W> {
    fn ingest_actors(&mut self, actors: &ActorSnapshot) -> Result<()> {
        self.output.set_actors(actors.clone());
        Ok(())
    }

    fn ingest_sequences(&mut self, sequences: &[EventSequence]) -> Result<()> {
        for sequence in sequences {
            self.output.add_sequence(sequence.clone());
        }
        Ok(())
    }

    fn ingest_stats(&mut self, stats: &RunStats, digest: &str) -> Result<()> {
        self.output.set_stats(stats.clone(), Some(digest.to_string()));
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        writeln!(self.writer, "{}", self.output.to_json()?)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Writes sequences as CSV rows, or the per-class table in summary mode
pub struct CsvSink<W: Write> {
    writer: W,
    summary: bool,
    output: CsvOutput,
    tracker: StatsTracker,
}

impl<W: Write> CsvSink<W> {
    pub fn new(writer: W, summary: bool) -> Self {
        Self {
            writer,
            summary,
            output: CsvOutput::new(),
            tracker: StatsTracker::new(),
        }
    }
}

impl<W: Write> IngestSink for CsvSink<W> {
    fn ingest_actors(&mut self, _actors: &ActorSnapshot) -> Result<()> {
        Ok(())
    }

    fn ingest_sequences(&mut self, sequences: &[EventSequence]) -> Result<()> {
        for sequence in sequences {
            self.tracker.record_sequence(sequence);
            self.output.add_sequence(CsvSequence::from(sequence));
        }
        Ok(())
    }

    fn ingest_stats(&mut self, _stats: &RunStats, _digest: &str) -> Result<()> {
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let text = if self.summary {
            CsvStatsOutput::new(&self.tracker).to_csv()
        } else {
            self.output.to_csv()
        };
        self.writer.write_all(text.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Human-readable listing: one line per sequence, diagnostics at the end
///
/// In summary mode the listing is replaced by the per-class table.
pub struct TextSink<W: Write> {
    writer: W,
    summary: bool,
    tracker: StatsTracker,
}

impl<W: Write> TextSink<W> {
    pub fn new(writer: W, summary: bool) -> Self {
        Self {
            writer,
            summary,
            tracker: StatsTracker::new(),
        }
    }
}

impl<W: Write> IngestSink for TextSink<W> {
    fn ingest_actors(&mut self, actors: &ActorSnapshot) -> Result<()> {
        if self.summary {
            return Ok(());
        }
        for process in &actors.processes {
            writeln!(
                self.writer,
                "process {}#{} {} parent={} threads={}{}",
                process.pid,
                process.generation,
                process.name.as_deref().unwrap_or("?"),
                process
                    .parent_pid
                    .map_or_else(|| "-".to_string(), |p| p.to_string()),
                process.threads.len(),
                if process.implicit { " (implicit)" } else { "" }
            )?;
        }
        Ok(())
    }

    fn ingest_sequences(&mut self, sequences: &[EventSequence]) -> Result<()> {
        for sequence in sequences {
            self.tracker.record_sequence(sequence);
            if self.summary {
                continue;
            }
            let bytes = sequence
                .bytes
                .map_or_else(String::new, |b| format!(" {} bytes", b));
            writeln!(
                self.writer,
                "[{}] {} {} tid={} {} x{}{}",
                sequence.start,
                sequence.id,
                sequence.class,
                sequence
                    .tid
                    .map_or_else(|| "?".to_string(), |t| t.to_string()),
                sequence.target.label(),
                sequence.member_count(),
                bytes
            )?;
        }
        Ok(())
    }

    fn ingest_stats(&mut self, stats: &RunStats, digest: &str) -> Result<()> {
        if self.summary {
            self.writer
                .write_all(self.tracker.render_summary().as_bytes())?;
        }
        self.writer.write_all(stats.render().as_bytes())?;
        writeln!(self.writer, "digest: {}", digest)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
