//! JSON output format for interpreted traces
//!
//! One document per run: every actor, every sequence with its member
//! operations, and the run statistics.

use crate::actors::ActorSnapshot;
use crate::error::Result;
use crate::sequence::EventSequence;
use crate::stats::RunStats;
use serde::Serialize;

/// Run-level counters surfaced at the top of the document
#[derive(Debug, Clone, Default, Serialize)]
pub struct JsonSummary {
    pub actors: u64,
    pub sequences: u64,
    pub operations: u64,
    pub parse_errors: u64,
    pub implicit_actors: u64,
    pub unresolved_operations: u64,
    /// SHA-256 fingerprint of actors and sequences
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Root JSON output structure
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput {
    /// Format version identifier
    pub version: String,
    /// Format name
    pub format: String,
    pub summary: JsonSummary,
    pub actors: ActorSnapshot,
    pub sequences: Vec<EventSequence>,
    /// Per-stage counters (omitted until set)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<RunStats>,
}

impl JsonOutput {
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            format: "ktrace-json-v1".to_string(),
            summary: JsonSummary::default(),
            actors: ActorSnapshot::default(),
            sequences: Vec::new(),
            stats: None,
        }
    }

    pub fn set_actors(&mut self, actors: ActorSnapshot) {
        self.summary.actors = actors.len() as u64;
        self.actors = actors;
    }

    pub fn add_sequence(&mut self, sequence: EventSequence) {
        self.summary.sequences += 1;
        self.summary.operations += sequence.member_count() as u64;
        self.sequences.push(sequence);
    }

    pub fn set_stats(&mut self, stats: RunStats, digest: Option<String>) {
        self.summary.parse_errors = stats.parse_errors();
        self.summary.implicit_actors = stats.implicit_actors();
        self.summary.unresolved_operations = stats.unresolved_operations();
        self.summary.digest = digest;
        self.stats = Some(stats);
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Default for JsonOutput {
    fn default() -> Self {
        Self::new()
    }
}
