//! LTTng text trace parser
//!
//! `TraceParser` turns babeltrace-style text lines into typed `KernelEvent`s,
//! lazily, one line at a time. Malformed lines are skipped and counted in
//! `ParseStats`; only failures to read the source end the stream with an error.

mod line;


pub use line::{normalize_value, parse_line, parse_timestamp, LineOutcome, RawLine, RawTimestamp};

use crate::error::{Result, TraceError};
use crate::event::{int_field, str_field, EventKind, Fields, KernelEvent, Timestamp};
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

const NANOS_PER_DAY: u64 = 86_400 * 1_000_000_000;
const ROLLOVER_THRESHOLD: u64 = NANOS_PER_DAY / 2;

/// Line accounting for one parse pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseStats {
    pub total_lines: u64,
    pub events: u64,
    pub malformed_lines: u64,
    /// Blank and comment lines
    pub ignored_lines: u64,
    /// Events kept with `EventKind::Unclassified`
    pub unclassified_events: u64,
    /// Events whose timestamp went backwards
    pub out_of_order: u64,
}

/// Lazy parser over any buffered reader
pub struct TraceParser<R> {
    reader: R,
    buf: Vec<u8>,
    stats: ParseStats,
    last_clock: Option<u64>,
    day_offset: u64,
    last_timestamp: Option<Timestamp>,
    finished: bool,
}

impl TraceParser<BufReader<File>> {
    /// Open a trace file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| TraceError::io(path, e))?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> TraceParser<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(512),
            stats: ParseStats::default(),
            last_clock: None,
            day_offset: 0,
            last_timestamp: None,
            finished: false,
        }
    }

    pub fn stats(&self) -> &ParseStats {
        &self.stats
    }

    pub fn into_stats(self) -> ParseStats {
        self.stats
    }

    /// Convert a raw timestamp to a monotonic one, handling midnight rollover
    fn resolve_timestamp(&mut self, raw: RawTimestamp) -> Timestamp {
        match raw {
            RawTimestamp::Absolute(nanos) => Timestamp::from_nanos(nanos),
            RawTimestamp::ClockOfDay(nanos) => {
                if let Some(last) = self.last_clock {
                    if nanos.saturating_add(ROLLOVER_THRESHOLD) < last {
                        self.day_offset += NANOS_PER_DAY;
                    }
                }
                self.last_clock = Some(nanos);
                Timestamp::from_nanos(nanos.saturating_add(self.day_offset))
            }
        }
    }

    fn build_event(&mut self, raw: RawLine) -> KernelEvent {
        let timestamp = self.resolve_timestamp(raw.timestamp);
        if let Some(last) = self.last_timestamp {
            if timestamp < last {
                self.stats.out_of_order += 1;
            }
        }
        self.last_timestamp = Some(timestamp.max(self.last_timestamp.unwrap_or(timestamp)));

        let kind = EventKind::classify(&raw.name, &raw.payload);
        if kind == EventKind::Unclassified {
            self.stats.unclassified_events += 1;
        }

        let mut pid = context_id(&raw.context, &["pid", "vpid"]);
        let mut tid = context_id(&raw.context, &["tid", "vtid"]);
        if tid.is_none() {
            if let Some((implied_pid, implied_tid)) = kind.implied_owner() {
                tid = Some(implied_tid);
                pid = pid.or(implied_pid);
            }
        }
        let cpu = context_id(&raw.context, &["cpu_id"])
            .or_else(|| context_id(&raw.payload, &["cpu_id"]));
        let comm = str_field(&raw.context, "procname").map(str::to_string);

        KernelEvent {
            timestamp,
            name: raw.name,
            kind,
            pid,
            tid,
            cpu,
            comm,
            fields: raw.payload,
            line: self.stats.total_lines,
        }
    }
}

fn context_id(fields: &Fields, keys: &[&str]) -> Option<u32> {
    keys.iter()
        .find_map(|k| int_field(fields, k))
        .and_then(|v| u32::try_from(v).ok())
}

impl<R: BufRead> Iterator for TraceParser<R> {
    type Item = Result<KernelEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => {
                    self.finished = true;
                }
                Ok(_) => {
                    self.stats.total_lines += 1;
                    let text = String::from_utf8_lossy(&self.buf);
                    match parse_line(&text) {
                        LineOutcome::Event(raw) => {
                            self.stats.events += 1;
                            return Some(Ok(self.build_event(raw)));
                        }
                        LineOutcome::Ignored => self.stats.ignored_lines += 1,
                        LineOutcome::Malformed(reason) => {
                            self.stats.malformed_lines += 1;
                            tracing::debug!(
                                line = self.stats.total_lines,
                                reason,
                                "skipping malformed trace line"
                            );
                        }
                    }
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(TraceError::Stream(e)));
                }
            }
        }
        None
    }
}
