use crate::event::Timestamp;
use crate::operation::{Operation, Target};
use serde::Serialize;
use std::collections::BTreeMap;

/// Temporally contiguous operations of one class, by one thread, on one target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventSequence {
    /// `seq_<class>_<number>`
    pub id: String,
    /// Opening order across the whole run
    pub number: u64,
    pub class: String,
    pub pid: Option<u32>,
    pub tid: Option<u32>,
    pub target: Target,
    /// Grouping key of the target
    pub target_key: String,
    /// Start of the first member
    pub start: Timestamp,
    /// End of the last member
    pub end: Timestamp,
    /// Sum of member bytes for byte-counting classes
    pub bytes: Option<u64>,
    pub members: Vec<Operation>,
}

impl EventSequence {
    fn open(number: u64, key_target: String, op: Operation) -> Self {
        Self {
            id: format!("seq_{}_{}", op.class, number),
            number,
            class: op.class.clone(),
            pid: op.pid,
            tid: op.tid,
            target: op.target.clone(),
            target_key: key_target,
            start: op.start,
            end: op.end,
            bytes: op.bytes,
            members: vec![op],
        }
    }

    fn append(&mut self, op: Operation) {
        self.end = self.end.max(op.end);
        self.bytes = match (self.bytes, op.bytes) {
            (Some(a), Some(b)) => Some(a + b),
            (a, b) => a.or(b),
        };
        self.members.push(op);
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn duration_nanos(&self) -> u64 {
        self.end.nanos_since(self.start)
    }

    /// Members with no observed exit
    pub fn incomplete_members(&self) -> usize {
        self.members.iter().filter(|m| !m.complete).count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct GroupKey {
    pid: Option<u32>,
    tid: Option<u32>,
    class: String,
    target: String,
}

/// Single-pass streaming aggregation
///
/// Operations must arrive in start order. An operation joins the open
/// sequence for its (thread, class, target) when it starts no later than
/// `gap` after that sequence's end; otherwise the open one is emitted and a
/// new one begins. A zero gap emits every operation on its own.
#[derive(Debug, Default)]
pub struct Grouper {
    open: BTreeMap<GroupKey, EventSequence>,
    closed: Vec<EventSequence>,
    next_number: u64,
}

impl Grouper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: Operation, gap_nanos: u64) {
        let key = GroupKey {
            pid: op.pid,
            tid: op.tid,
            class: op.class.clone(),
            target: op.target.key(),
        };

        if gap_nanos > 0 {
            if let Some(current) = self.open.get_mut(&key) {
                if op.start.nanos_since(current.end) <= gap_nanos {
                    current.append(op);
                    return;
                }
            }
        }

        let number = self.next_number;
        self.next_number += 1;
        let sequence = EventSequence::open(number, key.target.clone(), op);

        if gap_nanos == 0 {
            self.closed.push(sequence);
        } else if let Some(previous) = self.open.insert(key, sequence) {
            self.closed.push(previous);
        }
    }

    /// Flush open sequences; output is ordered by (start, number)
    pub fn finish(mut self) -> Vec<EventSequence> {
        self.closed.extend(self.open.into_values());
        self.closed.sort_by_key(|s| (s.start, s.number));
        self.closed
    }
}
