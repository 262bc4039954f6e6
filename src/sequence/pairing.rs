use crate::event::{KernelEvent, Phase};
use fnv::FnvHashMap;
use serde::Serialize;

/// Which execution context an entry/exit pair belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Lane {
    Thread(u32),
    /// Unknown thread; fall back to the executing CPU
    Cpu(u32),
}

impl Lane {
    fn of(event: &KernelEvent) -> Option<Lane> {
        event
            .tid
            .map(Lane::Thread)
            .or_else(|| event.cpu.map(Lane::Cpu))
    }
}

/// A syscall entry with its exit, if one arrived in time
#[derive(Debug, Clone, PartialEq)]
pub enum Pairing {
    Complete {
        entry: KernelEvent,
        exit: KernelEvent,
        ordinal: u64,
    },
    /// Exit never seen, superseded by a newer entry, or outside the window
    Incomplete { entry: KernelEvent, ordinal: u64 },
}

impl Pairing {
    pub fn entry(&self) -> &KernelEvent {
        match self {
            Pairing::Complete { entry, .. } | Pairing::Incomplete { entry, .. } => entry,
        }
    }

    /// Arrival order of the entry
    pub fn ordinal(&self) -> u64 {
        match self {
            Pairing::Complete { ordinal, .. } | Pairing::Incomplete { ordinal, .. } => *ordinal,
        }
    }
}

/// Counters for the pairing stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PairingStats {
    pub entries: u64,
    pub exits: u64,
    pub paired: u64,
    pub incomplete: u64,
    /// Exits with no pending entry, or whose entry fell outside the window
    pub orphan_exits: u64,
    /// Entries with neither thread nor CPU to pair on
    pub laneless_entries: u64,
}

/// Matches syscall entries to exits per (thread, syscall)
///
/// Every entry comes out exactly once, either paired or incomplete.
#[derive(Debug)]
pub struct SyscallPairer {
    window_nanos: u64,
    pending: FnvHashMap<(Lane, String), (u64, KernelEvent)>,
    next_ordinal: u64,
    stats: PairingStats,
}

impl SyscallPairer {
    pub fn new(window_nanos: u64) -> Self {
        Self {
            window_nanos,
            pending: FnvHashMap::default(),
            next_ordinal: 0,
            stats: PairingStats::default(),
        }
    }

    /// Feed one event; finished pairings are appended to `out`
    pub fn push(&mut self, event: KernelEvent, out: &mut Vec<Pairing>) {
        let Some(syscall) = event.syscall().map(str::to_string) else {
            return;
        };

        match event.phase() {
            Phase::Entry => self.push_entry(syscall, event, out),
            Phase::Exit => self.push_exit(syscall, event, out),
            Phase::Point => {}
        }
    }

    fn push_entry(&mut self, syscall: String, entry: KernelEvent, out: &mut Vec<Pairing>) {
        self.stats.entries += 1;
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;

        let Some(lane) = Lane::of(&entry) else {
            self.stats.laneless_entries += 1;
            self.stats.incomplete += 1;
            out.push(Pairing::Incomplete { entry, ordinal });
            return;
        };

        if let Some((older, stale)) = self.pending.insert((lane, syscall), (ordinal, entry)) {
            self.stats.incomplete += 1;
            out.push(Pairing::Incomplete {
                entry: stale,
                ordinal: older,
            });
        }
    }

    fn push_exit(&mut self, syscall: String, exit: KernelEvent, out: &mut Vec<Pairing>) {
        self.stats.exits += 1;
        let pending = Lane::of(&exit).and_then(|lane| self.pending.remove(&(lane, syscall)));

        match pending {
            Some((ordinal, entry)) => {
                if exit.timestamp.nanos_since(entry.timestamp) <= self.window_nanos {
                    self.stats.paired += 1;
                    out.push(Pairing::Complete {
                        entry,
                        exit,
                        ordinal,
                    });
                } else {
                    self.stats.incomplete += 1;
                    self.stats.orphan_exits += 1;
                    out.push(Pairing::Incomplete { entry, ordinal });
                }
            }
            None => self.stats.orphan_exits += 1,
        }
    }

    /// Flush every still-pending entry as incomplete, in arrival order
    pub fn finish(&mut self, out: &mut Vec<Pairing>) {
        let mut remaining: Vec<(u64, KernelEvent)> =
            self.pending.drain().map(|(_, pending)| pending).collect();
        remaining.sort_by_key(|(ordinal, _)| *ordinal);
        self.stats.incomplete += remaining.len() as u64;
        out.extend(
            remaining
                .into_iter()
                .map(|(ordinal, entry)| Pairing::Incomplete { entry, ordinal }),
        );
    }

    pub fn stats(&self) -> &PairingStats {
        &self.stats
    }
}
