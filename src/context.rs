//! Scheduler-driven context enrichment
//!
//! Traces recorded without per-event context carry no pid/tid on syscall
//! events. `ContextTracker` follows `sched_switch` to know which thread runs on
//! each CPU, and fork/exec/wakeup events to know each thread's process and name,
//! then fills in whatever an event is missing.

use crate::event::{EventKind, KernelEvent};
use fnv::FnvHashMap;
use serde::Serialize;

#[derive(Debug, Clone, Default)]
struct ThreadInfo {
    pid: Option<u32>,
    comm: Option<String>,
}

/// Enrichment counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContextStats {
    /// Events that had at least one of pid/tid/comm filled in
    pub enriched: u64,
    /// Events whose owning thread stayed unknown
    pub misses: u64,
}

/// Stateful enrichment stage between the parser and the passes
#[derive(Debug, Default)]
pub struct ContextTracker {
    threads: FnvHashMap<u32, ThreadInfo>,
    cpu_current: FnvHashMap<u32, u32>,
    stats: ContextStats,
}

impl ContextTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &ContextStats {
        &self.stats
    }

    /// Fill missing owner fields, then learn from the event
    pub fn enrich(&mut self, mut event: KernelEvent) -> KernelEvent {
        let mut changed = false;

        if event.tid.is_none() {
            if let Some(tid) = event.cpu.and_then(|cpu| self.cpu_current.get(&cpu).copied()) {
                event.tid = Some(tid);
                changed = true;
            }
        }

        match event.tid {
            Some(tid) => {
                let info = self.threads.get(&tid);
                if event.pid.is_none() {
                    // A thread never seen in a fork is its own group leader
                    event.pid = Some(info.and_then(|i| i.pid).unwrap_or(tid));
                    changed = true;
                }
                if event.comm.is_none() {
                    if let Some(comm) = info.and_then(|i| i.comm.clone()) {
                        event.comm = Some(comm);
                        changed = true;
                    }
                }
            }
            None => self.stats.misses += 1,
        }

        if changed {
            self.stats.enriched += 1;
        }

        self.learn(&event);
        event
    }

    fn learn(&mut self, event: &KernelEvent) {
        match &event.kind {
            EventKind::SchedSwitch {
                prev_tid,
                prev_comm,
                next_tid,
                next_comm,
            } => {
                if let Some(cpu) = event.cpu {
                    self.cpu_current.insert(cpu, *next_tid);
                }
                self.note_comm(*prev_tid, prev_comm.as_deref());
                self.note_comm(*next_tid, next_comm.as_deref());
            }
            EventKind::ProcessFork {
                parent_pid,
                parent_tid,
                child_pid,
                child_tid,
                child_comm,
            } => {
                self.note_pid(*parent_tid, *parent_pid);
                self.note_pid(*child_tid, *child_pid);
                let parent_comm = event.str("parent_comm");
                self.note_comm(*parent_tid, parent_comm);
                self.note_comm(*child_tid, child_comm.as_deref().or(parent_comm));
            }
            EventKind::ProcessExec { tid, filename } => {
                let name = filename.rsplit('/').next().unwrap_or(filename);
                self.note_comm(*tid, Some(name));
            }
            EventKind::SchedThread { tid, comm } => {
                self.note_comm(*tid, comm.as_deref());
            }
            _ => {}
        }

        // Context fields carry ground truth when present
        if let (Some(pid), Some(tid)) = (event.pid, event.tid) {
            let info = self.threads.entry(tid).or_default();
            info.pid = Some(pid);
            if let Some(comm) = &event.comm {
                if !matches!(event.kind, EventKind::ProcessExec { .. }) {
                    info.comm = Some(comm.clone());
                }
            }
        }
    }

    fn note_pid(&mut self, tid: u32, pid: u32) {
        self.threads.entry(tid).or_default().pid = Some(pid);
    }

    fn note_comm(&mut self, tid: u32, comm: Option<&str>) {
        if let Some(comm) = comm {
            self.threads.entry(tid).or_default().comm = Some(comm.to_string());
        }
    }
}
