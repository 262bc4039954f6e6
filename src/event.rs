//! Typed kernel events produced by the trace parser
//!
//! A `KernelEvent` is immutable once parsed. Its payload is classified into an
//! `EventKind` variant for the events the pipeline reasons about; everything
//! else is `Unclassified` and only carries the raw field map.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Monotonic trace timestamp with nanosecond resolution
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Start of time; also marks bindings that pre-date the trace
    pub const ZERO: Timestamp = Timestamp(0);

    pub const fn from_nanos(nanos: u64) -> Self {
        Timestamp(nanos)
    }

    /// Saturates at the largest representable timestamp
    pub const fn from_micros(micros: u64) -> Self {
        Timestamp(micros.saturating_mul(1_000))
    }

    /// Saturates at the largest representable timestamp
    pub const fn from_millis(millis: u64) -> Self {
        Timestamp(millis.saturating_mul(1_000_000))
    }

    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Seconds as a float (lossy beyond ~100 days at ns precision)
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / NANOS_PER_SEC as f64
    }

    /// Nanoseconds elapsed since `earlier`, zero if `earlier` is later
    pub fn nanos_since(self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    pub fn saturating_add_nanos(self, nanos: u64) -> Self {
        Timestamp(self.0.saturating_add(nanos))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:09}",
            self.0 / NANOS_PER_SEC,
            self.0 % NANOS_PER_SEC
        )
    }
}

/// A normalized field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl FieldValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Str(s) => write!(f, "{}", s),
        }
    }
}

/// Named event fields, ordered by name
pub type Fields = BTreeMap<String, FieldValue>;

/// Look up an integer field
pub fn int_field(fields: &Fields, name: &str) -> Option<i64> {
    fields.get(name).and_then(FieldValue::as_int)
}

/// Look up a string field
pub fn str_field<'a>(fields: &'a Fields, name: &str) -> Option<&'a str> {
    fields.get(name).and_then(FieldValue::as_str)
}

fn id_field(fields: &Fields, name: &str) -> Option<u32> {
    int_field(fields, name).and_then(|v| u32::try_from(v).ok())
}

/// Entry/exit/point marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Entry,
    Exit,
    Point,
}

/// Classified event payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    SyscallEntry {
        syscall: String,
    },
    SyscallExit {
        syscall: String,
        ret: Option<i64>,
    },
    ProcessFork {
        parent_pid: u32,
        parent_tid: u32,
        child_pid: u32,
        child_tid: u32,
        child_comm: Option<String>,
    },
    ProcessExit {
        tid: u32,
        comm: Option<String>,
    },
    ProcessExec {
        tid: u32,
        filename: String,
    },
    SchedSwitch {
        prev_tid: u32,
        prev_comm: Option<String>,
        next_tid: u32,
        next_comm: Option<String>,
    },
    /// Wakeups and `sched_stat_*` events naming a thread
    SchedThread {
        tid: u32,
        comm: Option<String>,
    },
    /// Unknown or incomplete event; the raw fields stay on the event
    Unclassified,
}

impl EventKind {
    /// Classify an event by name and payload fields
    pub fn classify(name: &str, fields: &Fields) -> Self {
        if let Some(syscall) = syscall_name(name, "entry") {
            return EventKind::SyscallEntry {
                syscall: syscall.to_string(),
            };
        }
        if let Some(syscall) = syscall_name(name, "exit") {
            return EventKind::SyscallExit {
                syscall: syscall.to_string(),
                ret: int_field(fields, "ret"),
            };
        }

        let comm = |key: &str| str_field(fields, key).map(str::to_string);

        let kind = match name {
            "sched_process_fork" => (|| {
                Some(EventKind::ProcessFork {
                    parent_pid: id_field(fields, "parent_pid")?,
                    parent_tid: id_field(fields, "parent_tid")?,
                    child_pid: id_field(fields, "child_pid")?,
                    child_tid: id_field(fields, "child_tid")?,
                    child_comm: comm("child_comm"),
                })
            })(),
            "sched_process_exit" => id_field(fields, "tid").map(|tid| EventKind::ProcessExit {
                tid,
                comm: comm("comm"),
            }),
            "sched_process_exec" => (|| {
                Some(EventKind::ProcessExec {
                    tid: id_field(fields, "tid")?,
                    filename: str_field(fields, "filename")?.to_string(),
                })
            })(),
            "sched_switch" => (|| {
                Some(EventKind::SchedSwitch {
                    prev_tid: id_field(fields, "prev_tid")?,
                    prev_comm: comm("prev_comm"),
                    next_tid: id_field(fields, "next_tid")?,
                    next_comm: comm("next_comm"),
                })
            })(),
            n if n == "sched_waking"
                || n == "sched_wakeup"
                || n == "sched_wakeup_new"
                || n.starts_with("sched_stat_") =>
            {
                id_field(fields, "tid").map(|tid| EventKind::SchedThread {
                    tid,
                    comm: comm("comm"),
                })
            }
            _ => None,
        };

        kind.unwrap_or(EventKind::Unclassified)
    }

    pub fn phase(&self) -> Phase {
        match self {
            EventKind::SyscallEntry { .. } => Phase::Entry,
            EventKind::SyscallExit { .. } => Phase::Exit,
            _ => Phase::Point,
        }
    }

    /// Syscall name for entry/exit events
    pub fn syscall(&self) -> Option<&str> {
        match self {
            EventKind::SyscallEntry { syscall } | EventKind::SyscallExit { syscall, .. } => {
                Some(syscall.as_str())
            }
            _ => None,
        }
    }

    /// Thread (and process, when known) executing this event, implied by the payload
    pub fn implied_owner(&self) -> Option<(Option<u32>, u32)> {
        match self {
            EventKind::ProcessFork {
                parent_pid,
                parent_tid,
                ..
            } => Some((Some(*parent_pid), *parent_tid)),
            EventKind::ProcessExit { tid, .. } | EventKind::ProcessExec { tid, .. } => {
                Some((None, *tid))
            }
            EventKind::SchedSwitch { prev_tid, .. } => Some((None, *prev_tid)),
            _ => None,
        }
    }
}

/// Extract `<name>` from `syscall_<phase>_<name>` or `compat_syscall_<phase>_<name>`
fn syscall_name<'a>(event: &'a str, phase: &str) -> Option<&'a str> {
    let rest = event.strip_prefix("compat_").unwrap_or(event);
    let rest = rest.strip_prefix("syscall_")?;
    let name = rest.strip_prefix(phase)?.strip_prefix('_')?;
    (!name.is_empty()).then_some(name)
}

/// One parsed trace record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelEvent {
    pub timestamp: Timestamp,
    pub name: String,
    pub kind: EventKind,
    /// Owning process, when known
    pub pid: Option<u32>,
    /// Owning thread, when known
    pub tid: Option<u32>,
    /// Executing CPU
    pub cpu: Option<u32>,
    /// Process name from the event context
    pub comm: Option<String>,
    /// Payload fields
    pub fields: Fields,
    /// 1-based source line number
    pub line: u64,
}

impl KernelEvent {
    pub fn phase(&self) -> Phase {
        self.kind.phase()
    }

    pub fn syscall(&self) -> Option<&str> {
        self.kind.syscall()
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        int_field(&self.fields, name)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        str_field(&self.fields, name)
    }

    /// Return value of a syscall exit
    pub fn ret(&self) -> Option<i64> {
        match &self.kind {
            EventKind::SyscallExit { ret, .. } => *ret,
            _ => None,
        }
    }

    /// Owning (pid, tid) pair once both are known
    pub fn owner(&self) -> Option<(u32, u32)> {
        Some((self.pid?, self.tid?))
    }
}
