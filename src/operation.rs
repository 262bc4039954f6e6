//! Completed logical operations
//!
//! An `Operation` is one paired syscall entry/exit (or an entry whose exit never
//! arrived), classified and attributed to a thread and a target resource.

use crate::descriptors::{Resolution, ResolutionSource, Resource};
use crate::event::{Fields, Timestamp};
use serde::Serialize;

/// Where a resolved target came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetSource {
    Observed,
    Inherited,
    PreTrace,
    Standard,
    /// Path argument of the syscall itself
    Path,
}

impl From<ResolutionSource> for TargetSource {
    fn from(source: ResolutionSource) -> Self {
        match source {
            ResolutionSource::Observed => TargetSource::Observed,
            ResolutionSource::Inherited => TargetSource::Inherited,
            ResolutionSource::PreTrace => TargetSource::PreTrace,
            ResolutionSource::Standard => TargetSource::Standard,
        }
    }
}

/// Resource an operation acted on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Target {
    Resolved {
        resource: Resource,
        source: TargetSource,
    },
    /// Descriptor with no known binding at the time of the call
    Unresolved { fd: i32 },
    /// Class without a target, or the call carried no usable argument
    Untargeted,
}

impl Target {
    /// Grouping key, prefixed by target kind so distinct kinds never collide
    ///
    /// `file:<path>`, `socket:<id>`, `stdio:<stream>`, `unresolved:<fd>` or
    /// `none`.
    pub fn key(&self) -> String {
        match self {
            Target::Resolved { resource, .. } => match resource {
                Resource::File(path) => format!("file:{}", path),
                Resource::Socket(id) => format!("socket:{}", id),
                Resource::Stdio(stream) => format!("stdio:{}", stream.as_str()),
            },
            Target::Unresolved { fd } => format!("unresolved:{}", fd),
            Target::Untargeted => "none".to_string(),
        }
    }

    /// Human-readable target for text and CSV output
    pub fn label(&self) -> String {
        match self {
            Target::Resolved { resource, .. } => resource.to_string(),
            Target::Unresolved { fd } => format!("unresolved:{}", fd),
            Target::Untargeted => "none".to_string(),
        }
    }

    pub fn resource(&self) -> Option<&Resource> {
        match self {
            Target::Resolved { resource, .. } => Some(resource),
            _ => None,
        }
    }

    pub fn is_socket(&self) -> bool {
        self.resource().is_some_and(Resource::is_socket)
    }
}

impl From<Resolution> for Target {
    fn from(resolution: Resolution) -> Self {
        match resolution {
            Resolution::Resolved { resource, source } => Target::Resolved {
                resource,
                source: source.into(),
            },
            Resolution::Unresolved { fd } => Target::Unresolved { fd },
        }
    }
}

/// Success or failure of the underlying call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure { errno: i64 },
    /// No exit observed, or the exit carried no return value
    Unknown,
}

impl Outcome {
    pub fn from_ret(ret: Option<i64>) -> Self {
        match ret {
            Some(r) if r < 0 => Outcome::Failure { errno: -r },
            Some(_) => Outcome::Success,
            None => Outcome::Unknown,
        }
    }
}

/// One completed (or incomplete) logical action
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Operation {
    pub class: String,
    pub syscall: String,
    pub pid: Option<u32>,
    pub tid: Option<u32>,
    pub cpu: Option<u32>,
    pub target: Target,
    pub start: Timestamp,
    /// Exit time, or the entry time for an incomplete operation
    pub end: Timestamp,
    pub bytes: Option<u64>,
    pub outcome: Outcome,
    /// False when no matching exit was observed
    pub complete: bool,
    pub return_value: Option<i64>,
    pub entry_fields: Fields,
    pub exit_fields: Fields,
}

impl Operation {
    pub fn duration_nanos(&self) -> u64 {
        self.end.nanos_since(self.start)
    }
}
