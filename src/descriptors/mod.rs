//! Temporal descriptor resolution
//!
//! `DescriptorTable` maps `(pid, fd)` to the resource it referred to at a given
//! instant. Each pair owns an ordered list of half-open validity intervals;
//! observed bindings take priority over ones loaded from a pre-trace snapshot,
//! and descriptors 0-2 fall back to the standard streams. Anything else is
//! reported as `Resolution::Unresolved`, never guessed.

mod snapshot;
mod table;

#[cfg(test)]
mod tests;

pub use snapshot::{classify_name, DescriptorSnapshot, SnapshotEntry};
pub use table::{BindingOverlap, DescriptorTable, TableStats};

use crate::event::Timestamp;
use serde::Serialize;
use std::fmt;

/// Standard stream behind descriptors 0, 1 and 2
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StdStream {
    Stdin,
    Stdout,
    Stderr,
}

impl StdStream {
    pub fn from_fd(fd: i32) -> Option<Self> {
        match fd {
            0 => Some(StdStream::Stdin),
            1 => Some(StdStream::Stdout),
            2 => Some(StdStream::Stderr),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StdStream::Stdin => "stdin",
            StdStream::Stdout => "stdout",
            StdStream::Stderr => "stderr",
        }
    }
}

/// Identity of whatever a descriptor refers to
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Resource {
    /// Path as given to the opening syscall (or by the snapshot)
    File(String),
    /// Socket identity, `socket_<pid>_<ns>` for observed sockets
    Socket(String),
    Stdio(StdStream),
}

impl Resource {
    pub fn is_socket(&self) -> bool {
        matches!(self, Resource::Socket(_))
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::File(path) => write!(f, "{}", path),
            Resource::Socket(id) => write!(f, "{}", id),
            Resource::Stdio(stream) => write!(f, "<{}>", stream.as_str()),
        }
    }
}

/// How a binding came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingOrigin {
    /// Created by a syscall seen in the trace
    Observed,
    /// Copied from the parent at fork
    Inherited,
    /// Loaded from the pre-trace snapshot, valid from trace start
    PreTrace,
}

/// One validity interval `[valid_from, valid_until)` for a `(pid, fd)` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DescriptorBinding {
    pub pid: u32,
    pub fd: i32,
    pub resource: Resource,
    pub valid_from: Timestamp,
    /// `None` while still open at trace end
    pub valid_until: Option<Timestamp>,
    pub origin: BindingOrigin,
}

impl DescriptorBinding {
    pub fn contains(&self, at: Timestamp) -> bool {
        self.valid_from <= at && self.valid_until.map_or(true, |until| at < until)
    }

    pub fn is_open(&self) -> bool {
        self.valid_until.is_none()
    }
}

/// Where a resolved resource came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    Observed,
    Inherited,
    PreTrace,
    /// Unbound descriptor 0-2
    Standard,
}

impl From<BindingOrigin> for ResolutionSource {
    fn from(origin: BindingOrigin) -> Self {
        match origin {
            BindingOrigin::Observed => ResolutionSource::Observed,
            BindingOrigin::Inherited => ResolutionSource::Inherited,
            BindingOrigin::PreTrace => ResolutionSource::PreTrace,
        }
    }
}

/// Result of a `(pid, fd, time)` lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved {
        resource: Resource,
        source: ResolutionSource,
    },
    /// No binding covers the instant; the descriptor number is kept
    Unresolved { fd: i32 },
}

impl Resolution {
    pub fn resource(&self) -> Option<&Resource> {
        match self {
            Resolution::Resolved { resource, .. } => Some(resource),
            Resolution::Unresolved { .. } => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved { .. })
    }
}
