//! Pre-trace descriptor snapshot
//!
//! The capture tooling records `lsof -Fn -p <pid>` for every traced process
//! right before tracing starts and stores the raw outputs in a JSON object keyed
//! by pid. Each `f<fd>` record followed by an `n<name>` record becomes one entry.

use super::Resource;
use crate::error::{Result, TraceError};
use std::collections::BTreeMap;
use std::path::Path;

/// One `(pid, fd) -> resource` fact from the snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub pid: u32,
    pub fd: i32,
    pub resource: Resource,
}

/// Descriptor listing captured before observation began
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorSnapshot {
    entries: Vec<SnapshotEntry>,
    skipped: u64,
}

impl DescriptorSnapshot {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| TraceError::io(path, e))?;
        Self::from_json_str(&text)
    }

    /// Parse `{"<pid>": "<lsof -Fn output>", ...}`
    pub fn from_json_str(text: &str) -> Result<Self> {
        let raw: BTreeMap<String, String> = serde_json::from_str(text)
            .map_err(|e| TraceError::SnapshotFormat(e.to_string()))?;

        let mut snapshot = DescriptorSnapshot::default();
        for (key, output) in &raw {
            let pid = key.trim().parse::<u32>().ok();
            if pid.is_none() {
                tracing::warn!(key = %key, "snapshot key is not a pid, relying on p records");
            }
            snapshot.extend_from_lsof(pid, output);
        }
        Ok(snapshot)
    }

    /// Parse one raw `lsof -F` output; `pid` applies until a `p` record says otherwise
    pub fn from_lsof(pid: Option<u32>, output: &str) -> Self {
        let mut snapshot = DescriptorSnapshot::default();
        snapshot.extend_from_lsof(pid, output);
        snapshot
    }

    fn extend_from_lsof(&mut self, mut pid: Option<u32>, output: &str) {
        let mut fd: Option<i32> = None;

        for line in output.lines() {
            let line = line.trim_end_matches('\r');
            let Some(tag) = line.chars().next() else {
                continue;
            };
            let value = &line[tag.len_utf8()..];
            match tag {
                'p' => {
                    pid = value.parse().ok();
                    fd = None;
                }
                // cwd, txt, mem and similar are not numbered descriptors
                'f' => fd = value.parse().ok(),
                'n' => {
                    let resource = classify_name(value);
                    match (pid, fd.take(), resource) {
                        (Some(pid), Some(fd), Some(resource)) => {
                            self.entries.push(SnapshotEntry { pid, fd, resource })
                        }
                        _ => self.skipped += 1,
                    }
                }
                _ => {}
            }
        }
    }

    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.entries
    }

    /// Name records that did not yield an entry
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Classify an lsof name as a socket or file; `type=` pseudo names yield nothing
pub fn classify_name(name: &str) -> Option<Resource> {
    let name = name.trim();
    if name.is_empty() || name.starts_with("type=") {
        return None;
    }

    let socket_like = name.starts_with("socket:")
        || name.contains("->")
        || name.starts_with("*:")
        || ["TCP ", "UDP ", "UNIX ", "TCP6 ", "UDP6 "]
            .iter()
            .any(|prefix| name.starts_with(prefix));

    if socket_like {
        Some(Resource::Socket(name.to_string()))
    } else {
        Some(Resource::File(name.to_string()))
    }
}
