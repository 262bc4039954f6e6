use super::{
    BindingOrigin, DescriptorBinding, DescriptorSnapshot, Resolution, ResolutionSource, Resource,
    StdStream,
};
use crate::event::Timestamp;
use serde::Serialize;
use std::collections::BTreeMap;

/// Binding bookkeeping counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableStats {
    /// Observed bindings (open, socket, accept, dup)
    pub created: u64,
    pub from_snapshot: u64,
    pub inherited: u64,
    pub closed: u64,
    /// Open bindings replaced by a new open without an observed close
    pub implicit_reuse: u64,
    /// Snapshot bindings superseded by an observed open
    pub snapshot_superseded: u64,
    /// Closes of descriptors with no open binding
    pub ignored_closes: u64,
}

/// Two bindings of one `(pid, fd)` pair whose intervals intersect
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindingOverlap {
    pub pid: u32,
    pub fd: i32,
    pub first_from: Timestamp,
    pub second_from: Timestamp,
}

/// Per-process temporal descriptor map
#[derive(Debug, Default)]
pub struct DescriptorTable {
    bindings: BTreeMap<(u32, i32), Vec<DescriptorBinding>>,
    stats: TableStats,
}

impl DescriptorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed pre-trace bindings, valid from trace start
    pub fn load_snapshot(&mut self, snapshot: &DescriptorSnapshot) {
        for entry in snapshot.entries() {
            let list = self.bindings.entry((entry.pid, entry.fd)).or_default();
            if list.iter().any(DescriptorBinding::is_open) {
                tracing::warn!(
                    pid = entry.pid,
                    fd = entry.fd,
                    "duplicate snapshot entry ignored"
                );
                continue;
            }
            list.push(DescriptorBinding {
                pid: entry.pid,
                fd: entry.fd,
                resource: entry.resource.clone(),
                valid_from: Timestamp::ZERO,
                valid_until: None,
                origin: BindingOrigin::PreTrace,
            });
            self.stats.from_snapshot += 1;
        }
    }

    /// Bind `fd` to `resource` from `at`, closing whatever was open on it
    pub fn open(&mut self, pid: u32, fd: i32, resource: Resource, at: Timestamp) {
        self.bind(pid, fd, resource, at, BindingOrigin::Observed);
        self.stats.created += 1;
    }

    fn bind(
        &mut self,
        pid: u32,
        fd: i32,
        resource: Resource,
        at: Timestamp,
        origin: BindingOrigin,
    ) {
        let list = self.bindings.entry((pid, fd)).or_default();
        for binding in list.iter_mut().filter(|b| b.is_open()) {
            binding.valid_until = Some(at.max(binding.valid_from));
            if binding.origin == BindingOrigin::PreTrace {
                self.stats.snapshot_superseded += 1;
            } else {
                self.stats.implicit_reuse += 1;
            }
        }
        // A binding may not start before an earlier one on the same pair ended
        let from = list
            .iter()
            .filter_map(|b| b.valid_until)
            .fold(at, Timestamp::max);
        list.push(DescriptorBinding {
            pid,
            fd,
            resource,
            valid_from: from,
            valid_until: None,
            origin,
        });
    }

    /// Close the open binding of `(pid, fd)`; a no-op when nothing is open
    pub fn close(&mut self, pid: u32, fd: i32, at: Timestamp) -> Option<Resource> {
        let binding = self
            .bindings
            .get_mut(&(pid, fd))
            .and_then(|list| list.iter_mut().rev().find(|b| b.is_open()));

        match binding {
            Some(binding) => {
                binding.valid_until = Some(at.max(binding.valid_from));
                self.stats.closed += 1;
                Some(binding.resource.clone())
            }
            None => {
                self.stats.ignored_closes += 1;
                None
            }
        }
    }

    /// Point `new_fd` at whatever `old_fd` refers to at `at`
    ///
    /// When `old_fd` cannot be resolved, `new_fd` is still closed: it no longer
    /// refers to its previous resource.
    pub fn duplicate(
        &mut self,
        pid: u32,
        old_fd: i32,
        new_fd: i32,
        at: Timestamp,
    ) -> Option<Resource> {
        match self.resolve(pid, old_fd, at) {
            Resolution::Resolved { resource, .. } => {
                self.open(pid, new_fd, resource.clone(), at);
                Some(resource)
            }
            Resolution::Unresolved { .. } => {
                if self.current(pid, new_fd).is_some() {
                    self.close(pid, new_fd, at);
                }
                None
            }
        }
    }

    /// Copy every binding of `parent` valid at `at` into `child`
    pub fn inherit(&mut self, parent: u32, child: u32, at: Timestamp) -> usize {
        let inherited: Vec<(i32, Resource)> = self
            .bindings
            .range((parent, i32::MIN)..=(parent, i32::MAX))
            .filter_map(|(&(_, fd), list)| {
                list.iter()
                    .find(|b| b.contains(at))
                    .map(|b| (fd, b.resource.clone()))
            })
            .collect();

        let count = inherited.len();
        for (fd, resource) in inherited {
            self.bind(child, fd, resource, at, BindingOrigin::Inherited);
            self.stats.inherited += 1;
        }
        count
    }

    /// Close every open binding of `pid`, as on process exit
    pub fn close_all(&mut self, pid: u32, at: Timestamp) -> usize {
        let mut closed = 0;
        for (_, list) in self.bindings.range_mut((pid, i32::MIN)..=(pid, i32::MAX)) {
            for binding in list.iter_mut().filter(|b| b.is_open()) {
                binding.valid_until = Some(at.max(binding.valid_from));
                closed += 1;
            }
        }
        self.stats.closed += closed as u64;
        closed
    }

    /// Resolve `(pid, fd)` as of `at`
    ///
    /// Observed and inherited bindings win over snapshot bindings; unbound
    /// descriptors 0-2 resolve to the standard streams.
    pub fn resolve(&self, pid: u32, fd: i32, at: Timestamp) -> Resolution {
        if let Some(list) = self.bindings.get(&(pid, fd)) {
            let hit = list
                .iter()
                .find(|b| b.origin != BindingOrigin::PreTrace && b.contains(at))
                .or_else(|| {
                    list.iter()
                        .find(|b| b.origin == BindingOrigin::PreTrace && b.contains(at))
                });
            if let Some(binding) = hit {
                return Resolution::Resolved {
                    resource: binding.resource.clone(),
                    source: binding.origin.into(),
                };
            }
        }

        match StdStream::from_fd(fd) {
            Some(stream) => Resolution::Resolved {
                resource: Resource::Stdio(stream),
                source: ResolutionSource::Standard,
            },
            None => Resolution::Unresolved { fd },
        }
    }

    /// Binding of `(pid, fd)` still open at the latest point seen
    pub fn current(&self, pid: u32, fd: i32) -> Option<&DescriptorBinding> {
        self.bindings
            .get(&(pid, fd))
            .and_then(|list| list.iter().rev().find(|b| b.is_open()))
    }

    /// Interval history of one `(pid, fd)` pair
    pub fn history(&self, pid: u32, fd: i32) -> &[DescriptorBinding] {
        self.bindings
            .get(&(pid, fd))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn bindings(&self) -> impl Iterator<Item = &DescriptorBinding> {
        self.bindings.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.bindings.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn stats(&self) -> &TableStats {
        &self.stats
    }

    /// Report every pair of intersecting intervals
    ///
    /// Empty when the at-most-one-binding-per-instant invariant holds.
    pub fn verify(&self) -> Vec<BindingOverlap> {
        let mut overlaps = Vec::new();
        for (&(pid, fd), list) in &self.bindings {
            let mut sorted: Vec<&DescriptorBinding> =
                list.iter().filter(|b| !is_empty_interval(b)).collect();
            sorted.sort_by_key(|b| b.valid_from);
            for pair in sorted.windows(2) {
                let (first, second) = (pair[0], pair[1]);
                let first_end_after = first
                    .valid_until
                    .map_or(true, |until| until > second.valid_from);
                if first_end_after {
                    overlaps.push(BindingOverlap {
                        pid,
                        fd,
                        first_from: first.valid_from,
                        second_from: second.valid_from,
                    });
                }
            }
        }
        overlaps
    }
}

fn is_empty_interval(binding: &DescriptorBinding) -> bool {
    binding.valid_until == Some(binding.valid_from)
}
