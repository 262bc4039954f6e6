use super::aggregate::{EventSequence, Grouper};
use super::pairing::{Pairing, PairingStats, SyscallPairer};
use crate::descriptors::{DescriptorTable, Resource};
use crate::event::{str_field, Fields, KernelEvent, Phase};
use crate::grouping::{ClassRule, GroupingRules, TargetStrategy};
use crate::operation::{Operation, Outcome, Target, TargetSource};
use serde::Serialize;
use std::collections::BTreeMap;

/// Default pairing window: one minute between entry and exit
pub const DEFAULT_PAIRING_WINDOW_MS: u64 = 60_000;

/// Counters for the second pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuilderStats {
    pub pairing: PairingStats,
    /// Entry events per syscall
    pub entries_by_syscall: BTreeMap<String, u64>,
    /// Paired plus incomplete operations per syscall; equals `entries_by_syscall`
    pub operations_by_syscall: BTreeMap<String, u64>,
    /// Operations whose syscall has no class (not sequenced unless included)
    pub unclassified_operations: u64,
    pub resolved_targets: u64,
    pub unresolved_targets: u64,
    pub untargeted: u64,
    pub operations_by_class: BTreeMap<String, u64>,
    pub sequences_by_class: BTreeMap<String, u64>,
}

/// Output of one sequence-building pass
#[derive(Debug, Clone, Default)]
pub struct BuildOutput {
    pub sequences: Vec<EventSequence>,
    pub stats: BuilderStats,
}

/// Pairs syscalls into operations and aggregates them into sequences
#[derive(Debug, Clone)]
pub struct SequenceBuilder {
    rules: GroupingRules,
    catch_all: ClassRule,
    pairing_window_nanos: u64,
    include_unclassified: bool,
}

impl SequenceBuilder {
    pub fn new(rules: GroupingRules) -> Self {
        Self {
            rules,
            catch_all: ClassRule::unclassified(),
            pairing_window_nanos: DEFAULT_PAIRING_WINDOW_MS * 1_000_000,
            include_unclassified: false,
        }
    }

    pub fn with_pairing_window_ms(mut self, window_ms: u64) -> Self {
        self.pairing_window_nanos = window_ms.saturating_mul(1_000_000);
        self
    }

    /// Sequence syscalls without a class under the catch-all `other` class
    pub fn with_unclassified(mut self, include: bool) -> Self {
        self.include_unclassified = include;
        self
    }

    pub fn rules(&self) -> &GroupingRules {
        &self.rules
    }

    /// Run the second pass over time-ordered events
    ///
    /// `table` must be complete: every lookup is made as of the operation's
    /// own timestamps, so later bindings never leak into earlier operations.
    pub fn build<I>(&self, events: I, table: &DescriptorTable) -> BuildOutput
    where
        I: IntoIterator<Item = KernelEvent>,
    {
        let mut stats = BuilderStats::default();
        let mut pairer = SyscallPairer::new(self.pairing_window_nanos);
        let mut pairings = Vec::new();

        for event in events {
            if event.phase() == Phase::Entry {
                if let Some(syscall) = event.syscall() {
                    *stats
                        .entries_by_syscall
                        .entry(syscall.to_string())
                        .or_default() += 1;
                }
            }
            pairer.push(event, &mut pairings);
        }
        pairer.finish(&mut pairings);
        stats.pairing = pairer.stats().clone();

        let mut operations: Vec<(u64, Operation)> = Vec::with_capacity(pairings.len());
        for pairing in pairings {
            let ordinal = pairing.ordinal();
            if let Some(op) = self.operation(pairing, table, &mut stats) {
                operations.push((ordinal, op));
            }
        }
        operations.sort_by_key(|(ordinal, op)| (op.start, *ordinal));

        let mut grouper = Grouper::new();
        for (_, op) in operations {
            let gap = self.rule_for(&op.class).map_or(0, ClassRule::gap_nanos);
            grouper.push(op, gap);
        }

        let sequences = grouper.finish();
        for sequence in &sequences {
            *stats
                .sequences_by_class
                .entry(sequence.class.clone())
                .or_default() += 1;
        }

        BuildOutput { sequences, stats }
    }

    fn rule_for(&self, class: &str) -> Option<&ClassRule> {
        self.rules.get_class(class).or_else(|| {
            (self.include_unclassified && class == self.catch_all.name).then_some(&self.catch_all)
        })
    }

    /// Classify one pairing and resolve its target
    fn operation(
        &self,
        pairing: Pairing,
        table: &DescriptorTable,
        stats: &mut BuilderStats,
    ) -> Option<Operation> {
        let (entry, exit) = match pairing {
            Pairing::Complete { entry, exit, .. } => (entry, Some(exit)),
            Pairing::Incomplete { entry, .. } => (entry, None),
        };
        let syscall = entry.syscall().unwrap_or_default().to_string();

        *stats
            .operations_by_syscall
            .entry(syscall.clone())
            .or_default() += 1;

        let rule = match self.rules.classify(&syscall) {
            Some(rule) => rule,
            None => {
                stats.unclassified_operations += 1;
                if !self.include_unclassified {
                    return None;
                }
                &self.catch_all
            }
        };

        let ret = exit.as_ref().and_then(KernelEvent::ret);
        let start = entry.timestamp;
        let end = exit.as_ref().map_or(start, |e| e.timestamp.max(start));

        let target = self.target(rule.target, &entry, ret, table);
        match &target {
            Target::Resolved { .. } => stats.resolved_targets += 1,
            Target::Unresolved { .. } => stats.unresolved_targets += 1,
            Target::Untargeted => stats.untargeted += 1,
        }

        let rule = match &rule.on_socket {
            Some(socket_class) if target.is_socket() => {
                self.rules.get_class(socket_class).unwrap_or(rule)
            }
            _ => rule,
        };
        *stats
            .operations_by_class
            .entry(rule.name.clone())
            .or_default() += 1;

        let bytes = rule
            .counts_bytes
            .then(|| ret.filter(|r| *r > 0).map_or(0, |r| r as u64));

        Some(Operation {
            class: rule.name.clone(),
            syscall,
            pid: entry.pid,
            tid: entry.tid,
            cpu: entry.cpu,
            target,
            start,
            end,
            bytes,
            outcome: Outcome::from_ret(ret),
            complete: exit.is_some(),
            return_value: ret,
            entry_fields: entry.fields,
            exit_fields: exit.map(|e| e.fields).unwrap_or_default(),
        })
    }

    fn target(
        &self,
        strategy: TargetStrategy,
        entry: &KernelEvent,
        ret: Option<i64>,
        table: &DescriptorTable,
    ) -> Target {
        match strategy {
            TargetStrategy::Fd => match entry.int("fd").and_then(|fd| i32::try_from(fd).ok()) {
                Some(fd) => match entry.pid {
                    Some(pid) => table.resolve(pid, fd, entry.timestamp).into(),
                    None => Target::Unresolved { fd },
                },
                None => Target::Untargeted,
            },
            TargetStrategy::Path => path_target(&entry.fields),
            TargetStrategy::RetFd => {
                let fd = ret
                    .filter(|r| *r >= 0)
                    .and_then(|r| i32::try_from(r).ok());
                match (fd, entry.pid) {
                    // Created descriptors are bound from the call's entry
                    (Some(fd), Some(pid)) => table.resolve(pid, fd, entry.timestamp).into(),
                    (Some(fd), None) => Target::Unresolved { fd },
                    // Failed or unfinished open still names its path
                    (None, _) => path_target(&entry.fields),
                }
            }
            TargetStrategy::None => Target::Untargeted,
        }
    }
}

fn path_target(fields: &Fields) -> Target {
    str_field(fields, "filename")
        .or_else(|| str_field(fields, "pathname"))
        .map_or(Target::Untargeted, |path| Target::Resolved {
            resource: Resource::File(path.to_string()),
            source: TargetSource::Path,
        })
}
