// Operation pairing and sequence aggregation
//
// The second pass over the trace. Syscall entries are matched to their exits
// per thread, classified by the grouping rules, attributed to a target through
// the completed descriptor table, then merged into EventSequences by a
// deterministic single-pass grouper. Every entry is accounted for: unmatched
// ones become incomplete operations rather than disappearing.

mod aggregate;
mod builder;
mod pairing;

pub use aggregate::{EventSequence, Grouper};
pub use builder::{BuildOutput, BuilderStats, SequenceBuilder, DEFAULT_PAIRING_WINDOW_MS};
pub use pairing::{Pairing, PairingStats, SyscallPairer};
