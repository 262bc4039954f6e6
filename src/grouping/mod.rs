// Configurable operation classes
//
// Each class lists the syscalls it covers, the gap threshold that breaks a
// burst into separate sequences, and how its target resource is located.
// Thresholds are policy, so they live in TOML rather than in code; the
// embedded grouping-default.toml applies when no file is given.

mod definition;
mod registry;

pub use definition::{ClassRule, TargetStrategy, UNCLASSIFIED_CLASS};
pub use registry::GroupingRules;
