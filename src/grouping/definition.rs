use serde::{Deserialize, Serialize};

/// How an operation's target resource is found
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TargetStrategy {
    /// Entry field `fd`, resolved at the operation's start
    #[default]
    Fd,
    /// Entry field `filename` or `pathname`, taken as-is
    Path,
    /// Descriptor returned by the call, resolved at the operation's end
    RetFd,
    /// Operation has no target
    None,
}

/// One operation class loaded from TOML
///
/// # Example TOML
/// ```toml
/// [[class]]
/// name = "write"
/// description = "File writes"
/// syscalls = ["write", "pwrite64", "writev"]
/// gap_ms = 100.0
/// target = "fd"
/// on_socket = "socket_send"
/// counts_bytes = true
/// ```
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ClassRule {
    /// Unique class name (e.g., "read", "socket_send")
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Syscalls that produce operations of this class
    pub syscalls: Vec<String>,

    /// Largest gap in milliseconds between adjacent members of a sequence
    ///
    /// 0.0 means every operation forms its own sequence.
    #[serde(default)]
    pub gap_ms: f64,

    #[serde(default)]
    pub target: TargetStrategy,

    /// Class to use instead when the target resolves to a socket
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_socket: Option<String>,

    /// Sum positive return values as transferred bytes
    #[serde(default)]
    pub counts_bytes: bool,
}

/// Name of the catch-all class; reserved in rule files
pub const UNCLASSIFIED_CLASS: &str = "other";

impl ClassRule {
    /// Gap threshold in nanoseconds
    pub fn gap_nanos(&self) -> u64 {
        (self.gap_ms.max(0.0) * 1_000_000.0).round() as u64
    }

    /// True when operations of this class never aggregate
    pub fn is_standalone(&self) -> bool {
        self.gap_nanos() == 0
    }

    /// Catch-all class for syscalls no rule names
    pub fn unclassified() -> Self {
        Self {
            name: UNCLASSIFIED_CLASS.to_string(),
            description: "Syscalls without a configured class".to_string(),
            syscalls: Vec::new(),
            gap_ms: 0.0,
            target: TargetStrategy::None,
            on_socket: None,
            counts_bytes: false,
        }
    }
}
