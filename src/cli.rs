//! CLI argument parsing for ktrace

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Output format for interpreted traces
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON document for machine parsing and ingestion
    Json,
    /// CSV format for spreadsheet analysis
    Csv,
}

#[derive(Parser, Debug)]
#[command(name = "ktrace")]
#[command(version)]
#[command(
    about = "Interpret kernel trace text into actors and operation sequences",
    long_about = None
)]
pub struct Cli {
    /// Trace file (babeltrace text output)
    #[arg(value_name = "TRACE")]
    pub trace: PathBuf,

    /// Pre-trace descriptor snapshot (JSON: pid -> `lsof -Fn` output)
    #[arg(long = "fd-snapshot", value_name = "FILE")]
    pub fd_snapshot: Option<PathBuf>,

    /// Grouping rules file (TOML); the built-in rules are used otherwise
    #[arg(long = "rules", value_name = "FILE")]
    pub rules: Option<PathBuf>,

    /// Output format
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Write output to FILE instead of stdout
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Show per-class statistics summary instead of individual sequences
    #[arg(short = 'c', long = "summary")]
    pub statistics: bool,

    /// Longest entry-to-exit distance that still pairs (milliseconds)
    #[arg(
        long = "pairing-window-ms",
        value_name = "MS",
        default_value = "60000"
    )]
    pub pairing_window_ms: u64,

    /// Sequence syscalls that have no class under `other`
    #[arg(long = "include-unclassified")]
    pub include_unclassified: bool,

    /// Parse on a separate thread
    #[arg(long = "pipelined")]
    pub pipelined: bool,

    /// Enable debug logging to stderr
    #[arg(long = "debug")]
    pub debug: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_trace() {
        let cli = Cli::parse_from(["ktrace", "trace.txt"]);
        assert_eq!(cli.trace, PathBuf::from("trace.txt"));
        assert!(cli.fd_snapshot.is_none());
        assert!(cli.rules.is_none());
        assert!(cli.output.is_none());
    }

    #[test]
    fn test_cli_requires_trace() {
        assert!(Cli::try_parse_from(["ktrace"]).is_err());
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["ktrace", "t"]);
        assert_eq!(cli.format, OutputFormat::Text);
        assert_eq!(cli.pairing_window_ms, 60_000);
        assert!(!cli.statistics);
        assert!(!cli.include_unclassified);
        assert!(!cli.pipelined);
        assert!(!cli.debug);
    }

    #[test]
    fn test_cli_format_json() {
        let cli = Cli::parse_from(["ktrace", "--format", "json", "t"]);
        assert_eq!(cli.format, OutputFormat::Json);
    }

    #[test]
    fn test_cli_format_invalid() {
        assert!(Cli::try_parse_from(["ktrace", "--format", "xml", "t"]).is_err());
    }

    #[test]
    fn test_cli_snapshot_and_rules() {
        let cli = Cli::parse_from([
            "ktrace",
            "--fd-snapshot",
            "fds.json",
            "--rules",
            "rules.toml",
            "t",
        ]);
        assert_eq!(cli.fd_snapshot, Some(PathBuf::from("fds.json")));
        assert_eq!(cli.rules, Some(PathBuf::from("rules.toml")));
    }

    #[test]
    fn test_cli_summary_flag() {
        let cli = Cli::parse_from(["ktrace", "-c", "t"]);
        assert!(cli.statistics);
    }

    #[test]
    fn test_cli_pairing_window_custom() {
        let cli = Cli::parse_from(["ktrace", "--pairing-window-ms", "250", "t"]);
        assert_eq!(cli.pairing_window_ms, 250);
    }

    #[test]
    fn test_cli_output_file() {
        let cli = Cli::parse_from(["ktrace", "-o", "out.json", "t"]);
        assert_eq!(cli.output, Some(PathBuf::from("out.json")));
    }
}
