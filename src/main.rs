use anyhow::{Context, Result};
use clap::Parser;
use ktrace::cli::{Cli, OutputFormat};
use ktrace::descriptors::DescriptorSnapshot;
use ktrace::grouping::GroupingRules;
use ktrace::ingest::{self, CsvSink, IngestSink, JsonSink, TextSink};
use ktrace::pipeline::{Pipeline, PipelineConfig};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber; `--debug` raises everything to trace
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_output(args: &Cli) -> Result<Box<dyn Write>> {
    Ok(match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path).with_context(|| {
            format!("Failed to create output file: {}", path.display())
        })?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    })
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.debug);

    let rules = match &args.rules {
        Some(path) => GroupingRules::from_toml(path)?,
        None => GroupingRules::default_rules()?,
    };

    let snapshot = args
        .fd_snapshot
        .as_ref()
        .map(DescriptorSnapshot::from_json_file)
        .transpose()?;

    let config = PipelineConfig {
        pairing_window_ms: args.pairing_window_ms,
        include_unclassified: args.include_unclassified,
        pipelined: args.pipelined,
        ..Default::default()
    };
    let pipeline = Pipeline::new(rules, config)?;
    let output = pipeline
        .run(&args.trace, snapshot.as_ref())
        .with_context(|| format!("Failed to interpret trace: {}", args.trace.display()))?;

    let writer = open_output(&args)?;
    let mut sink: Box<dyn IngestSink> = match args.format {
        OutputFormat::Text => Box::new(TextSink::new(writer, args.statistics)),
        OutputFormat::Json => Box::new(JsonSink::new(writer)),
        OutputFormat::Csv => Box::new(CsvSink::new(writer, args.statistics)),
    };
    ingest::ingest(&output, sink.as_mut())?;

    Ok(())
}
