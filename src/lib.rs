//! ktrace - kernel trace interpretation
//!
//! Turns the text output of a kernel event tracer into a provenance model:
//! the actors that took part (processes, threads, files, sockets, CPUs) and
//! the operations they performed, aggregated into time-contiguous
//! sequences. Descriptor numbers are resolved to resources through a
//! time-interval table built in a first pass over the trace.

pub mod actors;
pub mod cli;
pub mod context;
pub mod csv_output;
pub mod descriptors;
pub mod error;
pub mod event;
pub mod grouping;
pub mod ingest;
pub mod json_output;
pub mod operation;
pub mod parser;
pub mod pipeline;
pub mod sequence;
pub mod stats;

pub use error::{Result, TraceError};
pub use pipeline::{Pipeline, PipelineConfig, PipelineOutput};
