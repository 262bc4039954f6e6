//! Sequence building throughput benchmark
//!
//! Measures the cost of each stage over a synthetic trace: line parsing alone,
//! the full pipeline, and the pipelined variant.
//!
//! # Run Instructions
//!
//! ```bash
//! cargo bench --bench sequence_building
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ktrace::grouping::GroupingRules;
use ktrace::parser::parse_line;
use ktrace::pipeline::{Pipeline, PipelineConfig};
use std::fmt::Write;
use std::io::Cursor;

/// `ops` write syscalls spread over four processes, 2 ms apart
fn synthetic_trace(ops: u64) -> String {
    let mut text = String::new();
    for pid in 1..=4u64 {
        let _ = writeln!(
            text,
            "[0.{:09}] host syscall_entry_openat: {{ cpu_id = 0 }}, {{ pid = {pid}, tid = {pid} }}, {{ dfd = -100, filename = \"/data/{pid}\", flags = 0, mode = 0 }}",
            pid
        );
        let _ = writeln!(
            text,
            "[0.{:09}] host syscall_exit_openat: {{ cpu_id = 0 }}, {{ pid = {pid}, tid = {pid} }}, {{ ret = 3 }}",
            pid + 10
        );
    }
    for i in 0..ops {
        let pid = i % 4 + 1;
        let at = 1_000_000_000 + i * 2_000_000;
        let _ = writeln!(
            text,
            "[{}.{:09}] host syscall_entry_write: {{ cpu_id = {} }}, {{ pid = {pid}, tid = {pid} }}, {{ fd = 3, count = 64 }}",
            at / 1_000_000_000,
            at % 1_000_000_000,
            pid % 2
        );
        let _ = writeln!(
            text,
            "[{}.{:09}] host syscall_exit_write: {{ cpu_id = {} }}, {{ pid = {pid}, tid = {pid} }}, {{ ret = 64 }}",
            (at + 500) / 1_000_000_000,
            (at + 500) % 1_000_000_000,
            pid % 2
        );
    }
    text
}

fn bench_parse_line(c: &mut Criterion) {
    let line = "[18:59:58.921449123] (+0.000000234) host syscall_entry_openat: { cpu_id = 1 }, { procname = \"cat\", pid = 10, tid = 10 }, { dfd = -100, filename = \"/tmp/x\", flags = 0, mode = 0 }";

    c.bench_function("parse_line", |b| {
        b.iter(|| black_box(parse_line(black_box(line))));
    });
}

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    let rules = GroupingRules::default_rules().unwrap();

    for ops in [1_000u64, 10_000] {
        let text = synthetic_trace(ops);
        group.throughput(Throughput::Elements(ops * 2));

        for pipelined in [false, true] {
            let pipeline = Pipeline::new(
                rules.clone(),
                PipelineConfig {
                    pipelined,
                    ..Default::default()
                },
            )
            .unwrap();
            let name = if pipelined { "pipelined" } else { "sequential" };

            group.bench_with_input(BenchmarkId::new(name, ops), &text, |b, text| {
                b.iter(|| {
                    let output = pipeline
                        .run_reader(Cursor::new(text.as_bytes()), None)
                        .unwrap();
                    black_box(output.sequences.len());
                });
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_parse_line, bench_pipeline);
criterion_main!(benches);
