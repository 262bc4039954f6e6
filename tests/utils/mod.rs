// Integration test utilities
//
// Builds babeltrace-style trace text so tests can describe a workload as a
// list of syscalls and lifecycle events.

#![allow(dead_code)]

use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

/// Trace text builder; times are milliseconds since trace start
#[derive(Debug, Default)]
pub struct TraceBuilder {
    lines: Vec<String>,
}

impl TraceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn stamp(at_ns: u64) -> String {
        format!("[{}.{:09}]", at_ns / 1_000_000_000, at_ns % 1_000_000_000)
    }

    /// Raw event with explicit context and payload text
    pub fn event(&mut self, at_ns: u64, pid: u32, tid: u32, name: &str, payload: &str) -> &mut Self {
        self.lines.push(format!(
            "{} host {}: {{ cpu_id = 0 }}, {{ procname = \"proc{}\", pid = {}, tid = {} }}, {{ {} }}",
            Self::stamp(at_ns),
            name,
            pid,
            pid,
            tid,
            payload
        ));
        self
    }

    /// Entry at `at_ms`, exit one microsecond later
    pub fn syscall(&mut self, at_ms: u64, pid: u32, syscall: &str, args: &str, ret: i64) -> &mut Self {
        self.syscall_on(at_ms, pid, pid, syscall, args, ret)
    }

    pub fn syscall_on(
        &mut self,
        at_ms: u64,
        pid: u32,
        tid: u32,
        syscall: &str,
        args: &str,
        ret: i64,
    ) -> &mut Self {
        let at = at_ms * 1_000_000;
        self.event(at, pid, tid, &format!("syscall_entry_{}", syscall), args);
        self.event(
            at + 1_000,
            pid,
            tid,
            &format!("syscall_exit_{}", syscall),
            &format!("ret = {}", ret),
        )
    }

    pub fn open(&mut self, at_ms: u64, pid: u32, path: &str, fd: i64) -> &mut Self {
        self.syscall(
            at_ms,
            pid,
            "openat",
            &format!("dfd = -100, filename = \"{}\", flags = 0, mode = 0", path),
            fd,
        )
    }

    pub fn close(&mut self, at_ms: u64, pid: u32, fd: i64) -> &mut Self {
        self.syscall(at_ms, pid, "close", &format!("fd = {}", fd), 0)
    }

    pub fn read(&mut self, at_ms: u64, pid: u32, fd: i64, bytes: i64) -> &mut Self {
        self.syscall(at_ms, pid, "read", &format!("fd = {}, count = {}", fd, bytes), bytes)
    }

    pub fn write(&mut self, at_ms: u64, pid: u32, fd: i64, bytes: i64) -> &mut Self {
        self.syscall(at_ms, pid, "write", &format!("fd = {}, count = {}", fd, bytes), bytes)
    }

    pub fn fork(&mut self, at_ms: u64, parent: u32, child: u32) -> &mut Self {
        self.event(
            at_ms * 1_000_000,
            parent,
            parent,
            "sched_process_fork",
            &format!(
                "parent_comm = \"proc{p}\", parent_tid = {p}, parent_pid = {p}, child_comm = \"proc{p}\", child_tid = {c}, child_pid = {c}",
                p = parent,
                c = child
            ),
        )
    }

    pub fn exit(&mut self, at_ms: u64, pid: u32) -> &mut Self {
        self.event(
            at_ms * 1_000_000,
            pid,
            pid,
            "sched_process_exit",
            &format!("comm = \"proc{}\", tid = {}, prio = 120", pid, pid),
        )
    }

    /// Arbitrary text line, for malformed-input cases
    pub fn raw(&mut self, line: &str) -> &mut Self {
        self.lines.push(line.to_string());
        self
    }

    pub fn text(&self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }

    pub fn to_file(&self) -> NamedTempFile {
        write_temp(&self.text())
    }
}

pub fn write_temp(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

pub fn path_of(file: &NamedTempFile) -> PathBuf {
    file.path().to_path_buf()
}
