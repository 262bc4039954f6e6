use super::model::{ActorKey, ActorRef, ActorSnapshot, Cpu, File, Process, Socket, Thread};
use crate::descriptors::{DescriptorTable, Resource};
use crate::event::{int_field, str_field, EventKind, Fields, KernelEvent, Timestamp};
use fnv::FnvHashMap;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

const OPEN_SYSCALLS: &[&str] = &["open", "openat", "openat2", "creat"];
const ACCEPT_SYSCALLS: &[&str] = &["accept", "accept4"];
const DUP_SYSCALLS: &[&str] = &["dup", "dup2", "dup3"];
const FILE_IO_SYSCALLS: &[&str] = &[
    "read", "pread64", "readv", "preadv", "preadv2", "write", "pwrite64", "writev", "pwritev",
    "pwritev2",
];
const ADDRESS_FIELDS: &[&str] = &["uservaddr", "umyaddr", "sockaddr", "addr"];

const F_DUPFD: i64 = 0;
const F_DUPFD_CLOEXEC: i64 = 1030;

/// Syscalls whose exit changes descriptor or actor state
fn tracks(syscall: &str) -> bool {
    OPEN_SYSCALLS.contains(&syscall)
        || ACCEPT_SYSCALLS.contains(&syscall)
        || DUP_SYSCALLS.contains(&syscall)
        || FILE_IO_SYSCALLS.contains(&syscall)
        || matches!(syscall, "socket" | "close" | "connect" | "bind" | "fcntl")
}

/// Lifecycle diagnostics from the registry pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub implicit_processes: u64,
    pub implicit_threads: u64,
    /// Implicit processes later confirmed by their fork event
    pub upgraded_processes: u64,
    /// Forks that started a new generation of an already-seen pid
    pub pid_reuse: u64,
    /// Thread clones that reused the id of an exited thread in the same process
    pub tid_reuse: u64,
    /// Generations ended by reuse because their exit was never observed
    pub lost_exits: u64,
    /// Descriptor-affecting syscalls that returned an error
    pub failed_calls: u64,
    /// Events with no known owning thread
    pub unattributed_events: u64,
    /// Events naming a process after its observed termination
    pub post_exit_events: u64,
}

#[derive(Debug)]
struct PendingCall {
    syscall: String,
    fields: Fields,
    at: Timestamp,
}

/// Lifecycle state for every actor seen in the trace
///
/// Fed one event at a time in timestamp order. Descriptor-affecting syscalls
/// update the `DescriptorTable` passed alongside each event.
#[derive(Debug, Default)]
pub struct ActorRegistry {
    processes: BTreeMap<u32, Vec<Process>>,
    threads: BTreeMap<(u32, u32), Vec<Thread>>,
    files: BTreeMap<String, File>,
    sockets: BTreeMap<String, Socket>,
    cpus: BTreeMap<u32, Cpu>,
    pending: FnvHashMap<u32, PendingCall>,
    stats: RegistryStats,
}

impl ActorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event
    pub fn observe(&mut self, event: &KernelEvent, table: &mut DescriptorTable) {
        let at = event.timestamp;
        if let Some(cpu) = event.cpu {
            self.touch_cpu(cpu, at);
        }

        let owner = event.owner();
        match owner {
            Some((pid, tid)) => self.touch_owner(pid, tid, event),
            None => self.stats.unattributed_events += 1,
        }

        match &event.kind {
            EventKind::ProcessFork {
                parent_pid,
                child_pid,
                child_tid,
                child_comm,
                ..
            } => self.on_fork(
                *parent_pid,
                *child_pid,
                *child_tid,
                child_comm.as_deref(),
                at,
                table,
            ),
            EventKind::ProcessExit { tid, .. } => {
                let pid = event.pid.unwrap_or(*tid);
                self.on_exit(pid, *tid, at, table);
            }
            EventKind::ProcessExec { tid, filename } => {
                let pid = event.pid.unwrap_or(*tid);
                self.on_exec(pid, *tid, filename);
            }
            EventKind::SyscallEntry { syscall } => {
                if let Some((_, tid)) = owner {
                    if tracks(syscall) {
                        self.pending.insert(
                            tid,
                            PendingCall {
                                syscall: syscall.clone(),
                                fields: event.fields.clone(),
                                at,
                            },
                        );
                    }
                }
            }
            EventKind::SyscallExit { syscall, ret } => {
                if let Some((pid, tid)) = owner {
                    if let Some(call) = self.pending.remove(&tid) {
                        if &call.syscall == syscall {
                            self.on_syscall_exit(pid, &call, *ret, at, table);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn touch_cpu(&mut self, id: u32, at: Timestamp) {
        let cpu = self.cpus.entry(id).or_insert(Cpu {
            id,
            first_seen: at,
            last_seen: at,
            events: 0,
        });
        cpu.events += 1;
        cpu.last_seen = cpu.last_seen.max(at);
    }

    fn touch_owner(&mut self, pid: u32, tid: u32, event: &KernelEvent) {
        let at = event.timestamp;
        let comm = event.comm.as_deref();

        let process = self.ensure_process(pid, at, comm);
        if process.terminated_at.is_some() {
            self.stats.post_exit_events += 1;
            return;
        }
        process.last_seen = process.last_seen.max(at);
        if process.name.is_none() {
            process.name = comm.map(str::to_string);
        }
        process.threads.insert(tid);
        let generation = process.generation;

        let thread = self.ensure_thread(tid, pid, generation, at, comm, true);
        if thread.terminated_at.is_none() {
            thread.last_seen = thread.last_seen.max(at);
        }
        if let Some(cpu) = event.cpu {
            thread.cpus.insert(cpu);
        }
        if thread.name.is_none() {
            thread.name = comm.map(str::to_string);
        }
    }

    /// Latest generation of `pid`, created implicitly when never seen
    fn ensure_process(&mut self, pid: u32, at: Timestamp, comm: Option<&str>) -> &mut Process {
        let generations = self.processes.entry(pid).or_default();
        if generations.is_empty() {
            tracing::warn!(pid, at = %at, "process referenced before creation, creating implicitly");
            self.stats.implicit_processes += 1;
            generations.push(Process {
                pid,
                generation: 0,
                name: comm.map(str::to_string),
                parent_pid: None,
                first_seen: at,
                last_seen: at,
                terminated_at: None,
                threads: BTreeSet::new(),
                implicit: true,
            });
        }
        let last = generations.len() - 1;
        &mut generations[last]
    }

    /// Thread `(tid, pid)` belonging to process generation `process_generation`
    ///
    /// A creation (`implicit == false`) of a thread whose latest incarnation
    /// already exited starts a new incarnation.
    fn ensure_thread(
        &mut self,
        tid: u32,
        pid: u32,
        process_generation: u32,
        at: Timestamp,
        name: Option<&str>,
        implicit: bool,
    ) -> &mut Thread {
        let list = self.threads.entry((tid, pid)).or_default();
        let fresh = match list.last() {
            None => true,
            Some(t) => {
                t.process_generation != process_generation
                    || (!implicit && t.terminated_at.is_some())
            }
        };
        if fresh {
            if implicit {
                tracing::warn!(tid, pid, at = %at, "thread referenced before creation, creating implicitly");
                self.stats.implicit_threads += 1;
            } else if list.last().is_some_and(|t| t.process_generation == process_generation) {
                tracing::debug!(tid, pid, at = %at, "thread id reused after exit");
                self.stats.tid_reuse += 1;
            }
            let generation = list.len() as u32;
            list.push(Thread {
                tid,
                pid,
                generation,
                process_generation,
                name: name.map(str::to_string),
                first_seen: at,
                last_seen: at,
                terminated_at: None,
                cpus: BTreeSet::new(),
                implicit,
            });
        }
        let last = list.len() - 1;
        &mut list[last]
    }

    fn on_fork(
        &mut self,
        parent_pid: u32,
        child_pid: u32,
        child_tid: u32,
        child_comm: Option<&str>,
        at: Timestamp,
        table: &mut DescriptorTable,
    ) {
        let parent_name = self.process(parent_pid).and_then(|p| p.name.clone());
        let name = child_comm.map(str::to_string).or(parent_name);

        if child_pid == parent_pid {
            // clone() of a thread inside the same process
            let Some(generation) = self.process(parent_pid).map(|p| p.generation) else {
                return;
            };
            if let Some(process) = self.latest_process_mut(parent_pid) {
                process.threads.insert(child_tid);
            }
            let thread = self.ensure_thread(child_tid, parent_pid, generation, at, name.as_deref(), false);
            thread.implicit = false;
            return;
        }

        let generation = self.start_process(child_pid, parent_pid, name.clone(), at, table);
        table.inherit(parent_pid, child_pid, at);

        if let Some(process) = self.latest_process_mut(child_pid) {
            process.threads.insert(child_tid);
        }
        let thread = self.ensure_thread(child_tid, child_pid, generation, at, name.as_deref(), false);
        thread.implicit = false;
    }

    /// Open a generation for a forked child, returning its number
    fn start_process(
        &mut self,
        pid: u32,
        parent_pid: u32,
        name: Option<String>,
        at: Timestamp,
        table: &mut DescriptorTable,
    ) -> u32 {
        let generations = self.processes.entry(pid).or_default();
        let next = match generations.last_mut() {
            Some(existing)
                if existing.implicit
                    && existing.terminated_at.is_none()
                    && existing.parent_pid.is_none() =>
            {
                existing.implicit = false;
                existing.parent_pid = Some(parent_pid);
                if name.is_some() {
                    existing.name = name;
                }
                self.stats.upgraded_processes += 1;
                return existing.generation;
            }
            Some(existing) => {
                let generation = existing.generation;
                if existing.terminated_at.is_none() {
                    existing.terminated_at = Some(at);
                    self.stats.lost_exits += 1;
                    self.terminate_threads(pid, generation, at);
                    table.close_all(pid, at);
                }
                self.stats.pid_reuse += 1;
                generation + 1
            }
            None => 0,
        };

        self.processes.entry(pid).or_default().push(Process {
            pid,
            generation: next,
            name,
            parent_pid: Some(parent_pid),
            first_seen: at,
            last_seen: at,
            terminated_at: None,
            threads: BTreeSet::new(),
            implicit: false,
        });
        next
    }

    fn on_exit(&mut self, pid: u32, tid: u32, at: Timestamp, table: &mut DescriptorTable) {
        if let Some(thread) = self.threads.get_mut(&(tid, pid)).and_then(|l| l.last_mut()) {
            thread.terminated_at.get_or_insert(at);
        }
        if tid != pid {
            return;
        }

        let Some(process) = self.latest_process_mut(pid) else {
            return;
        };
        if process.terminated_at.is_some() {
            return;
        }
        process.terminated_at = Some(at);
        process.last_seen = process.last_seen.max(at);
        let generation = process.generation;

        self.terminate_threads(pid, generation, at);
        table.close_all(pid, at);
    }

    fn terminate_threads(&mut self, pid: u32, generation: u32, at: Timestamp) {
        for ((_, owner), list) in self.threads.iter_mut() {
            if *owner != pid {
                continue;
            }
            for thread in list
                .iter_mut()
                .filter(|t| t.process_generation == generation)
            {
                thread.terminated_at.get_or_insert(at);
            }
        }
    }

    fn on_exec(&mut self, pid: u32, tid: u32, filename: &str) {
        let name = filename.rsplit('/').next().unwrap_or(filename).to_string();
        if let Some(process) = self.latest_process_mut(pid) {
            process.name = Some(name.clone());
        }
        if let Some(thread) = self.threads.get_mut(&(tid, pid)).and_then(|l| l.last_mut()) {
            thread.name = Some(name);
        }
    }

    /// Apply a successful call at its exit
    ///
    /// Descriptors a call creates are bound from its entry time, so the
    /// operation itself falls inside the new binding.
    fn on_syscall_exit(
        &mut self,
        pid: u32,
        call: &PendingCall,
        ret: Option<i64>,
        at: Timestamp,
        table: &mut DescriptorTable,
    ) {
        let Some(ret) = ret else {
            return;
        };
        if ret < 0 {
            self.stats.failed_calls += 1;
            return;
        }
        let fd_arg = |name: &str| int_field(&call.fields, name).and_then(|v| i32::try_from(v).ok());
        let ret_fd = i32::try_from(ret).ok();
        let syscall = call.syscall.as_str();

        if OPEN_SYSCALLS.contains(&syscall) {
            let path = str_field(&call.fields, "filename")
                .or_else(|| str_field(&call.fields, "pathname"));
            if let (Some(path), Some(fd)) = (path, ret_fd) {
                table.open(pid, fd, Resource::File(path.to_string()), call.at);
                self.access_file(path, pid, at);
            }
        } else if syscall == "socket" || ACCEPT_SYSCALLS.contains(&syscall) {
            let Some(fd) = ret_fd else {
                return;
            };
            let id = format!("socket_{}_{}", pid, at.as_nanos());
            let accepted_on = if syscall == "socket" {
                None
            } else {
                fd_arg("fd")
                    .and_then(|listener| table.resolve(pid, listener, call.at).resource().cloned())
                    .map(|resource| resource.to_string())
            };
            table.open(pid, fd, Resource::Socket(id.clone()), call.at);
            self.sockets.insert(
                id.clone(),
                Socket {
                    id,
                    pid,
                    family: int_field(&call.fields, "family"),
                    sock_type: int_field(&call.fields, "type"),
                    protocol: int_field(&call.fields, "protocol"),
                    local_address: None,
                    remote_address: None,
                    accepted_on,
                    first_seen: at,
                    last_seen: at,
                    closed_at: None,
                },
            );
        } else if syscall == "connect" || syscall == "bind" {
            let Some(fd) = fd_arg("fd") else {
                return;
            };
            let address = address_text(&call.fields);
            if let Some(Resource::Socket(id)) = table.resolve(pid, fd, call.at).resource() {
                if let Some(socket) = self.sockets.get_mut(id) {
                    socket.last_seen = socket.last_seen.max(at);
                    if syscall == "connect" {
                        socket.remote_address = address.or(socket.remote_address.take());
                    } else {
                        socket.local_address = address.or(socket.local_address.take());
                    }
                }
            }
        } else if syscall == "close" {
            let Some(fd) = fd_arg("fd") else {
                return;
            };
            if let Some(Resource::Socket(id)) = table.close(pid, fd, at) {
                if let Some(socket) = self.sockets.get_mut(&id) {
                    socket.closed_at = Some(at);
                    socket.last_seen = socket.last_seen.max(at);
                }
            }
        } else if DUP_SYSCALLS.contains(&syscall) {
            let old = fd_arg("fildes")
                .or_else(|| fd_arg("oldfd"))
                .or_else(|| fd_arg("fd"));
            if let (Some(old), Some(new)) = (old, ret_fd) {
                table.duplicate(pid, old, new, call.at);
            }
        } else if syscall == "fcntl" {
            let cmd = int_field(&call.fields, "cmd");
            if matches!(cmd, Some(F_DUPFD) | Some(F_DUPFD_CLOEXEC)) {
                if let (Some(old), Some(new)) = (fd_arg("fd"), ret_fd) {
                    table.duplicate(pid, old, new, call.at);
                }
            }
        } else if FILE_IO_SYSCALLS.contains(&syscall) {
            if let Some(fd) = fd_arg("fd") {
                if let Some(Resource::File(path)) = table.resolve(pid, fd, call.at).resource() {
                    self.access_file(path, pid, at);
                }
            }
        }
    }

    fn access_file(&mut self, path: &str, pid: u32, at: Timestamp) {
        let file = self.files.entry(path.to_string()).or_insert_with(|| File {
            path: path.to_string(),
            first_seen: at,
            last_seen: at,
            access_count: 0,
            opened_by: BTreeSet::new(),
        });
        file.access_count += 1;
        file.last_seen = file.last_seen.max(at);
        file.opened_by.insert(pid);
    }

    fn latest_process_mut(&mut self, pid: u32) -> Option<&mut Process> {
        self.processes.get_mut(&pid).and_then(|g| g.last_mut())
    }

    /// Latest generation of `pid`
    pub fn process(&self, pid: u32) -> Option<&Process> {
        self.processes.get(&pid).and_then(|g| g.last())
    }

    /// All generations of `pid`, oldest first
    pub fn generations(&self, pid: u32) -> &[Process] {
        self.processes.get(&pid).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Latest thread `(tid, pid)`
    pub fn thread(&self, tid: u32, pid: u32) -> Option<&Thread> {
        self.threads.get(&(tid, pid)).and_then(|l| l.last())
    }

    pub fn socket(&self, id: &str) -> Option<&Socket> {
        self.sockets.get(id)
    }

    pub fn file(&self, path: &str) -> Option<&File> {
        self.files.get(path)
    }

    /// Actor by identity
    pub fn get(&self, key: &ActorKey) -> Option<ActorRef<'_>> {
        match key {
            ActorKey::Process { pid, generation } => self
                .generations(*pid)
                .iter()
                .find(|p| p.generation == *generation)
                .map(ActorRef::Process),
            ActorKey::Thread {
                tid,
                pid,
                generation,
            } => self
                .threads
                .get(&(*tid, *pid))
                .and_then(|l| l.iter().find(|t| t.generation == *generation))
                .map(ActorRef::Thread),
            ActorKey::File { path } => self.files.get(path).map(ActorRef::File),
            ActorKey::Socket { id } => self.sockets.get(id).map(ActorRef::Socket),
            ActorKey::Cpu { id } => self.cpus.get(id).map(ActorRef::Cpu),
        }
    }

    /// All actors as of trace end
    pub fn snapshot(&self) -> ActorSnapshot {
        ActorSnapshot {
            processes: self.processes.values().flatten().cloned().collect(),
            threads: self.threads.values().flatten().cloned().collect(),
            files: self.files.values().cloned().collect(),
            sockets: self.sockets.values().cloned().collect(),
            cpus: self.cpus.values().cloned().collect(),
        }
    }

    pub fn stats(&self) -> &RegistryStats {
        &self.stats
    }
}

/// Address text of a connect/bind call, when the trace decoded one
fn address_text(fields: &Fields) -> Option<String> {
    ADDRESS_FIELDS
        .iter()
        .find_map(|name| str_field(fields, name))
        .map(str::to_string)
}
