use crate::event::Timestamp;
use serde::Serialize;
use std::collections::BTreeSet;

/// A process generation: one pid between two observed lifecycle boundaries
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Process {
    pub pid: u32,
    /// 0 for the first actor with this pid, +1 per observed reuse
    pub generation: u32,
    pub name: Option<String>,
    /// Non-owning link to the parent, resolved through the registry
    pub parent_pid: Option<u32>,
    pub first_seen: Timestamp,
    pub last_seen: Timestamp,
    pub terminated_at: Option<Timestamp>,
    /// Thread ids owned by this generation
    pub threads: BTreeSet<u32>,
    /// Created on first reference rather than by an observed fork
    pub implicit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Thread {
    pub tid: u32,
    pub pid: u32,
    /// Incarnation of this `(tid, pid)` pair; a new one starts whenever the
    /// pair is recreated after an observed exit or a process reuse
    pub generation: u32,
    /// Generation of the owning process
    pub process_generation: u32,
    pub name: Option<String>,
    pub first_seen: Timestamp,
    pub last_seen: Timestamp,
    pub terminated_at: Option<Timestamp>,
    pub cpus: BTreeSet<u32>,
    pub implicit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct File {
    pub path: String,
    pub first_seen: Timestamp,
    pub last_seen: Timestamp,
    /// Successful opens plus resolved reads and writes
    pub access_count: u64,
    pub opened_by: BTreeSet<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Socket {
    /// `socket_<pid>_<creation ns>`
    pub id: String,
    pub pid: u32,
    pub family: Option<i64>,
    pub sock_type: Option<i64>,
    pub protocol: Option<i64>,
    pub local_address: Option<String>,
    pub remote_address: Option<String>,
    /// Listening socket this one was accepted from
    pub accepted_on: Option<String>,
    pub first_seen: Timestamp,
    pub last_seen: Timestamp,
    pub closed_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cpu {
    pub id: u32,
    pub first_seen: Timestamp,
    pub last_seen: Timestamp,
    pub events: u64,
}

/// Stable identity of an actor
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActorKey {
    Process { pid: u32, generation: u32 },
    Thread { tid: u32, pid: u32, generation: u32 },
    File { path: String },
    Socket { id: String },
    Cpu { id: u32 },
}

/// Borrowed view of any actor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorRef<'a> {
    Process(&'a Process),
    Thread(&'a Thread),
    File(&'a File),
    Socket(&'a Socket),
    Cpu(&'a Cpu),
}

impl ActorRef<'_> {
    pub fn key(&self) -> ActorKey {
        match self {
            ActorRef::Process(p) => ActorKey::Process {
                pid: p.pid,
                generation: p.generation,
            },
            ActorRef::Thread(t) => ActorKey::Thread {
                tid: t.tid,
                pid: t.pid,
                generation: t.generation,
            },
            ActorRef::File(f) => ActorKey::File {
                path: f.path.clone(),
            },
            ActorRef::Socket(s) => ActorKey::Socket { id: s.id.clone() },
            ActorRef::Cpu(c) => ActorKey::Cpu { id: c.id },
        }
    }

    pub fn first_seen(&self) -> Timestamp {
        match self {
            ActorRef::Process(p) => p.first_seen,
            ActorRef::Thread(t) => t.first_seen,
            ActorRef::File(f) => f.first_seen,
            ActorRef::Socket(s) => s.first_seen,
            ActorRef::Cpu(c) => c.first_seen,
        }
    }

    /// Termination time, if the actor ended within the trace
    pub fn ended_at(&self) -> Option<Timestamp> {
        match self {
            ActorRef::Process(p) => p.terminated_at,
            ActorRef::Thread(t) => t.terminated_at,
            ActorRef::Socket(s) => s.closed_at,
            ActorRef::File(_) | ActorRef::Cpu(_) => None,
        }
    }
}

/// All actors as of trace end, in identity order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActorSnapshot {
    pub processes: Vec<Process>,
    pub threads: Vec<Thread>,
    pub files: Vec<File>,
    pub sockets: Vec<Socket>,
    pub cpus: Vec<Cpu>,
}

impl ActorSnapshot {
    pub fn get(&self, key: &ActorKey) -> Option<ActorRef<'_>> {
        match key {
            ActorKey::Process { pid, generation } => self
                .processes
                .iter()
                .find(|p| p.pid == *pid && p.generation == *generation)
                .map(ActorRef::Process),
            ActorKey::Thread {
                tid,
                pid,
                generation,
            } => self
                .threads
                .iter()
                .find(|t| t.tid == *tid && t.pid == *pid && t.generation == *generation)
                .map(ActorRef::Thread),
            ActorKey::File { path } => self
                .files
                .iter()
                .find(|f| &f.path == path)
                .map(ActorRef::File),
            ActorKey::Socket { id } => self
                .sockets
                .iter()
                .find(|s| &s.id == id)
                .map(ActorRef::Socket),
            ActorKey::Cpu { id } => self.cpus.iter().find(|c| c.id == *id).map(ActorRef::Cpu),
        }
    }

    /// Every actor, processes first
    pub fn iter(&self) -> impl Iterator<Item = ActorRef<'_>> {
        self.processes
            .iter()
            .map(ActorRef::Process)
            .chain(self.threads.iter().map(ActorRef::Thread))
            .chain(self.files.iter().map(ActorRef::File))
            .chain(self.sockets.iter().map(ActorRef::Socket))
            .chain(self.cpus.iter().map(ActorRef::Cpu))
    }

    pub fn len(&self) -> usize {
        self.processes.len()
            + self.threads.len()
            + self.files.len()
            + self.sockets.len()
            + self.cpus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn implicit_count(&self) -> usize {
        self.processes.iter().filter(|p| p.implicit).count()
            + self.threads.iter().filter(|t| t.implicit).count()
    }
}
