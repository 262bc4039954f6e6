//! Actor extraction
//!
//! The registry follows process, thread, file, socket and CPU lifecycles
//! across the trace. Actors are never removed, only marked terminated. A pid
//! seen again after an observed exit-and-fork boundary becomes a new process
//! generation; without such a boundary every event stays with the existing
//! actor for that pid.

mod model;
mod registry;


pub use model::{ActorKey, ActorRef, ActorSnapshot, Cpu, File, Process, Socket, Thread};
pub use registry::{ActorRegistry, RegistryStats};
