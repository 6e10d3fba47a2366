pub mod event;
pub mod job;
pub mod multiplexer;
pub mod poller;
pub mod queue;

pub use event::{Event, EventKind, EventTarget};
pub use job::{FnJob, Interest, Job, JobOutcome, Readiness};
pub use multiplexer::{Multiplexer, SocketMultiplexer};
pub use queue::EventQueue;
