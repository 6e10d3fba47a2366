use std::fmt;
use std::os::unix::io::RawFd;

/// Conditions a job wants to be woken for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interest {
    pub readable: bool,
    pub writable: bool,
}

impl Interest {
    pub const READABLE: Interest = Interest {
        readable: true,
        writable: false,
    };
    pub const WRITABLE: Interest = Interest {
        readable: false,
        writable: true,
    };

    pub fn is_empty(&self) -> bool {
        !self.readable && !self.writable
    }
}

/// What the poller observed on a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
    pub error: bool,
}

impl Readiness {
    pub fn is_empty(&self) -> bool {
        !self.readable && !self.writable && !self.error
    }
}

/// Returned by a job after it runs, telling the multiplexer what to do
/// with the registration.
pub enum JobOutcome {
    /// Keep this job with its current interest.
    Continue,
    /// Replace this job with another one.
    Rearm(Box<dyn Job>),
    /// Drop the registration.
    Stop,
}

impl JobOutcome {
    pub fn is_stop(&self) -> bool {
        matches!(self, JobOutcome::Stop)
    }
}

impl fmt::Debug for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobOutcome::Continue => f.write_str("Continue"),
            JobOutcome::Rearm(_) => f.write_str("Rearm(..)"),
            JobOutcome::Stop => f.write_str("Stop"),
        }
    }
}

/// A unit of work the multiplexer runs when its handle becomes ready.
pub trait Job: Send {
    fn fd(&self) -> RawFd;

    fn interest(&self) -> Interest;

    /// Must not block.
    fn run(&mut self, readiness: Readiness) -> JobOutcome;
}

/// A job that forwards readiness to a closure.
pub struct FnJob<F> {
    fd: RawFd,
    interest: Interest,
    callback: F,
}

impl<F> FnJob<F>
where
    F: FnMut(Readiness) -> JobOutcome + Send,
{
    pub fn new(fd: RawFd, interest: Interest, callback: F) -> Self {
        Self {
            fd,
            interest,
            callback,
        }
    }
}

impl<F> Job for FnJob<F>
where
    F: FnMut(Readiness) -> JobOutcome + Send,
{
    fn fd(&self) -> RawFd {
        self.fd
    }

    fn interest(&self) -> Interest {
        self.interest
    }

    fn run(&mut self, readiness: Readiness) -> JobOutcome {
        (self.callback)(readiness)
    }
}
