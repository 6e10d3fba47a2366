// Test doubles shared by the integration tests
#![allow(dead_code)]

use netloop::core::event::{EventQueue, EventTarget, Job, JobOutcome, Multiplexer, Readiness};
use netloop::core::net::{SocketApi, TcpListenSocket};
use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::os::unix::io::RawFd;
use std::sync::{Arc, Mutex};

// far above any descriptor the test process holds, so a real poll(2)
// over a fake handle reports POLLNVAL
const FAKE_FD_BASE: RawFd = 900_000;

/// Scripted in-memory socket layer.
#[derive(Default)]
pub struct FakeState {
    next_fd: RawFd,
    next_port: u16,
    pub open: HashSet<RawFd>,
    pub bound: HashMap<RawFd, SocketAddr>,
    pub listening: HashSet<RawFd>,
    pub pending: VecDeque<SocketAddr>,
    pub accept_calls: usize,
    pub closes: Vec<RawFd>,
    pub double_closes: usize,
    pub create_failure: bool,
    pub accept_failure: Option<io::ErrorKind>,
    pub nodelay_failure: bool,
    pub close_failure: bool,
}

#[derive(Default)]
pub struct FakeSocketApi {
    state: Mutex<FakeState>,
}

impl FakeSocketApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn queue_connection(&self, peer: &str) {
        let peer: SocketAddr = peer.parse().unwrap();
        self.with(|s| s.pending.push_back(peer));
    }

    pub fn accept_calls(&self) -> usize {
        self.with(|s| s.accept_calls)
    }

    pub fn open_fds(&self) -> usize {
        self.with(|s| s.open.len())
    }

    pub fn double_closes(&self) -> usize {
        self.with(|s| s.double_closes)
    }

    fn check_open(state: &FakeState, fd: RawFd) -> io::Result<()> {
        if state.open.contains(&fd) {
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::Other, "bad file descriptor"))
        }
    }
}

impl SocketApi for FakeSocketApi {
    fn create_stream(&self) -> io::Result<RawFd> {
        self.with(|s| {
            if s.create_failure {
                return Err(io::Error::new(io::ErrorKind::Other, "no buffer space"));
            }
            s.next_fd += 1;
            let fd = FAKE_FD_BASE + s.next_fd;
            s.open.insert(fd);
            Ok(fd)
        })
    }

    fn set_reuse_addr(&self, fd: RawFd, _enabled: bool) -> io::Result<()> {
        self.with(|s| Self::check_open(s, fd))
    }

    fn set_nodelay(&self, fd: RawFd, _enabled: bool) -> io::Result<()> {
        self.with(|s| {
            Self::check_open(s, fd)?;
            if s.nodelay_failure {
                return Err(io::Error::new(io::ErrorKind::Other, "setsockopt failed"));
            }
            Ok(())
        })
    }

    fn bind(&self, fd: RawFd, addr: SocketAddr) -> io::Result<()> {
        self.with(|s| {
            Self::check_open(s, fd)?;
            if addr.is_ipv6() {
                return Err(io::Error::new(io::ErrorKind::Unsupported, "ipv6"));
            }
            if addr.port() != 0 && s.bound.values().any(|a| *a == addr) {
                return Err(io::Error::new(io::ErrorKind::AddrInUse, "address in use"));
            }
            let mut resolved = addr;
            if addr.port() == 0 {
                s.next_port += 1;
                resolved.set_port(40_000 + s.next_port);
            }
            s.bound.insert(fd, resolved);
            Ok(())
        })
    }

    fn listen(&self, fd: RawFd) -> io::Result<()> {
        self.with(|s| {
            Self::check_open(s, fd)?;
            s.listening.insert(fd);
            Ok(())
        })
    }

    fn accept(&self, fd: RawFd) -> io::Result<(RawFd, SocketAddr)> {
        self.with(|s| {
            s.accept_calls += 1;
            Self::check_open(s, fd)?;
            if let Some(kind) = s.accept_failure {
                return Err(io::Error::new(kind, "accept failed"));
            }
            if !s.listening.contains(&fd) {
                return Err(io::Error::new(io::ErrorKind::InvalidInput, "not listening"));
            }
            match s.pending.pop_front() {
                Some(peer) => {
                    s.next_fd += 1;
                    let client = FAKE_FD_BASE + s.next_fd;
                    s.open.insert(client);
                    Ok((client, peer))
                }
                None => Err(io::ErrorKind::WouldBlock.into()),
            }
        })
    }

    fn local_addr(&self, fd: RawFd) -> io::Result<SocketAddr> {
        self.with(|s| {
            s.bound
                .get(&fd)
                .copied()
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "not bound"))
        })
    }

    fn close(&self, fd: RawFd) -> io::Result<()> {
        self.with(|s| {
            if !s.open.remove(&fd) {
                s.double_closes += 1;
                return Err(io::Error::new(io::ErrorKind::Other, "bad file descriptor"));
            }
            s.closes.push(fd);
            s.bound.remove(&fd);
            s.listening.remove(&fd);
            if s.close_failure {
                return Err(io::Error::new(io::ErrorKind::Other, "close interrupted"));
            }
            Ok(())
        })
    }
}

#[derive(Default)]
struct RecordingState {
    jobs: HashMap<EventTarget, Box<dyn Job>>,
    adds: usize,
    removes: usize,
    overlapping_adds: usize,
    running: Option<EventTarget>,
    touched_while_running: bool,
}

/// Multiplexer that only runs jobs when a test fires them.
#[derive(Default)]
pub struct RecordingMultiplexer {
    state: Mutex<RecordingState>,
}

impl RecordingMultiplexer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn adds(&self) -> usize {
        self.state.lock().unwrap().adds
    }

    pub fn removes(&self) -> usize {
        self.state.lock().unwrap().removes
    }

    pub fn overlapping_adds(&self) -> usize {
        self.state.lock().unwrap().overlapping_adds
    }

    pub fn registrations(&self) -> usize {
        self.state.lock().unwrap().jobs.len()
    }

    pub fn is_registered(&self, target: EventTarget) -> bool {
        self.state.lock().unwrap().jobs.contains_key(&target)
    }

    /// Run the job registered for `target` as the poll loop would.
    /// Returns `None` if nothing is registered.
    pub fn fire(&self, target: EventTarget, readiness: Readiness) -> Option<&'static str> {
        let job = self.take(target)?;
        Some(self.finish(job, readiness))
    }

    /// Dequeue the job for `target` as the poll loop does before running
    /// it. The registration stays vacant until `finish`.
    pub fn take(&self, target: EventTarget) -> Option<InFlight> {
        let mut state = self.state.lock().unwrap();
        let job = state.jobs.remove(&target)?;
        state.running = Some(target);
        state.touched_while_running = false;
        Some(InFlight { target, job })
    }

    /// Run a dequeued job and apply its outcome, discarding it if the
    /// registration was replaced or removed in the meantime.
    pub fn finish(&self, in_flight: InFlight, readiness: Readiness) -> &'static str {
        let InFlight { target, mut job } = in_flight;
        let outcome = job.run(readiness);

        let mut state = self.state.lock().unwrap();
        state.running = None;
        let stale = state.touched_while_running;
        match outcome {
            JobOutcome::Continue => {
                if !stale {
                    state.jobs.insert(target, job);
                }
                "continue"
            }
            JobOutcome::Rearm(next) => {
                if !stale {
                    state.jobs.insert(target, next);
                }
                "rearm"
            }
            JobOutcome::Stop => "stop",
        }
    }
}

/// A job taken off the table but not yet run.
pub struct InFlight {
    target: EventTarget,
    job: Box<dyn Job>,
}

impl Multiplexer for RecordingMultiplexer {
    fn add_socket(&self, target: EventTarget, job: Box<dyn Job>) {
        let mut state = self.state.lock().unwrap();
        state.adds += 1;
        if state.running == Some(target) {
            state.touched_while_running = true;
        }
        if state.jobs.insert(target, job).is_some() {
            state.overlapping_adds += 1;
        }
    }

    fn remove_socket(&self, target: EventTarget) {
        let mut state = self.state.lock().unwrap();
        state.removes += 1;
        if state.running == Some(target) {
            state.touched_while_running = true;
        }
        state.jobs.remove(&target);
    }
}

pub const READABLE: Readiness = Readiness {
    readable: true,
    writable: false,
    error: false,
};

pub const WRITABLE: Readiness = Readiness {
    readable: false,
    writable: true,
    error: false,
};

pub const ERRORED: Readiness = Readiness {
    readable: false,
    writable: false,
    error: true,
};

pub struct Fixture {
    pub api: Arc<FakeSocketApi>,
    pub mux: Arc<RecordingMultiplexer>,
    pub events: Arc<EventQueue>,
    pub socket: TcpListenSocket,
}

impl Fixture {
    pub fn new() -> Self {
        let api = FakeSocketApi::new();
        let mux = RecordingMultiplexer::new();
        let events = Arc::new(EventQueue::new());
        let socket = TcpListenSocket::new(api.clone(), mux.clone(), events.clone()).unwrap();
        Self {
            api,
            mux,
            events,
            socket,
        }
    }

    pub fn bound() -> Self {
        let fixture = Self::new();
        fixture.socket.bind("0.0.0.0:0".parse().unwrap()).unwrap();
        fixture
    }

    pub fn fire(&self, readiness: Readiness) -> Option<&'static str> {
        self.mux.fire(self.socket.event_target(), readiness)
    }
}
