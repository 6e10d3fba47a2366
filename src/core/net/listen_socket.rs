use crate::common::error::{ReactorError, Result};
use crate::core::event::event::{Event, EventTarget};
use crate::core::event::job::{FnJob, Interest, Job, JobOutcome, Readiness};
use crate::core::event::multiplexer::Multiplexer;
use crate::core::event::queue::EventQueue;
use crate::core::net::fd::SocketHandle;
use crate::core::net::socket::ConnectedSocket;
use crate::core::net::sys::SocketApi;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::os::unix::io::RawFd;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenState {
    /// Socket created, not yet bound.
    Unbound,
    /// Registered with the multiplexer, waiting for readiness.
    Listening,
    /// A connection was announced; polling is paused until `accept`.
    AwaitingAccept,
    Closed,
}

struct State {
    // Some iff phase is Unbound, Listening or AwaitingAccept
    handle: Option<SocketHandle>,
    bound: Option<SocketAddr>,
    phase: ListenState,
}

struct Shared {
    api: Arc<dyn SocketApi>,
    multiplexer: Arc<dyn Multiplexer>,
    events: Arc<EventQueue>,
    state: Mutex<State>,
}

/// A non-blocking TCP listening endpoint driven by a `Multiplexer`.
///
/// When the listen handle becomes readable a `Connecting` event is posted
/// to the event queue and polling pauses. Calling [`accept`](Self::accept)
/// takes the connection (if any) and resumes polling.
pub struct TcpListenSocket {
    shared: Arc<Shared>,
}

fn bind_error(addr: SocketAddr, err: io::Error) -> ReactorError {
    if err.kind() == io::ErrorKind::AddrInUse {
        ReactorError::AddressInUse(format!("{}: {}", addr, err))
    } else {
        ReactorError::Bind(format!("{}: {}", addr, err))
    }
}

fn is_accept_miss(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::ConnectionAborted
    )
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn target(self: &Arc<Self>) -> EventTarget {
        EventTarget::of(self)
    }

    fn listening_job(self: &Arc<Self>, fd: RawFd) -> Box<dyn Job> {
        let shared = Arc::downgrade(self);
        Box::new(FnJob::new(fd, Interest::READABLE, move |readiness: Readiness| {
            match shared.upgrade() {
                Some(shared) => shared.service_listening(readiness),
                None => JobOutcome::Stop,
            }
        }))
    }

    fn service_listening(self: &Arc<Self>, readiness: Readiness) -> JobOutcome {
        if readiness.error {
            match self.close() {
                Ok(()) => debug!(token = self.target().as_raw(), "listen socket errored, closed"),
                Err(ReactorError::Closed) => {}
                Err(e) => warn!(error = %e, "failed to close errored listen socket"),
            }
            return JobOutcome::Stop;
        }

        if readiness.readable {
            let mut state = self.lock();
            if state.phase == ListenState::Listening {
                state.phase = ListenState::AwaitingAccept;
                self.events.post(Event::connecting(self.target()));
                trace!(token = self.target().as_raw(), "connection pending");
            }
            // stop polling until the application accepts
            return JobOutcome::Stop;
        }

        JobOutcome::Continue
    }

    fn close(self: &Arc<Self>) -> Result<()> {
        let mut state = self.lock();
        let handle = state.handle.take().ok_or(ReactorError::Closed)?;
        state.phase = ListenState::Closed;
        self.multiplexer.remove_socket(self.target());
        handle
            .close()
            .map_err(|e| ReactorError::Close(e.to_string()))
    }
}

impl TcpListenSocket {
    /// Acquire a fresh OS socket in the `Unbound` state.
    pub fn new(
        api: Arc<dyn SocketApi>,
        multiplexer: Arc<dyn Multiplexer>,
        events: Arc<EventQueue>,
    ) -> Result<Self> {
        let fd = api
            .create_stream()
            .map_err(|e| ReactorError::Create(e.to_string()))?;
        let handle = SocketHandle::new(fd, Arc::clone(&api));

        Ok(Self {
            shared: Arc::new(Shared {
                api,
                multiplexer,
                events,
                state: Mutex::new(State {
                    handle: Some(handle),
                    bound: None,
                    phase: ListenState::Unbound,
                }),
            }),
        })
    }

    /// Bind, listen and register for readability.
    ///
    /// On failure the socket stays `Unbound` and keeps its handle.
    pub fn bind(&self, addr: SocketAddr) -> Result<()> {
        let shared = &self.shared;
        let mut state = shared.lock();
        let fd = match (state.phase, state.handle.as_ref()) {
            (ListenState::Unbound, Some(handle)) => handle.as_raw_fd(),
            (ListenState::Listening | ListenState::AwaitingAccept, Some(_)) => {
                return Err(ReactorError::Bind(format!(
                    "{}: socket is already listening",
                    addr
                )))
            }
            _ => return Err(ReactorError::Closed),
        };

        shared
            .api
            .set_reuse_addr(fd, true)
            .and_then(|()| shared.api.bind(fd, addr))
            .and_then(|()| shared.api.listen(fd))
            .map_err(|e| bind_error(addr, e))?;

        let bound = shared.api.local_addr(fd).unwrap_or(addr);
        state.bound = Some(bound);
        state.phase = ListenState::Listening;
        shared.multiplexer.add_socket(shared.target(), shared.listening_job(fd));

        info!(%bound, "listening");
        Ok(())
    }

    /// Take one pending connection, or `None` if the backlog is empty.
    ///
    /// Whatever the outcome, the readiness job is registered again before
    /// returning so the listener keeps producing `Connecting` events.
    pub fn accept(&self) -> Result<Option<ConnectedSocket>> {
        let shared = &self.shared;
        let mut state = shared.lock();
        let fd = match (state.phase, state.handle.as_ref()) {
            (ListenState::Listening | ListenState::AwaitingAccept, Some(handle)) => {
                handle.as_raw_fd()
            }
            (ListenState::Unbound, _) => {
                return Err(ReactorError::Accept("socket is not listening".to_string()))
            }
            _ => return Err(ReactorError::Closed),
        };

        let accepted = match shared.api.accept(fd) {
            Ok((client, peer)) => {
                let handle = SocketHandle::new(client, Arc::clone(&shared.api));
                ConnectedSocket::from_accepted(handle, peer)
                    .map(Some)
                    .map_err(|e| ReactorError::Accept(format!("{}: {}", peer, e)))
            }
            Err(e) if is_accept_miss(&e) => {
                trace!(error = %e, "no connection to accept");
                Ok(None)
            }
            Err(e) => Err(ReactorError::Accept(e.to_string())),
        };

        state.phase = ListenState::Listening;
        shared.multiplexer.add_socket(shared.target(), shared.listening_job(fd));

        match &accepted {
            Ok(Some(conn)) => debug!(peer = %conn.peer_addr(), "accepted connection"),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "accept failed"),
        }
        accepted
    }

    /// Deregister and release the OS socket. A second call fails with
    /// `ReactorError::Closed`.
    pub fn close(&self) -> Result<()> {
        let result = self.shared.close();
        if result.is_ok() {
            info!(token = self.event_target().as_raw(), "listen socket closed");
        }
        result
    }

    pub fn event_target(&self) -> EventTarget {
        self.shared.target()
    }

    pub fn state(&self) -> ListenState {
        self.shared.lock().phase
    }

    pub fn bound_address(&self) -> Option<SocketAddr> {
        self.shared.lock().bound
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ListenState::Closed
    }
}

impl fmt::Debug for TcpListenSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("TcpListenSocket")
            .field("state", &state.phase)
            .field("bound", &state.bound)
            .finish()
    }
}

impl Drop for TcpListenSocket {
    fn drop(&mut self) {
        match self.shared.close() {
            Ok(()) | Err(ReactorError::Closed) => {}
            Err(e) => warn!(error = %e, "failed to close listen socket during drop"),
        }
    }
}
