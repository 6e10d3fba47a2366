use crate::application::config::models::Config;
use crate::common::constants::DEFAULT_EVENT_WAIT_MS;
use crate::common::error::{ReactorError, Result};
use crate::core::event::event::{EventKind, EventTarget};
use crate::core::event::multiplexer::{Multiplexer, SocketMultiplexer};
use crate::core::event::queue::EventQueue;
use crate::core::net::listen_socket::TcpListenSocket;
use crate::core::net::socket::ConnectedSocket;
use crate::core::net::sys::SocketApi;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{info, warn};

/// Owns the configured listeners, the multiplexer thread that polls them,
/// and the event queue they report to.
pub struct ServerManager {
    /// Listening sockets keyed by their event target
    listeners: HashMap<EventTarget, TcpListenSocket>,

    /// Queue the listeners post `Connecting` events to
    events: Arc<EventQueue>,

    multiplexer: Arc<SocketMultiplexer>,

    poll_thread: Option<JoinHandle<()>>,

    /// Cleared to make `run` return
    running: Arc<AtomicBool>,
}

impl ServerManager {
    /// Bind every configured listener and start polling.
    pub fn new(config: &Config, api: Arc<dyn SocketApi>) -> Result<Self> {
        let multiplexer = Arc::new(SocketMultiplexer::new(config.reactor.poll_timeout())?);
        let events = Arc::new(EventQueue::new());

        let mut listeners = HashMap::new();
        for listener_config in &config.listeners {
            let mux: Arc<dyn Multiplexer> = multiplexer.clone();
            let socket = TcpListenSocket::new(Arc::clone(&api), mux, Arc::clone(&events))?;
            socket.bind(listener_config.socket_addr())?;
            listeners.insert(socket.event_target(), socket);
        }

        let poll_thread = Some(multiplexer.spawn());

        Ok(Self {
            listeners,
            events,
            multiplexer,
            poll_thread,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Addresses actually bound, with ephemeral ports resolved.
    pub fn bound_addresses(&self) -> Vec<SocketAddr> {
        let mut addrs: Vec<SocketAddr> = self
            .listeners
            .values()
            .filter_map(TcpListenSocket::bound_address)
            .collect();
        addrs.sort();
        addrs
    }

    pub fn log_listeners(&self) {
        for addr in self.bound_addresses() {
            info!(%addr, "accepting connections");
        }
    }

    /// A flag that stops `run` when cleared; safe to use from other threads.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Wait up to `timeout` for one `Connecting` event, accept on the
    /// listener it names, and hand the connection to `handler`.
    /// Returns the number of connections handed off.
    pub fn poll_once<F>(&mut self, timeout: Duration, handler: &mut F) -> Result<usize>
    where
        F: FnMut(ConnectedSocket),
    {
        let event = match self.events.wait_next(timeout) {
            Some(event) => event,
            None => return Ok(0),
        };

        if event.kind != EventKind::Connecting {
            return Ok(0);
        }

        let listener = match self.listeners.get(&event.target) {
            Some(listener) => listener,
            None => {
                warn!(token = event.target.as_raw(), "event for unknown listener");
                return Ok(0);
            }
        };

        match listener.accept() {
            Ok(Some(conn)) => {
                handler(conn);
                Ok(1)
            }
            Ok(None) => Ok(0),
            // logged by the listener; keep serving
            Err(ReactorError::Accept(_)) => Ok(0),
            Err(ReactorError::Closed) => {
                warn!(token = event.target.as_raw(), "listener closed, dropping it");
                self.listeners.remove(&event.target);
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    /// Accept connections until the running flag is cleared or every
    /// listener has closed.
    pub fn run<F>(&mut self, mut handler: F) -> Result<()>
    where
        F: FnMut(ConnectedSocket),
    {
        let wait = Duration::from_millis(DEFAULT_EVENT_WAIT_MS);
        while self.running.load(Ordering::Acquire) {
            // an error readiness closes a listener without posting an event
            self.listeners.retain(|_, listener| !listener.is_closed());
            if self.listeners.is_empty() {
                return Err(ReactorError::Closed);
            }
            self.poll_once(wait, &mut handler)?;
        }
        Ok(())
    }

    /// Close every listener and stop the multiplexer thread.
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::Release);
        for (_, listener) in self.listeners.drain() {
            if let Err(e) = listener.close() {
                warn!(error = %e, "failed to close listener");
            }
        }
        self.multiplexer.shutdown();
        if let Some(handle) = self.poll_thread.take() {
            if handle.join().is_err() {
                warn!("multiplexer thread panicked");
            }
        }
    }
}

impl Drop for ServerManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
