use crate::core::net::sys::SocketApi;
use std::fmt;
use std::io;
use std::os::unix::io::RawFd;
use std::sync::Arc;
use tracing::warn;

/// An owned socket descriptor, released exactly once through the
/// `SocketApi` that produced it.
pub struct SocketHandle {
    fd: Option<RawFd>,
    api: Arc<dyn SocketApi>,
}

impl SocketHandle {
    pub fn new(fd: RawFd, api: Arc<dyn SocketApi>) -> Self {
        Self { fd: Some(fd), api }
    }

    pub fn as_raw_fd(&self) -> RawFd {
        // `fd` is only emptied by `close`, which consumes `self`.
        self.fd.unwrap_or(-1)
    }

    pub fn api(&self) -> &Arc<dyn SocketApi> {
        &self.api
    }

    /// Release the descriptor, reporting any OS failure.
    pub fn close(mut self) -> io::Result<()> {
        match self.fd.take() {
            Some(fd) => self.api.close(fd),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for SocketHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketHandle").field("fd", &self.fd).finish()
    }
}

impl Drop for SocketHandle {
    fn drop(&mut self) {
        if let Some(fd) = self.fd.take() {
            if let Err(e) = self.api.close(fd) {
                warn!(fd, error = %e, "failed to close socket during drop");
            }
        }
    }
}
