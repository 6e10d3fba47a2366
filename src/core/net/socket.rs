use crate::core::net::fd::SocketHandle;
use std::io;
use std::net::SocketAddr;
use std::os::unix::io::RawFd;
use tracing::warn;

/// An accepted connection, handed off to the application for data transfer.
#[derive(Debug)]
pub struct ConnectedSocket {
    handle: SocketHandle,
    peer: SocketAddr,
}

impl ConnectedSocket {
    /// Wrap an accepted handle. On failure the handle has already been
    /// released.
    pub fn from_accepted(handle: SocketHandle, peer: SocketAddr) -> io::Result<Self> {
        let nodelay = handle.api().set_nodelay(handle.as_raw_fd(), true);
        if let Err(e) = nodelay {
            // the nodelay failure is what the caller sees
            if let Err(close_err) = handle.close() {
                warn!(error = %close_err, %peer, "failed to release accepted socket");
            }
            return Err(e);
        }
        Ok(Self { handle, peer })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.handle.as_raw_fd()
    }

    pub fn close(self) -> io::Result<()> {
        self.handle.close()
    }
}
