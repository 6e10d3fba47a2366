// poll(2) wrapper with a self-pipe so other threads can interrupt a wait
use crate::common::error::{ReactorError, Result};
use crate::core::event::job::{Interest, Readiness};
use std::io;
use std::os::unix::io::RawFd;

/// One descriptor to watch, and what was seen on it after `wait`.
#[derive(Debug, Clone, Copy)]
pub struct PollEntry {
    pub fd: RawFd,
    pub interest: Interest,
    pub readiness: Readiness,
}

impl PollEntry {
    pub fn new(fd: RawFd, interest: Interest) -> Self {
        Self {
            fd,
            interest,
            readiness: Readiness::default(),
        }
    }
}

fn interest_to_events(interest: Interest) -> libc::c_short {
    let mut events = 0;
    if interest.readable {
        events |= libc::POLLIN;
    }
    if interest.writable {
        events |= libc::POLLOUT;
    }
    events
}

fn readiness_from_revents(revents: libc::c_short) -> Readiness {
    Readiness {
        readable: revents & libc::POLLIN != 0,
        writable: revents & libc::POLLOUT != 0,
        error: revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0,
    }
}

pub struct Poller {
    wake_read: RawFd,
    wake_write: RawFd,
}

impl Poller {
    pub fn new() -> Result<Self> {
        let mut fds = [0 as libc::c_int; 2];
        unsafe {
            if libc::pipe(fds.as_mut_ptr()) < 0 {
                return Err(ReactorError::Poll(format!(
                    "Failed to create wake pipe: {}",
                    io::Error::last_os_error()
                )));
            }
            for fd in fds {
                let flags = libc::fcntl(fd, libc::F_GETFL);
                if flags < 0 || libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
                    let err = io::Error::last_os_error();
                    libc::close(fds[0]);
                    libc::close(fds[1]);
                    return Err(ReactorError::Poll(format!(
                        "Failed to configure wake pipe: {}",
                        err
                    )));
                }
                libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC);
            }
        }
        Ok(Self {
            wake_read: fds[0],
            wake_write: fds[1],
        })
    }

    /// Interrupt a concurrent or the next `wait`.
    pub fn wake(&self) {
        let byte = 1u8;
        unsafe {
            // a full pipe already guarantees a wakeup
            libc::write(self.wake_write, &byte as *const u8 as *const libc::c_void, 1);
        }
    }

    fn drain_wake_pipe(&self) {
        let mut buf = [0u8; 64];
        loop {
            let n = unsafe {
                libc::read(
                    self.wake_read,
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                )
            };
            if n <= 0 {
                break;
            }
        }
    }

    /// Wait up to `timeout_ms` (negative blocks forever) and fill in each
    /// entry's readiness. Returns how many entries are ready; an
    /// interrupted or woken wait reports zero.
    pub fn wait(&self, entries: &mut [PollEntry], timeout_ms: i32) -> Result<usize> {
        let mut fds = Vec::with_capacity(entries.len() + 1);
        fds.push(libc::pollfd {
            fd: self.wake_read,
            events: libc::POLLIN,
            revents: 0,
        });
        fds.extend(entries.iter().map(|entry| libc::pollfd {
            fd: entry.fd,
            events: interest_to_events(entry.interest),
            revents: 0,
        }));

        let n = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(ReactorError::Poll(format!("Failed to poll: {}", err)));
        }

        if fds[0].revents != 0 {
            self.drain_wake_pipe();
        }

        let mut ready = 0;
        for (entry, pfd) in entries.iter_mut().zip(&fds[1..]) {
            entry.readiness = readiness_from_revents(pfd.revents);
            if !entry.readiness.is_empty() {
                ready += 1;
            }
        }
        Ok(ready)
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.wake_read);
            libc::close(self.wake_write);
        }
    }
}
