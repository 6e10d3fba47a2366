// Raw socket syscalls behind an injectable interface
use std::io;
use std::mem;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::os::unix::io::RawFd;

/// The OS socket operations the listening socket depends on.
///
/// All descriptors handed out are in non-blocking mode. Implementations
/// report failures as plain `io::Error`s; callers translate them.
pub trait SocketApi: Send + Sync {
    /// Create a non-blocking IPv4 stream socket.
    fn create_stream(&self) -> io::Result<RawFd>;

    fn set_reuse_addr(&self, fd: RawFd, enabled: bool) -> io::Result<()>;

    fn set_nodelay(&self, fd: RawFd, enabled: bool) -> io::Result<()>;

    fn bind(&self, fd: RawFd, addr: SocketAddr) -> io::Result<()>;

    /// Start listening with the system default backlog.
    fn listen(&self, fd: RawFd) -> io::Result<()>;

    /// Accept one pending connection. Returns `WouldBlock` when the
    /// backlog is empty.
    fn accept(&self, fd: RawFd) -> io::Result<(RawFd, SocketAddr)>;

    fn local_addr(&self, fd: RawFd) -> io::Result<SocketAddr>;

    fn close(&self, fd: RawFd) -> io::Result<()>;
}

/// `SocketApi` backed by libc calls.
#[derive(Debug, Default, Clone, Copy)]
pub struct LibcSocketApi;

impl LibcSocketApi {
    pub fn new() -> Self {
        Self
    }
}

fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

fn set_non_blocking_cloexec(fd: RawFd) -> io::Result<()> {
    unsafe {
        let flags = cvt(libc::fcntl(fd, libc::F_GETFL))?;
        cvt(libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK))?;

        let fd_flags = cvt(libc::fcntl(fd, libc::F_GETFD))?;
        cvt(libc::fcntl(fd, libc::F_SETFD, fd_flags | libc::FD_CLOEXEC))?;
    }
    Ok(())
}

fn set_int_option(fd: RawFd, level: libc::c_int, name: libc::c_int, value: libc::c_int) -> io::Result<()> {
    unsafe {
        cvt(libc::setsockopt(
            fd,
            level,
            name,
            &value as *const libc::c_int as *const libc::c_void,
            mem::size_of::<libc::c_int>() as libc::socklen_t,
        ))?;
    }
    Ok(())
}

fn to_sockaddr_in(addr: SocketAddrV4) -> libc::sockaddr_in {
    let mut sin: libc::sockaddr_in = unsafe { mem::zeroed() };
    sin.sin_family = libc::AF_INET as libc::sa_family_t;
    sin.sin_port = addr.port().to_be();
    sin.sin_addr = libc::in_addr {
        s_addr: u32::from_ne_bytes(addr.ip().octets()),
    };
    #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
    {
        sin.sin_len = mem::size_of::<libc::sockaddr_in>() as u8;
    }
    sin
}

fn from_sockaddr_in(sin: &libc::sockaddr_in) -> SocketAddr {
    let ip = Ipv4Addr::from(sin.sin_addr.s_addr.to_ne_bytes());
    SocketAddr::V4(SocketAddrV4::new(ip, u16::from_be(sin.sin_port)))
}

fn sockaddr_in_from_storage(storage: &libc::sockaddr_storage) -> io::Result<SocketAddr> {
    if storage.ss_family as libc::c_int != libc::AF_INET {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "unexpected address family",
        ));
    }
    let sin = unsafe { &*(storage as *const libc::sockaddr_storage as *const libc::sockaddr_in) };
    Ok(from_sockaddr_in(sin))
}

impl SocketApi for LibcSocketApi {
    fn create_stream(&self) -> io::Result<RawFd> {
        let fd = unsafe { cvt(libc::socket(libc::AF_INET, libc::SOCK_STREAM, 0))? };
        if let Err(e) = set_non_blocking_cloexec(fd) {
            unsafe {
                libc::close(fd);
            }
            return Err(e);
        }
        Ok(fd)
    }

    fn set_reuse_addr(&self, fd: RawFd, enabled: bool) -> io::Result<()> {
        set_int_option(fd, libc::SOL_SOCKET, libc::SO_REUSEADDR, enabled as libc::c_int)
    }

    fn set_nodelay(&self, fd: RawFd, enabled: bool) -> io::Result<()> {
        set_int_option(fd, libc::IPPROTO_TCP, libc::TCP_NODELAY, enabled as libc::c_int)
    }

    fn bind(&self, fd: RawFd, addr: SocketAddr) -> io::Result<()> {
        let v4 = match addr {
            SocketAddr::V4(v4) => v4,
            SocketAddr::V6(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "IPv6 addresses are not supported by AF_INET sockets",
                ))
            }
        };

        let sin = to_sockaddr_in(v4);
        unsafe {
            cvt(libc::bind(
                fd,
                &sin as *const libc::sockaddr_in as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
            ))?;
        }
        Ok(())
    }

    fn listen(&self, fd: RawFd) -> io::Result<()> {
        unsafe {
            cvt(libc::listen(fd, libc::SOMAXCONN))?;
        }
        Ok(())
    }

    fn accept(&self, fd: RawFd) -> io::Result<(RawFd, SocketAddr)> {
        let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
        let mut len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;

        let client = unsafe {
            cvt(libc::accept(
                fd,
                &mut storage as *mut libc::sockaddr_storage as *mut libc::sockaddr,
                &mut len,
            ))?
        };

        let peer = set_non_blocking_cloexec(client).and_then(|_| sockaddr_in_from_storage(&storage));
        match peer {
            Ok(peer) => Ok((client, peer)),
            Err(e) => {
                unsafe {
                    libc::close(client);
                }
                Err(e)
            }
        }
    }

    fn local_addr(&self, fd: RawFd) -> io::Result<SocketAddr> {
        let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
        let mut len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
        unsafe {
            cvt(libc::getsockname(
                fd,
                &mut storage as *mut libc::sockaddr_storage as *mut libc::sockaddr,
                &mut len,
            ))?;
        }
        sockaddr_in_from_storage(&storage)
    }

    fn close(&self, fd: RawFd) -> io::Result<()> {
        unsafe {
            cvt(libc::close(fd))?;
        }
        Ok(())
    }
}
