pub mod fd;
pub mod listen_socket;
pub mod socket;
pub mod sys;

pub use fd::SocketHandle;
pub use listen_socket::{ListenState, TcpListenSocket};
pub use socket::ConnectedSocket;
pub use sys::{LibcSocketApi, SocketApi};
