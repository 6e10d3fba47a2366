//! Non-blocking TCP listening sockets driven by a job-based reactor.
//!
//! A [`TcpListenSocket`](crate::core::net::TcpListenSocket) registers a readiness
//! job with a [`Multiplexer`](crate::core::event::Multiplexer). When a connection
//! is pending it posts a `Connecting` event to the
//! [`EventQueue`](crate::core::event::EventQueue) and pauses polling until the
//! application calls `accept`.

pub mod application;
pub mod common;
pub mod core;
