//! Networking primitives: endpoints, sockets and their operation futures.

pub mod endpoint;
pub mod socket;
pub mod ssh;
pub mod tcp;
pub mod udp;

pub use endpoint::{Endpoint, Family};
pub use socket::Socket;

pub use std::net::Shutdown;
