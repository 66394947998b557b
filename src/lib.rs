//! evio: coroutine-style non-blocking socket I/O
//!
//! This crate provides a small asynchronous runtime for socket I/O:
//! - One kernel readiness queue per [`Context`], drained by any number of
//!   worker threads calling [`Context::run`]
//! - Every I/O operation is a future with a single suspension point;
//!   operations attempt their syscall first and only register with the
//!   kernel when it would block
//! - TCP and UDP operation families with precise partial-completion
//!   semantics, plus a transport shim for callback-driven SSH libraries
//!
//! ## Platform selection
//!
//! The kernel multiplexor family is selected at compile time by `mio`:
//! epoll on Linux and Android, kqueue on the BSDs and macOS. Exactly one
//! family is compiled in per build.
//!
//! # Examples
//!
//! ```rust,no_run
//! use evio::net::tcp;
//! use evio::net::{Endpoint, Family};
//! use evio::Context;
//!
//! fn main() -> evio::Result<()> {
//!     let context = Context::new()?;
//!     let mut listener = tcp::Socket::new(&context, Family::Ipv4)?;
//!     listener.bind(&Endpoint::new("127.0.0.1", 0)?)?;
//!     listener.listen(128)?;
//!
//!     let worker = context.clone();
//!     context.spawn(async move {
//!         let mut client = listener.accept().await?;
//!         let mut data = [0u8; 512];
//!         loop {
//!             let count = client.recv(&mut data).await?;
//!             if count == 0 {
//!                 break;
//!             }
//!             client.send(&data[..count]).await?;
//!         }
//!         worker.stop();
//!         Ok::<(), evio::Error>(())
//!     });
//!
//!     context.run(64)
//! }
//! ```

#![deny(warnings)]

pub mod context;
pub mod error;
pub mod net;
pub mod runtime;
pub mod task;

mod poller;

// Re-export core types
pub use context::{Context, Schedule};
pub use error::{Category, Error, Result};
pub use runtime::Runtime;
pub use task::{JoinHandle, TaskError};
