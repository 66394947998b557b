//! Non-blocking transport shim for a callback-driven SSH library.
//!
//! An SSH session is strictly serial across its own socket: at any moment
//! there is zero or one outstanding socket operation. The library drives
//! the flow by calling [`Transport::on_recv`] or [`Transport::on_send`]
//! when it needs bytes; the callback performs the syscall directly and, if
//! the kernel would block, records the operation and returns `-EAGAIN` so
//! the library unwinds. Awaiting [`Transport::wait`] then arms one round
//! of read or write readiness and resumes on the edge, after which the
//! library is driven again and retries.
//!
//! The callback signatures mirror the C library ABI (byte count or
//! negative errno) so a binding crate can splice them straight into its
//! callback slots.

use std::future::Future;
use std::io;
use std::os::unix::io::AsRawFd;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use libc::c_int;
use mio::Interest;

use crate::error::{Error, Result};
use crate::net::socket::Registration;
use crate::net::tcp;

/// Socket operation recorded by a library callback for the next wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    None,
    Recv,
    Send,
}

/// Readiness shim over one TCP socket.
///
/// The mutable borrow pins the socket to this transport for the session's
/// lifetime, which keeps the one-outstanding-operation contract.
pub struct Transport<'s> {
    socket: &'s mut tcp::Socket,
    operation: Operation,
}

impl<'s> Transport<'s> {
    pub fn new(socket: &'s mut tcp::Socket) -> Self {
        Self {
            socket,
            operation: Operation::None,
        }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Receive callback: returns the byte count, or records the pending
    /// recv and returns the negative errno the kernel reported.
    pub fn on_recv(&mut self, data: &mut [u8], flags: c_int) -> isize {
        let fd = self.socket.as_raw_fd();
        loop {
            let count = unsafe { libc::recv(fd, data.as_mut_ptr().cast(), data.len(), flags) };
            if count >= 0 {
                return count as isize;
            }
            let errno = io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO);
            if errno == libc::EINTR {
                continue;
            }
            self.operation = Operation::Recv;
            return -(errno as isize);
        }
    }

    /// Send callback, symmetric to [`on_recv`].
    ///
    /// [`on_recv`]: Transport::on_recv
    pub fn on_send(&mut self, data: &[u8], flags: c_int) -> isize {
        let fd = self.socket.as_raw_fd();
        loop {
            let count = unsafe { libc::send(fd, data.as_ptr().cast(), data.len(), flags) };
            if count >= 0 {
                return count as isize;
            }
            let errno = io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO);
            if errno == libc::EINTR {
                continue;
            }
            self.operation = Operation::Send;
            return -(errno as isize);
        }
    }

    /// The barrier awaited between library rounds: one readiness edge for
    /// the recorded operation, then the tag is cleared. Entering the
    /// barrier with no recorded operation is a misuse of the library's
    /// reentrancy contract and fails with an invalid-argument error.
    pub fn wait(&mut self) -> Wait<'_, 's> {
        Wait {
            transport: self,
            registration: Registration::new(),
            parked: false,
        }
    }
}

/// Future returned by [`Transport::wait`].
pub struct Wait<'t, 's> {
    transport: &'t mut Transport<'s>,
    registration: Registration,
    parked: bool,
}

impl Future for Wait<'_, '_> {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        if this.parked {
            this.registration.disarm(&this.transport.socket.base);
            this.transport.operation = Operation::None;
            return Poll::Ready(Ok(()));
        }
        let interest = match this.transport.operation {
            Operation::Recv => Interest::READABLE,
            Operation::Send => Interest::WRITABLE,
            Operation::None => {
                return Poll::Ready(Err(Error::os(
                    "ssh transport",
                    io::ErrorKind::InvalidInput.into(),
                )));
            }
        };
        if let Err(err) = this
            .registration
            .park(&this.transport.socket.base, interest, cx.waker())
        {
            return Poll::Ready(Err(Error::os("ssh transport", err)));
        }
        this.parked = true;
        Poll::Pending
    }
}

impl Drop for Wait<'_, '_> {
    fn drop(&mut self) {
        self.registration.disarm(&self.transport.socket.base);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::endpoint::Family;
    use crate::Context;
    use futures::FutureExt;

    #[test]
    fn callbacks_record_the_pending_operation() {
        let context = Context::new().unwrap();
        let mut socket = tcp::Socket::new(&context, Family::Ipv4).unwrap();
        let mut transport = Transport::new(&mut socket);
        assert_eq!(transport.operation(), Operation::None);

        // The socket is not connected, so both callbacks fail and must
        // record their tag before bowing out.
        let mut data = [0u8; 8];
        let rc = transport.on_recv(&mut data, 0);
        assert!(rc < 0);
        assert_eq!(transport.operation(), Operation::Recv);

        let rc = transport.on_send(b"x", 0);
        assert!(rc < 0);
        assert_eq!(transport.operation(), Operation::Send);
    }

    #[test]
    fn wait_rejects_a_missing_operation() {
        let context = Context::new().unwrap();
        let mut socket = tcp::Socket::new(&context, Family::Ipv4).unwrap();
        let mut transport = Transport::new(&mut socket);
        let result = transport.wait().now_or_never().unwrap();
        let err = result.unwrap_err();
        assert_eq!(err.kind(), Some(io::ErrorKind::InvalidInput));
        assert_eq!(transport.operation(), Operation::None);
    }
}
