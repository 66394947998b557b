//! Base socket shared by the TCP and UDP families.

use std::io;
use std::mem::MaybeUninit;
use std::net::Shutdown;
use std::os::unix::io::{AsRawFd, RawFd};
use std::task::Waker;

use mio::{Interest, Token};
use socket2::{Protocol, SockAddr, Type};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::net::endpoint::{Endpoint, Family};

/// A non-blocking socket bound to one context.
///
/// The cached endpoint is the local endpoint after [`bind`] and the remote
/// endpoint after a connect or accept.
///
/// [`bind`]: Socket::bind
pub struct Socket {
    context: Context,
    inner: socket2::Socket,
    family: Family,
    endpoint: Option<Endpoint>,
}

impl Socket {
    pub(crate) fn open(
        context: &Context,
        family: Family,
        kind: Type,
        protocol: Option<Protocol>,
    ) -> Result<Self> {
        let inner = socket2::Socket::new(family.domain(), kind, protocol)
            .map_err(|err| Error::os("create socket", err))?;
        inner
            .set_nonblocking(true)
            .map_err(|err| Error::os("create socket", err))?;
        Ok(Self {
            context: context.clone(),
            inner,
            family,
            endpoint: None,
        })
    }

    /// Wraps an already-open socket, e.g. one produced by accept.
    pub(crate) fn adopt(
        context: Context,
        inner: socket2::Socket,
        family: Family,
        endpoint: Option<Endpoint>,
    ) -> Self {
        Self {
            context,
            inner,
            family,
            endpoint,
        }
    }

    pub fn bind(&mut self, endpoint: &Endpoint) -> Result<()> {
        self.inner
            .bind(&SockAddr::from(endpoint.addr()))
            .map_err(|err| Error::os("bind socket", err))?;
        // Re-read the local address so that port 0 caches the assigned port.
        self.endpoint = self
            .inner
            .local_addr()
            .ok()
            .and_then(|addr| addr.as_socket())
            .map(Endpoint::from);
        Ok(())
    }

    pub fn shutdown(&mut self, how: Shutdown) -> Result<()> {
        self.inner
            .shutdown(how)
            .map_err(|err| Error::os("shutdown socket", err))
    }

    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn reuse_address(&self) -> Result<bool> {
        self.inner
            .reuse_address()
            .map_err(|err| Error::os("socket option", err))
    }

    pub fn set_reuse_address(&mut self, enable: bool) -> Result<()> {
        self.inner
            .set_reuse_address(enable)
            .map_err(|err| Error::os("socket option", err))
    }

    pub fn recv_buffer_size(&self) -> Result<usize> {
        self.inner
            .recv_buffer_size()
            .map_err(|err| Error::os("socket option", err))
    }

    pub fn set_recv_buffer_size(&mut self, size: usize) -> Result<()> {
        self.inner
            .set_recv_buffer_size(size)
            .map_err(|err| Error::os("socket option", err))
    }

    pub fn send_buffer_size(&self) -> Result<usize> {
        self.inner
            .send_buffer_size()
            .map_err(|err| Error::os("socket option", err))
    }

    pub fn set_send_buffer_size(&mut self, size: usize) -> Result<()> {
        self.inner
            .set_send_buffer_size(size)
            .map_err(|err| Error::os("socket option", err))
    }

    pub(crate) fn inner(&self) -> &socket2::Socket {
        &self.inner
    }

    pub(crate) fn set_endpoint(&mut self, endpoint: Endpoint) {
        self.endpoint = Some(endpoint);
    }
}

impl AsRawFd for Socket {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}

/// At most one outstanding readiness registration for one operation.
///
/// Operation futures arm on `WouldBlock` and must disarm on completion and
/// on drop; the second arm of an already-armed registration only refreshes
/// the parked waker.
pub(crate) struct Registration {
    token: Option<Token>,
}

impl Registration {
    pub(crate) const fn new() -> Self {
        Self { token: None }
    }

    pub(crate) fn park(
        &mut self,
        socket: &Socket,
        interest: Interest,
        waker: &Waker,
    ) -> io::Result<()> {
        let poller = &socket.context.shared().poller;
        match self.token {
            Some(token) => {
                poller.update(token, waker);
                Ok(())
            }
            None => {
                self.token = Some(poller.arm(socket.as_raw_fd(), interest, waker)?);
                Ok(())
            }
        }
    }

    pub(crate) fn disarm(&mut self, socket: &Socket) {
        if let Some(token) = self.token.take() {
            socket
                .context
                .shared()
                .poller
                .disarm(socket.as_raw_fd(), token);
        }
    }
}

/// Reinterprets a plain byte buffer for the socket2 receive calls.
pub(crate) fn recv_buffer(data: &mut [u8]) -> &mut [MaybeUninit<u8>] {
    // SAFETY: `MaybeUninit<u8>` has the same layout as `u8` and the kernel
    // only ever writes into the buffer.
    unsafe { &mut *(data as *mut [u8] as *mut [MaybeUninit<u8>]) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::task::noop_waker;

    fn test_socket(context: &Context) -> Socket {
        Socket::open(context, Family::Ipv4, Type::DGRAM, Some(Protocol::UDP)).unwrap()
    }

    #[test]
    fn registration_arms_once_and_disarm_clears() {
        let context = Context::new().unwrap();
        let socket = test_socket(&context);
        let waker = noop_waker();
        let mut registration = Registration::new();
        assert!(registration.token.is_none());

        registration
            .park(&socket, Interest::WRITABLE, &waker)
            .unwrap();
        let token = registration.token.unwrap();

        // A second park refreshes the waker but keeps the registration.
        registration
            .park(&socket, Interest::WRITABLE, &waker)
            .unwrap();
        assert_eq!(registration.token, Some(token));

        registration.disarm(&socket);
        assert!(registration.token.is_none());

        // Disarming again is a no-op.
        registration.disarm(&socket);
        assert!(registration.token.is_none());
    }

    #[test]
    fn rearm_after_disarm_is_allowed() {
        let context = Context::new().unwrap();
        let socket = test_socket(&context);
        let waker = noop_waker();
        let mut registration = Registration::new();

        registration
            .park(&socket, Interest::READABLE, &waker)
            .unwrap();
        registration.disarm(&socket);

        registration
            .park(&socket, Interest::WRITABLE, &waker)
            .unwrap();
        assert!(registration.token.is_some());
        registration.disarm(&socket);
    }

    #[test]
    fn recv_buffer_preserves_length() {
        let mut data = [0u8; 8];
        assert_eq!(recv_buffer(&mut data).len(), 8);
        assert_eq!(recv_buffer(&mut []).len(), 0);
    }
}
