//! UDP socket and its three operation events.

use std::future::Future;
use std::io;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use mio::Interest;
use socket2::{Protocol, SockAddr, Type};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::net::endpoint::{Endpoint, Family};
use crate::net::socket::{self, Registration};

pub struct Socket {
    base: socket::Socket,
}

impl Socket {
    pub fn new(context: &Context, family: Family) -> Result<Self> {
        Self::with_protocol(context, family, Protocol::UDP)
    }

    pub fn with_protocol(context: &Context, family: Family, protocol: Protocol) -> Result<Self> {
        Ok(Self {
            base: socket::Socket::open(context, family, Type::DGRAM, Some(protocol))?,
        })
    }

    /// Receives one datagram; resolves to the byte count and the source
    /// endpoint. A connection-reset report on the connectionless socket is
    /// a zero-length successful datagram.
    pub fn recv_from<'a>(&'a mut self, data: &'a mut [u8]) -> RecvFrom<'a> {
        RecvFrom {
            socket: self,
            data,
            registration: Registration::new(),
        }
    }

    /// Sends the whole buffer to `endpoint`, advancing by bytes
    /// transferred across readiness edges; a zero-byte kernel write
    /// terminates the loop as success. An empty buffer still transmits one
    /// empty datagram.
    pub fn send_to<'a>(&'a mut self, endpoint: Endpoint, data: &'a [u8]) -> SendTo<'a> {
        SendTo {
            socket: self,
            endpoint,
            data,
            sent: 0,
            registration: Registration::new(),
        }
    }

    /// Sends one kernel write's worth of the buffer to `endpoint`.
    pub fn send_some_to<'a>(&'a mut self, endpoint: Endpoint, data: &'a [u8]) -> SendSomeTo<'a> {
        SendSomeTo {
            socket: self,
            endpoint,
            data,
            registration: Registration::new(),
        }
    }
}

impl Deref for Socket {
    type Target = socket::Socket;

    fn deref(&self) -> &socket::Socket {
        &self.base
    }
}

impl DerefMut for Socket {
    fn deref_mut(&mut self) -> &mut socket::Socket {
        &mut self.base
    }
}

/// Future for [`Socket::recv_from`].
pub struct RecvFrom<'a> {
    socket: &'a mut Socket,
    data: &'a mut [u8],
    registration: Registration,
}

impl Future for RecvFrom<'_> {
    type Output = Result<(usize, Endpoint)>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        loop {
            match this
                .socket
                .base
                .inner()
                .recv_from(socket::recv_buffer(this.data))
            {
                Ok((count, addr)) => {
                    this.registration.disarm(&this.socket.base);
                    let endpoint = addr
                        .as_socket()
                        .map(Endpoint::from)
                        .unwrap_or_else(|| Endpoint::unspecified(this.socket.base.family()));
                    return Poll::Ready(Ok((count, endpoint)));
                }
                Err(err) if err.kind() == io::ErrorKind::ConnectionReset => {
                    this.registration.disarm(&this.socket.base);
                    let endpoint = Endpoint::unspecified(this.socket.base.family());
                    return Poll::Ready(Ok((0, endpoint)));
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    if let Err(err) =
                        this.registration
                            .park(&this.socket.base, Interest::READABLE, cx.waker())
                    {
                        return Poll::Ready(Err(Error::os("udp recv", err)));
                    }
                    return Poll::Pending;
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    this.registration.disarm(&this.socket.base);
                    return Poll::Ready(Err(Error::os("udp recv", err)));
                }
            }
        }
    }
}

impl Drop for RecvFrom<'_> {
    fn drop(&mut self) {
        self.registration.disarm(&self.socket.base);
    }
}

/// Future for [`Socket::send_to`]: the full-write loop.
pub struct SendTo<'a> {
    socket: &'a mut Socket,
    endpoint: Endpoint,
    data: &'a [u8],
    sent: usize,
    registration: Registration,
}

impl Future for SendTo<'_> {
    type Output = Result<usize>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        let target = SockAddr::from(this.endpoint.addr());
        loop {
            match this
                .socket
                .base
                .inner()
                .send_to(&this.data[this.sent..], &target)
            {
                Ok(count) => {
                    this.sent += count;
                    if count == 0 || this.sent == this.data.len() {
                        this.registration.disarm(&this.socket.base);
                        return Poll::Ready(Ok(this.sent));
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    if let Err(err) =
                        this.registration
                            .park(&this.socket.base, Interest::WRITABLE, cx.waker())
                    {
                        return Poll::Ready(Err(Error::os("udp send", err)));
                    }
                    return Poll::Pending;
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    this.registration.disarm(&this.socket.base);
                    return Poll::Ready(Err(Error::os("udp send", err)));
                }
            }
        }
    }
}

impl Drop for SendTo<'_> {
    fn drop(&mut self) {
        self.registration.disarm(&self.socket.base);
    }
}

/// Future for [`Socket::send_some_to`].
pub struct SendSomeTo<'a> {
    socket: &'a mut Socket,
    endpoint: Endpoint,
    data: &'a [u8],
    registration: Registration,
}

impl Future for SendSomeTo<'_> {
    type Output = Result<usize>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        let target = SockAddr::from(this.endpoint.addr());
        loop {
            match this.socket.base.inner().send_to(this.data, &target) {
                Ok(count) => {
                    this.registration.disarm(&this.socket.base);
                    return Poll::Ready(Ok(count));
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    if let Err(err) =
                        this.registration
                            .park(&this.socket.base, Interest::WRITABLE, cx.waker())
                    {
                        return Poll::Ready(Err(Error::os("udp send some", err)));
                    }
                    return Poll::Pending;
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    this.registration.disarm(&this.socket.base);
                    return Poll::Ready(Err(Error::os("udp send some", err)));
                }
            }
        }
    }
}

impl Drop for SendSomeTo<'_> {
    fn drop(&mut self) {
        self.registration.disarm(&self.socket.base);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_socket_has_no_endpoint() {
        let context = Context::new().unwrap();
        let socket = Socket::new(&context, Family::Ipv4).unwrap();
        assert_eq!(socket.family(), Family::Ipv4);
        assert!(socket.endpoint().is_none());
    }

    #[test]
    fn bind_caches_the_assigned_port() {
        let context = Context::new().unwrap();
        let mut socket = Socket::new(&context, Family::Ipv4).unwrap();
        socket
            .bind(&Endpoint::new("127.0.0.1", 0).unwrap())
            .unwrap();
        let endpoint = *socket.endpoint().unwrap();
        assert_eq!(endpoint.family(), Family::Ipv4);
        assert_eq!(endpoint.host(), "127.0.0.1");
        assert_ne!(endpoint.port(), 0);
    }
}
