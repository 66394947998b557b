//! TCP socket and its five operation events.

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
    pub(crate) base: socket::Socket,
}

impl Socket {
    pub fn new(context: &Context, family: Family) -> Result<Self> {
        Self::with_protocol(context, family, Protocol::TCP)
    }

    pub fn with_protocol(context: &Context, family: Family, protocol: Protocol) -> Result<Self> {
        Ok(Self {
            base: socket::Socket::open(context, family, Type::STREAM, Some(protocol))?,
        })
    }

    pub fn listen(&mut self, backlog: u32) -> Result<()> {
        self.base
            .inner()
            .listen(backlog as i32)
            .map_err(|err| Error::os("listen socket", err))
    }

    /// Accepts one client socket bound to the same context, family and
    /// protocol as the listener.
    pub fn accept(&mut self) -> Accept<'_> {
        Accept {
            socket: self,
            registration: Registration::new(),
        }
    }

    /// Associates the socket with `endpoint`. Failures such as an address
    /// family mismatch or a refused connection surface verbatim.
    pub fn connect(&mut self, endpoint: Endpoint) -> Connect<'_> {
        Connect {
            socket: self,
            endpoint,
            registration: Registration::new(),
            started: false,
        }
    }

    /// Reads up to `data.len()` bytes; completes with any `0 <= n` and
    /// returns 0 exactly when the peer shut down cleanly. Partial reads
    /// are not retried.
    pub fn recv<'a>(&'a mut self, data: &'a mut [u8]) -> Recv<'a> {
        Recv {
            socket: self,
            data,
            registration: Registration::new(),
        }
    }

    /// Writes the whole buffer, looping across readiness edges; resolves
    /// to `data.len()` or fails.
    pub fn send<'a>(&'a mut self, data: &'a [u8]) -> Send<'a> {
        Send {
            socket: self,
            data,
            sent: 0,
            registration: Registration::new(),
        }
    }

    /// Writes one kernel write's worth of the buffer and returns the
    /// count.
    pub fn send_some<'a>(&'a mut self, data: &'a [u8]) -> SendSome<'a> {
        SendSome {
            socket: self,
            data,
            registration: Registration::new(),
        }
    }

    /// Reads until `data` is filled; orderly closure short of that is the
    /// domain error [`Error::Eof`].
    pub async fn recv_exact(&mut self, data: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < data.len() {
            let count = self.recv(&mut data[filled..]).await?;
            if count == 0 {
                return Err(Error::eof("tcp recv"));
            }
            filled += count;
        }
        Ok(())
    }

    pub fn nodelay(&self) -> Result<bool> {
        self.base
            .inner()
            .nodelay()
            .map_err(|err| Error::os("socket option", err))
    }

    pub fn set_nodelay(&mut self, enable: bool) -> Result<()> {
        self.base
            .inner()
            .set_nodelay(enable)
            .map_err(|err| Error::os("socket option", err))
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

/// Future for [`Socket::accept`].
pub struct Accept<'a> {
    socket: &'a mut Socket,
    registration: Registration,
}

impl Future for Accept<'_> {
    type Output = Result<Socket>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        loop {
            match this.socket.base.inner().accept() {
                Ok((inner, addr)) => {
                    this.registration.disarm(&this.socket.base);
                    if let Err(err) = inner.set_nonblocking(true) {
                        return Poll::Ready(Err(Error::os("accept tcp socket", err)));
                    }
                    let endpoint = addr.as_socket().map(Endpoint::from);
                    let context = this.socket.base.context().clone();
                    let family = this.socket.base.family();
                    return Poll::Ready(Ok(Socket {
                        base: socket::Socket::adopt(context, inner, family, endpoint),
                    }));
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    if let Err(err) =
                        this.registration
                            .park(&this.socket.base, Interest::READABLE, cx.waker())
                    {
                        return Poll::Ready(Err(Error::os("accept tcp socket", err)));
                    }
                    return Poll::Pending;
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    this.registration.disarm(&this.socket.base);
                    return Poll::Ready(Err(Error::os("accept tcp socket", err)));
                }
            }
        }
    }
}

impl Drop for Accept<'_> {
    fn drop(&mut self) {
        self.registration.disarm(&self.socket.base);
    }
}

/// Future for [`Socket::connect`].
pub struct Connect<'a> {
    socket: &'a mut Socket,
    endpoint: Endpoint,
    registration: Registration,
    started: bool,
}

impl Future for Connect<'_> {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        if !this.started {
            let target = SockAddr::from(this.endpoint.addr());
            return match this.socket.base.inner().connect(&target) {
                Ok(()) => {
                    this.socket.base.set_endpoint(this.endpoint);
                    Poll::Ready(Ok(()))
                }
                Err(err) if connect_in_progress(&err) => {
                    this.started = true;
                    if let Err(err) =
                        this.registration
                            .park(&this.socket.base, Interest::WRITABLE, cx.waker())
                    {
                        return Poll::Ready(Err(Error::os("connect", err)));
                    }
                    Poll::Pending
                }
                Err(err) => Poll::Ready(Err(Error::os("connect", err))),
            };
        }
        // The writable edge decided the connect; SO_ERROR has the verdict.
        this.registration.disarm(&this.socket.base);
        match this.socket.base.inner().take_error() {
            Ok(None) => {
                this.socket.base.set_endpoint(this.endpoint);
                Poll::Ready(Ok(()))
            }
            Ok(Some(err)) | Err(err) => Poll::Ready(Err(Error::os("connect", err))),
        }
    }
}

impl Drop for Connect<'_> {
    fn drop(&mut self) {
        self.registration.disarm(&self.socket.base);
    }
}

fn connect_in_progress(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.kind() == io::ErrorKind::Interrupted
        || err.raw_os_error() == Some(libc::EINPROGRESS)
}

/// Future for [`Socket::recv`].
pub struct Recv<'a> {
    socket: &'a mut Socket,
    data: &'a mut [u8],
    registration: Registration,
}

impl Future for Recv<'_> {
    type Output = Result<usize>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        loop {
            match this.socket.base.inner().recv(socket::recv_buffer(this.data)) {
                Ok(count) => {
                    this.registration.disarm(&this.socket.base);
                    return Poll::Ready(Ok(count));
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    if let Err(err) =
                        this.registration
                            .park(&this.socket.base, Interest::READABLE, cx.waker())
                    {
                        return Poll::Ready(Err(Error::os("tcp recv", err)));
                    }
                    return Poll::Pending;
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    this.registration.disarm(&this.socket.base);
                    return Poll::Ready(Err(Error::os("tcp recv", err)));
                }
            }
        }
    }
}

impl Drop for Recv<'_> {
    fn drop(&mut self) {
        self.registration.disarm(&self.socket.base);
    }
}

/// Future for [`Socket::send`]: the full-write loop.
pub struct Send<'a> {
    socket: &'a mut Socket,
    data: &'a [u8],
    sent: usize,
    registration: Registration,
}

impl Future for Send<'_> {
    type Output = Result<usize>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        loop {
            if this.sent == this.data.len() {
                this.registration.disarm(&this.socket.base);
                return Poll::Ready(Ok(this.sent));
            }
            match this.socket.base.inner().send(&this.data[this.sent..]) {
                Ok(0) => {
                    this.registration.disarm(&this.socket.base);
                    return Poll::Ready(Err(Error::os(
                        "tcp send",
                        io::ErrorKind::WriteZero.into(),
                    )));
                }
                Ok(count) => this.sent += count,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    if let Err(err) =
                        this.registration
                            .park(&this.socket.base, Interest::WRITABLE, cx.waker())
                    {
                        return Poll::Ready(Err(Error::os("tcp send", err)));
                    }
                    return Poll::Pending;
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    this.registration.disarm(&this.socket.base);
                    return Poll::Ready(Err(Error::os("tcp send", err)));
                }
            }
        }
    }
}

impl Drop for Send<'_> {
    fn drop(&mut self) {
        self.registration.disarm(&self.socket.base);
    }
}

/// Future for [`Socket::send_some`].
pub struct SendSome<'a> {
    socket: &'a mut Socket,
    data: &'a [u8],
    registration: Registration,
}

impl Future for SendSome<'_> {
    type Output = Result<usize>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        loop {
            match this.socket.base.inner().send(this.data) {
                Ok(count) => {
                    this.registration.disarm(&this.socket.base);
                    return Poll::Ready(Ok(count));
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    if let Err(err) =
                        this.registration
                            .park(&this.socket.base, Interest::WRITABLE, cx.waker())
                    {
                        return Poll::Ready(Err(Error::os("tcp send some", err)));
                    }
                    return Poll::Pending;
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    this.registration.disarm(&this.socket.base);
                    return Poll::Ready(Err(Error::os("tcp send some", err)));
                }
            }
        }
    }
}

impl Drop for SendSome<'_> {
    fn drop(&mut self) {
        self.registration.disarm(&self.socket.base);
    }
}
