//! Thin wrapper around the kernel readiness queue.
//!
//! `Poller` owns the `mio::Poll` handle of one context together with the
//! wake channel (eventfd on epoll, `EVFILT_USER` on kqueue) and a table of
//! parked task wakers keyed by registration token. Registrations are made
//! per operation and removed when the operation completes or is dropped,
//! which gives every operation the one-shot register/deregister dance
//! regardless of the compiled family.
//!
//! The `Poll` handle sits behind a mutex so that any number of workers may
//! drain the same context concurrently; events are dispatched outside the
//! lock.

use std::io;
use std::os::unix::io::RawFd;
use std::sync::Mutex;
use std::task::Waker;

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Registry, Token};
use slab::Slab;
use tracing::trace;

/// Token reserved for the wake channel; never an I/O completion.
pub(crate) const WAKE: Token = Token(usize::MAX);

pub(crate) struct Poller {
    poll: Mutex<Poll>,
    registry: Registry,
    waker: mio::Waker,
    slots: Mutex<Slab<Waker>>,
}

impl Poller {
    pub(crate) fn new() -> io::Result<Self> {
        let poll = Poll::new()?;
        let registry = poll.registry().try_clone()?;
        let waker = mio::Waker::new(&registry, WAKE)?;
        Ok(Self {
            poll: Mutex::new(poll),
            registry,
            waker,
            slots: Mutex::new(Slab::new()),
        })
    }

    /// Registers `fd` for `interest` and parks `waker` under the returned
    /// token.
    pub(crate) fn arm(&self, fd: RawFd, interest: Interest, waker: &Waker) -> io::Result<Token> {
        let key = self.slots.lock().unwrap().insert(waker.clone());
        if let Err(err) = self.registry.register(&mut SourceFd(&fd), Token(key), interest) {
            let _ = self.slots.lock().unwrap().try_remove(key);
            return Err(err);
        }
        trace!(fd, key, "armed");
        Ok(Token(key))
    }

    /// Replaces the waker parked under `token`.
    pub(crate) fn update(&self, token: Token, waker: &Waker) {
        if let Some(slot) = self.slots.lock().unwrap().get_mut(token.0) {
            *slot = waker.clone();
        }
    }

    /// Removes the registration for `fd` and frees its waker slot.
    pub(crate) fn disarm(&self, fd: RawFd, token: Token) {
        let _ = self.registry.deregister(&mut SourceFd(&fd));
        let _ = self.slots.lock().unwrap().try_remove(token.0);
        trace!(fd, key = token.0, "disarmed");
    }

    /// Wakes the task parked under `token`. Stale tokens are ignored; a
    /// reused slot can only produce a spurious wake, which operation
    /// futures absorb by re-checking their syscall.
    pub(crate) fn complete(&self, token: Token) {
        if let Some(waker) = self.slots.lock().unwrap().get(token.0) {
            waker.wake_by_ref();
        }
    }

    /// Posts one wake event.
    pub(crate) fn wake(&self) -> io::Result<()> {
        self.waker.wake()
    }

    /// Blocks until the kernel reports at least one event.
    pub(crate) fn wait(&self, events: &mut Events) -> io::Result<()> {
        self.poll.lock().unwrap().poll(events, None)
    }
}
