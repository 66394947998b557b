//! Execution context: one kernel multiplexor, any number of workers.
//!
//! A [`Context`] is a cheap-clone handle over pinned shared state. Worker
//! threads call [`Context::run`] to drain the multiplexor and resume the
//! tasks whose operations completed; [`Context::stop`] asks all workers to
//! exit cooperatively. [`Context::schedule`] transfers the awaiting
//! continuation onto a worker of this context.

use std::cell::Cell;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::ptr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll, Waker};

use crossbeam_queue::SegQueue;
use mio::Events;
use tracing::trace;

use crate::error::{Error, Result};
use crate::poller::{Poller, WAKE};
use crate::task::{self, JoinHandle, Task};

const STOP_REQUESTED: u32 = 1;
const WORKER_INCREMENT: u32 = 2;

/// State shared by all handles, workers, sockets and tasks of one context.
pub(crate) struct Shared {
    pub(crate) poller: Poller,
    /// Bit 0 is the stop request; the remaining bits count active workers
    /// in increments of two.
    state: AtomicU32,
    pub(crate) ready: SegQueue<Arc<Task>>,
    scheduled: SegQueue<Waker>,
}

impl Shared {
    fn run_ready(&self) {
        while let Some(task) = self.ready.pop() {
            task.run();
        }
    }

    fn drain_scheduled(&self) {
        while let Some(waker) = self.scheduled.pop() {
            waker.wake();
        }
    }

    fn stop_requested(&self) -> bool {
        self.state.load(Ordering::Acquire) & STOP_REQUESTED != 0
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let workers = self.state.load(Ordering::Acquire) / WORKER_INCREMENT;
        debug_assert_eq!(workers, 0, "context dropped with active workers");
    }
}

thread_local! {
    static CURRENT: Cell<*const Shared> = const { Cell::new(ptr::null()) };
}

/// Marks the calling thread as a worker of `shared` until dropped.
struct Enter {
    prior: *const Shared,
}

impl Enter {
    fn new(shared: &Arc<Shared>) -> Self {
        let prior = CURRENT.with(|current| current.replace(Arc::as_ptr(shared)));
        Self { prior }
    }
}

impl Drop for Enter {
    fn drop(&mut self) {
        CURRENT.with(|current| current.set(self.prior));
    }
}

pub(crate) fn is_current(shared: &Arc<Shared>) -> bool {
    CURRENT.with(|current| ptr::eq(current.get(), Arc::as_ptr(shared)))
}

/// Owner of one kernel multiplexor and its pool of polling workers.
#[derive(Clone)]
pub struct Context {
    shared: Arc<Shared>,
}

impl Context {
    /// Opens the multiplexor and its wake channel.
    pub fn new() -> Result<Self> {
        let poller = Poller::new().map_err(|err| Error::os("create context", err))?;
        Ok(Self {
            shared: Arc::new(Shared {
                poller,
                state: AtomicU32::new(0),
                ready: SegQueue::new(),
                scheduled: SegQueue::new(),
            }),
        })
    }

    /// Runs the worker loop on the calling thread until [`stop`] is
    /// observed.
    ///
    /// Each iteration drains up to `event_buffer_size` kernel events in
    /// batch order and resumes the tasks they woke. A wake-channel event is
    /// the interrupt signal: scheduled continuations are released and the
    /// stop request is observed. A kernel-wait error is surfaced after the
    /// worker state is torn down; a wait interrupted by a signal is a
    /// spurious wakeup.
    ///
    /// [`stop`]: Context::stop
    pub fn run(&self, event_buffer_size: usize) -> Result<()> {
        let shared = &self.shared;
        let mut events = Events::with_capacity(event_buffer_size.max(1));
        let enter = Enter::new(shared);
        shared.state.fetch_add(WORKER_INCREMENT, Ordering::Relaxed);
        trace!("worker started");
        let mut fault = None;
        loop {
            if let Err(err) = shared.poller.wait(&mut events) {
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                fault = Some(err);
                break;
            }
            let mut interrupted = false;
            for event in events.iter() {
                if event.token() == WAKE {
                    interrupted = true;
                } else {
                    shared.poller.complete(event.token());
                }
            }
            if interrupted {
                shared.drain_scheduled();
            }
            shared.run_ready();
            if interrupted && shared.stop_requested() {
                break;
            }
        }
        shared.state.fetch_sub(WORKER_INCREMENT, Ordering::Release);
        drop(enter);
        self.interrupt();
        trace!("worker stopped");
        match fault {
            Some(err) => Err(Error::os("context", err)),
            None => Ok(()),
        }
    }

    /// Posts exactly one wake event.
    pub fn interrupt(&self) {
        let _ = self.shared.poller.wake();
    }

    /// Requests all workers to stop and wakes one of them; the exit of each
    /// worker wakes the next. Returns true iff no worker was active at the
    /// moment of the request.
    pub fn stop(&self) -> bool {
        let state = self.shared.state.fetch_or(STOP_REQUESTED, Ordering::Release);
        trace!("stop requested");
        self.interrupt();
        state / WORKER_INCREMENT == 0
    }

    /// True iff the calling thread is currently a worker of this context.
    pub fn is_current(&self) -> bool {
        is_current(&self.shared)
    }

    /// Returns the event that transfers the awaiting continuation onto a
    /// worker of this context.
    ///
    /// With `queue == false` the event completes immediately when already
    /// awaited on a worker of this context; `queue == true` additionally
    /// guarantees a round-trip through the multiplexor, which makes it a
    /// fairness yield.
    pub fn schedule(&self, queue: bool) -> Schedule {
        Schedule {
            shared: self.shared.clone(),
            queue,
            parked: false,
        }
    }

    /// Spawns a task homed on this context.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        task::spawn(&self.shared, future)
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }
}

/// Future returned by [`Context::schedule`].
pub struct Schedule {
    shared: Arc<Shared>,
    queue: bool,
    parked: bool,
}

impl Future for Schedule {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        if this.parked {
            return Poll::Ready(Ok(()));
        }
        if !this.queue && is_current(&this.shared) {
            return Poll::Ready(Ok(()));
        }
        task::rehome(&this.shared);
        this.shared.scheduled.push(cx.waker().clone());
        if let Err(err) = this.shared.poller.wake() {
            return Poll::Ready(Err(Error::os("schedule", err)));
        }
        this.parked = true;
        Poll::Pending
    }
}
