//! Task layer: spawned futures, wakers and join handles.
//!
//! A spawned future becomes a reference-counted task with a small atomic
//! state machine. Its waker enqueues the task on the ready queue of its
//! *home* context and wakes that context's poller; a wake that lands while
//! the task is being polled re-queues it afterwards instead of getting
//! lost. Tasks are re-homeable: awaiting another context's schedule event
//! moves the task onto that context's workers.

use std::any::Any;
use std::cell::RefCell;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context as TaskContext, Poll};

use futures::channel::oneshot;
use futures::task::ArcWake;
use futures::FutureExt;
use thiserror::Error;
use tracing::error;

use crate::context::Shared;

const IDLE: u8 = 0;
const QUEUED: u8 = 1;
const RUNNING: u8 = 2;
const WOKEN: u8 = 3;
const DONE: u8 = 4;

pub(crate) struct Task {
    state: AtomicU8,
    future: Mutex<Option<Pin<Box<dyn Future<Output = ()> + Send>>>>,
    home: Mutex<Weak<Shared>>,
}

impl Task {
    /// Pushes the task onto its home context and wakes that poller.
    fn enqueue(self: &Arc<Self>) {
        if let Some(shared) = self.home.lock().unwrap().upgrade() {
            shared.ready.push(self.clone());
            let _ = shared.poller.wake();
        }
    }

    /// Polls the task once on the calling worker thread.
    pub(crate) fn run(self: &Arc<Self>) {
        self.state.store(RUNNING, Ordering::Release);
        let waker = futures::task::waker(self.clone());
        let mut cx = TaskContext::from_waker(&waker);
        let completed = {
            let _enter = EnterTask::new(self.clone());
            let mut slot = self.future.lock().unwrap();
            match slot.as_mut() {
                Some(future) => match future.as_mut().poll(&mut cx) {
                    Poll::Ready(()) => {
                        *slot = None;
                        true
                    }
                    Poll::Pending => false,
                },
                None => true,
            }
        };
        if completed {
            self.state.store(DONE, Ordering::Release);
            return;
        }
        // Retire to IDLE unless a wake arrived while the task was running.
        if self
            .state
            .compare_exchange(RUNNING, IDLE, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.state.store(QUEUED, Ordering::Release);
            self.enqueue();
        }
    }
}

impl ArcWake for Task {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        let mut state = arc_self.state.load(Ordering::Acquire);
        loop {
            match state {
                IDLE => {
                    match arc_self.state.compare_exchange(
                        IDLE,
                        QUEUED,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => {
                            arc_self.enqueue();
                            return;
                        }
                        Err(actual) => state = actual,
                    }
                }
                RUNNING => {
                    match arc_self.state.compare_exchange(
                        RUNNING,
                        WOKEN,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => return,
                        Err(actual) => state = actual,
                    }
                }
                _ => return, // QUEUED, WOKEN or DONE: nothing to do.
            }
        }
    }
}

thread_local! {
    static CURRENT_TASK: RefCell<Option<Arc<Task>>> = const { RefCell::new(None) };
}

/// Exposes the task being polled to the schedule event on this thread.
struct EnterTask {
    prior: Option<Arc<Task>>,
}

impl EnterTask {
    fn new(task: Arc<Task>) -> Self {
        let prior = CURRENT_TASK.with(|slot| slot.borrow_mut().replace(task));
        Self { prior }
    }
}

impl Drop for EnterTask {
    fn drop(&mut self) {
        CURRENT_TASK.with(|slot| *slot.borrow_mut() = self.prior.take());
    }
}

/// Moves the running task's home onto `target`; no-op outside a worker.
pub(crate) fn rehome(target: &Arc<Shared>) {
    CURRENT_TASK.with(|slot| {
        if let Some(task) = slot.borrow().as_ref() {
            *task.home.lock().unwrap() = Arc::downgrade(target);
        }
    });
}

pub(crate) fn spawn<F>(shared: &Arc<Shared>, future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let (sender, receiver) = oneshot::channel();
    let wrapped = async move {
        let result = AssertUnwindSafe(future).catch_unwind().await;
        let result = result.map_err(|payload| {
            let message = panic_message(payload);
            error!(%message, "task panicked");
            TaskError::Panicked(message)
        });
        let _ = sender.send(result);
    };
    let task = Arc::new(Task {
        state: AtomicU8::new(QUEUED),
        future: Mutex::new(Some(Box::pin(wrapped))),
        home: Mutex::new(Arc::downgrade(shared)),
    });
    task.enqueue();
    JoinHandle { result: receiver }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

/// Failure modes of a spawned task.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The task panicked while running; the panic did not take down the
    /// worker.
    #[error("task panicked: {0}")]
    Panicked(String),
    /// The task was dropped before it could complete.
    #[error("task cancelled")]
    Cancelled,
}

/// Handle resolving to the output of a spawned task.
pub struct JoinHandle<T> {
    result: oneshot::Receiver<Result<T, TaskError>>,
}

impl<T> JoinHandle<T> {
    /// Returns the task's outcome if it has already finished.
    pub fn try_result(&mut self) -> Option<Result<T, TaskError>> {
        match self.result.try_recv() {
            Ok(Some(result)) => Some(result),
            Ok(None) => None,
            Err(oneshot::Canceled) => Some(Err(TaskError::Cancelled)),
        }
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = Result<T, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.result).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(TaskError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}
