//! Scheduling, interrupt and stop semantics.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use evio::Context;
use futures::FutureExt;

#[test]
fn stop_without_workers_reports_idle() {
    let context = Context::new().unwrap();
    assert!(context.stop());
}

#[test]
fn stop_from_task_reports_active_worker() {
    let context = Context::new().unwrap();
    let observed = Arc::new(AtomicBool::new(true));
    let seen = observed.clone();
    let inner = context.clone();
    context.spawn(async move {
        inner.schedule(true).await.unwrap();
        seen.store(inner.stop(), Ordering::SeqCst);
    });
    context.run(1).unwrap();
    assert!(!observed.load(Ordering::SeqCst));
}

#[test]
fn schedule_without_queue_is_immediate_on_context() {
    let context = Context::new().unwrap();
    let inner = context.clone();
    context.spawn(async move {
        assert!(inner.is_current());
        // Already on a worker of this context: completes in the same call.
        assert!(inner.schedule(false).now_or_never().is_some());
        // Queueing forces a round-trip through the multiplexor.
        assert!(inner.schedule(true).now_or_never().is_none());
        inner.schedule(true).await.unwrap();
        inner.stop();
    });
    context.run(1).unwrap();
}

#[test]
fn current_marker_follows_the_worker() {
    let context = Context::new().unwrap();
    assert!(!context.is_current());
    let inner = context.clone();
    context.spawn(async move {
        assert!(inner.is_current());
        inner.stop();
    });
    context.run(1).unwrap();
    assert!(!context.is_current());
}

#[test]
fn hundred_tasks_resume_once_across_two_workers() {
    let context = Context::new().unwrap();
    let resumed = Arc::new(AtomicUsize::new(0));
    for _ in 0..100 {
        let inner = context.clone();
        let resumed = resumed.clone();
        context.spawn(async move {
            inner.schedule(true).await.unwrap();
            resumed.fetch_add(1, Ordering::SeqCst);
            inner.stop();
        });
    }
    let sibling = {
        let context = context.clone();
        thread::spawn(move || context.run(8))
    };
    context.run(8).unwrap();
    sibling.join().unwrap().unwrap();
    assert_eq!(resumed.load(Ordering::SeqCst), 100);
}

#[test]
fn schedule_rehomes_onto_the_named_context() {
    let first = Context::new().unwrap();
    let second = Context::new().unwrap();
    let second_worker = {
        let second = second.clone();
        thread::spawn(move || second.run(1))
    };

    let resumed = Arc::new(AtomicBool::new(false));
    let seen = resumed.clone();
    let (home, target) = (first.clone(), second.clone());
    first.spawn(async move {
        assert!(home.is_current());
        target.schedule(false).await.unwrap();
        // The continuation now runs on a worker of the target context.
        assert!(target.is_current());
        assert!(!home.is_current());
        seen.store(true, Ordering::SeqCst);
        home.stop();
        target.stop();
    });

    first.run(1).unwrap();
    second_worker.join().unwrap().unwrap();
    assert!(resumed.load(Ordering::SeqCst));
}

#[test]
fn interrupt_alone_does_not_stop_workers() {
    let context = Context::new().unwrap();
    let inner = context.clone();
    context.spawn(async move {
        // A bare interrupt wakes the loop but must not end it.
        inner.interrupt();
        inner.schedule(true).await.unwrap();
        inner.stop();
    });
    context.run(1).unwrap();
}
