//! Multi-worker runtime over a single context.

use std::future::Future;
use std::io;
use std::thread;

use tracing::debug;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::task::JoinHandle;

const EVENT_BUFFER_SIZE: usize = 64;

/// One [`Context`] driven by a pool of named worker threads.
pub struct Runtime {
    context: Context,
    workers: Vec<thread::JoinHandle<Result<()>>>,
}

impl Runtime {
    /// Starts one worker per available CPU.
    pub fn new() -> Result<Self> {
        Self::with_workers(num_cpus::get())
    }

    /// Starts `count` workers (at least one).
    pub fn with_workers(count: usize) -> Result<Self> {
        let context = Context::new()?;
        let count = count.max(1);
        let mut workers = Vec::with_capacity(count);
        for index in 0..count {
            let worker = context.clone();
            let spawned = thread::Builder::new()
                .name(format!("evio-worker-{index}"))
                .spawn(move || worker.run(EVENT_BUFFER_SIZE));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    context.stop();
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(Error::os("spawn worker", err));
                }
            }
        }
        debug!(count, "runtime started");
        Ok(Self { context, workers })
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Spawns a task onto the pool's context.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.context.spawn(future)
    }

    /// Stops the context and joins all workers, surfacing the first worker
    /// failure. Dropping the runtime does the same, discarding the result.
    pub fn shutdown(mut self) -> Result<()> {
        self.shutdown_workers()
    }

    fn shutdown_workers(&mut self) -> Result<()> {
        self.context.stop();
        let mut result = Ok(());
        for worker in self.workers.drain(..) {
            let outcome = match worker.join() {
                Ok(outcome) => outcome,
                Err(_) => Err(Error::os("join worker", io::Error::other("worker panicked"))),
            };
            if result.is_ok() {
                result = outcome;
            }
        }
        debug!("runtime stopped");
        result
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            let _ = self.shutdown_workers();
        }
    }
}
