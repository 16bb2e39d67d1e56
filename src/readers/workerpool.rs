// src/readers/workerpool.rs

//! Implements [`WorkerPool`], a fixed set of named threads that run
//! blocking record loads.

use crate::readers::filewatch::run_caught;
#[allow(unused_imports)]
use crate::debug::printers::{de_err, de_wrn, e_err, e_wrn};

use std::fmt;
use std::io;
use std::thread;

use ::crossbeam_channel::{bounded, Receiver, Sender};
#[allow(unused_imports)]
use ::si_trace_print::{defn, defo, defx, defñ};

/// Default count of worker threads. Loads are I/O bound.
pub const WORKER_COUNT_DEFAULT: usize = 8;

/// Queued jobs per worker before [`WorkerPool::execute`] blocks.
const QUEUE_PER_WORKER: usize = 16;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs jobs on a fixed count of threads fed by a bounded channel.
///
/// A panicking job is printed and does not stop its thread. Dropping the
/// pool waits for queued jobs to finish.
pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl fmt::Debug for WorkerPool {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers.len())
            .field("queued", &self.sender.as_ref().map(|s| s.len()))
            .finish()
    }
}

impl WorkerPool {
    pub fn new(count: usize) -> io::Result<WorkerPool> {
        defn!("({})", count);
        let count = count.max(1);
        let (sender, receiver) = bounded::<Job>(count * QUEUE_PER_WORKER);
        let mut workers = Vec::with_capacity(count);
        for i in 0..count {
            let receiver: Receiver<Job> = receiver.clone();
            let worker = thread::Builder::new()
                .name(format!("logsnap-worker-{}", i))
                .spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        run_caught("worker job", job);
                    }
                })?;
            workers.push(worker);
        }
        defx!();

        Ok(WorkerPool {
            sender: Some(sender),
            workers,
        })
    }

    pub fn count_workers(&self) -> usize {
        self.workers.len()
    }

    /// Queue `job`; blocks while the queue is full.
    pub fn execute<F>(
        &self,
        job: F,
    ) -> io::Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = match self.sender.as_ref() {
            Some(sender) => sender,
            None => return Err(io::Error::new(io::ErrorKind::BrokenPipe, "worker pool is shut down")),
        };
        sender
            .send(Box::new(job))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "worker pool is shut down"))
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // workers leave their loop when the channel disconnects
        self.sender = None;
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                de_err!("worker thread panicked");
            }
        }
    }
}
