//! Bounded worker pool for per-connection tasks.
//!
//! A fixed set of OS threads consumes tasks from one bounded FIFO channel.
//! `submit` blocks while the queue is full, so back-pressure propagates to
//! the accept loop (and from there to the TCP backlog) instead of growing an
//! unbounded queue. Panics inside a task are caught and logged; they never
//! take a worker down. No work stealing, no priorities.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Sender};
use tracing::{debug, error, info};

/// A unit of work: one connection, run to completion.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Pool sizing.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker threads.
    pub num_workers: usize,
    /// Capacity of the task queue; `submit` blocks when it is full.
    pub queue_depth: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            num_workers: thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
            queue_depth: crate::config::DEFAULT_QUEUE_DEPTH,
        }
    }
}

/// Pool counters, updated with relaxed atomics.
#[derive(Debug, Default)]
pub struct WorkerPoolMetrics {
    queue_depth: AtomicUsize,
    dispatched: AtomicU64,
    completed: AtomicU64,
    panicked: AtomicU64,
}

impl WorkerPoolMetrics {
    fn record_dispatch(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.fetch_add(1, Ordering::Relaxed);
    }

    fn record_completion(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.fetch_sub(1, Ordering::Relaxed);
    }

    fn record_panic(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
    }

    /// Approximate number of queued or running tasks.
    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn panicked(&self) -> u64 {
        self.panicked.load(Ordering::Relaxed)
    }
}

/// Fixed pool of worker threads over a bounded queue.
pub struct WorkerPool {
    sender: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
    metrics: Arc<WorkerPoolMetrics>,
}

impl WorkerPool {
    pub fn new(config: WorkerPoolConfig) -> Self {
        let (sender, receiver) = bounded::<Task>(config.queue_depth);
        let metrics = Arc::new(WorkerPoolMetrics::default());

        info!(
            num_workers = config.num_workers,
            queue_depth = config.queue_depth,
            "Worker pool starting"
        );

        let workers = (0..config.num_workers.max(1))
            .map(|worker_id| {
                let receiver = receiver.clone();
                let metrics = metrics.clone();
                thread::Builder::new()
                    .name(format!("worker-{worker_id}"))
                    .spawn(move || {
                        debug!(worker_id, "Worker started");
                        // The loop ends when the channel disconnects, i.e.
                        // when the pool drops its sender during shutdown.
                        while let Ok(task) = receiver.recv() {
                            if catch_unwind(AssertUnwindSafe(task)).is_err() {
                                metrics.record_panic();
                                error!(worker_id, "Task panicked; worker continues");
                            }
                            metrics.record_completion();
                        }
                        debug!(worker_id, "Worker exiting");
                    })
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self {
            sender: Some(sender),
            workers,
            metrics,
        }
    }

    /// Enqueue a task. Blocks while the queue is full; fails only after
    /// shutdown has closed the queue.
    pub fn submit(&self, task: impl FnOnce() + Send + 'static) -> Result<(), ()> {
        let Some(sender) = &self.sender else {
            return Err(());
        };
        self.metrics.record_dispatch();
        sender.send(Box::new(task)).map_err(|_| {
            error!("Worker pool queue is closed");
        })
    }

    pub fn metrics(&self) -> &Arc<WorkerPoolMetrics> {
        &self.metrics
    }

    /// Close the queue and wait for every worker to drain and exit.
    pub fn shutdown(&mut self) {
        // Dropping the sender disconnects the channel once queued tasks are
        // consumed; workers then fall out of their recv loop.
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        debug!(
            dispatched = self.metrics.dispatched(),
            completed = self.metrics.completed(),
            panicked = self.metrics.panicked(),
            "Worker pool drained"
        );
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
