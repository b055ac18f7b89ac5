//! # Stratum Task
//!
//! A fixed-size worker pool executing three-phase tasks.
//!
//! ## Phase Contract
//!
//! | Phase    | Runs on          | Purpose                                  |
//! |----------|------------------|------------------------------------------|
//! | `pre`    | submitting thread| gather inputs from owner-only state      |
//! | `thread` | a worker thread  | CPU-bound work, no owner state           |
//! | `post`   | submitting thread| apply results in bounded time slices     |
//!
//! Each phase is re-invoked until it reports [`Progress::Done`]. `pre` runs
//! to completion inside [`ThreadPool::add_task`]; `thread` runs to
//! completion on one worker; `post` is resumed across
//! [`ThreadPool::run_post`] calls under a wall-clock budget, so one slow
//! task cannot starve a tick.
//!
//! ## Backpressure
//!
//! The `run_post` budget starts at 2 ms and grows by 5 ms for every queued
//! output task beyond 4: the deeper the worker backlog, the more owner
//! time is granted to drain it.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

/// Base owner-thread budget for one [`ThreadPool::run_post`] call.
pub const POST_BUDGET_BASE: Duration = Duration::from_millis(2);

/// Extra budget granted per queued output task beyond
/// [`POST_BUDGET_FREE_QUEUE`].
pub const POST_BUDGET_PER_EXCESS: Duration = Duration::from_millis(5);

/// Output backlog that fits inside the base budget.
pub const POST_BUDGET_FREE_QUEUE: usize = 4;

/// Whether a phase has finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Progress {
    /// The phase is complete; do not call it again.
    Done,
    /// The phase wants to be called again.
    Pending,
}

/// A unit of work with the pre/thread/post contract.
///
/// Tasks own their inputs and outputs by value; nothing in this crate hands
/// them a reference to owner-thread state.
pub trait Task: Send {
    /// Prepares inputs on the submitting thread. Called repeatedly until
    /// it returns [`Progress::Done`].
    fn pre(&mut self) -> Progress;

    /// CPU-bound work on a worker thread. Must not touch owner-thread
    /// state. Called repeatedly until it returns [`Progress::Done`].
    fn thread(&mut self) -> Progress;

    /// Applies results on the submitting thread in short slices. Called
    /// repeatedly, possibly across ticks, until it returns
    /// [`Progress::Done`].
    fn post(&mut self) -> Progress;
}

/// Errors raised while managing the pool.
#[derive(Error, Debug)]
pub enum PoolError {
    /// The operating system refused a worker thread. Fatal at startup.
    #[error("worker thread spawn failed: {0}")]
    Spawn(#[from] std::io::Error),
}

enum WorkerMessage {
    Run(Box<dyn Task>),
    Stop,
}

/// Fixed-size pool of worker threads.
pub struct ThreadPool {
    input_tx: Sender<WorkerMessage>,
    input_rx: Receiver<WorkerMessage>,
    output: Arc<Mutex<VecDeque<Box<dyn Task>>>>,
    stop: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Creates a pool with no workers; call [`ThreadPool::start`] before
    /// submitting work that should actually run.
    #[must_use]
    pub fn new() -> Self {
        let (input_tx, input_rx) = unbounded();
        Self {
            input_tx,
            input_rx,
            output: Arc::new(Mutex::new(VecDeque::new())),
            stop: Arc::new(AtomicBool::new(false)),
            workers: Vec::new(),
        }
    }

    /// Spawns `num_threads` workers.
    ///
    /// # Errors
    ///
    /// [`PoolError::Spawn`] if the OS refuses a thread; treat as fatal.
    pub fn start(&mut self, num_threads: usize) -> Result<(), PoolError> {
        if !self.workers.is_empty() {
            warn!("thread pool already running");
            return Ok(());
        }
        self.stop.store(false, Ordering::Release);
        for i in 0..num_threads {
            let rx = self.input_rx.clone();
            let output = Arc::clone(&self.output);
            let stop = Arc::clone(&self.stop);
            let handle = std::thread::Builder::new()
                .name(format!("stratum-worker-{i}"))
                .spawn(move || worker_main(&rx, &output, &stop))?;
            self.workers.push(handle);
        }
        debug!(workers = num_threads, "thread pool started");
        Ok(())
    }

    /// Number of live workers.
    #[inline]
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Runs the task's `pre` phase to completion on the calling thread,
    /// then queues it for a worker.
    pub fn add_task(&self, mut task: Box<dyn Task>) {
        while task.pre() == Progress::Pending {}
        // The channel doubles as input queue and counting semaphore: a
        // blocked worker wakes per message.
        if self.input_tx.send(WorkerMessage::Run(task)).is_err() {
            warn!("thread pool input channel closed; dropping task");
        }
    }

    /// Number of tasks whose `thread` phase has completed and whose `post`
    /// phase has not.
    #[must_use]
    pub fn queued_output(&self) -> usize {
        self.output.lock().len()
    }

    /// Drains output tasks, running `post` phases under the wall-clock
    /// budget. A task that exhausts the budget goes back to the front of
    /// the queue and resumes next call.
    pub fn run_post(&self) {
        let started = Instant::now();
        loop {
            let (task, queue_len) = {
                let mut output = self.output.lock();
                let queue_len = output.len();
                match output.pop_front() {
                    Some(task) => (task, queue_len),
                    None => break,
                }
            };
            let mut task = task;
            let excess = queue_len.saturating_sub(POST_BUDGET_FREE_QUEUE) as u32;
            let budget = POST_BUDGET_BASE + POST_BUDGET_PER_EXCESS * excess;

            let mut done = false;
            loop {
                match catch_unwind(AssertUnwindSafe(|| task.post())) {
                    Ok(Progress::Done) => {
                        done = true;
                        break;
                    }
                    Ok(Progress::Pending) => {}
                    Err(_) => {
                        // A panicking post is marked done so the queue can
                        // never wedge on one task.
                        warn!("task post phase panicked; dropping task");
                        done = true;
                        break;
                    }
                }
                if started.elapsed() >= budget {
                    break;
                }
            }

            if !done {
                self.output.lock().push_front(task);
                break;
            }
        }
    }

    /// Asks every worker to finish its current task and return.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
        for _ in 0..self.workers.len() {
            // Wake workers blocked on an empty input queue.
            let _ = self.input_tx.send(WorkerMessage::Stop);
        }
    }

    /// Waits for every worker to return. The pool may be restarted
    /// afterwards; tasks still in the input queue survive.
    pub fn join(&mut self) {
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("worker thread terminated by panic");
            }
        }
        // Discard stop sentinels left over when workers exited through the
        // flag instead; queued tasks are kept for a restart.
        let mut kept = Vec::new();
        while let Ok(message) = self.input_rx.try_recv() {
            if let WorkerMessage::Run(task) = message {
                kept.push(task);
            }
        }
        for task in kept {
            let _ = self.input_tx.send(WorkerMessage::Run(task));
        }
        self.stop.store(false, Ordering::Release);
        debug!("thread pool joined");
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.request_stop();
        self.join();
    }
}

fn worker_main(
    rx: &Receiver<WorkerMessage>,
    output: &Mutex<VecDeque<Box<dyn Task>>>,
    stop: &AtomicBool,
) {
    debug!("worker start");
    loop {
        if stop.load(Ordering::Acquire) {
            break;
        }
        match rx.recv() {
            Ok(WorkerMessage::Run(mut task)) => {
                let result = catch_unwind(AssertUnwindSafe(|| {
                    while task.thread() == Progress::Pending {}
                }));
                if result.is_err() {
                    warn!("task thread phase panicked");
                }
                // Completed tasks go to the back: post order follows thread
                // completion order.
                output.lock().push_back(task);
            }
            Ok(WorkerMessage::Stop) | Err(_) => break,
        }
    }
    debug!("worker exit");
}
