//! Single-writer task executor.
//!
//! All mutating persistence operations run one-at-a-time on a dedicated
//! worker thread, in submission order. Correctness of the write path relies
//! on this serialisation alone; no operation takes a lock across a
//! suspension point.
//!
//! The executor starts in **buffering** mode: tasks submitted before the
//! log has been loaded are parked in a side queue and released, still in
//! order, by [`Executor::process_buffer`] once the load completes.

use crate::error::{CoreError, CoreResult};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

type Task = Box<dyn FnOnce() + Send>;

/// Completion handle for a submitted task.
pub struct TaskHandle {
    done: Receiver<CoreResult<()>>,
}

impl TaskHandle {
    /// Blocks until the task completes, returning its outcome.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ExecutorStopped`] if the executor shut down
    /// before the task ran.
    pub fn wait(self) -> CoreResult<()> {
        self.done.recv().unwrap_or(Err(CoreError::ExecutorStopped))
    }
}

/// FIFO single-writer executor with a pre-load buffer.
pub struct Executor {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

struct Shared {
    queue: Mutex<Queue>,
    ready: Condvar,
}

#[derive(Default)]
struct Queue {
    tasks: VecDeque<Task>,
    buffered: VecDeque<Task>,
    buffering: bool,
    shutdown: bool,
}

impl Executor {
    /// Starts the executor in buffering mode.
    #[must_use]
    pub fn new() -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                buffering: true,
                ..Queue::default()
            }),
            ready: Condvar::new(),
        });
        let worker = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || Self::run(&shared))
        };
        Self {
            shared,
            worker: Mutex::new(Some(worker)),
        }
    }

    fn run(shared: &Shared) {
        loop {
            let task = {
                let mut queue = shared.queue.lock();
                loop {
                    if queue.shutdown {
                        return;
                    }
                    if let Some(task) = queue.tasks.pop_front() {
                        break task;
                    }
                    shared.ready.wait(&mut queue);
                }
            };
            // Run outside the lock so submitters never block on a task.
            task();
        }
    }

    /// Submits a task for serialised execution.
    ///
    /// While the executor is buffering, the task is parked until
    /// [`Executor::process_buffer`] releases it.
    pub fn submit<F>(&self, task: F) -> TaskHandle
    where
        F: FnOnce() -> CoreResult<()> + Send + 'static,
    {
        let (sender, done) = channel();
        let boxed: Task = Box::new(move || {
            let _ = sender.send(task());
        });

        let mut queue = self.shared.queue.lock();
        if queue.buffering {
            queue.buffered.push_back(boxed);
        } else {
            queue.tasks.push_back(boxed);
            self.shared.ready.notify_one();
        }
        TaskHandle { done }
    }

    /// Releases tasks buffered before the load completed, in submission
    /// order, and stops buffering new submissions.
    pub fn process_buffer(&self) {
        let mut queue = self.shared.queue.lock();
        queue.buffering = false;
        let buffered = std::mem::take(&mut queue.buffered);
        queue.tasks.extend(buffered);
        self.shared.ready.notify_one();
    }

    /// True while tasks are still being parked in the pre-load buffer.
    #[must_use]
    pub fn is_buffering(&self) -> bool {
        self.shared.queue.lock().buffering
    }

    /// Stops the worker after the task it is currently running.
    ///
    /// Pending and buffered tasks are discarded; their handles resolve to
    /// [`CoreError::ExecutorStopped`].
    pub fn shutdown(&self) {
        {
            let mut queue = self.shared.queue.lock();
            queue.shutdown = true;
            queue.tasks.clear();
            queue.buffered.clear();
        }
        self.shared.ready.notify_all();
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("buffering", &self.is_buffering())
            .finish_non_exhaustive()
    }
}
