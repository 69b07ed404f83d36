// Copyright (c) 2025 Spindle Contributors
//
// The embeddable scheduler: a fixed pool of workers sharing `nr_threads`
// deques, a process-wide active-task counter, and a shutdown flag. The
// scheduler itself is cheap to clone (it is an `Arc` handle) so task
// closures can carry one to recursively spawn more work.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backoff::Backoff;
use crate::config::SchedulerConfig;
use crate::deque::Deque;
use crate::error::{Result, SchedulerError};
use crate::registry::TaskRegistry;
use crate::task::{make_runnable, Task};
use crate::worker::{self, WorkerStats};

thread_local! {
    /// Set by each worker when it starts. A spawn performed before any
    /// worker has started (from the thread that built the `Scheduler`)
    /// uses the default, tid 0, as specified.
    pub(crate) static CURRENT_TID: Cell<usize> = const { Cell::new(0) };
}

pub(crate) struct Inner {
    pub(crate) deques: Box<[Deque]>,
    registry: TaskRegistry,
    pub(crate) active: AtomicUsize,
    pub(crate) shutdown: AtomicBool,
    pub(crate) worker_count: usize,
    pub(crate) scan_seed: Option<u64>,
    threads: Mutex<Vec<std::thread::JoinHandle<WorkerStats>>>,
    started: AtomicBool,
    exited: AtomicBool,
}

/// A fixed-size pool of worker threads sharing a Chase-Lev deque per
/// worker. Cloning a `Scheduler` is cheap and yields a handle to the same
/// pool — this is how a running task reaches back into the scheduler to
/// spawn children.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// Builds a scheduler with `nr_threads` deques and allocates its
    /// internal state. Does not start any worker thread — call
    /// [`Scheduler::run`] for that.
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        config.validate()?;

        let worker_count = config.worker_count;
        let deques = (0..worker_count)
            .map(|_| Deque::new(worker_count, config.initial_deque_capacity))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            inner: Arc::new(Inner {
                deques,
                registry: TaskRegistry::new(),
                active: AtomicUsize::new(0),
                shutdown: AtomicBool::new(false),
                worker_count,
                scan_seed: config.scan_seed,
                threads: Mutex::new(Vec::new()),
                started: AtomicBool::new(false),
                exited: AtomicBool::new(false),
            }),
        })
    }

    /// Number of worker threads this scheduler was built with.
    pub fn worker_count(&self) -> usize {
        self.inner.worker_count
    }

    /// Number of spawned-but-not-yet-completed tasks. Racy by
    /// construction — useful for diagnostics, not for synchronization.
    pub fn active_count(&self) -> usize {
        self.inner.active.load(Ordering::Relaxed)
    }

    /// Constructs a Work Record from `args`/`code`/`dtor`, links it into
    /// the registry, increments the active count, then pushes it onto
    /// the calling thread's deque.
    ///
    /// Safe to call from the thread that built this `Scheduler` before
    /// [`Scheduler::run`], and from inside any task running on a worker
    /// after `run`. Calling it from an unrelated external thread after
    /// `run` is not supported: it will push onto deque 0 by convention
    /// but that is not a meaningful place to land work from outside the
    /// pool.
    pub fn spawn<A, C, D>(&self, args: A, code: C, dtor: D)
    where
        A: Send + 'static,
        C: FnOnce(&mut A) + Send + 'static,
        D: FnOnce(A) + Send + 'static,
    {
        let runnable = make_runnable(args, code, dtor);
        let task_ptr: *mut Task = Box::into_raw(Box::new(Task::new(runnable)));

        self.inner.registry.insert(task_ptr);

        // Active must be incremented before the task becomes observable
        // to any stealer, or a stealer could run the task and decrement
        // active to zero before this increment is visible, which would
        // let `exit` return while a task is still mid-flight.
        self.inner.active.fetch_add(1, Ordering::Relaxed);

        let tid = CURRENT_TID.with(Cell::get);
        self.inner.deques[tid].push(tid, task_ptr);
    }

    /// Starts the worker pool. Returns immediately; workers run until
    /// [`Scheduler::exit`] observes a globally idle pool.
    pub fn run(&self) -> Result<()> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::InvalidState(
                "run() called more than once",
            ));
        }

        tracing::info!(worker_count = self.inner.worker_count, "starting worker pool");

        let mut handles = Vec::with_capacity(self.inner.worker_count);
        for tid in 0..self.inner.worker_count {
            let inner = Arc::clone(&self.inner);
            let spawned = std::thread::Builder::new()
                .name(format!("spindle-worker-{tid}"))
                .spawn(move || worker::run(inner, tid));

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(source) => {
                    // Roll back: tell already-started workers to wind
                    // down and join them before surfacing the error.
                    self.inner.shutdown.store(true, Ordering::SeqCst);
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(SchedulerError::ThreadSpawn { tid, source });
                }
            }
        }

        *self.inner.threads.lock() = handles;
        Ok(())
    }

    /// Blocks until every spawned task has completed, joins the worker
    /// threads, and frees all scheduler-owned memory. Must be called
    /// exactly once, after [`Scheduler::run`].
    pub fn exit(&self) -> Result<()> {
        if !self.inner.started.load(Ordering::SeqCst) {
            return Err(SchedulerError::InvalidState(
                "exit() called before run()",
            ));
        }
        if self.inner.exited.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::InvalidState(
                "exit() called more than once",
            ));
        }

        let mut backoff = Backoff::new();
        while self.inner.active.load(Ordering::Relaxed) != 0 {
            backoff.snooze();
        }
        self.inner.shutdown.store(true, Ordering::SeqCst);

        let handles = std::mem::take(&mut *self.inner.threads.lock());
        let mut total_executed = 0u64;
        for handle in handles {
            if let Ok(stats) = handle.join() {
                total_executed += stats.executed;
            }
        }

        tracing::info!(total_executed, "worker pool shut down");

        // Safety: every worker has joined, so no task pointer is
        // reachable from any deque anymore.
        unsafe { self.inner.registry.free_all() };

        Ok(())
    }
}
