// Copyright (c) 2025 Spindle Contributors
//
// A Work Record (here: `Task`) is born in `Scheduler::spawn`, becomes
// observable once pushed onto a deque, executes exactly once, and is
// freed only when the whole scheduler tears down. The boxed closures that
// make up its `code`/`dtor` pair are consumed the moment the task runs;
// the `Task` shell itself outlives that so a future join API has
// something stable to point at (see `join_count`).

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// The part of a Work Record that is generic over the task's argument
/// type. Type-erased behind `Box<dyn Runnable>` so a single deque can
/// carry tasks with unrelated argument types.
pub(crate) trait Runnable: Send {
    /// Runs `code` then `dtor`, in that order, consuming the closures and
    /// the captured `args`.
    fn run(self: Box<Self>);
}

struct WorkRecord<A, C, D>
where
    C: FnOnce(&mut A) + Send,
    D: FnOnce(A) + Send,
{
    code: C,
    dtor: D,
    args: A,
}

impl<A, C, D> Runnable for WorkRecord<A, C, D>
where
    A: Send,
    C: FnOnce(&mut A) + Send,
    D: FnOnce(A) + Send,
{
    fn run(self: Box<Self>) {
        let WorkRecord {
            code,
            dtor,
            mut args,
        } = *self;
        code(&mut args);
        dtor(args);
    }
}

/// Construct the type-erased `Runnable` for a spawned task.
pub(crate) fn make_runnable<A, C, D>(args: A, code: C, dtor: D) -> Box<dyn Runnable>
where
    A: Send + 'static,
    C: FnOnce(&mut A) + Send + 'static,
    D: FnOnce(A) + Send + 'static,
{
    Box::new(WorkRecord { code, dtor, args })
}

/// The scheduler's internal representation of a spawned task: a Work
/// Record shell. `runnable` is taken exactly once by the worker that wins
/// it off a deque; `join_count` is reserved for a future join API and is
/// not read by the baseline take/steal protocol.
pub(crate) struct Task {
    runnable: UnsafeCell<Option<Box<dyn Runnable>>>,
    #[allow(dead_code)] // reserved for a future join API; not read by the baseline take/steal protocol
    join_count: AtomicUsize,
    executed: AtomicBool,
}

// Safety: `runnable` is written once at construction (single-threaded,
// by the spawner) and taken exactly once by whichever worker wins this
// task off a deque — the take/steal protocol guarantees that hand-off is
// exclusive, so no two threads ever touch the `UnsafeCell` concurrently.
unsafe impl Sync for Task {}

impl Task {
    pub(crate) fn new(runnable: Box<dyn Runnable>) -> Self {
        Self {
            runnable: UnsafeCell::new(Some(runnable)),
            join_count: AtomicUsize::new(0),
            executed: AtomicBool::new(false),
        }
    }

    /// Runs this task's code then dtor. Must be called at most once, by
    /// the single worker that won this task off a deque.
    ///
    /// # Safety
    /// The caller must guarantee exclusive access, i.e. this `Task` must
    /// have come out of exactly one successful `take`/`steal`.
    pub(crate) unsafe fn run(&self) {
        let runnable = (*self.runnable.get())
            .take()
            .expect("Task::run called more than once");
        runnable.run();
        self.executed.store(true, Ordering::Relaxed);
    }

    #[cfg(test)]
    pub(crate) fn has_executed(&self) -> bool {
        self.executed.load(Ordering::Relaxed)
    }
}
