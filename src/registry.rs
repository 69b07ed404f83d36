// Copyright (c) 2025 Spindle Contributors
//
// Process-wide list of live Work Records. Touched only on spawn (insert)
// and on `Scheduler::exit` (bulk free) — nothing on the take/steal hot
// path ever looks at this. A single mutex guarding an owning `Vec` of raw
// pointers is enough for bulk cleanup at shutdown.

use parking_lot::Mutex;

use crate::task::Task;

pub(crate) struct TaskRegistry {
    tasks: Mutex<Vec<*mut Task>>,
}

// Safety: the raw pointers stored here are only ever dereferenced by
// `free_all`, which runs once during shutdown after every worker has
// joined, so there is no concurrent access to worry about.
unsafe impl Send for TaskRegistry {}
unsafe impl Sync for TaskRegistry {}

impl TaskRegistry {
    pub(crate) fn new() -> Self {
        Self {
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Links a freshly allocated task shell into the registry.
    pub(crate) fn insert(&self, task: *mut Task) {
        self.tasks.lock().push(task);
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Frees every registered task shell.
    ///
    /// # Safety
    /// Must only be called once, after every worker thread has joined, so
    /// that no task pointer is still reachable from a deque.
    pub(crate) unsafe fn free_all(&self) {
        let mut tasks = self.tasks.lock();
        for ptr in tasks.drain(..) {
            drop(Box::from_raw(ptr));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::make_runnable;

    #[test]
    fn tracks_inserted_tasks() {
        let registry = TaskRegistry::new();
        for _ in 0..4 {
            let runnable = make_runnable((), |_: &mut ()| {}, |_: ()| {});
            let task = Box::into_raw(Box::new(Task::new(runnable)));
            registry.insert(task);
        }
        assert_eq!(registry.len(), 4);
        unsafe { registry.free_all() };
        assert_eq!(registry.len(), 0);
    }
}
