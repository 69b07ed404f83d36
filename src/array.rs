// Copyright (c) 2025 Spindle Contributors
//
// Fixed-capacity ring buffer of task handles. Capacity is always a power
// of two so indices can be masked instead of reduced with `%`. The array
// has no notion of which slots are "live" — that window is tracked by the
// deque's top/bottom indices.

use std::sync::atomic::{AtomicPtr, Ordering};

use crate::task::Task;

/// One slot's worth of payload: a raw pointer to a `Task` shell, or null
/// for a slot that has never been written (never observed as such by a
/// correct caller, since validity comes from the top/bottom window).
pub(crate) type Handle = *mut Task;

pub(crate) struct AtomicArray {
    size: usize,
    buffer: Box<[AtomicPtr<Task>]>,
}

impl AtomicArray {
    /// Allocate a new array. `size` must be a power of two.
    pub(crate) fn new(size: usize) -> Self {
        debug_assert!(size.is_power_of_two(), "AtomicArray size must be a power of two");
        let buffer = (0..size)
            .map(|_| AtomicPtr::new(std::ptr::null_mut()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { size, buffer }
    }

    #[inline]
    pub(crate) fn size(&self) -> usize {
        self.size
    }

    #[inline]
    fn slot(&self, index: usize) -> &AtomicPtr<Task> {
        &self.buffer[index & (self.size - 1)]
    }

    /// Relaxed read of the handle stored at `index`.
    #[inline]
    pub(crate) fn get(&self, index: usize) -> Handle {
        self.slot(index).load(Ordering::Relaxed)
    }

    /// Relaxed write of `handle` at `index`. Only the owner ever calls this.
    #[inline]
    pub(crate) fn put(&self, index: usize, handle: Handle) {
        self.slot(index).store(handle, Ordering::Relaxed);
    }

    /// Allocate a new array of double the capacity and copy the live
    /// window `[top, bottom)` into it. Called only by the owner.
    pub(crate) fn grow(&self, top: usize, bottom: usize) -> AtomicArray {
        let grown = AtomicArray::new(self.size * 2);
        let mut i = top;
        while i != bottom {
            grown.put(i, self.get(i));
            i = i.wrapping_add(1);
        }
        grown
    }
}
