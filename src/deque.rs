// Copyright (c) 2025 Spindle Contributors
//
// The Chase-Lev single-owner / many-stealer deque. One worker (the
// "owner") pushes and takes from `bottom`; every other worker may steal
// from `top`. See "Dynamic Circular Work-Stealing Deque" (Chase & Lev,
// 2005) for the base protocol; the hazard-handle scheme on top of it is
// this scheduler's bounded-memory answer to "who frees the array after a
// resize" (the owner can't just free it — a stealer may still be reading
// it).
//
// `top`/`bottom` start at 1, not 0, so that `take`'s `bottom - 1` can
// never underflow an empty, freshly constructed deque.

use std::ptr;
use std::sync::atomic::{fence, AtomicPtr, AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

use crate::array::{AtomicArray, Handle};

const STARTING_INDEX: usize = 1;

/// Outcome of `Deque::take`.
pub(crate) enum Pop {
    Success(Handle),
    Empty,
}

/// Outcome of `Deque::steal`.
pub(crate) enum Steal {
    Success(Handle),
    Empty,
    /// Lost the race on `top` to another stealer or to the owner draining
    /// the last element. The caller must retry against the same victim.
    Abort,
}

pub(crate) struct Deque {
    bottom: CachePadded<AtomicUsize>,
    top: CachePadded<AtomicUsize>,
    array: AtomicPtr<AtomicArray>,
    /// At most one retired array pending reclamation at a time.
    old_array: AtomicPtr<AtomicArray>,
    /// `handles[tid]` publishes the array worker `tid` is currently
    /// touching, so a GC pass knows it is not yet safe to free.
    handles: Box<[AtomicPtr<AtomicArray>]>,
}

impl Deque {
    pub(crate) fn new(nr_threads: usize, initial_capacity: usize) -> Self {
        debug_assert!(initial_capacity.is_power_of_two());
        let array = Box::into_raw(Box::new(AtomicArray::new(initial_capacity)));
        let handles = (0..nr_threads)
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            bottom: CachePadded::new(AtomicUsize::new(STARTING_INDEX)),
            top: CachePadded::new(AtomicUsize::new(STARTING_INDEX)),
            array: AtomicPtr::new(array),
            old_array: AtomicPtr::new(ptr::null_mut()),
            handles,
        }
    }

    /// Called only by the owner.
    pub(crate) fn push(&self, tid: usize, handle: Handle) {
        let b = self.bottom.load(Ordering::Relaxed);
        let t = self.top.load(Ordering::Acquire);
        let mut array_ptr = self.array.load(Ordering::Relaxed);
        let mut array = unsafe { &*array_ptr };

        if b.wrapping_sub(t) > array.size() - 1 {
            self.resize(tid, b, t);
            array_ptr = self.array.load(Ordering::Relaxed);
            array = unsafe { &*array_ptr };
        }

        array.put(b, handle);
        fence(Ordering::Release);
        self.bottom.store(b.wrapping_add(1), Ordering::Relaxed);

        self.garbage_collect(tid, array_ptr);
    }

    /// Called only by the owner.
    pub(crate) fn take(&self, tid: usize) -> Pop {
        let b = self.bottom.load(Ordering::Relaxed).wrapping_sub(1);
        self.bottom.store(b, Ordering::Relaxed);
        fence(Ordering::SeqCst);
        let t = self.top.load(Ordering::Relaxed);
        let array_ptr = self.array.load(Ordering::Relaxed);

        if t > b {
            // Empty: restore bottom and bail.
            self.bottom.store(b.wrapping_add(1), Ordering::Relaxed);
            self.garbage_collect(tid, array_ptr);
            return Pop::Empty;
        }

        let array = unsafe { &*array_ptr };
        let x = array.get(b);

        if t < b {
            self.garbage_collect(tid, array_ptr);
            return Pop::Success(x);
        }

        // t == b: the last element. Race the stealers for it.
        let won = self
            .top
            .compare_exchange(t, t.wrapping_add(1), Ordering::SeqCst, Ordering::Relaxed)
            .is_ok();
        self.bottom.store(b.wrapping_add(1), Ordering::Relaxed);
        self.garbage_collect(tid, array_ptr);

        if won {
            Pop::Success(x)
        } else {
            Pop::Empty
        }
    }

    /// Called by any worker other than the owner.
    pub(crate) fn steal(&self, tid: usize) -> Steal {
        let t = self.top.load(Ordering::Acquire);
        fence(Ordering::SeqCst);
        let b = self.bottom.load(Ordering::Acquire);

        if t >= b {
            let array_ptr = self.array.load(Ordering::Acquire);
            self.garbage_collect(tid, array_ptr);
            return Steal::Empty;
        }

        let array_ptr = self.array.load(Ordering::Acquire);
        let array = unsafe { &*array_ptr };
        let x = array.get(t);

        let won = self
            .top
            .compare_exchange(t, t.wrapping_add(1), Ordering::SeqCst, Ordering::Relaxed)
            .is_ok();
        self.garbage_collect(tid, array_ptr);

        if won {
            Steal::Success(x)
        } else {
            Steal::Abort
        }
    }

    /// Approximate size, for diagnostics/tests only — racy against
    /// concurrent stealers.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        let b = self.bottom.load(Ordering::Relaxed);
        let t = self.top.load(Ordering::Relaxed);
        b.wrapping_sub(t)
    }

    /// Doubles the backing array, copying the live `[top, bottom)`
    /// window, and retires the old one. Called only by the owner, from
    /// inside `push`.
    fn resize(&self, tid: usize, bottom: usize, top: usize) {
        let old_ptr = self.array.load(Ordering::Relaxed);
        let old = unsafe { &*old_ptr };
        let grown = old.grow(top, bottom);
        let old_size = old.size();
        let new_size = grown.size();
        let new_ptr = Box::into_raw(Box::new(grown));

        fence(Ordering::SeqCst);
        self.array.store(new_ptr, Ordering::Relaxed);

        tracing::debug!(tid, old_size, new_size, "deque resized");

        let result =
            self.old_array
                .compare_exchange(ptr::null_mut(), old_ptr, Ordering::Relaxed, Ordering::Relaxed);
        assert!(
            result.is_ok(),
            "at most one retired array may be pending reclamation at a time"
        );
    }

    /// Publishes the array this worker is about to touch, then tries to
    /// reclaim whatever is sitting in `old_array`.
    fn garbage_collect(&self, tid: usize, observed: *mut AtomicArray) {
        self.handles[tid].store(observed, Ordering::Relaxed);
        fence(Ordering::SeqCst);

        let retired = self.old_array.load(Ordering::Relaxed);
        if retired.is_null() {
            return;
        }

        if self
            .old_array
            .compare_exchange(retired, ptr::null_mut(), Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            // Someone else already claimed it.
            return;
        }

        let still_observed = self
            .handles
            .iter()
            .any(|h| h.load(Ordering::Relaxed) == retired);

        if still_observed {
            let result = self.old_array.compare_exchange(
                ptr::null_mut(),
                retired,
                Ordering::Relaxed,
                Ordering::Relaxed,
            );
            assert!(
                result.is_ok(),
                "we hold exclusive ownership of `retired`, the slot must still be empty"
            );
        } else {
            // Safety: we won the CAS above, so we are the sole owner of
            // this pointer, and no handle references it.
            unsafe { drop(Box::from_raw(retired)) };
        }
    }
}

impl Drop for Deque {
    fn drop(&mut self) {
        let current = self.array.load(Ordering::Relaxed);
        if !current.is_null() {
            unsafe { drop(Box::from_raw(current)) };
        }
        let old = self.old_array.load(Ordering::Relaxed);
        if !old.is_null() {
            unsafe { drop(Box::from_raw(old)) };
        }
    }
}

// Safety: all shared state is either atomic or protected by the
// take/steal protocol above.
unsafe impl Send for Deque {}
unsafe impl Sync for Deque {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{make_runnable, Task};

    fn dummy_task() -> *mut Task {
        let runnable = make_runnable((), |_: &mut ()| {}, |_: ()| {});
        Box::into_raw(Box::new(Task::new(runnable)))
    }

    unsafe fn free(handle: Handle) {
        drop(Box::from_raw(handle));
    }

    #[test]
    fn push_then_take_is_lifo() {
        let deque = Deque::new(1, 4);
        let handles: Vec<_> = (0..3).map(|_| dummy_task()).collect();
        for h in &handles {
            deque.push(0, *h);
        }

        match deque.take(0) {
            Pop::Success(h) => assert_eq!(h, handles[2]),
            Pop::Empty => panic!("expected a task"),
        }
        match deque.take(0) {
            Pop::Success(h) => assert_eq!(h, handles[1]),
            Pop::Empty => panic!("expected a task"),
        }
        match deque.take(0) {
            Pop::Success(h) => assert_eq!(h, handles[0]),
            Pop::Empty => panic!("expected a task"),
        }
        assert!(matches!(deque.take(0), Pop::Empty));

        unsafe {
            for h in handles {
                free(h);
            }
        }
    }

    #[test]
    fn steal_is_fifo() {
        let deque = Deque::new(2, 4);
        let handles: Vec<_> = (0..3).map(|_| dummy_task()).collect();
        for h in &handles {
            deque.push(0, *h);
        }

        match deque.steal(1) {
            Steal::Success(h) => assert_eq!(h, handles[0]),
            other => panic!("expected success, not {}", matches_label(&other)),
        }

        unsafe {
            for h in handles {
                free(h);
            }
        }
    }

    fn matches_label(s: &Steal) -> &'static str {
        match s {
            Steal::Success(_) => "success",
            Steal::Empty => "empty",
            Steal::Abort => "abort",
        }
    }

    #[test]
    fn grows_past_initial_capacity() {
        let deque = Deque::new(1, 2);
        let handles: Vec<_> = (0..10).map(|_| dummy_task()).collect();
        for h in &handles {
            deque.push(0, *h);
        }
        assert_eq!(deque.len(), 10);

        let mut popped = Vec::new();
        loop {
            match deque.take(0) {
                Pop::Success(h) => popped.push(h),
                Pop::Empty => break,
            }
        }
        assert_eq!(popped.len(), 10);

        unsafe {
            for h in handles {
                free(h);
            }
        }
    }

    #[test]
    fn empty_deque_take_does_not_underflow() {
        let deque = Deque::new(1, 2);
        assert!(matches!(deque.take(0), Pop::Empty));
        assert!(matches!(deque.take(0), Pop::Empty));
    }

    /// Bounded storage: the current array plus at most one pending retired
    /// array must never together exceed 4x the largest live window ever
    /// held (doubling headroom on the current array, plus one full
    /// previous-generation array awaiting reclamation).
    #[test]
    fn bounded_storage_after_growth() {
        let deque = Deque::new(1, 2);
        let handles: Vec<_> = (0..37).map(|_| dummy_task()).collect();
        let mut max_live = 0usize;
        for (i, h) in handles.iter().enumerate() {
            deque.push(0, *h);
            max_live = max_live.max(i + 1);
        }

        let current_size = unsafe { (*deque.array.load(Ordering::Relaxed)).size() };
        let old_ptr = deque.old_array.load(Ordering::Relaxed);
        let old_size = if old_ptr.is_null() {
            0
        } else {
            unsafe { (*old_ptr).size() }
        };

        assert!(
            current_size + old_size <= 4 * max_live,
            "current {current_size} + old {old_size} exceeds 4x live max {max_live}"
        );

        let mut drained = 0;
        while let Pop::Success(h) = deque.take(0) {
            unsafe { free(h) };
            drained += 1;
        }
        assert_eq!(drained, handles.len());
    }

    /// Linearization of top: across concurrent stealers, the set of values
    /// won via the CAS on `top` is exactly the contiguous run starting at
    /// `STARTING_INDEX`, with no gaps and no repeats — i.e. the sequence of
    /// values written to `top` is strictly increasing and contiguous.
    #[test]
    fn top_is_claimed_contiguously_under_concurrent_steals() {
        use std::sync::{Arc, Mutex};
        use std::thread;

        let n = 500;
        let deque = Arc::new(Deque::new(4, 8));
        let handles: Vec<_> = (0..n).map(|_| dummy_task()).collect();
        for h in &handles {
            deque.push(0, *h);
        }

        let claimed = Arc::new(Mutex::new(Vec::new()));
        let workers: Vec<_> = (1..4usize)
            .map(|_tid| {
                let deque = Arc::clone(&deque);
                let claimed = Arc::clone(&claimed);
                thread::spawn(move || loop {
                    let t = deque.top.load(Ordering::Acquire);
                    fence(Ordering::SeqCst);
                    let b = deque.bottom.load(Ordering::Acquire);
                    if t >= b {
                        break;
                    }
                    let won = deque
                        .top
                        .compare_exchange(t, t.wrapping_add(1), Ordering::SeqCst, Ordering::Relaxed)
                        .is_ok();
                    if won {
                        claimed.lock().unwrap().push(t);
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        let mut values = Arc::try_unwrap(claimed).unwrap().into_inner().unwrap();
        values.sort_unstable();

        assert_eq!(values.len(), n, "expected every slot claimed exactly once");
        assert_eq!(values.first().copied(), Some(STARTING_INDEX));
        for w in values.windows(2) {
            assert_eq!(w[1], w[0] + 1, "top was not claimed contiguously: {values:?}");
        }

        unsafe {
            for h in handles {
                free(h);
            }
        }
    }
}
