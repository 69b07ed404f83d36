// Copyright (c) 2025 Spindle Contributors
//
// The take/steal loop. Each worker prefers its own deque (LIFO) and only
// falls back to stealing from peers (FIFO) when it finds its own empty.
// There is deliberately no back-off between failed steals: the scan
// across peers already spaces out retries against any one victim, and a
// worker that finds everyone empty simply checks the shutdown flag and
// loops again.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::array::Handle;
use crate::deque::{Pop, Steal};
use crate::scheduler::{Inner, CURRENT_TID};

pub(crate) struct WorkerStats {
    pub(crate) tid: usize,
    pub(crate) executed: u64,
}

pub(crate) fn run(inner: Arc<Inner>, tid: usize) -> WorkerStats {
    CURRENT_TID.with(|cell| cell.set(tid));

    let start = scan_start(inner.scan_seed, tid, inner.worker_count);

    let mut executed = 0u64;
    'main: loop {
        if let Pop::Success(handle) = inner.deques[tid].take(tid) {
            run_task(&inner, handle);
            executed += 1;
            continue 'main;
        }

        let mut offset = 0;
        while offset < inner.worker_count {
            let i = (start + offset) % inner.worker_count;
            if i == tid {
                offset += 1;
                continue;
            }
            match inner.deques[i].steal(tid) {
                Steal::Abort => continue, // retry the same victim, no back-off
                Steal::Empty => {
                    offset += 1;
                    continue;
                }
                Steal::Success(handle) => {
                    run_task(&inner, handle);
                    executed += 1;
                    continue 'main;
                }
            }
        }

        if inner.shutdown.load(Ordering::SeqCst) {
            break;
        }
    }

    tracing::debug!(tid, executed, "worker exiting");
    WorkerStats { tid, executed }
}

/// Natural index order (start at 0) when no seed is configured. With a
/// seed, each worker gets a fixed, decorrelated starting offset into its
/// victim scan so the whole pool doesn't converge on victim 0 first.
/// A splitmix64-style mix keeps nearby `(seed, tid)` pairs from producing
/// correlated starting points.
fn scan_start(scan_seed: Option<u64>, tid: usize, worker_count: usize) -> usize {
    let seed = match scan_seed {
        None => return 0,
        Some(seed) => seed,
    };

    let mut x = seed
        .wrapping_add(tid as u64)
        .wrapping_add(0x9E3779B97F4A7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D049BB133111EB);
    x ^= x >> 31;
    (x as usize) % worker_count
}

fn run_task(inner: &Inner, handle: Handle) {
    // Safety: `handle` was just won off a deque via `take`/`steal`, which
    // guarantees exclusive hand-off — no other worker holds this pointer.
    let task = unsafe { &*handle };
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| unsafe { task.run() }));
    if let Err(payload) = outcome {
        let message = payload
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
            .unwrap_or("non-string panic payload");
        tracing::error!(message, "task panicked; containing and continuing");
    }
    inner.active.fetch_sub(1, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_seed_starts_at_zero() {
        assert_eq!(scan_start(None, 3, 8), 0);
    }

    #[test]
    fn seeded_start_is_in_range_and_deterministic() {
        for tid in 0..8 {
            let start = scan_start(Some(7), tid, 8);
            assert!(start < 8);
            assert_eq!(start, scan_start(Some(7), tid, 8));
        }
    }

    #[test]
    fn different_tids_usually_get_different_starts() {
        let starts: Vec<usize> = (0..8).map(|tid| scan_start(Some(7), tid, 8)).collect();
        let distinct = starts.iter().collect::<std::collections::HashSet<_>>().len();
        assert!(distinct > 1, "seed produced the same start for every worker");
    }
}
