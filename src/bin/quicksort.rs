// Copyright (c) 2025 Spindle Contributors
//
// Demo / integration exerciser: a recursive quicksort over a random
// `u32` array, where each partition large enough to bother with is
// spawned as its own task. This is explicitly outside the scheduler's
// public contract — it exists to give the scheduler something
// recursive and CPU-bound to chew on.

use rand::Rng;

use spindle_rt::{Scheduler, SchedulerConfig};

/// Below this many elements, sort serially instead of spawning more tasks.
/// Keeps the task count reasonable for large inputs.
const CUTOFF: usize = 4096;

struct SendPtr(*mut u32);

// Safety: each `SendPtr` is handed to exactly one partition task, and
// disjoint partitions never alias the same elements, so concurrent access
// across tasks never touches the same memory.
unsafe impl Send for SendPtr {}

struct Partition {
    scheduler: Scheduler,
    data: SendPtr,
    len: usize,
}

fn partition_task(args: &mut Partition) {
    let slice = unsafe { std::slice::from_raw_parts_mut(args.data.0, args.len) };

    if slice.len() <= CUTOFF {
        slice.sort_unstable();
        return;
    }

    let pivot_index = partition(slice);
    let left_len = pivot_index;
    let right_len = slice.len() - pivot_index - 1;
    let left_ptr = args.data.0;
    // Safety: `pivot_index + 1` is within bounds of the original
    // allocation since `pivot_index < slice.len()`.
    let right_ptr = unsafe { args.data.0.add(pivot_index + 1) };

    if left_len > 0 {
        args.scheduler.spawn(
            Partition {
                scheduler: args.scheduler.clone(),
                data: SendPtr(left_ptr),
                len: left_len,
            },
            partition_task,
            |_| {},
        );
    }
    if right_len > 0 {
        args.scheduler.spawn(
            Partition {
                scheduler: args.scheduler.clone(),
                data: SendPtr(right_ptr),
                len: right_len,
            },
            partition_task,
            |_| {},
        );
    }
}

/// Lomuto partition with a randomly chosen pivot. Returns the pivot's
/// final index.
fn partition(slice: &mut [u32]) -> usize {
    let mut rng = rand::rng();
    let pivot_index = rng.random_range(0..slice.len());
    let last = slice.len() - 1;
    slice.swap(pivot_index, last);
    let pivot = slice[last];

    let mut store = 0;
    for i in 0..last {
        if slice[i] < pivot {
            slice.swap(i, store);
            store += 1;
        }
    }
    slice.swap(store, last);
    store
}

fn main() -> spindle_rt::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .init();

    let mut argv = std::env::args().skip(1);
    let nelem: usize = argv
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1_000_000);
    let worker_count: usize = argv
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(num_cpus::get);

    let mut data: Vec<u32> = {
        let mut rng = rand::rng();
        let bound = (nelem as u32).max(1);
        (0..nelem).map(|_| rng.random_range(0..bound)).collect()
    };

    let scheduler = Scheduler::new(SchedulerConfig {
        worker_count,
        initial_deque_capacity: 8,
        scan_seed: None,
    })?;

    let len = data.len();
    scheduler.spawn(
        Partition {
            scheduler: scheduler.clone(),
            data: SendPtr(data.as_mut_ptr()),
            len,
        },
        partition_task,
        |_| {},
    );

    scheduler.run()?;
    scheduler.exit()?;

    assert!(
        data.windows(2).all(|w| w[0] <= w[1]),
        "quicksort produced an unsorted array"
    );
    println!(
        "sorted {nelem} elements across {worker_count} workers (spindle {})",
        spindle_rt::VERSION
    );

    Ok(())
}
