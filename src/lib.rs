// Copyright (c) 2025 Spindle Contributors
//
// Spindle is a user-space work-stealing task scheduler: a fixed pool of
// worker threads, each owning a lock-free Chase-Lev deque, stealing from
// one another when their own queue runs dry. Tasks are fine-grained and
// may recursively spawn more tasks from within a worker — the intended
// workload is something like a multithreaded quicksort, spawning one
// task per partition.
//
// What this crate is not: a priority scheduler, a cross-process work
// queue, or anything with task cancellation or persistence. A task runs
// to completion once a worker picks it up.

mod array;
mod backoff;
mod config;
mod deque;
mod error;
mod registry;
mod scheduler;
mod task;
mod worker;

pub use config::SchedulerConfig;
pub use error::{Result, SchedulerError};
pub use scheduler::Scheduler;

/// Crate version, mirrored from `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
