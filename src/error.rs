// Copyright (c) 2025 Spindle Contributors
//
// Error taxonomy for the scheduler. Allocation failure is handled by
// Rust's global allocator (abort), not surfaced here; everything the
// scheduler itself can reject up front gets a variant.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, SchedulerError>;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("invalid scheduler configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to spawn worker thread {tid}: {source}")]
    ThreadSpawn { tid: usize, source: std::io::Error },

    #[error("invalid scheduler state: {0}")]
    InvalidState(&'static str),
}
