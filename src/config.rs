// Copyright (c) 2025 Spindle Contributors

use crate::error::{Result, SchedulerError};

/// Tunables for a [`crate::Scheduler`]. There is no file format for this —
/// the scheduler reads no environment input beyond what the embedding
/// program passes in here.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Number of worker threads. Defaults to the host's available
    /// parallelism.
    pub worker_count: usize,
    /// Initial capacity of each worker's deque. Must be a power of two.
    pub initial_deque_capacity: usize,
    /// Optional seed controlling each worker's starting point in its
    /// victim scan. `None` scans peers in natural index order starting at
    /// 0, as plain and reproducible as the scan gets. `Some(seed)` gives
    /// each worker a fixed, seed-derived starting offset instead, so
    /// workers don't all pile onto victim 0 first — useful for spreading
    /// steal pressure without giving up run-to-run determinism in tests.
    pub scan_seed: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get().max(1),
            initial_deque_capacity: 8,
            scan_seed: None,
        }
    }
}

impl SchedulerConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(SchedulerError::InvalidConfig(
                "worker_count must be at least 1".to_string(),
            ));
        }
        if self.initial_deque_capacity == 0 || !self.initial_deque_capacity.is_power_of_two() {
            return Err(SchedulerError::InvalidConfig(
                "initial_deque_capacity must be a nonzero power of two".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_workers() {
        let config = SchedulerConfig {
            worker_count: 0,
            initial_deque_capacity: 8,
            scan_seed: None,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_non_power_of_two_capacity() {
        let config = SchedulerConfig {
            worker_count: 1,
            initial_deque_capacity: 7,
            scan_seed: None,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn scan_seed_does_not_affect_validity() {
        let config = SchedulerConfig {
            worker_count: 2,
            initial_deque_capacity: 8,
            scan_seed: Some(42),
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn default_is_valid() {
        assert!(SchedulerConfig::default().validate().is_ok());
    }
}
