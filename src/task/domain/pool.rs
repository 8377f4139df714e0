//! Per-pool admission limits.

use super::PoolName;
use std::collections::HashMap;

/// Cap applied to pools without an explicit override.
pub const DEFAULT_POOL_MAX_SIZE: usize = 8;

/// Read-only concurrency caps consulted when a worker acquires a task.
///
/// A pool's cap bounds how many of its tasks may be acquired or working at
/// the same time. Lowering a cap never releases tasks already claimed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolLimits {
    default_max: usize,
    overrides: HashMap<PoolName, usize>,
}

impl PoolLimits {
    /// Creates limits that apply `default_max` to every pool.
    #[must_use]
    pub fn new(default_max: usize) -> Self {
        Self {
            default_max,
            overrides: HashMap::new(),
        }
    }

    /// Sets the cap for a single pool.
    #[must_use]
    pub fn with_pool(mut self, pool: PoolName, max: usize) -> Self {
        self.overrides.insert(pool, max);
        self
    }

    /// Returns the cap for pools without an override.
    #[must_use]
    pub const fn default_max(&self) -> usize {
        self.default_max
    }

    /// Returns the cap that applies to `pool`.
    #[must_use]
    pub fn max_for(&self, pool: &PoolName) -> usize {
        self.overrides
            .get(pool)
            .copied()
            .unwrap_or(self.default_max)
    }
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_MAX_SIZE)
    }
}
