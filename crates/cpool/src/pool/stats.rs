//! Pool statistics types

use std::fmt;

use serde::{Deserialize, Serialize};

/// Snapshot of a connection pool's bookkeeping
///
/// Taken under the pool's shared lock, so the counters are consistent with
/// each other at the moment of the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Pool name
    name: String,
    /// Connections created over the pool's lifetime
    count: u64,
    /// Allocated slots: checked out, idle, or being created
    active: usize,
    /// Connections currently tracked
    all: usize,
    /// Idle connections available for reuse
    free: usize,
}

impl PoolStats {
    /// Create new pool statistics
    pub fn new(name: impl Into<String>, count: u64, active: usize, all: usize, free: usize) -> Self {
        Self {
            name: name.into(),
            count,
            active,
            all,
            free,
        }
    }

    /// Get the pool name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the number of connections created so far
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Get the number of allocated slots
    pub fn active(&self) -> usize {
        self.active
    }

    /// Get the number of tracked connections
    pub fn all(&self) -> usize {
        self.all
    }

    /// Get the number of idle connections
    pub fn free(&self) -> usize {
        self.free
    }

    /// Number of slots not sitting idle (checked out or being created)
    pub fn busy(&self) -> usize {
        self.active.saturating_sub(self.free)
    }
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[Count: {}, Active: {}, All: {}, Free: {}]",
            self.name, self.count, self.active, self.all, self.free
        )
    }
}
