//! Pool error types

use cpool_core::CpoolError;
use thiserror::Error;

use super::stats::PoolStats;

/// Errors returned by pool operations
///
/// Every variant that can be caused by pool state carries a stats snapshot
/// taken when the failure was observed.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Every slot is allocated and no idle connection is available
    #[error("{pool}: maximum connections reached ({max_conns}). stats: {stats}")]
    Exhausted {
        pool: String,
        max_conns: usize,
        stats: PoolStats,
    },

    /// The factory failed to create a connection
    #[error("{pool}: get connection {conn} failed: {source}. stats: {stats}")]
    Creation {
        pool: String,
        conn: String,
        #[source]
        source: CpoolError,
        stats: PoolStats,
    },

    /// The factory did not finish within the connect timeout
    #[error("{pool}: connecting {conn} timed out after {timeout_ms}ms. stats: {stats}")]
    ConnectTimeout {
        pool: String,
        conn: String,
        timeout_ms: u64,
        stats: PoolStats,
    },

    /// The pool was destroyed while the connection was being created
    #[error("{pool}: connection {conn} discarded, pool was destroyed while connecting")]
    Discarded { pool: String, conn: String },

    /// The call did not complete within the call timeout
    #[error("{conn}, call timeout after {timeout_ms}ms")]
    Timeout { conn: String, timeout_ms: u64 },

    /// The call itself returned an error
    #[error("{pool}, call on {conn} failed, err {source}. stats: {stats}")]
    Call {
        pool: String,
        conn: String,
        #[source]
        source: CpoolError,
        stats: PoolStats,
    },
}

impl PoolError {
    /// Whether the pool rejected the request for lack of capacity
    pub fn is_exhausted(&self) -> bool {
        matches!(self, PoolError::Exhausted { .. })
    }

    /// Whether a call or a connect attempt ran out of time
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            PoolError::Timeout { .. } | PoolError::ConnectTimeout { .. }
        )
    }

    /// Stats snapshot attached to the error, if any
    pub fn stats(&self) -> Option<&PoolStats> {
        match self {
            PoolError::Exhausted { stats, .. }
            | PoolError::Creation { stats, .. }
            | PoolError::ConnectTimeout { stats, .. }
            | PoolError::Call { stats, .. } => Some(stats),
            PoolError::Discarded { .. } | PoolError::Timeout { .. } => None,
        }
    }
}
