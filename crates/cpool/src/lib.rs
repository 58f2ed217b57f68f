//! cpool - Bounded pool of reusable client connections
//!
//! This crate caps how many connections to one endpoint exist at a time and
//! how many stay warm while idle, and discards any connection whose call
//! fails or overruns its deadline.

pub mod pool;

pub use cpool_core::{Connection, CpoolError, Result};
pub use pool::{
    ConnectionFactory, ConnectionPool, PoolConfig, PoolConnection, PoolError, PoolRequest,
    PoolResponse, PoolStats,
};
