//! Connection pooling for client connections
//!
//! This module provides a bounded pool of reusable connections to a single
//! endpoint, with separate caps on allocated and idle connections and a
//! per-call timeout that evicts connections whose calls do not finish.
//!
//! # Example
//!
//! ```ignore
//! use cpool::pool::{ConnectionPool, PoolConfig};
//!
//! let config = PoolConfig::new("backend", "10.0.0.7:9000", 16, 4)
//!     .with_conn_timeout_ms(500)
//!     .with_call_timeout_ms(2000);
//!
//! let pool = ConnectionPool::new(config, connection_factory);
//! let response = pool.call(request).await?;
//! println!("{}", pool.stats());
//! ```

mod config;
mod error;
mod pool;
mod stats;


pub use config::PoolConfig;
pub use error::PoolError;
pub use pool::{ConnectionFactory, ConnectionPool, PoolConnection, PoolRequest, PoolResponse};
pub use stats::PoolStats;
