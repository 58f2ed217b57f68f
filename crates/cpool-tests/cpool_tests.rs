//! cpool Pool Testing Suite
//!
//! Scenario tests for the connection pool, run against an in-memory mock
//! transport so they need no network or external services.
//!
//! # Test Categories
//!
//! - Pool bookkeeping (fetch, release, force close, destroy, stats)
//! - Call orchestration (success, call failure, timeout, abandoned calls)
//! - Concurrency (contended fetches, concurrent force closes, mixed call load)
//!
//! # Usage
//!
//! ```bash
//! cargo test -p cpool-tests
//!
//! # With pool logs
//! RUST_LOG=cpool=debug cargo test -p cpool-tests -- --nocapture
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod fixtures;

#[cfg(test)]
pub mod pool_tests;

#[cfg(test)]
pub mod call_tests;

#[cfg(test)]
pub mod concurrency_tests;
