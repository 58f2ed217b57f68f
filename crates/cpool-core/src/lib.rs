//! cpool core - transport-facing abstractions
//!
//! This crate defines what the pool needs from a transport:
//!
//! - `Connection` - Trait for a single client connection
//! - `CpoolError` - Error type transports report through

mod connection;
mod error;

pub use connection::*;
pub use error::*;
