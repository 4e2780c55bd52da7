//! Port implementations.
//!
//! `memory` backs tests and degraded operation; `postgres` (feature
//! `database`) is the production store.

pub mod memory;

#[cfg(feature = "database")]
pub mod postgres;
