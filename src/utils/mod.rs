//! Shared utilities: the crate-wide error type and the outbound transport pool.
//!
//! The teacher's wider utility grab-bag (tokenizers, structured logging,
//! business-rule helpers) has no counterpart here: `tracing` is used
//! directly for logging and `core::pricing` owns cost computation.

pub mod error;
pub mod net;
