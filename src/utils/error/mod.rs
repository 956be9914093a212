//! Crate-wide error type.
//!
//! `GatewayError` is the single error currency threaded through the relay
//! pipeline, admission control, entity caches, and HTTP handlers. Handlers
//! propagate it with `?`; [`actix_web::ResponseError`] centralizes the
//! status-code mapping from spec section 7 in one place.

pub mod error;

pub use error::{ErrorDetail, ErrorResponse, GatewayError, Result};
