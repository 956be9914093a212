//! HTTP middleware: operator JWT auth and request-ID tagging.

pub mod auth;
pub mod request_id;

pub use auth::OperatorJwtMiddleware;
pub use request_id::RequestIdMiddleware;
