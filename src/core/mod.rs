//! Core relay types and logic: the provider-neutral data model, pricing,
//! admission control, the entity cache, and the inbound/outbound adapters
//! that translate between caller/upstream wire formats and the internal
//! pivot types.

pub mod admission;
pub mod cache;
pub mod inbound;
pub mod models;
pub mod outbound;
pub mod pricing;
pub mod router;
pub mod types;
