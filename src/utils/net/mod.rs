//! Network utilities: the outbound transport pool (spec section 4.1).

pub mod transport;

pub use transport::{ProxyPolicy, TransportPool};
