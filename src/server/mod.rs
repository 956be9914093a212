//! HTTP server: composition root, app assembly, middleware, and routes.

pub mod middleware;
pub mod routes;

mod builder;
mod server;
mod state;

pub use builder::{build_state, run_server};
pub use state::AppState;
