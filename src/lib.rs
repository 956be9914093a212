//! relaycrate: a multi-provider LLM relay gateway.
//!
//! Callers speak OpenAI chat, OpenAI responses, or Anthropic messages
//! wire format against [`server`]'s relay endpoints; each request is
//! normalized to [`core::types::InternalRequest`], routed to an upstream
//! channel by [`core::router`] with transparent failover across a model's
//! group, and translated back to the caller's original wire format.

pub mod auth;
pub mod config;
pub mod core;
pub mod monitoring;
pub mod server;
pub mod storage;
pub mod utils;

pub use config::Config;
pub use utils::error::{GatewayError, Result};
