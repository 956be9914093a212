//! Wire-format model types. `openai` is the OpenAI-compatible request/response
//! shape reused as the inbound/outbound wire format for both OpenAI surfaces
//! and, via the provider-neutral pivot in [`crate::core::types`], as the
//! tool-call shape shared with the Anthropic adapter.

pub mod openai;
