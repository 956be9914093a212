//! OpenAI-compatible API models
//!
//! Wire types for the chat-completions surface, shared by the OpenAI inbound
//! adapter (as the request/response it speaks) and the other adapters (as the
//! tool-call shape carried through the internal pivot). Organized the way the
//! teacher laid it out:
//!
//! - `messages` - Message types, roles, and content
//! - `requests` - Chat completion request
//! - `tools` - Tool and function calling definitions
//! - `audio` - Audio fields carried for wire-shape fidelity, never populated
//! - `responses` - Response structures including streaming variants
//! - `helpers` - Helper implementations and Display traits

pub mod audio;
pub mod helpers;
pub mod messages;
pub mod requests;
pub mod responses;
pub mod tools;

pub use audio::{AudioContent, AudioDelta, AudioParams};
pub use messages::{ChatMessage, ContentPart, ImageUrl, MessageContent, MessageRole};
pub use requests::{ChatCompletionRequest, ResponseFormat, StreamOptions};
pub use responses::{
    ChatChoice, ChatChoiceDelta, ChatCompletionChunk, ChatCompletionResponse, ChatMessageDelta,
    CompletionTokensDetails, ContentLogprob, Logprobs, PromptTokensDetails, TopLogprob, Usage,
};
pub use tools::{
    Function, FunctionCall, FunctionCallDelta, Tool, ToolCall, ToolCallDelta, ToolChoice,
    ToolChoiceFunction, ToolChoiceFunctionSpec,
};
