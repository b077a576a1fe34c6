//! Anthropic Claude LLM provider implementation.
//!
//! [`AnthropicProvider`] implements
//! [`LlmProvider`](chorus_core::llm::provider::LlmProvider) for the Anthropic
//! Messages API, including SSE streaming.

pub mod client;
pub mod streaming;
pub mod types;

pub use client::AnthropicProvider;
