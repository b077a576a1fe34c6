//! LLM provider abstractions for Chorus.
//!
//! - `LlmProvider`: RPITIT trait for concrete provider implementations
//! - `BoxLlmProvider`: Object-safe wrapper for dynamic dispatch
//! - `RetryingProvider`: backoff wrapper around any boxed provider
//! - `ProviderRegistry`: name-indexed lookup used by the pipeline

pub mod box_provider;
pub mod provider;
pub mod registry;
pub mod retry;
