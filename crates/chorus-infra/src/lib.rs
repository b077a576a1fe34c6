//! Infrastructure layer for Chorus.
//!
//! Contains implementations of the ports defined in `chorus-core`: SQLite
//! chat storage, LLM provider adapters (OpenAI-compatible and Anthropic),
//! JWT verification against JWKS or a shared secret, and config loading.

pub mod auth;
pub mod config;
pub mod llm;
pub mod sqlite;
