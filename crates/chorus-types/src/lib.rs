//! Shared domain types for Chorus.
//!
//! This crate contains the core domain types used across the Chorus service:
//! chat sessions, turns, provider outputs, LLM request/stream shapes,
//! configuration, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod chat;
pub mod config;
pub mod error;
pub mod llm;
