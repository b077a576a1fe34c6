//! Pipeline logic and repository trait definitions for Chorus.
//!
//! This crate defines the "ports" (repository, provider and token verifier
//! traits) that the infrastructure layer implements. It depends only on
//! `chorus-types` -- never on `chorus-infra` or any database/IO crate.

pub mod auth;
pub mod chat;
pub mod llm;
pub mod pipeline;

#[cfg(test)]
pub(crate) mod test_support;
