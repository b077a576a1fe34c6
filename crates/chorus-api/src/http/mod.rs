//! HTTP/REST API layer for Chorus.
//!
//! Axum-based REST API under `/api/` with bearer JWT authentication,
//! envelope response format, SSE streaming, and CORS support.

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod response;
pub mod router;
