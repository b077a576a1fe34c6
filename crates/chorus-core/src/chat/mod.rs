//! Chat persistence port plus the logic built directly on top of it:
//! session listing/ownership, per-provider history, and session titles.

pub mod history;
pub mod repository;
pub mod service;
pub mod title;
