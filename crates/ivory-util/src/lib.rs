//! Shared utilities for the Ivory dependency manager.
//!
//! This crate provides cross-cutting concerns used by all other Ivory crates:
//! the workspace error type, filesystem helpers, checksum hashing, and
//! terminal status lines and progress indicators.

pub mod errors;
pub mod fs;
pub mod hash;
pub mod progress;
