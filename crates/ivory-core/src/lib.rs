//! Core data types for the Ivory dependency manager.
//!
//! This crate defines the value types shared by every other crate: module
//! identifiers, module descriptors with their configurations, dependencies and
//! artifacts, per-artifact download reports, and the engine settings file.
//!
//! This crate is intentionally free of async code and network I/O.

pub mod artifact;
pub mod config;
pub mod descriptor;
pub mod id;
