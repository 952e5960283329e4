//! Repository backends: a pattern-based filesystem resolver and a Maven
//! resolver (POM descriptors, metadata listing, checksums, local cache), plus
//! the factory turning settings into an engine.

pub mod cache;
pub mod checksum;
pub mod download;
pub mod factory;
pub mod filesystem;
pub mod maven;
pub mod metadata;
pub mod pattern;
pub mod pom;

pub use factory::build_engine;
pub use filesystem::FilesystemResolver;
pub use maven::MavenResolver;
