//! Transitive dependency resolution: namespaces, latest-revision strategies,
//! resolvers and chains, the node registry and conflict eviction.

pub mod cache;
pub mod chain;
pub mod conflict;
pub mod context;
pub mod engine;
pub mod eviction;
pub mod graph;
pub mod latest;
pub mod namespace;
pub mod report;
pub mod resolver;
pub mod version;

pub use engine::{ResolveEngine, ResolveOptions};
pub use report::ResolveReport;
pub use resolver::{DependencyResolver, ResolverBase};
