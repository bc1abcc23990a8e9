//! Proxy compilation
//!
//! Turns the aspect model into woven classes:
//!
//! - [`ProxyCompiler`]: decides which classes need a wrapper and persists the
//!   generated sources
//! - [`ProxyClass`] / [`WovenObject`]: the per-class weaving plan and its
//!   in-process application to a live original
//! - [`ArtifactCache`]: where generated sources live ([`MemoryCache`],
//!   [`FileCache`])

mod cache;
pub mod codegen;
#[allow(clippy::module_inception)]
mod compiler;
mod proxy;

pub use cache::{
    cache_key, ArtifactCache, CacheError, CacheStats, EntryMetadata, FileCache, MemoryCache,
    AOP_TAG,
};
pub use compiler::{ClassCompileError, CompiledArtifact, ProxyCompiler};
pub use proxy::{IntroducedProperty, Interceptors, ProxyClass, ProxyMethod, WovenObject};
