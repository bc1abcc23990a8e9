//! Weft Aspect Engine
//!
//! This crate weaves cross-cutting behavior into classes:
//! - **AOP**: pointcut filters, the expression parser, aspects and advice chains (`aop` module)
//! - **Compiler**: per-class proxy plans, generated wrapper sources and their cache (`compiler` module)
//! - **Security**: role/resource policies enforced through the same matching machinery (`security` module)
//! - **Reflection** and **configuration** collaborators (`reflect`, `config` modules)
//!
//! # Example
//!
//! ```rust,ignore
//! use weft_engine::aop::{advice_fn, AdviceKind, AspectContainer, AspectRegistry};
//! use weft_engine::aop::pointcut::PointcutExpressionParser;
//! use weft_engine::{ProxyCompiler, MemoryCache, Settings, WeavingConfig};
//!
//! let settings = Settings::load("weft.toml".as_ref())?;
//! let parser = PointcutExpressionParser::new(&settings);
//!
//! let mut audit = AspectContainer::new("acme::Audit");
//! audit.add_advice(
//!     AdviceKind::Before,
//!     "log",
//!     advice_fn(|jp| { println!("calling {}", jp.site()); Ok(None) }),
//!     parser.pointcut("method(acme::billing::*->pay())", "acme::Audit")?,
//! );
//!
//! let mut aspects = AspectRegistry::new();
//! aspects.register(audit);
//!
//! let mut compiler = ProxyCompiler::new(settings.weaving()?, Box::new(MemoryCache::new()))?;
//! let woven = compiler.compile(&reflection, &aspects)?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod aop;
pub mod compiler;
pub mod config;
pub mod error;
pub mod reflect;
pub mod security;

pub use aop::{AspectContainer, AspectRegistry, Exception, JoinPoint, Pointcut};
pub use compiler::{FileCache, MemoryCache, ProxyClass, ProxyCompiler, WovenObject};
pub use config::{Settings, WeavingConfig};
pub use error::{AopError, AopResult};
pub use reflect::{ClassMetadataRegistry, ReflectionService};
pub use security::{PolicyDefinition, PolicyMatcher, Privilege};
