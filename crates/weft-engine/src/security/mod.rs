//! Access control on top of the pointcut engine
//!
//! - [`PolicyDefinition`]: resources (pointcut expressions) and role ACLs
//! - [`PolicyMatcher`]: a [`PointcutFilter`](crate::aop::PointcutFilter)
//!   answering privilege queries per join point
//! - [`PolicyEnforcementAdvice`]: around advice refusing calls the policy
//!   does not grant

mod enforcement;
mod matcher;
mod policy;

pub use enforcement::{PolicyEnforcementAdvice, SecurityContext};
pub use matcher::{PolicyMatcher, POLICY_ASPECT, POLICY_FILTER};
pub use policy::{PolicyDefinition, Privilege};
