//! Aspect-oriented programming core
//!
//! - [`pointcut`]: filters and the expression parser deciding where advice applies
//! - [`Advisor`] / [`AspectContainer`] / [`AspectRegistry`]: the aspect model
//! - [`JoinPoint`] / [`invoke_chain`]: the per-call advice chain
//! - [`Condition`]: runtime evaluations attached to matched join points

mod advice;
mod aspect;
mod chain;
mod condition;
mod invocable;
mod joinpoint;
pub mod pointcut;

pub use advice::{advice_fn, Advice, AdviceKind, AdviceResult, Advisor, FnAdvice};
pub use aspect::{AspectContainer, AspectRegistry, InterfaceIntroduction, PropertyIntroduction};
pub use chain::{invoke_chain, ChainLink};
pub use condition::{Condition, ConditionFn, Operand, Operator};
pub use invocable::{Invocable, OriginalObject, BAD_METHOD_CALL};
pub use joinpoint::{Arguments, CallSite, Exception, JoinPoint};
pub use pointcut::{Candidate, MatchContext, MatchQuery, Pointcut, PointcutFilter, PointcutRef};
