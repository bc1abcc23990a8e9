//! Advices and advisors
//!
//! An [`Advice`] is the behavior run at a matched join point; an
//! [`Advisor`] binds one advice to one [`Pointcut`]. Both are immutable
//! once constructed.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::Value;

use super::joinpoint::{Exception, JoinPoint};
use super::pointcut::Pointcut;

/// Outcome of an advice
///
/// - around: `Ok(Some(v))` returns `v`, `Ok(None)` returns null
/// - after-throwing: `Ok(None)` rethrows the exception, `Ok(Some(v))`
///   suppresses it and returns `v`
/// - before, after, after-returning: the value is ignored
///
/// `Err` always fails the call with the given exception.
pub type AdviceResult = Result<Option<Value>, Exception>;

/// When an advice runs relative to the intercepted method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdviceKind {
    /// Before the method; cannot stop the call except by failing
    Before,
    /// Around the method; decides whether and how often to proceed
    Around,
    /// After the call, whatever its outcome
    After,
    /// After the call returned normally
    AfterReturning,
    /// After the call failed
    AfterThrowing,
}

impl AdviceKind {
    /// Name used in aspect declarations and generated source
    pub fn as_str(&self) -> &'static str {
        match self {
            AdviceKind::Before => "before",
            AdviceKind::Around => "around",
            AdviceKind::After => "after",
            AdviceKind::AfterReturning => "afterReturning",
            AdviceKind::AfterThrowing => "afterThrowing",
        }
    }
}

impl FromStr for AdviceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "before" => Ok(AdviceKind::Before),
            "around" => Ok(AdviceKind::Around),
            "after" => Ok(AdviceKind::After),
            "afterReturning" => Ok(AdviceKind::AfterReturning),
            "afterThrowing" => Ok(AdviceKind::AfterThrowing),
            other => Err(format!("unknown advice kind '{}'", other)),
        }
    }
}

impl fmt::Display for AdviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cross-cutting behavior run at a join point
pub trait Advice: Send + Sync {
    /// Run the advice
    fn invoke(&self, join_point: &mut JoinPoint<'_>) -> AdviceResult;
}

/// An [`Advice`] backed by a closure
pub struct FnAdvice<F>(F);

impl<F> Advice for FnAdvice<F>
where
    F: Fn(&mut JoinPoint<'_>) -> AdviceResult + Send + Sync,
{
    fn invoke(&self, join_point: &mut JoinPoint<'_>) -> AdviceResult {
        (self.0)(join_point)
    }
}

/// Wrap a closure as an advice
pub fn advice_fn<F>(body: F) -> Arc<dyn Advice>
where
    F: Fn(&mut JoinPoint<'_>) -> AdviceResult + Send + Sync + 'static,
{
    Arc::new(FnAdvice(body))
}

/// One advice bound to one pointcut
#[derive(Clone)]
pub struct Advisor {
    aspect_class: String,
    advice_name: String,
    kind: AdviceKind,
    advice: Arc<dyn Advice>,
    pointcut: Pointcut,
}

impl Advisor {
    /// Create an advisor
    ///
    /// `advice_name` identifies the advice inside its aspect; it shows up in
    /// logs and generated source.
    pub fn new(
        aspect_class: &str,
        advice_name: &str,
        kind: AdviceKind,
        advice: Arc<dyn Advice>,
        pointcut: Pointcut,
    ) -> Self {
        Self {
            aspect_class: aspect_class.to_string(),
            advice_name: advice_name.to_string(),
            kind,
            advice,
            pointcut,
        }
    }

    /// Aspect that declares the advice
    pub fn aspect_class(&self) -> &str {
        &self.aspect_class
    }

    /// Advice name within its aspect
    pub fn advice_name(&self) -> &str {
        &self.advice_name
    }

    /// When the advice runs
    pub fn kind(&self) -> AdviceKind {
        self.kind
    }

    /// The advice
    pub fn advice(&self) -> &dyn Advice {
        self.advice.as_ref()
    }

    /// The pointcut selecting join points
    pub fn pointcut(&self) -> &Pointcut {
        &self.pointcut
    }
}

impl fmt::Debug for Advisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Advisor")
            .field("aspect_class", &self.aspect_class)
            .field("advice_name", &self.advice_name)
            .field("kind", &self.kind)
            .field("pointcut", &self.pointcut.expression())
            .finish()
    }
}

impl fmt::Display for Advisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{} ({})", self.aspect_class, self.advice_name, self.kind)
    }
}
