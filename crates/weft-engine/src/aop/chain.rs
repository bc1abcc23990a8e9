//! Advice chain execution
//!
//! The advisors matched for a join point form a chain in registration
//! order. Each link wraps the rest of the chain; the innermost position is
//! the original method:
//!
//! - before: run the advice, then proceed
//! - around: the advice proceeds (or not) itself
//! - after-returning: proceed, then run the advice on success
//! - after-throwing: proceed, then run the advice on failure
//! - after: proceed, then run the advice once the whole call has settled
//!
//! After advices are deferred to the end of the call so they observe the
//! final outcome, after every after-returning/after-throwing advice.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::trace;

use super::advice::{AdviceKind, Advisor};
use super::condition::Condition;
use super::invocable::Invocable;
use super::joinpoint::{Arguments, CallSite, Exception, JoinPoint};

/// One advisor as applied to one join point
#[derive(Clone)]
pub struct ChainLink {
    advisor: Arc<Advisor>,
    condition: Option<Condition>,
}

impl ChainLink {
    /// Create a link; `condition` is the pointcut's runtime evaluation for this join point
    pub fn new(advisor: Arc<Advisor>, condition: Option<Condition>) -> Self {
        Self { advisor, condition }
    }

    /// The advisor
    pub fn advisor(&self) -> &Advisor {
        &self.advisor
    }

    /// Runtime evaluation guarding the advice, if any
    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    pub(crate) fn run(&self, join_point: &mut JoinPoint<'_>, index: usize) -> Result<Value, Exception> {
        if let Some(condition) = &self.condition {
            if !condition.evaluate(join_point) {
                trace!(advice = %self.advisor, "runtime evaluation rejected advice");
                return join_point.proceed();
            }
        }

        let advice = self.advisor.advice();
        match self.advisor.kind() {
            AdviceKind::Before => {
                advice.invoke(join_point)?;
                join_point.proceed()
            }
            AdviceKind::Around => advice
                .invoke(join_point)
                .map(|value| value.unwrap_or(Value::Null)),
            AdviceKind::AfterReturning => {
                let value = join_point.proceed()?;
                join_point.record(&Ok(value.clone()));
                advice.invoke(join_point)?;
                Ok(value)
            }
            AdviceKind::AfterThrowing => match join_point.proceed() {
                Ok(value) => Ok(value),
                Err(exception) => {
                    join_point.record(&Err(exception.clone()));
                    match advice.invoke(join_point)? {
                        None => Err(exception),
                        Some(replacement) => {
                            join_point.record(&Ok(replacement.clone()));
                            Ok(replacement)
                        }
                    }
                }
            },
            AdviceKind::After => {
                let outcome = join_point.proceed();
                join_point.defer(index);
                outcome
            }
        }
    }
}

impl fmt::Debug for ChainLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainLink")
            .field("advisor", &self.advisor)
            .field("condition", &self.condition)
            .finish()
    }
}

/// Run an intercepted call through `chain`
///
/// The join point is created here and dropped when the call returns; it is
/// never reused across calls.
pub fn invoke_chain(
    target: &mut dyn Invocable,
    site: CallSite,
    arguments: Arguments,
    chain: &[ChainLink],
) -> Result<Value, Exception> {
    let mut join_point = JoinPoint::new(target, site, arguments, chain);
    let mut outcome = join_point.proceed();

    for index in join_point.take_deferred() {
        join_point.record(&outcome);
        let link = &join_point.chain()[index];
        if let Err(exception) = link.advisor().advice().invoke(&mut join_point) {
            outcome = Err(exception);
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aop::advice::advice_fn;
    use crate::aop::invocable::OriginalObject;
    use crate::aop::pointcut::Pointcut;
    use parking_lot::Mutex;
    use serde_json::json;

    type Log = Arc<Mutex<Vec<String>>>;

    fn link(kind: AdviceKind, name: &str, log: &Log, body: impl Fn(&mut JoinPoint<'_>) -> crate::aop::AdviceResult + Send + Sync + 'static) -> ChainLink {
        let log = log.clone();
        let label = name.to_string();
        let advice = advice_fn(move |jp| {
            log.lock().push(label.clone());
            body(jp)
        });
        let advisor = Advisor::new("acme::Aspect", name, kind, advice, Pointcut::always("acme::Aspect"));
        ChainLink::new(Arc::new(advisor), None)
    }

    fn target(log: &Log, fail: bool) -> OriginalObject<Log> {
        OriginalObject::new("acme::Service", log.clone()).with_method("run", move |log, _| {
            log.lock().push("original".to_string());
            if fail {
                Err(Exception::new("InvalidState", "boom"))
            } else {
                Ok(json!("done"))
            }
        })
    }

    fn run(log: &Log, fail: bool, chain: &[ChainLink]) -> Result<Value, Exception> {
        let mut original = target(log, fail);
        invoke_chain(
            &mut original,
            CallSite::new("acme::Service", "run", "acme::Service"),
            Arguments::new(),
            chain,
        )
    }

    #[test]
    fn test_empty_chain_runs_original() {
        let log = Log::default();
        assert_eq!(run(&log, false, &[]), Ok(json!("done")));
        assert_eq!(*log.lock(), vec!["original"]);
    }

    #[test]
    fn test_around_without_proceed_blocks_rest() {
        let log = Log::default();
        let chain = vec![
            link(AdviceKind::Before, "a", &log, |_| Ok(None)),
            link(AdviceKind::Around, "b", &log, |_| Ok(Some(json!("cached")))),
            link(AdviceKind::AfterReturning, "c", &log, |_| Ok(None)),
        ];

        assert_eq!(run(&log, false, &chain), Ok(json!("cached")));
        assert_eq!(*log.lock(), vec!["a", "b"]);
    }

    #[test]
    fn test_around_proceeds_twice() {
        let log = Log::default();
        let chain = vec![link(AdviceKind::Around, "retry", &log, |jp| {
            let _ = jp.proceed()?;
            jp.proceed().map(Some)
        })];

        assert_eq!(run(&log, false, &chain), Ok(json!("done")));
        assert_eq!(*log.lock(), vec!["retry", "original", "original"]);
    }

    #[test]
    fn test_after_throwing_rethrows_unchanged() {
        let log = Log::default();
        let chain = vec![
            link(AdviceKind::AfterReturning, "returning", &log, |_| Ok(None)),
            link(AdviceKind::AfterThrowing, "throwing", &log, |jp| {
                assert!(jp.has_exception());
                assert_eq!(jp.exception().unwrap().message, "boom");
                Ok(None)
            }),
        ];

        let err = run(&log, true, &chain).unwrap_err();
        assert_eq!(err, Exception::new("InvalidState", "boom"));
        assert_eq!(*log.lock(), vec!["original", "throwing"]);
    }

    #[test]
    fn test_after_throwing_can_suppress() {
        let log = Log::default();
        let chain = vec![link(AdviceKind::AfterThrowing, "fallback", &log, |_| {
            Ok(Some(json!("fallback")))
        })];
        assert_eq!(run(&log, true, &chain), Ok(json!("fallback")));
    }

    #[test]
    fn test_around_swallow_hides_exception_from_outer_after_throwing() {
        let log = Log::default();
        let chain = vec![
            link(AdviceKind::AfterThrowing, "outer", &log, |_| Ok(None)),
            link(AdviceKind::Around, "swallow", &log, |jp| match jp.proceed() {
                Ok(value) => Ok(Some(value)),
                Err(_) => Ok(Some(json!("recovered"))),
            }),
        ];

        assert_eq!(run(&log, true, &chain), Ok(json!("recovered")));
        assert_eq!(*log.lock(), vec!["swallow", "original"]);
    }

    #[test]
    fn test_after_runs_last_in_both_outcomes() {
        for fail in [false, true] {
            let log = Log::default();
            let chain = vec![
                link(AdviceKind::After, "finally", &log, move |jp| {
                    assert_eq!(jp.has_exception(), fail);
                    Ok(None)
                }),
                link(AdviceKind::AfterReturning, "returning", &log, |_| Ok(None)),
                link(AdviceKind::AfterThrowing, "throwing", &log, |_| Ok(None)),
            ];

            let outcome = run(&log, fail, &chain);
            assert_eq!(outcome.is_err(), fail);
            let expected = if fail {
                vec!["original", "throwing", "finally"]
            } else {
                vec!["original", "returning", "finally"]
            };
            assert_eq!(*log.lock(), expected);
        }
    }

    #[test]
    fn test_failing_before_skips_original() {
        let log = Log::default();
        let chain = vec![
            link(AdviceKind::After, "finally", &log, |_| Ok(None)),
            link(AdviceKind::Before, "guard", &log, |_| {
                Err(Exception::new("Forbidden", "no"))
            }),
        ];

        let err = run(&log, false, &chain).unwrap_err();
        assert!(err.is("Forbidden"));
        assert_eq!(*log.lock(), vec!["guard", "finally"]);
    }

    #[test]
    fn test_runtime_condition_skips_advice() {
        let log = Log::default();
        let skipped = link(AdviceKind::Before, "skipped", &log, |_| Ok(None));
        let skipped = ChainLink::new(
            skipped.advisor.clone(),
            Some(Condition::custom("never", |_| false)),
        );
        let chain = vec![skipped, link(AdviceKind::Before, "kept", &log, |_| Ok(None))];

        assert_eq!(run(&log, false, &chain), Ok(json!("done")));
        assert_eq!(*log.lock(), vec!["kept", "original"]);
    }
}
