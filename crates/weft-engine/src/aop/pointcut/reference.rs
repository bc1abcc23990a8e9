//! Named pointcut references (`Aspect->pointcut`)

use tracing::debug;

use super::{Candidate, MatchContext, MatchQuery, Pointcut, PointcutFilter, PointcutRef};
use crate::aop::condition::Condition;
use crate::error::{AopError, AopResult};

/// Delegates to a pointcut declared by an aspect, resolved on every match
///
/// An unresolved reference fails the match with `UnknownPointcut`. A
/// reference reached again while it is still being resolved is a cycle and
/// does not match.
#[derive(Debug, Clone)]
pub struct PointcutReferenceFilter {
    reference: PointcutRef,
}

impl PointcutReferenceFilter {
    /// Reference `name` declared by `aspect_class`
    pub fn new(aspect_class: &str, name: &str) -> Self {
        Self {
            reference: PointcutRef::new(aspect_class, name),
        }
    }

    /// The referenced pointcut
    pub fn reference(&self) -> &PointcutRef {
        &self.reference
    }

    fn cycle(&self, query: &MatchQuery) {
        let error = AopError::CircularReference(self.reference.to_string());
        debug!(%error, depth = query.depth(), "treating circular reference as a non-match");
    }

    /// Run `f` against the referenced pointcut; `Ok(None)` on a cycle
    fn resolve<T>(
        &self,
        ctx: &MatchContext<'_>,
        query: &mut MatchQuery,
        f: impl FnOnce(&Pointcut, &mut MatchQuery) -> AopResult<T>,
    ) -> AopResult<Option<T>> {
        let reference = &self.reference;
        let pointcut = ctx
            .registry
            .find_pointcut(&reference.aspect, &reference.name)
            .ok_or_else(|| AopError::UnknownPointcut {
                aspect: reference.aspect.clone(),
                pointcut: reference.name.clone(),
            })?;

        if !query.enter(reference) {
            return Ok(None);
        }
        let result = f(pointcut, query);
        query.leave(reference);
        result.map(Some)
    }
}

impl PointcutFilter for PointcutReferenceFilter {
    fn matches(
        &self,
        ctx: &MatchContext<'_>,
        candidate: &Candidate<'_>,
        query: &mut MatchQuery,
    ) -> AopResult<bool> {
        match self.resolve(ctx, query, |pointcut, query| pointcut.matches(ctx, candidate, query))? {
            Some(matched) => Ok(matched),
            None => {
                self.cycle(query);
                Ok(false)
            }
        }
    }

    fn runtime_evaluation(&self, ctx: &MatchContext<'_>, query: &mut MatchQuery) -> Option<Condition> {
        self.resolve(ctx, query, |pointcut, query| Ok(pointcut.runtime_evaluation(ctx, query)))
            .ok()
            .flatten()
            .flatten()
    }

    fn runtime_evaluation_for(
        &self,
        ctx: &MatchContext<'_>,
        candidate: &Candidate<'_>,
        query: &mut MatchQuery,
    ) -> AopResult<Option<Condition>> {
        let condition = self.resolve(ctx, query, |pointcut, query| {
            pointcut.runtime_evaluation_for(ctx, candidate, query)
        })?;
        Ok(condition.flatten())
    }

    fn defines_runtime_evaluation(&self, ctx: &MatchContext<'_>, query: &mut MatchQuery) -> bool {
        self.resolve(ctx, query, |pointcut, query| Ok(pointcut.defines_runtime_evaluation(ctx, query)))
            .is_ok_and(|defines| defines == Some(true))
    }

    fn is_runtime_only(&self, ctx: &MatchContext<'_>, query: &mut MatchQuery) -> bool {
        self.resolve(ctx, query, |pointcut, query| Ok(pointcut.is_runtime_only(ctx, query)))
            .is_ok_and(|runtime_only| runtime_only == Some(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aop::pointcut::{ClassNameFilter, CompositeFilter, Pointcut, RuntimeEvaluationFilter};
    use crate::aop::{AspectContainer, AspectRegistry};
    use crate::reflect::ClassMetadataRegistry;
    use std::sync::Arc;

    const ASPECT: &str = "acme::Aspect";

    fn reference(name: &str) -> Arc<dyn PointcutFilter> {
        Arc::new(PointcutReferenceFilter::new(ASPECT, name))
    }

    fn declare(container: &mut AspectContainer, name: &str, filter: Arc<dyn PointcutFilter>) {
        container.add_pointcut(name, Pointcut::new(name, ASPECT, filter));
    }

    fn check(registry: &AspectRegistry, filter: &dyn PointcutFilter) -> AopResult<bool> {
        let reflection = ClassMetadataRegistry::new();
        let ctx = MatchContext::new(registry, &reflection);
        filter.matches(&ctx, &Candidate::class("acme::Service"), &mut MatchQuery::new())
    }

    #[test]
    fn test_resolves_declared_pointcut() {
        let mut container = AspectContainer::new(ASPECT);
        declare(&mut container, "services", Arc::new(ClassNameFilter::new("acme::.*").unwrap()));
        let mut registry = AspectRegistry::new();
        registry.register(container);

        assert!(check(&registry, reference("services").as_ref()).unwrap());
    }

    #[test]
    fn test_unknown_reference_is_fatal() {
        let registry = AspectRegistry::new();
        let err = check(&registry, reference("nowhere").as_ref()).unwrap_err();
        assert!(matches!(
            err,
            AopError::UnknownPointcut { ref aspect, ref pointcut } if aspect == ASPECT && pointcut == "nowhere"
        ));
        assert!(err.is_fatal_to_run());
    }

    #[test]
    fn test_self_cycle_is_non_match() {
        let mut container = AspectContainer::new(ASPECT);
        declare(&mut container, "loop", reference("loop"));
        let mut registry = AspectRegistry::new();
        registry.register(container);

        assert!(!check(&registry, reference("loop").as_ref()).unwrap());
    }

    #[test]
    fn test_cycle_does_not_hide_other_branch() {
        let mut container = AspectContainer::new(ASPECT);
        let either = CompositeFilter::Or(vec![
            reference("b"),
            Arc::new(ClassNameFilter::new("acme::Service").unwrap()),
        ]);
        declare(&mut container, "a", Arc::new(either));
        declare(&mut container, "b", reference("a"));
        let mut registry = AspectRegistry::new();
        registry.register(container);

        assert!(check(&registry, reference("a").as_ref()).unwrap());
    }

    #[test]
    fn test_runtime_evaluation_follows_reference() {
        let mut container = AspectContainer::new(ASPECT);
        let condition = Condition::custom("flag", |_| true);
        declare(&mut container, "guarded", Arc::new(RuntimeEvaluationFilter::new(condition.clone())));
        declare(&mut container, "loop", reference("loop"));
        let mut registry = AspectRegistry::new();
        registry.register(container);

        let reflection = ClassMetadataRegistry::new();
        let ctx = MatchContext::new(&registry, &reflection);
        assert_eq!(
            reference("guarded").runtime_evaluation(&ctx, &mut MatchQuery::new()),
            Some(condition)
        );
        assert!(!reference("loop").has_runtime_evaluation(&ctx));
    }

    #[test]
    fn test_runtime_only_follows_reference() {
        let mut container = AspectContainer::new(ASPECT);
        let condition = Condition::custom("flag", |_| true);
        declare(&mut container, "guard", Arc::new(RuntimeEvaluationFilter::new(condition)));
        declare(&mut container, "loop", reference("loop"));
        let mut registry = AspectRegistry::new();
        registry.register(container);

        let reflection = ClassMetadataRegistry::new();
        let ctx = MatchContext::new(&registry, &reflection);
        assert!(reference("guard").is_runtime_only(&ctx, &mut MatchQuery::new()));
        assert!(!reference("loop").is_runtime_only(&ctx, &mut MatchQuery::new()));
        assert!(!reference("nowhere").is_runtime_only(&ctx, &mut MatchQuery::new()));

        // `!Aspect->guard` behaves like `!evaluate(..)` written inline
        let negated = CompositeFilter::Not(reference("guard"));
        let candidate = Candidate::class("acme::Service");
        assert!(negated.matches(&ctx, &candidate, &mut MatchQuery::new()).unwrap());
        let condition = negated
            .runtime_evaluation_for(&ctx, &candidate, &mut MatchQuery::new())
            .unwrap();
        assert_eq!(condition.unwrap().to_string(), "!(flag(..))");
    }
}
