//! Filters over type information: `within`, annotations, `evaluate`

use super::{Candidate, MatchContext, MatchQuery, PointcutFilter};
use crate::aop::condition::Condition;
use crate::error::AopResult;

/// Matches every join point
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysFilter;

impl PointcutFilter for AlwaysFilter {
    fn matches(&self, _: &MatchContext<'_>, _: &Candidate<'_>, _: &mut MatchQuery) -> AopResult<bool> {
        Ok(true)
    }
}

/// `within(Type)`: the class is `Type` or extends/implements it
#[derive(Debug, Clone)]
pub struct WithinFilter {
    type_name: String,
}

impl WithinFilter {
    /// Create a filter for a class or interface name
    pub fn new(type_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
        }
    }
}

impl PointcutFilter for WithinFilter {
    fn matches(
        &self,
        ctx: &MatchContext<'_>,
        candidate: &Candidate<'_>,
        _query: &mut MatchQuery,
    ) -> AopResult<bool> {
        let reflection = ctx.reflection;
        if reflection.is_class_final(candidate.class_name) {
            return Ok(false);
        }
        if let Some(method) = candidate.method_name {
            if reflection.is_method_final(candidate.class_name, method) {
                return Ok(false);
            }
        }
        Ok(reflection.is_subclass_of(candidate.class_name, &self.type_name))
    }
}

/// `classAnnotatedWith(Annotation)`
#[derive(Debug, Clone)]
pub struct ClassAnnotatedWithFilter {
    annotation: String,
}

impl ClassAnnotatedWithFilter {
    /// Create a filter for an annotation name
    pub fn new(annotation: &str) -> Self {
        Self {
            annotation: annotation.to_string(),
        }
    }
}

impl PointcutFilter for ClassAnnotatedWithFilter {
    fn matches(
        &self,
        ctx: &MatchContext<'_>,
        candidate: &Candidate<'_>,
        _query: &mut MatchQuery,
    ) -> AopResult<bool> {
        Ok(ctx
            .reflection
            .is_class_annotated_with(candidate.class_name, &self.annotation))
    }
}

/// `methodAnnotatedWith(Tag)`; never matches class-level candidates
#[derive(Debug, Clone)]
pub struct MethodAnnotatedWithFilter {
    tag: String,
}

impl MethodAnnotatedWithFilter {
    /// Create a filter for a method tag
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
        }
    }
}

impl PointcutFilter for MethodAnnotatedWithFilter {
    fn matches(
        &self,
        ctx: &MatchContext<'_>,
        candidate: &Candidate<'_>,
        _query: &mut MatchQuery,
    ) -> AopResult<bool> {
        let Some(method) = candidate.method_name else {
            return Ok(false);
        };
        if ctx.reflection.is_method_final(candidate.class_name, method) {
            return Ok(false);
        }
        Ok(ctx
            .reflection
            .is_method_tagged_with(candidate.class_name, method, &self.tag))
    }
}

/// `evaluate(constraints)`: decided per call
///
/// Statically it accepts everything; the condition is attached to the join
/// point and checked on every invocation.
#[derive(Debug, Clone)]
pub struct RuntimeEvaluationFilter {
    condition: Condition,
}

impl RuntimeEvaluationFilter {
    /// Wrap a condition
    pub fn new(condition: Condition) -> Self {
        Self { condition }
    }
}

impl PointcutFilter for RuntimeEvaluationFilter {
    fn matches(&self, _: &MatchContext<'_>, _: &Candidate<'_>, _: &mut MatchQuery) -> AopResult<bool> {
        Ok(true)
    }

    fn runtime_evaluation(&self, _ctx: &MatchContext<'_>, _query: &mut MatchQuery) -> Option<Condition> {
        Some(self.condition.clone())
    }

    fn is_runtime_only(&self, _ctx: &MatchContext<'_>, _query: &mut MatchQuery) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aop::AspectRegistry;
    use crate::reflect::{ClassMetadata, ClassMetadataRegistry, MethodMetadata};

    fn reflection() -> ClassMetadataRegistry {
        let mut registry = ClassMetadataRegistry::new();

        let mut base = ClassMetadata::new("acme::Repository");
        base.is_interface = true;
        registry.register(base);

        let mut users = ClassMetadata::new("acme::UserRepository");
        users.interfaces.push("acme::Repository".to_string());
        users.add_annotation("Audited");
        users.add_method(MethodMetadata::new("save", "acme::UserRepository").tagged("Transactional"));
        users.add_method(
            MethodMetadata::new("count", "acme::UserRepository")
                .tagged("Transactional")
                .final_method(),
        );
        registry.register(users);

        let mut cached = ClassMetadata::new("acme::CachedUserRepository");
        cached.parent = Some("acme::UserRepository".to_string());
        cached.is_final = true;
        registry.register(cached);
        registry
    }

    fn check(filter: &dyn PointcutFilter, candidate: Candidate<'_>) -> bool {
        let aspects = AspectRegistry::new();
        let reflection = reflection();
        let ctx = MatchContext::new(&aspects, &reflection);
        filter.matches(&ctx, &candidate, &mut MatchQuery::new()).unwrap()
    }

    #[test]
    fn test_within() {
        let within = WithinFilter::new("acme::Repository");
        assert!(check(&within, Candidate::class("acme::UserRepository")));
        assert!(check(&within, Candidate::method("acme::UserRepository", "save", None)));
        assert!(!check(&within, Candidate::method("acme::UserRepository", "count", None)));
        // Final classes are never woven, even when they qualify
        assert!(!check(&within, Candidate::class("acme::CachedUserRepository")));
        assert!(!check(&within, Candidate::class("acme::Other")));
    }

    #[test]
    fn test_annotations() {
        let class = ClassAnnotatedWithFilter::new("Audited");
        assert!(check(&class, Candidate::class("acme::UserRepository")));
        assert!(!check(&class, Candidate::class("acme::CachedUserRepository")));

        let method = MethodAnnotatedWithFilter::new("Transactional");
        assert!(check(&method, Candidate::method("acme::UserRepository", "save", None)));
        assert!(!check(&method, Candidate::method("acme::UserRepository", "count", None)));
        assert!(!check(&method, Candidate::class("acme::UserRepository")));
    }

    #[test]
    fn test_runtime_evaluation_filter() {
        let filter = RuntimeEvaluationFilter::new(Condition::custom("always", |_| true));
        let aspects = AspectRegistry::new();
        let reflection = reflection();
        let ctx = MatchContext::new(&aspects, &reflection);
        assert!(filter.is_runtime_only(&ctx, &mut MatchQuery::new()));
        assert!(filter.has_runtime_evaluation(&ctx));
        assert!(check(&filter, Candidate::class("acme::Anything")));
    }
}
