//! Method part of `method([visibility] Class->method(constraints))`

use tracing::warn;

use super::class_name::NamePattern;
use super::{Candidate, MatchContext, MatchQuery, PointcutFilter};
use crate::aop::condition::Condition;
use crate::error::AopResult;
use crate::reflect::Visibility;

/// Matches join points by method name, visibility, and argument constraints
///
/// Argument constraints are checked per call through the runtime evaluation;
/// statically they only produce a diagnostic when they name a parameter the
/// method does not declare.
#[derive(Debug, Clone)]
pub struct MethodNameFilter {
    pattern: NamePattern,
    visibility: Option<Visibility>,
    constraints: Option<Condition>,
}

impl MethodNameFilter {
    /// Create a filter from a method name or regex
    pub fn new(pattern: &str) -> AopResult<Self> {
        Ok(Self {
            pattern: NamePattern::new(pattern)?,
            visibility: None,
            constraints: None,
        })
    }

    /// Require a visibility
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = Some(visibility);
        self
    }

    /// Attach argument constraints
    pub fn with_constraints(mut self, constraints: Option<Condition>) -> Self {
        self.constraints = constraints;
        self
    }

    /// Required visibility, if any
    pub fn visibility(&self) -> Option<Visibility> {
        self.visibility
    }

    fn warn_unknown_arguments(&self, ctx: &MatchContext<'_>, class_name: &str, method: &str) {
        let Some(constraints) = &self.constraints else {
            return;
        };
        let parameters = ctx
            .reflection
            .get_method_parameters(class_name, method)
            .unwrap_or_default();
        for name in constraints.argument_names() {
            if !parameters.iter().any(|p| p.name == name) {
                warn!(
                    class = class_name,
                    method,
                    argument = name,
                    pattern = self.pattern.as_str(),
                    "pointcut constrains an argument the method does not declare"
                );
            }
        }
    }
}

impl PointcutFilter for MethodNameFilter {
    fn matches(
        &self,
        ctx: &MatchContext<'_>,
        candidate: &Candidate<'_>,
        _query: &mut MatchQuery,
    ) -> AopResult<bool> {
        let Some(method) = candidate.method_name else {
            return Ok(false);
        };
        if !self.pattern.is_match(method) {
            return Ok(false);
        }

        let reflection = ctx.reflection;
        if reflection.is_method_final(candidate.class_name, method) {
            return Ok(false);
        }
        if let Some(declaring) = candidate.declaring_class {
            if reflection.is_method_final(declaring, method) {
                return Ok(false);
            }
        }

        if let Some(required) = self.visibility {
            let Some(declaring) = candidate.declaring_class else {
                return Ok(false);
            };
            let actual = reflection
                .method_visibility(declaring, method)
                .or_else(|| reflection.method_visibility(candidate.class_name, method));
            if actual != Some(required) {
                return Ok(false);
            }
        }

        self.warn_unknown_arguments(ctx, candidate.class_name, method);
        Ok(true)
    }

    fn runtime_evaluation(&self, _ctx: &MatchContext<'_>, _query: &mut MatchQuery) -> Option<Condition> {
        self.constraints.clone()
    }
}
