//! `&&`, `||` and `!`

use std::sync::Arc;

use super::{Candidate, MatchContext, MatchQuery, PointcutFilter};
use crate::aop::condition::Condition;
use crate::error::AopResult;

/// Boolean combination of filters
///
/// Children are evaluated left to right and short-circuit. For a matched
/// join point, runtime evaluations are merged from the children that
/// matched it:
///
/// - AND: conjunction of the children's conditions
/// - OR: disjunction of the matched children's conditions, or none at all
///   when a matched child carries no condition
/// - NOT over a runtime-only child: matches statically, negates at call time
#[derive(Debug, Clone)]
pub enum CompositeFilter {
    /// Every child matches
    And(Vec<Arc<dyn PointcutFilter>>),
    /// At least one child matches
    Or(Vec<Arc<dyn PointcutFilter>>),
    /// The child does not match
    Not(Arc<dyn PointcutFilter>),
}

impl CompositeFilter {
    fn children(&self) -> &[Arc<dyn PointcutFilter>] {
        match self {
            CompositeFilter::And(children) | CompositeFilter::Or(children) => children,
            CompositeFilter::Not(child) => std::slice::from_ref(child),
        }
    }
}

impl PointcutFilter for CompositeFilter {
    fn matches(
        &self,
        ctx: &MatchContext<'_>,
        candidate: &Candidate<'_>,
        query: &mut MatchQuery,
    ) -> AopResult<bool> {
        match self {
            CompositeFilter::And(children) => {
                for child in children {
                    if !child.matches(ctx, candidate, query)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            CompositeFilter::Or(children) => {
                for child in children {
                    if child.matches(ctx, candidate, query)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            CompositeFilter::Not(child) => {
                if child.is_runtime_only(ctx, query) {
                    return Ok(true);
                }
                Ok(!child.matches(ctx, candidate, query)?)
            }
        }
    }

    fn runtime_evaluation(&self, ctx: &MatchContext<'_>, query: &mut MatchQuery) -> Option<Condition> {
        match self {
            CompositeFilter::And(children) => Condition::all(
                children
                    .iter()
                    .filter_map(|child| child.runtime_evaluation(ctx, query))
                    .collect(),
            ),
            CompositeFilter::Or(children) => {
                let mut conditions = Vec::with_capacity(children.len());
                for child in children {
                    conditions.push(child.runtime_evaluation(ctx, query)?);
                }
                Condition::any(conditions)
            }
            CompositeFilter::Not(child) => {
                if !child.is_runtime_only(ctx, query) {
                    return None;
                }
                child
                    .runtime_evaluation(ctx, query)
                    .map(|inner| Condition::Not(Box::new(inner)))
            }
        }
    }

    fn runtime_evaluation_for(
        &self,
        ctx: &MatchContext<'_>,
        candidate: &Candidate<'_>,
        query: &mut MatchQuery,
    ) -> AopResult<Option<Condition>> {
        match self {
            CompositeFilter::And(children) => {
                let mut conditions = Vec::with_capacity(children.len());
                for child in children {
                    conditions.extend(child.runtime_evaluation_for(ctx, candidate, query)?);
                }
                Ok(Condition::all(conditions))
            }
            CompositeFilter::Or(children) => {
                let mut conditions = Vec::with_capacity(children.len());
                for child in children {
                    if !child.matches(ctx, candidate, query)? {
                        continue;
                    }
                    match child.runtime_evaluation_for(ctx, candidate, query)? {
                        Some(condition) => conditions.push(condition),
                        None => return Ok(None),
                    }
                }
                Ok(Condition::any(conditions))
            }
            CompositeFilter::Not(child) => {
                if !child.is_runtime_only(ctx, query) {
                    return Ok(None);
                }
                Ok(child
                    .runtime_evaluation_for(ctx, candidate, query)?
                    .map(|inner| Condition::Not(Box::new(inner))))
            }
        }
    }

    fn defines_runtime_evaluation(&self, ctx: &MatchContext<'_>, query: &mut MatchQuery) -> bool {
        match self {
            CompositeFilter::And(children) | CompositeFilter::Or(children) => children
                .iter()
                .any(|child| child.defines_runtime_evaluation(ctx, query)),
            CompositeFilter::Not(child) => {
                child.is_runtime_only(ctx, query) && child.defines_runtime_evaluation(ctx, query)
            }
        }
    }

    fn is_runtime_only(&self, ctx: &MatchContext<'_>, query: &mut MatchQuery) -> bool {
        let children = self.children();
        !children.is_empty() && children.iter().all(|child| child.is_runtime_only(ctx, query))
    }
}
