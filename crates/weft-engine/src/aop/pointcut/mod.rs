//! Pointcut matching
//!
//! A pointcut is a tree of [`PointcutFilter`]s combined with AND/OR/NOT.
//! Every filter answers the same question: does the method `method_name`
//! of class `class_name` (declared by `declaring_class`) belong to the
//! pointcut? Class-level questions, asked for introductions, carry no
//! method name.
//!
//! ## Filters
//!
//! | Designator                | Filter                       |
//! |---------------------------|------------------------------|
//! | `class(pattern)`          | [`ClassNameFilter`]          |
//! | `within(Type)`            | [`WithinFilter`]             |
//! | `method(C->m(..))`        | [`MethodNameFilter`]         |
//! | `setting(path = 'x')`     | [`SettingFilter`]            |
//! | `classAnnotatedWith(A)`   | [`ClassAnnotatedWithFilter`] |
//! | `methodAnnotatedWith(T)`  | [`MethodAnnotatedWithFilter`]|
//! | `evaluate(constraints)`   | [`RuntimeEvaluationFilter`]  |
//! | `Aspect->pointcut`        | [`PointcutReferenceFilter`]  |
//!
//! Matching never consults global state: the aspect registry and the
//! reflection service travel in a [`MatchContext`], and named references
//! record the path being resolved in a [`MatchQuery`].

mod class_name;
mod composite;
mod expression;
mod method_name;
mod reference;
mod setting;
mod type_filters;

pub use class_name::{ClassNameFilter, NamePattern};
pub use composite::CompositeFilter;
pub use expression::{parse_constraints, PointcutExpressionParser};
pub use method_name::MethodNameFilter;
pub use reference::PointcutReferenceFilter;
pub use setting::SettingFilter;
pub use type_filters::{
    AlwaysFilter, ClassAnnotatedWithFilter, MethodAnnotatedWithFilter, RuntimeEvaluationFilter,
    WithinFilter,
};

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashSet;

use super::aspect::AspectRegistry;
use super::condition::Condition;
use crate::error::AopResult;
use crate::reflect::ReflectionService;

/// Collaborators consulted while matching
#[derive(Clone, Copy)]
pub struct MatchContext<'a> {
    /// Registry used to resolve named pointcut references
    pub registry: &'a AspectRegistry,
    /// Class metadata oracle
    pub reflection: &'a dyn ReflectionService,
}

impl<'a> MatchContext<'a> {
    /// Create a context
    pub fn new(registry: &'a AspectRegistry, reflection: &'a dyn ReflectionService) -> Self {
        Self {
            registry,
            reflection,
        }
    }
}

impl fmt::Debug for MatchContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchContext")
            .field("aspects", &self.registry.len())
            .finish_non_exhaustive()
    }
}

/// The join point (or class) being matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate<'a> {
    /// Fully qualified class name
    pub class_name: &'a str,
    /// Method name; `None` for class-level matching
    pub method_name: Option<&'a str>,
    /// Class declaring the method, when known
    pub declaring_class: Option<&'a str>,
}

impl<'a> Candidate<'a> {
    /// A method of a class
    pub fn method(class_name: &'a str, method_name: &'a str, declaring_class: Option<&'a str>) -> Self {
        Self {
            class_name,
            method_name: Some(method_name),
            declaring_class,
        }
    }

    /// The class itself
    pub fn class(class_name: &'a str) -> Self {
        Self {
            class_name,
            method_name: None,
            declaring_class: None,
        }
    }
}

impl fmt::Display for Candidate<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.method_name {
            Some(method) => write!(f, "{}->{}()", self.class_name, method),
            None => f.write_str(self.class_name),
        }
    }
}

/// Identity of a named pointcut: declaring aspect plus pointcut name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PointcutRef {
    /// Aspect class declaring the pointcut
    pub aspect: String,
    /// Pointcut name
    pub name: String,
}

impl PointcutRef {
    /// Create a reference
    pub fn new(aspect: &str, name: &str) -> Self {
        Self {
            aspect: aspect.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for PointcutRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.aspect, self.name)
    }
}

/// State of one match query: the named references currently being resolved
///
/// A reference that is entered again before it was left is a cycle.
#[derive(Debug, Default, Clone)]
pub struct MatchQuery {
    resolving: FxHashSet<PointcutRef>,
}

impl MatchQuery {
    /// Start a fresh query
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a reference; returns `false` if it is already being resolved
    pub fn enter(&mut self, reference: &PointcutRef) -> bool {
        self.resolving.insert(reference.clone())
    }

    /// Leave a reference
    pub fn leave(&mut self, reference: &PointcutRef) {
        self.resolving.remove(reference);
    }

    /// Number of references on the resolution path
    pub fn depth(&self) -> usize {
        self.resolving.len()
    }
}

/// A predicate over join points
pub trait PointcutFilter: fmt::Debug + Send + Sync {
    /// Check whether the candidate belongs to the pointcut
    fn matches(
        &self,
        ctx: &MatchContext<'_>,
        candidate: &Candidate<'_>,
        query: &mut MatchQuery,
    ) -> AopResult<bool>;

    /// The deferred condition this filter attaches to every join point it matches
    fn runtime_evaluation(&self, _ctx: &MatchContext<'_>, _query: &mut MatchQuery) -> Option<Condition> {
        None
    }

    /// The deferred condition of one statically matched candidate
    ///
    /// Composites only merge the conditions of the children that matched
    /// this candidate, so the answer depends on it.
    fn runtime_evaluation_for(
        &self,
        ctx: &MatchContext<'_>,
        _candidate: &Candidate<'_>,
        query: &mut MatchQuery,
    ) -> AopResult<Option<Condition>> {
        Ok(self.runtime_evaluation(ctx, query))
    }

    /// Check whether any filter of the tree defines a runtime evaluation
    fn defines_runtime_evaluation(&self, ctx: &MatchContext<'_>, query: &mut MatchQuery) -> bool {
        self.runtime_evaluation(ctx, query).is_some()
    }

    /// Check whether a runtime evaluation is attached
    fn has_runtime_evaluation(&self, ctx: &MatchContext<'_>) -> bool {
        self.defines_runtime_evaluation(ctx, &mut MatchQuery::new())
    }

    /// The filter is decided at call time only; statically it matches everything
    fn is_runtime_only(&self, _ctx: &MatchContext<'_>, _query: &mut MatchQuery) -> bool {
        false
    }
}

/// A parsed pointcut expression
#[derive(Debug, Clone)]
pub struct Pointcut {
    expression: String,
    aspect_class: String,
    name: Option<String>,
    filter: Arc<dyn PointcutFilter>,
}

impl Pointcut {
    /// Create a pointcut from an already built filter
    pub fn new(expression: &str, aspect_class: &str, filter: Arc<dyn PointcutFilter>) -> Self {
        Self {
            expression: expression.to_string(),
            aspect_class: aspect_class.to_string(),
            name: None,
            filter,
        }
    }

    /// A pointcut matching every join point
    pub fn always(aspect_class: &str) -> Self {
        Self::new("*", aspect_class, Arc::new(AlwaysFilter))
    }

    /// Give the pointcut a name other pointcuts can reference
    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Source expression
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Aspect that declares the pointcut
    pub fn aspect_class(&self) -> &str {
        &self.aspect_class
    }

    /// Name, for declared pointcuts
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Root filter
    pub fn filter(&self) -> &Arc<dyn PointcutFilter> {
        &self.filter
    }

    /// Check whether a join point belongs to the pointcut
    pub fn matches(
        &self,
        ctx: &MatchContext<'_>,
        candidate: &Candidate<'_>,
        query: &mut MatchQuery,
    ) -> AopResult<bool> {
        self.filter.matches(ctx, candidate, query)
    }

    /// Check whether the pointcut carries a runtime evaluation
    pub fn has_runtime_evaluations_definition(&self, ctx: &MatchContext<'_>) -> bool {
        self.filter.has_runtime_evaluation(ctx)
    }

    /// The runtime evaluation of the whole expression, regardless of join point
    ///
    /// `None` means the pointcut applies once statically matched. Use
    /// [`runtime_evaluations_for`](Self::runtime_evaluations_for) for the
    /// condition guarding a particular join point.
    pub fn runtime_evaluations(&self, ctx: &MatchContext<'_>) -> Option<Condition> {
        self.filter.runtime_evaluation(ctx, &mut MatchQuery::new())
    }

    /// The runtime evaluation guarding a statically matched join point
    pub fn runtime_evaluations_for(
        &self,
        ctx: &MatchContext<'_>,
        candidate: &Candidate<'_>,
    ) -> AopResult<Option<Condition>> {
        self.filter.runtime_evaluation_for(ctx, candidate, &mut MatchQuery::new())
    }
}

impl PointcutFilter for Pointcut {
    fn matches(
        &self,
        ctx: &MatchContext<'_>,
        candidate: &Candidate<'_>,
        query: &mut MatchQuery,
    ) -> AopResult<bool> {
        self.filter.matches(ctx, candidate, query)
    }

    fn runtime_evaluation(&self, ctx: &MatchContext<'_>, query: &mut MatchQuery) -> Option<Condition> {
        self.filter.runtime_evaluation(ctx, query)
    }

    fn runtime_evaluation_for(
        &self,
        ctx: &MatchContext<'_>,
        candidate: &Candidate<'_>,
        query: &mut MatchQuery,
    ) -> AopResult<Option<Condition>> {
        self.filter.runtime_evaluation_for(ctx, candidate, query)
    }

    fn defines_runtime_evaluation(&self, ctx: &MatchContext<'_>, query: &mut MatchQuery) -> bool {
        self.filter.defines_runtime_evaluation(ctx, query)
    }

    fn is_runtime_only(&self, ctx: &MatchContext<'_>, query: &mut MatchQuery) -> bool {
        self.filter.is_runtime_only(ctx, query)
    }
}
