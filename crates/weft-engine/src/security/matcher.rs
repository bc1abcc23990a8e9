//! Policy matcher
//!
//! Turns the resources of a [`PolicyDefinition`] into pointcuts and answers
//! privilege queries for join points. The matcher is itself a
//! [`PointcutFilter`]: registered with the expression parser (usually as
//! `filter(policy)`), it matches every join point covered by at least one
//! resource, so the compiler weaves enforcement exactly where the policy
//! applies.
//!
//! Matching fills a per-join-point table keyed by
//! `lowercase(class)->lowercase(method)`; call-time lookups read from it.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use super::policy::{PolicyDefinition, Privilege};
use crate::aop::pointcut::PointcutExpressionParser;
use crate::aop::{Candidate, Condition, JoinPoint, MatchContext, MatchQuery, Pointcut, PointcutFilter};
use crate::error::{AopError, AopResult};

/// Aspect class that owns the resource pointcuts
pub const POLICY_ASPECT: &str = "weft::security::Policy";

/// Name under which the matcher is usually registered with the parser
pub const POLICY_FILTER: &str = "policy";

#[derive(Debug)]
struct Resource {
    pointcut: Pointcut,
    runtime: bool,
}

/// Resources and role privileges of one join point
///
/// Each covering resource keeps the runtime condition guarding it at this
/// join point.
#[derive(Debug, Default)]
struct JoinPointAcl {
    resources: IndexMap<String, Option<Condition>>,
    privileges: FxHashMap<String, IndexMap<String, Privilege>>,
}

/// Answers "does role R have privilege P at join point J"
#[derive(Debug)]
pub struct PolicyMatcher {
    definition: PolicyDefinition,
    resources: IndexMap<String, Resource>,
    acl_cache: RwLock<FxHashMap<String, Arc<JoinPointAcl>>>,
}

impl PolicyMatcher {
    /// Parse every resource of `definition`
    ///
    /// `ctx` is only needed to resolve named references inside resource
    /// expressions.
    pub fn new(
        definition: PolicyDefinition,
        parser: &PointcutExpressionParser<'_>,
        ctx: &MatchContext<'_>,
    ) -> AopResult<Self> {
        let mut resources = IndexMap::with_capacity(definition.resources.len());
        for (name, expression) in &definition.resources {
            let pointcut = parser.pointcut(expression, POLICY_ASPECT)?.named(name);
            let runtime = pointcut.has_runtime_evaluations_definition(ctx);
            debug!(resource = %name, runtime, "policy resource");
            resources.insert(name.clone(), Resource { pointcut, runtime });
        }

        for (role, resource) in definition.undeclared_resources() {
            warn!(role, resource, "ACL entry names an undeclared resource, it always abstains");
        }

        Ok(Self {
            definition,
            resources,
            acl_cache: RwLock::new(FxHashMap::default()),
        })
    }

    /// The policy
    pub fn definition(&self) -> &PolicyDefinition {
        &self.definition
    }

    /// Check whether any part of a resource expression carries a runtime condition
    pub fn is_runtime_evaluated(&self, resource: &str) -> bool {
        self.resources.get(resource).is_some_and(|r| r.runtime)
    }

    /// Static privilege of a role on a resource
    ///
    /// A resource guarded by a runtime condition cannot be decided without a
    /// call and is always denied here; use
    /// [`get_privileges_for_join_point`](Self::get_privileges_for_join_point)
    /// for the call-aware answer. Unknown resources abstain.
    pub fn get_privilege_for_resource(&self, role: &str, resource: &str) -> Privilege {
        if self.is_runtime_evaluated(resource) {
            return Privilege::Deny;
        }
        self.definition.privilege(role, resource)
    }

    /// Privileges of a role on every resource covering a live join point
    ///
    /// Resources whose runtime condition is false for this call are left out
    /// rather than denied. Fails when the join point was never matched
    /// against the policy.
    pub fn get_privileges_for_join_point(
        &self,
        role: &str,
        join_point: &JoinPoint<'_>,
    ) -> AopResult<IndexMap<String, Privilege>> {
        let key = acl_key(join_point.class_name(), Some(join_point.method_name()));
        let acl = self.acl_cache.read().get(&key).cloned().ok_or_else(|| {
            AopError::AccessDenied(format!("{} is not covered by the security policy", join_point.site()))
        })?;

        let granted = acl.privileges.get(role);
        let mut privileges = IndexMap::with_capacity(acl.resources.len());
        for (resource, condition) in &acl.resources {
            if condition.as_ref().is_some_and(|c| !c.evaluate(join_point)) {
                continue;
            }
            let privilege = granted
                .and_then(|p| p.get(resource))
                .copied()
                .unwrap_or_default();
            privileges.insert(resource.clone(), privilege);
        }
        Ok(privileges)
    }

    /// Resources statically covering a join point, in declaration order
    pub fn resources_for(
        &self,
        ctx: &MatchContext<'_>,
        candidate: &Candidate<'_>,
        query: &mut MatchQuery,
    ) -> AopResult<Vec<String>> {
        Ok(self.acl(ctx, candidate, query)?.resources.keys().cloned().collect())
    }

    fn acl(
        &self,
        ctx: &MatchContext<'_>,
        candidate: &Candidate<'_>,
        query: &mut MatchQuery,
    ) -> AopResult<Arc<JoinPointAcl>> {
        let key = acl_key(candidate.class_name, candidate.method_name);
        if let Some(acl) = self.acl_cache.read().get(&key) {
            return Ok(acl.clone());
        }

        let mut resources = IndexMap::new();
        for (name, resource) in &self.resources {
            if resource.pointcut.matches(ctx, candidate, query)? {
                let condition = resource.pointcut.runtime_evaluation_for(ctx, candidate, query)?;
                resources.insert(name.clone(), condition);
            }
        }
        let privileges = self
            .definition
            .acls
            .iter()
            .map(|(role, acl)| {
                let covered = resources
                    .keys()
                    .filter_map(|r| acl.get(r).map(|p| (r.clone(), *p)))
                    .collect();
                (role.clone(), covered)
            })
            .collect();

        let acl = Arc::new(JoinPointAcl { resources, privileges });
        self.acl_cache.write().insert(key, acl.clone());
        Ok(acl)
    }

    /// Drop every cached join point table
    pub fn clear_cache(&self) {
        self.acl_cache.write().clear();
    }
}

impl PointcutFilter for PolicyMatcher {
    fn matches(
        &self,
        ctx: &MatchContext<'_>,
        candidate: &Candidate<'_>,
        query: &mut MatchQuery,
    ) -> AopResult<bool> {
        Ok(!self.acl(ctx, candidate, query)?.resources.is_empty())
    }
}

fn acl_key(class_name: &str, method_name: Option<&str>) -> String {
    format!(
        "{}->{}",
        class_name.to_lowercase(),
        method_name.unwrap_or_default().to_lowercase()
    )
}
