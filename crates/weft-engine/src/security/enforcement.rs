//! Policy enforcement advice

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::matcher::{PolicyMatcher, POLICY_ASPECT, POLICY_FILTER};
use super::policy::Privilege;
use crate::aop::{Advice, AdviceKind, AdviceResult, AspectContainer, Exception, JoinPoint, Pointcut};
use crate::error::AopError;

/// Source of the roles of the current caller
pub trait SecurityContext: Send + Sync {
    /// Roles held by the caller
    fn roles(&self) -> Vec<String>;
}

impl<F> SecurityContext for F
where
    F: Fn() -> Vec<String> + Send + Sync,
{
    fn roles(&self) -> Vec<String> {
        self()
    }
}

/// Around advice that lets a call through only when the policy allows it
///
/// Every role of the caller votes with its privileges on the resources
/// covering the join point: any deny refuses the call, otherwise any grant
/// lets it through. When nobody grants, the call is refused.
pub struct PolicyEnforcementAdvice {
    matcher: Arc<PolicyMatcher>,
    context: Arc<dyn SecurityContext>,
}

impl PolicyEnforcementAdvice {
    /// Create the advice
    pub fn new(matcher: Arc<PolicyMatcher>, context: Arc<dyn SecurityContext>) -> Self {
        Self { matcher, context }
    }

    /// The matcher consulted on every call
    pub fn matcher(&self) -> &Arc<PolicyMatcher> {
        &self.matcher
    }

    /// An aspect weaving this advice around every join point the policy covers
    pub fn into_aspect(self) -> AspectContainer {
        let pointcut = Pointcut::new(
            &format!("filter({})", POLICY_FILTER),
            POLICY_ASPECT,
            self.matcher.clone(),
        );
        let mut aspect = AspectContainer::new(POLICY_ASPECT);
        aspect.add_advice(AdviceKind::Around, "enforce", Arc::new(self), pointcut);
        aspect
    }

    fn decide(&self, join_point: &JoinPoint<'_>) -> Result<(), AopError> {
        let mut granted = false;
        for role in self.context.roles() {
            let privileges = self.matcher.get_privileges_for_join_point(&role, join_point)?;
            for (resource, privilege) in privileges {
                match privilege {
                    Privilege::Deny => {
                        return Err(AopError::AccessDenied(format!(
                            "role {} is denied {} at {}",
                            role,
                            resource,
                            join_point.site()
                        )));
                    }
                    Privilege::Grant => granted = true,
                    Privilege::Abstain => {}
                }
            }
        }

        if granted {
            Ok(())
        } else {
            Err(AopError::AccessDenied(format!(
                "no role is granted access to {}",
                join_point.site()
            )))
        }
    }
}

impl Advice for PolicyEnforcementAdvice {
    fn invoke(&self, join_point: &mut JoinPoint<'_>) -> AdviceResult {
        if let Err(error) = self.decide(join_point) {
            debug!(site = %join_point.site(), %error, "call refused by policy");
            return Err(Exception::from(error));
        }
        join_point.proceed().map(Some)
    }
}

impl fmt::Debug for PolicyEnforcementAdvice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyEnforcementAdvice")
            .field("matcher", &self.matcher)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aop::{invoke_chain, Arguments, AspectRegistry, CallSite, ChainLink, MatchContext, OriginalObject};
    use crate::aop::{Candidate, MatchQuery, PointcutFilter};
    use crate::aop::pointcut::PointcutExpressionParser;
    use crate::config::Settings;
    use crate::reflect::{ClassMetadata, ClassMetadataRegistry, MethodMetadata};
    use crate::security::PolicyDefinition;
    use serde_json::{json, Value};

    const SERVICE: &str = "acme::billing::InvoiceService";

    fn reflection() -> ClassMetadataRegistry {
        let mut registry = ClassMetadataRegistry::new();
        let mut service = ClassMetadata::new(SERVICE);
        service.add_method(MethodMetadata::new("pay", SERVICE));
        service.add_method(MethodMetadata::new("show", SERVICE).with_parameter("owner", "String"));
        service.add_method(MethodMetadata::new("archive", SERVICE));
        registry.register(service);
        registry
    }

    fn matcher(reflection: &ClassMetadataRegistry) -> Arc<PolicyMatcher> {
        let definition = PolicyDefinition::new()
            .with_resource("pay", "method(acme::billing::InvoiceService->pay())")
            .with_resource("own", "method(acme::billing::InvoiceService->show(owner == 'alice'))")
            .with_resource("archive", "method(acme::billing::InvoiceService->archive())")
            .with_privilege("Customer", "own", Privilege::Grant)
            .with_privilege("Customer", "pay", Privilege::Deny)
            .with_privilege("Accountant", "pay", Privilege::Grant);
        let settings = Settings::new();
        let parser = PointcutExpressionParser::new(&settings);
        let aspects = AspectRegistry::new();
        let ctx = MatchContext::new(&aspects, reflection);
        let matcher = PolicyMatcher::new(definition, &parser, &ctx).unwrap();
        for method in ["pay", "show", "archive"] {
            let candidate = Candidate::method(SERVICE, method, Some(SERVICE));
            assert!(matcher.matches(&ctx, &candidate, &mut MatchQuery::new()).unwrap());
        }
        Arc::new(matcher)
    }

    fn call(matcher: &Arc<PolicyMatcher>, roles: &[&str], method: &str, owner: &str) -> Result<Value, Exception> {
        let roles: Vec<String> = roles.iter().map(|r| r.to_string()).collect();
        let context: Arc<dyn SecurityContext> = Arc::new(move || roles.clone());
        let aspect = PolicyEnforcementAdvice::new(matcher.clone(), context).into_aspect();
        let chain: Vec<ChainLink> = aspect
            .advisors()
            .iter()
            .map(|advisor| ChainLink::new(advisor.clone(), None))
            .collect();

        let mut target = OriginalObject::new(SERVICE, ())
            .with_method(method, |_, _| Ok(json!("ok")));
        let arguments: Arguments = [("owner".to_string(), json!(owner))].into_iter().collect();
        invoke_chain(&mut target, CallSite::new(SERVICE, method, SERVICE), arguments, &chain)
    }

    #[test]
    fn test_grant_proceeds() {
        let reflection = reflection();
        let matcher = matcher(&reflection);
        assert_eq!(call(&matcher, &["Accountant"], "pay", "bob"), Ok(json!("ok")));
        assert_eq!(call(&matcher, &["Customer"], "show", "alice"), Ok(json!("ok")));
    }

    #[test]
    fn test_deny_wins_over_grant() {
        let reflection = reflection();
        let matcher = matcher(&reflection);
        let error = call(&matcher, &["Accountant", "Customer"], "pay", "bob").unwrap_err();
        assert!(error.is(Exception::ACCESS_DENIED));
        assert!(error.message.contains("role Customer is denied pay"));
    }

    #[test]
    fn test_all_abstain_is_denied() {
        let reflection = reflection();
        let matcher = matcher(&reflection);
        assert!(call(&matcher, &["Accountant"], "archive", "bob").unwrap_err().is(Exception::ACCESS_DENIED));
        assert!(call(&matcher, &[], "pay", "bob").unwrap_err().is(Exception::ACCESS_DENIED));
    }

    #[test]
    fn test_false_runtime_condition_leaves_nothing_to_grant() {
        let reflection = reflection();
        let matcher = matcher(&reflection);
        assert!(call(&matcher, &["Customer"], "show", "bob").unwrap_err().is(Exception::ACCESS_DENIED));
    }

    #[test]
    fn test_into_aspect_matches_policy_resources() {
        let reflection = reflection();
        let matcher = matcher(&reflection);
        let context: Arc<dyn SecurityContext> = Arc::new(Vec::<String>::new);
        let aspect = PolicyEnforcementAdvice::new(matcher, context).into_aspect();
        assert_eq!(aspect.aspect_class(), POLICY_ASPECT);
        assert_eq!(aspect.advisors().len(), 1);

        let advisor = &aspect.advisors()[0];
        assert_eq!(advisor.kind(), AdviceKind::Around);
        assert_eq!(advisor.pointcut().expression(), "filter(policy)");

        let aspects = AspectRegistry::new();
        let ctx = MatchContext::new(&aspects, &reflection);
        let unknown = Candidate::method("acme::Other", "pay", Some("acme::Other"));
        assert!(!advisor.pointcut().matches(&ctx, &unknown, &mut MatchQuery::new()).unwrap());
    }
}
