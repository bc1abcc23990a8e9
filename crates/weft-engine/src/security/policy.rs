//! Access-control policy definition
//!
//! A policy names protected resources and lists, per role, what each role
//! may do with them:
//!
//! ```toml
//! [resources]
//! invoice_pay = "method(acme::billing::InvoiceService->pay())"
//! own_invoice = "method(acme::billing::InvoiceService->show(owner == 'alice'))"
//!
//! [acls.Customer]
//! own_invoice = "grant"
//!
//! [acls.Accountant]
//! invoice_pay = "grant"
//! own_invoice = "grant"
//! ```

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::config::{Settings, SettingsError};

/// Vote of one role on one resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privilege {
    /// Access is allowed unless another vote denies it
    Grant,
    /// Access is refused, whatever the other votes say
    Deny,
    /// No opinion
    #[default]
    Abstain,
}

impl Privilege {
    /// Name used in policy files
    pub fn as_str(&self) -> &'static str {
        match self {
            Privilege::Grant => "grant",
            Privilege::Deny => "deny",
            Privilege::Abstain => "abstain",
        }
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resources and role ACLs of a security policy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyDefinition {
    /// Resource name to pointcut expression
    pub resources: IndexMap<String, String>,
    /// Role name to the role's privileges per resource
    pub acls: IndexMap<String, IndexMap<String, Privilege>>,
}

impl PolicyDefinition {
    /// Create an empty policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a policy document
    pub fn from_toml_str(source: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(source)?)
    }

    /// Read the policy stored under `section` of the settings tree
    pub fn from_settings(settings: &Settings, section: &str) -> Result<Self, SettingsError> {
        let value = settings
            .get(section)
            .ok_or_else(|| SettingsError::MissingPath(section.to_string()))?;
        value
            .clone()
            .try_into()
            .map_err(|e: toml::de::Error| SettingsError::InvalidSection {
                section: section.to_string(),
                message: e.to_string(),
            })
    }

    /// Declare a resource
    pub fn with_resource(mut self, name: &str, expression: &str) -> Self {
        self.resources.insert(name.to_string(), expression.to_string());
        self
    }

    /// Set the privilege of a role on a resource
    pub fn with_privilege(mut self, role: &str, resource: &str, privilege: Privilege) -> Self {
        self.acls
            .entry(role.to_string())
            .or_default()
            .insert(resource.to_string(), privilege);
        self
    }

    /// Privilege of a role on a resource as written in the ACLs
    pub fn privilege(&self, role: &str, resource: &str) -> Privilege {
        self.acls
            .get(role)
            .and_then(|acl| acl.get(resource))
            .copied()
            .unwrap_or_default()
    }

    /// ACL entries naming resources the policy does not declare, as `(role, resource)`
    pub fn undeclared_resources(&self) -> Vec<(&str, &str)> {
        self.acls
            .iter()
            .flat_map(|(role, acl)| acl.keys().map(move |resource| (role.as_str(), resource.as_str())))
            .filter(|(_, resource)| !self.resources.contains_key(*resource))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: &str = r#"
        [resources]
        invoice_pay = "method(acme::billing::InvoiceService->pay())"
        own_invoice = "method(acme::billing::InvoiceService->show(owner == 'alice'))"

        [acls.Customer]
        own_invoice = "grant"
        invoice_pay = "deny"

        [acls.Auditor]
        ledger = "grant"
    "#;

    #[test]
    fn test_parse_policy() {
        let policy = PolicyDefinition::from_toml_str(POLICY).unwrap();
        assert_eq!(policy.resources.len(), 2);
        assert_eq!(policy.privilege("Customer", "own_invoice"), Privilege::Grant);
        assert_eq!(policy.privilege("Customer", "invoice_pay"), Privilege::Deny);
        assert_eq!(policy.privilege("Customer", "ledger"), Privilege::Abstain);
        assert_eq!(policy.privilege("Guest", "invoice_pay"), Privilege::Abstain);
        assert_eq!(policy.undeclared_resources(), vec![("Auditor", "ledger")]);
    }

    #[test]
    fn test_unknown_privilege_is_rejected() {
        let result = PolicyDefinition::from_toml_str("[acls.Customer]\ninvoice = \"maybe\"\n");
        assert!(matches!(result, Err(SettingsError::ParseError(_))));
    }

    #[test]
    fn test_from_settings_section() {
        let settings = Settings::from_toml_str(
            r#"
            [security.resources]
            pay = "method(acme::Billing->pay())"

            [security.acls.Admin]
            pay = "grant"
            "#,
        )
        .unwrap();
        let policy = PolicyDefinition::from_settings(&settings, "security").unwrap();
        assert_eq!(policy.privilege("Admin", "pay"), Privilege::Grant);

        assert!(matches!(
            PolicyDefinition::from_settings(&settings, "missing"),
            Err(SettingsError::MissingPath(_))
        ));
    }

    #[test]
    fn test_builder() {
        let policy = PolicyDefinition::new()
            .with_resource("pay", "method(acme::Billing->pay())")
            .with_privilege("Admin", "pay", Privilege::Grant);
        assert_eq!(policy.privilege("Admin", "pay"), Privilege::Grant);
        assert_eq!(Privilege::Grant.to_string(), "grant");
        assert!(policy.undeclared_resources().is_empty());
    }
}
