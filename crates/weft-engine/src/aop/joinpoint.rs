//! Join points
//!
//! A [`JoinPoint`] is created when a woven method is entered and lives until
//! the call leaves the wrapper. It carries the call site, the named
//! arguments, the remaining advice chain, and the outcome of the original
//! method once it has run.

use std::fmt;

use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;

use super::chain::ChainLink;
use super::invocable::Invocable;

/// Named call arguments in declaration order
pub type Arguments = IndexMap<String, Value>;

/// A failure raised by an original method or an advice
///
/// Exceptions travel through the chain unchanged unless an advice decides to
/// translate or swallow them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct Exception {
    /// Error type, e.g. `InvalidArgument`
    pub kind: String,
    /// Human-readable message
    pub message: String,
}

impl Exception {
    /// Kind used for access-control failures
    pub const ACCESS_DENIED: &'static str = "AccessDenied";

    /// Create an exception
    pub fn new(kind: &str, message: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            message: message.into(),
        }
    }

    /// Access-control failure
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::new(Self::ACCESS_DENIED, message)
    }

    /// Check the exception kind
    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }
}

/// Where an intercepted call happens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    /// Class of the woven instance
    pub class_name: String,
    /// Called method
    pub method_name: String,
    /// Class that declares the method
    pub declaring_class: String,
}

impl CallSite {
    /// Create a call site
    pub fn new(class_name: &str, method_name: &str, declaring_class: &str) -> Self {
        Self {
            class_name: class_name.to_string(),
            method_name: method_name.to_string(),
            declaring_class: declaring_class.to_string(),
        }
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}()", self.class_name, self.method_name)
    }
}

/// Runtime state of one intercepted invocation
pub struct JoinPoint<'a> {
    target: &'a mut dyn Invocable,
    site: CallSite,
    arguments: Arguments,
    chain: &'a [ChainLink],
    position: usize,
    result: Option<Value>,
    exception: Option<Exception>,
    deferred: Vec<usize>,
}

impl<'a> JoinPoint<'a> {
    /// Create a join point at the start of `chain`
    pub fn new(
        target: &'a mut dyn Invocable,
        site: CallSite,
        arguments: Arguments,
        chain: &'a [ChainLink],
    ) -> Self {
        Self {
            target,
            site,
            arguments,
            chain,
            position: 0,
            result: None,
            exception: None,
            deferred: Vec::new(),
        }
    }

    /// The call site
    pub fn site(&self) -> &CallSite {
        &self.site
    }

    /// Class of the woven instance
    pub fn class_name(&self) -> &str {
        &self.site.class_name
    }

    /// Called method
    pub fn method_name(&self) -> &str {
        &self.site.method_name
    }

    /// Class that declares the called method
    pub fn declaring_class(&self) -> &str {
        &self.site.declaring_class
    }

    /// The original instance
    pub fn target(&self) -> &dyn Invocable {
        &*self.target
    }

    /// All arguments
    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    /// One argument by name
    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name)
    }

    /// Replace an argument before proceeding
    pub fn set_argument(&mut self, name: &str, value: Value) {
        self.arguments.insert(name.to_string(), value);
    }

    /// Value returned by the original method, once known
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// Check if the call has failed
    pub fn has_exception(&self) -> bool {
        self.exception.is_some()
    }

    /// The failure, if the call has failed
    pub fn exception(&self) -> Option<&Exception> {
        self.exception.as_ref()
    }

    /// Number of chain links not yet entered
    pub fn remaining_links(&self) -> usize {
        self.chain.len().saturating_sub(self.position)
    }

    /// Advance to the next link, or run the original method when the chain is exhausted
    ///
    /// May be called any number of times from an around advice; every call
    /// re-runs the rest of the chain from the same position.
    pub fn proceed(&mut self) -> Result<Value, Exception> {
        let chain = self.chain;
        let index = self.position;

        let Some(link) = chain.get(index) else {
            let outcome = self.target.invoke(&self.site.method_name, &self.arguments);
            self.record(&outcome);
            return outcome;
        };

        self.position = index + 1;
        let outcome = link.run(self, index);
        self.position = index;
        outcome
    }

    pub(crate) fn record(&mut self, outcome: &Result<Value, Exception>) {
        match outcome {
            Ok(value) => {
                self.result = Some(value.clone());
                self.exception = None;
            }
            Err(exception) => {
                self.result = None;
                self.exception = Some(exception.clone());
            }
        }
    }

    pub(crate) fn defer(&mut self, index: usize) {
        if !self.deferred.contains(&index) {
            self.deferred.push(index);
        }
    }

    pub(crate) fn take_deferred(&mut self) -> Vec<usize> {
        std::mem::take(&mut self.deferred)
    }

    pub(crate) fn chain(&self) -> &'a [ChainLink] {
        self.chain
    }
}

impl fmt::Debug for JoinPoint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinPoint")
            .field("site", &self.site)
            .field("arguments", &self.arguments)
            .field("position", &self.position)
            .field("chain_len", &self.chain.len())
            .field("result", &self.result)
            .field("exception", &self.exception)
            .finish()
    }
}
