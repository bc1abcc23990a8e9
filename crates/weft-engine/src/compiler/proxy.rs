//! Proxy plans and woven objects
//!
//! A [`ProxyClass`] is the outcome of matching one class: for every method,
//! the advice chain to run (possibly empty), plus the interfaces and
//! properties introduced into the class. Generated wrapper source is
//! rendered from it, and [`ProxyClass::weave`] applies it in-process to a
//! live original.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::trace;

use crate::aop::{invoke_chain, Arguments, CallSite, ChainLink, Exception, Invocable};
use crate::reflect::{ParameterInfo, Receiver, Visibility};

/// One method of a woven class
#[derive(Debug, Clone)]
pub struct ProxyMethod {
    /// Method name
    pub name: String,
    /// Class declaring the method
    pub declaring_class: String,
    /// Declared visibility
    pub visibility: Visibility,
    /// How the method receives its instance
    pub receiver: Receiver,
    /// Declared parameters, in order
    pub parameters: Vec<ParameterInfo>,
    /// Declared return type, if any
    pub return_type: Option<String>,
    /// Advice chain in registration order; empty means plain delegation
    pub chain: Vec<ChainLink>,
}

impl ProxyMethod {
    /// Check if calls to the method run advice
    pub fn is_intercepted(&self) -> bool {
        !self.chain.is_empty()
    }
}

/// A property introduced into a woven class
#[derive(Debug, Clone, PartialEq)]
pub struct IntroducedProperty {
    /// Property name
    pub name: String,
    /// Declared type
    pub type_name: String,
    /// Initial value
    pub default: Value,
    /// Visibility
    pub visibility: Visibility,
}

/// Weaving plan of one class
#[derive(Debug, Clone)]
pub struct ProxyClass {
    class_name: String,
    original_class_name: String,
    methods: IndexMap<String, ProxyMethod>,
    interfaces: Vec<String>,
    properties: Vec<IntroducedProperty>,
}

impl ProxyClass {
    /// Create an empty plan; `original_class_name` is the renamed original
    pub fn new(class_name: &str, original_class_name: &str) -> Self {
        Self {
            class_name: class_name.to_string(),
            original_class_name: original_class_name.to_string(),
            methods: IndexMap::new(),
            interfaces: Vec::new(),
            properties: Vec::new(),
        }
    }

    /// Add a method
    pub fn add_method(&mut self, method: ProxyMethod) {
        self.methods.insert(method.name.clone(), method);
    }

    /// Introduce an interface; duplicates are ignored
    pub fn add_interface(&mut self, interface: &str) {
        if !self.interfaces.iter().any(|i| i == interface) {
            self.interfaces.push(interface.to_string());
        }
    }

    /// Introduce a property; a later property with the same name wins
    pub fn add_property(&mut self, property: IntroducedProperty) {
        self.properties.retain(|p| p.name != property.name);
        self.properties.push(property);
    }

    /// Woven class name
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Name of the renamed original
    pub fn original_class_name(&self) -> &str {
        &self.original_class_name
    }

    /// A method by name
    pub fn method(&self, name: &str) -> Option<&ProxyMethod> {
        self.methods.get(name)
    }

    /// Methods in declaration order
    pub fn methods(&self) -> impl Iterator<Item = &ProxyMethod> {
        self.methods.values()
    }

    /// Methods that run advice
    pub fn intercepted_methods(&self) -> impl Iterator<Item = &ProxyMethod> {
        self.methods.values().filter(|m| m.is_intercepted())
    }

    /// Introduced interfaces
    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    /// Introduced properties
    pub fn properties(&self) -> &[IntroducedProperty] {
        &self.properties
    }

    /// Check if the plan changes anything about the class
    pub fn is_empty(&self) -> bool {
        self.intercepted_methods().next().is_none()
            && self.interfaces.is_empty()
            && self.properties.is_empty()
    }

    /// Wrap a live original
    pub fn weave(self: &Arc<Self>, original: Box<dyn Invocable>) -> WovenObject {
        WovenObject::new(Interceptors::new(self.clone()), original)
    }
}

/// Dispatches calls of a woven class through the advice chains of its plan
///
/// Generated wrappers hold one of these next to the renamed original.
#[derive(Debug, Clone)]
pub struct Interceptors {
    proxy: Arc<ProxyClass>,
}

impl Interceptors {
    /// Create a dispatcher for a plan
    pub fn new(proxy: Arc<ProxyClass>) -> Self {
        Self { proxy }
    }

    /// The plan
    pub fn proxy(&self) -> &ProxyClass {
        &self.proxy
    }

    /// Call `method` on `original`, running its advice chain if it has one
    pub fn invoke(
        &self,
        original: &mut dyn Invocable,
        method: &str,
        arguments: Arguments,
    ) -> Result<Value, Exception> {
        match self.proxy.method(method) {
            Some(plan) if plan.is_intercepted() => {
                trace!(class = %self.proxy.class_name, method, links = plan.chain.len(), "intercepted call");
                let site = CallSite::new(&self.proxy.class_name, method, &plan.declaring_class);
                invoke_chain(original, site, arguments, &plan.chain)
            }
            _ => original.invoke(method, &arguments),
        }
    }

    /// Name positional arguments after the declared parameters
    ///
    /// Extra arguments keep a positional name (`arg2`); missing optional
    /// ones are left out.
    pub fn name_arguments(&self, method: &str, values: Vec<Value>) -> Arguments {
        let parameters = self
            .proxy
            .method(method)
            .map(|m| m.parameters.as_slice())
            .unwrap_or_default();
        values
            .into_iter()
            .enumerate()
            .map(|(index, value)| {
                let name = parameters
                    .get(index)
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|| format!("arg{}", index));
                (name, value)
            })
            .collect()
    }
}

/// A live original wrapped by its proxy plan
pub struct WovenObject {
    interceptors: Interceptors,
    original: Box<dyn Invocable>,
    properties: IndexMap<String, Value>,
}

impl WovenObject {
    /// Wrap `original`; introduced properties start at their defaults
    pub fn new(interceptors: Interceptors, original: Box<dyn Invocable>) -> Self {
        let properties = interceptors
            .proxy()
            .properties()
            .iter()
            .map(|p| (p.name.clone(), p.default.clone()))
            .collect();
        Self {
            interceptors,
            original,
            properties,
        }
    }

    /// Call a method with positional arguments
    pub fn call(&mut self, method: &str, arguments: Vec<Value>) -> Result<Value, Exception> {
        let arguments = self.interceptors.name_arguments(method, arguments);
        self.call_named(method, arguments)
    }

    /// Call a method with named arguments
    pub fn call_named(&mut self, method: &str, arguments: Arguments) -> Result<Value, Exception> {
        self.interceptors
            .invoke(self.original.as_mut(), method, arguments)
    }

    /// Check if the object implements an introduced interface
    pub fn implements(&self, interface: &str) -> bool {
        self.interceptors.proxy().interfaces().iter().any(|i| i == interface)
    }

    /// An introduced property
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Set an introduced property; returns `false` if the class has no such property
    pub fn set_property(&mut self, name: &str, value: Value) -> bool {
        match self.properties.get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// The wrapped original
    pub fn original(&self) -> &dyn Invocable {
        self.original.as_ref()
    }

    /// Unwrap the original
    pub fn into_original(self) -> Box<dyn Invocable> {
        self.original
    }
}

impl Invocable for WovenObject {
    fn class_name(&self) -> &str {
        self.interceptors.proxy().class_name()
    }

    fn invoke(&mut self, method: &str, arguments: &Arguments) -> Result<Value, Exception> {
        self.call_named(method, arguments.clone())
    }
}

impl fmt::Debug for WovenObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WovenObject")
            .field("class_name", &self.interceptors.proxy().class_name())
            .field("original", &self.original.class_name())
            .field("properties", &self.properties)
            .finish()
    }
}
