//! Original implementations behind a wrapper
//!
//! The wrapper reaches "the real thing" through [`Invocable`]. Generated
//! code implements it for the renamed original; [`OriginalObject`] builds one
//! from closures, which is what hosts without generated code use.

use std::fmt;

use rustc_hash::FxHashMap;
use serde_json::Value;

use super::joinpoint::{Arguments, Exception};

/// Kind of the exception raised for a method the original does not have
pub const BAD_METHOD_CALL: &str = "BadMethodCall";

/// An object whose methods can be called by name
pub trait Invocable: Send {
    /// Fully qualified class name of the object
    fn class_name(&self) -> &str;

    /// Call a method with named arguments
    fn invoke(&mut self, method: &str, arguments: &Arguments) -> Result<Value, Exception>;
}

type MethodFn<S> = Box<dyn Fn(&mut S, &Arguments) -> Result<Value, Exception> + Send + Sync>;

/// An [`Invocable`] assembled from state and per-method closures
pub struct OriginalObject<S> {
    class_name: String,
    state: S,
    methods: FxHashMap<String, MethodFn<S>>,
}

impl<S: Send> OriginalObject<S> {
    /// Create an object with no methods
    pub fn new(class_name: &str, state: S) -> Self {
        Self {
            class_name: class_name.to_string(),
            state,
            methods: FxHashMap::default(),
        }
    }

    /// Add a method
    pub fn with_method<F>(mut self, name: &str, body: F) -> Self
    where
        F: Fn(&mut S, &Arguments) -> Result<Value, Exception> + Send + Sync + 'static,
    {
        self.methods.insert(name.to_string(), Box::new(body));
        self
    }

    /// The object's state
    pub fn state(&self) -> &S {
        &self.state
    }

    /// The object's state, mutably
    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }
}

impl<S: Send> Invocable for OriginalObject<S> {
    fn class_name(&self) -> &str {
        &self.class_name
    }

    fn invoke(&mut self, method: &str, arguments: &Arguments) -> Result<Value, Exception> {
        match self.methods.get(method) {
            Some(body) => body(&mut self.state, arguments),
            None => Err(Exception::new(
                BAD_METHOD_CALL,
                format!("{}->{}() does not exist", self.class_name, method),
            )),
        }
    }
}

impl<S: fmt::Debug> fmt::Debug for OriginalObject<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<_> = self.methods.keys().collect();
        methods.sort();
        f.debug_struct("OriginalObject")
            .field("class_name", &self.class_name)
            .field("state", &self.state)
            .field("methods", &methods)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_invoke_by_name() {
        let mut counter = OriginalObject::new("acme::Counter", 0i64).with_method(
            "add",
            |count, args| {
                *count += args.get("by").and_then(Value::as_i64).unwrap_or(1);
                Ok(json!(*count))
            },
        );

        let mut args = Arguments::new();
        args.insert("by".to_string(), json!(5));
        assert_eq!(counter.invoke("add", &args), Ok(json!(5)));
        assert_eq!(counter.invoke("add", &Arguments::new()), Ok(json!(6)));
        assert_eq!(*counter.state(), 6);
    }

    #[test]
    fn test_unknown_method() {
        let mut object = OriginalObject::new("acme::Empty", ());
        let err = object.invoke("missing", &Arguments::new()).unwrap_err();
        assert!(err.is(BAD_METHOD_CALL));
        assert!(err.message.contains("acme::Empty->missing()"));
    }
}
