//! Source generation for woven classes
//!
//! Two artifacts are produced per woven class:
//!
//! - the wrapper, which takes over the class name, holds the renamed
//!   original and routes intercepted methods through [`Interceptors`]
//! - the original source with the class renamed (`Invoice` becomes
//!   `Invoice_Original`)
//!
//! [`Interceptors`]: super::Interceptors

use std::fmt::{self, Write};

use regex::Regex;

use super::proxy::{ProxyClass, ProxyMethod};
use crate::error::{AopError, AopResult};
use crate::reflect::{short_class_name, Visibility};

const HEADER: &str = "// Generated by weft. Do not edit.";

/// Rename the class declared by `source` from `short_name` to `short_name + suffix`
pub fn render_original(source: &str, short_name: &str, suffix: &str) -> AopResult<String> {
    let pattern = format!(r"\b{}\b", regex::escape(short_name));
    let regex = Regex::new(&pattern)
        .map_err(|e| AopError::InvalidConfiguration(format!("cannot rename {}: {}", short_name, e)))?;
    let renamed = format!("{}{}", short_name, suffix);
    Ok(regex.replace_all(source, renamed.as_str()).into_owned())
}

/// Render the wrapper type of a plan
///
/// Intercepted methods build the argument map and dispatch through the
/// interceptors. Other public methods delegate to the original unchanged;
/// non-public methods stay reachable only through the original.
pub fn render_wrapper(proxy: &ProxyClass) -> AopResult<String> {
    let mut out = String::new();
    write_wrapper(&mut out, proxy).map_err(|source| AopError::Codegen {
        class: proxy.class_name().to_string(),
        source,
    })?;
    Ok(out)
}

fn write_wrapper(out: &mut String, proxy: &ProxyClass) -> fmt::Result {
    let name = short_class_name(proxy.class_name());
    let original = proxy.original_class_name();

    writeln!(out, "{}", HEADER)?;
    writeln!(out, "// Woven class: {}", proxy.class_name())?;
    writeln!(out, "use weft_engine::aop::{{Arguments, Exception}};")?;
    writeln!(out, "use weft_engine::compiler::Interceptors;")?;
    writeln!(out)?;

    writeln!(out, "pub struct {} {{", name)?;
    writeln!(out, "    original: {},", original)?;
    writeln!(out, "    interceptors: Interceptors,")?;
    for property in proxy.properties() {
        writeln!(
            out,
            "    {}{}: {},",
            visibility_prefix(property.visibility),
            property.name,
            property.type_name
        )?;
    }
    writeln!(out, "}}")?;
    writeln!(out)?;

    writeln!(out, "impl {} {{", name)?;
    writeln!(out, "    pub fn __weave(original: {}, interceptors: Interceptors) -> Self {{", original)?;
    writeln!(out, "        Self {{")?;
    writeln!(out, "            original,")?;
    writeln!(out, "            interceptors,")?;
    for property in proxy.properties() {
        writeln!(
            out,
            "            {}: serde_json::from_value(serde_json::json!({})).unwrap_or_default(),",
            property.name, property.default
        )?;
    }
    writeln!(out, "        }}")?;
    writeln!(out, "    }}")?;

    for method in proxy.methods() {
        if method.is_intercepted() {
            write_intercepted(out, method)?;
        } else if method.visibility == Visibility::Public {
            write_delegate(out, method)?;
        }
    }
    writeln!(out, "}}")?;

    for interface in proxy.interfaces() {
        writeln!(out)?;
        writeln!(out, "impl {} for {} {{}}", interface, name)?;
    }
    Ok(())
}

fn visibility_prefix(visibility: Visibility) -> &'static str {
    match visibility {
        Visibility::Public => "pub ",
        Visibility::Protected => "pub(crate) ",
        Visibility::Private => "",
    }
}

fn parameter_list(method: &ProxyMethod) -> String {
    method
        .parameters
        .iter()
        .map(|p| format!(", {}: {}", p.name, p.type_name))
        .collect()
}

fn write_intercepted(out: &mut String, method: &ProxyMethod) -> fmt::Result {
    writeln!(out)?;
    writeln!(
        out,
        "    {}fn {}(&mut self{}) -> Result<serde_json::Value, Exception> {{",
        visibility_prefix(method.visibility),
        method.name,
        parameter_list(method)
    )?;
    writeln!(out, "        let mut arguments = Arguments::new();")?;
    for parameter in &method.parameters {
        writeln!(
            out,
            "        arguments.insert(\"{0}\".to_string(), serde_json::json!({0}));",
            parameter.name
        )?;
    }
    writeln!(
        out,
        "        self.interceptors.invoke(&mut self.original, \"{}\", arguments)",
        method.name
    )?;
    writeln!(out, "    }}")
}

fn write_delegate(out: &mut String, method: &ProxyMethod) -> fmt::Result {
    let arguments: Vec<&str> = method.parameters.iter().map(|p| p.name.as_str()).collect();
    let return_type = method
        .return_type
        .as_deref()
        .map(|t| format!(" -> {}", t))
        .unwrap_or_default();
    writeln!(out)?;
    writeln!(
        out,
        "    pub fn {}({}{}){} {{",
        method.name,
        method.receiver.as_str(),
        parameter_list(method),
        return_type
    )?;
    writeln!(out, "        self.original.{}({})", method.name, arguments.join(", "))?;
    writeln!(out, "    }}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aop::{advice_fn, AdviceKind, Advisor, ChainLink, Pointcut};
    use crate::compiler::proxy::IntroducedProperty;
    use crate::reflect::{ParameterInfo, Receiver};
    use serde_json::json;
    use std::sync::Arc;

    fn method(name: &str, visibility: Visibility, intercepted: bool) -> ProxyMethod {
        let chain = if intercepted {
            let advisor = Advisor::new(
                "acme::Audit",
                "log",
                AdviceKind::Before,
                advice_fn(|_| Ok(None)),
                Pointcut::always("acme::Audit"),
            );
            vec![ChainLink::new(Arc::new(advisor), None)]
        } else {
            Vec::new()
        };
        ProxyMethod {
            name: name.to_string(),
            declaring_class: "acme::billing::Invoice".to_string(),
            visibility,
            receiver: Receiver::Shared,
            parameters: vec![ParameterInfo::new("amount", "f64", 0)],
            return_type: Some("bool".to_string()),
            chain,
        }
    }

    #[test]
    fn test_render_original_renames_whole_words() {
        let source = "pub struct Invoice;\nimpl Invoice { fn of(i: &InvoiceLine) -> Invoice { Invoice } }";
        let renamed = render_original(source, "Invoice", "_Original").unwrap();
        assert_eq!(
            renamed,
            "pub struct Invoice_Original;\nimpl Invoice_Original { fn of(i: &InvoiceLine) -> Invoice_Original { Invoice_Original } }"
        );
    }

    #[test]
    fn test_render_wrapper() {
        let mut proxy = ProxyClass::new("acme::billing::Invoice", "Invoice_Original");
        proxy.add_method(method("pay", Visibility::Public, true));
        proxy.add_method(method("total", Visibility::Public, false));
        proxy.add_method(method("recalculate", Visibility::Private, false));
        proxy.add_interface("acme::Auditable");
        proxy.add_property(IntroducedProperty {
            name: "audited_by".to_string(),
            type_name: "String".to_string(),
            default: json!("system"),
            visibility: Visibility::Protected,
        });

        let source = render_wrapper(&proxy).unwrap();
        assert!(source.starts_with(HEADER));
        assert!(source.contains("pub struct Invoice {\n    original: Invoice_Original,"));
        assert!(source.contains("    pub(crate) audited_by: String,"));
        assert!(source.contains(
            "    pub fn pay(&mut self, amount: f64) -> Result<serde_json::Value, Exception> {"
        ));
        assert!(source.contains("self.interceptors.invoke(&mut self.original, \"pay\", arguments)"));
        assert!(source.contains("    pub fn total(&self, amount: f64) -> bool {\n        self.original.total(amount)"));
        assert!(!source.contains("recalculate"));
        assert!(source.contains("impl acme::Auditable for Invoice {}"));
    }
}
