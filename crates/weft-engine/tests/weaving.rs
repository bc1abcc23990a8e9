//! Integration tests for proxy weaving
//!
//! Classes are matched and compiled, then their plans are applied to live
//! originals to check what actually runs on a call.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use weft_engine::aop::pointcut::PointcutExpressionParser;
use weft_engine::aop::{
    advice_fn, Advice, AdviceKind, AdviceResult, Arguments, AspectContainer, AspectRegistry, Exception,
    Invocable, JoinPoint, OriginalObject, PropertyIntroduction,
};
use weft_engine::compiler::{ArtifactCache, FileCache, MemoryCache, ProxyCompiler};
use weft_engine::config::{Settings, WeavingConfig};
use weft_engine::reflect::{ClassMetadata, ClassMetadataRegistry, MethodMetadata, Visibility};

const INVOICES: &str = "acme::billing::InvoiceService";
const LEDGER: &str = "acme::billing::Ledger";
const ASPECT: &str = "acme::Tracing";

type Log = Arc<Mutex<Vec<String>>>;

fn reflection() -> ClassMetadataRegistry {
    let mut registry = ClassMetadataRegistry::new();

    let mut invoices = ClassMetadata::new(INVOICES);
    invoices.add_method(
        MethodMetadata::new("pay", INVOICES)
            .with_parameter("amount", "f64")
            .returning("f64"),
    );
    invoices.add_method(MethodMetadata::new("total", INVOICES).returning("f64"));
    invoices.add_method(MethodMetadata::new("recalculate", INVOICES).with_visibility(Visibility::Protected));
    invoices.add_method(MethodMetadata::new("audit_trail", INVOICES).final_method());
    let mut create = MethodMetadata::new("create", INVOICES);
    create.is_static = true;
    invoices.add_method(create);
    invoices.source = Some("pub struct InvoiceService { paid: f64 }".to_string());
    registry.register(invoices);

    let mut ledger = ClassMetadata::new(LEDGER);
    ledger.is_final = true;
    ledger.add_method(MethodMetadata::new("post", LEDGER));
    ledger.source = Some("pub struct Ledger;".to_string());
    registry.register(ledger);

    registry
}

fn recording(
    log: &Log,
    label: &str,
    body: impl Fn(&mut JoinPoint<'_>) -> AdviceResult + Send + Sync + 'static,
) -> Arc<dyn Advice> {
    let log = log.clone();
    let label = label.to_string();
    advice_fn(move |jp| {
        log.lock().push(label.clone());
        body(jp)
    })
}

fn aspect(log: &Log, expression: &str) -> AspectRegistry {
    let settings = Settings::new();
    let parser = PointcutExpressionParser::new(&settings);
    let pointcut = || parser.pointcut(expression, ASPECT).unwrap();

    let mut tracer = AspectContainer::new(ASPECT);
    tracer
        .add_advice(AdviceKind::Before, "before", recording(log, "before", |_| Ok(None)), pointcut())
        .add_advice(
            AdviceKind::Around,
            "guard",
            recording(log, "guard", |jp| {
                let amount = jp.argument("amount").and_then(Value::as_f64).unwrap_or(0.0);
                if amount > 1000.0 {
                    return Ok(Some(json!("needs approval")));
                }
                jp.proceed().map(Some)
            }),
            pointcut(),
        )
        .add_advice(
            AdviceKind::AfterReturning,
            "returned",
            recording(log, "returned", |_| Ok(None)),
            pointcut(),
        )
        .add_advice(
            AdviceKind::AfterThrowing,
            "threw",
            recording(log, "threw", |jp| {
                assert!(jp.has_exception());
                Ok(None)
            }),
            pointcut(),
        )
        .add_advice(AdviceKind::After, "finally", recording(log, "finally", |_| Ok(None)), pointcut());

    let mut registry = AspectRegistry::new();
    registry.register(tracer);
    registry
}

fn original(log: &Log) -> Box<dyn Invocable> {
    Box::new(
        OriginalObject::new(INVOICES, log.clone())
            .with_method("pay", |log, args: &Arguments| {
                log.lock().push("original".to_string());
                let amount = args.get("amount").and_then(Value::as_f64).unwrap_or(0.0);
                if amount < 0.0 {
                    return Err(Exception::new("InvalidArgument", "negative amount"));
                }
                Ok(json!(amount))
            })
            .with_method("total", |log, _| {
                log.lock().push("total".to_string());
                Ok(json!(42.0))
            }),
    )
}

fn memory_compiler() -> ProxyCompiler {
    ProxyCompiler::new(WeavingConfig::default(), Box::new(MemoryCache::new())).unwrap()
}

#[test]
fn test_advice_chain_order_through_woven_object() {
    let log = Log::default();
    let reflection = reflection();
    let aspects = aspect(&log, "method(acme::billing::InvoiceService->pay())");
    let mut compiler = memory_compiler();

    let proxy = compiler.get_proxy_class(INVOICES, &reflection, &aspects).unwrap().unwrap();
    let mut woven = proxy.weave(original(&log));

    assert_eq!(woven.call("pay", vec![json!(25.0)]), Ok(json!(25.0)));
    assert_eq!(*log.lock(), vec!["before", "guard", "original", "returned", "finally"]);

    // Unmatched methods delegate straight to the original
    log.lock().clear();
    assert_eq!(woven.call("total", vec![]), Ok(json!(42.0)));
    assert_eq!(*log.lock(), vec!["total"]);
}

#[test]
fn test_around_without_proceed_blocks_original() {
    let log = Log::default();
    let reflection = reflection();
    let aspects = aspect(&log, "method(acme::billing::InvoiceService->pay())");
    let mut compiler = memory_compiler();
    let proxy = compiler.get_proxy_class(INVOICES, &reflection, &aspects).unwrap().unwrap();
    let mut woven = proxy.weave(original(&log));

    assert_eq!(woven.call("pay", vec![json!(5000.0)]), Ok(json!("needs approval")));
    assert_eq!(*log.lock(), vec!["before", "guard"]);
}

#[test]
fn test_exception_routing() {
    let log = Log::default();
    let reflection = reflection();
    let aspects = aspect(&log, "method(acme::billing::InvoiceService->pay())");
    let mut compiler = memory_compiler();
    let proxy = compiler.get_proxy_class(INVOICES, &reflection, &aspects).unwrap().unwrap();
    let mut woven = proxy.weave(original(&log));

    let error = woven.call("pay", vec![json!(-1.0)]).unwrap_err();
    assert_eq!(error, Exception::new("InvalidArgument", "negative amount"));
    assert_eq!(*log.lock(), vec!["before", "guard", "original", "threw", "finally"]);
}

#[test]
fn test_final_classes_and_methods_are_never_woven() {
    let log = Log::default();
    let reflection = reflection();
    let aspects = aspect(&log, "class(acme::billing::.*)");
    let mut compiler = memory_compiler();

    assert_eq!(compiler.compile(&reflection, &aspects).unwrap(), 1);
    assert!(compiler.has_cache_entry_for_class(INVOICES));
    assert!(!compiler.has_cache_entry_for_class(LEDGER));
    assert!(compiler.get_proxy_class(LEDGER, &reflection, &aspects).unwrap().is_none());

    let proxy = compiler.get_proxy_class(INVOICES, &reflection, &aspects).unwrap().unwrap();
    assert!(proxy.method("pay").unwrap().is_intercepted());
    assert!(!proxy.method("audit_trail").unwrap().is_intercepted());
    assert!(proxy.method("create").is_none());
}

#[test]
fn test_visibility_gating() {
    let log = Log::default();
    let reflection = reflection();

    let public = aspect(&log, "method(public acme::billing::InvoiceService->.*())");
    let proxy = memory_compiler().get_proxy_class(INVOICES, &reflection, &public).unwrap().unwrap();
    let intercepted: Vec<_> = proxy.intercepted_methods().map(|m| m.name.as_str()).collect();
    assert_eq!(intercepted, vec!["pay", "total"]);

    let protected = aspect(&log, "method(protected acme::billing::InvoiceService->.*())");
    let proxy = memory_compiler().get_proxy_class(INVOICES, &reflection, &protected).unwrap().unwrap();
    let intercepted: Vec<_> = proxy.intercepted_methods().map(|m| m.name.as_str()).collect();
    assert_eq!(intercepted, vec!["recalculate"]);
}

#[test]
fn test_runtime_evaluation_gates_advice_per_call() {
    let log = Log::default();
    let reflection = reflection();
    let aspects = aspect(&log, "method(acme::billing::InvoiceService->pay(amount >= 100))");
    let proxy = memory_compiler().get_proxy_class(INVOICES, &reflection, &aspects).unwrap().unwrap();
    let mut woven = proxy.weave(original(&log));

    assert_eq!(woven.call("pay", vec![json!(10)]), Ok(json!(10.0)));
    assert_eq!(*log.lock(), vec!["original"]);

    log.lock().clear();
    assert_eq!(woven.call("pay", vec![json!(100)]), Ok(json!(100.0)));
    assert_eq!(*log.lock(), vec!["before", "guard", "original", "returned", "finally"]);
}

#[test]
fn test_disjunction_keeps_the_condition_of_the_matched_branch() {
    let log = Log::default();
    let reflection = reflection();
    let advised = vec!["before", "guard", "original", "returned", "finally"];

    for expression in [
        "method(acme::billing::InvoiceService->pay(amount > 100)) || method(acme::billing::InvoiceService->total())",
        "class(acme::crm::Customer) || evaluate(amount > 100)",
    ] {
        let aspects = aspect(&log, expression);
        let proxy = memory_compiler().get_proxy_class(INVOICES, &reflection, &aspects).unwrap().unwrap();
        let mut woven = proxy.weave(original(&log));

        log.lock().clear();
        assert_eq!(woven.call("pay", vec![json!(5)]), Ok(json!(5.0)));
        assert_eq!(*log.lock(), vec!["original"], "{}", expression);

        log.lock().clear();
        assert_eq!(woven.call("pay", vec![json!(500)]), Ok(json!(500.0)));
        assert_eq!(*log.lock(), advised, "{}", expression);
    }

    // The unconditional branch still applies on its own join point
    let aspects = aspect(
        &log,
        "method(acme::billing::InvoiceService->pay(amount > 100)) || method(acme::billing::InvoiceService->total())",
    );
    let proxy = memory_compiler().get_proxy_class(INVOICES, &reflection, &aspects).unwrap().unwrap();
    let mut woven = proxy.weave(original(&log));
    log.lock().clear();
    assert_eq!(woven.call("total", vec![]), Ok(json!(42.0)));
    assert_eq!(*log.lock(), vec!["before", "guard", "total", "returned", "finally"]);
}

#[test]
fn test_compilation_is_idempotent() {
    let log = Log::default();
    let reflection = reflection();
    let aspects = aspect(&log, "method(acme::billing::InvoiceService->pay())");
    let mut compiler = memory_compiler();

    assert_eq!(compiler.compile(&reflection, &aspects).unwrap(), 1);
    let writes = compiler.cache().stats().writes;
    assert_eq!(writes, 2);

    assert_eq!(compiler.compile(&reflection, &aspects).unwrap(), 0);
    assert_eq!(compiler.cache().stats().writes, writes);
}

#[test]
fn test_introductions_reach_woven_objects() {
    let settings = Settings::new();
    let parser = PointcutExpressionParser::new(&settings);
    let mut auditing = AspectContainer::new("acme::Auditing");
    auditing
        .add_interface_introduction(parser.pointcut("class(acme::billing::.*)", "acme::Auditing").unwrap(), "acme::Auditable")
        .add_property_introduction(PropertyIntroduction::new(
            parser.pointcut("within(acme::billing::InvoiceService)", "acme::Auditing").unwrap(),
            "audited_by",
            "String",
            json!("system"),
        ));
    let mut aspects = AspectRegistry::new();
    aspects.register(auditing);

    let reflection = reflection();
    let mut compiler = memory_compiler();
    assert_eq!(compiler.compile(&reflection, &aspects).unwrap(), 1);

    let wrapper = compiler.cached_artifact(INVOICES).unwrap().unwrap();
    assert!(wrapper.generated_source.contains("impl acme::Auditable for InvoiceService {}"));
    assert!(wrapper.generated_source.contains("pub audited_by: String,"));

    let log = Log::default();
    let proxy = compiler.get_proxy_class(INVOICES, &reflection, &aspects).unwrap().unwrap();
    let mut woven = proxy.weave(original(&log));
    assert!(woven.implements("acme::Auditable"));
    assert_eq!(woven.property("audited_by"), Some(&json!("system")));
    assert!(woven.set_property("audited_by", json!("alice")));
    assert_eq!(woven.call("total", vec![]), Ok(json!(42.0)));
}

#[test]
fn test_file_cache_survives_a_new_compiler() {
    let dir = tempfile::tempdir().unwrap();
    let log = Log::default();
    let reflection = reflection();
    let aspects = aspect(&log, "method(acme::billing::InvoiceService->pay())");
    let config = WeavingConfig {
        cache_dir: Some(dir.path().to_path_buf()),
        ..WeavingConfig::default()
    };

    let mut first = ProxyCompiler::new(config.clone(), Box::new(FileCache::open(&config).unwrap())).unwrap();
    assert_eq!(first.compile(&reflection, &aspects).unwrap(), 1);

    let mut second = ProxyCompiler::new(config.clone(), Box::new(FileCache::open(&config).unwrap())).unwrap();
    assert!(second.has_cache_entry_for_class(INVOICES));
    assert_eq!(second.compile(&reflection, &aspects).unwrap(), 0);
    assert_eq!(second.cache().stats().writes, 0);

    let wrapper = second.cached_artifact(INVOICES).unwrap().unwrap();
    assert!(wrapper
        .generated_source
        .contains("self.interceptors.invoke(&mut self.original, \"pay\", arguments)"));
    let original = second.cached_original(INVOICES).unwrap().unwrap();
    assert_eq!(original.generated_source, "pub struct InvoiceService_Original { paid: f64 }");

    assert_eq!(second.invalidate_class(INVOICES).unwrap(), 2);
    assert!(!second.has_cache_entry_for_class(INVOICES));
    assert_eq!(second.compile(&reflection, &aspects).unwrap(), 1);
}
