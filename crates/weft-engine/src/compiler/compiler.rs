//! Proxy compiler
//!
//! Walks every class known to the reflection service, matches it against
//! the registered aspects and, for classes where advice or introductions
//! apply, writes two artifacts to the cache: the wrapper and the renamed
//! original.
//!
//! # Pipeline
//!
//! 1. Skip interfaces, final and internal classes, classes carrying the
//!    no-proxy annotation, classes outside the include patterns, and
//!    descendants of the test harness base classes
//! 2. Skip classes whose artifacts are cached, unless scheduled for rebuild
//! 3. Match every advisor against every method, and every introduction
//!    against the class; nothing matched means nothing is written
//! 4. Render and persist both artifacts, tagged `AOP` and with the class key
//!
//! A class whose source cannot be loaded is recorded in
//! [`ProxyCompiler::last_errors`] and the run continues. Unresolvable
//! pointcut references and malformed expressions abort the run.

use std::sync::Arc;

use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::cache::{cache_key, ArtifactCache, CacheError, FileCache, AOP_TAG};
use super::codegen::{render_original, render_wrapper};
use super::proxy::{IntroducedProperty, ProxyClass, ProxyMethod};
use crate::aop::{AspectRegistry, Candidate, ChainLink, MatchContext, MatchQuery};
use crate::config::{Settings, WeavingConfig};
use crate::error::{AopError, AopResult};
use crate::reflect::{ClassMetadata, ReflectionService};

/// A generated source as stored in the cache
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompiledArtifact {
    /// Cache key of the woven class
    pub class_key: String,
    /// Name of the type the source declares
    pub class_name: String,
    /// Generated source text
    pub generated_source: String,
    /// Tags the entry is stored under
    pub invalidation_tags: Vec<String>,
}

/// A class that could not be woven
#[derive(Debug)]
pub struct ClassCompileError {
    /// Fully qualified class name
    pub class: String,
    /// What went wrong
    pub error: AopError,
}

/// Why a class never receives a wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkipReason {
    Interface,
    Final,
    Internal,
    NoProxy,
    NotIncluded,
    TestHarness,
}

impl SkipReason {
    fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Interface => "interface",
            SkipReason::Final => "final class",
            SkipReason::Internal => "internal class",
            SkipReason::NoProxy => "no-proxy annotation",
            SkipReason::NotIncluded => "outside include patterns",
            SkipReason::TestHarness => "test harness class",
        }
    }
}

/// Compiles and caches proxies for woven classes
pub struct ProxyCompiler {
    config: WeavingConfig,
    include: Vec<Regex>,
    cache: Box<dyn ArtifactCache>,
    proxies: FxHashMap<String, Arc<ProxyClass>>,
    scheduled: FxHashSet<String>,
    errors: Vec<ClassCompileError>,
}

impl ProxyCompiler {
    /// Create a compiler writing to `cache`
    pub fn new(config: WeavingConfig, cache: Box<dyn ArtifactCache>) -> AopResult<Self> {
        let include = config
            .include_classes
            .iter()
            .map(|pattern| {
                Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| {
                    AopError::InvalidConfiguration(format!(
                        "invalid include pattern '{}': {}",
                        pattern, e
                    ))
                })
            })
            .collect::<AopResult<Vec<_>>>()?;

        Ok(Self {
            config,
            include,
            cache,
            proxies: FxHashMap::default(),
            scheduled: FxHashSet::default(),
            errors: Vec::new(),
        })
    }

    /// Create a compiler from `[weaving]`, backed by the configured file cache
    pub fn from_settings(settings: &Settings) -> AopResult<Self> {
        let config = settings.weaving()?;
        let cache = FileCache::open(&config)?;
        Self::new(config, Box::new(cache))
    }

    /// Weaving options
    pub fn config(&self) -> &WeavingConfig {
        &self.config
    }

    /// The artifact cache
    pub fn cache(&self) -> &dyn ArtifactCache {
        self.cache.as_ref()
    }

    /// Compile every eligible class; returns the number of wrappers written
    pub fn compile(
        &mut self,
        reflection: &dyn ReflectionService,
        registry: &AspectRegistry,
    ) -> AopResult<usize> {
        self.errors.clear();
        let ctx = MatchContext::new(registry, reflection);
        let mut written = 0;

        for class_name in reflection.class_names() {
            let Some(class) = reflection.class(&class_name) else {
                continue;
            };
            if let Some(reason) = self.skip_reason(class, reflection) {
                debug!(class = %class_name, reason = reason.as_str(), "not proxyable");
                continue;
            }

            let key = cache_key(&class_name);
            if !self.scheduled.contains(&class_name) && self.cache.has(&key) {
                debug!(class = %class_name, key = %key, "proxy already cached");
                continue;
            }

            let proxy = match self.build_proxy_class(class, &ctx) {
                Ok(Some(proxy)) => proxy,
                Ok(None) => {
                    self.scheduled.remove(&class_name);
                    continue;
                }
                Err(e) if e.is_fatal_to_run() => return Err(e),
                Err(e) => {
                    self.record_error(&class_name, e);
                    continue;
                }
            };

            let source = match reflection.load_source(&class_name) {
                Ok(source) => source,
                Err(source) => {
                    self.record_error(
                        &class_name,
                        AopError::Reflection {
                            class: class_name.clone(),
                            source,
                        },
                    );
                    continue;
                }
            };

            if let Err(e) = self.persist(&key, class, &proxy, &source) {
                self.record_error(&class_name, e);
                continue;
            }
            self.proxies.insert(class_name.clone(), Arc::new(proxy));
            self.scheduled.remove(&class_name);
            written += 1;
        }

        for failure in &self.errors {
            error!(class = %failure.class, error = %failure.error, "class was not woven");
        }
        debug!(written, failed = self.errors.len(), "weaving run finished");
        Ok(written)
    }

    /// Per-class failures of the last [`compile`](Self::compile) run
    pub fn last_errors(&self) -> &[ClassCompileError] {
        &self.errors
    }

    /// The weaving plan of a class
    ///
    /// Plans built by the last run are returned as is; otherwise the class
    /// is matched now, without writing anything. `None` means the class is
    /// not proxyable or nothing applies to it.
    pub fn get_proxy_class(
        &mut self,
        class_name: &str,
        reflection: &dyn ReflectionService,
        registry: &AspectRegistry,
    ) -> AopResult<Option<Arc<ProxyClass>>> {
        if let Some(proxy) = self.proxies.get(class_name) {
            return Ok(Some(proxy.clone()));
        }
        let Some(class) = reflection.class(class_name) else {
            return Ok(None);
        };
        if self.skip_reason(class, reflection).is_some() {
            return Ok(None);
        }

        let ctx = MatchContext::new(registry, reflection);
        let Some(proxy) = self.build_proxy_class(class, &ctx)? else {
            return Ok(None);
        };
        let proxy = Arc::new(proxy);
        self.proxies.insert(class_name.to_string(), proxy.clone());
        Ok(Some(proxy))
    }

    /// Check if the wrapper of a class is cached
    pub fn has_cache_entry_for_class(&self, class_name: &str) -> bool {
        self.cache.has(&cache_key(class_name))
    }

    /// Read the cached wrapper of a class
    pub fn cached_artifact(&mut self, class_name: &str) -> AopResult<Option<CompiledArtifact>> {
        self.read_artifact(&cache_key(class_name))
    }

    /// Read the cached renamed original of a class
    pub fn cached_original(&mut self, class_name: &str) -> AopResult<Option<CompiledArtifact>> {
        let key = format!("{}{}", cache_key(class_name), self.config.original_suffix);
        self.read_artifact(&key)
    }

    /// Drop every artifact of a class and rebuild it on the next run
    ///
    /// Returns the number of cache entries removed.
    pub fn invalidate_class(&mut self, class_name: &str) -> AopResult<usize> {
        let removed = self.cache.flush_by_tag(&cache_key(class_name))?;
        self.proxies.remove(class_name);
        self.schedule_rebuild(class_name);
        debug!(class = class_name, removed, "invalidated proxy");
        Ok(removed)
    }

    /// Rebuild a class on the next run even if its artifacts are cached
    pub fn schedule_rebuild(&mut self, class_name: &str) {
        self.scheduled.insert(class_name.to_string());
    }

    fn skip_reason(&self, class: &ClassMetadata, reflection: &dyn ReflectionService) -> Option<SkipReason> {
        if class.is_interface {
            return Some(SkipReason::Interface);
        }
        if class.is_final {
            return Some(SkipReason::Final);
        }
        if class.is_internal {
            return Some(SkipReason::Internal);
        }
        if class.has_annotation(&self.config.no_proxy_annotation) {
            return Some(SkipReason::NoProxy);
        }
        if !self.include.iter().any(|re| re.is_match(&class.name)) {
            return Some(SkipReason::NotIncluded);
        }
        let is_test = self
            .config
            .test_base_classes
            .iter()
            .any(|base| reflection.is_subclass_of(&class.name, base));
        if is_test {
            return Some(SkipReason::TestHarness);
        }
        None
    }

    /// Match a class against every advisor and introduction
    fn build_proxy_class(&self, class: &ClassMetadata, ctx: &MatchContext<'_>) -> AopResult<Option<ProxyClass>> {
        let original_name = format!("{}{}", class.short_name(), self.config.original_suffix);
        let mut proxy = ProxyClass::new(&class.name, &original_name);

        for method in class.methods() {
            // Static methods have no instance to intercept
            if method.is_static {
                continue;
            }
            let candidate = Candidate::method(&class.name, &method.name, Some(&method.declaring_class));
            let mut chain = Vec::new();
            for advisor in ctx.registry.advisors() {
                let pointcut = advisor.pointcut();
                if pointcut.matches(ctx, &candidate, &mut MatchQuery::new())? {
                    let condition = pointcut.runtime_evaluations_for(ctx, &candidate)?;
                    chain.push(ChainLink::new(advisor.clone(), condition));
                }
            }
            proxy.add_method(ProxyMethod {
                name: method.name.clone(),
                declaring_class: method.declaring_class.clone(),
                visibility: method.visibility,
                receiver: method.receiver,
                parameters: method.parameters.clone(),
                return_type: method.return_type.clone(),
                chain,
            });
        }

        let candidate = Candidate::class(&class.name);
        for introduction in ctx.registry.interface_introductions() {
            if introduction.pointcut.matches(ctx, &candidate, &mut MatchQuery::new())? {
                proxy.add_interface(&introduction.interface);
            }
        }
        for introduction in ctx.registry.property_introductions() {
            if introduction.pointcut.matches(ctx, &candidate, &mut MatchQuery::new())? {
                proxy.add_property(IntroducedProperty {
                    name: introduction.name.clone(),
                    type_name: introduction.type_name.clone(),
                    default: introduction.default.clone(),
                    visibility: introduction.visibility,
                });
            }
        }

        Ok((!proxy.is_empty()).then_some(proxy))
    }

    fn persist(&mut self, key: &str, class: &ClassMetadata, proxy: &ProxyClass, source: &str) -> AopResult<()> {
        let tags = vec![AOP_TAG.to_string(), key.to_string()];
        let suffix = &self.config.original_suffix;

        let wrapper = CompiledArtifact {
            class_key: key.to_string(),
            class_name: class.name.clone(),
            generated_source: render_wrapper(proxy)?,
            invalidation_tags: tags.clone(),
        };
        let original = CompiledArtifact {
            class_key: key.to_string(),
            class_name: proxy.original_class_name().to_string(),
            generated_source: render_original(source, class.short_name(), suffix)?,
            invalidation_tags: tags.clone(),
        };

        let original_key = format!("{}{}", key, suffix);
        self.cache.set(&original_key, &encode(&original)?, &tags)?;
        self.cache.set(key, &encode(&wrapper)?, &tags)?;
        debug!(class = %class.name, key, methods = proxy.intercepted_methods().count(), "wove class");
        Ok(())
    }

    fn read_artifact(&mut self, key: &str) -> AopResult<Option<CompiledArtifact>> {
        let Some(bytes) = self.cache.get(key)? else {
            return Ok(None);
        };
        let artifact: CompiledArtifact = serde_json::from_slice(&bytes)
            .map_err(|e| CacheError::MetadataError(format!("{}: {}", key, e)))?;
        Ok(Some(artifact))
    }

    fn record_error(&mut self, class: &str, error: AopError) {
        self.errors.push(ClassCompileError {
            class: class.to_string(),
            error,
        });
    }
}

fn encode(artifact: &CompiledArtifact) -> AopResult<Vec<u8>> {
    serde_json::to_vec(artifact)
        .map_err(|e| AopError::Cache(CacheError::MetadataError(e.to_string())))
}
