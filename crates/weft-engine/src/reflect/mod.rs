//! Reflection Collaborator
//!
//! Read-only oracle over already-analyzed class metadata. Filters query it
//! for finality, visibility, parameters and annotations; the proxy compiler
//! queries it for the candidate universe and the original source text.
//!
//! [`ClassMetadataRegistry`] is the in-memory implementation. Hosts with
//! their own metadata store implement [`ReflectionService`] directly.

mod class_metadata;

pub use class_metadata::{
    short_class_name, ClassMetadata, ClassMetadataRegistry, MethodMetadata, ParameterInfo,
    Receiver, Visibility,
};

use thiserror::Error;

/// Errors raised while reflecting on a class
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReflectionError {
    /// No metadata is registered for the class
    #[error("Class not found: {0}")]
    ClassNotFound(String),

    /// The class is registered but its source cannot be loaded
    #[error("Source of class {0} is not available")]
    SourceUnavailable(String),

    /// The class is internal and refuses reflection
    #[error("Class {0} cannot be reflected")]
    NotReflectable(String),
}

/// Read-only access to class metadata
pub trait ReflectionService: Send + Sync {
    /// Look up a class by its fully qualified name
    fn class(&self, name: &str) -> Option<&ClassMetadata>;

    /// Names of every known class, in a stable order
    fn class_names(&self) -> Vec<String>;

    /// Load the original source text of a class
    fn load_source(&self, name: &str) -> Result<String, ReflectionError> {
        let class = self
            .class(name)
            .ok_or_else(|| ReflectionError::ClassNotFound(name.to_string()))?;
        if class.is_internal {
            return Err(ReflectionError::NotReflectable(name.to_string()));
        }
        class
            .source
            .clone()
            .ok_or_else(|| ReflectionError::SourceUnavailable(name.to_string()))
    }

    /// Check if a class is final
    fn is_class_final(&self, name: &str) -> bool {
        self.class(name).is_some_and(|c| c.is_final)
    }

    /// Check if a method of a class is final
    fn is_method_final(&self, class: &str, method: &str) -> bool {
        self.method(class, method).is_some_and(|m| m.is_final)
    }

    /// Look up a method of a class
    fn method(&self, class: &str, method: &str) -> Option<&MethodMetadata> {
        self.class(class).and_then(|c| c.method(method))
    }

    /// Declared parameters of a method
    fn get_method_parameters(&self, class: &str, method: &str) -> Option<&[ParameterInfo]> {
        self.method(class, method).map(|m| m.parameters.as_slice())
    }

    /// Visibility of a method
    fn method_visibility(&self, class: &str, method: &str) -> Option<Visibility> {
        self.method(class, method).map(|m| m.visibility)
    }

    /// Check if a class carries an annotation
    fn is_class_annotated_with(&self, class: &str, annotation: &str) -> bool {
        self.class(class).is_some_and(|c| c.has_annotation(annotation))
    }

    /// Check if a method carries a tag
    fn is_method_tagged_with(&self, class: &str, method: &str, tag: &str) -> bool {
        self.method(class, method).is_some_and(|m| m.has_tag(tag))
    }

    /// Check if `class` is `ancestor` or extends/implements it, directly or transitively
    fn is_subclass_of(&self, class: &str, ancestor: &str) -> bool {
        let mut pending = vec![class.to_string()];
        let mut seen = rustc_hash::FxHashSet::default();

        while let Some(current) = pending.pop() {
            if current == ancestor {
                return true;
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(meta) = self.class(&current) {
                pending.extend(meta.parent.iter().cloned());
                pending.extend(meta.interfaces.iter().cloned());
            }
        }

        false
    }
}

impl ReflectionService for ClassMetadataRegistry {
    fn class(&self, name: &str) -> Option<&ClassMetadata> {
        self.get(name)
    }

    fn class_names(&self) -> Vec<String> {
        self.iter().map(|c| c.name.clone()).collect()
    }
}
