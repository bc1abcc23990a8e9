//! Class Metadata for Reflection
//!
//! Stores the metadata the weaver needs about candidate classes: the
//! inheritance chain, modifier flags, annotations, and the declared methods
//! with their parameters. Metadata is produced by an analysis step outside
//! this crate and is read-only once registered.

use rustc_hash::FxHashMap;
use std::fmt;
use std::str::FromStr;

/// Visibility of a class member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Visibility {
    /// Reachable from anywhere
    #[default]
    Public,
    /// Reachable from the class and its subclasses
    Protected,
    /// Reachable from the declaring class only
    Private,
}

impl Visibility {
    /// Keyword used in pointcut expressions and generated source
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Protected => "protected",
            Visibility::Private => "private",
        }
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "protected" => Ok(Visibility::Protected),
            "private" => Ok(Visibility::Private),
            other => Err(format!("unknown visibility '{}'", other)),
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a method receives its instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Receiver {
    /// `&self`
    #[default]
    Shared,
    /// `&mut self`
    Exclusive,
}

impl Receiver {
    /// Source form of the receiver
    pub fn as_str(&self) -> &'static str {
        match self {
            Receiver::Shared => "&self",
            Receiver::Exclusive => "&mut self",
        }
    }
}

/// Parameter information for reflection
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterInfo {
    /// Parameter name
    pub name: String,
    /// Parameter type, as written in the source
    pub type_name: String,
    /// Parameter index
    pub index: usize,
    /// Whether the parameter is optional
    pub is_optional: bool,
}

impl ParameterInfo {
    /// Create a required parameter
    pub fn new(name: &str, type_name: &str, index: usize) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name.to_string(),
            index,
            is_optional: false,
        }
    }
}

/// Method information for reflection
#[derive(Debug, Clone, PartialEq)]
pub struct MethodMetadata {
    /// Method name
    pub name: String,
    /// Class that declares the method (may be an ancestor of the owning class)
    pub declaring_class: String,
    /// Member visibility
    pub visibility: Visibility,
    /// Method cannot be overridden
    pub is_final: bool,
    /// Associated function without a receiver
    pub is_static: bool,
    /// Receiver kind for instance methods
    pub receiver: Receiver,
    /// Declared parameters in order
    pub parameters: Vec<ParameterInfo>,
    /// Return type, as written in the source (`None` for unit)
    pub return_type: Option<String>,
    /// Tags (method-level annotations)
    pub tags: Vec<String>,
}

impl MethodMetadata {
    /// Create a public instance method declared by `declaring_class`
    pub fn new(name: &str, declaring_class: &str) -> Self {
        Self {
            name: name.to_string(),
            declaring_class: declaring_class.to_string(),
            visibility: Visibility::Public,
            is_final: false,
            is_static: false,
            receiver: Receiver::Shared,
            parameters: Vec::new(),
            return_type: None,
            tags: Vec::new(),
        }
    }

    /// Set the visibility
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Mark the method as final
    pub fn final_method(mut self) -> Self {
        self.is_final = true;
        self
    }

    /// Append a parameter; the index is assigned from its position
    pub fn with_parameter(mut self, name: &str, type_name: &str) -> Self {
        let index = self.parameters.len();
        self.parameters.push(ParameterInfo::new(name, type_name, index));
        self
    }

    /// Set the return type
    pub fn returning(mut self, type_name: &str) -> Self {
        self.return_type = Some(type_name.to_string());
        self
    }

    /// Attach a tag
    pub fn tagged(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }

    /// Check if the method carries a tag
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Names of the declared parameters in order
    pub fn parameter_names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }
}

/// Reflection metadata for a single class
#[derive(Debug, Clone, Default)]
pub struct ClassMetadata {
    /// Fully qualified class name, e.g. `acme::billing::Invoice`
    pub name: String,
    /// Parent class, if any
    pub parent: Option<String>,
    /// Implemented interfaces
    pub interfaces: Vec<String>,
    /// The type is an interface (trait) and has no body to wrap
    pub is_interface: bool,
    /// The class cannot be extended
    pub is_final: bool,
    /// The class is internal and cannot be reflected
    pub is_internal: bool,
    /// Class-level annotations
    pub annotations: Vec<String>,
    /// Original source text, when available
    pub source: Option<String>,

    /// Method name to index mapping
    method_indices: FxHashMap<String, usize>,
    /// Methods in declaration order (including inherited ones)
    methods: Vec<MethodMetadata>,
}

impl ClassMetadata {
    /// Create metadata for a plain class
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Unqualified class name (last path segment)
    pub fn short_name(&self) -> &str {
        short_class_name(&self.name)
    }

    /// Add a method, replacing an earlier one with the same name
    pub fn add_method(&mut self, method: MethodMetadata) {
        if let Some(&index) = self.method_indices.get(&method.name) {
            self.methods[index] = method;
            return;
        }
        self.method_indices.insert(method.name.clone(), self.methods.len());
        self.methods.push(method);
    }

    /// Add a class-level annotation
    pub fn add_annotation(&mut self, annotation: &str) {
        self.annotations.push(annotation.to_string());
    }

    /// Get a method by name
    pub fn method(&self, name: &str) -> Option<&MethodMetadata> {
        self.method_indices.get(name).map(|&i| &self.methods[i])
    }

    /// Methods in declaration order
    pub fn methods(&self) -> &[MethodMetadata] {
        &self.methods
    }

    /// Check if method exists
    pub fn has_method(&self, name: &str) -> bool {
        self.method_indices.contains_key(name)
    }

    /// Check if the class carries an annotation
    pub fn has_annotation(&self, annotation: &str) -> bool {
        self.annotations.iter().any(|a| a == annotation)
    }
}

/// Last segment of a `::`-qualified name
pub fn short_class_name(name: &str) -> &str {
    name.rsplit("::").next().unwrap_or(name)
}

/// Registry of class metadata for reflection
#[derive(Debug, Default)]
pub struct ClassMetadataRegistry {
    /// Class name to index mapping
    indices: FxHashMap<String, usize>,
    /// Metadata in registration order
    classes: Vec<ClassMetadata>,
}

impl ClassMetadataRegistry {
    /// Create new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register metadata for a class, replacing earlier metadata with the same name
    pub fn register(&mut self, metadata: ClassMetadata) {
        if let Some(&index) = self.indices.get(&metadata.name) {
            self.classes[index] = metadata;
            return;
        }
        self.indices.insert(metadata.name.clone(), self.classes.len());
        self.classes.push(metadata);
    }

    /// Get metadata for a class
    pub fn get(&self, name: &str) -> Option<&ClassMetadata> {
        self.indices.get(name).map(|&i| &self.classes[i])
    }

    /// Check if a class has metadata
    pub fn has_metadata(&self, name: &str) -> bool {
        self.indices.contains_key(name)
    }

    /// Iterate classes in registration order
    pub fn iter(&self) -> impl Iterator<Item = &ClassMetadata> {
        self.classes.iter()
    }

    /// Get number of classes with metadata
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
