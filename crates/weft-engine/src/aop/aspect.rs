//! Aspects and the aspect registry
//!
//! An [`AspectContainer`] holds everything one aspect contributes: its
//! advisors, introductions and declared pointcuts. The [`AspectRegistry`]
//! owns the containers for one compilation run and resolves named pointcut
//! references. Both are populated before matching starts and only read
//! afterwards.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use super::advice::{Advice, AdviceKind, Advisor};
use super::pointcut::Pointcut;
use crate::reflect::Visibility;

/// Adds an interface to every class matched by the pointcut
#[derive(Debug, Clone)]
pub struct InterfaceIntroduction {
    /// Class-level pointcut
    pub pointcut: Pointcut,
    /// Interface name
    pub interface: String,
}

/// Adds a property to every class matched by the pointcut
#[derive(Debug, Clone)]
pub struct PropertyIntroduction {
    /// Class-level pointcut
    pub pointcut: Pointcut,
    /// Property name
    pub name: String,
    /// Declared type
    pub type_name: String,
    /// Initial value
    pub default: Value,
    /// Visibility of the property
    pub visibility: Visibility,
}

impl PropertyIntroduction {
    /// Create a public property introduction
    pub fn new(pointcut: Pointcut, name: &str, type_name: &str, default: Value) -> Self {
        Self {
            pointcut,
            name: name.to_string(),
            type_name: type_name.to_string(),
            default,
            visibility: Visibility::Public,
        }
    }

    /// Set the visibility
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }
}

/// Everything one aspect class contributes
#[derive(Debug, Clone)]
pub struct AspectContainer {
    aspect_class: String,
    advisors: Vec<Arc<Advisor>>,
    interface_introductions: Vec<InterfaceIntroduction>,
    property_introductions: Vec<PropertyIntroduction>,
    pointcuts: IndexMap<String, Pointcut>,
}

impl AspectContainer {
    /// Create an empty container
    pub fn new(aspect_class: &str) -> Self {
        Self {
            aspect_class: aspect_class.to_string(),
            advisors: Vec::new(),
            interface_introductions: Vec::new(),
            property_introductions: Vec::new(),
            pointcuts: IndexMap::new(),
        }
    }

    /// Aspect class name
    pub fn aspect_class(&self) -> &str {
        &self.aspect_class
    }

    /// Bind an advice to a pointcut
    pub fn add_advice(
        &mut self,
        kind: AdviceKind,
        name: &str,
        advice: Arc<dyn Advice>,
        pointcut: Pointcut,
    ) -> &mut Self {
        let advisor = Advisor::new(&self.aspect_class, name, kind, advice, pointcut);
        self.advisors.push(Arc::new(advisor));
        self
    }

    /// Add a prebuilt advisor
    pub fn add_advisor(&mut self, advisor: Advisor) -> &mut Self {
        self.advisors.push(Arc::new(advisor));
        self
    }

    /// Declare a named pointcut; a later declaration with the same name replaces it
    pub fn add_pointcut(&mut self, name: &str, pointcut: Pointcut) -> &mut Self {
        self.pointcuts.insert(name.to_string(), pointcut.named(name));
        self
    }

    /// Introduce an interface into matched classes
    pub fn add_interface_introduction(&mut self, pointcut: Pointcut, interface: &str) -> &mut Self {
        self.interface_introductions.push(InterfaceIntroduction {
            pointcut,
            interface: interface.to_string(),
        });
        self
    }

    /// Introduce a property into matched classes
    pub fn add_property_introduction(&mut self, introduction: PropertyIntroduction) -> &mut Self {
        self.property_introductions.push(introduction);
        self
    }

    /// A declared pointcut by name
    pub fn pointcut(&self, name: &str) -> Option<&Pointcut> {
        self.pointcuts.get(name)
    }

    /// Declared pointcuts in declaration order
    pub fn pointcuts(&self) -> impl Iterator<Item = &Pointcut> {
        self.pointcuts.values()
    }

    /// Advisors in declaration order
    pub fn advisors(&self) -> &[Arc<Advisor>] {
        &self.advisors
    }

    /// Interface introductions
    pub fn interface_introductions(&self) -> &[InterfaceIntroduction] {
        &self.interface_introductions
    }

    /// Property introductions
    pub fn property_introductions(&self) -> &[PropertyIntroduction] {
        &self.property_introductions
    }
}

/// The aspects taking part in one compilation run
#[derive(Debug, Clone, Default)]
pub struct AspectRegistry {
    containers: IndexMap<String, AspectContainer>,
}

impl AspectRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an aspect, replacing an earlier registration of the same class in place
    pub fn register(&mut self, container: AspectContainer) {
        self.containers
            .insert(container.aspect_class.clone(), container);
    }

    /// Number of registered aspects
    pub fn len(&self) -> usize {
        self.containers.len()
    }

    /// Check if no aspect is registered
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    /// The container of an aspect class
    pub fn container(&self, aspect_class: &str) -> Option<&AspectContainer> {
        self.containers.get(aspect_class)
    }

    /// Containers in registration order
    pub fn containers(&self) -> impl Iterator<Item = &AspectContainer> {
        self.containers.values()
    }

    /// Resolve a named pointcut
    pub fn find_pointcut(&self, aspect_class: &str, name: &str) -> Option<&Pointcut> {
        self.container(aspect_class)?.pointcut(name)
    }

    /// Every advisor, ordered by aspect registration then declaration
    pub fn advisors(&self) -> impl Iterator<Item = &Arc<Advisor>> {
        self.containers.values().flat_map(|c| c.advisors.iter())
    }

    /// Every interface introduction
    pub fn interface_introductions(&self) -> impl Iterator<Item = &InterfaceIntroduction> {
        self.containers
            .values()
            .flat_map(|c| c.interface_introductions.iter())
    }

    /// Every property introduction
    pub fn property_introductions(&self) -> impl Iterator<Item = &PropertyIntroduction> {
        self.containers
            .values()
            .flat_map(|c| c.property_introductions.iter())
    }
}
