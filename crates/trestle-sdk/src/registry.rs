//! Namespace registry for host classes and free functions
//!
//! The registry is the lookup surface the bridge consumes when projecting
//! host symbols, and the surface it registers projected guest classes back
//! into. Keys are fully-qualified dotted names.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::class::{HostClassDef, HostFunctionDef};

/// Registry of host classes and free functions, keyed by qualified name.
#[derive(Default)]
pub struct HostRegistry {
    classes: Mutex<HashMap<String, Arc<HostClassDef>>>,
    functions: Mutex<HashMap<String, Arc<HostFunctionDef>>>,
}

impl HostRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class under its qualified name.
    ///
    /// Re-registering the same name replaces the previous entry.
    pub fn register_class(&self, class: Arc<HostClassDef>) {
        self.classes
            .lock()
            .unwrap()
            .insert(class.qualified_name(), class);
    }

    /// Look up a class by qualified name
    pub fn lookup_class(&self, qualified: &str) -> Option<Arc<HostClassDef>> {
        self.classes.lock().unwrap().get(qualified).cloned()
    }

    /// All classes registered directly under a namespace, sorted by name
    pub fn classes_in(&self, namespace: &str) -> Vec<Arc<HostClassDef>> {
        let mut out: Vec<_> = self
            .classes
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.namespace() == namespace)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name().cmp(b.name()));
        out
    }

    /// Register a free function under its qualified name
    pub fn register_function(&self, func: Arc<HostFunctionDef>) {
        self.functions
            .lock()
            .unwrap()
            .insert(func.qualified_name(), func);
    }

    /// Look up a free function by qualified name
    pub fn lookup_function(&self, qualified: &str) -> Option<Arc<HostFunctionDef>> {
        self.functions.lock().unwrap().get(qualified).cloned()
    }

    /// All free functions registered directly under a namespace, sorted by name
    pub fn functions_in(&self, namespace: &str) -> Vec<Arc<HostFunctionDef>> {
        let mut out: Vec<_> = self
            .functions
            .lock()
            .unwrap()
            .values()
            .filter(|f| f.namespace == namespace)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Number of registered classes
    pub fn class_count(&self) -> usize {
        self.classes.lock().unwrap().len()
    }

    /// Number of registered free functions
    pub fn function_count(&self) -> usize {
        self.functions.lock().unwrap().len()
    }
}
