//! Host class, method, and free-function descriptors
//!
//! These types form the enumeration protocol the bridge consumes: a class
//! exposes its own instance methods, static methods, constants, and parent
//! in declaration order, each member carrying a visibility level. Method
//! descriptors are shared (`Arc`) so that a proxy built from one keeps the
//! original descriptor's identity.

use std::fmt;
use std::sync::Arc;

use crate::error::HostResult;
use crate::object::HostObject;
use crate::value::HostValue;

/// Member visibility level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Visible everywhere
    Public,
    /// Visible to the class and its descendants
    Protected,
    /// Visible to the declaring class only
    Private,
}

impl Visibility {
    /// Whether a member at this level is exposed across the bridge
    pub fn is_exposed(self) -> bool {
        !matches!(self, Visibility::Private)
    }
}

/// Kind of a class member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    /// Instance method (receives a receiver object)
    Instance,
    /// Static method (no receiver)
    Static,
    /// Constructor
    Constructor,
}

/// Host callable implementation.
///
/// Receives an optional receiver and the argument list; static methods,
/// constructors, and free functions are called with no receiver.
pub type HostFn =
    Arc<dyn Fn(Option<&HostObject>, &[HostValue]) -> HostResult<HostValue> + Send + Sync>;

/// Descriptor for one class member.
#[derive(Clone)]
pub struct HostMethodDef {
    /// Member name
    pub name: String,
    /// Instance / static / constructor
    pub kind: MemberKind,
    /// Visibility level
    pub visibility: Visibility,
    imp: HostFn,
}

impl HostMethodDef {
    /// Create a method descriptor
    pub fn new(
        name: impl Into<String>,
        kind: MemberKind,
        visibility: Visibility,
        imp: HostFn,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            visibility,
            imp,
        }
    }

    /// Invoke the underlying implementation
    pub fn invoke(&self, recv: Option<&HostObject>, args: &[HostValue]) -> HostResult<HostValue> {
        (self.imp)(recv, args)
    }
}

impl fmt::Debug for HostMethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostMethodDef")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("visibility", &self.visibility)
            .finish()
    }
}

/// Descriptor for a free function registered under a namespace.
#[derive(Clone)]
pub struct HostFunctionDef {
    /// Function name
    pub name: String,
    /// Dotted namespace path (may be empty)
    pub namespace: String,
    /// Visibility level
    pub visibility: Visibility,
    imp: HostFn,
}

impl HostFunctionDef {
    /// Create a free-function descriptor
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        visibility: Visibility,
        imp: HostFn,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            visibility,
            imp,
        }
    }

    /// Fully-qualified dotted name
    pub fn qualified_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    /// Invoke the underlying implementation
    pub fn invoke(&self, args: &[HostValue]) -> HostResult<HostValue> {
        (self.imp)(None, args)
    }
}

impl fmt::Debug for HostFunctionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunctionDef")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .finish()
    }
}

/// Host class descriptor.
///
/// Members are kept in declaration order; the parent chain forms the
/// linearized base list. Descriptors are immutable once built.
#[derive(Debug)]
pub struct HostClassDef {
    name: String,
    namespace: String,
    parent: Option<Arc<HostClassDef>>,
    methods: Vec<Arc<HostMethodDef>>,
    constants: Vec<(String, HostValue)>,
}

impl HostClassDef {
    /// Start building a class descriptor
    pub fn builder(name: impl Into<String>) -> HostClassBuilder {
        HostClassBuilder {
            name: name.into(),
            namespace: String::new(),
            parent: None,
            methods: Vec::new(),
            constants: Vec::new(),
        }
    }

    /// Class name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dotted namespace path (may be empty)
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Fully-qualified dotted name
    pub fn qualified_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    /// Parent class, if any
    pub fn parent(&self) -> Option<&Arc<HostClassDef>> {
        self.parent.as_ref()
    }

    /// Own members in declaration order (does not include inherited members)
    pub fn methods(&self) -> &[Arc<HostMethodDef>] {
        &self.methods
    }

    /// Own constants in declaration order
    pub fn constants(&self) -> &[(String, HostValue)] {
        &self.constants
    }

    /// Linearized base list: this class first, then each ancestor in order
    pub fn linearized_bases(self: &Arc<Self>) -> Vec<Arc<HostClassDef>> {
        let mut out = vec![Arc::clone(self)];
        let mut cur = self.parent.clone();
        while let Some(c) = cur {
            cur = c.parent.clone();
            out.push(c);
        }
        out
    }

    /// Find a member by name and kind.
    ///
    /// Resolution is declaration order within this class, then the first
    /// matching ancestor; the most-derived definition wins.
    pub fn find_method(&self, name: &str, kind: MemberKind) -> Option<Arc<HostMethodDef>> {
        if let Some(m) = self
            .methods
            .iter()
            .find(|m| m.kind == kind && m.name == name)
        {
            return Some(Arc::clone(m));
        }
        self.parent.as_ref()?.find_method(name, kind)
    }

    /// The constructor, searching the parent chain
    pub fn constructor(&self) -> Option<Arc<HostMethodDef>> {
        if let Some(m) = self
            .methods
            .iter()
            .find(|m| m.kind == MemberKind::Constructor)
        {
            return Some(Arc::clone(m));
        }
        self.parent.as_ref()?.constructor()
    }

    /// Whether `self` is `other` or inherits from it (descriptor identity)
    pub fn is_subclass_of(self: &Arc<Self>, other: &Arc<HostClassDef>) -> bool {
        self.linearized_bases()
            .iter()
            .any(|c| Arc::ptr_eq(c, other))
    }
}

/// Builder for [`HostClassDef`].
pub struct HostClassBuilder {
    name: String,
    namespace: String,
    parent: Option<Arc<HostClassDef>>,
    methods: Vec<Arc<HostMethodDef>>,
    constants: Vec<(String, HostValue)>,
}

impl HostClassBuilder {
    /// Set the namespace path
    pub fn namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = ns.into();
        self
    }

    /// Set the parent class
    pub fn parent(mut self, parent: Arc<HostClassDef>) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Add an instance method
    pub fn method(
        mut self,
        name: impl Into<String>,
        visibility: Visibility,
        imp: impl Fn(Option<&HostObject>, &[HostValue]) -> HostResult<HostValue>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.methods.push(Arc::new(HostMethodDef::new(
            name,
            MemberKind::Instance,
            visibility,
            Arc::new(imp),
        )));
        self
    }

    /// Add a static method
    pub fn static_method(
        mut self,
        name: impl Into<String>,
        visibility: Visibility,
        imp: impl Fn(Option<&HostObject>, &[HostValue]) -> HostResult<HostValue>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.methods.push(Arc::new(HostMethodDef::new(
            name,
            MemberKind::Static,
            visibility,
            Arc::new(imp),
        )));
        self
    }

    /// Set the constructor
    pub fn constructor(
        mut self,
        imp: impl Fn(Option<&HostObject>, &[HostValue]) -> HostResult<HostValue>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.methods.push(Arc::new(HostMethodDef::new(
            "constructor",
            MemberKind::Constructor,
            Visibility::Public,
            Arc::new(imp),
        )));
        self
    }

    /// Add a class constant
    pub fn constant(mut self, name: impl Into<String>, value: HostValue) -> Self {
        self.constants.push((name.into(), value));
        self
    }

    /// Finish, producing a shared descriptor
    pub fn build(self) -> Arc<HostClassDef> {
        Arc::new(HostClassDef {
            name: self.name,
            namespace: self.namespace,
            parent: self.parent,
            methods: self.methods,
            constants: self.constants,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> impl Fn(Option<&HostObject>, &[HostValue]) -> HostResult<HostValue> {
        |_recv, _args| Ok(HostValue::Null)
    }

    #[test]
    fn test_qualified_name() {
        let c = HostClassDef::builder("Point").namespace("geo").build();
        assert_eq!(c.qualified_name(), "geo.Point");

        let bare = HostClassDef::builder("Point").build();
        assert_eq!(bare.qualified_name(), "Point");
    }

    #[test]
    fn test_find_method_prefers_most_derived() {
        let base = HostClassDef::builder("Base")
            .method("greet", Visibility::Public, noop())
            .method("only_base", Visibility::Public, noop())
            .build();
        let derived = HostClassDef::builder("Derived")
            .parent(Arc::clone(&base))
            .method("greet", Visibility::Public, noop())
            .build();

        let m = derived.find_method("greet", MemberKind::Instance).unwrap();
        let own = &derived.methods()[0];
        assert!(Arc::ptr_eq(&m, own));

        let inherited = derived
            .find_method("only_base", MemberKind::Instance)
            .unwrap();
        assert!(Arc::ptr_eq(&inherited, &base.methods()[1]));
    }

    #[test]
    fn test_find_method_distinguishes_kinds() {
        let c = HostClassDef::builder("C")
            .static_method("make", Visibility::Public, noop())
            .build();
        assert!(c.find_method("make", MemberKind::Static).is_some());
        assert!(c.find_method("make", MemberKind::Instance).is_none());
    }

    #[test]
    fn test_linearized_bases_order() {
        let a = HostClassDef::builder("A").build();
        let b = HostClassDef::builder("B").parent(Arc::clone(&a)).build();
        let c = HostClassDef::builder("C").parent(Arc::clone(&b)).build();

        let bases = c.linearized_bases();
        let names: Vec<&str> = bases.iter().map(|x| x.name()).collect();
        assert_eq!(names, ["C", "B", "A"]);
        assert!(c.is_subclass_of(&a));
        assert!(!a.is_subclass_of(&c));
    }

    #[test]
    fn test_constructor_inherited() {
        let base = HostClassDef::builder("Base").constructor(noop()).build();
        let derived = HostClassDef::builder("Derived")
            .parent(Arc::clone(&base))
            .build();
        assert!(derived.constructor().is_some());
    }

    #[test]
    fn test_visibility_exposure() {
        assert!(Visibility::Public.is_exposed());
        assert!(Visibility::Protected.is_exposed());
        assert!(!Visibility::Private.is_exposed());
    }
}
