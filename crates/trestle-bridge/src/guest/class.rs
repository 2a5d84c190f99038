//! Guest class objects
//!
//! Guest types may be defined at any point during execution, so classes are
//! first-class heap values. Member lookup walks the linearized base list
//! and stops at the first class providing the name; the most-derived
//! definition always wins.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use trestle_sdk::HostClassDef;
use trestle_sdk::HostObject;

use crate::guest::error::GuestError;
use crate::guest::value::GuestRef;
use crate::interp::InterpId;

/// Kind of a guest class member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuestMemberKind {
    /// Instance method (receives a receiver)
    Instance,
    /// Static method (no receiver)
    Static,
    /// Constant value
    Constant,
}

/// One entry in a class member table.
#[derive(Clone)]
pub struct GuestMember {
    /// Member name
    pub name: String,
    /// Member kind
    pub kind: GuestMemberKind,
    /// Member value (a callable for methods, any value for constants)
    pub value: GuestRef,
}

impl GuestMember {
    /// Create a member entry
    pub fn new(name: impl Into<String>, kind: GuestMemberKind, value: GuestRef) -> Self {
        Self {
            name: name.into(),
            kind,
            value,
        }
    }
}

impl fmt::Debug for GuestMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuestMember")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Where a class came from.
#[derive(Clone)]
pub enum ClassOrigin {
    /// Defined by guest code
    Guest,
    /// Projection of a host class; carries the original descriptor
    Host(Arc<HostClassDef>),
}

/// Guest class object.
pub struct GuestClass {
    /// Class name
    pub name: String,
    home: InterpId,
    bases: Vec<Arc<GuestClass>>,
    members: Mutex<Vec<GuestMember>>,
    origin: ClassOrigin,
    requires_ctor: bool,
}

impl GuestClass {
    /// Define a guest-origin class
    pub fn define(
        home: InterpId,
        name: impl Into<String>,
        bases: Vec<Arc<GuestClass>>,
        members: Vec<GuestMember>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            home,
            bases,
            members: Mutex::new(members),
            origin: ClassOrigin::Guest,
            requires_ctor: false,
        })
    }

    /// Create a host-projection class.
    ///
    /// Projections are instantiable only through the host constructor
    /// protocol; raw allocation is rejected.
    pub(crate) fn host_projection(
        home: InterpId,
        name: impl Into<String>,
        bases: Vec<Arc<GuestClass>>,
        descriptor: Arc<HostClassDef>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            home,
            bases,
            members: Mutex::new(Vec::new()),
            origin: ClassOrigin::Host(descriptor),
            requires_ctor: true,
        })
    }

    /// Interpreter this class was defined in
    pub fn home(&self) -> InterpId {
        self.home
    }

    /// Direct base classes, most-derived-first resolution order
    pub fn bases(&self) -> &[Arc<GuestClass>] {
        &self.bases
    }

    /// The original host descriptor, for projection classes
    pub fn host_descriptor(&self) -> Option<&Arc<HostClassDef>> {
        match &self.origin {
            ClassOrigin::Host(desc) => Some(desc),
            ClassOrigin::Guest => None,
        }
    }

    /// Whether instances must be created through the constructor protocol
    pub fn requires_ctor(&self) -> bool {
        self.requires_ctor
    }

    /// Add a member.
    ///
    /// A name already present with the same kind is kept as-is: the first
    /// declaration wins within one class.
    pub fn add_member(&self, member: GuestMember) {
        let mut members = self.members.lock();
        if members
            .iter()
            .any(|m| m.kind == member.kind && m.name == member.name)
        {
            return;
        }
        members.push(member);
    }

    /// Own members in declaration order (no inherited members)
    pub fn own_members(&self) -> Vec<GuestMember> {
        self.members.lock().clone()
    }

    /// Linearized resolution order: this class, then bases depth-first
    /// left-to-right, first occurrence kept.
    pub fn mro(self: &Arc<Self>) -> Vec<Arc<GuestClass>> {
        let mut out: Vec<Arc<GuestClass>> = Vec::new();
        fn visit(class: &Arc<GuestClass>, out: &mut Vec<Arc<GuestClass>>) {
            if out.iter().any(|c| Arc::ptr_eq(c, class)) {
                return;
            }
            out.push(Arc::clone(class));
            for base in class.bases() {
                visit(base, out);
            }
        }
        visit(self, &mut out);
        out
    }

    /// Look up a member by name, walking the resolution order.
    ///
    /// Returns the member and the class that provided it.
    pub fn lookup(self: &Arc<Self>, name: &str) -> Option<(GuestMember, Arc<GuestClass>)> {
        for class in self.mro() {
            let found = class
                .members
                .lock()
                .iter()
                .find(|m| m.name == name)
                .cloned();
            if let Some(m) = found {
                return Some((m, class));
            }
        }
        None
    }

    /// Look up a member by name and kind, walking the resolution order
    pub fn lookup_kind(
        self: &Arc<Self>,
        name: &str,
        kind: GuestMemberKind,
    ) -> Option<(GuestMember, Arc<GuestClass>)> {
        for class in self.mro() {
            let found = class
                .members
                .lock()
                .iter()
                .find(|m| m.kind == kind && m.name == name)
                .cloned();
            if let Some(m) = found {
                return Some((m, class));
            }
        }
        None
    }

    /// Whether `self` is `other` or inherits from it (class identity)
    pub fn is_subclass_of(self: &Arc<Self>, other: &Arc<GuestClass>) -> bool {
        self.mro().iter().any(|c| Arc::ptr_eq(c, other))
    }

    /// The nearest host-projection ancestor in resolution order, if any
    pub fn host_root(self: &Arc<Self>) -> Option<Arc<HostClassDef>> {
        for class in self.mro() {
            if let Some(desc) = class.host_descriptor() {
                return Some(Arc::clone(desc));
            }
        }
        None
    }

    /// Allocate an uninitialized instance.
    ///
    /// Rejected for classes that require the constructor protocol: a
    /// projection can only be instantiated through the host constructor.
    pub fn allocate_raw(self: &Arc<Self>) -> Result<GuestRef, GuestError> {
        if self.requires_ctor {
            return Err(GuestError::new(
                "TypeError",
                format!(
                    "class '{}' cannot be instantiated without its constructor",
                    self.name
                ),
            ));
        }
        Ok(GuestRef::instance(Arc::clone(self), None))
    }

    /// Allocate an instance that forwards to a constructed host object.
    pub(crate) fn allocate_wrapped(self: &Arc<Self>, foreign: HostObject) -> GuestRef {
        GuestRef::instance(Arc::clone(self), Some(foreign))
    }
}

impl fmt::Debug for GuestClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuestClass")
            .field("name", &self.name)
            .field("bases", &self.bases.iter().map(|b| &b.name).collect::<Vec<_>>())
            .finish()
    }
}
