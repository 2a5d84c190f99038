//! Class projector — lazy materialization of classes across the boundary
//!
//! A projection registers a class in one runtime that forwards every
//! operation to the real class in the other. Projections are memoized by
//! descriptor identity and idempotent: the member-enumeration walk runs
//! exactly once per descriptor. Base classes are always fully projected
//! before a derived class is finalized; an in-progress marker turns an
//! inheritance cycle into a deterministic error instead of unbounded
//! recursion.
//!
//! Every exposed member becomes one proxy callable closing over an opaque
//! capsule that points at the original member descriptor, never a copy,
//! so reverse lookups preserve identity.

use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::debug;

use crate::guest::class::{GuestClass, GuestMember, GuestMemberKind};
use crate::guest::error::GuestError;
use crate::guest::value::GuestRef;
use crate::interp::GuestInterpreter;
use crate::{
    Bridge, BridgeError, BridgeResult, HostClassDef, HostError, HostFunctionDef, HostMethodDef,
    MemberKind, Visibility,
};

/// Proxy capsule payload: which host entry point a proxy callable binds.
///
/// Each variant carries the original descriptor, resolved through one
/// dispatch function per kind.
#[derive(Clone)]
pub enum ProxyKind {
    /// Bound or unbound instance method
    InstanceMethod {
        /// Declaring class
        class: Arc<HostClassDef>,
        /// Original method descriptor
        method: Arc<HostMethodDef>,
    },
    /// Static method
    StaticMethod {
        /// Declaring class
        class: Arc<HostClassDef>,
        /// Original method descriptor
        method: Arc<HostMethodDef>,
    },
    /// Constructor protocol of a host class
    Constructor {
        /// Class to construct
        class: Arc<HostClassDef>,
    },
    /// Free function
    FreeFunction {
        /// Original function descriptor
        func: Arc<HostFunctionDef>,
    },
}

impl fmt::Debug for ProxyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyKind::InstanceMethod { class, method } => {
                write!(f, "InstanceMethod({}.{})", class.name(), method.name)
            }
            ProxyKind::StaticMethod { class, method } => {
                write!(f, "StaticMethod({}.{})", class.name(), method.name)
            }
            ProxyKind::Constructor { class } => write!(f, "Constructor({})", class.name()),
            ProxyKind::FreeFunction { func } => {
                write!(f, "FreeFunction({})", func.qualified_name())
            }
        }
    }
}

impl Bridge {
    /// Project a host class as a guest class, memoized by descriptor
    /// identity per interpreter.
    pub fn project_host_class(
        &self,
        interp: &GuestInterpreter,
        class: &Arc<HostClassDef>,
    ) -> BridgeResult<GuestRef> {
        let desc_key = Arc::as_ptr(class) as usize;

        // A descriptor that itself projects a guest class resolves back to
        // the original guest class instead of a projection of a projection.
        if let Some(weak) = self.host_projection_sources.lock().get(&desc_key) {
            if let Some(original) = weak.upgrade() {
                return Ok(GuestRef::class(original));
            }
        }

        let cache_key = (interp.id(), desc_key);
        if let Some(existing) = self.host_class_cache.lock().get(&cache_key) {
            return Ok(existing.clone());
        }

        if !self.projections_in_progress.lock().insert(desc_key) {
            return Err(BridgeError::ProjectionCycle(class.name().to_string()));
        }
        let result = self.build_host_projection(interp, class);
        self.projections_in_progress.lock().remove(&desc_key);

        let projected = result?;
        self.host_class_cache
            .lock()
            .insert(cache_key, projected.clone());
        Ok(projected)
    }

    fn build_host_projection(
        &self,
        interp: &GuestInterpreter,
        class: &Arc<HostClassDef>,
    ) -> BridgeResult<GuestRef> {
        // Bases are fully projected before the derived class is finalized.
        let bases = match class.parent() {
            Some(parent) => {
                let base_value = self.project_host_class(interp, parent)?;
                let base = base_value
                    .as_class()
                    .ok_or_else(|| BridgeError::Resolution(parent.qualified_name()))?;
                vec![Arc::clone(base)]
            }
            None => Vec::new(),
        };

        self.enumeration_walks.fetch_add(1, Ordering::Relaxed);

        let gclass =
            GuestClass::host_projection(interp.id(), class.name(), bases, Arc::clone(class));

        for method in class.methods() {
            if !method.visibility.is_exposed() {
                continue;
            }
            let kind = match method.kind {
                // Construction goes through the class call protocol, not a
                // named member.
                MemberKind::Constructor => continue,
                MemberKind::Instance => GuestMemberKind::Instance,
                MemberKind::Static => GuestMemberKind::Static,
            };
            let proxy_kind = match method.kind {
                MemberKind::Instance => ProxyKind::InstanceMethod {
                    class: Arc::clone(class),
                    method: Arc::clone(method),
                },
                _ => ProxyKind::StaticMethod {
                    class: Arc::clone(class),
                    method: Arc::clone(method),
                },
            };
            // add_member keeps the first declaration when a name repeats.
            gclass.add_member(GuestMember::new(
                &method.name,
                kind,
                self.member_proxy(&method.name, proxy_kind),
            ));
        }

        for (name, value) in class.constants() {
            let converted = self.to_guest(interp, value)?;
            gclass.add_member(GuestMember::new(name, GuestMemberKind::Constant, converted));
        }

        debug!(class = %class.qualified_name(), "host class projected into guest");
        Ok(GuestRef::class(gclass))
    }

    /// Project a guest class as a host class descriptor, memoized by class
    /// identity.
    ///
    /// Runs lazily, on first observation of an instance of the type: the
    /// guest runtime may define types at any point during execution. The
    /// resulting descriptor is registered in the owning program's registry
    /// under the configured guest namespace.
    pub fn project_guest_class(
        &self,
        gclass: &Arc<GuestClass>,
    ) -> BridgeResult<Arc<HostClassDef>> {
        // A projection of a host class resolves back to its original
        // descriptor.
        if let Some(descriptor) = gclass.host_descriptor() {
            return Ok(Arc::clone(descriptor));
        }

        let key = Arc::as_ptr(gclass) as usize;
        if let Some(existing) = self.guest_class_cache.lock().get(&key) {
            return Ok(Arc::clone(existing));
        }

        if !self.projections_in_progress.lock().insert(key) {
            return Err(BridgeError::ProjectionCycle(gclass.name.clone()));
        }
        let result = self.build_guest_projection(gclass);
        self.projections_in_progress.lock().remove(&key);

        let projected = result?;
        self.guest_class_cache.lock().insert(key, Arc::clone(&projected));
        self.host_projection_sources
            .lock()
            .insert(Arc::as_ptr(&projected) as usize, Arc::downgrade(gclass));

        if let Some(interp) = self.interpreter(gclass.home()) {
            interp
                .program()
                .registry()
                .register_class(Arc::clone(&projected));
        }

        debug!(class = %gclass.name, "guest class projected into host");
        Ok(projected)
    }

    fn build_guest_projection(&self, gclass: &Arc<GuestClass>) -> BridgeResult<Arc<HostClassDef>> {
        let parent = match gclass.bases().first() {
            Some(base) => Some(self.project_guest_class(base)?),
            None => None,
        };

        self.enumeration_walks.fetch_add(1, Ordering::Relaxed);

        let mut builder = HostClassDef::builder(gclass.name.clone())
            .namespace(self.config().guest_namespace.clone());
        if let Some(parent) = parent {
            builder = builder.parent(parent);
        }

        let home = gclass.home();
        for member in gclass.own_members() {
            // Leading underscore marks a private-equivalent member.
            if member.name.starts_with('_') {
                continue;
            }
            match member.kind {
                GuestMemberKind::Instance => {
                    let bridge = self.weak();
                    let target = member.value.clone();
                    builder = builder.method(
                        &member.name,
                        Visibility::Public,
                        move |recv, args| {
                            let bridge = bridge.upgrade().ok_or_else(|| {
                                HostError::new("StateError", "bridge is shut down")
                            })?;
                            bridge.enter_guest_member(home, &target, recv, args)
                        },
                    );
                }
                GuestMemberKind::Static => {
                    let bridge = self.weak();
                    let target = member.value.clone();
                    builder = builder.static_method(
                        &member.name,
                        Visibility::Public,
                        move |_recv, args| {
                            let bridge = bridge.upgrade().ok_or_else(|| {
                                HostError::new("StateError", "bridge is shut down")
                            })?;
                            bridge.enter_guest_member(home, &target, None, args)
                        },
                    );
                }
                GuestMemberKind::Constant => {
                    let converted = match self.interpreter(home) {
                        Some(interp) => self.to_host(&interp, &member.value)?,
                        None => self.to_host_scalar(&member.value)?,
                    };
                    builder = builder.constant(&member.name, converted);
                }
            }
        }

        // Host-side construction routes through the guest class protocol
        // and pins the resulting guest instance to the fresh host object.
        let bridge = self.weak();
        let ctor_class = Arc::clone(gclass);
        builder = builder.constructor(move |recv, args| {
            let bridge = bridge
                .upgrade()
                .ok_or_else(|| HostError::new("StateError", "bridge is shut down"))?;
            bridge.host_construct_guest(&ctor_class, recv, args)
        });

        Ok(builder.build())
    }

    /// Build the proxy callable for one host member.
    pub(crate) fn member_proxy(&self, name: &str, kind: ProxyKind) -> GuestRef {
        let capsule = GuestRef::capsule(kind);
        let bridge = self.weak();
        GuestRef::native_callable(
            name,
            Arc::new(move |interp, recv, args| {
                let bridge = bridge
                    .upgrade()
                    .ok_or_else(|| GuestError::new("RuntimeError", "bridge is shut down"))?;
                let kind = capsule
                    .as_capsule()
                    .ok_or_else(|| GuestError::new("TypeError", "corrupt proxy capsule"))?;
                bridge.dispatch_proxy(kind, interp, recv, args)
            }),
        )
    }

    /// Build the proxy callable for a host free function.
    pub fn free_function_proxy(&self, func: &Arc<HostFunctionDef>) -> GuestRef {
        self.member_proxy(
            func.name.as_str(),
            ProxyKind::FreeFunction {
                func: Arc::clone(func),
            },
        )
    }
}
