//! Object wrapper — dual reference-count bookkeeping
//!
//! Wrapping takes exactly one strong reference on the native object the
//! moment the wrapper is created, and wrapper destruction releases exactly
//! one. Identity tables hold weak entries so repeated wraps of the same
//! native object return the same wrapper for as long as that wrapper lives,
//! without the table itself keeping anything alive.
//!
//! Wraps performed while a lock scope is open are additionally recorded in
//! the scope's keep-alive table, so a handle cannot be invalidated by the
//! other runtime's collector while a call is in flight. That pin is
//! transient: it drops with the scope.

use std::sync::Arc;

use crate::guest::value::{GuestPayload, GuestRef};
use crate::interp::GuestInterpreter;
use crate::{Bridge, BridgeError, BridgeResult, HostClassDef, HostObject};

impl Bridge {
    /// Wrap a host object as a guest instance of its projected class.
    ///
    /// Idempotent per interpreter: wrapping the same host object twice
    /// yields the same guest wrapper.
    pub fn wrap_host(
        &self,
        interp: &GuestInterpreter,
        obj: &HostObject,
    ) -> BridgeResult<GuestRef> {
        // A wrapper of a guest value unwraps instead of double-wrapping.
        if let Some(original) = self.unwrap_guest(obj) {
            return Ok(original);
        }

        let key = (interp.id(), obj.id());
        {
            let mut table = self.guest_wrappers.lock();
            if let Some(weak) = table.get(&key) {
                match weak.upgrade() {
                    Some(existing) => {
                        self.lock_manager().record_guest_keep_alive(existing.clone());
                        return Ok(existing);
                    }
                    None => {
                        table.remove(&key);
                    }
                }
            }
        }

        let class_value = self.project_host_class(interp, obj.class())?;
        let class = class_value
            .as_class()
            .ok_or_else(|| BridgeError::Resolution(obj.class().qualified_name()))?;

        // The clone below is the wrapper's one strong reference on the
        // host object; it is released when the wrapper is destroyed.
        let wrapper = class.allocate_wrapped(obj.clone());

        self.guest_wrappers
            .lock()
            .insert(key, wrapper.downgrade());
        self.lock_manager().record_guest_keep_alive(wrapper.clone());
        self.lock_manager().record_host_keep_alive(obj.clone());

        Ok(wrapper)
    }

    /// Unwrap a guest wrapper instance back to the host object it pins.
    ///
    /// Identity-preserving: no copy is made.
    pub fn unwrap_host(&self, value: &GuestRef) -> Option<HostObject> {
        value.as_instance()?.foreign().cloned()
    }

    /// Wrap a guest value as a host object.
    ///
    /// Instances get their class lazily projected into the host registry
    /// on first observation; classes, callables, and modules cross as
    /// opaque wrapper objects.
    pub fn wrap_guest(&self, value: &GuestRef) -> BridgeResult<HostObject> {
        // A wrapper of a host object unwraps instead of double-wrapping.
        if let Some(inst) = value.as_instance() {
            if let Some(original) = inst.foreign() {
                return Ok(original.clone());
            }
        }

        let key = value.identity();
        {
            let mut table = self.host_wrappers.lock();
            if let Some(weak) = table.get(&key) {
                match weak.upgrade() {
                    Some(existing) => {
                        self.lock_manager().record_host_keep_alive(existing.clone());
                        return Ok(existing);
                    }
                    None => {
                        table.remove(&key);
                    }
                }
            }
        }

        let class = match value.payload() {
            GuestPayload::Instance(inst) => self.project_guest_class(inst.class())?,
            GuestPayload::Class(_) => self.opaque_wrapper_class("GuestClass"),
            GuestPayload::Callable(_) => self.opaque_wrapper_class("GuestCallable"),
            GuestPayload::Module(_) => self.opaque_wrapper_class("GuestModule"),
            _ => {
                return Err(BridgeError::Conversion {
                    type_name: value.type_name(),
                })
            }
        };

        let wrapper = HostObject::new(class);
        // The clone below is the wrapper's one strong reference on the
        // guest value, pinned so the guest collector cannot reclaim it.
        wrapper
            .attach_foreign(Arc::new(value.clone()))
            .expect("fresh wrapper already carries a foreign payload");

        self.host_wrappers.lock().insert(key, wrapper.downgrade());
        self.lock_manager().record_host_keep_alive(wrapper.clone());
        self.lock_manager().record_guest_keep_alive(value.clone());

        Ok(wrapper)
    }

    /// Unwrap a host wrapper back to the guest value it pins.
    ///
    /// Identity-preserving: no copy is made.
    pub fn unwrap_guest(&self, obj: &HostObject) -> Option<GuestRef> {
        obj.foreign()?.downcast_ref::<GuestRef>().cloned()
    }

    fn opaque_wrapper_class(&self, kind: &'static str) -> Arc<HostClassDef> {
        let mut classes = self.opaque_wrapper_classes.lock();
        if let Some(class) = classes.get(kind) {
            return Arc::clone(class);
        }
        let class = HostClassDef::builder(kind)
            .namespace(self.config().guest_namespace.clone())
            .build();
        classes.insert(kind, Arc::clone(&class));
        class
    }
}
