//! Call dispatcher — routing cross-boundary calls
//!
//! Every host-facing entry point converts its arguments, opens a lock scope
//! on the target interpreter, performs the call, converts the result back,
//! and closes the scope before returning. Partial argument conversion
//! aborts before the call: no guest code runs with partially-converted
//! arguments. Native exceptions raised during a call are captured by the
//! exception translator and re-raised in the caller's runtime.
//!
//! The reverse path is `dispatch_proxy`: one resolution function per proxy
//! kind, invoked when guest code calls a projected host member.

use std::sync::Arc;

use crate::guest::class::{GuestClass, GuestMemberKind};
use crate::guest::error::{GuestError, GuestFrame};
use crate::guest::value::{GuestPayload, GuestRef};
use crate::interp::{FrameGuard, GuestInterpreter, InterpId};
use crate::project::ProxyKind;
use crate::{
    Bridge, BridgeError, BridgeResult, HostClassDef, HostError, HostObject, HostResult, HostValue,
    MemberKind,
};

impl Bridge {
    // ========================================================================
    // Host-facing call surface
    // ========================================================================

    /// Call a free function reachable as `module.name` in the guest
    /// namespace, with host arguments.
    pub fn call_free_function(
        &self,
        interp: &Arc<GuestInterpreter>,
        qualified: &str,
        args: &[HostValue],
    ) -> BridgeResult<HostValue> {
        let _scope = self.acquire(interp);
        let callee = interp
            .resolve(qualified)
            .ok_or_else(|| BridgeError::Resolution(qualified.to_string()))?;
        let gargs = self.convert_args_to_guest(interp, args)?;
        let result = self
            .call_guest(interp, &callee, None, &gargs)
            .map_err(|e| self.guest_failure(interp, e))?;
        self.to_host(interp, &result)
    }

    /// Construct an instance of a guest class (native or projected) with
    /// host arguments.
    pub fn call_constructor(
        &self,
        interp: &Arc<GuestInterpreter>,
        class: &GuestRef,
        args: &[HostValue],
    ) -> BridgeResult<HostValue> {
        let _scope = self.acquire(interp);
        let gclass = class
            .as_class()
            .ok_or_else(|| BridgeError::Resolution(format!("{} is not a class", class.repr())))?;
        let gargs = self.convert_args_to_guest(interp, args)?;
        let instance = self
            .construct_guest(interp, gclass, &gargs)
            .map_err(|e| self.guest_failure(interp, e))?;
        self.to_host(interp, &instance)
    }

    /// Call an instance method on a guest class.
    ///
    /// By the receiver-offset convention `args[0]` is the receiver; the
    /// foreign call is built from the remaining arguments so the receiver
    /// is not double-counted. When `args[0]` does not carry an instance of
    /// the class, a same-named static method is tried before failing.
    pub fn call_instance_method(
        &self,
        interp: &Arc<GuestInterpreter>,
        class: &GuestRef,
        name: &str,
        args: &[HostValue],
    ) -> BridgeResult<HostValue> {
        let _scope = self.acquire(interp);
        let gclass = class
            .as_class()
            .ok_or_else(|| BridgeError::Resolution(format!("{} is not a class", class.repr())))?;
        let gargs = self.convert_args_to_guest(interp, args)?;

        if let Some((member, _)) = gclass.lookup_kind(name, GuestMemberKind::Instance) {
            if let Some(recv) = gargs.first() {
                if recv.isinstance(gclass) {
                    let result = self
                        .call_guest(interp, &member.value, Some(recv), &gargs[1..])
                        .map_err(|e| self.guest_failure(interp, e))?;
                    return self.to_host(interp, &result);
                }
            }
        }

        // Unbound invocation with no usable receiver: fall back to a
        // same-named static method on the declaring class.
        if let Some((member, _)) = gclass.lookup_kind(name, GuestMemberKind::Static) {
            let result = self
                .call_guest(interp, &member.value, None, &gargs)
                .map_err(|e| self.guest_failure(interp, e))?;
            return self.to_host(interp, &result);
        }

        Err(BridgeError::Resolution(format!(
            "{}.{} (no matching instance or static method)",
            gclass.name, name
        )))
    }

    /// Call a static method on a guest class with host arguments.
    pub fn call_static_method(
        &self,
        interp: &Arc<GuestInterpreter>,
        class: &GuestRef,
        name: &str,
        args: &[HostValue],
    ) -> BridgeResult<HostValue> {
        let _scope = self.acquire(interp);
        let gclass = class
            .as_class()
            .ok_or_else(|| BridgeError::Resolution(format!("{} is not a class", class.repr())))?;
        let (member, _) = gclass
            .lookup_kind(name, GuestMemberKind::Static)
            .ok_or_else(|| BridgeError::Resolution(format!("{}.{}", gclass.name, name)))?;
        let gargs = self.convert_args_to_guest(interp, args)?;
        let result = self
            .call_guest(interp, &member.value, None, &gargs)
            .map_err(|e| self.guest_failure(interp, e))?;
        self.to_host(interp, &result)
    }

    /// Call an opaque guest callable previously handed to the host as a
    /// wrapper object.
    pub fn call_opaque_callable(
        &self,
        interp: &Arc<GuestInterpreter>,
        callable: &HostValue,
        args: &[HostValue],
    ) -> BridgeResult<HostValue> {
        let _scope = self.acquire(interp);
        let target = callable
            .as_object()
            .and_then(|obj| self.unwrap_guest(obj))
            .ok_or_else(|| BridgeError::Conversion {
                type_name: callable.kind_name().to_string(),
            })?;
        let gargs = self.convert_args_to_guest(interp, args)?;
        let result = self
            .call_guest(interp, &target, None, &gargs)
            .map_err(|e| self.guest_failure(interp, e))?;
        self.to_host(interp, &result)
    }

    fn convert_args_to_guest(
        &self,
        interp: &GuestInterpreter,
        args: &[HostValue],
    ) -> BridgeResult<Vec<GuestRef>> {
        let mut out = Vec::with_capacity(args.len());
        for arg in args {
            out.push(self.to_guest(interp, arg)?);
        }
        Ok(out)
    }

    /// Fold a guest call failure into a bridge error, preferring (and
    /// clearing) the interpreter's pending error state.
    pub(crate) fn guest_failure(&self, interp: &GuestInterpreter, err: GuestError) -> BridgeError {
        let err = interp.take_error().unwrap_or(err);
        BridgeError::Runtime(self.exception_from_guest_error(interp, err.normalized()))
    }

    // ========================================================================
    // Guest call machinery
    // ========================================================================

    /// Invoke a guest value: a callable or a class (construction).
    ///
    /// This is the guest-side call surface; the caller must hold a lock
    /// scope for `interp`.
    pub fn call_guest(
        &self,
        interp: &GuestInterpreter,
        callee: &GuestRef,
        recv: Option<&GuestRef>,
        args: &[GuestRef],
    ) -> Result<GuestRef, GuestError> {
        match callee.payload() {
            GuestPayload::Callable(callable) => {
                if callable.is_native() {
                    let _frame =
                        FrameGuard::push(interp, GuestFrame::native(callable.name.clone()));
                    return callable
                        .invoke_native(interp, recv, args)
                        .unwrap_or_else(|| {
                            Err(GuestError::new("TypeError", "callable has no implementation"))
                        });
                }
                let code = callable.code().ok_or_else(|| {
                    GuestError::new("TypeError", "callable has no implementation")
                })?;
                let _frame = FrameGuard::push(
                    interp,
                    GuestFrame::new(code.file.clone(), 0, callable.name.clone()),
                );
                interp.evaluator().call(interp, code, recv, args)
            }
            GuestPayload::Class(class) => self.construct_guest(interp, class, args),
            _ => Err(GuestError::new(
                "TypeError",
                format!("'{}' object is not callable", callee.type_name()),
            )),
        }
    }

    /// Construct an instance of a guest class.
    ///
    /// Classes with a host ancestor construct through the host constructor
    /// protocol; the resulting host object is pinned to the new instance.
    /// A guest-defined `__init__` on a derived class then runs as an
    /// initialization hook with the same arguments. The caller must hold a
    /// lock scope for `interp`.
    pub fn construct_guest(
        &self,
        interp: &GuestInterpreter,
        class: &Arc<GuestClass>,
        args: &[GuestRef],
    ) -> Result<GuestRef, GuestError> {
        if let Some(descriptor) = class.host_root() {
            // A pure projection constructs through its constructor capsule.
            if class.host_descriptor().is_some() {
                let ctor = ProxyKind::Constructor { class: descriptor };
                return self.dispatch_proxy(&ctor, interp, None, args);
            }

            // A derived guest class runs the host ancestor's constructor,
            // pins the host object to an instance of the derived class, and
            // then lets a guest-defined __init__ refine it.
            let obj = self.construct_host_object(interp, &descriptor, args)?;
            let instance = self.wrap_constructed(interp, class, obj);
            if let Some((init, provider)) =
                class.lookup_kind("__init__", GuestMemberKind::Instance)
            {
                if provider.host_descriptor().is_none() {
                    self.call_guest(interp, &init.value, Some(&instance), args)?;
                }
            }
            return Ok(instance);
        }

        let instance = class.allocate_raw()?;
        if let Some((init, _)) = class.lookup_kind("__init__", GuestMemberKind::Instance) {
            self.call_guest(interp, &init.value, Some(&instance), args)?;
        }
        Ok(instance)
    }

    fn construct_host_object(
        &self,
        interp: &GuestInterpreter,
        descriptor: &Arc<HostClassDef>,
        args: &[GuestRef],
    ) -> Result<HostObject, GuestError> {
        let hargs = self.convert_args_to_host(interp, args)?;
        let obj = HostObject::new(Arc::clone(descriptor));
        if let Some(ctor) = descriptor.constructor() {
            ctor.invoke(Some(&obj), &hargs)
                .map_err(|e| self.guest_error_from_host(&e))?;
        }
        Ok(obj)
    }

    fn wrap_constructed(
        &self,
        interp: &GuestInterpreter,
        class: &Arc<GuestClass>,
        obj: HostObject,
    ) -> GuestRef {
        let key = (interp.id(), obj.id());
        let instance = class.allocate_wrapped(obj.clone());
        self.guest_wrappers.lock().insert(key, instance.downgrade());
        self.lock_manager().record_guest_keep_alive(instance.clone());
        self.lock_manager().record_host_keep_alive(obj);
        instance
    }

    // ========================================================================
    // Proxy dispatch (guest calling host)
    // ========================================================================

    /// Resolve and invoke the host entry point a proxy capsule binds.
    pub(crate) fn dispatch_proxy(
        &self,
        kind: &ProxyKind,
        interp: &GuestInterpreter,
        recv: Option<&GuestRef>,
        args: &[GuestRef],
    ) -> Result<GuestRef, GuestError> {
        match kind {
            ProxyKind::InstanceMethod { class, method } => {
                // Bound call: the receiver carries a host instance of the
                // declaring class.
                if let Some(recv) = recv {
                    if let Some(obj) = self.unwrap_host(recv) {
                        if obj.class().is_subclass_of(class) {
                            let hargs = self.convert_args_to_host(interp, args)?;
                            let result = method
                                .invoke(Some(&obj), &hargs)
                                .map_err(|e| self.guest_error_from_host(&e))?;
                            return self.to_guest(interp, &result).map_err(conversion_failure);
                        }
                    }
                }

                // Unbound call: the receiver arrives as the first argument,
                // so the foreign call is offset by one.
                if let Some(first) = args.first() {
                    if let Some(obj) = self.unwrap_host(first) {
                        if obj.class().is_subclass_of(class) {
                            let hargs = self.convert_args_to_host(interp, &args[1..])?;
                            let result = method
                                .invoke(Some(&obj), &hargs)
                                .map_err(|e| self.guest_error_from_host(&e))?;
                            return self.to_guest(interp, &result).map_err(conversion_failure);
                        }
                    }
                }

                // No usable receiver: fall back to a same-named static
                // method on the declaring class before failing.
                if let Some(fallback) = class.find_method(&method.name, MemberKind::Static) {
                    let hargs = self.convert_args_to_host(interp, args)?;
                    let result = fallback
                        .invoke(None, &hargs)
                        .map_err(|e| self.guest_error_from_host(&e))?;
                    return self.to_guest(interp, &result).map_err(conversion_failure);
                }

                Err(GuestError::new(
                    "TypeError",
                    format!(
                        "method '{}' requires a '{}' instance receiver",
                        method.name,
                        class.name()
                    ),
                ))
            }
            ProxyKind::StaticMethod { method, .. } => {
                let hargs = self.convert_args_to_host(interp, args)?;
                let result = method
                    .invoke(None, &hargs)
                    .map_err(|e| self.guest_error_from_host(&e))?;
                self.to_guest(interp, &result).map_err(conversion_failure)
            }
            ProxyKind::Constructor { class } => {
                let obj = self.construct_host_object(interp, class, args)?;
                let projection = self
                    .project_host_class(interp, class)
                    .map_err(conversion_failure)?;
                let gclass = projection.as_class().ok_or_else(|| {
                    GuestError::new("TypeError", "projection did not yield a class")
                })?;
                Ok(self.wrap_constructed(interp, gclass, obj))
            }
            ProxyKind::FreeFunction { func } => {
                let hargs = self.convert_args_to_host(interp, args)?;
                let result = func
                    .invoke(&hargs)
                    .map_err(|e| self.guest_error_from_host(&e))?;
                self.to_guest(interp, &result).map_err(conversion_failure)
            }
        }
    }

    fn convert_args_to_host(
        &self,
        interp: &GuestInterpreter,
        args: &[GuestRef],
    ) -> Result<Vec<HostValue>, GuestError> {
        let mut out = Vec::with_capacity(args.len());
        for arg in args {
            out.push(self.to_host(interp, arg).map_err(conversion_failure)?);
        }
        Ok(out)
    }

    // ========================================================================
    // Host-side entry points into guest members
    // ========================================================================

    /// Invoke a guest member on behalf of a host caller (projected guest
    /// class method implementations route through here).
    pub(crate) fn enter_guest_member(
        &self,
        home: InterpId,
        target: &GuestRef,
        recv: Option<&HostObject>,
        args: &[HostValue],
    ) -> HostResult<HostValue> {
        let interp = self.interpreter(home).ok_or_else(|| {
            HostError::new("StateError", "guest interpreter has been destroyed")
        })?;
        let _scope = self.acquire(&interp);

        let mut gargs = Vec::with_capacity(args.len());
        for arg in args {
            gargs.push(
                self.to_guest(&interp, arg)
                    .map_err(|e| HostError::new("ConversionError", e.to_string()))?,
            );
        }

        let recv_guest = match recv {
            Some(obj) => Some(match self.unwrap_guest(obj) {
                Some(original) => original,
                None => self
                    .wrap_host(&interp, obj)
                    .map_err(|e| HostError::new("ConversionError", e.to_string()))?,
            }),
            None => None,
        };

        match self.call_guest(&interp, target, recv_guest.as_ref(), &gargs) {
            Ok(result) => self
                .to_host(&interp, &result)
                .map_err(|e| HostError::new("ConversionError", e.to_string())),
            Err(err) => {
                let err = interp.take_error().unwrap_or(err);
                let exc = self.exception_from_guest_error(&interp, err.normalized());
                Err(self.raise_host(exc))
            }
        }
    }

    /// Construct a guest instance on behalf of the host constructor
    /// protocol and pin it to the freshly allocated host receiver.
    pub(crate) fn host_construct_guest(
        &self,
        gclass: &Arc<GuestClass>,
        recv: Option<&HostObject>,
        args: &[HostValue],
    ) -> HostResult<HostValue> {
        let interp = self.interpreter(gclass.home()).ok_or_else(|| {
            HostError::new("StateError", "guest interpreter has been destroyed")
        })?;
        let _scope = self.acquire(&interp);

        let mut gargs = Vec::with_capacity(args.len());
        for arg in args {
            gargs.push(
                self.to_guest(&interp, arg)
                    .map_err(|e| HostError::new("ConversionError", e.to_string()))?,
            );
        }

        let instance = match self.construct_guest(&interp, gclass, &gargs) {
            Ok(instance) => instance,
            Err(err) => {
                let err = interp.take_error().unwrap_or(err);
                let exc = self.exception_from_guest_error(&interp, err.normalized());
                return Err(self.raise_host(exc));
            }
        };

        if let Some(obj) = recv {
            obj.attach_foreign(Arc::new(instance.clone()))?;
            self.host_wrappers
                .lock()
                .insert(instance.identity(), obj.downgrade());
            self.lock_manager().record_guest_keep_alive(instance);
        }

        Ok(HostValue::Null)
    }
}

/// A conversion failure inside a guest-initiated call surfaces as a guest
/// type error.
fn conversion_failure(err: BridgeError) -> GuestError {
    GuestError::new("TypeError", err.to_string())
}
