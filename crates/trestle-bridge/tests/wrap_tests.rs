//! Object wrapper tests: identity preservation and reference counting

mod common;

use std::sync::Arc;

use common::setup;
use trestle_bridge::guest::GuestRef;
use trestle_bridge::{HostObject, HostValue};

#[test]
fn test_wrapping_same_host_object_yields_same_wrapper() {
    let fx = setup();
    let obj = HostObject::new(common::point_class());

    let first = fx.bridge.wrap_host(&fx.interp, &obj).unwrap();
    let second = fx.bridge.wrap_host(&fx.interp, &obj).unwrap();
    assert!(first.ptr_eq(&second));
    assert_eq!(first.identity(), second.identity());
}

#[test]
fn test_wrap_host_takes_exactly_one_reference() {
    let fx = setup();
    let obj = HostObject::new(common::point_class());
    let base = obj.strong_count();

    let wrapper = fx.bridge.wrap_host(&fx.interp, &obj).unwrap();
    assert_eq!(obj.strong_count(), base + 1);

    // A second wrap returns the same wrapper without another reference.
    let again = fx.bridge.wrap_host(&fx.interp, &obj).unwrap();
    assert_eq!(obj.strong_count(), base + 1);
    drop(again);

    // Destroying the wrapper releases exactly one reference.
    drop(wrapper);
    assert_eq!(obj.strong_count(), base);
}

#[test]
fn test_unwrap_host_preserves_identity() {
    let fx = setup();
    let obj = HostObject::new(common::point_class());
    let wrapper = fx.bridge.wrap_host(&fx.interp, &obj).unwrap();

    let unwrapped = fx.bridge.unwrap_host(&wrapper).unwrap();
    assert!(unwrapped.ptr_eq(&obj));
}

#[test]
fn test_wrap_guest_takes_exactly_one_reference() {
    let fx = setup();
    let greeter = trestle_bridge::guest::GuestClass::define(
        fx.interp.id(),
        "Thing",
        Vec::new(),
        Vec::new(),
    );
    let instance = greeter.allocate_raw().unwrap();
    let base = instance.strong_count();

    let wrapper = fx.bridge.wrap_guest(&instance).unwrap();
    assert_eq!(instance.strong_count(), base + 1);

    let again = fx.bridge.wrap_guest(&instance).unwrap();
    assert!(wrapper.ptr_eq(&again));
    assert_eq!(instance.strong_count(), base + 1);
    drop(again);

    drop(wrapper);
    assert_eq!(instance.strong_count(), base);
}

#[test]
fn test_unwrap_guest_preserves_identity() {
    let fx = setup();
    let class = trestle_bridge::guest::GuestClass::define(
        fx.interp.id(),
        "Thing",
        Vec::new(),
        Vec::new(),
    );
    let instance = class.allocate_raw().unwrap();
    let wrapper = fx.bridge.wrap_guest(&instance).unwrap();

    let unwrapped = fx.bridge.unwrap_guest(&wrapper).unwrap();
    assert!(unwrapped.ptr_eq(&instance));
}

#[test]
fn test_double_wrap_unwraps_instead() {
    let fx = setup();

    // host → guest → host returns the original host object.
    let obj = HostObject::new(common::point_class());
    let guest_side = fx.bridge.wrap_host(&fx.interp, &obj).unwrap();
    let back = fx.bridge.wrap_guest(&guest_side).unwrap();
    assert!(back.ptr_eq(&obj));

    // guest → host → guest returns the original guest value.
    let class = trestle_bridge::guest::GuestClass::define(
        fx.interp.id(),
        "Thing",
        Vec::new(),
        Vec::new(),
    );
    let instance = class.allocate_raw().unwrap();
    let host_side = fx.bridge.wrap_guest(&instance).unwrap();
    let back = fx.bridge.wrap_host(&fx.interp, &host_side).unwrap();
    assert!(back.ptr_eq(&instance));
}

#[test]
fn test_keep_alive_pins_wrapper_for_scope_duration() {
    let fx = setup();
    let obj = HostObject::new(common::point_class());

    let scope = fx.bridge.acquire(&fx.interp);
    let first_identity = {
        let wrapper = fx.bridge.wrap_host(&fx.interp, &obj).unwrap();
        wrapper.identity()
        // The caller's handle drops here; the scope's keep-alive table
        // still pins the wrapper.
    };
    let wrapper = fx.bridge.wrap_host(&fx.interp, &obj).unwrap();
    assert_eq!(wrapper.identity(), first_identity);
    drop(wrapper);
    drop(scope);

    // With the scope closed nothing pins the wrapper; a fresh wrap builds
    // a fresh one.
    let rewrapped = fx.bridge.wrap_host(&fx.interp, &obj).unwrap();
    assert!(rewrapped.as_instance().is_some());
}

#[test]
fn test_wrappers_are_per_interpreter() {
    let fx = setup();
    let other_program = trestle_bridge::HostProgram::new("other", common::fixture_registry());
    let other_interp = fx.bridge.interpreter_for(&other_program);

    let obj = HostObject::new(common::point_class());
    let a = fx.bridge.wrap_host(&fx.interp, &obj).unwrap();
    let b = fx.bridge.wrap_host(&other_interp, &obj).unwrap();
    assert!(!a.ptr_eq(&b));
}

#[test]
fn test_wrapped_object_crosses_as_object_value() {
    let fx = setup();
    let obj = HostObject::new(common::point_class());
    let wrapper = fx.bridge.wrap_host(&fx.interp, &obj).unwrap();

    let host_value = fx.bridge.to_host(&fx.interp, &wrapper).unwrap();
    match host_value {
        HostValue::Object(o) => assert!(o.ptr_eq(&obj)),
        other => panic!("expected object, got {:?}", other),
    }
}

#[test]
fn test_opaque_wrapper_classes_are_shared() {
    let fx = setup();
    let f = GuestRef::native_callable("f", Arc::new(|_, _, _| Ok(GuestRef::none())));
    let g = GuestRef::native_callable("g", Arc::new(|_, _, _| Ok(GuestRef::none())));

    let wf = fx.bridge.wrap_guest(&f).unwrap();
    let wg = fx.bridge.wrap_guest(&g).unwrap();
    assert!(Arc::ptr_eq(wf.class(), wg.class()));
}
