//! Class projection tests: memoization, inheritance fidelity, visibility,
//! virtual modules, and the command surface

mod common;

use std::sync::Arc;

use common::setup;
use trestle_bridge::guest::{GuestClass, GuestMember, GuestMemberKind, GuestRef};
use trestle_bridge::{BridgeError, HostValue, MemberKind};

#[test]
fn test_projection_is_idempotent() {
    let fx = setup();
    let point = fx.program.registry().lookup_class("geo.Point").unwrap();

    let walks_before = fx.bridge.enumeration_walk_count();
    let first = fx.bridge.project_host_class(&fx.interp, &point).unwrap();
    let walks_after_first = fx.bridge.enumeration_walk_count();

    for _ in 0..10 {
        let again = fx.bridge.project_host_class(&fx.interp, &point).unwrap();
        assert!(first.ptr_eq(&again));
    }

    assert_eq!(walks_after_first, walks_before + 1);
    assert_eq!(fx.bridge.enumeration_walk_count(), walks_after_first);
}

#[test]
fn test_inheritance_fidelity() {
    let fx = setup();
    let circle = fx.program.registry().lookup_class("geo.Circle").unwrap();
    let projection = fx.bridge.project_host_class(&fx.interp, &circle).unwrap();
    let gclass = projection.as_class().unwrap();

    // The projected hierarchy mirrors the source hierarchy.
    assert_eq!(gclass.bases().len(), 1);
    assert_eq!(gclass.bases()[0].name, "Shape");

    // Shadowed members resolve to the derived definition.
    let (_, provider) = gclass.lookup("area").unwrap();
    assert_eq!(provider.name, "Circle");
    let (_, provider) = gclass.lookup("label").unwrap();
    assert_eq!(provider.name, "Circle");

    // Base members not shadowed stay reachable.
    let (hint, provider) = gclass.lookup("hint").unwrap();
    assert_eq!(provider.name, "Shape");
    assert_eq!(hint.kind, GuestMemberKind::Instance);

    // Base constants are inherited.
    let (kind, _) = gclass.lookup("KIND").unwrap();
    assert_eq!(kind.value.as_str(), Some("shape"));
}

#[test]
fn test_visibility_filtering() {
    let fx = setup();
    let shape = fx.program.registry().lookup_class("geo.Shape").unwrap();
    let projection = fx.bridge.project_host_class(&fx.interp, &shape).unwrap();
    let gclass = projection.as_class().unwrap();

    // Protected-equivalent members are exposed, private ones are not.
    assert!(gclass.lookup("hint").is_some());
    assert!(gclass.lookup("secret").is_none());
}

#[test]
fn test_projection_rejects_raw_allocation() {
    let fx = setup();
    let point = fx.program.registry().lookup_class("geo.Point").unwrap();
    let projection = fx.bridge.project_host_class(&fx.interp, &point).unwrap();
    let gclass = projection.as_class().unwrap();

    let err = gclass.allocate_raw().unwrap_err();
    assert_eq!(err.kind, "TypeError");
}

#[test]
fn test_base_projected_before_derived() {
    let fx = setup();
    let circle = fx.program.registry().lookup_class("geo.Circle").unwrap();
    let walks_before = fx.bridge.enumeration_walk_count();
    fx.bridge.project_host_class(&fx.interp, &circle).unwrap();
    // One walk for Shape, one for Circle.
    assert_eq!(fx.bridge.enumeration_walk_count(), walks_before + 2);

    // The base projection is already cached.
    let shape = fx.program.registry().lookup_class("geo.Shape").unwrap();
    fx.bridge.project_host_class(&fx.interp, &shape).unwrap();
    assert_eq!(fx.bridge.enumeration_walk_count(), walks_before + 2);
}

#[test]
fn test_guest_class_projects_into_host_registry() {
    let fx = setup();
    let gclass = GuestClass::define(fx.interp.id(), "Greeter", Vec::new(), Vec::new());
    gclass.add_member(GuestMember::new(
        "greet",
        GuestMemberKind::Instance,
        GuestRef::native_callable("greet", Arc::new(|_, _, _| Ok(GuestRef::str("hello")))),
    ));
    gclass.add_member(GuestMember::new(
        "VERSION",
        GuestMemberKind::Constant,
        GuestRef::int(7),
    ));
    gclass.add_member(GuestMember::new(
        "_internal",
        GuestMemberKind::Instance,
        GuestRef::native_callable("_internal", Arc::new(|_, _, _| Ok(GuestRef::none()))),
    ));

    let descriptor = fx.bridge.project_guest_class(&gclass).unwrap();
    assert_eq!(descriptor.qualified_name(), "guest.Greeter");
    assert!(descriptor.find_method("greet", MemberKind::Instance).is_some());
    assert!(descriptor
        .find_method("_internal", MemberKind::Instance)
        .is_none());
    assert_eq!(
        descriptor.constants(),
        &[("VERSION".to_string(), HostValue::Int(7))]
    );

    // Registered under the guest namespace and memoized.
    let registered = fx
        .program
        .registry()
        .lookup_class("guest.Greeter")
        .unwrap();
    assert!(Arc::ptr_eq(&registered, &descriptor));
    let again = fx.bridge.project_guest_class(&gclass).unwrap();
    assert!(Arc::ptr_eq(&again, &descriptor));
}

#[test]
fn test_projection_of_projection_returns_original() {
    let fx = setup();

    // Host → guest → host resolves back to the original descriptor.
    let point = fx.program.registry().lookup_class("geo.Point").unwrap();
    let projection = fx.bridge.project_host_class(&fx.interp, &point).unwrap();
    let back = fx
        .bridge
        .project_guest_class(projection.as_class().unwrap())
        .unwrap();
    assert!(Arc::ptr_eq(&back, &point));

    // Guest → host → guest resolves back to the original class.
    let gclass = GuestClass::define(fx.interp.id(), "Original", Vec::new(), Vec::new());
    let descriptor = fx.bridge.project_guest_class(&gclass).unwrap();
    let reprojected = fx
        .bridge
        .project_host_class(&fx.interp, &descriptor)
        .unwrap();
    assert!(Arc::ptr_eq(reprojected.as_class().unwrap(), &gclass));
}

#[test]
fn test_wholesale_namespace_import() {
    let fx = setup();
    let module = fx.bridge.import_module(&fx.interp, "host.geo").unwrap();
    assert_eq!(module.module_attrs(), ["Circle", "Point", "Shape"]);

    // Importing again returns the registered module.
    let again = fx.bridge.import_module(&fx.interp, "host.geo").unwrap();
    assert!(module.ptr_eq(&again));

    let math = fx.bridge.import_module(&fx.interp, "host.math").unwrap();
    assert_eq!(math.module_attrs(), ["add"]);
}

#[test]
fn test_derived_classes_module() {
    let fx = setup();
    let module = fx.bridge.import_module(&fx.interp, "derived.geo").unwrap();
    let derived = module.get_attr("Point").unwrap();
    let derived_class = derived.as_class().unwrap();

    // The derived class extends the projection of the host class.
    assert_eq!(derived_class.bases().len(), 1);
    assert!(derived_class.bases()[0].host_descriptor().is_some());
    assert!(derived_class.host_descriptor().is_none());
}

#[test]
fn test_unknown_module_is_resolution_error() {
    let fx = setup();
    let err = fx.bridge.import_module(&fx.interp, "nosuch").unwrap_err();
    assert!(matches!(err, BridgeError::Resolution(_)));

    let err = fx
        .bridge
        .import_module(&fx.interp, "host.empty_ns")
        .unwrap_err();
    assert!(matches!(err, BridgeError::Resolution(_)));
}

#[test]
fn test_command_surface() {
    let fx = setup();

    let reply = fx.bridge.run_command(&fx.interp, "import geo.Point").unwrap();
    assert_eq!(reply, "imported geo.Point");
    let module = fx.interp.lookup_module("host.geo").unwrap();
    assert!(module.get_attr("Point").is_some());

    let reply = fx.bridge.run_command(&fx.interp, "import math.add").unwrap();
    assert_eq!(reply, "imported math.add");
    assert!(fx.interp.resolve("host.math.add").is_some());

    let err = fx.bridge.run_command(&fx.interp, "import no.Such").unwrap_err();
    assert!(matches!(err, BridgeError::Resolution(_)));

    // Unrecognized commands report the list of valid commands.
    let err = fx.bridge.run_command(&fx.interp, "frobnicate geo").unwrap_err();
    match err {
        BridgeError::Configuration(msg) => {
            assert!(msg.contains("frobnicate"));
            assert!(msg.contains("import"));
        }
        other => panic!("expected configuration error, got {:?}", other),
    }
}

#[test]
fn test_projection_is_per_interpreter() {
    let fx = setup();
    let other_program =
        trestle_bridge::HostProgram::new("other", common::fixture_registry());
    let other_interp = fx.bridge.interpreter_for(&other_program);

    let point = fx.program.registry().lookup_class("geo.Point").unwrap();
    let a = fx.bridge.project_host_class(&fx.interp, &point).unwrap();
    let b = fx.bridge.project_host_class(&other_interp, &point).unwrap();
    assert!(!a.ptr_eq(&b));
}
