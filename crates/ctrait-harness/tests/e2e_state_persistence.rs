//! E2E: descriptor state capture, restore, and JSON persistence.
//!
//! Covers:
//! 1. 15-tuple capture and restore onto a fresh descriptor
//! 2. Restoring over a live descriptor keeps its notifiers
//! 3. JSON save/load with registered callables, handlers, and classes
//! 4. Placeholder callables resolved through the handler (logged)
//! 5. Malformed states are rejected without partial updates

#![forbid(unsafe_code)]

use ctrait_core::persist::PortableState;
use ctrait_core::{
    BasicHandler, Callable, ComparisonMode, DefaultValueKind, ErrorKind, Host, HostClass,
    StateRegistry, TraitDescriptor, TraitKind, TraitState, TypeSpec, Validator, Value,
};
use ctrait_harness::fixtures::int_trait;
use ctrait_harness::{ChangeRecorder, EventCapture};

#[test]
fn tuple_state_restores_behavior() {
    let original = int_trait(2, 0, 5);
    original.set_comparison_mode(ComparisonMode::Identity);
    let tuple = original.getstate().to_tuple();
    assert_eq!(tuple.as_tuple().unwrap().len(), 15);

    let restored = TraitDescriptor::from_state(&TraitState::from_tuple(&tuple).unwrap()).unwrap();
    assert_eq!(restored.comparison_mode(), ComparisonMode::Identity);
    let class = HostClass::builder("R").trait_("n", restored).build();
    let host = Host::alloc(&class).unwrap();
    assert_eq!(host.get("n").unwrap(), Value::Int(2));
    assert!(host.set("n", 6).is_err());
}

#[test]
fn setstate_keeps_existing_notifiers() {
    let live = int_trait(0, 0, 10);
    let recorder = ChangeRecorder::new();
    live.add_notifier(recorder.notifier());
    live.setstate(&int_trait(7, 0, 100).getstate()).unwrap();

    let class = HostClass::builder("Live").trait_("n", live).build();
    let host = Host::alloc(&class).unwrap();
    host.set("n", 50).unwrap();
    assert_eq!(recorder.len(), 1);
    assert_eq!(recorder.last().unwrap().old, Value::Int(7));
}

#[test]
fn json_round_trip_through_a_registry() {
    let make = Callable::new("make_origin", |_| Ok(Value::tuple([Value::Int(0), Value::Int(0)])));
    let handler = BasicHandler::new("a point").into_ref();
    let shape = HostClass::builder("Shape").build();
    let mut registry = StateRegistry::new();
    registry
        .callable(make.clone())
        .handler("point", handler.clone())
        .class(&shape);

    let origin = TraitDescriptor::new(TraitKind::Trait);
    origin.set_default(DefaultValueKind::Callable, Value::Callable(make));
    origin.set_handler(Some(handler));
    let owner = TraitDescriptor::new(TraitKind::Trait);
    owner.set_validator(Some(Validator::instance_of(TypeSpec::Class(shape.clone()))));
    owner.aux().borrow_mut().insert(Value::str("label"), Value::str("owner")).unwrap();

    for descriptor in [&origin, &owner] {
        let json = registry.save(descriptor).unwrap();
        let portable = PortableState::from_json(&json).unwrap();
        assert_eq!(portable.to_json().unwrap(), json);
        let loaded = registry.load(&json).unwrap();
        assert_eq!(loaded.getstate(), descriptor.getstate());
    }

    let loaded = registry.load(&registry.save(&origin).unwrap()).unwrap();
    let class = HostClass::builder("P").trait_("origin", loaded).build();
    let host = Host::alloc(&class).unwrap();
    assert_eq!(
        host.get("origin").unwrap(),
        Value::tuple([Value::Int(0), Value::Int(0)])
    );

    let stranger = StateRegistry::new();
    let err = stranger.load(&registry.save(&owner).unwrap()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Persist);
    assert!(err.to_string().contains("unknown class 'Shape'"));
}

#[test]
fn placeholder_callables_resolve_through_the_handler() {
    let capture = EventCapture::new();
    let _guard = capture.install();

    let check = Callable::new("check", |args| Ok(args.last().cloned().unwrap_or(Value::None)));
    let t = TraitDescriptor::new(TraitKind::Trait);
    t.set_validate(&Value::Callable(check.clone())).unwrap();
    t.set_handler(Some(BasicHandler::new("anything").with_validate(check).into_ref()));

    let state = t.getstate();
    assert_eq!(state.validate_payload, Value::Int(-1));
    let restored = TraitDescriptor::from_state(&state).unwrap();
    let payload = restored.get_validate().unwrap();
    assert_eq!(payload.as_callable().unwrap().name(), "check");

    let shims = capture.named("ctrait.state.legacy_shim");
    assert_eq!(shims.len(), 1);
    assert_eq!(shims[0].field("field"), Some("validate"));
}

#[test]
fn bad_state_leaves_descriptor_untouched() {
    let t = int_trait(1, 0, 3);
    let before = t.getstate();
    let mut state = before.clone();
    state.default_kind = 11;
    let err = t.setstate(&state).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Value);
    assert!(err.to_string().contains("0..10"));
    assert_eq!(t.getstate(), before);

    let mut state = before.clone();
    state.delegate_attr_name = 9;
    assert!(t.setstate(&state).is_err());
    assert_eq!(t.getstate(), before);

    let short = Value::tuple(std::iter::repeat_n(Value::Int(1), 14));
    assert!(TraitState::from_tuple(&short).is_err());
}
