//! E2E: descriptors created or replaced while hosts are live.
//!
//! Covers:
//! 1. Prefix-trait synthesis, the `trait_added` event, and dunder names
//! 2. Items events that install their descriptor on first use
//! 3. Computed properties and `trait_property_changed`
//! 4. Assigning a `TraitValue` to replace one host's descriptor
//! 5. Construction with keyword arguments

#![forbid(unsafe_code)]

use std::cell::Cell;
use std::rc::Rc;

use ctrait_core::{
    Callable, DefaultValueKind, ErrorKind, Host, HostClass, TraitDescriptor, TraitKind,
    TraitLookup, TraitValue, Validator, Value,
};
use ctrait_harness::fixtures::{any_trait, event_trait, int_trait};
use ctrait_harness::{ChangeRecorder, EventCapture};

fn open_class() -> Rc<HostClass> {
    HostClass::builder("Open")
        .trait_("trait_added", event_trait())
        .prefix_trait("", any_trait())
        .prefix_trait("n_", int_trait(0, 0, 9))
        .build()
}

#[test]
fn unknown_names_synthesize_prefix_traits() {
    let capture = EventCapture::new();
    let _guard = capture.install();
    let class = open_class();
    let host = Host::alloc(&class).unwrap();
    let recorder = ChangeRecorder::new();
    host.on_any_trait_change(recorder.notifier());

    host.set("color", Value::str("red")).unwrap();
    assert_eq!(recorder.names(), ["trait_added", "color"]);
    assert_eq!(recorder.changes()[0].new, Value::str("color"));
    assert_eq!(host.get("color").unwrap(), Value::str("red"));

    assert!(host.set("n_count", 12).is_err());
    host.set("n_count", 3).unwrap();

    let other = Host::alloc(&class).unwrap();
    assert!(other.trait_("color", TraitLookup::Existing).unwrap().is_some());
    assert_eq!(other.get("color").unwrap(), Value::None);

    let synthesized = capture.named("ctrait.prefix_trait");
    assert_eq!(synthesized.len(), 2);
    assert_eq!(synthesized[0].field("name"), Some("color"));
    assert_eq!(synthesized[0].field("is_set"), Some("true"));
}

#[test]
fn dunder_names_are_never_synthesized() {
    let host = Host::alloc(&open_class()).unwrap();
    let err = host.get("__secret__").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Attribute);
    host.set("__secret__", 1).unwrap();
    assert_eq!(host.get("__secret__").unwrap(), Value::Int(1));
}

#[test]
fn classes_without_prefix_traits_reject_unknown_names() {
    let class = HostClass::builder("Closed").trait_("a", any_trait()).build();
    let host = Host::alloc(&class).unwrap();
    let err = host.get("b").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Attribute);
    assert!(err.to_string().contains("'Closed' object has no attribute 'b'"));
    assert!(host.set("b", 1).is_err());
    let err = host.getattr_value(&Value::Int(3)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AttributeName);
}

#[test]
fn items_event_installs_its_descriptor_once() {
    let capture = EventCapture::new();
    let _guard = capture.install();
    let class = HostClass::builder("Bag").trait_("tags", any_trait()).build();
    let host = Host::alloc(&class).unwrap();
    let recorder = ChangeRecorder::new();
    host.on_any_trait_change(recorder.notifier());

    let event = Value::tuple([Value::str("added"), Value::list([Value::Int(1)])]);
    host.trait_items_event("tags_items", &event, &event_trait()).unwrap();
    host.trait_items_event("tags_items", &event, &event_trait()).unwrap();

    assert_eq!(recorder.len(), 2);
    assert!(recorder.last().unwrap().new.is(&event));
    let instance = host.instance_traits().unwrap();
    assert_eq!(instance.len(), 1);
    assert_eq!(instance[0].0, "tags_items");
    assert_eq!(capture.named("ctrait.items_event.synthesize").len(), 1);
}

#[test]
fn items_event_on_a_disallowed_name_fails() {
    let class = HostClass::builder("Strict")
        .trait_("x_items", TraitDescriptor::new(TraitKind::Disallow))
        .build();
    let host = Host::alloc(&class).unwrap();
    let disallow = TraitDescriptor::new(TraitKind::Disallow);
    let err = host
        .trait_items_event("x_items", &Value::None, &disallow)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Policy);
}

#[test]
fn computed_property_round_trip() {
    let cell = Rc::new(Cell::new(1_i64));
    let (read, write) = (Rc::clone(&cell), Rc::clone(&cell));
    let getter = Callable::new("get_area", move |_| Ok(Value::Int(read.get() * 10)));
    let setter = Callable::new("set_area", move |args| {
        write.set(args[0].as_int().unwrap_or_default() / 10);
        Ok(Value::None)
    });
    let area = TraitDescriptor::new(TraitKind::Property);
    area.property(&getter.into(), 0, &setter.into(), 1, &Value::None, 0)
        .unwrap();
    let class = HostClass::builder("Square").trait_("area", area).build();
    let host = Host::alloc(&class).unwrap();
    let recorder = ChangeRecorder::new();
    host.on_any_trait_change(recorder.notifier());

    assert_eq!(host.get("area").unwrap(), Value::Int(10));
    host.set("area", 40).unwrap();
    assert_eq!(cell.get(), 4);
    assert!(!host.has_value("area"));
    assert_eq!(host.delete("area").unwrap_err().kind(), ErrorKind::Policy);

    host.trait_property_changed("area", &Value::Int(10), None).unwrap();
    let change = recorder.last().unwrap();
    assert_eq!((change.old, change.new), (Value::Int(10), Value::Int(40)));
}

#[test]
fn validated_property_runs_validator_before_setter() {
    let seen = Rc::new(Cell::new(0_i64));
    let sink = Rc::clone(&seen);
    let getter = Callable::new("get", |_| Ok(Value::None));
    let setter = Callable::new("set", move |args| {
        sink.set(args[0].as_int().unwrap_or_default());
        Ok(Value::None)
    });
    let check = Callable::new("check", |args| match args.last() {
        Some(Value::Int(n)) if *n >= 0 => Ok(Value::Int(n * 2)),
        _ => Err(ctrait_core::TraitError::user("negative")),
    });
    let t = TraitDescriptor::new(TraitKind::Property);
    t.property(&getter.into(), 0, &setter.into(), 1, &check.into(), 1)
        .unwrap();
    let class = HostClass::builder("Checked").trait_("v", t).build();
    let host = Host::alloc(&class).unwrap();
    host.set("v", 3).unwrap();
    assert_eq!(seen.get(), 6);
    assert!(host.set("v", -1).is_err());
    assert_eq!(seen.get(), 6);
}

#[test]
fn trait_value_replaces_one_hosts_descriptor() {
    let level = int_trait(1, 0, 100);
    level.set_value_allowed(true);
    let class = HostClass::builder("Config").trait_("level", level).build();
    let a = Host::alloc(&class).unwrap();
    let b = Host::alloc(&class).unwrap();

    let override_ = TraitValue::new()
        .default_value(DefaultValueKind::Constant, Value::Int(50))
        .validator(Validator::int_range(Some(10), Some(60)));
    a.set("level", override_.into_value()).unwrap();

    assert_eq!(a.get("level").unwrap(), Value::Int(50));
    assert!(a.set("level", 70).is_err());
    assert_eq!(b.get("level").unwrap(), Value::Int(1));
    b.set("level", 70).unwrap();

    a.set("level", TraitValue::remove().into_value()).unwrap();
    assert!(a.instance_traits().unwrap().is_empty());
}

#[test]
fn construction_applies_keyword_arguments_in_order() {
    let class = HostClass::builder("Point")
        .trait_("x", int_trait(0, -5, 5))
        .trait_("y", int_trait(0, -5, 5))
        .build();
    let host = Host::new(&class, [("x", Value::Int(2)), ("y", Value::Int(-3))]).unwrap();
    assert!(host.traits_inited());
    assert_eq!(
        host.attribute_values(),
        [
            ("x".to_owned(), Value::Int(2)),
            ("y".to_owned(), Value::Int(-3))
        ]
    );
    assert!(Host::new(&class, [("x", Value::Int(9))]).is_err());
}
