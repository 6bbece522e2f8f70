//! E2E: delegation chains.
//!
//! Covers:
//! 1. Round-trip through a modify-delegate in both directions
//! 2. Shadowing writes and the delegate-listener hook
//! 3. Name-mapping policies
//! 4. Cycle detection for reads and writes, with the warn event
//! 5. Base-descriptor lookup through the chain

#![forbid(unsafe_code)]

use std::cell::RefCell;
use std::rc::Rc;

use ctrait_core::{ErrorKind, Host, HostBehavior, HostClass, Result, TraitLookup, Value};
use ctrait_harness::EventCapture;
use ctrait_harness::fixtures::{any_trait, delegate_trait, delegation_classes};

fn linked() -> (Host, Host) {
    let (parent_class, child_class) = delegation_classes().unwrap();
    let parent = Host::alloc(&parent_class).unwrap();
    let child = Host::alloc(&child_class).unwrap();
    child.set("parent", parent.clone()).unwrap();
    (parent, child)
}

#[test]
fn write_through_then_read_back() {
    let (parent, child) = linked();
    child.set("x", 5).unwrap();
    assert_eq!(parent.get("y").unwrap(), Value::Int(5));
    assert!(!child.has_value("x"));

    parent.set("y", 6).unwrap();
    assert_eq!(child.get("x").unwrap(), Value::Int(6));
}

#[test]
fn delegate_is_looked_up_on_every_access() {
    let (parent_class, _) = delegation_classes().unwrap();
    let (first, child) = linked();
    let second = Host::alloc(&parent_class).unwrap();
    first.set("y", 1).unwrap();
    second.set("y", 2).unwrap();
    assert_eq!(child.get("x").unwrap(), Value::Int(1));
    child.set("parent", second).unwrap();
    assert_eq!(child.get("x").unwrap(), Value::Int(2));
}

#[derive(Default)]
struct ListenerLog(RefCell<Vec<(String, bool)>>);

impl HostBehavior for ListenerLog {
    fn remove_trait_delegate_listener(&self, _host: &Host, name: &str, has_value: bool) -> Result<()> {
        self.0.borrow_mut().push((name.to_owned(), has_value));
        Ok(())
    }
}

#[test]
fn shadowing_write_stays_on_the_host() {
    let log = Rc::new(ListenerLog::default());
    let parent_class = HostClass::builder("Parent").trait_("z", any_trait()).build();
    let child_class = HostClass::builder("Child")
        .trait_("parent", any_trait())
        .trait_("z", delegate_trait("parent", "", 0, false).unwrap())
        .behavior(Rc::clone(&log) as Rc<dyn HostBehavior>)
        .build();
    let parent = Host::alloc(&parent_class).unwrap();
    let child = Host::alloc(&child_class).unwrap();
    child.set("parent", parent.clone()).unwrap();

    parent.set("z", 1).unwrap();
    assert_eq!(child.get("z").unwrap(), Value::Int(1));
    child.set("z", 3).unwrap();
    assert_eq!(child.get("z").unwrap(), Value::Int(3));
    assert_eq!(parent.get("z").unwrap(), Value::Int(1));
    assert_eq!(*log.0.borrow(), [("z".to_owned(), true)]);
}

#[test]
fn name_mapping_policies() {
    let target_class = HostClass::builder("Target")
        .trait_("p_a", any_trait())
        .trait_("k_b", any_trait())
        .build();
    let source_class = HostClass::builder("Source")
        .trait_("peer", any_trait())
        .trait_("a", delegate_trait("peer", "p_", 2, true).unwrap())
        .trait_("b", delegate_trait("peer", "", 3, true).unwrap())
        .prefix("k_")
        .build();
    let target = Host::alloc(&target_class).unwrap();
    let source = Host::alloc(&source_class).unwrap();
    source.set("peer", target.clone()).unwrap();

    source.set("a", 1).unwrap();
    source.set("b", 2).unwrap();
    assert_eq!(target.get("p_a").unwrap(), Value::Int(1));
    assert_eq!(target.get("k_b").unwrap(), Value::Int(2));
    assert!(delegate_trait("peer", "", 4, true).is_err());
}

#[test]
fn missing_delegate_target_is_reported() {
    let (_, child_class) = delegation_classes().unwrap();
    let child = Host::alloc(&child_class).unwrap();
    let err = child.set("x", 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Delegation);
    assert!(err.to_string().contains("does not have traits"));
}

fn cycle() -> (Host, Host) {
    let class = HostClass::builder("Loop")
        .trait_("peer", any_trait())
        .trait_("x", delegate_trait("peer", "", 0, true).unwrap())
        .build();
    let a = Host::alloc(&class).unwrap();
    let b = Host::alloc(&class).unwrap();
    a.set("peer", b.clone()).unwrap();
    b.set("peer", a.clone()).unwrap();
    (a, b)
}

#[test]
fn cycles_hit_the_recursion_limit() {
    let capture = EventCapture::new();
    let _guard = capture.install();
    let (a, b) = cycle();

    let err = a.set("x", 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Delegation);
    assert!(err.to_string().contains("recursion limit exceeded while setting"));

    let err = a.get("x").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Delegation);
    assert!(err.to_string().contains("recursion limit"));

    let warned = capture.named("ctrait.delegate.recursion_limit");
    assert!(warned.len() >= 2);
    assert_eq!(warned[0].level, tracing::Level::WARN);
    assert_eq!(warned[0].field("action"), Some("setting"));

    // failed reads release their depth
    a.set("peer", Value::None).unwrap();
    b.set("peer", Value::None).unwrap();
    let err = a.get("x").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Delegation);
    assert!(!err.to_string().contains("recursion"));
    a.clear();
    b.clear();
}

#[test]
fn base_trait_follows_the_chain() {
    let (parent, child) = linked();
    let base = child.base_trait("x").unwrap();
    let y = parent.class().class_trait("y").unwrap();
    assert!(base.ptr_eq(&y));
    let via_lookup = child.trait_("x", TraitLookup::Base).unwrap().unwrap();
    assert!(via_lookup.ptr_eq(&y));
}
