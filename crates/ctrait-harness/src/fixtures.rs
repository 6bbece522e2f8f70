#![forbid(unsafe_code)]

//! Reference descriptors, classes, and contexts.
//!
//! The shapes here mirror the scenarios the e2e suites exercise: a bounded
//! integer counter, a write-only event, a read-only slot, and delegating
//! hosts.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ctrait_core::{
    Callable, DefaultValueKind, Host, HostClass, Result, TraitContext, TraitDescriptor, TraitKind,
    Validator, Value,
};

/// Plain trait with a constant default and an inclusive integer range.
#[must_use]
pub fn int_trait(default: i64, low: i64, high: i64) -> TraitDescriptor {
    let t = TraitDescriptor::new(TraitKind::Trait);
    t.set_default(DefaultValueKind::Constant, Value::Int(default));
    t.set_validator(Some(Validator::int_range(Some(low), Some(high))));
    t
}

/// Plain trait with a `None` default and no validation.
#[must_use]
pub fn any_trait() -> TraitDescriptor {
    let t = TraitDescriptor::new(TraitKind::Trait);
    t.set_default(DefaultValueKind::Constant, Value::None);
    t
}

#[must_use]
pub fn event_trait() -> TraitDescriptor {
    TraitDescriptor::new(TraitKind::Event)
}

#[must_use]
pub fn read_only_trait() -> TraitDescriptor {
    TraitDescriptor::new(TraitKind::ReadOnly)
}

/// Delegate descriptor reading `to` and mapping names with `policy`
/// (0 name, 1 prefix, 2 prefix+name, 3 class prefix+name).
///
/// # Errors
///
/// Policies outside `0..=3`.
pub fn delegate_trait(to: &str, prefix: &str, policy: i64, modify: bool) -> Result<TraitDescriptor> {
    let t = TraitDescriptor::new(TraitKind::Delegate);
    t.delegate(to, prefix, policy, modify)?;
    Ok(t)
}

/// Plain trait whose default comes from a callable; the returned counter
/// tracks how often the callable ran.
#[must_use]
pub fn counted_default_trait(value: Value) -> (TraitDescriptor, Rc<Cell<usize>>) {
    let calls = Rc::new(Cell::new(0));
    let seen = Rc::clone(&calls);
    let factory = Callable::new("counted_default", move |_| {
        seen.set(seen.get() + 1);
        Ok(value.clone())
    });
    let t = TraitDescriptor::new(TraitKind::Trait);
    t.set_default(DefaultValueKind::Callable, Value::Callable(factory));
    (t, calls)
}

/// `Counter` class: `n` is an integer in `[0, 10]` defaulting to `0`, `e`
/// is an event.
#[must_use]
pub fn counter_class() -> Rc<HostClass> {
    HostClass::builder("Counter")
        .trait_("n", int_trait(0, 0, 10))
        .trait_("e", event_trait())
        .build()
}

/// A fresh, initialized `Counter`.
///
/// # Errors
///
/// Construction failures.
pub fn counter_host() -> Result<Host> {
    Host::new(&counter_class(), std::iter::empty::<(&str, Value)>())
}

/// `Child` delegates `x` to `parent.y` (modify-delegate) and `z` to
/// `parent.z` (shadowing).
///
/// # Errors
///
/// Descriptor construction failures.
pub fn delegation_classes() -> Result<(Rc<HostClass>, Rc<HostClass>)> {
    let parent = HostClass::builder("Parent")
        .trait_("y", any_trait())
        .trait_("z", any_trait())
        .build();
    let child = HostClass::builder("Child")
        .trait_("parent", any_trait())
        .trait_("x", delegate_trait("parent", "y", 1, true)?)
        .trait_("z", delegate_trait("parent", "", 0, false)?)
        .build();
    Ok((parent, child))
}

/// Names of the collection factories a context has run, as `kind:name`.
pub type FactoryLog = Rc<RefCell<Vec<String>>>;

/// Context whose list, dict, and set factories copy the seed payload and
/// log each call.
#[must_use]
pub fn recording_context() -> (Rc<TraitContext>, FactoryLog) {
    let log: FactoryLog = Rc::default();
    let (lists, dicts, sets) = (Rc::clone(&log), Rc::clone(&log), Rc::clone(&log));
    let context = TraitContext::builder()
        .list_factory(move |binding| {
            lists.borrow_mut().push(format!("list:{}", binding.name));
            Ok(Value::list(items(binding.seed)?))
        })
        .dict_factory(move |binding| {
            dicts.borrow_mut().push(format!("dict:{}", binding.name));
            match binding.seed {
                Value::Dict(dict) => Ok(Value::Dict(Rc::new(RefCell::new(dict.borrow().clone())))),
                _ => Value::dict([]),
            }
        })
        .set_factory(move |binding| {
            sets.borrow_mut().push(format!("set:{}", binding.name));
            Value::set(items(binding.seed)?)
        })
        .build();
    (context, log)
}

fn items(seed: &Value) -> Result<Vec<Value>> {
    if seed.is_none() {
        Ok(Vec::new())
    } else {
        seed.iter_items()
    }
}
