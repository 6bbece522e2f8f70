#![forbid(unsafe_code)]

//! Attribute hosts.
//!
//! # Design
//!
//! A [`Host`] routes every attribute read and write through descriptors:
//! the instance-level map first, then the class-level map, then prefix
//! synthesis. Realized values live in a lazily created value dict, which is
//! also the fast path for repeat reads.
//!
//! # Invariants
//!
//! 1. The class-level map is shared with every other host of the class and
//!    only grows through prefix synthesis.
//! 2. The instance-level map, value dict, and notifier list belong to this
//!    host alone.
//! 3. No `RefCell` borrow of host state is held while user code runs.
//! 4. A value that is the host itself is stored without an owning
//!    reference, so self-referential defaults do not leak.
//!
//! # Failure Modes
//!
//! - Allocating a host of a class without a descriptor map is an internal
//!   error.
//! - Any failing construction step aborts construction.

pub(crate) mod delegate;
mod lifecycle;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;

use crate::class::{HostClass, TraitMap};
use crate::context::TraitContext;
use crate::descriptor::set::dispatch_set;
use crate::descriptor::{SetHandler, TraitDescriptor};
use crate::error::{Result, TraitError};
use crate::flags::HostFlags;
use crate::notify::{Notifier, NotifierList, call_notifiers};
use crate::value::Value;

/// How [`Host::trait_`] resolves a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraitLookup {
    /// Return an instance-level descriptor, cloning the class one if needed.
    ForceInstance,
    /// Only an existing instance-level descriptor.
    InstanceOnly,
    /// Instance then class; never synthesize.
    Existing,
    /// Instance then class, then prefix synthesis.
    WithPrefix,
    /// Follow delegation to the descriptor that stores the value.
    Base,
}

impl TraitLookup {
    #[must_use]
    pub fn index(self) -> i64 {
        match self {
            Self::ForceInstance => 2,
            Self::InstanceOnly => 1,
            Self::Existing => 0,
            Self::WithPrefix => -1,
            Self::Base => -2,
        }
    }

    /// # Errors
    ///
    /// Values outside -2..=2 are rejected.
    pub fn from_index(index: i64) -> Result<Self> {
        Ok(match index {
            2 => Self::ForceInstance,
            1 => Self::InstanceOnly,
            0 => Self::Existing,
            -1 => Self::WithPrefix,
            -2 => Self::Base,
            other => {
                return Err(TraitError::value_error(format!(
                    "The trait lookup mode must be -2..2, but {other} was specified."
                )));
            }
        })
    }
}

enum Slot {
    Value(Value),
    SelfRef,
}

struct HostInner {
    class: Rc<HostClass>,
    class_traits: Rc<RefCell<TraitMap>>,
    instance_traits: RefCell<Option<TraitMap>>,
    notifiers: NotifierList,
    flags: Cell<HostFlags>,
    values: RefCell<Option<AHashMap<Rc<str>, Slot>>>,
}

/// An object whose attributes are governed by trait descriptors.
#[derive(Clone)]
pub struct Host(Rc<HostInner>);

impl Host {
    /// Allocate an uninitialized host bound to `class`'s descriptor map.
    ///
    /// # Errors
    ///
    /// Internal error when the class has no descriptor map.
    pub fn alloc(class: &Rc<HostClass>) -> Result<Self> {
        let class_traits = class.class_traits().cloned().ok_or_else(|| {
            TraitError::internal(format!(
                "The '{}' class does not have a trait dictionary.",
                class.name()
            ))
        })?;
        Ok(Self(Rc::new(HostInner {
            class: Rc::clone(class),
            class_traits,
            instance_traits: RefCell::new(None),
            notifiers: NotifierList::default(),
            flags: Cell::new(HostFlags::empty()),
            values: RefCell::new(None),
        })))
    }

    /// Allocate and initialize with keyword arguments, applied in order.
    ///
    /// # Errors
    ///
    /// Allocation, hook, and attribute-write failures.
    pub fn new<K: AsRef<str>>(
        class: &Rc<HostClass>,
        kwargs: impl IntoIterator<Item = (K, Value)>,
    ) -> Result<Self> {
        let host = Self::alloc(class)?;
        host.init(kwargs)?;
        Ok(host)
    }

    #[must_use]
    pub fn class(&self) -> &Rc<HostClass> {
        &self.0.class
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        self.0.class.name()
    }

    #[must_use]
    pub fn context(&self) -> &TraitContext {
        self.0.class.context()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Host) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0).cast::<()>() as usize
    }

    #[must_use]
    pub fn flags(&self) -> HostFlags {
        self.0.flags.get()
    }

    fn toggle(&self, flag: HostFlags, on: bool) {
        let mut flags = self.flags();
        flags.set(flag, on);
        self.0.flags.set(flags);
    }

    // ─── Attribute access ───────────────────────────────────────────────

    /// Read attribute `name`.
    ///
    /// # Errors
    ///
    /// Whatever the resolved read handler raises; "no attribute" when
    /// nothing defines `name`.
    pub fn get(&self, name: &str) -> Result<Value> {
        if let Some(value) = self.value(name) {
            return Ok(value);
        }
        if let Some(descriptor) = self.local_trait(name) {
            return descriptor.get_attr(self, name);
        }
        match self.generic_get(name) {
            Ok(value) => Ok(value),
            Err(err) if err.kind() == crate::error::ErrorKind::Attribute => {
                self.prefix_trait(name, false)?.get_attr(self, name)
            }
            Err(err) => Err(err),
        }
    }

    /// Write attribute `name`.
    ///
    /// # Errors
    ///
    /// Validation, policy, delegation, post-set, and notifier failures. A
    /// failure after the value was stored leaves it stored.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.assign(name, Some(&value.into()))
    }

    /// Delete attribute `name`.
    ///
    /// # Errors
    ///
    /// As for [`set`](Self::set).
    pub fn delete(&self, name: &str) -> Result<()> {
        self.assign(name, None)
    }

    /// [`get`](Self::get) with a dynamically typed name.
    ///
    /// # Errors
    ///
    /// Attribute-name error for non-string names.
    pub fn getattr_value(&self, name: &Value) -> Result<Value> {
        match name {
            Value::Str(name) => self.get(name),
            other => Err(TraitError::invalid_attribute_name(other)),
        }
    }

    /// [`set`](Self::set) or [`delete`](Self::delete) with a dynamically
    /// typed name.
    ///
    /// # Errors
    ///
    /// Attribute-name error for non-string names.
    pub fn setattr_value(&self, name: &Value, value: Option<&Value>) -> Result<()> {
        match name {
            Value::Str(name) => self.assign(name, value),
            other => Err(TraitError::invalid_attribute_name(other)),
        }
    }

    fn assign(&self, name: &str, value: Option<&Value>) -> Result<()> {
        let descriptor = match self.local_trait(name) {
            Some(descriptor) => descriptor,
            None => self.prefix_trait(name, true)?,
        };
        if descriptor.value_allowed()
            && let Some(Value::TraitValue(source)) = value
        {
            return self.install_trait_value(&descriptor, name, source.as_ref());
        }
        dispatch_set(&descriptor, &descriptor, self, name, value)
    }

    // ─── Descriptor lookup ──────────────────────────────────────────────

    /// Instance-level descriptor, then class-level.
    pub(crate) fn local_trait(&self, name: &str) -> Option<TraitDescriptor> {
        self.instance_trait(name)
            .or_else(|| self.0.class_traits.borrow().get(name).cloned())
    }

    fn instance_trait(&self, name: &str) -> Option<TraitDescriptor> {
        self.0
            .instance_traits
            .borrow()
            .as_ref()
            .and_then(|map| map.get(name).cloned())
    }

    /// Synthesize a descriptor for `name` and register it class-wide.
    pub(crate) fn prefix_trait(&self, name: &str, is_set: bool) -> Result<TraitDescriptor> {
        let behavior = Rc::clone(self.0.class.behavior());
        let descriptor = behavior.prefix_trait(self, name, is_set)?;
        self.0
            .class_traits
            .borrow_mut()
            .insert(Rc::from(name), descriptor);
        tracing::debug!(
            message = "ctrait.prefix_trait",
            class = self.type_name(),
            name,
            is_set
        );
        if name != "trait_added" && self.0.class_traits.borrow().contains_key("trait_added") {
            self.set("trait_added", Value::str(name))?;
        }
        self.local_trait(name).ok_or_else(|| {
            TraitError::internal(format!(
                "Invalid trait dictionary entry for the '{name}' attribute of a '{}' object.",
                self.type_name()
            ))
        })
    }

    /// Resolve the descriptor for `name` under `mode`.
    ///
    /// # Errors
    ///
    /// Prefix synthesis and delegation-walk failures.
    pub fn trait_(&self, name: &str, mode: TraitLookup) -> Result<Option<TraitDescriptor>> {
        if mode == TraitLookup::Base {
            return delegate::base_trait(self, name).map(Some);
        }
        if let Some(descriptor) = self.instance_trait(name) {
            return Ok(Some(descriptor));
        }
        if mode == TraitLookup::InstanceOnly {
            return Ok(None);
        }
        let class_trait = self.0.class_traits.borrow().get(name).cloned();
        let descriptor = match class_trait {
            Some(descriptor) => descriptor,
            None if mode == TraitLookup::Existing => return Ok(None),
            None => self.prefix_trait(name, false)?,
        };
        if mode != TraitLookup::ForceInstance {
            return Ok(Some(descriptor));
        }
        let clone = descriptor.instance_clone();
        self.add_instance_trait(name, clone.clone());
        Ok(Some(clone))
    }

    /// The descriptor that ultimately stores `name`, following delegation.
    ///
    /// # Errors
    ///
    /// Delegation failures.
    pub fn base_trait(&self, name: &str) -> Result<TraitDescriptor> {
        delegate::base_trait(self, name)
    }

    /// Install `descriptor` for `name` on this host only.
    pub fn add_instance_trait(&self, name: &str, descriptor: TraitDescriptor) {
        self.0
            .instance_traits
            .borrow_mut()
            .get_or_insert_with(TraitMap::default)
            .insert(Rc::from(name), descriptor);
    }

    /// Remove the instance-level descriptor for `name`.
    pub fn remove_instance_trait(&self, name: &str) -> Option<TraitDescriptor> {
        self.0
            .instance_traits
            .borrow_mut()
            .as_mut()
            .and_then(|map| map.remove(name))
    }

    /// Snapshot of the instance-level descriptors, sorted by name; `None`
    /// when the map was never created.
    #[must_use]
    pub fn instance_traits(&self) -> Option<Vec<(String, TraitDescriptor)>> {
        self.0.instance_traits.borrow().as_ref().map(|map| {
            let mut entries: Vec<(String, TraitDescriptor)> = map
                .iter()
                .map(|(name, descriptor)| (name.to_string(), descriptor.clone()))
                .collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            entries
        })
    }

    // ─── Notification ───────────────────────────────────────────────────

    /// Announce a change of a computed attribute.
    ///
    /// Without `new`, the current value is read and used.
    ///
    /// # Errors
    ///
    /// Lookup, read, and notifier failures.
    pub fn trait_property_changed(&self, name: &str, old: &Value, new: Option<&Value>) -> Result<()> {
        let Some(descriptor) = self.trait_(name, TraitLookup::WithPrefix)? else {
            return Ok(());
        };
        if !(descriptor.has_notifiers() || self.has_notifiers()) {
            return Ok(());
        }
        let new = match new {
            Some(new) => new.clone(),
            None => self.get(name)?,
        };
        call_notifiers(&descriptor, self, name, old, &new)
    }

    /// Fire the items event `name`, creating its descriptor from
    /// `event_trait` on first use.
    ///
    /// # Errors
    ///
    /// Policy error when the descriptor is still missing after one
    /// synthesis attempt; otherwise whatever the event write raises.
    pub fn trait_items_event(&self, name: &str, event: &Value, event_trait: &TraitDescriptor) -> Result<()> {
        let mut synthesized = false;
        loop {
            match self.local_trait(name) {
                Some(descriptor) if descriptor.setattr_handler() != SetHandler::Disallow => {
                    return dispatch_set(&descriptor, &descriptor, self, name, Some(event));
                }
                _ if synthesized => {
                    return Err(TraitError::policy(
                        "Can not set a collection's '_items' trait.",
                    ));
                }
                _ => {
                    tracing::debug!(
                        message = "ctrait.items_event.synthesize",
                        class = self.type_name(),
                        name
                    );
                    let behavior = Rc::clone(self.0.class.behavior());
                    behavior.add_trait(self, name, event_trait.clone())?;
                    synthesized = true;
                }
            }
        }
    }

    /// Enable or suppress all notifications for this host.
    pub fn change_notify(&self, enabled: bool) {
        self.toggle(HostFlags::NO_NOTIFY, !enabled);
    }

    /// When set, assigning this host elsewhere fires no notifiers.
    pub fn veto_notify(&self, vetoed: bool) {
        self.toggle(HostFlags::VETO_NOTIFY, vetoed);
    }

    #[must_use]
    pub fn notifications_suppressed(&self) -> bool {
        self.flags().contains(HostFlags::NO_NOTIFY)
    }

    /// Register a notifier for every attribute of this host.
    pub fn on_any_trait_change(&self, notifier: Notifier) {
        self.0.notifiers.push(notifier);
    }

    /// Remove by identity; returns whether it was present.
    pub fn remove_any_trait_notifier(&self, notifier: &Notifier) -> bool {
        self.0.notifiers.remove(notifier)
    }

    /// The host notifier list; with `force_create` an empty list is created.
    pub fn notifiers(&self, force_create: bool) -> Option<Vec<Notifier>> {
        if force_create {
            self.0.notifiers.ensure();
        }
        self.0
            .notifiers
            .exists()
            .then(|| self.0.notifiers.snapshot())
    }

    pub(crate) fn notifier_snapshot(&self) -> Vec<Notifier> {
        self.0.notifiers.snapshot()
    }

    pub(crate) fn has_notifiers(&self) -> bool {
        self.0.notifiers.has_any()
    }

    pub(crate) fn notifiers_exist(&self) -> bool {
        self.0.notifiers.exists()
    }

    // ─── Value dict ─────────────────────────────────────────────────────

    /// Stored value of `name`, bypassing descriptors.
    pub(crate) fn value(&self, name: &str) -> Option<Value> {
        let values = self.0.values.borrow();
        match values.as_ref()?.get(name)? {
            Slot::Value(value) => Some(value.clone()),
            Slot::SelfRef => Some(Value::Host(self.clone())),
        }
    }

    pub(crate) fn store(&self, name: &str, value: Value) {
        let slot = match &value {
            Value::Host(host) if host.ptr_eq(self) => Slot::SelfRef,
            _ => Slot::Value(value),
        };
        self.0
            .values
            .borrow_mut()
            .get_or_insert_with(AHashMap::new)
            .insert(Rc::from(name), slot);
    }

    pub(crate) fn remove(&self, name: &str) -> Option<Value> {
        let slot = self.0.values.borrow_mut().as_mut()?.remove(name)?;
        Some(match slot {
            Slot::Value(value) => value,
            Slot::SelfRef => Value::Host(self.clone()),
        })
    }

    /// Ordinary lookup: the value dict, then class attributes.
    pub(crate) fn generic_get(&self, name: &str) -> Result<Value> {
        if let Some(value) = self.value(name) {
            return Ok(value);
        }
        self.0
            .class
            .attribute(name)
            .ok_or_else(|| TraitError::no_attribute(self.type_name(), name))
    }

    /// Snapshot of the value dict, sorted by name.
    #[must_use]
    pub fn attribute_values(&self) -> Vec<(String, Value)> {
        let names: Vec<Rc<str>> = self
            .0
            .values
            .borrow()
            .as_ref()
            .map(|values| values.keys().cloned().collect())
            .unwrap_or_default();
        let mut entries: Vec<(String, Value)> = names
            .into_iter()
            .filter_map(|name| self.value(&name).map(|value| (name.to_string(), value)))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Whether `name` has a stored value.
    #[must_use]
    pub fn has_value(&self, name: &str) -> bool {
        self.0
            .values
            .borrow()
            .as_ref()
            .is_some_and(|values| values.contains_key(name))
    }

    /// Release the value dict, instance descriptors, and notifiers.
    ///
    /// Breaks reference cycles through stored values; the host stays usable
    /// and reads fall back to defaults again.
    pub fn clear(&self) {
        let values = self.0.values.borrow_mut().take();
        let traits = self.0.instance_traits.borrow_mut().take();
        self.0.notifiers.clear();
        drop(values);
        drop(traits);
    }
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("class", &self.type_name())
            .field("flags", &self.flags())
            .finish_non_exhaustive()
    }
}
