#![forbid(unsafe_code)]

//! Host classes and the collaborator hooks the engine calls.
//!
//! # Design
//!
//! A [`HostClass`] owns the class-level descriptor map shared by every host
//! built from it. The map is reached through an `Rc<RefCell<_>>` so prefix
//! synthesis can register new entries for all instances at once; no other
//! path writes to it after [`HostClassBuilder::build`].
//!
//! The hooks a declaration layer supplies (prefix synthesis, construction
//! lifecycle, `add_trait`, delegate-listener bookkeeping) are methods of
//! [`HostBehavior`], each with a default that does nothing or the obvious
//! thing.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;

use crate::context::TraitContext;
use crate::descriptor::{TraitDescriptor, TraitKind};
use crate::error::{Result, TraitError};
use crate::host::Host;
use crate::value::Value;

/// Name → descriptor mapping.
pub type TraitMap = AHashMap<Rc<str>, TraitDescriptor>;

/// Collaborator hooks invoked by the engine.
pub trait HostBehavior {
    /// Synthesize a descriptor for a name no map defines.
    ///
    /// # Errors
    ///
    /// The default consults the class's [`PrefixTraitTable`].
    fn prefix_trait(&self, host: &Host, name: &str, is_set: bool) -> Result<TraitDescriptor> {
        host.class().prefix_traits().resolve(host, name, is_set)
    }

    fn init_trait_listeners(&self, _host: &Host) -> Result<()> {
        Ok(())
    }

    fn post_init_trait_listeners(&self, _host: &Host) -> Result<()> {
        Ok(())
    }

    fn init_trait_observers(&self, _host: &Host) -> Result<()> {
        Ok(())
    }

    fn post_init_trait_observers(&self, _host: &Host) -> Result<()> {
        Ok(())
    }

    fn traits_init(&self, _host: &Host) -> Result<()> {
        Ok(())
    }

    /// Install a descriptor for `name` on this host only.
    fn add_trait(&self, host: &Host, name: &str, descriptor: TraitDescriptor) -> Result<()> {
        host.add_instance_trait(name, descriptor);
        Ok(())
    }

    /// Called after a write that a delegate descriptor stored on the host
    /// itself instead of the delegate.
    fn remove_trait_delegate_listener(&self, _host: &Host, _name: &str, _has_value: bool) -> Result<()> {
        Ok(())
    }
}

/// Behavior with every hook at its default.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBehavior;

impl HostBehavior for DefaultBehavior {}

/// Descriptors synthesized by attribute-name prefix.
///
/// The longest matching prefix wins; the empty prefix matches every name.
#[derive(Clone, Default)]
pub struct PrefixTraitTable {
    entries: Vec<(String, TraitDescriptor)>,
}

impl PrefixTraitTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the descriptor used for names starting with
    /// `prefix`.
    pub fn insert(&mut self, prefix: &str, descriptor: TraitDescriptor) {
        match self.entries.iter_mut().find(|(p, _)| p == prefix) {
            Some(entry) => entry.1 = descriptor,
            None => self.entries.push((prefix.to_owned(), descriptor)),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Descriptor of the longest prefix matching `name`.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&TraitDescriptor> {
        self.entries
            .iter()
            .filter(|(prefix, _)| name.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, descriptor)| descriptor)
    }

    /// Resolve `name` for `host`.
    ///
    /// Dunder names are never synthesized: reads fail, writes get a plain
    /// passthrough attribute.
    ///
    /// # Errors
    ///
    /// "no attribute" for dunder reads and for tables with no entries; an
    /// internal error when a non-empty table has no matching prefix.
    pub fn resolve(&self, host: &Host, name: &str, is_set: bool) -> Result<TraitDescriptor> {
        if name.len() > 4 && name.starts_with("__") && name.ends_with("__") {
            return if is_set {
                Ok(TraitDescriptor::new(TraitKind::Python))
            } else {
                Err(TraitError::no_attribute(host.type_name(), name))
            };
        }
        if self.is_empty() {
            return Err(TraitError::no_attribute(host.type_name(), name));
        }
        self.lookup(name).cloned().ok_or_else(|| {
            TraitError::internal(format!(
                "Trait class look-up failed for attribute '{name}' for an object of type '{}'",
                host.type_name()
            ))
        })
    }
}

impl fmt::Debug for PrefixTraitTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(prefix, _)| prefix))
            .finish()
    }
}

/// The runtime class of a [`Host`].
pub struct HostClass {
    name: String,
    base: Option<Rc<HostClass>>,
    class_traits: Option<Rc<RefCell<TraitMap>>>,
    has_listeners: bool,
    prefix: Option<String>,
    attributes: AHashMap<String, Value>,
    prefix_traits: PrefixTraitTable,
    behavior: Rc<dyn HostBehavior>,
    context: Rc<TraitContext>,
}

impl HostClass {
    #[must_use]
    pub fn builder(name: &str) -> HostClassBuilder {
        HostClassBuilder::new(name)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn base(&self) -> Option<&Rc<HostClass>> {
        self.base.as_ref()
    }

    /// Whether `self` is `other` or inherits from it.
    #[must_use]
    pub fn is_subclass_of(&self, other: &Rc<HostClass>) -> bool {
        let mut current = Some(self);
        while let Some(class) = current {
            if std::ptr::eq(class, Rc::as_ptr(other)) {
                return true;
            }
            current = class.base.as_deref();
        }
        false
    }

    #[must_use]
    pub fn has_listeners(&self) -> bool {
        self.has_listeners
    }

    /// Prefix used by the class-prefix delegate naming policy.
    #[must_use]
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Plain class attribute used by generic lookup.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<Value> {
        self.attributes.get(name).cloned()
    }

    #[must_use]
    pub fn prefix_traits(&self) -> &PrefixTraitTable {
        &self.prefix_traits
    }

    #[must_use]
    pub fn behavior(&self) -> &Rc<dyn HostBehavior> {
        &self.behavior
    }

    #[must_use]
    pub fn context(&self) -> &Rc<TraitContext> {
        &self.context
    }

    /// Class-level descriptor for `name`.
    #[must_use]
    pub fn class_trait(&self, name: &str) -> Option<TraitDescriptor> {
        self.class_traits
            .as_ref()
            .and_then(|map| map.borrow().get(name).cloned())
    }

    /// Sorted names of the class-level descriptors.
    #[must_use]
    pub fn trait_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .class_traits
            .as_ref()
            .map(|map| map.borrow().keys().map(|k| k.to_string()).collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    pub(crate) fn class_traits(&self) -> Option<&Rc<RefCell<TraitMap>>> {
        self.class_traits.as_ref()
    }
}

impl fmt::Debug for HostClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostClass")
            .field("name", &self.name)
            .field("base", &self.base.as_ref().map(|b| b.name()))
            .field("traits", &self.trait_names())
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

/// Builder for [`HostClass`].
///
/// A builder seeded with [`base`](Self::base) starts from the base class's
/// descriptors, attributes, prefix table, behavior, and context; later calls
/// override them.
pub struct HostClassBuilder {
    name: String,
    base: Option<Rc<HostClass>>,
    traits: Option<TraitMap>,
    has_listeners: bool,
    prefix: Option<String>,
    attributes: AHashMap<String, Value>,
    prefix_traits: PrefixTraitTable,
    behavior: Option<Rc<dyn HostBehavior>>,
    context: Option<Rc<TraitContext>>,
}

impl HostClassBuilder {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            base: None,
            traits: Some(TraitMap::default()),
            has_listeners: false,
            prefix: None,
            attributes: AHashMap::new(),
            prefix_traits: PrefixTraitTable::new(),
            behavior: None,
            context: None,
        }
    }

    #[must_use]
    pub fn base(mut self, base: &Rc<HostClass>) -> Self {
        if let (Some(traits), Some(inherited)) = (self.traits.as_mut(), base.class_traits()) {
            for (name, descriptor) in inherited.borrow().iter() {
                traits
                    .entry(Rc::clone(name))
                    .or_insert_with(|| descriptor.clone());
            }
        }
        for (name, value) in &base.attributes {
            self.attributes
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
        for (prefix, descriptor) in &base.prefix_traits.entries {
            if self.prefix_traits.lookup(prefix).is_none() {
                self.prefix_traits.insert(prefix, descriptor.clone());
            }
        }
        self.has_listeners |= base.has_listeners;
        self.prefix = self.prefix.or_else(|| base.prefix.clone());
        self.behavior = self.behavior.or_else(|| Some(Rc::clone(&base.behavior)));
        self.context = self.context.or_else(|| Some(Rc::clone(&base.context)));
        self.base = Some(Rc::clone(base));
        self
    }

    /// Declare a class-level descriptor.
    #[must_use]
    pub fn trait_(mut self, name: &str, descriptor: TraitDescriptor) -> Self {
        if let Some(traits) = self.traits.as_mut() {
            traits.insert(Rc::from(name), descriptor);
        }
        self
    }

    /// Declare a plain class attribute.
    #[must_use]
    pub fn attribute(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.to_owned(), value.into());
        self
    }

    /// Descriptor synthesized for names starting with `prefix`.
    #[must_use]
    pub fn prefix_trait(mut self, prefix: &str, descriptor: TraitDescriptor) -> Self {
        self.prefix_traits.insert(prefix, descriptor);
        self
    }

    #[must_use]
    pub fn listeners(mut self, has_listeners: bool) -> Self {
        self.has_listeners = has_listeners;
        self
    }

    #[must_use]
    pub fn prefix(mut self, prefix: &str) -> Self {
        self.prefix = Some(prefix.to_owned());
        self
    }

    #[must_use]
    pub fn behavior(mut self, behavior: Rc<dyn HostBehavior>) -> Self {
        self.behavior = Some(behavior);
        self
    }

    #[must_use]
    pub fn context(mut self, context: Rc<TraitContext>) -> Self {
        self.context = Some(context);
        self
    }

    /// Build a class without a descriptor map; allocating a host of it
    /// fails.
    #[must_use]
    pub fn no_trait_map(mut self) -> Self {
        self.traits = None;
        self
    }

    #[must_use]
    pub fn build(self) -> Rc<HostClass> {
        Rc::new(HostClass {
            name: self.name,
            base: self.base,
            class_traits: self.traits.map(|traits| Rc::new(RefCell::new(traits))),
            has_listeners: self.has_listeners,
            prefix: self.prefix,
            attributes: self.attributes,
            prefix_traits: self.prefix_traits,
            behavior: self.behavior.unwrap_or_else(|| Rc::new(DefaultBehavior)),
            context: self
                .context
                .unwrap_or_else(|| Rc::new(TraitContext::default())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_prefix_wins() {
        let mut table = PrefixTraitTable::new();
        let any = TraitDescriptor::new(TraitKind::Python);
        let tmp = TraitDescriptor::new(TraitKind::Trait);
        let tmp_x = TraitDescriptor::new(TraitKind::Event);
        table.insert("", any.clone());
        table.insert("tmp_", tmp.clone());
        table.insert("tmp_x", tmp_x.clone());
        assert!(table.lookup("tmp_xy").unwrap().ptr_eq(&tmp_x));
        assert!(table.lookup("tmp_a").unwrap().ptr_eq(&tmp));
        assert!(table.lookup("other").unwrap().ptr_eq(&any));
    }

    #[test]
    fn insert_replaces_same_prefix() {
        let mut table = PrefixTraitTable::new();
        let first = TraitDescriptor::new(TraitKind::Trait);
        let second = TraitDescriptor::new(TraitKind::Event);
        table.insert("a", first);
        table.insert("a", second.clone());
        assert!(table.lookup("ab").unwrap().ptr_eq(&second));
        assert!(table.lookup("b").is_none());
    }

    #[test]
    fn subclass_inherits_descriptors_and_attributes() {
        let x = TraitDescriptor::new(TraitKind::Trait);
        let base = HostClass::builder("Base")
            .trait_("x", x.clone())
            .attribute("kind", "base")
            .prefix("b_")
            .build();
        let y = TraitDescriptor::new(TraitKind::Trait);
        let sub = HostClass::builder("Sub").base(&base).trait_("y", y).build();
        assert!(sub.class_trait("x").unwrap().ptr_eq(&x));
        assert_eq!(sub.trait_names(), ["x", "y"]);
        assert_eq!(sub.attribute("kind"), Some(Value::str("base")));
        assert_eq!(sub.prefix(), Some("b_"));
        assert!(sub.is_subclass_of(&base));
        assert!(!base.is_subclass_of(&sub));
        assert!(Rc::ptr_eq(sub.context(), base.context()));
    }

    #[test]
    fn subclass_overrides_win() {
        let base = HostClass::builder("Base")
            .trait_("x", TraitDescriptor::new(TraitKind::Trait))
            .build();
        let override_x = TraitDescriptor::new(TraitKind::Event);
        let sub = HostClass::builder("Sub")
            .trait_("x", override_x.clone())
            .base(&base)
            .build();
        assert!(sub.class_trait("x").unwrap().ptr_eq(&override_x));
    }

    #[test]
    fn no_trait_map_has_no_descriptors() {
        let class = HostClass::builder("Bare").no_trait_map().build();
        assert!(class.class_traits().is_none());
        assert!(class.trait_names().is_empty());
    }
}
