#![forbid(unsafe_code)]

//! The per-attribute trait descriptor.
//!
//! # Design
//!
//! A [`TraitDescriptor`] is a shared handle: class-level descriptors are
//! reachable from every host of the class, instance-level descriptors are
//! clones owned by one host. All fields live behind `Cell`/`RefCell` so the
//! declaration layer can reconfigure a descriptor after construction, exactly
//! as it reconfigures a freshly built one.
//!
//! Behavior is selected from closed handler enums (see [`dispatch`]); the
//! get/set dispatch itself lives in the `get` and `set` submodules.
//!
//! # Invariants
//!
//! 1. A property-flagged descriptor has its get/set handlers drawn from the
//!    property variants.
//! 2. No `RefCell` borrow is held across a call into user code.
//! 3. `clone_from` copies every field except the notifier list and the aux
//!    dict; an instance clone additionally gets its own copy of the source's
//!    notifier list and shares its aux dict.

pub mod check;
pub mod default;
pub mod dispatch;
mod get;
pub(crate) mod set;
pub mod validate;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::context::TraitContext;
use crate::error::{Result, TraitError};
use crate::flags::{ComparisonMode, TraitFlags};
use crate::handler::HandlerRef;
use crate::host::Host;
use crate::notify::{Notifier, NotifierList};
use crate::trait_value::ValuePropertyHooks;
use crate::value::{Callable, Dict, Value};

pub use default::DefaultValueKind;
pub use dispatch::{Arity, DelegateAttrName, GetHandler, PostSetHandler, SetHandler, TraitKind};
pub use validate::{RangeExclusion, Validator};

struct TraitData {
    flags: Cell<TraitFlags>,
    getattr: Cell<GetHandler>,
    setattr: Cell<SetHandler>,
    post_setattr: Cell<Option<PostSetHandler>>,
    post_setattr_callable: RefCell<Option<Callable>>,
    validator: RefCell<Option<Rc<Validator>>>,
    default_kind: Cell<DefaultValueKind>,
    default_value: RefCell<Option<Value>>,
    delegate_name: RefCell<Option<Value>>,
    delegate_prefix: RefCell<Option<Value>>,
    delegate_attr_name: Cell<Option<DelegateAttrName>>,
    notifiers: NotifierList,
    handler: RefCell<Option<HandlerRef>>,
    aux: RefCell<Option<Rc<RefCell<Dict>>>>,
    value_hooks: RefCell<Option<Rc<dyn ValuePropertyHooks>>>,
}

/// Behavior of one named attribute.
#[derive(Clone)]
pub struct TraitDescriptor(Rc<TraitData>);

impl TraitDescriptor {
    #[must_use]
    pub fn new(kind: TraitKind) -> Self {
        let (getattr, setattr) = kind.handlers();
        // A read-only trait reads as `Undefined` until its one write.
        let default_value = matches!(kind, TraitKind::ReadOnly).then_some(Value::Undefined);
        Self(Rc::new(TraitData {
            flags: Cell::new(TraitFlags::empty()),
            getattr: Cell::new(getattr),
            setattr: Cell::new(setattr),
            post_setattr: Cell::new(None),
            post_setattr_callable: RefCell::new(None),
            validator: RefCell::new(None),
            default_kind: Cell::new(DefaultValueKind::Constant),
            default_value: RefCell::new(default_value),
            delegate_name: RefCell::new(None),
            delegate_prefix: RefCell::new(None),
            delegate_attr_name: Cell::new(None),
            notifiers: NotifierList::default(),
            handler: RefCell::new(None),
            aux: RefCell::new(None),
            value_hooks: RefCell::new(None),
        }))
    }

    /// # Errors
    ///
    /// "Invalid argument to trait constructor." outside 0..=8.
    pub fn from_kind_index(kind: i64) -> Result<Self> {
        Ok(Self::new(TraitKind::from_index(kind)?))
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &TraitDescriptor) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0).cast::<()>() as usize
    }

    // ─── Handlers ───────────────────────────────────────────────────────

    #[must_use]
    pub fn getattr_handler(&self) -> GetHandler {
        self.0.getattr.get()
    }

    #[must_use]
    pub fn setattr_handler(&self) -> SetHandler {
        self.0.setattr.get()
    }

    #[must_use]
    pub fn post_setattr_handler(&self) -> Option<PostSetHandler> {
        self.0.post_setattr.get()
    }

    pub(crate) fn set_handlers(&self, getattr: GetHandler, setattr: SetHandler) {
        self.0.getattr.set(getattr);
        self.0.setattr.set(setattr);
    }

    pub(crate) fn set_post_setattr_handler(&self, handler: Option<PostSetHandler>) {
        self.0.post_setattr.set(handler);
    }

    // ─── Flags ──────────────────────────────────────────────────────────

    #[must_use]
    pub fn flags(&self) -> TraitFlags {
        self.0.flags.get()
    }

    pub(crate) fn set_flags(&self, flags: TraitFlags) {
        self.0.flags.set(flags);
    }

    fn toggle(&self, flag: TraitFlags, on: bool) {
        let mut flags = self.flags();
        flags.set(flag, on);
        self.set_flags(flags);
    }

    #[must_use]
    pub fn is_property(&self) -> bool {
        self.flags().contains(TraitFlags::PROPERTY)
    }

    #[must_use]
    pub fn modify_delegate(&self) -> bool {
        self.flags().contains(TraitFlags::MODIFY_DELEGATE)
    }

    #[must_use]
    pub fn setattr_original_value(&self) -> bool {
        self.flags().contains(TraitFlags::SETATTR_ORIGINAL_VALUE)
    }

    pub fn set_setattr_original_value(&self, on: bool) -> &Self {
        self.toggle(TraitFlags::SETATTR_ORIGINAL_VALUE, on);
        self
    }

    #[must_use]
    pub fn post_setattr_original_value(&self) -> bool {
        self.flags().contains(TraitFlags::POST_SETATTR_ORIGINAL_VALUE)
    }

    pub fn set_post_setattr_original_value(&self, on: bool) -> &Self {
        self.toggle(TraitFlags::POST_SETATTR_ORIGINAL_VALUE, on);
        self
    }

    #[must_use]
    pub fn is_mapped(&self) -> bool {
        self.flags().contains(TraitFlags::IS_MAPPED)
    }

    pub fn set_is_mapped(&self, on: bool) -> &Self {
        self.toggle(TraitFlags::IS_MAPPED, on);
        self
    }

    #[must_use]
    pub fn value_allowed(&self) -> bool {
        self.flags().contains(TraitFlags::VALUE_ALLOWED)
    }

    pub fn set_value_allowed(&self, on: bool) {
        self.toggle(TraitFlags::VALUE_ALLOWED, on);
    }

    #[must_use]
    pub fn value_property(&self) -> bool {
        self.flags().contains(TraitFlags::VALUE_PROPERTY)
    }

    pub fn set_value_property(&self, on: bool) {
        self.toggle(TraitFlags::VALUE_PROPERTY, on);
    }

    #[must_use]
    pub fn comparison_mode(&self) -> ComparisonMode {
        ComparisonMode::from_flags(self.flags())
    }

    pub fn set_comparison_mode(&self, mode: ComparisonMode) {
        self.set_flags(mode.apply(self.flags()));
    }

    /// # Errors
    ///
    /// Values outside 0..=2 are rejected.
    pub fn set_comparison_mode_index(&self, index: i64) -> Result<()> {
        self.set_comparison_mode(ComparisonMode::from_index(index)?);
        Ok(())
    }

    // ─── Default value ──────────────────────────────────────────────────

    #[must_use]
    pub fn default_kind(&self) -> DefaultValueKind {
        self.0.default_kind.get()
    }

    #[must_use]
    pub fn default_payload(&self) -> Option<Value> {
        self.0.default_value.borrow().clone()
    }

    /// `(kind index, payload)`; `(0, None)` when no payload was ever set.
    #[must_use]
    pub fn default_value(&self) -> (i64, Value) {
        match self.default_payload() {
            Some(payload) => (self.default_kind().index(), payload),
            None => (0, Value::None),
        }
    }

    /// # Errors
    ///
    /// "The default value type must be 0..10, but N was specified."
    pub fn set_default_value(&self, kind: i64, payload: Value) -> Result<()> {
        self.set_default(DefaultValueKind::from_index(kind)?, payload);
        Ok(())
    }

    pub fn set_default(&self, kind: DefaultValueKind, payload: Value) {
        self.0.default_kind.set(kind);
        *self.0.default_value.borrow_mut() = Some(payload);
    }

    pub(crate) fn restore_default(&self, kind: DefaultValueKind, payload: Option<Value>) {
        self.0.default_kind.set(kind);
        *self.0.default_value.borrow_mut() = payload;
    }

    /// The static default: `Undefined` for host-dependent kinds, a copy of
    /// the payload for container kinds, the payload otherwise.
    ///
    /// # Errors
    ///
    /// Container payloads that cannot be copied.
    pub fn static_default(&self) -> Result<Value> {
        let (_, payload) = self.default_value();
        let kind = self.default_kind();
        if kind.is_dynamic() {
            return Ok(Value::Undefined);
        }
        Ok(match (kind, &payload) {
            (DefaultValueKind::Constant | DefaultValueKind::Missing, _) => payload,
            (_, Value::Dict(dict)) => Value::Dict(Rc::new(RefCell::new(dict.borrow().clone()))),
            (_, Value::Set(_)) => crate::types::TypeSpec::Set.convert(&payload)?,
            (_, Value::None) => Value::None,
            _ => Value::list(payload.iter_items()?),
        })
    }

    // ─── Validation ─────────────────────────────────────────────────────

    #[must_use]
    pub fn validator(&self) -> Option<Rc<Validator>> {
        self.0.validator.borrow().clone()
    }

    pub fn set_validator(&self, validator: Option<Validator>) {
        *self.0.validator.borrow_mut() = validator.map(Rc::new);
    }

    /// Install a validator from its payload form; `None` removes it.
    ///
    /// # Errors
    ///
    /// "The argument must be a tuple or callable." for malformed payloads.
    pub fn set_validate(&self, payload: &Value) -> Result<()> {
        let validator = match payload {
            Value::None => None,
            other => Some(Validator::from_payload(other)?),
        };
        self.set_validator(validator);
        Ok(())
    }

    /// Payload of the installed validator.
    #[must_use]
    pub fn get_validate(&self) -> Option<Value> {
        self.validator().map(|v| v.payload())
    }

    /// Run the validator; without one the value is returned unchanged.
    ///
    /// # Errors
    ///
    /// The handler's validation error on rejection; hard failures from user
    /// callables propagate.
    pub fn validate(&self, host: Option<&Host>, name: &str, value: &Value) -> Result<Value> {
        match host {
            Some(h) => self.validate_with(h.context(), host, name, value),
            None => self.validate_with(&TraitContext::default(), None, name, value),
        }
    }

    pub(crate) fn validate_with(
        &self,
        context: &TraitContext,
        host: Option<&Host>,
        name: &str,
        value: &Value,
    ) -> Result<Value> {
        match self.validator() {
            Some(validator) => check::run_validator(&validator, self, context, host, name, value),
            None => Ok(value.clone()),
        }
    }

    /// Validate outside of an attribute write.
    ///
    /// # Errors
    ///
    /// "Invalid value for trait, the value should be <info>." on rejection.
    pub fn cast(&self, host: Option<&Host>, name: Option<&str>, value: &Value) -> Result<Value> {
        self.validate(host, name.unwrap_or(""), value).map_err(|_| {
            match self.handler() {
                Some(handler) => TraitError::value_error(format!(
                    "Invalid value for trait, the value should be {}.",
                    handler.info()
                )),
                None => TraitError::value_error("Invalid value for trait."),
            }
        })
    }

    /// The user-facing rejection error for `value`.
    pub(crate) fn raise_error(&self, host: Option<&Host>, name: &str, value: &Value) -> TraitError {
        match self.handler() {
            Some(handler) => handler.error(host, name, value),
            None => TraitError::validation(host, name, "a legal value", value),
        }
    }

    // ─── Post-set ───────────────────────────────────────────────────────

    #[must_use]
    pub fn post_setattr(&self) -> Option<Callable> {
        self.0.post_setattr_callable.borrow().clone()
    }

    /// Install a `(host, name, value)` hook run after each change.
    ///
    /// # Errors
    ///
    /// "The assigned value must be callable." for non-callables.
    pub fn set_post_setattr(&self, callable: &Value) -> Result<()> {
        let Value::Callable(callable) = callable else {
            return Err(TraitError::value_error("The assigned value must be callable."));
        };
        self.set_post_setattr_handler(Some(PostSetHandler::Callable));
        *self.0.post_setattr_callable.borrow_mut() = Some(callable.clone());
        Ok(())
    }

    pub(crate) fn restore_post_setattr_callable(&self, callable: Option<Callable>) {
        *self.0.post_setattr_callable.borrow_mut() = callable;
    }

    pub(crate) fn run_post_setattr(&self, host: &Host, name: &str, value: &Value) -> Result<()> {
        match self.post_setattr_handler() {
            None => Ok(()),
            Some(PostSetHandler::Callable) => {
                let Some(callable) = self.post_setattr() else {
                    return Err(TraitError::internal(format!(
                        "the '{name}' trait has a post-set handler but no callable"
                    )));
                };
                callable.call(&[Value::Host(host.clone()), Value::str(name), value.clone()])?;
                Ok(())
            }
            Some(PostSetHandler::Property(arity)) => {
                self.call_property_setter(arity, host, name, value)
            }
        }
    }

    // ─── Delegation ─────────────────────────────────────────────────────

    /// Configure delegation to attribute `name` of this host's `delegate`
    /// attribute.
    ///
    /// # Errors
    ///
    /// "The delegate prefix type must be 0..3, but N was specified."
    pub fn delegate(&self, delegate: &str, prefix: &str, policy: i64, modify: bool) -> Result<()> {
        let policy = DelegateAttrName::from_policy(policy)?;
        self.toggle(TraitFlags::MODIFY_DELEGATE, modify);
        *self.0.delegate_name.borrow_mut() = Some(Value::str(delegate));
        *self.0.delegate_prefix.borrow_mut() = Some(Value::str(prefix));
        self.0.delegate_attr_name.set(Some(policy));
        Ok(())
    }

    #[must_use]
    pub fn delegate_name(&self) -> Option<Value> {
        self.0.delegate_name.borrow().clone()
    }

    #[must_use]
    pub fn delegate_prefix(&self) -> Option<Value> {
        self.0.delegate_prefix.borrow().clone()
    }

    #[must_use]
    pub fn delegate_attr_name(&self) -> Option<DelegateAttrName> {
        self.0.delegate_attr_name.get()
    }

    pub(crate) fn restore_delegate(
        &self,
        name: Option<Value>,
        prefix: Option<Value>,
        policy: Option<DelegateAttrName>,
    ) {
        *self.0.delegate_name.borrow_mut() = name;
        *self.0.delegate_prefix.borrow_mut() = prefix;
        self.0.delegate_attr_name.set(policy);
    }

    /// Name of the host attribute holding the delegate.
    pub(crate) fn delegate_attribute(&self, name: &str) -> Result<Rc<str>> {
        match self.delegate_name() {
            Some(Value::Str(s)) => Ok(s),
            _ => Err(TraitError::internal(format!(
                "the '{name}' trait has no delegate attribute name"
            ))),
        }
    }

    /// Attribute name on the delegate for `name` accessed through `host`.
    pub(crate) fn map_delegate_name(&self, host: &Host, name: &str) -> Result<String> {
        let policy = self.delegate_attr_name().ok_or_else(|| {
            TraitError::internal(format!("the '{name}' trait has no delegate name policy"))
        })?;
        let prefix = self.delegate_prefix();
        let prefix = prefix.as_ref().and_then(Value::as_str).unwrap_or("");
        Ok(policy.map(name, prefix, host.class().prefix()))
    }

    // ─── Property ───────────────────────────────────────────────────────

    /// Turn this descriptor into a computed property.
    ///
    /// The getter and setter are called with the given arity; a validator
    /// callable, when present, runs before the setter.
    ///
    /// # Errors
    ///
    /// "Invalid arguments." for non-callables or arities outside 0..=3.
    pub fn property(
        &self,
        get: &Value,
        get_arity: i64,
        set: &Value,
        set_arity: i64,
        validate: &Value,
        validate_arity: i64,
    ) -> Result<()> {
        let invalid = || TraitError::value_error("Invalid arguments.");
        if !get.is_callable() || !set.is_callable() {
            return Err(invalid());
        }
        let validate = match validate {
            Value::None => None,
            Value::Callable(callable) => Some(callable.clone()),
            _ => return Err(invalid()),
        };
        let get_arity = Arity::from_index(get_arity)?;
        let set_arity = Arity::from_index(set_arity)?;
        let validate_arity = Arity::from_index(validate_arity)?;

        self.toggle(TraitFlags::PROPERTY, true);
        match validate {
            Some(callable) => {
                self.set_handlers(GetHandler::Property(get_arity), SetHandler::ValidateProperty);
                self.set_post_setattr_handler(Some(PostSetHandler::Property(set_arity)));
                self.set_validator(Some(Validator::Property {
                    arity: validate_arity,
                    callable,
                }));
            }
            None => {
                self.set_handlers(GetHandler::Property(get_arity), SetHandler::Property(set_arity));
            }
        }
        *self.0.delegate_name.borrow_mut() = Some(get.clone());
        *self.0.delegate_prefix.borrow_mut() = Some(set.clone());
        Ok(())
    }

    /// `(getter, setter, validate-or-None)` of a property descriptor.
    #[must_use]
    pub fn property_fields(&self) -> Option<(Value, Value, Value)> {
        if !self.is_property() {
            return None;
        }
        let validate = match self.validator().as_deref() {
            Some(Validator::Property { callable, .. }) => Value::Callable(callable.clone()),
            _ => Value::None,
        };
        Some((
            self.delegate_name().unwrap_or(Value::None),
            self.delegate_prefix().unwrap_or(Value::None),
            validate,
        ))
    }

    fn property_callable(&self, slot: Option<Value>, role: &str, name: &str) -> Result<Callable> {
        match slot {
            Some(Value::Callable(callable)) => Ok(callable),
            _ => Err(TraitError::internal(format!(
                "the '{name}' property has no {role} callable"
            ))),
        }
    }

    pub(crate) fn call_property_getter(&self, arity: Arity, host: &Host, name: &str) -> Result<Value> {
        let getter = self.property_callable(self.delegate_name(), "getter", name)?;
        let args = match arity {
            Arity::Zero => vec![],
            Arity::One => vec![Value::Host(host.clone())],
            Arity::Two => vec![Value::Host(host.clone()), Value::str(name)],
            Arity::Three => vec![
                Value::Host(host.clone()),
                Value::str(name),
                Value::Trait(self.clone()),
            ],
        };
        getter.call(&args)
    }

    pub(crate) fn call_property_setter(
        &self,
        arity: Arity,
        host: &Host,
        name: &str,
        value: &Value,
    ) -> Result<()> {
        let setter = self.property_callable(self.delegate_prefix(), "setter", name)?;
        let args = match arity {
            Arity::Zero => vec![],
            Arity::One => vec![value.clone()],
            Arity::Two => vec![Value::Host(host.clone()), value.clone()],
            Arity::Three => vec![Value::Host(host.clone()), Value::str(name), value.clone()],
        };
        setter.call(&args)?;
        Ok(())
    }

    // ─── Handler, aux dict, value hooks ─────────────────────────────────

    #[must_use]
    pub fn handler(&self) -> Option<HandlerRef> {
        self.0.handler.borrow().clone()
    }

    pub fn set_handler(&self, handler: Option<HandlerRef>) {
        *self.0.handler.borrow_mut() = handler;
    }

    /// The auxiliary metadata dict, created on first access.
    #[must_use]
    pub fn aux(&self) -> Rc<RefCell<Dict>> {
        Rc::clone(
            self.0
                .aux
                .borrow_mut()
                .get_or_insert_with(|| Rc::new(RefCell::new(Dict::new()))),
        )
    }

    pub fn set_aux(&self, dict: Dict) {
        *self.0.aux.borrow_mut() = Some(Rc::new(RefCell::new(dict)));
    }

    pub(crate) fn aux_if_present(&self) -> Option<Rc<RefCell<Dict>>> {
        self.0.aux.borrow().clone()
    }

    pub(crate) fn restore_aux(&self, aux: Option<Rc<RefCell<Dict>>>) {
        *self.0.aux.borrow_mut() = aux;
    }

    /// Metadata lookup by string key.
    #[must_use]
    pub fn metadata(&self, key: &str) -> Option<Value> {
        self.0
            .aux
            .borrow()
            .as_ref()
            .and_then(|aux| aux.borrow().get_str(key).cloned())
    }

    pub fn set_value_hooks(&self, hooks: Option<Rc<dyn ValuePropertyHooks>>) {
        *self.0.value_hooks.borrow_mut() = hooks;
    }

    pub(crate) fn value_hooks(&self) -> Option<Rc<dyn ValuePropertyHooks>> {
        self.0.value_hooks.borrow().clone()
    }

    // ─── Notifiers ──────────────────────────────────────────────────────

    pub fn add_notifier(&self, notifier: Notifier) {
        self.0.notifiers.push(notifier);
    }

    /// Remove by identity; returns whether it was present.
    pub fn remove_notifier(&self, notifier: &Notifier) -> bool {
        self.0.notifiers.remove(notifier)
    }

    /// The notifier list; with `force_create` an empty list is created.
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

    // ─── Cloning ────────────────────────────────────────────────────────

    /// Copy every field of `source` except its notifiers and aux dict.
    pub fn clone_from(&self, source: &TraitDescriptor) {
        if self.ptr_eq(source) {
            return;
        }
        let s = &source.0;
        let d = &self.0;
        d.flags.set(s.flags.get());
        d.getattr.set(s.getattr.get());
        d.setattr.set(s.setattr.get());
        d.post_setattr.set(s.post_setattr.get());
        *d.post_setattr_callable.borrow_mut() = s.post_setattr_callable.borrow().clone();
        *d.validator.borrow_mut() = s.validator.borrow().clone();
        d.default_kind.set(s.default_kind.get());
        *d.default_value.borrow_mut() = s.default_value.borrow().clone();
        *d.delegate_name.borrow_mut() = s.delegate_name.borrow().clone();
        *d.delegate_prefix.borrow_mut() = s.delegate_prefix.borrow().clone();
        d.delegate_attr_name.set(s.delegate_attr_name.get());
        *d.handler.borrow_mut() = s.handler.borrow().clone();
        *d.value_hooks.borrow_mut() = s.value_hooks.borrow().clone();
    }

    /// Per-instance copy: own notifier list (same callbacks), shared aux.
    pub(crate) fn instance_clone(&self) -> Self {
        let clone = Self::new(TraitKind::Trait);
        clone.clone_from(self);
        clone.0.notifiers.copy_from(&self.0.notifiers);
        *clone.0.aux.borrow_mut() = self.aux_if_present();
        clone
    }

    /// Drop every reference this descriptor holds to values and callbacks.
    pub fn clear(&self) {
        *self.0.post_setattr_callable.borrow_mut() = None;
        *self.0.validator.borrow_mut() = None;
        *self.0.default_value.borrow_mut() = None;
        *self.0.delegate_name.borrow_mut() = None;
        *self.0.delegate_prefix.borrow_mut() = None;
        self.0.notifiers.clear();
        *self.0.handler.borrow_mut() = None;
        *self.0.aux.borrow_mut() = None;
        *self.0.value_hooks.borrow_mut() = None;
    }
}

impl fmt::Debug for TraitDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraitDescriptor")
            .field("getattr", &self.getattr_handler())
            .field("setattr", &self.setattr_handler())
            .field("flags", &self.flags())
            .field("default_kind", &self.default_kind())
            .field("validator", &self.validator().map(|v| v.index()))
            .finish_non_exhaustive()
    }
}
