#![forbid(unsafe_code)]

//! Engine configuration shared by every class built with it.
//!
//! A [`TraitContext`] holds the collaborators the engine calls but does not
//! implement: the three observable-collection factories used by the
//! list/dict/set default kinds, the adaptation protocol, and the optional
//! notification wrapper hook. Build one with [`TraitContext::builder`] at
//! process or fixture setup and hand it to each
//! [`HostClass`](crate::class::HostClass).

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::descriptor::TraitDescriptor;
use crate::error::{Result, TraitError};
use crate::host::Host;
use crate::notify::NotificationHook;
use crate::types::TypeSpec;
use crate::value::Value;

/// Arguments handed to a collection factory.
#[derive(Debug)]
pub struct CollectionBinding<'a> {
    pub descriptor: &'a TraitDescriptor,
    pub host: &'a Host,
    pub name: &'a str,
    /// Default payload the collection is seeded from.
    pub seed: &'a Value,
}

pub type CollectionFactory = Rc<dyn Fn(&CollectionBinding<'_>) -> Result<Value>>;

/// How an adaptation result is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdaptMode {
    /// Accept only when adaptation returned the value itself.
    Strict,
    /// Accept any adapted result.
    Adapt,
    /// Accept any adapted result; adaptation receives an explicit default.
    AdaptWithDefault,
}

impl AdaptMode {
    #[must_use]
    pub fn index(self) -> i64 {
        match self {
            Self::Strict => 0,
            Self::Adapt => 1,
            Self::AdaptWithDefault => 2,
        }
    }

    /// # Errors
    ///
    /// Values outside 0..=2 are rejected.
    pub fn from_index(index: i64) -> Result<Self> {
        match index {
            0 => Ok(Self::Strict),
            1 => Ok(Self::Adapt),
            2 => Ok(Self::AdaptWithDefault),
            other => Err(TraitError::value_error(format!(
                "The adaptation mode must be 0..2, but {other} was specified."
            ))),
        }
    }
}

/// `adapt(value, class, mode) -> adapted or None`.
pub type AdaptFn = Rc<dyn Fn(&Value, &TypeSpec, AdaptMode) -> Result<Option<Value>>>;

/// `implements(value, class) -> bool`.
pub type ImplementsFn = Rc<dyn Fn(&Value, &TypeSpec) -> Result<bool>>;

#[derive(Default)]
pub struct TraitContext {
    list_factory: Option<CollectionFactory>,
    dict_factory: Option<CollectionFactory>,
    set_factory: Option<CollectionFactory>,
    adapt: Option<AdaptFn>,
    implements: Option<ImplementsFn>,
    notification_handler: RefCell<Option<NotificationHook>>,
}

impl TraitContext {
    #[must_use]
    pub fn builder() -> TraitContextBuilder {
        TraitContextBuilder::default()
    }

    pub(crate) fn make_list(&self, binding: &CollectionBinding<'_>) -> Result<Value> {
        make(self.list_factory.as_ref(), "list", binding)
    }

    pub(crate) fn make_dict(&self, binding: &CollectionBinding<'_>) -> Result<Value> {
        make(self.dict_factory.as_ref(), "dict", binding)
    }

    pub(crate) fn make_set(&self, binding: &CollectionBinding<'_>) -> Result<Value> {
        make(self.set_factory.as_ref(), "set", binding)
    }

    /// Run the adaptation protocol.
    ///
    /// # Errors
    ///
    /// Fails when no adapter is configured or the adapter fails.
    pub fn adapt(&self, value: &Value, class: &TypeSpec, mode: AdaptMode) -> Result<Option<Value>> {
        match &self.adapt {
            Some(adapt) => adapt(value, class, mode),
            None => Err(TraitError::internal("no adaptation function configured")),
        }
    }

    /// Whether `value` provides `class`; falls back to an instance check.
    ///
    /// # Errors
    ///
    /// Propagates a failing custom check.
    pub fn implements(&self, value: &Value, class: &TypeSpec) -> Result<bool> {
        match &self.implements {
            Some(check) => check(value, class),
            None => Ok(class.contains(value)),
        }
    }

    /// Current notification wrapper hook.
    #[must_use]
    pub fn notification_handler(&self) -> Option<NotificationHook> {
        self.notification_handler.borrow().clone()
    }

    /// Install (or clear) the notification wrapper; returns the previous one.
    pub fn set_notification_handler(
        &self,
        hook: Option<NotificationHook>,
    ) -> Option<NotificationHook> {
        std::mem::replace(&mut *self.notification_handler.borrow_mut(), hook)
    }
}

fn make(
    factory: Option<&CollectionFactory>,
    kind: &str,
    binding: &CollectionBinding<'_>,
) -> Result<Value> {
    match factory {
        Some(factory) => factory(binding),
        None => Err(TraitError::internal(format!(
            "no {kind} object factory configured for the '{}' trait",
            binding.name
        ))),
    }
}

impl fmt::Debug for TraitContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraitContext")
            .field("list_factory", &self.list_factory.is_some())
            .field("dict_factory", &self.dict_factory.is_some())
            .field("set_factory", &self.set_factory.is_some())
            .field("adapt", &self.adapt.is_some())
            .field("implements", &self.implements.is_some())
            .field(
                "notification_handler",
                &self.notification_handler.borrow().is_some(),
            )
            .finish()
    }
}

/// Builder for [`TraitContext`].
#[derive(Default)]
pub struct TraitContextBuilder {
    context: TraitContext,
}

impl TraitContextBuilder {
    #[must_use]
    pub fn list_factory(
        mut self,
        factory: impl Fn(&CollectionBinding<'_>) -> Result<Value> + 'static,
    ) -> Self {
        self.context.list_factory = Some(Rc::new(factory));
        self
    }

    #[must_use]
    pub fn dict_factory(
        mut self,
        factory: impl Fn(&CollectionBinding<'_>) -> Result<Value> + 'static,
    ) -> Self {
        self.context.dict_factory = Some(Rc::new(factory));
        self
    }

    #[must_use]
    pub fn set_factory(
        mut self,
        factory: impl Fn(&CollectionBinding<'_>) -> Result<Value> + 'static,
    ) -> Self {
        self.context.set_factory = Some(Rc::new(factory));
        self
    }

    #[must_use]
    pub fn adapt(
        mut self,
        adapt: impl Fn(&Value, &TypeSpec, AdaptMode) -> Result<Option<Value>> + 'static,
    ) -> Self {
        self.context.adapt = Some(Rc::new(adapt));
        self
    }

    #[must_use]
    pub fn implements(
        mut self,
        check: impl Fn(&Value, &TypeSpec) -> Result<bool> + 'static,
    ) -> Self {
        self.context.implements = Some(Rc::new(check));
        self
    }

    #[must_use]
    pub fn notification_handler(self, hook: NotificationHook) -> Self {
        self.context.set_notification_handler(Some(hook));
        self
    }

    #[must_use]
    pub fn build(self) -> Rc<TraitContext> {
        Rc::new(self.context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_context_has_no_collaborators() {
        let context = TraitContext::default();
        let err = context
            .adapt(&Value::None, &TypeSpec::Int, AdaptMode::Adapt)
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Internal);
        assert!(context.notification_handler().is_none());
    }

    #[test]
    fn implements_defaults_to_instance_check() {
        let context = TraitContext::default();
        assert!(context.implements(&Value::Int(1), &TypeSpec::Int).unwrap());
        assert!(!context.implements(&Value::str("1"), &TypeSpec::Int).unwrap());
    }

    #[test]
    fn custom_implements_is_used() {
        let context = TraitContext::builder().implements(|_, _| Ok(true)).build();
        assert!(context.implements(&Value::str("1"), &TypeSpec::Int).unwrap());
    }

    #[test]
    fn notification_handler_swap_returns_previous() {
        let context = TraitContext::default();
        let hook: NotificationHook = Rc::new(|notifier, event| notifier.call(event));
        assert!(context.set_notification_handler(Some(hook)).is_none());
        assert!(context.set_notification_handler(None).is_some());
        assert!(context.notification_handler().is_none());
    }

    #[test]
    fn adapt_mode_indices() {
        for mode in [AdaptMode::Strict, AdaptMode::Adapt, AdaptMode::AdaptWithDefault] {
            assert_eq!(AdaptMode::from_index(mode.index()).unwrap(), mode);
        }
        assert!(AdaptMode::from_index(5).is_err());
    }
}
