#![forbid(unsafe_code)]

//! Assigning descriptors as values.
//!
//! Writing a [`Value::TraitValue`] to an attribute whose descriptor allows
//! it replaces that attribute's descriptor on the one host instead of
//! storing a value. A source yielding no descriptor removes the override.

use std::fmt;
use std::rc::Rc;

use crate::descriptor::{DefaultValueKind, TraitDescriptor, Validator};
use crate::error::Result;
use crate::host::Host;
use crate::value::Value;

/// Something that can produce a per-host descriptor.
pub trait TraitValueSource {
    /// Descriptor to install in place of `original`; `None` removes any
    /// instance-level override.
    ///
    /// # Errors
    ///
    /// Implementation-defined.
    fn as_ctrait(&self, original: &TraitDescriptor) -> Result<Option<TraitDescriptor>>;
}

/// Callbacks for descriptors that track the host they are installed on.
pub trait ValuePropertyHooks {
    /// # Errors
    ///
    /// Implementation-defined; aborts installation.
    fn register(&self, host: &Host, name: &str) -> Result<()>;

    /// # Errors
    ///
    /// Implementation-defined; aborts installation.
    fn unregister(&self, host: &Host, name: &str) -> Result<()>;
}

/// A ready-made source: a copy of the original descriptor with a new
/// default and/or validator.
#[derive(Clone, Default)]
pub struct TraitValue {
    default: Option<(DefaultValueKind, Value)>,
    validator: Option<Validator>,
    hooks: Option<Rc<dyn ValuePropertyHooks>>,
    remove: bool,
}

impl TraitValue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A source that removes the instance-level override.
    #[must_use]
    pub fn remove() -> Self {
        Self {
            remove: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn default_value(mut self, kind: DefaultValueKind, payload: Value) -> Self {
        self.default = Some((kind, payload));
        self
    }

    #[must_use]
    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Make the produced descriptor a value property with these hooks.
    #[must_use]
    pub fn property_hooks(mut self, hooks: Rc<dyn ValuePropertyHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        Value::TraitValue(Rc::new(self))
    }
}

impl TraitValueSource for TraitValue {
    fn as_ctrait(&self, original: &TraitDescriptor) -> Result<Option<TraitDescriptor>> {
        if self.remove {
            return Ok(None);
        }
        let descriptor = original.instance_clone();
        if let Some((kind, payload)) = &self.default {
            descriptor.set_default(*kind, payload.clone());
        }
        if let Some(validator) = &self.validator {
            descriptor.set_validator(Some(validator.clone()));
        }
        if let Some(hooks) = &self.hooks {
            descriptor.set_value_property(true);
            descriptor.set_value_hooks(Some(Rc::clone(hooks)));
        }
        Ok(Some(descriptor))
    }
}

impl fmt::Debug for TraitValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraitValue")
            .field("default", &self.default)
            .field("validator", &self.validator.as_ref().map(Validator::index))
            .field("property", &self.hooks.is_some())
            .field("remove", &self.remove)
            .finish()
    }
}

impl Host {
    /// Replace the instance-level descriptor of `name` with the one
    /// `source` produces.
    pub(crate) fn install_trait_value(
        &self,
        original: &TraitDescriptor,
        name: &str,
        source: &dyn TraitValueSource,
    ) -> Result<()> {
        let replacement = source.as_ctrait(original)?;
        let previous = self.trait_(name, crate::host::TraitLookup::InstanceOnly)?;
        if let Some(previous) = previous
            && previous.value_property()
            && let Some(hooks) = previous.value_hooks()
        {
            hooks.unregister(self, name)?;
        }
        let Some(replacement) = replacement else {
            self.remove_instance_trait(name);
            tracing::debug!(message = "ctrait.trait_value.remove", name);
            return Ok(());
        };

        let tracks_host = replacement.value_property();
        let old = if tracks_host {
            let old = self.get(name)?;
            self.remove(name);
            Some(old)
        } else {
            None
        };
        self.add_instance_trait(name, replacement.clone());
        tracing::debug!(
            message = "ctrait.trait_value.install",
            class = self.type_name(),
            name,
            value_property = tracks_host
        );
        if let Some(old) = old {
            if let Some(hooks) = replacement.value_hooks() {
                hooks.register(self, name)?;
            }
            self.trait_property_changed(name, &old, None)?;
        }
        Ok(())
    }
}
