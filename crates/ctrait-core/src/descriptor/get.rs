#![forbid(unsafe_code)]

//! Read handlers.

use std::cell::Cell;

use crate::descriptor::{GetHandler, TraitDescriptor};
use crate::error::{ErrorKind, Result, TraitError};
use crate::host::Host;
use crate::host::delegate::{self, MAX_DELEGATION_HOPS};
use crate::notify::call_notifiers;
use crate::value::Value;

thread_local! {
    static DELEGATED_READS: Cell<usize> = const { Cell::new(0) };
}

/// Nesting counter for delegated reads; a cycle of delegates that read
/// through each other stops at the hop bound instead of the stack limit.
struct ReadDepth;

impl ReadDepth {
    fn enter() -> Option<Self> {
        DELEGATED_READS.with(|depth| {
            if depth.get() >= MAX_DELEGATION_HOPS {
                None
            } else {
                depth.set(depth.get() + 1);
                Some(ReadDepth)
            }
        })
    }
}

impl Drop for ReadDepth {
    fn drop(&mut self) {
        DELEGATED_READS.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

impl TraitDescriptor {
    /// Run this descriptor's read handler for `name` on `host`.
    pub(crate) fn get_attr(&self, host: &Host, name: &str) -> Result<Value> {
        match self.getattr_handler() {
            GetHandler::Trait => self.get_trait(host, name),
            GetHandler::Python | GetHandler::Generic => host.generic_get(name),
            GetHandler::Event => Err(TraitError::attribute(format!(
                "The {name} trait of a {} instance is an 'event', which is write only.",
                host.type_name()
            ))),
            GetHandler::Delegate => self.get_delegate(host, name),
            GetHandler::Disallow => Err(TraitError::no_attribute(host.type_name(), name)),
            GetHandler::Constant => Ok(self.default_payload().unwrap_or(Value::None)),
            GetHandler::Property(arity) => self.call_property_getter(arity, host, name),
        }
    }

    /// Stored value, or the default materialized, stored, and announced.
    fn get_trait(&self, host: &Host, name: &str) -> Result<Value> {
        if let Some(value) = host.value(name) {
            return Ok(value);
        }
        let value = self.default_value_for(host, name)?;
        host.store(name, value.clone());
        if !self.is_mapped() {
            self.run_post_setattr(host, name, &value)?;
        }
        if self.has_notifiers() || host.has_notifiers() {
            call_notifiers(self, host, name, &Value::Uninitialized, &value)?;
        }
        Ok(value)
    }

    fn get_delegate(&self, host: &Host, name: &str) -> Result<Value> {
        let Some(_depth) = ReadDepth::enter() else {
            return Err(delegate::recursion_error("getting the definition of", host, name));
        };
        let target = delegate::target(self, host, name)?;
        let mapped = self.map_delegate_name(host, name)?;
        let read = match &target {
            Value::Host(target) => target.get(&mapped),
            other => Err(TraitError::no_attribute(&other.type_name(), &mapped)),
        };
        read.map_err(|err| {
            if err.kind() == ErrorKind::Attribute {
                TraitError::delegation(format!(
                    "The '{}' object has no attribute '{name}' because its {} delegate has no attribute '{mapped}'.",
                    host.type_name(),
                    target.type_name()
                ))
            } else {
                err
            }
        })
    }
}
