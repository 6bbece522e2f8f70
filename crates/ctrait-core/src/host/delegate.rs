#![forbid(unsafe_code)]

//! Delegation-chain resolution.
//!
//! A delegate descriptor names an attribute of its host (the delegate) and
//! a policy for mapping the attribute name onto it. The target is looked up
//! again on every access. Walks give up after [`MAX_DELEGATION_HOPS`] hops.

use crate::descriptor::TraitDescriptor;
use crate::descriptor::set::dispatch_set;
use crate::error::{Result, TraitError};
use crate::host::{Host, TraitLookup};
use crate::value::Value;

pub(crate) const MAX_DELEGATION_HOPS: usize = 100;

pub(crate) fn recursion_error(action: &str, host: &Host, name: &str) -> TraitError {
    tracing::warn!(
        message = "ctrait.delegate.recursion_limit",
        class = host.type_name(),
        name,
        action,
        hops = MAX_DELEGATION_HOPS
    );
    TraitError::delegation(format!(
        "Delegation recursion limit exceeded while {action} the '{name}' attribute of a '{}' object.",
        host.type_name()
    ))
}

fn no_traits_error(host: &Host, name: &str) -> TraitError {
    TraitError::delegation(format!(
        "The '{name}' attribute of a '{}' object has a delegate which does not have traits.",
        host.type_name()
    ))
}

fn undefined_trait_error(host: &Host, name: &str) -> TraitError {
    TraitError::delegation(format!(
        "The '{name}' attribute of a '{}' object delegates to an attribute which is not a defined trait.",
        host.type_name()
    ))
}

/// The object `descriptor` delegates to from `host`.
pub(crate) fn target(descriptor: &TraitDescriptor, host: &Host, name: &str) -> Result<Value> {
    let attribute = descriptor.delegate_attribute(name)?;
    match host.value(&attribute) {
        Some(target) => Ok(target),
        None => host.get(&attribute),
    }
}

fn target_host(descriptor: &TraitDescriptor, at: &Host, host: &Host, name: &str) -> Result<Host> {
    match target(descriptor, at, name)? {
        Value::Host(target) => Ok(target),
        _ => Err(no_traits_error(host, name)),
    }
}

/// Write through a delegate descriptor.
///
/// Without modify-delegate the value lands on `host` itself, shadowing the
/// delegate, and the class behavior is told so.
pub(crate) fn set_delegate(
    owner: &TraitDescriptor,
    definer: &TraitDescriptor,
    host: &Host,
    name: &str,
    value: Option<&Value>,
) -> Result<()> {
    let mut current = definer.clone();
    let mut at = host.clone();
    let mut mapped = name.to_owned();
    for _ in 0..MAX_DELEGATION_HOPS {
        let delegate = target_host(&current, &at, host, name)?;
        mapped = current.map_delegate_name(host, &mapped)?;
        let found = match delegate.local_trait(&mapped) {
            Some(found) => found,
            None => delegate
                .prefix_trait(&mapped, true)
                .map_err(|_| undefined_trait_error(host, name))?,
        };
        if found.delegate_attr_name().is_none() {
            if owner.modify_delegate() {
                return dispatch_set(&found, &found, &delegate, &mapped, value);
            }
            dispatch_set(owner, &found, host, name, value)?;
            let behavior = std::rc::Rc::clone(host.class().behavior());
            return behavior.remove_trait_delegate_listener(host, name, value.is_some());
        }
        current = found;
        at = delegate;
    }
    Err(recursion_error("setting", host, name))
}

/// The descriptor at the end of `name`'s delegation chain.
pub(crate) fn base_trait(host: &Host, name: &str) -> Result<TraitDescriptor> {
    let mut at = host.clone();
    let mut name = name.to_owned();
    let mut current = prefixed_trait(&at, &name)?;
    for _ in 0..MAX_DELEGATION_HOPS {
        if current.delegate_attr_name().is_none() {
            return Ok(current);
        }
        let delegate = target_host(&current, &at, &at, &name)?;
        let mapped = current.map_delegate_name(&at, &name)?;
        current = prefixed_trait(&delegate, &mapped)?;
        at = delegate;
        name = mapped;
    }
    Err(recursion_error("getting the definition of", &at, &name))
}

fn prefixed_trait(host: &Host, name: &str) -> Result<TraitDescriptor> {
    host.trait_(name, TraitLookup::WithPrefix)?.ok_or_else(|| {
        TraitError::internal(format!(
            "Invalid trait dictionary entry for the '{name}' attribute of a '{}' object.",
            host.type_name()
        ))
    })
}
