#![forbid(unsafe_code)]

//! Write handlers.
//!
//! Every write enters through [`dispatch_set`] with two descriptors: the
//! `owner` the caller resolved, and the `definer` whose set handler runs.
//! They differ only at the end of a delegation chain, where the owner's
//! notifiers fire for a write stored by the definer's rules. `None` as the
//! value is a deletion.
//!
//! # Failure Modes
//!
//! A post-set hook or notifier that fails after the store leaves the new
//! value in place; the error still propagates to the writer.

use crate::descriptor::{SetHandler, TraitDescriptor};
use crate::error::{Result, TraitError};
use crate::flags::TraitFlags;
use crate::host::Host;
use crate::host::delegate;
use crate::notify::call_notifiers;
use crate::value::Value;

/// Apply a write (or deletion) of `name` on `host`.
pub(crate) fn dispatch_set(
    owner: &TraitDescriptor,
    definer: &TraitDescriptor,
    host: &Host,
    name: &str,
    value: Option<&Value>,
) -> Result<()> {
    match definer.setattr_handler() {
        SetHandler::Trait => match value {
            Some(value) => set_trait(owner, definer, host, name, value),
            None => delete_trait(owner, definer, host, name),
        },
        SetHandler::Python | SetHandler::Generic => set_python(host, name, value),
        SetHandler::Event => set_event(owner, definer, host, name, value),
        SetHandler::Delegate => delegate::set_delegate(owner, definer, host, name, value),
        SetHandler::Disallow => Err(TraitError::policy(format!(
            "Cannot set the undefined '{name}' attribute of a '{}' object.",
            host.type_name()
        ))),
        SetHandler::ReadOnly => set_readonly(definer, host, name, value),
        SetHandler::Constant => Err(TraitError::policy(format!(
            "Cannot modify the constant '{name}' attribute of a '{}' object.",
            host.type_name()
        ))),
        SetHandler::Property(arity) => {
            let value = property_value(host, name, value)?;
            definer.call_property_setter(arity, host, name, value)
        }
        SetHandler::ValidateProperty => {
            let value = property_value(host, name, value)?;
            let validated = definer.validate(Some(host), name, value)?;
            definer.run_post_setattr(host, name, &validated)
        }
    }
}

/// Whether replacing `old` by `new` counts as a change under `flags`.
pub(crate) fn is_change(flags: TraitFlags, old: &Value, new: &Value) -> bool {
    flags.contains(TraitFlags::NO_VALUE_TEST) || differs(flags, old, new)
}

fn differs(flags: TraitFlags, old: &Value, new: &Value) -> bool {
    if old.is(new) {
        return false;
    }
    flags.contains(TraitFlags::OBJECT_IDENTITY) || old != new
}

fn set_trait(
    owner: &TraitDescriptor,
    definer: &TraitDescriptor,
    host: &Host,
    name: &str,
    value: &Value,
) -> Result<()> {
    let validated = if value.is_undefined() {
        value.clone()
    } else {
        definer.validate(Some(host), name, value)?
    };
    let flags = definer.flags();
    let stored = if flags.contains(TraitFlags::SETATTR_ORIGINAL_VALUE) {
        value.clone()
    } else {
        validated.clone()
    };

    let has_post_set = definer.post_setattr_handler().is_some();
    let notify = owner.has_notifiers() || host.has_notifiers();
    let mut changed = flags.contains(TraitFlags::NO_VALUE_TEST);
    let mut old = Value::Undefined;
    if has_post_set || notify {
        old = match host.value(name) {
            Some(old) => old,
            None if !owner.ptr_eq(definer) => owner.get_attr(host, name)?,
            None => {
                let default = definer.default_value_for(host, name)?;
                host.store(name, default.clone());
                if has_post_set && !definer.is_mapped() {
                    definer.run_post_setattr(host, name, &default)?;
                }
                default
            }
        };
        changed = is_change(flags, &old, &validated);
    }

    host.store(name, stored.clone());

    if changed {
        let post_value = if flags.contains(TraitFlags::POST_SETATTR_ORIGINAL_VALUE) {
            value
        } else {
            &validated
        };
        definer.run_post_setattr(host, name, post_value)?;
        if notify {
            call_notifiers(owner, host, name, &old, &stored)?;
        }
    }
    Ok(())
}

fn delete_trait(
    owner: &TraitDescriptor,
    definer: &TraitDescriptor,
    host: &Host,
    name: &str,
) -> Result<()> {
    let Some(old) = host.remove(name) else {
        return Ok(());
    };
    if host.notifications_suppressed() || !(owner.notifiers_exist() || host.notifiers_exist()) {
        return Ok(());
    }
    let new = owner.get_attr(host, name)?;
    if is_change(definer.flags(), &old, &new) {
        definer.run_post_setattr(host, name, &new)?;
        call_notifiers(owner, host, name, &old, &new)?;
    }
    Ok(())
}

fn set_python(host: &Host, name: &str, value: Option<&Value>) -> Result<()> {
    match value {
        Some(value) => {
            host.store(name, value.clone());
            Ok(())
        }
        None => match host.remove(name) {
            Some(_) => Ok(()),
            None => Err(TraitError::no_attribute(host.type_name(), name)),
        },
    }
}

fn set_event(
    owner: &TraitDescriptor,
    definer: &TraitDescriptor,
    host: &Host,
    name: &str,
    value: Option<&Value>,
) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    let validated = definer.validate(Some(host), name, value)?;
    if owner.notifiers_exist() || host.notifiers_exist() {
        call_notifiers(owner, host, name, &Value::Undefined, &validated)?;
    }
    Ok(())
}

fn set_readonly(
    definer: &TraitDescriptor,
    host: &Host,
    name: &str,
    value: Option<&Value>,
) -> Result<()> {
    let Some(value) = value else {
        return Err(TraitError::policy(format!(
            "Cannot delete the read only '{name}' attribute of a '{}' object.",
            host.type_name()
        )));
    };
    let unset = |v: Option<Value>| v.is_none_or(|v| v.is_undefined());
    if unset(definer.default_payload()) && unset(host.value(name)) {
        host.store(name, value.clone());
        return Ok(());
    }
    Err(TraitError::policy(format!(
        "Cannot modify the read only '{name}' attribute of a '{}' object.",
        host.type_name()
    )))
}

fn property_value<'a>(host: &Host, name: &str, value: Option<&'a Value>) -> Result<&'a Value> {
    value.ok_or_else(|| {
        TraitError::policy(format!(
            "Cannot delete the '{name}' property of a '{}' object.",
            host.type_name()
        ))
    })
}
