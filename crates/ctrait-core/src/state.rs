#![forbid(unsafe_code)]

//! Descriptor state as a fixed 15-field record.
//!
//! # Design
//!
//! Function-valued fields are written as table indices (see
//! [`dispatch`](crate::descriptor::dispatch)). User callables in the
//! post-set and validator payloads are replaced by the integer marker `-1`;
//! on restore a marker is resolved through the descriptor's handler.
//!
//! # Failure Modes
//!
//! - Out-of-range table indices and malformed payloads are value errors.
//! - A marker with no handler (or a handler without the callable) is an
//!   internal error.

use std::cell::RefCell;
use std::rc::Rc;

use crate::descriptor::{
    Arity, DefaultValueKind, DelegateAttrName, GetHandler, PostSetHandler, SetHandler,
    TraitDescriptor, TraitKind, Validator,
};
use crate::error::{Result, TraitError};
use crate::flags::TraitFlags;
use crate::handler::HandlerRef;
use crate::value::{Callable, Value};

/// Marker written in place of a user callable.
pub const CALLABLE_MARKER: i64 = -1;

/// Validator index written when no validator is installed.
pub const NO_VALIDATOR_INDEX: i64 = 3;

const FIELDS: usize = 15;

/// The 15 fields in wire order.
#[derive(Debug, Clone, PartialEq)]
pub struct TraitState {
    pub getattr: i64,
    pub setattr: i64,
    pub post_setattr: i64,
    pub post_setattr_payload: Value,
    pub validate: i64,
    pub validate_payload: Value,
    pub default_kind: i64,
    pub default_value: Value,
    pub flags: i64,
    pub delegate_name: Value,
    pub delegate_prefix: Value,
    pub delegate_attr_name: i64,
    /// Always `None`; notifiers are never serialized.
    pub notifiers: Value,
    pub handler: Value,
    pub aux: Value,
}

impl TraitState {
    #[must_use]
    pub fn to_tuple(&self) -> Value {
        Value::tuple([
            Value::Int(self.getattr),
            Value::Int(self.setattr),
            Value::Int(self.post_setattr),
            self.post_setattr_payload.clone(),
            Value::Int(self.validate),
            self.validate_payload.clone(),
            Value::Int(self.default_kind),
            self.default_value.clone(),
            Value::Int(self.flags),
            self.delegate_name.clone(),
            self.delegate_prefix.clone(),
            Value::Int(self.delegate_attr_name),
            self.notifiers.clone(),
            self.handler.clone(),
            self.aux.clone(),
        ])
    }

    /// # Errors
    ///
    /// "state must be a 15-tuple" for any other shape; index fields must be
    /// integers.
    pub fn from_tuple(state: &Value) -> Result<Self> {
        let items = state
            .as_tuple()
            .filter(|items| items.len() == FIELDS)
            .ok_or_else(|| TraitError::value_error("state must be a 15-tuple"))?;
        let index = |position: usize| {
            items[position].as_int().ok_or_else(|| {
                TraitError::value_error(format!(
                    "state field {position} must be an integer, not {}",
                    items[position].type_name()
                ))
            })
        };
        Ok(Self {
            getattr: index(0)?,
            setattr: index(1)?,
            post_setattr: index(2)?,
            post_setattr_payload: items[3].clone(),
            validate: index(4)?,
            validate_payload: items[5].clone(),
            default_kind: index(6)?,
            default_value: items[7].clone(),
            flags: index(8)?,
            delegate_name: items[9].clone(),
            delegate_prefix: items[10].clone(),
            delegate_attr_name: index(11)?,
            notifiers: items[12].clone(),
            handler: items[13].clone(),
            aux: items[14].clone(),
        })
    }
}

impl TraitDescriptor {
    /// Capture this descriptor's state.
    #[must_use]
    pub fn getstate(&self) -> TraitState {
        let (validate, validate_payload) = match self.validator() {
            Some(validator) => (validator.index(), encode_validator(&validator)),
            None => (NO_VALIDATOR_INDEX, Value::None),
        };
        let aux = self
            .aux_if_present()
            .map_or(Value::None, |aux| Value::Dict(Rc::new(RefCell::new(aux.borrow().clone()))));
        TraitState {
            getattr: self.getattr_handler().index(),
            setattr: self.setattr_handler().index(),
            post_setattr: PostSetHandler::index(self.post_setattr_handler()),
            post_setattr_payload: self
                .post_setattr()
                .map_or(Value::None, |_| Value::Int(CALLABLE_MARKER)),
            validate,
            validate_payload,
            default_kind: self.default_kind().index(),
            default_value: self.default_payload().unwrap_or(Value::None),
            flags: i64::from(self.flags().bits()),
            delegate_name: self.delegate_name().unwrap_or(Value::None),
            delegate_prefix: self.delegate_prefix().unwrap_or(Value::None),
            delegate_attr_name: DelegateAttrName::index(self.delegate_attr_name()),
            notifiers: Value::None,
            handler: self.handler().map_or(Value::None, Value::Handler),
            aux,
        }
    }

    /// Overwrite this descriptor from `state`.
    ///
    /// Notifiers are left untouched. Nothing is modified when decoding
    /// fails.
    ///
    /// # Errors
    ///
    /// See the module's failure modes.
    pub fn setstate(&self, state: &TraitState) -> Result<()> {
        let getattr = GetHandler::from_index(state.getattr)?;
        let setattr = SetHandler::from_index(state.setattr)?;
        let post_setattr = PostSetHandler::from_index(state.post_setattr)?;
        let default_kind = DefaultValueKind::from_index(state.default_kind)?;
        let delegate_attr_name = DelegateAttrName::from_index(state.delegate_attr_name)?;
        let flags = u32::try_from(state.flags)
            .ok()
            .and_then(TraitFlags::from_bits)
            .ok_or_else(|| {
                TraitError::value_error(format!("Invalid trait flags {} in trait state.", state.flags))
            })?;
        let handler = match &state.handler {
            Value::None => None,
            Value::Handler(handler) => Some(handler.clone()),
            other => {
                return Err(TraitError::value_error(format!(
                    "trait state handler must be a handler or None, not {}",
                    other.type_name()
                )));
            }
        };
        let aux = match &state.aux {
            Value::None => None,
            Value::Dict(dict) => Some(Rc::new(RefCell::new(dict.borrow().clone()))),
            other => {
                return Err(TraitError::value_error(format!(
                    "trait state aux must be a dict or None, not {}",
                    other.type_name()
                )));
            }
        };
        let post_setattr_callable = match &state.post_setattr_payload {
            Value::None => None,
            Value::Callable(callable) => Some(callable.clone()),
            Value::Int(_) => Some(legacy_callable(handler.as_ref(), "post_setattr", |h| {
                h.post_setattr_callable()
            })?),
            other => {
                return Err(TraitError::value_error(format!(
                    "trait state post_setattr must be callable, not {}",
                    other.type_name()
                )));
            }
        };
        let validator = decode_validator(state.validate, &state.validate_payload, handler.as_ref())?;

        self.set_handlers(getattr, setattr);
        self.set_post_setattr_handler(post_setattr);
        self.restore_post_setattr_callable(post_setattr_callable);
        self.set_validator(validator);
        self.restore_default(default_kind, optional(&state.default_value));
        self.set_flags(flags);
        self.restore_delegate(
            optional(&state.delegate_name),
            optional(&state.delegate_prefix),
            delegate_attr_name,
        );
        self.set_handler(handler);
        self.restore_aux(aux);
        Ok(())
    }

    /// Build a fresh descriptor from `state`.
    ///
    /// # Errors
    ///
    /// As for [`setstate`](Self::setstate).
    pub fn from_state(state: &TraitState) -> Result<Self> {
        let descriptor = Self::new(TraitKind::Trait);
        descriptor.setstate(state)?;
        Ok(descriptor)
    }
}

fn optional(value: &Value) -> Option<Value> {
    (!value.is_none()).then(|| value.clone())
}

fn encode_validator(validator: &Validator) -> Value {
    match validator {
        Validator::Python(_) | Validator::Property { .. } => Value::Int(CALLABLE_MARKER),
        Validator::PrefixMap { map, .. } => Value::tuple([
            Value::Int(validator.index()),
            map.clone(),
            Value::Int(CALLABLE_MARKER),
        ]),
        other => other.payload(),
    }
}

fn legacy_callable(
    handler: Option<&HandlerRef>,
    field: &str,
    pick: impl Fn(&HandlerRef) -> Option<Callable>,
) -> Result<Callable> {
    tracing::debug!(message = "ctrait.state.legacy_shim", field);
    handler.and_then(pick).ok_or_else(|| {
        TraitError::internal(format!(
            "trait state has a placeholder {field} callable but its handler provides none"
        ))
    })
}

fn decode_validator(index: i64, payload: &Value, handler: Option<&HandlerRef>) -> Result<Option<Validator>> {
    let callable = |payload: &Value| -> Result<Callable> {
        match payload {
            Value::Callable(callable) => Ok(callable.clone()),
            Value::Int(_) => legacy_callable(handler, "validate", |h| h.validate_callable()),
            other => Err(TraitError::value_error(format!(
                "validator {index} state must be callable, not {}",
                other.type_name()
            ))),
        }
    };
    let validator = match (index, payload) {
        (_, Value::None) => return Ok(None),
        (14, payload) => Validator::Python(callable(payload)?),
        (15..=18, payload) => Validator::Property {
            arity: Arity::from_index(index - 15)?,
            callable: callable(payload)?,
        },
        (10, Value::Tuple(items)) if items.len() == 3 && matches!(items[2], Value::Int(_)) => {
            let fallback = legacy_callable(handler, "validate", |h| h.validate_callable())?;
            Validator::from_payload(&Value::tuple([
                items[0].clone(),
                items[1].clone(),
                Value::Callable(fallback),
            ]))?
        }
        (_, payload) => Validator::from_payload(payload)?,
    };
    if validator.index() != index {
        return Err(TraitError::value_error(format!(
            "Validator state index {index} does not match payload kind {}.",
            validator.index()
        )));
    }
    Ok(Some(validator))
}
