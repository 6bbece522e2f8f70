#![forbid(unsafe_code)]

//! Portable JSON form of descriptor state.
//!
//! A [`TraitState`] holds live objects (callables, handlers, classes). The
//! portable form replaces each of them by a registered name, so a state
//! written by one process can be loaded by another that registers the same
//! names in a [`StateRegistry`]. Hosts and assignable descriptor sources
//! have no portable form.

use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::class::HostClass;
use crate::descriptor::TraitDescriptor;
use crate::error::{Result, TraitError};
use crate::handler::HandlerRef;
use crate::state::TraitState;
use crate::types::TypeSpec;
use crate::value::{Callable, Dict, Value, ValueSet};

/// A [`Value`] with engine objects replaced by names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
pub enum Portable {
    None,
    Undefined,
    Uninitialized,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Tuple(Vec<Portable>),
    List(Vec<Portable>),
    Dict(Vec<(Portable, Portable)>),
    Set(Vec<Portable>),
    Callable(String),
    Type(String),
    Handler(String),
    Trait(Box<PortableState>),
}

/// The 15 state fields, serialized as a JSON array in wire order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortableState(
    pub i64,
    pub i64,
    pub i64,
    pub Portable,
    pub i64,
    pub Portable,
    pub i64,
    pub Portable,
    pub i64,
    pub Portable,
    pub Portable,
    pub i64,
    pub Portable,
    pub Portable,
    pub Portable,
);

impl PortableState {
    /// # Errors
    ///
    /// Serialization failures.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// # Errors
    ///
    /// Malformed JSON or a shape other than a 15-element array.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Names for the live objects a state may reference.
#[derive(Default)]
pub struct StateRegistry {
    callables: AHashMap<String, Callable>,
    handlers: Vec<(String, HandlerRef)>,
    classes: AHashMap<String, Rc<HostClass>>,
}

impl StateRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callable under its own name.
    pub fn callable(&mut self, callable: Callable) -> &mut Self {
        self.callables.insert(callable.name().to_owned(), callable);
        self
    }

    pub fn handler(&mut self, name: &str, handler: HandlerRef) -> &mut Self {
        self.handlers.retain(|(n, _)| n != name);
        self.handlers.push((name.to_owned(), handler));
        self
    }

    /// Register a host class under its class name.
    pub fn class(&mut self, class: &Rc<HostClass>) -> &mut Self {
        self.classes.insert(class.name().to_owned(), Rc::clone(class));
        self
    }

    fn callable_name(&self, callable: &Callable) -> Result<String> {
        match self.callables.get(callable.name()) {
            Some(registered) if registered.ptr_eq(callable) => Ok(callable.name().to_owned()),
            _ => Err(TraitError::persist(format!(
                "callable '{}' is not registered",
                callable.name()
            ))),
        }
    }

    fn handler_name(&self, handler: &HandlerRef) -> Result<String> {
        self.handlers
            .iter()
            .find(|(_, h)| Rc::ptr_eq(h, handler))
            .map(|(name, _)| name.clone())
            .ok_or_else(|| {
                TraitError::persist(format!("handler for {} is not registered", handler.info()))
            })
    }

    fn type_name(&self, ty: &TypeSpec) -> Result<String> {
        match ty {
            TypeSpec::Class(class) => match self.classes.get(class.name()) {
                Some(registered) if Rc::ptr_eq(registered, class) => Ok(class.name().to_owned()),
                _ => Err(TraitError::persist(format!(
                    "class '{}' is not registered",
                    class.name()
                ))),
            },
            builtin => Ok(builtin.name()),
        }
    }

    fn encode_items<'a>(&self, items: impl IntoIterator<Item = &'a Value>) -> Result<Vec<Portable>> {
        items.into_iter().map(|item| self.encode(item)).collect()
    }

    /// Portable form of `value`.
    ///
    /// # Errors
    ///
    /// Unregistered objects, hosts, and descriptor sources.
    pub fn encode(&self, value: &Value) -> Result<Portable> {
        Ok(match value {
            Value::None => Portable::None,
            Value::Undefined => Portable::Undefined,
            Value::Uninitialized => Portable::Uninitialized,
            Value::Bool(b) => Portable::Bool(*b),
            Value::Int(n) => Portable::Int(*n),
            Value::Float(x) => Portable::Float(*x),
            Value::Str(s) => Portable::Str(s.to_string()),
            Value::Tuple(items) => Portable::Tuple(self.encode_items(items.iter())?),
            Value::List(items) => Portable::List(self.encode_items(items.borrow().iter())?),
            Value::Dict(dict) => Portable::Dict(
                dict.borrow()
                    .iter()
                    .map(|(k, v)| Ok((self.encode(k)?, self.encode(v)?)))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Value::Set(set) => Portable::Set(self.encode_items(set.borrow().iter())?),
            Value::Callable(callable) => Portable::Callable(self.callable_name(callable)?),
            Value::Type(ty) => Portable::Type(self.type_name(ty)?),
            Value::Handler(handler) => Portable::Handler(self.handler_name(handler)?),
            Value::Trait(descriptor) => {
                Portable::Trait(Box::new(self.encode_state(&descriptor.getstate())?))
            }
            Value::Host(_) | Value::TraitValue(_) => {
                return Err(TraitError::persist(format!(
                    "a {} value has no portable form",
                    value.type_name()
                )));
            }
        })
    }

    /// Live value for a portable one.
    ///
    /// # Errors
    ///
    /// Names that are not registered, and invalid nested states.
    pub fn decode(&self, portable: &Portable) -> Result<Value> {
        Ok(match portable {
            Portable::None => Value::None,
            Portable::Undefined => Value::Undefined,
            Portable::Uninitialized => Value::Uninitialized,
            Portable::Bool(b) => Value::Bool(*b),
            Portable::Int(n) => Value::Int(*n),
            Portable::Float(x) => Value::Float(*x),
            Portable::Str(s) => Value::str(s),
            Portable::Tuple(items) => Value::tuple(self.decode_items(items)?),
            Portable::List(items) => Value::list(self.decode_items(items)?),
            Portable::Dict(pairs) => {
                let mut dict = Dict::new();
                for (k, v) in pairs {
                    dict.insert(self.decode(k)?, self.decode(v)?)?;
                }
                Value::Dict(Rc::new(RefCell::new(dict)))
            }
            Portable::Set(items) => {
                let mut set = ValueSet::new();
                for item in self.decode_items(items)? {
                    set.insert(item)?;
                }
                Value::Set(Rc::new(RefCell::new(set)))
            }
            Portable::Callable(name) => Value::Callable(
                self.callables
                    .get(name)
                    .cloned()
                    .ok_or_else(|| TraitError::persist(format!("unknown callable '{name}'")))?,
            ),
            Portable::Type(name) => Value::Type(
                TypeSpec::builtin(name)
                    .or_else(|| self.classes.get(name).cloned().map(TypeSpec::Class))
                    .ok_or_else(|| TraitError::persist(format!("unknown class '{name}'")))?,
            ),
            Portable::Handler(name) => Value::Handler(
                self.handlers
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, h)| Rc::clone(h))
                    .ok_or_else(|| TraitError::persist(format!("unknown handler '{name}'")))?,
            ),
            Portable::Trait(state) => {
                Value::Trait(TraitDescriptor::from_state(&self.decode_state(state)?)?)
            }
        })
    }

    fn decode_items(&self, items: &[Portable]) -> Result<Vec<Value>> {
        items.iter().map(|item| self.decode(item)).collect()
    }

    /// # Errors
    ///
    /// As for [`encode`](Self::encode).
    pub fn encode_state(&self, state: &TraitState) -> Result<PortableState> {
        Ok(PortableState(
            state.getattr,
            state.setattr,
            state.post_setattr,
            self.encode(&state.post_setattr_payload)?,
            state.validate,
            self.encode(&state.validate_payload)?,
            state.default_kind,
            self.encode(&state.default_value)?,
            state.flags,
            self.encode(&state.delegate_name)?,
            self.encode(&state.delegate_prefix)?,
            state.delegate_attr_name,
            self.encode(&state.notifiers)?,
            self.encode(&state.handler)?,
            self.encode(&state.aux)?,
        ))
    }

    /// # Errors
    ///
    /// As for [`decode`](Self::decode).
    pub fn decode_state(&self, state: &PortableState) -> Result<TraitState> {
        Ok(TraitState {
            getattr: state.0,
            setattr: state.1,
            post_setattr: state.2,
            post_setattr_payload: self.decode(&state.3)?,
            validate: state.4,
            validate_payload: self.decode(&state.5)?,
            default_kind: state.6,
            default_value: self.decode(&state.7)?,
            flags: state.8,
            delegate_name: self.decode(&state.9)?,
            delegate_prefix: self.decode(&state.10)?,
            delegate_attr_name: state.11,
            notifiers: self.decode(&state.12)?,
            handler: self.decode(&state.13)?,
            aux: self.decode(&state.14)?,
        })
    }

    /// Serialize `descriptor` to JSON.
    ///
    /// # Errors
    ///
    /// Unregistered objects and serialization failures.
    pub fn save(&self, descriptor: &TraitDescriptor) -> Result<String> {
        self.encode_state(&descriptor.getstate())?.to_json()
    }

    /// Rebuild a descriptor from JSON written by [`save`](Self::save).
    ///
    /// # Errors
    ///
    /// Malformed JSON, unknown names, and invalid state.
    pub fn load(&self, json: &str) -> Result<TraitDescriptor> {
        let state = self.decode_state(&PortableState::from_json(json)?)?;
        TraitDescriptor::from_state(&state)
    }
}
