#![forbid(unsafe_code)]

//! Dynamic attribute values.
//!
//! # Design
//!
//! Trait attributes are dynamically typed, so the engine stores every value
//! as a [`Value`]. Immediates (`None`, booleans, integers, floats) are held
//! inline; strings, tuples, and containers are reference-counted so that a
//! value handed to several hosts is one shared object, exactly like an
//! ordinary object reference. Engine objects (hosts, descriptors, handlers,
//! callables, types) are variants too, which lets validator payloads and
//! serialized state be expressed as plain tuples of values.
//!
//! # Invariants
//!
//! 1. [`Value::Undefined`] and [`Value::Uninitialized`] are sentinels and
//!    never compare equal to any legitimate value.
//! 2. [`Value::is`] is object identity: pointer identity for shared variants,
//!    bit identity for immediates.
//! 3. `==` is value equality: the numeric tower `bool ⊂ int ⊂ float`,
//!    structural containers, identity for engine objects.
//! 4. [`Dict`] and [`ValueSet`] iterate in insertion order.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;

use crate::descriptor::TraitDescriptor;
use crate::error::{Result, TraitError};
use crate::handler::HandlerRef;
use crate::host::Host;
use crate::trait_value::TraitValueSource;
use crate::types::TypeSpec;

/// Nesting depth after which `repr` stops descending (self-containing lists).
const REPR_DEPTH: usize = 24;

/// A dynamically typed attribute value.
#[derive(Clone)]
pub enum Value {
    None,
    /// "No value has ever been assigned" marker.
    Undefined,
    /// Old value reported when a default is materialized for the first time.
    Uninitialized,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Tuple(Rc<[Value]>),
    List(Rc<RefCell<Vec<Value>>>),
    Dict(Rc<RefCell<Dict>>),
    Set(Rc<RefCell<ValueSet>>),
    Callable(Callable),
    Type(TypeSpec),
    Host(Host),
    Trait(TraitDescriptor),
    Handler(HandlerRef),
    TraitValue(Rc<dyn TraitValueSource>),
}

impl Value {
    #[must_use]
    pub fn str(s: &str) -> Self {
        Self::Str(Rc::from(s))
    }

    #[must_use]
    pub fn tuple(items: impl IntoIterator<Item = Value>) -> Self {
        Self::Tuple(items.into_iter().collect::<Vec<_>>().into())
    }

    #[must_use]
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Self::List(Rc::new(RefCell::new(items.into_iter().collect())))
    }

    /// Build a dict value from key/value pairs.
    ///
    /// # Errors
    ///
    /// Fails when a key is unhashable.
    pub fn dict(pairs: impl IntoIterator<Item = (Value, Value)>) -> Result<Self> {
        let mut dict = Dict::new();
        for (key, value) in pairs {
            dict.insert(key, value)?;
        }
        Ok(Self::Dict(Rc::new(RefCell::new(dict))))
    }

    /// Build a set value.
    ///
    /// # Errors
    ///
    /// Fails when an item is unhashable.
    pub fn set(items: impl IntoIterator<Item = Value>) -> Result<Self> {
        let mut set = ValueSet::new();
        for item in items {
            set.insert(item)?;
        }
        Ok(Self::Set(Rc::new(RefCell::new(set))))
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    #[must_use]
    pub fn is_uninitialized(&self) -> bool {
        matches!(self, Self::Uninitialized)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Numeric value as a float (bools and ints widen).
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(x) => Some(*x),
            Self::Int(n) => Some(*n as f64),
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_tuple(&self) -> Option<&[Value]> {
        match self {
            Self::Tuple(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_callable(&self) -> Option<&Callable> {
        match self {
            Self::Callable(c) => Some(c),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_type(&self) -> Option<&TypeSpec> {
        match self {
            Self::Type(t) => Some(t),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_host(&self) -> Option<&Host> {
        match self {
            Self::Host(h) => Some(h),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_trait(&self) -> Option<&TraitDescriptor> {
        match self {
            Self::Trait(t) => Some(t),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_callable(&self) -> bool {
        matches!(self, Self::Callable(_) | Self::Type(_))
    }

    /// Truth value (`bool(x)`).
    #[must_use]
    pub fn truthy(&self) -> bool {
        match self {
            Self::None | Self::Undefined | Self::Uninitialized => false,
            Self::Bool(b) => *b,
            Self::Int(n) => *n != 0,
            Self::Float(x) => *x != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::Tuple(items) => !items.is_empty(),
            Self::List(items) => !items.borrow().is_empty(),
            Self::Dict(dict) => !dict.borrow().is_empty(),
            Self::Set(set) => !set.borrow().is_empty(),
            _ => true,
        }
    }

    /// Object identity.
    #[must_use]
    pub fn is(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::None, Self::None)
            | (Self::Undefined, Self::Undefined)
            | (Self::Uninitialized, Self::Uninitialized) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Str(a), Self::Str(b)) => Rc::ptr_eq(a, b),
            (Self::Tuple(a), Self::Tuple(b)) => Rc::ptr_eq(a, b),
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b),
            (Self::Dict(a), Self::Dict(b)) => Rc::ptr_eq(a, b),
            (Self::Set(a), Self::Set(b)) => Rc::ptr_eq(a, b),
            (Self::Callable(a), Self::Callable(b)) => a.ptr_eq(b),
            (Self::Type(a), Self::Type(b)) => a == b,
            (Self::Host(a), Self::Host(b)) => a.ptr_eq(b),
            (Self::Trait(a), Self::Trait(b)) => a.ptr_eq(b),
            (Self::Handler(a), Self::Handler(b)) => Rc::ptr_eq(a, b),
            (Self::TraitValue(a), Self::TraitValue(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Runtime type name, as shown in error messages.
    #[must_use]
    pub fn type_name(&self) -> String {
        match self {
            Self::Undefined => "Undefined".to_owned(),
            Self::Uninitialized => "Uninitialized".to_owned(),
            Self::Trait(_) => "ctrait".to_owned(),
            Self::Handler(_) => "TraitHandler".to_owned(),
            Self::TraitValue(_) => "TraitValue".to_owned(),
            other => TypeSpec::of(other).name(),
        }
    }

    /// Developer-facing rendering.
    #[must_use]
    pub fn repr(&self) -> String {
        let mut out = String::new();
        self.write_repr(&mut out, 0);
        out
    }

    /// `str(x)`: strings render bare, everything else as `repr`.
    #[must_use]
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Str(s) => s.to_string(),
            other => other.repr(),
        }
    }

    fn write_repr(&self, out: &mut String, depth: usize) {
        if depth > REPR_DEPTH {
            out.push_str("...");
            return;
        }
        match self {
            Self::None => out.push_str("None"),
            Self::Undefined => out.push_str("<undefined>"),
            Self::Uninitialized => out.push_str("<uninitialized>"),
            Self::Bool(true) => out.push_str("True"),
            Self::Bool(false) => out.push_str("False"),
            Self::Int(n) => out.push_str(&n.to_string()),
            Self::Float(x) => out.push_str(&float_repr(*x)),
            Self::Str(s) => push_quoted(out, s),
            Self::Tuple(items) => {
                out.push('(');
                write_items(out, items.iter(), depth);
                if items.len() == 1 {
                    out.push(',');
                }
                out.push(')');
            }
            Self::List(items) => {
                out.push('[');
                write_items(out, items.borrow().iter(), depth);
                out.push(']');
            }
            Self::Dict(dict) => {
                out.push('{');
                for (i, (k, v)) in dict.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    k.write_repr(out, depth + 1);
                    out.push_str(": ");
                    v.write_repr(out, depth + 1);
                }
                out.push('}');
            }
            Self::Set(set) => {
                let set = set.borrow();
                if set.is_empty() {
                    out.push_str("set()");
                } else {
                    out.push('{');
                    write_items(out, set.iter(), depth);
                    out.push('}');
                }
            }
            Self::Callable(c) => {
                out.push_str("<function ");
                out.push_str(c.name());
                out.push('>');
            }
            Self::Type(t) => {
                out.push_str("<class '");
                out.push_str(&t.name());
                out.push_str("'>");
            }
            Self::Host(h) => {
                out.push('<');
                out.push_str(h.type_name());
                out.push_str(" object>");
            }
            Self::Trait(_) => out.push_str("<ctrait>"),
            Self::Handler(h) => {
                out.push_str("<handler: ");
                out.push_str(&h.info());
                out.push('>');
            }
            Self::TraitValue(_) => out.push_str("<TraitValue>"),
        }
    }

    /// Hashable identity of this value when used as a dict key.
    ///
    /// # Errors
    ///
    /// Lists, dicts, and sets are unhashable.
    pub fn hash_key(&self) -> Result<HashKey> {
        Ok(match self {
            Self::None => HashKey::None,
            Self::Undefined => HashKey::Undefined,
            Self::Uninitialized => HashKey::Uninitialized,
            Self::Bool(b) => HashKey::Int(i64::from(*b)),
            Self::Int(n) => HashKey::Int(*n),
            Self::Float(x) => float_key(*x),
            Self::Str(s) => HashKey::Str(Rc::clone(s)),
            Self::Tuple(items) => HashKey::Tuple(
                items
                    .iter()
                    .map(Value::hash_key)
                    .collect::<Result<Vec<_>>>()?
                    .into_boxed_slice(),
            ),
            Self::List(_) | Self::Dict(_) | Self::Set(_) => {
                return Err(TraitError::type_error(format!(
                    "unhashable type: '{}'",
                    self.type_name()
                )));
            }
            Self::Type(t) => t.hash_key(),
            Self::Callable(c) => HashKey::Ptr(c.addr()),
            Self::Host(h) => HashKey::Ptr(h.addr()),
            Self::Trait(t) => HashKey::Ptr(t.addr()),
            Self::Handler(h) => HashKey::Ptr(Rc::as_ptr(h).cast::<()>() as usize),
            Self::TraitValue(v) => HashKey::Ptr(Rc::as_ptr(v).cast::<()>() as usize),
        })
    }

    /// Items of an iterable value (`list(x)`).
    ///
    /// # Errors
    ///
    /// Fails for non-iterable values.
    pub fn iter_items(&self) -> Result<Vec<Value>> {
        match self {
            Self::Tuple(items) => Ok(items.to_vec()),
            Self::List(items) => Ok(items.borrow().clone()),
            Self::Dict(dict) => Ok(dict.borrow().keys().cloned().collect()),
            Self::Set(set) => Ok(set.borrow().iter().cloned().collect()),
            Self::Str(s) => Ok(s.chars().map(|c| Value::str(c.encode_utf8(&mut [0; 4]))).collect()),
            other => Err(TraitError::type_error(format!(
                "'{}' object is not iterable",
                other.type_name()
            ))),
        }
    }

    /// Membership test (`item in self`).
    ///
    /// # Errors
    ///
    /// Fails when `self` is not a container.
    pub fn contains(&self, item: &Value) -> Result<bool> {
        match self {
            Self::Tuple(items) => Ok(items.iter().any(|v| v == item)),
            Self::List(items) => Ok(items.borrow().iter().any(|v| v == item)),
            Self::Dict(dict) => Ok(item
                .hash_key()
                .is_ok_and(|key| dict.borrow().contains_key_hashed(&key))),
            Self::Set(set) => Ok(item
                .hash_key()
                .is_ok_and(|key| set.borrow().contains_hashed(&key))),
            Self::Str(s) => match item {
                Self::Str(needle) => Ok(s.contains(&**needle)),
                other => Err(TraitError::type_error(format!(
                    "'in <string>' requires string as left operand, not {}",
                    other.type_name()
                ))),
            },
            other => Err(TraitError::type_error(format!(
                "argument of type '{}' is not iterable",
                other.type_name()
            ))),
        }
    }
}

fn write_items<'a>(out: &mut String, items: impl Iterator<Item = &'a Value>, depth: usize) {
    for (i, item) in items.enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        item.write_repr(out, depth + 1);
    }
}

fn push_quoted(out: &mut String, s: &str) {
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('\'');
}

fn float_repr(x: f64) -> String {
    if x.is_nan() {
        "nan".to_owned()
    } else if x.is_infinite() {
        if x > 0.0 { "inf" } else { "-inf" }.to_owned()
    } else {
        format!("{x:?}")
    }
}

fn float_key(x: f64) -> HashKey {
    if x.is_finite() && x.fract() == 0.0 && x >= i64::MIN as f64 && x < i64::MAX as f64 {
        HashKey::Int(x as i64)
    } else {
        HashKey::Float(x.to_bits())
    }
}

#[derive(Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

fn number(value: &Value) -> Option<Number> {
    match value {
        Value::Bool(b) => Some(Number::Int(i64::from(*b))),
        Value::Int(n) => Some(Number::Int(*n)),
        Value::Float(x) => Some(Number::Float(*x)),
        _ => None,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None)
            | (Self::Undefined, Self::Undefined)
            | (Self::Uninitialized, Self::Uninitialized) => true,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Tuple(a), Self::Tuple(b)) => a[..] == b[..],
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Self::Dict(a), Self::Dict(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Self::Set(a), Self::Set(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Self::Type(a), Self::Type(b)) => a == b,
            (
                Self::Callable(_)
                | Self::Host(_)
                | Self::Trait(_)
                | Self::Handler(_)
                | Self::TraitValue(_),
                _,
            ) => self.is(other),
            _ => match (number(self), number(other)) {
                (Some(Number::Int(a)), Some(Number::Int(b))) => a == b,
                (Some(a), Some(b)) => to_f64(a) == to_f64(b),
                _ => false,
            },
        }
    }
}

fn to_f64(n: Number) -> f64 {
    match n {
        Number::Int(i) => i as f64,
        Number::Float(x) => x,
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(Rc::from(s))
    }
}

impl From<Callable> for Value {
    fn from(c: Callable) -> Self {
        Self::Callable(c)
    }
}

impl From<TypeSpec> for Value {
    fn from(t: TypeSpec) -> Self {
        Self::Type(t)
    }
}

impl From<Host> for Value {
    fn from(h: Host) -> Self {
        Self::Host(h)
    }
}

impl From<TraitDescriptor> for Value {
    fn from(t: TraitDescriptor) -> Self {
        Self::Trait(t)
    }
}

// ---------------------------------------------------------------------------
// Hash keys and containers
// ---------------------------------------------------------------------------

/// Normalized hashable form of a [`Value`].
///
/// Numerically equal keys collapse (`True`, `1`, and `1.0` are one key).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    None,
    Undefined,
    Uninitialized,
    Int(i64),
    Float(u64),
    Str(Rc<str>),
    Tuple(Box<[HashKey]>),
    BuiltinType(&'static str),
    Ptr(usize),
}

/// Insertion-ordered mapping keyed by hashable values.
#[derive(Clone, Default)]
pub struct Dict {
    entries: Vec<(Value, Value)>,
    index: AHashMap<HashKey, usize>,
}

impl Dict {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or replace, returning the previous value.
    ///
    /// # Errors
    ///
    /// Fails when `key` is unhashable.
    pub fn insert(&mut self, key: Value, value: Value) -> Result<Option<Value>> {
        let hashed = key.hash_key()?;
        if let Some(&slot) = self.index.get(&hashed) {
            return Ok(Some(std::mem::replace(&mut self.entries[slot].1, value)));
        }
        self.index.insert(hashed, self.entries.len());
        self.entries.push((key, value));
        Ok(None)
    }

    #[must_use]
    pub fn get(&self, key: &Value) -> Option<&Value> {
        let hashed = key.hash_key().ok()?;
        self.get_hashed(&hashed)
    }

    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&Value> {
        self.get_hashed(&HashKey::Str(Rc::from(key)))
    }

    fn get_hashed(&self, key: &HashKey) -> Option<&Value> {
        self.index.get(key).map(|&slot| &self.entries[slot].1)
    }

    #[must_use]
    pub fn contains_key(&self, key: &Value) -> bool {
        self.get(key).is_some()
    }

    pub(crate) fn contains_key_hashed(&self, key: &HashKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn remove(&mut self, key: &Value) -> Option<Value> {
        let hashed = key.hash_key().ok()?;
        let slot = self.index.remove(&hashed)?;
        let (_, value) = self.entries.remove(slot);
        for position in self.index.values_mut() {
            if *position > slot {
                *position -= 1;
            }
        }
        Some(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(k, _)| k)
    }
}

impl PartialEq for Dict {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self.entries.iter().all(|(k, v)| {
                k.hash_key()
                    .ok()
                    .and_then(|key| other.get_hashed(&key))
                    .is_some_and(|ov| ov == v)
            })
    }
}

impl fmt::Debug for Dict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Insertion-ordered set of hashable values.
#[derive(Clone, Default)]
pub struct ValueSet {
    items: Dict,
}

impl ValueSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Add `item`; returns `true` if it was not already present.
    ///
    /// # Errors
    ///
    /// Fails when `item` is unhashable.
    pub fn insert(&mut self, item: Value) -> Result<bool> {
        Ok(self.items.insert(item, Value::None)?.is_none())
    }

    #[must_use]
    pub fn contains(&self, item: &Value) -> bool {
        self.items.contains_key(item)
    }

    pub(crate) fn contains_hashed(&self, key: &HashKey) -> bool {
        self.items.contains_key_hashed(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.items.keys()
    }
}

impl PartialEq for ValueSet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|item| other.contains(item))
    }
}

impl fmt::Debug for ValueSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

// ---------------------------------------------------------------------------
// Callables
// ---------------------------------------------------------------------------

type CallFn = dyn Fn(&[Value], Option<&Dict>) -> Result<Value>;

struct CallableInner {
    name: Rc<str>,
    func: Box<CallFn>,
}

/// A named, shared user function.
///
/// Cloning shares the same function object, so identity survives clones.
#[derive(Clone)]
pub struct Callable {
    inner: Rc<CallableInner>,
}

impl Callable {
    /// Wrap a positional-only function.
    pub fn new(name: &str, func: impl Fn(&[Value]) -> Result<Value> + 'static) -> Self {
        Self::with_keywords(name, move |args, _| func(args))
    }

    /// Wrap a function that also receives keyword arguments.
    pub fn with_keywords(
        name: &str,
        func: impl Fn(&[Value], Option<&Dict>) -> Result<Value> + 'static,
    ) -> Self {
        Self {
            inner: Rc::new(CallableInner {
                name: Rc::from(name),
                func: Box::new(func),
            }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Call with positional arguments.
    ///
    /// # Errors
    ///
    /// Propagates whatever the wrapped function returns.
    pub fn call(&self, args: &[Value]) -> Result<Value> {
        (self.inner.func)(args, None)
    }

    /// Call with positional and optional keyword arguments.
    ///
    /// # Errors
    ///
    /// Propagates whatever the wrapped function returns.
    pub fn call_with(&self, args: &[Value], kwargs: Option<&Dict>) -> Result<Value> {
        (self.inner.func)(args, kwargs)
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Callable) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.inner).cast::<()>() as usize
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<function {}>", self.name())
    }
}
