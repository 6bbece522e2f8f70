#![forbid(unsafe_code)]

//! Runtime types used by type, instance, coercion, and cast validators.
//!
//! A [`TypeSpec`] is either one of the builtin value types or a host class.
//! Subtyping follows the usual rules: every type is a subtype of `object`,
//! `bool` is a subtype of `int`, and host classes inherit along their base
//! chain.

use std::rc::Rc;

use crate::class::HostClass;
use crate::error::{Result, TraitError};
use crate::value::{HashKey, Value};

#[derive(Clone)]
pub enum TypeSpec {
    NoneType,
    Bool,
    Int,
    Float,
    Str,
    Tuple,
    List,
    Dict,
    Set,
    Callable,
    Type,
    Object,
    Class(Rc<HostClass>),
}

impl TypeSpec {
    /// Runtime type of `value`.
    #[must_use]
    pub fn of(value: &Value) -> Self {
        match value {
            Value::None => Self::NoneType,
            Value::Bool(_) => Self::Bool,
            Value::Int(_) => Self::Int,
            Value::Float(_) => Self::Float,
            Value::Str(_) => Self::Str,
            Value::Tuple(_) => Self::Tuple,
            Value::List(_) => Self::List,
            Value::Dict(_) => Self::Dict,
            Value::Set(_) => Self::Set,
            Value::Callable(_) => Self::Callable,
            Value::Type(_) => Self::Type,
            Value::Host(host) => Self::Class(Rc::clone(host.class())),
            Value::Undefined
            | Value::Uninitialized
            | Value::Trait(_)
            | Value::Handler(_)
            | Value::TraitValue(_) => Self::Object,
        }
    }

    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::NoneType => "NoneType",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "str",
            Self::Tuple => "tuple",
            Self::List => "list",
            Self::Dict => "dict",
            Self::Set => "set",
            Self::Callable => "function",
            Self::Type => "type",
            Self::Object => "object",
            Self::Class(class) => return class.name().to_owned(),
        }
        .to_owned()
    }

    /// `issubclass(self, other)`.
    #[must_use]
    pub fn is_subtype_of(&self, other: &TypeSpec) -> bool {
        match (self, other) {
            (_, Self::Object) => true,
            (Self::Bool, Self::Int) => true,
            (Self::Class(sub), Self::Class(sup)) => sub.is_subclass_of(sup),
            (a, b) => a == b,
        }
    }

    /// `isinstance(value, self)`.
    #[must_use]
    pub fn contains(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Object, _) => true,
            (Self::Class(class), Value::Host(host)) => host.class().is_subclass_of(class),
            _ => Self::of(value).is_subtype_of(self),
        }
    }

    /// Call the type as a converter (`int(value)`, `float(value)`, ...).
    ///
    /// # Errors
    ///
    /// Type errors for unsupported source types, value errors for
    /// unparsable strings.
    pub fn convert(&self, value: &Value) -> Result<Value> {
        match self {
            Self::Bool => Ok(Value::Bool(value.truthy())),
            Self::Int => to_int(value),
            Self::Float => to_float(value),
            Self::Str => Ok(match value {
                Value::Str(_) => value.clone(),
                other => Value::from(other.to_display_string()),
            }),
            Self::Tuple => match value {
                Value::Tuple(_) => Ok(value.clone()),
                other => Ok(Value::tuple(other.iter_items()?)),
            },
            Self::List => Ok(Value::list(value.iter_items()?)),
            Self::Dict => match value {
                Value::Dict(dict) => Ok(Value::Dict(Rc::new(std::cell::RefCell::new(
                    dict.borrow().clone(),
                )))),
                other => Err(TraitError::type_error(format!(
                    "'{}' object is not a mapping",
                    other.type_name()
                ))),
            },
            Self::Set => Value::set(value.iter_items()?),
            Self::NoneType | Self::Callable | Self::Type | Self::Object | Self::Class(_) => {
                Err(TraitError::type_error(format!(
                    "cannot convert {} to '{}'",
                    value.repr(),
                    self.name()
                )))
            }
        }
    }

    pub(crate) fn hash_key(&self) -> HashKey {
        match self {
            Self::Class(class) => HashKey::Ptr(Rc::as_ptr(class).cast::<()>() as usize),
            Self::NoneType => HashKey::BuiltinType("NoneType"),
            Self::Bool => HashKey::BuiltinType("bool"),
            Self::Int => HashKey::BuiltinType("int"),
            Self::Float => HashKey::BuiltinType("float"),
            Self::Str => HashKey::BuiltinType("str"),
            Self::Tuple => HashKey::BuiltinType("tuple"),
            Self::List => HashKey::BuiltinType("list"),
            Self::Dict => HashKey::BuiltinType("dict"),
            Self::Set => HashKey::BuiltinType("set"),
            Self::Callable => HashKey::BuiltinType("function"),
            Self::Type => HashKey::BuiltinType("type"),
            Self::Object => HashKey::BuiltinType("object"),
        }
    }

    /// Resolve a builtin type by name.
    #[must_use]
    pub fn builtin(name: &str) -> Option<Self> {
        Some(match name {
            "NoneType" => Self::NoneType,
            "bool" => Self::Bool,
            "int" => Self::Int,
            "float" => Self::Float,
            "str" => Self::Str,
            "tuple" => Self::Tuple,
            "list" => Self::List,
            "dict" => Self::Dict,
            "set" => Self::Set,
            "function" => Self::Callable,
            "type" => Self::Type,
            "object" => Self::Object,
            _ => return None,
        })
    }
}

impl PartialEq for TypeSpec {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Class(a), Self::Class(b)) => Rc::ptr_eq(a, b),
            (Self::Class(_), _) | (_, Self::Class(_)) => false,
            (a, b) => std::mem::discriminant(a) == std::mem::discriminant(b),
        }
    }
}

impl std::fmt::Debug for TypeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<class '{}'>", self.name())
    }
}

/// `operator.index(value)`: only integers (and bools) qualify.
pub(crate) fn as_index(value: &Value) -> Result<Value> {
    match value {
        Value::Int(_) => Ok(value.clone()),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        other => Err(TraitError::type_error(format!(
            "'{}' object cannot be interpreted as an integer",
            other.type_name()
        ))),
    }
}

/// Real-number protocol: floats pass through, integers widen.
pub(crate) fn as_real(value: &Value) -> Result<f64> {
    value.as_f64().ok_or_else(|| {
        TraitError::type_error(format!(
            "must be real number, not {}",
            value.type_name()
        ))
    })
}

fn to_int(value: &Value) -> Result<Value> {
    match value {
        Value::Int(_) => Ok(value.clone()),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Float(x) => {
            if x.is_finite() {
                Ok(Value::Int(x.trunc() as i64))
            } else {
                Err(TraitError::value_error(format!(
                    "cannot convert float {} to integer",
                    value.repr()
                )))
            }
        }
        Value::Str(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| {
            TraitError::value_error(format!(
                "invalid literal for int() with base 10: {}",
                value.repr()
            ))
        }),
        other => Err(TraitError::type_error(format!(
            "int() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

fn to_float(value: &Value) -> Result<Value> {
    match value {
        Value::Float(_) => Ok(value.clone()),
        Value::Str(s) => {
            let text = s.trim();
            let parsed = match text.to_ascii_lowercase().as_str() {
                "inf" | "+inf" | "infinity" => Some(f64::INFINITY),
                "-inf" | "-infinity" => Some(f64::NEG_INFINITY),
                "nan" => Some(f64::NAN),
                _ => text.parse::<f64>().ok(),
            };
            parsed.map(Value::Float).ok_or_else(|| {
                TraitError::value_error(format!(
                    "could not convert string to float: {}",
                    value.repr()
                ))
            })
        }
        other => other.as_f64().map(Value::Float).ok_or_else(|| {
            TraitError::type_error(format!(
                "float() argument must be a string or a number, not '{}'",
                other.type_name()
            ))
        }),
    }
}
