#![forbid(unsafe_code)]

//! Closed handler enumerations and their table indices.
//!
//! The integer index of each variant is its position in the serialized
//! dispatch tables. Some tables repeat an entry (the property kind starts out
//! with event handlers, the read-only kind reads like a plain trait), so
//! decoding accepts the duplicate positions while encoding always yields the
//! first one.

use crate::error::{Result, TraitError};

/// Number of positional arguments a property callable receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arity {
    Zero,
    One,
    Two,
    Three,
}

impl Arity {
    #[must_use]
    pub fn index(self) -> i64 {
        match self {
            Self::Zero => 0,
            Self::One => 1,
            Self::Two => 2,
            Self::Three => 3,
        }
    }

    /// # Errors
    ///
    /// Values outside 0..=3 are rejected with "Invalid arguments.".
    pub fn from_index(index: i64) -> Result<Self> {
        match index {
            0 => Ok(Self::Zero),
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            3 => Ok(Self::Three),
            _ => Err(TraitError::value_error("Invalid arguments.")),
        }
    }
}

/// Trait kinds accepted by the descriptor constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraitKind {
    Trait,
    Python,
    Event,
    Delegate,
    Property,
    Disallow,
    ReadOnly,
    Constant,
    Generic,
}

impl TraitKind {
    /// # Errors
    ///
    /// Values outside 0..=8 are rejected.
    pub fn from_index(index: i64) -> Result<Self> {
        Ok(match index {
            0 => Self::Trait,
            1 => Self::Python,
            2 => Self::Event,
            3 => Self::Delegate,
            4 => Self::Property,
            5 => Self::Disallow,
            6 => Self::ReadOnly,
            7 => Self::Constant,
            8 => Self::Generic,
            _ => return Err(TraitError::value_error("Invalid argument to trait constructor.")),
        })
    }

    #[must_use]
    pub fn index(self) -> i64 {
        match self {
            Self::Trait => 0,
            Self::Python => 1,
            Self::Event => 2,
            Self::Delegate => 3,
            Self::Property => 4,
            Self::Disallow => 5,
            Self::ReadOnly => 6,
            Self::Constant => 7,
            Self::Generic => 8,
        }
    }

    pub(crate) fn handlers(self) -> (GetHandler, SetHandler) {
        match self {
            Self::Trait => (GetHandler::Trait, SetHandler::Trait),
            Self::Python => (GetHandler::Python, SetHandler::Python),
            Self::Event | Self::Property => (GetHandler::Event, SetHandler::Event),
            Self::Delegate => (GetHandler::Delegate, SetHandler::Delegate),
            Self::Disallow => (GetHandler::Disallow, SetHandler::Disallow),
            Self::ReadOnly => (GetHandler::Trait, SetHandler::ReadOnly),
            Self::Constant => (GetHandler::Constant, SetHandler::Constant),
            Self::Generic => (GetHandler::Generic, SetHandler::Generic),
        }
    }
}

/// Read behavior of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GetHandler {
    /// Materialize the default into the value dict on first read.
    Trait,
    /// Ordinary attribute lookup.
    Python,
    /// Write-only; every read fails.
    Event,
    /// Read through the delegate.
    Delegate,
    /// No such attribute.
    Disallow,
    /// The default payload, never stored.
    Constant,
    /// Ordinary attribute lookup.
    Generic,
    /// Call the getter with the given arity.
    Property(Arity),
}

impl GetHandler {
    #[must_use]
    pub fn index(self) -> i64 {
        match self {
            Self::Trait => 0,
            Self::Python => 1,
            Self::Event => 2,
            Self::Delegate => 3,
            Self::Disallow => 5,
            Self::Constant => 7,
            Self::Generic => 8,
            Self::Property(arity) => 9 + arity.index(),
        }
    }

    /// # Errors
    ///
    /// Indices outside the table are rejected.
    pub fn from_index(index: i64) -> Result<Self> {
        Ok(match index {
            0 | 6 => Self::Trait,
            1 => Self::Python,
            2 | 4 => Self::Event,
            3 => Self::Delegate,
            5 => Self::Disallow,
            7 => Self::Constant,
            8 => Self::Generic,
            9..=12 => Self::Property(Arity::from_index(index - 9)?),
            _ => return Err(out_of_range("getattr", index)),
        })
    }
}

/// Write behavior of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetHandler {
    /// Validate, compare, store, post-set, notify.
    Trait,
    /// Store directly.
    Python,
    /// Validate and notify; never store.
    Event,
    /// Walk the delegation chain and write at the end of it.
    Delegate,
    /// Every write fails.
    Disallow,
    /// One write while the stored value is absent or undefined.
    ReadOnly,
    /// Every write fails.
    Constant,
    /// Store directly.
    Generic,
    /// Call the setter with the given arity.
    Property(Arity),
    /// Validate, then run the property setter held as post-set handler.
    ValidateProperty,
}

impl SetHandler {
    #[must_use]
    pub fn index(self) -> i64 {
        match self {
            Self::Trait => 0,
            Self::Python => 1,
            Self::Event => 2,
            Self::Delegate => 3,
            Self::Disallow => 5,
            Self::ReadOnly => 6,
            Self::Constant => 7,
            Self::Generic => 8,
            Self::Property(arity) => 9 + arity.index(),
            Self::ValidateProperty => 13,
        }
    }

    /// # Errors
    ///
    /// Indices outside the table are rejected.
    pub fn from_index(index: i64) -> Result<Self> {
        Ok(match index {
            0 => Self::Trait,
            1 => Self::Python,
            2 | 4 => Self::Event,
            3 => Self::Delegate,
            5 => Self::Disallow,
            6 => Self::ReadOnly,
            7 => Self::Constant,
            8 => Self::Generic,
            9..=12 => Self::Property(Arity::from_index(index - 9)?),
            13 => Self::ValidateProperty,
            _ => return Err(out_of_range("setattr", index)),
        })
    }
}

/// Hook run after a successful change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostSetHandler {
    /// Property setter with the given arity (validated property writes).
    Property(Arity),
    /// User callable invoked with `(host, name, value)`.
    Callable,
}

impl PostSetHandler {
    /// Index of "no post-set handler".
    pub const NONE_INDEX: i64 = 5;

    #[must_use]
    pub fn index(handler: Option<Self>) -> i64 {
        match handler {
            Some(Self::Property(arity)) => arity.index(),
            Some(Self::Callable) => 4,
            None => Self::NONE_INDEX,
        }
    }

    /// # Errors
    ///
    /// Indices outside the table are rejected.
    pub fn from_index(index: i64) -> Result<Option<Self>> {
        match index {
            0..=3 => Ok(Some(Self::Property(Arity::from_index(index)?))),
            4 => Ok(Some(Self::Callable)),
            Self::NONE_INDEX => Ok(None),
            _ => Err(out_of_range("post_setattr", index)),
        }
    }
}

/// How a delegate maps the attribute name onto the delegate object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DelegateAttrName {
    /// Same name.
    Name,
    /// The prefix replaces the name.
    Prefix,
    /// Prefix followed by the name.
    PrefixName,
    /// The host class's prefix followed by the name; the name alone when the
    /// class has no prefix.
    ClassPrefixName,
}

impl DelegateAttrName {
    /// Index of "no delegate-name policy".
    pub const NONE_INDEX: i64 = 4;

    #[must_use]
    pub fn index(policy: Option<Self>) -> i64 {
        match policy {
            Some(Self::Name) => 0,
            Some(Self::Prefix) => 1,
            Some(Self::PrefixName) => 2,
            Some(Self::ClassPrefixName) => 3,
            None => Self::NONE_INDEX,
        }
    }

    /// # Errors
    ///
    /// Indices outside 0..=3 are rejected.
    pub fn from_policy(index: i64) -> Result<Self> {
        match index {
            0 => Ok(Self::Name),
            1 => Ok(Self::Prefix),
            2 => Ok(Self::PrefixName),
            3 => Ok(Self::ClassPrefixName),
            other => Err(TraitError::value_error(format!(
                "The delegate prefix type must be 0..3, but {other} was specified."
            ))),
        }
    }

    /// # Errors
    ///
    /// Indices outside the table are rejected.
    pub fn from_index(index: i64) -> Result<Option<Self>> {
        if index == Self::NONE_INDEX {
            Ok(None)
        } else {
            Self::from_policy(index)
                .map(Some)
                .map_err(|_| out_of_range("delegate_attr_name", index))
        }
    }

    /// Compute the attribute name on the delegate.
    pub(crate) fn map(self, name: &str, prefix: &str, class_prefix: Option<&str>) -> String {
        match self {
            Self::Name => name.to_owned(),
            Self::Prefix => prefix.to_owned(),
            Self::PrefixName => format!("{prefix}{name}"),
            Self::ClassPrefixName => match class_prefix {
                Some(class_prefix) => format!("{class_prefix}{name}"),
                None => name.to_owned(),
            },
        }
    }
}

fn out_of_range(table: &str, index: i64) -> TraitError {
    TraitError::value_error(format!(
        "Invalid {table} table index {index} in trait state."
    ))
}
