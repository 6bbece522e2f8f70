#![forbid(unsafe_code)]

//! Error taxonomy for the trait-attribute engine.
//!
//! Every failure crossing the engine boundary is a [`TraitError`]. The
//! variants fall into the categories callers special-case:
//!
//! - **Validation**: a value did not satisfy a descriptor's validator.
//! - **Delegation**: a delegate target is misconfigured, or a delegation
//!   chain exceeded the hop bound.
//! - **Policy**: a write to a read-only, constant, or disallowed attribute,
//!   or a read of a write-only event.
//! - **AttributeName**: an attribute name that is not a string.
//! - **Internal**: a non-descriptor was found where a descriptor was
//!   expected, or a required collaborator is missing.
//!
//! The remaining variants (`Attribute`, `Type`, `Value`, `User`, `Json`,
//! `Persist`) cover plain lookup failures, conversion failures, errors
//! raised by user callables, and state persistence.

use std::fmt;

use thiserror::Error;

use crate::host::Host;
use crate::value::Value;

pub type Result<T> = std::result::Result<T, TraitError>;

/// Coarse classification of a [`TraitError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Delegation,
    Policy,
    AttributeName,
    Attribute,
    Internal,
    Type,
    Value,
    User,
    Persist,
}

/// Details of a rejected value, formatted the way users see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Runtime type name of the host, when the validation had a host.
    pub object: Option<String>,
    pub name: String,
    /// Description of what the attribute accepts.
    pub info: String,
    /// `repr` of the rejected value.
    pub value: String,
    /// Type name of the rejected value.
    pub value_type: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.object {
            Some(object) => write!(
                f,
                "The '{}' trait of {} {} instance must be {}, but a value of {} <class '{}'> was specified.",
                self.name,
                article(object),
                object,
                self.info,
                self.value,
                self.value_type
            ),
            None => write!(
                f,
                "The '{}' trait must be {}, but a value of {} <class '{}'> was specified.",
                self.name, self.info, self.value, self.value_type
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum TraitError {
    #[error("{0}")]
    Validation(Box<ValidationError>),

    #[error("{message}")]
    Delegation { message: String },

    #[error("{message}")]
    Policy { message: String },

    #[error("{message}")]
    AttributeName { message: String },

    #[error("{message}")]
    Attribute { message: String },

    #[error("{message}")]
    Internal { message: String },

    #[error("{message}")]
    Type { message: String },

    #[error("{message}")]
    Value { message: String },

    #[error("{message}")]
    User { message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("state persistence error: {message}")]
    Persist { message: String },
}

impl TraitError {
    /// Build the standard validation failure for `value` written to `name`.
    #[must_use]
    pub fn validation(host: Option<&Host>, name: &str, info: &str, value: &Value) -> Self {
        Self::Validation(Box::new(ValidationError {
            object: host.map(|h| h.type_name().to_owned()),
            name: name.to_owned(),
            info: info.to_owned(),
            value: value.repr(),
            value_type: value.type_name(),
        }))
    }

    #[must_use]
    pub fn delegation(message: impl Into<String>) -> Self {
        Self::Delegation {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn policy(message: impl Into<String>) -> Self {
        Self::Policy {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn attribute(message: impl Into<String>) -> Self {
        Self::Attribute {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::Type {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn value_error(message: impl Into<String>) -> Self {
        Self::Value {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn user(message: impl Into<String>) -> Self {
        Self::User {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn persist(message: impl Into<String>) -> Self {
        Self::Persist {
            message: message.into(),
        }
    }

    /// "'Foo' object has no attribute 'x'"
    #[must_use]
    pub fn no_attribute(type_name: &str, name: &str) -> Self {
        Self::attribute(format!("'{type_name}' object has no attribute '{name}'"))
    }

    /// Error for an attribute name that is not a string.
    #[must_use]
    pub fn invalid_attribute_name(name: &Value) -> Self {
        Self::AttributeName {
            message: format!(
                "attribute name must be an instance of <type 'str'>. Got {} ({}).",
                name.repr(),
                name.type_name()
            ),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Delegation { .. } => ErrorKind::Delegation,
            Self::Policy { .. } => ErrorKind::Policy,
            Self::AttributeName { .. } => ErrorKind::AttributeName,
            Self::Attribute { .. } => ErrorKind::Attribute,
            Self::Internal { .. } => ErrorKind::Internal,
            Self::Type { .. } => ErrorKind::Type,
            Self::Value { .. } => ErrorKind::Value,
            Self::User { .. } => ErrorKind::User,
            Self::Json(_) | Self::Persist { .. } => ErrorKind::Persist,
        }
    }

    /// True for the trait-specific rejection that lets a complex validator
    /// move on to its next alternative.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    #[must_use]
    pub fn validation_details(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(details) => Some(details),
            _ => None,
        }
    }
}

/// "a" or "an" for the given noun.
pub(crate) fn article(noun: &str) -> &'static str {
    match noun.chars().next().map(|c| c.to_ascii_lowercase()) {
        Some('a' | 'e' | 'i' | 'o' | 'u') => "an",
        _ => "a",
    }
}
