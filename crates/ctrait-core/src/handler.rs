#![forbid(unsafe_code)]

//! The policy object a descriptor points back to.
//!
//! Handlers belong to the declaration layer. The engine asks them for three
//! things: a user-facing error when validation fails, a description of the
//! accepted values, and (for state restored from the older format) the
//! validate/post-set callables to re-install.

use std::fmt;
use std::rc::Rc;

use crate::error::{Result, TraitError};
use crate::host::Host;
use crate::value::{Callable, Value};

pub type HandlerRef = Rc<dyn TraitHandler>;

pub trait TraitHandler {
    /// Description of the accepted values ("an integer", "a legal value").
    fn info(&self) -> String {
        "a legal value".to_owned()
    }

    /// Error raised when `value` is rejected for `name`.
    fn error(&self, host: Option<&Host>, name: &str, value: &Value) -> TraitError {
        TraitError::validation(host, name, &self.info(), value)
    }

    /// Full validation used by the `slow` entry of a complex validator.
    ///
    /// # Errors
    ///
    /// The default rejects every value.
    fn slow_validate(&self, host: Option<&Host>, name: &str, value: &Value) -> Result<Value> {
        Err(self.error(host, name, value))
    }

    /// Validator callable re-installed when restoring legacy state.
    fn validate_callable(&self) -> Option<Callable> {
        None
    }

    /// Post-set callable re-installed when restoring legacy state.
    fn post_setattr_callable(&self) -> Option<Callable> {
        None
    }
}

impl fmt::Debug for dyn TraitHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraitHandler")
            .field("info", &self.info())
            .finish()
    }
}

/// A handler that only describes its accepted values.
///
/// Optional callables cover the slow-validate and legacy-restore paths.
#[derive(Debug, Clone, Default)]
pub struct BasicHandler {
    info: String,
    slow: Option<Callable>,
    validate: Option<Callable>,
    post_setattr: Option<Callable>,
}

impl BasicHandler {
    #[must_use]
    pub fn new(info: impl Into<String>) -> Self {
        Self {
            info: info.into(),
            ..Self::default()
        }
    }

    /// Use `validate(host, name, value)` for slow validation and as the
    /// legacy validator callable.
    #[must_use]
    pub fn with_validate(mut self, validate: Callable) -> Self {
        self.slow = Some(validate.clone());
        self.validate = Some(validate);
        self
    }

    #[must_use]
    pub fn with_post_setattr(mut self, post_setattr: Callable) -> Self {
        self.post_setattr = Some(post_setattr);
        self
    }

    #[must_use]
    pub fn into_ref(self) -> HandlerRef {
        Rc::new(self)
    }
}

impl TraitHandler for BasicHandler {
    fn info(&self) -> String {
        if self.info.is_empty() {
            "a legal value".to_owned()
        } else {
            self.info.clone()
        }
    }

    fn slow_validate(&self, host: Option<&Host>, name: &str, value: &Value) -> Result<Value> {
        match &self.slow {
            Some(validate) => {
                let host = host.map_or(Value::None, |h| Value::Host(h.clone()));
                validate.call(&[host, Value::str(name), value.clone()])
            }
            None => Err(self.error(None, name, value)),
        }
    }

    fn validate_callable(&self) -> Option<Callable> {
        self.validate.clone()
    }

    fn post_setattr_callable(&self) -> Option<Callable> {
        self.post_setattr.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_info_when_empty() {
        assert_eq!(BasicHandler::default().info(), "a legal value");
        assert_eq!(BasicHandler::new("an integer").info(), "an integer");
    }

    #[test]
    fn error_uses_info_text() {
        let handler = BasicHandler::new("a positive number");
        let err = handler.error(None, "size", &Value::Int(-1));
        assert!(err.is_validation());
        assert!(err.to_string().contains("must be a positive number"));
    }

    #[test]
    fn slow_validate_without_callable_rejects() {
        let handler = BasicHandler::new("x");
        assert!(handler.slow_validate(None, "a", &Value::Int(1)).is_err());
    }

    #[test]
    fn slow_validate_calls_with_host_name_value() {
        let check = Callable::new("upper", |args| match &args[2] {
            Value::Str(s) => Ok(Value::from(s.to_uppercase())),
            _ => Err(TraitError::user("not a string")),
        });
        let handler = BasicHandler::new("a string").with_validate(check);
        let out = handler.slow_validate(None, "label", &Value::str("ab")).unwrap();
        assert_eq!(out, Value::str("AB"));
        assert!(handler.validate_callable().is_some());
        assert!(handler.post_setattr_callable().is_none());
    }
}
