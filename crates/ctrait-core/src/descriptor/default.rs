#![forbid(unsafe_code)]

//! Default-value kinds and first-value production.

use std::cell::RefCell;
use std::rc::Rc;

use crate::context::CollectionBinding;
use crate::descriptor::TraitDescriptor;
use crate::error::{Result, TraitError};
use crate::flags::TraitFlags;
use crate::host::Host;
use crate::value::{Dict, Value};

/// How a descriptor produces the first value of its attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DefaultValueKind {
    /// The payload itself.
    #[default]
    Constant,
    /// The payload itself; the declaration gave no explicit default.
    Missing,
    /// The host object.
    Object,
    /// A shallow list copy of the payload.
    ListCopy,
    /// A shallow dict copy of the payload.
    DictCopy,
    /// An observable list seeded from the payload.
    ListObject,
    /// An observable dict seeded from the payload.
    DictObject,
    /// `callable(*args, **kwargs)` from a `(callable, args, kwargs)` payload.
    CallableAndArgs,
    /// `callable(host)`, validated.
    Callable,
    /// An observable set seeded from the payload.
    SetObject,
    /// No default is permitted.
    Disallow,
}

impl DefaultValueKind {
    pub const MAX_INDEX: i64 = 10;

    #[must_use]
    pub fn index(self) -> i64 {
        match self {
            Self::Constant => 0,
            Self::Missing => 1,
            Self::Object => 2,
            Self::ListCopy => 3,
            Self::DictCopy => 4,
            Self::ListObject => 5,
            Self::DictObject => 6,
            Self::CallableAndArgs => 7,
            Self::Callable => 8,
            Self::SetObject => 9,
            Self::Disallow => 10,
        }
    }

    /// # Errors
    ///
    /// "The default value type must be 0..10, but N was specified."
    pub fn from_index(index: i64) -> Result<Self> {
        Ok(match index {
            0 => Self::Constant,
            1 => Self::Missing,
            2 => Self::Object,
            3 => Self::ListCopy,
            4 => Self::DictCopy,
            5 => Self::ListObject,
            6 => Self::DictObject,
            7 => Self::CallableAndArgs,
            8 => Self::Callable,
            9 => Self::SetObject,
            10 => Self::Disallow,
            other => {
                return Err(TraitError::value_error(format!(
                    "The default value type must be 0..{}, but {other} was specified.",
                    Self::MAX_INDEX
                )));
            }
        })
    }

    /// Short label used by introspection ("value", "self", "factory", ...).
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Constant | Self::Missing => "value",
            Self::Object => "self",
            Self::ListCopy | Self::ListObject => "list",
            Self::DictCopy | Self::DictObject => "dict",
            Self::CallableAndArgs => "factory",
            Self::Callable => "method",
            Self::SetObject => "set",
            Self::Disallow => "invalid",
        }
    }

    /// Whether the first value depends on the host or a call.
    #[must_use]
    pub fn is_dynamic(self) -> bool {
        matches!(
            self,
            Self::Object | Self::CallableAndArgs | Self::Callable | Self::Disallow
        )
    }
}

impl TraitDescriptor {
    /// Produce the first value of `name` on `host`.
    ///
    /// Nothing is stored; callers decide whether to cache the result.
    ///
    /// # Errors
    ///
    /// Payload shape errors, factory and callable failures, validation of a
    /// callable default, and the disallowed kind.
    pub fn default_value_for(&self, host: &Host, name: &str) -> Result<Value> {
        let kind = self.default_kind();
        let payload = self.default_payload();
        tracing::trace!(message = "ctrait.default", name, kind = kind.label());
        match kind {
            DefaultValueKind::Constant | DefaultValueKind::Missing => {
                Ok(payload.unwrap_or(Value::None))
            }
            DefaultValueKind::Object => Ok(Value::Host(host.clone())),
            DefaultValueKind::ListCopy => {
                let source = payload.unwrap_or(Value::None);
                Ok(Value::list(source.iter_items()?))
            }
            DefaultValueKind::DictCopy => match payload {
                Some(Value::Dict(dict)) => {
                    let copy: Dict = dict.borrow().clone();
                    Ok(Value::Dict(Rc::new(RefCell::new(copy))))
                }
                other => Err(TraitError::type_error(format!(
                    "dict-copy default of the '{name}' trait requires a dict, not {}",
                    other.unwrap_or(Value::None).type_name()
                ))),
            },
            DefaultValueKind::ListObject
            | DefaultValueKind::DictObject
            | DefaultValueKind::SetObject => {
                let seed = payload.unwrap_or(Value::None);
                let binding = CollectionBinding {
                    descriptor: self,
                    host,
                    name,
                    seed: &seed,
                };
                let context = host.context();
                match kind {
                    DefaultValueKind::ListObject => context.make_list(&binding),
                    DefaultValueKind::DictObject => context.make_dict(&binding),
                    _ => context.make_set(&binding),
                }
            }
            DefaultValueKind::CallableAndArgs => call_with_args(name, payload),
            DefaultValueKind::Callable => {
                let factory = payload
                    .as_ref()
                    .and_then(Value::as_callable)
                    .cloned()
                    .ok_or_else(|| {
                        TraitError::type_error(format!(
                            "callable default of the '{name}' trait is not callable"
                        ))
                    })?;
                let produced = factory.call(&[Value::Host(host.clone())])?;
                match self.validator() {
                    Some(_) => {
                        let validated = self.validate(Some(host), name, &produced)?;
                        if self.flags().contains(TraitFlags::SETATTR_ORIGINAL_VALUE) {
                            Ok(produced)
                        } else {
                            Ok(validated)
                        }
                    }
                    None => Ok(produced),
                }
            }
            DefaultValueKind::Disallow => Err(TraitError::value_error(
                "default value not permitted for this trait",
            )),
        }
    }
}

fn call_with_args(name: &str, payload: Option<Value>) -> Result<Value> {
    let bad = || {
        TraitError::type_error(format!(
            "factory default of the '{name}' trait must be (callable, args, kwargs)"
        ))
    };
    let payload = payload.ok_or_else(bad)?;
    let parts = payload.as_tuple().ok_or_else(bad)?;
    let [callable, args, kwargs] = parts else {
        return Err(bad());
    };
    let callable = callable.as_callable().ok_or_else(bad)?;
    let args = args.as_tuple().ok_or_else(bad)?;
    match kwargs {
        Value::None => callable.call(args),
        Value::Dict(kwargs) => {
            let kwargs = kwargs.borrow();
            callable.call_with(args, Some(&*kwargs))
        }
        _ => Err(bad()),
    }
}
