#![forbid(unsafe_code)]

//! Running validators.
//!
//! Each validator produces an [`Outcome`]: the accepted (possibly converted)
//! value, or `Mismatch` meaning "this validator does not accept the value".
//! A hard failure is an `Err` and always propagates. A top-level mismatch
//! becomes the descriptor's user-facing validation error; inside a complex
//! validator it moves on to the next alternative, as does a validation error
//! raised by user code.

use crate::context::{AdaptMode, TraitContext};
use crate::descriptor::TraitDescriptor;
use crate::descriptor::dispatch::Arity;
use crate::descriptor::validate::{RangeExclusion, Validator};
use crate::error::{ErrorKind, Result};
use crate::host::Host;
use crate::types::{self, TypeSpec};
use crate::value::Value;

pub(crate) enum Outcome {
    Valid(Value),
    Mismatch,
}

/// Everything a validator may consult besides the value itself.
pub(crate) struct ValidateCx<'a> {
    pub(crate) descriptor: &'a TraitDescriptor,
    pub(crate) host: Option<&'a Host>,
    pub(crate) name: &'a str,
    pub(crate) context: &'a TraitContext,
}

impl ValidateCx<'_> {
    fn host_value(&self) -> Value {
        self.host.map_or(Value::None, |h| Value::Host(h.clone()))
    }

    fn standard_args(&self, value: &Value) -> [Value; 3] {
        [self.host_value(), Value::str(self.name), value.clone()]
    }
}

/// Validation errors from user code mean "no match"; anything else is fatal.
fn soft(result: Result<Value>) -> Result<Outcome> {
    match result {
        Ok(value) => Ok(Outcome::Valid(value)),
        Err(err) if err.is_validation() => Ok(Outcome::Mismatch),
        Err(err) => Err(err),
    }
}

fn accept_if(condition: bool, value: &Value) -> Outcome {
    if condition {
        Outcome::Valid(value.clone())
    } else {
        Outcome::Mismatch
    }
}

fn in_range<T: PartialOrd>(x: T, low: Option<T>, high: Option<T>, exclude: RangeExclusion) -> bool {
    let above_low = match low {
        None => true,
        Some(low) if exclude.contains(RangeExclusion::LOW) => x > low,
        Some(low) => x >= low,
    };
    let below_high = match high {
        None => true,
        Some(high) if exclude.contains(RangeExclusion::HIGH) => x < high,
        Some(high) => x <= high,
    };
    above_low && below_high
}

impl Validator {
    /// Validate `value`, turning a mismatch into the descriptor's error.
    pub(crate) fn run(&self, cx: &ValidateCx<'_>, value: &Value) -> Result<Value> {
        match self.check(cx, value)? {
            Outcome::Valid(accepted) => Ok(accepted),
            Outcome::Mismatch => Err(cx.descriptor.raise_error(cx.host, cx.name, value)),
        }
    }

    fn check(&self, cx: &ValidateCx<'_>, value: &Value) -> Result<Outcome> {
        Ok(match self {
            Self::Type { ty, or_none } => {
                accept_if((*or_none && value.is_none()) || ty.contains(value), value)
            }
            Self::Instance {
                classes, or_none, ..
            } => accept_if(
                (*or_none && value.is_none()) || classes.iter().any(|c| c.contains(value)),
                value,
            ),
            Self::SelfType { or_none } => {
                let matches_host = cx
                    .host
                    .is_some_and(|h| TypeSpec::Class(h.class().clone()).contains(value));
                accept_if((*or_none && value.is_none()) || matches_host, value)
            }
            Self::IntRange { low, high, exclude } => match value.as_int() {
                Some(n) => accept_if(in_range(n, *low, *high, *exclude), value),
                None => Outcome::Mismatch,
            },
            Self::FloatRange { low, high, exclude } => match value.as_f64() {
                Some(x) if in_range(x, *low, *high, *exclude) => match value {
                    Value::Float(_) => Outcome::Valid(value.clone()),
                    _ => Outcome::Valid(Value::Float(x)),
                },
                _ => Outcome::Mismatch,
            },
            Self::Enum(values) => accept_if(values.contains(value).unwrap_or(false), value),
            Self::Map(map) => accept_if(map.contains(value).unwrap_or(false), value),
            Self::Complex(alternatives) => {
                for alternative in alternatives {
                    match alternative.check(cx, value) {
                        Ok(Outcome::Valid(accepted)) => return Ok(Outcome::Valid(accepted)),
                        Ok(Outcome::Mismatch) => {}
                        Err(err) if err.is_validation() => {}
                        Err(err) => return Err(err),
                    }
                }
                Outcome::Mismatch
            }
            Self::Slow(handler) => soft(handler.slow_validate(cx.host, cx.name, value))?,
            Self::TupleOf(slots) => check_tuple(cx, slots, value)?,
            Self::PrefixMap { map, fallback } => {
                let mapped = match map {
                    Value::Dict(dict) => dict.borrow().get(value).cloned(),
                    _ => None,
                };
                match mapped {
                    Some(mapped) => Outcome::Valid(mapped),
                    None => soft(fallback.call(&cx.standard_args(value)))?,
                }
            }
            Self::Coerce {
                ty,
                accepted,
                convertible,
            } => {
                if ty.contains(value) || accepted.iter().any(|t| t.contains(value)) {
                    Outcome::Valid(value.clone())
                } else if convertible.iter().any(|t| t.contains(value)) {
                    Outcome::Valid(ty.convert(value)?)
                } else {
                    Outcome::Mismatch
                }
            }
            Self::Cast(ty) => {
                if ty.contains(value) {
                    Outcome::Valid(value.clone())
                } else {
                    match ty.convert(value) {
                        Ok(converted) => Outcome::Valid(converted),
                        Err(_) => Outcome::Mismatch,
                    }
                }
            }
            Self::Function(callable) => match callable.call(&cx.standard_args(value)) {
                Ok(accepted) => Outcome::Valid(accepted),
                Err(_) => Outcome::Mismatch,
            },
            Self::Python(callable) => Outcome::Valid(callable.call(&cx.standard_args(value))?),
            Self::Property { arity, callable } => {
                let args = match arity {
                    Arity::Zero => vec![],
                    Arity::One => vec![value.clone()],
                    Arity::Two => vec![cx.host_value(), value.clone()],
                    Arity::Three => cx.standard_args(value).to_vec(),
                };
                Outcome::Valid(callable.call(&args)?)
            }
            Self::Adapt {
                class,
                mode,
                allow_none,
            } => check_adapt(cx, class, *mode, *allow_none, value)?,
            Self::Int => match types::as_index(value) {
                Ok(index) => Outcome::Valid(index),
                Err(err) if err.kind() == ErrorKind::Type => Outcome::Mismatch,
                Err(err) => return Err(err),
            },
            Self::Float => match value {
                Value::Float(_) => Outcome::Valid(value.clone()),
                _ => match types::as_real(value) {
                    Ok(x) => Outcome::Valid(Value::Float(x)),
                    Err(err) if err.kind() == ErrorKind::Type => Outcome::Mismatch,
                    Err(err) => return Err(err),
                },
            },
            Self::Callable { allow_none } => {
                accept_if((*allow_none && value.is_none()) || value.is_callable(), value)
            }
        })
    }
}

/// Validate each slot; build a new tuple only if some slot changed identity.
fn check_tuple(cx: &ValidateCx<'_>, slots: &[TraitDescriptor], value: &Value) -> Result<Outcome> {
    let Value::Tuple(items) = value else {
        return Ok(Outcome::Mismatch);
    };
    if items.len() != slots.len() {
        return Ok(Outcome::Mismatch);
    }
    let mut rebuilt: Option<Vec<Value>> = None;
    for (index, (item, slot)) in items.iter().zip(slots).enumerate() {
        let validated = match slot.validate_with(cx.context, cx.host, cx.name, item) {
            Ok(validated) => validated,
            Err(err) if err.is_validation() => return Ok(Outcome::Mismatch),
            Err(err) => return Err(err),
        };
        if rebuilt.is_none() && !validated.is(item) {
            rebuilt = Some(items[..index].to_vec());
        }
        if let Some(rebuilt) = rebuilt.as_mut() {
            rebuilt.push(validated);
        }
    }
    Ok(match rebuilt {
        Some(items) => Outcome::Valid(Value::tuple(items)),
        None => Outcome::Valid(value.clone()),
    })
}

fn check_adapt(
    cx: &ValidateCx<'_>,
    class: &TypeSpec,
    mode: AdaptMode,
    allow_none: bool,
    value: &Value,
) -> Result<Outcome> {
    if value.is_none() {
        return Ok(accept_if(allow_none, value));
    }
    let implements = |value: &Value| -> Result<Outcome> {
        Ok(accept_if(cx.context.implements(value, class)?, value))
    };
    match cx.context.adapt(value, class, mode) {
        Ok(Some(adapted)) => {
            if mode != AdaptMode::Strict || adapted.is(value) {
                Ok(Outcome::Valid(adapted))
            } else {
                implements(value)
            }
        }
        Ok(None) => {
            if cx.context.implements(value, class)? {
                return Ok(Outcome::Valid(value.clone()));
            }
            let Some(host) = cx.host else {
                return Ok(Outcome::Mismatch);
            };
            match cx.descriptor.default_value_for(host, cx.name) {
                Ok(default) => Ok(Outcome::Valid(default)),
                Err(_) => Ok(Outcome::Mismatch),
            }
        }
        Err(_) => implements(value),
    }
}

/// Standalone validation entry used by the descriptor.
pub(crate) fn run_validator(
    validator: &Validator,
    descriptor: &TraitDescriptor,
    context: &TraitContext,
    host: Option<&Host>,
    name: &str,
    value: &Value,
) -> Result<Value> {
    let cx = ValidateCx {
        descriptor,
        host,
        name,
        context,
    };
    validator.run(&cx, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::TraitKind;
    use crate::error::TraitError;
    use crate::value::Callable;

    fn check(validator: Validator, value: Value) -> Result<Value> {
        let descriptor = TraitDescriptor::new(TraitKind::Trait);
        let context = TraitContext::default();
        run_validator(&validator, &descriptor, &context, None, "x", &value)
    }

    #[test]
    fn int_range_inclusive_bounds() {
        let v = || Validator::int_range(Some(0), Some(10));
        assert_eq!(check(v(), Value::Int(0)).unwrap(), Value::Int(0));
        assert_eq!(check(v(), Value::Int(10)).unwrap(), Value::Int(10));
        assert!(check(v(), Value::Int(11)).unwrap_err().is_validation());
        assert!(check(v(), Value::Float(5.0)).is_err());
    }

    #[test]
    fn float_range_exclusion_bits() {
        let open = || Validator::float_range(Some(0.0), Some(1.0), RangeExclusion::all());
        assert!(check(open(), Value::Float(0.0)).is_err());
        assert!(check(open(), Value::Float(1.0)).is_err());
        assert_eq!(check(open(), Value::Float(0.5)).unwrap(), Value::Float(0.5));
        let closed = Validator::float_range(Some(0.0), Some(1.0), RangeExclusion::empty());
        let out = check(closed, Value::Int(1)).unwrap();
        assert!(matches!(out, Value::Float(x) if x == 1.0));
    }

    #[test]
    fn float_range_rejects_strings() {
        let v = Validator::float_range(None, None, RangeExclusion::empty());
        assert!(check(v, Value::str("1.0")).unwrap_err().is_validation());
    }

    #[test]
    fn enum_and_map_membership() {
        let v = Validator::enumeration([Value::str("a"), Value::str("b")]);
        assert!(check(v.clone(), Value::str("a")).is_ok());
        assert!(check(v, Value::str("c")).is_err());
        let map = Value::dict([(Value::str("on"), Value::Int(1))]).unwrap();
        let out = check(Validator::Map(map.clone()), Value::str("on")).unwrap();
        assert_eq!(out, Value::str("on"));
        assert!(check(Validator::Map(map), Value::list([])).is_err());
    }

    #[test]
    fn prefix_map_substitutes_and_falls_back() {
        let map = Value::dict([(Value::str("yes"), Value::Bool(true))]).unwrap();
        let fallback = Callable::new("fallback", |args| match args[2].as_str() {
            Some(s) if s.starts_with('n') => Ok(Value::Bool(false)),
            _ => Err(TraitError::validation(None, "x", "yes or no", &args[2])),
        });
        let v = Validator::PrefixMap { map, fallback };
        assert_eq!(check(v.clone(), Value::str("yes")).unwrap(), Value::Bool(true));
        assert_eq!(check(v.clone(), Value::str("nope")).unwrap(), Value::Bool(false));
        assert!(check(v, Value::str("maybe")).unwrap_err().is_validation());
    }

    #[test]
    fn complex_tries_alternatives_in_order() {
        let v = Validator::Complex(vec![Validator::Int, Validator::type_of(TypeSpec::Str)]);
        assert_eq!(check(v.clone(), Value::Int(3)).unwrap(), Value::Int(3));
        assert_eq!(check(v.clone(), Value::str("s")).unwrap(), Value::str("s"));
        assert!(check(v, Value::Float(1.5)).unwrap_err().is_validation());
    }

    #[test]
    fn complex_propagates_hard_failures() {
        let boom = Callable::new("boom", |_| Err(TraitError::user("boom")));
        let handler = crate::handler::BasicHandler::new("x")
            .with_validate(boom)
            .into_ref();
        let v = Validator::Complex(vec![Validator::Slow(handler), Validator::Int]);
        let err = check(v, Value::Int(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::User);
    }

    #[test]
    fn complex_float_range_returns_converted_value() {
        let v = Validator::Complex(vec![
            Validator::type_of(TypeSpec::Str),
            Validator::float_range(Some(0.0), None, RangeExclusion::empty()),
        ]);
        let out = check(v, Value::Int(2)).unwrap();
        assert!(matches!(out, Value::Float(x) if x == 2.0));
    }

    #[test]
    fn coerce_accepts_listed_and_converts_convertible() {
        let v = Validator::Coerce {
            ty: TypeSpec::Float,
            accepted: vec![TypeSpec::Int],
            convertible: vec![TypeSpec::Str],
        };
        assert_eq!(check(v.clone(), Value::Int(2)).unwrap(), Value::Int(2));
        assert_eq!(check(v.clone(), Value::str("2.5")).unwrap(), Value::Float(2.5));
        assert!(check(v.clone(), Value::list([])).unwrap_err().is_validation());

        let err = check(v.clone(), Value::str("x")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Value);
        assert!(err.to_string().contains("could not convert string to float"));
        let err = check(Validator::Complex(vec![v, Validator::Int]), Value::str("x")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Value);
    }

    #[test]
    fn cast_converts_or_rejects() {
        assert_eq!(
            check(Validator::Cast(TypeSpec::Int), Value::str("7")).unwrap(),
            Value::Int(7)
        );
        assert!(check(Validator::Cast(TypeSpec::Int), Value::list([])).is_err());
    }

    #[test]
    fn function_failure_becomes_validation_error() {
        let f = Callable::new("f", |_| Err(TraitError::user("nope")));
        let err = check(Validator::Function(f), Value::Int(1)).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn python_failure_propagates_unchanged() {
        let f = Callable::new("f", |_| Err(TraitError::user("nope")));
        let err = check(Validator::Python(f), Value::Int(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::User);
    }

    #[test]
    fn property_validator_arities() {
        let echo_len = Callable::new("len", |args| Ok(Value::Int(args.len() as i64)));
        for (arity, expected) in [(Arity::Zero, 0), (Arity::One, 1), (Arity::Two, 2), (Arity::Three, 3)] {
            let v = Validator::Property {
                arity,
                callable: echo_len.clone(),
            };
            assert_eq!(check(v, Value::None).unwrap(), Value::Int(expected));
        }
    }

    #[test]
    fn int_and_float_coercions() {
        assert_eq!(check(Validator::Int, Value::Bool(true)).unwrap(), Value::Int(1));
        assert!(check(Validator::Int, Value::Float(1.0)).unwrap_err().is_validation());
        let out = check(Validator::Float, Value::Int(3)).unwrap();
        assert!(matches!(out, Value::Float(x) if x == 3.0));
    }

    #[test]
    fn callable_check() {
        let f = Value::Callable(Callable::new("f", |_| Ok(Value::None)));
        assert!(check(Validator::Callable { allow_none: false }, f).is_ok());
        assert!(check(Validator::Callable { allow_none: false }, Value::None).is_err());
        assert!(check(Validator::Callable { allow_none: true }, Value::None).is_ok());
    }

    #[test]
    fn tuple_of_preserves_identity_when_unchanged() {
        let slot = TraitDescriptor::new(TraitKind::Trait);
        slot.set_validator(Some(Validator::Int));
        let v = Validator::TupleOf(vec![slot.clone(), slot]);
        let value = Value::tuple([Value::Int(1), Value::Int(2)]);
        let out = check(v.clone(), value.clone()).unwrap();
        assert!(out.is(&value));

        let changed = Value::tuple([Value::Int(1), Value::Bool(true)]);
        let out = check(v.clone(), changed.clone()).unwrap();
        assert!(!out.is(&changed));
        assert_eq!(out, Value::tuple([Value::Int(1), Value::Int(1)]));

        assert!(check(v, Value::tuple([Value::Int(1)])).is_err());
    }

    #[test]
    fn adapt_without_adapter_falls_back_to_instance_check() {
        let v = Validator::Adapt {
            class: TypeSpec::Int,
            mode: AdaptMode::Adapt,
            allow_none: false,
        };
        assert!(check(v.clone(), Value::Int(1)).is_ok());
        assert!(check(v.clone(), Value::str("1")).is_err());
        assert!(check(v, Value::None).is_err());
    }

    #[test]
    fn adapt_strict_mode_requires_identity() {
        let context = TraitContext::builder()
            .adapt(|value, _, _| Ok(Some(Value::list([value.clone()]))))
            .build();
        let descriptor = TraitDescriptor::new(TraitKind::Trait);
        let strict = Validator::Adapt {
            class: TypeSpec::List,
            mode: AdaptMode::Strict,
            allow_none: true,
        };
        let err = run_validator(&strict, &descriptor, &context, None, "x", &Value::Int(1));
        assert!(err.is_err());
        let loose = Validator::Adapt {
            class: TypeSpec::List,
            mode: AdaptMode::Adapt,
            allow_none: true,
        };
        let out = run_validator(&loose, &descriptor, &context, None, "x", &Value::Int(1)).unwrap();
        assert_eq!(out, Value::list([Value::Int(1)]));
        let none = run_validator(&loose, &descriptor, &context, None, "x", &Value::None).unwrap();
        assert!(none.is_none());
    }
}
