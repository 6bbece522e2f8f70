#![forbid(unsafe_code)]

//! The validator family and its tuple payload encoding.
//!
//! A validator is installed from a payload value: either a user callable, or
//! a tuple whose first element is the validator tag (0–22) followed by the
//! validator's parameters. The payload is parsed once into a [`Validator`];
//! [`Validator::payload`] reproduces the tuple form for introspection and
//! serialized state.
//!
//! | tag | payload |
//! |---|---|
//! | 0 | `(0, type)` or `(0, None, type)` to also accept `None` |
//! | 1 | `(1, class_or_tuple)` or `(1, None, class_or_tuple)` |
//! | 2 | `(2,)` or `(2, None)` |
//! | 3 | `(3, low, high, exclude_mask)` integer range |
//! | 4 | `(4, low, high, exclude_mask)` float range |
//! | 5 | `(5, sequence)` |
//! | 6 | `(6, dict)` |
//! | 7 | `(7, (sub_payload, ...))` |
//! | 8 | `(8, handler)`, complex only |
//! | 9 | `(9, (trait, ...))` |
//! | 10 | `(10, dict, fallback_callable)` |
//! | 11 | `(11, type, accepted..., None, convertible...)` |
//! | 12 | `(12, type)` |
//! | 13 | `(13, callable)` |
//! | 19 | `(19, class, mode, allow_none)` |
//! | 20 | `(20,)` |
//! | 21 | `(21,)` |
//! | 22 | `(22,)` or `(22, allow_none)` |
//!
//! Tags 14–18 are not tuples: 14 is a bare callable installed through
//! `set_validate`, 15–18 are the property validators installed by
//! `property()`.

use crate::context::AdaptMode;
use crate::descriptor::TraitDescriptor;
use crate::descriptor::dispatch::Arity;
use crate::error::{Result, TraitError};
use crate::handler::HandlerRef;
use crate::types::TypeSpec;
use crate::value::{Callable, Value};

bitflags::bitflags! {
    /// Which range endpoints are open.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RangeExclusion: u8 {
        const LOW  = 0b01;
        const HIGH = 0b10;
    }
}

#[derive(Debug, Clone)]
pub enum Validator {
    Type {
        ty: TypeSpec,
        or_none: bool,
    },
    Instance {
        classes: Vec<TypeSpec>,
        tuple_form: bool,
        or_none: bool,
    },
    SelfType {
        or_none: bool,
    },
    IntRange {
        low: Option<i64>,
        high: Option<i64>,
        exclude: RangeExclusion,
    },
    FloatRange {
        low: Option<f64>,
        high: Option<f64>,
        exclude: RangeExclusion,
    },
    Enum(Value),
    Map(Value),
    Complex(Vec<Validator>),
    Slow(HandlerRef),
    TupleOf(Vec<TraitDescriptor>),
    PrefixMap {
        map: Value,
        fallback: Callable,
    },
    Coerce {
        ty: TypeSpec,
        accepted: Vec<TypeSpec>,
        convertible: Vec<TypeSpec>,
    },
    Cast(TypeSpec),
    Function(Callable),
    Python(Callable),
    Property {
        arity: Arity,
        callable: Callable,
    },
    Adapt {
        class: TypeSpec,
        mode: AdaptMode,
        allow_none: bool,
    },
    Int,
    Float,
    Callable {
        allow_none: bool,
    },
}

impl Validator {
    /// Tag of this validator in the validator table.
    #[must_use]
    pub fn index(&self) -> i64 {
        match self {
            Self::Type { .. } => 0,
            Self::Instance { .. } => 1,
            Self::SelfType { .. } => 2,
            Self::IntRange { .. } => 3,
            Self::FloatRange { .. } => 4,
            Self::Enum(_) => 5,
            Self::Map(_) => 6,
            Self::Complex(_) => 7,
            Self::Slow(_) => 8,
            Self::TupleOf(_) => 9,
            Self::PrefixMap { .. } => 10,
            Self::Coerce { .. } => 11,
            Self::Cast(_) => 12,
            Self::Function(_) => 13,
            Self::Python(_) => 14,
            Self::Property { arity, .. } => 15 + arity.index(),
            Self::Adapt { .. } => 19,
            Self::Int => 20,
            Self::Float => 21,
            Self::Callable { .. } => 22,
        }
    }

    /// Parse a `set_validate` payload.
    ///
    /// # Errors
    ///
    /// "The argument must be a tuple or callable." for malformed payloads.
    pub fn from_payload(payload: &Value) -> Result<Self> {
        match payload {
            Value::Callable(callable) => Ok(Self::Python(callable.clone())),
            Value::Tuple(items) => {
                let tag = tag_of(items)?;
                if tag == 8 {
                    return Err(bad_payload());
                }
                parse_tagged(tag, items)
            }
            _ => Err(bad_payload()),
        }
    }

    fn from_complex_item(item: &Value) -> Result<Self> {
        let items = item.as_tuple().ok_or_else(bad_payload)?;
        let tag = tag_of(items)?;
        match tag {
            7 | 14..=18 => Err(TraitError::value_error(format!(
                "Unsupported validator kind {tag} inside a complex validator."
            ))),
            _ => parse_tagged(tag, items),
        }
    }

    /// The payload this validator was (or could have been) installed from.
    #[must_use]
    pub fn payload(&self) -> Value {
        let tag = Value::Int(self.index());
        match self {
            Self::Type { ty, or_none } => {
                if *or_none {
                    Value::tuple([tag, Value::None, Value::Type(ty.clone())])
                } else {
                    Value::tuple([tag, Value::Type(ty.clone())])
                }
            }
            Self::Instance {
                classes,
                tuple_form,
                or_none,
            } => {
                let class_info = if *tuple_form {
                    Value::tuple(classes.iter().cloned().map(Value::Type))
                } else {
                    classes.first().cloned().map_or(Value::None, Value::Type)
                };
                if *or_none {
                    Value::tuple([tag, Value::None, class_info])
                } else {
                    Value::tuple([tag, class_info])
                }
            }
            Self::SelfType { or_none } => {
                if *or_none {
                    Value::tuple([tag, Value::None])
                } else {
                    Value::tuple([tag])
                }
            }
            Self::IntRange { low, high, exclude } => Value::tuple([
                tag,
                low.map_or(Value::None, Value::Int),
                high.map_or(Value::None, Value::Int),
                Value::Int(i64::from(exclude.bits())),
            ]),
            Self::FloatRange { low, high, exclude } => Value::tuple([
                tag,
                low.map_or(Value::None, Value::Float),
                high.map_or(Value::None, Value::Float),
                Value::Int(i64::from(exclude.bits())),
            ]),
            Self::Enum(values) => Value::tuple([tag, values.clone()]),
            Self::Map(map) => Value::tuple([tag, map.clone()]),
            Self::Complex(validators) => {
                Value::tuple([tag, Value::tuple(validators.iter().map(Self::payload))])
            }
            Self::Slow(handler) => Value::tuple([tag, Value::Handler(handler.clone())]),
            Self::TupleOf(traits) => {
                Value::tuple([tag, Value::tuple(traits.iter().cloned().map(Value::Trait))])
            }
            Self::PrefixMap { map, fallback } => {
                Value::tuple([tag, map.clone(), Value::Callable(fallback.clone())])
            }
            Self::Coerce {
                ty,
                accepted,
                convertible,
            } => {
                let mut items = vec![tag, Value::Type(ty.clone())];
                items.extend(accepted.iter().cloned().map(Value::Type));
                if !convertible.is_empty() {
                    items.push(Value::None);
                    items.extend(convertible.iter().cloned().map(Value::Type));
                }
                Value::tuple(items)
            }
            Self::Cast(ty) => Value::tuple([tag, Value::Type(ty.clone())]),
            Self::Function(callable) => Value::tuple([tag, Value::Callable(callable.clone())]),
            Self::Python(callable) | Self::Property { callable, .. } => {
                Value::Callable(callable.clone())
            }
            Self::Adapt {
                class,
                mode,
                allow_none,
            } => Value::tuple([
                tag,
                Value::Type(class.clone()),
                Value::Int(mode.index()),
                Value::Bool(*allow_none),
            ]),
            Self::Int | Self::Float => Value::tuple([tag]),
            Self::Callable { allow_none } => Value::tuple([tag, Value::Bool(*allow_none)]),
        }
    }

    // ─── Convenience constructors ───────────────────────────────────────

    #[must_use]
    pub fn int_range(low: Option<i64>, high: Option<i64>) -> Self {
        Self::IntRange {
            low,
            high,
            exclude: RangeExclusion::empty(),
        }
    }

    #[must_use]
    pub fn float_range(low: Option<f64>, high: Option<f64>, exclude: RangeExclusion) -> Self {
        Self::FloatRange { low, high, exclude }
    }

    #[must_use]
    pub fn instance_of(ty: TypeSpec) -> Self {
        Self::Instance {
            classes: vec![ty],
            tuple_form: false,
            or_none: false,
        }
    }

    #[must_use]
    pub fn type_of(ty: TypeSpec) -> Self {
        Self::Type { ty, or_none: false }
    }

    #[must_use]
    pub fn enumeration(values: impl IntoIterator<Item = Value>) -> Self {
        Self::Enum(Value::tuple(values))
    }
}

fn bad_payload() -> TraitError {
    TraitError::type_error("The argument must be a tuple or callable.")
}

fn tag_of(items: &[Value]) -> Result<i64> {
    match items.first() {
        Some(Value::Int(tag)) => Ok(*tag),
        _ => Err(bad_payload()),
    }
}

fn type_at(items: &[Value], index: usize) -> Result<TypeSpec> {
    items
        .get(index)
        .and_then(Value::as_type)
        .cloned()
        .ok_or_else(bad_payload)
}

fn class_info(value: &Value) -> Result<(Vec<TypeSpec>, bool)> {
    match value {
        Value::Type(ty) => Ok((vec![ty.clone()], false)),
        Value::Tuple(items) => {
            let classes = items
                .iter()
                .map(|item| item.as_type().cloned().ok_or_else(bad_payload))
                .collect::<Result<Vec<_>>>()?;
            Ok((classes, true))
        }
        _ => Err(bad_payload()),
    }
}

fn int_bound(value: &Value) -> Result<Option<i64>> {
    match value {
        Value::None => Ok(None),
        Value::Int(n) => Ok(Some(*n)),
        _ => Err(bad_payload()),
    }
}

fn float_bound(value: &Value) -> Result<Option<f64>> {
    match value {
        Value::None => Ok(None),
        other => other.as_f64().map(Some).ok_or_else(bad_payload),
    }
}

fn exclusion(items: &[Value]) -> Result<RangeExclusion> {
    match items.get(3) {
        None => Ok(RangeExclusion::empty()),
        Some(mask) => {
            let bits = mask.as_int().ok_or_else(bad_payload)?;
            Ok(RangeExclusion::from_bits_truncate(bits as u8))
        }
    }
}

fn parse_tagged(tag: i64, items: &[Value]) -> Result<Validator> {
    let n = items.len();
    Ok(match tag {
        0 if n == 2 || n == 3 => Validator::Type {
            ty: type_at(items, n - 1)?,
            or_none: n == 3,
        },
        1 if n == 2 || n == 3 => {
            let (classes, tuple_form) = class_info(&items[n - 1])?;
            Validator::Instance {
                classes,
                tuple_form,
                or_none: n == 3,
            }
        }
        2 if n == 1 || n == 2 => Validator::SelfType { or_none: n == 2 },
        3 if n == 3 || n == 4 => Validator::IntRange {
            low: int_bound(&items[1])?,
            high: int_bound(&items[2])?,
            exclude: exclusion(items)?,
        },
        4 if n == 3 || n == 4 => Validator::FloatRange {
            low: float_bound(&items[1])?,
            high: float_bound(&items[2])?,
            exclude: exclusion(items)?,
        },
        5 if n == 2 => Validator::Enum(items[1].clone()),
        6 if n == 2 && matches!(items[1], Value::Dict(_)) => Validator::Map(items[1].clone()),
        7 if n == 2 => {
            let subs = items[1].as_tuple().ok_or_else(bad_payload)?;
            Validator::Complex(
                subs.iter()
                    .map(Validator::from_complex_item)
                    .collect::<Result<Vec<_>>>()?,
            )
        }
        8 if n == 2 => match &items[1] {
            Value::Handler(handler) => Validator::Slow(handler.clone()),
            _ => return Err(bad_payload()),
        },
        9 if n == 2 => {
            let slots = items[1].as_tuple().ok_or_else(bad_payload)?;
            Validator::TupleOf(
                slots
                    .iter()
                    .map(|slot| {
                        slot.as_trait().cloned().ok_or_else(|| {
                            TraitError::internal("Non-trait found in tuple validator.")
                        })
                    })
                    .collect::<Result<Vec<_>>>()?,
            )
        }
        10 if n == 3 && matches!(items[1], Value::Dict(_)) => Validator::PrefixMap {
            map: items[1].clone(),
            fallback: items[2].as_callable().cloned().ok_or_else(bad_payload)?,
        },
        11 if n >= 2 => {
            let ty = type_at(items, 1)?;
            let mut accepted = Vec::new();
            let mut convertible = Vec::new();
            let mut after_separator = false;
            for item in &items[2..] {
                match item {
                    Value::None if !after_separator => after_separator = true,
                    Value::Type(t) if after_separator => convertible.push(t.clone()),
                    Value::Type(t) => accepted.push(t.clone()),
                    _ => return Err(bad_payload()),
                }
            }
            Validator::Coerce {
                ty,
                accepted,
                convertible,
            }
        }
        12 if n == 2 => Validator::Cast(type_at(items, 1)?),
        13 if n == 2 => Validator::Function(items[1].as_callable().cloned().ok_or_else(bad_payload)?),
        19 if n == 4 => Validator::Adapt {
            class: type_at(items, 1)?,
            mode: AdaptMode::from_index(items[2].as_int().ok_or_else(bad_payload)?)?,
            allow_none: items[3].truthy(),
        },
        20 if n == 1 => Validator::Int,
        21 if n == 1 => Validator::Float,
        22 if n == 1 || n == 2 => Validator::Callable {
            allow_none: items.get(1).is_some_and(Value::truthy),
        },
        _ => return Err(bad_payload()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(n: i64) -> Value {
        Value::Int(n)
    }

    #[test]
    fn callable_payload_is_python_validator() {
        let f = Callable::new("check", |args| Ok(args[2].clone()));
        let v = Validator::from_payload(&Value::Callable(f.clone())).unwrap();
        assert_eq!(v.index(), 14);
        assert!(v.payload().is(&Value::Callable(f)));
    }

    #[test]
    fn non_tuple_payload_is_rejected() {
        let err = Validator::from_payload(&Value::Int(3)).unwrap_err();
        assert_eq!(err.to_string(), "The argument must be a tuple or callable.");
        assert!(Validator::from_payload(&Value::tuple([])).is_err());
        assert!(Validator::from_payload(&Value::tuple([int(99)])).is_err());
    }

    #[test]
    fn type_payload_forms() {
        let plain = Validator::from_payload(&Value::tuple([int(0), Value::Type(TypeSpec::Int)]))
            .unwrap();
        assert!(matches!(plain, Validator::Type { or_none: false, .. }));
        let with_none = Validator::from_payload(&Value::tuple([
            int(0),
            Value::None,
            Value::Type(TypeSpec::Int),
        ]))
        .unwrap();
        assert!(matches!(with_none, Validator::Type { or_none: true, .. }));
        assert_eq!(with_none.payload().as_tuple().unwrap().len(), 3);
    }

    #[test]
    fn instance_accepts_class_tuple() {
        let payload = Value::tuple([
            int(1),
            Value::tuple([Value::Type(TypeSpec::Int), Value::Type(TypeSpec::Str)]),
        ]);
        let v = Validator::from_payload(&payload).unwrap();
        match &v {
            Validator::Instance {
                classes,
                tuple_form,
                ..
            } => {
                assert_eq!(classes.len(), 2);
                assert!(tuple_form);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(v.payload(), payload);
    }

    #[test]
    fn range_payload_keeps_mask() {
        let payload = Value::tuple([int(4), Value::Float(0.0), Value::None, int(1)]);
        let v = Validator::from_payload(&payload).unwrap();
        match v {
            Validator::FloatRange { low, high, exclude } => {
                assert_eq!(low, Some(0.0));
                assert_eq!(high, None);
                assert_eq!(exclude, RangeExclusion::LOW);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn coerce_splits_on_none_separator() {
        let payload = Value::tuple([
            int(11),
            Value::Type(TypeSpec::Float),
            Value::Type(TypeSpec::Int),
            Value::None,
            Value::Type(TypeSpec::Str),
        ]);
        let v = Validator::from_payload(&payload).unwrap();
        match &v {
            Validator::Coerce {
                accepted,
                convertible,
                ..
            } => {
                assert_eq!(accepted, &vec![TypeSpec::Int]);
                assert_eq!(convertible, &vec![TypeSpec::Str]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(v.payload(), payload);
    }

    #[test]
    fn complex_rejects_nested_complex_and_callables() {
        let nested = Value::tuple([
            int(7),
            Value::tuple([Value::tuple([int(7), Value::tuple([])])]),
        ]);
        assert!(Validator::from_payload(&nested).is_err());
        let ok = Value::tuple([
            int(7),
            Value::tuple([Value::tuple([int(20)]), Value::tuple([int(21)])]),
        ]);
        let v = Validator::from_payload(&ok).unwrap();
        assert_eq!(v.index(), 7);
        assert_eq!(v.payload(), ok);
    }

    #[test]
    fn slow_is_complex_only() {
        let handler: HandlerRef = crate::handler::BasicHandler::new("x").into_ref();
        let payload = Value::tuple([int(8), Value::Handler(handler)]);
        assert!(Validator::from_payload(&payload).is_err());
        let complex = Value::tuple([int(7), Value::tuple([payload])]);
        assert!(Validator::from_payload(&complex).is_ok());
    }

    #[test]
    fn tuple_of_requires_traits() {
        let payload = Value::tuple([int(9), Value::tuple([int(1)])]);
        let err = Validator::from_payload(&payload).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Internal);
    }

    #[test]
    fn adapt_mode_is_validated() {
        let payload = Value::tuple([int(19), Value::Type(TypeSpec::Int), int(7), Value::Bool(false)]);
        assert!(Validator::from_payload(&payload).is_err());
    }

    #[test]
    fn callable_check_payload() {
        let v = Validator::from_payload(&Value::tuple([int(22)])).unwrap();
        assert!(matches!(v, Validator::Callable { allow_none: false }));
        let v = Validator::from_payload(&Value::tuple([int(22), Value::Bool(true)])).unwrap();
        assert!(matches!(v, Validator::Callable { allow_none: true }));
    }

    mod payload_props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn int_range_payload_round_trips(
                low in proptest::option::of(-1000i64..0),
                high in proptest::option::of(0i64..1000),
            ) {
                let v = Validator::int_range(low, high);
                let back = Validator::from_payload(&v.payload()).unwrap();
                prop_assert_eq!(back.index(), v.index());
                prop_assert_eq!(back.payload(), v.payload());
            }

            #[test]
            fn enumeration_payload_round_trips(items in proptest::collection::vec(any::<i64>(), 1..8)) {
                let v = Validator::enumeration(items.into_iter().map(Value::Int));
                let back = Validator::from_payload(&v.payload()).unwrap();
                prop_assert_eq!(back.payload(), v.payload());
            }
        }
    }
}
