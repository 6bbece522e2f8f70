#![forbid(unsafe_code)]

//! Core: trait descriptors, host objects, validation, delegation, and change
//! notification.
//!
//! A [`HostClass`] maps attribute names to [`TraitDescriptor`]s. Reads and
//! writes on a [`Host`] are routed through the descriptor found for the
//! name, which decides how the value is produced, checked, stored, and
//! announced to [`Notifier`]s.

pub mod class;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod flags;
pub mod handler;
pub mod host;
pub mod notify;
pub mod persist;
pub mod state;
pub mod trait_value;
pub mod types;
pub mod value;

pub use class::{DefaultBehavior, HostBehavior, HostClass, HostClassBuilder};
pub use context::{AdaptMode, CollectionBinding, TraitContext};
pub use descriptor::{DefaultValueKind, TraitDescriptor, TraitKind, Validator};
pub use error::{ErrorKind, Result, TraitError};
pub use flags::{ComparisonMode, HostFlags, TraitFlags};
pub use handler::{BasicHandler, HandlerRef, TraitHandler};
pub use host::{Host, TraitLookup};
pub use notify::{ChangeEvent, Notifier};
pub use persist::StateRegistry;
pub use state::TraitState;
pub use trait_value::{TraitValue, TraitValueSource};
pub use types::TypeSpec;
pub use value::{Callable, Dict, Value};
