#![forbid(unsafe_code)]

//! ctrait public facade crate.
//!
//! Re-exports the engine and offers a prelude with the types most hosts
//! need.

pub use ctrait_core::*;

pub mod prelude {
    pub use ctrait_core as core;
    pub use ctrait_core::{
        Callable, ComparisonMode, DefaultValueKind, Host, HostBehavior, HostClass, Notifier,
        Result, TraitContext, TraitDescriptor, TraitError, TraitKind, TraitLookup, TraitValue,
        Validator, Value,
    };
}
