#![forbid(unsafe_code)]

//! Descriptor and host flag sets, and the comparison-mode mapping.
//!
//! Bit positions are part of the serialized descriptor state and must not
//! change.

use crate::error::{Result, TraitError};

bitflags::bitflags! {
    /// Per-descriptor behavior bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TraitFlags: u32 {
        /// Get/set handlers come from the property tables.
        const PROPERTY                     = 0x0001;
        /// Delegated writes land on the delegate instead of the owner.
        const MODIFY_DELEGATE              = 0x0002;
        /// Changes are detected by identity only.
        const OBJECT_IDENTITY              = 0x0004;
        /// Store the pre-validation value.
        const SETATTR_ORIGINAL_VALUE       = 0x0008;
        /// Pass the pre-validation value to the post-set hook.
        const POST_SETATTR_ORIGINAL_VALUE  = 0x0010;
        /// Accepts `TraitValue` assignment.
        const VALUE_ALLOWED                = 0x0020;
        /// Descriptor installed from a `TraitValue` that tracks the host.
        const VALUE_PROPERTY               = 0x0040;
        /// Has a mapped companion; default materialization skips post-set.
        const IS_MAPPED                    = 0x0080;
        /// Every write counts as a change.
        const NO_VALUE_TEST                = 0x0100;
    }
}

bitflags::bitflags! {
    /// Per-host state bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct HostFlags: u8 {
        /// Construction completed.
        const INITED      = 0b0000_0001;
        /// All notifications for this host are suppressed.
        const NO_NOTIFY   = 0b0000_0010;
        /// Assigning this host elsewhere fires no notifications.
        const VETO_NOTIFY = 0b0000_0100;
    }
}

/// When a write counts as a change worth notifying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ComparisonMode {
    /// Every write is a change.
    None,
    /// A change occurs when the new object is not the old object.
    Identity,
    /// A change occurs when the values are neither identical nor equal.
    #[default]
    Equality,
}

impl ComparisonMode {
    const MASK: TraitFlags = TraitFlags::NO_VALUE_TEST.union(TraitFlags::OBJECT_IDENTITY);

    /// Decode from descriptor flags.
    #[must_use]
    pub fn from_flags(flags: TraitFlags) -> Self {
        if flags.contains(TraitFlags::NO_VALUE_TEST) {
            Self::None
        } else if flags.contains(TraitFlags::OBJECT_IDENTITY) {
            Self::Identity
        } else {
            Self::Equality
        }
    }

    /// Replace the comparison bits of `flags` with this mode.
    #[must_use]
    pub fn apply(self, flags: TraitFlags) -> TraitFlags {
        let cleared = flags.difference(Self::MASK);
        match self {
            Self::None => cleared | TraitFlags::NO_VALUE_TEST,
            Self::Identity => cleared | TraitFlags::OBJECT_IDENTITY,
            Self::Equality => cleared,
        }
    }

    /// Integer form: 0 none, 1 identity, 2 equality.
    #[must_use]
    pub fn index(self) -> i64 {
        match self {
            Self::None => 0,
            Self::Identity => 1,
            Self::Equality => 2,
        }
    }

    /// # Errors
    ///
    /// Values outside 0..=2 are rejected.
    pub fn from_index(index: i64) -> Result<Self> {
        match index {
            0 => Ok(Self::None),
            1 => Ok(Self::Identity),
            2 => Ok(Self::Equality),
            other => Err(TraitError::value_error(format!(
                "The comparison mode must be 0..2, but {other} was specified."
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_bits_are_stable() {
        assert_eq!(TraitFlags::PROPERTY.bits(), 0x1);
        assert_eq!(TraitFlags::IS_MAPPED.bits(), 0x80);
        assert_eq!(TraitFlags::NO_VALUE_TEST.bits(), 0x100);
        assert_eq!(HostFlags::VETO_NOTIFY.bits(), 0x4);
    }

    #[test]
    fn comparison_mode_round_trips_through_flags() {
        for mode in [ComparisonMode::None, ComparisonMode::Identity, ComparisonMode::Equality] {
            let flags = mode.apply(TraitFlags::PROPERTY | TraitFlags::NO_VALUE_TEST);
            assert_eq!(ComparisonMode::from_flags(flags), mode);
            assert!(flags.contains(TraitFlags::PROPERTY));
        }
    }

    #[test]
    fn equality_clears_both_bits() {
        let flags = ComparisonMode::Equality
            .apply(TraitFlags::NO_VALUE_TEST | TraitFlags::OBJECT_IDENTITY);
        assert!(flags.is_empty());
    }

    #[test]
    fn comparison_index_mapping() {
        assert_eq!(ComparisonMode::from_index(0).unwrap(), ComparisonMode::None);
        assert_eq!(ComparisonMode::from_index(1).unwrap(), ComparisonMode::Identity);
        assert_eq!(ComparisonMode::Equality.index(), 2);
        assert!(ComparisonMode::from_index(3).is_err());
    }
}
