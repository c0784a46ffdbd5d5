//! Behavioral flags for records and diff/sync operations.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Flags set on a model type or record instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ModelFlags(u8);

impl ModelFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// Never render diffs for this record (or its subtree) and never
    /// change it when synchronizing.
    pub const IGNORE: Self = Self(0b01);
    /// When deleting this record, discard its descendants from the store
    /// without invoking their own delete hooks.
    pub const SKIP_CHILDREN_ON_DELETE: Self = Self(0b10);

    const NAMES: [(Self, &'static str); 2] = [
        (Self::IGNORE, "IGNORE"),
        (Self::SKIP_CHILDREN_ON_DELETE, "SKIP_CHILDREN_ON_DELETE"),
    ];

    /// Creates flags from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns true if every flag in `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if no flag is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Flags passed to a diff or sync call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SyncFlags(u8);

impl SyncFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// Keep applying the rest of the diff when a lifecycle hook fails;
    /// only the failing element's subtree is abandoned.
    pub const CONTINUE_ON_FAILURE: Self = Self(0b0001);
    /// Ignore objects that only exist in the source. Nothing is created.
    pub const SKIP_UNMATCHED_SRC: Self = Self(0b0010);
    /// Ignore objects that only exist in the destination. Nothing is deleted.
    pub const SKIP_UNMATCHED_DST: Self = Self(0b0100);
    /// Both `SKIP_UNMATCHED_SRC` and `SKIP_UNMATCHED_DST`.
    pub const SKIP_UNMATCHED_BOTH: Self = Self(0b0110);
    /// Log every record visited during sync, even unchanged ones.
    pub const LOG_UNCHANGED_RECORDS: Self = Self(0b1000);

    const NAMES: [(Self, &'static str); 4] = [
        (Self::CONTINUE_ON_FAILURE, "CONTINUE_ON_FAILURE"),
        (Self::SKIP_UNMATCHED_SRC, "SKIP_UNMATCHED_SRC"),
        (Self::SKIP_UNMATCHED_DST, "SKIP_UNMATCHED_DST"),
        (Self::LOG_UNCHANGED_RECORDS, "LOG_UNCHANGED_RECORDS"),
    ];

    /// Creates flags from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns true if every flag in `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if no flag is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

macro_rules! impl_flag_ops {
    ($flags:ty) => {
        impl BitOr for $flags {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl BitOrAssign for $flags {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }

        impl fmt::Display for $flags {
            /// Renders set flags as `A|B`, or `NONE`.
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_empty() {
                    return f.write_str("NONE");
                }
                let mut first = true;
                for (flag, name) in Self::NAMES {
                    if self.contains(flag) {
                        if !first {
                            f.write_str("|")?;
                        }
                        f.write_str(name)?;
                        first = false;
                    }
                }
                Ok(())
            }
        }
    };
}

impl_flag_ops!(ModelFlags);
impl_flag_ops!(SyncFlags);
