//! Identifier types for the SSA program model
//!
//! Each id is a `u32` index into one of the program's arenas. Keeping them
//! as distinct newtypes stops a block index from being used as a value id.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to define ID types with consistent behavior
macro_rules! define_id_type {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub(crate) u32);

        impl $name {
            /// Create a new ID from a raw u32 value
            pub const fn from_raw(raw: u32) -> Self {
                Self(raw)
            }

            /// Get the raw u32 value of this ID
            pub const fn as_raw(self) -> u32 {
                self.0
            }

            /// Arena index of this ID
            pub const fn index(self) -> usize {
                self.0 as usize
            }

            /// Check if this ID is valid (not the sentinel value)
            pub const fn is_valid(self) -> bool {
                self.0 != u32::MAX
            }

            /// Get an invalid/null sentinel value
            pub const fn invalid() -> Self {
                Self(u32::MAX)
            }

            pub(crate) fn from_index(index: usize) -> Self {
                Self(u32::try_from(index).unwrap_or(u32::MAX))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::invalid()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_valid() {
                    write!(f, "{}({})", stringify!($name), self.0)
                } else {
                    write!(f, "{}(<invalid>)", stringify!($name))
                }
            }
        }

        impl From<u32> for $name {
            fn from(raw: u32) -> Self {
                Self::from_raw(raw)
            }
        }
    };
}

define_id_type!(
    /// An SSA value or instruction
    ValueId
);

define_id_type!(
    /// A function, method or closure body
    FunctionId
);

define_id_type!(
    /// A basic block, indexed within its function
    BlockId
);

define_id_type!(
    /// An entry of the type table
    TypeId
);
