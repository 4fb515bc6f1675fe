//! mcc-sem - The type system
//!
//! Kind-tagged types stored in an arena and referred to by [`TypeId`].
//! Composite types point at their constituents through ids, which makes
//! self-referential structs (`struct N { struct N *next; }`) representable
//! without reference cycles; compatibility checking short-circuits at
//! pointer boundaries when comparing record field lists for the same
//! reason.
//!
//! Sizes follow LP64: char 1, short 2, int 4, long 8, long long 8, float
//! 4, double 8, pointer 8, enum 4. `long double` is IEEE binary64 here,
//! identical to double.

pub mod layout;
pub mod types;

pub use layout::{check_flexible_array, layout_struct, layout_union, LayoutError};
pub use types::{Field, Qualifiers, Storage, Type, TypeArena, TypeId, TypeKind};
