//! mcc-util - Core Utilities and Foundation Types
//!
//! This crate provides the foundation shared by every stage of the mcc
//! pipeline:
//!
//! - [`Symbol`]: interned strings for identifiers, file names and labels.
//!   Comparison and hashing are O(1) integer operations; the backing text
//!   lives for the duration of the process.
//! - [`IndexVec`] / [`Idx`]: vectors indexed by a dedicated id type. The
//!   type and AST arenas are built on these, which keeps node references as
//!   plain `Copy` ids and rules out the reference cycles a shared-pointer
//!   AST would invite (macro bodies referring to tokens referring back to
//!   macro names).
//! - [`Pos`]: `(file, row, col)` source positions carried by every token
//!   and AST node.
//! - [`Handler`] / [`Context`]: diagnostics and the per-invocation mutable
//!   state (label counters, warning switch). One `Context` is created per
//!   compiler invocation and threaded through the pipeline explicitly; no
//!   stage keeps global mutable state.
//! - UTF-8/16/32 transcoding used by the lexer and by string literal
//!   re-encoding at AST construction time.

pub mod context;
pub mod diag;
pub mod encode;
pub mod error;
pub mod index_vec;
pub mod pos;
pub mod quote;
pub mod symbol;

pub use context::Context;
pub use diag::Handler;
pub use error::{Fatal, Result};
pub use index_vec::{Idx, IndexVec};
pub use pos::Pos;
pub use symbol::Symbol;
