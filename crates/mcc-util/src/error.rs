//! Shared error types.
//!
//! Recoverable problems (a stray token, a type mismatch) are reported
//! through the [`Handler`](crate::Handler) and parsing continues; the error
//! type here is reserved for conditions the pipeline cannot continue past:
//! I/O failures, malformed directives, an invalid token reaching the
//! preprocessor exit.

use thiserror::Error;

/// A fatal condition. The diagnostic has already been printed through the
/// handler by the time a `Fatal` is constructed; the message is kept for
/// the driver's top-level report.
#[derive(Debug, Error)]
pub enum Fatal {
    /// File open / include resolution failure.
    #[error("{0}")]
    Io(String),

    /// Lexing produced an invalid token and draining finished.
    #[error("invalid token in input")]
    InvalidToken,

    /// A preprocessor directive could not be processed.
    #[error("{0}")]
    Preprocess(String),

    /// A construct the parser cannot recover from.
    #[error("{0}")]
    Parse(String),

    /// Broken invariant on a well-typed AST; a compiler bug.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias used across the pipeline.
pub type Result<T> = std::result::Result<T, Fatal>;
