//! mcc-lex - Source reading and tokenization
//!
//! The first two stages of the pipeline:
//!
//! 1. [`reader::FileSet`]: character-level input over a stack of files and
//!    in-memory buffers. Handles `\r`/`\r\n` normalisation, line splicing
//!    (`\` immediately before a newline), position tracking and a
//!    reader-level pushback buffer so ungot characters survive frame
//!    changes.
//! 2. [`lexer::Lexer`]: turns characters into C11 preprocessing tokens.
//!    Whitespace and comments collapse into the `leading_space` flag of the
//!    following token; newlines are kept as tokens because the preprocessor
//!    needs them to delimit directives.
//!
//! Keywords do not exist at this level. The lexer produces identifiers and
//! punctuators only; identifiers whose spelling matches a keyword are
//! converted by the preprocessor on its way out, since a macro may well be
//! named `inline`.

pub mod keywords;
pub mod lexer;
pub mod reader;
pub mod token;

pub use keywords::{keyword_from_str, Keyword};
pub use lexer::Lexer;
pub use reader::FileSet;
pub use token::{Encoding, HideSet, Punct, Token, TokenKind};
