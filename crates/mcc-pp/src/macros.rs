//! Macro definitions.

use mcc_lex::Token;

/// A macro definition. Function-like macro bodies contain
/// `TokenKind::MacroParam` placeholders where parameters occurred.
#[derive(Clone, Debug)]
pub enum Macro {
    /// `#define NAME body...`
    Object { body: Vec<Token> },
    /// `#define NAME(params) body...`; `nargs` counts the variadic slot.
    Function {
        body: Vec<Token>,
        nargs: usize,
        variadic: bool,
    },
    /// Compiler-provided macro computed at expansion time.
    Predefined(Predefined),
}

/// The predefined macros (C11 6.10.8 plus common extensions).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Predefined {
    /// `__FILE__`
    File,
    /// `__LINE__`
    Line,
    /// `__DATE__`
    Date,
    /// `__TIME__`
    Time,
    /// `__TIMESTAMP__`
    Timestamp,
    /// `__BASE_FILE__`
    BaseFile,
    /// `__COUNTER__`
    Counter,
    /// `__INCLUDE_LEVEL__`
    IncludeLevel,
    /// `_Pragma ( "..." )` operator
    Pragma,
}
