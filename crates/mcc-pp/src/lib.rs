//! mcc-pp - The preprocessor
//!
//! Sits between the lexer and the parser and presents the same
//! get/unget/peek interface, but the stream it produces consists only of
//! translator tokens: directives are executed, macros are expanded,
//! white-space bookkeeping kinds are filtered out, and identifiers whose
//! spelling matches a keyword are converted on the way out.
//!
//! Macro expansion uses the classic hide-set algorithm: every token carries
//! the set of macro names that must not re-expand on it, expansion results
//! are pushed back onto the input, and the top-level loop drains until a
//! token that is not an expandable macro invocation emerges. This is what
//! makes `#define f(x) x + x` / `#define y f(1)` / `f(y)` terminate with
//! `1 + 1 + 1 + 1` instead of recursing.
//!
//! `#if` / `#elif` expressions are folded by an evaluator installed from
//! the parser crate (see [`Preprocessor::set_cond_eval`]); the expression
//! grammar is the same one used for source text.

mod directive;
mod expand;
pub mod macros;
mod predef;

pub use macros::{Macro, Predefined};

use indexmap::IndexMap;
use mcc_lex::{keyword_from_str, Lexer, Punct, Token, TokenKind};
use mcc_util::{Context, Fatal, Result, Symbol};
use rustc_hash::FxHashSet;
use std::path::PathBuf;
use std::rc::Rc;

/// Evaluator for `#if`/`#elif` constant expressions. Receives the already
/// macro-expanded token line (with `defined` and unknown identifiers folded
/// to integer tokens) and returns its integer value.
pub type CondEval = fn(Rc<Context>, Vec<Token>) -> Result<i64>;

/// Conditional-inclusion group kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CondKind {
    If,
    Elif,
    Else,
}

#[derive(Debug)]
pub(crate) struct CondIncl {
    pub kind: CondKind,
    /// Whether some group of this conditional has already been taken.
    pub was_true: bool,
}

/// Default standard include directories, in search order.
pub const STD_INCLUDE_PATHS: &[&str] = &[
    "/usr/local/mcc/include",
    "/usr/local/include",
    "/usr/include",
    "/usr/include/linux",
    "/usr/include/x86_64-linux-gnu",
];

pub struct Preprocessor {
    pub(crate) ctx: Rc<Context>,
    pub(crate) lexer: Lexer,
    pub(crate) macros: IndexMap<Symbol, Macro>,
    pub(crate) cond_stack: Vec<CondIncl>,
    pub(crate) include_paths: Vec<PathBuf>,
    /// Absolute paths of files guarded by `#pragma once`.
    pub(crate) onces: FxHashSet<PathBuf>,
    pub(crate) cond_eval: Option<CondEval>,
}

impl Preprocessor {
    pub fn new(ctx: Rc<Context>, lexer: Lexer) -> Preprocessor {
        let mut pp = Preprocessor {
            ctx,
            lexer,
            macros: IndexMap::new(),
            cond_stack: Vec::new(),
            include_paths: STD_INCLUDE_PATHS.iter().copied().map(PathBuf::from).collect(),
            onces: FxHashSet::default(),
            cond_eval: None,
        };
        pp.init_predefined_macros();
        pp
    }

    pub fn context(&self) -> Rc<Context> {
        self.ctx.clone()
    }

    pub fn lexer_mut(&mut self) -> &mut Lexer {
        &mut self.lexer
    }

    /// Add a `-I` directory; searched before the standard directories.
    pub fn add_include_path(&mut self, path: PathBuf) {
        self.include_paths.insert(0, path);
    }

    /// Install the `#if` expression evaluator. `Parser::new` does this
    /// automatically; the driver installs it for `-E`-only runs.
    pub fn set_cond_eval(&mut self, eval: CondEval) {
        self.cond_eval = Some(eval);
    }

    /// Push the implementation header (`mcc.h`) when it is installed.
    pub fn include_default_header(&mut self) -> Result<()> {
        let path = PathBuf::from("/usr/local/mcc/include/mcc.h");
        if path.exists() {
            self.lexer.push_file(&path)?;
        }
        Ok(())
    }

    /// Whether `name` is currently defined as a macro.
    pub fn is_defined(&self, name: Symbol) -> bool {
        self.macros.contains_key(&name)
    }

    // ----------------------------------------------------------------
    // token interface
    // ----------------------------------------------------------------

    /// Next translator token.
    pub fn get_token(&mut self) -> Result<Token> {
        let tok = loop {
            let tok = self.expand()?;
            if tok.begin_of_line && tok.is_punct(Punct::Hash) {
                self.read_directive(tok)?;
                continue;
            }
            if matches!(tok.kind, TokenKind::Invalid) {
                // Drain so every lex error in the unit gets reported, then
                // give up on the translation unit.
                loop {
                    match self.expand() {
                        Ok(t) if t.is_eof() => break,
                        Ok(_) => continue,
                        Err(_) => break,
                    }
                }
                return Err(Fatal::InvalidToken);
            }
            debug_assert!(!matches!(
                tok.kind,
                TokenKind::Space | TokenKind::MacroParam { .. }
            ));
            break tok;
        };
        Ok(self.maybe_convert_to_keyword(tok))
    }

    pub fn unget_token(&mut self, tok: Token) {
        self.lexer.unget_token(tok);
    }

    pub fn peek_token(&mut self) -> Result<Token> {
        let tok = self.get_token()?;
        self.unget_token(tok.clone());
        Ok(tok)
    }

    /// Consume the next token if it is the given punctuator.
    pub fn next_punct(&mut self, p: Punct) -> Result<bool> {
        let tok = self.get_token()?;
        if tok.is_punct(p) {
            return Ok(true);
        }
        self.unget_token(tok);
        Ok(false)
    }

    /// Consume the next token if it is the given keyword.
    pub fn next_keyword(&mut self, k: mcc_lex::Keyword) -> Result<bool> {
        let tok = self.get_token()?;
        if tok.is_keyword(k) {
            return Ok(true);
        }
        self.unget_token(tok);
        Ok(false)
    }

    fn maybe_convert_to_keyword(&self, tok: Token) -> Token {
        if let TokenKind::Ident(name) = tok.kind {
            if let Some(kw) = keyword_from_str(name.as_str()) {
                let mut t = Token::new(TokenKind::Keyword(kw), tok.pos);
                tok.copy_attrs_to(&mut t);
                return t;
            }
        }
        tok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcc_lex::Keyword;

    fn pp_from(src: &str) -> Preprocessor {
        let ctx = Rc::new(Context::new());
        let lexer = Lexer::from_string(ctx.clone(), src);
        Preprocessor::new(ctx, lexer)
    }

    /// Drain the translator token stream as spellings.
    fn expand_to_texts(src: &str) -> Vec<String> {
        let mut pp = pp_from(src);
        let mut out = Vec::new();
        loop {
            let tok = pp.get_token().expect("preprocess failed");
            if tok.is_eof() {
                return out;
            }
            out.push(tok.to_text());
        }
    }

    #[test]
    fn test_passthrough_and_keyword_conversion() {
        let mut pp = pp_from("int x;");
        let t = pp.get_token().unwrap();
        assert!(t.is_keyword(Keyword::Int));
        let t = pp.get_token().unwrap();
        assert!(t.is_ident("x"));
    }

    #[test]
    fn test_object_macro() {
        assert_eq!(expand_to_texts("#define N 42\nint x = N;"), [
            "int", "x", "=", "42", ";"
        ]);
    }

    #[test]
    fn test_function_macro() {
        assert_eq!(
            expand_to_texts("#define ADD(a, b) a + b\nADD(1, 2)"),
            ["1", "+", "2"]
        );
    }

    #[test]
    fn test_function_macro_without_parens_is_plain_ident() {
        assert_eq!(expand_to_texts("#define f(x) x\nf;"), ["f", ";"]);
    }

    #[test]
    fn test_nested_expansion() {
        assert_eq!(
            expand_to_texts("#define A B\n#define B C\n#define C 7\nA"),
            ["7"]
        );
    }

    #[test]
    fn test_hideset_stops_recursion() {
        // the classic: f(y) where y is itself f(1)
        assert_eq!(
            expand_to_texts("#define f(x) x + x\n#define y f(1)\nf(y)"),
            ["1", "+", "1", "+", "1", "+", "1"]
        );
    }

    #[test]
    fn test_self_reference_does_not_loop() {
        assert_eq!(expand_to_texts("#define a a\na"), ["a"]);
        assert_eq!(expand_to_texts("#define x x + 1\nx"), ["x", "+", "1"]);
    }

    #[test]
    fn test_stringize() {
        assert_eq!(
            expand_to_texts("#define S(x) #x\nchar* p = S(a b);"),
            ["char", "*", "p", "=", "\"a b\"", ";"]
        );
    }

    #[test]
    fn test_paste() {
        assert_eq!(
            expand_to_texts("#define CAT(a, b) a ## b\nint CAT(x, 1) = CAT(1, 2);"),
            ["int", "x1", "=", "12", ";"]
        );
    }

    #[test]
    fn test_va_args() {
        assert_eq!(
            expand_to_texts("#define F(...) g(__VA_ARGS__)\nF(1, 2)"),
            ["g", "(", "1", ",", "2", ")"]
        );
    }

    #[test]
    fn test_comma_paste_empty_va_args() {
        assert_eq!(
            expand_to_texts("#define F(fmt, ...) g(fmt, ##__VA_ARGS__)\nF(a)\nF(a, b)"),
            ["g", "(", "a", ")", "g", "(", "a", ",", "b", ")"]
        );
    }

    #[test]
    fn test_undef() {
        assert_eq!(
            expand_to_texts("#define N 1\n#undef N\nN"),
            ["N"]
        );
    }

    #[test]
    fn test_ifdef() {
        assert_eq!(
            expand_to_texts("#define A\n#ifdef A\nyes\n#else\nno\n#endif"),
            ["yes"]
        );
        assert_eq!(
            expand_to_texts("#ifdef A\nyes\n#else\nno\n#endif"),
            ["no"]
        );
    }

    #[test]
    fn test_ifndef_nested() {
        let src = "#ifndef A\n#ifdef B\nb\n#else\nnotb\n#endif\n#endif";
        assert_eq!(expand_to_texts(src), ["notb"]);
    }

    #[test]
    fn test_line_directive() {
        let mut pp = pp_from("#line 100 \"other.c\"\nx");
        let t = pp.get_token().unwrap();
        assert!(t.is_ident("x"));
        assert_eq!(t.pos.file.as_str(), "other.c");
        assert_eq!(t.pos.row, 100);
    }

    #[test]
    fn test_error_directive_is_fatal() {
        let mut pp = pp_from("#error bad things\nx");
        assert!(pp.get_token().is_err());
    }

    #[test]
    fn test_unknown_directive_is_fatal() {
        let mut pp = pp_from("#frobnicate\nx");
        assert!(pp.get_token().is_err());
    }

    #[test]
    fn test_counter_macro() {
        assert_eq!(
            expand_to_texts("__COUNTER__ __COUNTER__ __COUNTER__"),
            ["0", "1", "2"]
        );
    }

    #[test]
    fn test_line_macro() {
        assert_eq!(expand_to_texts("__LINE__\n__LINE__"), ["1", "2"]);
    }

    #[test]
    fn test_hash_not_directive_mid_line() {
        // a '#' that is not at the beginning of a line is just a token
        let mut pp = pp_from("x # y");
        assert!(pp.get_token().unwrap().is_ident("x"));
        assert!(pp.get_token().unwrap().is_punct(Punct::Hash));
    }

    #[test]
    fn test_identifier_round_trip() {
        // lexing, preprocessing and re-lexing an identifier preserves its
        // byte sequence
        for src in ["plain", "_under7", "x123_y"] {
            let texts = expand_to_texts(src);
            assert_eq!(texts.len(), 1);
            let relexed = expand_to_texts(&texts[0]);
            assert_eq!(texts, relexed);
        }
        // UCN spellings decode into the identifier's bytes
        let texts = expand_to_texts("\\u00C4x");
        assert_eq!(texts, ["Äx"]);
    }

    #[test]
    fn test_macro_leading_space_preserved() {
        let toks = {
            let mut pp = pp_from("#define M 1\nx M");
            let mut v = Vec::new();
            loop {
                let t = pp.get_token().unwrap();
                if t.is_eof() {
                    break;
                }
                v.push(t);
            }
            v
        };
        assert!(toks[1].leading_space);
    }
}
