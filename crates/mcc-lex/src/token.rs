//! The token model.
//!
//! One value type covers every phase: preprocessing kinds (space, newline,
//! macro parameter placeholders) never survive past the preprocessor, and
//! keywords only come into existence there. Tokens are values; copies made
//! during macro expansion mutate only their own flags and hide-set.

use crate::keywords::Keyword;
use mcc_util::{Pos, Symbol};
use rustc_hash::FxHashSet;
use std::fmt;
use std::rc::Rc;

/// String/character literal encoding, per the prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    /// No prefix.
    None,
    /// `u8"..."`.
    Utf8,
    /// `u"..."` / `u'x'` (char16_t).
    Char16,
    /// `U"..."` / `U'x'` (char32_t).
    Char32,
    /// `L"..."` / `L'x'`; wchar_t is 32-bit on this target.
    Wchar,
}

/// A hide-set: the macro names forbidden from re-expansion on a token.
///
/// Immutable; `insert`/`union`/`intersect` build new handles, and sibling
/// tokens produced by one expansion share the same handle. Empty sets
/// (the overwhelmingly common case) allocate nothing.
#[derive(Clone, Debug, Default)]
pub struct HideSet(Option<Rc<FxHashSet<Symbol>>>);

impl HideSet {
    pub fn new() -> HideSet {
        HideSet(None)
    }

    pub fn contains(&self, name: Symbol) -> bool {
        self.0.as_ref().map_or(false, |s| s.contains(&name))
    }

    pub fn insert(&self, name: Symbol) -> HideSet {
        let mut set = self.0.as_deref().cloned().unwrap_or_default();
        set.insert(name);
        HideSet(Some(Rc::new(set)))
    }

    pub fn union(&self, other: &HideSet) -> HideSet {
        match (&self.0, &other.0) {
            (None, _) => other.clone(),
            (_, None) => self.clone(),
            (Some(a), Some(b)) => {
                let mut set = a.as_ref().clone();
                set.extend(b.iter().copied());
                HideSet(Some(Rc::new(set)))
            }
        }
    }

    pub fn intersect(&self, other: &HideSet) -> HideSet {
        match (&self.0, &other.0) {
            (Some(a), Some(b)) => {
                let set: FxHashSet<Symbol> = a.intersection(b).copied().collect();
                if set.is_empty() {
                    HideSet(None)
                } else {
                    HideSet(Some(Rc::new(set)))
                }
            }
            _ => HideSet(None),
        }
    }
}

/// C11 punctuators (6.4.6). Digraphs lex to their primary forms.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Punct {
    LBracket,
    RBracket,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Dot,
    Arrow,
    Inc,
    Dec,
    Amp,
    Star,
    Plus,
    Minus,
    Tilde,
    Bang,
    Slash,
    Percent,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    Caret,
    Pipe,
    LogAnd,
    LogOr,
    Question,
    Colon,
    Semi,
    Ellipsis,
    Assign,
    MulAssign,
    DivAssign,
    ModAssign,
    AddAssign,
    SubAssign,
    ShlAssign,
    ShrAssign,
    AndAssign,
    XorAssign,
    OrAssign,
    Comma,
    Hash,
    HashHash,
}

impl Punct {
    pub fn spelling(self) -> &'static str {
        use Punct::*;
        match self {
            LBracket => "[",
            RBracket => "]",
            LParen => "(",
            RParen => ")",
            LBrace => "{",
            RBrace => "}",
            Dot => ".",
            Arrow => "->",
            Inc => "++",
            Dec => "--",
            Amp => "&",
            Star => "*",
            Plus => "+",
            Minus => "-",
            Tilde => "~",
            Bang => "!",
            Slash => "/",
            Percent => "%",
            Shl => "<<",
            Shr => ">>",
            Lt => "<",
            Gt => ">",
            Le => "<=",
            Ge => ">=",
            Eq => "==",
            Ne => "!=",
            Caret => "^",
            Pipe => "|",
            LogAnd => "&&",
            LogOr => "||",
            Question => "?",
            Colon => ":",
            Semi => ";",
            Ellipsis => "...",
            Assign => "=",
            MulAssign => "*=",
            DivAssign => "/=",
            ModAssign => "%=",
            AddAssign => "+=",
            SubAssign => "-=",
            ShlAssign => "<<=",
            ShrAssign => ">>=",
            AndAssign => "&=",
            XorAssign => "^=",
            OrAssign => "|=",
            Comma => ",",
            Hash => "#",
            HashHash => "##",
        }
    }
}

/// The discriminated token value.
#[derive(Clone, Debug)]
pub enum TokenKind {
    /// Punctuator.
    Punct(Punct),
    /// Keyword; produced only by the preprocessor's keyword conversion.
    Keyword(Keyword),
    /// Identifier.
    Ident(Symbol),
    /// Integer or floating constant, textual form preserved. Exact
    /// classification happens in the parser.
    Number(Symbol),
    /// Character constant: decoded code point plus encoding.
    Char { value: i32, enc: Encoding },
    /// String literal: UTF-8 content bytes, no terminator. The NUL element
    /// is accounted for when the literal becomes an AST node.
    Str { value: Rc<[u8]>, enc: Encoding },
    /// Macro parameter placeholder inside a function-macro body.
    MacroParam { position: usize, is_vararg: bool },
    /// Collapsed white space; internal to the lexer.
    Space,
    /// End of line; consumed by the preprocessor to delimit directives.
    Newline,
    /// End of input.
    Eof,
    /// A lex error already reported; drained before exit.
    Invalid,
}

/// A token with its position and preprocessing attributes.
#[derive(Clone, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Pos,
    /// White space (or a comment) preceded this token.
    pub leading_space: bool,
    /// This token is the first on its line.
    pub begin_of_line: bool,
    /// Macro names forbidden to re-expand on this token.
    pub hideset: HideSet,
}

impl Token {
    pub fn new(kind: TokenKind, pos: Pos) -> Token {
        Token {
            kind,
            pos,
            leading_space: false,
            begin_of_line: false,
            hideset: HideSet::new(),
        }
    }

    pub fn is_punct(&self, p: Punct) -> bool {
        matches!(self.kind, TokenKind::Punct(q) if q == p)
    }

    pub fn is_keyword(&self, k: Keyword) -> bool {
        matches!(self.kind, TokenKind::Keyword(q) if q == k)
    }

    pub fn is_ident(&self, name: &str) -> bool {
        matches!(self.kind, TokenKind::Ident(s) if s.as_str() == name)
    }

    pub fn ident(&self) -> Option<Symbol> {
        match self.kind {
            TokenKind::Ident(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }

    /// Carry position and flags over onto a replacement token.
    pub fn copy_attrs_to(&self, other: &mut Token) {
        other.pos = self.pos;
        other.leading_space = self.leading_space;
        other.begin_of_line = self.begin_of_line;
        other.hideset = self.hideset.clone();
    }

    /// The textual spelling, as used by stringization, `##` gluing and
    /// `-E` output.
    pub fn to_text(&self) -> String {
        fn enc_prefix(enc: Encoding) -> &'static str {
            match enc {
                Encoding::None => "",
                Encoding::Char16 => "u",
                Encoding::Char32 => "U",
                Encoding::Utf8 => "u8",
                Encoding::Wchar => "L",
            }
        }
        match &self.kind {
            TokenKind::Punct(p) => p.spelling().to_string(),
            TokenKind::Keyword(k) => k.spelling().to_string(),
            TokenKind::Ident(s) => s.as_str().to_string(),
            TokenKind::Number(s) => s.as_str().to_string(),
            TokenKind::Char { value, enc } => {
                let c = char::from_u32(*value as u32).unwrap_or('?');
                let quoted = match c {
                    '\'' => "\\'".to_string(),
                    '\\' => "\\\\".to_string(),
                    '\n' => "\\n".to_string(),
                    c if (c as u32) < 0x20 => format!("\\{:03o}", c as u32),
                    c => c.to_string(),
                };
                format!("{}'{}'", enc_prefix(*enc), quoted)
            }
            TokenKind::Str { value, enc } => {
                let body = mcc_util::quote::quote_bytes(value, value.len());
                format!("{}\"{}\"", enc_prefix(*enc), body)
            }
            TokenKind::MacroParam { position, .. } => format!("<param {}>", position),
            TokenKind::Space => "<space>".to_string(),
            TokenKind::Newline => "<newline>".to_string(),
            TokenKind::Eof => "<eof>".to_string(),
            TokenKind::Invalid => "<invalid>".to_string(),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hideset_insert_is_persistent() {
        let a = HideSet::new();
        let foo = Symbol::intern("foo");
        let b = a.insert(foo);
        assert!(!a.contains(foo));
        assert!(b.contains(foo));
    }

    #[test]
    fn test_hideset_union_intersect() {
        let f = Symbol::intern("f");
        let g = Symbol::intern("g");
        let a = HideSet::new().insert(f);
        let b = HideSet::new().insert(f).insert(g);
        let u = a.union(&b);
        assert!(u.contains(f) && u.contains(g));
        let i = a.intersect(&b);
        assert!(i.contains(f) && !i.contains(g));
    }

    #[test]
    fn test_intersect_with_empty() {
        let f = Symbol::intern("f");
        let a = HideSet::new().insert(f);
        assert!(!a.intersect(&HideSet::new()).contains(f));
    }

    #[test]
    fn test_spelling() {
        let t = Token::new(TokenKind::Punct(Punct::ShlAssign), Pos::none());
        assert_eq!(t.to_text(), "<<=");
        let s = Token::new(
            TokenKind::Str {
                value: b"hi\0".to_vec().into(),
                enc: Encoding::Char16,
            },
            Pos::none(),
        );
        assert_eq!(s.to_text(), "u\"hi\"");
    }
}
