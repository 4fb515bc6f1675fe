//! The tokenizer.
//!
//! Produces preprocessing tokens: identifiers, numbers (classification
//! deferred to the parser), character/string literals with encoding
//! prefixes, punctuators including digraphs, plus the internal space /
//! newline / invalid kinds. Lex errors are reported with their position and
//! yield `Invalid`; the lexer itself never halts.

use crate::reader::FileSet;
use crate::token::{Encoding, Punct, Token, TokenKind};
use mcc_util::{encode, Context, Pos, Result, Symbol};
use std::path::Path;
use std::rc::Rc;

/// Code point stand-in for a malformed escape; also rejected as a UCN, so
/// it can never be produced by valid input.
const BAD_ESCAPE: u32 = 0xD800;

/// The lexer: a [`FileSet`] plus a token pushback buffer.
///
/// A lexer can also be constructed over a token list; the preprocessor uses
/// that to re-scan macro arguments and glued tokens.
pub struct Lexer {
    ctx: Rc<Context>,
    fileset: FileSet,
    buffer: Vec<Token>,
    base_file: Symbol,
}

impl Lexer {
    /// Lexer over a source file.
    pub fn new(ctx: Rc<Context>, path: &Path) -> Result<Lexer> {
        let mut fileset = FileSet::new();
        fileset.push_file(path)?;
        Ok(Lexer {
            ctx,
            fileset,
            buffer: Vec::new(),
            base_file: Symbol::intern(&path.to_string_lossy()),
        })
    }

    /// Lexer over an in-memory buffer (reported as file "-").
    pub fn from_string(ctx: Rc<Context>, src: &str) -> Lexer {
        let mut fileset = FileSet::new();
        fileset.push_string(src);
        Lexer {
            ctx,
            fileset,
            buffer: Vec::new(),
            base_file: Symbol::intern("-"),
        }
    }

    /// Lexer that replays a token list, then reports EOF.
    pub fn from_tokens(ctx: Rc<Context>, mut toks: Vec<Token>) -> Lexer {
        toks.reverse();
        Lexer {
            ctx,
            fileset: FileSet::new(),
            buffer: toks,
            base_file: Symbol::intern("-"),
        }
    }

    pub fn base_file(&self) -> Symbol {
        self.base_file
    }

    pub fn fileset(&mut self) -> &mut FileSet {
        &mut self.fileset
    }

    /// Push an included file; subsequent tokens come from it.
    pub fn push_file(&mut self, path: &Path) -> Result<()> {
        self.fileset.push_file(path)
    }

    // ----------------------------------------------------------------
    // character helpers
    // ----------------------------------------------------------------

    fn pos(&self, delta: i32) -> Pos {
        if self.fileset.count() == 0 {
            return Pos::none();
        }
        self.fileset.pos(delta)
    }

    /// Skip one run of white space or one comment. Newlines stay.
    fn skip_space_aux(&mut self) -> bool {
        let c = match self.fileset.get_chr() {
            None => return false,
            Some(c) => c,
        };
        if c != b'\n' && (c as char).is_ascii_whitespace() {
            return true;
        }
        if c == b'/' {
            if self.fileset.next_if(b'/') {
                loop {
                    match self.fileset.get_chr() {
                        None => return true,
                        Some(b'\n') => {
                            self.fileset.unget_chr(Some(b'\n'));
                            return true;
                        }
                        Some(_) => {}
                    }
                }
            }
            if self.fileset.next_if(b'*') {
                let pos = self.pos(-2);
                loop {
                    match self.fileset.get_chr() {
                        None => {
                            self.ctx.diag.error(pos, "unexpected end of block comment");
                            return false;
                        }
                        Some(b'*') => {
                            if self.fileset.next_if(b'/') {
                                return true;
                            }
                        }
                        Some(_) => {}
                    }
                }
            }
        }
        self.fileset.unget_chr(Some(c));
        false
    }

    fn skip_space(&mut self) -> bool {
        if !self.skip_space_aux() {
            return false;
        }
        while self.skip_space_aux() {}
        true
    }

    // ----------------------------------------------------------------
    // escape sequences
    // ----------------------------------------------------------------

    fn read_escape_char(&mut self) -> u32 {
        let pos = self.pos(-1);
        let c = match self.fileset.get_chr() {
            None => return BAD_ESCAPE,
            Some(c) => c,
        };
        match c {
            b'\'' | b'"' | b'?' | b'\\' => c as u32,
            b'a' => 0x07,
            b'b' => 0x08,
            b'f' => 0x0C,
            b'n' => 0x0A,
            b'r' => 0x0D,
            b't' => 0x09,
            b'v' => 0x0B,
            // GNU extension
            b'e' => 0x1B,
            b'0'..=b'7' => self.read_octal_char(c),
            b'x' => self.read_hex_char(),
            b'u' => self.read_universal_char(4),
            b'U' => self.read_universal_char(8),
            _ => {
                self.ctx
                    .diag
                    .warn(pos, format!("unknown escape character: \\{}", c as char));
                c as u32
            }
        }
    }

    /// One of `\0`, `\0o`, `\0oo`.
    fn read_octal_char(&mut self, c: u8) -> u32 {
        let mut o = (c - b'0') as u32;
        for _ in 1..3 {
            match self.fileset.get_chr() {
                Some(c @ b'0'..=b'7') => o = (o << 3) | (c - b'0') as u32,
                c => {
                    self.fileset.unget_chr(c);
                    return o;
                }
            }
        }
        o
    }

    /// `\xd...` with any number of hex digits.
    fn read_hex_char(&mut self) -> u32 {
        let pos = self.pos(-2);
        match self.fileset.peek() {
            Some(c) if (c as char).is_ascii_hexdigit() => {}
            c => {
                self.ctx.diag.error(
                    self.pos(0),
                    format!(
                        "invalid hex character: {}",
                        c.map(|c| if c == b'\n' { ' ' } else { c as char })
                            .unwrap_or(' ')
                    ),
                );
                return BAD_ESCAPE;
            }
        }
        let mut h: u32 = 0;
        loop {
            match self.fileset.get_chr() {
                Some(c) if (c as char).is_ascii_hexdigit() => {
                    h = h.wrapping_shl(4) | (c as char).to_digit(16).unwrap();
                }
                c => {
                    if h > 0xFF {
                        self.ctx.diag.warn(pos, "hex escape sequence out of range");
                    }
                    self.fileset.unget_chr(c);
                    return h;
                }
            }
        }
    }

    /// `\uXXXX` or `\UXXXXXXXX`.
    fn read_universal_char(&mut self, len: usize) -> u32 {
        let pos = self.pos(-2);
        let mut u: u32 = 0;
        for _ in 0..len {
            match self.fileset.get_chr() {
                Some(c) if (c as char).is_ascii_hexdigit() => {
                    u = (u << 4) | (c as char).to_digit(16).unwrap();
                }
                c => {
                    self.ctx.diag.error(
                        self.pos(0),
                        format!(
                            "invalid universal character: {}",
                            c.map(|c| if c == b'\n' { ' ' } else { c as char })
                                .unwrap_or(' ')
                        ),
                    );
                    self.fileset.unget_chr(c);
                    return BAD_ESCAPE;
                }
            }
        }
        // C11 6.4.3p2: no surrogates, and nothing below 00A0 other than
        // $, @ and `.
        let below_a0_ok = u == b'$' as u32 || u == b'@' as u32 || u == b'`' as u32;
        if (0xD800..=0xDFFF).contains(&u) || u > 0x10FFFF || (u < 0xA0 && !below_a0_ok) {
            self.ctx.diag.error(
                pos,
                format!(
                    "\\{}{:0width$x} is not a valid universal character",
                    if len == 4 { 'u' } else { 'U' },
                    u,
                    width = len
                ),
            );
            return BAD_ESCAPE;
        }
        u
    }

    // ----------------------------------------------------------------
    // token readers
    // ----------------------------------------------------------------

    fn read_ident(&mut self, c: u8, pos: Pos) -> Token {
        let mut buf: Vec<u8> = Vec::new();
        let mut invalid = false;
        if c == b'\\' && matches!(self.fileset.peek(), Some(b'u') | Some(b'U')) {
            let u = self.read_escape_char();
            if u == BAD_ESCAPE {
                invalid = true;
            }
            encode::encode_utf8(&mut buf, u);
        } else {
            buf.push(c);
        }
        loop {
            match self.fileset.get_chr() {
                Some(c) if (c as char).is_ascii_alphanumeric() || c == b'_' => buf.push(c),
                Some(b'\\') if matches!(self.fileset.peek(), Some(b'u') | Some(b'U')) => {
                    let u = self.read_escape_char();
                    if u == BAD_ESCAPE {
                        invalid = true;
                    }
                    encode::encode_utf8(&mut buf, u);
                }
                c => {
                    self.fileset.unget_chr(c);
                    if invalid {
                        return Token::new(TokenKind::Invalid, pos);
                    }
                    let name = String::from_utf8_lossy(&buf);
                    return Token::new(TokenKind::Ident(Symbol::intern(&name)), pos);
                }
            }
        }
    }

    /// Greedy pp-number: identifier characters, `.`, and a sign directly
    /// after an exponent letter. Validation happens in the parser.
    fn read_number(&mut self, c: u8, pos: Pos) -> Token {
        let mut buf = vec![c];
        let mut last = c;
        loop {
            let c = self.fileset.get_chr();
            let is_exp_sign = matches!(last, b'e' | b'E' | b'p' | b'P')
                && matches!(c, Some(b'+') | Some(b'-'));
            match c {
                Some(c)
                    if (c as char).is_ascii_alphanumeric()
                        || c == b'_'
                        || c == b'.'
                        || is_exp_sign =>
                {
                    buf.push(c);
                    last = c;
                }
                c => {
                    self.fileset.unget_chr(c);
                    let text = String::from_utf8_lossy(&buf);
                    return Token::new(TokenKind::Number(Symbol::intern(&text)), pos);
                }
            }
        }
    }

    fn read_char(&mut self, enc: Encoding, pos: Pos) -> Token {
        let c = match self.fileset.get_chr() {
            None | Some(b'\n') => {
                self.ctx.diag.error(pos, "missing character and '''");
                return Token::new(TokenKind::Invalid, pos);
            }
            Some(c) => c,
        };
        let chr = if c == b'\\' {
            self.read_escape_char()
        } else {
            c as u32
        };
        match self.fileset.get_chr() {
            Some(b'\'') => {}
            mut c => {
                while !matches!(c, Some(b'\n') | None) {
                    c = self.fileset.get_chr();
                }
                self.fileset.unget_chr(c);
                self.ctx.diag.error(pos, "missing terminating ' character");
                return Token::new(TokenKind::Invalid, pos);
            }
        }
        if chr == BAD_ESCAPE {
            return Token::new(TokenKind::Invalid, pos);
        }
        // An unprefixed character constant has type int with the value of
        // the byte as a signed char.
        let value = if enc == Encoding::None {
            chr as u8 as i8 as i32
        } else {
            chr as i32
        };
        Token::new(TokenKind::Char { value, enc }, pos)
    }

    fn read_string(&mut self, enc: Encoding, pos: Pos) -> Token {
        let mut buf: Vec<u8> = Vec::new();
        let mut invalid = false;
        loop {
            let c = match self.fileset.get_chr() {
                None | Some(b'\n') => {
                    self.ctx.diag.error(pos, "missing terminating \" character");
                    return Token::new(TokenKind::Invalid, pos);
                }
                Some(c) => c,
            };
            if c == b'"' {
                break;
            }
            if c != b'\\' {
                buf.push(c);
                continue;
            }
            let is_ucn = matches!(self.fileset.peek(), Some(b'u') | Some(b'U'));
            let u = self.read_escape_char();
            if u == BAD_ESCAPE {
                invalid = true;
            }
            if is_ucn {
                encode::encode_utf8(&mut buf, u);
            } else {
                buf.push(u as u8);
            }
        }
        if invalid {
            return Token::new(TokenKind::Invalid, pos);
        }
        Token::new(
            TokenKind::Str {
                value: buf.into(),
                enc,
            },
            pos,
        )
    }

    fn punct(&self, p: Punct, pos: Pos) -> Token {
        Token::new(TokenKind::Punct(p), pos)
    }

    fn read_token(&mut self) -> Token {
        let mut pos = self.pos(0);
        if self.skip_space() {
            return Token::new(TokenKind::Space, pos);
        }
        pos = self.pos(0);
        let c = match self.fileset.get_chr() {
            None => return Token::new(TokenKind::Eof, pos),
            Some(c) => c,
        };
        use Punct::*;
        match c {
            b'\n' => Token::new(TokenKind::Newline, pos),

            // identifier; u, U and L may be literal prefixes instead
            b'a'..=b't' | b'v'..=b'z' | b'A'..=b'K' | b'M'..=b'T' | b'V'..=b'Z' | b'_' => {
                self.read_ident(c, pos)
            }
            b'\\' => {
                if matches!(self.fileset.peek(), Some(b'u') | Some(b'U')) {
                    return self.read_ident(c, pos);
                }
                self.ctx.diag.error(pos, "stray '\\' in program");
                Token::new(TokenKind::Invalid, pos)
            }
            b'u' => {
                if self.fileset.next_if(b'\'') {
                    return self.read_char(Encoding::Char16, pos);
                }
                if self.fileset.next_if(b'"') {
                    return self.read_string(Encoding::Char16, pos);
                }
                if self.fileset.next_if(b'8') {
                    if self.fileset.next_if(b'"') {
                        return self.read_string(Encoding::Utf8, pos);
                    }
                    self.fileset.unget_chr(Some(b'8'));
                }
                self.read_ident(c, pos)
            }
            b'U' | b'L' => {
                let enc = if c == b'L' {
                    Encoding::Wchar
                } else {
                    Encoding::Char32
                };
                if self.fileset.next_if(b'\'') {
                    return self.read_char(enc, pos);
                }
                if self.fileset.next_if(b'"') {
                    return self.read_string(enc, pos);
                }
                self.read_ident(c, pos)
            }

            b'0'..=b'9' => self.read_number(c, pos),
            b'\'' => self.read_char(Encoding::None, pos),
            b'"' => self.read_string(Encoding::None, pos),

            // punctuators; C11 6.4.6p3 maps the digraphs onto [ ] { } # ##
            b'[' => self.punct(LBracket, pos),
            b']' => self.punct(RBracket, pos),
            b'(' => self.punct(LParen, pos),
            b')' => self.punct(RParen, pos),
            b'{' => self.punct(LBrace, pos),
            b'}' => self.punct(RBrace, pos),
            b'~' => self.punct(Tilde, pos),
            b'?' => self.punct(Question, pos),
            b';' => self.punct(Semi, pos),
            b',' => self.punct(Comma, pos),
            b'.' => {
                if matches!(self.fileset.peek(), Some(c) if (c as char).is_ascii_digit()) {
                    return self.read_number(b'.', pos);
                }
                if self.fileset.next_if(b'.') {
                    if self.fileset.next_if(b'.') {
                        return self.punct(Ellipsis, pos);
                    }
                    // ".." is not a token; put the second dot back
                    self.fileset.unget_chr(Some(b'.'));
                }
                self.punct(Dot, pos)
            }
            b'-' => {
                if self.fileset.next_if(b'-') {
                    return self.punct(Dec, pos);
                }
                if self.fileset.next_if(b'>') {
                    return self.punct(Arrow, pos);
                }
                if self.fileset.next_if(b'=') {
                    return self.punct(SubAssign, pos);
                }
                self.punct(Minus, pos)
            }
            b'+' => {
                if self.fileset.next_if(b'+') {
                    return self.punct(Inc, pos);
                }
                if self.fileset.next_if(b'=') {
                    return self.punct(AddAssign, pos);
                }
                self.punct(Plus, pos)
            }
            b'&' => {
                if self.fileset.next_if(b'&') {
                    return self.punct(LogAnd, pos);
                }
                if self.fileset.next_if(b'=') {
                    return self.punct(AndAssign, pos);
                }
                self.punct(Amp, pos)
            }
            b'*' => {
                if self.fileset.next_if(b'=') {
                    return self.punct(MulAssign, pos);
                }
                self.punct(Star, pos)
            }
            b'!' => {
                if self.fileset.next_if(b'=') {
                    return self.punct(Ne, pos);
                }
                self.punct(Bang, pos)
            }
            b'/' => {
                if self.fileset.next_if(b'=') {
                    return self.punct(DivAssign, pos);
                }
                self.punct(Slash, pos)
            }
            b'%' => {
                if self.fileset.next_if(b'=') {
                    return self.punct(ModAssign, pos);
                }
                if self.fileset.next_if(b'>') {
                    return self.punct(RBrace, pos);
                }
                if self.fileset.next_if(b':') {
                    if self.fileset.next_if(b'%') {
                        if self.fileset.next_if(b':') {
                            return self.punct(HashHash, pos);
                        }
                        self.fileset.unget_chr(Some(b'%'));
                    }
                    return self.punct(Hash, pos);
                }
                self.punct(Percent, pos)
            }
            b'<' => {
                if self.fileset.next_if(b'<') {
                    if self.fileset.next_if(b'=') {
                        return self.punct(ShlAssign, pos);
                    }
                    return self.punct(Shl, pos);
                }
                if self.fileset.next_if(b'=') {
                    return self.punct(Le, pos);
                }
                if self.fileset.next_if(b':') {
                    return self.punct(LBracket, pos);
                }
                if self.fileset.next_if(b'%') {
                    return self.punct(LBrace, pos);
                }
                self.punct(Lt, pos)
            }
            b'>' => {
                if self.fileset.next_if(b'>') {
                    if self.fileset.next_if(b'=') {
                        return self.punct(ShrAssign, pos);
                    }
                    return self.punct(Shr, pos);
                }
                if self.fileset.next_if(b'=') {
                    return self.punct(Ge, pos);
                }
                self.punct(Gt, pos)
            }
            b'=' => {
                if self.fileset.next_if(b'=') {
                    return self.punct(Eq, pos);
                }
                self.punct(Assign, pos)
            }
            b'^' => {
                if self.fileset.next_if(b'=') {
                    return self.punct(XorAssign, pos);
                }
                self.punct(Caret, pos)
            }
            b'|' => {
                if self.fileset.next_if(b'|') {
                    return self.punct(LogOr, pos);
                }
                if self.fileset.next_if(b'=') {
                    return self.punct(OrAssign, pos);
                }
                self.punct(Pipe, pos)
            }
            b':' => {
                if self.fileset.next_if(b'>') {
                    return self.punct(RBracket, pos);
                }
                self.punct(Colon, pos)
            }
            b'#' => {
                if self.fileset.next_if(b'#') {
                    return self.punct(HashHash, pos);
                }
                self.punct(Hash, pos)
            }

            c => {
                self.ctx
                    .diag
                    .error(pos, format!("stray '{}' in program", c as char));
                Token::new(TokenKind::Invalid, pos)
            }
        }
    }

    // ----------------------------------------------------------------
    // token-level interface
    // ----------------------------------------------------------------

    /// Next token. White space is folded into `leading_space` of the token
    /// that follows; `begin_of_line` is set on the first token of a line.
    pub fn get_token(&mut self) -> Token {
        if let Some(tok) = self.buffer.pop() {
            return tok;
        }
        if self.fileset.count() == 0 {
            return Token::new(TokenKind::Eof, Pos::none());
        }
        let bol = self.fileset.current_frame().col == 1;
        let mut tok = self.read_token();
        if matches!(tok.kind, TokenKind::Space) {
            tok = self.read_token();
            tok.leading_space = true;
        }
        tok.begin_of_line = bol;
        tok
    }

    pub fn unget_token(&mut self, tok: Token) {
        if tok.is_eof() {
            return;
        }
        self.buffer.push(tok);
    }

    pub fn peek_token(&mut self) -> Token {
        let tok = self.get_token();
        self.unget_token(tok.clone());
        tok
    }

    /// Consume the next token if it is the given punctuator.
    pub fn next_punct(&mut self, p: Punct) -> bool {
        let tok = self.get_token();
        if tok.is_punct(p) {
            return true;
        }
        self.unget_token(tok);
        false
    }

    /// Consume the next token if it is a newline.
    pub fn next_newline(&mut self) -> bool {
        let tok = self.get_token();
        if matches!(tok.kind, TokenKind::Newline) {
            return true;
        }
        self.unget_token(tok);
        false
    }

    /// Lex `src` expecting exactly one token; `None` when it lexes to
    /// anything else. Used to re-lex `##` concatenations.
    pub fn one_token_from_string(ctx: Rc<Context>, src: &str) -> Option<Token> {
        let mut lexer = Lexer::from_string(ctx, src);
        let tok = lexer.get_token();
        if matches!(tok.kind, TokenKind::Eof | TokenKind::Invalid) {
            return None;
        }
        let rest = lexer.get_token();
        if !rest.is_eof() && !matches!(rest.kind, TokenKind::Newline) {
            return None;
        }
        if !lexer.get_token().is_eof() {
            return None;
        }
        Some(tok)
    }

    /// Lex all of `src` into tokens. Used by `_Pragma`.
    pub fn tokens_from_string(ctx: Rc<Context>, src: &str) -> Vec<Token> {
        let mut lexer = Lexer::from_string(ctx, src);
        let mut toks = Vec::new();
        loop {
            let tok = lexer.get_token();
            if tok.is_eof() {
                return toks;
            }
            if matches!(tok.kind, TokenKind::Newline) {
                continue;
            }
            toks.push(tok);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKind as K;

    fn lex_all(src: &str) -> Vec<Token> {
        let ctx = Rc::new(Context::new());
        let mut lexer = Lexer::from_string(ctx, src);
        let mut out = Vec::new();
        loop {
            let t = lexer.get_token();
            if t.is_eof() {
                return out;
            }
            out.push(t);
        }
    }

    fn kinds(src: &str) -> Vec<String> {
        lex_all(src)
            .into_iter()
            .filter(|t| !matches!(t.kind, K::Newline))
            .map(|t| t.to_text())
            .collect()
    }

    #[test]
    fn test_idents_and_punct() {
        assert_eq!(kinds("int x = a->b;"), ["int", "x", "=", "a", "->", "b", ";"]);
    }

    #[test]
    fn test_leading_space_and_bol() {
        let toks = lex_all("a b\nc");
        assert!(!toks[0].leading_space && toks[0].begin_of_line);
        assert!(toks[1].leading_space && !toks[1].begin_of_line);
        // toks[2] is the newline
        assert!(toks[3].begin_of_line);
    }

    #[test]
    fn test_comments_collapse_to_space() {
        let toks = lex_all("a/*x*/b // y\nc");
        assert_eq!(toks[0].to_text(), "a");
        assert_eq!(toks[1].to_text(), "b");
        assert!(toks[1].leading_space);
    }

    #[test]
    fn test_number_greedy() {
        assert_eq!(kinds("1.5e+3 0x1fp-2 08"), ["1.5e+3", "0x1fp-2", "08"]);
        // '-' binds into the number only after an exponent letter
        assert_eq!(kinds("1-2"), ["1", "-", "2"]);
    }

    #[test]
    fn test_number_starting_with_dot() {
        assert_eq!(kinds(".5 ."), [".5", "."]);
    }

    #[test]
    fn test_digraphs() {
        assert_eq!(kinds("<: :> <% %> %: %:%:"), ["[", "]", "{", "}", "#", "##"]);
    }

    #[test]
    fn test_three_char_punct() {
        assert_eq!(kinds("a <<= b >>= c ... ##"), ["a", "<<=", "b", ">>=", "c", "...", "##"]);
    }

    #[test]
    fn test_char_literals() {
        let toks = lex_all(r"'a' u'x' U'y' L'z'");
        match toks[0].kind {
            K::Char { value, enc } => {
                assert_eq!(value, 'a' as i32);
                assert_eq!(enc, Encoding::None);
            }
            _ => panic!("not a char"),
        }
        assert!(matches!(toks[1].kind, K::Char { enc: Encoding::Char16, .. }));
        assert!(matches!(toks[2].kind, K::Char { enc: Encoding::Char32, .. }));
        assert!(matches!(toks[3].kind, K::Char { enc: Encoding::Wchar, .. }));
    }

    #[test]
    fn test_unprefixed_char_is_signed() {
        let toks = lex_all(r"'\xff'");
        match toks[0].kind {
            K::Char { value, .. } => assert_eq!(value, -1),
            _ => panic!("not a char"),
        }
    }

    #[test]
    fn test_string_escapes() {
        let toks = lex_all(r#""\x24" "$" "a\tb""#);
        for (i, expected) in [&b"$"[..], &b"$"[..], &b"a\tb"[..]].iter().enumerate() {
            match &toks[i].kind {
                K::Str { value, .. } => assert_eq!(&value[..], *expected),
                k => panic!("not a string: {:?}", k),
            }
        }
    }

    #[test]
    fn test_ucn_in_string_is_utf8() {
        let toks = lex_all(r#""\u00A2""#);
        match &toks[0].kind {
            K::Str { value, .. } => assert_eq!(&value[..], &[0xC2, 0xA2]),
            _ => panic!("not a string"),
        }
    }

    #[test]
    fn test_string_prefixes() {
        let toks = lex_all(r#"u8"a" u"b" U"c" L"d" "e""#);
        let encs: Vec<Encoding> = toks
            .iter()
            .map(|t| match &t.kind {
                K::Str { enc, .. } => *enc,
                _ => panic!(),
            })
            .collect();
        assert_eq!(
            encs,
            [
                Encoding::Utf8,
                Encoding::Char16,
                Encoding::Char32,
                Encoding::Wchar,
                Encoding::None
            ]
        );
    }

    #[test]
    fn test_u8_not_string_is_ident() {
        assert_eq!(kinds("u8 u us"), ["u8", "u", "us"]);
    }

    #[test]
    fn test_ucn_identifier() {
        // Ä decodes to Ä and is stored as UTF-8 in the name
        let toks = lex_all(r"\u00C4bc");
        match toks[0].kind {
            K::Ident(s) => assert_eq!(s.as_str(), "Äbc"),
            _ => panic!("not an ident"),
        }
    }

    #[test]
    fn test_invalid_ucn() {
        let toks = lex_all(r"int \uD800 x");
        assert!(toks.iter().any(|t| matches!(t.kind, K::Invalid)));
    }

    #[test]
    fn test_unterminated_string() {
        let toks = lex_all("\"abc\nx");
        assert!(matches!(toks[0].kind, K::Invalid));
    }

    #[test]
    fn test_stray_char() {
        let toks = lex_all("a ` b");
        assert!(toks.iter().any(|t| matches!(t.kind, K::Invalid)));
    }

    #[test]
    fn test_one_token_from_string() {
        let ctx = Rc::new(Context::new());
        let t = Lexer::one_token_from_string(ctx.clone(), "1234").unwrap();
        assert_eq!(t.to_text(), "1234");
        assert!(Lexer::one_token_from_string(ctx, "+ x").is_none());
    }

    #[test]
    fn test_from_tokens_replays() {
        let ctx = Rc::new(Context::new());
        let toks = lex_all("a b c");
        let n = toks.len();
        let mut lexer = Lexer::from_tokens(ctx, toks);
        for _ in 0..n {
            assert!(!lexer.get_token().is_eof());
        }
        assert!(lexer.get_token().is_eof());
    }

    #[test]
    fn test_line_splice_in_ident() {
        assert_eq!(kinds("ab\\\ncd"), ["abcd"]);
    }
}
