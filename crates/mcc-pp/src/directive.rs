//! Preprocessing directives.
//!
//! Recognized when `#` appears at the beginning of a line: `if ifdef
//! ifndef elif else endif include define undef line error pragma`.
//! Anything else after a line-leading `#` (except a bare newline) is an
//! error. Directive bodies are read from the lexer directly, so newlines
//! remain visible to delimit them.

use crate::macros::Macro;
use crate::{CondIncl, CondKind, Preprocessor};
use mcc_lex::{Punct, Token, TokenKind};
use mcc_util::{Fatal, Result, Symbol};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

impl Preprocessor {
    pub(crate) fn read_directive(&mut self, hash: Token) -> Result<()> {
        let tok = self.lexer.get_token();
        if matches!(tok.kind, TokenKind::Newline) {
            // C11 6.10.7: the null directive
            return Ok(());
        }
        let name = match tok.kind {
            TokenKind::Ident(s) => s,
            _ => return self.invalid_directive(&tok),
        };
        match name.as_str() {
            "if" => self.read_if(),
            "ifdef" => self.read_ifdef(false),
            "ifndef" => self.read_ifdef(true),
            "elif" => self.read_elif(&hash),
            "else" => self.read_else(&hash),
            "endif" => self.read_endif(&hash),
            "include" => self.read_include(&hash),
            "define" => self.read_define(),
            "undef" => self.read_undef(),
            "line" => self.read_line(),
            "error" => self.read_error(&hash),
            "pragma" => self.read_pragma(),
            _ => self.invalid_directive(&tok),
        }
    }

    fn invalid_directive(&mut self, tok: &Token) -> Result<()> {
        self.ctx.diag.error(
            tok.pos,
            format!("invalid preprocessing directive #{}", tok.to_text()),
        );
        Err(Fatal::Preprocess("invalid preprocessing directive".into()))
    }

    fn expect_newline(&mut self) -> Result<()> {
        if !self.lexer.next_newline() {
            let tok = self.lexer.peek_token();
            self.ctx.diag.error(tok.pos, "expected newline");
            return Err(Fatal::Preprocess("expected newline".into()));
        }
        Ok(())
    }

    // ----------------------------------------------------------------
    // C11 6.10.1: conditional inclusion
    // ----------------------------------------------------------------

    /// Gather the rest of the line macro-expanded, folding `defined X`,
    /// `defined(X)` and any remaining identifier to integer tokens, and
    /// hand it to the installed expression evaluator.
    fn read_cond_expr(&mut self) -> Result<bool> {
        let mut toks = Vec::new();
        loop {
            let tok = self.expand_aux()?;
            if matches!(tok.kind, TokenKind::Newline) {
                break;
            }
            if tok.is_eof() {
                self.ctx.diag.error(tok.pos, "unterminated #if");
                return Err(Fatal::Preprocess("unterminated #if".into()));
            }
            if tok.is_ident("defined") {
                let mut ident = self.lexer.get_token();
                let parenthesized = ident.is_punct(Punct::LParen);
                if parenthesized {
                    ident = self.lexer.get_token();
                }
                let name = match ident.kind {
                    TokenKind::Ident(s) => s,
                    _ => {
                        self.ctx.diag.error(ident.pos, "expected identifier");
                        return Err(Fatal::Preprocess("bad 'defined' operand".into()));
                    }
                };
                if parenthesized && !self.lexer.next_punct(Punct::RParen) {
                    self.ctx.diag.error(self.lexer.peek_token().pos, "expected ')'");
                    return Err(Fatal::Preprocess("bad 'defined' operand".into()));
                }
                let text = if self.macros.contains_key(&name) { "1" } else { "0" };
                toks.push(self.number_token(text, tok.pos));
            } else if matches!(tok.kind, TokenKind::Ident(_)) {
                // C11 6.10.1p4: remaining identifiers evaluate to 0
                toks.push(self.number_token("0", tok.pos));
            } else {
                toks.push(tok);
            }
        }
        let eval = self.cond_eval.ok_or_else(|| {
            Fatal::Preprocess("no #if expression evaluator installed".into())
        })?;
        Ok(eval(self.ctx.clone(), toks)? != 0)
    }

    /// Skip tokens until the `elif`/`else`/`endif` matching the current
    /// group, honouring nesting.
    fn skip_cond_incl(&mut self) -> Result<()> {
        let mut level = 0usize;
        loop {
            let tok = self.lexer.get_token();
            if tok.is_eof() {
                self.ctx.diag.error(tok.pos, "unterminated conditional directive");
                return Err(Fatal::Preprocess("unterminated conditional".into()));
            }
            if !tok.begin_of_line || !tok.is_punct(Punct::Hash) {
                continue;
            }
            let hash = tok;
            let tok = self.lexer.get_token();
            if level == 0
                && (tok.is_ident("elif") || tok.is_ident("else") || tok.is_ident("endif"))
            {
                self.lexer.unget_token(tok);
                self.lexer.unget_token(hash);
                return Ok(());
            }
            if tok.is_ident("if") || tok.is_ident("ifdef") || tok.is_ident("ifndef") {
                level += 1;
            } else if tok.is_ident("endif") {
                level = level.saturating_sub(1);
            }
        }
    }

    fn read_if(&mut self) -> Result<()> {
        let is_true = self.read_cond_expr()?;
        self.cond_stack.push(CondIncl {
            kind: CondKind::If,
            was_true: is_true,
        });
        if !is_true {
            self.skip_cond_incl()?;
        }
        Ok(())
    }

    fn read_ifdef(&mut self, negate: bool) -> Result<()> {
        let tok = self.lexer.get_token();
        let name = match tok.kind {
            TokenKind::Ident(s) => s,
            _ => {
                self.ctx.diag.error(tok.pos, "expected identifier");
                return Err(Fatal::Preprocess("bad #ifdef".into()));
            }
        };
        self.expect_newline()?;
        let mut is_true = self.macros.contains_key(&name);
        if negate {
            is_true = !is_true;
        }
        self.cond_stack.push(CondIncl {
            kind: CondKind::If,
            was_true: is_true,
        });
        if !is_true {
            self.skip_cond_incl()?;
        }
        Ok(())
    }

    fn read_elif(&mut self, hash: &Token) -> Result<()> {
        match self.cond_stack.last() {
            None => {
                self.ctx.diag.error(hash.pos, "#elif without #if");
                return Err(Fatal::Preprocess("#elif without #if".into()));
            }
            Some(ci) if ci.kind == CondKind::Else => {
                self.ctx.diag.error(hash.pos, "#elif after #else");
                return Err(Fatal::Preprocess("#elif after #else".into()));
            }
            _ => {}
        }
        let is_true = self.read_cond_expr()?;
        let ci = self.cond_stack.last_mut().unwrap();
        ci.kind = CondKind::Elif;
        if ci.was_true || !is_true {
            self.skip_cond_incl()?;
        } else {
            self.cond_stack.last_mut().unwrap().was_true = true;
        }
        Ok(())
    }

    fn read_else(&mut self, hash: &Token) -> Result<()> {
        match self.cond_stack.last() {
            None => {
                self.ctx.diag.error(hash.pos, "#else without #if");
                return Err(Fatal::Preprocess("#else without #if".into()));
            }
            Some(ci) if ci.kind == CondKind::Else => {
                self.ctx.diag.error(hash.pos, "#else after #else");
                return Err(Fatal::Preprocess("#else after #else".into()));
            }
            _ => {}
        }
        self.expect_newline()?;
        let ci = self.cond_stack.last_mut().unwrap();
        ci.kind = CondKind::Else;
        if ci.was_true {
            self.skip_cond_incl()?;
        }
        Ok(())
    }

    fn read_endif(&mut self, hash: &Token) -> Result<()> {
        if self.cond_stack.is_empty() {
            self.ctx.diag.error(hash.pos, "#endif without #if");
            return Err(Fatal::Preprocess("#endif without #if".into()));
        }
        self.expect_newline()?;
        self.cond_stack.pop();
        Ok(())
    }

    // ----------------------------------------------------------------
    // C11 6.10.2: source file inclusion
    // ----------------------------------------------------------------

    fn try_include(&mut self, dir: &Path, filename: &str) -> Result<bool> {
        let path = if dir.as_os_str().is_empty() {
            PathBuf::from(filename)
        } else {
            dir.join(filename)
        };
        let abs = match path.canonicalize() {
            Ok(p) => p,
            Err(_) => return Ok(false),
        };
        if self.onces.contains(&abs) {
            return Ok(true);
        }
        self.lexer.push_file(&abs)?;
        Ok(true)
    }

    fn read_include(&mut self, hash: &Token) -> Result<()> {
        let tok = self.expand_aux()?;
        let mut is_std = false;
        let filename = match &tok.kind {
            TokenKind::Str { value, .. } => String::from_utf8_lossy(value).into_owned(),
            TokenKind::Punct(Punct::Lt) => {
                let mut name = String::new();
                loop {
                    let t = self.lexer.get_token();
                    match t.kind {
                        TokenKind::Newline | TokenKind::Eof => {
                            self.ctx.diag.error(t.pos, "expected '>'");
                            return Err(Fatal::Preprocess("malformed #include".into()));
                        }
                        TokenKind::Punct(Punct::Gt) => break,
                        _ => name.push_str(&t.to_text()),
                    }
                }
                is_std = true;
                name
            }
            _ => {
                self.ctx
                    .diag
                    .error(tok.pos, "#include expects \"FILENAME\" or <FILENAME>");
                return Err(Fatal::Preprocess("malformed #include".into()));
            }
        };
        self.expect_newline()?;

        if filename.starts_with('/') {
            if self.try_include(Path::new(""), &filename)? {
                return Ok(());
            }
        } else {
            if !is_std {
                // the including file's directory first for "..."
                let dir = Path::new(hash.pos.file.as_str())
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("."));
                if self.try_include(&dir, &filename)? {
                    return Ok(());
                }
            }
            let paths = self.include_paths.clone();
            for dir in &paths {
                if self.try_include(dir, &filename)? {
                    return Ok(());
                }
            }
        }
        self.ctx.diag.error(
            hash.pos,
            format!("no such file or directory: {}", filename),
        );
        Err(Fatal::Io(format!("no such file or directory: {}", filename)))
    }

    // ----------------------------------------------------------------
    // C11 6.10.3: macro replacement
    // ----------------------------------------------------------------

    fn hashhash_check(&self, body: &[Token]) -> Result<()> {
        if let Some(first) = body.first() {
            if first.is_punct(Punct::HashHash) {
                self.ctx
                    .diag
                    .error(first.pos, "'##' cannot appear at start of macro expansion");
                return Err(Fatal::Preprocess("'##' at start of macro body".into()));
            }
        }
        if let Some(last) = body.last() {
            if last.is_punct(Punct::HashHash) {
                self.ctx
                    .diag
                    .error(last.pos, "'##' cannot appear at end of macro expansion");
                return Err(Fatal::Preprocess("'##' at end of macro body".into()));
            }
        }
        Ok(())
    }

    fn read_define(&mut self) -> Result<()> {
        let name_tok = self.lexer.get_token();
        let name = match name_tok.kind {
            TokenKind::Ident(s) => s,
            _ => {
                self.ctx.diag.error(name_tok.pos, "expected identifier");
                return Err(Fatal::Preprocess("bad #define".into()));
            }
        };
        let tok = self.lexer.get_token();
        if tok.is_punct(Punct::LParen) && !tok.leading_space {
            return self.read_function_macro(name);
        }
        self.lexer.unget_token(tok);
        self.read_object_macro(name)
    }

    fn read_object_macro(&mut self, name: Symbol) -> Result<()> {
        let mut body = Vec::new();
        loop {
            let tok = self.lexer.get_token();
            if matches!(tok.kind, TokenKind::Newline | TokenKind::Eof) {
                break;
            }
            body.push(tok);
        }
        self.hashhash_check(&body)?;
        self.macros.insert(name, Macro::Object { body });
        Ok(())
    }

    fn read_function_macro(&mut self, name: Symbol) -> Result<()> {
        let mut params: HashMap<Symbol, (usize, bool)> = HashMap::new();
        let mut position = 0usize;
        let mut variadic = false;

        // parameter list
        loop {
            let mut tok = self.lexer.get_token();
            if tok.is_punct(Punct::RParen) {
                break;
            }
            if position > 0 {
                if !tok.is_punct(Punct::Comma) {
                    self.ctx.diag.error(tok.pos, "expected ','");
                    return Err(Fatal::Preprocess("bad macro parameter list".into()));
                }
                tok = self.lexer.get_token();
            }
            if matches!(tok.kind, TokenKind::Newline | TokenKind::Eof) {
                self.ctx
                    .diag
                    .error(tok.pos, "missing ')' in macro parameter list");
                return Err(Fatal::Preprocess("bad macro parameter list".into()));
            }
            if tok.is_punct(Punct::Ellipsis) {
                variadic = true;
                params.insert(Symbol::intern("__VA_ARGS__"), (position, true));
                position += 1;
                if !self.lexer.next_punct(Punct::RParen) {
                    self.ctx.diag.error(self.lexer.peek_token().pos, "expected ')'");
                    return Err(Fatal::Preprocess("bad macro parameter list".into()));
                }
                break;
            }
            let pname = match tok.kind {
                TokenKind::Ident(s) => s,
                _ => {
                    self.ctx.diag.error(tok.pos, "expected identifier");
                    return Err(Fatal::Preprocess("bad macro parameter list".into()));
                }
            };
            // `name...` also marks the variadic position
            if self.lexer.next_punct(Punct::Ellipsis) {
                variadic = true;
                params.insert(pname, (position, true));
                position += 1;
                if !self.lexer.next_punct(Punct::RParen) {
                    self.ctx.diag.error(self.lexer.peek_token().pos, "expected ')'");
                    return Err(Fatal::Preprocess("bad macro parameter list".into()));
                }
                break;
            }
            params.insert(pname, (position, false));
            position += 1;
        }

        // body, with parameters replaced by positional placeholders
        let mut body = Vec::new();
        loop {
            let tok = self.lexer.get_token();
            if matches!(tok.kind, TokenKind::Newline | TokenKind::Eof) {
                break;
            }
            if let TokenKind::Ident(s) = tok.kind {
                if let Some(&(pos_idx, is_vararg)) = params.get(&s) {
                    let mut subst = Token::new(
                        TokenKind::MacroParam {
                            position: pos_idx,
                            is_vararg,
                        },
                        tok.pos,
                    );
                    subst.leading_space = tok.leading_space;
                    body.push(subst);
                    continue;
                }
            }
            body.push(tok);
        }

        self.hashhash_check(&body)?;
        self.macros.insert(
            name,
            Macro::Function {
                body,
                nargs: params.len(),
                variadic,
            },
        );
        Ok(())
    }

    fn read_undef(&mut self) -> Result<()> {
        let tok = self.lexer.get_token();
        let name = match tok.kind {
            TokenKind::Ident(s) => s,
            _ => {
                self.ctx.diag.error(tok.pos, "expected identifier");
                return Err(Fatal::Preprocess("bad #undef".into()));
            }
        };
        self.macros.shift_remove(&name);
        Ok(())
    }

    // ----------------------------------------------------------------
    // C11 6.10.4: line control
    // ----------------------------------------------------------------

    fn read_line(&mut self) -> Result<()> {
        let tok = self.expand_aux()?;
        let row = match tok.kind {
            TokenKind::Number(s) if s.as_str().bytes().all(|b| b.is_ascii_digit()) => {
                s.as_str().parse::<u32>().unwrap_or(0)
            }
            _ => {
                self.ctx.diag.error(tok.pos, "number expected after #line");
                return Err(Fatal::Preprocess("bad #line".into()));
            }
        };
        let tok = self.expand_aux()?;
        let filename = match &tok.kind {
            TokenKind::Str { value, .. } => {
                let name = Symbol::intern(&String::from_utf8_lossy(value));
                self.expect_newline()?;
                Some(name)
            }
            TokenKind::Newline => None,
            _ => {
                self.ctx
                    .diag
                    .error(tok.pos, "expected newline or a source name");
                return Err(Fatal::Preprocess("bad #line".into()));
            }
        };
        let frame = self.lexer.fileset().current_frame_mut();
        frame.row = row;
        if let Some(name) = filename {
            frame.name = name;
        }
        Ok(())
    }

    // ----------------------------------------------------------------
    // C11 6.10.5: error directive
    // ----------------------------------------------------------------

    fn read_error(&mut self, hash: &Token) -> Result<()> {
        let mut text = String::new();
        loop {
            let tok = self.lexer.get_token();
            if matches!(tok.kind, TokenKind::Newline | TokenKind::Eof) {
                break;
            }
            if !text.is_empty() && tok.leading_space {
                text.push(' ');
            }
            text.push_str(&tok.to_text());
        }
        self.ctx.diag.error(hash.pos, format!("#error: {}", text));
        Err(Fatal::Preprocess(format!("#error: {}", text)))
    }

    // ----------------------------------------------------------------
    // C11 6.10.6: pragma directive
    // ----------------------------------------------------------------

    pub(crate) fn read_pragma_operands(&mut self, toks: &[Token]) -> Result<()> {
        let first = &toks[0];
        match first.kind {
            TokenKind::Ident(s) if s.as_str() == "once" => {
                let path = Path::new(first.pos.file.as_str());
                if let Ok(abs) = path.canonicalize() {
                    self.onces.insert(abs);
                }
            }
            TokenKind::Ident(s) if s.as_str() == "message" => {
                let mut text = String::from("#pragma");
                for tok in toks {
                    if tok.leading_space {
                        text.push(' ');
                    }
                    text.push_str(&tok.to_text());
                }
                self.ctx.diag.note(first.pos, text);
            }
            // unknown pragmas are ignored
            _ => {}
        }
        Ok(())
    }

    fn read_pragma(&mut self) -> Result<()> {
        let mut toks = Vec::new();
        let mut tok = self.lexer.get_token();
        if matches!(tok.kind, TokenKind::Newline | TokenKind::Eof) {
            self.ctx
                .diag
                .error(tok.pos, "invalid preprocessing directive #pragma");
            return Err(Fatal::Preprocess("bad #pragma".into()));
        }
        while !matches!(tok.kind, TokenKind::Newline | TokenKind::Eof) {
            toks.push(tok);
            tok = self.lexer.get_token();
        }
        self.read_pragma_operands(&toks)
    }
}
