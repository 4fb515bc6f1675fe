//! Hide-set macro expansion.
//!
//! `expand_aux` examines one lexed token. If it names a macro that is not
//! in the token's hide-set the macro is substituted, the result is pushed
//! back onto the input, and scanning continues; otherwise the token is
//! returned as-is. Substituted tokens receive the invocation's hide-set
//! plus the macro's own name, which is the termination argument for the
//! whole algorithm.

use crate::macros::Macro;
use crate::Preprocessor;
use mcc_lex::{Encoding, HideSet, Lexer, Punct, Token, TokenKind};
use mcc_util::{Fatal, Result, Symbol};

impl Preprocessor {
    /// Expand until a non-newline token emerges.
    pub(crate) fn expand(&mut self) -> Result<Token> {
        loop {
            let tok = self.expand_aux()?;
            if !matches!(tok.kind, TokenKind::Newline) {
                return Ok(tok);
            }
        }
    }

    /// One scanning step.
    pub(crate) fn expand_aux(&mut self) -> Result<Token> {
        let tok = self.lexer.get_token();
        let name = match tok.kind {
            TokenKind::Ident(name) => name,
            _ => return Ok(tok),
        };
        if tok.hideset.contains(name) {
            return Ok(tok);
        }
        let mac = match self.macros.get(&name) {
            None => return Ok(tok),
            Some(m) => m.clone(),
        };

        match mac {
            Macro::Object { body } => {
                let hideset = tok.hideset.insert(name);
                let mut toks = self.subst(&body, &[], &hideset)?;
                if let Some(first) = toks.first_mut() {
                    first.leading_space = tok.leading_space;
                    first.begin_of_line = tok.begin_of_line;
                }
                self.unget_all(toks);
                self.expand_aux()
            }
            Macro::Function {
                body,
                nargs,
                variadic,
            } => {
                if !self.lexer.next_punct(Punct::LParen) {
                    return Ok(tok);
                }
                let args = self.read_args(&tok, nargs, variadic)?;
                let rparen = self.lexer.get_token();
                if !rparen.is_punct(Punct::RParen) {
                    self.ctx.diag.error(rparen.pos, "expected ')'");
                    return Err(Fatal::Preprocess("malformed macro invocation".into()));
                }
                let hideset = tok.hideset.intersect(&rparen.hideset).insert(name);
                let mut toks = self.subst(&body, &args, &hideset)?;
                if let Some(first) = toks.first_mut() {
                    first.leading_space = tok.leading_space;
                    first.begin_of_line = tok.begin_of_line;
                }
                self.unget_all(toks);
                self.expand_aux()
            }
            Macro::Predefined(kind) => match self.expand_predefined(kind, &tok)? {
                Some(subst_tok) => Ok(subst_tok),
                None => self.expand_aux(),
            },
        }
    }

    fn unget_all(&mut self, toks: Vec<Token>) {
        for tok in toks.into_iter().rev() {
            self.lexer.unget_token(tok);
        }
    }

    /// Read one macro argument (a balanced token sequence up to a
    /// top-level `,` or `)`). Returns true when the list is finished.
    fn read_one_arg(
        &mut self,
        ident: &Token,
        args: &mut Vec<Vec<Token>>,
        is_ellipsis: bool,
    ) -> Result<bool> {
        let mut lparen = 0usize;
        let mut arg = Vec::new();
        loop {
            let tok = self.lexer.get_token();
            match tok.kind {
                TokenKind::Eof => {
                    self.ctx.diag.error(
                        ident.pos,
                        format!(
                            "unterminated argument list invoking macro '{}'",
                            ident.to_text()
                        ),
                    );
                    return Err(Fatal::Preprocess("unterminated macro argument list".into()));
                }
                TokenKind::Newline => continue,
                _ => {}
            }
            if tok.begin_of_line && tok.is_punct(Punct::Hash) {
                self.read_directive(tok)?;
                continue;
            }
            if lparen == 0 && tok.is_punct(Punct::RParen) {
                self.lexer.unget_token(tok);
                args.push(arg);
                return Ok(true);
            }
            if lparen == 0 && tok.is_punct(Punct::Comma) && !is_ellipsis {
                args.push(arg);
                return Ok(false);
            }
            if tok.is_punct(Punct::LParen) {
                lparen += 1;
            } else if tok.is_punct(Punct::RParen) {
                lparen -= 1;
            }
            let mut tok = tok;
            if tok.begin_of_line {
                tok.begin_of_line = false;
                tok.leading_space = true;
            }
            arg.push(tok);
        }
    }

    pub(crate) fn read_args(
        &mut self,
        ident: &Token,
        nargs: usize,
        variadic: bool,
    ) -> Result<Vec<Vec<Token>>> {
        let mut args: Vec<Vec<Token>> = Vec::new();
        if nargs == 0 && self.lexer.peek_token().is_punct(Punct::RParen) {
            return Ok(args);
        }
        let mut finished = false;
        while !finished {
            let is_ellipsis = variadic && args.len() + 1 == nargs;
            finished = self.read_one_arg(ident, &mut args, is_ellipsis)?;
        }
        // f(a) against f(x, ...): the variadic slot may be left empty
        if variadic && args.len() + 1 == nargs {
            args.push(Vec::new());
        }
        if args.len() != nargs {
            self.ctx.diag.error(
                ident.pos,
                format!(
                    "macro '{}' requires {} arguments, but only {} given",
                    ident.to_text(),
                    nargs,
                    args.len()
                ),
            );
            return Err(Fatal::Preprocess("macro argument count mismatch".into()));
        }
        Ok(args)
    }

    /// `#param`: a string literal from the argument's spelling, single
    /// spaces re-inserted where tokens had leading space.
    fn stringize(&self, templ: &Token, arg: &[Token]) -> Token {
        let mut text = String::new();
        for tok in arg {
            if !text.is_empty() && tok.leading_space {
                text.push(' ');
            }
            text.push_str(&tok.to_text());
        }
        let mut str_tok = Token::new(
            TokenKind::Str {
                value: text.into_bytes().into(),
                enc: Encoding::None,
            },
            templ.pos,
        );
        templ.copy_attrs_to(&mut str_tok);
        str_tok
    }

    /// `##`: re-lex the concatenation of the last result token and
    /// `right`. The glued token takes its position from the left side.
    fn glue(&mut self, res: &mut Vec<Token>, right: &Token) -> Result<()> {
        let left = res.pop().expect("'##' with no left operand");
        let text = format!("{}{}", left.to_text(), right.to_text());
        match Lexer::one_token_from_string(self.ctx.clone(), &text) {
            Some(mut tok) => {
                left.copy_attrs_to(&mut tok);
                res.push(tok);
                Ok(())
            }
            None => {
                self.ctx.diag.error(
                    left.pos,
                    format!("pasting \"{}\" does not give a valid token", text),
                );
                Err(Fatal::Preprocess("invalid token paste".into()))
            }
        }
    }

    /// Apply the substitution rules to a macro body, then union `hideset`
    /// into every resulting token.
    pub(crate) fn subst(
        &mut self,
        body: &[Token],
        args: &[Vec<Token>],
        hideset: &HideSet,
    ) -> Result<Vec<Token>> {
        let mut res: Vec<Token> = Vec::new();
        let mut i = 0;
        while i < body.len() {
            let left = &body[i];
            let right = body.get(i + 1);
            let left_param = match left.kind {
                TokenKind::MacroParam { position, .. } => Some(position),
                _ => None,
            };
            let right_param = right.and_then(|t| match t.kind {
                TokenKind::MacroParam {
                    position,
                    is_vararg,
                } => Some((position, is_vararg)),
                _ => None,
            });

            // #param -> string
            if left.is_punct(Punct::Hash) {
                if let Some((position, _)) = right_param {
                    res.push(self.stringize(left, &args[position]));
                    i += 2;
                    continue;
                }
            }

            // [GNU] ,##__VA_ARGS__ drops the comma when the varargs are
            // empty; otherwise it expands to the raw argument tokens.
            if left.is_punct(Punct::HashHash) {
                if let Some((position, is_vararg)) = right_param {
                    let arg = &args[position];
                    if is_vararg && res.last().map_or(false, |t| t.is_punct(Punct::Comma)) {
                        if arg.is_empty() {
                            res.pop();
                        } else {
                            res.extend(arg.iter().cloned());
                        }
                    } else if !arg.is_empty() {
                        self.glue(&mut res, &arg[0])?;
                        res.extend(arg.iter().skip(1).cloned());
                    }
                    i += 2;
                    continue;
                }
                if let Some(right) = right {
                    let right = right.clone();
                    self.glue(&mut res, &right)?;
                    i += 2;
                    continue;
                }
            }

            // a parameter next to '##' is inserted without expansion
            if let Some(position) = left_param {
                if right.map_or(false, |t| t.is_punct(Punct::HashHash)) {
                    let arg = &args[position];
                    if arg.is_empty() {
                        i += 2;
                    } else {
                        res.extend(arg.iter().cloned());
                        i += 1;
                    }
                    continue;
                }
                // any other parameter: fully macro-expanded copy
                let arg = args[position].clone();
                let expanded = self.expand_all(left, arg)?;
                res.extend(expanded);
                i += 1;
                continue;
            }

            res.push(left.clone());
            i += 1;
        }

        for tok in &mut res {
            tok.hideset = tok.hideset.union(hideset);
        }
        Ok(res)
    }

    /// Fully expand a token list (a macro argument) with a nested input,
    /// preserving hide-sets across the boundary.
    fn expand_all(&mut self, templ: &Token, toks: Vec<Token>) -> Result<Vec<Token>> {
        let nested = Lexer::from_tokens(self.ctx.clone(), toks);
        let saved = std::mem::replace(&mut self.lexer, nested);
        let mut res = Vec::new();
        let mut failure = None;
        loop {
            match self.expand() {
                Ok(tok) if tok.is_eof() => break,
                Ok(tok) => res.push(tok),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        self.lexer = saved;
        if let Some(e) = failure {
            return Err(e);
        }
        if let Some(first) = res.first_mut() {
            first.leading_space = templ.leading_space;
            first.begin_of_line = templ.begin_of_line;
        }
        Ok(res)
    }

    /// Make a plain number token, used when folding `defined` and unknown
    /// identifiers in `#if` lines.
    pub(crate) fn number_token(&self, text: &str, pos: mcc_util::Pos) -> Token {
        Token::new(TokenKind::Number(Symbol::intern(text)), pos)
    }
}
