//! Statements.
//!
//! Control flow lowers to labels and jumps during parsing: loops push
//! `continue`/`break` labels on the scope so the jump statements resolve
//! by position, and `switch` lowers to a compare-and-goto sequence in
//! front of its body.

use crate::ast::{NodeId, NodeKind, UnaryOp};
use crate::scope::CaseRange;
use crate::BinaryOp;
use crate::Parser;
use mcc_lex::{Keyword, Punct, Token, TokenKind};
use mcc_sem::{TypeId, TypeKind};
use mcc_util::Result;

impl Parser {
    /// One statement; `None` for the empty statement.
    pub(crate) fn read_stmt(&mut self) -> Result<Option<NodeId>> {
        let tok = self.pp.get_token()?;
        match &tok.kind {
            TokenKind::Ident(_) => {
                if self.pp.next_punct(Punct::Colon)? {
                    return self.read_label_stmt(&tok);
                }
            }
            TokenKind::Punct(Punct::LBrace) => return self.read_compound_stmt(&tok),
            TokenKind::Keyword(kw) => match kw {
                Keyword::If => return self.read_if_stmt(&tok),
                Keyword::Switch => return self.read_switch_stmt(&tok),
                Keyword::Case => return self.read_case_stmt(&tok),
                Keyword::Default => return self.read_default_stmt(&tok),
                Keyword::While => return self.read_while_stmt(&tok),
                Keyword::Do => return self.read_do_stmt(&tok),
                Keyword::For => return self.read_for_stmt(&tok),
                Keyword::Goto => return self.read_goto_stmt(&tok),
                Keyword::Continue => return self.read_continue_stmt(&tok),
                Keyword::Break => return self.read_break_stmt(&tok),
                Keyword::Return => return self.read_return_stmt(&tok),
                _ => {}
            },
            _ => {}
        }
        self.pp.unget_token(tok);
        self.read_expr_stmt()
    }

    // ----------------------------------------------------------------
    // labeled statements
    // ----------------------------------------------------------------

    fn read_label_stmt(&mut self, tok: &Token) -> Result<Option<NodeId>> {
        let origin = tok.ident().expect("label identifier");
        if self.labels.contains_key(&origin) {
            self.error_at(tok, format!("duplicate label '{}'", origin));
            return Ok(Some(NodeId::ERROR));
        }
        let normal = self.ctx.make_label();
        self.labels.insert(origin, normal);
        let label = self.make_label_node(tok, normal);
        self.read_label_stmt_tail(label)
    }

    fn read_case_stmt(&mut self, tok: &Token) -> Result<Option<NodeId>> {
        let label = self.ctx.make_label();
        let begin_node = self.read_const_expr()?;
        let begin = self.const_int(begin_node)?;
        // [GNU] case ranges
        let end = if self.pp.next_punct(Punct::Ellipsis)? {
            let end_node = self.read_const_expr()?;
            let end = self.const_int(end_node)?;
            if begin > end {
                self.error_at(
                    tok,
                    format!("case range is invalid: from {} to {}", begin, end),
                );
                return Ok(Some(NodeId::ERROR));
            }
            end
        } else {
            begin
        };
        if !self.pp.next_punct(Punct::Colon)? {
            let t = self.pp.peek_token()?;
            self.error_at(&t, "expected ':'");
            return Ok(Some(NodeId::ERROR));
        }
        if !self.scope.in_switch() {
            self.error_at(tok, "case label not within a switch statement");
            return Ok(Some(NodeId::ERROR));
        }
        // C11 6.8.4.2p3: no two case expressions share a value
        for c in self.scope.cases() {
            if end >= c.begin && c.end >= begin {
                self.error_at(tok, format!("duplicate case value: {} ... {}", begin, end));
                break;
            }
        }
        self.scope.add_case(CaseRange { begin, end, label });
        let node = self.make_label_node(tok, label);
        self.read_label_stmt_tail(node)
    }

    fn read_default_stmt(&mut self, tok: &Token) -> Result<Option<NodeId>> {
        let label = self.ctx.make_label();
        if !self.scope.in_switch() {
            self.error_at(tok, "'default' label not within a switch statement");
            return Ok(Some(NodeId::ERROR));
        }
        if self.scope.default_label().is_some() {
            self.error_at(tok, "duplicate 'default' label");
            return Ok(Some(NodeId::ERROR));
        }
        if !self.pp.next_punct(Punct::Colon)? {
            let t = self.pp.peek_token()?;
            self.error_at(&t, "expected ':'");
            return Ok(Some(NodeId::ERROR));
        }
        self.scope.set_default_label(label);
        let node = self.make_label_node(tok, label);
        self.read_label_stmt_tail(node)
    }

    /// A label binds to the statement that follows it.
    fn read_label_stmt_tail(&mut self, label: NodeId) -> Result<Option<NodeId>> {
        let mut list = vec![label];
        if let Some(stmt) = self.read_stmt()? {
            list.push(stmt);
        }
        let tok = self.node_tok(label);
        Ok(Some(self.make_compound_node(&tok, list)))
    }

    // ----------------------------------------------------------------
    // compound statement
    // ----------------------------------------------------------------

    /// `{` has been consumed by the caller.
    pub(crate) fn read_compound_stmt(&mut self, tok: &Token) -> Result<Option<NodeId>> {
        self.scope.enter();
        let mut list = Vec::new();
        loop {
            if self.pp.next_punct(Punct::RBrace)? {
                break;
            }
            self.read_block_item(&mut list)?;
        }
        self.scope.exit();
        if list.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.make_compound_node(tok, list)))
    }

    fn read_block_item(&mut self, list: &mut Vec<NodeId>) -> Result<()> {
        let tok = self.pp.peek_token()?;
        if tok.is_eof() {
            self.error_at(&tok, "expected declaration or statement at end of input");
            return Err(mcc_util::Fatal::Parse(
                "unexpected end of input in block".into(),
            ));
        }
        if self.is_type_name(&tok) || tok.is_keyword(Keyword::StaticAssert) {
            self.read_decl(list, false)?;
        } else if let Some(stmt) = self.read_stmt()? {
            list.push(stmt);
        }
        Ok(())
    }

    // ----------------------------------------------------------------
    // expression statements, conditions
    // ----------------------------------------------------------------

    fn read_expr_stmt(&mut self) -> Result<Option<NodeId>> {
        if self.pp.next_punct(Punct::Semi)? {
            return Ok(None);
        }
        let expr = self.read_expr()?;
        if !self.pp.next_punct(Punct::Semi)? {
            let t = self.pp.peek_token()?;
            self.error_at(&t, "expected ';'");
        }
        Ok(Some(expr))
    }

    /// A controlling expression: scalar, with floats compared against
    /// zero through a bool conversion.
    fn read_boolean_expr(&mut self) -> Result<NodeId> {
        let raw = self.read_expr()?;
        let cond = self.convert(raw);
        let ty = self.ty_of(cond);
        if !self.types.get(ty).is_scalar_type() {
            let tok = self.node_tok(cond);
            self.error_at(&tok, "scalar type is required");
            return Ok(NodeId::ERROR);
        }
        if self.types.get(ty).is_float_type() {
            return Ok(self.convert_to(cond, TypeId::BOOL));
        }
        Ok(cond)
    }

    // ----------------------------------------------------------------
    // selection statements
    // ----------------------------------------------------------------

    fn read_if_stmt(&mut self, tok: &Token) -> Result<Option<NodeId>> {
        if !self.pp.next_punct(Punct::LParen)? {
            let t = self.pp.peek_token()?;
            self.error_at(&t, "expected '('");
            return Ok(Some(NodeId::ERROR));
        }
        let cond = self.read_boolean_expr()?;
        if !self.pp.next_punct(Punct::RParen)? {
            let t = self.pp.peek_token()?;
            self.error_at(&t, "expected ')'");
            return Ok(Some(NodeId::ERROR));
        }
        let then = self.read_stmt()?;
        let els = if self.pp.next_keyword(Keyword::Else)? {
            self.read_stmt()?
        } else {
            None
        };
        Ok(Some(self.nodes.push(
            NodeKind::If { cond, then, els },
            Some(tok.clone()),
            None,
        )))
    }

    /// `switch` lowers to `tmp = expr; if (tmp == C) goto L; ...; goto
    /// default-or-end; body; end:`.
    fn read_switch_stmt(&mut self, tok: &Token) -> Result<Option<NodeId>> {
        if !self.pp.next_punct(Punct::LParen)? {
            let t = self.pp.peek_token()?;
            self.error_at(&t, "expected '('");
            return Ok(Some(NodeId::ERROR));
        }
        let raw = self.read_expr()?;
        let expr = self.convert(raw);
        let expr_ty = self.ty_of(expr);
        if !self.types.get(expr_ty).is_int_type() {
            let t = self.node_tok(expr);
            self.error_at(&t, "switch quantity not an integer");
            return Ok(Some(NodeId::ERROR));
        }
        if !self.pp.next_punct(Punct::RParen)? {
            let t = self.pp.peek_token()?;
            self.error_at(&t, "expected ')'");
            return Ok(Some(NodeId::ERROR));
        }

        let end = self.ctx.make_label();
        self.scope.enter_switch(end);
        let body = self.read_stmt()?;
        let (cases, default) = self.scope.exit_switch();

        let mut list = Vec::new();
        let tmp = self.ctx.make_tmpname();
        let expr_tok = self.node_tok(expr);
        let var = self.make_localvar_node(&expr_tok, expr_ty, Some(tmp));
        list.push(self.make_binary(tok, BinaryOp::Assign, expr_ty, var, expr));
        for case in &cases {
            list.push(self.make_switch_jump(var, case));
        }
        let default_label = default.unwrap_or(end);
        list.push(self.make_jump_node(tok, default_label, Some(default_label)));
        if let Some(body) = body {
            list.push(body);
        }
        list.push(self.make_label_node(tok, end));

        Ok(Some(self.make_compound_node(tok, list)))
    }

    fn make_switch_jump(&mut self, var: NodeId, case: &CaseRange) -> NodeId {
        let tok = self.node_tok(var);
        let cond = if case.begin == case.end {
            let value = self.make_int_node(&tok, TypeId::INT, case.begin);
            self.make_binop(&tok, BinaryOp::Eq, var, value)
        } else {
            // case lo ... hi: lo <= var && var <= hi
            let lo = self.make_int_node(&tok, TypeId::INT, case.begin);
            let hi = self.make_int_node(&tok, TypeId::INT, case.end);
            let c1 = self.make_binop(&tok, BinaryOp::Le, lo, var);
            let c2 = self.make_binop(&tok, BinaryOp::Le, var, hi);
            self.make_binary(&tok, BinaryOp::LogAnd, TypeId::INT, c1, c2)
        };
        let jump = self.make_jump_node(&tok, case.label, Some(case.label));
        self.nodes.push(
            NodeKind::If {
                cond,
                then: Some(jump),
                els: None,
            },
            Some(tok),
            None,
        )
    }

    // ----------------------------------------------------------------
    // iteration statements
    // ----------------------------------------------------------------

    fn read_while_stmt(&mut self, tok: &Token) -> Result<Option<NodeId>> {
        if !self.pp.next_punct(Punct::LParen)? {
            let t = self.pp.peek_token()?;
            self.error_at(&t, "expected '('");
            return Ok(Some(NodeId::ERROR));
        }
        let begin = self.ctx.make_label();
        let end = self.ctx.make_label();
        self.scope.enter_loop(begin, end);

        let cond = self.read_boolean_expr()?;
        if !self.pp.next_punct(Punct::RParen)? {
            let t = self.pp.peek_token()?;
            self.error_at(&t, "expected ')'");
            self.scope.exit_loop();
            return Ok(Some(NodeId::ERROR));
        }
        let body = self.read_stmt()?;
        self.scope.exit_loop();

        let mut list = Vec::new();
        list.push(self.make_label_node(tok, begin));
        let out = self.make_jump_node(tok, end, Some(end));
        list.push(self.nodes.push(
            NodeKind::If {
                cond,
                then: body,
                els: Some(out),
            },
            Some(tok.clone()),
            None,
        ));
        list.push(self.make_jump_node(tok, begin, Some(begin)));
        list.push(self.make_label_node(tok, end));
        Ok(Some(self.make_compound_node(tok, list)))
    }

    fn read_do_stmt(&mut self, tok: &Token) -> Result<Option<NodeId>> {
        let begin = self.ctx.make_label();
        let end = self.ctx.make_label();
        self.scope.enter_loop(begin, end);
        let body = self.read_stmt()?;

        let mut bad = false;
        if !self.pp.next_keyword(Keyword::While)? {
            let t = self.pp.peek_token()?;
            self.error_at(&t, "expected 'while'");
            bad = true;
        }
        if !bad && !self.pp.next_punct(Punct::LParen)? {
            let t = self.pp.peek_token()?;
            self.error_at(&t, "expected '('");
            bad = true;
        }
        if bad {
            self.scope.exit_loop();
            return Ok(Some(NodeId::ERROR));
        }
        let cond = self.read_boolean_expr()?;
        if !self.pp.next_punct(Punct::RParen)? {
            let t = self.pp.peek_token()?;
            self.error_at(&t, "expected ')'");
            self.scope.exit_loop();
            return Ok(Some(NodeId::ERROR));
        }
        if !self.pp.next_punct(Punct::Semi)? {
            let t = self.pp.peek_token()?;
            self.error_at(&t, "expected ';'");
        }
        self.scope.exit_loop();

        let mut list = Vec::new();
        list.push(self.make_label_node(tok, begin));
        if let Some(body) = body {
            list.push(body);
        }
        let back = self.make_jump_node(tok, begin, Some(begin));
        list.push(self.nodes.push(
            NodeKind::If {
                cond,
                then: Some(back),
                els: None,
            },
            Some(tok.clone()),
            None,
        ));
        list.push(self.make_label_node(tok, end));
        Ok(Some(self.make_compound_node(tok, list)))
    }

    fn read_for_stmt(&mut self, tok: &Token) -> Result<Option<NodeId>> {
        if !self.pp.next_punct(Punct::LParen)? {
            let t = self.pp.peek_token()?;
            self.error_at(&t, "expected '('");
            return Ok(Some(NodeId::ERROR));
        }
        let begin = self.ctx.make_label();
        let next = self.ctx.make_label();
        let end = self.ctx.make_label();
        // continue targets the step label
        self.scope.enter_loop(next, end);

        let init = self.read_for_init()?;
        let cond = if self.pp.next_punct(Punct::Semi)? {
            None
        } else {
            let c = self.read_boolean_expr()?;
            if !self.pp.next_punct(Punct::Semi)? {
                let t = self.pp.peek_token()?;
                self.error_at(&t, "expected ';'");
                self.scope.exit_loop();
                return Ok(Some(NodeId::ERROR));
            }
            Some(c)
        };
        let step = if self.pp.next_punct(Punct::RParen)? {
            None
        } else {
            let s = self.read_expr()?;
            if !self.pp.next_punct(Punct::RParen)? {
                let t = self.pp.peek_token()?;
                self.error_at(&t, "expected ')'");
                self.scope.exit_loop();
                return Ok(Some(NodeId::ERROR));
            }
            Some(s)
        };
        let body = self.read_stmt()?;
        self.scope.exit_loop();

        let mut list = Vec::new();
        if let Some(init) = init {
            list.push(init);
        }
        list.push(self.make_label_node(tok, begin));
        if let Some(cond) = cond {
            let out = self.make_jump_node(tok, end, Some(end));
            list.push(self.nodes.push(
                NodeKind::If {
                    cond,
                    then: None,
                    els: Some(out),
                },
                Some(tok.clone()),
                None,
            ));
        }
        if let Some(body) = body {
            list.push(body);
        }
        list.push(self.make_label_node(tok, next));
        if let Some(step) = step {
            list.push(step);
        }
        list.push(self.make_jump_node(tok, begin, Some(begin)));
        list.push(self.make_label_node(tok, end));
        Ok(Some(self.make_compound_node(tok, list)))
    }

    /// The first clause of a `for`: a declaration or an expression
    /// statement.
    fn read_for_init(&mut self) -> Result<Option<NodeId>> {
        let tok = self.pp.peek_token()?;
        if tok.is_eof() {
            self.error_at(&tok, "expected declaration or statement at end of input");
            return Ok(Some(NodeId::ERROR));
        }
        let mut list = Vec::new();
        if self.is_type_name(&tok) || tok.is_keyword(Keyword::StaticAssert) {
            self.read_decl(&mut list, false)?;
        } else {
            match self.read_expr_stmt()? {
                Some(expr) => list.push(expr),
                None => return Ok(None),
            }
        }
        Ok(Some(self.make_compound_node(&tok, list)))
    }

    // ----------------------------------------------------------------
    // jump statements
    // ----------------------------------------------------------------

    fn read_goto_stmt(&mut self, tok: &Token) -> Result<Option<NodeId>> {
        // [GNU] goto *expr
        if self.pp.next_punct(Punct::Star)? {
            let t = self.pp.peek_token()?;
            let expr = self.read_cast_expr()?;
            if !matches!(
                self.types.get(self.ty_of(expr)).kind,
                TypeKind::Ptr { .. }
            ) {
                self.error_at(&t, "pointer expected for computed goto");
                return Ok(Some(NodeId::ERROR));
            }
            if !self.pp.next_punct(Punct::Semi)? {
                let t = self.pp.peek_token()?;
                self.error_at(&t, "expected ';'");
            }
            return Ok(Some(self.make_unary(
                tok,
                UnaryOp::ComputedGoto,
                None,
                expr,
            )));
        }
        let ident = self.pp.get_token()?;
        let origin = match ident.ident() {
            Some(s) => s,
            None => {
                self.error_at(&ident, "expected identifier for goto");
                return Ok(Some(NodeId::ERROR));
            }
        };
        if !self.pp.next_punct(Punct::Semi)? {
            let t = self.pp.peek_token()?;
            self.error_at(&t, "expected ';'");
            return Ok(Some(NodeId::ERROR));
        }
        let node = self.make_jump_node(&ident, origin, None);
        self.gotos.push(node);
        Ok(Some(node))
    }

    fn read_continue_stmt(&mut self, tok: &Token) -> Result<Option<NodeId>> {
        if !self.pp.next_punct(Punct::Semi)? {
            let t = self.pp.peek_token()?;
            self.error_at(&t, "expected ';'");
            return Ok(Some(NodeId::ERROR));
        }
        match self.scope.continue_label() {
            Some(label) => Ok(Some(self.make_jump_node(tok, label, Some(label)))),
            None => {
                self.error_at(tok, "continue statement not within a loop");
                Ok(Some(NodeId::ERROR))
            }
        }
    }

    fn read_break_stmt(&mut self, tok: &Token) -> Result<Option<NodeId>> {
        if !self.pp.next_punct(Punct::Semi)? {
            let t = self.pp.peek_token()?;
            self.error_at(&t, "expected ';'");
            return Ok(Some(NodeId::ERROR));
        }
        match self.scope.break_label() {
            Some(label) => Ok(Some(self.make_jump_node(tok, label, Some(label)))),
            None => {
                self.error_at(tok, "break statement not within loop or switch");
                Ok(Some(NodeId::ERROR))
            }
        }
    }

    fn read_return_stmt(&mut self, tok: &Token) -> Result<Option<NodeId>> {
        let value = self.read_expr_stmt()?;
        let value = match value {
            Some(v) => {
                let ret_ty = self
                    .scope
                    .current_func_type()
                    .and_then(|f| match &self.types.get(f).kind {
                        TypeKind::Func { ret, .. } => Some(*ret),
                        _ => None,
                    })
                    .unwrap_or(TypeId::INT);
                let v = self.convert(v);
                Some(self.convert_to(v, ret_ty))
            }
            None => None,
        };
        Ok(Some(self.nodes.push(
            NodeKind::Return { value },
            Some(tok.clone()),
            None,
        )))
    }
}
