//! Expression parsing with inline type checking.
//!
//! Left-associative operators use the head/tail rewrite of the C grammar:
//! each `read_X` parses one operand and hands it to `read_X_tail`, which
//! loops on the operator. Operands decay (array -> pointer, function ->
//! pointer) through `convert` before entering a binary node; relational
//! operators canonicalize `>` and `>=` by swapping operands.

use crate::ast::{NodeId, NodeKind, UnaryOp};
use crate::BinaryOp;
use crate::Parser;
use mcc_lex::{Encoding, Keyword, Punct, Token, TokenKind};
use mcc_sem::{TypeId, TypeKind};
use mcc_util::{Result, Symbol};

impl Parser {
    // ----------------------------------------------------------------
    // primary expressions
    // ----------------------------------------------------------------

    pub(crate) fn read_prim_expr(&mut self) -> Result<NodeId> {
        let tok = self.pp.get_token()?;
        match &tok.kind {
            TokenKind::Ident(_) => self.read_ident_expr(&tok),
            TokenKind::Number(_) | TokenKind::Char { .. } => self.read_constant(&tok),
            TokenKind::Str { value, enc } => {
                let (value, enc) = (value.clone(), *enc);
                self.make_string_node(&tok, &value, enc)
            }
            TokenKind::Punct(Punct::LParen) => {
                let t = self.pp.peek_token()?;
                // GNU statement expression: ({ ... }) yields the value of
                // its last statement
                let node = if self.pp.next_punct(Punct::LBrace)? {
                    match self.read_compound_stmt(&t)? {
                        None => {
                            self.error_at(&t, "statement expression must not be empty");
                            NodeId::ERROR
                        }
                        Some(stmt) => {
                            let last_ty = match self.nodes.kind(stmt) {
                                NodeKind::CompoundStmt { stmts } => stmts
                                    .last()
                                    .and_then(|&s| self.nodes.get(s).ty)
                                    .unwrap_or(TypeId::VOID),
                                _ => TypeId::VOID,
                            };
                            self.nodes.get_mut(stmt).ty = Some(last_ty);
                            stmt
                        }
                    }
                } else {
                    self.read_expr()?
                };
                if !self.pp.next_punct(Punct::RParen)? {
                    let t = self.pp.peek_token()?;
                    self.error_at(&t, "expected ')'");
                }
                Ok(node)
            }
            TokenKind::Keyword(Keyword::Generic) => self.read_generic(&tok),
            _ => {
                self.error_at(&tok, format!("expected expression, got '{}'", tok.to_text()));
                Ok(NodeId::ERROR)
            }
        }
    }

    /// C11 6.5.1p2: a declared identifier is an lvalue, an enum constant,
    /// or a function designator. An unknown name followed by `(` becomes
    /// an implicit function declaration.
    fn read_ident_expr(&mut self, tok: &Token) -> Result<NodeId> {
        let name = tok.ident().expect("identifier token");
        match self.scope.get(name) {
            None => {
                let next = self.pp.peek_token()?;
                if !next.is_punct(Punct::LParen) {
                    self.error_at(tok, format!("'{}' undeclared", name));
                    return Ok(NodeId::ERROR);
                }
                self.warn_at(tok, format!("implicit declaration of function '{}'", name));
                let fty = self.types.func(TypeId::INT, Vec::new(), true, false);
                Ok(self
                    .nodes
                    .push(NodeKind::FuncDesg { name }, Some(tok.clone()), Some(fty)))
            }
            Some(var) => {
                let ty = self.ty_of(var);
                if matches!(self.types.get(ty).kind, TypeKind::Func { .. }) {
                    return Ok(self.nodes.push(
                        NodeKind::FuncDesg { name },
                        Some(tok.clone()),
                        Some(ty),
                    ));
                }
                Ok(var)
            }
        }
    }

    fn read_constant(&mut self, tok: &Token) -> Result<NodeId> {
        if let TokenKind::Char { value, enc } = &tok.kind {
            let ty = match enc {
                // GNU libc wchar_t is 32-bit, but the constant has type int
                Encoding::None | Encoding::Wchar => TypeId::INT,
                Encoding::Char16 => TypeId::USHORT,
                Encoding::Char32 | Encoding::Utf8 => TypeId::UINT,
            };
            return Ok(self.make_int_node(tok, ty, *value as i64));
        }
        let text = match tok.kind {
            TokenKind::Number(s) => s.as_str(),
            _ => unreachable!("constant token"),
        };
        let is_hex = text.starts_with("0x") || text.starts_with("0X");
        let looks_float = text.contains(['.', 'p', 'P'])
            || (!is_hex && text.contains(['e', 'E']));
        if looks_float {
            self.read_float_constant(tok, text)
        } else {
            self.read_int_constant(tok, text)
        }
    }

    fn read_float_constant(&mut self, tok: &Token, text: &str) -> Result<NodeId> {
        let (body, suffix) = split_suffix(text, |c| matches!(c, 'f' | 'F' | 'l' | 'L'));
        let value = if body.starts_with("0x") || body.starts_with("0X") {
            parse_hex_float(&body[2..])
        } else {
            body.parse::<f64>().ok()
        };
        let value = match value {
            Some(v) => v,
            None => {
                self.error_at(tok, format!("invalid floating constant '{}'", text));
                return Ok(NodeId::ERROR);
            }
        };
        let ty = match suffix.to_ascii_lowercase().as_str() {
            "" => TypeId::DOUBLE,
            "f" => TypeId::FLOAT,
            "l" => TypeId::LDOUBLE,
            s => {
                self.error_at(tok, format!("invalid suffix '{}' on floating constant", s));
                TypeId::DOUBLE
            }
        };
        Ok(self.make_float_node(tok, ty, value))
    }

    fn read_int_constant(&mut self, tok: &Token, text: &str) -> Result<NodeId> {
        let (digits, radix, decimal) = if is_hex_prefixed(text) {
            (&text[2..], 16, false)
        } else if text.starts_with("0b") || text.starts_with("0B") {
            (&text[2..], 2, false)
        } else if text.starts_with('0') && text.len() > 1 {
            (&text[1..], 8, false)
        } else {
            (&text[..], 10, true)
        };
        let mut value: u64 = 0;
        let mut rest = digits;
        for (i, c) in digits.char_indices() {
            match c.to_digit(radix) {
                Some(d) => value = value.wrapping_mul(radix as u64).wrapping_add(d as u64),
                None => {
                    rest = &digits[i..];
                    break;
                }
            }
            rest = &digits[i + c.len_utf8()..];
        }
        let ty = match rest.to_ascii_lowercase().as_str() {
            "u" => Some(TypeId::UINT),
            "l" => Some(TypeId::LONG),
            "ll" => Some(TypeId::LLONG),
            "ul" | "lu" => Some(TypeId::ULONG),
            "ull" | "llu" => Some(TypeId::ULLONG),
            "" => None,
            s => {
                self.error_at(tok, format!("invalid suffix '{}' on integer constant", s));
                None
            }
        };
        // C11 6.4.4.1p5: the type is the first of the list that can
        // represent the value; octal/hex constants may go unsigned
        let ty = ty.unwrap_or_else(|| {
            if decimal {
                if value <= i32::MAX as u64 {
                    TypeId::INT
                } else {
                    TypeId::LONG
                }
            } else if value <= i32::MAX as u64 {
                TypeId::INT
            } else if value <= u32::MAX as u64 {
                TypeId::UINT
            } else if value <= i64::MAX as u64 {
                TypeId::LONG
            } else {
                TypeId::ULONG
            }
        });
        Ok(self.make_int_node(tok, ty, value as i64))
    }

    /// C11 6.5.1.1 generic selection.
    fn read_generic(&mut self, tok: &Token) -> Result<NodeId> {
        if !self.pp.next_punct(Punct::LParen)? {
            self.error_at(tok, "expected '('");
            return Ok(NodeId::ERROR);
        }
        let ctrl = self.read_assign_expr()?;
        if !self.pp.next_punct(Punct::Comma)? {
            let t = self.pp.peek_token()?;
            self.error_at(&t, "expected ','");
            return Ok(NodeId::ERROR);
        }
        let mut default_case = None;
        let mut chosen = None;
        loop {
            if self.pp.next_punct(Punct::RParen)? {
                break;
            }
            if self.pp.next_keyword(Keyword::Default)? {
                if !self.pp.next_punct(Punct::Colon)? {
                    let t = self.pp.peek_token()?;
                    self.error_at(&t, "expected ':'");
                    return Ok(NodeId::ERROR);
                }
                let expr = self.read_assign_expr()?;
                if default_case.replace(expr).is_some() {
                    self.error_at(tok, "duplicate 'default' association");
                }
            } else {
                let ty = self.read_type_name()?;
                if !self.pp.next_punct(Punct::Colon)? {
                    let t = self.pp.peek_token()?;
                    self.error_at(&t, "expected ':'");
                    return Ok(NodeId::ERROR);
                }
                let expr = self.read_assign_expr()?;
                if chosen.is_none() && self.types.compatible(ty, self.ty_of(ctrl)) {
                    chosen = Some(expr);
                }
            }
            self.pp.next_punct(Punct::Comma)?;
        }
        match chosen.or(default_case) {
            Some(node) => Ok(node),
            None => {
                self.error_at(
                    tok,
                    format!(
                        "'_Generic' selector of type '{}' is not compatible with any association",
                        self.types.to_string(self.ty_of(ctrl))
                    ),
                );
                Ok(NodeId::ERROR)
            }
        }
    }

    // ----------------------------------------------------------------
    // postfix expressions
    // ----------------------------------------------------------------

    /// Postfix expression, with the compound-literal / parenthesized-type
    /// ambiguity: a `(` followed by a type name is either a compound
    /// literal (when `{` follows) or, for the benefit of `sizeof` and
    /// casts, a bare type marker when `maybe_return_type` is set.
    pub(crate) fn read_post_expr(&mut self, maybe_return_type: bool) -> Result<NodeId> {
        let tok = self.pp.get_token()?;
        if tok.is_punct(Punct::LParen) {
            let peeked = self.pp.peek_token()?;
            if self.is_type_name(&peeked) {
                let ty = self.read_type_name()?;
                if !self.pp.next_punct(Punct::RParen)? {
                    let t = self.pp.peek_token()?;
                    self.error_at(&t, "expected ')'");
                    return Ok(NodeId::ERROR);
                }
                if !self.pp.peek_token()?.is_punct(Punct::LBrace) {
                    if maybe_return_type {
                        return Ok(self.make_typedef_node(&tok, ty, None, false));
                    }
                    let t = self.pp.peek_token()?;
                    self.error_at(&t, "expected '{'");
                    return Ok(NodeId::ERROR);
                }
                // compound literal: an anonymous local with an initializer
                let mut init = Vec::new();
                self.read_initializer_list(&mut init, ty, 0)?;
                let tmp = self.make_localvar_node(&tok, ty, None);
                if let NodeKind::LocalVar { init: slot, .. } = &mut self.nodes.get_mut(tmp).kind {
                    *slot = init;
                }
                return self.read_post_expr_tail(tmp);
            }
        }
        self.pp.unget_token(tok);
        let node = self.read_prim_expr()?;
        self.read_post_expr_tail(node)
    }

    fn read_post_expr_tail(&mut self, node: NodeId) -> Result<NodeId> {
        // array subscripting: E1[E2] is (*((E1)+(E2)))
        if self.pp.next_punct(Punct::LBracket)? {
            let sub = self.read_expr()?;
            if !self.pp.next_punct(Punct::RBracket)? {
                let t = self.pp.peek_token()?;
                self.error_at(&t, "expected ']'");
                return Ok(NodeId::ERROR);
            }
            let ty = self.ty_of(node);
            if !matches!(
                self.types.get(ty).kind,
                TypeKind::Array { .. } | TypeKind::Ptr { .. }
            ) {
                let t = self.nodes.get(node).tok.clone();
                if let Some(t) = t {
                    self.error_at(&t, "subscripted value is neither array nor pointer");
                }
                return Ok(NodeId::ERROR);
            }
            let sub_tok = self
                .nodes
                .get(sub)
                .tok
                .clone()
                .unwrap_or_else(|| Token::new(TokenKind::Eof, mcc_util::Pos::none()));
            let base = self.convert(node);
            let idx = self.convert(sub);
            let p = self.make_binop(&sub_tok, BinaryOp::Add, base, idx);
            if self.nodes.is_error(p) {
                return Ok(NodeId::ERROR);
            }
            let deref = self.make_deref(&sub_tok, p);
            return self.read_post_expr_tail(deref);
        }
        // function call
        if self.pp.next_punct(Punct::LParen)? {
            let func = self.convert(node);
            let call = self.read_func_call(func)?;
            return self.read_post_expr_tail(call);
        }
        // member access
        if self.pp.next_punct(Punct::Dot)? {
            let member = self.read_struct_member(node)?;
            return self.read_post_expr_tail(member);
        }
        if self.pp.next_punct(Punct::Arrow)? {
            let ty = self.ty_of(node);
            if !matches!(self.types.get(ty).kind, TypeKind::Ptr { .. }) {
                let t = self.pp.peek_token()?;
                self.error_at(
                    &t,
                    format!(
                        "invalid type argument of '->' (have '{}')",
                        self.types.to_string(ty)
                    ),
                );
                return Ok(NodeId::ERROR);
            }
            let tok = self
                .nodes
                .get(node)
                .tok
                .clone()
                .unwrap_or_else(|| Token::new(TokenKind::Eof, mcc_util::Pos::none()));
            let deref = self.make_deref(&tok, node);
            let member = self.read_struct_member(deref)?;
            return self.read_post_expr_tail(member);
        }
        // postfix increment / decrement
        let tok = self.pp.peek_token()?;
        if self.pp.next_punct(Punct::Inc)? || self.pp.next_punct(Punct::Dec)? {
            let op = if tok.is_punct(Punct::Inc) {
                UnaryOp::PostInc
            } else {
                UnaryOp::PostDec
            };
            if !self.nodes.is_lvalue(node) {
                self.error_at(&tok, "lvalue required as increment operand");
                return Ok(NodeId::ERROR);
            }
            let ty = self.ty_of(node);
            return Ok(self.make_unary(&tok, op, Some(ty), node));
        }
        Ok(node)
    }

    fn read_func_call(&mut self, func: NodeId) -> Result<NodeId> {
        let tok = self
            .nodes
            .get(func)
            .tok
            .clone()
            .unwrap_or_else(|| Token::new(TokenKind::Eof, mcc_util::Pos::none()));
        // a decayed designator: call by name
        if let NodeKind::Unary {
            op: UnaryOp::Addr,
            operand,
        } = *self.nodes.kind(func)
        {
            if let NodeKind::FuncDesg { name } = *self.nodes.kind(operand) {
                let func_ty = self.ty_of(operand);
                let args = self.read_func_call_args(func_ty)?;
                let ret = match &self.types.get(func_ty).kind {
                    TypeKind::Func { ret, .. } => *ret,
                    _ => TypeId::INT,
                };
                return Ok(self.nodes.push(
                    NodeKind::FuncCall {
                        name: Some(name),
                        func_ty,
                        func_ptr: None,
                        args,
                    },
                    Some(tok),
                    Some(ret),
                ));
            }
        }
        // otherwise a call through a function pointer
        let func_ty = match self.types.pointee(self.ty_of(func)) {
            Some(inner) if matches!(self.types.get(inner).kind, TypeKind::Func { .. }) => inner,
            _ => {
                self.error_at(&tok, "called object is not a function or function pointer");
                return Ok(NodeId::ERROR);
            }
        };
        let args = self.read_func_call_args(func_ty)?;
        let ret = match &self.types.get(func_ty).kind {
            TypeKind::Func { ret, .. } => *ret,
            _ => TypeId::INT,
        };
        Ok(self.nodes.push(
            NodeKind::FuncCall {
                name: None,
                func_ty,
                func_ptr: Some(func),
                args,
            },
            Some(tok),
            Some(ret),
        ))
    }

    fn read_func_call_args(&mut self, func_ty: TypeId) -> Result<Vec<NodeId>> {
        let param_types = match &self.types.get(func_ty).kind {
            TypeKind::Func { params, .. } => params.clone(),
            _ => Vec::new(),
        };
        let mut args = Vec::new();
        let mut i = 0;
        loop {
            if self.pp.next_punct(Punct::RParen)? {
                break;
            }
            let raw = self.read_assign_expr()?;
            let arg = self.convert(raw);
            let arg_ty = self.ty_of(arg);
            let param_ty = if i < param_types.len() {
                let t = param_types[i];
                i += 1;
                t
            } else {
                // default argument promotions past the prototype
                let t = self.types.get(arg_ty);
                if t.is_float_type() {
                    TypeId::DOUBLE
                } else if t.is_int_type() {
                    TypeId::INT
                } else {
                    arg_ty
                }
            };
            if !self.is_assignable(param_ty, arg_ty)? {
                break;
            }
            let arg = self.convert_to(arg, param_ty);
            args.push(arg);
            if self.pp.next_punct(Punct::RParen)? {
                break;
            }
            if !self.pp.next_punct(Punct::Comma)? {
                let t = self.pp.peek_token()?;
                self.error_at(&t, "expected ','");
                break;
            }
        }
        Ok(args)
    }

    fn read_struct_member(&mut self, node: NodeId) -> Result<NodeId> {
        let name_tok = self.pp.get_token()?;
        let name = match name_tok.ident() {
            Some(s) => s,
            None => {
                self.error_at(
                    &name_tok,
                    format!("expected a field name, but got '{}'", name_tok.to_text()),
                );
                return Ok(NodeId::ERROR);
            }
        };
        let ty = self.ty_of(node);
        let fields = match &self.types.get(ty).kind {
            TypeKind::Record { fields, .. } => fields.clone(),
            _ => {
                self.error_at(
                    &name_tok,
                    format!(
                        "request for member '{}' in something not a structure or union",
                        name
                    ),
                );
                return Ok(NodeId::ERROR);
            }
        };
        let field = fields.iter().find(|f| f.name == Some(name));
        match field {
            Some(f) => Ok(self.nodes.push(
                NodeKind::Member { parent: node, name },
                Some(name_tok),
                Some(f.ty),
            )),
            None => {
                self.error_at(
                    &name_tok,
                    format!(
                        "'{}' has no member named '{}'",
                        self.types.to_string(ty),
                        name
                    ),
                );
                Ok(NodeId::ERROR)
            }
        }
    }

    // ----------------------------------------------------------------
    // unary and cast expressions
    // ----------------------------------------------------------------

    pub(crate) fn read_unary_expr(&mut self) -> Result<NodeId> {
        let tok = self.pp.get_token()?;
        match &tok.kind {
            TokenKind::Punct(Punct::Inc) | TokenKind::Punct(Punct::Dec) => {
                let op = if tok.is_punct(Punct::Inc) {
                    UnaryOp::PreInc
                } else {
                    UnaryOp::PreDec
                };
                let operand = self.read_unary_expr()?;
                if !self.nodes.is_lvalue(operand) {
                    self.error_at(&tok, "lvalue required as increment operand");
                    return Ok(NodeId::ERROR);
                }
                let ty = self.ty_of(operand);
                Ok(self.make_unary(&tok, op, Some(ty), operand))
            }
            // [GNU] &&label takes the address of a label
            TokenKind::Punct(Punct::LogAnd) => {
                let tok2 = self.pp.get_token()?;
                let origin = match tok2.ident() {
                    Some(s) => s,
                    None => {
                        self.error_at(&tok, "expected a label name after '&&'");
                        return Ok(NodeId::ERROR);
                    }
                };
                let vptr = self.types.ptr_to(TypeId::VOID);
                let node = self.nodes.push(
                    NodeKind::LabelAddr {
                        origin,
                        label: None,
                    },
                    Some(tok),
                    Some(vptr),
                );
                self.gotos.push(node);
                Ok(node)
            }
            TokenKind::Punct(Punct::Amp) => {
                let operand = self.read_cast_expr()?;
                if matches!(self.nodes.kind(operand), NodeKind::FuncDesg { .. }) {
                    return Ok(self.convert(operand));
                }
                if !self.nodes.is_lvalue(operand) {
                    self.error_at(&tok, "lvalue required as unary '&' operand");
                    return Ok(NodeId::ERROR);
                }
                let ty = self.ty_of(operand);
                let ptr = self.types.ptr_to(ty);
                Ok(self.make_unary(&tok, UnaryOp::Addr, Some(ptr), operand))
            }
            TokenKind::Punct(Punct::Star) => {
                let raw = self.read_cast_expr()?;
                let operand = self.convert(raw);
                let ty = self.ty_of(operand);
                let to = match self.types.pointee(ty) {
                    Some(to) => to,
                    None => {
                        self.error_at(
                            &tok,
                            format!(
                                "invalid type argument of unary '*' (have '{}')",
                                self.types.to_string(ty)
                            ),
                        );
                        return Ok(NodeId::ERROR);
                    }
                };
                // dereferencing a function pointer is a no-op
                if matches!(self.types.get(to).kind, TypeKind::Func { .. }) {
                    return Ok(operand);
                }
                Ok(self.make_unary(&tok, UnaryOp::Deref, Some(to), operand))
            }
            TokenKind::Punct(Punct::Plus) => self.read_cast_expr(),
            TokenKind::Punct(Punct::Minus) => {
                let operand = self.read_cast_expr()?;
                let ty = self.ty_of(operand);
                if !self.types.get(ty).is_arith_type() {
                    self.error_at(
                        &tok,
                        format!(
                            "wrong type ('{}') argument to unary minus",
                            self.types.to_string(ty)
                        ),
                    );
                    return Ok(NodeId::ERROR);
                }
                if self.types.get(ty).is_int_type() {
                    let zero = self.make_int_node(&tok, ty, 0);
                    let zero = self.convert(zero);
                    let operand = self.convert(operand);
                    return Ok(self.make_binop(&tok, BinaryOp::Sub, zero, operand));
                }
                let zero = self.make_float_node(&tok, ty, 0.0);
                Ok(self.make_binop(&tok, BinaryOp::Sub, zero, operand))
            }
            TokenKind::Punct(Punct::Tilde) => {
                let raw = self.read_cast_expr()?;
                let operand = self.convert(raw);
                let ty = self.ty_of(operand);
                if !self.types.get(ty).is_int_type() {
                    self.error_at(
                        &tok,
                        format!(
                            "wrong type ('{}') argument to bit-complement",
                            self.types.to_string(ty)
                        ),
                    );
                    return Ok(NodeId::ERROR);
                }
                Ok(self.make_unary(&tok, UnaryOp::BitNot, Some(ty), operand))
            }
            TokenKind::Punct(Punct::Bang) => {
                let raw = self.read_cast_expr()?;
                let operand = self.convert(raw);
                Ok(self.make_unary(&tok, UnaryOp::LogNot, Some(TypeId::INT), operand))
            }
            TokenKind::Keyword(Keyword::Sizeof) => {
                let ty = self.read_sizeof_operand()?;
                let t = self.types.get(ty);
                // GNU: sizeof(void) and sizeof(function) are 1
                let size = match t.kind {
                    TypeKind::Void | TypeKind::Func { .. } => 1,
                    _ => t.size,
                };
                if size < 0 {
                    self.error_at(&tok, "invalid application of 'sizeof' to an incomplete type");
                    return Ok(NodeId::ERROR);
                }
                Ok(self.make_int_node(&tok, TypeId::ULONG, size))
            }
            TokenKind::Keyword(Keyword::Alignof) => {
                if !self.pp.next_punct(Punct::LParen)? {
                    self.error_at(&tok, "expected '('");
                    return Ok(NodeId::ERROR);
                }
                let ty = self.read_type_name()?;
                if !self.pp.next_punct(Punct::RParen)? {
                    self.error_at(&tok, "expected ')'");
                    return Ok(NodeId::ERROR);
                }
                let align = self.types.get(ty).align;
                Ok(self.make_int_node(&tok, TypeId::ULONG, align))
            }
            _ => {
                self.pp.unget_token(tok);
                self.read_post_expr(false)
            }
        }
    }

    /// `sizeof unary-expr` vs `sizeof(type-name)`, resolved by letting the
    /// postfix parser hand back a bare type marker.
    fn read_sizeof_operand(&mut self) -> Result<TypeId> {
        let tok = self.pp.get_token()?;
        if tok.is_punct(Punct::LParen) {
            let peeked = self.pp.peek_token()?;
            if self.is_type_name(&peeked) {
                self.pp.unget_token(tok);
                let node = self.read_post_expr(true)?;
                return Ok(self.ty_of(node));
            }
        }
        self.pp.unget_token(tok);
        let node = self.read_unary_expr()?;
        Ok(self.ty_of(node))
    }

    pub(crate) fn read_cast_expr(&mut self) -> Result<NodeId> {
        let tok = self.pp.get_token()?;
        if tok.is_punct(Punct::LParen) {
            let peeked = self.pp.peek_token()?;
            if self.is_type_name(&peeked) {
                self.pp.unget_token(tok.clone());
                let node = self.read_post_expr(true)?;
                if matches!(self.nodes.kind(node), NodeKind::TypedefName { .. }) {
                    let ty = self.ty_of(node);
                    let operand = self.read_cast_expr()?;
                    return Ok(self.make_unary(&tok, UnaryOp::Cast, Some(ty), operand));
                }
                return Ok(node);
            }
        }
        self.pp.unget_token(tok);
        self.read_unary_expr()
    }

    // ----------------------------------------------------------------
    // binary operator ladder
    // ----------------------------------------------------------------

    fn read_mul_expr(&mut self) -> Result<NodeId> {
        let mut node = self.read_cast_expr()?;
        loop {
            let tok = self.pp.peek_token()?;
            let op = match tok.kind {
                TokenKind::Punct(Punct::Star) => BinaryOp::Mul,
                TokenKind::Punct(Punct::Slash) => BinaryOp::Div,
                TokenKind::Punct(Punct::Percent) => BinaryOp::Mod,
                _ => return Ok(node),
            };
            self.pp.get_token()?;
            let rhs = self.read_cast_expr()?;
            let l = self.convert(node);
            let r = self.convert(rhs);
            node = self.make_binop(&tok, op, l, r);
        }
    }

    fn read_add_expr(&mut self) -> Result<NodeId> {
        let mut node = self.read_mul_expr()?;
        loop {
            let tok = self.pp.peek_token()?;
            let op = match tok.kind {
                TokenKind::Punct(Punct::Plus) => BinaryOp::Add,
                TokenKind::Punct(Punct::Minus) => BinaryOp::Sub,
                _ => return Ok(node),
            };
            self.pp.get_token()?;
            let rhs = self.read_mul_expr()?;
            let l = self.convert(node);
            let r = self.convert(rhs);
            node = self.make_binop(&tok, op, l, r);
        }
    }

    fn read_shift_expr(&mut self) -> Result<NodeId> {
        let mut node = self.read_add_expr()?;
        loop {
            let tok = self.pp.peek_token()?;
            let is_shl = tok.is_punct(Punct::Shl);
            if !is_shl && !tok.is_punct(Punct::Shr) {
                return Ok(node);
            }
            self.pp.get_token()?;
            let op = if is_shl {
                BinaryOp::Sal
            } else if self.types.get(self.ty_of(node)).is_unsigned {
                BinaryOp::Shr
            } else {
                BinaryOp::Sar
            };
            let rhs = self.read_add_expr()?;
            let lt = self.ty_of(node);
            let rt = self.ty_of(rhs);
            if !self.types.get(lt).is_int_type() || !self.types.get(rt).is_int_type() {
                self.error_at(
                    &tok,
                    format!(
                        "invalid operands to binary shift (have '{}' and '{}')",
                        self.types.to_string(lt),
                        self.types.to_string(rt)
                    ),
                );
                return Ok(NodeId::ERROR);
            }
            let l = self.convert(node);
            let r = self.convert(rhs);
            node = self.make_binop(&tok, op, l, r);
        }
    }

    fn read_relational_expr(&mut self) -> Result<NodeId> {
        let mut node = self.read_shift_expr()?;
        loop {
            let tok = self.pp.peek_token()?;
            // a > b and a >= b canonicalize by operand swap
            let (op, swap) = match tok.kind {
                TokenKind::Punct(Punct::Lt) => (BinaryOp::Lt, false),
                TokenKind::Punct(Punct::Gt) => (BinaryOp::Lt, true),
                TokenKind::Punct(Punct::Le) => (BinaryOp::Le, false),
                TokenKind::Punct(Punct::Ge) => (BinaryOp::Le, true),
                _ => return Ok(node),
            };
            self.pp.get_token()?;
            let rhs = self.read_shift_expr()?;
            let l = self.convert(node);
            let r = self.convert(rhs);
            node = if swap {
                self.make_binop(&tok, op, r, l)
            } else {
                self.make_binop(&tok, op, l, r)
            };
            // C11 6.5.8p6: the result has type int
            if !self.nodes.is_error(node) {
                self.nodes.get_mut(node).ty = Some(TypeId::INT);
            }
        }
    }

    fn read_equal_expr(&mut self) -> Result<NodeId> {
        let mut node = self.read_relational_expr()?;
        loop {
            let tok = self.pp.peek_token()?;
            let op = match tok.kind {
                TokenKind::Punct(Punct::Eq) => BinaryOp::Eq,
                TokenKind::Punct(Punct::Ne) => BinaryOp::Ne,
                _ => return Ok(node),
            };
            self.pp.get_token()?;
            let rhs = self.read_relational_expr()?;
            let l = self.convert(node);
            let r = self.convert(rhs);
            node = self.make_binop(&tok, op, l, r);
            if !self.nodes.is_error(node) {
                self.nodes.get_mut(node).ty = Some(TypeId::INT);
            }
        }
    }

    fn read_bit_expr(
        &mut self,
        op: BinaryOp,
        p: Punct,
        next: fn(&mut Parser) -> Result<NodeId>,
    ) -> Result<NodeId> {
        let mut node = next(self)?;
        loop {
            let tok = self.pp.peek_token()?;
            if !tok.is_punct(p) {
                return Ok(node);
            }
            self.pp.get_token()?;
            let rhs = next(self)?;
            let l = self.convert(node);
            let r = self.convert(rhs);
            node = self.make_binop(&tok, op, l, r);
        }
    }

    fn read_and_expr(&mut self) -> Result<NodeId> {
        self.read_bit_expr(BinaryOp::BitAnd, Punct::Amp, Parser::read_equal_expr)
    }

    fn read_xor_expr(&mut self) -> Result<NodeId> {
        self.read_bit_expr(BinaryOp::BitXor, Punct::Caret, Parser::read_and_expr)
    }

    fn read_or_expr(&mut self) -> Result<NodeId> {
        self.read_bit_expr(BinaryOp::BitOr, Punct::Pipe, Parser::read_xor_expr)
    }

    fn read_land_expr(&mut self) -> Result<NodeId> {
        let mut node = self.read_or_expr()?;
        loop {
            let tok = self.pp.peek_token()?;
            if !tok.is_punct(Punct::LogAnd) {
                return Ok(node);
            }
            self.pp.get_token()?;
            let rhs = self.read_or_expr()?;
            let l = self.convert(node);
            let r = self.convert(rhs);
            node = self.make_binary(&tok, BinaryOp::LogAnd, TypeId::INT, l, r);
        }
    }

    fn read_lor_expr(&mut self) -> Result<NodeId> {
        let mut node = self.read_land_expr()?;
        loop {
            let tok = self.pp.peek_token()?;
            if !tok.is_punct(Punct::LogOr) {
                return Ok(node);
            }
            self.pp.get_token()?;
            let rhs = self.read_land_expr()?;
            let l = self.convert(node);
            let r = self.convert(rhs);
            node = self.make_binary(&tok, BinaryOp::LogOr, TypeId::INT, l, r);
        }
    }

    // ----------------------------------------------------------------
    // conditional, assignment, comma
    // ----------------------------------------------------------------

    pub fn read_cond_expr(&mut self) -> Result<NodeId> {
        let cond = self.read_lor_expr()?;
        self.read_cond_expr_tail(cond)
    }

    fn read_cond_expr_tail(&mut self, cond: NodeId) -> Result<NodeId> {
        if !self.pp.next_punct(Punct::Question)? {
            return Ok(cond);
        }
        let cond = self.convert(cond);
        let cond_ty = self.ty_of(cond);
        if !self.types.get(cond_ty).is_scalar_type() {
            let t = self.pp.peek_token()?;
            self.error_at(
                &t,
                format!(
                    "used '{}' type value where scalar is required",
                    self.types.to_string(cond_ty)
                ),
            );
        }
        // [GNU] a ?: b reuses the condition as the middle operand
        let mut then = None;
        let tok = self.pp.get_token()?;
        let tok = if tok.is_punct(Punct::Colon) {
            tok
        } else {
            self.pp.unget_token(tok);
            let e = self.read_expr()?;
            then = Some(self.convert(e));
            self.pp.get_token()?
        };
        if !tok.is_punct(Punct::Colon) {
            self.error_at(&tok, "expected ':'");
            return Ok(NodeId::ERROR);
        }
        let els = self.read_cond_expr()?;
        let els = self.convert(els);
        let cond_tok = self
            .nodes
            .get(cond)
            .tok
            .clone()
            .unwrap_or(tok);
        let tt = then.map(|t| self.ty_of(t)).unwrap_or(self.ty_of(cond));
        let et = self.ty_of(els);
        if self.types.get(tt).is_arith_type() && self.types.get(et).is_arith_type() {
            let u = self.types.usual_arith_convert(tt, et);
            let then = then.map(|t| self.convert_to(t, u));
            let els = self.convert_to(els, u);
            return Ok(self
                .nodes
                .push(NodeKind::Ternary { cond, then, els }, Some(cond_tok), Some(u)));
        }
        Ok(self
            .nodes
            .push(NodeKind::Ternary { cond, then, els }, Some(cond_tok), Some(et)))
    }

    fn assign_op(tok: &Token) -> Option<Option<BinaryOp>> {
        let op = match tok.kind {
            TokenKind::Punct(Punct::Assign) => None,
            TokenKind::Punct(Punct::AddAssign) => Some(BinaryOp::Add),
            TokenKind::Punct(Punct::SubAssign) => Some(BinaryOp::Sub),
            TokenKind::Punct(Punct::MulAssign) => Some(BinaryOp::Mul),
            TokenKind::Punct(Punct::DivAssign) => Some(BinaryOp::Div),
            TokenKind::Punct(Punct::ModAssign) => Some(BinaryOp::Mod),
            TokenKind::Punct(Punct::AndAssign) => Some(BinaryOp::BitAnd),
            TokenKind::Punct(Punct::XorAssign) => Some(BinaryOp::BitXor),
            TokenKind::Punct(Punct::OrAssign) => Some(BinaryOp::BitOr),
            TokenKind::Punct(Punct::ShlAssign) => Some(BinaryOp::Sal),
            TokenKind::Punct(Punct::ShrAssign) => Some(BinaryOp::Sar),
            _ => return None,
        };
        Some(op)
    }

    pub(crate) fn read_assign_expr(&mut self) -> Result<NodeId> {
        let node = self.read_cond_expr()?;
        self.read_assign_expr_tail(node)
    }

    fn read_assign_expr_tail(&mut self, node: NodeId) -> Result<NodeId> {
        let tok = self.pp.get_token()?;
        let op = match Self::assign_op(&tok) {
            None => {
                self.pp.unget_token(tok);
                return Ok(node);
            }
            Some(op) => op,
        };
        if !self.nodes.is_lvalue(node) {
            self.error_at(&tok, "lvalue required as left operand of assignment");
            return Ok(NodeId::ERROR);
        }
        let node_ty = self.ty_of(node);
        let raw = self.read_assign_expr()?;
        let mut right = self.convert(raw);
        if let Some(mut binop) = op {
            // a >>= b on an unsigned lhs is a logical shift
            if binop == BinaryOp::Sar && self.types.get(node_ty).is_unsigned {
                binop = BinaryOp::Shr;
            }
            let l = self.convert(node);
            right = self.make_binop(&tok, binop, l, right);
        }
        if self.nodes.is_error(right) {
            return Ok(NodeId::ERROR);
        }
        let rt = self.ty_of(right);
        if self.types.get(node_ty).is_arith_type()
            && !self.types.get(node_ty).same_kind(self.types.get(rt))
        {
            right = self.convert_to(right, node_ty);
        }
        Ok(self.make_binary(&tok, BinaryOp::Assign, node_ty, node, right))
    }

    /// Full expression (comma operator).
    pub(crate) fn read_expr(&mut self) -> Result<NodeId> {
        let mut node = self.read_assign_expr()?;
        while self.pp.next_punct(Punct::Comma)? {
            let right = self.read_assign_expr()?;
            // C11 6.5.17p2: type and value come from the right operand
            let ty = self.ty_of(right);
            let tok = self
                .nodes
                .get(right)
                .tok
                .clone()
                .unwrap_or_else(|| Token::new(TokenKind::Eof, mcc_util::Pos::none()));
            node = self.make_binary(&tok, BinaryOp::Comma, ty, node, right);
        }
        Ok(node)
    }

    /// Constant expression position: a conditional expression.
    pub(crate) fn read_const_expr(&mut self) -> Result<NodeId> {
        self.read_cond_expr()
    }
}

// ----------------------------------------------------------------
// numeric literal helpers
// ----------------------------------------------------------------

fn is_hex_prefixed(s: &str) -> bool {
    s.starts_with("0x") || s.starts_with("0X")
}

fn split_suffix(s: &str, is_suffix: fn(char) -> bool) -> (&str, &str) {
    let split = s
        .char_indices()
        .rev()
        .take_while(|&(_, c)| is_suffix(c))
        .last()
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    (&s[..split], &s[split..])
}

/// Hexadecimal floating constant after the `0x` prefix:
/// hex-digits[.hex-digits]p[+-]dec-digits.
fn parse_hex_float(s: &str) -> Option<f64> {
    let (mantissa_text, exp_text) = s.split_once(['p', 'P'])?;
    let (int_part, frac_part) = match mantissa_text.split_once('.') {
        Some((a, b)) => (a, b),
        None => (mantissa_text, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    let mut value = 0.0f64;
    for c in int_part.chars() {
        value = value * 16.0 + c.to_digit(16)? as f64;
    }
    let mut scale = 1.0 / 16.0;
    for c in frac_part.chars() {
        value += c.to_digit(16)? as f64 * scale;
        scale /= 16.0;
    }
    let exp: i32 = exp_text.parse().ok()?;
    Some(value * 2f64.powi(exp))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_float() {
        assert_eq!(parse_hex_float("1p0"), Some(1.0));
        assert_eq!(parse_hex_float("1fp-2"), Some(31.0 / 4.0));
        assert_eq!(parse_hex_float("1.8p1"), Some(3.0));
        assert_eq!(parse_hex_float("p1"), None);
    }

    #[test]
    fn test_split_suffix() {
        let is_int_suffix = |c: char| matches!(c, 'u' | 'U' | 'l' | 'L');
        assert_eq!(split_suffix("123ul", is_int_suffix), ("123", "ul"));
        assert_eq!(split_suffix("123", is_int_suffix), ("123", ""));
        assert_eq!(split_suffix("0x1f", is_int_suffix), ("0x1f", ""));
    }
}
