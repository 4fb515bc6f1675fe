//! mcc-par - Parser and semantic analyzer
//!
//! A recursive-descent parser over the preprocessor's token stream that
//! performs semantic analysis inline: every expression node is built with
//! its type, usual arithmetic conversions and array/function decay are
//! inserted as explicit `Conv` nodes, struct layout runs when a member
//! list closes, and initializers are elaborated into flat
//! `(offset, type, value)` lists. The grammar is LL(1) after the usual
//! head/tail rewrites for left-associative operators.
//!
//! Error policy: recoverable problems are reported through the shared
//! diagnostics handler and produce the `Error` sentinel node; the parser
//! resynchronizes and keeps going so one run surfaces as many diagnostics
//! as possible. Token-level failures bubbling out of the preprocessor are
//! fatal.

pub mod ast;
mod cond;
pub mod const_eval;
mod decl;
mod expr;
mod init;
pub mod scope;
mod stmt;
#[cfg(test)]
mod tests;

pub use ast::{BinaryOp, Node, NodeArena, NodeId, NodeKind, TranslationUnit, UnaryOp};
pub use cond::eval_cond_expr;
pub use const_eval::{eval_float, eval_int, ConstInt};
pub use scope::{CaseRange, Scope};

use indexmap::IndexMap;
use mcc_lex::{Encoding, Token, TokenKind};
use mcc_pp::Preprocessor;
use mcc_sem::{Storage, TypeArena, TypeId, TypeKind};
use mcc_util::{encode, Context, Result, Symbol};
use rustc_hash::FxHashMap;
use std::rc::Rc;

pub struct Parser {
    pub(crate) pp: Preprocessor,
    pub(crate) ctx: Rc<Context>,
    pub(crate) types: TypeArena,
    pub(crate) nodes: NodeArena,
    pub(crate) scope: Scope,
    /// Source-level label name -> assembler label, per function.
    pub(crate) labels: FxHashMap<Symbol, Symbol>,
    /// Jump / label-address nodes awaiting resolution, per function.
    pub(crate) gotos: Vec<NodeId>,
    /// struct/union/enum tag namespace.
    pub(crate) tags: IndexMap<Symbol, TypeId>,
    pub(crate) toplevels: Vec<NodeId>,
}

impl Parser {
    pub fn new(mut pp: Preprocessor) -> Parser {
        pp.set_cond_eval(eval_cond_expr);
        let ctx = pp.context();
        Parser {
            pp,
            ctx,
            types: TypeArena::new(),
            nodes: NodeArena::new(),
            scope: Scope::new(),
            labels: FxHashMap::default(),
            gotos: Vec::new(),
            tags: IndexMap::new(),
            toplevels: Vec::new(),
        }
    }

    /// Parse the whole translation unit.
    pub fn parse(mut self) -> Result<TranslationUnit> {
        self.read_extern_decl()?;
        Ok(TranslationUnit {
            types: self.types,
            nodes: self.nodes,
            toplevels: self.toplevels,
        })
    }

    // ----------------------------------------------------------------
    // small helpers
    // ----------------------------------------------------------------

    pub(crate) fn error_at(&self, tok: &Token, msg: impl AsRef<str>) {
        self.ctx.diag.error(tok.pos, msg);
    }

    pub(crate) fn warn_at(&self, tok: &Token, msg: impl AsRef<str>) {
        self.ctx.diag.warn(tok.pos, msg);
    }

    /// The type of a node, with a safe fallback for the error sentinel.
    pub(crate) fn ty_of(&self, id: NodeId) -> TypeId {
        self.nodes.get(id).ty.unwrap_or(TypeId::INT)
    }

    /// Skip ahead to the nearest synchronization point (past a `;` or
    /// `}`) so one malformed declaration yields one diagnostic instead of
    /// a cascade.
    pub(crate) fn synchronize(&mut self) -> Result<()> {
        loop {
            let tok = self.pp.get_token()?;
            if tok.is_eof() {
                return Ok(());
            }
            if tok.is_punct(mcc_lex::Punct::Semi) || tok.is_punct(mcc_lex::Punct::RBrace) {
                return Ok(());
            }
        }
    }

    pub(crate) fn const_int(&mut self, id: NodeId) -> Result<i64> {
        match const_eval::eval_int(&self.nodes, &self.types, id) {
            Ok(v) => Ok(v.value),
            Err(e) => {
                if let Some(tok) = &self.nodes.get(id).tok {
                    self.ctx.diag.error(tok.pos, e.to_string());
                }
                Err(e)
            }
        }
    }

    // ----------------------------------------------------------------
    // node constructors
    // ----------------------------------------------------------------

    pub(crate) fn make_int_node(&mut self, tok: &Token, ty: TypeId, value: i64) -> NodeId {
        self.nodes
            .push(NodeKind::IntLit { value }, Some(tok.clone()), Some(ty))
    }

    pub(crate) fn make_float_node(&mut self, tok: &Token, ty: TypeId, value: f64) -> NodeId {
        self.nodes
            .push(NodeKind::FloatLit { value }, Some(tok.clone()), Some(ty))
    }

    /// Build a string literal node, re-encoding per the literal's prefix.
    /// The array type gains one element for the terminator.
    pub(crate) fn make_string_node(
        &mut self,
        tok: &Token,
        bytes: &[u8],
        enc: Encoding,
    ) -> Result<NodeId> {
        let (data, elem, elem_size) = match enc {
            Encoding::None | Encoding::Utf8 => (bytes.to_vec(), TypeId::CHAR, 1),
            Encoding::Char16 => (encode::encode_utf16(bytes)?, TypeId::USHORT, 2),
            Encoding::Char32 | Encoding::Wchar => (encode::encode_utf32(bytes)?, TypeId::UINT, 4),
        };
        let len = (data.len() as i64) / (elem_size as i64) + 1;
        let ty = self.types.array_of(elem, len);
        Ok(self
            .nodes
            .push(NodeKind::StrLit { data, elem_size }, Some(tok.clone()), Some(ty)))
    }

    /// A local variable node. Named locals are registered in scope and in
    /// the frame-slot accumulator.
    pub(crate) fn make_localvar_node(
        &mut self,
        tok: &Token,
        ty: TypeId,
        name: Option<Symbol>,
    ) -> NodeId {
        let id = self.nodes.push(
            NodeKind::LocalVar {
                name,
                init: Vec::new(),
            },
            Some(tok.clone()),
            Some(ty),
        );
        if self.scope.is_local() {
            if let Some(name) = name {
                self.scope.add(name, id);
            }
            self.scope.add_local_var(id);
        }
        id
    }

    pub(crate) fn make_globalvar_node(&mut self, tok: &Token, ty: TypeId, name: Symbol) -> NodeId {
        let id = self.nodes.push(
            NodeKind::GlobalVar { name, label: name },
            Some(tok.clone()),
            Some(ty),
        );
        self.scope.add_global(name, id);
        id
    }

    /// A `static` local: a global-style node with a synthesized label,
    /// registered under the local name.
    pub(crate) fn make_static_localvar_node(
        &mut self,
        tok: &Token,
        ty: TypeId,
        name: Symbol,
    ) -> NodeId {
        let label = self.ctx.make_static_label(name);
        let id = self.nodes.push(
            NodeKind::GlobalVar { name, label },
            Some(tok.clone()),
            Some(ty),
        );
        self.scope.add(name, id);
        id
    }

    pub(crate) fn make_typedef_node(
        &mut self,
        tok: &Token,
        ty: TypeId,
        name: Option<Symbol>,
        register: bool,
    ) -> NodeId {
        let id = self
            .nodes
            .push(NodeKind::TypedefName { name }, Some(tok.clone()), Some(ty));
        if register {
            if let Some(name) = name {
                self.scope.add(name, id);
            }
        }
        id
    }

    pub(crate) fn make_unary(
        &mut self,
        tok: &Token,
        op: UnaryOp,
        ty: Option<TypeId>,
        operand: NodeId,
    ) -> NodeId {
        self.nodes
            .push(NodeKind::Unary { op, operand }, Some(tok.clone()), ty)
    }

    pub(crate) fn make_binary(
        &mut self,
        tok: &Token,
        op: BinaryOp,
        ty: TypeId,
        lhs: NodeId,
        rhs: NodeId,
    ) -> NodeId {
        self.nodes
            .push(NodeKind::Binary { op, lhs, rhs }, Some(tok.clone()), Some(ty))
    }

    pub(crate) fn make_deref(&mut self, tok: &Token, ptr: NodeId) -> NodeId {
        let to = self
            .types
            .pointee(self.ty_of(ptr))
            .unwrap_or(TypeId::INT);
        self.make_unary(tok, UnaryOp::Deref, Some(to), ptr)
    }

    pub(crate) fn make_jump_node(
        &mut self,
        tok: &Token,
        origin: Symbol,
        label: Option<Symbol>,
    ) -> NodeId {
        self.nodes
            .push(NodeKind::Jump { origin, label }, Some(tok.clone()), None)
    }

    pub(crate) fn make_label_node(&mut self, tok: &Token, label: Symbol) -> NodeId {
        self.nodes
            .push(NodeKind::Label { label }, Some(tok.clone()), None)
    }

    pub(crate) fn make_compound_node(&mut self, tok: &Token, stmts: Vec<NodeId>) -> NodeId {
        self.nodes
            .push(NodeKind::CompoundStmt { stmts }, Some(tok.clone()), None)
    }

    // ----------------------------------------------------------------
    // type queries and conversions
    // ----------------------------------------------------------------

    pub(crate) fn get_typedef(&self, name: Symbol) -> Option<TypeId> {
        let id = self.scope.get(name)?;
        match self.nodes.kind(id) {
            NodeKind::TypedefName { .. } => self.nodes.get(id).ty,
            _ => None,
        }
    }

    /// Does this token begin a type name?
    pub(crate) fn is_type_name(&self, tok: &Token) -> bool {
        match tok.kind {
            TokenKind::Ident(name) => self.get_typedef(name).is_some(),
            TokenKind::Keyword(kw) => kw.starts_type_name(),
            _ => false,
        }
    }

    /// Scalars assign to scalars; everything else must be compatible.
    pub(crate) fn is_assignable(&mut self, t1: TypeId, t2: TypeId) -> Result<bool> {
        let a = self.types.get(t1);
        let b = self.types.get(t2);
        let scalar = |t: &mcc_sem::Type| t.is_arith_type() || matches!(t.kind, TypeKind::Ptr { .. });
        if scalar(a) && scalar(b) {
            return Ok(true);
        }
        if self.types.compatible(t1, t2) {
            return Ok(true);
        }
        let tok = self.pp.peek_token()?;
        self.error_at(
            &tok,
            format!(
                "incompatible types: '{}' and '{}'",
                self.types.to_string(t1),
                self.types.to_string(t2)
            ),
        );
        Ok(false)
    }

    /// Insert the conversion to `ty`, unless the node already has a
    /// compatible type.
    pub(crate) fn convert_to(&mut self, node: NodeId, ty: TypeId) -> NodeId {
        if self.nodes.is_error(node) {
            return node;
        }
        if self.types.compatible(self.ty_of(node), ty) {
            return node;
        }
        let tok = self.nodes.get(node).tok.clone().unwrap_or_else(|| {
            Token::new(TokenKind::Eof, mcc_util::Pos::none())
        });
        self.make_unary(&tok, UnaryOp::Conv, Some(ty), node)
    }

    /// Default conversions: integer promotion, array-to-pointer decay and
    /// function-to-pointer decay.
    pub(crate) fn convert(&mut self, node: NodeId) -> NodeId {
        if self.nodes.is_error(node) {
            return node;
        }
        let ty = self.ty_of(node);
        let tok = match self.nodes.get(node).tok.clone() {
            Some(t) => t,
            None => return node,
        };
        let t = self.types.get(ty);
        match &t.kind {
            // C11 6.3.1.1p2: small integer types promote to int
            TypeKind::Bool | TypeKind::Char | TypeKind::Short => {
                self.make_unary(&tok, UnaryOp::Conv, Some(TypeId::INT), node)
            }
            TypeKind::Int if t.bitsize > 0 => {
                self.make_unary(&tok, UnaryOp::Conv, Some(TypeId::INT), node)
            }
            // C11 6.3.2.1p3: array decays to pointer to its element
            TypeKind::Array { elem, .. } => {
                let elem = *elem;
                let ptr = self.types.ptr_to(elem);
                self.make_unary(&tok, UnaryOp::Conv, Some(ptr), node)
            }
            // C11 6.3.2.1p4: function decays to pointer to function
            TypeKind::Func { .. } => {
                let ptr = self.types.ptr_to(ty);
                self.make_unary(&tok, UnaryOp::Addr, Some(ptr), node)
            }
            _ => node,
        }
    }

    fn is_valid_pointer_binop(op: BinaryOp) -> bool {
        matches!(
            op,
            BinaryOp::Sub | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Eq | BinaryOp::Ne
        )
    }

    /// Build a typed binary operation, applying pointer rules and the
    /// usual arithmetic conversions.
    pub(crate) fn make_binop(
        &mut self,
        tok: &Token,
        op: BinaryOp,
        left: NodeId,
        right: NodeId,
    ) -> NodeId {
        if self.nodes.is_error(left) || self.nodes.is_error(right) {
            return NodeId::ERROR;
        }
        let lt = self.ty_of(left);
        let rt = self.ty_of(right);
        let l_ptr = matches!(self.types.get(lt).kind, TypeKind::Ptr { .. });
        let r_ptr = matches!(self.types.get(rt).kind, TypeKind::Ptr { .. });
        if l_ptr && r_ptr {
            if !Self::is_valid_pointer_binop(op) {
                self.error_at(tok, "invalid operands to pointer arithmetic");
            }
            // C11 6.5.6p9: pointer difference; comparisons get int width
            // but are emitted on 64-bit values
            return self.make_binary(tok, op, TypeId::LONG, left, right);
        }
        if l_ptr {
            return self.make_binary(tok, op, lt, left, right);
        }
        if r_ptr {
            // canonicalize to pointer-on-the-left
            return self.make_binary(tok, op, rt, right, left);
        }
        if !self.types.get(lt).is_arith_type() || !self.types.get(rt).is_arith_type() {
            self.error_at(tok, "invalid operands to binary expression");
            return NodeId::ERROR;
        }
        let ty = self.types.usual_arith_convert(lt, rt);
        let left = self.convert_to(left, ty);
        let right = self.convert_to(right, ty);
        self.make_binary(tok, op, ty, left, right)
    }

    // ----------------------------------------------------------------
    // external definitions
    // ----------------------------------------------------------------

    fn read_extern_decl(&mut self) -> Result<()> {
        loop {
            let tok = self.pp.peek_token()?;
            if tok.is_eof() {
                return Ok(());
            }
            if tok.is_keyword(mcc_lex::Keyword::StaticAssert) {
                let tok = self.pp.get_token()?;
                self.read_static_assert(&tok)?;
                continue;
            }
            let basetype = self.read_decl_spec_opt()?;
            if self.pp.next_punct(mcc_lex::Punct::Semi)? {
                continue;
            }

            // optimistically parse as a function definition
            self.scope.enter();
            self.labels.clear();
            self.gotos.clear();

            let mut name = None;
            let mut params = Some(Vec::new());
            let ty = self.read_declarator(
                &mut name,
                basetype,
                &mut params,
                decl::DeclaratorKind::Concrete,
            )?;
            let tok = self.pp.peek_token()?;
            let is_func = self.is_type_name(&tok) || tok.is_punct(mcc_lex::Punct::LBrace);

            if is_func {
                self.read_func_definition(&tok, ty, name, params.unwrap_or_default())?;
            } else {
                self.scope.exit();
                self.read_global_declarators(&tok, basetype, ty, name)?;
            }
        }
    }

    fn read_func_definition(
        &mut self,
        tok: &Token,
        func_ty: TypeId,
        name: Option<Symbol>,
        mut params: Vec<NodeId>,
    ) -> Result<()> {
        let name = match name {
            Some(n) => n,
            None => {
                self.error_at(tok, "expected function name");
                self.scope.exit();
                return Ok(());
            }
        };
        // `f()` in a definition means "no parameters", not variadic
        let (is_old_style, params_empty) = match &self.types.get(func_ty).kind {
            TypeKind::Func {
                params, old_style, ..
            } => (*old_style, params.is_empty()),
            _ => {
                self.error_at(tok, "expected function declarator");
                self.scope.exit();
                return Ok(());
            }
        };
        if params_empty {
            if let TypeKind::Func { variadic, .. } = &mut self.types.get_mut(func_ty).kind {
                *variadic = false;
            }
        }
        if is_old_style {
            self.read_oldstyle_param_types(func_ty, &mut params)?;
        }

        self.make_globalvar_node(tok, func_ty, name);
        if !self.pp.next_punct(mcc_lex::Punct::LBrace)? {
            let t = self.pp.peek_token()?;
            self.error_at(&t, "expected '{'");
            self.scope.exit();
            return Ok(());
        }

        let func = self.read_func_body(tok, func_ty, name, params)?;
        self.resolve_gotos()?;
        self.scope.exit();
        self.toplevels.push(func);
        Ok(())
    }

    /// Two-pass goto resolution: patch the assembler labels into jumps and
    /// label-address nodes collected while the function body was parsed.
    fn resolve_gotos(&mut self) -> Result<()> {
        for &id in &self.gotos.clone() {
            let (origin, tok) = match self.nodes.kind(id) {
                NodeKind::Jump { origin, label } if label.is_none() => {
                    (*origin, self.nodes.get(id).tok.clone())
                }
                NodeKind::LabelAddr { origin, label } if label.is_none() => {
                    (*origin, self.nodes.get(id).tok.clone())
                }
                _ => continue,
            };
            match self.labels.get(&origin).copied() {
                Some(resolved) => match &mut self.nodes.get_mut(id).kind {
                    NodeKind::Jump { label, .. } | NodeKind::LabelAddr { label, .. } => {
                        *label = Some(resolved)
                    }
                    _ => unreachable!(),
                },
                None => {
                    if let Some(tok) = tok {
                        self.error_at(
                            &tok,
                            format!("label '{}' used but not defined", origin),
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// K&R definitions: parameter names parse first with type int, the
    /// declaration block after the declarator patches the real types in.
    fn read_oldstyle_param_types(
        &mut self,
        func_ty: TypeId,
        params: &mut Vec<NodeId>,
    ) -> Result<()> {
        let mut decls = Vec::new();
        self.scope.enter();
        loop {
            let tok = self.pp.peek_token()?;
            if tok.is_punct(mcc_lex::Punct::LBrace) {
                break;
            }
            if !self.is_type_name(&tok) {
                self.error_at(&tok, "K&R-style declarator expected");
                return Ok(());
            }
            self.read_decl(&mut decls, false)?;
        }
        self.scope.exit();

        for decl in decls {
            let var = match self.nodes.kind(decl) {
                NodeKind::Decl { var, .. } => *var,
                _ => continue,
            };
            let (var_name, var_ty) = match self.nodes.kind(var) {
                NodeKind::LocalVar {
                    name: Some(name), ..
                } => (*name, self.ty_of(var)),
                _ => continue,
            };
            let mut found = false;
            for (i, &p) in params.iter().enumerate() {
                let pname = match self.nodes.kind(p) {
                    NodeKind::LocalVar {
                        name: Some(name), ..
                    } => *name,
                    _ => continue,
                };
                if pname != var_name {
                    continue;
                }
                self.nodes.get_mut(p).ty = Some(var_ty);
                if let TypeKind::Func { params, .. } = &mut self.types.get_mut(func_ty).kind {
                    if i < params.len() {
                        params[i] = var_ty;
                    }
                }
                found = true;
                break;
            }
            if !found {
                let tok = self.nodes.get(decl).tok.clone();
                if let Some(tok) = tok {
                    self.error_at(
                        &tok,
                        format!(
                            "declaration for parameter '{}' but no such parameter",
                            var_name
                        ),
                    );
                }
            }
        }
        Ok(())
    }

    fn read_func_body(
        &mut self,
        tok: &Token,
        func_ty: TypeId,
        name: Symbol,
        params: Vec<NodeId>,
    ) -> Result<NodeId> {
        self.scope.enter_func(func_ty);
        self.scope.clear_local_vars();

        let func_name = self.make_string_node(tok, name.as_str().as_bytes(), Encoding::None)?;
        self.scope.add(Symbol::intern("__func__"), func_name);
        self.scope.add(Symbol::intern("__FUNCTION__"), func_name);

        let body = self.read_compound_stmt(tok)?;
        let locals = self.scope.local_vars();
        let func = self.nodes.push(
            NodeKind::FuncDef {
                name,
                params,
                body,
                locals,
            },
            Some(tok.clone()),
            Some(func_ty),
        );
        self.scope.exit();
        Ok(func)
    }

    /// The non-function-definition arm of an external declaration: one or
    /// more comma-separated declarators sharing the base type.
    fn read_global_declarators(
        &mut self,
        tok: &Token,
        basetype: TypeId,
        first_ty: TypeId,
        first_name: Option<Symbol>,
    ) -> Result<()> {
        let mut ty = first_ty;
        let mut name = first_name;
        loop {
            let storage = self.types.get(ty).storage;
            if storage == Some(Storage::Typedef) {
                self.make_typedef_node(tok, ty, name, true);
            } else if matches!(self.types.get(ty).kind, TypeKind::Void) {
                self.error_at(tok, "type void is not allowed");
                return Ok(());
            } else if let Some(var_name) = name {
                let var = self.make_globalvar_node(tok, ty, var_name);
                let mut init = Vec::new();
                let has_init = self.pp.next_punct(mcc_lex::Punct::Assign)?;
                if has_init {
                    self.read_initializer(ty, &mut init)?;
                }
                let is_func = matches!(self.types.get(ty).kind, TypeKind::Func { .. });
                if has_init || (storage != Some(Storage::Extern) && !is_func) {
                    let decl = self
                        .nodes
                        .push(NodeKind::Decl { var, init }, Some(tok.clone()), Some(ty));
                    self.toplevels.push(decl);
                }
            }
            if self.pp.next_punct(mcc_lex::Punct::Semi)? {
                return Ok(());
            }
            if !self.pp.next_punct(mcc_lex::Punct::Comma)? {
                let t = self.pp.peek_token()?;
                self.error_at(&t, "';' or ',' are expected");
                return self.synchronize();
            }
            name = None;
            let base = self.types.copy_incomplete_type(basetype);
            ty = self.read_declarator(
                &mut name,
                base,
                &mut None,
                decl::DeclaratorKind::Concrete,
            )?;
        }
    }
}
