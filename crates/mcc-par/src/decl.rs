//! Declarations: specifiers, declarators, struct/union/enum specifiers.
//!
//! Declarator parsing uses a placeholder type for the parenthesized form:
//! in `int (*p)[3]` the inner declarator is read against a hole, the
//! suffix determines the real type, and the hole is filled afterwards.

use crate::ast::{NodeId, NodeKind};
use crate::Parser;
use mcc_lex::{Keyword, Punct, Token, TokenKind};
use mcc_sem::{layout, Qualifiers, Storage, TypeId, TypeKind};
use mcc_util::{Result, Symbol};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum DeclaratorKind {
    /// A name is required (object/function declarations).
    Concrete,
    /// No name allowed (type names in casts, sizeof).
    Abstract,
    /// Name optional (struct members, prototyped parameters).
    Optional,
}

impl Parser {
    // ----------------------------------------------------------------
    // declarations
    // ----------------------------------------------------------------

    /// One block-level declaration; emitted nodes are appended to `list`.
    pub(crate) fn read_decl(&mut self, list: &mut Vec<NodeId>, is_global: bool) -> Result<()> {
        let tok = self.pp.peek_token()?;
        if tok.is_keyword(Keyword::StaticAssert) {
            let tok = self.pp.get_token()?;
            return self.read_static_assert(&tok);
        }
        let basetype = self.read_decl_spec_opt()?;
        if self.pp.next_punct(Punct::Semi)? {
            return Ok(());
        }
        loop {
            let mut name = None;
            let base = self.types.copy_incomplete_type(basetype);
            let ty =
                self.read_declarator(&mut name, base, &mut None, DeclaratorKind::Concrete)?;
            let storage = self.types.get(ty).storage;

            if storage == Some(Storage::Typedef) {
                self.make_typedef_node(&tok, ty, name, true);
            } else if self.types.get(ty).is_static() && !is_global {
                // static local: a global with an invented label
                if let Some(var_name) = name {
                    let var = self.make_static_localvar_node(&tok, ty, var_name);
                    let mut init = Vec::new();
                    if self.pp.next_punct(Punct::Assign)? {
                        self.scope.clear_local();
                        let r = self.read_initializer(ty, &mut init);
                        self.scope.recover_local();
                        r?;
                    }
                    let decl = self
                        .nodes
                        .push(NodeKind::Decl { var, init }, Some(tok.clone()), Some(ty));
                    self.toplevels.push(decl);
                }
            } else {
                if matches!(self.types.get(ty).kind, TypeKind::Void) {
                    self.error_at(&tok, "type void is not allowed");
                    return Ok(());
                }
                let var = if is_global {
                    let var_name = name.unwrap_or_else(|| Symbol::intern(""));
                    self.make_globalvar_node(&tok, ty, var_name)
                } else {
                    self.make_localvar_node(&tok, ty, name)
                };
                let mut init = Vec::new();
                let has_init = self.pp.next_punct(Punct::Assign)?;
                if has_init {
                    self.read_initializer(ty, &mut init)?;
                }
                let is_func = matches!(self.types.get(ty).kind, TypeKind::Func { .. });
                if has_init || (storage != Some(Storage::Extern) && !is_func) {
                    let decl = self
                        .nodes
                        .push(NodeKind::Decl { var, init }, Some(tok.clone()), Some(ty));
                    list.push(decl);
                }
            }
            if self.pp.next_punct(Punct::Semi)? {
                return Ok(());
            }
            if !self.pp.next_punct(Punct::Comma)? {
                let t = self.pp.peek_token()?;
                self.error_at(&t, "';' or ',' are expected");
                return self.synchronize();
            }
        }
    }

    /// `_Static_assert ( const-expr , string ) ;` evaluated right here.
    pub(crate) fn read_static_assert(&mut self, first: &Token) -> Result<()> {
        if !self.pp.next_punct(Punct::LParen)? {
            let t = self.pp.peek_token()?;
            self.error_at(&t, "expected '('");
            return Ok(());
        }
        let expr = self.read_const_expr()?;
        let val = self.const_int(expr)?;
        if !self.pp.next_punct(Punct::Comma)? {
            let t = self.pp.peek_token()?;
            self.error_at(&t, "expected ','");
            return Ok(());
        }
        let msg_tok = self.pp.get_token()?;
        let msg = match &msg_tok.kind {
            TokenKind::Str { value, .. } => String::from_utf8_lossy(value).into_owned(),
            _ => {
                self.error_at(&msg_tok, "expected string literal");
                return Ok(());
            }
        };
        if !self.pp.next_punct(Punct::RParen)? {
            let t = self.pp.peek_token()?;
            self.error_at(&t, "expected ')'");
            return Ok(());
        }
        if !self.pp.next_punct(Punct::Semi)? {
            let t = self.pp.peek_token()?;
            self.error_at(&t, "expected ';'");
            return Ok(());
        }
        if val == 0 {
            self.error_at(first, format!("_Static_assert failed: \"{}\"", msg));
        }
        Ok(())
    }

    // ----------------------------------------------------------------
    // declaration specifiers
    // ----------------------------------------------------------------

    pub(crate) fn read_decl_spec_opt(&mut self) -> Result<TypeId> {
        let tok = self.pp.peek_token()?;
        if self.is_type_name(&tok) {
            return self.read_decl_spec();
        }
        // C89 leftovers: a missing specifier means int
        self.warn_at(&tok, "type defaults to 'int' in declaration");
        Ok(TypeId::INT)
    }

    pub(crate) fn read_decl_spec(&mut self) -> Result<TypeId> {
        let first = self.pp.peek_token()?;
        if !self.is_type_name(&first) {
            self.error_at(&first, "type name expected");
            return Ok(TypeId::INT);
        }

        #[derive(PartialEq, Clone, Copy)]
        enum Size {
            None,
            Short,
            Long,
            LLong,
        }

        let mut ty: Option<TypeId> = None;
        let mut is_typedef_type = false;
        let mut storage: Option<Storage> = None;
        let mut quals = Qualifiers::default();
        let mut is_inline = false;
        let mut is_noreturn = false;
        let mut sign: Option<Keyword> = None;
        let mut size = Size::None;
        let mut align: i64 = -1;

        loop {
            let tok = self.pp.get_token()?;
            if tok.is_eof() {
                self.error_at(&tok, "unexpected end of input in declaration");
                return Ok(TypeId::INT);
            }
            if let TokenKind::Ident(name) = tok.kind {
                if let Some(def) = self.get_typedef(name) {
                    if ty.is_some() {
                        self.error_at(&tok, "two or more data types in declaration specifiers");
                        return Ok(TypeId::INT);
                    }
                    is_typedef_type = true;
                    ty = Some(def);
                    continue;
                }
            }
            if !self.is_type_name(&tok) {
                self.pp.unget_token(tok);
                break;
            }
            let kw = match tok.kind {
                TokenKind::Keyword(kw) => kw,
                _ => unreachable!("type-name tokens are keywords here"),
            };
            match kw {
                Keyword::Typedef
                | Keyword::Extern
                | Keyword::Static
                | Keyword::ThreadLocal
                | Keyword::Auto
                | Keyword::Register => {
                    if storage.is_some() {
                        self.error_at(&tok, "multiple storage classes in declaration specifiers");
                        return Ok(TypeId::INT);
                    }
                    storage = Some(match kw {
                        Keyword::Typedef => Storage::Typedef,
                        Keyword::Extern => Storage::Extern,
                        Keyword::Static => Storage::Static,
                        Keyword::ThreadLocal => Storage::ThreadLocal,
                        Keyword::Auto => Storage::Auto,
                        _ => Storage::Register,
                    });
                }
                Keyword::Const => quals.is_const = true,
                Keyword::Restrict => quals.is_restrict = true,
                Keyword::Volatile => quals.is_volatile = true,
                Keyword::Atomic => quals.is_atomic = true,
                Keyword::Complex | Keyword::Imaginary => {
                    self.error_at(&tok, "complex types are not supported");
                }
                Keyword::Inline => is_inline = true,
                Keyword::Noreturn => is_noreturn = true,
                Keyword::Void => ty = Some(TypeId::VOID),
                Keyword::Bool => ty = Some(TypeId::BOOL),
                Keyword::Char => ty = Some(TypeId::CHAR),
                Keyword::Int => ty = Some(TypeId::INT),
                Keyword::Float => ty = Some(TypeId::FLOAT),
                Keyword::Double => ty = Some(TypeId::DOUBLE),
                Keyword::Signed | Keyword::Unsigned => {
                    if sign.is_some() {
                        self.error_at(&tok, "multiple 'signed' or 'unsigned'");
                        return Ok(TypeId::INT);
                    }
                    sign = Some(kw);
                }
                Keyword::Short => {
                    if size != Size::None {
                        self.error_at(&tok, "both 'short' and 'long' in declaration specifiers");
                        return Ok(TypeId::INT);
                    }
                    size = Size::Short;
                }
                Keyword::Long => {
                    size = match size {
                        Size::None => Size::Long,
                        Size::Long => Size::LLong,
                        _ => {
                            self.error_at(
                                &tok,
                                "both 'long long' and 'short' in declaration specifiers",
                            );
                            return Ok(TypeId::INT);
                        }
                    };
                }
                Keyword::Struct | Keyword::Union => {
                    if ty.is_some() {
                        self.error_at(&tok, "two or more data types in declaration specifiers");
                        return Ok(TypeId::INT);
                    }
                    ty = Some(self.read_struct_or_union_spec(kw == Keyword::Union)?);
                }
                Keyword::Enum => {
                    if ty.is_some() {
                        self.error_at(&tok, "two or more data types in declaration specifiers");
                        return Ok(TypeId::INT);
                    }
                    ty = Some(self.read_enum_spec()?);
                }
                Keyword::Alignas => {
                    let val = self.read_alignas()?;
                    if val < 0 {
                        self.error_at(&tok, format!("negative alignment: {}", val));
                        return Ok(TypeId::INT);
                    }
                    // C11 6.7.5p6: zero has no effect; the strictest
                    // specified alignment wins
                    if val != 0 && (align == -1 || val < align) {
                        align = val;
                    }
                }
                Keyword::Typeof => {
                    if ty.is_some() {
                        self.error_at(&tok, "two or more data types in declaration specifiers");
                        return Ok(TypeId::INT);
                    }
                    ty = Some(self.read_typeof()?);
                }
                _ => {
                    self.pp.unget_token(tok);
                    break;
                }
            }
        }

        if align != -1 && (align & (align - 1)) != 0 {
            self.error_at(&first, format!("alignment {} is not a power of 2", align));
            return Ok(TypeId::INT);
        }

        let mut ty = if is_typedef_type {
            if sign.is_some() || size != Size::None {
                self.error_at(
                    &first,
                    "typedef name cannot be combined with signedness or size specifiers",
                );
                return Ok(TypeId::INT);
            }
            let mut resolved = ty.unwrap();
            // the typedef storage class stays with the definition; a use
            // of the name declares an ordinary object
            if self.types.get(resolved).storage.is_some() {
                resolved = self.types.copy_type(resolved);
                self.types.get_mut(resolved).storage = None;
            }
            resolved
        } else {
            let base = ty.unwrap_or(TypeId::INT);
            let sized = match size {
                Size::None => base,
                Size::Short => {
                    if base != TypeId::INT {
                        self.error_at(&first, "invalid 'short' in declaration specifiers");
                        return Ok(TypeId::INT);
                    }
                    TypeId::SHORT
                }
                Size::Long => match base {
                    TypeId::INT => TypeId::LONG,
                    TypeId::DOUBLE => TypeId::LDOUBLE,
                    _ => {
                        self.error_at(&first, "invalid 'long' in declaration specifiers");
                        return Ok(TypeId::INT);
                    }
                },
                Size::LLong => {
                    if base != TypeId::INT {
                        self.error_at(&first, "invalid 'long long' in declaration specifiers");
                        return Ok(TypeId::INT);
                    }
                    TypeId::LLONG
                }
            };
            match sign {
                Some(Keyword::Unsigned) => match sized {
                    TypeId::CHAR => TypeId::UCHAR,
                    TypeId::SHORT => TypeId::USHORT,
                    TypeId::INT => TypeId::UINT,
                    TypeId::LONG => TypeId::ULONG,
                    TypeId::LLONG => TypeId::ULLONG,
                    _ => {
                        self.error_at(&first, "invalid 'unsigned' in declaration specifiers");
                        return Ok(TypeId::INT);
                    }
                },
                Some(Keyword::Signed) => {
                    if !self.types.get(sized).is_int_type() {
                        self.error_at(&first, "invalid 'signed' in declaration specifiers");
                        return Ok(TypeId::INT);
                    }
                    sized
                }
                _ => sized,
            }
        };

        if storage.is_some() || quals.any() || is_inline || is_noreturn || align != -1 {
            ty = self.types.copy_type(ty);
            let t = self.types.get_mut(ty);
            t.storage = storage;
            t.qualifiers = quals;
            t.is_inline = is_inline;
            t.is_noreturn = is_noreturn;
            if align != -1 {
                t.align = align;
            }
        }
        Ok(ty)
    }

    /// `_Alignas ( type-name | const-expr )`.
    fn read_alignas(&mut self) -> Result<i64> {
        if !self.pp.next_punct(Punct::LParen)? {
            let t = self.pp.peek_token()?;
            self.error_at(&t, "expected '('");
            return Ok(0);
        }
        let peeked = self.pp.peek_token()?;
        let align = if self.is_type_name(&peeked) {
            let ty = self.read_type_name()?;
            self.types.get(ty).align
        } else {
            let expr = self.read_const_expr()?;
            self.const_int(expr)?
        };
        if !self.pp.next_punct(Punct::RParen)? {
            let t = self.pp.peek_token()?;
            self.error_at(&t, "expected ')'");
        }
        Ok(align)
    }

    /// [GNU] `typeof ( expr | type-name )`.
    fn read_typeof(&mut self) -> Result<TypeId> {
        if !self.pp.next_punct(Punct::LParen)? {
            let t = self.pp.peek_token()?;
            self.error_at(&t, "expected '('");
            return Ok(TypeId::INT);
        }
        let peeked = self.pp.peek_token()?;
        let ty = if self.is_type_name(&peeked) {
            self.read_type_name()?
        } else {
            let expr = self.read_expr()?;
            self.ty_of(expr)
        };
        if !self.pp.next_punct(Punct::RParen)? {
            let t = self.pp.peek_token()?;
            self.error_at(&t, "expected ')'");
        }
        Ok(ty)
    }

    // ----------------------------------------------------------------
    // struct / union / enum specifiers
    // ----------------------------------------------------------------

    fn read_struct_or_union_spec(&mut self, is_union: bool) -> Result<TypeId> {
        let tok = self.pp.get_token()?;
        let ty = match tok.ident() {
            Some(tag) => match self.tags.get(&tag).copied() {
                Some(existing) => {
                    let matches_kind = match &self.types.get(existing).kind {
                        TypeKind::Record { is_union: u, .. } => *u == is_union,
                        _ => false,
                    };
                    if !matches_kind {
                        self.error_at(&tok, format!("'{}' defined as wrong kind of tag", tag));
                        return Ok(TypeId::INT);
                    }
                    existing
                }
                None => {
                    let ty = self.types.record(Some(tag), is_union);
                    self.tags.insert(tag, ty);
                    ty
                }
            },
            None => {
                if !tok.is_punct(Punct::LBrace) {
                    self.error_at(&tok, "expected '{'");
                    return Ok(TypeId::INT);
                }
                self.pp.unget_token(tok.clone());
                self.types.record(None, is_union)
            }
        };
        if !self.pp.next_punct(Punct::LBrace)? {
            return Ok(ty);
        }

        let mut members = Vec::new();
        self.read_struct_decl_list(&mut members)?;
        if let Err(e) = layout::check_flexible_array(&mut self.types, &members) {
            self.error_at(&tok, e.to_string());
        }
        let (size, align, fields) = if is_union {
            layout::layout_union(&mut self.types, members)
        } else {
            layout::layout_struct(&mut self.types, members)
        };
        let t = self.types.get_mut(ty);
        t.size = size;
        t.align = align;
        if let TypeKind::Record { fields: slot, .. } = &mut t.kind {
            *slot = fields;
        }
        Ok(ty)
    }

    fn read_struct_decl_list(
        &mut self,
        fields: &mut Vec<(Option<Symbol>, TypeId)>,
    ) -> Result<()> {
        loop {
            let tok = self.pp.peek_token()?;
            if tok.is_keyword(Keyword::StaticAssert) {
                let tok = self.pp.get_token()?;
                self.read_static_assert(&tok)?;
                continue;
            }
            if !self.is_type_name(&tok) {
                break;
            }
            let basetype = self.read_decl_spec()?;
            // an unnamed struct/union member flattens into the parent
            if matches!(self.types.get(basetype).kind, TypeKind::Record { .. })
                && self.pp.next_punct(Punct::Semi)?
            {
                fields.push((None, basetype));
                continue;
            }
            loop {
                let mut name = None;
                let mut ty = self.read_declarator(
                    &mut name,
                    basetype,
                    &mut None,
                    DeclaratorKind::Optional,
                )?;
                if matches!(self.types.get(ty).kind, TypeKind::Void) {
                    self.error_at(&tok, "variable or field declared void");
                    return Ok(());
                }
                // every field owns its layout slots
                ty = self.types.copy_type(ty);
                if self.pp.next_punct(Punct::Colon)? {
                    if !self.types.get(ty).is_int_type() {
                        self.error_at(
                            &tok,
                            format!(
                                "non-integer type '{}' cannot be a bit-field",
                                self.types.to_string(ty)
                            ),
                        );
                        return Ok(());
                    }
                    let width_node = self.read_const_expr()?;
                    let width = self.const_int(width_node)?;
                    let max = if matches!(self.types.get(ty).kind, TypeKind::Bool) {
                        1
                    } else {
                        self.types.get(ty).size * 8
                    };
                    if width < 0 || width > max {
                        self.error_at(
                            &tok,
                            format!(
                                "invalid bit-field width {} for '{}'",
                                width,
                                self.types.to_string(ty)
                            ),
                        );
                        return Ok(());
                    }
                    if width == 0 && name.is_some() {
                        self.error_at(&tok, "zero-width bit-field needs to be unnamed");
                        return Ok(());
                    }
                    self.types.get_mut(ty).bitsize = width as i32;
                } else {
                    self.types.get_mut(ty).bitsize = -1;
                }
                fields.push((name, ty));

                if self.pp.next_punct(Punct::Comma)? {
                    continue;
                }
                if self.pp.next_punct(Punct::RBrace)? {
                    self.warn_at(&tok, "no semicolon at end of struct or union");
                    return Ok(());
                }
                if !self.pp.next_punct(Punct::Semi)? {
                    self.error_at(&tok, "expected ';'");
                    return Ok(());
                }
                break;
            }
        }
        if !self.pp.next_punct(Punct::RBrace)? {
            let t = self.pp.peek_token()?;
            self.error_at(&t, "expected '}'");
        }
        Ok(())
    }

    /// Enums are plain `int`; enumerators go into scope as constants.
    fn read_enum_spec(&mut self) -> Result<TypeId> {
        let tok = self.pp.get_token()?;
        match tok.ident() {
            Some(tag) => {
                if let Some(&existing) = self.tags.get(&tag) {
                    if !matches!(self.types.get(existing).kind, TypeKind::Enum) {
                        self.error_at(&tok, format!("'{}' defined as wrong kind of tag", tag));
                        return Ok(TypeId::INT);
                    }
                } else {
                    self.tags.insert(tag, TypeId::ENUM);
                }
            }
            None => {
                if !tok.is_punct(Punct::LBrace) {
                    self.error_at(&tok, "expected '{'");
                    return Ok(TypeId::INT);
                }
                self.pp.unget_token(tok);
            }
        }
        if !self.pp.next_punct(Punct::LBrace)? {
            return Ok(TypeId::INT);
        }

        let mut val: i64 = 0;
        loop {
            let tok = self.pp.get_token()?;
            if tok.is_punct(Punct::RBrace) {
                break;
            }
            let name = match tok.ident() {
                Some(s) => s,
                None => {
                    self.error_at(&tok, "expected identifier");
                    return Ok(TypeId::INT);
                }
            };
            if self.pp.next_punct(Punct::Assign)? {
                let expr = self.read_const_expr()?;
                val = self.const_int(expr)?;
            }
            let node = self.make_int_node(&tok, TypeId::INT, val);
            val += 1;
            self.scope.add(name, node);
            if self.pp.next_punct(Punct::Comma)? {
                continue;
            }
            if self.pp.next_punct(Punct::RBrace)? {
                break;
            }
            let t = self.pp.peek_token()?;
            self.error_at(&t, "expected ',' or '}'");
            return Ok(TypeId::INT);
        }
        Ok(TypeId::INT)
    }

    // ----------------------------------------------------------------
    // declarators
    // ----------------------------------------------------------------

    /// Copy the declaration attributes (storage class, qualifiers,
    /// function specifiers) from the specifier type onto a derived type.
    fn copy_decl_attrs(&mut self, from: TypeId, to: TypeId) {
        if from == to {
            return;
        }
        let (storage, quals, is_inline, is_noreturn) = {
            let f = self.types.get(from);
            (f.storage, f.qualifiers, f.is_inline, f.is_noreturn)
        };
        if storage.is_none() && !quals.any() && !is_inline && !is_noreturn {
            return;
        }
        let t = self.types.get_mut(to);
        t.storage = storage;
        t.qualifiers = quals;
        t.is_inline = is_inline;
        t.is_noreturn = is_noreturn;
    }

    /// Concrete and abstract declarators, implemented together. `params`
    /// collects parameter variables when reading a function definition's
    /// declarator.
    pub(crate) fn read_declarator(
        &mut self,
        name: &mut Option<Symbol>,
        basetype: TypeId,
        params: &mut Option<Vec<NodeId>>,
        kind: DeclaratorKind,
    ) -> Result<TypeId> {
        if self.pp.next_punct(Punct::LParen)? {
            let peeked = self.pp.peek_token()?;
            if self.is_type_name(&peeked) {
                // this paren opens a parameter list after all
                return self.read_param_list(basetype, params);
            }
            // `int (*x)[3]`: the inner declarator's base type is not known
            // yet, so parse against a hole and fill it in afterwards
            let hole = self.types.hole();
            let inner = self.read_declarator(name, hole, params, kind)?;
            if !self.pp.next_punct(Punct::RParen)? {
                let t = self.pp.peek_token()?;
                self.error_at(&t, "expected ')'");
                return Ok(TypeId::INT);
            }
            let real = self.read_declarator_tail(basetype, params)?;
            let filled = self.fill_hole(inner, real);
            self.copy_decl_attrs(basetype, filled);
            return Ok(filled);
        }
        if self.pp.next_punct(Punct::Star)? {
            self.skip_type_qualifiers()?;
            let ptr = self.types.ptr_to(basetype);
            let r = self.read_declarator(name, ptr, params, kind)?;
            self.copy_decl_attrs(basetype, r);
            return Ok(r);
        }
        let tok = self.pp.get_token()?;
        if let Some(ident) = tok.ident() {
            if kind == DeclaratorKind::Abstract {
                self.error_at(&tok, "identifier is not expected in a type name");
            }
            *name = Some(ident);
            let r = self.read_declarator_tail(basetype, params)?;
            self.copy_decl_attrs(basetype, r);
            return Ok(r);
        }
        if kind == DeclaratorKind::Concrete {
            self.error_at(&tok, "expected identifier");
        }
        self.pp.unget_token(tok);
        let r = self.read_declarator_tail(basetype, params)?;
        self.copy_decl_attrs(basetype, r);
        Ok(r)
    }

    fn skip_type_qualifiers(&mut self) -> Result<()> {
        loop {
            let consumed = self.pp.next_keyword(Keyword::Const)?
                || self.pp.next_keyword(Keyword::Restrict)?
                || self.pp.next_keyword(Keyword::Volatile)?
                || self.pp.next_keyword(Keyword::Atomic)?;
            if !consumed {
                return Ok(());
            }
        }
    }

    fn read_declarator_tail(
        &mut self,
        basetype: TypeId,
        params: &mut Option<Vec<NodeId>>,
    ) -> Result<TypeId> {
        if self.pp.next_punct(Punct::LParen)? {
            return self.read_param_list(basetype, params);
        }
        if self.pp.next_punct(Punct::LBracket)? {
            return self.read_array_size(basetype);
        }
        Ok(basetype)
    }

    /// Replace the innermost hole within `ty` by `fill`.
    fn fill_hole(&mut self, ty: TypeId, fill: TypeId) -> TypeId {
        if matches!(self.types.get(ty).kind, TypeKind::Hole) {
            return fill;
        }
        let mut p = ty;
        loop {
            match self.types.get(p).kind {
                TypeKind::Array { elem, .. } => {
                    if matches!(self.types.get(elem).kind, TypeKind::Hole) {
                        if matches!(self.types.get(fill).kind, TypeKind::Func { .. }) {
                            self.ctx.diag.error(
                                mcc_util::Pos::none(),
                                "declaration of type name as array of functions",
                            );
                            return ty;
                        }
                        let (esize, ealign) =
                            (self.types.get(fill).size, self.types.get(fill).align);
                        let mut filled_len = None;
                        if let TypeKind::Array { elem: slot, len } =
                            &mut self.types.get_mut(p).kind
                        {
                            *slot = fill;
                            filled_len = Some(*len);
                        }
                        if let Some(len) = filled_len {
                            let t = self.types.get_mut(p);
                            t.size = if len < 0 { -1 } else { esize * len };
                            t.align = ealign;
                        }
                        return ty;
                    }
                    p = elem;
                }
                TypeKind::Ptr { to } => {
                    if matches!(self.types.get(to).kind, TypeKind::Hole) {
                        if let TypeKind::Ptr { to: slot } = &mut self.types.get_mut(p).kind {
                            *slot = fill;
                        }
                        return ty;
                    }
                    p = to;
                }
                TypeKind::Func { ret, .. } => {
                    if matches!(self.types.get(ret).kind, TypeKind::Hole) {
                        if let TypeKind::Func { ret: slot, .. } = &mut self.types.get_mut(p).kind
                        {
                            *slot = fill;
                        }
                        return ty;
                    }
                    p = ret;
                }
                _ => return ty,
            }
        }
    }

    /// A parameter list (prototype, `(void)`, `()`, or K&R names).
    fn read_param_list(
        &mut self,
        return_type: TypeId,
        params: &mut Option<Vec<NodeId>>,
    ) -> Result<TypeId> {
        match self.types.get(return_type).kind {
            TypeKind::Func { .. } => {
                let t = self.pp.peek_token()?;
                self.error_at(&t, "function returning a function");
                return Ok(TypeId::INT);
            }
            TypeKind::Array { .. } => {
                let t = self.pp.peek_token()?;
                self.error_at(&t, "function returning an array");
                return Ok(TypeId::INT);
            }
            _ => {}
        }

        let tok = self.pp.get_token()?;
        // C11 6.7.6.3p10: (void) means no parameters
        if tok.is_keyword(Keyword::Void) && self.pp.next_punct(Punct::RParen)? {
            return Ok(self.types.func(return_type, Vec::new(), false, false));
        }
        // (): an old-style declaration saying nothing about parameters
        if tok.is_punct(Punct::RParen) {
            return Ok(self.types.func(return_type, Vec::new(), true, true));
        }
        if tok.is_punct(Punct::Ellipsis) {
            self.error_at(&tok, "a named argument is required before '...'");
            return Ok(TypeId::INT);
        }
        let is_ansi = self.is_type_name(&tok);
        self.pp.unget_token(tok);

        if is_ansi {
            let mut variadic = false;
            let mut param_types = Vec::new();
            self.read_ansi_params(params, &mut param_types, &mut variadic)?;
            return Ok(self.types.func(return_type, param_types, variadic, false));
        }

        if params.is_none() {
            let t = self.pp.peek_token()?;
            self.error_at(&t, "invalid function declaration");
        }
        let mut param_types = Vec::new();
        self.read_oldstyle_params(params, &mut param_types)?;
        Ok(self.types.func(return_type, param_types, false, true))
    }

    /// ANSI-style prototyped parameters.
    fn read_ansi_params(
        &mut self,
        params: &mut Option<Vec<NodeId>>,
        param_types: &mut Vec<TypeId>,
        variadic: &mut bool,
    ) -> Result<()> {
        loop {
            let tok = self.pp.peek_token()?;
            if self.pp.next_punct(Punct::Ellipsis)? {
                if !self.pp.next_punct(Punct::RParen)? {
                    self.error_at(&tok, "expected ')'");
                    return Ok(());
                }
                *variadic = true;
                return Ok(());
            }
            if !self.is_type_name(&tok) {
                self.error_at(&tok, "type expected");
                return Ok(());
            }
            let basetype = self.read_decl_spec()?;
            let mut name = None;
            // prototype parameters may be unnamed even in definitions;
            // a nameless parameter of a definition is simply unusable
            let mut ty =
                self.read_declarator(&mut name, basetype, &mut None, DeclaratorKind::Optional)?;
            // C11 6.7.6.3p7-8: arrays and functions adjust to pointers
            match self.types.get(ty).kind {
                TypeKind::Array { elem, .. } => ty = self.types.ptr_to(elem),
                TypeKind::Func { .. } => ty = self.types.ptr_to(ty),
                TypeKind::Void => {
                    self.error_at(&tok, "parameter has incomplete type");
                    return Ok(());
                }
                _ => {}
            }
            param_types.push(ty);
            if let Some(params) = params {
                let var = self.make_localvar_node(&tok, ty, name);
                params.push(var);
            }
            if self.pp.next_punct(Punct::RParen)? {
                return Ok(());
            }
            if !self.pp.next_punct(Punct::Comma)? {
                let t = self.pp.peek_token()?;
                self.error_at(&t, "expected ','");
                return Ok(());
            }
        }
    }

    /// K&R-style identifier list; everything is int until the declaration
    /// block after the declarator patches the real types in.
    fn read_oldstyle_params(
        &mut self,
        params: &mut Option<Vec<NodeId>>,
        param_types: &mut Vec<TypeId>,
    ) -> Result<()> {
        loop {
            let tok = self.pp.get_token()?;
            let name = match tok.ident() {
                Some(s) => s,
                None => {
                    self.error_at(&tok, "invalid function declaration");
                    return Ok(());
                }
            };
            if let Some(params) = params {
                let var = self.make_localvar_node(&tok, TypeId::INT, Some(name));
                params.push(var);
            }
            param_types.push(TypeId::INT);
            if self.pp.next_punct(Punct::RParen)? {
                return Ok(());
            }
            if !self.pp.next_punct(Punct::Comma)? {
                let t = self.pp.peek_token()?;
                self.error_at(&t, "expected ','");
                return Ok(());
            }
        }
    }

    fn read_array_size(&mut self, basetype: TypeId) -> Result<TypeId> {
        let len = if self.pp.next_punct(Punct::RBracket)? {
            -1
        } else {
            let len = if self.pp.next_punct(Punct::Star)? {
                -1
            } else {
                let expr = self.read_const_expr()?;
                self.const_int(expr)?
            };
            if !self.pp.next_punct(Punct::RBracket)? {
                let t = self.pp.peek_token()?;
                self.error_at(&t, "expected ']'");
                return Ok(TypeId::INT);
            }
            len
        };
        let tok = self.pp.peek_token()?;
        let elem = self.read_declarator_tail(basetype, &mut None)?;
        if matches!(self.types.get(elem).kind, TypeKind::Func { .. }) {
            self.error_at(&tok, "declaration of array of functions");
            return Ok(TypeId::INT);
        }
        Ok(self.types.array_of(elem, len))
    }

    /// `type-name: spec-qual-list abstract-declarator?`
    pub(crate) fn read_type_name(&mut self) -> Result<TypeId> {
        let basetype = self.read_decl_spec()?;
        let mut name = None;
        self.read_declarator(&mut name, basetype, &mut None, DeclaratorKind::Abstract)
    }
}
