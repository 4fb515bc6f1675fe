//! Initializer elaboration.
//!
//! Initializers flatten into a vector of `Init` nodes, each carrying a
//! byte offset within the initialized object and typed with the target
//! element's (laid-out) field type. The final list is sorted by
//! `(offset, bit-offset)` with later writes to the same slot winning,
//! which is how designators may override earlier positional entries.

use crate::ast::{NodeId, NodeKind};
use crate::Parser;
use mcc_lex::{Punct, Token, TokenKind};
use mcc_sem::{TypeId, TypeKind};
use mcc_util::Result;
use std::collections::BTreeMap;

impl Parser {
    /// `= initializer` for a declared object of type `ty`.
    pub(crate) fn read_initializer(
        &mut self,
        ty: TypeId,
        init_list: &mut Vec<NodeId>,
    ) -> Result<()> {
        let braced = self.pp.peek_token()?.is_punct(Punct::LBrace);
        if self.types.is_string_type(ty) || braced {
            self.read_initializer_list(init_list, ty, 0)?;
            // sort by (offset, bitoff); duplicates keep the last write
            let mut map: BTreeMap<(i64, i32), NodeId> = BTreeMap::new();
            for &init in init_list.iter() {
                let offset = match self.nodes.kind(init) {
                    NodeKind::Init { offset, .. } => *offset,
                    _ => continue,
                };
                let bitoff = self
                    .nodes
                    .get(init)
                    .ty
                    .map_or(0, |t| self.types.get(t).bitoff);
                map.insert((offset, bitoff), init);
            }
            init_list.clear();
            init_list.extend(map.into_values());
            return Ok(());
        }
        let raw = self.read_assign_expr()?;
        let mut value = self.convert(raw);
        let vt = self.ty_of(value);
        if self.types.get(vt).is_arith_type() && !self.types.get(vt).same_kind(self.types.get(ty))
        {
            value = self.convert_to(value, ty);
        }
        let tok = self.node_tok(value);
        init_list.push(
            self.nodes
                .push(NodeKind::Init { value, offset: 0 }, Some(tok), Some(ty)),
        );
        Ok(())
    }

    pub(crate) fn node_tok(&self, id: NodeId) -> Token {
        self.nodes
            .get(id)
            .tok
            .clone()
            .unwrap_or_else(|| Token::new(TokenKind::Eof, mcc_util::Pos::none()))
    }

    /// Dispatch on the initialized type. The opening `{` (when present)
    /// is consumed here; the element loops below stop at the matching `}`.
    pub(crate) fn read_initializer_list(
        &mut self,
        init_list: &mut Vec<NodeId>,
        ty: TypeId,
        offset: i64,
    ) -> Result<()> {
        let tok = self.pp.get_token()?;
        if self.types.is_string_type(ty) {
            if let TokenKind::Str { value, .. } = &tok.kind {
                let bytes = value.clone();
                return self.assign_string(init_list, ty, &tok, &bytes, offset);
            }
            if tok.is_punct(Punct::LBrace) {
                let inner = self.pp.peek_token()?;
                if let TokenKind::Str { value, .. } = &inner.kind {
                    let bytes = value.clone();
                    let inner = self.pp.get_token()?;
                    self.assign_string(init_list, ty, &inner, &bytes, offset)?;
                    if !self.pp.next_punct(Punct::RBrace)? {
                        let t = self.pp.peek_token()?;
                        self.error_at(&t, "expected '}'");
                    }
                    return Ok(());
                }
            }
        }
        if !tok.is_punct(Punct::LBrace) {
            self.pp.unget_token(tok);
        }
        match self.types.get(ty).kind {
            TypeKind::Record { .. } => self.read_record_initializer_list(init_list, ty, offset),
            TypeKind::Array { .. } => self.read_array_initializer_list(init_list, ty, offset),
            _ => {
                // a scalar in braces initializes as a one-element array
                let arr = self.types.array_of(ty, 1);
                self.read_array_initializer_list(init_list, arr, offset)
            }
        }
    }

    /// `char x[] = "..."`: each byte becomes an element write, the array
    /// length comes from the string when unknown, and short initializers
    /// zero-fill.
    fn assign_string(
        &mut self,
        init_list: &mut Vec<NodeId>,
        ty: TypeId,
        tok: &Token,
        bytes: &[u8],
        offset: i64,
    ) -> Result<()> {
        let len = match self.types.get(ty).kind {
            TypeKind::Array { len, .. } => len,
            _ => return Ok(()),
        };
        let len = if len == -1 {
            let n = bytes.len() as i64 + 1;
            let t = self.types.get_mut(ty);
            if let TypeKind::Array { len, .. } = &mut t.kind {
                *len = n;
            }
            t.size = n;
            n
        } else {
            len
        };
        let mut i: i64 = 0;
        for &b in bytes.iter() {
            if i >= len {
                self.warn_at(tok, "initializer-string for array of chars is too long");
                break;
            }
            let value = self.make_int_node(tok, TypeId::CHAR, b as i8 as i64);
            init_list.push(self.nodes.push(
                NodeKind::Init {
                    value,
                    offset: offset + i,
                },
                Some(tok.clone()),
                Some(TypeId::CHAR),
            ));
            i += 1;
        }
        while i < len {
            let value = self.make_int_node(tok, TypeId::CHAR, 0);
            init_list.push(self.nodes.push(
                NodeKind::Init {
                    value,
                    offset: offset + i,
                },
                Some(tok.clone()),
                Some(TypeId::CHAR),
            ));
            i += 1;
        }
        Ok(())
    }

    /// Walk a designator chain (`.f`, `[i]`, possibly nested) starting at
    /// `base_ty`. Returns the addressed type, the extra byte offset, and
    /// the member index of the first `.f` step (so positional
    /// initialization resumes after it).
    fn read_designators(
        &mut self,
        first: Token,
        base_ty: TypeId,
    ) -> Result<(TypeId, i64, Option<usize>)> {
        let mut tok = first;
        let mut cur = base_ty;
        let mut extra: i64 = 0;
        let mut first_index = None;
        loop {
            if tok.is_punct(Punct::Dot) {
                let fields = match &self.types.get(cur).kind {
                    TypeKind::Record { fields, .. } => fields.clone(),
                    _ => {
                        self.error_at(&tok, "field name in non-struct initializer");
                        return Ok((cur, extra, first_index));
                    }
                };
                let name_tok = self.pp.get_token()?;
                let name = match name_tok.ident() {
                    Some(s) => s,
                    None => {
                        self.error_at(&name_tok, "expected identifier");
                        return Ok((cur, extra, first_index));
                    }
                };
                let found = fields
                    .iter()
                    .enumerate()
                    .find(|(_, f)| f.name == Some(name));
                let (idx, fty) = match found {
                    Some((i, f)) => (i, f.ty),
                    None => {
                        self.error_at(
                            &name_tok,
                            format!("unknown field '{}' specified in initializer", name),
                        );
                        return Ok((cur, extra, first_index));
                    }
                };
                if first_index.is_none() {
                    first_index = Some(idx);
                }
                extra += self.types.get(fty).offset;
                cur = fty;
            } else if tok.is_punct(Punct::LBracket) {
                let (elem, len) = match self.types.get(cur).kind {
                    TypeKind::Array { elem, len } => (elem, len),
                    _ => {
                        self.error_at(&tok, "array index in non-array initializer");
                        return Ok((cur, extra, first_index));
                    }
                };
                let t = self.pp.peek_token()?;
                let expr = self.read_const_expr()?;
                let idx = self.const_int(expr)?;
                if idx < 0 || (len > 0 && idx >= len) {
                    self.error_at(&t, "array index in initializer exceeds array bounds");
                    return Ok((cur, extra, first_index));
                }
                if first_index.is_none() {
                    first_index = Some(idx as usize);
                }
                extra += self.types.get(elem).size * idx;
                cur = elem;
                if !self.pp.next_punct(Punct::RBracket)? {
                    let t = self.pp.peek_token()?;
                    self.error_at(&t, "expected ']'");
                    return Ok((cur, extra, first_index));
                }
            } else {
                self.pp.unget_token(tok);
                return Ok((cur, extra, first_index));
            }
            tok = self.pp.get_token()?;
        }
    }

    fn read_record_initializer_list(
        &mut self,
        init_list: &mut Vec<NodeId>,
        ty: TypeId,
        offset: i64,
    ) -> Result<()> {
        let fields = match &self.types.get(ty).kind {
            TypeKind::Record { fields, .. } => fields.clone(),
            _ => return Ok(()),
        };
        let mut i = 0usize;
        loop {
            let tok = self.pp.get_token()?;
            if tok.is_punct(Punct::RBrace) {
                return Ok(());
            }
            let (field_ty, field_offset) = if tok.is_punct(Punct::Dot) {
                let (fty, extra, first_index) = self.read_designators(tok, ty)?;
                if let Some(idx) = first_index {
                    i = idx + 1;
                }
                (fty, extra)
            } else {
                self.pp.unget_token(tok.clone());
                if i == fields.len() {
                    self.error_at(&tok, "excess elements in struct or union initializer");
                    return Ok(());
                }
                let f = &fields[i];
                i += 1;
                (f.ty, self.types.get(f.ty).offset)
            };
            self.read_designator_tail(init_list, field_ty, offset + field_offset)?;

            if self.pp.next_punct(Punct::RBrace)? {
                return Ok(());
            }
            if self.pp.next_punct(Punct::Comma)? {
                if self.pp.next_punct(Punct::RBrace)? {
                    return Ok(());
                }
            } else {
                let t = self.pp.peek_token()?;
                self.error_at(&t, "expected ','");
                return Ok(());
            }
        }
    }

    fn read_array_initializer_list(
        &mut self,
        init_list: &mut Vec<NodeId>,
        ty: TypeId,
        offset: i64,
    ) -> Result<()> {
        let (elem, mut len) = match self.types.get(ty).kind {
            TypeKind::Array { elem, len } => (elem, len),
            _ => return Ok(()),
        };
        let elem_size = self.types.get(elem).size;
        let mut i: i64 = 0;
        loop {
            let tok = self.pp.get_token()?;
            if tok.is_punct(Punct::RBrace) {
                break;
            }
            let (field_ty, field_offset) = if tok.is_punct(Punct::LBracket) {
                let (fty, extra, first_index) = self.read_designators(tok, ty)?;
                if let Some(idx) = first_index {
                    i = idx as i64;
                }
                i += 1;
                (fty, extra)
            } else {
                self.pp.unget_token(tok.clone());
                if i == len {
                    self.error_at(&tok, "excess elements in array initializer");
                    return Ok(());
                }
                let off = elem_size * i;
                i += 1;
                (elem, off)
            };
            self.read_designator_tail(init_list, field_ty, offset + field_offset)?;

            if self.pp.next_punct(Punct::RBrace)? {
                break;
            }
            if self.pp.next_punct(Punct::Comma)? {
                if self.pp.next_punct(Punct::RBrace)? {
                    break;
                }
            } else {
                let t = self.pp.peek_token()?;
                self.error_at(&t, "expected ','");
                return Ok(());
            }
        }
        // an array of unknown length takes its length from the list
        if len < 0 {
            len = i;
            let t = self.types.get_mut(ty);
            if let TypeKind::Array { len: slot, .. } = &mut t.kind {
                *slot = len;
            }
            t.size = elem_size * len;
        }
        Ok(())
    }

    /// After any designators: `=` is optional, sub-aggregates recurse,
    /// scalars may carry one redundant brace level.
    fn read_designator_tail(
        &mut self,
        init_list: &mut Vec<NodeId>,
        field_ty: TypeId,
        offset: i64,
    ) -> Result<()> {
        let tok = self.pp.peek_token()?;
        self.pp.next_punct(Punct::Assign)?;
        if matches!(
            self.types.get(field_ty).kind,
            TypeKind::Record { .. } | TypeKind::Array { .. }
        ) {
            return self.read_initializer_list(init_list, field_ty, offset);
        }
        if self.pp.next_punct(Punct::LBrace)? {
            self.read_designator_tail(init_list, field_ty, offset)?;
            if !self.pp.next_punct(Punct::RBrace)? {
                let t = self.pp.peek_token()?;
                self.error_at(&t, "expected '}'");
            }
            return Ok(());
        }
        let raw = self.read_assign_expr()?;
        let mut value = self.convert(raw);
        let vt = self.ty_of(value);
        if !self.is_assignable(field_ty, vt)? {
            self.error_at(
                &tok,
                format!(
                    "incompatible types when initializing type '{}' using type '{}'",
                    self.types.to_string(field_ty),
                    self.types.to_string(vt)
                ),
            );
            return Ok(());
        }
        if self.types.get(field_ty).is_arith_type()
            && self.types.get(vt).is_arith_type()
            && !self.types.get(field_ty).same_kind(self.types.get(vt))
        {
            value = self.convert_to(value, field_ty);
        }
        init_list.push(self.nodes.push(
            NodeKind::Init { value, offset },
            Some(tok),
            Some(field_ty),
        ));
        Ok(())
    }
}
