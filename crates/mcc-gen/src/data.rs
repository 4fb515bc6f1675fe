//! Static data emission.
//!
//! Global initializers fold to constants at emission time. Pointers to
//! string literals and to compound literals pool their referent in the
//! next `.data` subsection, so the reference and the referent interleave
//! without disturbing the current object's byte stream. Adjacent
//! bit-field initializers OR-fold into a single storage-unit write.

use crate::Generator;
use mcc_par::ast::{NodeId, NodeKind, UnaryOp};
use mcc_par::const_eval;
use mcc_sem::{TypeId, TypeKind};
use mcc_util::quote::quote_bytes;
use mcc_util::{Result, Symbol};

impl<'a> Generator<'a> {
    fn eval_const(&self, value: NodeId) -> Result<(i64, Option<Symbol>)> {
        let v = const_eval::eval_int(&self.unit.nodes, &self.unit.types, value)?;
        Ok((v.value, v.label))
    }

    /// `.string` for char data; wide strings emit their code units.
    pub(crate) fn emit_string_data(&mut self, node: NodeId) -> Result<()> {
        let (data, elem_size) = match self.unit.nodes.kind(node) {
            NodeKind::StrLit { data, elem_size } => (data.clone(), *elem_size),
            _ => return Err(self.internal("expected string literal")),
        };
        match elem_size {
            1 => {
                self.emit(format!(".string \"{}\"", quote_bytes(&data, data.len())));
            }
            2 => {
                for unit in data.chunks(2) {
                    let v = u16::from_le_bytes([unit[0], *unit.get(1).unwrap_or(&0)]);
                    self.emit(format!(".short {}", v));
                }
                self.emit(".short 0");
            }
            _ => {
                for unit in data.chunks(4) {
                    let mut b = [0u8; 4];
                    b[..unit.len()].copy_from_slice(unit);
                    self.emit(format!(".long {}", u32::from_le_bytes(b)));
                }
                self.emit(".long 0");
            }
        }
        Ok(())
    }

    /// One scalar of static data.
    fn emit_data_primtype(&mut self, ty: TypeId, value: NodeId, subsection: u32) -> Result<()> {
        match self.ty(ty).kind {
            TypeKind::Bool => {
                let (v, _) = self.eval_const(value)?;
                self.emit(format!(".byte {}", (v != 0) as i64));
            }
            TypeKind::Char => {
                let (v, _) = self.eval_const(value)?;
                self.emit(format!(".byte {}", v as u8));
            }
            TypeKind::Short => {
                let (v, _) = self.eval_const(value)?;
                self.emit(format!(".short {}", v as i16));
            }
            TypeKind::Int | TypeKind::Enum => {
                let (v, _) = self.eval_const(value)?;
                self.emit(format!(".long {}", v as i32));
            }
            TypeKind::Long | TypeKind::LongLong => {
                let (v, label) = self.eval_const(value)?;
                match label {
                    None => self.emit(format!(".quad {}", v)),
                    Some(label) => self.emit(format!(".quad {}+{}", label, v)),
                }
            }
            TypeKind::Float => {
                let v = const_eval::eval_float(&self.unit.nodes, &self.unit.types, value)?;
                self.emit(format!(".long {}", (v as f32).to_bits()));
            }
            TypeKind::Double | TypeKind::LongDouble => {
                let v = const_eval::eval_float(&self.unit.nodes, &self.unit.types, value)?;
                self.emit(format!(".quad {}", v.to_bits()));
            }
            TypeKind::Ptr { .. } => {
                // peel conversions to see the referent
                let mut val = value;
                while let NodeKind::Unary {
                    op: UnaryOp::Cast | UnaryOp::Conv,
                    operand,
                } = *self.unit.nodes.kind(val)
                {
                    val = operand;
                }
                // pointer to a string literal: pool the bytes next door
                if matches!(self.unit.nodes.kind(val), NodeKind::StrLit { .. }) {
                    let label = self.ctx.make_label();
                    self.emit(format!(".data {}", subsection + 1));
                    self.emit_label(label);
                    self.emit_string_data(val)?;
                    self.emit(format!(".data {}", subsection));
                    self.emit(format!(".quad {}", label));
                    return Ok(());
                }
                if let NodeKind::Unary {
                    op: UnaryOp::Addr,
                    operand,
                } = *self.unit.nodes.kind(val)
                {
                    match self.unit.nodes.kind(operand).clone() {
                        NodeKind::LocalVar { init, .. } => {
                            // address of a compound literal
                            let label = self.ctx.make_label();
                            let size = self.ty(self.node_ty(operand)).size;
                            self.emit(format!(".data {}", subsection + 1));
                            self.emit_label(label);
                            self.emit_data_aux(&init, size, 0, subsection + 1)?;
                            self.emit(format!(".data {}", subsection));
                            self.emit(format!(".quad {}", label));
                            return Ok(());
                        }
                        NodeKind::GlobalVar { label, .. } => {
                            self.emit(format!(".quad {}", label));
                            return Ok(());
                        }
                        NodeKind::FuncDesg { name } => {
                            self.emit(format!(".quad {}", name));
                            return Ok(());
                        }
                        _ => {}
                    }
                }
                let (v, label) = self.eval_const(val)?;
                match label {
                    None => self.emit(format!(".quad {}", v)),
                    Some(label) => self.emit(format!(".quad {}+{}", label, v)),
                }
            }
            _ => {
                return Err(self.internal("expected constant expression in static data"));
            }
        }
        Ok(())
    }

    fn emit_zero(&mut self, start: i64, end: i64) {
        if end - start > 0 {
            self.emit(format!(".zero {}", end - start));
        }
    }

    pub(crate) fn emit_data_aux(
        &mut self,
        init_list: &[NodeId],
        total_size: i64,
        offset: i64,
        subsection: u32,
    ) -> Result<()> {
        let mut last_end: i64 = 0;
        let mut i = 0usize;
        while i < init_list.len() {
            let (value, init_offset) = match self.unit.nodes.kind(init_list[i]) {
                NodeKind::Init { value, offset } => (*value, *offset),
                k => return Err(self.internal(format!("expected init element, got {:?}", k))),
            };
            let init_ty = self.node_ty(init_list[i]);
            if init_offset > last_end {
                self.emit_zero(offset + last_end, offset + init_offset);
            }

            // OR-fold adjacent bit-fields of one storage unit
            if self.ty(init_ty).bitsize > 0 {
                let (first, _) = self.eval_const(value)?;
                let mut to_ty = init_ty;
                let mut folded =
                    (first & mask64(self.ty(init_ty).bitsize)) << self.ty(init_ty).bitoff;
                let mut end_offset = init_offset + self.ty(init_ty).size;
                i += 1;
                while i < init_list.len() {
                    let (v2, off2, ty2) = match self.unit.nodes.kind(init_list[i]) {
                        NodeKind::Init { value, offset } => {
                            let ty2 = self.node_ty(init_list[i]);
                            if self.ty(ty2).bitsize <= 0 || *offset != init_offset {
                                break;
                            }
                            let (v2, _) = self.eval_const(*value)?;
                            (v2, *offset, ty2)
                        }
                        _ => break,
                    };
                    folded |= (v2 & mask64(self.ty(ty2).bitsize)) << self.ty(ty2).bitoff;
                    to_ty = ty2;
                    end_offset = off2 + self.ty(ty2).size;
                    i += 1;
                }
                self.emit_folded_unit(to_ty, folded)?;
                last_end = end_offset;
                continue;
            }
            last_end = init_offset + self.ty(init_ty).size;

            match self.unit.nodes.kind(value).clone() {
                // a nested compound literal emits inline
                NodeKind::LocalVar { init, .. } => {
                    let size = self.ty(self.node_ty(value)).size;
                    self.emit_data_aux(&init, size, 0, subsection)?;
                }
                NodeKind::Unary {
                    op: UnaryOp::Addr,
                    operand,
                } => match self.unit.nodes.kind(operand).clone() {
                    NodeKind::LocalVar { init, .. } => {
                        let label = self.ctx.make_label();
                        let size = self.ty(self.node_ty(operand)).size;
                        self.emit(format!(".data {}", subsection + 1));
                        self.emit_label(label);
                        self.emit_data_aux(&init, size, 0, subsection + 1)?;
                        self.emit(format!(".data {}", subsection));
                        self.emit(format!(".quad {}", label));
                    }
                    NodeKind::GlobalVar { label, .. } => {
                        self.emit(format!(".quad {}", label));
                    }
                    NodeKind::FuncDesg { name } => {
                        self.emit(format!(".quad {}", name));
                    }
                    _ => {
                        let (v, label) = self.eval_const(operand)?;
                        match label {
                            None => self.emit(format!(".quad {}", v)),
                            Some(label) => self.emit(format!(".quad {}+{}", label, v)),
                        }
                    }
                },
                _ => self.emit_data_primtype(init_ty, value, subsection)?,
            }
            i += 1;
        }
        self.emit_zero(last_end, total_size);
        Ok(())
    }

    /// Write one OR-folded bit-field storage unit.
    fn emit_folded_unit(&mut self, ty: TypeId, value: i64) -> Result<()> {
        match self.ty(ty).size {
            1 => self.emit(format!(".byte {}", value as u8)),
            2 => self.emit(format!(".short {}", value as u16)),
            4 => self.emit(format!(".long {}", value as u32)),
            8 => self.emit(format!(".quad {}", value)),
            n => return Err(self.internal(format!("invalid bit-field unit size {}", n))),
        }
        Ok(())
    }

    /// An initialized global: a labelled blob in `.data`.
    pub(crate) fn emit_data_decl(&mut self, node: NodeId) -> Result<()> {
        let (var, init) = match self.unit.nodes.kind(node).clone() {
            NodeKind::Decl { var, init } => (var, init),
            _ => unreachable!(),
        };
        let label = match self.unit.nodes.kind(var) {
            NodeKind::GlobalVar { label, .. } => *label,
            k => return Err(self.internal(format!("expected global variable, got {:?}", k))),
        };
        let ty = self.node_ty(var);
        self.emit(".data 0");
        if !self.ty(ty).is_static() {
            self.emit(format!(".globl {}", label));
        }
        self.emit_noindent(format!("{}:", label));
        let size = self.ty(ty).size;
        self.emit_data_aux(&init, size, 0, 0)
    }

    /// A tentative definition: reserved, zero-filled storage.
    pub(crate) fn emit_bss(&mut self, node: NodeId) -> Result<()> {
        let var = match self.unit.nodes.kind(node) {
            NodeKind::Decl { var, .. } => *var,
            _ => unreachable!(),
        };
        let label = match self.unit.nodes.kind(var) {
            NodeKind::GlobalVar { label, .. } => *label,
            k => return Err(self.internal(format!("expected global variable, got {:?}", k))),
        };
        let ty = self.node_ty(var);
        self.emit(".data");
        if !self.ty(ty).is_static() {
            self.emit(format!(".globl {}", label));
        }
        self.emit(format!(".lcomm {}, {}", label, self.ty(ty).size.max(0)));
        Ok(())
    }
}

fn mask64(bits: i32) -> i64 {
    if bits >= 64 {
        -1
    } else {
        (1i64 << bits) - 1
    }
}
