//! Expression and statement lowering.

use crate::Generator;
use mcc_par::ast::{BinaryOp, NodeId, NodeKind, UnaryOp};
use mcc_par::const_eval;
use mcc_sem::{Type, TypeId, TypeKind};
use mcc_util::{Result, Symbol};

fn bitfield_mask(bitsize: i32) -> u64 {
    if bitsize >= 64 {
        u64::MAX
    } else {
        (1u64 << bitsize) - 1
    }
}

impl<'a> Generator<'a> {
    /// `%al`-style register name for `%rax`/`%rcx` at a given width.
    pub(crate) fn reg_for(&self, ty: &Type, which: char) -> Result<&'static str> {
        let name = match (ty.size, which) {
            (1, 'a') => "al",
            (2, 'a') => "ax",
            (4, 'a') => "eax",
            (8, 'a') => "rax",
            (1, 'c') => "cl",
            (2, 'c') => "cx",
            (4, 'c') => "ecx",
            (8, 'c') => "rcx",
            _ => return Err(self.internal(format!("invalid data size: {}", ty.size))),
        };
        Ok(name)
    }

    // ----------------------------------------------------------------
    // conversions
    // ----------------------------------------------------------------

    fn emit_bitfield_load(&mut self, ty: &Type) {
        self.push("rcx");
        self.emit(format!("shr ${}, %rax", ty.bitoff));
        self.emit(format!("mov ${}, %rcx", bitfield_mask(ty.bitsize)));
        self.emit("and %rcx, %rax");
        self.pop("rcx");
    }

    fn emit_bitfield_save(&mut self, ty: &Type, addr: &str) -> Result<()> {
        let mask = bitfield_mask(ty.bitsize);
        let reg_c = self.reg_for(ty, 'c')?;
        self.push("rcx");
        self.push("rdi");
        self.emit(format!("mov ${}, %rdi", mask));
        self.emit("and %rdi, %rax");
        self.emit(format!("shl ${}, %rax", ty.bitoff));
        self.emit(format!("mov {}, %{}", addr, reg_c));
        self.emit(format!("mov ${}, %rdi", !(mask << ty.bitoff)));
        self.emit("and %rdi, %rcx");
        self.emit("or %rcx, %rax");
        self.pop("rdi");
        self.pop("rcx");
        Ok(())
    }

    fn emit_int_to_int64(&mut self, ty: &Type) {
        match ty.kind {
            TypeKind::Bool | TypeKind::Char => {
                if ty.is_unsigned {
                    self.emit("movzbq %al, %rax");
                } else {
                    self.emit("movsbq %al, %rax");
                }
            }
            TypeKind::Short => {
                if ty.is_unsigned {
                    self.emit("movzwq %ax, %rax");
                } else {
                    self.emit("movswq %ax, %rax");
                }
            }
            TypeKind::Int => {
                if ty.is_unsigned {
                    self.emit("movl %eax, %eax");
                } else {
                    self.emit("movslq %eax, %rax");
                }
            }
            _ => {}
        }
    }

    fn emit_float_to_int(&mut self, ty: &Type) {
        match ty.kind {
            TypeKind::Float => self.emit("cvttss2si %xmm0, %eax"),
            TypeKind::Double | TypeKind::LongDouble => self.emit("cvttsd2si %xmm0, %eax"),
            _ => {}
        }
    }

    fn emit_to_bool(&mut self, ty: &Type) {
        if ty.is_float_type() {
            self.push_xmm(1);
            self.emit("xorpd %xmm1, %xmm1");
            let cmp = if matches!(ty.kind, TypeKind::Float) {
                "ucomiss"
            } else {
                "ucomisd"
            };
            self.emit(format!("{} %xmm1, %xmm0", cmp));
            self.emit("setne %al");
            self.pop_xmm(1);
        } else {
            self.emit("cmp $0, %rax");
            self.emit("setne %al");
        }
        self.emit("movzb %al, %eax");
    }

    /// `_Bool` objects only ever hold 0 or 1.
    fn emit_bool_conv(&mut self, ty: &Type) {
        if matches!(ty.kind, TypeKind::Bool) {
            self.emit("test %rax, %rax");
            self.emit("setne %al");
        }
    }

    pub(crate) fn emit_conv(&mut self, from: TypeId, to: TypeId) {
        let f = self.ty(from).clone();
        let t = self.ty(to).clone();
        if f.is_int_type() && matches!(t.kind, TypeKind::Float) {
            self.emit("cvtsi2ss %eax, %xmm0");
        } else if f.is_int_type()
            && matches!(t.kind, TypeKind::Double | TypeKind::LongDouble)
        {
            self.emit("cvtsi2sd %eax, %xmm0");
        } else if matches!(f.kind, TypeKind::Float)
            && matches!(t.kind, TypeKind::Double | TypeKind::LongDouble)
        {
            self.emit("cvtps2pd %xmm0, %xmm0");
        } else if matches!(f.kind, TypeKind::Double | TypeKind::LongDouble)
            && matches!(t.kind, TypeKind::Float)
        {
            self.emit("cvtpd2ps %xmm0, %xmm0");
        } else if matches!(t.kind, TypeKind::Bool) {
            self.emit_to_bool(&f);
        } else if f.is_int_type() && t.is_int_type() {
            self.emit_int_to_int64(&f);
        } else if t.is_int_type() {
            self.emit_float_to_int(&f);
        }
    }

    // ----------------------------------------------------------------
    // loads and stores
    // ----------------------------------------------------------------

    /// Sign/zero-extending move for a load, or `None` when a plain
    /// `movl` suffices (32-bit moves implicitly zero the upper half).
    fn mov_inst(&self, ty: &Type) -> Result<Option<&'static str>> {
        Ok(match ty.size {
            1 => Some(if ty.is_unsigned { "movzbq" } else { "movsbq" }),
            2 => Some(if ty.is_unsigned { "movzwq" } else { "movswq" }),
            4 => {
                if ty.is_unsigned {
                    None
                } else {
                    Some("movslq")
                }
            }
            8 => Some("movq"),
            _ => {
                return Err(self.internal(format!(
                    "invalid mov data size: {}",
                    ty.size
                )))
            }
        })
    }

    pub(crate) fn emit_local_load(&mut self, ty: TypeId, base: &str, offset: i64) -> Result<()> {
        let t = self.ty(ty).clone();
        match t.kind {
            TypeKind::Float => self.emit(format!("movss {}(%{}), %xmm0", offset, base)),
            TypeKind::Double | TypeKind::LongDouble => {
                self.emit(format!("movsd {}(%{}), %xmm0", offset, base))
            }
            TypeKind::Array { .. } | TypeKind::Record { .. } => {
                self.emit(format!("lea {}(%{}), %rax", offset, base))
            }
            _ => {
                match self.mov_inst(&t)? {
                    None => self.emit(format!("movl {}(%{}), %eax", offset, base)),
                    Some(inst) => self.emit(format!("{} {}(%{}), %rax", inst, offset, base)),
                }
                if t.bitsize > 0 {
                    self.emit_bitfield_load(&t);
                }
            }
        }
        Ok(())
    }

    pub(crate) fn emit_local_save(&mut self, ty: TypeId, offset: i64) -> Result<()> {
        let t = self.ty(ty).clone();
        match t.kind {
            TypeKind::Float => self.emit(format!("movss %xmm0, {}(%rbp)", offset)),
            TypeKind::Double | TypeKind::LongDouble => {
                self.emit(format!("movsd %xmm0, {}(%rbp)", offset))
            }
            // aggregate values evaluate to their address; copy the bytes
            TypeKind::Record { .. } | TypeKind::Array { .. } => {
                self.push("rcx");
                let size = t.size.max(0);
                let mut i = 0;
                while i + 8 <= size {
                    self.emit(format!("movq {}(%rax), %rcx", i));
                    self.emit(format!("movq %rcx, {}(%rbp)", offset + i));
                    i += 8;
                }
                while i + 4 <= size {
                    self.emit(format!("movl {}(%rax), %ecx", i));
                    self.emit(format!("movl %ecx, {}(%rbp)", offset + i));
                    i += 4;
                }
                while i < size {
                    self.emit(format!("movb {}(%rax), %cl", i));
                    self.emit(format!("movb %cl, {}(%rbp)", offset + i));
                    i += 1;
                }
                self.pop("rcx");
            }
            _ => {
                self.emit_bool_conv(&t);
                let reg = self.reg_for(&t, 'a')?;
                let addr = format!("{}(%rbp)", offset);
                if t.bitsize > 0 {
                    self.emit_bitfield_save(&t, &addr)?;
                }
                self.emit(format!("mov %{}, {}", reg, addr));
            }
        }
        Ok(())
    }

    pub(crate) fn emit_global_load(
        &mut self,
        ty: TypeId,
        label: Symbol,
        offset: i64,
    ) -> Result<()> {
        let t = self.ty(ty).clone();
        match t.kind {
            TypeKind::Array { .. } | TypeKind::Record { .. } => {
                self.emit(format!("lea {}+{}(%rip), %rax", label, offset))
            }
            TypeKind::Float => self.emit(format!("movss {}+{}(%rip), %xmm0", label, offset)),
            TypeKind::Double | TypeKind::LongDouble => {
                self.emit(format!("movsd {}+{}(%rip), %xmm0", label, offset))
            }
            _ => {
                match self.mov_inst(&t)? {
                    None => self.emit(format!("movl {}+{}(%rip), %eax", label, offset)),
                    Some(inst) => {
                        self.emit(format!("{} {}+{}(%rip), %rax", inst, label, offset))
                    }
                }
                if t.bitsize > 0 {
                    self.emit_bitfield_load(&t);
                }
            }
        }
        Ok(())
    }

    pub(crate) fn emit_global_save(
        &mut self,
        ty: TypeId,
        label: Symbol,
        offset: i64,
    ) -> Result<()> {
        let t = self.ty(ty).clone();
        match t.kind {
            TypeKind::Float => self.emit(format!("movss %xmm0, {}+{}(%rip)", label, offset)),
            TypeKind::Double | TypeKind::LongDouble => {
                self.emit(format!("movsd %xmm0, {}+{}(%rip)", label, offset))
            }
            _ => {
                self.emit_bool_conv(&t);
                let reg = self.reg_for(&t, 'a')?;
                let addr = format!("{}+{}(%rip)", label, offset);
                if t.bitsize > 0 {
                    self.emit_bitfield_save(&t, &addr)?;
                }
                self.emit(format!("mov %{}, {}", reg, addr));
            }
        }
        Ok(())
    }

    /// Store a literal straight into the frame, no register round-trip.
    fn emit_literal_save(&mut self, value: NodeId, to: TypeId, offset: i64) -> Result<()> {
        match self.ty(to).kind {
            TypeKind::Bool => {
                let v = const_eval::eval_int(&self.unit.nodes, &self.unit.types, value)?.value;
                self.emit(format!("movb ${}, {}(%rbp)", (v != 0) as i64, offset));
            }
            TypeKind::Char => {
                let v = const_eval::eval_int(&self.unit.nodes, &self.unit.types, value)?.value;
                self.emit(format!("movb ${}, {}(%rbp)", v as i8, offset));
            }
            TypeKind::Short => {
                let v = const_eval::eval_int(&self.unit.nodes, &self.unit.types, value)?.value;
                self.emit(format!("movw ${}, {}(%rbp)", v as i16, offset));
            }
            TypeKind::Int => {
                let v = const_eval::eval_int(&self.unit.nodes, &self.unit.types, value)?.value;
                self.emit(format!("movl ${}, {}(%rbp)", v as i32, offset));
            }
            TypeKind::Long | TypeKind::LongLong | TypeKind::Ptr { .. } => {
                let v = const_eval::eval_int(&self.unit.nodes, &self.unit.types, value)?.value;
                self.emit(format!("movq ${}, {}(%rbp)", v, offset));
            }
            TypeKind::Float => {
                let v = const_eval::eval_float(&self.unit.nodes, &self.unit.types, value)?;
                self.emit(format!("movl ${}, {}(%rbp)", (v as f32).to_bits(), offset));
            }
            TypeKind::Double | TypeKind::LongDouble => {
                let v = const_eval::eval_float(&self.unit.nodes, &self.unit.types, value)?;
                self.emit(format!("movq ${}, {}(%rbp)", v.to_bits(), offset));
            }
            _ => {
                return Err(self.internal("invalid literal type for direct store"));
            }
        }
        Ok(())
    }

    /// Run an elaborated initializer list against the frame slot at
    /// `offset`, zero-filling the gaps.
    pub(crate) fn emit_decl_init(
        &mut self,
        init_list: &[NodeId],
        offset: i64,
        total_size: i64,
    ) -> Result<()> {
        let mut last_end: i64 = 0;
        for &item in init_list {
            let (value, init_offset) = match self.unit.nodes.kind(item) {
                NodeKind::Init { value, offset } => (*value, *offset),
                k => return Err(self.internal(format!("expected init element, got {:?}", k))),
            };
            let init_ty = self.node_ty(item);
            if init_offset > last_end {
                self.emit_zero_range(offset + last_end, offset + init_offset);
            }
            last_end = init_offset + self.ty(init_ty).size;

            let is_bitfield = self.ty(init_ty).bitsize > 0;
            let is_literal = matches!(
                self.unit.nodes.kind(value),
                NodeKind::IntLit { .. } | NodeKind::FloatLit { .. }
            );
            if is_literal && !is_bitfield {
                self.emit_literal_save(value, init_ty, offset + init_offset)?;
            } else {
                self.codegen(value)?;
                self.emit_local_save(init_ty, offset + init_offset)?;
            }
        }
        self.emit_zero_range(offset + last_end, offset + total_size);
        Ok(())
    }

    fn emit_zero_range(&mut self, mut start: i64, end: i64) {
        while start <= end - 8 {
            self.emit(format!("movq $0, {}(%rbp)", start));
            start += 8;
        }
        while start <= end - 4 {
            self.emit(format!("movl $0, {}(%rbp)", start));
            start += 4;
        }
        while start < end {
            self.emit(format!("movb $0, {}(%rbp)", start));
            start += 1;
        }
    }

    /// Compound literals initialize lazily, at their first use.
    pub(crate) fn emit_lvar_init(&mut self, node: NodeId) -> Result<()> {
        if self.emitted_inits.contains(&node) {
            return Ok(());
        }
        if let NodeKind::LocalVar { init, .. } = self.unit.nodes.kind(node) {
            if !init.is_empty() {
                self.emitted_inits.insert(node);
                let init = init.clone();
                let offset = self.local_offset(node);
                let size = self.ty(self.node_ty(node)).size;
                self.emit_decl_init(&init, offset, size)?;
            }
        }
        Ok(())
    }

    // ----------------------------------------------------------------
    // addresses and stores
    // ----------------------------------------------------------------

    pub(crate) fn emit_addr(&mut self, node: NodeId) -> Result<()> {
        match self.unit.nodes.kind(node).clone() {
            NodeKind::LocalVar { .. } => {
                self.emit_lvar_init(node)?;
                let offset = self.local_offset(node);
                self.emit(format!("lea {}(%rbp), %rax", offset));
            }
            NodeKind::GlobalVar { label, .. } => {
                self.emit(format!("lea {}(%rip), %rax", label));
            }
            NodeKind::Unary {
                op: UnaryOp::Deref,
                operand,
            } => {
                // the address of *p is the value of p
                self.codegen(operand)?;
            }
            NodeKind::Member { parent, .. } => {
                self.emit_addr(parent)?;
                let offset = self.ty(self.node_ty(node)).offset;
                self.emit(format!("add ${}, %rax", offset));
            }
            NodeKind::FuncDesg { name } => {
                self.emit(format!("lea {}(%rip), %rax", name));
            }
            k => return Err(self.internal(format!("invalid '&' operand: {:?}", k))),
        }
        Ok(())
    }

    /// Target address in `%rax`, value on the stack.
    fn emit_deref_save_aux(&mut self, ty: TypeId, offset: i64) -> Result<()> {
        if self.ty(ty).is_float_type() {
            self.emit("movsd (%rsp), %xmm0");
            if matches!(self.ty(ty).kind, TypeKind::Float) {
                self.emit(format!("movss %xmm0, {}(%rax)", offset));
            } else {
                self.emit(format!("movsd %xmm0, {}(%rax)", offset));
            }
            self.pop_xmm(0);
        } else {
            self.emit("movq (%rsp), %rcx");
            let t = self.ty(ty).clone();
            let reg = self.reg_for(&t, 'c')?;
            self.emit(format!("mov %{}, {}(%rax)", reg, offset));
            self.pop("rax");
        }
        Ok(())
    }

    fn emit_deref_save(&mut self, node: NodeId) -> Result<()> {
        let operand = match self.unit.nodes.kind(node) {
            NodeKind::Unary {
                op: UnaryOp::Deref,
                operand,
            } => *operand,
            _ => return Err(self.internal("expected a dereference")),
        };
        let ty = self
            .unit
            .types
            .pointee(self.node_ty(operand))
            .ok_or_else(|| self.internal("dereferenced non-pointer"))?;
        if self.ty(ty).is_float_type() {
            self.push_xmm(0);
        } else {
            self.push("rax");
        }
        self.codegen(operand)?;
        self.emit_deref_save_aux(ty, 0)
    }

    fn emit_member_save(&mut self, parent: NodeId, field_ty: TypeId, offset: i64) -> Result<()> {
        match self.unit.nodes.kind(parent).clone() {
            NodeKind::LocalVar { .. } => {
                self.emit_lvar_init(parent)?;
                let base = self.local_offset(parent);
                let field_off = self.ty(field_ty).offset;
                self.emit_local_save(field_ty, offset + base + field_off)
            }
            NodeKind::GlobalVar { label, .. } => {
                let field_off = self.ty(field_ty).offset;
                self.emit_global_save(field_ty, label, offset + field_off)
            }
            NodeKind::Unary {
                op: UnaryOp::Deref,
                operand,
            } => {
                if self.ty(field_ty).is_float_type() {
                    self.push_xmm(0);
                } else {
                    self.push("rax");
                }
                self.codegen(operand)?;
                let field_off = self.ty(field_ty).offset;
                self.emit_deref_save_aux(field_ty, offset + field_off)
            }
            NodeKind::Member {
                parent: grandparent,
                ..
            } => {
                let parent_off = self.ty(self.node_ty(parent)).offset;
                self.emit_member_save(grandparent, field_ty, offset + parent_off)
            }
            k => Err(self.internal(format!("invalid member store target: {:?}", k))),
        }
    }

    pub(crate) fn emit_member_load(
        &mut self,
        parent: NodeId,
        field_ty: TypeId,
        offset: i64,
    ) -> Result<()> {
        match self.unit.nodes.kind(parent).clone() {
            NodeKind::LocalVar { .. } => {
                self.emit_lvar_init(parent)?;
                let base = self.local_offset(parent);
                let field_off = self.ty(field_ty).offset;
                self.emit_local_load(field_ty, "rbp", offset + base + field_off)
            }
            NodeKind::GlobalVar { label, .. } => {
                let field_off = self.ty(field_ty).offset;
                self.emit_global_load(field_ty, label, offset + field_off)
            }
            NodeKind::Unary {
                op: UnaryOp::Deref,
                operand,
            } => {
                self.codegen(operand)?;
                let field_off = self.ty(field_ty).offset;
                self.emit_local_load(field_ty, "rax", offset + field_off)
            }
            NodeKind::Member {
                parent: grandparent,
                ..
            } => {
                let parent_off = self.ty(self.node_ty(parent)).offset;
                self.emit_member_load(grandparent, field_ty, offset + parent_off)
            }
            k => Err(self.internal(format!("invalid member load source: {:?}", k))),
        }
    }

    /// Store `%rax`/`%xmm0` into the object `node` designates.
    pub(crate) fn emit_save(&mut self, node: NodeId) -> Result<()> {
        match self.unit.nodes.kind(node).clone() {
            NodeKind::LocalVar { .. } => {
                self.emit_lvar_init(node)?;
                let offset = self.local_offset(node);
                self.emit_local_save(self.node_ty(node), offset)
            }
            NodeKind::GlobalVar { label, .. } => {
                self.emit_global_save(self.node_ty(node), label, 0)
            }
            NodeKind::Unary {
                op: UnaryOp::Deref, ..
            } => self.emit_deref_save(node),
            NodeKind::Member { parent, .. } => {
                self.emit_member_save(parent, self.node_ty(node), 0)
            }
            k => Err(self.internal(format!("invalid store operation: {:?}", k))),
        }
    }

    // ----------------------------------------------------------------
    // binary operations
    // ----------------------------------------------------------------

    fn emit_binop_cmp(&mut self, op: BinaryOp, lhs: NodeId, rhs: NodeId) -> Result<()> {
        let lt = self.node_ty(lhs);
        let left_t = self.ty(lt).clone();
        if left_t.is_float_type() {
            self.codegen(lhs)?;
            self.push_xmm(0);
            self.codegen(rhs)?;
            self.pop_xmm(1);
            if matches!(left_t.kind, TypeKind::Float) {
                self.emit("ucomiss %xmm0, %xmm1");
            } else {
                self.emit("ucomisd %xmm0, %xmm1");
            }
        } else {
            self.codegen(lhs)?;
            self.push("rax");
            self.codegen(rhs)?;
            self.pop("rcx");
            // pointers and 64-bit integers compare at full width
            if matches!(
                left_t.kind,
                TypeKind::Long | TypeKind::LongLong | TypeKind::Ptr { .. }
            ) {
                self.emit("cmp %rax, %rcx");
            } else {
                self.emit("cmp %eax, %ecx");
            }
        }
        let unsigned = left_t.is_float_type() || left_t.is_unsigned;
        let inst = match op {
            BinaryOp::Lt => {
                if unsigned {
                    "setb"
                } else {
                    "setl"
                }
            }
            BinaryOp::Le => {
                if unsigned {
                    "setbe"
                } else {
                    "setle"
                }
            }
            BinaryOp::Eq => "sete",
            BinaryOp::Ne => "setne",
            _ => return Err(self.internal("invalid comparison operator")),
        };
        self.emit(format!("{} %al", inst));
        self.emit("movzb %al, %eax");
        Ok(())
    }

    fn emit_binop_int_arith(
        &mut self,
        op: BinaryOp,
        ty: TypeId,
        lhs: NodeId,
        rhs: NodeId,
    ) -> Result<()> {
        self.codegen(lhs)?;
        self.push("rax");
        self.codegen(rhs)?;
        self.emit("movq %rax, %rcx");
        self.pop("rax");
        match op {
            BinaryOp::Div | BinaryOp::Mod => {
                if self.ty(ty).is_unsigned {
                    self.emit("movl $0, %edx");
                    self.emit("divq %rcx");
                } else {
                    self.emit("cqto");
                    self.emit("idivq %rcx");
                }
                if op == BinaryOp::Mod {
                    self.emit("movq %rdx, %rax");
                }
            }
            BinaryOp::Sal | BinaryOp::Sar | BinaryOp::Shr => {
                let inst = match op {
                    BinaryOp::Sal => "sal",
                    BinaryOp::Sar => "sar",
                    _ => "shr",
                };
                let lt = self.ty(self.node_ty(lhs)).clone();
                let reg = self.reg_for(&lt, 'a')?;
                self.emit(format!("{} %cl, %{}", inst, reg));
            }
            _ => {
                let inst = match op {
                    BinaryOp::Add => "add",
                    BinaryOp::Sub => "sub",
                    BinaryOp::Mul => "imul",
                    BinaryOp::BitXor => "xor",
                    _ => return Err(self.internal("invalid integer arithmetic operator")),
                };
                self.emit(format!("{} %rcx, %rax", inst));
            }
        }
        Ok(())
    }

    fn emit_binop_float_arith(
        &mut self,
        op: BinaryOp,
        ty: TypeId,
        lhs: NodeId,
        rhs: NodeId,
    ) -> Result<()> {
        let is_double = matches!(
            self.ty(ty).kind,
            TypeKind::Double | TypeKind::LongDouble
        );
        let inst = match op {
            BinaryOp::Add => {
                if is_double {
                    "addsd"
                } else {
                    "addss"
                }
            }
            BinaryOp::Sub => {
                if is_double {
                    "subsd"
                } else {
                    "subss"
                }
            }
            BinaryOp::Mul => {
                if is_double {
                    "mulsd"
                } else {
                    "mulss"
                }
            }
            BinaryOp::Div => {
                if is_double {
                    "divsd"
                } else {
                    "divss"
                }
            }
            _ => return Err(self.internal("invalid float arithmetic operator")),
        };
        self.codegen(lhs)?;
        self.push_xmm(0);
        self.codegen(rhs)?;
        self.emit(format!(
            "{} %xmm0, %xmm1",
            if is_double { "movsd" } else { "movss" }
        ));
        self.pop_xmm(0);
        self.emit(format!("{} %xmm1, %xmm0", inst));
        Ok(())
    }

    /// Struct assignment lowers to an 8-byte block copy.
    fn emit_copy_struct(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        let aligned = crate::align8(self.ty(self.node_ty(from)).size);
        self.push("rcx");
        self.push("r11");
        self.emit_addr(from)?;
        self.emit("movq %rax, %rcx");
        self.emit_addr(to)?;
        let mut i = 0;
        while i < aligned {
            self.emit(format!("movq {}(%rcx), %r11", i));
            self.emit(format!("movq %r11, {}(%rax)", i));
            i += 8;
        }
        self.pop("r11");
        self.pop("rcx");
        Ok(())
    }

    fn emit_binary(&mut self, node: NodeId) -> Result<()> {
        let (op, lhs, rhs) = match *self.unit.nodes.kind(node) {
            NodeKind::Binary { op, lhs, rhs } => (op, lhs, rhs),
            _ => unreachable!(),
        };
        let ty = self.node_ty(node);
        match op {
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Eq | BinaryOp::Ne => {
                self.emit_binop_cmp(op, lhs, rhs)
            }
            BinaryOp::BitAnd | BinaryOp::BitOr => {
                self.codegen(lhs)?;
                self.push("rax");
                self.codegen(rhs)?;
                self.pop("rcx");
                self.emit(format!(
                    "{} %rcx, %rax",
                    if op == BinaryOp::BitAnd { "and" } else { "or" }
                ));
                Ok(())
            }
            BinaryOp::LogAnd => {
                let end = self.ctx.make_label();
                self.codegen(lhs)?;
                self.emit("test %rax, %rax");
                self.emit("movq $0, %rax");
                self.emit(format!("je {}", end));
                self.codegen(rhs)?;
                self.emit("test %rax, %rax");
                self.emit("movq $0, %rax");
                self.emit(format!("je {}", end));
                self.emit("movq $1, %rax");
                self.emit_label(end);
                Ok(())
            }
            BinaryOp::LogOr => {
                let end = self.ctx.make_label();
                self.codegen(lhs)?;
                self.emit("test %rax, %rax");
                self.emit("movq $1, %rax");
                self.emit(format!("jne {}", end));
                self.codegen(rhs)?;
                self.emit("test %rax, %rax");
                self.emit("movq $1, %rax");
                self.emit(format!("jne {}", end));
                self.emit("movq $0, %rax");
                self.emit_label(end);
                Ok(())
            }
            BinaryOp::Assign => {
                let lt = self.node_ty(lhs);
                let is_big_record = matches!(self.ty(lt).kind, TypeKind::Record { .. })
                    && self.ty(lt).size > 8;
                if is_big_record {
                    self.emit_copy_struct(rhs, lhs)
                } else {
                    self.codegen(rhs)?;
                    self.emit_conv(self.node_ty(rhs), ty);
                    self.emit_save(lhs)
                }
            }
            BinaryOp::Comma => {
                self.codegen(lhs)?;
                self.codegen(rhs)
            }
            _ => {
                let t = self.ty(ty).clone();
                if matches!(t.kind, TypeKind::Ptr { .. }) {
                    // pointer +- integer, scaled by the pointee size
                    self.codegen(lhs)?;
                    self.push("rcx");
                    self.push("rax");
                    self.codegen(rhs)?;
                    let size = self
                        .unit
                        .types
                        .pointee(self.node_ty(lhs))
                        .map(|p| self.ty(p).size)
                        .unwrap_or(1);
                    if size > 1 {
                        self.emit(format!("imul ${}, %rax", size));
                    }
                    self.emit("movq %rax, %rcx");
                    self.pop("rax");
                    match op {
                        BinaryOp::Add => self.emit("add %rcx, %rax"),
                        BinaryOp::Sub => self.emit("sub %rcx, %rax"),
                        _ => return Err(self.internal("invalid pointer operator")),
                    }
                    self.pop("rcx");
                    Ok(())
                } else if t.is_int_type() {
                    self.emit_binop_int_arith(op, ty, lhs, rhs)
                } else if t.is_float_type() {
                    self.emit_binop_float_arith(op, ty, lhs, rhs)
                } else {
                    Err(self.internal("invalid binary operator"))
                }
            }
        }
    }

    fn emit_unary(&mut self, node: NodeId) -> Result<()> {
        let (op, operand) = match *self.unit.nodes.kind(node) {
            NodeKind::Unary { op, operand } => (op, operand),
            _ => unreachable!(),
        };
        let ty = self.node_ty(node);
        match op {
            UnaryOp::Deref => {
                self.codegen(operand)?;
                let pointee = self
                    .unit
                    .types
                    .pointee(self.node_ty(operand))
                    .ok_or_else(|| self.internal("dereferenced non-pointer"))?;
                self.emit_local_load(pointee, "rax", 0)?;
                self.emit_conv(pointee, ty);
                Ok(())
            }
            UnaryOp::Conv | UnaryOp::Cast => {
                self.codegen(operand)?;
                self.emit_conv(self.node_ty(operand), ty);
                Ok(())
            }
            UnaryOp::Addr => self.emit_addr(operand),
            UnaryOp::PostInc | UnaryOp::PostDec => {
                self.codegen(operand)?;
                self.push("rax");
                let size = self.step_size(self.node_ty(operand));
                let inst = if op == UnaryOp::PostInc { "add" } else { "sub" };
                self.emit(format!("{} ${}, %rax", inst, size));
                self.emit_save(operand)?;
                self.pop("rax");
                Ok(())
            }
            UnaryOp::PreInc | UnaryOp::PreDec => {
                self.codegen(operand)?;
                let size = self.step_size(self.node_ty(operand));
                let inst = if op == UnaryOp::PreInc { "add" } else { "sub" };
                self.emit(format!("{} ${}, %rax", inst, size));
                self.emit_save(operand)
            }
            UnaryOp::BitNot => {
                self.codegen(operand)?;
                self.emit("not %rax");
                Ok(())
            }
            UnaryOp::LogNot => {
                self.codegen(operand)?;
                self.emit("cmp $0, %rax");
                self.emit("sete %al");
                self.emit("movzb %al, %eax");
                Ok(())
            }
            UnaryOp::ComputedGoto => {
                self.codegen(operand)?;
                self.emit("jmp *%rax");
                Ok(())
            }
        }
    }

    // ----------------------------------------------------------------
    // the main dispatch
    // ----------------------------------------------------------------

    pub(crate) fn codegen(&mut self, node: NodeId) -> Result<()> {
        match self.unit.nodes.kind(node).clone() {
            NodeKind::IntLit { value } => {
                self.emit(format!("movq ${}, %rax", value));
                Ok(())
            }
            NodeKind::FloatLit { value } => {
                let ty = self.node_ty(node);
                let label = match self.float_labels.get(&node) {
                    Some(&l) => l,
                    None => {
                        // pool the bit pattern in .data under a fresh label
                        let label = self.ctx.make_label();
                        self.float_labels.insert(node, label);
                        self.emit_noindent(".data");
                        self.emit_label(label);
                        if matches!(self.ty(ty).kind, TypeKind::Float) {
                            self.emit(format!(".long {}", (value as f32).to_bits()));
                        } else {
                            self.emit(format!(".quad {}", value.to_bits()));
                        }
                        self.emit_noindent(".text");
                        label
                    }
                };
                if matches!(self.ty(ty).kind, TypeKind::Float) {
                    self.emit(format!("movss {}(%rip), %xmm0", label));
                } else {
                    self.emit(format!("movsd {}(%rip), %xmm0", label));
                }
                Ok(())
            }
            NodeKind::StrLit { .. } => {
                let label = match self.string_labels.get(&node) {
                    Some(&l) => l,
                    None => {
                        let label = self.ctx.make_label();
                        self.string_labels.insert(node, label);
                        self.emit_noindent(".data");
                        self.emit_label(label);
                        self.emit_string_data(node)?;
                        self.emit_noindent(".text");
                        label
                    }
                };
                self.emit(format!("lea {}(%rip), %rax", label));
                Ok(())
            }
            NodeKind::LocalVar { .. } => {
                self.emit_lvar_init(node)?;
                let offset = self.local_offset(node);
                self.emit_local_load(self.node_ty(node), "rbp", offset)
            }
            NodeKind::GlobalVar { label, .. } => {
                self.emit_global_load(self.node_ty(node), label, 0)
            }
            NodeKind::Unary { .. } => self.emit_unary(node),
            NodeKind::Binary { .. } => self.emit_binary(node),
            NodeKind::Ternary { cond, then, els } => {
                self.codegen(cond)?;
                let not_equal = self.ctx.make_label();
                self.emit("test %rax, %rax");
                self.emit(format!("je {}", not_equal));
                if let Some(then) = then {
                    self.codegen(then)?;
                }
                let end = self.ctx.make_label();
                self.emit(format!("jmp {}", end));
                self.emit_label(not_equal);
                self.codegen(els)?;
                self.emit_label(end);
                Ok(())
            }
            NodeKind::FuncCall { .. } => self.emit_func_call(node),
            NodeKind::Member { parent, .. } => {
                self.emit_member_load(parent, self.node_ty(node), 0)
            }
            NodeKind::LabelAddr { label, .. } => {
                let label =
                    label.ok_or_else(|| self.internal("unresolved label address"))?;
                self.emit(format!("movq ${}, %rax", label));
                Ok(())
            }
            NodeKind::Decl { var, init } => {
                if init.is_empty() {
                    return Ok(());
                }
                let offset = self.local_offset(var);
                let size = self.ty(self.node_ty(var)).size;
                self.emit_decl_init(&init, offset, size)
            }
            NodeKind::CompoundStmt { stmts } => {
                for stmt in stmts {
                    self.codegen(stmt)?;
                }
                Ok(())
            }
            NodeKind::If { cond, then, els } => {
                self.codegen(cond)?;
                let not_equal = self.ctx.make_label();
                self.emit("test %rax, %rax");
                self.emit(format!("je {}", not_equal));
                if let Some(then) = then {
                    self.codegen(then)?;
                }
                if let Some(els) = els {
                    let end = self.ctx.make_label();
                    self.emit(format!("jmp {}", end));
                    self.emit_label(not_equal);
                    self.codegen(els)?;
                    self.emit_label(end);
                } else {
                    self.emit_label(not_equal);
                }
                Ok(())
            }
            NodeKind::Label { label } => {
                self.emit_label(label);
                Ok(())
            }
            NodeKind::Jump { label, .. } => {
                let label = label.ok_or_else(|| self.internal("unresolved jump"))?;
                self.emit(format!("jmp {}", label));
                Ok(())
            }
            NodeKind::Return { value } => {
                if let Some(value) = value {
                    self.codegen(value)?;
                    if matches!(self.ty(self.node_ty(value)).kind, TypeKind::Bool) {
                        self.emit("movzx %al, %rax");
                    }
                }
                self.emit("leave");
                self.emit("ret");
                Ok(())
            }
            k => Err(self.internal(format!("node cannot generate code: {:?}", k))),
        }
    }
}
