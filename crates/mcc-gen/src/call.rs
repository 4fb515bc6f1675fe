//! Function calls, prologues and the variadic machinery.
//!
//! Call sites compute each register argument into `%rax`/`%xmm0` and push
//! it, then pop in reverse into the ABI registers just before the call;
//! computing directly into `%rdx`/`%rcx` would let a later argument's
//! evaluation clobber an earlier one. Excess arguments go on the stack
//! right-to-left, structs as 8-aligned blocks.

use crate::{Generator, REGS, REGS_LOW, REG_SAVE_AREA_SIZE};
use mcc_par::ast::{NodeId, NodeKind, UnaryOp};
use mcc_sem::TypeKind;
use mcc_util::Result;

impl<'a> Generator<'a> {
    pub(crate) fn emit_func_call(&mut self, node: NodeId) -> Result<()> {
        let (name, func_ty, func_ptr, args) = match self.unit.nodes.kind(node).clone() {
            NodeKind::FuncCall {
                name,
                func_ty,
                func_ptr,
                args,
            } => (name, func_ty, func_ptr, args),
            _ => unreachable!(),
        };

        // compiler builtins dispatch directly
        if let Some(name) = name {
            match name.as_str() {
                "__builtin_va_start" => return self.emit_builtin_va_start(&args),
                "__builtin_reg_class" => return self.emit_builtin_reg_class(&args),
                _ => {}
            }
        }

        let entry_stack_size = self.stack_size;

        // classify arguments: six GPR slots, eight XMM slots, the rest
        // (and all structs) on the stack
        let mut int_args = Vec::new();
        let mut float_args = Vec::new();
        let mut other_args = Vec::new();
        for &arg in &args {
            let t = self.ty(self.node_ty(arg));
            if matches!(t.kind, TypeKind::Record { .. }) {
                other_args.push(arg);
            } else if t.is_float_type() {
                if float_args.len() < 8 {
                    float_args.push(arg);
                } else {
                    other_args.push(arg);
                }
            } else if int_args.len() < 6 {
                int_args.push(arg);
            } else {
                other_args.push(arg);
            }
        }

        // preserve the argument registers we are about to overwrite
        for i in 0..int_args.len() {
            self.push(REGS[i]);
        }
        for i in 1..float_args.len() {
            self.push_xmm(i);
        }

        // the pad goes below the stack arguments, so account for their
        // total size when deciding call-site alignment
        let others_total: i64 = other_args
            .iter()
            .map(|&arg| {
                let t = self.ty(self.node_ty(arg));
                if matches!(t.kind, TypeKind::Record { .. }) {
                    crate::align8(t.size)
                } else {
                    8
                }
            })
            .sum();
        let padding = (self.stack_size + others_total) % 16 != 0;
        if padding {
            self.emit("sub $8, %rsp");
            self.stack_size += 8;
        }

        // stack arguments, pushed right-to-left
        let mut others_size = 0;
        for &arg in other_args.iter().rev() {
            let ty = self.node_ty(arg);
            let t = self.ty(ty).clone();
            if matches!(t.kind, TypeKind::Record { .. }) {
                self.emit_addr(arg)?;
                others_size += self.push_struct(t.size);
            } else if t.is_float_type() {
                self.codegen(arg)?;
                self.push_xmm(0);
                others_size += 8;
            } else {
                self.codegen(arg)?;
                self.push("rax");
                others_size += 8;
            }
        }

        // register arguments: compute and push, then pop in reverse into
        // the ABI registers
        for &arg in &float_args {
            self.codegen(arg)?;
            self.push_xmm(0);
        }
        for &arg in &int_args {
            self.codegen(arg)?;
            self.push("rax");
        }
        for i in (0..int_args.len()).rev() {
            self.pop(REGS[i]);
        }
        for i in (0..float_args.len()).rev() {
            self.pop_xmm(i);
        }

        if let Some(fp) = func_ptr {
            self.codegen(fp)?;
            self.emit("movq %rax, %r11");
        }
        let variadic = matches!(
            self.ty(func_ty).kind,
            TypeKind::Func { variadic: true, .. }
        );
        if variadic {
            // %al carries the number of vector-register arguments
            self.emit(format!("mov ${}, %eax", float_args.len()));
        }
        match (name, func_ptr.is_some()) {
            (_, true) => self.emit("call *%r11"),
            (Some(name), false) => self.emit(format!("call {}", name)),
            (None, false) => return Err(self.internal("call without target")),
        }

        if matches!(self.ty(self.node_ty(node)).kind, TypeKind::Bool) {
            self.emit("movzx %al, %rax");
        }

        // unwind stack arguments, padding and saved registers
        if others_size > 0 {
            self.emit(format!("add ${}, %rsp", others_size));
            self.stack_size -= others_size;
        }
        if padding {
            self.emit("add $8, %rsp");
            self.stack_size -= 8;
        }
        for i in (1..float_args.len()).rev() {
            self.pop_xmm(i);
        }
        for i in (0..int_args.len()).rev() {
            self.pop(REGS[i]);
        }

        debug_assert_eq!(entry_stack_size, self.stack_size);
        Ok(())
    }

    /// `__builtin_va_start(ap)`: fill in the va_list fields from the
    /// current function's register usage and save area.
    fn emit_builtin_va_start(&mut self, args: &[NodeId]) -> Result<()> {
        let arg = *args
            .first()
            .ok_or_else(|| self.internal("__builtin_va_start without argument"))?;
        // va_list is { u32 gp_offset; u32 fp_offset;
        //              void *overflow_arg_area; void *reg_save_area; }
        self.codegen(arg)?;
        self.push("rcx");
        self.emit(format!("movl ${}, (%rax)", self.current_gp * 8));
        self.emit(format!("movl ${}, 4(%rax)", 48 + self.current_fp * 16));
        self.emit("lea 16(%rbp), %rcx");
        self.emit("mov %rcx, 8(%rax)");
        self.emit(format!("lea {}(%rbp), %rcx", -REG_SAVE_AREA_SIZE));
        self.emit("mov %rcx, 16(%rax)");
        self.pop("rcx");
        Ok(())
    }

    /// `__builtin_reg_class(p)`: 0 GPR, 1 SSE, 2 MEMORY for the pointee.
    fn emit_builtin_reg_class(&mut self, args: &[NodeId]) -> Result<()> {
        let mut arg = *args
            .first()
            .ok_or_else(|| self.internal("__builtin_reg_class without argument"))?;
        if let NodeKind::Unary {
            op: UnaryOp::Conv,
            operand,
        } = *self.unit.nodes.kind(arg)
        {
            arg = operand;
        }
        let pointee = self
            .unit
            .types
            .pointee(self.node_ty(arg))
            .ok_or_else(|| self.internal("__builtin_reg_class expects a pointer"))?;
        let t = self.ty(pointee);
        let class = if matches!(t.kind, TypeKind::Record { .. }) {
            2
        } else if t.is_float_type() {
            1
        } else {
            0
        };
        self.emit(format!("movl ${}, %eax", class));
        Ok(())
    }

    /// Spill the six GPRs and eight XMM argument registers at the frame
    /// base of a variadic function.
    fn emit_reg_area_save(&mut self) {
        self.emit(format!("sub ${}, %rsp", REG_SAVE_AREA_SIZE));
        for (i, reg) in REGS.iter().enumerate() {
            self.emit(format!("movq %{}, {}(%rsp)", reg, 8 * i));
        }
        for i in 0..8 {
            self.emit(format!("movaps %xmm{}, {}(%rsp)", i, 48 + 16 * i));
        }
    }

    pub(crate) fn emit_func_def(&mut self, node: NodeId) -> Result<()> {
        let (name, params, body, locals) = match self.unit.nodes.kind(node).clone() {
            NodeKind::FuncDef {
                name,
                params,
                body,
                locals,
            } => (name, params, body, locals),
            _ => unreachable!(),
        };
        let func_ty = self.node_ty(node);
        let variadic = matches!(
            self.ty(func_ty).kind,
            TypeKind::Func { variadic: true, .. }
        );

        self.emit(".text");
        if !self.ty(func_ty).is_static() {
            self.emit_noindent(format!(".globl {}", name));
        }
        self.emit_noindent(format!("{}:", name));
        self.emit("nop");
        self.push("rbp");
        self.emit("movq %rsp, %rbp");

        let mut offset: i64 = 0;
        if variadic {
            self.emit_reg_area_save();
            offset -= REG_SAVE_AREA_SIZE;
        }

        // spill incoming parameters; `pos` counts 8-byte slots above the
        // frame (saved rip and rbp occupy the first two)
        let mut gprs = 0usize;
        let mut xmms = 0usize;
        let mut pos: i64 = 2;
        for &param in &params {
            let pty = self.node_ty(param);
            let t = self.ty(pty).clone();
            if matches!(t.kind, TypeKind::Record { .. }) {
                self.emit(format!("lea {}(%rbp), %rax", pos * 8));
                let size = self.push_struct(t.size);
                offset -= size;
                pos += size / 8;
            } else if t.is_float_type() {
                if xmms >= 8 {
                    self.emit(format!("movq {}(%rbp), %rax", pos * 8));
                    pos += 1;
                    self.push("rax");
                } else {
                    self.push_xmm(xmms);
                    xmms += 1;
                }
                offset -= 8;
            } else {
                if gprs >= 6 {
                    if matches!(t.kind, TypeKind::Bool) {
                        self.emit(format!("movb {}(%rbp), %al", pos * 8));
                        self.emit("movzx %al, %rax");
                    } else {
                        self.emit(format!("movq {}(%rbp), %rax", pos * 8));
                    }
                    pos += 1;
                    self.push("rax");
                } else {
                    if matches!(t.kind, TypeKind::Bool) {
                        self.emit(format!("movzx %{}, %{}", REGS_LOW[gprs], REGS[gprs]));
                    }
                    self.push(REGS[gprs]);
                    gprs += 1;
                }
                offset -= 8;
            }
            self.offsets.insert(param, offset);
        }
        self.current_gp = gprs;
        self.current_fp = xmms;

        // frame slots for locals, each aligned to 8
        let mut localarea = 0;
        for &var in &locals {
            let size = crate::align8(self.ty(self.node_ty(var)).size.max(0));
            offset -= size;
            self.offsets.insert(var, offset);
            localarea += size;
        }
        if localarea > 0 {
            self.emit(format!("sub ${}, %rsp", localarea));
            self.stack_size += localarea;
        }

        if let Some(body) = body {
            self.codegen(body)?;
        }

        self.emit("leave");
        self.emit("ret");
        Ok(())
    }
}
