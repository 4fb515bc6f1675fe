//! mcc-gen - x86-64 System V code generation
//!
//! Lowers the typed AST to GAS-syntax assembly in one pass. Expressions
//! evaluate into `%rax` (integers, pointers) or `%xmm0` (floats);
//! intermediate values go through the stack, and the generator tracks the
//! simulated stack depth so every `call` happens on a 16-byte boundary.
//!
//! State the AST cannot carry (frame offsets of locals, pool labels of
//! float/string literals, which compound-literal initializers already ran,
//! the current function's register-argument counts) lives in side tables
//! here; the AST stays immutable during generation.

mod call;
mod data;
mod emit;
#[cfg(test)]
mod tests;

use mcc_par::ast::{NodeId, NodeKind, TranslationUnit};
use mcc_sem::TypeKind;
use mcc_util::{Context, Fatal, Result, Symbol};
use rustc_hash::{FxHashMap, FxHashSet};
use std::rc::Rc;

/// Integer argument registers, in ABI order.
pub(crate) const REGS: [&str; 6] = ["rdi", "rsi", "rdx", "rcx", "r8", "r9"];
/// Their byte-sized aliases, used to widen incoming `_Bool` parameters.
pub(crate) const REGS_LOW: [&str; 6] = ["dil", "sil", "dl", "cl", "r8b", "r9b"];

/// 6 GPRs at 8 bytes plus 8 XMM slots at 16 bytes.
pub(crate) const REG_SAVE_AREA_SIZE: i64 = 176;

pub struct Generator<'a> {
    pub(crate) unit: &'a TranslationUnit,
    pub(crate) ctx: Rc<Context>,
    pub(crate) out: String,
    /// Bytes pushed since frame setup; parity decides call-site padding.
    pub(crate) stack_size: i64,
    // per-node state (the AST is shared and immutable here)
    pub(crate) offsets: FxHashMap<NodeId, i64>,
    pub(crate) float_labels: FxHashMap<NodeId, Symbol>,
    pub(crate) string_labels: FxHashMap<NodeId, Symbol>,
    pub(crate) emitted_inits: FxHashSet<NodeId>,
    /// Register-argument counts of the function being emitted, consumed
    /// by `__builtin_va_start`.
    pub(crate) current_gp: usize,
    pub(crate) current_fp: usize,
}

pub(crate) fn align8(size: i64) -> i64 {
    (size + 7) & !7
}

impl<'a> Generator<'a> {
    pub fn new(ctx: Rc<Context>, unit: &'a TranslationUnit) -> Generator<'a> {
        Generator {
            unit,
            ctx,
            out: String::new(),
            stack_size: 0,
            offsets: FxHashMap::default(),
            float_labels: FxHashMap::default(),
            string_labels: FxHashMap::default(),
            emitted_inits: FxHashSet::default(),
            current_gp: 0,
            current_fp: 0,
        }
    }

    /// Generate the whole unit, returning the assembly text.
    pub fn run(mut self) -> Result<String> {
        for &node in &self.unit.toplevels {
            self.stack_size = 8;
            match self.unit.nodes.kind(node) {
                NodeKind::FuncDef { .. } => self.emit_func_def(node)?,
                NodeKind::Decl { init, .. } => {
                    if init.is_empty() {
                        self.emit_bss(node)?;
                    } else {
                        self.emit_data_decl(node)?;
                    }
                }
                k => {
                    return Err(Fatal::Internal(format!(
                        "invalid toplevel statement: {:?}",
                        k
                    )))
                }
            }
        }
        Ok(self.out)
    }

    // ----------------------------------------------------------------
    // output primitives
    // ----------------------------------------------------------------

    pub(crate) fn emit(&mut self, line: impl AsRef<str>) {
        self.out.push('\t');
        self.out.push_str(line.as_ref());
        self.out.push('\n');
    }

    pub(crate) fn emit_noindent(&mut self, line: impl AsRef<str>) {
        self.out.push_str(line.as_ref());
        self.out.push('\n');
    }

    pub(crate) fn emit_label(&mut self, label: Symbol) {
        self.emit(format!("{}:", label));
    }

    pub(crate) fn push(&mut self, reg: &str) {
        self.emit(format!("push %{}", reg));
        self.stack_size += 8;
    }

    pub(crate) fn pop(&mut self, reg: &str) {
        self.emit(format!("pop %{}", reg));
        self.stack_size -= 8;
        debug_assert!(self.stack_size >= 0);
    }

    pub(crate) fn push_xmm(&mut self, id: usize) {
        self.emit("sub $8, %rsp");
        self.emit(format!("movsd %xmm{}, (%rsp)", id));
        self.stack_size += 8;
    }

    pub(crate) fn pop_xmm(&mut self, id: usize) {
        self.emit(format!("movsd (%rsp), %xmm{}", id));
        self.emit("add $8, %rsp");
        self.stack_size -= 8;
        debug_assert!(self.stack_size >= 0);
    }

    /// Copy the struct whose address is in `%rax` onto the stack as
    /// 8-byte blocks. Returns the (aligned) size pushed.
    pub(crate) fn push_struct(&mut self, size: i64) -> i64 {
        let aligned = align8(size);
        self.emit(format!("sub ${}, %rsp", aligned));
        self.emit("movq %rcx, -8(%rsp)");
        let mut i = 0;
        while i < aligned {
            self.emit(format!("movq {}(%rax), %rcx", i));
            self.emit(format!("movq %rcx, {}(%rsp)", i));
            i += 8;
        }
        self.emit("movq -8(%rsp), %rcx");
        self.stack_size += aligned;
        aligned
    }

    // ----------------------------------------------------------------
    // common queries
    // ----------------------------------------------------------------

    pub(crate) fn node_ty(&self, id: NodeId) -> mcc_sem::TypeId {
        self.unit
            .nodes
            .get(id)
            .ty
            .unwrap_or(mcc_sem::TypeId::INT)
    }

    pub(crate) fn ty(&self, id: mcc_sem::TypeId) -> &mcc_sem::Type {
        self.unit.types.get(id)
    }

    pub(crate) fn local_offset(&self, id: NodeId) -> i64 {
        self.offsets.get(&id).copied().unwrap_or(0)
    }

    /// Size a `++`/`--` steps by: the pointee for pointers, the element
    /// for arrays, 1 otherwise.
    pub(crate) fn step_size(&self, ty: mcc_sem::TypeId) -> i64 {
        match self.ty(ty).kind {
            TypeKind::Ptr { to } => self.ty(to).size,
            TypeKind::Array { elem, .. } => self.ty(elem).size,
            _ => 1,
        }
    }

    pub(crate) fn internal(&self, msg: impl Into<String>) -> Fatal {
        Fatal::Internal(msg.into())
    }
}
