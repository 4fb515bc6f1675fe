//! Constant expression evaluation over the AST.
//!
//! Integer folding supports the address-constant form used by global
//! initializers: a node may evaluate to `label + offset`, reported as an
//! integer plus an optional global label.

use crate::ast::{BinaryOp, NodeArena, NodeId, NodeKind, UnaryOp};
use mcc_sem::{TypeArena, TypeKind};
use mcc_util::{Fatal, Result, Symbol};

/// Result of integer constant evaluation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConstInt {
    pub value: i64,
    /// Present when the value is relative to a global symbol.
    pub label: Option<Symbol>,
}

impl ConstInt {
    fn plain(value: i64) -> ConstInt {
        ConstInt { value, label: None }
    }
}

fn not_const() -> Fatal {
    Fatal::Parse("expression must be an integral constant expression".into())
}

/// Fold an integer constant expression.
pub fn eval_int(nodes: &NodeArena, types: &TypeArena, id: NodeId) -> Result<ConstInt> {
    let node = nodes.get(id);
    match &node.kind {
        NodeKind::IntLit { value } => Ok(ConstInt::plain(*value)),
        NodeKind::FloatLit { value } => Ok(ConstInt::plain(*value as i64)),
        NodeKind::Unary { op, operand } => match op {
            UnaryOp::LogNot => {
                let v = eval_int(nodes, types, *operand)?;
                Ok(ConstInt::plain((v.value == 0) as i64))
            }
            UnaryOp::BitNot => {
                let v = eval_int(nodes, types, *operand)?;
                Ok(ConstInt::plain(!v.value))
            }
            UnaryOp::Cast | UnaryOp::Conv | UnaryOp::Addr | UnaryOp::Deref => {
                eval_int(nodes, types, *operand)
            }
            _ => Err(not_const()),
        },
        NodeKind::Binary { op, lhs, rhs } => {
            let lt = nodes.get(*lhs).ty;
            let rt = nodes.get(*rhs).ty;
            let lhs_ptr = lt.map_or(false, |t| matches!(types.get(t).kind, TypeKind::Ptr { .. }));
            let rhs_ptr = rt.map_or(false, |t| matches!(types.get(t).kind, TypeKind::Ptr { .. }));
            if lhs_ptr && rhs_ptr {
                return Err(not_const());
            }
            // pointer +- integer scales by the pointee size
            let scale = if lhs_ptr {
                let to = types.pointee(lt.unwrap()).unwrap();
                types.get(to).size.max(1)
            } else {
                1
            };
            let l = eval_int(nodes, types, *lhs)?;
            let r = eval_int(nodes, types, *rhs)?;
            let label = l.label.or(r.label);
            let v = |value: i64| Ok(ConstInt { value, label });
            match op {
                BinaryOp::Add => v(l.value.wrapping_add(r.value.wrapping_mul(scale))),
                BinaryOp::Sub => v(l.value.wrapping_sub(r.value.wrapping_mul(scale))),
                BinaryOp::Mul => v(l.value.wrapping_mul(r.value)),
                BinaryOp::Div => {
                    if r.value == 0 {
                        return Err(Fatal::Parse("division by zero in constant expression".into()));
                    }
                    v(l.value.wrapping_div(r.value))
                }
                BinaryOp::Mod => {
                    if r.value == 0 {
                        return Err(Fatal::Parse("division by zero in constant expression".into()));
                    }
                    v(l.value.wrapping_rem(r.value))
                }
                BinaryOp::BitAnd => v(l.value & r.value),
                BinaryOp::BitXor => v(l.value ^ r.value),
                BinaryOp::BitOr => v(l.value | r.value),
                BinaryOp::Lt => v((l.value < r.value) as i64),
                BinaryOp::Le => v((l.value <= r.value) as i64),
                BinaryOp::Eq => v((l.value == r.value) as i64),
                BinaryOp::Ne => v((l.value != r.value) as i64),
                BinaryOp::LogAnd => v((l.value != 0 && r.value != 0) as i64),
                BinaryOp::LogOr => v((l.value != 0 || r.value != 0) as i64),
                BinaryOp::Sal => v(l.value.wrapping_shl(r.value as u32)),
                BinaryOp::Sar => v(l.value.wrapping_shr(r.value as u32)),
                BinaryOp::Shr => v(((l.value as u64).wrapping_shr(r.value as u32)) as i64),
                BinaryOp::Assign | BinaryOp::Comma => Err(not_const()),
            }
        }
        NodeKind::Ternary { cond, then, els } => {
            let c = eval_int(nodes, types, *cond)?;
            if c.value != 0 {
                match then {
                    Some(t) => eval_int(nodes, types, *t),
                    None => Ok(c),
                }
            } else {
                eval_int(nodes, types, *els)
            }
        }
        // address constants for global initializers
        NodeKind::GlobalVar { label, .. } => Ok(ConstInt {
            value: 0,
            label: Some(*label),
        }),
        NodeKind::Member { parent, .. } => {
            let base = eval_int(nodes, types, *parent)?;
            let offset = node.ty.map_or(0, |t| types.get(t).offset);
            Ok(ConstInt {
                value: base.value + offset,
                label: base.label,
            })
        }
        _ => Err(not_const()),
    }
}

/// Fold a floating constant expression.
pub fn eval_float(nodes: &NodeArena, types: &TypeArena, id: NodeId) -> Result<f64> {
    let node = nodes.get(id);
    match &node.kind {
        NodeKind::IntLit { value } => Ok(*value as f64),
        NodeKind::FloatLit { value } => Ok(*value),
        NodeKind::Unary { op, operand } => match op {
            UnaryOp::LogNot => Ok((eval_float(nodes, types, *operand)? == 0.0) as i64 as f64),
            UnaryOp::Cast | UnaryOp::Conv => eval_float(nodes, types, *operand),
            _ => Err(Fatal::Parse(
                "expression must be a floating constant expression".into(),
            )),
        },
        NodeKind::Binary { op, lhs, rhs } => {
            let l = eval_float(nodes, types, *lhs)?;
            let r = eval_float(nodes, types, *rhs)?;
            Ok(match op {
                BinaryOp::Add => l + r,
                BinaryOp::Sub => l - r,
                BinaryOp::Mul => l * r,
                BinaryOp::Div => l / r,
                BinaryOp::Lt => (l < r) as i64 as f64,
                BinaryOp::Le => (l <= r) as i64 as f64,
                BinaryOp::Eq => (l == r) as i64 as f64,
                BinaryOp::Ne => (l != r) as i64 as f64,
                BinaryOp::LogAnd => (l != 0.0 && r != 0.0) as i64 as f64,
                BinaryOp::LogOr => (l != 0.0 || r != 0.0) as i64 as f64,
                _ => {
                    return Err(Fatal::Parse(
                        "expression must be a floating constant expression".into(),
                    ))
                }
            })
        }
        NodeKind::Ternary { cond, then, els } => {
            let c = eval_int(nodes, types, *cond)?;
            if c.value != 0 {
                match then {
                    Some(t) => eval_float(nodes, types, *t),
                    None => Ok(c.value as f64),
                }
            } else {
                eval_float(nodes, types, *els)
            }
        }
        _ => Err(Fatal::Parse(
            "expression must be a floating constant expression".into(),
        )),
    }
}
