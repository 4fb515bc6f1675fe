//! Typed AST nodes.
//!
//! Nodes live in a [`NodeArena`] and refer to each other by [`NodeId`].
//! Sharing is deliberate: every use of a local variable refers to the same
//! node, so a frame offset assigned once at function entry is seen by all
//! uses. Each node carries the token it started at (for diagnostics) and
//! its type; statements have no type.

use mcc_lex::Token;
use mcc_sem::TypeId;
use mcc_util::{Idx, IndexVec, Symbol};

/// Arena index of an AST node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

impl Idx for NodeId {
    fn from_usize(idx: usize) -> Self {
        NodeId(idx as u32)
    }
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl NodeId {
    /// The error sentinel, seeded at index 0.
    pub const ERROR: NodeId = NodeId(0);
}

/// Unary operators (including the conversions the parser inserts).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    /// Explicit cast.
    Cast,
    /// Implicit conversion inserted by the parser.
    Conv,
    /// `*p`
    Deref,
    /// `&x`
    Addr,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
    /// `!x`
    LogNot,
    /// `~x`
    BitNot,
    /// `goto *p`
    ComputedGoto,
}

/// Binary operators. Relational operators are canonicalized: `a > b`
/// parses as `b < a`, `a >= b` as `b <= a`. Shifts split into arithmetic
/// left, arithmetic right and logical right.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Sal,
    Sar,
    Shr,
    Lt,
    Le,
    Eq,
    Ne,
    LogAnd,
    LogOr,
    Assign,
    Comma,
}

/// The node payload.
#[derive(Clone, Debug)]
pub enum NodeKind {
    /// Parse-error sentinel.
    Error,

    // expressions
    IntLit {
        value: i64,
    },
    FloatLit {
        value: f64,
    },
    /// String literal, re-encoded per its prefix. `data` holds the code
    /// units without the terminator; `elem_size` is 1, 2 or 4.
    StrLit {
        data: Vec<u8>,
        elem_size: i32,
    },
    /// Local variable (including compiler temporaries). `init` is only
    /// used by compound literals, whose initializer runs at first use.
    LocalVar {
        name: Option<Symbol>,
        init: Vec<NodeId>,
    },
    /// Global or static-local variable; `label` is the assembler name.
    GlobalVar {
        name: Symbol,
        label: Symbol,
    },
    /// A function name in expression position.
    FuncDesg {
        name: Symbol,
    },
    /// A typedef in scope; also used as the marker for a parenthesized
    /// type name during cast/sizeof disambiguation.
    TypedefName {
        name: Option<Symbol>,
    },
    Unary {
        op: UnaryOp,
        operand: NodeId,
    },
    Binary {
        op: BinaryOp,
        lhs: NodeId,
        rhs: NodeId,
    },
    /// `cond ? then : els`; `then` is `None` for the GNU `a ?: b` form.
    Ternary {
        cond: NodeId,
        then: Option<NodeId>,
        els: NodeId,
    },
    /// Call through a name or a function pointer.
    FuncCall {
        name: Option<Symbol>,
        func_ty: TypeId,
        func_ptr: Option<NodeId>,
        args: Vec<NodeId>,
    },
    /// `s.f` / `p->f` (the arrow form derefs first). The node's type is
    /// the laid-out field type carrying offset and bit-field placement.
    Member {
        parent: NodeId,
        name: Symbol,
    },
    /// `&&label`; the assembler label is patched at function close.
    LabelAddr {
        origin: Symbol,
        label: Option<Symbol>,
    },
    /// One element of an elaborated initializer: store `value` at byte
    /// `offset` of the object; the node type is the element's field type.
    Init {
        value: NodeId,
        offset: i64,
    },

    // statements
    Decl {
        var: NodeId,
        init: Vec<NodeId>,
    },
    CompoundStmt {
        stmts: Vec<NodeId>,
    },
    If {
        cond: NodeId,
        then: Option<NodeId>,
        els: Option<NodeId>,
    },
    Label {
        label: Symbol,
    },
    /// `goto`/`break`/`continue`; `label` is filled in when the target is
    /// known (break/continue immediately, goto at function close).
    Jump {
        origin: Symbol,
        label: Option<Symbol>,
    },
    Return {
        value: Option<NodeId>,
    },
    FuncDef {
        name: Symbol,
        params: Vec<NodeId>,
        body: Option<NodeId>,
        locals: Vec<NodeId>,
    },
}

/// An AST node: kind, first token, associated type.
#[derive(Clone, Debug)]
pub struct Node {
    pub kind: NodeKind,
    pub tok: Option<Token>,
    pub ty: Option<TypeId>,
}

/// Owner of all nodes of a translation unit.
pub struct NodeArena {
    nodes: IndexVec<NodeId, Node>,
}

impl NodeArena {
    pub fn new() -> NodeArena {
        let mut nodes = IndexVec::with_capacity(256);
        nodes.push(Node {
            kind: NodeKind::Error,
            tok: None,
            ty: None,
        });
        NodeArena { nodes }
    }

    pub fn push(&mut self, kind: NodeKind, tok: Option<Token>, ty: Option<TypeId>) -> NodeId {
        self.nodes.push(Node { kind, tok, ty })
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id].kind
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over `(id, node)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter_enumerated()
    }

    pub fn is_error(&self, id: NodeId) -> bool {
        matches!(self.nodes[id].kind, NodeKind::Error)
    }

    /// An expression designating an object: something assignable and
    /// addressable.
    pub fn is_lvalue(&self, id: NodeId) -> bool {
        matches!(
            self.nodes[id].kind,
            NodeKind::LocalVar { .. }
                | NodeKind::GlobalVar { .. }
                | NodeKind::Member { .. }
                | NodeKind::Unary {
                    op: UnaryOp::Deref,
                    ..
                }
        )
    }
}

impl Default for NodeArena {
    fn default() -> NodeArena {
        NodeArena::new()
    }
}

/// Everything the parser hands to the code generator.
pub struct TranslationUnit {
    pub types: mcc_sem::TypeArena,
    pub nodes: NodeArena,
    pub toplevels: Vec<NodeId>,
}
