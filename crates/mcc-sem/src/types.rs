//! Type representation.

use mcc_util::{Idx, IndexVec, Symbol};

/// Arena index of a type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypeId(pub u32);

impl Idx for TypeId {
    fn from_usize(idx: usize) -> Self {
        TypeId(idx as u32)
    }
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl TypeId {
    // Builtins are seeded at fixed indices; see `TypeArena::new`.
    pub const VOID: TypeId = TypeId(0);
    pub const BOOL: TypeId = TypeId(1);
    pub const CHAR: TypeId = TypeId(2);
    pub const SHORT: TypeId = TypeId(3);
    pub const INT: TypeId = TypeId(4);
    pub const LONG: TypeId = TypeId(5);
    pub const LLONG: TypeId = TypeId(6);
    pub const UCHAR: TypeId = TypeId(7);
    pub const USHORT: TypeId = TypeId(8);
    pub const UINT: TypeId = TypeId(9);
    pub const ULONG: TypeId = TypeId(10);
    pub const ULLONG: TypeId = TypeId(11);
    pub const FLOAT: TypeId = TypeId(12);
    pub const DOUBLE: TypeId = TypeId(13);
    pub const LDOUBLE: TypeId = TypeId(14);
    pub const ENUM: TypeId = TypeId(15);
}

/// Storage-class specifier attached to a declared type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Storage {
    Typedef,
    Extern,
    Static,
    ThreadLocal,
    Auto,
    Register,
}

/// Type qualifiers. No semantic effect on code generation; recorded for
/// declaration fidelity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Qualifiers {
    pub is_const: bool,
    pub is_restrict: bool,
    pub is_volatile: bool,
    pub is_atomic: bool,
}

impl Qualifiers {
    pub fn any(&self) -> bool {
        self.is_const || self.is_restrict || self.is_volatile || self.is_atomic
    }
}

/// A struct/union member. Offsets and bit-field placement live on the
/// field's own (copied) type.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub name: Option<Symbol>,
    pub ty: TypeId,
}

/// The tagged type kind. The primitive variants are ordered by conversion
/// rank; `usual_arith_convert` relies on it.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeKind {
    Void,
    Bool,
    Char,
    Short,
    Int,
    Long,
    LongLong,
    Float,
    Double,
    LongDouble,
    Enum,
    Ptr {
        to: TypeId,
    },
    /// `len == -1` denotes an incomplete array.
    Array {
        elem: TypeId,
        len: i64,
    },
    Record {
        tag: Option<Symbol>,
        is_union: bool,
        fields: Vec<Field>,
    },
    Func {
        ret: TypeId,
        params: Vec<TypeId>,
        variadic: bool,
        old_style: bool,
    },
    /// Placeholder inside a parenthesized declarator, filled in once the
    /// surrounding declarator suffix is known.
    Hole,
}

/// A type with its layout and declaration attributes.
#[derive(Clone, Debug)]
pub struct Type {
    pub kind: TypeKind,
    /// Size in bytes; -1 while incomplete.
    pub size: i64,
    pub align: i64,
    pub is_unsigned: bool,
    /// Byte offset within the enclosing record (field types only).
    pub offset: i64,
    /// Bit offset within the storage unit (bit-fields only).
    pub bitoff: i32,
    /// Bit-field width; -1 when the field is not a bit-field.
    pub bitsize: i32,
    pub storage: Option<Storage>,
    pub qualifiers: Qualifiers,
    pub is_inline: bool,
    pub is_noreturn: bool,
    /// True for copies; builtin singletons are never mutated.
    pub from_copy: bool,
}

impl Type {
    fn new(kind: TypeKind, size: i64, align: i64, is_unsigned: bool) -> Type {
        Type {
            kind,
            size,
            align,
            is_unsigned,
            offset: 0,
            bitoff: 0,
            bitsize: -1,
            storage: None,
            qualifiers: Qualifiers::default(),
            is_inline: false,
            is_noreturn: false,
            from_copy: false,
        }
    }

    fn rank(&self) -> u8 {
        match self.kind {
            TypeKind::Void => 0,
            TypeKind::Bool => 1,
            TypeKind::Char => 2,
            TypeKind::Short => 3,
            TypeKind::Int => 4,
            TypeKind::Long => 5,
            TypeKind::LongLong => 6,
            TypeKind::Float => 7,
            TypeKind::Double => 8,
            TypeKind::LongDouble => 9,
            TypeKind::Enum => 10,
            TypeKind::Ptr { .. } => 11,
            TypeKind::Array { .. } => 12,
            TypeKind::Record { .. } => 13,
            TypeKind::Func { .. } => 14,
            TypeKind::Hole => 15,
        }
    }

    /// C11 integer types: _Bool through long long.
    pub fn is_int_type(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Bool
                | TypeKind::Char
                | TypeKind::Short
                | TypeKind::Int
                | TypeKind::Long
                | TypeKind::LongLong
        )
    }

    pub fn is_float_type(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Float | TypeKind::Double | TypeKind::LongDouble
        )
    }

    /// C11 6.2.5p18: integer and floating types together.
    pub fn is_arith_type(&self) -> bool {
        self.is_int_type() || self.is_float_type()
    }

    /// C11 6.2.5p21: arithmetic and pointer types together.
    pub fn is_scalar_type(&self) -> bool {
        self.is_arith_type() || matches!(self.kind, TypeKind::Ptr { .. })
    }

    pub fn is_static(&self) -> bool {
        self.storage == Some(Storage::Static)
    }

    /// Same kind of type (int vs int), ignoring what the variants carry.
    pub fn same_kind(&self, other: &Type) -> bool {
        std::mem::discriminant(&self.kind) == std::mem::discriminant(&other.kind)
    }
}

/// Owner of all types of a translation unit.
pub struct TypeArena {
    types: IndexVec<TypeId, Type>,
}

impl TypeArena {
    pub fn new() -> TypeArena {
        let mut types = IndexVec::with_capacity(64);
        let mut num = |kind: TypeKind, size: i64, unsigned: bool| {
            types.push(Type::new(kind, size, size.max(0), unsigned));
        };
        num(TypeKind::Void, 0, false);
        num(TypeKind::Bool, 1, true);
        num(TypeKind::Char, 1, false);
        num(TypeKind::Short, 2, false);
        num(TypeKind::Int, 4, false);
        num(TypeKind::Long, 8, false);
        num(TypeKind::LongLong, 8, false);
        num(TypeKind::Char, 1, true);
        num(TypeKind::Short, 2, true);
        num(TypeKind::Int, 4, true);
        num(TypeKind::Long, 8, true);
        num(TypeKind::LongLong, 8, true);
        num(TypeKind::Float, 4, false);
        num(TypeKind::Double, 8, false);
        num(TypeKind::LongDouble, 8, false);
        num(TypeKind::Enum, 4, false);
        TypeArena { types }
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id]
    }

    pub fn get_mut(&mut self, id: TypeId) -> &mut Type {
        &mut self.types[id]
    }

    fn push(&mut self, ty: Type) -> TypeId {
        self.types.push(ty)
    }

    /// A mutable copy of an existing type.
    pub fn copy_type(&mut self, id: TypeId) -> TypeId {
        let mut ty = self.types[id].clone();
        ty.from_copy = true;
        self.push(ty)
    }

    /// An incomplete array type must not share storage across declarators
    /// (its length is patched by the initializer), so hand out a copy.
    pub fn copy_incomplete_type(&mut self, id: TypeId) -> TypeId {
        if let TypeKind::Array { len: -1, .. } = self.get(id).kind {
            return self.copy_type(id);
        }
        id
    }

    pub fn ptr_to(&mut self, to: TypeId) -> TypeId {
        let mut ty = Type::new(TypeKind::Ptr { to }, 8, 8, false);
        ty.from_copy = true;
        self.push(ty)
    }

    pub fn array_of(&mut self, elem: TypeId, len: i64) -> TypeId {
        let esize = self.get(elem).size;
        let ealign = self.get(elem).align;
        let size = if len < 0 { -1 } else { esize * len };
        let mut ty = Type::new(TypeKind::Array { elem, len }, size, ealign, false);
        ty.from_copy = true;
        self.push(ty)
    }

    /// A fresh (incomplete) struct or union type.
    pub fn record(&mut self, tag: Option<Symbol>, is_union: bool) -> TypeId {
        let mut ty = Type::new(
            TypeKind::Record {
                tag,
                is_union,
                fields: Vec::new(),
            },
            -1,
            1,
            false,
        );
        ty.from_copy = true;
        self.push(ty)
    }

    pub fn func(
        &mut self,
        ret: TypeId,
        params: Vec<TypeId>,
        variadic: bool,
        old_style: bool,
    ) -> TypeId {
        let mut ty = Type::new(
            TypeKind::Func {
                ret,
                params,
                variadic,
                old_style,
            },
            1,
            1,
            false,
        );
        ty.from_copy = true;
        self.push(ty)
    }

    /// Declarator placeholder.
    pub fn hole(&mut self) -> TypeId {
        let mut ty = Type::new(TypeKind::Hole, 0, 0, false);
        ty.from_copy = true;
        self.push(ty)
    }

    /// Is this `char[...]` (a string-initializable array)?
    pub fn is_string_type(&self, id: TypeId) -> bool {
        match self.get(id).kind {
            TypeKind::Array { elem, .. } => matches!(self.get(elem).kind, TypeKind::Char),
            _ => false,
        }
    }

    /// The pointee of a pointer type.
    pub fn pointee(&self, id: TypeId) -> Option<TypeId> {
        match self.get(id).kind {
            TypeKind::Ptr { to } => Some(to),
            _ => None,
        }
    }

    /// The element type of an array.
    pub fn elem_type(&self, id: TypeId) -> Option<TypeId> {
        match self.get(id).kind {
            TypeKind::Array { elem, .. } => Some(elem),
            _ => None,
        }
    }

    // ----------------------------------------------------------------
    // compatibility (C11 6.2.7)
    // ----------------------------------------------------------------

    pub fn compatible(&self, a: TypeId, b: TypeId) -> bool {
        let ta = self.get(a);
        let tb = self.get(b);
        match (&ta.kind, &tb.kind) {
            (TypeKind::Ptr { to: pa }, TypeKind::Ptr { to: pb }) => self.compatible(*pa, *pb),
            (
                TypeKind::Array { elem: ea, len: la },
                TypeKind::Array { elem: eb, len: lb },
            ) => la == lb && self.compatible(*ea, *eb),
            (
                TypeKind::Record {
                    is_union: ua,
                    fields: fa,
                    ..
                },
                TypeKind::Record {
                    is_union: ub,
                    fields: fb,
                    ..
                },
            ) => {
                if ua != ub || fa.len() != fb.len() {
                    return false;
                }
                // any two pointers count as compatible here, which cuts
                // the cycle a self-referential struct would otherwise
                // cause
                fa.iter().zip(fb.iter()).all(|(x, y)| {
                    let tx = self.get(x.ty);
                    let ty = self.get(y.ty);
                    if matches!(tx.kind, TypeKind::Ptr { .. })
                        && matches!(ty.kind, TypeKind::Ptr { .. })
                    {
                        return true;
                    }
                    self.compatible(x.ty, y.ty)
                })
            }
            (
                TypeKind::Func {
                    ret: ra,
                    params: pa,
                    ..
                },
                TypeKind::Func {
                    ret: rb,
                    params: pb,
                    ..
                },
            ) => {
                self.compatible(*ra, *rb)
                    && pa.len() == pb.len()
                    && pa.iter().zip(pb.iter()).all(|(x, y)| self.compatible(*x, *y))
            }
            _ => ta.rank() == tb.rank() && ta.is_unsigned == tb.is_unsigned,
        }
    }

    // ----------------------------------------------------------------
    // usual arithmetic conversions (C11 6.3.1.8)
    // ----------------------------------------------------------------

    pub fn usual_arith_convert(&self, a: TypeId, b: TypeId) -> TypeId {
        debug_assert!(self.get(a).is_arith_type() && self.get(b).is_arith_type());
        // make `hi` the operand of greater conversion rank
        let (hi, lo) = if self.get(a).rank() < self.get(b).rank() {
            (b, a)
        } else {
            (a, b)
        };
        let thi = self.get(hi);
        let tlo = self.get(lo);
        if thi.is_float_type() {
            return hi;
        }
        if thi.size > tlo.size {
            return hi;
        }
        if thi.is_unsigned {
            return hi;
        }
        if tlo.is_unsigned {
            return lo;
        }
        hi
    }

    // ----------------------------------------------------------------
    // display
    // ----------------------------------------------------------------

    /// Human-readable type spelling for diagnostics.
    pub fn to_string(&self, id: TypeId) -> String {
        let ty = self.get(id);
        let decorate = |name: &str| {
            if ty.is_unsigned {
                format!("unsigned {}", name)
            } else {
                name.to_string()
            }
        };
        match &ty.kind {
            TypeKind::Void => "void".into(),
            TypeKind::Bool => "_Bool".into(),
            TypeKind::Char => decorate("char"),
            TypeKind::Short => decorate("short"),
            TypeKind::Int => decorate("int"),
            TypeKind::Long => decorate("long"),
            TypeKind::LongLong => decorate("long long"),
            TypeKind::Float => "float".into(),
            TypeKind::Double => "double".into(),
            TypeKind::LongDouble => "long double".into(),
            TypeKind::Enum => "enum".into(),
            TypeKind::Ptr { to } => format!("{}*", self.to_string(*to)),
            TypeKind::Array { elem, len } => format!("{}[{}]", self.to_string(*elem), len),
            TypeKind::Record { tag, is_union, .. } => format!(
                "{} {}",
                if *is_union { "union" } else { "struct" },
                tag.map(|s| s.as_str()).unwrap_or("(anonymous)")
            ),
            TypeKind::Func {
                ret,
                params,
                variadic,
                ..
            } => {
                let mut s = self.to_string(*ret);
                s.push('(');
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        s.push(',');
                    }
                    s.push_str(&self.to_string(*p));
                }
                if *variadic {
                    s.push_str(",...");
                }
                s.push(')');
                s
            }
            TypeKind::Hole => "<null>".into(),
        }
    }
}

impl Default for TypeArena {
    fn default() -> TypeArena {
        TypeArena::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_sizes_lp64() {
        let a = TypeArena::new();
        for (id, size) in [
            (TypeId::VOID, 0),
            (TypeId::BOOL, 1),
            (TypeId::CHAR, 1),
            (TypeId::SHORT, 2),
            (TypeId::INT, 4),
            (TypeId::LONG, 8),
            (TypeId::LLONG, 8),
            (TypeId::FLOAT, 4),
            (TypeId::DOUBLE, 8),
            (TypeId::LDOUBLE, 8),
            (TypeId::ENUM, 4),
        ] {
            assert_eq!(a.get(id).size, size, "{:?}", id);
        }
        assert!(a.get(TypeId::BOOL).is_unsigned);
        assert!(!a.get(TypeId::CHAR).is_unsigned);
        assert!(a.get(TypeId::UINT).is_unsigned);
    }

    #[test]
    fn test_ptr_and_array() {
        let mut a = TypeArena::new();
        let p = a.ptr_to(TypeId::INT);
        assert_eq!(a.get(p).size, 8);
        let arr = a.array_of(TypeId::INT, 3);
        assert_eq!(a.get(arr).size, 12);
        assert_eq!(a.get(arr).align, 4);
        let inc = a.array_of(TypeId::INT, -1);
        assert_eq!(a.get(inc).size, -1);
    }

    #[test]
    fn test_compatible_primitives() {
        let a = TypeArena::new();
        assert!(a.compatible(TypeId::INT, TypeId::INT));
        assert!(!a.compatible(TypeId::INT, TypeId::UINT));
        assert!(!a.compatible(TypeId::INT, TypeId::LONG));
    }

    #[test]
    fn test_compatible_self_referential_struct() {
        let mut a = TypeArena::new();
        let s1 = a.record(Some(Symbol::intern("n")), false);
        let p1 = a.ptr_to(s1);
        if let TypeKind::Record { fields, .. } = &mut a.get_mut(s1).kind {
            fields.push(Field {
                name: Some(Symbol::intern("next")),
                ty: p1,
            });
        }
        let s2 = a.record(Some(Symbol::intern("n")), false);
        let p2 = a.ptr_to(s2);
        if let TypeKind::Record { fields, .. } = &mut a.get_mut(s2).kind {
            fields.push(Field {
                name: Some(Symbol::intern("next")),
                ty: p2,
            });
        }
        assert!(a.compatible(s1, s2));
    }

    #[test]
    fn test_usual_arith_conversions() {
        let a = TypeArena::new();
        assert_eq!(
            a.usual_arith_convert(TypeId::INT, TypeId::DOUBLE),
            TypeId::DOUBLE
        );
        assert_eq!(
            a.usual_arith_convert(TypeId::INT, TypeId::LONG),
            TypeId::LONG
        );
        assert_eq!(
            a.usual_arith_convert(TypeId::UINT, TypeId::INT),
            TypeId::UINT
        );
        assert_eq!(
            a.usual_arith_convert(TypeId::UINT, TypeId::LONG),
            TypeId::LONG
        );
        assert_eq!(
            a.usual_arith_convert(TypeId::FLOAT, TypeId::LLONG),
            TypeId::FLOAT
        );
    }

    #[test]
    fn test_to_string() {
        let mut a = TypeArena::new();
        let p = a.ptr_to(TypeId::CHAR);
        assert_eq!(a.to_string(p), "char*");
        let arr = a.array_of(TypeId::INT, 4);
        assert_eq!(a.to_string(arr), "int[4]");
        assert_eq!(a.to_string(TypeId::UINT), "unsigned int");
        let f = a.func(TypeId::INT, vec![TypeId::CHAR], true, false);
        assert_eq!(a.to_string(f), "int(char,...)");
    }

    #[test]
    fn test_copy_incomplete_type() {
        let mut a = TypeArena::new();
        let inc = a.array_of(TypeId::INT, -1);
        // incomplete arrays are copied so declarators do not share them
        assert_ne!(a.copy_incomplete_type(inc), inc);
        // complete types pass through untouched
        assert_eq!(a.copy_incomplete_type(TypeId::INT), TypeId::INT);
        let arr = a.array_of(TypeId::INT, 3);
        assert_eq!(a.copy_incomplete_type(arr), arr);
    }
}
