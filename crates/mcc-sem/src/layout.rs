//! Struct and union layout.
//!
//! Applied once a member list has been parsed. Unnamed struct/union
//! members are flattened into the parent at the running offset (C11
//! 6.7.2.1p13); bit-fields pack into storage units with a `(offset,
//! bitoff)` cursor; a zero-width bit-field flushes the current unit.

use crate::types::{Field, TypeArena, TypeId, TypeKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("flexible array member not at end of struct")]
    FlexibleArrayNotAtEnd,
    #[error("flexible array member with no other fields")]
    FlexibleArrayAlone,
}

/// Fix up a flexible array member: the last member may have incomplete
/// array type, which becomes a zero-length array.
pub fn check_flexible_array(
    arena: &mut TypeArena,
    fields: &[(Option<mcc_util::Symbol>, TypeId)],
) -> Result<(), LayoutError> {
    for (i, &(_, ty)) in fields.iter().enumerate() {
        let is_incomplete_array = matches!(arena.get(ty).kind, TypeKind::Array { len: -1, .. });
        if !is_incomplete_array {
            continue;
        }
        if i != fields.len() - 1 {
            return Err(LayoutError::FlexibleArrayNotAtEnd);
        }
        if fields.len() <= 1 {
            return Err(LayoutError::FlexibleArrayAlone);
        }
        let t = arena.get_mut(ty);
        if let TypeKind::Array { len, .. } = &mut t.kind {
            *len = 0;
        }
        t.size = 0;
    }
    Ok(())
}

fn padding(offset: i64, align: i64) -> i64 {
    if align <= 0 || offset % align == 0 {
        0
    } else {
        align - offset % align
    }
}

/// Close the current bit-field storage unit.
fn finish_bitfield(offset: &mut i64, bitoff: &mut i32) {
    *offset += ((*bitoff + 7) / 8) as i64;
    *bitoff = 0;
}

/// Re-parent an unnamed member record's fields at `base` within the
/// enclosing record.
fn flatten_unnamed(
    arena: &mut TypeArena,
    out: &mut Vec<Field>,
    record: TypeId,
    base: i64,
) {
    let inner = match &arena.get(record).kind {
        TypeKind::Record { fields, .. } => fields.clone(),
        _ => return,
    };
    for f in inner {
        let copied = arena.copy_type(f.ty);
        arena.get_mut(copied).offset += base;
        out.push(Field {
            name: f.name,
            ty: copied,
        });
    }
}

/// Lay out struct members. Returns `(size, align, placed_fields)`.
pub fn layout_struct(
    arena: &mut TypeArena,
    fields: Vec<(Option<mcc_util::Symbol>, TypeId)>,
) -> (i64, i64, Vec<Field>) {
    let mut offset: i64 = 0;
    let mut bitoff: i32 = 0;
    let mut align: i64 = 1;
    let mut placed = Vec::new();

    for (name, ty) in fields {
        let (f_align, f_size, f_bitsize, is_record) = {
            let t = arena.get(ty);
            (
                t.align,
                t.size,
                t.bitsize,
                matches!(t.kind, TypeKind::Record { .. }),
            )
        };

        if name.is_some() {
            align = align.max(f_align);
        }

        // anonymous struct/union member: flatten at the running offset
        if name.is_none() && is_record {
            align = align.max(f_align);
            finish_bitfield(&mut offset, &mut bitoff);
            offset += padding(offset, f_align);
            flatten_unnamed(arena, &mut placed, ty, offset);
            offset += f_size;
            continue;
        }

        // C11 6.7.2.1p12: a zero-width bit-field closes the unit
        if f_bitsize == 0 {
            finish_bitfield(&mut offset, &mut bitoff);
            offset += padding(offset, f_align);
            continue;
        }

        if name.is_none() {
            continue;
        }

        if f_bitsize > 0 {
            let unit_bits = (f_size * 8) as i32;
            let room = unit_bits - bitoff;
            if f_bitsize <= room {
                let t = arena.get_mut(ty);
                t.offset = offset;
                t.bitoff = bitoff;
            } else {
                finish_bitfield(&mut offset, &mut bitoff);
                offset += padding(offset, f_align);
                let t = arena.get_mut(ty);
                t.offset = offset;
                t.bitoff = 0;
            }
            bitoff += f_bitsize;
        } else {
            finish_bitfield(&mut offset, &mut bitoff);
            offset += padding(offset, f_align);
            arena.get_mut(ty).offset = offset;
            offset += f_size;
        }
        placed.push(Field { name, ty });
    }

    finish_bitfield(&mut offset, &mut bitoff);
    let size = offset + padding(offset, align);
    (size, align, placed)
}

/// Lay out union members: max size over members, everything at offset 0.
pub fn layout_union(
    arena: &mut TypeArena,
    fields: Vec<(Option<mcc_util::Symbol>, TypeId)>,
) -> (i64, i64, Vec<Field>) {
    let mut align: i64 = 1;
    let mut maxsize: i64 = 0;
    let mut placed = Vec::new();

    for (name, ty) in fields {
        let (f_align, f_size, f_bitsize, is_record) = {
            let t = arena.get(ty);
            (
                t.align,
                t.size,
                t.bitsize,
                matches!(t.kind, TypeKind::Record { .. }),
            )
        };

        if name.is_none() && is_record {
            align = align.max(f_align);
            maxsize = maxsize.max(f_size);
            flatten_unnamed(arena, &mut placed, ty, 0);
            continue;
        }
        if name.is_none() {
            continue;
        }

        align = align.max(f_align);
        maxsize = maxsize.max(f_size);

        let t = arena.get_mut(ty);
        t.offset = 0;
        if f_bitsize >= 0 {
            t.bitoff = 0;
        }
        placed.push(Field { name, ty });
    }

    let size = maxsize + padding(maxsize, align);
    (size, align, placed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcc_util::Symbol;

    fn field(arena: &mut TypeArena, name: &str, base: TypeId) -> (Option<Symbol>, TypeId) {
        let ty = arena.copy_type(base);
        (Some(Symbol::intern(name)), ty)
    }

    fn bitfield(
        arena: &mut TypeArena,
        name: Option<&str>,
        base: TypeId,
        width: i32,
    ) -> (Option<Symbol>, TypeId) {
        let ty = arena.copy_type(base);
        arena.get_mut(ty).bitsize = width;
        (name.map(Symbol::intern), ty)
    }

    #[test]
    fn test_char_int_long_is_16() {
        let mut a = TypeArena::new();
        let fields = vec![
            field(&mut a, "a", TypeId::CHAR),
            field(&mut a, "b", TypeId::INT),
            field(&mut a, "c", TypeId::LONG),
        ];
        let (size, align, placed) = layout_struct(&mut a, fields);
        assert_eq!(size, 16);
        assert_eq!(align, 8);
        assert_eq!(a.get(placed[0].ty).offset, 0);
        assert_eq!(a.get(placed[1].ty).offset, 4);
        assert_eq!(a.get(placed[2].ty).offset, 8);
    }

    #[test]
    fn test_tail_padding_uses_field_alignment() {
        // {long; char; char} packs the chars right after the long
        let mut a = TypeArena::new();
        let fields = vec![
            field(&mut a, "a", TypeId::LONG),
            field(&mut a, "b", TypeId::CHAR),
            field(&mut a, "c", TypeId::CHAR),
        ];
        let (size, _, placed) = layout_struct(&mut a, fields);
        assert_eq!(a.get(placed[1].ty).offset, 8);
        assert_eq!(a.get(placed[2].ty).offset, 9);
        assert_eq!(size, 16);
    }

    #[test]
    fn test_bitfields_pack_into_one_int() {
        let mut a = TypeArena::new();
        let fields = vec![
            bitfield(&mut a, Some("a"), TypeId::INT, 1),
            bitfield(&mut a, Some("b"), TypeId::INT, 2),
        ];
        let (size, _, placed) = layout_struct(&mut a, fields);
        assert_eq!(size, 4);
        assert_eq!(a.get(placed[0].ty).bitoff, 0);
        assert_eq!(a.get(placed[1].ty).bitoff, 1);
    }

    #[test]
    fn test_bitfield_overflow_starts_new_unit() {
        let mut a = TypeArena::new();
        let fields = vec![
            bitfield(&mut a, Some("a"), TypeId::INT, 30),
            bitfield(&mut a, Some("b"), TypeId::INT, 10),
        ];
        let (size, _, placed) = layout_struct(&mut a, fields);
        assert_eq!(a.get(placed[0].ty).offset, 0);
        assert_eq!(a.get(placed[1].ty).offset, 4);
        assert_eq!(a.get(placed[1].ty).bitoff, 0);
        assert_eq!(size, 8);
    }

    #[test]
    fn test_zero_width_bitfield_flushes() {
        let mut a = TypeArena::new();
        let fields = vec![
            bitfield(&mut a, Some("a"), TypeId::INT, 3),
            bitfield(&mut a, None, TypeId::INT, 0),
            bitfield(&mut a, Some("b"), TypeId::INT, 3),
        ];
        let (size, _, placed) = layout_struct(&mut a, fields);
        assert_eq!(a.get(placed[1].ty).offset, 4);
        assert_eq!(a.get(placed[1].ty).bitoff, 0);
        assert_eq!(size, 8);
    }

    #[test]
    fn test_anonymous_struct_flattens() {
        // {int a; struct {int b; long c;};} -> 24 bytes, b at 8, c at 16
        let mut a = TypeArena::new();
        let inner_fields = vec![
            field(&mut a, "b", TypeId::INT),
            field(&mut a, "c", TypeId::LONG),
        ];
        let (isize_, ialign, iplaced) = layout_struct(&mut a, inner_fields);
        let inner = a.record(None, false);
        {
            let t = a.get_mut(inner);
            t.size = isize_;
            t.align = ialign;
            if let TypeKind::Record { fields, .. } = &mut t.kind {
                *fields = iplaced;
            }
        }
        let outer_fields = vec![field(&mut a, "a", TypeId::INT), (None, inner)];
        let (size, align, placed) = layout_struct(&mut a, outer_fields);
        assert_eq!(size, 24);
        assert_eq!(align, 8);
        let b = placed.iter().find(|f| f.name.unwrap().as_str() == "b").unwrap();
        let c = placed.iter().find(|f| f.name.unwrap().as_str() == "c").unwrap();
        assert_eq!(a.get(b.ty).offset, 8);
        assert_eq!(a.get(c.ty).offset, 16);
    }

    #[test]
    fn test_union_layout() {
        let mut a = TypeArena::new();
        let arr = a.array_of(TypeId::CHAR, 13);
        let fields = vec![
            field(&mut a, "i", TypeId::INT),
            (Some(Symbol::intern("s")), arr),
        ];
        let (size, align, _) = layout_union(&mut a, fields);
        assert_eq!(align, 4);
        assert_eq!(size, 16); // 13 padded to 4
    }

    #[test]
    fn test_flexible_array_member() {
        let mut a = TypeArena::new();
        let flex = a.array_of(TypeId::INT, -1);
        let fields = vec![
            field(&mut a, "n", TypeId::INT),
            (Some(Symbol::intern("data")), flex),
        ];
        check_flexible_array(&mut a, &fields).unwrap();
        assert_eq!(a.get(flex).size, 0);
        let (size, _, _) = layout_struct(&mut a, fields);
        assert_eq!(size, 4);
    }

    #[test]
    fn test_flexible_array_not_at_end() {
        let mut a = TypeArena::new();
        let flex = a.array_of(TypeId::INT, -1);
        let fields = vec![
            (Some(Symbol::intern("data")), flex),
            field(&mut a, "n", TypeId::INT),
        ];
        assert!(matches!(
            check_flexible_array(&mut a, &fields),
            Err(LayoutError::FlexibleArrayNotAtEnd)
        ));
    }
}
