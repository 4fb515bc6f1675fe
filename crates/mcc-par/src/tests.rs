//! Parser-level tests: whole translation units through lexer,
//! preprocessor and parser, then assertions on the typed AST.

use crate::ast::{NodeKind, TranslationUnit, UnaryOp};
use crate::Parser;
use mcc_lex::Lexer;
use mcc_pp::Preprocessor;
use mcc_util::Context;
use std::rc::Rc;

fn parse(src: &str) -> (TranslationUnit, Rc<Context>) {
    let ctx = Rc::new(Context::new());
    let lexer = Lexer::from_string(ctx.clone(), src);
    let pp = Preprocessor::new(ctx.clone(), lexer);
    let parser = Parser::new(pp);
    let unit = parser.parse().expect("parse failed");
    (unit, ctx)
}

fn parse_ok(src: &str) -> TranslationUnit {
    let (unit, ctx) = parse(src);
    assert!(!ctx.diag.has_errors(), "unexpected parse errors");
    unit
}

#[test]
fn test_static_assert_constant_folding() {
    parse_ok("_Static_assert(3*4+5 == 17, \"arith\");");
    parse_ok("_Static_assert(1<<5 == 32, \"shift\");");
    parse_ok("_Static_assert((int)3.9 == 3, \"cast\");");
    parse_ok("_Static_assert(1 ? 2 : 3, \"ternary\");");
    parse_ok("_Static_assert(-1 < 0, \"unary\");");
}

#[test]
fn test_static_assert_failure_reports() {
    let (_, ctx) = parse("_Static_assert(0, \"no\");");
    assert!(ctx.diag.has_errors());
}

#[test]
fn test_sizeof_struct_layouts() {
    parse_ok("_Static_assert(sizeof(struct {char a; int b; long c;}) == 16, \"s1\");");
    parse_ok("_Static_assert(sizeof(struct {int a:1; int b:2;}) == 4, \"s2\");");
    parse_ok(
        "_Static_assert(sizeof(struct {int a; struct {int b; long c;};}) == 24, \"s3\");",
    );
    parse_ok("_Static_assert(sizeof(union {int a; char b[13];}) == 16, \"u\");");
}

#[test]
fn test_sizeof_basics() {
    parse_ok("_Static_assert(sizeof(int) == 4, \"int\");");
    parse_ok("_Static_assert(sizeof(long) == 8, \"long\");");
    parse_ok("_Static_assert(sizeof(char*) == 8, \"ptr\");");
    parse_ok("_Static_assert(sizeof(int[3]) == 12, \"arr\");");
    parse_ok("_Static_assert(sizeof(void) == 1, \"void is 1 by extension\");");
}

#[test]
fn test_enum_constants() {
    parse_ok("enum { A, B = 5, C }; _Static_assert(A == 0 && B == 5 && C == 6, \"enum\");");
}

#[test]
fn test_pp_and_parser_cooperate_on_if() {
    let unit = parse_ok("#if 1+1 == 2\nint x;\n#else\nlong x;\n#endif\n");
    assert_eq!(unit.toplevels.len(), 1);
    let decl = unit.nodes.get(unit.toplevels[0]);
    assert_eq!(unit.types.get(decl.ty.unwrap()).size, 4);
}

#[test]
fn test_defined_folds() {
    parse_ok("#define FOO 1\n#if defined(FOO) && !defined(BAR)\nint ok;\n#endif\n");
}

#[test]
fn test_global_with_initializer() {
    let unit = parse_ok("int x = 42;");
    assert_eq!(unit.toplevels.len(), 1);
    match unit.nodes.kind(unit.toplevels[0]) {
        NodeKind::Decl { init, .. } => {
            assert_eq!(init.len(), 1);
            match unit.nodes.kind(init[0]) {
                NodeKind::Init { value, offset } => {
                    assert_eq!(*offset, 0);
                    assert!(matches!(
                        unit.nodes.kind(*value),
                        NodeKind::IntLit { value: 42 }
                    ));
                }
                k => panic!("expected init element, got {:?}", k),
            }
        }
        k => panic!("expected declaration, got {:?}", k),
    }
}

#[test]
fn test_array_initializer_fills_length() {
    let unit = parse_ok("int a[] = {1, 2, 3};");
    let decl = unit.nodes.get(unit.toplevels[0]);
    let ty = unit.types.get(decl.ty.unwrap());
    assert_eq!(ty.size, 12);
}

#[test]
fn test_string_initializer_for_char_array() {
    let unit = parse_ok("char s[] = \"hi\";");
    let decl = unit.nodes.get(unit.toplevels[0]);
    assert_eq!(unit.types.get(decl.ty.unwrap()).size, 3);
    match unit.nodes.kind(unit.toplevels[0]) {
        NodeKind::Decl { init, .. } => assert_eq!(init.len(), 3),
        _ => panic!("expected declaration"),
    }
}

#[test]
fn test_designated_initializer_overrides() {
    let unit = parse_ok("int a[4] = {1, 2, [1] = 9};");
    match unit.nodes.kind(unit.toplevels[0]) {
        NodeKind::Decl { init, .. } => {
            // offset 4 appears once, with the designated value
            let mut at4 = Vec::new();
            for &i in init {
                if let NodeKind::Init { value, offset: 4 } = unit.nodes.kind(i) {
                    at4.push(*value);
                }
            }
            assert_eq!(at4.len(), 1);
            assert!(matches!(
                unit.nodes.kind(at4[0]),
                NodeKind::IntLit { value: 9 }
            ));
        }
        _ => panic!("expected declaration"),
    }
}

#[test]
fn test_escape_sequence_equivalence() {
    // "\x24" and "\u0024" denote the same dollar sign
    let u1 = parse_ok("char a[] = \"\\x24\";");
    let u2 = parse_ok("char b[] = \"\\u0024\";");
    let get_first_byte = |unit: &TranslationUnit| match unit.nodes.kind(unit.toplevels[0]) {
        NodeKind::Decl { init, .. } => match unit.nodes.kind(init[0]) {
            NodeKind::Init { value, .. } => match unit.nodes.kind(*value) {
                NodeKind::IntLit { value } => *value,
                _ => panic!("expected literal"),
            },
            _ => panic!("expected init"),
        },
        _ => panic!("expected decl"),
    };
    assert_eq!(get_first_byte(&u1), 0x24);
    assert_eq!(get_first_byte(&u2), 0x24);
}

#[test]
fn test_utf16_string_literal() {
    // u"\u54c8" encodes to UTF-16LE C8 54
    let unit = parse_ok("int main() { char* p = (char*)u\"\\u54c8\"; return 0; }");
    let found = unit.nodes.iter().find_map(|(_, node)| match &node.kind {
        NodeKind::StrLit { data, elem_size } if *elem_size == 2 => Some(data.clone()),
        _ => None,
    });
    assert_eq!(found.expect("no UTF-16 string literal found"), vec![0xC8, 0x54]);
}

#[test]
fn test_relational_result_is_int() {
    let unit = parse_ok("int x = 1 < 2;");
    match unit.nodes.kind(unit.toplevels[0]) {
        NodeKind::Decl { init, .. } => match unit.nodes.kind(init[0]) {
            NodeKind::Init { value, .. } => {
                let ty = unit.nodes.get(*value).ty.unwrap();
                assert_eq!(unit.types.get(ty).size, 4);
            }
            _ => panic!(),
        },
        _ => panic!(),
    }
}

#[test]
fn test_pointer_arith_types() {
    parse_ok("int a[4]; long d = &a[3] - &a[0];");
    parse_ok("_Static_assert(sizeof(1 == 1) == 4, \"cmp is int\");");
}

#[test]
fn test_function_definition_shape() {
    let unit = parse_ok("int add(int a, int b) { return a + b; }");
    assert_eq!(unit.toplevels.len(), 1);
    match unit.nodes.kind(unit.toplevels[0]) {
        NodeKind::FuncDef {
            name,
            params,
            body,
            ..
        } => {
            assert_eq!(name.as_str(), "add");
            assert_eq!(params.len(), 2);
            assert!(body.is_some());
        }
        k => panic!("expected function definition, got {:?}", k),
    }
}

#[test]
fn test_undeclared_identifier_is_error() {
    let (_, ctx) = parse("int main() { return y; }");
    assert!(ctx.diag.has_errors());
}

#[test]
fn test_implicit_function_declaration_warns() {
    let (_, ctx) = parse("int main() { return f(); }");
    assert!(!ctx.diag.has_errors());
    assert!(ctx.diag.warning_count() > 0);
}

#[test]
fn test_duplicate_label_is_error() {
    let (_, ctx) = parse("int main() { x: ; x: ; return 0; }");
    assert!(ctx.diag.has_errors());
}

#[test]
fn test_goto_undefined_label_is_error() {
    let (_, ctx) = parse("int main() { goto nowhere; return 0; }");
    assert!(ctx.diag.has_errors());
}

#[test]
fn test_goto_resolves_forward() {
    parse_ok("int main() { goto out; out: return 0; }");
}

#[test]
fn test_break_outside_loop_is_error() {
    let (_, ctx) = parse("int main() { break; }");
    assert!(ctx.diag.has_errors());
}

#[test]
fn test_duplicate_case_is_error() {
    let (_, ctx) = parse("int main(int c) { switch(c) { case 1: case 1: ; } return 0; }");
    assert!(ctx.diag.has_errors());
}

#[test]
fn test_case_range_overlap_is_error() {
    let (_, ctx) =
        parse("int main(int c) { switch(c) { case 1 ... 5: ; case 3: ; } return 0; }");
    assert!(ctx.diag.has_errors());
}

#[test]
fn test_switch_lowering_shape() {
    let unit = parse_ok(
        "int main(int c) { switch(c) { case 1: return 1; default: return 2; } return 0; }",
    );
    // the function body contains the lowered compound: assignment,
    // compare-jumps, default jump, body, end label
    match unit.nodes.kind(unit.toplevels[0]) {
        NodeKind::FuncDef { body, .. } => assert!(body.is_some()),
        _ => panic!("expected function"),
    }
}

#[test]
fn test_typedef_and_usage() {
    parse_ok("typedef unsigned long size; _Static_assert(sizeof(size) == 8, \"t\");");
}

#[test]
fn test_typedef_use_declares_object() {
    // using a typedef name declares an object, not another typedef
    let unit = parse_ok("typedef long myint; myint q = 5;");
    assert_eq!(unit.toplevels.len(), 1);
    match unit.nodes.kind(unit.toplevels[0]) {
        NodeKind::Decl { var, .. } => {
            assert!(matches!(unit.nodes.kind(*var), NodeKind::GlobalVar { .. }));
        }
        k => panic!("expected declaration, got {:?}", k),
    }
}

#[test]
fn test_struct_tag_self_reference() {
    parse_ok("struct N { int v; struct N *l, *r; }; _Static_assert(sizeof(struct N) == 24, \"n\");");
}

#[test]
fn test_old_style_params_patch_types() {
    let unit = parse_ok("int f(a, b) long a; char b; { return a; }");
    match unit.nodes.kind(unit.toplevels[0]) {
        NodeKind::FuncDef { params, .. } => {
            let a_ty = unit.nodes.get(params[0]).ty.unwrap();
            assert_eq!(unit.types.get(a_ty).size, 8);
            let b_ty = unit.nodes.get(params[1]).ty.unwrap();
            assert_eq!(unit.types.get(b_ty).size, 1);
        }
        _ => panic!("expected function"),
    }
}

#[test]
fn test_generic_selection() {
    parse_ok("_Static_assert(_Generic(1, int: 1, default: 0), \"int picks int\");");
    parse_ok("_Static_assert(_Generic(1.5, int: 0, default: 1), \"double picks default\");");
}

#[test]
fn test_compound_literal() {
    parse_ok("int main() { int *p = (int[]){1, 2, 3}; return p[0]; }");
}

#[test]
fn test_statement_expression() {
    parse_ok("int main() { int x = ({ int y = 2; y + 1; }); return x; }");
}

#[test]
fn test_label_address_and_computed_goto() {
    let unit = parse_ok(
        "int main() { void *p = &&out; goto *p; out: return 0; }",
    );
    let mut saw_computed = false;
    for &top in &unit.toplevels {
        if let NodeKind::FuncDef { body: Some(b), .. } = unit.nodes.kind(top) {
            saw_computed = contains_computed_goto(&unit, *b);
        }
    }
    assert!(saw_computed);
}

fn contains_computed_goto(unit: &TranslationUnit, id: crate::ast::NodeId) -> bool {
    match unit.nodes.kind(id) {
        NodeKind::Unary {
            op: UnaryOp::ComputedGoto,
            ..
        } => true,
        NodeKind::CompoundStmt { stmts } => {
            stmts.iter().any(|&s| contains_computed_goto(unit, s))
        }
        NodeKind::Decl { init, .. } => init.iter().any(|&s| contains_computed_goto(unit, s)),
        NodeKind::If { cond, then, els } => {
            contains_computed_goto(unit, *cond)
                || then.map_or(false, |t| contains_computed_goto(unit, t))
                || els.map_or(false, |e| contains_computed_goto(unit, e))
        }
        _ => false,
    }
}

#[test]
fn test_variadic_prototype() {
    let unit = parse_ok("int add(int n, ...);int x;");
    let _ = unit;
}

#[test]
fn test_static_local_becomes_toplevel() {
    let unit = parse_ok("int f(void) { static int counter = 3; return counter; }");
    // the static local is emitted as its own top-level declaration
    let decls = unit
        .toplevels
        .iter()
        .filter(|&&t| matches!(unit.nodes.kind(t), NodeKind::Decl { .. }))
        .count();
    assert_eq!(decls, 1);
    let has_static_label = unit.toplevels.iter().any(|&t| {
        if let NodeKind::Decl { var, .. } = unit.nodes.kind(t) {
            if let NodeKind::GlobalVar { label, .. } = unit.nodes.kind(*var) {
                return label.as_str().starts_with(".S");
            }
        }
        false
    });
    assert!(has_static_label);
}

#[test]
fn test_bitfield_width_checks() {
    let (_, ctx) = parse("struct b { int a : 33; };");
    assert!(ctx.diag.has_errors());
}

#[test]
fn test_float_constant_suffixes() {
    parse_ok("float f = 1.5f; double d = 2.5; long double l = 3.5l;");
}

#[test]
fn test_hex_and_binary_constants() {
    parse_ok("_Static_assert(0x1F == 31, \"hex\");");
    parse_ok("_Static_assert(0b1010 == 10, \"binary\");");
    parse_ok("_Static_assert(017 == 15, \"octal\");");
}

#[test]
fn test_integer_suffix_types() {
    parse_ok("_Static_assert(sizeof(1l) == 8, \"l\");");
    parse_ok("_Static_assert(sizeof(1u) == 4, \"u\");");
    parse_ok("_Static_assert(sizeof(1ull) == 8, \"ull\");");
}
