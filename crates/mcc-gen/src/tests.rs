//! Generator tests: source through the whole front end, assertions on
//! the emitted assembly text.

use crate::Generator;
use mcc_lex::Lexer;
use mcc_par::Parser;
use mcc_pp::Preprocessor;
use mcc_util::Context;
use std::rc::Rc;

fn compile(src: &str) -> String {
    let ctx = Rc::new(Context::new());
    let lexer = Lexer::from_string(ctx.clone(), src);
    let pp = Preprocessor::new(ctx.clone(), lexer);
    let parser = Parser::new(pp);
    let unit = parser.parse().expect("parse failed");
    assert!(!ctx.diag.has_errors(), "unexpected front-end errors");
    Generator::new(ctx, &unit).run().expect("codegen failed")
}

#[test]
fn test_minimal_function() {
    let asm = compile("int main(void) { return 6; }");
    assert!(asm.contains(".globl main"));
    assert!(asm.contains("main:"));
    assert!(asm.contains("movq $6, %rax"));
    assert!(asm.contains("leave"));
    assert!(asm.contains("ret"));
}

#[test]
fn test_static_function_not_global() {
    let asm = compile("static int helper(void) { return 1; } int main(void) { return helper(); }");
    assert!(!asm.contains(".globl helper"));
    assert!(asm.contains(".globl main"));
    assert!(asm.contains("call helper"));
}

#[test]
fn test_global_data() {
    let asm = compile("int x = 42;");
    assert!(asm.contains(".data 0"));
    assert!(asm.contains(".globl x"));
    assert!(asm.contains("x:"));
    assert!(asm.contains(".long 42"));
}

#[test]
fn test_uninitialized_global_is_lcomm() {
    let asm = compile("long y;");
    assert!(asm.contains(".lcomm y, 8"));
}

#[test]
fn test_static_global_hides_symbol() {
    let asm = compile("static int z = 1;");
    assert!(!asm.contains(".globl z"));
    assert!(asm.contains("z:"));
}

#[test]
fn test_zero_gap_filling() {
    let asm = compile("struct { char c; int i; } s = { 'a', 5 };");
    assert!(asm.contains(".byte 97"));
    assert!(asm.contains(".zero 3"));
    assert!(asm.contains(".long 5"));
}

#[test]
fn test_bitfield_or_folding() {
    // a=1 (bit 0), b=2 (bits 1-2): 1 | (2<<1) = 5
    let asm = compile("struct { int a:1; int b:2; } s = { 1, 2 };");
    assert!(asm.contains(".long 5"), "expected folded unit in:\n{}", asm);
}

#[test]
fn test_string_literal_pooled() {
    let asm = compile("int main(void) { char *p = \"hi\"; return 0; }");
    assert!(asm.contains(".string \"hi\""));
    assert!(asm.contains("lea .L"));
}

#[test]
fn test_pointer_to_string_in_data() {
    let asm = compile("char *p = \"hey\";");
    assert!(asm.contains(".data 1"));
    assert!(asm.contains(".string \"hey\""));
    assert!(asm.contains(".quad .L"));
}

#[test]
fn test_float_literal_pooled() {
    let asm = compile("double f(void) { return 1.5; }");
    // 1.5 is 0x3FF8000000000000
    assert!(asm.contains(&format!(".quad {}", 1.5f64.to_bits())));
    assert!(asm.contains("movsd .L"));
}

#[test]
fn test_args_pop_into_abi_registers() {
    let asm = compile("int add(int a, int b); int main(void) { return add(1, 2); }");
    assert!(asm.contains("pop %rdi"));
    assert!(asm.contains("pop %rsi"));
    assert!(asm.contains("call add"));
    // non-variadic: no %al float count anywhere
    assert!(!asm.contains("mov $0, %eax"));
}

#[test]
fn test_variadic_call_sets_eax() {
    let asm = compile("int printf(char *fmt, ...); int main(void) { printf(\"%d\", 1); return 0; }");
    assert!(asm.contains("mov $0, %eax"));
    assert!(asm.contains("call printf"));
}

#[test]
fn test_variadic_function_saves_register_area() {
    let asm = compile(
        "int f(int n, ...) { char ap[24]; __builtin_va_start(ap); return n; }",
    );
    assert!(asm.contains("sub $176, %rsp"));
    assert!(asm.contains("movaps %xmm7, 160(%rsp)"));
    // one named int parameter consumed one GPR
    assert!(asm.contains("movl $8, (%rax)"));
    assert!(asm.contains("movl $48, 4(%rax)"));
}

#[test]
fn test_pointer_arithmetic_scales() {
    let asm = compile("int f(int *p) { return *(p + 2); }");
    assert!(asm.contains("imul $4, %rax"));
}

#[test]
fn test_division_uses_cqto() {
    let asm = compile("int f(int a, int b) { return a / b; }");
    assert!(asm.contains("cqto"));
    assert!(asm.contains("idivq %rcx"));
}

#[test]
fn test_unsigned_division() {
    let asm = compile("unsigned f(unsigned a, unsigned b) { return a / b; }");
    assert!(asm.contains("movl $0, %edx"));
    assert!(asm.contains("divq %rcx"));
}

#[test]
fn test_modulo_takes_rdx() {
    let asm = compile("int f(int a, int b) { return a % b; }");
    assert!(asm.contains("movq %rdx, %rax"));
}

#[test]
fn test_comparison_setcc() {
    let asm = compile("int f(int a, int b) { return a < b; }");
    assert!(asm.contains("setl %al"));
    assert!(asm.contains("movzb %al, %eax"));
    let asm = compile("int f(unsigned a, unsigned b) { return a < b; }");
    assert!(asm.contains("setb %al"));
}

#[test]
fn test_float_comparison_is_unordered() {
    let asm = compile("int f(double a, double b) { return a < b; }");
    assert!(asm.contains("ucomisd"));
    assert!(asm.contains("setb %al"));
}

#[test]
fn test_short_circuit_labels() {
    let asm = compile("int f(int a, int b) { return a && b; }");
    assert!(asm.contains("je .L"));
    assert!(asm.contains("movq $1, %rax"));
}

#[test]
fn test_struct_assignment_block_copy() {
    let asm = compile(
        "struct big { long a, b, c; };\n\
         void f(struct big *d, struct big *s) { *d = *s; }",
    );
    assert!(asm.contains("movq 16(%rcx), %r11"));
    assert!(asm.contains("movq %r11, 16(%rax)"));
}

#[test]
fn test_local_frame_allocation() {
    let asm = compile("int f(void) { int a = 1; int b = 2; return a + b; }");
    assert!(asm.contains("sub $16, %rsp"));
    assert!(asm.contains("movl $1, -8(%rbp)"));
    assert!(asm.contains("movl $2, -16(%rbp)"));
}

#[test]
fn test_bool_parameter_zero_extended() {
    let asm = compile("int f(_Bool b) { return b; }");
    assert!(asm.contains("movzx %dil, %rdi"));
}

#[test]
fn test_switch_lowering_compare_chain() {
    let asm = compile(
        "int f(int c) { switch (c) { case 1: return 10; case 4 ... 6: return 20; default: return 30; } }",
    );
    assert!(asm.contains("sete %al"));
    // the range case emits two comparisons joined by a short-circuit
    assert!(asm.contains("setle %al"));
}

#[test]
fn test_goto_and_label() {
    let asm = compile("int f(void) { goto out; out: return 1; }");
    assert!(asm.contains("jmp .L"));
}

#[test]
fn test_deterministic_output() {
    let src = "int g = 3; double h = 2.5; int add(int a, int b) { return a + b; }\n\
               int main(void) { return add(g, 1); }";
    assert_eq!(compile(src), compile(src));
}

#[test]
fn test_array_subscript_load() {
    let asm = compile("int f(void) { int a[3]; a[0] = 1; return a[0]; }");
    // array decays to a lea of the frame slot (12 bytes, rounded to 16)
    assert!(asm.contains("lea -16(%rbp), %rax"));
}

#[test]
fn test_member_access_offsets() {
    let asm = compile(
        "struct p { int x; int y; };\n\
         int f(void) { struct p q; q.y = 7; return q.y; }",
    );
    assert!(asm.contains("mov %eax, -4(%rbp)"));
}

#[test]
fn test_bitfield_store_masks() {
    let asm = compile(
        "struct b { int a : 3; };\n\
         int f(void) { struct b x; x.a = 5; return x.a; }",
    );
    assert!(asm.contains("mov $7, %rdi"));
    assert!(asm.contains("shr $0, %rax") || asm.contains("and %rcx, %rax"));
}

#[test]
fn test_conversion_int_to_double() {
    let asm = compile("double f(int x) { return x; }");
    assert!(asm.contains("cvtsi2sd %eax, %xmm0"));
}

#[test]
fn test_conversion_double_to_int() {
    let asm = compile("int f(double x) { return x; }");
    assert!(asm.contains("cvttsd2si %xmm0, %eax"));
}

#[test]
fn test_computed_goto() {
    let asm = compile("int f(void) { void *p = &&out; goto *p; out: return 0; }");
    assert!(asm.contains("jmp *%rax"));
}

#[test]
fn test_address_constant_initializer() {
    let asm = compile("int x; int *p = &x;");
    assert!(asm.contains(".quad x"));
}

#[test]
fn test_params_beyond_six_come_from_stack() {
    let asm = compile(
        "int f(int a, int b, int c, int d, int e, int g, int h, int i) { return h + i; }",
    );
    // the seventh and eighth parameters live above the frame
    assert!(asm.contains("movq 16(%rbp), %rax"));
    assert!(asm.contains("movq 24(%rbp), %rax"));
}

#[test]
fn test_call_with_stack_arguments() {
    let asm = compile(
        "int g(int, int, int, int, int, int, int);\n\
         int main(void) { return g(1, 2, 3, 4, 5, 6, 7); }",
    );
    assert!(asm.contains("call g"));
    assert!(asm.contains("pop %r9"));
    // the seventh argument unwinds from the stack after the call
    assert!(asm.contains("add $8, %rsp"));
}

#[test]
fn test_sizeof_folds_to_literal() {
    let asm = compile("int f(void) { return sizeof(long); }");
    assert!(asm.contains("movq $8, %rax"));
}
