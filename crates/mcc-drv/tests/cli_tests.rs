//! End-to-end CLI tests. These only exercise paths that need no
//! external toolchain: `-E`, `-S`, and the usage/exit-code contract.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn mcc() -> Command {
    Command::cargo_bin("mcc").expect("mcc binary")
}

fn write_source(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).expect("write test source");
    path
}

#[test]
fn test_no_arguments_is_usage_error() {
    mcc().assert().failure().code(1);
}

#[test]
fn test_requires_output_mode() {
    let dir = TempDir::new().unwrap();
    let src = write_source(&dir, "t.c", "int main(void){return 0;}\n");
    mcc()
        .arg(&src)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("One of -E, -S, -c or -o"));
}

#[test]
fn test_rejects_non_c_suffix() {
    mcc()
        .args(["-S", "prog.txt"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("suffix is not .c"));
}

#[test]
fn test_help_exits_one() {
    mcc()
        .arg("-h")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Usage: mcc"));
}

#[test]
fn test_compile_to_assembly() {
    let dir = TempDir::new().unwrap();
    let src = write_source(&dir, "ret6.c", "int main(void) { return 2 * 3; }\n");
    mcc().arg("-S").arg(&src).assert().success();

    let asm_path = dir.path().join("ret6.s");
    let asm = fs::read_to_string(&asm_path).expect(".s output exists");
    assert!(asm.contains(".globl main"));
    assert!(asm.contains("main:"));
    assert!(asm.contains("leave"));
}

#[test]
fn test_compile_error_exits_one() {
    let dir = TempDir::new().unwrap();
    let src = write_source(&dir, "bad.c", "int main(void) { return x; }\n");
    mcc()
        .arg("-S")
        .arg(&src)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("undeclared"));
}

#[test]
fn test_lex_error_exits_one() {
    let dir = TempDir::new().unwrap();
    let src = write_source(&dir, "stray.c", "int main(void) { return 0; } @\n");
    mcc().arg("-S").arg(&src).assert().failure().code(1);
}

#[test]
fn test_preprocess_only_expands_macros() {
    let dir = TempDir::new().unwrap();
    let src = write_source(&dir, "pp.c", "#define N 42\nint x = N;\n");
    mcc()
        .arg("-E")
        .arg(&src)
        .assert()
        .success()
        .stderr(predicate::str::contains("int x = 42;"));
}

#[test]
fn test_preprocess_stringize_keeps_single_space() {
    let dir = TempDir::new().unwrap();
    let src = write_source(&dir, "str.c", "#define S(x) #x\nchar* p = S(a   b);\n");
    mcc()
        .arg("-E")
        .arg(&src)
        .assert()
        .success()
        .stderr(predicate::str::contains("\"a b\""));
}

#[test]
fn test_command_line_define() {
    let dir = TempDir::new().unwrap();
    let src = write_source(&dir, "def.c", "int x = VALUE;\n");
    mcc()
        .args(["-E", "-DVALUE=7"])
        .arg(&src)
        .assert()
        .success()
        .stderr(predicate::str::contains("int x = 7;"));
}

#[test]
fn test_command_line_undef() {
    let dir = TempDir::new().unwrap();
    // -U emits an #undef before the file; FOO is then undefined
    let src = write_source(&dir, "undef.c", "#ifdef FOO\nint a;\n#else\nint b;\n#endif\n");
    mcc()
        .args(["-E", "-DFOO", "-UFOO"])
        .arg(&src)
        .assert()
        .success()
        .stderr(predicate::str::contains("int b;"));
}

#[test]
fn test_include_search_path() {
    let dir = TempDir::new().unwrap();
    let inc = TempDir::new().unwrap();
    fs::write(inc.path().join("answer.h"), "#define ANSWER 41\n").unwrap();
    let src = write_source(&dir, "inc.c", "#include <answer.h>\nint x = ANSWER + 1;\n");
    mcc()
        .arg("-E")
        .arg(format!("-I{}", inc.path().display()))
        .arg(&src)
        .assert()
        .success()
        .stderr(predicate::str::contains("int x = 41 + 1;"));
}

#[test]
fn test_pragma_once_included_once() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("guard.h"),
        "#pragma once\nint counted;\n",
    )
    .unwrap();
    let src = write_source(
        &dir,
        "once.c",
        "#include \"guard.h\"\n#include \"guard.h\"\nint main(void){return 0;}\n",
    );
    let output = mcc().arg("-E").arg(&src).assert().success();
    let stderr = String::from_utf8_lossy(&output.get_output().stderr).into_owned();
    assert_eq!(stderr.matches("counted").count(), 1, "stderr: {}", stderr);
}

#[test]
fn test_conditional_inclusion_in_e_mode() {
    let dir = TempDir::new().unwrap();
    let src = write_source(
        &dir,
        "cond.c",
        "#if 1+1 == 2\nint yes;\n#else\nint no;\n#endif\n",
    );
    mcc()
        .arg("-E")
        .arg(&src)
        .assert()
        .success()
        .stderr(predicate::str::contains("int yes;").and(predicate::str::contains("int no;").not()));
}

#[test]
fn test_multiple_inputs_compile() {
    let dir = TempDir::new().unwrap();
    let a = write_source(&dir, "a.c", "int f(void) { return 1; }\n");
    let b = write_source(&dir, "b.c", "int g(void) { return 2; }\n");
    mcc().arg("-S").arg(&a).arg(&b).assert().success();
    assert!(dir.path().join("a.s").exists());
    assert!(dir.path().join("b.s").exists());
}

#[test]
fn test_struct_program_compiles() {
    let dir = TempDir::new().unwrap();
    let src = write_source(
        &dir,
        "tree.c",
        "struct N { int v; struct N *l, *r; };\n\
         int sum(struct N *p) { return p ? p->v + sum(p->l) + sum(p->r) : 0; }\n\
         int main(void) { struct N x = {1}, y = {2}, z = {3}; x.l = &y; x.r = &z; return sum(&x) - 6; }\n",
    );
    mcc().arg("-S").arg(&src).assert().success();
    let asm = fs::read_to_string(dir.path().join("tree.s")).unwrap();
    assert!(asm.contains("sum:"));
    assert!(asm.contains("call sum"));
}

#[test]
fn test_factorial_program_compiles() {
    let dir = TempDir::new().unwrap();
    let src = write_source(
        &dir,
        "fact.c",
        "int factorial(int n) { return n <= 1 ? 1 : n * factorial(n - 1); }\n\
         int main(void) { return factorial(5) - 120; }\n",
    );
    mcc().arg("-S").arg(&src).assert().success();
    let asm = fs::read_to_string(dir.path().join("fact.s")).unwrap();
    assert!(asm.contains("factorial:"));
    assert!(asm.contains("imul"));
}
