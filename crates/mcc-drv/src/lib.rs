//! mcc-drv - Compiler driver
//!
//! Orchestrates the pipeline per translation unit: lexer, preprocessor,
//! parser, generator, then the external assembler and linker. The core
//! only ever produces an assembly file; `as` and `gcc` (as the link
//! front end) finish the job as child processes.
//!
//! Exit codes: 0 on success, 1 on any error or usage violation.

use anyhow::{bail, Context as _};
use mcc_gen::Generator;
use mcc_lex::Lexer;
use mcc_par::Parser;
use mcc_pp::Preprocessor;
use mcc_util::Context;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::rc::Rc;

const MAX_INPUT_FILES: usize = 100;

pub const USAGE: &str = "Usage: mcc [options] file...\n\
Options:\n\
-h                       Display this information\n\
-E                       Preprocess only; do not compile, assemble or link\n\
-S                       Compile only; do not assemble or link\n\
-c                       Compile and assemble, but do not link\n\
-o <file>                Place the output into <file>\n\
-I <path>                Add include path\n\
-D <name>[=def]          Predefine name as a macro\n\
-U <name>                Undefine name";

/// One invocation's configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub input_files: Vec<PathBuf>,
    pub output_file: Option<PathBuf>,
    /// `-E`
    pub preprocess_only: bool,
    /// `-S`
    pub compile_only: bool,
    /// `-c`
    pub assemble_only: bool,
    pub include_paths: Vec<PathBuf>,
    /// `#define`/`#undef` lines synthesized from `-D`/`-U`, pushed onto
    /// the reader ahead of the input file.
    pub predefines: String,
}

/// Parse the command line. `Err` carries the message to print before
/// exiting with status 1.
pub fn parse_args(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut iter = args.iter().peekable();

    // an option taking a value accepts both "-Idir" and "-I dir"
    fn take_value<'a>(
        flag: &str,
        rest: &'a str,
        iter: &mut std::iter::Peekable<std::slice::Iter<String>>,
    ) -> Result<String, String> {
        if !rest.is_empty() {
            return Ok(rest.to_string());
        }
        match iter.next() {
            Some(v) => Ok(v.clone()),
            None => Err(format!("option '-{}' requires an argument\n{}", flag, USAGE)),
        }
    }

    while let Some(arg) = iter.next() {
        if let Some(rest) = arg.strip_prefix('-').filter(|r| !r.is_empty()) {
            let (flag, rest) = rest.split_at(1);
            match flag {
                "h" => return Err(USAGE.to_string()),
                "E" => config.preprocess_only = true,
                "S" => config.compile_only = true,
                "c" => config.assemble_only = true,
                "o" => {
                    let value = take_value("o", rest, &mut iter)?;
                    config.output_file = Some(PathBuf::from(value));
                }
                "I" => {
                    let value = take_value("I", rest, &mut iter)?;
                    config.include_paths.push(PathBuf::from(value));
                }
                "D" => {
                    let value = take_value("D", rest, &mut iter)?;
                    let def = value.replacen('=', " ", 1);
                    config.predefines.push_str(&format!("#define {}\n", def));
                }
                "U" => {
                    let value = take_value("U", rest, &mut iter)?;
                    config.predefines.push_str(&format!("#undef {}\n", value));
                }
                _ => return Err(format!("unknown option '{}'\n{}", arg, USAGE)),
            }
            if flag != "o" && flag != "I" && flag != "D" && flag != "U" && !rest.is_empty() {
                return Err(format!("unknown option '{}'\n{}", arg, USAGE));
            }
        } else {
            config.input_files.push(PathBuf::from(arg));
        }
    }

    if !config.preprocess_only
        && !config.compile_only
        && !config.assemble_only
        && config.output_file.is_none()
    {
        return Err("One of -E, -S, -c or -o must be specified".to_string());
    }
    if config.input_files.is_empty() {
        return Err(USAGE.to_string());
    }
    if config.input_files.len() > MAX_INPUT_FILES {
        return Err(format!(
            "The number of input files should not exceed {}",
            MAX_INPUT_FILES
        ));
    }
    for file in &config.input_files {
        if file.extension().and_then(|e| e.to_str()) != Some("c") {
            return Err("filename suffix is not .c".to_string());
        }
    }
    Ok(config)
}

fn with_suffix(path: &Path, ext: &str) -> PathBuf {
    path.with_extension(ext)
}

/// Build one preprocessor over `path`, with `-D`/`-U` and `-I` applied
/// and the implementation header auto-included when installed.
fn make_preprocessor(
    ctx: Rc<Context>,
    config: &Config,
    path: &Path,
) -> anyhow::Result<Preprocessor> {
    let mut lexer = Lexer::new(ctx.clone(), path)?;
    if !config.predefines.is_empty() {
        lexer.fileset().push_string(&config.predefines);
    }
    let mut pp = Preprocessor::new(ctx, lexer);
    // -I paths are prepended, so add them in reverse to keep their order
    for dir in config.include_paths.iter().rev() {
        pp.add_include_path(dir.clone());
    }
    pp.include_default_header()?;
    Ok(pp)
}

/// `-E`: the translator token stream to stderr, reconstructing line
/// breaks and single leading spaces.
fn preprocess_to_stderr(ctx: Rc<Context>, config: &Config, path: &Path) -> anyhow::Result<()> {
    let mut pp = make_preprocessor(ctx, config, path)?;
    pp.set_cond_eval(mcc_par::eval_cond_expr);
    let mut out = String::new();
    out.push_str(&format!("#{}", path.display()));
    loop {
        let tok = pp.get_token()?;
        if tok.is_eof() {
            break;
        }
        if tok.begin_of_line {
            out.push('\n');
        }
        if tok.leading_space {
            out.push(' ');
        }
        out.push_str(&tok.to_text());
    }
    out.push('\n');
    eprint!("{}", out);
    Ok(())
}

fn compile_to_assembly(
    ctx: Rc<Context>,
    config: &Config,
    path: &Path,
) -> anyhow::Result<PathBuf> {
    let pp = make_preprocessor(ctx.clone(), config, path)?;
    let parser = Parser::new(pp);
    let unit = parser.parse()?;
    if ctx.diag.has_errors() {
        bail!("compilation failed with {} error(s)", ctx.diag.error_count());
    }
    let asm = Generator::new(ctx, &unit).run()?;
    let asm_path = with_suffix(path, "s");
    std::fs::write(&asm_path, asm)
        .with_context(|| format!("cannot write {}", asm_path.display()))?;
    Ok(asm_path)
}

fn assemble(asm_path: &Path) -> anyhow::Result<PathBuf> {
    let obj_path = with_suffix(asm_path, "o");
    let status = Command::new("as")
        .arg("-o")
        .arg(&obj_path)
        .arg("-c")
        .arg(asm_path)
        .status()
        .context("failed to spawn 'as'")?;
    if !status.success() {
        bail!("as failed on {}", asm_path.display());
    }
    Ok(obj_path)
}

fn link(output: &Path, objs: &[PathBuf]) -> anyhow::Result<()> {
    let status = Command::new("gcc")
        .arg("-o")
        .arg(output)
        .args(objs)
        .status()
        .context("failed to spawn 'gcc'")?;
    if !status.success() {
        bail!("link failed");
    }
    Ok(())
}

/// Run the whole invocation; returns the process exit code.
pub fn run(config: &Config) -> anyhow::Result<i32> {
    let mut obj_files = Vec::new();
    let mut asm_files = Vec::new();

    for input in &config.input_files {
        let ctx = Rc::new(Context::new());

        if config.preprocess_only {
            preprocess_to_stderr(ctx, config, input)?;
            continue;
        }

        let asm_path = compile_to_assembly(ctx, config, input)?;
        if config.compile_only {
            continue;
        }
        asm_files.push(asm_path.clone());

        let obj_path = assemble(&asm_path)?;
        obj_files.push(obj_path);
    }

    // intermediate .s files only survive -S
    if !config.compile_only {
        for asm in &asm_files {
            let _ = std::fs::remove_file(asm);
        }
    }

    if config.preprocess_only || config.compile_only || config.assemble_only {
        return Ok(0);
    }

    let output = config
        .output_file
        .as_ref()
        .expect("checked during argument parsing");
    link(output, &obj_files)?;
    for obj in &obj_files {
        let _ = std::fs::remove_file(obj);
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_args_basic() {
        let c = parse_args(&args(&["-S", "a.c", "b.c"])).unwrap();
        assert!(c.compile_only);
        assert_eq!(c.input_files.len(), 2);
    }

    #[test]
    fn test_parse_args_requires_mode() {
        assert!(parse_args(&args(&["a.c"])).is_err());
    }

    #[test]
    fn test_parse_args_rejects_bad_suffix() {
        assert!(parse_args(&args(&["-S", "a.txt"])).is_err());
    }

    #[test]
    fn test_parse_args_defines() {
        let c = parse_args(&args(&["-E", "-DFOO=1", "-UBAR", "a.c"])).unwrap();
        assert!(c.predefines.contains("#define FOO 1\n"));
        assert!(c.predefines.contains("#undef BAR\n"));
    }

    #[test]
    fn test_parse_args_attached_values() {
        let c = parse_args(&args(&["-S", "-I/usr/inc", "a.c"])).unwrap();
        assert_eq!(c.include_paths, vec![PathBuf::from("/usr/inc")]);
        let c = parse_args(&args(&["-o", "out", "a.c"])).unwrap();
        assert_eq!(c.output_file, Some(PathBuf::from("out")));
    }

    #[test]
    fn test_parse_args_usage_on_h() {
        let err = parse_args(&args(&["-h"])).unwrap_err();
        assert!(err.contains("Usage"));
    }
}
