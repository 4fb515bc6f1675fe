//! `#if` / `#elif` expression evaluation.
//!
//! The preprocessor hands over one fully macro-expanded line with
//! `defined` and unknown identifiers already folded to integer tokens. A
//! nested preprocessor and parser over that token list apply the same
//! expression grammar used for source text, and the result folds through
//! the regular integer constant evaluator.

use crate::const_eval;
use crate::Parser;
use mcc_lex::{Lexer, Token};
use mcc_pp::Preprocessor;
use mcc_util::{Context, Fatal, Result};
use std::rc::Rc;

/// Evaluate a preprocessor constant expression. Installed into the
/// preprocessor by [`Parser::new`](crate::Parser::new).
pub fn eval_cond_expr(ctx: Rc<Context>, toks: Vec<Token>) -> Result<i64> {
    if toks.is_empty() {
        return Err(Fatal::Preprocess("#if with no expression".into()));
    }
    let lexer = Lexer::from_tokens(ctx.clone(), toks);
    let pp = Preprocessor::new(ctx, lexer);
    let mut parser = Parser::new(pp);
    let node = parser.read_cond_expr()?;
    let v = const_eval::eval_int(&parser.nodes, &parser.types, node)?;
    if v.label.is_some() {
        return Err(Fatal::Preprocess(
            "address constant in #if expression".into(),
        ));
    }
    Ok(v.value)
}
