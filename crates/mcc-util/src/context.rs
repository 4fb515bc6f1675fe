//! Per-invocation compiler context.
//!
//! One `Context` exists per compiler invocation and is shared (via `Rc`)
//! by the preprocessor, parser and generator. It aggregates what would
//! otherwise be mutable globals: the diagnostics handler and the monotonic
//! counters behind generated assembler names.

use crate::{Handler, Symbol};
use std::cell::Cell;

pub struct Context {
    /// Diagnostic sink for the whole invocation.
    pub diag: Handler,
    labels: Cell<u32>,
    temps: Cell<u32>,
    statics: Cell<u32>,
    counter: Cell<u32>,
}

impl Context {
    pub fn new() -> Context {
        Context {
            diag: Handler::new(),
            labels: Cell::new(0),
            temps: Cell::new(0),
            statics: Cell::new(0),
            counter: Cell::new(0),
        }
    }

    /// Fresh assembler label: `.L0`, `.L1`, ...
    pub fn make_label(&self) -> Symbol {
        let n = self.labels.get();
        self.labels.set(n + 1);
        Symbol::intern(&format!(".L{}", n))
    }

    /// Fresh temporary variable name: `.T0`, `.T1`, ...
    pub fn make_tmpname(&self) -> Symbol {
        let n = self.temps.get();
        self.temps.set(n + 1);
        Symbol::intern(&format!(".T{}", n))
    }

    /// Label for a static local: `.S0.name`, `.S1.name`, ...
    pub fn make_static_label(&self, name: Symbol) -> Symbol {
        let n = self.statics.get();
        self.statics.set(n + 1);
        Symbol::intern(&format!(".S{}.{}", n, name))
    }

    /// Next `__COUNTER__` value.
    pub fn next_counter(&self) -> u32 {
        let n = self.counter.get();
        self.counter.set(n + 1);
        n
    }
}

impl Default for Context {
    fn default() -> Context {
        Context::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_monotonic() {
        let ctx = Context::new();
        let a = ctx.make_label();
        let b = ctx.make_label();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with(".L"));
    }

    #[test]
    fn test_static_label_embeds_name() {
        let ctx = Context::new();
        let l = ctx.make_static_label(Symbol::intern("x"));
        assert!(l.as_str().starts_with(".S"));
        assert!(l.as_str().ends_with(".x"));
    }

    #[test]
    fn test_counter() {
        let ctx = Context::new();
        assert_eq!(ctx.next_counter(), 0);
        assert_eq!(ctx.next_counter(), 1);
    }
}
