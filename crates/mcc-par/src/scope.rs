//! Lexical scope.
//!
//! A stack of name→node maps over one globals map, plus the loop/switch
//! context needed to resolve `break`/`continue`/`case` by position, and a
//! per-function accumulator of the local variables that need frame slots.

use crate::ast::NodeId;
use mcc_sem::TypeId;
use mcc_util::Symbol;
use rustc_hash::FxHashMap;

/// One `case` (or `case lo ... hi` range) of the enclosing switch.
#[derive(Clone, Debug)]
pub struct CaseRange {
    pub begin: i64,
    pub end: i64,
    pub label: Symbol,
}

pub struct Scope {
    globals: FxHashMap<Symbol, NodeId>,
    locals: Vec<FxHashMap<Symbol, NodeId>>,
    locals_backup: Vec<FxHashMap<Symbol, NodeId>>,
    current_func: Option<TypeId>,
    continues: Vec<Symbol>,
    breaks: Vec<Symbol>,
    defaults: Vec<Option<Symbol>>,
    cases: Vec<Vec<CaseRange>>,
    /// Locals of the current function, in declaration order.
    local_vars: Vec<NodeId>,
}

impl Scope {
    pub fn new() -> Scope {
        Scope {
            globals: FxHashMap::default(),
            locals: Vec::new(),
            locals_backup: Vec::new(),
            current_func: None,
            continues: Vec::new(),
            breaks: Vec::new(),
            defaults: Vec::new(),
            cases: Vec::new(),
            local_vars: Vec::new(),
        }
    }

    /// Search locals top-down, then globals.
    pub fn get(&self, name: Symbol) -> Option<NodeId> {
        for env in self.locals.iter().rev() {
            if let Some(&id) = env.get(&name) {
                return Some(id);
            }
        }
        self.globals.get(&name).copied()
    }

    /// Search the innermost local map only.
    pub fn get_local(&self, name: Symbol) -> Option<NodeId> {
        self.locals.last().and_then(|env| env.get(&name)).copied()
    }

    /// Add to the innermost local map, or to globals outside functions.
    pub fn add(&mut self, name: Symbol, id: NodeId) {
        match self.locals.last_mut() {
            Some(env) => {
                env.insert(name, id);
            }
            None => {
                self.globals.insert(name, id);
            }
        }
    }

    pub fn add_global(&mut self, name: Symbol, id: NodeId) {
        self.globals.insert(name, id);
    }

    pub fn is_local(&self) -> bool {
        !self.locals.is_empty()
    }

    pub fn enter(&mut self) {
        self.locals.push(FxHashMap::default());
    }

    pub fn enter_func(&mut self, func: TypeId) {
        self.current_func = Some(func);
        self.enter();
    }

    pub fn exit(&mut self) {
        self.locals.pop();
    }

    pub fn current_func_type(&self) -> Option<TypeId> {
        self.current_func
    }

    // loop / switch context ------------------------------------------

    pub fn enter_loop(&mut self, lcontinue: Symbol, lbreak: Symbol) {
        self.continues.push(lcontinue);
        self.breaks.push(lbreak);
        self.enter();
    }

    pub fn exit_loop(&mut self) {
        self.continues.pop();
        self.breaks.pop();
        self.exit();
    }

    pub fn enter_switch(&mut self, lbreak: Symbol) {
        self.breaks.push(lbreak);
        self.defaults.push(None);
        self.cases.push(Vec::new());
        self.enter();
    }

    /// Leave a switch, returning its collected cases and default label.
    pub fn exit_switch(&mut self) -> (Vec<CaseRange>, Option<Symbol>) {
        self.breaks.pop();
        let default = self.defaults.pop().flatten();
        let cases = self.cases.pop().unwrap_or_default();
        self.exit();
        (cases, default)
    }

    pub fn in_loop(&self) -> bool {
        !self.breaks.is_empty()
    }

    pub fn in_switch(&self) -> bool {
        !self.defaults.is_empty()
    }

    pub fn continue_label(&self) -> Option<Symbol> {
        self.continues.last().copied()
    }

    pub fn break_label(&self) -> Option<Symbol> {
        self.breaks.last().copied()
    }

    pub fn default_label(&self) -> Option<Symbol> {
        self.defaults.last().copied().flatten()
    }

    pub fn set_default_label(&mut self, label: Symbol) {
        if let Some(slot) = self.defaults.last_mut() {
            *slot = Some(label);
        }
    }

    pub fn add_case(&mut self, case: CaseRange) {
        if let Some(cases) = self.cases.last_mut() {
            cases.push(case);
        }
    }

    pub fn cases(&self) -> &[CaseRange] {
        self.cases.last().map(Vec::as_slice).unwrap_or(&[])
    }

    // static-local initializer support -------------------------------

    /// Stash the local maps so a static local's constant initializer
    /// resolves names globally.
    pub fn clear_local(&mut self) {
        debug_assert!(self.locals_backup.is_empty());
        std::mem::swap(&mut self.locals, &mut self.locals_backup);
    }

    pub fn recover_local(&mut self) {
        debug_assert!(self.locals.is_empty());
        std::mem::swap(&mut self.locals, &mut self.locals_backup);
    }

    // frame-slot accumulator -----------------------------------------

    pub fn add_local_var(&mut self, id: NodeId) {
        self.local_vars.push(id);
    }

    pub fn clear_local_vars(&mut self) {
        self.local_vars.clear();
    }

    pub fn local_vars(&self) -> Vec<NodeId> {
        self.local_vars.clone()
    }
}

impl Default for Scope {
    fn default() -> Scope {
        Scope::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shadowing() {
        let mut s = Scope::new();
        let x = Symbol::intern("x");
        s.add_global(x, NodeId(1));
        assert_eq!(s.get(x), Some(NodeId(1)));
        s.enter();
        s.add(x, NodeId(2));
        assert_eq!(s.get(x), Some(NodeId(2)));
        s.enter();
        assert_eq!(s.get(x), Some(NodeId(2)));
        assert_eq!(s.get_local(x), None);
        s.exit();
        s.exit();
        assert_eq!(s.get(x), Some(NodeId(1)));
    }

    #[test]
    fn test_add_outside_function_goes_global() {
        let mut s = Scope::new();
        let x = Symbol::intern("g");
        s.add(x, NodeId(3));
        assert!(!s.is_local());
        assert_eq!(s.get(x), Some(NodeId(3)));
    }

    #[test]
    fn test_loop_labels_nest() {
        let mut s = Scope::new();
        let (c1, b1) = (Symbol::intern(".L0"), Symbol::intern(".L1"));
        let (c2, b2) = (Symbol::intern(".L2"), Symbol::intern(".L3"));
        s.enter_loop(c1, b1);
        s.enter_loop(c2, b2);
        assert_eq!(s.continue_label(), Some(c2));
        assert_eq!(s.break_label(), Some(b2));
        s.exit_loop();
        assert_eq!(s.continue_label(), Some(c1));
        s.exit_loop();
        assert!(!s.in_loop());
    }

    #[test]
    fn test_switch_context() {
        let mut s = Scope::new();
        let end = Symbol::intern(".L9");
        s.enter_switch(end);
        assert!(s.in_switch());
        assert_eq!(s.break_label(), Some(end));
        s.add_case(CaseRange {
            begin: 1,
            end: 1,
            label: Symbol::intern(".L10"),
        });
        s.set_default_label(Symbol::intern(".L11"));
        let (cases, default) = s.exit_switch();
        assert_eq!(cases.len(), 1);
        assert_eq!(default.unwrap().as_str(), ".L11");
    }

    #[test]
    fn test_clear_and_recover_local() {
        let mut s = Scope::new();
        let x = Symbol::intern("x");
        s.enter();
        s.add(x, NodeId(7));
        s.clear_local();
        assert_eq!(s.get(x), None);
        s.recover_local();
        assert_eq!(s.get(x), Some(NodeId(7)));
    }
}
