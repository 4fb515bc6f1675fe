//! Diagnostics.
//!
//! The handler prints immediately to stderr and keeps counters; whether the
//! compilation failed is queried at the end through [`Handler::has_errors`].
//! Labels are coloured when stderr is a terminal.

use crate::Pos;
use colored::Colorize;
use std::cell::Cell;
use std::io::IsTerminal;

/// Diagnostic sink with interior mutability, so stages holding shared
/// references can report without plumbing `&mut` everywhere.
pub struct Handler {
    errors: Cell<usize>,
    warnings: Cell<usize>,
    /// Warnings are suppressed when false. Errors always print.
    pub enable_warning: Cell<bool>,
}

impl Handler {
    pub fn new() -> Handler {
        Handler {
            errors: Cell::new(0),
            warnings: Cell::new(0),
            enable_warning: Cell::new(true),
        }
    }

    fn label(kind: &str) -> String {
        if std::io::stderr().is_terminal() {
            format!("[{}]", kind).red().bold().to_string()
        } else {
            format!("[{}]", kind)
        }
    }

    /// Report an error at a position. Sets the failure flag.
    pub fn error(&self, pos: Pos, msg: impl AsRef<str>) {
        self.errors.set(self.errors.get() + 1);
        eprintln!("{} {}: {}", Self::label("ERROR"), pos, msg.as_ref());
    }

    /// Report a warning at a position. Does not affect the exit status.
    pub fn warn(&self, pos: Pos, msg: impl AsRef<str>) {
        if !self.enable_warning.get() {
            return;
        }
        self.warnings.set(self.warnings.get() + 1);
        eprintln!("{} {}: {}", Self::label("WARNING"), pos, msg.as_ref());
    }

    /// A note, used by `#pragma message`.
    pub fn note(&self, pos: Pos, msg: impl AsRef<str>) {
        let label = if std::io::stderr().is_terminal() {
            "[NOTE]".blue().bold().to_string()
        } else {
            "[NOTE]".to_string()
        };
        eprintln!("{} {}: {}", label, pos, msg.as_ref());
    }

    pub fn has_errors(&self) -> bool {
        self.errors.get() > 0
    }

    pub fn error_count(&self) -> usize {
        self.errors.get()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.get()
    }
}

impl Default for Handler {
    fn default() -> Handler {
        Handler::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_sets_flag() {
        let h = Handler::new();
        assert!(!h.has_errors());
        h.error(Pos::none(), "boom");
        assert!(h.has_errors());
        assert_eq!(h.error_count(), 1);
    }

    #[test]
    fn test_warning_does_not_set_flag() {
        let h = Handler::new();
        h.warn(Pos::none(), "meh");
        assert!(!h.has_errors());
        assert_eq!(h.warning_count(), 1);
    }

    #[test]
    fn test_warnings_can_be_disabled() {
        let h = Handler::new();
        h.enable_warning.set(false);
        h.warn(Pos::none(), "suppressed");
        assert_eq!(h.warning_count(), 0);
    }
}
