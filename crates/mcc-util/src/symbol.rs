//! String interning.
//!
//! All identifiers, file names and generated labels are interned once and
//! referred to by [`Symbol`] handles afterwards. Interned text is leaked to
//! obtain `'static` references; the table lives for the whole process, the
//! set of distinct strings in a translation unit is bounded, and skipping
//! lifetime tracking keeps `Symbol` a bare `u32`.

use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::{Mutex, OnceLock};

/// An interned string.
///
/// `Symbol`s compare and hash as integers. Two symbols are equal iff the
/// strings they were interned from are byte-equal.
///
/// # Examples
///
/// ```
/// use mcc_util::Symbol;
///
/// let a = Symbol::intern("main");
/// let b = Symbol::intern("main");
/// assert_eq!(a, b);
/// assert_eq!(a.as_str(), "main");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

struct Interner {
    map: FxHashMap<&'static str, u32>,
    strings: Vec<&'static str>,
}

fn interner() -> &'static Mutex<Interner> {
    static TABLE: OnceLock<Mutex<Interner>> = OnceLock::new();
    TABLE.get_or_init(|| {
        Mutex::new(Interner {
            map: FxHashMap::default(),
            strings: Vec::with_capacity(256),
        })
    })
}

impl Symbol {
    /// Intern a string, returning its handle.
    pub fn intern(s: &str) -> Symbol {
        let mut t = interner().lock().unwrap();
        if let Some(&idx) = t.map.get(s) {
            return Symbol(idx);
        }
        let leaked: &'static str = Box::leak(s.to_owned().into_boxed_str());
        let idx = t.strings.len() as u32;
        t.strings.push(leaked);
        t.map.insert(leaked, idx);
        Symbol(idx)
    }

    /// The interned text.
    pub fn as_str(self) -> &'static str {
        interner().lock().unwrap().strings[self.0 as usize]
    }

    /// Raw handle value, for debugging.
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({:?})", self.as_str())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Symbol {
        Symbol::intern(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_intern_dedup() {
        let a = Symbol::intern("foo");
        let b = Symbol::intern("foo");
        let c = Symbol::intern("bar");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_as_str_round_trip() {
        let s = Symbol::intern("very_long_identifier_name");
        assert_eq!(s.as_str(), "very_long_identifier_name");
    }

    #[test]
    fn test_empty_string() {
        let s = Symbol::intern("");
        assert_eq!(s.as_str(), "");
    }

    #[test]
    fn test_display() {
        let s = Symbol::intern(".L42");
        assert_eq!(format!("{}", s), ".L42");
    }

    #[quickcheck]
    fn prop_round_trip(s: String) -> bool {
        Symbol::intern(&s).as_str() == s
    }

    #[quickcheck]
    fn prop_equality_matches_string_equality(a: String, b: String) -> bool {
        (Symbol::intern(&a) == Symbol::intern(&b)) == (a == b)
    }
}
