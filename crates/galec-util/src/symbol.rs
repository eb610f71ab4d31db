//! Interned string identifiers.
//!
//! A [`Symbol`] is a 4-byte handle to a string in the global interner table,
//! making identifier comparison and hashing O(1). Identifiers, operator
//! spellings, and type names repeat constantly across a compilation, so the
//! table stays small while handles are copied freely.

use std::fmt;
use std::sync::{Mutex, OnceLock};

use rustc_hash::FxHashMap;

/// An interned string identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(u32);

impl Symbol {
    /// Intern a string, returning its symbol.
    ///
    /// Interning the same string twice returns the same symbol.
    pub fn intern(string: &str) -> Self {
        interner().lock().unwrap().intern(string)
    }

    /// Get the string value associated with this symbol.
    pub fn as_str(self) -> &'static str {
        interner().lock().unwrap().get(self)
    }

    /// Get the raw index value.
    pub fn as_u32(self) -> u32 {
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

struct Interner {
    arena: bumpalo::Bump,
    names: FxHashMap<&'static str, u32>,
    strings: Vec<&'static str>,
}

impl Interner {
    fn new() -> Self {
        Self {
            arena: bumpalo::Bump::new(),
            names: FxHashMap::default(),
            strings: Vec::new(),
        }
    }

    fn intern(&mut self, string: &str) -> Symbol {
        if let Some(&index) = self.names.get(string) {
            return Symbol(index);
        }
        // The arena lives in a process-wide static and is never reset, so
        // extending the allocation's lifetime to 'static is sound.
        let interned: &'static str =
            unsafe { std::mem::transmute::<&str, &'static str>(self.arena.alloc_str(string)) };
        let index = self.strings.len() as u32;
        self.strings.push(interned);
        self.names.insert(interned, index);
        Symbol(index)
    }

    fn get(&self, symbol: Symbol) -> &'static str {
        self.strings[symbol.0 as usize]
    }
}

fn interner() -> &'static Mutex<Interner> {
    static INTERNER: OnceLock<Mutex<Interner>> = OnceLock::new();
    INTERNER.get_or_init(|| Mutex::new(Interner::new()))
}
