/// Symbol interning — grown from the teacher's NaN-boxing string table.
///
/// `Value` is a real Rust enum rather than a packed f64 (the spec's Complex
/// and Bignum variants don't fit in 48 payload bits), so the tagging scheme
/// that used to live in this file doesn't survive the transformation — only
/// the interner does. Symbols are interned so `eq?` on symbols is a u32
/// compare rather than a string compare.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;

pub struct StringInterner {
    table: RwLock<HashMap<String, u32>>,
    strings: RwLock<Vec<String>>,
}

impl StringInterner {
    pub fn new() -> Self {
        StringInterner {
            table: RwLock::new(HashMap::new()),
            strings: RwLock::new(Vec::new()),
        }
    }

    pub fn intern(&self, s: &str) -> u32 {
        {
            let table = self.table.read();
            if let Some(&idx) = table.get(s) {
                return idx;
            }
        }
        let mut table = self.table.write();
        if let Some(&idx) = table.get(s) {
            return idx;
        }
        let idx = {
            let mut strings = self.strings.write();
            let idx = strings.len() as u32;
            strings.push(s.to_string());
            idx
        };
        table.insert(s.to_string(), idx);
        idx
    }

    pub fn get(&self, idx: u32) -> Option<String> {
        self.strings.read().get(idx as usize).cloned()
    }

    pub fn len(&self) -> usize {
        self.strings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide symbol table. Every `Value::Symbol(u32)` indexes into this.
pub static SYMBOLS: Lazy<StringInterner> = Lazy::new(StringInterner::new);

pub fn intern(name: &str) -> u32 {
    SYMBOLS.intern(name)
}

pub fn resolve(idx: u32) -> Option<String> {
    SYMBOLS.get(idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let s = StringInterner::new();
        let a = s.intern("hello");
        let b = s.intern("world");
        let c = s.intern("hello");
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(s.get(a).unwrap(), "hello");
    }

    #[test]
    fn process_wide_table_resolves_round_trip() {
        let idx = intern("axiom-core-test-symbol");
        assert_eq!(resolve(idx).as_deref(), Some("axiom-core-test-symbol"));
    }
}
