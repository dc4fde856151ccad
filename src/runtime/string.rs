//! Interned identifier names
//!
//! Binding names are interned once per engine and compared by id. An atom is
//! stored in values as a special (non-reference) value, so names never need
//! to be traced.

use rustc_hash::FxHashMap;

/// Interned name id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Atom(u32);

impl Atom {
    #[inline]
    pub const fn from_id(id: u32) -> Self {
        Atom(id)
    }

    #[inline]
    pub const fn id(self) -> u32 {
        self.0
    }
}

/// Name interning table
#[derive(Debug, Default)]
pub struct AtomTable {
    names: Vec<Box<str>>,
    index: FxHashMap<Box<str>, Atom>,
}

impl AtomTable {
    /// Largest atom id that fits the special-value payload
    pub const MAX_ATOMS: usize = 1 << 26;

    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of interned names
    #[inline]
    pub fn count(&self) -> usize {
        self.names.len()
    }

    /// Intern `name`, returning the existing atom if it was seen before
    pub fn intern(&mut self, name: &str) -> Atom {
        if let Some(&atom) = self.index.get(name) {
            return atom;
        }
        assert!(self.names.len() < Self::MAX_ATOMS, "atom table full");
        let atom = Atom(self.names.len() as u32);
        self.names.push(name.into());
        self.index.insert(name.into(), atom);
        atom
    }

    /// Look up an already interned name
    pub fn lookup(&self, name: &str) -> Option<Atom> {
        self.index.get(name).copied()
    }

    /// Text of an atom; unknown atoms render as an empty string
    pub fn name(&self, atom: Atom) -> &str {
        self.names.get(atom.0 as usize).map_or("", |s| s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_idempotent() {
        let mut table = AtomTable::new();
        let a = table.intern("x");
        let b = table.intern("y");
        assert_ne!(a, b);
        assert_eq!(table.intern("x"), a);
        assert_eq!(table.count(), 2);
    }

    #[test]
    fn test_lookup_and_name() {
        let mut table = AtomTable::new();
        assert_eq!(table.lookup("answer"), None);
        let atom = table.intern("answer");
        assert_eq!(table.lookup("answer"), Some(atom));
        assert_eq!(table.name(atom), "answer");
        assert_eq!(table.name(Atom::from_id(99)), "");
    }
}
