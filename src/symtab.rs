//! Append-only symbol table shared by the parser and both backends.
//!
//! Slots are dense, 0-based and assigned in declaration order; each variable
//! gets a fixed 4-byte stack slot at `-4 * (slot + 1)` bytes from the frame
//! base. Offsets never change after insertion.

use std::fmt;

/// Value types of the language. `None` marks nodes with no value (statements).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Int4,
    Str,
    Bool,
    None,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Int4 => write!(f, "int4"),
            ValueType::Str => write!(f, "string"),
            ValueType::Bool => write!(f, "bool"),
            ValueType::None => write!(f, "none"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Variable,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub ty: ValueType,
    /// Byte displacement from the frame base. Fixed at insertion.
    pub offset: i32,
}

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new variable. Returns its slot index, or `None` if the name
    /// is already declared (duplicate declaration is the caller's compile
    /// error).
    pub fn insert(&mut self, name: &str, ty: ValueType) -> Option<usize> {
        if self.find(name).is_some() {
            return None;
        }
        let slot = self.symbols.len();
        self.symbols.push(Symbol {
            name: name.to_string(),
            kind: SymbolKind::Variable,
            ty,
            offset: -4 * (slot as i32 + 1),
        });
        Some(slot)
    }

    /// Slot index of a declared name.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.symbols.iter().position(|s| s.name == name)
    }

    pub fn get(&self, slot: usize) -> Option<&Symbol> {
        self.symbols.get(slot)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_dense_and_in_declaration_order() {
        let mut t = SymbolTable::new();
        assert_eq!(t.insert("a", ValueType::Int4), Some(0));
        assert_eq!(t.insert("b", ValueType::Int4), Some(1));
        assert_eq!(t.insert("c", ValueType::Int4), Some(2));
        assert_eq!(t.find("b"), Some(1));
        assert_eq!(t.find("missing"), None);
    }

    #[test]
    fn offsets_follow_the_frame_layout() {
        let mut t = SymbolTable::new();
        t.insert("a", ValueType::Int4);
        t.insert("b", ValueType::Int4);
        assert_eq!(t.get(0).expect("slot 0").offset, -4);
        assert_eq!(t.get(1).expect("slot 1").offset, -8);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut t = SymbolTable::new();
        assert_eq!(t.insert("x", ValueType::Int4), Some(0));
        assert_eq!(t.insert("x", ValueType::Int4), None);
        assert_eq!(t.len(), 1);
    }
}
