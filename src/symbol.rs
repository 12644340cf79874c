use std::str::FromStr;

use fxhash::FxHashMap;

use crate::preproc::MacroTable;

/// Most references to a single external name that the index will keep;
/// anything past this is dropped.
pub const MAX_EXTERNAL_REFS: usize = 100;

/// Represents the CPU registers.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Register {
    R0 = 0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
}

impl Register {
    pub fn index(self) -> u16 {
        self as u16
    }
}

impl FromStr for Register {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "r0" => Ok(Register::R0),
            "r1" => Ok(Register::R1),
            "r2" => Ok(Register::R2),
            "r3" => Ok(Register::R3),
            "r4" => Ok(Register::R4),
            "r5" => Ok(Register::R5),
            "r6" => Ok(Register::R6),
            "r7" => Ok(Register::R7),
            _ => Err(()),
        }
    }
}

/// What a name stands for in the combined address space.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SymbolKind {
    /// Instruction label
    Code,
    /// `.data` or `.string` label
    Data,
    /// Promoted from Code or Data by `.entry`
    Entry,
    /// Declared by `.extern`; address stays 0
    External,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Symbol {
    pub name: String,
    pub address: u16,
    pub kind: SymbolKind,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SymbolError {
    Duplicate,
    MacroCollision,
}

/// Why `.entry` resolution failed.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EntryError {
    NotFound,
    IsExternal,
}

/// Labels keyed by unique name. Insertion order is kept because it drives
/// the `.ent` listing.
#[derive(Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    index: FxHashMap<String, usize>,
    externals: ExternalRefs,
    pub has_entries: bool,
    pub has_externs: bool,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    /// Insert a new symbol. Duplicate names and names shadowing a macro are
    /// rejected.
    pub fn add(
        &mut self,
        name: &str,
        address: u16,
        kind: SymbolKind,
        macros: &MacroTable,
    ) -> Result<(), SymbolError> {
        if self.index.contains_key(name) {
            return Err(SymbolError::Duplicate);
        }
        if macros.contains(name) {
            return Err(SymbolError::MacroCollision);
        }
        match kind {
            SymbolKind::Entry => self.has_entries = true,
            SymbolKind::External => self.has_externs = true,
            _ => {}
        }
        self.index.insert(name.to_string(), self.symbols.len());
        self.symbols.push(Symbol {
            name: name.to_string(),
            address,
            kind,
        });
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<&Symbol> {
        self.index.get(name).map(|&idx| &self.symbols[idx])
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        let idx = *self.index.get(name)?;
        Some(&mut self.symbols[idx])
    }

    /// Promote an existing symbol to Entry. Externals cannot be entries.
    pub fn promote_entry(&mut self, name: &str) -> Result<(), EntryError> {
        match self.find_mut(name) {
            None => Err(EntryError::NotFound),
            Some(sym) if sym.kind == SymbolKind::External => Err(EntryError::IsExternal),
            Some(sym) => {
                sym.kind = SymbolKind::Entry;
                self.has_entries = true;
                Ok(())
            }
        }
    }

    /// Shift every data symbol up by the final instruction counter so data
    /// addresses follow the code image.
    pub fn rebase_data(&mut self, ic: u16) {
        for sym in &mut self.symbols {
            if sym.kind == SymbolKind::Data {
                sym.address += ic;
            }
        }
    }

    /// Symbols in insertion order.
    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    pub fn record_external_ref(&mut self, name: &str, address: u16) {
        self.externals.add(name, address);
    }

    pub fn external_refs(&self) -> &ExternalRefs {
        &self.externals
    }
}

/// Addresses of every operand word that references each external name, in
/// first-reference order.
#[derive(Default)]
pub struct ExternalRefs {
    refs: Vec<(String, Vec<u16>)>,
}

impl ExternalRefs {
    /// Append a reference, creating the name entry on first sight.
    /// References past [`MAX_EXTERNAL_REFS`] per name are dropped.
    pub fn add(&mut self, name: &str, address: u16) {
        match self.refs.iter_mut().find(|(n, _)| n == name) {
            Some((_, addrs)) => {
                if addrs.len() < MAX_EXTERNAL_REFS {
                    addrs.push(address);
                }
            }
            None => self.refs.push((name.to_string(), vec![address])),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u16])> {
        self.refs.iter().map(|(name, addrs)| (name.as_str(), addrs.as_slice()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn add_and_find() {
        let macros = MacroTable::new();
        let mut table = SymbolTable::new();
        table.add("MAIN", 100, SymbolKind::Code, &macros).unwrap();
        table.add("VALS", 0, SymbolKind::Data, &macros).unwrap();
        assert_eq!(table.find("MAIN").unwrap().address, 100);
        assert_eq!(table.find("VALS").unwrap().kind, SymbolKind::Data);
        assert!(table.find("OTHER").is_none());
    }

    #[test]
    fn duplicates_rejected() {
        let macros = MacroTable::new();
        let mut table = SymbolTable::new();
        table.add("A", 0, SymbolKind::Data, &macros).unwrap();
        assert_eq!(
            table.add("A", 5, SymbolKind::Code, &macros),
            Err(SymbolError::Duplicate)
        );
    }

    #[test]
    fn macro_names_shadow_labels() {
        let macros = MacroTable::with_names(&["twice"]);
        let mut table = SymbolTable::new();
        assert_eq!(
            table.add("twice", 100, SymbolKind::Code, &macros),
            Err(SymbolError::MacroCollision)
        );
        assert!(table.find("twice").is_none());
    }

    #[test]
    fn extern_sets_flag() {
        let macros = MacroTable::new();
        let mut table = SymbolTable::new();
        table.add("FOO", 0, SymbolKind::External, &macros).unwrap();
        assert!(table.has_externs);
        assert!(!table.has_entries);
    }

    #[test]
    fn rebase_moves_only_data() {
        let macros = MacroTable::new();
        let mut table = SymbolTable::new();
        table.add("MAIN", 100, SymbolKind::Code, &macros).unwrap();
        table.add("VALS", 2, SymbolKind::Data, &macros).unwrap();
        table.rebase_data(105);
        assert_eq!(table.find("MAIN").unwrap().address, 100);
        assert_eq!(table.find("VALS").unwrap().address, 107);
    }

    #[test]
    fn entry_promotion() {
        let macros = MacroTable::new();
        let mut table = SymbolTable::new();
        table.add("LOOP", 101, SymbolKind::Code, &macros).unwrap();
        table.add("FOO", 0, SymbolKind::External, &macros).unwrap();
        assert_eq!(table.promote_entry("LOOP"), Ok(()));
        assert_eq!(table.find("LOOP").unwrap().kind, SymbolKind::Entry);
        assert!(table.has_entries);
        assert_eq!(table.promote_entry("FOO"), Err(EntryError::IsExternal));
        assert_eq!(table.promote_entry("NONE"), Err(EntryError::NotFound));
    }

    #[test]
    fn external_refs_ordered_and_capped() {
        let mut refs = ExternalRefs::default();
        refs.add("B", 101);
        refs.add("A", 104);
        refs.add("B", 109);
        let collected: Vec<_> = refs.iter().collect();
        assert_eq!(collected[0], ("B", &[101u16, 109][..]));
        assert_eq!(collected[1], ("A", &[104u16][..]));

        for addr in 0..MAX_EXTERNAL_REFS as u16 + 10 {
            refs.add("A", addr);
        }
        let (_, addrs) = refs.iter().nth(1).unwrap();
        assert_eq!(addrs.len(), MAX_EXTERNAL_REFS);
    }

    #[test]
    fn register_from_str() {
        assert_eq!("r0".parse(), Ok(Register::R0));
        assert_eq!("r7".parse(), Ok(Register::R7));
        assert_eq!("r8".parse::<Register>(), Err(()));
        assert_eq!("R1".parse::<Register>(), Err(()));
        assert_eq!(Register::R5.index(), 5);
    }
}
