use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use miette::{IntoDiagnostic, Result};

use crate::lex::FIRST_ADDRESS;
use crate::symbol::{SymbolKind, SymbolTable};

/// Write the `.ob` listing plus the conditional `.ent`/`.ext` listings next
/// to `path` (extension replaced).
pub fn write_all(
    path: &Path,
    symbols: &SymbolTable,
    code: &[u16],
    data: &[u16],
    ic: u16,
    dc: u16,
) -> Result<()> {
    write_object(&path.with_extension("ob"), code, data, ic, dc)?;
    if symbols.symbols().any(|sym| sym.kind == SymbolKind::Entry) {
        write_entries(&path.with_extension("ent"), symbols)?;
    }
    if !symbols.external_refs().is_empty() {
        write_externals(&path.with_extension("ext"), symbols)?;
    }
    Ok(())
}

/// `.ob`: header line `IC-100 DC`, then one `ADDR WORD` line per emitted
/// word. Addresses are 4-digit decimal, words 5-digit octal. Code words
/// come first, data words follow from the rebased base.
fn write_object(path: &Path, code: &[u16], data: &[u16], ic: u16, dc: u16) -> Result<()> {
    let mut out = BufWriter::new(File::create(path).into_diagnostic()?);
    writeln!(out, "{} {}", ic - FIRST_ADDRESS, dc).into_diagnostic()?;
    for (offs, word) in code.iter().enumerate() {
        writeln!(out, "{:04} {:05o}", FIRST_ADDRESS + offs as u16, word).into_diagnostic()?;
    }
    for (offs, word) in data.iter().enumerate() {
        writeln!(out, "{:04} {:05o}", ic + offs as u16, word).into_diagnostic()?;
    }
    Ok(())
}

/// `.ent`: one `NAME ADDR` line per entry symbol, in definition order.
fn write_entries(path: &Path, symbols: &SymbolTable) -> Result<()> {
    let mut out = BufWriter::new(File::create(path).into_diagnostic()?);
    for sym in symbols.symbols().filter(|sym| sym.kind == SymbolKind::Entry) {
        writeln!(out, "{} {:04}", sym.name, sym.address).into_diagnostic()?;
    }
    Ok(())
}

/// `.ext`: one `NAME ADDR` line per recorded reference, in the order the
/// references were made.
fn write_externals(path: &Path, symbols: &SymbolTable) -> Result<()> {
    let mut out = BufWriter::new(File::create(path).into_diagnostic()?);
    for (name, addrs) in symbols.external_refs().iter() {
        for addr in addrs {
            writeln!(out, "{} {:04}", name, addr).into_diagnostic()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    use std::fs;

    use tempfile::TempDir;

    use crate::preproc::MacroTable;

    #[test]
    fn object_layout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prog.am");
        let symbols = SymbolTable::new();
        // Two code words, one data word; IC ended at 102.
        write_all(&path, &symbols, &[0o2104, 0o124], &[5], 102, 1).unwrap();
        let ob = fs::read_to_string(dir.path().join("prog.ob")).unwrap();
        assert_eq!(ob, "2 1\n0100 02104\n0101 00124\n0102 00005\n");
        assert!(!dir.path().join("prog.ent").exists());
        assert!(!dir.path().join("prog.ext").exists());
    }

    #[test]
    fn entry_listing_in_definition_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prog.am");
        let macros = MacroTable::new();
        let mut symbols = SymbolTable::new();
        symbols.add("B", 104, SymbolKind::Code, &macros).unwrap();
        symbols.add("A", 100, SymbolKind::Code, &macros).unwrap();
        symbols.promote_entry("B").unwrap();
        symbols.promote_entry("A").unwrap();
        write_all(&path, &symbols, &[], &[], 100, 0).unwrap();
        let ent = fs::read_to_string(dir.path().join("prog.ent")).unwrap();
        assert_eq!(ent, "B 0104\nA 0100\n");
    }

    #[test]
    fn external_listing_per_reference() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prog.am");
        let macros = MacroTable::new();
        let mut symbols = SymbolTable::new();
        symbols.add("FOO", 0, SymbolKind::External, &macros).unwrap();
        symbols.record_external_ref("FOO", 101);
        symbols.record_external_ref("FOO", 105);
        write_all(&path, &symbols, &[], &[], 100, 0).unwrap();
        let ext = fs::read_to_string(dir.path().join("prog.ext")).unwrap();
        assert_eq!(ext, "FOO 0101\nFOO 0105\n");
    }

    #[test]
    fn declared_but_unreferenced_extern_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prog.am");
        let macros = MacroTable::new();
        let mut symbols = SymbolTable::new();
        symbols.add("FOO", 0, SymbolKind::External, &macros).unwrap();
        write_all(&path, &symbols, &[], &[], 100, 0).unwrap();
        assert!(!dir.path().join("prog.ext").exists());
    }
}
