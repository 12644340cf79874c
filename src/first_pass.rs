use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use miette::{IntoDiagnostic, Result};

use crate::encode;
use crate::error::{log_error, Category};
use crate::lex::{self, Directive, FIRST_ADDRESS, MAX_LINE_LEN};
use crate::ops;
use crate::preproc::MacroTable;
use crate::symbol::{SymbolError, SymbolKind, SymbolTable};

/// Sizing results handed to the second pass.
pub struct FirstPass {
    pub symbols: SymbolTable,
    /// Final instruction counter; data addresses start here
    pub ic: u16,
    /// Total data words
    pub dc: u16,
    /// False when any line logged an error
    pub clean: bool,
}

/// Build the symbol table and size every statement of the expanded source.
/// Every recoverable problem is logged to the sink and the scan continues;
/// only failure to read the file aborts.
pub fn run(path: &Path, macros: &MacroTable) -> Result<FirstPass> {
    let file = File::open(path).into_diagnostic()?;
    let filename = path.display().to_string();

    let mut symbols = SymbolTable::new();
    let mut ic: u16 = FIRST_ADDRESS;
    let mut dc: u16 = 0;
    let mut clean = true;

    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.into_diagnostic()?;
        let line_number = idx as u32 + 1;

        if line.len() > MAX_LINE_LEN {
            log_error(
                Category::Syntax,
                "Line exceeds maximum length",
                &filename,
                Some(line_number),
            );
            clean = false;
            continue;
        }

        let line = lex::normalize(&line);
        if line.is_empty() {
            continue;
        }

        let (label, rest) = lex::split_label(&line);
        if let Some(label) = label {
            if !lex::is_label(label) {
                log_error(Category::Syntax, "Illegal label", &filename, Some(line_number));
                clean = false;
                continue;
            }
        }

        let (operation, operands) = lex::split_operation(rest);

        if let Some(directive) = Directive::parse(operation) {
            match directive {
                Directive::Data => {
                    if let Some(label) = label {
                        clean &=
                            add_symbol(&mut symbols, label, dc, SymbolKind::Data, macros, &filename, line_number);
                    }
                    match data_value_count(operands) {
                        Some(count) => dc += count,
                        None => {
                            log_error(
                                Category::Syntax,
                                "Invalid .data directive",
                                &filename,
                                Some(line_number),
                            );
                            clean = false;
                        }
                    }
                }
                Directive::String => {
                    if let Some(label) = label {
                        clean &=
                            add_symbol(&mut symbols, label, dc, SymbolKind::Data, macros, &filename, line_number);
                    }
                    if validate_string(operands) {
                        // Characters between the quotes, plus the terminator
                        dc += operands.len() as u16 - 2 + 1;
                    } else {
                        log_error(
                            Category::Syntax,
                            "Invalid .string directive",
                            &filename,
                            Some(line_number),
                        );
                        clean = false;
                    }
                }
                Directive::Entry => {
                    // Resolved by the second pass; only the flag is set here.
                    symbols.has_entries = true;
                }
                Directive::Extern => {
                    if operands.is_empty() {
                        log_error(
                            Category::Syntax,
                            "Missing operand for .extern directive",
                            &filename,
                            Some(line_number),
                        );
                        clean = false;
                    } else {
                        for name in operands.split(',').map(str::trim) {
                            clean &= add_symbol(
                                &mut symbols,
                                name,
                                0,
                                SymbolKind::External,
                                macros,
                                &filename,
                                line_number,
                            );
                        }
                        symbols.has_externs = true;
                    }
                }
            }
        } else if let Some(entry) = ops::by_mnemonic(operation) {
            match encode::instruction_length(entry.operands, operands) {
                Some(length) => {
                    if let Some(label) = label {
                        clean &=
                            add_symbol(&mut symbols, label, ic, SymbolKind::Code, macros, &filename, line_number);
                    }
                    ic += length;
                }
                None => {
                    log_error(
                        Category::Syntax,
                        "Invalid instruction format",
                        &filename,
                        Some(line_number),
                    );
                    clean = false;
                }
            }
        } else {
            log_error(Category::Syntax, "Unknown operation", &filename, Some(line_number));
            clean = false;
        }
    }

    // Data follows code in the combined address space.
    symbols.rebase_data(ic);

    Ok(FirstPass {
        symbols,
        ic,
        dc,
        clean,
    })
}

fn add_symbol(
    symbols: &mut SymbolTable,
    name: &str,
    address: u16,
    kind: SymbolKind,
    macros: &MacroTable,
    filename: &str,
    line_number: u32,
) -> bool {
    match symbols.add(name, address, kind, macros) {
        Ok(()) => true,
        Err(SymbolError::Duplicate) => {
            log_error(
                Category::Symbol,
                "Duplicate symbol definition",
                filename,
                Some(line_number),
            );
            false
        }
        Err(SymbolError::MacroCollision) => {
            log_error(
                Category::Symbol,
                "Symbol name conflicts with macro name",
                filename,
                Some(line_number),
            );
            false
        }
    }
}

/// Count `.data` operands. Every one must be a plain signed decimal
/// integer; an empty list or a malformed value rejects the line.
fn data_value_count(operands: &str) -> Option<u16> {
    if operands.is_empty() {
        return None;
    }
    let mut count = 0;
    for value in operands.split(',') {
        let value = value.trim();
        if value.starts_with('#') || !lex::is_number(value) {
            return None;
        }
        count += 1;
    }
    Some(count)
}

/// Double-quoted literal with no interior quote.
fn validate_string(operands: &str) -> bool {
    operands.len() >= 2
        && operands.starts_with('"')
        && operands.ends_with('"')
        && !operands[1..operands.len() - 1].contains('"')
}

#[cfg(test)]
mod test {
    use super::*;

    use std::fs;
    use std::path::PathBuf;

    use tempfile::TempDir;

    fn pass(source: &str) -> (TempDir, FirstPass) {
        let dir = TempDir::new().unwrap();
        let path: PathBuf = dir.path().join("prog.am");
        fs::write(&path, source).unwrap();
        let result = run(&path, &MacroTable::new()).unwrap();
        (dir, result)
    }

    #[test]
    fn sizes_code_and_data() {
        let (_dir, fp) = pass(
            "MAIN: mov r1, r2\nLOOP: inc r3\n.data 1, 2, 3\nS: .string \"hi\"\nstop\n",
        );
        assert!(fp.clean);
        // mov packs registers (2), inc (2), stop (1)
        assert_eq!(fp.ic, 105);
        // three integers + two chars + terminator
        assert_eq!(fp.dc, 6);
        assert_eq!(fp.symbols.find("MAIN").unwrap().address, 100);
        assert_eq!(fp.symbols.find("LOOP").unwrap().address, 102);
    }

    #[test]
    fn data_symbols_rebased() {
        let (_dir, fp) = pass("MAIN: mov r1, r2\nVALS: .data 5, 7\nstop\n");
        assert!(fp.clean);
        assert_eq!(fp.ic, 103);
        let vals = fp.symbols.find("VALS").unwrap();
        assert_eq!(vals.kind, SymbolKind::Data);
        assert_eq!(vals.address, 103);
    }

    #[test]
    fn extern_list() {
        let (_dir, fp) = pass(".extern FOO, BAR\njmp FOO\nstop\n");
        assert!(fp.clean);
        assert_eq!(fp.symbols.find("FOO").unwrap().kind, SymbolKind::External);
        assert_eq!(fp.symbols.find("BAR").unwrap().address, 0);
        assert!(fp.symbols.has_externs);
    }

    #[test]
    fn extern_needs_operands() {
        let (_dir, fp) = pass(".extern\n");
        assert!(!fp.clean);
    }

    #[test]
    fn duplicate_symbol_marks_dirty() {
        let (_dir, fp) = pass("A: .data 1\nA: .data 2\n");
        assert!(!fp.clean);
        // The first definition stands; counting continues past the failure.
        assert_eq!(fp.symbols.find("A").unwrap().address, 100);
        assert_eq!(fp.dc, 2);
    }

    #[test]
    fn illegal_label_rejected() {
        let (_dir, fp) = pass("1bad: .data 1\n");
        assert!(!fp.clean);

        let (_dir, fp) = pass("r3: .data 1\n");
        assert!(!fp.clean);
    }

    #[test]
    fn unknown_operation_rejected() {
        let (_dir, fp) = pass("frobnicate r1\n");
        assert!(!fp.clean);
    }

    #[test]
    fn operand_count_mismatch_rejected() {
        let (_dir, fp) = pass("mov r1\n");
        assert!(!fp.clean);
        let (_dir, fp) = pass("stop r1\n");
        assert!(!fp.clean);
    }

    #[test]
    fn entry_only_sets_flag() {
        let (_dir, fp) = pass("LOOP: inc r3\n.entry LOOP\nstop\n");
        assert!(fp.clean);
        assert!(fp.symbols.has_entries);
        // Promotion itself is the second pass's job.
        assert_eq!(fp.symbols.find("LOOP").unwrap().kind, SymbolKind::Code);
    }

    #[test]
    fn data_values() {
        assert_eq!(data_value_count("1"), Some(1));
        assert_eq!(data_value_count("1,2,3"), Some(3));
        assert_eq!(data_value_count("-4, +9"), Some(2));
        assert_eq!(data_value_count(""), None);
        assert_eq!(data_value_count("1,,2"), None);
        assert_eq!(data_value_count("1,x"), None);
        assert_eq!(data_value_count("#1"), None);
    }

    #[test]
    fn string_literals() {
        assert!(validate_string("\"hi\""));
        assert!(validate_string("\"\""));
        assert!(!validate_string("\"unterminated"));
        assert!(!validate_string("bare"));
        assert!(!validate_string("\"in\"side\""));
        assert!(!validate_string("\""));
    }
}
