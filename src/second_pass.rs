use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use miette::{IntoDiagnostic, Result};

use crate::encode::{EncodeError, Instruction, WORD_MASK};
use crate::error::{log_error, Category};
use crate::lex::{self, Directive, FIRST_ADDRESS};
use crate::ops;
use crate::output;
use crate::symbol::{EntryError, SymbolTable};

/// Re-scan the expanded source, resolve symbols, encode every instruction
/// and emit the output files. The code and data streams are built in memory
/// and written in one step. Returns false when errors were logged; nothing
/// is written in that case.
pub fn run(path: &Path, symbols: &mut SymbolTable, ic: u16, dc: u16) -> Result<bool> {
    let file = File::open(path).into_diagnostic()?;
    let filename = path.display().to_string();

    let mut code: Vec<u16> = Vec::new();
    let mut data: Vec<u16> = Vec::new();
    let mut clean = true;

    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.into_diagnostic()?;
        let line_number = idx as u32 + 1;

        let line = lex::normalize(&line);
        if line.is_empty() {
            continue;
        }

        // Labels were consumed by the first pass.
        let (_, rest) = lex::split_label(&line);
        let (operation, operands) = lex::split_operation(rest);

        match Directive::parse(operation) {
            Some(Directive::Data) => {
                for value in operands.split(',') {
                    match value.trim().parse::<i64>() {
                        Ok(value) => data.push(value as u16 & WORD_MASK),
                        Err(_) => {
                            log_error(
                                Category::Syntax,
                                "Invalid .data value",
                                &filename,
                                Some(line_number),
                            );
                            clean = false;
                        }
                    }
                }
            }
            Some(Directive::String) => {
                if operands.len() >= 2 {
                    for &byte in &operands.as_bytes()[1..operands.len() - 1] {
                        data.push(u16::from(byte));
                    }
                    data.push(0);
                }
            }
            Some(Directive::Entry) => match operands.split_whitespace().next() {
                None => {
                    log_error(
                        Category::Syntax,
                        "Missing operand for .entry directive",
                        &filename,
                        Some(line_number),
                    );
                    clean = false;
                }
                Some(name) => match symbols.promote_entry(name) {
                    Ok(()) => {}
                    Err(EntryError::NotFound) => {
                        log_error(
                            Category::Symbol,
                            "Entry symbol not found in symbol table",
                            &filename,
                            Some(line_number),
                        );
                        clean = false;
                    }
                    Err(EntryError::IsExternal) => {
                        log_error(
                            Category::Symbol,
                            "Symbol declared as both .extern and .entry",
                            &filename,
                            Some(line_number),
                        );
                        clean = false;
                    }
                },
            },
            // Externals were collected by the first pass.
            Some(Directive::Extern) => {}
            None => {
                if let Some(entry) = ops::by_mnemonic(operation) {
                    let (source, target) = Instruction::parse_operands(operands);
                    let inst = Instruction::new(entry.opcode, source, target);
                    let address = FIRST_ADDRESS + code.len() as u16;
                    match inst.encode(symbols, address) {
                        Ok(words) => code.extend(words),
                        Err(EncodeError::UnknownSymbol(_)) => {
                            log_error(
                                Category::Syntax,
                                "Failed to encode instruction",
                                &filename,
                                Some(line_number),
                            );
                            clean = false;
                        }
                    }
                }
            }
        }
    }

    if !clean {
        return Ok(false);
    }

    if let Err(report) = output::write_all(path, symbols, &code, &data, ic, dc) {
        log_error(Category::FileOutput, report.to_string(), &filename, None);
        return Ok(false);
    }
    Ok(true)
}
