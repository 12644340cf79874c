use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use fxhash::FxHashMap;
use miette::{IntoDiagnostic, Result};

use crate::error::{log_error, Category};
use crate::lex::{self, MAX_LINE_LEN};
use crate::ops;

/// Macro bodies keyed by name. Body lines are stored raw, without their
/// trailing newline, and written back verbatim on expansion.
#[derive(Default)]
pub struct MacroTable {
    macros: FxHashMap<String, Vec<String>>,
}

impl MacroTable {
    pub fn new() -> Self {
        MacroTable::default()
    }

    /// The first pass asks this when checking label names for collisions.
    pub fn contains(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    fn insert(&mut self, name: &str, body: Vec<String>) {
        self.macros.insert(name.to_string(), body);
    }

    fn get(&self, name: &str) -> Option<&[String]> {
        self.macros.get(name).map(Vec::as_slice)
    }

    /// Table pre-seeded with empty bodies. For testing purposes only.
    #[cfg(test)]
    pub fn with_names(names: &[&str]) -> Self {
        let mut table = MacroTable::new();
        for name in names.iter().copied() {
            table.insert(name, Vec::new());
        }
        table
    }
}

/// Result of pre-processing one source file.
pub struct Expansion {
    /// Path of the written `.am` file
    pub path: PathBuf,
    pub macros: MacroTable,
    /// False when a syntax error was logged. The `.am` file exists either
    /// way but must not be consumed when false.
    pub clean: bool,
}

/// Words that may not name a macro.
fn is_reserved_word(word: &str) -> bool {
    ops::is_mnemonic(word)
        || lex::is_register(word)
        || matches!(
            word,
            "macr" | "endmacr" | "data" | "string" | "entry" | "extern"
        )
}

/// Macro names follow label rules and may not shadow a reserved word.
fn is_valid_macro_name(name: &str) -> bool {
    lex::is_label(name) && !is_reserved_word(name)
}

/// Expand `<base>.as` into `<base>.am`, collecting macro definitions along
/// the way. Definition and terminator lines are dropped from the output; an
/// invocation line is replaced by the stored body.
pub fn run(base: &Path) -> Result<Expansion> {
    let src_path = base.with_extension("as");
    let out_path = base.with_extension("am");
    let src_name = src_path.display().to_string();

    let input = File::open(&src_path).into_diagnostic()?;
    let output = File::create(&out_path).into_diagnostic()?;
    let mut output = BufWriter::new(output);

    let mut macros = MacroTable::new();
    let mut clean = true;
    let mut line_number: u32 = 0;

    let mut lines = BufReader::new(input).lines();
    while let Some(line) = lines.next() {
        let line = line.into_diagnostic()?;
        line_number += 1;

        if line.len() > MAX_LINE_LEN {
            log_error(
                Category::Syntax,
                "Line exceeds maximum length",
                &src_name,
                Some(line_number),
            );
            clean = false;
            continue;
        }

        let trimmed = line.trim();

        // A definition opens here. Body lines are captured verbatim up to
        // the terminator and emitted only on invocation.
        let mut tokens = trimmed.split_whitespace();
        if tokens.next() == Some("macr") {
            match tokens.next() {
                Some(name) if is_valid_macro_name(name) => {
                    let mut body = Vec::new();
                    for body_line in lines.by_ref() {
                        let body_line = body_line.into_diagnostic()?;
                        line_number += 1;
                        if body_line.trim() == "endmacr" {
                            break;
                        }
                        body.push(body_line);
                    }
                    macros.insert(name, body);
                }
                _ => {
                    log_error(
                        Category::Macro,
                        "Invalid macro name",
                        &src_name,
                        Some(line_number),
                    );
                    clean = false;
                }
            }
            continue;
        }

        // Stray terminator outside any definition
        if trimmed == "endmacr" {
            continue;
        }

        if let Some(body) = macros.get(trimmed) {
            for body_line in body {
                writeln!(output, "{body_line}").into_diagnostic()?;
            }
            continue;
        }

        writeln!(output, "{line}").into_diagnostic()?;
    }

    output.flush().into_diagnostic()?;

    Ok(Expansion {
        path: out_path,
        macros,
        clean,
    })
}
