use std::cell::RefCell;
use std::fmt;

use colored::Colorize;

/// Hard cap on stored diagnostics. Entries logged past this point are
/// dropped without notice.
pub const MAX_ERRORS: usize = 100;

/// Broad classification of a diagnostic.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Category {
    Memory,
    FileInput,
    FileOutput,
    Syntax,
    Semantic,
    Macro,
    Overflow,
    Symbol,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Memory => "Memory",
            Category::FileInput => "File Input",
            Category::FileOutput => "File Output",
            Category::Syntax => "Syntax",
            Category::Semantic => "Semantic",
            Category::Macro => "Macro",
            Category::Overflow => "Overflow",
            Category::Symbol => "Symbol",
        };
        f.write_str(name)
    }
}

/// A single logged diagnostic.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ErrorEntry {
    pub category: Category,
    pub message: String,
    pub filename: String,
    /// Absent for errors without a source location
    pub line: Option<u32>,
}

thread_local! {
    static ERROR_LOG: RefCell<Vec<ErrorEntry>> = const { RefCell::new(Vec::new()) };
}

/// Access to the error log via closure
fn with_error_log<R, F>(f: F) -> R
where
    F: FnOnce(&mut Vec<ErrorEntry>) -> R,
{
    ERROR_LOG.with_borrow_mut(f)
}

/// Record a diagnostic. Never fails; past [`MAX_ERRORS`] the entry is lost.
pub fn log_error(
    category: Category,
    message: impl Into<String>,
    filename: impl Into<String>,
    line: Option<u32>,
) {
    with_error_log(|log| {
        if log.len() < MAX_ERRORS {
            log.push(ErrorEntry {
                category,
                message: message.into(),
                filename: filename.into(),
                line,
            });
        }
    });
}

/// Number of diagnostics recorded so far. Passes compare counts taken
/// before and after to tell whether they ran clean.
pub fn error_count() -> usize {
    with_error_log(|log| log.len())
}

/// Clear the log. Only meaningful between independent runs (and in tests).
pub fn reset_errors() {
    with_error_log(|log| log.clear());
}

/// Print every stored diagnostic, numbered, in insertion order. Prints
/// nothing when the log is empty.
pub fn print_summary() {
    with_error_log(|log| {
        if log.is_empty() {
            return;
        }
        println!("\n{}", "Error Summary:".red().bold());
        for (num, entry) in log.iter().enumerate() {
            match entry.line {
                Some(line) => println!(
                    "{}. [{}] {} (File: {}, Line: {})",
                    num + 1,
                    entry.category,
                    entry.message,
                    entry.filename,
                    line
                ),
                None => println!(
                    "{}. [{}] {} (File: {})",
                    num + 1,
                    entry.category,
                    entry.message,
                    entry.filename
                ),
            }
        }
    });
}
