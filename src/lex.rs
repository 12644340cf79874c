use lazy_static::lazy_static;
use regex::Regex;

use crate::ops;

/// Longest accepted source line, excluding the newline.
pub const MAX_LINE_LEN: usize = 80;
/// Longest accepted label or macro name.
pub const MAX_LABEL_LEN: usize = 31;
/// Load address of the first instruction word.
pub const FIRST_ADDRESS: u16 = 100;

lazy_static! {
    /// Optional `#`, optional sign, then decimal digits.
    static ref NUMBER: Regex = Regex::new(r"^#?[+-]?[0-9]+$").unwrap();
    /// Letter first, alphanumerics after.
    static ref NAME: Regex = Regex::new(r"^[a-zA-Z][a-zA-Z0-9]*$").unwrap();
}

/// Truncate the line at the first `;`.
pub fn strip_comment(line: &str) -> &str {
    match line.find(';') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

/// Collapse whitespace runs to a single space and delete spaces adjacent to
/// commas. The result carries no leading or trailing whitespace.
pub fn collapse_spaces(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut in_word = false;
    for c in line.chars() {
        if c.is_whitespace() {
            if in_word {
                out.push(' ');
                in_word = false;
            }
        } else if c == ',' {
            if out.ends_with(' ') {
                out.pop();
            }
            out.push(',');
            in_word = false;
        } else {
            out.push(c);
            in_word = true;
        }
    }
    if out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Comment strip, whitespace collapse and trim in one step. Both passes run
/// every source line through this before looking at it.
pub fn normalize(line: &str) -> String {
    collapse_spaces(strip_comment(line))
}

/// Split an optional leading `NAME:` label from the rest of a normalized
/// line. The colon is stripped from the returned label.
pub fn split_label(line: &str) -> (Option<&str>, &str) {
    let (first, rest) = match line.split_once(' ') {
        Some((first, rest)) => (first, rest),
        None => (line, ""),
    };
    match first.strip_suffix(':') {
        Some(name) => (Some(name), rest),
        None => (None, line),
    }
}

/// Split the operation token from its operand remainder.
pub fn split_operation(line: &str) -> (&str, &str) {
    match line.split_once(' ') {
        Some((operation, operands)) => (operation, operands),
        None => (line, ""),
    }
}

/// Exactly `r0`..`r7`.
pub fn is_register(token: &str) -> bool {
    let bytes = token.as_bytes();
    bytes.len() == 2 && bytes[0] == b'r' && bytes[1].is_ascii_digit() && bytes[1] <= b'7'
}

/// Valid label: at most 31 chars of letter-then-alphanumerics, and not a
/// register or mnemonic name.
pub fn is_label(token: &str) -> bool {
    token.len() <= MAX_LABEL_LEN
        && NAME.is_match(token)
        && !is_register(token)
        && !ops::is_mnemonic(token)
}

/// Numeric operand shape, with or without the `#` immediate marker.
pub fn is_number(token: &str) -> bool {
    NUMBER.is_match(token)
}

/// Assembler directives.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Directive {
    Data,
    String,
    Entry,
    Extern,
}

impl Directive {
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            ".data" => Some(Directive::Data),
            ".string" => Some(Directive::String),
            ".entry" => Some(Directive::Entry),
            ".extern" => Some(Directive::Extern),
            _ => None,
        }
    }
}
