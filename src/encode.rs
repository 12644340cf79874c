use std::str::FromStr;

use crate::lex;
use crate::symbol::{Register, SymbolKind, SymbolTable};

/// Output words are 15 bits wide.
pub const WORD_MASK: u16 = 0x7FFF;

/// Relocation tag occupying the low three bits of every operand word.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Are {
    External = 1,
    Relocatable = 2,
    Absolute = 4,
}

/// A single decoded operand. Absence is modelled as `Option::None` by the
/// caller, not as a sentinel mode.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Operand {
    /// `#N`
    Immediate(i16),
    /// Bare identifier, resolved against the symbol table when encoded
    Direct(String),
    /// `*rK`
    RegIndirect(Register),
    /// `rK`
    RegDirect(Register),
}

impl Operand {
    /// Classify one operand. Empty text means no operand. Anything that is
    /// not an immediate or register shape falls through to Direct and gets
    /// checked against the symbol table at encoding time.
    pub fn parse(text: &str) -> Option<Operand> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        if text.starts_with('#') && lex::is_number(text) {
            if let Ok(val) = text[1..].parse::<i32>() {
                return Some(Operand::Immediate(val as i16));
            }
        }
        if let Ok(reg) = Register::from_str(text) {
            return Some(Operand::RegDirect(reg));
        }
        if let Some(rest) = text.strip_prefix('*') {
            if let Ok(reg) = Register::from_str(rest) {
                return Some(Operand::RegIndirect(reg));
            }
        }
        Some(Operand::Direct(text.to_string()))
    }

    /// Addressing-mode number feeding the one-hot fields of the first word.
    pub fn mode(&self) -> u16 {
        match self {
            Operand::Immediate(_) => 0,
            Operand::Direct(_) => 1,
            Operand::RegIndirect(_) => 2,
            Operand::RegDirect(_) => 3,
        }
    }

    /// Register operands pair up into one shared extra word.
    pub fn is_register(&self) -> bool {
        matches!(self, Operand::RegIndirect(_) | Operand::RegDirect(_))
    }

    fn register_bits(&self) -> u16 {
        match self {
            Operand::RegIndirect(reg) | Operand::RegDirect(reg) => reg.index(),
            _ => 0,
        }
    }
}

/// Which slot an operand word encodes; decides the payload shift for
/// register operands.
#[derive(Clone, Copy)]
enum Slot {
    Source,
    Target,
}

/// A decoded instruction line, ready for word emission.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Instruction {
    pub opcode: u16,
    pub source: Option<Operand>,
    pub target: Option<Operand>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum EncodeError {
    /// A Direct operand named a symbol the first pass never saw
    UnknownSymbol(String),
}

impl Instruction {
    /// A sole operand always encodes in the target slot.
    pub fn new(opcode: u16, source: Option<Operand>, target: Option<Operand>) -> Self {
        match (source, target) {
            (Some(operand), None) => Instruction {
                opcode,
                source: None,
                target: Some(operand),
            },
            (source, target) => Instruction {
                opcode,
                source,
                target,
            },
        }
    }

    /// Split an operand field on its first comma into source and target.
    pub fn parse_operands(text: &str) -> (Option<Operand>, Option<Operand>) {
        match text.split_once(',') {
            Some((source, target)) => (Operand::parse(source), Operand::parse(target)),
            None => (Operand::parse(text), None),
        }
    }

    /// Number of words the instruction occupies in the code image.
    pub fn len(&self) -> u16 {
        if self.packs_registers() {
            return 2;
        }
        1 + u16::from(self.source.is_some()) + u16::from(self.target.is_some())
    }

    fn packs_registers(&self) -> bool {
        matches!(
            (&self.source, &self.target),
            (Some(src), Some(tgt)) if src.is_register() && tgt.is_register()
        )
    }

    /// Encode into 1-3 words. `address` is where the first word will live;
    /// an external reference is recorded at the address of the exact word
    /// that holds it.
    pub fn encode(&self, symbols: &mut SymbolTable, address: u16) -> Result<Vec<u16>, EncodeError> {
        let mut words = Vec::with_capacity(3);

        let mut first = (self.opcode & 0xF) << 11;
        if let Some(src) = &self.source {
            first |= 1 << (7 + src.mode());
        }
        if let Some(tgt) = &self.target {
            first |= 1 << (3 + tgt.mode());
        }
        first |= Are::Absolute as u16;
        words.push(first & WORD_MASK);

        if self.packs_registers() {
            let src = self.source.as_ref().map_or(0, Operand::register_bits);
            let tgt = self.target.as_ref().map_or(0, Operand::register_bits);
            words.push((src & 0x7) << 6 | (tgt & 0x7) << 3 | Are::Absolute as u16);
        } else {
            if let Some(src) = &self.source {
                let word =
                    operand_word(src, Slot::Source, symbols, address + words.len() as u16)?;
                words.push(word);
            }
            if let Some(tgt) = &self.target {
                let word =
                    operand_word(tgt, Slot::Target, symbols, address + words.len() as u16)?;
                words.push(word);
            }
        }

        Ok(words)
    }
}

/// Word length of an instruction line, or None when the operand shape does
/// not match the catalog's expected count. Used by the first pass, which
/// sizes lines without encoding them.
pub fn instruction_length(expected_operands: u8, operands: &str) -> Option<u16> {
    let (source, target) = Instruction::parse_operands(operands);
    // A comma promises two operands.
    if operands.contains(',') && (source.is_none() || target.is_none()) {
        return None;
    }
    let count = u8::from(source.is_some()) + u8::from(target.is_some());
    if count != expected_operands {
        return None;
    }
    Some(Instruction::new(0, source, target).len())
}

fn operand_word(
    operand: &Operand,
    slot: Slot,
    symbols: &mut SymbolTable,
    address: u16,
) -> Result<u16, EncodeError> {
    let word = match operand {
        // Signed payload masked to the 12 payload bits, no range check
        Operand::Immediate(val) => ((*val as u16) & 0xFFF) << 3 | Are::Absolute as u16,
        Operand::Direct(name) => {
            let Some(sym) = symbols.find(name) else {
                return Err(EncodeError::UnknownSymbol(name.clone()));
            };
            let (kind, sym_address) = (sym.kind, sym.address);
            if kind == SymbolKind::External {
                symbols.record_external_ref(name, address);
                Are::External as u16
            } else {
                (sym_address & 0xFFF) << 3 | Are::Relocatable as u16
            }
        }
        Operand::RegIndirect(_) | Operand::RegDirect(_) => {
            let shift = match slot {
                Slot::Source => 6,
                Slot::Target => 3,
            };
            (operand.register_bits() & 0x7) << shift | Are::Absolute as u16
        }
    };
    Ok(word)
}
