//! Addressing modes of an operand and the operand itself. Every operand of an instruction is a
//! 32-bit value together with two mode bits, one saying "go through memory" and one saying "go
//! through a register". The four combinations are the four addressing modes.

use std::fmt::{Display, Formatter};

use crate::bytecode::Word;

/// Marks an operand as living in (or pointing into) the data stack.
pub const MEMORY_FLAG: char = '*';
/// Marks an operand as a register index.
pub const REGISTER_FLAG: char = 'x';

pub fn is_flag_char(c: char) -> bool {
  c == MEMORY_FLAG || c == REGISTER_FLAG
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum AddressingMode {
  /// The operand value is the literal.
  Immediate,
  /// The operand value is the index of a register.
  Register,
  /// The operand value is a byte offset into the data stack.
  Memory,
  /// The operand value is the index of a register holding a byte offset into the data stack.
  Indirect
}

impl AddressingMode {

  pub fn from_bits(memory: bool, register: bool) -> AddressingMode {
    match (memory, register) {
      (false, false) => AddressingMode::Immediate,
      (false, true ) => AddressingMode::Register,
      (true,  false) => AddressingMode::Memory,
      (true,  true ) => AddressingMode::Indirect
    }
  }

  pub fn is_memory(&self) -> bool {
    matches!(self, AddressingMode::Memory | AddressingMode::Indirect)
  }

  pub fn is_register(&self) -> bool {
    matches!(self, AddressingMode::Register | AddressingMode::Indirect)
  }

  /// Only immediates cannot be the target of a write.
  pub fn is_addressable(&self) -> bool {
    *self != AddressingMode::Immediate
  }

  /// Parses an assembly flag token. The markers may come in either order, but each at most
  /// once.
  pub fn from_flag(flag: &str) -> Option<AddressingMode> {
    let mut memory   = false;
    let mut register = false;

    if flag.chars().count() > 2 {
      return None;
    }
    for c in flag.chars() {
      match c {
        MEMORY_FLAG   if !memory   => memory   = true,
        REGISTER_FLAG if !register => register = true,
        _ => return None
      }
    }

    Some(AddressingMode::from_bits(memory, register))
  }

  /// The canonical flag text, memory marker first.
  pub fn flag(&self) -> &'static str {
    match self {
      AddressingMode::Immediate => "",
      AddressingMode::Register  => "x",
      AddressingMode::Memory    => "*",
      AddressingMode::Indirect  => "*x"
    }
  }
}

impl Default for AddressingMode {
  fn default() -> Self {
    AddressingMode::Immediate
  }
}

impl Display for AddressingMode {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      AddressingMode::Immediate => "immediate",
      AddressingMode::Register  => "register",
      AddressingMode::Memory    => "memory",
      AddressingMode::Indirect  => "register-indirect"
    };
    write!(f, "{}", name)
  }
}

/// One operand of a `TextInstruction`.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct Operand {
  pub mode  : AddressingMode,
  pub value : Word
}

impl Operand {
  pub fn new(mode: AddressingMode, value: Word) -> Operand {
    Operand { mode, value }
  }

  pub fn immediate(value: Word) -> Operand {
    Operand::new(AddressingMode::Immediate, value)
  }

  pub fn register(index: Word) -> Operand {
    Operand::new(AddressingMode::Register, index)
  }

  pub fn memory(offset: Word) -> Operand {
    Operand::new(AddressingMode::Memory, offset)
  }

  pub fn indirect(index: Word) -> Operand {
    Operand::new(AddressingMode::Indirect, index)
  }
}

/// Assembly syntax: the flag immediately followed by the value in hex, e.g. `*x1f`.
impl Display for Operand {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}{:x}", self.mode.flag(), self.value)
  }
}
