/*!
  Disassembly runs the codec in reverse: a binary program is split into records and each record
  is decoded back into a `TextInstruction`. A `Listing` then prints instructions as assembly that
  the assembler accepts again, so `assemble(listing)` reproduces the original bytes.
*/

use std::fmt::{Display, Formatter};

use crate::address::AddressingMode;
use crate::bytecode::{
  decode_program,
  try_decode_instruction,
  InstructionSet,
  TextInstruction,
  Word,
  INSTRUCTION_WIDTH
};
use crate::error::CodecError;
use crate::symboltable::SymbolTable;

/// Decodes a whole program. Instruction addresses are the record offsets.
pub fn disassemble(bytes: &[u8], set: &InstructionSet) -> Result<Vec<TextInstruction>, CodecError> {
  let records = decode_program(bytes)?;
  let mut instructions = Vec::with_capacity(records.len());

  for (index, record) in records.iter().enumerate() {
    let address = (index * INSTRUCTION_WIDTH) as Word;
    instructions.push(try_decode_instruction(record, address, set)?);
  }

  tracing::debug!(instructions = instructions.len(), "disassembled program");
  Ok(instructions)
}

/**
  Assembly text for a sequence of instructions, one per line with its address in a trailing
  comment. With a symbol table, labelled addresses get a `:label` line and immediate jump
  targets that hit a label are printed as references to it.
*/
pub struct Listing<'a> {
  instructions : &'a [TextInstruction],
  symbols      : Option<&'a SymbolTable>,
}

impl<'a> Listing<'a> {
  pub fn new(instructions: &'a [TextInstruction], symbols: Option<&'a SymbolTable>) -> Self {
    Listing { instructions, symbols }
  }

  fn symbol(&self, address: Word) -> Option<&'a str> {
    self.symbols
        .and_then(|symbols| symbols.get_symbol(address))
        .map(|name| &**name)
  }

  fn write_label(&self, f: &mut Formatter<'_>, address: Word) -> std::fmt::Result {
    match self.symbol(address) {
      Some(name) => writeln!(f, ":{}", name),
      None       => Ok(())
    }
  }

  fn render(&self, instruction: &TextInstruction) -> String {
    let mut text = instruction.mnemonic().to_string();
    let target = instruction.opcode().target_slot();

    for (slot, operand) in instruction.operands().iter().enumerate() {
      let reference = match (target == Some(slot), operand.mode) {
        (true, AddressingMode::Immediate) => self.symbol(operand.value),
        _                                 => None
      };
      match reference {
        Some(name) => text.push_str(&format!(" :{}", name)),
        None       => text.push_str(&format!(" {}", operand))
      }
    }

    text
  }
}

impl<'a> Display for Listing<'a> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    for instruction in self.instructions {
      self.write_label(f, instruction.address)?;
      writeln!(f, "{:<24}; {:#06x}", self.render(instruction), instruction.address)?;
    }

    // A label may sit just past the last instruction.
    let end = match self.instructions.last() {
      Some(last) => last.address.wrapping_add(INSTRUCTION_WIDTH as Word),
      None       => 0
    };
    self.write_label(f, end)
  }
}
