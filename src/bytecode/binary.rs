/*!
  This module is responsible for the encoding and decoding of binary instructions.

  Every instruction is a 16 byte record of four little-endian words:

    [Header:32][Slot0:32][Slot1:32][Slot2:32]

  and the header is laid out as

    [OpCode:8][Modes0:8][Modes1:8][Modes2:8]

  where bit 0 of each modes byte is the memory marker and bit 1 is the register marker of the
  corresponding operand slot. The assembler, disassembler and CPU all go through the functions
  here, so the layout is defined in exactly one place.
*/

use crate::address::{AddressingMode, Operand};
use crate::bytecode::{
  InstructionSet,
  TextInstruction,
  Word,
  INSTRUCTION_WIDTH,
  OPERAND_SLOTS,
  WORD_SIZE
};
use crate::error::CodecError;

const OPCODE_SHIFT    : u32 = 24;
const MEMORY_BIT      : u32 = 0;
const REGISTER_BIT    : u32 = 1;

/// The binary form of one instruction.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct EncodedInstruction {
  pub header : Word,
  pub slots  : [Word; OPERAND_SLOTS],
}

impl EncodedInstruction {

  /// The raw opcode byte. It is not checked against the instruction set.
  pub fn opcode_byte(&self) -> u8 {
    (self.header >> OPCODE_SHIFT) as u8
  }

  /// The addressing mode recorded in the header for `slot`.
  pub fn mode(&self, slot: usize) -> AddressingMode {
    let base = mode_shift(slot);
    AddressingMode::from_bits(
      self.header & (1 << (base + MEMORY_BIT))   != 0,
      self.header & (1 << (base + REGISTER_BIT)) != 0
    )
  }

  pub fn to_bytes(&self) -> [u8; INSTRUCTION_WIDTH] {
    let mut bytes = [0u8; INSTRUCTION_WIDTH];
    let words = std::iter::once(&self.header).chain(self.slots.iter());
    for (chunk, word) in bytes.chunks_exact_mut(WORD_SIZE).zip(words) {
      chunk.copy_from_slice(&word.to_le_bytes());
    }
    bytes
  }

  /// Reads one record. The caller guarantees that `bytes` holds exactly one instruction.
  pub fn from_bytes(bytes: &[u8; INSTRUCTION_WIDTH]) -> EncodedInstruction {
    let mut words = [0 as Word; OPERAND_SLOTS + 1];
    for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(WORD_SIZE)) {
      let mut le = [0u8; WORD_SIZE];
      le.copy_from_slice(chunk);
      *word = Word::from_le_bytes(le);
    }

    EncodedInstruction {
      header : words[0],
      slots  : [words[1], words[2], words[3]]
    }
  }
}

/// Bit offset of the modes byte of operand `slot`: 16, 8 and 0.
fn mode_shift(slot: usize) -> u32 {
  16 - 8 * slot as u32
}

/**
  Encodes the instruction into its binary record. Unused operand slots are written as zero,
  and their mode bits are left clear.
*/
pub fn encode_instruction(instruction: &TextInstruction) -> EncodedInstruction {
  let mut encoded = EncodedInstruction {
    header: (instruction.opcode().code() as Word) << OPCODE_SHIFT,
    slots: [0; OPERAND_SLOTS]
  };

  for (slot, operand) in instruction.operands().iter().enumerate() {
    let base = mode_shift(slot);
    if operand.mode.is_register() {
      encoded.header |= 1 << (base + REGISTER_BIT);
    }
    if operand.mode.is_memory() {
      encoded.header |= 1 << (base + MEMORY_BIT);
    }
    encoded.slots[slot] = operand.value;
  }

  encoded
}

/**
  Decodes a binary record found at `address`. Only as many slots as the opcode takes are read;
  the rest of the record is ignored.
*/
pub fn try_decode_instruction(
  encoded : &EncodedInstruction,
  address : Word,
  set     : &InstructionSet
) -> Result<TextInstruction, CodecError>
{
  let spec = set.decode_opcode(encoded.opcode_byte())?;

  let mut operands = [Operand::default(); OPERAND_SLOTS];
  for (slot, operand) in operands.iter_mut().enumerate().take(spec.operand_count) {
    *operand = Operand::new(encoded.mode(slot), encoded.slots[slot]);
  }

  TextInstruction::new(address, spec.opcode, &operands[..spec.operand_count])
}

/// Serializes a sequence of records into the on-disk format.
pub fn encode_program(instructions: &[EncodedInstruction]) -> Vec<u8> {
  let mut bytes = Vec::with_capacity(instructions.len() * INSTRUCTION_WIDTH);
  for instruction in instructions {
    bytes.extend_from_slice(&instruction.to_bytes());
  }
  bytes
}

/// Splits the on-disk format into records. The length must be a whole number of records.
pub fn decode_program(bytes: &[u8]) -> Result<Vec<EncodedInstruction>, CodecError> {
  if bytes.len() % INSTRUCTION_WIDTH != 0 {
    return Err(CodecError::MisalignedProgram(bytes.len()));
  }

  Ok(
    bytes
      .chunks_exact(INSTRUCTION_WIDTH)
      .map(|chunk| {
        let mut record = [0u8; INSTRUCTION_WIDTH];
        record.copy_from_slice(chunk);
        EncodedInstruction::from_bytes(&record)
      })
      .collect()
  )
}
