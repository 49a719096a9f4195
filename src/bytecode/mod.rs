/*!

  The machine uses a 32 bit little-endian word size. Every instruction is exactly 16 bytes: a
  header word followed by three operand words, whether or not the opcode uses all three. The
  sizes of instruction components are as follows:

    Opcode:         8 bits
    Operand modes:  8 bits per operand slot, of which 2 are used
    Operand:       32 bits

  Labels do not appear in the bytecode. They are symbolic names for locations in code memory
  that the assembler replaces with the byte address of the instruction they label. An address
  of `UNRESOLVED_ADDRESS` marks a label that has been referenced but not yet defined; it never
  survives a successful assembly.

  Fixed-width records waste space on instructions with fewer than three operands, but they let
  the program counter, branch targets and file offsets all be plain multiples of the
  instruction width, and they let decoding happen without any lookahead.

*/

mod assembly;
mod binary;
mod disassembly;
mod instruction;

pub use assembly::{assemble, Assembler, Assembly, Pass};
pub use binary::{
  decode_program,
  encode_instruction,
  encode_program,
  try_decode_instruction,
  EncodedInstruction
};
pub use disassembly::{disassemble, Listing};
pub use instruction::{InstructionSet, InstructionSpec, Opcode, TextInstruction, INSTRUCTION_SET};

// If you change these you must also change `encode_instruction` and `try_decode_instruction`.
pub type Word = u32;
pub const WORD_SIZE: usize = 4;
pub const OPERAND_SLOTS: usize = 3;
/// Size in bytes of one encoded instruction.
pub const INSTRUCTION_WIDTH: usize = WORD_SIZE * (OPERAND_SLOTS + 1);

/// The address of a label that has been referenced but not yet defined.
pub const UNRESOLVED_ADDRESS: Word = Word::MAX;
