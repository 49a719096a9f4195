use std::collections::HashMap;
use std::convert::TryFrom;
use std::fmt::{Display, Formatter};

use strum::IntoEnumIterator;
use strum_macros::{Display as StrumDisplay, EnumIter, EnumString, IntoStaticStr};
use num_enum::{TryFromPrimitive, IntoPrimitive};

use crate::address::Operand;
use crate::bytecode::{Word, OPERAND_SLOTS};
use crate::error::CodecError;

/**
  Opcodes of the machine.

  The discriminant of each variant is the opcode byte stored in the top byte of an instruction
  header, so the order of the variants below is the binary format and must not change.
*/
#[derive(
  StrumDisplay, IntoStaticStr, EnumString, EnumIter, TryFromPrimitive, IntoPrimitive,
  Clone,        Copy,          Eq, PartialEq,  Debug,    Hash
)]
#[repr(u8)]
pub enum Opcode {
  // I/O //
  #[strum(serialize = "inp")] Inp,  // inp dst
  #[strum(serialize = "out")] Out,  // out src

  // Arithmetic //
  #[strum(serialize = "mov")] Mov,  // mov dst, src
  #[strum(serialize = "add")] Add,  // add dst, a, b
  #[strum(serialize = "sub")] Sub,  // sub dst, a, b
  #[strum(serialize = "mul")] Mul,  // mul dst, a, b
  #[strum(serialize = "div")] Div,  // div dst, a, b
  #[strum(serialize = "sqr")] Sqr,  // sqr dst, src

  // Branches //
  #[strum(serialize = "bne")] Bne,  // bne a, b, target
  #[strum(serialize = "beq")] Beq,  // beq a, b, target
  #[strum(serialize = "bgt")] Bgt,  // bgt a, b, target
  #[strum(serialize = "blt")] Blt,  // blt a, b, target
  #[strum(serialize = "bge")] Bge,  // bge a, b, target
  #[strum(serialize = "ble")] Ble,  // ble a, b, target
  #[strum(serialize = "baw")] Baw,  // baw target

  // Data stack //
  #[strum(serialize = "str")] Str,  // str reg
  #[strum(serialize = "ldr")] Ldr,  // ldr reg

  // Calls //
  #[strum(serialize = "cfn")] Cfn,  // cfn target
  #[strum(serialize = "ret")] Ret,  // ret

  #[strum(serialize = "hlt")] Hlt,  // hlt
}

impl Opcode {
  pub fn code(&self) -> u8 {
    Into::<u8>::into(*self)
  }

  pub fn mnemonic(&self) -> &'static str {
    Into::<&'static str>::into(*self)
  }

  pub fn operand_count(&self) -> usize {
    match self {
      | Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div
      | Opcode::Bne | Opcode::Beq | Opcode::Bgt | Opcode::Blt | Opcode::Bge | Opcode::Ble => 3,

      | Opcode::Mov | Opcode::Sqr => 2,

      | Opcode::Inp | Opcode::Out | Opcode::Baw
      | Opcode::Str | Opcode::Ldr | Opcode::Cfn => 1,

      | Opcode::Ret | Opcode::Hlt => 0,
    }
  }

  /// Control-flow instructions set the program counter themselves.
  pub fn is_control_flow(&self) -> bool {
    self.target_slot().is_some() || matches!(self, Opcode::Ret | Opcode::Hlt)
  }

  /// The operand slot holding a jump target, if the instruction has one.
  pub fn target_slot(&self) -> Option<usize> {
    match self {
      | Opcode::Bne | Opcode::Beq | Opcode::Bgt
      | Opcode::Blt | Opcode::Bge | Opcode::Ble => Some(2),
      | Opcode::Baw | Opcode::Cfn               => Some(0),
      _                                         => None
    }
  }
}

/// One row of the instruction set table.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct InstructionSpec {
  pub opcode        : Opcode,
  pub mnemonic      : &'static str,
  pub operand_count : usize,
  pub control_flow  : bool,
}

/**
  The read-only instruction set table shared by the assembler, the disassembler and the CPU.
  It is built once from the `Opcode` enumeration; `INSTRUCTION_SET` holds the process-wide
  instance, which callers pass around by reference.
*/
#[derive(Clone, Debug)]
pub struct InstructionSet {
  specs       : Vec<InstructionSpec>,
  by_mnemonic : HashMap<&'static str, Opcode>,
}

impl InstructionSet {

  pub fn new() -> InstructionSet {
    let specs: Vec<InstructionSpec> =
      Opcode::iter()
        .map(|opcode| InstructionSpec {
          opcode,
          mnemonic      : opcode.mnemonic(),
          operand_count : opcode.operand_count(),
          control_flow  : opcode.is_control_flow()
        })
        .collect();
    let by_mnemonic = specs.iter().map(|spec| (spec.mnemonic, spec.opcode)).collect();

    InstructionSet { specs, by_mnemonic }
  }

  pub fn len(&self) -> usize {
    self.specs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.specs.is_empty()
  }

  /// Looks up an opcode byte read from a binary header.
  pub fn decode_opcode(&self, code: u8) -> Result<&InstructionSpec, CodecError> {
    let opcode = Opcode::try_from(code).map_err(|_| CodecError::UnsupportedOpcode(code))?;
    Ok(self.spec(opcode))
  }

  pub fn spec(&self, opcode: Opcode) -> &InstructionSpec {
    // Rows are built in discriminant order.
    &self.specs[opcode.code() as usize]
  }

  /// Mnemonics are case sensitive.
  pub fn lookup(&self, mnemonic: &str) -> Option<&InstructionSpec> {
    self.by_mnemonic.get(mnemonic).map(|opcode| self.spec(*opcode))
  }

  pub fn iter(&self) -> std::slice::Iter<'_, InstructionSpec> {
    self.specs.iter()
  }
}

impl Default for InstructionSet {
  fn default() -> Self {
    InstructionSet::new()
  }
}

lazy_static! {
  pub static ref INSTRUCTION_SET: InstructionSet = InstructionSet::new();
}

/**
  The unencoded form of an instruction: its address, its opcode and exactly as many operands as
  the opcode takes. Slots past the operand count are kept zeroed so that two instructions with
  the same meaningful content compare equal.
*/
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct TextInstruction {
  pub address : Word,
  opcode      : Opcode,
  operands    : [Operand; OPERAND_SLOTS],
}

impl TextInstruction {

  pub fn new(address: Word, opcode: Opcode, operands: &[Operand])
    -> Result<TextInstruction, CodecError>
  {
    if operands.len() != opcode.operand_count() {
      return Err(CodecError::OperandCount {
        mnemonic : opcode.mnemonic(),
        expected : opcode.operand_count(),
        found    : operands.len()
      });
    }

    let mut slots = [Operand::default(); OPERAND_SLOTS];
    slots[..operands.len()].copy_from_slice(operands);
    Ok(TextInstruction { address, opcode, operands: slots })
  }

  pub fn opcode(&self) -> Opcode {
    self.opcode
  }

  pub fn mnemonic(&self) -> &'static str {
    self.opcode.mnemonic()
  }

  pub fn operand_count(&self) -> usize {
    self.opcode.operand_count()
  }

  /// The meaningful operands only.
  pub fn operands(&self) -> &[Operand] {
    &self.operands[..self.opcode.operand_count()]
  }

  pub fn operand(&self, slot: usize) -> Option<&Operand> {
    self.operands().get(slot)
  }
}

/// Assembly syntax, e.g. `add x0 x0 *x1`.
impl Display for TextInstruction {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.opcode)?;
    for operand in self.operands() {
      write!(f, " {}", operand)?;
    }
    Ok(())
  }
}
