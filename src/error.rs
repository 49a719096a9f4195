//! Error types for every stage of the tool chain. Each stage reports its own enum so that a
//! caller can tell a bad source file from a bad binary from a program that faulted while
//! running. Every error is fatal to the run that produced it.

use thiserror::Error;

use crate::bytecode::Word;

/// Failures of a [`GrowableStack`](crate::stack::GrowableStack).
#[derive(Error, Clone, Debug, Eq, PartialEq)]
pub enum StackError {
  #[error("failed to grow stack to {requested} elements")]
  Allocation { requested: usize },

  #[error("pop from an empty stack")]
  Empty,

  #[error("index range {index}..{end} is outside of the stack (count {count})")]
  IndexOutOfRange { index: usize, end: usize, count: usize },
}

/// Failures translating between binary records and `TextInstruction`s.
#[derive(Error, Clone, Debug, Eq, PartialEq)]
pub enum CodecError {
  #[error("unsupported opcode {0:#04x}")]
  UnsupportedOpcode(u8),

  #[error("{mnemonic} takes {expected} operand(s) but {found} were supplied")]
  OperandCount {
    mnemonic: &'static str,
    expected: usize,
    found: usize
  },

  #[error("program size {0} is not a multiple of the instruction width")]
  MisalignedProgram(usize),
}

/// What went wrong on a source line.
#[derive(Error, Clone, Debug, Eq, PartialEq)]
pub enum AssemblyErrorKind {
  #[error("malformed label `{0}`: names are letters and `_` only, with nothing after them")]
  MalformedLabel(String),

  #[error("unknown mnemonic `{0}`")]
  UnknownMnemonic(String),

  #[error("{mnemonic} requires {expected} operand(s) but {found} were given")]
  TooFewOperands {
    mnemonic: &'static str,
    expected: usize,
    found: usize
  },

  #[error("too many operands for {mnemonic}, which takes {expected}")]
  TooManyOperands {
    mnemonic: &'static str,
    expected: usize
  },

  #[error("malformed addressing flag `{0}`")]
  MalformedFlag(String),

  #[error("unknown token `{token}` in `{text}`")]
  UnknownToken { token: char, text: String },

  #[error("label `{name}` redefined at {current:#x}, previously defined at {previous:#x}")]
  LabelRedefinition {
    name: String,
    previous: Word,
    current: Word
  },

  #[error("label `{0}` is referenced but never defined")]
  UndefinedLabel(String),

  #[error("immediate `{0}` does not fit in 32 bits")]
  ImmediateOutOfRange(String),

  #[error("program does not fit in the 32-bit address space")]
  ProgramTooLarge,

  #[error(transparent)]
  Codec(#[from] CodecError),

  #[error(transparent)]
  Stack(#[from] StackError),
}

/// A parse error together with the 1-based source line it was found on.
#[derive(Error, Clone, Debug, Eq, PartialEq)]
#[error("line {line}: {kind}")]
pub struct AssemblyError {
  pub line: usize,
  pub kind: AssemblyErrorKind,
}

impl AssemblyError {
  pub fn new(line: usize, kind: AssemblyErrorKind) -> Self {
    AssemblyError { line, kind }
  }
}

/// Load-time and run-time faults of the [`Cpu`](crate::cpu::Cpu).
#[derive(Error, Clone, Debug, Eq, PartialEq)]
pub enum CpuError {
  #[error("program is empty")]
  EmptyProgram,

  #[error("program of {size} bytes exceeds the maximum of {max} bytes")]
  ProgramTooLarge { size: usize, max: usize },

  #[error("program counter {0:#x} does not point at an instruction")]
  PcOutOfRange(Word),

  #[error("register index {index} is out of range, the CPU has {count} registers")]
  RegisterOutOfRange { index: Word, count: usize },

  #[error("operand {slot} of {mnemonic} is an immediate and cannot be written")]
  NotAddressable { mnemonic: &'static str, slot: usize },

  #[error("{0} requires a register operand")]
  RegisterRequired(&'static str),

  #[error("division by zero")]
  DivisionByZero,

  #[error("memory access {offset:#x}..{end:#x} is outside of the data stack ({count} bytes)")]
  MemoryOutOfBounds { offset: usize, end: usize, count: usize },

  #[error("data stack underflow: {needed} bytes needed, {available} available")]
  DataStackUnderflow { needed: usize, available: usize },

  #[error("return with an empty call stack")]
  CallStackUnderflow,

  #[error("jump target at {0:#x} refers to an unresolved label")]
  UnresolvedTarget(Word),

  #[error("input exhausted")]
  InputExhausted,

  #[error("invalid hexadecimal input `{0}`")]
  InvalidInput(String),

  #[error("i/o error: {0}")]
  Io(String),

  #[error("the CPU is not running")]
  NotRunning,

  #[error(transparent)]
  Codec(#[from] CodecError),

  #[error(transparent)]
  Stack(#[from] StackError),
}

impl From<std::io::Error> for CpuError {
  fn from(error: std::io::Error) -> Self {
    CpuError::Io(error.to_string())
  }
}

/// Any error the tool chain can produce.
#[derive(Error, Clone, Debug, Eq, PartialEq)]
pub enum Error {
  #[error(transparent)]
  Assembly(#[from] AssemblyError),

  #[error(transparent)]
  Codec(#[from] CodecError),

  #[error(transparent)]
  Cpu(#[from] CpuError),
}
