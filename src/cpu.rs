//! The register machine that executes assembled programs. It owns a register file, a
//! byte-addressable data stack and a call stack of return addresses, and runs a
//! fetch-decode-dispatch loop over a read-only program until `hlt` or the first fault.

use std::fmt::{Display, Formatter};
use std::io::{BufRead, Write};

use prettytable::{format as TableFormat, Table};

use crate::address::{AddressingMode, Operand};
use crate::bytecode::{
  decode_program,
  try_decode_instruction,
  EncodedInstruction,
  InstructionSet,
  Opcode,
  TextInstruction,
  Word,
  INSTRUCTION_WIDTH,
  UNRESOLVED_ADDRESS,
  WORD_SIZE
};
use crate::config::CpuConfig;
use crate::error::{CpuError, StackError};
use crate::stack::GrowableStack;

/// Number of general purpose registers, `x0` through `xf`.
pub const REGISTER_COUNT: usize = 16;

/// Rows of the data stack shown by the state dump.
const DATA_STACK_ROWS: usize = 16;

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum CpuState {
  /// Loaded, no instruction executed yet.
  Ready,
  Running,
  /// Stopped by `hlt`.
  Halted,
  /// Stopped by an error. A faulted CPU cannot be resumed.
  Faulted,
}

impl Display for CpuState {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      CpuState::Ready   => "ready",
      CpuState::Running => "running",
      CpuState::Halted  => "halted",
      CpuState::Faulted => "faulted",
    };
    write!(f, "{}", name)
  }
}

/// What an instruction does to the program counter.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Flow {
  /// Fall through to the next instruction.
  Next,
  Jump(Word),
  Halt,
}

pub struct Cpu<'s> {
  set     : &'s InstructionSet,
  program : Vec<EncodedInstruction>,
  state   : CpuState,
  fault   : Option<CpuError>,

  // Registers //
  registers : [Word; REGISTER_COUNT],
  rpc       : Word, // Program counter, a byte address into the program
  rbp       : Word, // Innermost return address, for inspection only
  rcc       : u64,  // Completed instructions

  // Memory Stores
  data  : GrowableStack<u8>,   // Byte addressable, grows only through `str`
  calls : GrowableStack<Word>, // Return addresses
}

impl<'s> Cpu<'s> {

  // region Display methods

  fn make_register_table<T> (
      name      : &str,
      registers : &[T],
      highlight : Option<usize>,
      start     : usize,
      stride    : usize
    ) -> Table
    where T: Display
  {
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Address", ubl->"Contents"]);

    for (i, cell) in registers.iter().enumerate() {
      let address = (i + start) * stride;
      match highlight == Some(i) {

        true  => {
          table.add_row(
            row![r->format!("* --> {}[{:x}] =", name, address), format!("{}", cell)]
          );
        }

        false => {
          table.add_row(
            row![r->format!("{}[{:x}] =", name, address), format!("{}", cell)]
          );
        }

      } // end match on highlight
    } // end for
    table
  }

  fn make_special_table(&self) -> Table {
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Register", ubl->"Contents"]);
    table.add_row(row![r->"RPC =", format!("{:#010x}", self.rpc)]);
    table.add_row(row![r->"RBP =", format!("{:#010x}", self.rbp)]);
    table.add_row(row![r->"RCC =", self.rcc]);
    table.add_row(row![r->"state", self.state]);
    table
  }

  // endregion

  // region Construction and inspection

  /**
    Loads a binary program. The program must be non-empty, no larger than
    `config.max_program_size` and a whole number of instructions. Opcodes are only checked
    as instructions are fetched.
  */
  pub fn new(program: &[u8], set: &'s InstructionSet, config: CpuConfig)
    -> Result<Cpu<'s>, CpuError>
  {
    if program.is_empty() {
      return Err(CpuError::EmptyProgram);
    }
    if program.len() > config.max_program_size {
      return Err(CpuError::ProgramTooLarge {
        size : program.len(),
        max  : config.max_program_size
      });
    }
    let program = decode_program(program)?;

    tracing::debug!(
      instructions = program.len(),
      limit = config.max_instructions(),
      "loaded program"
    );

    Ok(Cpu {
      set,
      program,
      state     : CpuState::Ready,
      fault     : None,
      registers : [0; REGISTER_COUNT],
      rpc       : 0,
      rbp       : 0,
      rcc       : 0,
      data      : GrowableStack::new(config.data_stack_capacity)?,
      calls     : GrowableStack::new(config.call_stack_capacity)?,
    })
  }

  pub fn state(&self) -> CpuState {
    self.state
  }

  pub fn is_running(&self) -> bool {
    matches!(self.state, CpuState::Ready | CpuState::Running)
  }

  /// The error that stopped the CPU, if it faulted.
  pub fn fault(&self) -> Option<&CpuError> {
    self.fault.as_ref()
  }

  pub fn register(&self, index: usize) -> Option<Word> {
    self.registers.get(index).copied()
  }

  pub fn registers(&self) -> &[Word] {
    &self.registers
  }

  pub fn rpc(&self) -> Word {
    self.rpc
  }

  pub fn rbp(&self) -> Word {
    self.rbp
  }

  pub fn rcc(&self) -> u64 {
    self.rcc
  }

  pub fn data_stack(&self) -> &GrowableStack<u8> {
    &self.data
  }

  pub fn call_stack(&self) -> &GrowableStack<Word> {
    &self.calls
  }

  // endregion

  // region Execution

  /// Runs until the program halts. The first fault stops the CPU and is returned.
  pub fn run<R, W>(&mut self, input: &mut R, output: &mut W) -> Result<(), CpuError>
    where R: BufRead,
          W: Write
  {
    #[cfg(feature = "trace_computation")]
    println!("Computation Tracing ENABLED");

    while self.state != CpuState::Halted {
      self.step(input, output)?;
    }

    tracing::debug!(cycles = self.rcc, "halted");
    Ok(())
  }

  /// Executes exactly one instruction.
  pub fn step<R, W>(&mut self, input: &mut R, output: &mut W) -> Result<Flow, CpuError>
    where R: BufRead,
          W: Write
  {
    match self.state {
      CpuState::Halted | CpuState::Faulted => return Err(CpuError::NotRunning),
      CpuState::Ready                      => self.state = CpuState::Running,
      CpuState::Running                    => {}
    }

    match self.execute(input, output) {

      Ok(flow) => {
        match flow {
          Flow::Next         => self.rpc = self.rpc.wrapping_add(INSTRUCTION_WIDTH as Word),
          Flow::Jump(target) => self.rpc = target,
          Flow::Halt         => self.state = CpuState::Halted,
        }
        self.rcc += 1;

        #[cfg(feature = "trace_computation")] println!("{}", self);
        Ok(flow)
      }

      Err(error) => {
        tracing::debug!(rpc = self.rpc, %error, "fault");
        self.state = CpuState::Faulted;
        self.fault = Some(error.clone());
        Err(error)
      }

    }
  }

  fn fetch(&self) -> Result<TextInstruction, CpuError> {
    if self.rpc as usize % INSTRUCTION_WIDTH != 0 {
      return Err(CpuError::PcOutOfRange(self.rpc));
    }
    let record =
      self.program
          .get(self.rpc as usize / INSTRUCTION_WIDTH)
          .ok_or(CpuError::PcOutOfRange(self.rpc))?;

    Ok(try_decode_instruction(record, self.rpc, self.set)?)
  }

  fn execute<R, W>(&mut self, input: &mut R, output: &mut W) -> Result<Flow, CpuError>
    where R: BufRead,
          W: Write
  {
    let instruction = self.fetch()?;
    let operands = instruction.operands();
    tracing::trace!(rpc = self.rpc, %instruction, "dispatch");

    match instruction.opcode() {

      Opcode::Inp => {
        let value = read_hex(input)?;
        self.write_operand(&instruction, 0, value)?;
        Ok(Flow::Next)
      }

      Opcode::Out => {
        let value = self.read_operand(&operands[0])?;
        writeln!(output, "{:x}", value)?;
        Ok(Flow::Next)
      }

      Opcode::Mov => {
        let value = self.read_operand(&operands[1])?;
        self.write_operand(&instruction, 0, value)?;
        Ok(Flow::Next)
      }

      opcode @ Opcode::Add
      | opcode @ Opcode::Sub
      | opcode @ Opcode::Mul
      | opcode @ Opcode::Div => {
        let a = self.read_operand(&operands[1])?;
        let b = self.read_operand(&operands[2])?;
        let result = match opcode {
          Opcode::Add => a.wrapping_add(b),
          Opcode::Sub => a.wrapping_sub(b),
          Opcode::Mul => a.wrapping_mul(b),
          _           => a.checked_div(b).ok_or(CpuError::DivisionByZero)?,
        };
        self.write_operand(&instruction, 0, result)?;
        Ok(Flow::Next)
      }

      Opcode::Sqr => {
        let value = self.read_operand(&operands[1])?;
        let root = ((value as f64).sqrt() + 0.5) as Word;
        self.write_operand(&instruction, 0, root)?;
        Ok(Flow::Next)
      }

      opcode @ Opcode::Bne
      | opcode @ Opcode::Beq
      | opcode @ Opcode::Bgt
      | opcode @ Opcode::Blt
      | opcode @ Opcode::Bge
      | opcode @ Opcode::Ble => {
        let a = self.read_operand(&operands[0])?;
        let b = self.read_operand(&operands[1])?;
        let taken = match opcode {
          Opcode::Bne => a != b,
          Opcode::Beq => a == b,
          Opcode::Bgt => a >  b,
          Opcode::Blt => a <  b,
          Opcode::Bge => a >= b,
          _           => a <= b,
        };
        match taken {
          true  => self.jump(&operands[2]),
          false => Ok(Flow::Next)
        }
      }

      Opcode::Baw => self.jump(&operands[0]),

      Opcode::Str => {
        let index = direct_register(&instruction)?;
        self.data.push_word(self.registers[index])?;
        Ok(Flow::Next)
      }

      Opcode::Ldr => {
        let index = direct_register(&instruction)?;
        let available = self.data.len();
        self.registers[index] =
          self.data
              .pop_word()
              .map_err(|_| CpuError::DataStackUnderflow { needed: WORD_SIZE, available })?;
        Ok(Flow::Next)
      }

      Opcode::Cfn => {
        let flow = self.jump(&operands[0])?;
        let return_address = self.rpc.wrapping_add(INSTRUCTION_WIDTH as Word);
        self.calls.push(return_address)?;
        self.rbp = return_address;
        Ok(flow)
      }

      Opcode::Ret => {
        let return_address = self.calls.pop().map_err(|_| CpuError::CallStackUnderflow)?;
        self.rbp = self.calls.top().copied().unwrap_or(0);
        Ok(Flow::Jump(return_address))
      }

      Opcode::Hlt => Ok(Flow::Halt),

    }
  }

  fn jump(&self, target: &Operand) -> Result<Flow, CpuError> {
    match self.read_operand(target)? {
      UNRESOLVED_ADDRESS => Err(CpuError::UnresolvedTarget(self.rpc)),
      address            => Ok(Flow::Jump(address))
    }
  }

  // endregion

  // region Operand access

  /// The value an operand denotes under its addressing mode.
  pub fn read_operand(&self, operand: &Operand) -> Result<Word, CpuError> {
    match operand.mode {
      AddressingMode::Immediate => Ok(operand.value),
      AddressingMode::Register  => Ok(self.registers[register_index(operand.value)?]),
      AddressingMode::Memory    => self.read_memory(operand.value),
      AddressingMode::Indirect  => {
        let offset = self.registers[register_index(operand.value)?];
        self.read_memory(offset)
      }
    }
  }

  /// Stores `value` where operand `slot` of `instruction` points.
  pub fn write_operand(&mut self, instruction: &TextInstruction, slot: usize, value: Word)
    -> Result<(), CpuError>
  {
    let operand = match instruction.operand(slot) {
      Some(operand) => *operand,
      None => {
        return Err(CpuError::NotAddressable { mnemonic: instruction.mnemonic(), slot });
      }
    };

    match operand.mode {
      AddressingMode::Immediate => {
        Err(CpuError::NotAddressable { mnemonic: instruction.mnemonic(), slot })
      }
      AddressingMode::Register  => {
        self.registers[register_index(operand.value)?] = value;
        Ok(())
      }
      AddressingMode::Memory    => self.write_memory(operand.value, value),
      AddressingMode::Indirect  => {
        let offset = self.registers[register_index(operand.value)?];
        self.write_memory(offset, value)
      }
    }
  }

  fn read_memory(&self, offset: Word) -> Result<Word, CpuError> {
    self.data.read_word(offset as usize).map_err(memory_error)
  }

  fn write_memory(&mut self, offset: Word, value: Word) -> Result<(), CpuError> {
    self.data.write_word(offset as usize, value).map_err(memory_error)
  }

  // endregion
}

fn register_index(value: Word) -> Result<usize, CpuError> {
  match value as usize {
    index if index < REGISTER_COUNT => Ok(index),
    _ => Err(CpuError::RegisterOutOfRange { index: value, count: REGISTER_COUNT })
  }
}

/// `str` and `ldr` name their register directly.
fn direct_register(instruction: &TextInstruction) -> Result<usize, CpuError> {
  match instruction.operand(0) {
    Some(operand) if operand.mode == AddressingMode::Register => register_index(operand.value),
    _ => Err(CpuError::RegisterRequired(instruction.mnemonic()))
  }
}

fn memory_error(error: StackError) -> CpuError {
  match error {
    StackError::IndexOutOfRange { index, end, count } => {
      CpuError::MemoryOutOfBounds { offset: index, end, count }
    }
    other => other.into()
  }
}

/// Reads the next whitespace delimited token from `input` as a hexadecimal word.
fn read_hex<R: BufRead>(input: &mut R) -> Result<Word, CpuError> {
  let mut token = String::new();

  loop {
    let buffer = input.fill_buf()?;
    if buffer.is_empty() {
      break;
    }

    let mut consumed = 0;
    let mut complete = false;
    for &byte in buffer {
      consumed += 1;
      if !byte.is_ascii_whitespace() {
        token.push(byte as char);
      } else if !token.is_empty() {
        complete = true;
        break;
      }
    }
    input.consume(consumed);

    if complete {
      break;
    }
  }

  if token.is_empty() {
    return Err(CpuError::InputExhausted);
  }
  // `from_str_radix` alone would also take a sign.
  if !token.chars().all(|c| c.is_ascii_hexdigit()) {
    return Err(CpuError::InvalidInput(token));
  }
  Word::from_str_radix(&token, 16).map_err(|_| CpuError::InvalidInput(token))
}


lazy_static! {
  static ref TABLE_DISPLAY_FORMAT: TableFormat::TableFormat =
    TableFormat::FormatBuilder::new()
      .column_separator('│')
      .borders(' ')
      .separator(
        TableFormat::LinePosition::Title,
        TableFormat::LineSeparator::new('─', '┼', ' ', ' ')
      )
      .separator(
        TableFormat::LinePosition::Bottom,
        TableFormat::LineSeparator::new('─', '┴', ' ', ' ')
      )
      .padding(1, 1)
      .build();
}

impl<'s> Display for Cpu<'s> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let registers: Vec<String> =
      self.registers.iter().map(|value| format!("{:#010x}", value)).collect();
    let calls: Vec<String> =
      self.calls.iter().map(|address| format!("{:#010x}", address)).collect();

    // Only the words nearest the top of the data stack.
    let words = self.data.len() / WORD_SIZE;
    let first = words.saturating_sub(DATA_STACK_ROWS);
    let data: Vec<String> =
      (first..words)
        .map(|word| match self.data.read_word(word * WORD_SIZE) {
          Ok(value) => format!("{:#010x}", value),
          Err(_)    => "?".to_string()
        })
        .collect();

    let x_table    = Cpu::make_register_table("x", &registers, None, 0, 1);
    let s_table    = self.make_special_table();
    let call_table = Cpu::make_register_table("C", &calls, calls.len().checked_sub(1), 0, 1);
    let data_table =
      Cpu::make_register_table("D", &data, data.len().checked_sub(1), first, WORD_SIZE);

    let mut combined_table = table!([x_table, s_table, call_table, data_table]);

    combined_table.set_titles(
      row![ub->"Registers", ub->"Special", ub->"Call Stack", ub->"Data Stack"]
    );
    combined_table.set_format(*TABLE_DISPLAY_FORMAT);

    match &self.fault {
      Some(error) => write!(f, "Fault: {}\n{}", error, combined_table),
      None        => write!(f, "{}", combined_table)
    }
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::bytecode::{assemble, encode_instruction, encode_program, INSTRUCTION_SET};
  use crate::error::CodecError;

  fn load(source: &str) -> Cpu<'static> {
    let bytes = assemble(source).unwrap().to_bytes();
    Cpu::new(&bytes, &INSTRUCTION_SET, CpuConfig::default()).unwrap()
  }

  fn run_with_input(source: &str, input: &str) -> (Cpu<'static>, Result<(), CpuError>, String) {
    let mut cpu = load(source);
    let mut output = Vec::new();
    let result = cpu.run(&mut input.as_bytes(), &mut output);
    (cpu, result, String::from_utf8(output).unwrap())
  }

  fn run(source: &str) -> (Cpu<'static>, Result<(), CpuError>) {
    let (cpu, result, _) = run_with_input(source, "");
    (cpu, result)
  }

  #[test]
  fn end_to_end(){
    let (cpu, result) = run("mov x0 5\nmov x1 3\nadd x0 x0 x1\nhlt");
    assert_eq!(result, Ok(()));
    assert_eq!(cpu.register(0), Some(8));
    assert_eq!(cpu.state(), CpuState::Halted);
    assert!(!cpu.is_running());
    assert_eq!(cpu.rcc(), 4);
  }

  #[test]
  fn stepping(){
    let mut cpu = load("mov x0 1\nbaw 0");
    let mut output = Vec::new();
    assert_eq!(cpu.state(), CpuState::Ready);

    assert_eq!(cpu.step(&mut "".as_bytes(), &mut output), Ok(Flow::Next));
    assert_eq!(cpu.state(), CpuState::Running);
    assert_eq!(cpu.rpc(), 0x10);

    assert_eq!(cpu.step(&mut "".as_bytes(), &mut output), Ok(Flow::Jump(0)));
    assert_eq!(cpu.rpc(), 0);
    assert_eq!(cpu.rcc(), 2);
  }

  #[test]
  fn every_addressing_mode_reads_back_what_was_written(){
    let source = "
      str x0        ; reserve a word of memory at offset 0
      mov *0 2a
      mov x1 *0
      mov x2 0
      mov *x2 7
      mov x3 *x2
      mov x4 x3
      hlt
    ";
    let (cpu, result) = run(source);
    assert_eq!(result, Ok(()));
    assert_eq!(cpu.register(1), Some(0x2a));
    assert_eq!(cpu.register(3), Some(7));
    assert_eq!(cpu.register(4), Some(7));
    assert_eq!(cpu.data_stack().read_word(0), Ok(7));
  }

  #[test]
  fn arithmetic_wraps(){
    let (cpu, result) = run("mov x0 ffffffff\nadd x0 x0 1\nsub x1 0 1\nmul x2 ffffffff 2\nhlt");
    assert_eq!(result, Ok(()));
    assert_eq!(cpu.register(0), Some(0));
    assert_eq!(cpu.register(1), Some(0xffff_ffff));
    assert_eq!(cpu.register(2), Some(0xffff_fffe));
  }

  #[test]
  fn division_and_square_root(){
    let (cpu, result) = run("div x0 7 2\nsqr x1 f\nsqr x2 10\nsqr x3 3\nsqr x4 0\nhlt");
    assert_eq!(result, Ok(()));
    assert_eq!(&cpu.registers()[..5], &[3, 4, 4, 2, 0]);
  }

  #[test]
  fn division_by_zero_leaves_destination_alone(){
    let (mut cpu, result) = run("mov x0 9\ndiv x0 4 0\nhlt");
    assert_eq!(result, Err(CpuError::DivisionByZero));
    assert_eq!(cpu.register(0), Some(9));
    assert_eq!(cpu.state(), CpuState::Faulted);
    assert_eq!(cpu.fault(), Some(&CpuError::DivisionByZero));
    assert_eq!(cpu.rpc(), 0x10);
    assert_eq!(cpu.rcc(), 1);

    let mut output = Vec::new();
    assert_eq!(cpu.step(&mut "".as_bytes(), &mut output), Err(CpuError::NotRunning));
  }

  #[test]
  fn loop_with_output(){
    let source = "
      mov x0 3
    :again
      out x0
      sub x0 x0 1
      bne x0 0 :again
      hlt
    ";
    let (_, result, output) = run_with_input(source, "");
    assert_eq!(result, Ok(()));
    assert_eq!(output, "3\n2\n1\n");
  }

  #[test]
  fn branch_conditions(){
    let cases: [(&str, Word, Word, bool); 13] = [
      ("beq", 2, 2, true),  ("beq", 2, 3, false),
      ("bne", 2, 3, true),  ("bne", 2, 2, false),
      ("bgt", 3, 2, true),  ("bgt", 2, 2, false),
      ("blt", 2, 3, true),  ("blt", 3, 2, false),
      ("bge", 2, 2, true),  ("bge", 1, 2, false),
      ("ble", 2, 2, true),  ("ble", 3, 2, false),
      // Comparisons are unsigned.
      ("bgt", 0xffff_ffff, 1, true),
    ];

    for (mnemonic, a, b, taken) in cases.iter() {
      let source = format!(
        "{} {:x} {:x} :taken\nmov x0 0\nhlt\n:taken\nmov x0 1\nhlt",
        mnemonic, a, b
      );
      let (cpu, result) = run(&source);
      assert_eq!(result, Ok(()));
      assert_eq!(cpu.register(0), Some(*taken as Word), "{} {} {}", mnemonic, a, b);
    }
  }

  #[test]
  fn jump_targets_may_come_from_registers_and_memory(){
    let source = "
      mov x1 :there
      baw x1
      hlt
    :there
      str x1
      mov x2 :end
      mov *0 x2
      baw *0
      hlt
    :end
      mov x0 1
      hlt
    ";
    let (cpu, result) = run(source);
    assert_eq!(result, Ok(()));
    assert_eq!(cpu.register(0), Some(1));
  }

  #[test]
  fn nested_calls_return_after_the_call(){
    let source = "
      cfn :outer
      out 1
      hlt
    :outer
      cfn :inner
      out 2
      ret
    :inner
      out 3
      ret
    ";
    let mut cpu = load(source);
    let mut output = Vec::new();
    let mut input = "".as_bytes();

    cpu.step(&mut input, &mut output).unwrap();
    assert_eq!(cpu.rbp(), 0x10);
    cpu.step(&mut input, &mut output).unwrap();
    assert_eq!(cpu.rbp(), 0x40);
    assert_eq!(cpu.call_stack().len(), 2);

    cpu.run(&mut input, &mut output).unwrap();
    assert_eq!(String::from_utf8(output).unwrap(), "3\n2\n1\n");
    assert!(cpu.call_stack().is_empty());
    assert_eq!(cpu.rbp(), 0);
  }

  #[test]
  fn data_stack_round_trip(){
    let (cpu, result) = run("mov x0 2a\nstr x0\nmov x0 0\nldr x1\nhlt");
    assert_eq!(result, Ok(()));
    assert_eq!(cpu.register(1), Some(0x2a));
    assert!(cpu.data_stack().is_empty());
  }

  #[test]
  fn stack_underflows(){
    assert_eq!(run("ret").1, Err(CpuError::CallStackUnderflow));
    assert_eq!(
      run("ldr x0").1,
      Err(CpuError::DataStackUnderflow { needed: 4, available: 0 })
    );
  }

  #[test]
  fn operand_faults(){
    assert_eq!(run("str 1").1,   Err(CpuError::RegisterRequired("str")));
    assert_eq!(run("ldr *x0").1, Err(CpuError::RegisterRequired("ldr")));
    assert_eq!(
      run("mov x10 1").1,
      Err(CpuError::RegisterOutOfRange { index: 0x10, count: REGISTER_COUNT })
    );
    assert_eq!(
      run("mov 1 2").1,
      Err(CpuError::NotAddressable { mnemonic: "mov", slot: 0 })
    );
    assert_eq!(
      run("mov x0 *0").1,
      Err(CpuError::MemoryOutOfBounds { offset: 0, end: 4, count: 0 })
    );
    // Writes never grow memory.
    assert_eq!(
      run("str x0\nmov *2 1").1,
      Err(CpuError::MemoryOutOfBounds { offset: 2, end: 6, count: 4 })
    );
  }

  #[test]
  fn program_counter_must_point_at_an_instruction(){
    assert_eq!(run("baw 8").1, Err(CpuError::PcOutOfRange(8)));
    assert_eq!(run("baw 20").1, Err(CpuError::PcOutOfRange(0x20)));
    // Running off the end.
    assert_eq!(run("mov x0 1").1, Err(CpuError::PcOutOfRange(0x10)));
  }

  #[test]
  fn unresolved_targets_fault(){
    let baw = TextInstruction::new(
      0,
      Opcode::Baw,
      &[Operand::immediate(UNRESOLVED_ADDRESS)]
    ).unwrap();
    let bytes = encode_program(&[encode_instruction(&baw)]);
    let mut cpu = Cpu::new(&bytes, &INSTRUCTION_SET, CpuConfig::default()).unwrap();
    let mut output = Vec::new();

    assert_eq!(cpu.run(&mut "".as_bytes(), &mut output), Err(CpuError::UnresolvedTarget(0)));
  }

  #[test]
  fn bad_opcodes_fault_when_fetched(){
    let mut bytes = assemble("mov x0 1\nhlt").unwrap().to_bytes();
    bytes[19] = 0x40;
    let mut cpu = Cpu::new(&bytes, &INSTRUCTION_SET, CpuConfig::default()).unwrap();
    let mut output = Vec::new();

    let result = cpu.run(&mut "".as_bytes(), &mut output);
    assert_eq!(result, Err(CpuError::Codec(CodecError::UnsupportedOpcode(0x40))));
    assert_eq!(cpu.register(0), Some(1));
  }

  #[test]
  fn load_errors(){
    let config = CpuConfig::default();
    assert_eq!(
      Cpu::new(&[], &INSTRUCTION_SET, config).err(),
      Some(CpuError::EmptyProgram)
    );
    assert_eq!(
      Cpu::new(&[0u8; 17], &INSTRUCTION_SET, config).err(),
      Some(CpuError::Codec(CodecError::MisalignedProgram(17)))
    );

    let small = CpuConfig { max_program_size: 32, ..CpuConfig::default() };
    assert_eq!(
      Cpu::new(&[0u8; 48], &INSTRUCTION_SET, small).err(),
      Some(CpuError::ProgramTooLarge { size: 48, max: 32 })
    );
  }

  #[test]
  fn input_and_output(){
    let source = "inp x0\ninp *x1\nout x0\nhlt";
    let (cpu, result, output) = run_with_input(&format!("str x1\n{}", source), "2a \n\tFF\n");
    assert_eq!(result, Ok(()));
    assert_eq!(cpu.register(0), Some(0x2a));
    assert_eq!(cpu.data_stack().read_word(0), Ok(0xff));
    assert_eq!(output, "2a\n");

    assert_eq!(run_with_input("inp x0\nhlt", "  \n").1, Err(CpuError::InputExhausted));
    assert_eq!(
      run_with_input("inp x0\nhlt", "zz 1").1,
      Err(CpuError::InvalidInput("zz".to_string()))
    );
    assert_eq!(
      run_with_input("inp x0\nhlt", "+2a").1,
      Err(CpuError::InvalidInput("+2a".to_string()))
    );
  }

  #[test]
  fn state_dump(){
    let (cpu, _) = run("mov x3 beef\nstr x3\ncfn :f\n:f\nhlt");
    let dump = cpu.to_string();
    assert!(dump.contains("RPC"));
    assert!(dump.contains("0x0000beef"));
    assert!(dump.contains("halted"));
  }

  #[test]
  fn data_rows_are_labelled_by_byte_offset(){
    let mut source = "str x0\n".repeat(17);
    source.push_str("mov *4 beef\nhlt");
    let (cpu, result) = run(&source);
    assert_eq!(result, Ok(()));

    let dump = cpu.to_string();
    assert!(dump.lines().any(|line| line.contains("D[4] =") && line.contains("0x0000beef")));
    assert!(dump.contains("D[8] ="));
    assert!(dump.contains("D[40] ="));
    assert!(!dump.contains("D[0] ="));
    assert!(!dump.contains("D[5] ="));
  }
}
