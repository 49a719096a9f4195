//! Tunable sizes for the assembler and the CPU. None of these change the meaning of a program,
//! only how much room the tools start with and how much they will accept.

use crate::bytecode::INSTRUCTION_WIDTH;

/// Initial capacities used by one assembly run. Both buffers grow on demand.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct AssemblerConfig {
  pub label_capacity       : usize,
  pub instruction_capacity : usize,
}

impl Default for AssemblerConfig {
  fn default() -> Self {
    AssemblerConfig {
      label_capacity       : 16,
      instruction_capacity : 64,
    }
  }
}

/**
  Resource settings for a `Cpu`.

  The stack capacities are only starting points: the data stack (in bytes) and the call stack
  (in return addresses) grow as `str` and `cfn` push onto them. `max_program_size` is a hard
  limit on the size of the binary accepted at load time.
*/
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct CpuConfig {
  pub data_stack_capacity : usize,
  pub call_stack_capacity : usize,
  pub max_program_size    : usize,
}

impl CpuConfig {
  /// The largest number of instructions a program may hold.
  pub fn max_instructions(&self) -> usize {
    self.max_program_size / INSTRUCTION_WIDTH
  }
}

impl Default for CpuConfig {
  fn default() -> Self {
    CpuConfig {
      data_stack_capacity : 256,
      call_stack_capacity : 64,
      max_program_size    : 1 << 20,
    }
  }
}
