//! A small register machine with its tool chain: a two-pass assembler from mnemonic source to a
//! fixed-width 16-byte binary encoding, a disassembler back to source, and an interpreter that
//! executes the binary against sixteen registers, a data stack and a call stack.

#[macro_use] extern crate prettytable;
#[macro_use] extern crate lazy_static;

pub mod address;
pub mod bytecode;
pub mod config;
pub mod cpu;
pub mod error;
pub mod stack;
pub mod symboltable;

pub use crate::bytecode::{assemble, disassemble, Assembler, Assembly, Listing, INSTRUCTION_SET};
pub use crate::config::{AssemblerConfig, CpuConfig};
pub use crate::cpu::{Cpu, CpuState, Flow};
pub use crate::error::Error;
