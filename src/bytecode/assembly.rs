/*!
  The human readable textual form of bytecode is called assembly. This module turns assembly
  source into `TextInstruction`s, resolving label references in two passes over the same lines.

  The grammar is line oriented:

    line        := label_def | instruction | <empty>
    label_def   := ':' name
    instruction := mnemonic (operand)*
    operand     := flag? (hex | ':' name)
    flag        := one or two of '*' (memory) and 'x' (register), each at most once

  A line ends at a newline, NUL, carriage return or `;`, which starts a comment. Tokens are
  separated by spaces and tabs.

  The first pass records every label definition and enters forward references with the
  unresolved sentinel address. The second pass runs over the same lines with the same label
  table, at which point every defined label has its address, and its output is the program.
*/

use std::convert::TryFrom;

use nom::{
  branch::alt,
  bytes::complete::{take_till1, take_while, take_while1},
  character::complete::{
    alpha1,
    char as one_char,
    hex_digit1,
    space0
  },
  combinator::map,
  error::ErrorKind,
  sequence::preceded,
  IResult
};

use crate::address::{is_flag_char, AddressingMode, Operand};
use crate::bytecode::{
  encode_instruction,
  encode_program,
  EncodedInstruction,
  InstructionSet,
  Listing,
  TextInstruction,
  Word,
  INSTRUCTION_SET,
  INSTRUCTION_WIDTH,
  OPERAND_SLOTS,
  UNRESOLVED_ADDRESS
};
use crate::config::AssemblerConfig;
use crate::error::{AssemblyError, AssemblyErrorKind};
use crate::stack::GrowableStack;
use crate::symboltable::{LabelTable, SymbolTable};

pub const LABEL_MARKER   : char = ':';
pub const COMMENT_MARKER : char = ';';

type ParseResult<'a, O> = IResult<&'a str, O, (&'a str, ErrorKind)>;

// region Token parsers

fn is_whitespace(c: char) -> bool {
  c == ' ' || c == '\t'
}

fn is_terminator(c: char) -> bool {
  matches!(c, '\n' | '\0' | '\r' | COMMENT_MARKER)
}

fn is_label_char(c: char) -> bool {
  c.is_ascii_alphabetic() || c == '_'
}

fn label_name(input: &str) -> ParseResult<&str> {
  take_while1(is_label_char)(input)
}

/// `:name`, both for definitions and for references.
fn label(input: &str) -> ParseResult<&str> {
  preceded(one_char(LABEL_MARKER), label_name)(input)
}

fn flag(input: &str) -> ParseResult<&str> {
  take_while(is_flag_char)(input)
}

/// The next whitespace delimited token, if there is one.
fn token(input: &str) -> ParseResult<&str> {
  preceded(space0, take_till1(is_whitespace))(input)
}

enum Value<'a> {
  Literal(&'a str),
  Reference(&'a str)
}

fn value(input: &str) -> ParseResult<Value> {
  alt((
    map(label, Value::Reference),
    map(hex_digit1, Value::Literal)
  ))(input)
}

/// The part of the line before any terminator.
fn content(line: &str) -> &str {
  match line.find(is_terminator) {
    Some(end) => &line[..end],
    None      => line
  }
}

fn unknown_token(at: &str, text: &str) -> AssemblyErrorKind {
  AssemblyErrorKind::UnknownToken {
    token : at.chars().next().unwrap_or(' '),
    text  : text.to_string()
  }
}

// endregion

/// The instructions produced by one pass over the source.
#[derive(Clone, Debug)]
pub struct Pass {
  pub instructions : Vec<TextInstruction>,
  /// Label references that were not yet defined when they were read.
  pub unresolved   : usize,
}

impl Pass {
  /// Whether any label reference still holds the unresolved sentinel. A literal operand that
  /// happens to equal the sentinel does not count.
  pub fn has_unresolved(&self) -> bool {
    self.unresolved > 0
  }
}

/// The result of a successful assembly: the program and the labels it defined.
#[derive(Clone, Debug)]
pub struct Assembly {
  pub instructions : Vec<TextInstruction>,
  pub symbols      : SymbolTable,
}

impl Assembly {
  pub fn len(&self) -> usize {
    self.instructions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.instructions.is_empty()
  }

  pub fn encode(&self) -> Vec<EncodedInstruction> {
    self.instructions.iter().map(encode_instruction).collect()
  }

  /// The program in its on-disk format.
  pub fn to_bytes(&self) -> Vec<u8> {
    encode_program(&self.encode())
  }

  pub fn listing(&self) -> Listing<'_> {
    Listing::new(&self.instructions, Some(&self.symbols))
  }
}

/**
  A two-pass assembler. The label table lives as long as the assembler, so calling `pass` twice
  over the same lines is exactly the two-pass algorithm; `assemble_lines` does that and checks
  that nothing was left unresolved.
*/
pub struct Assembler<'s> {
  set        : &'s InstructionSet,
  config     : AssemblerConfig,
  labels     : LabelTable,
  // Forward references seen during the current pass.
  unresolved : usize,
}

impl<'s> Assembler<'s> {

  pub fn new(set: &'s InstructionSet, config: AssemblerConfig) -> Result<Self, AssemblyError> {
    let labels = LabelTable::new(config.label_capacity)
      .map_err(|error| AssemblyError::new(0, error.into()))?;
    Ok(Assembler { set, config, labels, unresolved: 0 })
  }

  pub fn labels(&self) -> &LabelTable {
    &self.labels
  }

  /// Runs both passes over `lines` and exports the resolved labels.
  pub fn assemble_lines<I, L>(mut self, lines: I) -> Result<Assembly, AssemblyError>
    where I: IntoIterator<Item = L> + Clone,
          L: AsRef<str>
  {
    self.pass(lines.clone())?;
    let program = self.pass(lines)?;

    if let Some(label) = self.labels.first_unresolved() {
      return Err(AssemblyError::new(
        label.first_reference.unwrap_or(0),
        AssemblyErrorKind::UndefinedLabel(label.name.to_string())
      ));
    }

    Ok(Assembly {
      instructions : program.instructions,
      symbols      : self.labels.into_symbols()
    })
  }

  /// One pass over the source. Line numbers in errors are 1-based.
  pub fn pass<I, L>(&mut self, lines: I) -> Result<Pass, AssemblyError>
    where I: IntoIterator<Item = L>,
          L: AsRef<str>
  {
    let mut output: GrowableStack<TextInstruction> =
      GrowableStack::new(self.config.instruction_capacity)
        .map_err(|error| AssemblyError::new(0, error.into()))?;
    // Wider than `Word` so that running off the end of the address space is detectable.
    let mut address: u64 = 0;
    self.unresolved = 0;

    for (index, line) in lines.into_iter().enumerate() {
      let number = index + 1;
      let parsed =
        self.parse_line(line.as_ref(), address, number)
            .map_err(|kind| AssemblyError::new(number, kind))?;

      if let Some(instruction) = parsed {
        tracing::trace!(line = number, %instruction, "parsed");
        output.push(instruction)
              .map_err(|error| AssemblyError::new(number, error.into()))?;
        address += INSTRUCTION_WIDTH as u64;
      }
    }

    tracing::debug!(
      instructions = output.len(),
      labels = self.labels.len(),
      unresolved = self.unresolved,
      "assembler pass complete"
    );
    #[cfg(feature = "trace_computation")]
    println!("{}", self.labels);

    Ok(Pass { instructions: output.into_vec(), unresolved: self.unresolved })
  }

  fn parse_line(&mut self, line: &str, address: u64, number: usize)
    -> Result<Option<TextInstruction>, AssemblyErrorKind>
  {
    let text = content(line).trim_start_matches(is_whitespace);

    match text.chars().next() {

      None => Ok(None),

      Some(LABEL_MARKER) => {
        self.parse_label_definition(text, current_address(address)?)?;
        Ok(None)
      }

      Some(c) if c.is_ascii_alphabetic() => {
        let instruction = self.parse_instruction(text, current_address(address)?, number)?;
        Ok(Some(instruction))
      }

      Some(_) => Err(unknown_token(text, text.trim_end_matches(is_whitespace)))

    }
  }

  fn parse_label_definition(&mut self, text: &str, address: Word)
    -> Result<(), AssemblyErrorKind>
  {
    let malformed = || AssemblyErrorKind::MalformedLabel(
      text.trim_end_matches(is_whitespace).to_string()
    );

    let (rest, name) = label(text).map_err(|_| malformed())?;
    if !rest.trim_start_matches(is_whitespace).is_empty() {
      return Err(malformed());
    }

    self.labels.define(name, address)
  }

  fn parse_instruction(&mut self, text: &str, address: Word, number: usize)
    -> Result<TextInstruction, AssemblyErrorKind>
  {
    let (mut rest, mnemonic) =
      alpha1::<_, (&str, ErrorKind)>(text)
        .map_err(|_| unknown_token(text, text))?;
    let spec =
      self.set
          .lookup(mnemonic)
          .ok_or_else(|| AssemblyErrorKind::UnknownMnemonic(mnemonic.to_string()))?;
    if let Some(c) = rest.chars().next() {
      if !is_whitespace(c) {
        return Err(unknown_token(rest, text.trim_end_matches(is_whitespace)));
      }
    }

    let mut operands = [Operand::default(); OPERAND_SLOTS];
    let mut found = 0;
    while let Ok((remaining, operand_text)) = token(rest) {
      if found == spec.operand_count {
        return Err(AssemblyErrorKind::TooManyOperands {
          mnemonic : spec.mnemonic,
          expected : spec.operand_count
        });
      }
      operands[found] = self.parse_operand(operand_text, number)?;
      found += 1;
      rest = remaining;
    }

    if found < spec.operand_count {
      return Err(AssemblyErrorKind::TooFewOperands {
        mnemonic : spec.mnemonic,
        expected : spec.operand_count,
        found
      });
    }

    Ok(TextInstruction::new(address, spec.opcode, &operands[..found])?)
  }

  fn parse_operand(&mut self, text: &str, number: usize) -> Result<Operand, AssemblyErrorKind> {
    let (rest, flag_text) = flag(text).map_err(|_| unknown_token(text, text))?;
    let mode =
      AddressingMode::from_flag(flag_text)
        .ok_or_else(|| AssemblyErrorKind::MalformedFlag(flag_text.to_string()))?;

    let (rest, value) = match value(rest) {
      Ok(parsed) => parsed,
      Err(_) if rest.starts_with(LABEL_MARKER) => {
        return Err(AssemblyErrorKind::MalformedLabel(rest.to_string()));
      }
      Err(_) if !flag_text.is_empty() => {
        // A flag must be followed directly by its value.
        return Err(AssemblyErrorKind::MalformedFlag(text.to_string()));
      }
      Err(_) => return Err(unknown_token(rest, text))
    };
    if !rest.is_empty() {
      return Err(unknown_token(rest, text));
    }

    let value = match value {
      Value::Literal(digits) => {
        Word::from_str_radix(digits, 16)
          .map_err(|_| AssemblyErrorKind::ImmediateOutOfRange(digits.to_string()))?
      }
      Value::Reference(name) => {
        let address = self.labels.reference(name, number)?;
        if address == UNRESOLVED_ADDRESS {
          self.unresolved += 1;
        }
        address
      }
    };

    Ok(Operand::new(mode, value))
  }
}

/// The address of the next instruction, which must lie below the sentinel.
fn current_address(address: u64) -> Result<Word, AssemblyErrorKind> {
  match Word::try_from(address) {
    Ok(address) if address != UNRESOLVED_ADDRESS => Ok(address),
    _ => Err(AssemblyErrorKind::ProgramTooLarge)
  }
}

/// Assembles `source` against the standard instruction set with the default configuration.
pub fn assemble(source: &str) -> Result<Assembly, AssemblyError> {
  Assembler::new(&INSTRUCTION_SET, AssemblerConfig::default())?.assemble_lines(source.lines())
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::bytecode::Opcode;

  fn error_kind(source: &str) -> AssemblyErrorKind {
    assemble(source).unwrap_err().kind
  }

  #[test]
  fn small_program_assembles_to_four_records(){
    let assembly = assemble("mov x0 5\nmov x1 3\nadd x0 x0 x1\nhlt\n").unwrap();
    assert_eq!(assembly.len(), 4);

    let bytes = assembly.to_bytes();
    assert_eq!(bytes.len(), 4 * INSTRUCTION_WIDTH);
    // mov x0 5
    assert_eq!(&bytes[0..16], &[
      0x00, 0x00, 0x02, 0x02,
      0x00, 0x00, 0x00, 0x00,
      0x05, 0x00, 0x00, 0x00,
      0x00, 0x00, 0x00, 0x00
    ]);
    // add x0 x0 x1: all three slots are direct registers.
    assert_eq!(assembly.encode()[2].header, 0x0302_0202);
    assert_eq!(assembly.instructions[3].opcode(), Opcode::Hlt);
    assert_eq!(assembly.instructions[3].address, 0x30);
  }

  #[test]
  fn operands_take_every_addressing_mode(){
    let assembly = assemble("add *x1 *10 xA\nmov x0 ff").unwrap();
    assert_eq!(
      assembly.instructions[0].operands(),
      &[Operand::indirect(1), Operand::memory(0x10), Operand::register(0xa)]
    );
    assert_eq!(assembly.instructions[1].operands()[1], Operand::immediate(0xff));
    // The markers may come in either order.
    assert_eq!(assemble("out x*2").unwrap().instructions[0].operands(), &[Operand::indirect(2)]);
  }

  #[test]
  fn forward_references_are_resolved_on_the_second_pass(){
    let source = vec!["baw :end", "mov x0 1", ":end", "hlt"];
    let mut assembler = Assembler::new(&INSTRUCTION_SET, AssemblerConfig::default()).unwrap();

    let first = assembler.pass(source.iter()).unwrap();
    assert!(first.has_unresolved());
    assert_eq!(first.instructions[0].operands()[0].value, UNRESOLVED_ADDRESS);
    assert_eq!(assembler.labels().find("end").map(|label| label.address), Some(0x20));

    let second = assembler.pass(source.iter()).unwrap();
    assert!(!second.has_unresolved());
    assert_eq!(second.instructions[0].operands(), &[Operand::immediate(0x20)]);
  }

  #[test]
  fn literal_sentinel_is_not_an_unresolved_reference(){
    let source = vec!["mov x0 ffffffff", "hlt"];
    let mut assembler = Assembler::new(&INSTRUCTION_SET, AssemblerConfig::default()).unwrap();

    let pass = assembler.pass(source.iter()).unwrap();
    assert_eq!(pass.instructions[0].operands()[1], Operand::immediate(UNRESOLVED_ADDRESS));
    assert_eq!(pass.unresolved, 0);
    assert!(!pass.has_unresolved());

    let first = assembler.pass(["baw :end", "baw :end", ":end"].iter()).unwrap();
    assert_eq!(first.unresolved, 2);
  }

  #[test]
  fn backward_references_and_symbols(){
    let assembly = assemble(":top\nmov x0 1\n:done\nbne x0 0 :top\nhlt").unwrap();
    assert_eq!(assembly.instructions[1].operands()[2], Operand::immediate(0));
    assert_eq!(assembly.symbols.get_address("top"), Some(0));
    assert_eq!(assembly.symbols.get_address("done"), Some(0x10));
  }

  #[test]
  fn labels_may_carry_a_flag(){
    let assembly = assemble("mov x0 *:buffer\n:buffer\nhlt").unwrap();
    assert_eq!(assembly.instructions[0].operands()[1], Operand::memory(0x10));
  }

  #[test]
  fn undefined_label_is_reported_at_its_first_reference(){
    let error = assemble("mov x0 1\nbaw :nowhere\nbaw :nowhere\nhlt").unwrap_err();
    assert_eq!(
      error,
      AssemblyError::new(2, AssemblyErrorKind::UndefinedLabel("nowhere".to_string()))
    );
  }

  #[test]
  fn labels_may_only_be_redefined_in_place(){
    assert!(assemble(":a\n:a\nhlt").is_ok());
    assert_eq!(
      assemble(":a\nhlt\n:a\nhlt").unwrap_err(),
      AssemblyError::new(3, AssemblyErrorKind::LabelRedefinition {
        name     : "a".to_string(),
        previous : 0,
        current  : 0x10
      })
    );
  }

  #[test]
  fn comments_and_blank_lines(){
    let source = "; header comment\n\n  \t\nmov x0 1 ; trailing\r\n:end;after\nhlt\0junk";
    let assembly = assemble(source).unwrap();
    assert_eq!(assembly.len(), 2);
    assert_eq!(assembly.symbols.get_address("end"), Some(0x10));
  }

  #[test]
  fn malformed_labels(){
    assert_eq!(error_kind(":"), AssemblyErrorKind::MalformedLabel(":".to_string()));
    assert_eq!(error_kind(":loop x"), AssemblyErrorKind::MalformedLabel(":loop x".to_string()));
    assert_eq!(error_kind(":loop1"), AssemblyErrorKind::MalformedLabel(":loop1".to_string()));
    assert_eq!(error_kind("baw :"), AssemblyErrorKind::MalformedLabel(":".to_string()));
  }

  #[test]
  fn unknown_mnemonics(){
    assert_eq!(error_kind("nop"), AssemblyErrorKind::UnknownMnemonic("nop".to_string()));
    assert_eq!(error_kind("MOV x0 1"), AssemblyErrorKind::UnknownMnemonic("MOV".to_string()));
    assert_eq!(error_kind("movx0 1"), AssemblyErrorKind::UnknownMnemonic("movx".to_string()));
  }

  #[test]
  fn operand_counts_are_checked(){
    assert_eq!(
      error_kind("add x0 x1"),
      AssemblyErrorKind::TooFewOperands { mnemonic: "add", expected: 3, found: 2 }
    );
    assert_eq!(
      error_kind("hlt 1"),
      AssemblyErrorKind::TooManyOperands { mnemonic: "hlt", expected: 0 }
    );
    assert_eq!(
      error_kind("out x0 x1"),
      AssemblyErrorKind::TooManyOperands { mnemonic: "out", expected: 1 }
    );
  }

  #[test]
  fn malformed_flags(){
    assert_eq!(error_kind("mov xx0 1"), AssemblyErrorKind::MalformedFlag("xx".to_string()));
    assert_eq!(error_kind("mov **0 1"), AssemblyErrorKind::MalformedFlag("**".to_string()));
    assert_eq!(error_kind("mov x *1"), AssemblyErrorKind::MalformedFlag("x".to_string()));
  }

  #[test]
  fn unknown_tokens(){
    assert_eq!(
      error_kind("mov x0 1g"),
      AssemblyErrorKind::UnknownToken { token: 'g', text: "1g".to_string() }
    );
    assert_eq!(
      error_kind("mov x0 #1"),
      AssemblyErrorKind::UnknownToken { token: '#', text: "#1".to_string() }
    );
    assert_eq!(
      error_kind("5 mov"),
      AssemblyErrorKind::UnknownToken { token: '5', text: "5 mov".to_string() }
    );
  }

  #[test]
  fn immediates_must_fit_in_a_word(){
    assert!(assemble("mov x0 ffffffff").is_ok());
    assert!(assemble("mov x0 000000001").is_ok());
    assert_eq!(
      error_kind("mov x0 100000000"),
      AssemblyErrorKind::ImmediateOutOfRange("100000000".to_string())
    );
  }

  #[test]
  fn errors_carry_the_line_number(){
    let error = assemble("mov x0 1\n\nbogus\n").unwrap_err();
    assert_eq!(error.line, 3);
    assert_eq!(error.to_string(), "line 3: unknown mnemonic `bogus`");
  }

  #[test]
  fn small_capacities_grow(){
    let config = AssemblerConfig { label_capacity: 1, instruction_capacity: 1 };
    let source: Vec<String> =
      (0..10).map(|i| format!(":{}\nout {:x}", "l".repeat(i + 1), i)).collect();
    let assembly =
      Assembler::new(&INSTRUCTION_SET, config)
        .unwrap()
        .assemble_lines(source.iter().flat_map(|chunk| chunk.lines()))
        .unwrap();
    assert_eq!(assembly.len(), 10);
    assert_eq!(assembly.symbols.len(), 10);
    assert_eq!(assembly.symbols.get_address("llllllllll"), Some(0x90));
  }
}
