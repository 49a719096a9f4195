//! Command line front end: assemble, disassemble and run programs. All file handling lives here.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use regvm::{assemble, disassemble, Assembly, Cpu, CpuConfig, Listing, INSTRUCTION_SET};

#[derive(Parser)]
#[command(name = "regvm")]
#[command(version)]
#[command(about = "Assembler, disassembler and interpreter for a small register machine", long_about = None)]
struct Cli {
  /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` takes precedence.
  #[arg(short, long, action = clap::ArgAction::Count, global = true)]
  verbose: u8,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Assemble a source file into a binary program
  Asm {
    #[arg(value_name = "SOURCE")]
    source: PathBuf,

    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Also print the listing with resolved labels
    #[arg(short, long)]
    listing: bool,
  },

  /// Print a binary program as assembly
  Disasm {
    #[arg(value_name = "BINARY")]
    binary: PathBuf,

    /// Write the listing to a file instead of stdout
    #[arg(value_name = "OUTPUT")]
    output: Option<PathBuf>,
  },

  /// Run a binary program, reading `inp` values from stdin
  Run {
    #[arg(value_name = "BINARY")]
    binary: PathBuf,

    #[command(flatten)]
    machine: MachineArgs,
  },

  /// Assemble a source file in memory and run it
  Exec {
    #[arg(value_name = "SOURCE")]
    source: PathBuf,

    #[command(flatten)]
    machine: MachineArgs,
  },
}

#[derive(Args)]
struct MachineArgs {
  /// Print the machine state when the program stops
  #[arg(short, long)]
  dump: bool,

  /// Initial data stack capacity in bytes
  #[arg(long, value_name = "BYTES")]
  data_stack: Option<usize>,

  /// Initial call stack capacity in return addresses
  #[arg(long, value_name = "FRAMES")]
  call_stack: Option<usize>,

  /// Largest program accepted, in bytes
  #[arg(long, value_name = "BYTES")]
  max_program: Option<usize>,
}

impl MachineArgs {
  fn config(&self) -> CpuConfig {
    let defaults = CpuConfig::default();
    CpuConfig {
      data_stack_capacity : self.data_stack.unwrap_or(defaults.data_stack_capacity),
      call_stack_capacity : self.call_stack.unwrap_or(defaults.call_stack_capacity),
      max_program_size    : self.max_program.unwrap_or(defaults.max_program_size),
    }
  }
}

fn main() {
  let cli = Cli::parse();

  let default_level = match cli.verbose {
    0 => "warn",
    1 => "debug",
    _ => "trace"
  };
  tracing_subscriber::registry()
    .with(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_level.into()),
    )
    .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
    .init();

  let result = match cli.command {
    Commands::Asm { source, output, listing } => asm_command(&source, &output, listing),
    Commands::Disasm { binary, output }      => disasm_command(&binary, output.as_deref()),
    Commands::Run { binary, machine }        => run_command(&binary, &machine),
    Commands::Exec { source, machine }       => exec_command(&source, &machine),
  };

  if let Err(e) = result {
    eprintln!("{} {:#}", "error:".red().bold(), e);
    std::process::exit(1);
  }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
  fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))
}

fn assemble_file(path: &Path) -> Result<Assembly> {
  let source = read_file(path)?;
  assemble(&String::from_utf8_lossy(&source))
    .with_context(|| format!("Failed to assemble {}", path.display()))
}

fn asm_command(source: &Path, output: &Path, listing: bool) -> Result<()> {
  let assembly = assemble_file(source)?;

  fs::write(output, assembly.to_bytes())
    .with_context(|| format!("Failed to write file: {}", output.display()))?;

  if listing {
    print!("{}", assembly.listing());
  }
  eprintln!(
    "{} {} instructions, {} labels -> {}",
    "assembled".green().bold(),
    assembly.len(),
    assembly.symbols.len(),
    output.display()
  );
  Ok(())
}

fn disasm_command(binary: &Path, output: Option<&Path>) -> Result<()> {
  let bytes = read_file(binary)?;
  let instructions =
    disassemble(&bytes, &INSTRUCTION_SET)
      .with_context(|| format!("Failed to disassemble {}", binary.display()))?;
  let listing = Listing::new(&instructions, None).to_string();

  match output {
    Some(path) => {
      fs::write(path, listing)
        .with_context(|| format!("Failed to write file: {}", path.display()))?
    }
    None => print!("{}", listing)
  }
  Ok(())
}

fn run_command(binary: &Path, machine: &MachineArgs) -> Result<()> {
  let bytes = read_file(binary)?;
  execute(&bytes, machine)
}

fn exec_command(source: &Path, machine: &MachineArgs) -> Result<()> {
  let bytes = assemble_file(source)?.to_bytes();
  execute(&bytes, machine)
}

fn execute(program: &[u8], machine: &MachineArgs) -> Result<()> {
  let mut cpu = Cpu::new(program, &INSTRUCTION_SET, machine.config())?;

  let stdin  = io::stdin();
  let stdout = io::stdout();
  let mut input  = stdin.lock();
  let mut output = stdout.lock();

  let result = cpu.run(&mut input, &mut output);
  output.flush()?;

  if machine.dump {
    eprintln!("{}", cpu);
  }
  result.with_context(|| format!("Program faulted at {:#x}", cpu.rpc()))
}
