use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use strum::IntoEnumIterator;

use stackvm::address::WORD_SIZE;
use stackvm::{assemble, disassembler, Error, ErrorSink, Machine, Opcode};

/// A stack-based virtual machine with an assembler and disassembler
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Assemble source to bytecode. Each image is written beside its source with a `.bin`
  /// extension, or to `out.bin` when reading standard input.
  #[command(alias = "smc")]
  Compile {
    /// Source files, `-` for standard input
    files: Vec<PathBuf>,
  },

  /// Run bytecode images from address zero
  #[command(alias = "smr")]
  Run {
    /// Print the instruction set and exit
    #[arg(long, short = 'i')]
    instructions: bool,

    /// Image files, `-` for standard input
    files: Vec<PathBuf>,
  },

  /// Assemble and run source on the fly
  #[command(alias = "sm")]
  Interpret {
    /// Source files, `-` for standard input
    files: Vec<PathBuf>,
  },

  /// Print a listing of bytecode images
  #[command(alias = "smd")]
  Disassemble {
    /// Image files, `-` for standard input
    files: Vec<PathBuf>,
  },
}

/// Where a program comes from. No files at all, or `-`, means standard input.
enum Source {
  Stdin,
  File(PathBuf),
}

impl Source {
  fn all(files: &[PathBuf]) -> Vec<Source> {
    if files.is_empty() {
      return vec![Source::Stdin];
    }
    files
      .iter()
      .map(|path| match path.to_str() {
        Some("-") => Source::Stdin,
        _         => Source::File(path.clone()),
      })
      .collect()
  }

  fn name(&self) -> String {
    match self {
      Source::Stdin      => "<stdin>".to_string(),
      Source::File(path) => path.display().to_string(),
    }
  }

  fn reader(&self) -> Result<Box<dyn Read>> {
    match self {
      Source::Stdin      => Ok(Box::new(io::stdin())),
      Source::File(path) => {
        let file = File::open(path).with_context(|| format!("failed to open {:?}", path))?;
        Ok(Box::new(BufReader::new(file)))
      }
    }
  }

  fn read_to_string(&self) -> Result<String> {
    let mut text = String::new();
    self.reader()?
        .read_to_string(&mut text)
        .with_context(|| format!("failed to read {}", self.name()))?;
    Ok(text)
  }

  /// The image file a compiled source is written to.
  fn image_path(&self) -> PathBuf {
    match self {
      Source::Stdin      => PathBuf::from("out.bin"),
      Source::File(path) => path.with_extension("bin"),
    }
  }
}

/// Runtime errors go to standard error as they happen; execution carries on.
fn runtime_errors() -> Box<dyn ErrorSink> {
  Box::new(|error: Error| eprintln!("{}", error))
}

/// Assembles a source into a fresh machine, failing if any error was reported.
fn assemble_source(source: &Source) -> Result<Machine> {
  let text = source.read_to_string()?;
  let name = source.name();

  let sink_name   = name.clone();
  let mut machine = Machine::new(Box::new(move |error: Error| eprintln!("{}:{}", sink_name, error)));
  let assembly    = assemble(&mut machine, &text);

  if !assembly.is_ok() {
    bail!("{}: {} assembly error(s)", name, assembly.errors);
  }
  info!("assembled {}: {} bytes, {} labels", name, machine.size(), assembly.labels.len());
  Ok(machine)
}

fn load_source(source: &Source) -> Result<Machine> {
  let mut machine = Machine::new(runtime_errors());
  machine
    .load_image(source.reader()?)
    .with_context(|| format!("failed to load program from {}", source.name()))?;
  info!("loaded {}: {} bytes", source.name(), machine.size());
  Ok(machine)
}

fn run_machine(machine: &mut Machine) -> Result<()> {
  let stdin  = io::stdin();
  let stdout = io::stdout();
  let mut output = stdout.lock();

  machine.run(0, &mut stdin.lock(), &mut output);
  output.flush().context("failed to flush output")?;
  Ok(())
}

fn compile(source: &Source) -> Result<()> {
  let machine = assemble_source(source)?;
  let path    = source.image_path();

  let mut file = File::create(&path).with_context(|| format!("failed to create {:?}", path))?;
  machine
    .save_image(&mut file)
    .with_context(|| format!("failed to write {:?}", path))?;

  println!("Compiled {} to {}", source.name(), path.display());
  Ok(())
}

fn disassemble(source: &Source) -> Result<()> {
  let machine = load_source(source)?;
  let stdout  = io::stdout();
  let mut output = stdout.lock();

  match source {
    Source::Stdin   => writeln!(output, "; From stdin --- {} bytes", machine.size())?,
    Source::File(_) => writeln!(output, "; File {} --- {} bytes", source.name(), machine.size())?,
  }
  disassembler::disassemble(machine.program(), None, &mut output)?;
  output.flush()?;
  Ok(())
}

fn print_instructions() {
  println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

  println!("\nOpcodes:");
  for opcode in Opcode::iter() {
    println!("0x{:x} = {}", opcode.code(), opcode);
  }

  println!("\nTo halt program, jump to current position:");
  let mut machine = Machine::with_size(4 * WORD_SIZE, Box::new(|_: Error| {}));
  machine.load_halt();
  print!("{}", disassembler::listing(machine.program(), None));

  println!("\nWord size is {} bytes", WORD_SIZE);
}

fn main() -> Result<()> {
  let env = env_logger::Env::default()
      .filter_or("STACKVM_LOG", "warn")
      .write_style_or("STACKVM_LOG_STYLE", "auto");
  env_logger::init_from_env(env);

  #[cfg(feature = "trace_computation")]
  info!("Computation Tracing ENABLED");

  let args = Args::parse();

  match args.command {

    Command::Compile { files } => {
      for source in Source::all(&files) {
        compile(&source)?;
      }
    }

    Command::Run { instructions: true, .. } => print_instructions(),

    Command::Run { files, .. } => {
      for source in Source::all(&files) {
        let mut machine = load_source(&source)?;
        run_machine(&mut machine)?;
      }
    }

    Command::Interpret { files } => {
      for source in Source::all(&files) {
        let mut machine = assemble_source(&source)?;
        run_machine(&mut machine)?;
      }
    }

    Command::Disassemble { files } => {
      for source in Source::all(&files) {
        disassemble(&source)?;
      }
    }

  }

  Ok(())
}
