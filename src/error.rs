/*!
  Error taxonomy for the assembler, the image codec and the execution engine.

  Neither the assembler nor the machine stops on an error. Errors are handed to the `ErrorSink`
  supplied when the machine is constructed, and the offending instruction or token degrades to a
  safe default. Whether to abort is the sink's decision. The image codec is the exception: it
  returns its `FormatError` to the caller, since a partially loaded image is not worth running.
*/

use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

use crate::address::Address;
use crate::bytecode::Word;

/// Errors raised while executing instructions.
#[derive(Error, Debug)]
pub enum RuntimeError {
  #[error("POP empty stack")]
  StackUnderflow,

  #[error("POP empty IP stack")]
  IpStackUnderflow,

  #[error("{operation}: address {address} out of bounds")]
  OutOfBounds { operation: &'static str, address: Address },

  #[error("{operation}: address {address} is not word aligned")]
  Misaligned { operation: &'static str, address: Address },

  #[error("IP < 0: {0}")]
  NegativeInstructionPointer(Address),

  #[error("Unknown instruction: {opcode} at {address}")]
  UnknownInstruction { opcode: Word, address: Address },

  #[error("Output error: {0}")]
  Output(#[from] std::io::Error),
}

/// Errors raised while translating assembly source. Every variant records the source line.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum AssemblyError {
  #[error("{line}: Code label not found: {name}")]
  UnresolvedLabel { line: usize, name: String },

  #[error("{line}: Label is reserved: {name}")]
  ReservedLabel { line: usize, name: String },

  #[error("{line}: Empty label name")]
  EmptyLabel { line: usize },

  #[error("{line}: Unknown character literal: {token}")]
  MalformedCharLiteral { line: usize, token: String },

  #[error("{line}: Number literal out of range: {token}")]
  NumberOutOfRange { line: usize, token: String },

  #[error("{line}: Program does not fit in {capacity} bytes of memory")]
  ProgramTooLarge { line: usize, capacity: Address },
}

/// Errors raised while loading a bytecode image.
#[derive(Error, Debug)]
pub enum FormatError {
  #[error("incomplete read: got {bytes} bytes, expected 4")]
  Truncated { bytes: usize },

  #[error("image does not fit in {capacity} bytes of memory")]
  TooLarge { capacity: Address },

  #[error("read error: {0}")]
  Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum Error {
  #[error(transparent)]
  Runtime(#[from] RuntimeError),

  #[error(transparent)]
  Assembly(#[from] AssemblyError),

  #[error(transparent)]
  Format(#[from] FormatError),
}


/// Receives every error the assembler and the machine report.
pub trait ErrorSink {
  fn report(&mut self, error: Error);
}

impl<F> ErrorSink for F
  where F: FnMut(Error)
{
  fn report(&mut self, error: Error) {
    self(error)
  }
}

/// Lets a caller keep a handle on a sink it has given to a machine.
impl<S> ErrorSink for Rc<RefCell<S>>
  where S: ErrorSink + ?Sized
{
  fn report(&mut self, error: Error) {
    self.borrow_mut().report(error)
  }
}

/// A sink that keeps every reported error, in order.
#[derive(Debug, Default)]
pub struct CollectErrors {
  pub errors: Vec<Error>
}

impl CollectErrors {
  pub fn new() -> Self {
    CollectErrors::default()
  }

  pub fn messages(&self) -> Vec<String> {
    self.errors.iter().map(Error::to_string).collect()
  }
}

impl ErrorSink for CollectErrors {
  fn report(&mut self, error: Error) {
    self.errors.push(error);
  }
}
