/*!
  A small stack machine in the Forth/PostScript tradition: a word-addressed memory holding both
  program and data, a data stack, a return-address ("IP") stack, and two dozen instructions.
  Programs are written in a whitespace separated assembly language, assembled directly into a
  machine's memory, and may be saved as bytecode images and loaded again later.

  ```ignore
  let mut machine = Machine::new(Box::new(|error: Error| eprintln!("{}", error)));
  let assembly    = assemble(&mut machine, "'h' OUT 'i' OUT 10 OUT");
  machine.run(0, &mut std::io::stdin(), &mut std::io::stdout());
  ```
*/

pub mod address;
pub mod bytecode;
pub mod disassembler;
pub mod error;
pub mod symboltable;
pub mod tokenizer;
pub mod vm;

pub use address::Address;
pub use bytecode::{assembly::{assemble, Assembler, Assembly}, Instruction, Opcode, Word};
pub use error::{AssemblyError, CollectErrors, Error, ErrorSink, FormatError, RuntimeError};
pub use vm::Machine;
