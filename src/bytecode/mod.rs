/*!

  The VM uses a 32 bit signed word for everything: opcodes, operands, stack elements and
  addresses. Memory is a flat array of words addressed by byte offset, so consecutive cells are
  four addresses apart. An instruction is one word (the opcode) except for `PUSH` and `PUSHIP`,
  which are followed by one operand word. Nothing in memory distinguishes an opcode from an
  operand; the instruction pointer landing on a cell is what makes it an opcode.

  A bytecode image is memory from address 0 through the last non-`NOP` word, each word written
  as four little-endian bytes. There is no header and no length prefix: the end of the stream
  is the end of the program.

  The human readable form of bytecode is assembly. `assembly` translates whitespace separated
  mnemonics, literals and labels directly into a machine's memory.

*/

mod binary;
mod instruction;
pub mod assembly;

pub use binary::{decode_word, encode_word, write_image, ImageReader, ENCODED_WORD_SIZE};
pub use instruction::{Instruction, Opcode};

// If you change this you must also change `encode_word` and `decode_word`.
pub type Word = i32;
