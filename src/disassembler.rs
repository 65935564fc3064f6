/*!
  Renders program memory as an assembly-like listing, one instruction per line:

  ```text
  loop:
  0x8 DUP
  0xc OUTNUM
  0x10 PUSH 0x20 (' ')
  ```

  The listing is for reading, not for reassembly: operands print in hexadecimal and words that
  are not opcodes print as `<?>`.
*/

use std::fmt::{Display, Formatter};
use std::io::Write;

use crate::address::{self, Address};
use crate::bytecode::{Instruction, Word};
use crate::symboltable::LabelTable;

/// Walks a slice of words instruction by instruction, yielding each with its address.
pub struct Instructions<'a> {
  words : &'a [Word],
  next  : usize
}

impl<'a> Instructions<'a> {
  pub fn new(words: &'a [Word]) -> Self {
    Instructions { words, next: 0 }
  }
}

impl<'a> Iterator for Instructions<'a> {
  type Item = (Address, Instruction);

  fn next(&mut self) -> Option<Self::Item> {
    let instruction = Instruction::decode(self.words.get(self.next..)?)?;
    let address     = address::from_idx(self.next);
    self.next      += instruction.size() as usize;
    Some((address, instruction))
  }
}

/// The listing of a slice of words, which are assumed to start at address zero. Labels are
/// printed on their own line before the instruction they mark.
pub struct Listing<'a> {
  words  : &'a [Word],
  labels : Option<&'a LabelTable>
}

impl<'a> Listing<'a> {
  pub fn new(words: &'a [Word], labels: Option<&'a LabelTable>) -> Self {
    Listing { words, labels }
  }
}

impl<'a> Display for Listing<'a> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    for (address, instruction) in Instructions::new(self.words) {
      if let Some(labels) = self.labels {
        for label in labels.get_labels(address) {
          writeln!(f, "{}:", label.name)?;
        }
      }
      writeln!(f, "0x{:x} {}", address, instruction)?;
    }
    Ok(())
  }
}

/// Writes the listing of `words` to `output`.
pub fn disassemble<W: Write>(
    words  : &[Word],
    labels : Option<&LabelTable>,
    output : &mut W
  ) -> std::io::Result<()>
{
  write!(output, "{}", Listing::new(words, labels))
}

/// The listing of `words` as a string.
pub fn listing(words: &[Word], labels: Option<&LabelTable>) -> String {
  Listing::new(words, labels).to_string()
}
