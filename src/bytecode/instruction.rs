use std::fmt::{Display, Formatter};

use bimap::BiMap;
use lazy_static::lazy_static;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum::IntoEnumIterator;
use strum_macros::{Display as StrumDisplay, EnumCount, EnumIter, IntoStaticStr};

use crate::bytecode::Word;

/**
  Opcodes of the virtual machine.

  Every memory cell is a `Word`, and an opcode is simply a word that the instruction pointer
  lands on. The numeric value of each variant is part of the image format, so the order the
  opcodes are listed below is significant and must never change. `PUSH` and `PUSHIP` are the
  only opcodes that own the word following them.

  There is no halt opcode. A program halts by jumping to the jump instruction itself, see
  `Machine::load_halt`.
*/
#[derive(
  StrumDisplay, IntoStaticStr, EnumIter, EnumCount, TryFromPrimitive, IntoPrimitive,
  Clone,        Copy,          Eq,       PartialEq, Debug,            Hash
)]
#[strum(serialize_all = "UPPERCASE")]
#[repr(i32)]
pub enum Opcode {
  Nop,     // advance
  Add,     // pop b, pop a, push a + b
  Sub,     // pop b, pop a, push b - a
  And,     // pop b, pop a, push a & b
  Or,      // pop b, pop a, push a | b
  Xor,     // pop b, pop a, push a ^ b
  Not,     // pop a, push 1 if a == 0 else 0
  In,      // read one byte from input, push as word
  Out,     // pop one word and write its low byte to output
  Load,    // pop a, push the word at address a
  Stor,    // pop a, pop b, write b to address a
  Jmp,     // pop a, goto a
  Jz,      // pop a, pop b, if a == 0 goto b
  Push,    // push the next word
  Dup,     // duplicate the top of stack
  Swap,    // swap the top two words
  Rol3,    // rotate the top three words left, (a b c) -> (b c a)
  OutNum,  // pop one word and write it to output as a decimal number
  Jnz,     // pop a, pop b, if a != 0 goto b
  Drop,    // remove the top of stack
  PushIp,  // push the next word onto the IP stack
  PopIp,   // pop the IP stack into IP, a jump
  DropIp,  // pop the IP stack without jumping
  Compl,   // pop a, push !a (bitwise)
}

lazy_static! {
  /// Bidirectional opcode <-> canonical mnemonic table. Mnemonics are upper case.
  static ref MNEMONICS: BiMap<Opcode, &'static str> =
    Opcode::iter()
      .map(|opcode| {
        let mnemonic: &'static str = opcode.into();
        (opcode, mnemonic)
      })
      .collect();
}

impl Opcode {
  pub fn code(&self) -> Word {
    Into::<Word>::into(*self)
  }

  /// Looks up an opcode by mnemonic, ignoring case.
  pub fn from_mnemonic(text: &str) -> Option<Opcode> {
    MNEMONICS.get_by_right(text.to_ascii_uppercase().as_str()).copied()
  }

  pub fn mnemonic(&self) -> &'static str {
    MNEMONICS.get_by_left(self).copied().unwrap_or("<?>")
  }

  /// Decodes a word into an opcode if the word is a valid opcode.
  pub fn from_word(word: Word) -> Option<Opcode> {
    Opcode::try_from(word).ok()
  }

  /// Whether the word following the opcode is an operand rather than the next instruction.
  pub fn has_operand(&self) -> bool {
    matches!(self, Opcode::Push | Opcode::PushIp)
  }

  /// Returns the size in WORDS of an instruction for this opcode.
  pub fn size(&self) -> Word {
    match self.has_operand() {
      true  => 2,
      false => 1
    }
  }
}


/// A decoded instruction, as the disassembler sees it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Instruction {
  /// [Opcode][Operand]
  Operand {
    opcode  : Opcode,
    operand : Word
  },
  /// [Opcode]
  Nullary(Opcode),
  /// A word that is not a valid opcode.
  Unknown(Word),
}

impl Instruction {
  /// Decodes the instruction starting at `words[0]`. A missing operand word reads as `NOP`.
  pub fn decode(words: &[Word]) -> Option<Instruction> {
    let (first, rest) = words.split_first()?;
    let instruction =
      match Opcode::from_word(*first) {
        Some(opcode) if opcode.has_operand() => {
          Instruction::Operand {
            opcode,
            operand: rest.first().copied().unwrap_or(Opcode::Nop.code())
          }
        }
        Some(opcode) => Instruction::Nullary(opcode),
        None         => Instruction::Unknown(*first)
      };
    Some(instruction)
  }

  pub fn size(&self) -> Word {
    match self {
      Instruction::Operand { opcode, .. } => opcode.size(),
      _                                   => 1
    }
  }
}

/// Whether an operand is worth annotating with its character value.
fn is_printable(word: Word) -> bool {
  (32..=127).contains(&word) || word == '\n' as Word || word == '\r' as Word || word == '\t' as Word
}

fn escape(c: char) -> String {
  match c {
    '\t' => "\\t".to_string(),
    '\n' => "\\n".to_string(),
    '\r' => "\\r".to_string(),
    c    => c.to_string()
  }
}

impl Display for Instruction {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {

      Instruction::Operand { opcode, operand } => {
        write!(f, "{} 0x{:x}", opcode, operand)?;
        if is_printable(*operand) {
          // `is_printable` guarantees the operand is a valid `char`.
          write!(f, " ('{}')", escape(*operand as u8 as char))?;
        }
        Ok(())
      }

      Instruction::Nullary(opcode) => {
        write!(f, "{}", opcode)
      }

      Instruction::Unknown(_) => {
        write!(f, "<?>")
      }

    }
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use strum::EnumCount;

  #[test]
  fn opcode_values_are_fixed(){
    assert_eq!(Opcode::Nop.code(), 0);
    assert_eq!(Opcode::Sub.code(), 2);
    assert_eq!(Opcode::Jmp.code(), 11);
    assert_eq!(Opcode::Push.code(), 13);
    assert_eq!(Opcode::OutNum.code(), 17);
    assert_eq!(Opcode::PushIp.code(), 20);
    assert_eq!(Opcode::Compl.code(), 23);
    assert_eq!(Opcode::COUNT, 24);
  }

  #[test]
  fn mnemonics(){
    assert_eq!(Opcode::from_mnemonic("push"), Some(Opcode::Push));
    assert_eq!(Opcode::from_mnemonic("PushIP"), Some(Opcode::PushIp));
    assert_eq!(Opcode::from_mnemonic("OUTNUM"), Some(Opcode::OutNum));
    assert_eq!(Opcode::from_mnemonic("rol3"), Some(Opcode::Rol3));
    assert_eq!(Opcode::from_mnemonic("HALT"), None);
    assert_eq!(Opcode::from_mnemonic(""), None);
    assert_eq!(Opcode::DropIp.mnemonic(), "DROPIP");
    assert_eq!(format!("{}", Opcode::Stor), "STOR");
  }

  #[test]
  fn every_opcode_round_trips_through_its_word(){
    for opcode in Opcode::iter() {
      assert_eq!(Opcode::from_word(opcode.code()), Some(opcode));
      assert_eq!(Opcode::from_mnemonic(opcode.mnemonic()), Some(opcode));
    }
    assert_eq!(Opcode::from_word(24), None);
    assert_eq!(Opcode::from_word(-1), None);
  }

  #[test]
  fn decode_and_display(){
    let words = [Opcode::Push.code(), 'A' as Word, Opcode::Jmp.code()];
    let push = Instruction::decode(&words).unwrap();
    assert_eq!(push, Instruction::Operand { opcode: Opcode::Push, operand: 65 });
    assert_eq!(push.size(), 2);
    assert_eq!(format!("{}", push), "PUSH 0x41 ('A')");

    let jmp = Instruction::decode(&words[2..]).unwrap();
    assert_eq!(format!("{}", jmp), "JMP");

    let newline = Instruction::Operand { opcode: Opcode::Push, operand: 10 };
    assert_eq!(format!("{}", newline), "PUSH 0xa ('\\n')");

    let big = Instruction::Operand { opcode: Opcode::PushIp, operand: 400 };
    assert_eq!(format!("{}", big), "PUSHIP 0x190");

    assert_eq!(format!("{}", Instruction::decode(&[99]).unwrap()), "<?>");
    assert_eq!(Instruction::decode(&[]), None);
  }

}
