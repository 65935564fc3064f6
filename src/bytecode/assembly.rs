/*!
  The human readable textual form of bytecode is called assembly. The assembler reads one token
  at a time and writes words straight into a machine's memory with the machine's own load
  primitives, so an assembled program and a loaded image occupy memory identically.

  Source syntax:

    * `; ...` comments out the rest of the line. The `;` must begin a token.
    * `name:` defines a label at the current emit position.
    * `&name` pushes the address of a label. Labels defined later are patched in at the end.
    * `123` pushes an unsigned decimal number. There is no syntax for negative numbers.
    * `'c'`, `'\t'`, `'\r'`, `'\n'`, `'\0'` push a character's ordinal.
    * Directly after the mnemonic `PUSH` or `PUSHIP`, one of the three forms above is the
      instruction's operand, so `PUSH 5` and `5` assemble to the same two words.
    * `HALT`, and the end of input, emit the halt idiom `PUSH <here + 8> JMP`.
    * Mnemonics (case-insensitive) emit their opcode.
    * Anything else is a call to a function defined (anywhere) by that label.

  A call always occupies five words:

  ```text
  PUSHIP <return address>  PUSH <function address>  JMP
  ```

  and the function returns with `POPIP`. Function addresses are always patched at the end of
  input, so a call may precede or follow the definition it names.
*/

use log::{debug, warn};
use nom::{
  branch::alt,
  character::complete::{anychar, char as one_char, digit1, satisfy},
  combinator::{all_consuming, map},
  sequence::{delimited, preceded},
  IResult
};

use crate::address::{self, Address};
use crate::bytecode::{Opcode, Word};
use crate::error::AssemblyError;
use crate::symboltable::{is_reserved, ForwardPatches, LabelTable};
use crate::tokenizer::Tokenizer;
use crate::vm::Machine;

/// Operand written where a label's address is not yet known.
pub const PLACEHOLDER: Word = -1;

/// What a single token means. `classify` checks these shapes in a fixed priority order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Lexeme<'a> {
  EndOfInput,
  Halt,
  Comment,
  LabelRef(&'a str),
  NumberLiteral(Word),
  CharLiteral(Word),
  /// Digits only, but too long to be a number.
  NumberOutOfRange(&'a str),
  /// A quoted backslash escape other than `\t`, `\r`, `\n` or `\0`.
  MalformedCharLiteral(&'a str),
  ForwardCall(&'a str),
  LabelDef(&'a str),
  Opcode(Opcode),
}

// Internally
use Lexeme as Lx;

enum CharShape {
  Plain(char),
  Escape(char)
}

fn number_literal(input: &str) -> IResult<&str, &str> {
  all_consuming(digit1)(input)
}

fn char_literal(input: &str) -> IResult<&str, CharShape> {
  all_consuming(
    delimited(
      one_char('\''),
      alt((
        map(preceded(one_char('\\'), anychar), CharShape::Escape),
        map(satisfy(|c| c != '\\'),            CharShape::Plain),
      )),
      one_char('\'')
    )
  )(input)
}

fn unescape(c: char) -> Option<Word> {
  match c {
    't' => Some('\t' as Word),
    'r' => Some('\r' as Word),
    'n' => Some('\n' as Word),
    '0' => Some(0),
    _   => None
  }
}

/// Classifies a token that is neither a label definition nor a mnemonic.
fn classify_literal(token: &str) -> Lexeme<'_> {
  if let Some(name) = token.strip_prefix('&') {
    return Lx::LabelRef(name);
  }

  if number_literal(token).is_ok() {
    return match token.parse::<i64>() {
      // Wraps to the word size.
      Ok(value) => Lx::NumberLiteral(value as Word),
      Err(_)    => Lx::NumberOutOfRange(token)
    };
  }

  match char_literal(token) {
    Ok((_, CharShape::Plain(c)))  => Lx::CharLiteral(c as Word),
    Ok((_, CharShape::Escape(c))) => match unescape(c) {
      Some(value) => Lx::CharLiteral(value),
      None        => Lx::MalformedCharLiteral(token)
    },
    Err(_)                        => Lx::ForwardCall(token)
  }
}

/**
  Classifies a token. The order of the checks is significant:

    1. the empty token is the end of input;
    2. `HALT`, in any case;
    3. a token starting with `;` is a comment;
    4. a token that is neither a label definition nor a mnemonic is a literal, a label
       reference, or failing those a forward call;
    5. a token ending in `:` defines a label;
    6. what remains is a mnemonic.
*/
pub fn classify(token: &str) -> Lexeme<'_> {
  if token.is_empty() {
    return Lx::EndOfInput;
  }
  if token.eq_ignore_ascii_case("HALT") {
    return Lx::Halt;
  }
  if token.starts_with(';') {
    return Lx::Comment;
  }

  match (token.strip_suffix(':'), Opcode::from_mnemonic(token)) {
    (None,       None)         => classify_literal(token),
    (Some(name), _)            => Lx::LabelDef(name),
    (None,       Some(opcode)) => Lx::Opcode(opcode)
  }
}


/// What the assembler leaves behind besides the program in memory.
#[derive(Clone, Debug, Default)]
pub struct Assembly {
  /// Every label defined in the source.
  pub labels : LabelTable,
  /// Number of errors reported to the machine's error sink.
  pub errors : usize
}

impl Assembly {
  pub fn is_ok(&self) -> bool {
    self.errors == 0
  }
}

/**
  Translates assembly source into the memory of a machine, starting at the machine's current
  position. Errors are reported to the machine's error sink; assembly carries on after each one
  so that every problem in the source is reported.
*/
pub struct Assembler<'m> {
  machine  : &'m mut Machine,
  labels   : LabelTable,
  forwards : ForwardPatches,
  errors   : usize,
  /// Set after an explicit `PUSH` or `PUSHIP`, whose operand is then the next literal.
  operand_pending: bool,
  /// Words free between the starting emit position and the end of memory.
  capacity : usize,
  emitted  : usize
}

impl<'m> Assembler<'m> {

  pub fn new(machine: &'m mut Machine) -> Self {
    let capacity = address::idx(machine.memory_size() - machine.pos());
    Assembler {
      machine,
      labels   : LabelTable::new(),
      forwards : ForwardPatches::new(),
      errors   : 0,
      operand_pending: false,
      capacity,
      emitted  : 0
    }
  }

  /// Assembles the whole of `source`, then patches every forward reference.
  pub fn assemble(mut self, source: &str) -> Assembly {
    let mut tokenizer = Tokenizer::new(source);
    loop {
      let token = tokenizer.next_token();
      if !self.compile_token(token, &mut tokenizer) {
        break;
      }
    }
    Assembly {
      labels : self.labels,
      errors : self.errors
    }
  }

  /// Compiles a single token. Returns `false` once the end of input has been compiled.
  pub fn compile_token(&mut self, token: &str, tokenizer: &mut Tokenizer) -> bool {
    let line    = tokenizer.line();
    let operand = std::mem::replace(&mut self.operand_pending, false);

    match classify(token) {

      Lx::EndOfInput => {
        self.emit_halt(line);
        self.resolve_forwards();
        return false;
      }

      Lx::Halt => self.emit_halt(line),

      Lx::Comment => {
        tokenizer.skip_to_end_of_line();
        self.operand_pending = operand;
      }

      Lx::LabelRef(name) => self.compile_label(name, line, operand),

      | Lx::NumberLiteral(value)
      | Lx::CharLiteral(value) => self.compile_literal(value, line, operand),

      Lx::NumberOutOfRange(token) => {
        self.report(AssemblyError::NumberOutOfRange { line, token: token.to_string() });
        self.compile_literal(0, line, operand);
      }

      Lx::MalformedCharLiteral(token) => {
        self.report(AssemblyError::MalformedCharLiteral { line, token: token.to_string() });
        self.compile_literal(0, line, operand);
      }

      Lx::ForwardCall(name) => self.compile_function_call(name, line),

      Lx::LabelDef(name) => self.define_label(name, line),

      Lx::Opcode(opcode) => {
        self.emit(opcode, line);
        self.operand_pending = opcode.has_operand();
      }

    }
    true
  }

  /// Writes a word at the emit position. The emit position wraps past the end of memory, so the
  /// first word beyond capacity is reported, since it overwrites the start of the program.
  fn emit_word(&mut self, word: Word, line: usize) {
    if self.emitted == self.capacity {
      let capacity = self.machine.memory_size();
      self.report(AssemblyError::ProgramTooLarge { line, capacity });
    }
    self.emitted += 1;
    self.machine.load_word(word);
  }

  fn emit(&mut self, opcode: Opcode, line: usize) {
    self.emit_word(opcode.code(), line);
  }

  /// `PUSH <address of the JMP> JMP`, the same words as `Machine::load_halt`.
  fn emit_halt(&mut self, line: usize) {
    self.emit(Opcode::Push, line);
    let jmp = address::offset(self.machine.pos(), 1);
    self.emit_word(jmp, line);
    self.emit(Opcode::Jmp, line);
  }

  fn report(&mut self, error: AssemblyError) {
    self.errors += 1;
    self.machine.report(error);
  }

  /// Looks up a label. `HERE` is always the current emit position.
  fn get_label_address(&self, name: &str) -> Option<Address> {
    match is_reserved(name) {
      true  => Some(self.machine.pos()),
      false => self.labels.get_address(name)
    }
  }

  fn define_label(&mut self, name: &str, line: usize) {
    if name.is_empty() {
      self.report(AssemblyError::EmptyLabel { line });
      return;
    }
    if is_reserved(name) {
      self.report(AssemblyError::ReservedLabel { line, name: name.to_string() });
      return;
    }

    let address = self.machine.pos();
    match self.labels.insert(name, address) {
      Ok(()) => debug!("label {} = 0x{:x}", name, address),
      Err(existing) => {
        warn!(
          "line {}: label {} already defined at 0x{:x}, ignoring redefinition",
          line, existing.name, existing.address
        );
      }
    }
  }

  /// `PUSH <value>`, or just the value when it is the operand of an explicit mnemonic.
  fn compile_literal(&mut self, value: Word, line: usize, operand: bool) {
    if !operand {
      self.emit(Opcode::Push, line);
    }
    self.emit_word(value, line);
  }

  /// `PUSH <address>`, deferring the address if the label is not defined yet.
  fn compile_label(&mut self, name: &str, line: usize, operand: bool) {
    let address = self.get_label_address(name);

    if !operand {
      self.emit(Opcode::Push, line);
    }
    match address {

      Some(address) => self.emit_word(address, line),

      None => {
        self.forwards.record(name, self.machine.pos(), line);
        self.emit_word(PLACEHOLDER, line);
      }

    }
  }

  /// Emits a five word call to `function`, whose address is always patched at the end.
  fn compile_function_call(&mut self, function: &str, line: usize) {
    // The return address is just past the remaining four words of the call.
    self.emit(Opcode::PushIp, line);
    let return_address = address::offset(self.machine.pos(), 4);
    self.emit_word(return_address, line);

    self.emit(Opcode::Push, line);
    self.forwards.record(function, self.machine.pos(), line);
    self.emit_word(PLACEHOLDER, line);

    self.emit(Opcode::Jmp, line);
  }

  /// Patches every forward reference in the order they were emitted.
  fn resolve_forwards(&mut self) {
    let mut forwards = std::mem::take(&mut self.forwards);
    debug!("resolving {} forward references", forwards.len());

    for forward in forwards.drain() {
      match self.get_label_address(&forward.name) {

        Some(address) => {
          debug!("patching {} = 0x{:x} at 0x{:x}", forward.name, address, forward.patch_address);
          self.machine.set_mem(forward.patch_address, address);
        }

        None => {
          self.report(
            AssemblyError::UnresolvedLabel { line: forward.line, name: forward.name.to_string() }
          );
        }

      }
    }
  }

}

/// Assembles `source` into `machine` at its current position.
pub fn assemble(machine: &mut Machine, source: &str) -> Assembly {
  Assembler::new(machine).assemble(source)
}
