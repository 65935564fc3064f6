//! The execution engine: program memory, the data stack, the return-address ("IP") stack, and
//! the fetch-dispatch loop that runs a program until it jumps to itself.

use std::fmt::{Display, Formatter};
use std::io::{Read, Write};

use lazy_static::lazy_static;
use prettytable::{format as TableFormat, row, table, Table};

use crate::address::{self, Address, WORD_SIZE};
use crate::bytecode::{write_image, ImageReader, Opcode, Word};
use crate::error::{Error, ErrorSink, FormatError, RuntimeError};

/// Default memory size in bytes.
pub const DEFAULT_MEMORY_SIZE: Address = 1000 * 1024;

/// Number of memory cells on either side of IP shown by the state dump.
const MEMORY_WINDOW: usize = 6;

pub struct Machine {

  // Flags
  running: bool,

  // Memory Stores
  memory   : Vec<Word>,     // Program memory, one word per cell
  stack    : Vec<Word>,     // Data stack
  ip_stack : Vec<Address>,  // Return-address stack

  // Registers
  ip: Address,              // Instruction pointer, a byte offset into memory

  errors: Box<dyn ErrorSink>,

}

impl Machine {

  // region Display methods

  fn make_register_table<T, L> (
      registers : &[T],
      highlight : Option<usize>,
      label     : L
    ) -> Table
    where T: Display,
          L: Fn(usize) -> String
  {

    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Address", ubl->"Contents"]);

    for (i, cell) in registers.iter().enumerate() {
      match Some(i) == highlight {

        true  => {
          table.add_row(
            row![r->format!("* --> {} =", label(i)), format!("{}", cell)]
          );
        }

        false => {
          table.add_row(
            row![r->format!("{} =", label(i)), format!("{}", cell)]
          );
        }

      } // end match on highlight
    } // end for
    table
  }

  /// Renders the memory cells around IP, labelled by byte address.
  fn make_memory_table(&self) -> Table {
    let here  = address::idx(self.ip);
    let first = here.saturating_sub(MEMORY_WINDOW);
    let last  = (here + MEMORY_WINDOW + 1).min(self.memory.len());

    let cells: Vec<String> =
      self.memory[first..last]
        .iter()
        .map(|word| match Opcode::from_word(*word) {
          Some(opcode) => format!("{} ({})", word, opcode),
          None         => format!("{}", word)
        })
        .collect();

    Machine::make_register_table(
      &cells,
      Some(here - first),
      |i| format!("0x{:x}", address::from_idx(first + i))
    )
  }

  // endregion

  // region Low-level utility methods

  pub fn new(errors: Box<dyn ErrorSink>) -> Machine {
    Machine::with_size(DEFAULT_MEMORY_SIZE, errors)
  }

  /// Creates a machine with `size` bytes of memory. The size is rounded down to whole words,
  /// but a machine always has at least one word.
  pub fn with_size(size: Address, errors: Box<dyn ErrorSink>) -> Machine {
    let cells = (size.max(0) / WORD_SIZE).max(1) as usize;
    let mut machine =
      Machine {
        running  : true,
        memory   : vec![Opcode::Nop.code(); cells],
        stack    : vec![],
        ip_stack : vec![],
        ip       : 0,
        errors
      };
    machine.reset();
    machine
  }

  /// Duplicates the whole machine state. The copy reports to its own sink.
  pub fn clone_with(&self, errors: Box<dyn ErrorSink>) -> Machine {
    Machine {
      running  : self.running,
      memory   : self.memory.clone(),
      stack    : self.stack.clone(),
      ip_stack : self.ip_stack.clone(),
      ip       : self.ip,
      errors
    }
  }

  /// Fills memory with `NOP`, clears both stacks and rewinds IP.
  pub fn reset(&mut self) {
    let nop = Opcode::Nop.code();
    self.memory.iter_mut().for_each(|cell| *cell = nop);
    self.stack.clear();
    self.ip_stack.clear();
    self.ip = 0;
  }

  pub fn report<E: Into<Error>>(&mut self, error: E) {
    self.errors.report(error.into());
  }

  /// Memory size in bytes.
  pub fn memory_size(&self) -> Address {
    address::from_idx(self.memory.len())
  }

  pub fn push(&mut self, word: Word) {
    self.stack.push(word);
  }

  /// Pops the data stack. An empty stack is reported and reads as zero.
  pub fn pop(&mut self) -> Word {
    match self.stack.pop() {
      Some(word) => word,
      None => {
        self.report(RuntimeError::StackUnderflow);
        0
      }
    }
  }

  pub fn push_ip(&mut self, address: Address) {
    self.ip_stack.push(address);
  }

  /// Pops the IP stack. An empty stack is reported and reads as zero.
  pub fn pop_ip(&mut self) -> Address {
    match self.ip_stack.pop() {
      Some(address) => address,
      None => {
        self.report(RuntimeError::IpStackUnderflow);
        0
      }
    }
  }

  /// The data stack, bottom first.
  pub fn stack(&self) -> &[Word] {
    &self.stack
  }

  /// The IP stack, bottom first.
  pub fn ip_stack(&self) -> &[Address] {
    &self.ip_stack
  }

  /// Checks that `address` names a memory cell, reporting the error for `operation` if not.
  pub fn check_bounds(&mut self, address: Address, operation: &'static str) -> bool {
    if address < 0 || address >= self.memory_size() {
      self.report(RuntimeError::OutOfBounds { operation, address });
      return false;
    }
    if !address::is_aligned(address) {
      self.report(RuntimeError::Misaligned { operation, address });
      return false;
    }
    true
  }

  /// Advances IP to the next word, wrapping to zero past the end of memory.
  pub fn next(&mut self) {
    self.ip = address::offset(self.ip, 1);
    if self.ip < 0 {
      self.report(RuntimeError::NegativeInstructionPointer(self.ip));
      self.ip = 0;
    }
    if self.ip >= self.memory_size() {
      self.ip = 0;
    }
  }

  /// Writes an opcode at IP and advances.
  pub fn load(&mut self, opcode: Opcode) {
    self.load_word(opcode.code());
  }

  /// Writes a raw word at IP and advances.
  pub fn load_word(&mut self, word: Word) {
    let here = address::idx(self.ip);
    self.memory[here] = word;
    self.next();
  }

  /// Emits the halt idiom: push the address of the following `JMP`, then jump to it.
  pub fn load_halt(&mut self) {
    self.load(Opcode::Push);
    let jmp = address::offset(self.ip, 1);
    self.load_word(jmp);
    self.load(Opcode::Jmp);
  }

  /// The word at IP.
  pub fn cur(&self) -> Word {
    self.memory[address::idx(self.ip)]
  }

  /// The current instruction pointer, which is also the emit position while assembling.
  pub fn pos(&self) -> Address {
    self.ip
  }

  /// Program size in bytes: everything up to and including the last non-`NOP` word.
  pub fn size(&self) -> Address {
    let nop = Opcode::Nop.code();
    match self.memory.iter().rposition(|cell| *cell != nop) {
      Some(i) => address::from_idx(i + 1),
      None    => 0
    }
  }

  /// The program's words, from address zero through `size()`.
  pub fn program(&self) -> &[Word] {
    &self.memory[..address::idx(self.size())]
  }

  pub fn set_mem(&mut self, address: Address, word: Word) {
    if self.check_bounds(address, "set_mem") {
      self.memory[address::idx(address)] = word;
    }
  }

  /// Reads memory. An invalid address is reported and reads as zero.
  pub fn get_mem(&mut self, address: Address) -> Word {
    match self.check_bounds(address, "get_mem") {
      true  => self.memory[address::idx(address)],
      false => 0
    }
  }

  pub fn is_running(&self) -> bool {
    self.running
  }

  // endregion

  // region Bytecode images

  /**
    Resets the machine and loads a bytecode image into memory starting at address zero, using
    the same load primitive the assembler uses. IP is left at zero.
  */
  pub fn load_image<R: Read>(&mut self, reader: R) -> Result<(), FormatError> {
    self.reset();
    let capacity = self.memory.len();

    for (count, word) in ImageReader::new(reader).enumerate() {
      let word = word?;
      if count >= capacity {
        self.ip = 0;
        return Err(FormatError::TooLarge { capacity: self.memory_size() });
      }
      self.load_word(word);
    }

    self.ip = 0;
    Ok(())
  }

  /// Writes the program, without its trailing `NOP` padding, as a bytecode image.
  pub fn save_image<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
    write_image(self.program(), writer)
  }

  // endregion

  // region Execution

  /// Points IP at `start` and marks the machine running. An invalid start address is reported
  /// and leaves the machine stopped.
  pub fn start(&mut self, start: Address) -> bool {
    if !self.check_bounds(start, "RUN") {
      self.running = false;
      return false;
    }
    self.ip      = start;
    self.running = true;
    true
  }

  /// Executes from `start` until the program halts or dispatch fails.
  pub fn run<R: Read, W: Write>(&mut self, start: Address, input: &mut R, output: &mut W) {
    if !self.start(start) {
      return;
    }

    #[cfg(feature = "trace_computation")]
    println!("{}", self);

    while self.running {
      self.step(input, output);
    }
  }

  /// Executes the single instruction at IP. An unknown opcode is reported and stops the
  /// machine.
  pub fn step<R: Read, W: Write>(&mut self, input: &mut R, output: &mut W) {
    let word = self.cur();

    match Opcode::from_word(word) {

      Some(opcode) => self.exec(opcode, input, output),

      None => {
        self.report(RuntimeError::UnknownInstruction { opcode: word, address: self.ip });
        self.running = false;
      }

    }

    #[cfg(feature = "trace_computation")]
    println!("{}", self);
  }

  fn exec<R: Read, W: Write>(&mut self, opcode: Opcode, input: &mut R, output: &mut W) {
    match opcode {
      Opcode::Nop    => self.next(),
      Opcode::Add    => self.op_add(),
      Opcode::Sub    => self.op_sub(),
      Opcode::And    => self.op_and(),
      Opcode::Or     => self.op_or(),
      Opcode::Xor    => self.op_xor(),
      Opcode::Not    => self.op_not(),
      Opcode::Compl  => self.op_compl(),
      Opcode::In     => self.op_in(input),
      Opcode::Out    => self.op_out(output),
      Opcode::OutNum => self.op_outnum(output),
      Opcode::Load   => self.op_load(),
      Opcode::Stor   => self.op_stor(),
      Opcode::Jmp    => self.op_jmp(),
      Opcode::Jz     => self.op_jz(),
      Opcode::Jnz    => self.op_jnz(),
      Opcode::Push   => self.op_push(),
      Opcode::PushIp => self.op_puship(),
      Opcode::PopIp  => self.op_popip(),
      Opcode::DropIp => self.op_dropip(),
      Opcode::Dup    => self.op_dup(),
      Opcode::Swap   => self.op_swap(),
      Opcode::Rol3   => self.op_rol3(),
      Opcode::Drop   => self.op_drop(),
    }
  }

  // endregion

  // region VM instruction methods

  fn op_add(&mut self) {
    let b = self.pop();
    let a = self.pop();
    self.push(a.wrapping_add(b));
    self.next();
  }

  /// The most recently pushed operand is the minuend.
  fn op_sub(&mut self) {
    let b = self.pop();
    let a = self.pop();
    self.push(b.wrapping_sub(a));
    self.next();
  }

  fn op_and(&mut self) {
    let b = self.pop();
    let a = self.pop();
    self.push(a & b);
    self.next();
  }

  fn op_or(&mut self) {
    let b = self.pop();
    let a = self.pop();
    self.push(a | b);
    self.next();
  }

  fn op_xor(&mut self) {
    let b = self.pop();
    let a = self.pop();
    self.push(a ^ b);
    self.next();
  }

  /// Logical negation.
  fn op_not(&mut self) {
    let a = self.pop();
    self.push((a == 0) as Word);
    self.next();
  }

  fn op_compl(&mut self) {
    let a = self.pop();
    self.push(!a);
    self.next();
  }

  /// Pushes one byte of input, or zero at the end of input.
  fn op_in<R: Read>(&mut self, input: &mut R) {
    let mut byte = [0u8; 1];
    let value =
      match input.read(&mut byte) {
        Ok(1) => byte[0] as Word,
        _     => 0
      };
    self.push(value);
    self.next();
  }

  fn op_out<W: Write>(&mut self, output: &mut W) {
    let a = self.pop();
    if let Err(e) = output.write_all(&[a as u8]) {
      self.report(RuntimeError::Output(e));
    }
    self.next();
  }

  fn op_outnum<W: Write>(&mut self, output: &mut W) {
    let a = self.pop();
    if let Err(e) = write!(output, "{}", a) {
      self.report(RuntimeError::Output(e));
    }
    self.next();
  }

  fn op_load(&mut self) {
    let address = self.pop();
    if self.check_bounds(address, "LOAD") {
      let word = self.memory[address::idx(address)];
      self.push(word);
    }
    self.next();
  }

  fn op_stor(&mut self) {
    let address = self.pop();
    let word    = self.pop();
    if self.check_bounds(address, "STOR") {
      self.memory[address::idx(address)] = word;
    }
    self.next();
  }

  /// Jumping to the jump instruction itself halts the machine.
  fn op_jmp(&mut self) {
    let address = self.pop();
    if !self.check_bounds(address, "JMP") {
      self.next();
      return;
    }

    match address == self.ip {
      true  => self.running = false,
      false => self.ip = address
    }
  }

  fn op_jz(&mut self) {
    let predicate = self.pop();
    let address   = self.pop();

    if predicate != 0 {
      self.next();
    } else if self.check_bounds(address, "JZ") {
      self.ip = address;
    } else {
      self.next();
    }
  }

  fn op_jnz(&mut self) {
    let predicate = self.pop();
    let address   = self.pop();

    if predicate == 0 {
      self.next();
    } else if self.check_bounds(address, "JNZ") {
      self.ip = address;
    } else {
      self.next();
    }
  }

  fn op_push(&mut self) {
    self.next();
    let word = self.cur();
    self.push(word);
    self.next();
  }

  fn op_puship(&mut self) {
    self.next();
    let address = self.cur();
    self.push_ip(address);
    self.next();
  }

  fn op_popip(&mut self) {
    let address = self.pop_ip();
    match self.check_bounds(address, "POPIP") {
      true  => self.ip = address,
      false => self.next()
    }
  }

  fn op_dropip(&mut self) {
    self.pop_ip();
    self.next();
  }

  fn op_dup(&mut self) {
    let a = self.pop();
    self.push(a);
    self.push(a);
    self.next();
  }

  fn op_swap(&mut self) {
    let b = self.pop();
    let a = self.pop();
    self.push(b);
    self.push(a);
    self.next();
  }

  /// (a b c) -> (b c a), with c on top.
  fn op_rol3(&mut self) {
    let c = self.pop();
    let b = self.pop();
    let a = self.pop();
    self.push(b);
    self.push(c);
    self.push(a);
    self.next();
  }

  fn op_drop(&mut self) {
    self.pop();
    self.next();
  }

  // endregion

}


lazy_static! {
  static ref TABLE_DISPLAY_FORMAT: TableFormat::TableFormat =
    TableFormat::FormatBuilder::new()
      .column_separator('│')
      .borders(' ')
      .separator(
        TableFormat::LinePosition::Title,
        TableFormat::LineSeparator::new('─', '┼', ' ', ' ')
      )
      .separator(
        TableFormat::LinePosition::Bottom,
        TableFormat::LineSeparator::new('─', '┴', ' ', ' ')
      )
      .padding(1, 1)
      .build();
}

impl Display for Machine {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let m_table = self.make_memory_table();
    let s_table = Machine::make_register_table(
      &self.stack, self.stack.len().checked_sub(1), |i| format!("S[{}]", i)
    );
    let r_table = Machine::make_register_table(
      &self.ip_stack, self.ip_stack.len().checked_sub(1), |i| format!("R[{}]", i)
    );

    let mut combined_table = table!([m_table, s_table, r_table]);

    combined_table.set_titles(row![ub->"Memory", ub->"Data Stack", ub->"IP Stack"]);
    combined_table.set_format(*TABLE_DISPLAY_FORMAT);

    let state = match self.running {
      true  => "Running.",
      false => "Halted."
    };

    write!(f, "IP: 0x{:x}\t{}\n{}", self.ip, state, combined_table)
  }
}


#[cfg(test)]
mod tests {
  use std::cell::RefCell;
  use std::rc::Rc;

  use super::*;
  use crate::bytecode::assembly::assemble;
  use crate::error::CollectErrors;

  fn new_machine(size: Address) -> (Machine, Rc<RefCell<CollectErrors>>) {
    let errors  = Rc::new(RefCell::new(CollectErrors::new()));
    let machine = Machine::with_size(size, Box::new(errors.clone()));
    (machine, errors)
  }

  fn assembled(source: &str) -> (Machine, Rc<RefCell<CollectErrors>>) {
    let (mut machine, errors) = new_machine(1024);
    let assembly = assemble(&mut machine, source);
    assert!(assembly.is_ok(), "{:?}", errors.borrow().messages());
    (machine, errors)
  }

  fn run_with_input(machine: &mut Machine, mut input: &[u8]) -> String {
    let mut output = Vec::new();
    machine.run(0, &mut input, &mut output);
    String::from_utf8(output).unwrap()
  }

  fn run(machine: &mut Machine) -> String {
    run_with_input(machine, b"")
  }

  const COUNTDOWN: &str = "
    ; prints 3 2 1
    3
    loop:
      DUP OUTNUM 32 OUT
      1 SWAP SUB
      DUP &loop SWAP JNZ
      DROP
  ";

  #[test]
  fn subtraction_order(){
    let (mut machine, errors) = assembled("5 3 SUB");
    run(&mut machine);
    assert_eq!(machine.stack(), &[-2]);
    assert!(!machine.is_running());
    assert!(errors.borrow().errors.is_empty());

    let (mut machine, _) = assembled("PUSH 5 PUSH 3 SUB");
    run(&mut machine);
    assert_eq!(machine.stack(), &[-2]);
  }

  #[test]
  fn stepping_stops_short_of_the_halt(){
    let (mut machine, _) = assembled("5 3 SUB");
    assert!(machine.start(0));
    for _ in 0..3 {
      machine.step(&mut std::io::empty(), &mut std::io::sink());
    }
    assert_eq!(machine.stack(), &[-2]);
    assert!(machine.is_running());
    assert_eq!(machine.pos(), 20);
  }

  #[test]
  fn halt_only(){
    let (mut machine, errors) = assembled("HALT");
    assert_eq!(run(&mut machine), "");
    assert!(machine.stack().is_empty());
    assert!(!machine.is_running());
    assert!(errors.borrow().errors.is_empty());
  }

  #[test]
  fn underflow_is_reported_and_reads_zero(){
    let (mut machine, errors) = assembled("ADD");
    run(&mut machine);
    assert_eq!(machine.stack(), &[0]);
    assert_eq!(errors.borrow().messages(), vec!["POP empty stack", "POP empty stack"]);
  }

  #[test]
  fn underflow_with_one_element(){
    let (mut machine, errors) = assembled("7 ADD");
    run(&mut machine);
    assert_eq!(machine.stack(), &[7]);
    assert_eq!(errors.borrow().messages(), vec!["POP empty stack"]);

    let (mut machine, errors) = assembled("7 ADD 1 ADD");
    run(&mut machine);
    assert_eq!(machine.stack(), &[8]);
    assert_eq!(errors.borrow().messages(), vec!["POP empty stack"]);
  }

  #[test]
  fn arithmetic_and_logic(){
    let (mut machine, _) =
      assembled("12 10 AND 12 10 OR 12 10 XOR 0 COMPL 5 NOT 0 NOT 2147483647 1 ADD");
    run(&mut machine);
    assert_eq!(machine.stack(), &[8, 14, 6, -1, 0, 1, Word::MIN]);
  }

  #[test]
  fn stack_shuffles(){
    let (mut machine, _) = assembled("1 2 3 ROL3 4 5 SWAP 6 DUP 7 DROP");
    run(&mut machine);
    assert_eq!(machine.stack(), &[2, 3, 1, 5, 4, 6, 6]);
  }

  #[test]
  fn output(){
    let (mut machine, _) = assembled("'h' OUT 'i' OUT '\\n' OUT 42 OUTNUM 0 COMPL OUTNUM");
    assert_eq!(run(&mut machine), "hi\n42-1");
    assert!(machine.stack().is_empty());
  }

  #[test]
  fn input_reads_zero_at_end(){
    let (mut machine, errors) = assembled("IN IN IN");
    run_with_input(&mut machine, b"hi");
    assert_eq!(machine.stack(), &[104, 105, 0]);
    assert!(errors.borrow().errors.is_empty());
  }

  #[test]
  fn load_and_store(){
    let (mut machine, _) = assembled("7 1000 STOR 1000 LOAD");
    run(&mut machine);
    assert_eq!(machine.stack(), &[7]);
    assert_eq!(machine.get_mem(1000), 7);
  }

  #[test]
  fn out_of_bounds_accesses_fall_through(){
    let (mut machine, errors) = assembled(
      "4096 LOAD  0 4096 STOR  4096 JMP  4096 0 JZ  4096 1 JNZ  4096 1 JZ  4096 0 JNZ  99"
    );
    run(&mut machine);
    assert_eq!(machine.stack(), &[99]);
    assert_eq!(
      errors.borrow().messages(),
      vec![
        "LOAD: address 4096 out of bounds",
        "STOR: address 4096 out of bounds",
        "JMP: address 4096 out of bounds",
        "JZ: address 4096 out of bounds",
        "JNZ: address 4096 out of bounds",
      ]
    );
  }

  #[test]
  fn misaligned_access(){
    let (mut machine, errors) = assembled("2 LOAD");
    run(&mut machine);
    assert_eq!(errors.borrow().messages(), vec!["LOAD: address 2 is not word aligned"]);
    assert!(machine.stack().is_empty());
  }

  #[test]
  fn conditional_loop(){
    let (mut machine, errors) = assembled(COUNTDOWN);
    assert_eq!(run(&mut machine), "3 2 1 ");
    assert!(machine.stack().is_empty());
    assert!(errors.borrow().errors.is_empty());
  }

  #[test]
  fn call_and_return(){
    let (mut machine, _) = assembled(
      "1 2 add_and_print HALT add_and_print: ADD OUTNUM POPIP"
    );
    assert_eq!(run(&mut machine), "3");
    assert!(machine.stack().is_empty());
    assert!(machine.ip_stack().is_empty());
  }

  #[test]
  fn nested_calls(){
    let (mut machine, _) = assembled(
      "5 quad OUTNUM HALT
       quad:  twice twice POPIP
       twice: DUP ADD POPIP"
    );
    assert_eq!(run(&mut machine), "20");
    assert!(machine.ip_stack().is_empty());
  }

  #[test]
  fn ip_stack_underflow(){
    let (mut machine, errors) = assembled("DROPIP");
    run(&mut machine);
    assert!(!machine.is_running());
    assert_eq!(errors.borrow().messages(), vec!["POP empty IP stack"]);
  }

  #[test]
  fn unknown_opcode_stops(){
    let (mut machine, errors) = new_machine(64);
    machine.set_mem(0, 99);
    run(&mut machine);
    assert!(!machine.is_running());
    assert_eq!(errors.borrow().messages(), vec!["Unknown instruction: 99 at 0"]);
  }

  #[test]
  fn invalid_start_address(){
    let (mut machine, errors) = assembled("HALT");
    let mut output = Vec::new();
    machine.run(4096, &mut &b""[..], &mut output);
    assert!(!machine.is_running());
    assert_eq!(errors.borrow().messages(), vec!["RUN: address 4096 out of bounds"]);
  }

  #[test]
  fn ip_wraps_past_end_of_memory(){
    let (mut machine, _) = new_machine(16);
    assert_eq!(machine.memory_size(), 16);
    machine.start(12);
    machine.next();
    assert_eq!(machine.pos(), 0);

    machine.start(12);
    machine.load_word(5);
    assert_eq!(machine.pos(), 0);
    assert_eq!(machine.get_mem(12), 5);
  }

  #[test]
  fn memory_is_at_least_one_word(){
    let (machine, _) = new_machine(0);
    assert_eq!(machine.memory_size(), 4);
  }

  #[test]
  fn size_ignores_trailing_nops(){
    let (mut machine, _) = new_machine(64);
    assert_eq!(machine.size(), 0);
    machine.set_mem(8, 1);
    assert_eq!(machine.size(), 12);
    assert_eq!(machine.program(), &[0, 0, 1]);
  }

  #[test]
  fn clones_are_independent(){
    let (machine, _) = assembled("5 3 SUB");
    let errors    = Rc::new(RefCell::new(CollectErrors::new()));
    let mut clone = machine.clone_with(Box::new(errors.clone()));
    run(&mut clone);
    assert_eq!(clone.stack(), &[-2]);
    assert!(machine.stack().is_empty());
    assert_eq!(machine.program(), clone.program());
  }

  #[test]
  fn reset_clears_everything(){
    let (mut machine, _) = assembled("1 2 f HALT f: HALT");
    run(&mut machine);
    assert!(!machine.stack().is_empty());
    machine.reset();
    assert!(machine.stack().is_empty());
    assert!(machine.ip_stack().is_empty());
    assert_eq!(machine.size(), 0);
    assert_eq!(machine.pos(), 0);
  }

  #[test]
  fn image_layout(){
    let (machine, _) = assembled("HALT");
    let mut image = Vec::new();
    machine.save_image(&mut image).unwrap();
    assert_eq!(
      image,
      vec![13, 0, 0, 0,  8, 0, 0, 0,  11, 0, 0, 0,  13, 0, 0, 0,  20, 0, 0, 0,  11, 0, 0, 0]
    );
  }

  #[test]
  fn image_round_trip_runs_the_same(){
    let (mut machine, _) = assembled(COUNTDOWN);
    let mut image = Vec::new();
    machine.save_image(&mut image).unwrap();
    assert_eq!(image.len(), machine.program().len() * 4);

    let (mut loaded, errors) = new_machine(1024);
    loaded.load_image(&image[..]).unwrap();
    assert_eq!(loaded.pos(), 0);
    assert_eq!(loaded.program(), machine.program());

    assert_eq!(run(&mut loaded), run(&mut machine));
    assert_eq!(loaded.stack(), machine.stack());
    assert!(errors.borrow().errors.is_empty());
  }

  #[test]
  fn truncated_image(){
    let (mut machine, _) = new_machine(1024);
    let image: &[u8] = &[13, 0, 0, 0, 1, 0];
    let result = machine.load_image(image);
    assert!(matches!(result, Err(FormatError::Truncated { bytes: 2 })));
  }

  #[test]
  fn image_too_large(){
    let (mut machine, _) = new_machine(8);
    let mut image = Vec::new();
    write_image(&[1, 2, 3], &mut image).unwrap();
    let result = machine.load_image(&image[..]);
    assert!(matches!(result, Err(FormatError::TooLarge { capacity: 8 })));
  }

  #[test]
  fn state_dump(){
    let (mut machine, _) = assembled("1 2");
    run(&mut machine);
    let dump = machine.to_string();
    assert!(dump.contains("Halted."));
    assert!(dump.contains("Data Stack"));
    assert!(dump.contains("S[1]"));
  }

}
