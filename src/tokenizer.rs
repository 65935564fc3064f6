/*!
  Splits assembly source into whitespace delimited tokens, one per call, keeping count of the
  current line for diagnostics. The tokenizer knows nothing about what a token means; the
  assembler asks it to throw away the rest of a line when it sees a comment.
*/

#[derive(Clone, Debug)]
pub struct Tokenizer<'d> {
  text : &'d str,
  line : usize
}

impl<'d> Tokenizer<'d> {

  pub fn new(text: &'d str) -> Self {
    Tokenizer {
      text,
      line: 1
    }
  }

  /// The line the most recently returned token started on, counting from 1.
  pub fn line(&self) -> usize {
    self.line
  }

  /// Trims whitespace in place, counting the newlines it passes.
  pub fn trim_left(&mut self) {
    let trimmed = self.text.trim_start();
    let skipped = &self.text[..self.text.len() - trimmed.len()];
    self.line += skipped.matches('\n').count();
    self.text = trimmed;
  }

  /// Consumes the prefix for which each character `c` matches `pred(c)`, returning the prefix.
  pub fn get_prefix_match(&mut self, pred: fn(char) -> bool) -> &'d str {
    let end = self.text.find(|c: char| !pred(c)).unwrap_or(self.text.len());
    let (prefix, rest) = self.text.split_at(end);
    self.line += prefix.matches('\n').count();
    self.text = rest;
    prefix
  }

  /// Returns the next token, or the empty string at the end of input.
  pub fn next_token(&mut self) -> &'d str {
    self.trim_left();
    self.get_prefix_match(|c: char| !c.is_whitespace())
  }

  /// Discards the remainder of the current line. The newline itself is left for `next_token`.
  pub fn skip_to_end_of_line(&mut self) {
    self.get_prefix_match(|c: char| c != '\n');
  }

}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tokens_and_end_of_input(){
    let mut t = Tokenizer::new("  PUSH 1\n\tadd  ");
    assert_eq!(t.next_token(), "PUSH");
    assert_eq!(t.next_token(), "1");
    assert_eq!(t.next_token(), "add");
    assert_eq!(t.next_token(), "");
    assert_eq!(t.next_token(), "");
  }

  #[test]
  fn empty_source(){
    let mut t = Tokenizer::new("");
    assert_eq!(t.next_token(), "");
    assert_eq!(t.line(), 1);
  }

  #[test]
  fn line_numbers(){
    let mut t = Tokenizer::new("a\n\nb c\r\n  d");
    assert_eq!(t.next_token(), "a");
    assert_eq!(t.line(), 1);
    assert_eq!(t.next_token(), "b");
    assert_eq!(t.line(), 3);
    assert_eq!(t.next_token(), "c");
    assert_eq!(t.line(), 3);
    assert_eq!(t.next_token(), "d");
    assert_eq!(t.line(), 4);
  }

  #[test]
  fn skip_line(){
    let mut t = Tokenizer::new("; a comment here\nDUP ;trailing\nDROP");
    assert_eq!(t.next_token(), ";");
    t.skip_to_end_of_line();
    assert_eq!(t.next_token(), "DUP");
    assert_eq!(t.line(), 2);
    assert_eq!(t.next_token(), ";trailing");
    t.skip_to_end_of_line();
    assert_eq!(t.next_token(), "DROP");
    assert_eq!(t.line(), 3);
  }

  #[test]
  fn skip_line_at_end_of_input(){
    let mut t = Tokenizer::new("; nothing after this");
    t.next_token();
    t.skip_to_end_of_line();
    assert_eq!(t.next_token(), "");
    assert_eq!(t.line(), 1);
  }

  #[test]
  fn get_prefix(){
    let mut t = Tokenizer::new("ABCDEFGabcd");
    assert_eq!(t.get_prefix_match(|ch: char| ch.is_uppercase()), "ABCDEFG");
    assert_eq!(t.get_prefix_match(|ch: char| ch.is_uppercase()), "");
    assert_eq!(t.next_token(), "abcd");
  }

}
