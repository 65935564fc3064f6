//! Addresses are byte offsets into program memory, but every cell is a whole word, so a valid
//! address is always a multiple of `WORD_SIZE`. Addresses travel through the data stack, so they
//! share the width of a `Word`.

use crate::bytecode::Word;

pub type Address = Word;

/// Number of bytes per memory cell.
pub const WORD_SIZE: Address = 4;

/// Converts a (word aligned) address to an index into the memory vector.
pub fn idx(address: Address) -> usize {
  (address / WORD_SIZE) as usize
}

/// Converts an index into the memory vector to an address.
pub fn from_idx(idx: usize) -> Address {
  idx as Address * WORD_SIZE
}

pub fn is_aligned(address: Address) -> bool {
  address % WORD_SIZE == 0
}

/// The address `words` cells after `address`.
pub fn offset(address: Address, words: Address) -> Address {
  address.wrapping_add(words * WORD_SIZE)
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn index_round_trip(){
    assert_eq!(idx(0), 0);
    assert_eq!(idx(12), 3);
    assert_eq!(from_idx(3), 12);
  }

  #[test]
  fn alignment(){
    assert!(is_aligned(0));
    assert!(is_aligned(16));
    assert!(!is_aligned(6));
    assert!(!is_aligned(-3));
  }

  #[test]
  fn offsets(){
    assert_eq!(offset(8, 2), 16);
    assert_eq!(offset(8, 0), 8);
  }

}
