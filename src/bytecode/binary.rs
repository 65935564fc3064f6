/*!
  This module is responsible for the encoding and decoding of bytecode images.

  An image is a bare sequence of words, each encoded as four bytes, least significant byte
  first. A stream that ends partway through a word is a truncated image.
*/
use std::io::{ErrorKind, Read, Write};

use crate::bytecode::Word;
use crate::error::FormatError;

/// Number of bytes per encoded word.
pub const ENCODED_WORD_SIZE: usize = 4;

pub fn encode_word(word: Word) -> [u8; ENCODED_WORD_SIZE] {
  word.to_le_bytes()
}

pub fn decode_word(bytes: [u8; ENCODED_WORD_SIZE]) -> Word {
  Word::from_le_bytes(bytes)
}

/// Writes every word of `words` to `writer`.
pub fn write_image<W: Write>(words: &[Word], writer: &mut W) -> std::io::Result<()> {
  for word in words {
    writer.write_all(&encode_word(*word))?;
  }
  Ok(())
}

/**
  Reads an image one word at a time. Iteration ends cleanly when the stream ends on a word
  boundary. A stream that ends partway through a word yields `FormatError::Truncated`, after
  which the reader is exhausted.
*/
pub struct ImageReader<R> {
  reader : R,
  done   : bool
}

impl<R: Read> ImageReader<R> {

  pub fn new(reader: R) -> Self {
    ImageReader {
      reader,
      done: false
    }
  }

  /// Fills `buffer` as far as the stream allows, returning the number of bytes read.
  fn fill(&mut self, buffer: &mut [u8; ENCODED_WORD_SIZE]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < ENCODED_WORD_SIZE {
      match self.reader.read(&mut buffer[filled..]) {
        Ok(0)                                        => break,
        Ok(n)                                        => filled += n,
        Err(e) if e.kind() == ErrorKind::Interrupted => continue,
        Err(e)                                       => return Err(e)
      }
    }
    Ok(filled)
  }

}

impl<R: Read> Iterator for ImageReader<R> {
  type Item = Result<Word, FormatError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.done {
      return None;
    }

    let mut buffer = [0u8; ENCODED_WORD_SIZE];
    let result =
      match self.fill(&mut buffer) {
        Ok(0)                          => None,
        Ok(ENCODED_WORD_SIZE)          => Some(Ok(decode_word(buffer))),
        Ok(bytes)                      => Some(Err(FormatError::Truncated { bytes })),
        Err(e)                         => Some(Err(FormatError::Io(e)))
      };

    // Only a complete word keeps the reader going.
    if !matches!(result, Some(Ok(_))) {
      self.done = true;
    }
    result
  }
}
