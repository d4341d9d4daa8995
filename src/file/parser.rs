//! Cursor-based reader over image bytes.
//!
//! [`Parser`] is the stream the image loader walks: the magic scan consumes 8-byte chunks from
//! the front, the header is read word by word right after the signature, and "rewinding" the
//! stream for the bulk read is a plain [`Parser::seek`] back to offset 0. All reads are bounds
//! checked; a stream that ends early yields [`crate::Error::OutOfBounds`] instead of a short read.

use crate::{
    file::io::{read_ne_at, WordIO},
    Error::OutOfBounds,
    Result,
};

/// A bounds-checked cursor over a byte slice.
///
/// # Examples
///
/// ```rust
/// use forthboot::Parser;
///
/// let mut data = b"#! x -i\n".to_vec();
/// data.extend_from_slice(&5_usize.to_ne_bytes());
///
/// let mut parser = Parser::new(&data);
/// assert_eq!(parser.read_bytes(8)?, b"#! x -i\n");
/// assert_eq!(parser.read_word()?, 5);
/// assert!(!parser.has_more_data());
/// # Ok::<(), forthboot::Error>(())
/// ```
pub struct Parser<'a> {
    /// The binary data being parsed
    data: &'a [u8],
    /// Current position within the data buffer
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new [`Parser`] positioned at offset 0.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Returns the length of the underlying data buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the parser has no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` if there is more data available to parse.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Number of bytes left between the cursor and the end of the data.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Move the current position to `pos`.
    ///
    /// Seeking to exactly the end of the data is allowed; it leaves nothing to read.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `pos` is beyond the data length.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(OutOfBounds);
        }

        self.position = pos;
        Ok(())
    }

    /// Current position of the cursor.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Read a native-order value of type `T` and advance the position.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if reading would exceed the data length.
    pub fn read_ne<T: WordIO>(&mut self) -> Result<T> {
        read_ne_at::<T>(self.data, &mut self.position)
    }

    /// Read one machine word and advance the position.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if reading would exceed the data length.
    pub fn read_word(&mut self) -> Result<usize> {
        self.read_ne::<usize>()
    }

    /// Read `length` raw bytes and advance the position.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if reading would exceed the data length.
    pub fn read_bytes(&mut self, length: usize) -> Result<&'a [u8]> {
        let end = self.position.checked_add(length).ok_or(OutOfBounds)?;
        if end > self.data.len() {
            return Err(OutOfBounds);
        }

        let bytes = &self.data[self.position..end];
        self.position = end;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_reads() {
        let mut data = vec![0xAA; 3];
        data.extend_from_slice(&0x1234_usize.to_ne_bytes());

        let mut parser = Parser::new(&data);
        assert_eq!(parser.len(), 3 + std::mem::size_of::<usize>());
        assert_eq!(parser.read_bytes(3).unwrap(), &[0xAA; 3]);
        assert_eq!(parser.read_word().unwrap(), 0x1234);
        assert_eq!(parser.remaining(), 0);
        assert!(!parser.has_more_data());
        assert!(matches!(parser.read_ne::<u8>(), Err(OutOfBounds)));
    }

    #[test]
    fn seek_and_rewind() {
        let data = [1_u8, 2, 3, 4];
        let mut parser = Parser::new(&data);

        parser.seek(4).unwrap();
        assert!(!parser.has_more_data());
        assert!(parser.seek(5).is_err());

        parser.seek(0).unwrap();
        assert_eq!(parser.read_ne::<u8>().unwrap(), 1);
        assert_eq!(parser.pos(), 1);
    }

    #[test]
    fn short_reads_fail() {
        let data = [0_u8; 4];
        let mut parser = Parser::new(&data);

        assert!(parser.read_bytes(5).is_err());
        assert!(parser.read_bytes(usize::MAX).is_err());
        // A failed read leaves the cursor untouched
        assert_eq!(parser.pos(), 0);
        assert!(Parser::new(&[]).is_empty());
    }
}
