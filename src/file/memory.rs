use super::{checked_range, Backend};
use crate::Result;

/// Image held in an owned buffer, e.g. one fabricated by [`crate::image::ImageBuilder`] or
/// embedded in the executable.
#[derive(Debug, Clone, Default)]
pub struct Memory {
    bytes: Vec<u8>,
}

impl Memory {
    /// Takes ownership of the serialised image `bytes`.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Memory {
        Memory { bytes }
    }

    /// Returns the buffer, giving up the source.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.bytes
    }
}

impl From<Vec<u8>> for Memory {
    fn from(bytes: Vec<u8>) -> Self {
        Memory::new(bytes)
    }
}

impl Backend for Memory {
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        Ok(&self.bytes[checked_range(self.bytes.len(), offset, len)?])
    }

    fn data(&self) -> &[u8] {
        &self.bytes
    }

    fn len(&self) -> usize {
        self.bytes.len()
    }
}
