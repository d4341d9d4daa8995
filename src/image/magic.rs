//! Image signature and platform descriptor.
//!
//! An image starts with an optional `#!` preamble padded to a multiple of eight bytes, followed
//! by an eight-byte magic: the seven ASCII bytes `Gforth2` and one packed descriptor byte
//!
//! ```text
//!   bit 7   6 5        4 3     2 1     0
//!       0 | au log2 | char log2 | cell log2 | little-endian
//! ```
//!
//! Each size is the base-2 logarithm of its width in bytes. An image is only loadable on a
//! machine whose own descriptor is identical.

use std::fmt;

use crate::{
    file::{io::WORD, parser::Parser},
    utils::log2_exact,
    Error, Result,
};

/// The seven signature bytes at the start of the magic.
pub const SIGNATURE: &[u8; 7] = b"Gforth2";

/// Length of the magic, signature plus descriptor byte.
pub const MAGIC_LEN: usize = 8;

/// Memory model an image was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Descriptor {
    /// log2 of the address unit size in bytes
    pub address_unit_log2: u8,
    /// log2 of the character size in bytes
    pub char_log2: u8,
    /// log2 of the cell size in bytes
    pub cell_log2: u8,
    /// Byte order
    pub little_endian: bool,
}

impl Descriptor {
    /// Descriptor of the running machine.
    #[must_use]
    pub fn native() -> Self {
        Descriptor {
            address_unit_log2: 0,
            char_log2: 0,
            cell_log2: log2_exact(WORD).unwrap_or_default(),
            little_endian: cfg!(target_endian = "little"),
        }
    }

    /// Unpacks a descriptor byte.
    #[must_use]
    pub fn from_byte(byte: u8) -> Self {
        Descriptor {
            address_unit_log2: (byte >> 5) & 3,
            char_log2: (byte >> 3) & 3,
            cell_log2: (byte >> 1) & 3,
            little_endian: byte & 1 == 1,
        }
    }

    /// Packs this descriptor into its byte form.
    #[must_use]
    pub fn to_byte(self) -> u8 {
        ((self.address_unit_log2 & 3) << 5)
            | ((self.char_log2 & 3) << 3)
            | ((self.cell_log2 & 3) << 1)
            | u8::from(self.little_endian)
    }

    /// Cell width in bytes.
    #[must_use]
    pub fn cell_size(&self) -> usize {
        1 << self.cell_log2
    }

    /// Character width in bytes.
    #[must_use]
    pub fn char_size(&self) -> usize {
        1 << self.char_log2
    }

    /// Address unit width in bytes.
    #[must_use]
    pub fn address_unit_size(&self) -> usize {
        1 << self.address_unit_log2
    }

    fn endianness(&self) -> &'static str {
        if self.little_endian {
            "little"
        } else {
            "big"
        }
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bit cell, {} bit char, {} bit address unit, {}-endian",
            self.cell_size() * 8,
            self.char_size() * 8,
            self.address_unit_size() * 8,
            self.endianness()
        )
    }
}

/// Position and content of an image's magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Magic {
    /// Descriptor found after the signature
    pub descriptor: Descriptor,
    /// Bytes from the start of the stream up to and including the magic
    pub preamble_size: usize,
}

/// Scans `parser` in eight-byte chunks for the image signature.
///
/// On success the parser is positioned right after the magic, at the header.
///
/// # Errors
///
/// Returns [`crate::Error::NotAnImage`] if the stream ends before a chunk starting with
/// [`SIGNATURE`] is found.
pub fn scan(parser: &mut Parser<'_>) -> Result<Magic> {
    loop {
        let Ok(chunk) = parser.read_bytes(MAGIC_LEN) else {
            return Err(Error::NotAnImage);
        };

        if chunk.starts_with(SIGNATURE) {
            let descriptor = Descriptor::from_byte(chunk[SIGNATURE.len()]);
            log::debug!(
                "Magic found: {} {}-endian, cell={} bytes, char={} bytes, au={} bytes",
                String::from_utf8_lossy(SIGNATURE),
                descriptor.endianness(),
                descriptor.cell_size(),
                descriptor.char_size(),
                descriptor.address_unit_size()
            );

            return Ok(Magic {
                descriptor,
                preamble_size: parser.pos(),
            });
        }
    }
}

/// Compares an image's descriptor with the running machine's.
///
/// # Errors
///
/// Returns [`crate::Error::IncompatiblePlatform`] on any difference.
pub fn check_platform(image: Descriptor) -> Result<()> {
    let machine = Descriptor::native();
    if image == machine {
        Ok(())
    } else {
        Err(Error::IncompatiblePlatform { image, machine })
    }
}
