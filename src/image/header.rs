//! The fixed-layout image header.
//!
//! The header directly follows the magic and is sixteen machine words long. The first twelve are
//! written by the image compiler; the last four are stack base addresses that only exist in the
//! resident copy and are filled in by the loader.
//!
//! ```text
//!  0 base              relocation base, 0 for a relocatable image
//!  1 checksum          executable fingerprint, 0 if not yet stamped
//!  2 image_size        bytes of header plus dictionary contents
//!  3 dict_size         default dictionary size
//!  4 data_stack_size   default stack sizes
//!  5 fp_stack_size
//!  6 return_stack_size
//!  7 locals_stack_size
//!  8 boot_entry        initial instruction pointer
//!  9 throw_entry       instruction pointer after a fault
//! 10 unused1
//! 11 unused2
//! 12 data_stack_base   filled in by the loader
//! 13 fp_stack_base
//! 14 return_stack_base
//! 15 locals_stack_base
//! ```

use strum::{EnumCount, EnumIter, IntoEnumIterator};

use crate::{
    config::RegionSizes,
    file::{
        io::{read_word, write_word, WORD},
        parser::Parser,
    },
    Result,
};

/// Word positions inside the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumCount, EnumIter)]
#[repr(usize)]
pub enum HeaderField {
    /// Relocation base
    Base = 0,
    /// Executable fingerprint
    Checksum,
    /// Image size in bytes
    ImageSize,
    /// Dictionary size in bytes
    DictSize,
    /// Data stack size in bytes
    DataStackSize,
    /// Floating-point stack size in bytes
    FpStackSize,
    /// Return stack size in bytes
    ReturnStackSize,
    /// Locals stack size in bytes
    LocalsStackSize,
    /// Boot entry point
    BootEntry,
    /// Throw entry point
    ThrowEntry,
    /// Reserved
    Unused1,
    /// Reserved
    Unused2,
    /// Data stack base address
    DataStackBase,
    /// Floating-point stack base address
    FpStackBase,
    /// Return stack base address
    ReturnStackBase,
    /// Locals stack base address
    LocalsStackBase,
}

impl HeaderField {
    /// Word index of this field.
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Byte offset of this field from the start of the header.
    #[must_use]
    pub fn offset(self) -> usize {
        self.index() * WORD
    }
}

/// Number of words in the header.
pub const HEADER_WORDS: usize = HeaderField::COUNT;

/// Size of the header in bytes.
pub const HEADER_SIZE: usize = HEADER_WORDS * WORD;

/// Decoded image header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageHeader {
    /// Address the image was built for, 0 if it is relocatable
    pub base: usize,
    /// Executable fingerprint, 0 if not yet stamped
    pub checksum: usize,
    /// Size of header plus dictionary contents in bytes
    pub image_size: usize,
    /// Declared region sizes
    pub sizes: RegionSizes,
    /// Initial instruction pointer
    pub boot_entry: usize,
    /// Instruction pointer used after a fault
    pub throw_entry: usize,
    /// Reserved words
    pub unused: [usize; 2],
    /// Data, floating-point, return and locals stack bases
    pub stack_bases: [usize; 4],
}

impl ImageHeader {
    /// Reads a header from the parser's current position.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if the stream ends inside the header.
    pub fn read(parser: &mut Parser<'_>) -> Result<Self> {
        let bytes = parser.read_bytes(HEADER_SIZE)?;
        Self::from_bytes(bytes)
    }

    /// Decodes a header from the first [`HEADER_SIZE`] bytes of `data`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if `data` is shorter than a header.
    #[allow(clippy::cast_sign_loss)]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut words = [0_usize; HEADER_WORDS];
        for field in HeaderField::iter() {
            words[field.index()] = read_word(data, field.index())? as usize;
        }

        let word = |field: HeaderField| words[field.index()];
        Ok(ImageHeader {
            base: word(HeaderField::Base),
            checksum: word(HeaderField::Checksum),
            image_size: word(HeaderField::ImageSize),
            sizes: RegionSizes {
                dictionary: word(HeaderField::DictSize),
                data_stack: word(HeaderField::DataStackSize),
                fp_stack: word(HeaderField::FpStackSize),
                return_stack: word(HeaderField::ReturnStackSize),
                locals_stack: word(HeaderField::LocalsStackSize),
            },
            boot_entry: word(HeaderField::BootEntry),
            throw_entry: word(HeaderField::ThrowEntry),
            unused: [word(HeaderField::Unused1), word(HeaderField::Unused2)],
            stack_bases: [
                word(HeaderField::DataStackBase),
                word(HeaderField::FpStackBase),
                word(HeaderField::ReturnStackBase),
                word(HeaderField::LocalsStackBase),
            ],
        })
    }

    /// Value of a single field.
    #[must_use]
    pub fn get(&self, field: HeaderField) -> usize {
        match field {
            HeaderField::Base => self.base,
            HeaderField::Checksum => self.checksum,
            HeaderField::ImageSize => self.image_size,
            HeaderField::DictSize => self.sizes.dictionary,
            HeaderField::DataStackSize => self.sizes.data_stack,
            HeaderField::FpStackSize => self.sizes.fp_stack,
            HeaderField::ReturnStackSize => self.sizes.return_stack,
            HeaderField::LocalsStackSize => self.sizes.locals_stack,
            HeaderField::BootEntry => self.boot_entry,
            HeaderField::ThrowEntry => self.throw_entry,
            HeaderField::Unused1 => self.unused[0],
            HeaderField::Unused2 => self.unused[1],
            HeaderField::DataStackBase => self.stack_bases[0],
            HeaderField::FpStackBase => self.stack_bases[1],
            HeaderField::ReturnStackBase => self.stack_bases[2],
            HeaderField::LocalsStackBase => self.stack_bases[3],
        }
    }

    /// Encodes the header into the first [`HEADER_SIZE`] bytes of `data`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if `data` is shorter than a header.
    pub fn write_to(&self, data: &mut [u8]) -> Result<()> {
        for field in HeaderField::iter() {
            write_word(data, field.index(), self.get(field))?;
        }
        Ok(())
    }

    /// Size in bytes of the relocation bitmap following a relocatable image.
    ///
    /// One bit per image word, rounded up to whole bytes.
    #[must_use]
    pub fn bitmap_size(&self) -> usize {
        bitmap_size(self.image_size)
    }
}

/// Bytes needed for one relocation bit per word of an `image_size`-byte image.
#[must_use]
pub fn bitmap_size(image_size: usize) -> usize {
    image_size.div_ceil(WORD).div_ceil(8)
}

/// Writes a single field into a resident header.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if `data` is shorter than a header.
pub fn write_field(data: &mut [u8], field: HeaderField, value: usize) -> Result<()> {
    write_word(data, field.index(), value)
}
