//! Image writer.
//!
//! [`ImageBuilder`] assembles a bit-exact image file: optional `#!` preamble, magic, header,
//! dictionary words and, for relocatable images, the relocation bitmap. Words are appended one at
//! a time in their symbolic form; the builder records which of them carry a relocation tag.
//!
//! # Example
//!
//! ```rust
//! use forthboot::{engine::CodeFieldKind, image::ImageBuilder};
//!
//! let mut builder = ImageBuilder::new();
//! let boot = builder.push_code_field(CodeFieldKind::DoCol);
//! builder.push_primitive(8);
//! let throw = builder.push_code_field(CodeFieldKind::DoCol);
//! builder.push_null();
//! builder.set_boot_entry(boot).set_throw_entry(throw);
//!
//! let bytes = builder.build();
//! assert_eq!(&bytes[..7], b"Gforth2");
//! ```

use strum::IntoEnumIterator;

use crate::{
    config::RegionSizes,
    engine::CodeFieldKind,
    file::io::WORD,
    image::{
        header::{bitmap_size, HeaderField, ImageHeader, HEADER_WORDS},
        magic::{Descriptor, SIGNATURE},
        relocate::{sentinel, NULL_SENTINEL},
    },
};

/// Default region sizes written into built images.
pub const DEFAULT_SIZES: RegionSizes = RegionSizes {
    dictionary: 256 * 1024,
    data_stack: 16 * 1024,
    fp_stack: 15 * 1024 + 512,
    return_stack: 15 * 1024,
    locals_stack: 15 * 1024 + 512,
};

/// Builds image files word by word.
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    interpreter: Option<String>,
    descriptor: Descriptor,
    base: usize,
    checksum: usize,
    sizes: RegionSizes,
    boot_entry: Option<usize>,
    throw_entry: Option<usize>,
    words: Vec<usize>,
    tags: Vec<bool>,
}

impl ImageBuilder {
    /// Creates a builder for a relocatable image for the running machine.
    #[must_use]
    pub fn new() -> Self {
        ImageBuilder {
            interpreter: None,
            descriptor: Descriptor::native(),
            base: 0,
            checksum: 0,
            sizes: DEFAULT_SIZES,
            boot_entry: None,
            throw_entry: None,
            words: Vec::new(),
            tags: Vec::new(),
        }
    }

    /// Prefixes the image with a `#! interpreter -i` line.
    #[must_use]
    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = Some(interpreter.into());
        self
    }

    /// Writes a foreign platform descriptor into the magic.
    #[must_use]
    pub fn with_descriptor(mut self, descriptor: Descriptor) -> Self {
        self.descriptor = descriptor;
        self
    }

    /// Builds a non-relocatable image for address `base`.
    ///
    /// Offsets pushed afterwards are written as absolute addresses and no bitmap is emitted. Code
    /// fields and primitive references keep their symbolic form.
    #[must_use]
    pub fn with_base(mut self, base: usize) -> Self {
        self.base = base;
        self
    }

    /// Stores a fingerprint in the header.
    #[must_use]
    pub fn with_checksum(mut self, checksum: usize) -> Self {
        self.checksum = checksum;
        self
    }

    /// Sets the declared region sizes.
    #[must_use]
    pub fn with_sizes(mut self, sizes: RegionSizes) -> Self {
        self.sizes = sizes;
        self
    }

    /// Image offset the next pushed word will occupy.
    #[must_use]
    pub fn here(&self) -> usize {
        (HEADER_WORDS + self.words.len()) * WORD
    }

    /// Sets the boot entry to image offset `offset`.
    pub fn set_boot_entry(&mut self, offset: usize) -> &mut Self {
        self.boot_entry = Some(offset);
        self
    }

    /// Sets the throw entry to image offset `offset`.
    pub fn set_throw_entry(&mut self, offset: usize) -> &mut Self {
        self.throw_entry = Some(offset);
        self
    }

    /// Appends an untagged literal, returning its image offset.
    #[allow(clippy::cast_sign_loss)]
    pub fn push_literal(&mut self, value: isize) -> usize {
        self.push(value as usize, false)
    }

    /// Appends a reference to image offset `offset`.
    pub fn push_offset(&mut self, offset: usize) -> usize {
        let value = self.address_of(offset);
        self.push(value, self.is_relocatable())
    }

    /// Appends a null reference.
    #[allow(clippy::cast_sign_loss)]
    pub fn push_null(&mut self) -> usize {
        if self.is_relocatable() {
            self.push(NULL_SENTINEL as usize, true)
        } else {
            self.push(0, false)
        }
    }

    /// Appends a code field of `kind`.
    ///
    /// Use [`ImageBuilder::push_behavior_extension`] for [`CodeFieldKind::DoDoes`].
    pub fn push_code_field(&mut self, kind: CodeFieldKind) -> usize {
        self.push_sentinel(kind.index())
    }

    /// Appends a reference to primitive `index`.
    pub fn push_primitive(&mut self, index: usize) -> usize {
        self.push_sentinel(index)
    }

    /// Appends a two-word behaviour-extension code field whose does-code is at image offset
    /// `does_code`. Only the first word is tagged.
    pub fn push_behavior_extension(&mut self, does_code: usize) -> usize {
        let at = self.push_sentinel(CodeFieldKind::DoDoes.index());
        if self.is_relocatable() {
            self.push(does_code, false);
        } else {
            let address = self.address_of(does_code);
            self.push(address, false);
        }
        at
    }

    /// Serialises the image.
    #[must_use]
    pub fn build(&self) -> Vec<u8> {
        let mut out = self.preamble();
        out.extend_from_slice(SIGNATURE);
        out.push(self.descriptor.to_byte());

        let image_size = self.here();
        let header = ImageHeader {
            base: self.base,
            checksum: self.checksum,
            image_size,
            sizes: self.sizes,
            boot_entry: self.boot_entry.map_or(0, |entry| self.address_of(entry)),
            throw_entry: self.throw_entry.map_or(0, |entry| self.address_of(entry)),
            unused: [0; 2],
            stack_bases: [0; 4],
        };

        for field in HeaderField::iter() {
            out.extend_from_slice(&header.get(field).to_ne_bytes());
        }

        for word in &self.words {
            out.extend_from_slice(&word.to_ne_bytes());
        }

        if self.is_relocatable() {
            let mut bitmap = vec![0_u8; bitmap_size(image_size)];
            let tagged_header = [
                (HeaderField::BootEntry, self.boot_entry.is_some()),
                (HeaderField::ThrowEntry, self.throw_entry.is_some()),
            ];
            for (field, tagged) in tagged_header {
                if tagged {
                    set_bit(&mut bitmap, field.index());
                }
            }
            for (index, tagged) in self.tags.iter().enumerate() {
                if *tagged {
                    set_bit(&mut bitmap, HEADER_WORDS + index);
                }
            }
            out.extend_from_slice(&bitmap);
        }

        out
    }

    fn is_relocatable(&self) -> bool {
        self.base == 0
    }

    fn address_of(&self, offset: usize) -> usize {
        self.base.wrapping_add(offset)
    }

    #[allow(clippy::cast_sign_loss)]
    fn push_sentinel(&mut self, index: usize) -> usize {
        self.push(sentinel(index) as usize, self.is_relocatable())
    }

    fn push(&mut self, value: usize, tagged: bool) -> usize {
        let at = self.here();
        self.words.push(value);
        self.tags.push(tagged);
        at
    }

    fn preamble(&self) -> Vec<u8> {
        let Some(interpreter) = &self.interpreter else {
            return Vec::new();
        };

        let mut preamble = format!("#! {interpreter} -i\n").into_bytes();
        preamble.resize(preamble.len().next_multiple_of(8), 0);
        preamble
    }
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn set_bit(bitmap: &mut [u8], index: usize) {
    bitmap[index / 8] |= 0x80 >> (index % 8);
}
