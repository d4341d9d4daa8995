//! Relocation of a position-independent image.
//!
//! A relocatable image is followed by a bitmap with one bit per image word, most significant bit
//! first within each byte. A set bit marks a tagged word whose value is decoded as a [`Tag`] and
//! rewritten in place; clear bits mark literal data.
//!
//! | Word value           | Meaning                                 | Rewritten to                  |
//! |----------------------|-----------------------------------------|-------------------------------|
//! | `>= 0`               | offset from the image start             | `base + offset`               |
//! | `-1`                 | null reference                          | `0`                           |
//! | `-2 - k`, `k < 8`    | code field of kind `k`                  | strategy-dependent entry      |
//! | `-2 - 6`             | behaviour-extension code field (2 words)| does-entry, `base + next word`|
//! | `-2 - n`, `n >= 8`   | primitive `n`                           | strategy-dependent entry      |
//!
//! The behaviour-extension code field is the one irregular case: its second word holds an image
//! offset that is fixed up as part of the same tag, and the bitmap bit belonging to that second
//! word is not consulted.
//!
//! Relocation is not reversible. Running it a second time over the same words adds the base to
//! every offset again and treats resolved code addresses as offsets, so it must happen exactly
//! once per loaded image.

use crate::{
    engine::{CodeFieldKind, DispatchStrategy, PrimitiveTable},
    file::io::{read_word, write_word, WORD},
    Result,
};

/// Sentinel of a null reference.
pub const NULL_SENTINEL: isize = -1;

/// Sentinel for table entry `index` (`-2 - index`).
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub fn sentinel(index: usize) -> isize {
    -2 - index as isize
}

/// Decoded meaning of a tagged word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    /// Image-relative offset
    Offset(usize),
    /// Null reference
    Null,
    /// Code field of a fixed kind, other than the behaviour extension
    CodeField(CodeFieldKind),
    /// Behaviour-extension code field; the next word holds an image offset
    BehaviorExtension,
    /// Ordinary primitive, by table index
    Primitive(usize),
}

impl Tag {
    /// Decodes a tagged word.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn decode(word: isize) -> Self {
        if word >= 0 {
            return Tag::Offset(word as usize);
        }
        if word == NULL_SENTINEL {
            return Tag::Null;
        }

        let index = (-2 - word) as usize;
        match CodeFieldKind::from_repr(index) {
            Some(CodeFieldKind::DoDoes) => Tag::BehaviorExtension,
            Some(kind) => Tag::CodeField(kind),
            None => Tag::Primitive(index),
        }
    }
}

/// Counters of what a relocation pass rewrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelocationStats {
    /// Image offsets turned into addresses
    pub offsets: usize,
    /// Null references
    pub nulls: usize,
    /// Code fields rewritten
    pub code_fields: usize,
    /// Behaviour-extension code fields
    pub behavior_extensions: usize,
    /// Primitive references
    pub primitives: usize,
    /// Tagged words left unchanged by the dispatch strategy
    pub untouched: usize,
}

impl RelocationStats {
    /// Total number of tagged words visited.
    #[must_use]
    pub fn total(&self) -> usize {
        self.offsets
            + self.nulls
            + self.code_fields
            + self.behavior_extensions
            + self.primitives
            + self.untouched
    }
}

/// Rewrites the tagged words of an image in place.
///
/// Holds everything a pass needs besides the image itself, so one relocator can be reused for
/// several images loaded against the same dispatcher.
#[derive(Debug, Clone, Copy)]
pub struct Relocator<'a> {
    table: &'a PrimitiveTable,
    strategy: DispatchStrategy,
}

impl<'a> Relocator<'a> {
    /// Creates a relocator resolving against `table` under `strategy`.
    #[must_use]
    pub fn new(table: &'a PrimitiveTable, strategy: DispatchStrategy) -> Self {
        Relocator { table, strategy }
    }

    /// Relocates `image` assuming it will execute at address `base`.
    ///
    /// `image` starts at the header and covers `image_size` bytes; a trailing partial word is
    /// left alone. `bitmap` must provide a bit for every whole word.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the bitmap is too short, a primitive index is
    /// outside the table, or a behaviour-extension code field occupies the last word.
    #[allow(clippy::cast_sign_loss)]
    pub fn relocate(&self, image: &mut [u8], bitmap: &[u8], base: usize) -> Result<RelocationStats> {
        let words = image.len() / WORD;
        if bitmap.len() * 8 < words {
            return Err(malformed_error!(
                "Relocation bitmap covers {} words, image has {}",
                bitmap.len() * 8,
                words
            ));
        }

        let mut stats = RelocationStats::default();
        let mut index = 0;
        while index < words {
            if !is_tagged(bitmap, index) {
                index += 1;
                continue;
            }

            let token = read_word(image, index)?;
            match Tag::decode(token) {
                Tag::Offset(offset) => {
                    write_word(image, index, base.wrapping_add(offset))?;
                    stats.offsets += 1;
                }
                Tag::Null => {
                    write_word(image, index, 0)?;
                    stats.nulls += 1;
                }
                Tag::CodeField(kind) => {
                    match self.strategy.resolve_code_field(self.table, kind) {
                        Some(address) => {
                            write_word(image, index, address)?;
                            stats.code_fields += 1;
                        }
                        None => stats.untouched += 1,
                    }
                }
                Tag::BehaviorExtension => {
                    if index + 1 >= words {
                        return Err(malformed_error!(
                            "Behaviour-extension code field at word {} has no offset word",
                            index
                        ));
                    }

                    let offset = read_word(image, index + 1)? as usize;
                    write_word(image, index + 1, base.wrapping_add(offset))?;
                    if let Some(address) = self.strategy.does_code_address(self.table) {
                        write_word(image, index, address)?;
                    }
                    stats.behavior_extensions += 1;

                    index += 2;
                    continue;
                }
                Tag::Primitive(primitive) => {
                    let Some(address) = self.strategy.resolve_primitive(self.table, primitive)
                    else {
                        return Err(malformed_error!(
                            "Word {} refers to primitive {}, the executable has {}",
                            index,
                            primitive,
                            self.table.len()
                        ));
                    };
                    write_word(image, index, address)?;
                    stats.primitives += 1;
                }
            }

            index += 1;
        }

        Ok(stats)
    }
}

/// Whether the relocation bit for `index` is set, reading each byte MSB first.
#[must_use]
pub fn is_tagged(bitmap: &[u8], index: usize) -> bool {
    bitmap
        .get(index / 8)
        .is_some_and(|byte| byte & (0x80 >> (index % 8)) != 0)
}
