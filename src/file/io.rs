//! Native byte order reading and writing utilities for image data.
//!
//! Images are only ever loaded on the machine model they were built for (the packed descriptor
//! check guarantees matching word size and byte order), so every multi-byte field is stored in
//! the platform's native byte order. This module provides bounds-checked, alignment-agnostic
//! accessors for those fields on top of plain byte slices.
//!
//! # Key Components
//!
//! ## Core Trait
//! - [`crate::file::io::WordIO`] - Conversion between primitive integers and native-order bytes
//!
//! ## Reading Functions
//! - [`crate::file::io::read_ne_at`] - Read a value at an offset with auto-advance
//! - [`crate::file::io::read_word`] - Read the `index`-th machine word of a buffer
//!
//! ## Writing Functions
//! - [`crate::file::io::write_ne_at`] - Write a value at an offset with auto-advance
//! - [`crate::file::io::write_word`] - Write the `index`-th machine word of a buffer
//!
//! # Alignment
//!
//! None of the helpers require the buffer to be word aligned. The offset-image mode deliberately
//! shifts the dictionary, and the relocator must keep working on such buffers.
//!
//! # Error Handling
//!
//! All functions return [`crate::Error::OutOfBounds`] if there are insufficient bytes in the
//! buffer to complete the operation.

use crate::{Error::OutOfBounds, Result};

/// Size of a machine word (cell) in bytes.
pub const WORD: usize = std::mem::size_of::<usize>();

/// Trait for primitive integers that can be read from and written to native-order bytes.
pub trait WordIO: Sized {
    /// Associated type representing the byte array type for this numeric type.
    type Bytes: Sized + for<'a> TryFrom<&'a [u8]> + AsRef<[u8]>;

    /// Read T from a byte buffer in native byte order
    fn from_ne_bytes(bytes: Self::Bytes) -> Self;

    /// Write T to a byte buffer in native byte order
    fn to_ne_bytes(self) -> Self::Bytes;
}

macro_rules! impl_word_io {
    ($($ty:ty),*) => {
        $(
            impl WordIO for $ty {
                type Bytes = [u8; std::mem::size_of::<$ty>()];

                fn from_ne_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_ne_bytes(bytes)
                }

                fn to_ne_bytes(self) -> Self::Bytes {
                    <$ty>::to_ne_bytes(self)
                }
            }
        )*
    };
}

impl_word_io!(u8, u32, u64, usize, isize);

/// Read a value of type `T` at `offset` and advance `offset` past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the read would exceed `data`.
pub fn read_ne_at<T: WordIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;

    Ok(T::from_ne_bytes(read))
}

/// Write `value` at `offset` and advance `offset` past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the write would exceed `data`.
pub fn write_ne_at<T: WordIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let bytes = value.to_ne_bytes();
    let bytes = bytes.as_ref();
    let Some(end) = offset.checked_add(bytes.len()) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    data[*offset..end].copy_from_slice(bytes);
    *offset = end;
    Ok(())
}

/// Read the `index`-th machine word of `data` as a signed cell.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the word lies past the end of `data`.
pub fn read_word(data: &[u8], index: usize) -> Result<isize> {
    let mut offset = index.checked_mul(WORD).ok_or(OutOfBounds)?;
    read_ne_at(data, &mut offset)
}

/// Overwrite the `index`-th machine word of `data`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the word lies past the end of `data`.
pub fn write_word(data: &mut [u8], index: usize, value: usize) -> Result<()> {
    let mut offset = index.checked_mul(WORD).ok_or(OutOfBounds)?;
    write_ne_at(data, &mut offset, value)
}
