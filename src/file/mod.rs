//! Image byte sources.
//!
//! The loader consumes an image as a positioned byte stream. This module abstracts over where
//! those bytes come from so the same state machine serves images on disk and images that were
//! fabricated or embedded in memory.
//!
//! # Key Components
//!
//! - [`crate::file::Backend`] - Trait for different data sources (disk files, memory buffers)
//! - [`crate::file::Physical`] - Memory-mapped file backend for disk access
//! - [`crate::file::Memory`] - In-memory buffer backend
//! - [`crate::file::parser::Parser`] - Bounds-checked cursor used for the magic scan and header
//! - [`crate::file::io`] - Native byte order word accessors
//!
//! # Examples
//!
//! ```rust,no_run
//! use forthboot::file::{self, Backend};
//!
//! let source = file::open("forth.fi")?;
//! println!("image file has {} bytes", source.len());
//! # Ok::<(), forthboot::Error>(())
//! ```

pub mod io;
pub mod parser;

mod memory;
mod physical;

use std::{ops::Range, path::Path};

use crate::{Error, Result};

pub use memory::Memory;
pub use physical::Physical;

/// Backend trait for image data sources.
///
/// All implementations must be thread-safe and provide bounds-checked access; the loader relies
/// on [`Backend::data_slice`] failing rather than returning short data.
pub trait Backend: Send + Sync {
    /// Returns a slice of the data at the given offset and length.
    ///
    /// # Arguments
    ///
    /// * `offset` - The starting offset within the data.
    /// * `len` - The length of the slice in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if the requested range is out of bounds.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// Returns the entire data buffer.
    fn data(&self) -> &[u8];

    /// Returns the total length of the data buffer.
    fn len(&self) -> usize;

    /// Returns `true` if the source holds no data.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Opens an image file on disk as a memory-mapped source.
///
/// # Errors
///
/// Returns [`crate::Error::FileError`] if the file cannot be opened, or
/// [`crate::Error::Error`] if it cannot be mapped.
pub fn open(path: impl AsRef<Path>) -> Result<Box<dyn Backend>> {
    Ok(Box::new(Physical::new(path)?))
}

/// Wraps an in-memory image as a source.
#[must_use]
pub fn from_mem(data: Vec<u8>) -> Box<dyn Backend> {
    Box::new(Memory::new(data))
}

/// The byte range `offset..offset + len`, if it lies within `total` bytes.
fn checked_range(total: usize, offset: usize, len: usize) -> Result<Range<usize>> {
    match offset.checked_add(len) {
        Some(end) if end <= total => Ok(offset..end),
        _ => Err(Error::OutOfBounds),
    }
}
