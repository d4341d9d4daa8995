//! Image files mapped read-only.
//!
//! An image file is consumed once, front to back, and then copied into the dictionary region.
//! Mapping it avoids a heap buffer of the image's size and lets the loader address the header,
//! body and relocation bitmap by offset.

use std::{
    fs,
    path::{Path, PathBuf},
};

use memmap2::Mmap;

use super::{checked_range, Backend};
use crate::{Error, Result};

/// An image file on disk.
#[derive(Debug)]
pub struct Physical {
    path: PathBuf,
    map: Mmap,
}

impl Physical {
    /// Maps the image file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] if the file cannot be opened, or
    /// [`crate::Error::Error`] if it cannot be mapped.
    pub fn new(path: impl AsRef<Path>) -> Result<Physical> {
        let path = path.as_ref();
        let file = fs::File::open(path)?;

        // SAFETY: the mapping is read-only; images are not rewritten while a runtime loads them
        let map = unsafe { Mmap::map(&file) }.map_err(|error| {
            Error::Error(format!("cannot map image file {}: {error}", path.display()))
        })?;

        Ok(Physical {
            path: path.to_path_buf(),
            map,
        })
    }

    /// Location the image was mapped from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Backend for Physical {
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        Ok(&self.map[checked_range(self.map.len(), offset, len)?])
    }

    fn data(&self) -> &[u8] {
        &self.map
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}
