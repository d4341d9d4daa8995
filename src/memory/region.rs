//! Owned blocks of working memory.

use std::{alloc::Layout, fmt, ptr::NonNull};

use bitflags::bitflags;

use crate::{
    file::io::{read_word, write_word},
    Result,
};

bitflags! {
    /// Access permissions of a region.
    ///
    /// Working memory holds threaded code as well as data, so mapped regions are requested with
    /// [`READ_WRITE_EXECUTE`](Self::READ_WRITE_EXECUTE). Guard pages carry no permissions.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Protection: u32 {
        /// Region is readable.
        const READ = 0x01;
        /// Region is writable.
        const WRITE = 0x02;
        /// Region is executable.
        const EXECUTE = 0x04;
        /// Read and write access.
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
        /// Full access.
        const READ_WRITE_EXECUTE = Self::READ.bits() | Self::WRITE.bits() | Self::EXECUTE.bits();
    }
}

impl Protection {
    /// The matching `PROT_*` bits.
    #[cfg(unix)]
    #[must_use]
    pub fn to_native(self) -> libc::c_int {
        let mut prot = libc::PROT_NONE;
        if self.contains(Protection::READ) {
            prot |= libc::PROT_READ;
        }
        if self.contains(Protection::WRITE) {
            prot |= libc::PROT_WRITE;
        }
        if self.contains(Protection::EXECUTE) {
            prot |= libc::PROT_EXEC;
        }
        prot
    }
}

/// Where a region's memory came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// An anonymous mapping followed by an inaccessible guard page
    Mapped {
        /// Length of the whole mapping, guard page included
        mapping_len: usize,
    },
    /// The global heap
    Heap {
        /// Layout the block was allocated with, trailing slack included
        layout: Layout,
    },
}

/// A block of working memory owned for the lifetime of the loaded image.
///
/// Created by [`crate::memory::Allocator`]; released when dropped. The usable size is fixed at
/// creation.
pub struct Region {
    base: NonNull<u8>,
    len: usize,
    placement: Placement,
    protection: Protection,
}

impl Region {
    /// Takes ownership of a block obtained from the allocator.
    ///
    /// # Safety
    ///
    /// `base` must point to `len` writable bytes that were obtained as described by `placement`
    /// and are not owned by anything else.
    pub(crate) unsafe fn from_raw(
        base: NonNull<u8>,
        len: usize,
        placement: Placement,
        protection: Protection,
    ) -> Self {
        Region {
            base,
            len,
            placement,
            protection,
        }
    }

    /// Address of the first usable byte.
    #[must_use]
    pub fn base(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// Address one past the last usable byte.
    #[must_use]
    pub fn end(&self) -> usize {
        self.base() + self.len
    }

    /// Usable size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the region has no usable bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// How the region was obtained.
    #[must_use]
    pub fn placement(&self) -> Placement {
        self.placement
    }

    /// Whether the region lives in its own mapping.
    #[must_use]
    pub fn is_mapped(&self) -> bool {
        matches!(self.placement, Placement::Mapped { .. })
    }

    /// Permissions of the usable bytes.
    #[must_use]
    pub fn protection(&self) -> Protection {
        self.protection
    }

    /// Whether `address` lies inside the usable bytes.
    #[must_use]
    pub fn contains(&self, address: usize) -> bool {
        (self.base()..self.end()).contains(&address)
    }

    /// The usable bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: base points to len initialised bytes owned by this region
        unsafe { std::slice::from_raw_parts(self.base.as_ptr(), self.len) }
    }

    /// The usable bytes, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: base points to len initialised bytes owned exclusively by this region
        unsafe { std::slice::from_raw_parts_mut(self.base.as_ptr(), self.len) }
    }

    /// Reads the machine word at word `index` from the region start.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if the word lies outside the region.
    pub fn read_word(&self, index: usize) -> Result<isize> {
        read_word(self.as_slice(), index)
    }

    /// Writes the machine word at word `index` from the region start.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if the word lies outside the region.
    pub fn write_word(&mut self, index: usize, value: usize) -> Result<()> {
        write_word(self.as_mut_slice(), index, value)
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("base", &format_args!("{:#x}", self.base()))
            .field("len", &format_args!("{:#x}", self.len))
            .field("placement", &self.placement)
            .field("protection", &self.protection)
            .finish()
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        match self.placement {
            Placement::Mapped { mapping_len } => unmap(self.base, mapping_len),
            Placement::Heap { layout } => {
                // SAFETY: the block was allocated with this layout by the global allocator
                unsafe { std::alloc::dealloc(self.base.as_ptr(), layout) };
            }
        }
    }
}

#[cfg(unix)]
fn unmap(base: NonNull<u8>, mapping_len: usize) {
    // SAFETY: the mapping was created by mmap with this address and length
    if unsafe { libc::munmap(base.as_ptr().cast(), mapping_len) } != 0 {
        log::warn!(
            "munmap(${:x}, ${:x}) failed: {}",
            base.as_ptr() as usize,
            mapping_len,
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn unmap(_base: NonNull<u8>, _mapping_len: usize) {}
