//! Placement of the dictionary and stack regions.
//!
//! Regions are preferably placed as anonymous mappings at a rolling address hint. Each mapping is
//! followed by an inaccessible guard page, and the hint for the next request lies past that guard
//! page, so consecutive regions are spread out and an overrun faults immediately instead of
//! corrupting a neighbour. If mapping is unavailable or refused, the region comes from the heap
//! with some trailing slack for stack pointers that briefly run past the end.

use std::{alloc::Layout, ptr::NonNull};

use strum::Display;

use crate::{
    memory::{Placement, Protection, Region},
    utils::{align_up, MAX_ALIGN},
    Error, Result,
};

/// Extra bytes appended to every heap region.
pub const HEAP_SLACK: usize = 64;

/// Page size assumed where the platform cannot report one.
const FALLBACK_PAGE_SIZE: usize = 4096;

/// Which strategies [`Allocator::allocate`] may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum PlacementPolicy {
    /// Try a hinted mapping, fall back to the heap
    PreferMapping,
    /// Always use the heap
    HeapOnly,
}

/// Hands out working-memory regions.
///
/// The allocator remembers where the next mapping should go; create one per loaded image and use
/// it for the dictionary and all four stacks.
///
/// # Example
///
/// ```rust
/// use forthboot::memory::{Allocator, PlacementPolicy};
///
/// let mut allocator = Allocator::new();
/// let stack = allocator.allocate(16 * 1024)?;
/// assert!(stack.len() >= 16 * 1024);
///
/// let heap = allocator.allocate_with(4096, PlacementPolicy::HeapOnly)?;
/// assert!(!heap.is_mapped());
/// # Ok::<(), forthboot::Error>(())
/// ```
#[derive(Debug)]
pub struct Allocator {
    next_address: usize,
    page_size: usize,
    policy: PlacementPolicy,
}

impl Allocator {
    /// Creates an allocator preferring mappings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(PlacementPolicy::PreferMapping)
    }

    /// Creates an allocator with the given default policy.
    #[must_use]
    pub fn with_policy(policy: PlacementPolicy) -> Self {
        let page_size = page_size();
        log::debug!("pagesize={page_size}");

        Allocator {
            next_address: 0,
            page_size,
            policy,
        }
    }

    /// The platform's page size.
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// The default policy.
    #[must_use]
    pub fn policy(&self) -> PlacementPolicy {
        self.policy
    }

    /// Address the next mapping will be requested at, 0 for "anywhere".
    #[must_use]
    pub fn next_address(&self) -> usize {
        self.next_address
    }

    /// Allocates a region of at least `size` bytes using the default policy.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::AllocationFailure`] if no strategy could supply the memory.
    pub fn allocate(&mut self, size: usize) -> Result<Region> {
        self.allocate_with(size, self.policy)
    }

    /// Allocates a region of at least `size` bytes using `policy`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::AllocationFailure`] if no strategy could supply the memory.
    pub fn allocate_with(&mut self, size: usize, policy: PlacementPolicy) -> Result<Region> {
        if policy == PlacementPolicy::PreferMapping {
            match self.map(size) {
                Ok(region) => return Ok(region),
                Err(error) => {
                    log::warn!("mapping {size:#x} bytes failed ({error}), using the heap");
                }
            }
        }

        heap(size)
    }

    #[cfg(unix)]
    fn map(&mut self, size: usize) -> Result<Region> {
        let failure = |reason: String| Error::AllocationFailure { size, reason };

        let usable = align_up(size, self.page_size)
            .ok_or_else(|| failure("size overflows the address space".to_string()))?;
        let mapping_len = usable
            .checked_add(self.page_size)
            .ok_or_else(|| failure("size overflows the address space".to_string()))?;

        log::debug!(
            "try mmap(${:x}, ${:x}, ..., MAP_ANON, ...)",
            self.next_address,
            mapping_len
        );

        let protection = Protection::READ_WRITE_EXECUTE;
        // SAFETY: an anonymous private mapping aliases no existing memory; the hint is advisory
        let mapping = unsafe {
            libc::mmap(
                self.next_address as *mut libc::c_void,
                mapping_len,
                protection.to_native(),
                libc::MAP_PRIVATE | libc::MAP_ANON,
                -1,
                0,
            )
        };
        if mapping == libc::MAP_FAILED {
            return Err(failure(std::io::Error::last_os_error().to_string()));
        }

        let Some(base) = NonNull::new(mapping.cast::<u8>()) else {
            return Err(failure("mmap returned a null mapping".to_string()));
        };

        // SAFETY: base points to a fresh mapping of mapping_len bytes that nothing else owns
        let region =
            unsafe { Region::from_raw(base, size, Placement::Mapped { mapping_len }, protection) };

        // SAFETY: the guard page lies inside the mapping just created
        let guarded = unsafe {
            libc::mprotect(
                mapping.cast::<u8>().add(usable).cast(),
                self.page_size,
                libc::PROT_NONE,
            )
        };
        if guarded != 0 {
            return Err(failure(format!(
                "cannot protect guard page: {}",
                std::io::Error::last_os_error()
            )));
        }

        self.next_address = region.base() + mapping_len;
        log::debug!("success, address=${:x}", region.base());
        Ok(region)
    }

    #[cfg(not(unix))]
    fn map(&mut self, size: usize) -> Result<Region> {
        Err(Error::AllocationFailure {
            size,
            reason: "anonymous mappings are not supported on this platform".to_string(),
        })
    }
}

impl Default for Allocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Allocates `size` bytes plus [`HEAP_SLACK`] from the heap, aligned to [`MAX_ALIGN`] and zeroed.
fn heap(size: usize) -> Result<Region> {
    let failure = |reason: &str| Error::AllocationFailure {
        size,
        reason: reason.to_string(),
    };

    let padded = size
        .checked_add(HEAP_SLACK)
        .ok_or_else(|| failure("size overflows the address space"))?;
    let layout = Layout::from_size_align(padded, MAX_ALIGN)
        .map_err(|_| failure("size overflows the address space"))?;

    // SAFETY: layout has a non-zero size
    let pointer = unsafe { std::alloc::alloc_zeroed(layout) };
    let Some(base) = NonNull::new(pointer) else {
        return Err(failure("out of memory"));
    };

    log::debug!("malloc succeeds, address=${:x}", base.as_ptr() as usize);

    // SAFETY: base points to padded >= size zeroed bytes allocated with layout
    Ok(unsafe { Region::from_raw(base, size, Placement::Heap { layout }, Protection::READ_WRITE) })
}

#[cfg(unix)]
fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions
    let reported = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    usize::try_from(reported)
        .ok()
        .filter(|size| size.is_power_of_two())
        .unwrap_or(FALLBACK_PAGE_SIZE)
}

#[cfg(not(unix))]
fn page_size() -> usize {
    FALLBACK_PAGE_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_regions() {
        let mut allocator = Allocator::with_policy(PlacementPolicy::HeapOnly);
        let mut region = allocator.allocate(100).unwrap();

        assert!(!region.is_mapped());
        assert_eq!(region.len(), 100);
        assert_eq!(region.base() % MAX_ALIGN, 0);
        assert!(region.as_slice().iter().all(|&byte| byte == 0));
        match region.placement() {
            Placement::Heap { layout } => assert_eq!(layout.size(), 100 + HEAP_SLACK),
            Placement::Mapped { .. } => panic!("expected a heap region"),
        }

        region.write_word(3, 0xfeed).unwrap();
        assert_eq!(region.read_word(3).unwrap(), 0xfeed);
        assert!(region.write_word(100, 1).is_err());
        assert_eq!(allocator.next_address(), 0);
    }

    #[test]
    fn zero_sized_heap_region() {
        let region = heap(0).unwrap();
        assert!(region.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn mapped_regions() {
        let mut allocator = Allocator::new();
        let mut region = allocator.allocate(3 * allocator.page_size() + 5).unwrap();

        assert!(region.is_mapped());
        assert_eq!(region.base() % allocator.page_size(), 0);
        assert_eq!(region.protection(), Protection::READ_WRITE_EXECUTE);
        region.as_mut_slice().fill(0xa5);
        assert!(region.as_slice().iter().all(|&byte| byte == 0xa5));
    }

    #[cfg(unix)]
    #[test]
    fn guard_spacing() {
        let mut allocator = Allocator::new();
        let page = allocator.page_size();

        let first = allocator.allocate(2 * page + 1).unwrap();
        let hint = allocator.next_address();
        assert!(hint >= first.end() + page);

        let second = allocator.allocate(page).unwrap();
        assert!(first.is_mapped() && second.is_mapped());

        let gap = if second.base() >= first.end() {
            second.base() - align_up(first.end(), page).unwrap()
        } else {
            first.base() - align_up(second.end(), page).unwrap()
        };
        assert!(gap >= page, "regions only {gap:#x} bytes apart");
    }

    #[test]
    fn fallback_without_mapping() {
        let mut allocator = Allocator::new();
        let error = allocator
            .allocate_with(usize::MAX - 8, PlacementPolicy::PreferMapping)
            .unwrap_err();
        assert!(matches!(error, Error::AllocationFailure { .. }));
    }
}
