//! Working memory for the dictionary and the stacks.
//!
//! # Key Components
//!
//! - [`crate::memory::Allocator`] - Hinted mappings with guard pages, heap fallback
//! - [`crate::memory::Region`] - An owned block of working memory
//! - [`crate::memory::Protection`] - Access permissions of a region
//! - [`crate::memory::flush_icache`] - Instruction-cache coherence for freshly written code

mod allocator;
mod icache;
mod region;

pub use allocator::{Allocator, PlacementPolicy, HEAP_SLACK};
pub use icache::flush_icache;
pub use region::{Placement, Protection, Region};
