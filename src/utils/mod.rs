//! Shared helpers for size arithmetic.
//!
//! - [`crate::utils::parse_size`] - Size specification grammar used by the CLI
//! - [`crate::utils::align_up`] / [`crate::utils::max_aligned`] - Alignment rounding used by the
//!   sizer and the allocator

mod math;
mod size;

pub use math::{align_up, log2_exact, max_aligned, MAX_ALIGN};
pub use size::{parse_size, SizeUnit};
