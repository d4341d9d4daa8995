//! The image format and the loader.
//!
//! An image is a persisted snapshot of the dictionary, written by the image compiler and loaded
//! once per run. This module covers everything between the bytes on disk and a resident image
//! that is ready to execute.
//!
//! # Key Components
//!
//! - [`crate::image::ImageLoader`] - Runs the load sequence and produces an [`crate::image::Image`]
//! - [`crate::image::magic`] - Signature scan and platform descriptor
//! - [`crate::image::header`] - The sixteen-word header
//! - [`crate::image::resolve_sizes`] - Region size resolution
//! - [`crate::image::relocate`] - Tag decoding and the relocation pass
//! - [`crate::image::checksum`] - Executable fingerprint
//! - [`crate::image::ImageBuilder`] - Writes image files

pub mod checksum;
pub mod header;
pub mod magic;
pub mod relocate;

mod builder;
mod loader;
mod sizer;

pub use builder::{ImageBuilder, DEFAULT_SIZES};
pub use header::{HeaderField, ImageHeader};
pub use loader::{Image, ImageLoader, StackKind};
pub use magic::Descriptor;
pub use relocate::{RelocationStats, Relocator, Tag};
pub use sizer::resolve_sizes;
