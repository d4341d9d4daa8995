//! # forthboot Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the forthboot library. Import this module to get quick access to everything needed to
//! load and run an image.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all forthboot operations
pub use crate::Error;

/// The result type used throughout forthboot
pub use crate::Result;

/// Runtime configuration and region sizes
pub use crate::config::{Config, RegionSizes};

// ================================================================================================
// Images
// ================================================================================================

/// Loading and inspecting images
pub use crate::image::{Image, ImageLoader, StackKind};

/// Writing images
pub use crate::image::ImageBuilder;

/// Image header and platform descriptor
pub use crate::image::{Descriptor, HeaderField, ImageHeader};

/// Relocation pass
pub use crate::image::{RelocationStats, Relocator};

// ================================================================================================
// Dispatcher Boundary
// ================================================================================================

/// Dispatcher contract and register file
pub use crate::engine::{Engine, MachineState};

/// Primitive tables and threading strategies
pub use crate::engine::{CodeFieldKind, DispatchStrategy, PrimitiveTable};

/// Fault delivery
pub use crate::engine::{protected_call, raise_fault, CapturedFault, FaultKind, Outcome};

// ================================================================================================
// Memory and Utilities
// ================================================================================================

/// Working memory
pub use crate::memory::{Allocator, PlacementPolicy, Region};

/// Size specifications
pub use crate::utils::parse_size;

/// Low-level parsing
pub use crate::{file::io::WORD, Parser};
