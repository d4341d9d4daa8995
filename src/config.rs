//! Runtime configuration.
//!
//! Everything the loader, allocator, sizer and bootstrap need to know about the user's choices is
//! collected in a single [`Config`] built once at startup and passed down by reference. There is
//! no global mutable state.
//!
//! # Example
//!
//! ```rust
//! use forthboot::config::{Config, RegionSizes};
//!
//! let config = Config::new()
//!     .with_sizes(RegionSizes {
//!         return_stack: 64 * 1024,
//!         ..RegionSizes::default()
//!     })
//!     .with_clear_dictionary(true);
//!
//! assert!(config.clear_dictionary);
//! assert_eq!(config.sizes.dictionary, 0);
//! ```

use std::fmt;

/// Number of machine words the dictionary is shifted by in offset-image mode.
pub const OFFSET_IMAGE_WORDS: usize = 56;

/// Byte sizes of the dictionary and the four stacks.
///
/// The same shape is used for user overrides (where 0 means "not given"), for the defaults an
/// image declares in its header, and for the resolved sizes the loader finally allocates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegionSizes {
    /// Dictionary size in bytes, including the image header
    pub dictionary: usize,
    /// Data stack size in bytes
    pub data_stack: usize,
    /// Floating-point stack size in bytes
    pub fp_stack: usize,
    /// Return stack size in bytes
    pub return_stack: usize,
    /// Locals stack size in bytes
    pub locals_stack: usize,
}

impl RegionSizes {
    /// Returns the four stack sizes in header order: data, floating-point, return, locals.
    #[must_use]
    pub fn stacks(&self) -> [usize; 4] {
        [
            self.data_stack,
            self.fp_stack,
            self.return_stack,
            self.locals_stack,
        ]
    }
}

impl fmt::Display for RegionSizes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dictionary={:#x} data={:#x} fp={:#x} return={:#x} locals={:#x}",
            self.dictionary, self.data_stack, self.fp_stack, self.return_stack, self.locals_stack
        )
    }
}

/// User-selected options for loading and running an image.
///
/// # Default Configuration
///
/// - No size overrides, every region takes the image's declared default
/// - Dictionary placed without offset and without zero-filling
/// - Hardware faults are recovered at the image's throw entry
/// - Debug tracing off
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Region size overrides; a zero field means "use the image default"
    pub sizes: RegionSizes,
    /// Shift the dictionary by [`OFFSET_IMAGE_WORDS`] machine words
    pub offset_image: bool,
    /// Zero-fill the dictionary region before reading the image into it
    pub clear_dictionary: bool,
    /// Let hardware faults terminate the process instead of recovering
    pub die_on_signal: bool,
    /// Emit the loader's diagnostic trace
    pub debug: bool,
}

impl Config {
    /// Creates a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the region size overrides.
    #[must_use]
    pub fn with_sizes(mut self, sizes: RegionSizes) -> Self {
        self.sizes = sizes;
        self
    }

    /// Enables or disables offset-image mode.
    #[must_use]
    pub fn with_offset_image(mut self, enabled: bool) -> Self {
        self.offset_image = enabled;
        self
    }

    /// Enables or disables zero-filling the dictionary before the image is read.
    #[must_use]
    pub fn with_clear_dictionary(mut self, enabled: bool) -> Self {
        self.clear_dictionary = enabled;
        self
    }

    /// Enables or disables die-on-signal mode.
    #[must_use]
    pub fn with_die_on_signal(mut self, enabled: bool) -> Self {
        self.die_on_signal = enabled;
        self
    }

    /// Enables or disables the diagnostic trace.
    #[must_use]
    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// Bytes the dictionary is shifted by inside its region.
    #[must_use]
    pub fn image_offset(&self) -> usize {
        if self.offset_image {
            OFFSET_IMAGE_WORDS * crate::file::io::WORD
        } else {
            0
        }
    }
}
