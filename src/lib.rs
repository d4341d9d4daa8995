// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]
// - 'file/physical.rs' uses mmap to map a file into memory
// - 'memory/' maps, protects and frees working memory
// - 'engine/signals.rs' installs signal handlers

//! # forthboot
//!
//! Image loader, relocator and execution bootstrap for threaded-code Forth runtimes.
//!
//! A Forth system is shipped as a pre-compiled *image*: a snapshot of its dictionary (code and
//! data interleaved) together with default sizes for its stacks. `forthboot` turns such an image
//! into a running system: it validates the image against the executable, places the dictionary
//! and the four stacks in working memory, rewrites every position-dependent word for the chosen
//! address and the executable's primitive table, and finally hands control to the threaded-code
//! dispatcher, catching hardware faults and re-entering the image's error handler.
//!
//! ## Features
//!
//! - **Bit-exact image format** - Shebang preamble, `Gforth2` magic with platform descriptor,
//!   sixteen-word header and MSB-first relocation bitmap
//! - **Relocation** - Image offsets, null references, code fields, behaviour extensions and
//!   primitive references resolved for direct, indirect and doubly indirect threading
//! - **Fingerprinting** - Primitive-set checksums stamped into fresh images and verified on load
//! - **Working memory** - Guard-paged anonymous mappings with a heap fallback
//! - **Fault recovery** - Hardware faults become typed throw codes delivered at the image's
//!   throw entry, on emergency stacks if the originals are unusable
//!
//! ## Architecture
//!
//! - [`crate::image`] - Magic, header, relocation, checksum, sizing, loading and writing images
//! - [`crate::memory`] - Region placement, guard pages and instruction-cache maintenance
//! - [`crate::engine`] - Dispatcher contract, primitive tables, fault delivery and bootstrap
//! - [`crate::config`] - Explicit runtime configuration
//! - [`crate::cli`] - Command-line front end for executables embedding a dispatcher
//! - [`crate::file`] - Image byte sources and a bounds-checked cursor
//! - [`crate::utils`] - Size parsing and alignment helpers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use forthboot::prelude::*;
//!
//! struct Interpreter {
//!     table: PrimitiveTable,
//! }
//!
//! impl Engine for Interpreter {
//!     fn primitives(&self) -> &PrimitiveTable {
//!         &self.table
//!     }
//!
//!     fn strategy(&self) -> DispatchStrategy {
//!         DispatchStrategy::Indirect
//!     }
//!
//!     fn dispatch(&mut self, _state: MachineState) -> i32 {
//!         0
//!     }
//! }
//!
//! let mut engine = Interpreter {
//!     table: PrimitiveTable::new(&[0x1000, 0x1008, 0x1010, 0x1018, 0x1020, 0x1028, 0x1030, 0x1038])?,
//! };
//! let config = Config::new();
//! let mut image = ImageLoader::new(&config, &engine).load_file("forth.fi")?;
//! let code = forthboot::engine::go(&mut engine, &mut image, &config, &[])?;
//! # Ok::<(), forthboot::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [`crate::Result`]. The library never terminates the process;
//! [`crate::cli`] turns errors into a diagnostic line and an exit code via
//! [`crate::Error::exit_code`].
//!
//! ## Logging
//!
//! Loader steps are traced through the [`log`] facade at debug level; the command-line front end
//! routes them to stderr with `env_logger` when `--debug` is given.
#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust,no_run
/// use forthboot::prelude::*;
///
/// let image = ImageBuilder::new().build();
/// assert!(parse_size("4k", WORD)? >= 4096);
/// # Ok::<(), forthboot::Error>(())
/// ```
pub mod prelude;

/// Command-line front end.
pub mod cli;

/// Runtime configuration.
pub mod config;

/// Dispatcher contract, primitive tables, fault delivery and the execution bootstrap.
pub mod engine;

/// Image byte sources.
///
/// Images are read through the [`file::Backend`] trait, either from a memory-mapped file or from
/// a buffer, and parsed with the bounds-checked [`Parser`].
pub mod file;

/// The image format and the loader.
pub mod image;

/// Working memory for the dictionary and the stacks.
pub mod memory;

/// Size parsing and alignment helpers.
pub mod utils;

/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
///
/// # Examples
///
/// ```rust,no_run
/// use forthboot::{config::Config, engine::Engine, image::{Image, ImageLoader}, Result};
///
/// fn load(engine: &dyn Engine, path: &str) -> Result<Image> {
///     ImageLoader::new(&Config::new(), engine).load_file(path)
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `forthboot` Error type
///
/// # Examples
///
/// ```rust,no_run
/// use forthboot::{image::ImageLoader, Error};
/// # use forthboot::{config::Config, engine::Engine};
/// # fn engine() -> Box<dyn Engine> { unimplemented!() }
/// let engine = engine();
///
/// match ImageLoader::new(&Config::new(), engine.as_ref()).load_file("forth.fi") {
///     Ok(_) => println!("Loaded successfully"),
///     Err(Error::IncompatibleImage { .. }) => println!("Image built for another executable"),
///     Err(Error::Malformed { message, .. }) => println!("Malformed: {}", message),
///     Err(e) => println!("Error: {}", e),
/// }
/// ```
pub use error::Error;

/// Bounds-checked cursor over image bytes.
pub use file::parser::Parser;
