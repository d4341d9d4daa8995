use thiserror::Error;

use crate::{engine::fault::FaultKind, image::magic::Descriptor};

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Every load-time condition is unrecoverable: a malformed or incompatible image cannot be made
/// valid by reading it again, and a half-relocated image is unsafe to execute. The library
/// therefore never retries; it hands the error back to the caller, and the CLI entry point turns
/// it into a diagnostic on stderr and a non-zero exit code (see [`Error::exit_code`]).
///
/// # Error Categories
///
/// ## Image Validation
/// - [`Error::NotAnImage`] - No image signature before the end of the stream
/// - [`Error::IncompatiblePlatform`] - Word/char/address-unit size or byte order differs
/// - [`Error::NonRelocatableAddressMismatch`] - Fixed-address image placed elsewhere
/// - [`Error::IncompatibleImage`] - Checksum of the image does not match this executable
/// - [`Error::Malformed`] - Internally inconsistent image data
/// - [`Error::OutOfBounds`] - Stream ended inside the header, body or bitmap
///
/// ## Resources
/// - [`Error::AllocationFailure`] - Neither mapping nor heap could supply a region
/// - [`Error::ImageNotFound`] - Search path walk found no readable image
/// - [`Error::FileError`] - Filesystem I/O errors
///
/// ## Size Specifications
/// - [`Error::InvalidSizeUnit`] - Unknown unit suffix
/// - [`Error::SizeTooLargeForPlatform`] - Size not representable in the address space
///
/// ## Execution
/// - [`Error::RuntimeFault`] - Hardware fault during dispatch in die-on-signal mode
///
/// # Examples
///
/// ```rust,no_run
/// use forthboot::Error;
///
/// fn report(error: &Error) {
///     match error {
///         Error::IncompatibleImage { image, executable } => {
///             eprintln!("checksum ${image:x} vs ${executable:x}");
///         }
///         Error::NotAnImage => eprintln!("not an image"),
///         other => eprintln!("{other}"),
///     }
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The stream ended before an image signature was found.
    ///
    /// The magic scan reads the stream in 8-byte chunks from offset 0; running out of data
    /// before a chunk starts with the signature means the input is not an image at all.
    #[error("Image doesn't seem to be a threaded-code image (no signature found)")]
    NotAnImage,

    /// The image was built for a machine with a different memory model.
    ///
    /// Raised before the header is read, as soon as the packed descriptor byte following the
    /// signature differs from the running platform's own descriptor.
    #[error("This image is {image},\nwhereas the machine is {machine}.")]
    IncompatiblePlatform {
        /// Descriptor stored in the image
        image: Descriptor,
        /// Descriptor of the running platform
        machine: Descriptor,
    },

    /// A non-relocatable image could not be placed at the address it was compiled for.
    #[error("Cannot load nonrelocatable image (compiled for address ${expected:x}) at address ${actual:x}")]
    NonRelocatableAddressMismatch {
        /// Address recorded in the image header
        expected: usize,
        /// Address the image was actually placed at
        actual: usize,
    },

    /// The image checksum does not match the primitive layout of this executable.
    #[error("Checksum of image (${image:x}) does not match the executable (${executable:x})")]
    IncompatibleImage {
        /// Checksum stored in the image header
        image: usize,
        /// Fingerprint computed from the running executable
        executable: usize,
    },

    /// Working memory could not be obtained from either the mapping or the heap path.
    #[error("Cannot allocate {size} bytes: {reason}")]
    AllocationFailure {
        /// Requested region size in bytes
        size: usize,
        /// Reason reported by the last strategy attempted
        reason: String,
    },

    /// A size specification carried an unknown unit suffix.
    #[error("cannot grok size specification {spec}: invalid unit \"{unit}\"")]
    InvalidSizeUnit {
        /// The complete size specification as entered
        spec: String,
        /// The offending unit suffix
        unit: String,
    },

    /// A size specification cannot be represented on this machine.
    #[error("size specification \"{spec}\" too large for this machine")]
    SizeTooLargeForPlatform {
        /// The complete size specification as entered
        spec: String,
    },

    /// A hardware fault was raised during dispatch and recovery was disabled.
    #[error("Runtime fault during execution: {kind} (throw code {code})")]
    RuntimeFault {
        /// Classified fault
        kind: FaultKind,
        /// Language-level throw code the fault translates to
        code: isize,
    },

    /// The image is damaged and could not be loaded.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while reading the image.
    ///
    /// Raised when the stream ends in the middle of the header, the image body or the
    /// relocation bitmap.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// No image file with the requested name exists on the search path.
    #[error("cannot open image file {name} in path {path} for reading")]
    ImageNotFound {
        /// Image name that was searched for
        name: String,
        /// Search path that was walked
        path: String,
    },

    /// File I/O error.
    ///
    /// Wraps standard I/O errors that can occur during file operations
    /// such as reading from disk, permission issues, or filesystem errors.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}

impl Error {
    /// Process exit code the CLI reports for this error.
    ///
    /// Load-time failures exit with 1. A runtime fault that was not recovered mirrors the
    /// shell convention for signal deaths where the fault maps back to a signal.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::RuntimeFault { kind, .. } => kind.signal().map_or(1, |signal| 128 + signal),
            _ => 1,
        }
    }
}
