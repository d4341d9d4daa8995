//! Human-entered region size specifications.
//!
//! Sizes are given as an unsigned number followed by an optional unit, `[0-9]+[ebkMGT]?`, e.g.
//! `25k`. The number is read like C's `strtoul` with base 0, so `0x` introduces hexadecimal and
//! a leading `0` octal. Without a unit, or with `e`, the number counts elements whose size is
//! chosen by the caller: cells for the dictionary, data, return and locals stacks, floats for the
//! floating-point stack.

use std::str::FromStr;

use strum::{Display, EnumString};

use crate::{Error, Result};

/// Unit suffix of a size specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum SizeUnit {
    /// Caller-supplied element size (default)
    #[strum(serialize = "e", serialize = "")]
    Element,
    /// Single bytes
    #[strum(serialize = "b")]
    Byte,
    /// 2^10 bytes
    #[strum(serialize = "k")]
    Kilo,
    /// 2^20 bytes
    #[strum(serialize = "M")]
    Mega,
    /// 2^30 bytes
    #[strum(serialize = "G")]
    Giga,
    /// 2^40 bytes, only where the address space can represent it
    #[strum(serialize = "T")]
    Tera,
}

impl SizeUnit {
    /// Number of bytes one unit stands for, or `None` if this machine cannot address it.
    #[must_use]
    pub fn multiplier(self, element_size: usize) -> Option<usize> {
        match self {
            SizeUnit::Element => Some(element_size),
            SizeUnit::Byte => Some(1),
            SizeUnit::Kilo => Some(1 << 10),
            SizeUnit::Mega => Some(1 << 20),
            SizeUnit::Giga => Some(1 << 30),
            SizeUnit::Tera => 1_usize.checked_shl(40).filter(|_| usize::BITS > 32),
        }
    }
}

/// Parses a size specification into a byte count.
///
/// # Arguments
///
/// * `spec` - The specification as entered, e.g. `"4k"` or `"100"`
/// * `element_size` - Bytes per element for unit-less and `e` specifications
///
/// # Errors
///
/// Returns [`crate::Error::InvalidSizeUnit`] for an unknown suffix and
/// [`crate::Error::SizeTooLargeForPlatform`] when `T` is used on a 32-bit machine or the result
/// does not fit in the address space.
///
/// # Examples
///
/// ```rust
/// use forthboot::utils::parse_size;
///
/// assert_eq!(parse_size("4k", 8)?, 4096);
/// assert_eq!(parse_size("2M", 8)?, 2_097_152);
/// assert_eq!(parse_size("100", 8)?, 800);
/// assert!(parse_size("3q", 8).is_err());
/// # Ok::<(), forthboot::Error>(())
/// ```
pub fn parse_size(spec: &str, element_size: usize) -> Result<usize> {
    let (digits, radix, suffix) = split_number(spec);

    let unit = SizeUnit::from_str(suffix).map_err(|_| Error::InvalidSizeUnit {
        spec: spec.to_string(),
        unit: suffix.to_string(),
    })?;

    let too_large = || Error::SizeTooLargeForPlatform {
        spec: spec.to_string(),
    };

    let count = if digits.is_empty() {
        0
    } else {
        usize::from_str_radix(digits, radix).map_err(|_| too_large())?
    };

    let multiplier = unit.multiplier(element_size).ok_or_else(too_large)?;
    count.checked_mul(multiplier).ok_or_else(too_large)
}

/// Splits `spec` into its numeric digits, their radix, and the remaining unit suffix.
fn split_number(spec: &str) -> (&str, u32, &str) {
    let spec = spec.trim_start();

    let (body, radix) = match spec.strip_prefix("0x").or_else(|| spec.strip_prefix("0X")) {
        Some(hex) if hex.starts_with(|c: char| c.is_ascii_hexdigit()) => (hex, 16),
        _ if spec.starts_with('0') => (spec, 8),
        _ => (spec, 10),
    };

    let end = body
        .find(|c: char| !c.is_digit(radix))
        .unwrap_or(body.len());
    (&body[..end], radix, &body[end..])
}
