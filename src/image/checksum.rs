//! Executable fingerprint.
//!
//! An image stores the fingerprint of the executable it was last loaded by. Loading it with an
//! executable whose primitive layout differs would make every relocated code address wrong, so a
//! mismatch is rejected before anything runs.

use crate::{Error, Result};

/// Version of the primitive set; the seed of the fold.
pub const PRIM_VERSION: usize = 1;

/// Folds entry addresses into a fingerprint: xor each address in, then rotate left by five.
#[must_use]
pub fn fold(entries: &[usize]) -> usize {
    entries
        .iter()
        .fold(PRIM_VERSION, |acc, &entry| (acc ^ entry).rotate_left(5))
}

/// How a stored fingerprint relates to the running executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumStatus {
    /// The image carried no fingerprint and must be stamped with this one
    Stamp(usize),
    /// The stored fingerprint matches
    Verified,
}

/// Compares the fingerprint stored in an image with the executable's.
///
/// # Errors
///
/// Returns [`crate::Error::IncompatibleImage`] if `stored` is non-zero and differs from
/// `computed`.
pub fn reconcile(stored: usize, computed: usize) -> Result<ChecksumStatus> {
    if stored == 0 {
        Ok(ChecksumStatus::Stamp(computed))
    } else if stored == computed {
        Ok(ChecksumStatus::Verified)
    } else {
        Err(Error::IncompatibleImage {
            image: stored,
            executable: computed,
        })
    }
}
