//! Region size resolution.

use crate::{config::RegionSizes, utils::max_aligned};

/// Reconciles user overrides with an image's declared defaults.
///
/// Every zero field of `overrides` takes the corresponding field of `defaults`; every result is
/// then rounded up to the platform's maximum scalar alignment. Resolving an already resolved
/// set against any defaults returns it unchanged.
///
/// # Examples
///
/// ```rust
/// use forthboot::{config::RegionSizes, image::resolve_sizes, utils::MAX_ALIGN};
///
/// let overrides = RegionSizes { return_stack: 100, ..RegionSizes::default() };
/// let defaults = RegionSizes {
///     dictionary: 4096,
///     data_stack: 1024,
///     fp_stack: 1024,
///     return_stack: 1024,
///     locals_stack: 1024,
/// };
///
/// let resolved = resolve_sizes(&overrides, &defaults);
/// assert_eq!(resolved.return_stack % MAX_ALIGN, 0);
/// assert!(resolved.return_stack >= 100 && resolved.return_stack < 100 + MAX_ALIGN);
/// assert_eq!(resolved.dictionary, 4096);
/// ```
#[must_use]
pub fn resolve_sizes(overrides: &RegionSizes, defaults: &RegionSizes) -> RegionSizes {
    let pick = |chosen: usize, default: usize| {
        max_aligned(if chosen == 0 { default } else { chosen })
    };

    RegionSizes {
        dictionary: pick(overrides.dictionary, defaults.dictionary),
        data_stack: pick(overrides.data_stack, defaults.data_stack),
        fp_stack: pick(overrides.fp_stack, defaults.fp_stack),
        return_stack: pick(overrides.return_stack, defaults.return_stack),
        locals_stack: pick(overrides.locals_stack, defaults.locals_stack),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::MAX_ALIGN;

    #[test]
    fn overrides_and_defaults() {
        let n = 3 * MAX_ALIGN + 1;
        let overrides = RegionSizes {
            dictionary: 0,
            data_stack: 0,
            fp_stack: 0,
            return_stack: n,
            locals_stack: 0,
        };
        let defaults = RegionSizes {
            dictionary: 0x8001,
            data_stack: 0x4000,
            fp_stack: 0x1003,
            return_stack: 0x4000,
            locals_stack: 0x2005,
        };

        let resolved = resolve_sizes(&overrides, &defaults);
        assert_eq!(
            resolved,
            RegionSizes {
                dictionary: max_aligned(0x8001),
                data_stack: max_aligned(0x4000),
                fp_stack: max_aligned(0x1003),
                return_stack: 4 * MAX_ALIGN,
                locals_stack: max_aligned(0x2005),
            }
        );
    }

    #[test]
    fn idempotent() {
        let defaults = RegionSizes {
            dictionary: 1001,
            data_stack: 33,
            fp_stack: 17,
            return_stack: 9,
            locals_stack: 1,
        };
        let once = resolve_sizes(&RegionSizes::default(), &defaults);
        let twice = resolve_sizes(&once, &defaults);
        assert_eq!(once, twice);
        for size in once.stacks() {
            assert_eq!(size % MAX_ALIGN, 0);
        }
    }
}
