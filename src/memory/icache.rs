//! Instruction-cache maintenance.
//!
//! The image is written through the data cache but later executed. Architectures with split,
//! non-coherent caches must clean the data lines and invalidate the instruction lines covering
//! the image before any of it runs.

/// Makes `len` bytes at `start` coherent for instruction fetch.
#[cfg(target_arch = "aarch64")]
pub fn flush_icache(start: usize, len: usize) {
    use std::{arch::asm, sync::atomic::{compiler_fence, Ordering}};

    if len == 0 {
        return;
    }

    let ctr: u64;
    // SAFETY: CTR_EL0 is readable from EL0 on every supported aarch64 OS
    unsafe { asm!("mrs {0}, ctr_el0", out(reg) ctr) };
    let dcache_line = 4_usize << ((ctr >> 16) & 0xf);
    let icache_line = 4_usize << (ctr & 0xf);
    let end = start.saturating_add(len);

    let mut line = start & !(dcache_line - 1);
    while line < end {
        // SAFETY: cache maintenance by VA does not modify memory
        unsafe { asm!("dc cvau, {0}", in(reg) line) };
        line += dcache_line;
    }
    // SAFETY: barrier only
    unsafe { asm!("dsb ish") };

    let mut line = start & !(icache_line - 1);
    while line < end {
        // SAFETY: cache maintenance by VA does not modify memory
        unsafe { asm!("ic ivau, {0}", in(reg) line) };
        line += icache_line;
    }
    // SAFETY: barriers only
    unsafe { asm!("dsb ish", "isb") };

    compiler_fence(Ordering::SeqCst);
}

/// Makes `len` bytes at `start` coherent for instruction fetch.
///
/// Instruction and data caches are coherent here; only store ordering has to be enforced.
#[cfg(not(target_arch = "aarch64"))]
pub fn flush_icache(start: usize, len: usize) {
    use std::sync::atomic::{compiler_fence, fence, Ordering};

    let _ = (start, len);
    fence(Ordering::SeqCst);
    compiler_fence(Ordering::SeqCst);
}
