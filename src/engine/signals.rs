//! Hardware-fault interception on Unix.
//!
//! While a [`FaultGuard`] is alive, `SIGSEGV`, `SIGBUS`, `SIGFPE` and `SIGILL` are handled by
//! classifying the signal into a [`FaultKind`] and delivering it through
//! [`raise_fault`](crate::engine::fault::raise_fault), so it surfaces at the innermost
//! [`protected_call`](crate::engine::fault::protected_call).
//!
//! On x86-64 and AArch64 Linux the handler does not unwind itself. It rewrites the interrupted
//! context so that, once the handler returns, the faulting thread continues in a small assembly
//! trampoline that looks as if the faulting instruction had called it. The unwind then starts
//! from an ordinary call frame whose call-frame information describes the faulting frame
//! exactly, no matter which instruction faulted. Elsewhere the fault is raised straight from the
//! handler, which is installed with `SA_NODEFER` so the signal stays deliverable afterwards.
//!
//! Guards are counted process-wide. The first guard installs the handler, the last one dropped
//! restores whatever was installed before.

use std::{mem, ptr, sync::Mutex};

#[cfg(any(
    all(target_os = "linux", target_env = "gnu", target_arch = "x86_64"),
    all(target_os = "linux", target_env = "gnu", target_arch = "aarch64")
))]
use std::cell::Cell;

use libc::{c_int, c_void, siginfo_t};

use crate::{
    engine::fault::{raise_fault, CapturedFault, FaultKind},
    Error, Result,
};

/// Signals turned into faults.
pub const INTERCEPTED: [c_int; 4] = [libc::SIGSEGV, libc::SIGBUS, libc::SIGFPE, libc::SIGILL];

struct Installed {
    guards: usize,
    previous: Vec<(c_int, libc::sigaction)>,
}

static INSTALLED: Mutex<Installed> = Mutex::new(Installed {
    guards: 0,
    previous: Vec::new(),
});

#[cfg(any(
    all(target_os = "linux", target_env = "gnu", target_arch = "x86_64"),
    all(target_os = "linux", target_env = "gnu", target_arch = "aarch64")
))]
thread_local! {
    static PENDING: Cell<Option<CapturedFault>> = const { Cell::new(None) };
}

/// Keeps the fault handler installed for as long as it lives.
#[derive(Debug)]
#[must_use = "the handler is removed when the guard is dropped"]
pub struct FaultGuard {
    _private: (),
}

impl FaultGuard {
    /// Installs the fault handler for all [`INTERCEPTED`] signals.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Error`] if `sigaction` refuses one of the signals. Handlers
    /// installed before the failure are restored.
    pub fn install() -> Result<Self> {
        let mut installed = lock();
        if installed.guards == 0 {
            let mut previous = Vec::with_capacity(INTERCEPTED.len());
            for signal in INTERCEPTED {
                match swap(signal, &handler_action()) {
                    Ok(old) => previous.push((signal, old)),
                    Err(error) => {
                        restore(&previous);
                        return Err(error);
                    }
                }
            }
            log::debug!("fault handler installed for signals {INTERCEPTED:?}");
            installed.previous = previous;
        }

        installed.guards += 1;
        Ok(FaultGuard { _private: () })
    }

    /// Number of guards alive in the process.
    #[must_use]
    pub fn active() -> usize {
        lock().guards
    }
}

impl Drop for FaultGuard {
    fn drop(&mut self) {
        let mut installed = lock();
        installed.guards = installed.guards.saturating_sub(1);
        if installed.guards == 0 {
            restore(&installed.previous);
            installed.previous.clear();
            log::debug!("fault handler removed");
        }
    }
}

fn lock() -> std::sync::MutexGuard<'static, Installed> {
    INSTALLED
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn handler_action() -> libc::sigaction {
    // SAFETY: sigaction is plain data for which all-zero is a valid value
    let mut action: libc::sigaction = unsafe { mem::zeroed() };
    action.sa_sigaction = handler as *const () as usize;
    action.sa_flags = libc::SA_SIGINFO | libc::SA_NODEFER;
    // SAFETY: sa_mask is a valid sigset_t owned by action
    unsafe { libc::sigemptyset(&mut action.sa_mask) };
    action
}

fn swap(signal: c_int, action: &libc::sigaction) -> Result<libc::sigaction> {
    // SAFETY: as above
    let mut old: libc::sigaction = unsafe { mem::zeroed() };
    // SAFETY: both pointers refer to live sigaction values
    if unsafe { libc::sigaction(signal, action, &mut old) } != 0 {
        return Err(Error::Error(format!(
            "cannot install handler for signal {signal}: {}",
            std::io::Error::last_os_error()
        )));
    }
    Ok(old)
}

fn restore(previous: &[(c_int, libc::sigaction)]) {
    for (signal, action) in previous {
        // SAFETY: action was returned by sigaction for this signal
        if unsafe { libc::sigaction(*signal, action, ptr::null_mut()) } != 0 {
            log::warn!(
                "cannot restore handler for signal {signal}: {}",
                std::io::Error::last_os_error()
            );
        }
    }
}

/// Address of the handler currently installed for `signal`.
///
/// # Errors
///
/// Returns [`crate::Error::Error`] if `sigaction` rejects the signal number.
pub fn current_handler(signal: c_int) -> Result<usize> {
    // SAFETY: as above
    let mut current: libc::sigaction = unsafe { mem::zeroed() };
    // SAFETY: a null action only queries the installed one
    if unsafe { libc::sigaction(signal, ptr::null(), &mut current) } != 0 {
        return Err(Error::Error(format!(
            "cannot query handler for signal {signal}: {}",
            std::io::Error::last_os_error()
        )));
    }
    Ok(current.sa_sigaction)
}

/// Whether the fault handler is what `signal` currently runs.
#[must_use]
pub fn is_installed(signal: c_int) -> bool {
    current_handler(signal).is_ok_and(|current| current == handler as *const () as usize)
}

extern "C-unwind" fn handler(signal: c_int, info: *mut siginfo_t, context: *mut c_void) {
    let code = if info.is_null() {
        0
    } else {
        // SAFETY: with SA_SIGINFO the kernel passes a valid siginfo_t
        unsafe { (*info).si_code }
    };
    let fault = CapturedFault::new(FaultKind::from_signal(signal, code));

    // SAFETY: with SA_SIGINFO the third argument is the interrupted thread's ucontext_t
    if unsafe { redirect(context, fault) } {
        return;
    }
    raise_fault(fault);
}

/// Raises the fault recorded by the handler; entered from the trampoline.
#[cfg(any(
    all(target_os = "linux", target_env = "gnu", target_arch = "x86_64"),
    all(target_os = "linux", target_env = "gnu", target_arch = "aarch64")
))]
extern "C-unwind" fn raise_pending() -> ! {
    let fault = PENDING
        .with(Cell::take)
        .unwrap_or(CapturedFault::new(FaultKind::InvalidMemoryAddress));
    raise_fault(fault)
}

#[cfg(any(
    all(target_os = "linux", target_env = "gnu", target_arch = "x86_64"),
    all(target_os = "linux", target_env = "gnu", target_arch = "aarch64")
))]
extern "C" {
    fn forthboot_fault_trampoline();
}

// Entered with a return address pointing into the faulting instruction. The frame pointer keeps
// the CFA exact while the stack is realigned for the call.
#[cfg(all(target_os = "linux", target_env = "gnu", target_arch = "x86_64"))]
std::arch::global_asm!(
    ".pushsection .text.forthboot_fault_trampoline,\"ax\",@progbits",
    ".globl forthboot_fault_trampoline",
    ".hidden forthboot_fault_trampoline",
    ".type forthboot_fault_trampoline,@function",
    ".p2align 4",
    "forthboot_fault_trampoline:",
    ".cfi_startproc",
    "push rbp",
    ".cfi_def_cfa_offset 16",
    ".cfi_offset rbp, -16",
    "mov rbp, rsp",
    ".cfi_def_cfa_register rbp",
    "and rsp, -16",
    "call {raise}",
    "ud2",
    ".cfi_endproc",
    ".size forthboot_fault_trampoline, . - forthboot_fault_trampoline",
    ".popsection",
    raise = sym raise_pending,
);

// The fake return address travels in x17 so that x30 keeps the faulting frame's own link value.
#[cfg(all(target_os = "linux", target_env = "gnu", target_arch = "aarch64"))]
std::arch::global_asm!(
    ".pushsection .text.forthboot_fault_trampoline,\"ax\",%progbits",
    ".globl forthboot_fault_trampoline",
    ".hidden forthboot_fault_trampoline",
    ".type forthboot_fault_trampoline,%function",
    ".p2align 2",
    "forthboot_fault_trampoline:",
    ".cfi_startproc",
    ".cfi_return_column x17",
    "stp x29, x30, [sp, #-32]!",
    ".cfi_def_cfa_offset 32",
    ".cfi_offset x29, -32",
    ".cfi_offset x30, -24",
    "str x17, [sp, #16]",
    ".cfi_offset x17, -16",
    "mov x29, sp",
    "bl {raise}",
    "brk #1",
    ".cfi_endproc",
    ".size forthboot_fault_trampoline, . - forthboot_fault_trampoline",
    ".popsection",
    raise = sym raise_pending,
);

/// Points the interrupted context at the trampoline, returning whether it did.
#[cfg(all(target_os = "linux", target_env = "gnu", target_arch = "x86_64"))]
unsafe fn redirect(context: *mut c_void, fault: CapturedFault) -> bool {
    if context.is_null() {
        return false;
    }
    PENDING.with(|pending| pending.set(Some(fault)));
    // SAFETY: the caller passes the ucontext_t the kernel will restore
    let gregs = unsafe { &mut (*context.cast::<libc::ucontext_t>()).uc_mcontext.gregs };
    let pc = gregs[libc::REG_RIP as usize];
    let sp = gregs[libc::REG_RSP as usize].wrapping_sub(8);

    // SAFETY: the slot lies just below the interrupted stack pointer, inside its stack
    unsafe { (sp as *mut i64).write(pc.wrapping_add(1)) };
    gregs[libc::REG_RSP as usize] = sp;
    gregs[libc::REG_RIP as usize] = forthboot_fault_trampoline as *const () as i64;
    true
}

/// Points the interrupted context at the trampoline, returning whether it did.
#[cfg(all(target_os = "linux", target_env = "gnu", target_arch = "aarch64"))]
unsafe fn redirect(context: *mut c_void, fault: CapturedFault) -> bool {
    if context.is_null() {
        return false;
    }
    PENDING.with(|pending| pending.set(Some(fault)));
    // SAFETY: the caller passes the ucontext_t the kernel will restore
    let mcontext = unsafe { &mut (*context.cast::<libc::ucontext_t>()).uc_mcontext };
    mcontext.regs[17] = mcontext.pc.wrapping_add(4);
    mcontext.pc = forthboot_fault_trampoline as *const () as u64;
    true
}

#[cfg(not(any(
    all(target_os = "linux", target_env = "gnu", target_arch = "x86_64"),
    all(target_os = "linux", target_env = "gnu", target_arch = "aarch64")
)))]
unsafe fn redirect(_context: *mut c_void, _fault: CapturedFault) -> bool {
    false
}
