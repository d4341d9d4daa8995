//! Typed fault delivery.
//!
//! A fault raised while threaded code runs is turned into an unwind carrying a
//! [`CapturedFault`] payload. [`protected_call`] is the resumable boundary: it runs the dispatcher
//! and reports either its exit code or the fault that interrupted it. Panics that do not carry
//! a [`CapturedFault`] are not faults and keep unwinding.
//!
//! # Example
//!
//! ```rust
//! use forthboot::engine::{protected_call, raise_fault, CapturedFault, FaultKind, Outcome};
//!
//! let outcome = protected_call(|| raise_fault(CapturedFault::new(FaultKind::DivisionByZero)));
//! match outcome {
//!     Outcome::Faulted(fault) => assert_eq!(fault.kind.throw_code(), -10),
//!     Outcome::Exited(_) => unreachable!(),
//! }
//! ```

use std::{
    fmt, hint,
    panic::{self, AssertUnwindSafe},
};

/// Per-platform `si_code` values of `SIGFPE`.
#[cfg(unix)]
pub mod fpe {
    /// Integer divide by zero
    #[cfg(any(target_os = "macos", target_os = "ios"))]
    pub const INTDIV: i32 = 7;
    /// Floating-point overflow
    #[cfg(any(target_os = "macos", target_os = "ios"))]
    pub const FLTOVF: i32 = 2;

    /// Integer divide by zero
    #[cfg(any(target_os = "freebsd", target_os = "dragonfly"))]
    pub const INTDIV: i32 = 2;
    /// Floating-point overflow
    #[cfg(any(target_os = "freebsd", target_os = "dragonfly"))]
    pub const FLTOVF: i32 = 4;

    /// Integer divide by zero
    #[cfg(not(any(
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "dragonfly"
    )))]
    pub const INTDIV: i32 = 1;
    /// Floating-point overflow
    #[cfg(not(any(
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "dragonfly"
    )))]
    pub const FLTOVF: i32 = 4;
}

/// Classified hardware fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// Access to an unmapped or protected address
    InvalidMemoryAddress,
    /// Integer division by zero
    DivisionByZero,
    /// Misaligned access
    Alignment,
    /// Any other arithmetic trap
    FloatingPoint,
    /// A signal with no dedicated throw code
    Signal(i32),
}

impl FaultKind {
    /// Language-level throw code the dispatcher's error handler receives.
    #[must_use]
    pub fn throw_code(&self) -> isize {
        match self {
            FaultKind::InvalidMemoryAddress => -9,
            FaultKind::DivisionByZero => -10,
            FaultKind::Alignment => -23,
            FaultKind::FloatingPoint => -55,
            FaultKind::Signal(signal) => -256 - *signal as isize,
        }
    }

    /// Classifies a delivered signal and its `si_code`.
    #[cfg(unix)]
    #[must_use]
    pub fn from_signal(signal: i32, code: i32) -> Self {
        match signal {
            libc::SIGSEGV => FaultKind::InvalidMemoryAddress,
            libc::SIGBUS => FaultKind::Alignment,
            libc::SIGFPE if code == fpe::INTDIV => FaultKind::DivisionByZero,
            libc::SIGFPE => FaultKind::FloatingPoint,
            other => FaultKind::Signal(other),
        }
    }

    /// Signal number this fault is normally delivered by, where there is one.
    #[must_use]
    pub fn signal(&self) -> Option<i32> {
        #[cfg(unix)]
        {
            Some(match self {
                FaultKind::InvalidMemoryAddress => libc::SIGSEGV,
                FaultKind::Alignment => libc::SIGBUS,
                FaultKind::DivisionByZero | FaultKind::FloatingPoint => libc::SIGFPE,
                FaultKind::Signal(signal) => *signal,
            })
        }
        #[cfg(not(unix))]
        {
            match self {
                FaultKind::Signal(signal) => Some(*signal),
                _ => None,
            }
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::InvalidMemoryAddress => write!(f, "invalid memory address"),
            FaultKind::DivisionByZero => write!(f, "division by zero"),
            FaultKind::Alignment => write!(f, "address alignment exception"),
            FaultKind::FloatingPoint => write!(f, "floating-point unidentified fault"),
            FaultKind::Signal(signal) => write!(f, "signal {signal}"),
        }
    }
}

/// Dispatcher registers observed at the time of a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultRegisters {
    /// Instruction pointer
    pub ip: usize,
    /// Return stack pointer
    pub rp: usize,
}

/// A fault captured at the protected-call boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturedFault {
    /// What went wrong
    pub kind: FaultKind,
    /// Registers at the time of the fault, if known
    pub registers: Option<FaultRegisters>,
}

impl CapturedFault {
    /// Creates a fault without register information.
    #[must_use]
    pub fn new(kind: FaultKind) -> Self {
        CapturedFault {
            kind,
            registers: None,
        }
    }

    /// Attaches the dispatcher's instruction and return-stack pointers.
    #[must_use]
    pub fn with_registers(mut self, ip: usize, rp: usize) -> Self {
        self.registers = Some(FaultRegisters { ip, rp });
        self
    }
}

/// Result of a [`protected_call`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The dispatcher returned normally with this exit code
    Exited(i32),
    /// The dispatcher was interrupted by a fault
    Faulted(CapturedFault),
}

/// Delivers `fault` to the innermost [`protected_call`].
///
/// Unwinds without invoking the panic hook, so nothing is printed.
pub fn raise_fault(fault: CapturedFault) -> ! {
    panic::resume_unwind(Box::new(fault))
}

/// Runs `f`, turning a fault delivered by [`raise_fault`] into [`Outcome::Faulted`].
///
/// Memory written by `f` before the fault stays as it was at the moment of the fault.
pub fn protected_call<F>(f: F) -> Outcome
where
    F: FnOnce() -> i32,
{
    // Opaque call keeps the unwind edge when `f` has no calls of its own
    let call: fn(F) -> i32 = hint::black_box(call_once::<F>);
    match panic::catch_unwind(AssertUnwindSafe(move || call(f))) {
        Ok(code) => Outcome::Exited(code),
        Err(payload) => match payload.downcast::<CapturedFault>() {
            Ok(fault) => Outcome::Faulted(*fault),
            Err(payload) => panic::resume_unwind(payload),
        },
    }
}

#[inline(never)]
fn call_once<F: FnOnce() -> i32>(f: F) -> i32 {
    f()
}
