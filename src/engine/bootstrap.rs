//! Handing a loaded image to the dispatcher.
//!
//! [`go`] computes the initial stack pointers, pushes the start-up arguments onto the data stack
//! and runs the dispatcher from the image's boot entry. Faults raised during dispatch are caught
//! at a [`protected_call`] boundary; unless die-on-signal mode is configured, the dispatcher is
//! re-entered at the image's throw entry on a set of small emergency stacks with the fault's
//! throw code on top of the data stack.

use std::mem::size_of;

use crate::{
    config::Config,
    engine::{
        fault::{protected_call, CapturedFault, FaultRegisters, Outcome},
        Engine, MachineState,
    },
    file::io::WORD,
    image::{Image, StackKind},
    memory::Region,
    Error, Result,
};

/// Cells in the emergency data stack.
pub const EMERGENCY_DATA_CELLS: usize = 8;

/// Cells in the emergency return stack.
pub const EMERGENCY_RETURN_CELLS: usize = 8;

/// Stacks the dispatcher runs on after a fault.
///
/// Overwritten on every fault, never grown. Kept in a fixed heap allocation by [`go`] so their
/// addresses stay valid while the dispatcher uses them.
#[derive(Debug, Default)]
pub struct EmergencyStacks {
    data: [usize; EMERGENCY_DATA_CELLS],
    ret: [usize; EMERGENCY_RETURN_CELLS],
    float: [f64; 1],
}

impl EmergencyStacks {
    /// Creates zeroed emergency stacks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the machine state for resuming at `throw_entry` after `fault`.
    ///
    /// The throw code is stored in the last data cell, which becomes the data stack pointer. If
    /// the fault-time return stack pointer lies inside `return_stack` (strictly above its first
    /// cell, at most at its top) it is kept and the faulting instruction pointer is pushed onto
    /// it; otherwise the emergency return stack is used.
    #[allow(clippy::cast_sign_loss)]
    pub fn prepare(
        &mut self,
        fault: &CapturedFault,
        registers: Option<FaultRegisters>,
        return_stack: &mut Region,
        throw_entry: usize,
    ) -> MachineState {
        self.data[EMERGENCY_DATA_CELLS - 1] = fault.kind.throw_code() as usize;
        let sp = std::ptr::addr_of!(self.data[EMERGENCY_DATA_CELLS - 1]) as usize;

        let rp = registers
            .and_then(|registers| push_return(return_stack, registers))
            .unwrap_or_else(|| self.ret.as_ptr() as usize + EMERGENCY_RETURN_CELLS * WORD);

        MachineState {
            ip: throw_entry,
            sp,
            rp,
            fp: self.float.as_ptr() as usize,
            lp: 0,
        }
    }

    /// The emergency data stack.
    #[must_use]
    pub fn data(&self) -> &[usize; EMERGENCY_DATA_CELLS] {
        &self.data
    }
}

/// Pushes the faulting instruction pointer onto the image's return stack, if the fault-time
/// return stack pointer shows neither overflow nor underflow.
fn push_return(return_stack: &mut Region, registers: FaultRegisters) -> Option<usize> {
    let FaultRegisters { ip, rp } = registers;
    if rp <= return_stack.base() + WORD || rp > return_stack.end() {
        return None;
    }

    let rp = rp - WORD;
    let offset = rp - return_stack.base();
    return_stack.as_mut_slice()[offset..offset + WORD].copy_from_slice(&ip.to_ne_bytes());
    Some(rp)
}

/// Initial machine state for a freshly loaded image.
///
/// Each stack pointer starts at the top of its region, lowered by one element where the
/// dispatcher caches the top item in a register.
#[must_use]
pub fn initial_state<E: Engine + ?Sized>(engine: &E, image: &Image) -> MachineState {
    let top = |kind: StackKind| image.stack(kind).end();

    let mut sp = top(StackKind::Data);
    if engine.caches_top_of_stack() {
        sp = sp.wrapping_sub(WORD);
    }
    let mut fp = top(StackKind::Float);
    if engine.caches_float_top() {
        fp = fp.wrapping_sub(size_of::<f64>());
    }

    MachineState {
        ip: image.boot_entry(),
        sp,
        rp: top(StackKind::Return),
        fp,
        lp: top(StackKind::Locals),
    }
}

/// Pushes `arguments` onto the data stack so that `arguments[0]` ends up on top.
fn push_arguments(stack: &mut Region, mut sp: usize, arguments: &[usize]) -> Result<usize> {
    for argument in arguments.iter().rev() {
        let Some(lowered) = sp.checked_sub(WORD).filter(|&lowered| lowered >= stack.base()) else {
            return Err(malformed_error!(
                "Data stack of {} bytes cannot hold {} start-up arguments",
                stack.len(),
                arguments.len()
            ));
        };
        sp = lowered;

        let offset = sp - stack.base();
        stack.as_mut_slice()[offset..offset + WORD].copy_from_slice(&argument.to_ne_bytes());
    }
    Ok(sp)
}

/// Runs `image` on `engine`, returning the dispatcher's exit code.
///
/// `arguments` are pushed onto the data stack before dispatch starts, the first one on top.
/// On Unix, hardware faults are intercepted for the duration of the call unless
/// `config.die_on_signal` is set.
///
/// # Errors
///
/// Returns [`crate::Error::RuntimeFault`] if a fault is raised in die-on-signal mode, and
/// [`crate::Error::Malformed`] if the data stack cannot hold the arguments.
pub fn go<E: Engine + ?Sized>(
    engine: &mut E,
    image: &mut Image,
    config: &Config,
    arguments: &[usize],
) -> Result<i32> {
    let mut state = initial_state(engine, image);
    state.sp = push_arguments(image.stack_mut(StackKind::Data), state.sp, arguments)?;
    let throw_entry = image.throw_entry();

    #[cfg(unix)]
    let _guard = if config.die_on_signal {
        None
    } else {
        Some(crate::engine::signals::FaultGuard::install()?)
    };

    let mut emergency = Box::new(EmergencyStacks::new());
    loop {
        match protected_call(|| engine.dispatch(state)) {
            Outcome::Exited(code) => return Ok(code),
            Outcome::Faulted(fault) => {
                if config.die_on_signal {
                    return Err(Error::RuntimeFault {
                        kind: fault.kind,
                        code: fault.kind.throw_code(),
                    });
                }

                log::warn!(
                    "{} (throw code {}), resuming at ${:x}",
                    fault.kind,
                    fault.kind.throw_code(),
                    throw_entry
                );

                let registers = fault.registers.or_else(|| engine.fault_registers());
                state = emergency.prepare(
                    &fault,
                    registers,
                    image.stack_mut(StackKind::Return),
                    throw_entry,
                );
            }
        }
    }
}
