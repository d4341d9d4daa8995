//! The boundary between the loader and the threaded-code dispatcher.
//!
//! The dispatcher's instruction loop is not part of this crate. It is supplied by the embedding
//! executable as an implementation of [`crate::engine::Engine`], which hands out the primitive
//! table the relocator and checksum validator need and runs threaded code from a given
//! [`crate::engine::MachineState`].
//!
//! # Key Components
//!
//! - [`crate::engine::Engine`] - Dispatcher contract
//! - [`crate::engine::PrimitiveTable`] - Native entry points in table order
//! - [`crate::engine::CodeFieldKind`] - Fixed code-field kinds at the head of the table
//! - [`crate::engine::DispatchStrategy`] - Direct, indirect or doubly indirect threading
//! - [`crate::engine::fault`] - Typed fault delivery and the protected call boundary
//! - [`crate::engine::bootstrap`] - Stack setup and the recovery loop
//!
//! # Example
//!
//! ```rust,no_run
//! use forthboot::engine::{DispatchStrategy, Engine, MachineState, PrimitiveTable};
//!
//! struct Halt {
//!     table: PrimitiveTable,
//! }
//!
//! impl Engine for Halt {
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
//! ```

pub mod bootstrap;
pub mod fault;
#[cfg(unix)]
pub mod signals;

mod strategy;
mod table;

pub use bootstrap::{go, EmergencyStacks};
pub use fault::{protected_call, raise_fault, CapturedFault, FaultKind, FaultRegisters, Outcome};
pub use strategy::DispatchStrategy;
pub use table::{CodeFieldKind, PrimitiveTable};

/// Register file handed to the dispatcher on entry.
///
/// All values are raw addresses in the process's address space; stacks grow downwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MachineState {
    /// Instruction pointer, the address of the first threaded-code cell to execute
    pub ip: usize,
    /// Data stack pointer
    pub sp: usize,
    /// Return stack pointer
    pub rp: usize,
    /// Floating-point stack pointer
    pub fp: usize,
    /// Locals stack pointer
    pub lp: usize,
}

/// A threaded-code dispatcher.
///
/// The loader only needs [`Engine::primitives`] and [`Engine::strategy`]; the bootstrap calls
/// [`Engine::dispatch`] once for the boot entry and again for the throw entry after every
/// recovered fault.
pub trait Engine {
    /// The dispatcher's primitive table.
    fn primitives(&self) -> &PrimitiveTable;

    /// How the dispatcher threads code.
    fn strategy(&self) -> DispatchStrategy;

    /// Whether the top data-stack item is kept in a register.
    ///
    /// A caching dispatcher reads one cell below the nominal stack top, so the initial stack
    /// pointer is lowered by a cell.
    fn caches_top_of_stack(&self) -> bool {
        false
    }

    /// Whether the top floating-point stack item is kept in a register.
    fn caches_float_top(&self) -> bool {
        false
    }

    /// Instruction and return-stack pointer at the time of the last fault, if the dispatcher
    /// tracks them outside of [`CapturedFault`].
    fn fault_registers(&self) -> Option<FaultRegisters> {
        None
    }

    /// Runs threaded code from `state` until it exits, returning the exit code.
    ///
    /// A hardware fault inside this call is delivered through [`fault::raise_fault`]. Frames
    /// live at the faulting instruction are unwound from that instruction, so they must not own
    /// values with drop glue.
    fn dispatch(&mut self, state: MachineState) -> i32;
}
