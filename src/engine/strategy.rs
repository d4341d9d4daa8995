//! Code-dispatch strategies.
//!
//! The dispatcher can be built to thread code in three ways, and each changes what a relocated
//! code field or primitive reference has to contain and how the executable's fingerprint is
//! computed. The relocator and the checksum validator ask the active strategy instead of
//! branching on build variants themselves.

use strum::{Display, EnumIter};

use crate::{
    engine::{CodeFieldKind, PrimitiveTable},
    image::checksum,
};

/// How threaded code reaches native code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum DispatchStrategy {
    /// Threaded code holds native entry addresses.
    Direct,
    /// Threaded code holds addresses of primitive-table slots; code fields hold entry addresses.
    Indirect,
    /// Both primitives and code fields are reached through the table; code fields are stored as
    /// written by the image compiler.
    DoublyIndirect,
}

impl DispatchStrategy {
    /// Value a code-field sentinel of `kind` is replaced with, or `None` to leave it untouched.
    #[must_use]
    pub fn resolve_code_field(self, table: &PrimitiveTable, kind: CodeFieldKind) -> Option<usize> {
        match self {
            DispatchStrategy::Direct | DispatchStrategy::Indirect => Some(table.code_field(kind)),
            DispatchStrategy::DoublyIndirect => None,
        }
    }

    /// Value a reference to primitive `index` is replaced with, or `None` if the table has no
    /// such entry.
    #[must_use]
    pub fn resolve_primitive(self, table: &PrimitiveTable, index: usize) -> Option<usize> {
        match self {
            DispatchStrategy::Direct => table.entry(index),
            DispatchStrategy::Indirect | DispatchStrategy::DoublyIndirect => {
                table.slot_address(index)
            }
        }
    }

    /// Code address written into the first word of a behaviour-extension code field.
    #[must_use]
    pub fn does_code_address(self, table: &PrimitiveTable) -> Option<usize> {
        self.resolve_code_field(table, CodeFieldKind::DoDoes)
    }

    /// Fingerprint of `table` under this strategy.
    ///
    /// Direct threading folds every entry address; the indirect variants only depend on where
    /// the table itself lives.
    #[must_use]
    pub fn checksum(self, table: &PrimitiveTable) -> usize {
        match self {
            DispatchStrategy::Direct => checksum::fold(table.entries()),
            DispatchStrategy::Indirect | DispatchStrategy::DoublyIndirect => table.base(),
        }
    }

    /// Whether the dictionary must come from the heap rather than a placed mapping.
    ///
    /// MIPS jumps are limited to the current 256 MB segment, so directly threaded code cannot
    /// live in a mapping that may be placed far away from the executable.
    #[must_use]
    pub fn requires_heap_dictionary(self) -> bool {
        cfg!(any(target_arch = "mips", target_arch = "mips64")) && self == DispatchStrategy::Direct
    }
}
