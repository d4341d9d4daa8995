//! The dispatcher's primitive table.
//!
//! A dispatcher exposes its native entry points as a flat, null-terminated table of addresses.
//! The first [`CodeFieldKind::COUNT`] slots hold the code-field kinds in a fixed order, every
//! following slot one ordinary primitive. Images refer to both groups by table index, and the
//! relocator turns those indices into addresses according to the active
//! [`crate::engine::DispatchStrategy`].

use strum::{Display, EnumCount, EnumIter, FromRepr};

use crate::{file::io::WORD, Result};

/// How a dictionary entry's behaviour is dispatched.
///
/// The discriminant is the entry's index in the primitive table and, negated and shifted, its
/// sentinel in a relocatable image (`-2 - index`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumCount, EnumIter, FromRepr)]
#[repr(usize)]
pub enum CodeFieldKind {
    /// Colon definition
    DoCol = 0,
    /// Constant
    DoCon = 1,
    /// Variable
    DoVar = 2,
    /// User variable
    DoUser = 3,
    /// Deferred word
    DoDefer = 4,
    /// Field accessor
    DoField = 5,
    /// Behaviour-extension code field; spans two words, the second holding an image offset
    DoDoes = 6,
    /// Jump into a behaviour extension
    DoesJump = 7,
}

impl CodeFieldKind {
    /// Index of this kind in the primitive table.
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Native entry points of a dispatcher, in table order.
///
/// The table is kept in a fixed heap allocation terminated by a zero slot so that
/// [`PrimitiveTable::base`] and [`PrimitiveTable::slot_address`] remain valid for as long as the
/// table lives; indirect-dispatch images store those slot addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimitiveTable {
    slots: Box<[usize]>,
}

impl PrimitiveTable {
    /// Creates a table from the entry addresses of the code-field kinds followed by the ordinary
    /// primitives.
    ///
    /// A zero entry terminates the table early, mirroring the dispatcher's null-terminated
    /// layout; anything after it is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if fewer than [`CodeFieldKind::COUNT`] non-zero
    /// entries are given.
    pub fn new(entries: &[usize]) -> Result<Self> {
        let len = entries
            .iter()
            .position(|&entry| entry == 0)
            .unwrap_or(entries.len());

        if len < CodeFieldKind::COUNT {
            return Err(malformed_error!(
                "Primitive table has {} entries, at least {} code-field kinds are required",
                len,
                CodeFieldKind::COUNT
            ));
        }

        let mut slots = Vec::with_capacity(len + 1);
        slots.extend_from_slice(&entries[..len]);
        slots.push(0);

        Ok(PrimitiveTable {
            slots: slots.into_boxed_slice(),
        })
    }

    /// Number of entries, code-field kinds included, excluding the terminator.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len() - 1
    }

    /// Always `false`; a table holds at least the code-field kinds.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Address of the first slot.
    #[must_use]
    pub fn base(&self) -> usize {
        self.slots.as_ptr() as usize
    }

    /// Native entry address stored at `index`.
    #[must_use]
    pub fn entry(&self, index: usize) -> Option<usize> {
        self.entries().get(index).copied()
    }

    /// Native entry address of a code-field kind.
    #[must_use]
    pub fn code_field(&self, kind: CodeFieldKind) -> usize {
        self.slots[kind.index()]
    }

    /// Address of the slot holding entry `index`.
    #[must_use]
    pub fn slot_address(&self, index: usize) -> Option<usize> {
        (index < self.len()).then(|| self.base() + index * WORD)
    }

    /// All entries in table order, without the terminator.
    #[must_use]
    pub fn entries(&self) -> &[usize] {
        &self.slots[..self.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn kinds_in_table_order() {
        let indices: Vec<usize> = CodeFieldKind::iter().map(CodeFieldKind::index).collect();
        assert_eq!(indices, (0..8).collect::<Vec<_>>());
        assert_eq!(CodeFieldKind::from_repr(6), Some(CodeFieldKind::DoDoes));
        assert_eq!(CodeFieldKind::from_repr(8), None);
    }

    #[test]
    fn table_layout() {
        let entries: Vec<usize> = (1..=12).map(|n| 0x1000 * n).collect();
        let table = PrimitiveTable::new(&entries).unwrap();

        assert_eq!(table.len(), 12);
        assert_eq!(table.code_field(CodeFieldKind::DoCol), 0x1000);
        assert_eq!(table.code_field(CodeFieldKind::DoesJump), 0x8000);
        assert_eq!(table.entry(11), Some(0xC000));
        assert_eq!(table.entry(12), None);
        assert_eq!(table.slot_address(0), Some(table.base()));
        assert_eq!(table.slot_address(3), Some(table.base() + 3 * WORD));
        assert_eq!(table.slot_address(12), None);
    }

    #[test]
    fn terminator_truncates() {
        let mut entries: Vec<usize> = (1..=10).collect();
        entries.push(0);
        entries.push(99);
        let table = PrimitiveTable::new(&entries).unwrap();
        assert_eq!(table.len(), 10);
        assert_eq!(table.entries().last(), Some(&10));
    }

    #[test]
    fn too_short() {
        assert!(PrimitiveTable::new(&[1, 2, 3]).is_err());
        assert!(PrimitiveTable::new(&[1, 2, 3, 4, 0, 6, 7, 8, 9]).is_err());
    }
}
