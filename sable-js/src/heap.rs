//! Per-session object arena.
//!
//! Cells are addressed by slot index and never move. Nothing is freed
//! individually; the whole arena is released when the session is destroyed.

use crate::error::{Result, VmError};
use crate::object::ObjectCell;

/// Arena of object cells.
#[derive(Debug, Default)]
pub(crate) struct Heap {
    cells: Vec<ObjectCell>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a cell and return its slot.
    pub fn alloc(&mut self, cell: ObjectCell) -> Result<u32> {
        let slot = u32::try_from(self.cells.len())
            .ok()
            .filter(|&s| s != u32::MAX)
            .ok_or_else(|| VmError::fault("guest heap exhausted"))?;
        self.cells.push(cell);
        Ok(slot)
    }

    pub fn get(&self, slot: u32) -> Result<&ObjectCell> {
        self.cells
            .get(slot as usize)
            .ok_or_else(|| VmError::fault(format!("dangling object slot #{}", slot)))
    }

    pub fn get_mut(&mut self, slot: u32) -> Result<&mut ObjectCell> {
        self.cells
            .get_mut(slot as usize)
            .ok_or_else(|| VmError::fault(format!("dangling object slot #{}", slot)))
    }

    /// Number of live cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Drop every cell, returning how many were released.
    pub fn release(&mut self) -> usize {
        let count = self.cells.len();
        self.cells = Vec::new();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectKind;

    #[test]
    fn slots_are_sequential_and_released_in_bulk() {
        let mut heap = Heap::new();
        let a = heap.alloc(ObjectCell::new(ObjectKind::Ordinary, None)).unwrap();
        let b = heap.alloc(ObjectCell::new(ObjectKind::Ordinary, Some(a))).unwrap();
        assert_eq!((a, b), (0, 1));
        assert_eq!(heap.get(b).unwrap().prototype, Some(0));
        assert_eq!(heap.release(), 2);
        assert!(matches!(heap.get(a), Err(VmError::EngineFault(_))));
    }
}
