//! Fixed-capacity LIFO stack of free buffer row indices.

/// Free-slot stack for a sketch buffer of `capacity` rows.
///
/// Backed by a fixed array and a top pointer; the most recently pushed index
/// is popped first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FreeSlots {
    slots: Box<[usize]>,
    top: usize,
}

impl FreeSlots {
    /// All `capacity` slots free, arranged so that slot 0 is popped first.
    pub fn full(capacity: usize) -> Self {
        let mut s = Self::empty(capacity);
        for i in (0..capacity).rev() {
            s.push(i);
        }
        s
    }

    /// No free slots.
    pub fn empty(capacity: usize) -> Self {
        Self {
            slots: vec![0; capacity].into_boxed_slice(),
            top: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.top
    }

    pub fn is_empty(&self) -> bool {
        self.top == 0
    }

    /// Push a freed slot index.
    ///
    /// # Panics
    /// Panics if the stack already holds `capacity` indices.
    pub fn push(&mut self, index: usize) {
        assert!(self.top < self.slots.len(), "Free-slot stack overflow");
        self.slots[self.top] = index;
        self.top += 1;
    }

    pub fn pop(&mut self) -> Option<usize> {
        if self.top == 0 {
            return None;
        }
        self.top -= 1;
        Some(self.slots[self.top])
    }

    pub fn clear(&mut self) {
        self.top = 0;
    }
}
