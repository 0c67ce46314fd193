//! Fixed-capacity slot arena for live connections.

use crate::error::ServerError;

/// A fixed number of reusable slots, each holding at most one value.
///
/// Free indices are kept on a stack, so `allocate` and `free` are O(1).
/// A fresh registry hands out indices in ascending order.
#[derive(Debug)]
pub struct SlotRegistry<T> {
    slots: Vec<Option<T>>,
    free: Vec<usize>,
}

impl<T> SlotRegistry<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            free: (0..capacity).rev().collect(),
        }
    }

    /// Store `value` in a free slot and return its index.
    pub fn allocate(&mut self, value: T) -> Result<usize, ServerError> {
        let index = self.free.pop().ok_or(ServerError::CapacityExceeded {
            capacity: self.slots.len(),
        })?;
        debug_assert!(self.slots[index].is_none());
        self.slots[index] = Some(value);
        Ok(index)
    }

    /// Empty a slot, making it eligible for reuse. Returns the previous value.
    pub fn free(&mut self, index: usize) -> Option<T> {
        let value = self.slots.get_mut(index)?.take()?;
        self.free.push(index);
        Some(value)
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index)?.as_ref()
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index)?.as_mut()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Occupied slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|v| (i, v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_up_to_capacity() {
        let mut reg = SlotRegistry::with_capacity(3);
        let a = reg.allocate("a").unwrap();
        let b = reg.allocate("b").unwrap();
        let c = reg.allocate("c").unwrap();
        assert_eq!((a, b, c), (0, 1, 2));
        assert_eq!(reg.len(), 3);
        assert!(matches!(
            reg.allocate("d"),
            Err(ServerError::CapacityExceeded { capacity: 3 })
        ));
        assert_eq!(reg.len(), 3);
    }

    #[test]
    fn free_then_reuse() {
        let mut reg = SlotRegistry::with_capacity(2);
        reg.allocate(10).unwrap();
        let second = reg.allocate(20).unwrap();
        assert_eq!(reg.free(second), Some(20));
        assert_eq!(reg.len(), 1);
        let reused = reg.allocate(30).unwrap();
        assert_eq!(reused, second);
        assert_eq!(reg.get(reused), Some(&30));
    }

    #[test]
    fn double_free_is_noop() {
        let mut reg = SlotRegistry::with_capacity(2);
        let idx = reg.allocate(1).unwrap();
        assert_eq!(reg.free(idx), Some(1));
        assert_eq!(reg.free(idx), None);
        assert_eq!(reg.free(99), None);
        // The index must not be handed out twice.
        let a = reg.allocate(2).unwrap();
        let b = reg.allocate(3).unwrap();
        assert_ne!(a, b);
        assert!(reg.allocate(4).is_err());
    }

    #[test]
    fn zero_capacity_rejects() {
        let mut reg: SlotRegistry<u8> = SlotRegistry::with_capacity(0);
        assert!(reg.allocate(1).is_err());
        assert!(reg.is_empty());
    }

    #[test]
    fn iter_skips_empty_slots() {
        let mut reg = SlotRegistry::with_capacity(4);
        for v in ["a", "b", "c"] {
            reg.allocate(v).unwrap();
        }
        reg.free(1);
        let seen: Vec<_> = reg.iter().collect();
        assert_eq!(seen, vec![(0, &"a"), (2, &"c")]);
        *reg.get_mut(2).unwrap() = "z";
        assert_eq!(reg.get(2), Some(&"z"));
        assert_eq!(reg.get(1), None);
        assert!(reg.get_mut(1).is_none());
    }
}
