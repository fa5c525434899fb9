//! Hash directory: slot → bucket descriptor index, `0` meaning empty.

#[derive(Debug, Clone)]
pub struct Directory {
    slots: Vec<u32>,
}

impl Directory {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![0; capacity],
        }
    }

    #[inline]
    pub fn get(&self, slot: usize) -> u32 {
        self.slots[slot]
    }

    #[inline]
    pub fn set(&mut self, slot: usize, index: u32) {
        self.slots[slot] = index;
    }

    #[inline]
    pub fn clear(&mut self, slot: usize) {
        self.slots[slot] = 0;
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Extends the directory to `capacity` slots; new slots are empty.
    pub fn grow(&mut self, capacity: usize) {
        debug_assert!(capacity >= self.slots.len());
        self.slots.resize(capacity, 0);
    }

    /// Occupied slots with their descriptor index.
    pub fn occupied(&self) -> impl Iterator<Item = (usize, u32)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, &index)| index != 0)
            .map(|(slot, &index)| (slot, index))
    }

    pub fn size_in_bytes(&self) -> u64 {
        (self.slots.len() * std::mem::size_of::<u32>()) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grow_keeps_slots() {
        let mut directory = Directory::new(4);
        directory.set(1, 7);
        directory.set(3, 9);

        directory.grow(8);

        assert_eq!(directory.capacity(), 8);
        assert_eq!(directory.get(1), 7);
        assert_eq!(directory.get(5), 0);
        assert_eq!(directory.occupied().collect::<Vec<_>>(), vec![(1, 7), (3, 9)]);

        directory.clear(1);
        assert_eq!(directory.occupied().count(), 1);
    }
}
