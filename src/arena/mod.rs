use crate::SlotIndex;
use std::collections::BTreeMap;
use std::collections::BTreeSet;

/// the slot index reserved as "uninitialized"
pub const UNINIT_INDEX: SlotIndex = 0;

struct Slot {
    buffer: Vec<u8>,
    refs: usize,
}

/// central home for every raw buffer an individual carries. it centralizes
/// the buffer operators and the reference counting; it does not try to be
/// smart about sharing chunks.
pub struct Arena {
    next_index: SlotIndex,
    slots: BTreeMap<SlotIndex, Slot>,
}

impl Default for Arena {
    fn default() -> Self {
        Self {
            next_index: UNINIT_INDEX + 1,
            slots: BTreeMap::new(),
        }
    }
}

// container utils
impl Arena {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn next_index(&self) -> SlotIndex {
        self.next_index
    }

    pub fn is_null(&self, index: SlotIndex) -> bool {
        !self.slots.contains_key(&index)
    }

    pub fn refs(&self, index: SlotIndex) -> usize {
        self.slots.get(&index).map(|s| s.refs).unwrap_or(0)
    }

    pub fn length(&self, index: SlotIndex) -> usize {
        self.slots.get(&index).map(|s| s.buffer.len()).unwrap_or(0)
    }

    pub fn buffer(&self, index: SlotIndex) -> &[u8] {
        debug_assert!(index == UNINIT_INDEX || index < self.next_index);
        match self.slots.get(&index) {
            Some(slot) => &slot.buffer,
            None => &[],
        }
    }

    pub fn buffer_mut(&mut self, index: SlotIndex) -> &mut [u8] {
        debug_assert!(index != UNINIT_INDEX && index < self.next_index);
        match self.slots.get_mut(&index) {
            Some(slot) => &mut slot.buffer,
            None => &mut [],
        }
    }
}

// slot lifecycle
impl Arena {
    /// allocate a zeroed slot with refcount 1
    pub fn create(&mut self, size: usize) -> SlotIndex {
        let index = self.next_index;
        self.next_index += 1;
        self.slots.insert(
            index,
            Slot {
                buffer: vec![0u8; size],
                refs: 1,
            },
        );
        index
    }

    /// allocate a slot holding a copy of `data`
    pub fn create_from(&mut self, data: &[u8]) -> SlotIndex {
        let index = self.create(data.len());
        self.buffer_mut(index).copy_from_slice(data);
        index
    }

    /// share the slot: same index, one more reference
    pub fn clone_shallow(&mut self, index: SlotIndex) -> SlotIndex {
        if let Some(slot) = self.slots.get_mut(&index) {
            slot.refs += 1;
        }
        index
    }

    /// copy the bytes into a fresh slot with refcount 1
    pub fn clone_deep(&mut self, index: SlotIndex) -> SlotIndex {
        match self.slots.get(&index) {
            None => UNINIT_INDEX,
            Some(slot) => {
                let bytes = slot.buffer.clone();
                let copy = self.create(bytes.len());
                self.buffer_mut(copy).copy_from_slice(&bytes);
                copy
            }
        }
    }

    pub fn incref(&mut self, index: SlotIndex) {
        if let Some(slot) = self.slots.get_mut(&index) {
            slot.refs += 1;
        }
    }

    /// drop one reference; the slot is released at zero
    pub fn decref(&mut self, index: SlotIndex) {
        let free = match self.slots.get_mut(&index) {
            None => false,
            Some(slot) => {
                slot.refs -= 1;
                slot.refs == 0
            }
        };
        if free {
            self.slots.remove(&index);
        }
    }

    /// free every slot not listed as active. called after each generation;
    /// refcounts of surviving slots are left untouched.
    pub fn force_clean(&mut self, active: &BTreeSet<SlotIndex>) {
        self.slots.retain(|index, _| active.contains(index));
    }
}

// buffer mutation. sharing callers must deep-clone first; this is a
// correctness contract on the caller, not a runtime check.
impl Arena {
    pub fn insert_bytes(&mut self, index: SlotIndex, at: usize, count: usize) -> bool {
        match self.slots.get_mut(&index) {
            None => false,
            Some(slot) => {
                let at = at.min(slot.buffer.len());
                let tail = slot.buffer.split_off(at);
                slot.buffer.extend(std::iter::repeat_n(0u8, count));
                slot.buffer.extend(tail);
                true
            }
        }
    }

    pub fn remove_bytes(&mut self, index: SlotIndex, at: usize, count: usize) -> bool {
        match self.slots.get_mut(&index) {
            None => false,
            Some(slot) => {
                if at >= slot.buffer.len() {
                    return false;
                }
                let count = count.min(slot.buffer.len() - at);
                slot.buffer.drain(at..at + count);
                true
            }
        }
    }
}

impl std::fmt::Display for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (index, slot) in &self.slots {
            writeln!(f, "slot #{} refs={} length={}", index, slot.refs, slot.buffer.len())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_starts_at_one_reference() {
        let mut arena = Arena::default();
        let slot = arena.create(8);
        assert_ne!(slot, UNINIT_INDEX);
        assert_eq!(arena.refs(slot), 1);
        assert_eq!(arena.length(slot), 8);
    }

    #[test]
    fn indices_are_monotonic_and_stable() {
        let mut arena = Arena::default();
        let a = arena.create(1);
        let b = arena.create(1);
        assert!(b > a);
        arena.decref(a);
        let c = arena.create(1);
        assert!(c > b);
    }

    #[test]
    fn shallow_clone_shares_deep_clone_copies() {
        let mut arena = Arena::default();
        let slot = arena.create_from(b"abc");
        let shared = arena.clone_shallow(slot);
        assert_eq!(shared, slot);
        assert_eq!(arena.refs(slot), 2);
        let copied = arena.clone_deep(slot);
        assert_ne!(copied, slot);
        assert_eq!(arena.refs(copied), 1);
        assert_eq!(arena.buffer(copied), b"abc");
    }

    #[test]
    fn decref_frees_at_zero() {
        let mut arena = Arena::default();
        let slot = arena.create(4);
        arena.incref(slot);
        arena.decref(slot);
        assert!(!arena.is_null(slot));
        arena.decref(slot);
        assert!(arena.is_null(slot));
        assert_eq!(arena.length(slot), 0);
    }

    #[test]
    fn insert_shifts_the_tail() {
        let mut arena = Arena::default();
        let slot = arena.create_from(b"abcd");
        assert!(arena.insert_bytes(slot, 2, 2));
        assert_eq!(arena.length(slot), 6);
        assert_eq!(&arena.buffer(slot)[..2], b"ab");
        assert_eq!(&arena.buffer(slot)[4..], b"cd");
    }

    #[test]
    fn insert_at_end_appends() {
        let mut arena = Arena::default();
        let slot = arena.create_from(b"ab");
        assert!(arena.insert_bytes(slot, 2, 3));
        assert_eq!(arena.length(slot), 5);
        assert_eq!(&arena.buffer(slot)[..2], b"ab");
    }

    #[test]
    fn remove_drops_the_span() {
        let mut arena = Arena::default();
        let slot = arena.create_from(b"abcdef");
        assert!(arena.remove_bytes(slot, 1, 2));
        assert_eq!(arena.buffer(slot), b"adef");
    }

    #[test]
    fn out_of_bounds_operations_do_nothing() {
        let mut arena = Arena::default();
        let slot = arena.create_from(b"ab");
        assert!(!arena.remove_bytes(slot, 5, 1));
        assert!(!arena.insert_bytes(999, 0, 1));
        assert_eq!(arena.buffer(999), b"");
    }

    #[test]
    fn force_clean_spares_active_slots() {
        let mut arena = Arena::default();
        let keep = arena.create(1);
        let drop = arena.create(1);
        let active = BTreeSet::from([keep]);
        arena.force_clean(&active);
        assert!(!arena.is_null(keep));
        assert!(arena.is_null(drop));
    }
}
