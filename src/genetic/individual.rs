use crate::SlotIndex;
use crate::TestcaseId;
use crate::arena::Arena;

/// one member of the population: a raw blob of bytes living in an arena
/// slot, tagged with the testcase id of its last dispatch. no structure is
/// imposed on the blob; structured inputs are the mutators' problem.
/// not Clone: copies go through `share` or `spawn`, which keep the slot
/// refcount in step.
#[derive(Debug, PartialEq, Eq)]
pub struct Individual {
    pub slot: SlotIndex,
    pub id: TestcaseId,
}

impl Individual {
    /// wrap freshly loaded bytes in a new slot
    pub fn from_bytes(arena: &mut Arena, bytes: &[u8]) -> Self {
        Self {
            slot: arena.create_from(bytes),
            id: 0,
        }
    }

    /// share the slot: the refcount tracks both holders. keeps the
    /// testcase id, so scores stay attributable.
    pub fn share(&self, arena: &mut Arena) -> Self {
        Self {
            slot: arena.clone_shallow(self.slot),
            id: self.id,
        }
    }

    /// copy the bytes into an exclusively owned slot and clear the id;
    /// this is the clone mutators start from
    pub fn spawn(&self, arena: &mut Arena) -> Self {
        Self {
            slot: arena.clone_deep(self.slot),
            id: 0,
        }
    }

    pub fn length(&self, arena: &Arena) -> usize {
        arena.length(self.slot)
    }

    pub fn bytes<'a>(&self, arena: &'a Arena) -> &'a [u8] {
        arena.buffer(self.slot)
    }

    /// 128-bit content hash, the dedup key of the best set
    pub fn hash(&self, arena: &Arena) -> [u8; 16] {
        crate::hash128(arena.buffer(self.slot))
    }

    /// by-value copy for observers outside the arena's lifetime
    pub fn to_shared(&self, arena: &Arena) -> Shareable {
        Shareable {
            id: self.id,
            bytes: arena.buffer(self.slot).to_vec(),
        }
    }
}

/// a copy-friendly representation of an individual: the bytes travel by
/// value, so snapshots survive arena cleanup
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Shareable {
    pub id: TestcaseId,
    pub bytes: Vec<u8>,
}

impl Shareable {
    pub fn length(&self) -> usize {
        self.bytes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn share_keeps_the_slot_and_id() {
        let mut arena = Arena::default();
        let mut ind = Individual::from_bytes(&mut arena, b"seed");
        ind.id = 9;
        let shared = ind.share(&mut arena);
        assert_eq!(shared.slot, ind.slot);
        assert_eq!(shared.id, 9);
        assert_eq!(arena.refs(ind.slot), 2);
    }

    #[test]
    fn spawn_copies_and_resets_the_id() {
        let mut arena = Arena::default();
        let mut ind = Individual::from_bytes(&mut arena, b"seed");
        ind.id = 9;
        let spawned = ind.spawn(&mut arena);
        assert_ne!(spawned.slot, ind.slot);
        assert_eq!(spawned.id, 0);
        assert_eq!(spawned.bytes(&arena), b"seed");
        assert_eq!(arena.refs(ind.slot), 1);
        assert_eq!(arena.refs(spawned.slot), 1);
    }

    #[test]
    fn equal_content_hashes_equal() {
        let mut arena = Arena::default();
        let a = Individual::from_bytes(&mut arena, b"same");
        let b = Individual::from_bytes(&mut arena, b"same");
        let c = Individual::from_bytes(&mut arena, b"other");
        assert_eq!(a.hash(&arena), b.hash(&arena));
        assert_ne!(a.hash(&arena), c.hash(&arena));
    }

    #[test]
    fn shared_copies_survive_cleanup() {
        let mut arena = Arena::default();
        let ind = Individual::from_bytes(&mut arena, b"bytes");
        let shared = ind.to_shared(&arena);
        arena.force_clean(&std::collections::BTreeSet::new());
        assert_eq!(shared.bytes, b"bytes");
        assert_eq!(ind.bytes(&arena), b"");
    }
}
