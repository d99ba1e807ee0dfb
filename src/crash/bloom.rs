use crate::TestcaseId;

/// fixed-size bloom filter over testcase ids. the search loop asks "did
/// this input crash?" on its hot path; a false positive sends it to disk
/// once in a while, a false negative never happens.
pub struct Bloom {
    slots: usize,
    hashes: usize,
    bits: Vec<u64>,
}

impl Default for Bloom {
    fn default() -> Self {
        Self::new(crate::CRASHERS_BLOOM_SLOTS, crate::CRASHERS_BLOOM_HASHES)
    }
}

impl Bloom {
    pub fn new(slots: usize, hashes: usize) -> Self {
        assert!(slots > 0 && hashes > 0);
        Self {
            slots,
            hashes,
            bits: vec![0u64; slots.div_ceil(64)],
        }
    }

    pub fn add(&mut self, id: TestcaseId) {
        for slot in self.probes(id) {
            self.bits[slot / 64] |= 1 << (slot % 64);
        }
    }

    pub fn lookup(&self, id: TestcaseId) -> bool {
        self.probes(id)
            .iter()
            .all(|slot| self.bits[slot / 64] & (1 << (slot % 64)) != 0)
    }

    /// derive the hash family from one wide digest
    fn probes(&self, id: TestcaseId) -> Vec<usize> {
        let digest = blake3::hash(&id.to_le_bytes());
        digest
            .as_bytes()
            .chunks(8)
            .take(self.hashes)
            .map(|chunk| {
                let mut word = [0u8; 8];
                word.copy_from_slice(chunk);
                u64::from_le_bytes(word) as usize % self.slots
            })
            .collect()
    }
}
