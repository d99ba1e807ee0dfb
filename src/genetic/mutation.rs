use super::individual::Individual;
use super::next_char;
use crate::arena::Arena;
use rand::Rng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;

/// the eleven ways the ascii-integer mutator can bend a parsed number
const NUMBER_DIGIT_MUTATIONS: u32 = 11;

/// the mutation palette. every operator deep-clones its input into a fresh
/// slot and transforms the copy; none may shrink a buffer to nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    FlipBit,
    InsertByte,
    EraseByte,
    ChangeByte,
    SwapBytes,
    ShuffleBytes,
    DuplicateByte,
    DuplicateBytes,
    AsciiInteger,
}

impl Mutation {
    pub const ALL: [Mutation; 9] = [
        Mutation::FlipBit,
        Mutation::InsertByte,
        Mutation::EraseByte,
        Mutation::ChangeByte,
        Mutation::SwapBytes,
        Mutation::ShuffleBytes,
        Mutation::DuplicateByte,
        Mutation::DuplicateBytes,
        Mutation::AsciiInteger,
    ];

    pub fn choose(rng: &mut SmallRng) -> Self {
        Self::ALL[rng.random_range(0..Self::ALL.len())]
    }

    pub fn apply(&self, rng: &mut SmallRng, arena: &mut Arena, parent: &Individual) -> Individual {
        let child = parent.spawn(arena);
        match self {
            Self::FlipBit => flip_bit(rng, arena, &child),
            Self::InsertByte => insert_byte(rng, arena, &child),
            Self::EraseByte => erase_byte(rng, arena, &child),
            Self::ChangeByte => change_byte(rng, arena, &child),
            Self::SwapBytes => swap_bytes(rng, arena, &child),
            Self::ShuffleBytes => shuffle_bytes(rng, arena, &child),
            Self::DuplicateByte => duplicate_byte(rng, arena, &child),
            Self::DuplicateBytes => duplicate_bytes(rng, arena, &child),
            Self::AsciiInteger => ascii_integer(rng, arena, &child),
        }
        child
    }
}

/// toggle one random bit
fn flip_bit(rng: &mut SmallRng, arena: &mut Arena, c: &Individual) {
    let size = arena.length(c.slot);
    if size == 0 {
        return;
    }
    let idx = rng.random_range(0..size);
    let bit = rng.random_range(0..8);
    arena.buffer_mut(c.slot)[idx] ^= 1 << bit;
}

/// insert one random byte at a random position
fn insert_byte(rng: &mut SmallRng, arena: &mut Arena, c: &Individual) {
    let size = arena.length(c.slot);
    let idx = rng.random_range(0..size + 1);
    arena.insert_bytes(c.slot, idx, 1);
    arena.buffer_mut(c.slot)[idx] = next_char(rng);
}

/// remove one random byte, unless that would empty the buffer
fn erase_byte(rng: &mut SmallRng, arena: &mut Arena, c: &Individual) {
    let size = arena.length(c.slot);
    if size < 2 {
        return;
    }
    let idx = rng.random_range(0..size);
    arena.remove_bytes(c.slot, idx, 1);
}

/// overwrite one random byte
fn change_byte(rng: &mut SmallRng, arena: &mut Arena, c: &Individual) {
    let size = arena.length(c.slot);
    if size == 0 {
        return;
    }
    let idx = rng.random_range(0..size);
    arena.buffer_mut(c.slot)[idx] = next_char(rng);
}

/// swap two random distinct positions
fn swap_bytes(rng: &mut SmallRng, arena: &mut Arena, c: &Individual) {
    let size = arena.length(c.slot);
    if size < 2 {
        return;
    }
    let idx1 = rng.random_range(0..size);
    let mut idx2 = idx1;
    while idx2 == idx1 {
        idx2 = rng.random_range(0..size);
    }
    arena.buffer_mut(c.slot).swap(idx1, idx2);
}

/// shuffle a random sub-range of at most eight bytes
fn shuffle_bytes(rng: &mut SmallRng, arena: &mut Arena, c: &Individual) {
    let size = arena.length(c.slot);
    if size < 2 {
        return;
    }
    let span = rng.random_range(0..size.min(crate::MAX_SHUFFLE_SPAN)) + 1;
    let start = match size - span {
        0 => 0,
        room => rng.random_range(0..room),
    };
    arena.buffer_mut(c.slot)[start..start + span].shuffle(rng);
}

/// duplicate one random byte up to four times
fn duplicate_byte(rng: &mut SmallRng, arena: &mut Arena, c: &Individual) {
    let size = arena.length(c.slot);
    if size == 0 {
        return;
    }
    let idx = rng.random_range(0..size);
    let repeat = rng.random_range(0..crate::MAX_DUPLICATE_REPEAT) + 1;
    let value = arena.buffer(c.slot)[idx];
    arena.insert_bytes(c.slot, idx, repeat);
    for slot in &mut arena.buffer_mut(c.slot)[idx..idx + repeat] {
        *slot = value;
    }
}

/// duplicate a random window of up to eight bytes, up to four times over
fn duplicate_bytes(rng: &mut SmallRng, arena: &mut Arena, c: &Individual) {
    let size = arena.length(c.slot);
    let window = rng.random_range(0..crate::MAX_DUPLICATE_WINDOW) + 1;
    if window >= size {
        return;
    }
    let idx = rng.random_range(0..size - window);
    let repeat = rng.random_range(0..crate::MAX_DUPLICATE_REPEAT) + 1;
    arena.insert_bytes(c.slot, idx + window, repeat * window);
    let buffer = arena.buffer_mut(c.slot);
    for copy in 1..=repeat {
        for offset in 0..window {
            buffer[idx + copy * window + offset] = buffer[idx + offset];
        }
    }
}

/// find runs of ascii digits, pick one, and bend its value with one of the
/// numeric mutators; the run is re-encoded in place, growing or shrinking
/// the buffer as the new value needs
fn ascii_integer(rng: &mut SmallRng, arena: &mut Arena, c: &Individual) {
    let buffer = arena.buffer(c.slot);
    let mut runs = Vec::new();
    let mut finger = 0;
    while finger < buffer.len() {
        let start = finger;
        while finger < buffer.len() && buffer[finger].is_ascii_digit() {
            finger += 1;
        }
        if start < finger {
            runs.push((start, finger - start));
        }
        finger += 1;
    }
    if runs.is_empty() {
        return;
    }
    let (start, length) = runs[rng.random_range(0..runs.len())];
    let value = buffer[start..start + length]
        .iter()
        .fold(0u64, |acc, b| acc.wrapping_mul(10).wrapping_add((b - b'0') as u64));
    let value = match rng.random_range(0..NUMBER_DIGIT_MUTATIONS) {
        // simple number operators
        0 => value.wrapping_add(1),
        1 => value.wrapping_sub(1),
        2 => value << 1,
        3 => value >> 1,
        4 => rng.random_range(0..value.max(1)),
        5 => rng.random_range(0..value.wrapping_mul(value).max(1)),
        // edge values, going after wrap-arounds quickly
        6 => 0,
        7 => u8::MAX as u64,
        8 => u16::MAX as u64,
        9 => u32::MAX as u64,
        _ => u64::MAX,
    };
    let encoded = value.to_string().into_bytes();
    if encoded.len() > length {
        arena.insert_bytes(c.slot, start + length, encoded.len() - length);
    } else if encoded.len() < length {
        arena.remove_bytes(c.slot, start + encoded.len(), length - encoded.len());
    }
    arena.buffer_mut(c.slot)[start..start + encoded.len()].copy_from_slice(&encoded);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use std::collections::BTreeMap;

    fn setup(bytes: &[u8]) -> (SmallRng, Arena, Individual) {
        let mut arena = Arena::default();
        let parent = Individual::from_bytes(&mut arena, bytes);
        (SmallRng::seed_from_u64(42), arena, parent)
    }

    fn hamming(a: &[u8], b: &[u8]) -> usize {
        a.iter().zip(b).filter(|(x, y)| x != y).count()
    }

    #[test]
    fn children_own_fresh_slots() {
        let (mut rng, mut arena, parent) = setup(b"parent bytes");
        for mutation in Mutation::ALL {
            let child = mutation.apply(&mut rng, &mut arena, &parent);
            assert_ne!(child.slot, parent.slot);
            assert_eq!(child.id, 0);
            assert_eq!(arena.refs(child.slot), 1);
        }
        assert_eq!(parent.bytes(&arena), b"parent bytes");
    }

    #[test]
    fn flip_bit_changes_exactly_one_byte() {
        let (mut rng, mut arena, parent) = setup(b"0123456789");
        for _ in 0..32 {
            let child = Mutation::FlipBit.apply(&mut rng, &mut arena, &parent);
            assert_eq!(child.length(&arena), 10);
            assert_eq!(hamming(child.bytes(&arena), parent.bytes(&arena)), 1);
        }
    }

    #[test]
    fn insert_byte_grows_by_one() {
        let (mut rng, mut arena, parent) = setup(b"abc");
        let child = Mutation::InsertByte.apply(&mut rng, &mut arena, &parent);
        assert_eq!(child.length(&arena), 4);
    }

    #[test]
    fn erase_byte_shrinks_by_one() {
        let (mut rng, mut arena, parent) = setup(b"abc");
        let child = Mutation::EraseByte.apply(&mut rng, &mut arena, &parent);
        assert_eq!(child.length(&arena), 2);
    }

    #[test]
    fn erase_byte_leaves_single_byte_buffers_alone() {
        let (mut rng, mut arena, parent) = setup(b"x");
        let child = Mutation::EraseByte.apply(&mut rng, &mut arena, &parent);
        assert_eq!(child.bytes(&arena), b"x");
    }

    #[test]
    fn change_byte_touches_at_most_one_byte() {
        let (mut rng, mut arena, parent) = setup(b"0123456789");
        for _ in 0..32 {
            let child = Mutation::ChangeByte.apply(&mut rng, &mut arena, &parent);
            assert!(hamming(child.bytes(&arena), parent.bytes(&arena)) <= 1);
        }
    }

    #[test]
    fn swap_bytes_permutes_two_positions() {
        let (mut rng, mut arena, parent) = setup(b"0123456789");
        for _ in 0..32 {
            let child = Mutation::SwapBytes.apply(&mut rng, &mut arena, &parent);
            assert_eq!(hamming(child.bytes(&arena), parent.bytes(&arena)), 2);
            let mut sorted_child = child.bytes(&arena).to_vec();
            let mut sorted_parent = parent.bytes(&arena).to_vec();
            sorted_child.sort_unstable();
            sorted_parent.sort_unstable();
            assert_eq!(sorted_child, sorted_parent);
        }
    }

    #[test]
    fn shuffle_keeps_the_multiset() {
        let (mut rng, mut arena, parent) = setup(b"abcdefghij");
        for _ in 0..32 {
            let child = Mutation::ShuffleBytes.apply(&mut rng, &mut arena, &parent);
            let mut sorted_child = child.bytes(&arena).to_vec();
            let mut sorted_parent = parent.bytes(&arena).to_vec();
            sorted_child.sort_unstable();
            sorted_parent.sort_unstable();
            assert_eq!(sorted_child, sorted_parent);
        }
    }

    #[test]
    fn duplicate_byte_grows_within_bounds() {
        let (mut rng, mut arena, parent) = setup(b"abcd");
        for _ in 0..32 {
            let child = Mutation::DuplicateByte.apply(&mut rng, &mut arena, &parent);
            let growth = child.length(&arena) - 4;
            assert!((1..=crate::MAX_DUPLICATE_REPEAT).contains(&growth));
        }
    }

    #[test]
    fn duplicate_bytes_repeats_the_window() {
        let (mut rng, mut arena, parent) = setup(b"abcdefghijkl");
        for _ in 0..32 {
            let child = Mutation::DuplicateBytes.apply(&mut rng, &mut arena, &parent);
            assert!(child.length(&arena) >= 12);
            assert!(
                child.length(&arena)
                    <= 12 + crate::MAX_DUPLICATE_REPEAT * crate::MAX_DUPLICATE_WINDOW
            );
        }
    }

    #[test]
    fn ascii_integer_rewrites_the_digit_run() {
        let (mut rng, mut arena, parent) = setup(b"size=10\n");
        let mut histogram = BTreeMap::new();
        for _ in 0..1000 {
            let child = Mutation::AsciiInteger.apply(&mut rng, &mut arena, &parent);
            let bytes = child.bytes(&arena).to_vec();
            assert!(bytes.starts_with(b"size="));
            assert!(bytes.ends_with(b"\n"));
            let digits = &bytes[5..bytes.len() - 1];
            assert!(!digits.is_empty());
            assert!(digits.iter().all(|b| b.is_ascii_digit()));
            let value = String::from_utf8_lossy(digits).parse::<u64>().unwrap();
            *histogram.entry(value).or_insert(0usize) += 1;
            arena.decref(child.slot);
        }
        // the edge-value mutators each fire at roughly 1/11
        for expected in [0, 11, 9, u8::MAX as u64, u16::MAX as u64, u32::MAX as u64] {
            assert!(histogram.contains_key(&expected), "missing {}", expected);
        }
        // the buffer grows when the new value is wider than the run
        assert!(histogram.keys().any(|v| *v > 99));
    }

    #[test]
    fn ascii_integer_without_digits_is_identity() {
        let (mut rng, mut arena, parent) = setup(b"no numbers");
        let child = Mutation::AsciiInteger.apply(&mut rng, &mut arena, &parent);
        assert_eq!(child.bytes(&arena), parent.bytes(&arena));
    }

    #[test]
    fn no_mutation_ever_empties_a_buffer() {
        let (mut rng, mut arena, parent) = setup(b"x");
        for mutation in Mutation::ALL {
            for _ in 0..16 {
                let child = mutation.apply(&mut rng, &mut arena, &parent);
                assert!(child.length(&arena) >= 1, "{:?} emptied the buffer", mutation);
                arena.decref(child.slot);
            }
        }
    }
}
