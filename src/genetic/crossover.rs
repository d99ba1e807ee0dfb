use super::individual::Individual;
use super::next_char;
use super::pick;
use super::sequence;
use crate::arena::Arena;
use rand::Rng;
use rand::rngs::SmallRng;

/// the crossover palette. one child from two parents; the child starts as
/// a deep clone of a random parent, so its length is always one of the
/// parents' lengths and never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crossover {
    SinglePoint,
    NPoints,
    Uniform,
    Alignment,
}

impl Crossover {
    pub const FAST: [Crossover; 3] = [
        Crossover::SinglePoint,
        Crossover::NPoints,
        Crossover::Uniform,
    ];

    /// the alignment variant is quadratic, so it only joins the draw under
    /// the slow-strategies flag
    pub fn choose(rng: &mut SmallRng, slow: bool) -> Self {
        if slow && rng.random_range(0..4) == 3 {
            Self::Alignment
        } else {
            Self::FAST[rng.random_range(0..Self::FAST.len())]
        }
    }

    pub fn apply(
        &self,
        rng: &mut SmallRng,
        arena: &mut Arena,
        i1: &Individual,
        i2: &Individual,
    ) -> Individual {
        let child = if rng.random::<bool>() {
            i1.spawn(arena)
        } else {
            i2.spawn(arena)
        };
        match self {
            Self::SinglePoint => single_point(rng, arena, &child, i1, i2),
            Self::NPoints => n_points(rng, arena, &child, i1, i2),
            Self::Uniform => uniform(rng, arena, &child, i1, i2),
            Self::Alignment => alignment(rng, arena, &child, i1, i2),
        }
        child
    }
}

/// bytes before a random pivot come from one parent, bytes after from the
/// other; positions past a parent's end fill with random bytes
fn single_point(
    rng: &mut SmallRng,
    arena: &mut Arena,
    child: &Individual,
    i1: &Individual,
    i2: &Individual,
) {
    let (first, second) = if rng.random::<bool>() {
        (i1, i2)
    } else {
        (i2, i1)
    };
    let first = first.bytes(arena).to_vec();
    let second = second.bytes(arena).to_vec();
    let size = arena.length(child.slot);
    let pivot = if size > 1 { rng.random_range(0..size) + 1 } else { 0 };
    let buffer = arena.buffer_mut(child.slot);
    for j in 0..size {
        let source = if j < pivot { &first } else { &second };
        buffer[j] = match source.get(j) {
            Some(byte) => *byte,
            None => next_char(rng),
        };
    }
}

/// cut the child into segments of one random size and fill each segment
/// from a randomly chosen parent
fn n_points(
    rng: &mut SmallRng,
    arena: &mut Arena,
    child: &Individual,
    i1: &Individual,
    i2: &Individual,
) {
    let size = arena.length(child.slot);
    let bound = crate::MIN_SEGMENT_SIZE.max(size / crate::NUMBER_SEGMENTS);
    let segment = crate::MIN_SEGMENT_SIZE.max(rng.random_range(0..bound) + 1);
    if segment > size {
        return;
    }
    let splits = pick(rng, size / segment, size);
    if splits.is_empty() {
        return;
    }
    let parents = [i1.bytes(arena).to_vec(), i2.bytes(arena).to_vec()];
    let mut finger = 0;
    for split in splits {
        if finger == split {
            continue;
        }
        let source = &parents[rng.random_range(0..2)];
        for j in finger..split {
            arena.buffer_mut(child.slot)[j] = match source.get(j) {
                Some(byte) => *byte,
                None => next_char(rng),
            };
        }
        finger = split;
    }
    // the remainder of the buffer keeps the cloned parent's bytes
}

/// classic per-byte selection from either parent
fn uniform(
    rng: &mut SmallRng,
    arena: &mut Arena,
    child: &Individual,
    i1: &Individual,
    i2: &Individual,
) {
    let parents = [i1.bytes(arena).to_vec(), i2.bytes(arena).to_vec()];
    let size = arena.length(child.slot);
    let buffer = arena.buffer_mut(child.slot);
    for j in 0..size {
        let source = &parents[rng.random_range(0..2)];
        buffer[j] = match source.get(j) {
            Some(byte) => *byte,
            None => next_char(rng),
        };
    }
}

/// keep what aligns between the parents and randomize only the rest
fn alignment(
    rng: &mut SmallRng,
    arena: &mut Arena,
    child: &Individual,
    i1: &Individual,
    i2: &Individual,
) {
    let other = if child.length(arena) == i1.length(arena)
        && child.bytes(arena) == i1.bytes(arena)
    {
        i2.bytes(arena).to_vec()
    } else {
        i1.bytes(arena).to_vec()
    };
    let loose = sequence::not_aligned(arena.buffer(child.slot), &other);
    if loose.is_empty() {
        // full overlap: nothing to randomize, keep the clone as is
        return;
    }
    let size = arena.length(child.slot);
    let buffer = arena.buffer_mut(child.slot);
    for index in loose {
        if index < size {
            buffer[index] = next_char(rng);
        }
    }
}
