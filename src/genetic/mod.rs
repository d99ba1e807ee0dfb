pub mod crossover;
pub mod evolver;
pub mod individual;
pub mod mating;
pub mod mutation;
pub mod population;
pub mod sequence;

pub use crossover::Crossover;
pub use evolver::Evolver;
pub use individual::Individual;
pub use individual::Shareable;
pub use mating::Mating;
pub use mutation::Mutation;
pub use population::BestSet;
pub use population::Population;

use rand::Rng;
use rand::rngs::SmallRng;
use std::collections::BTreeSet;

/// sample `count` distinct numbers below `high`
pub fn pick(rng: &mut SmallRng, count: usize, high: usize) -> Vec<usize> {
    let count = count.min(high);
    let mut values = BTreeSet::new();
    while values.len() < count {
        values.insert(rng.random_range(0..high));
    }
    values.into_iter().collect()
}

/// a fuzzer-friendly byte: either anything, or one of the specials that
/// tend to matter to parsers
pub fn next_char(rng: &mut SmallRng) -> u8 {
    const SPECIALS: &[u8] = b"!*'();:@&=+$,/?%#[]123ABCxyz-`~.";
    if rng.random::<bool>() {
        rng.random::<u8>()
    } else {
        SPECIALS[rng.random_range(0..SPECIALS.len())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn pick_returns_distinct_values_in_range() {
        let mut rng = SmallRng::seed_from_u64(1);
        let picked = pick(&mut rng, 5, 10);
        assert_eq!(picked.len(), 5);
        assert!(picked.iter().all(|v| *v < 10));
        let unique = picked.iter().collect::<BTreeSet<_>>();
        assert_eq!(unique.len(), 5);
    }

    #[test]
    fn pick_caps_at_the_range() {
        let mut rng = SmallRng::seed_from_u64(2);
        assert_eq!(pick(&mut rng, 10, 3).len(), 3);
        assert!(pick(&mut rng, 3, 0).is_empty());
    }
}
