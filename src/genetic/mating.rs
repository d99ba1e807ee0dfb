use super::individual::Individual;
use super::sequence;
use crate::arena::Arena;
use crate::measure::IndexFitness;
use crate::measure::IndexMap;
use rand::Rng;
use rand::rngs::SmallRng;

/// the mate-selection palette: who gets crossed with whom each generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mating {
    Elitism,
    Uniform,
    Closeness,
}

impl Mating {
    pub const FAST: [Mating; 2] = [Mating::Elitism, Mating::Uniform];

    pub fn choose(rng: &mut SmallRng, slow: bool) -> Self {
        if slow && rng.random_range(0..3) == 2 {
            Self::Closeness
        } else {
            Self::FAST[rng.random_range(0..Self::FAST.len())]
        }
    }

    pub fn apply(
        &self,
        rng: &mut SmallRng,
        arena: &Arena,
        fitness: &IndexFitness,
        individuals: &[Individual],
    ) -> IndexMap {
        match self {
            Self::Elitism => elitism(fitness),
            Self::Uniform => uniform(rng, individuals),
            Self::Closeness => closeness(arena, individuals),
        }
    }
}

/// pair the best performers together: first with second, third with
/// fourth, walking down the ranking
fn elitism(fitness: &IndexFitness) -> IndexMap {
    let mut ranked = fitness.iter().collect::<Vec<_>>();
    ranked.sort_by(|a, b| b.1.cmp(a.1));
    ranked
        .chunks(2)
        .filter(|pair| pair.len() == 2)
        .map(|pair| (*pair[0].0, *pair[1].0))
        .collect()
}

/// random pairs, enough for half the population
fn uniform(rng: &mut SmallRng, individuals: &[Individual]) -> IndexMap {
    let size = individuals.len();
    if size == 0 {
        return IndexMap::new();
    }
    let pairs = size / 2 + size % 2;
    (0..pairs)
        .map(|_| {
            (
                rng.random_range(0..size) as u32,
                rng.random_range(0..size) as u32,
            )
        })
        .collect()
}

/// pair the most similar buffers, by pairwise alignment score. quadratic
/// per pair and quadratic in pairs, hence the slow-strategies flag; the
/// pair scores at least compute in parallel.
fn closeness(arena: &Arena, individuals: &[Individual]) -> IndexMap {
    use rayon::prelude::*;
    let pairs = (0..individuals.len())
        .flat_map(|i| (i + 1..individuals.len()).map(move |j| (i, j)))
        .collect::<Vec<_>>();
    let mut scored = pairs
        .into_par_iter()
        .map(|(i, j)| {
            let score =
                sequence::align_score(individuals[i].bytes(arena), individuals[j].bytes(arena));
            (i as u32, j as u32, score)
        })
        .collect::<Vec<_>>();
    scored.sort_by(|a, b| b.2.cmp(&a.2));
    let mut unpaired = (0..individuals.len() as u32).collect::<std::collections::BTreeSet<_>>();
    let mut pairs = IndexMap::new();
    for (i, j, score) in scored {
        if score < 1 {
            break;
        }
        if unpaired.contains(&i) && unpaired.contains(&j) {
            pairs.insert(i, j);
            unpaired.remove(&i);
            unpaired.remove(&j);
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::Measure;
    use crate::measure::Score;
    use rand::SeedableRng;

    fn fitness(scores: &[(u32, u32)]) -> IndexFitness {
        scores
            .iter()
            .enumerate()
            .map(|(i, (goal, edge))| {
                (
                    i as u32,
                    Measure::new(Score::new(*goal, *goal), Score::new(*edge, *edge), 8),
                )
            })
            .collect()
    }

    fn population(arena: &mut Arena, buffers: &[&[u8]]) -> Vec<Individual> {
        buffers
            .iter()
            .map(|bytes| Individual::from_bytes(arena, bytes))
            .collect()
    }

    #[test]
    fn elitism_pairs_consecutive_best() {
        let fitness = fitness(&[(1, 1), (50, 50), (40, 40), (2, 2)]);
        let pairs = elitism(&fitness);
        // ranking: 1, 2, 3, 0 -> pairs (1,2) and (3,0)
        assert_eq!(pairs.get(&1), Some(&2));
        assert_eq!(pairs.get(&3), Some(&0));
    }

    #[test]
    fn elitism_drops_the_odd_one_out() {
        let fitness = fitness(&[(3, 3), (2, 2), (1, 1)]);
        let pairs = elitism(&fitness);
        assert_eq!(pairs.len(), 1);
    }

    #[test]
    fn uniform_pairs_cover_half_the_population() {
        let mut rng = SmallRng::seed_from_u64(5);
        let mut arena = Arena::default();
        let individuals = population(&mut arena, &[b"a", b"b", b"c", b"d", b"e", b"f"]);
        let pairs = uniform(&mut rng, &individuals);
        assert!(pairs.len() <= 3);
        assert!(!pairs.is_empty());
        for (a, b) in pairs {
            assert!((a as usize) < individuals.len());
            assert!((b as usize) < individuals.len());
        }
    }

    #[test]
    fn closeness_pairs_similar_buffers() {
        let mut arena = Arena::default();
        let individuals = population(
            &mut arena,
            &[b"size=100x", b"qwertyuio", b"size=200x", b"qwertyuip"],
        );
        let pairs = closeness(&arena, &individuals);
        // the two size= buffers and the two qwerty buffers pair up
        assert_eq!(pairs.get(&0), Some(&2));
        assert_eq!(pairs.get(&1), Some(&3));
    }

    #[test]
    fn slow_flag_gates_closeness() {
        let mut rng = SmallRng::seed_from_u64(9);
        assert!((0..256).all(|_| Mating::choose(&mut rng, false) != Mating::Closeness));
        assert!((0..256).any(|_| Mating::choose(&mut rng, true) == Mating::Closeness));
    }
}
