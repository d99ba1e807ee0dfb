use super::individual::Individual;
use super::individual::Shareable;
use super::pick;
use crate::SlotIndex;
use crate::arena::Arena;
use crate::measure::Measure;
use rand::rngs::SmallRng;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Mutex;

/// constant-size collection of the best individuals ever seen, ordered by
/// measure. content-hash uniqueness keeps duplicates of the same bytes
/// out no matter how they were bred.
pub struct BestSet {
    capacity: usize,
    sequence: u64,
    hashes: BTreeSet<[u8; 16]>,
    members: BTreeMap<(Measure, u64), Individual>,
}

impl Default for BestSet {
    fn default() -> Self {
        Self::new(crate::BEST_CANDIDATES_SIZE)
    }
}

impl BestSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            sequence: 0,
            hashes: BTreeSet::new(),
            members: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn min(&self) -> Option<Measure> {
        self.members.first_key_value().map(|((m, _), _)| *m)
    }

    pub fn max(&self) -> Option<Measure> {
        self.members.last_key_value().map(|((m, _), _)| *m)
    }

    /// insert a candidate; returns whether a new overall maximum was seen.
    /// at capacity, only candidates strictly above the current minimum get
    /// in, and the minimum is what gets evicted.
    pub fn insert(&mut self, arena: &mut Arena, score: Measure, candidate: &Individual) -> bool {
        let hash = candidate.hash(arena);
        if self.hashes.contains(&hash) {
            return false;
        }
        if self.members.len() >= self.capacity {
            match self.min() {
                Some(min) if score > min => self.evict(arena),
                _ => return false,
            }
        }
        let improved = match self.max() {
            None => true,
            Some(max) => score > max,
        };
        self.sequence += 1;
        self.hashes.insert(hash);
        self.members
            .insert((score, self.sequence), candidate.share(arena));
        improved
    }

    fn evict(&mut self, arena: &mut Arena) {
        if let Some((_, loser)) = self.members.pop_first() {
            self.hashes.remove(&loser.hash(arena));
            arena.decref(loser.slot);
        }
    }

    /// the `count` best members, best first, shared out of the set
    pub fn get_best(&self, arena: &mut Arena, count: usize) -> Vec<Individual> {
        self.members
            .values()
            .rev()
            .take(count)
            .map(|member| member.share(arena))
            .collect::<Vec<_>>()
    }

    pub fn slots(&self) -> BTreeSet<SlotIndex> {
        self.members.values().map(|member| member.slot).collect()
    }

    pub fn entries(&self, arena: &Arena) -> Vec<(Measure, Shareable)> {
        self.members
            .iter()
            .rev()
            .map(|((measure, _), member)| (*measure, member.to_shared(arena)))
            .collect()
    }

    pub fn hashes(&self) -> &BTreeSet<[u8; 16]> {
        &self.hashes
    }
}

/// read-only copy of the population state, re-assigned after every
/// generation for observers that must not block evolution
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct Snapshot {
    pub max: Option<Measure>,
    pub min: Option<Measure>,
    pub individuals: Vec<Shareable>,
    pub bests: Vec<(Measure, Shareable)>,
}

impl Snapshot {
    /// aggregate statistics over the snapshot
    pub fn stats(&self) -> BTreeMap<String, f32> {
        let mut stats = BTreeMap::new();
        if self.individuals.is_empty() {
            return stats;
        }
        let count = self.individuals.len() as f32;
        let density = |keep: fn(&u8) -> bool| -> f32 {
            self.individuals
                .iter()
                .filter(|ind| !ind.bytes.is_empty())
                .map(|ind| {
                    ind.bytes.iter().filter(|b| keep(b)).count() as f32 / ind.bytes.len() as f32
                })
                .sum::<f32>()
                / count
        };
        let size = self
            .individuals
            .iter()
            .map(|ind| ind.length() as f32)
            .sum::<f32>()
            / count;
        stats.insert("Average Size".to_string(), size);
        stats.insert(
            "Average Letter Density".to_string(),
            density(|b| b.is_ascii_alphabetic()),
        );
        stats.insert(
            "Average Digit Density".to_string(),
            density(|b| b.is_ascii_digit()),
        );
        stats
    }
}

/// the population the genetic algorithm works on: the immutable seed pool,
/// the current generation, and the all-time best set
pub struct Population {
    pub seeds: Vec<Individual>,
    pub individuals: Vec<Individual>,
    best: Mutex<BestSet>,
    shadow: Mutex<Snapshot>,
}

impl From<Vec<Individual>> for Population {
    fn from(seeds: Vec<Individual>) -> Self {
        Self {
            seeds,
            individuals: Vec::new(),
            best: Mutex::new(BestSet::default()),
            shadow: Mutex::new(Snapshot::default()),
        }
    }
}

// generation bookkeeping
impl Population {
    pub fn size(&self) -> usize {
        self.individuals.len()
    }

    /// append up to `count` randomly chosen seeds
    pub fn inject_seeds(&mut self, rng: &mut SmallRng, arena: &mut Arena, count: usize) {
        let chosen = pick(rng, count, self.seeds.len());
        for index in chosen {
            self.individuals.push(self.seeds[index].share(arena));
        }
    }

    /// remove `count` random individuals
    pub fn drop_random(&mut self, rng: &mut SmallRng, arena: &mut Arena, count: usize) {
        let mut chosen = pick(rng, count, self.individuals.len());
        log::info!("drop: {:?} (size={})", chosen, self.individuals.len());
        chosen.reverse();
        for index in chosen {
            let removed = self.individuals.remove(index);
            arena.decref(removed.slot);
        }
    }

    /// every slot that must survive arena cleanup
    pub fn active_slots(&self) -> BTreeSet<SlotIndex> {
        self.seeds
            .iter()
            .chain(self.individuals.iter())
            .map(|ind| ind.slot)
            .chain(self.best.lock().unwrap().slots())
            .collect()
    }

    pub fn best(&self) -> &Mutex<BestSet> {
        &self.best
    }
}

// the read-only shadow for observers
impl Population {
    /// copy the current state under the snapshot mutex; taken after every
    /// generation so readers never contend with best-set insertion
    pub fn assign_snapshot(&self, arena: &Arena) {
        let mut shadow = self.shadow.lock().unwrap();
        let best = self.best.lock().unwrap();
        shadow.max = best.max();
        shadow.min = best.min();
        shadow.bests = best.entries(arena);
        shadow.individuals = self
            .individuals
            .iter()
            .map(|ind| ind.to_shared(arena))
            .collect();
    }

    pub fn snapshot(&self) -> Snapshot {
        self.shadow.lock().unwrap().clone()
    }

    pub fn get_best_ro(&self, count: usize) -> Vec<(Measure, Shareable)> {
        let shadow = self.shadow.lock().unwrap();
        shadow.bests.iter().take(count).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::Score;
    use rand::SeedableRng;

    fn measure(goal: u32, length: usize) -> Measure {
        Measure::new(Score::new(goal, goal), Score::new(1, 1), length)
    }

    fn individual(arena: &mut Arena, bytes: &[u8]) -> Individual {
        Individual::from_bytes(arena, bytes)
    }

    #[test]
    fn first_insert_is_a_new_max() {
        let mut arena = Arena::default();
        let mut best = BestSet::new(4);
        let ind = individual(&mut arena, b"one");
        assert!(best.insert(&mut arena, measure(5, 3), &ind));
        assert_eq!(best.len(), 1);
    }

    #[test]
    fn duplicate_content_is_rejected() {
        let mut arena = Arena::default();
        let mut best = BestSet::new(4);
        let a = individual(&mut arena, b"same");
        let b = individual(&mut arena, b"same");
        assert!(best.insert(&mut arena, measure(5, 4), &a));
        assert!(!best.insert(&mut arena, measure(9, 4), &b));
        assert_eq!(best.len(), 1);
    }

    #[test]
    fn capacity_evicts_only_strictly_smaller() {
        let mut arena = Arena::default();
        let mut best = BestSet::new(2);
        let a = individual(&mut arena, b"aa");
        let b = individual(&mut arena, b"bb");
        let c = individual(&mut arena, b"cc");
        let d = individual(&mut arena, b"dd");
        best.insert(&mut arena, measure(2, 2), &a);
        best.insert(&mut arena, measure(4, 2), &b);
        // equal to the minimum: rejected
        assert!(!best.insert(&mut arena, measure(2, 2), &c));
        assert_eq!(best.len(), 2);
        // strictly better: evicts the minimum
        best.insert(&mut arena, measure(3, 2), &d);
        assert_eq!(best.len(), 2);
        assert_eq!(best.min().unwrap(), measure(3, 2));
        assert_eq!(best.max().unwrap(), measure(4, 2));
    }

    #[test]
    fn eviction_releases_the_arena_slot() {
        let mut arena = Arena::default();
        let mut best = BestSet::new(1);
        let a = individual(&mut arena, b"aa");
        best.insert(&mut arena, measure(1, 2), &a);
        let b = individual(&mut arena, b"bb");
        best.insert(&mut arena, measure(2, 2), &b);
        // `a` itself still holds one reference, the set's share is gone
        assert_eq!(arena.refs(a.slot), 1);
        assert_eq!(arena.refs(b.slot), 2);
    }

    #[test]
    fn get_best_returns_descending_shares() {
        let mut arena = Arena::default();
        let mut best = BestSet::new(8);
        for (goal, bytes) in [(1u32, b"a1"), (5, b"a5"), (3, b"a3")] {
            let ind = individual(&mut arena, bytes);
            best.insert(&mut arena, measure(goal, 2), &ind);
        }
        let top = best.get_best(&mut arena, 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].bytes(&arena), b"a5");
        assert_eq!(top[1].bytes(&arena), b"a3");
    }

    #[test]
    fn new_max_only_reported_when_beating_the_best() {
        let mut arena = Arena::default();
        let mut best = BestSet::new(8);
        let a = individual(&mut arena, b"xx");
        let b = individual(&mut arena, b"yy");
        let c = individual(&mut arena, b"zz");
        assert!(best.insert(&mut arena, measure(5, 2), &a));
        assert!(!best.insert(&mut arena, measure(3, 2), &b));
        assert!(best.insert(&mut arena, measure(9, 2), &c));
    }

    #[test]
    fn seed_injection_shares_seed_slots() {
        let mut arena = Arena::default();
        let mut rng = SmallRng::seed_from_u64(1);
        let seeds = vec![
            individual(&mut arena, b"s1"),
            individual(&mut arena, b"s2"),
            individual(&mut arena, b"s3"),
        ];
        let mut population = Population::from(seeds);
        population.inject_seeds(&mut rng, &mut arena, 2);
        assert_eq!(population.size(), 2);
        for ind in &population.individuals {
            assert_eq!(arena.refs(ind.slot), 2);
        }
    }

    #[test]
    fn drop_removes_and_releases() {
        let mut arena = Arena::default();
        let mut rng = SmallRng::seed_from_u64(2);
        let mut population = Population::from(vec![]);
        for bytes in [b"i1", b"i2", b"i3", b"i4"] {
            population.individuals.push(individual(&mut arena, bytes));
        }
        population.drop_random(&mut rng, &mut arena, 2);
        assert_eq!(population.size(), 2);
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn snapshot_carries_bytes_by_value() {
        let mut arena = Arena::default();
        let mut population = Population::from(vec![]);
        population.individuals.push(individual(&mut arena, b"live"));
        population.assign_snapshot(&arena);
        arena.force_clean(&BTreeSet::new());
        let snapshot = population.snapshot();
        assert_eq!(snapshot.individuals.len(), 1);
        assert_eq!(snapshot.individuals[0].bytes, b"live");
    }

    #[test]
    fn snapshot_stats_measure_densities() {
        let mut arena = Arena::default();
        let mut population = Population::from(vec![]);
        population.individuals.push(individual(&mut arena, b"ab12"));
        population.assign_snapshot(&arena);
        let stats = population.snapshot().stats();
        assert_eq!(stats["Average Size"], 4.0);
        assert_eq!(stats["Average Letter Density"], 0.5);
        assert_eq!(stats["Average Digit Density"], 0.5);
    }
}
