use super::crossover::Crossover;
use super::individual::Individual;
use super::mating::Mating;
use super::mutation::Mutation;
use super::population::Population;
use crate::arena::Arena;
use crate::coverage::Knowledge;
use crate::measure::IndexFitness;
use crate::measure::IndexScore;
use crate::measure::Measure;
use crate::measure::Score;
use rand::Rng;
use rand::rngs::SmallRng;

/// the genetic algorithm: one `evolve` call is one generation. scores come
/// from the scoreboard, the best set remembers the all-time winners, and a
/// stagnation budget triggers a global perturbation instead of giving up.
pub struct Evolver {
    pub generations: u32,
    stagnation: u32,
    max_stagnation: u32,
    range: (usize, usize),
    slow: bool,
}

impl Evolver {
    pub fn new(median: usize, deviation: usize, max_stagnation: u32, slow: bool) -> Self {
        Self {
            generations: 0,
            stagnation: 0,
            max_stagnation,
            range: (median.saturating_sub(deviation), median + deviation),
            slow,
        }
    }

    fn deviation(&self) -> usize {
        self.range.1 - self.range.0
    }
}

// one generation
impl Evolver {
    /// returns true when the stagnation budget fired a global perturbation
    /// instead of a regular breeding step
    pub fn evolve(
        &mut self,
        rng: &mut SmallRng,
        arena: &mut Arena,
        population: &mut Population,
        knowledge: &Knowledge,
    ) -> bool {
        self.generations += 1;
        self.stagnation += 1;
        log::info!("proceeding with generation {}", self.generations);
        log::info!("current population size: {}", population.size());

        let (edges, goals) = self.gather_scores(population, knowledge);
        let fitness = self.fitness(arena, population, &edges, &goals);

        let mut improved = false;
        {
            let mut best = population.best().lock().unwrap();
            for (index, measure) in &fitness {
                let candidate = &population.individuals[*index as usize];
                improved |= best.insert(arena, *measure, candidate);
            }
        }
        if improved {
            self.stagnation = 0;
        }

        if self.stagnation > self.max_stagnation {
            self.stagnation = 0;
            self.global_perturbation(rng, arena, population);
            arena.force_clean(&population.active_slots());
            return true;
        }

        let mating = Mating::choose(rng, self.slow);
        let mates = mating.apply(rng, arena, &fitness, &population.individuals);

        // one crossover per generation, random mutation per child
        let crossover = Crossover::choose(rng, self.slow);
        let mut brood = Vec::new();
        for (left, right) in &mates {
            let child = crossover.apply(
                rng,
                arena,
                &population.individuals[*left as usize],
                &population.individuals[*right as usize],
            );
            brood.push(self.mutate_or_copy(rng, arena, &child));
            arena.decref(child.slot);
        }

        let bred = brood.len();
        let performers = self.best_performers(&fitness);
        if bred < self.range.0 && !performers.is_empty() {
            let missing = self.range.0 - bred;
            log::info!(
                "reinjecting {} best performers to reach the population floor ({} bred)",
                missing,
                bred
            );
            for i in 0..missing {
                let index = performers[i % performers.len()] as usize;
                brood.push(self.mutate_or_copy(rng, arena, &population.individuals[index]));
            }
        }

        if brood.len() < self.range.0 {
            // population underflow with nothing ranked to breed from:
            // refill from the all-time bests, then from the seed pool
            let missing = self.range.0 - brood.len();
            let fallback = population.best().lock().unwrap().get_best(arena, missing);
            for shared in fallback {
                brood.push(self.mutate(rng, arena, &shared));
                arena.decref(shared.slot);
            }
            let mut next = 0;
            while brood.len() < self.range.0 && !population.seeds.is_empty() {
                let seed = next % population.seeds.len();
                brood.push(self.mutate(rng, arena, &population.seeds[seed]));
                next += 1;
            }
        }

        // every other generation, fold some all-time bests back in
        if rng.random::<bool>() {
            let count = rng.random_range(0..self.deviation().max(1)) + 1;
            log::info!("reinjecting {} individuals from the overall bests", count);
            let bests = population.best().lock().unwrap().get_best(arena, count);
            let missing = count - bests.len();
            for shared in bests {
                brood.push(self.mutate_or_copy(rng, arena, &shared));
                arena.decref(shared.slot);
            }
            for i in 0..missing {
                if performers.is_empty() {
                    break;
                }
                let index = performers[i % performers.len()] as usize;
                brood.push(self.mutate_or_copy(rng, arena, &population.individuals[index]));
            }
        }

        for retired in population.individuals.drain(..) {
            arena.decref(retired.slot);
        }
        population.individuals = brood;
        log::info!("new population size: {}", population.size());

        arena.force_clean(&population.active_slots());
        false
    }

    /// read the accumulated per-testcase scores off the scoreboard,
    /// dropping zero-norm entries
    fn gather_scores(
        &self,
        population: &Population,
        knowledge: &Knowledge,
    ) -> (IndexScore, IndexScore) {
        let coverage = knowledge.coverage();
        let mut edges = IndexScore::new();
        let mut goals = IndexScore::new();
        for (index, individual) in population.individuals.iter().enumerate() {
            if let Some(score) = coverage.coverage_scores().get(&individual.id) {
                if score.norm() > 0 {
                    edges.insert(index as u32, *score);
                }
            }
            if let Some(score) = coverage.goal_scores().get(&individual.id) {
                if score.norm() > 0 {
                    goals.insert(index as u32, *score);
                }
            }
        }
        (edges, goals)
    }

    fn fitness(
        &self,
        arena: &Arena,
        population: &Population,
        edges: &IndexScore,
        goals: &IndexScore,
    ) -> IndexFitness {
        population
            .individuals
            .iter()
            .enumerate()
            .map(|(i, individual)| {
                let index = i as u32;
                let edge = edges.get(&index).copied().unwrap_or_default();
                let goal = goals.get(&index).copied().unwrap_or_default();
                (index, Measure::new(goal, edge, individual.length(arena)))
            })
            .collect()
    }

    /// population indices ranked by fitness, best first
    fn best_performers(&self, fitness: &IndexFitness) -> Vec<u32> {
        let mut ranked = fitness.iter().collect::<Vec<_>>();
        ranked.sort_by(|a, b| b.1.cmp(a.1));
        ranked.into_iter().map(|(index, _)| *index).collect()
    }

    /// with the usual probability, mutate into a fresh slot, retrying
    /// until the child is non-empty; otherwise plain copy. either way the
    /// result exclusively owns its slot.
    fn mutate_or_copy(
        &self,
        rng: &mut SmallRng,
        arena: &mut Arena,
        parent: &Individual,
    ) -> Individual {
        if rng.random_range(0..100) >= crate::MUTATION_PROBABILITY_PERCENT {
            return parent.spawn(arena);
        }
        self.mutate(rng, arena, parent)
    }

    /// always mutate, retrying on empty output
    fn mutate(&self, rng: &mut SmallRng, arena: &mut Arena, parent: &Individual) -> Individual {
        loop {
            let mutation = Mutation::choose(rng);
            let child = mutation.apply(rng, arena, parent);
            if child.length(arena) > 0 {
                return child;
            }
            arena.decref(child.slot);
        }
    }
}

// the escape hatch for a stuck search
impl Evolver {
    /// rebuild the population from half of the best set and half of the
    /// original seeds, then breed back up to the previous size. the best
    /// set itself is left alone, so the historical maximum survives.
    fn global_perturbation(&self, rng: &mut SmallRng, arena: &mut Arena, population: &mut Population) {
        log::info!("applying global perturbation");
        let current = population.size().max(self.range.0);
        let half = current / 2;
        let mut starting = population.best().lock().unwrap().get_best(arena, half);
        for seed in population.seeds.iter().take(half) {
            starting.push(seed.share(arena));
        }
        if starting.is_empty() {
            log::info!("nothing to perturb from: no bests, no seeds");
            return;
        }

        let mut brood = starting
            .iter()
            .map(|ind| self.mutate(rng, arena, ind))
            .collect::<Vec<_>>();
        while brood.len() < current && starting.len() >= 2 {
            let crossover = Crossover::choose(rng, self.slow);
            let left = rng.random_range(0..starting.len());
            let mut right = left;
            while right == left {
                right = rng.random_range(0..starting.len());
            }
            let child = crossover.apply(rng, arena, &starting[left], &starting[right]);
            brood.push(self.mutate(rng, arena, &child));
            arena.decref(child.slot);
        }

        for shared in starting {
            arena.decref(shared.slot);
        }
        for retired in population.individuals.drain(..) {
            arena.decref(retired.slot);
        }
        population.individuals = brood;
    }
}
