use crate::TestcaseId;
use std::collections::BTreeMap;

/// weights for the edge/goal axes of the aggregate ranking
const EDGE_WEIGHT: f64 = 0.3;
const GOAL_WEIGHT: f64 = 0.7;

/// a local score computed for an individual. `absolute` counts every hit,
/// `diff` only the globally-first hits, so `diff` measures how much new
/// territory this testcase opened up.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Score {
    pub absolute: u32,
    pub diff: u32,
}

impl Score {
    pub fn new(absolute: u32, diff: u32) -> Self {
        Self { absolute, diff }
    }

    /// weighted L2 norm, novelty counting ~3x over repetition
    pub fn norm(&self) -> u64 {
        if self.absolute == 0 && self.diff == 0 {
            return 0;
        }
        let abs = self.absolute as f64;
        let diff = self.diff as f64;
        ((abs * abs + 9. * diff * diff) / 10.).sqrt().ceil() as u64
    }

    pub fn bump(&mut self, absolute: u32, diff: u32) {
        self.absolute += absolute;
        self.diff += diff;
    }
}

impl std::fmt::Display for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[abs={}, diff={}]", self.absolute, self.diff)
    }
}

/// the aggregation of all scoring components. goal and edge coverage are
/// combined with the input length into the final ranking.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Measure {
    pub goal: Score,
    pub edge: Score,
    pub length: usize,
}

impl Measure {
    pub fn new(goal: Score, edge: Score, length: usize) -> Self {
        Self { goal, edge, length }
    }

    fn weighted(&self) -> f64 {
        EDGE_WEIGHT * self.edge.norm() as f64 + GOAL_WEIGHT * self.goal.norm() as f64
    }
}

impl PartialOrd for Measure {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Measure {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        match self.weighted().total_cmp(&other.weighted()) {
            // counter intuitive, but we emphasize smaller payloads: for an
            // identical reach the longer input is the smaller measure
            Ordering::Equal => match other.length.cmp(&self.length) {
                Ordering::Equal => (
                    self.goal.absolute,
                    self.goal.diff,
                    self.edge.absolute,
                    self.edge.diff,
                )
                    .cmp(&(
                        other.goal.absolute,
                        other.goal.diff,
                        other.edge.absolute,
                        other.edge.diff,
                    )),
                order => order,
            },
            order => order,
        }
    }
}

impl std::fmt::Display for Measure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[goal={}, edge={}, length={}]",
            self.goal, self.edge, self.length
        )
    }
}

/// population index -> mate index
pub type IndexMap = BTreeMap<u32, u32>;
/// population index -> per-axis score
pub type IndexScore = BTreeMap<u32, Score>;
/// population index -> aggregate fitness
pub type IndexFitness = BTreeMap<u32, Measure>;
/// testcase id -> accumulated score
pub type ScoreMap = BTreeMap<TestcaseId, Score>;
