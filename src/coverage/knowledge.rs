use super::graph::Coverage;
use crate::BlockNumber;
use crate::ElementId;
use crate::TestcaseId;
use crate::error::Result;
use crate::measure::Measure;
use crate::model::Element;
use crate::model::Store;
use crate::trace::TraceRecord;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

/// resolution seam between the scoreboard and whatever model backs it:
/// the persisted store, or synthetic answers when fuzzing blind.
pub trait Model {
    /// (function element id, CFG block number) -> block element id
    fn block_element(&self, function: ElementId, block: BlockNumber) -> ElementId;
    /// (summary id, weight) pairs attached to a block element
    fn goals(&self, block: ElementId) -> Vec<(ElementId, u32)>;
}

impl Model for Store {
    fn block_element(&self, function: ElementId, block: BlockNumber) -> ElementId {
        self.get_block_element(function, block)
    }

    fn goals(&self, block: ElementId) -> Vec<(ElementId, u32)> {
        let summaries = match self.get(block) {
            Some(Element::Block(b)) => &b.summaries,
            Some(other) => {
                log::info!("element #{} is a {}, not a block", block, other.kind_name());
                return vec![];
            }
            None => {
                log::info!("no goal score for block #{}", block);
                return vec![];
            }
        };
        summaries
            .iter()
            .filter_map(|id| match self.get(*id) {
                Some(Element::Summary(s)) => Some((s.id, s.op.weight())),
                _ => {
                    log::info!("cannot find summary element #{} of block #{}", id, block);
                    None
                }
            })
            .collect()
    }
}

/// model stand-in for targets instrumented without a store. block ids come
/// from Szudzik pairing of (function, block); goal payouts are synthetic,
/// sparse, and stable per block.
pub struct Blind {
    rng: Mutex<SmallRng>,
    mocked: Mutex<BTreeMap<ElementId, Vec<(ElementId, u32)>>>,
}

impl Blind {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(SmallRng::seed_from_u64(seed)),
            mocked: Mutex::new(BTreeMap::new()),
        }
    }
}

impl Model for Blind {
    fn block_element(&self, function: ElementId, block: BlockNumber) -> ElementId {
        if function > crate::MAX_BLIND_NUM_FUNC || block > crate::MAX_BLIND_NUM_FUNC {
            log::info!("szudzik pairing conflicts past {} ids", crate::MAX_BLIND_NUM_FUNC);
        }
        if function >= block {
            function * function + function + block
        } else {
            function + block * block
        }
    }

    fn goals(&self, block: ElementId) -> Vec<(ElementId, u32)> {
        let mut mocked = self.mocked.lock().unwrap();
        if let Some(goals) = mocked.get(&block) {
            return goals.clone();
        }
        let mut rng = self.rng.lock().unwrap();
        let goals = if rng.random_range(0..30) > 0 {
            vec![]
        } else {
            let count = rng.random_range(1..5usize);
            (0..count)
                .map(|i| (block.wrapping_mul(31).wrapping_add(i as u32), rng.random_range(1..4u32)))
                .collect()
        };
        mocked.insert(block, goals.clone());
        goals
    }
}

enum Source {
    Store(Store),
    Blind(Blind),
}

impl Model for Source {
    fn block_element(&self, function: ElementId, block: BlockNumber) -> ElementId {
        match self {
            Self::Store(store) => store.block_element(function, block),
            Self::Blind(blind) => blind.block_element(function, block),
        }
    }

    fn goals(&self, block: ElementId) -> Vec<(ElementId, u32)> {
        match self {
            Self::Store(store) => store.goals(block),
            Self::Blind(blind) => blind.goals(block),
        }
    }
}

/// everything the fuzzer knows about the target: the instrumentation model
/// plus the coverage accumulated across all runs so far.
pub struct Knowledge {
    source: Source,
    coverage: Coverage,
}

// construction
impl Knowledge {
    pub fn from_file(path: &Path) -> Result<Self> {
        let store = Store::load(path)?;
        log::info!("{}", store);
        Ok(Self::from_store(store))
    }

    pub fn from_store(store: Store) -> Self {
        Self {
            source: Source::Store(store),
            coverage: Coverage::default(),
        }
    }

    pub fn blind(seed: u64) -> Self {
        Self {
            source: Source::Blind(Blind::new(seed)),
            coverage: Coverage::default(),
        }
    }
}

// trace integration, dispatched into the scoreboard
impl Knowledge {
    pub fn add_trace(&mut self, testcase: TestcaseId, trace: &[TraceRecord]) {
        let Self { source, coverage } = self;
        coverage.add_trace(source, testcase, trace);
    }

    pub fn evaluate_trace(&self, trace: &[TraceRecord]) -> (Vec<ElementId>, Measure) {
        self.coverage.evaluate_trace(&self.source, trace)
    }

    pub fn coverage(&self) -> &Coverage {
        &self.coverage
    }

    pub fn reset_scores(&mut self) {
        self.coverage.reset_scores();
    }

    pub fn store(&self) -> Option<&Store> {
        match &self.source {
            Source::Store(store) => Some(store),
            Source::Blind(_) => None,
        }
    }

    pub fn to_dot(&self, path: &Path) -> std::io::Result<()> {
        self.coverage.to_dot(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::TraceKind;

    #[test]
    fn blind_pairing_is_injective_on_small_ids() {
        let blind = Blind::new(0);
        let mut seen = std::collections::BTreeSet::new();
        for function in 1..32 {
            for block in 0..32 {
                assert!(seen.insert(blind.block_element(function, block)));
            }
        }
    }

    #[test]
    fn blind_goals_are_stable_per_block() {
        let blind = Blind::new(7);
        for block in 1..256 {
            assert_eq!(blind.goals(block), blind.goals(block));
        }
    }

    #[test]
    fn blind_knowledge_integrates_traces() {
        let mut k = Knowledge::blind(11);
        let trace = vec![
            TraceRecord::boundary(TraceKind::EnterFunction, 0, 3),
            TraceRecord::reach(0, 3, 0, 1),
            TraceRecord::marker(TraceKind::Terminated),
        ];
        k.add_trace(1, &trace);
        assert!(k.coverage().coverage_scores()[&1].absolute > 0);
        assert_eq!(k.coverage().terminal(1), Some(TraceKind::Terminated));
    }
}
