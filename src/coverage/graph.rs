use super::knowledge::Model;
use crate::ElementId;
use crate::TestcaseId;
use crate::measure::Measure;
use crate::measure::Score;
use crate::measure::ScoreMap;
use crate::trace::TraceKind;
use crate::trace::TraceRecord;
use petgraph::graph::DiGraph;
use petgraph::graph::NodeIndex;
use std::collections::BTreeMap;
use std::collections::BTreeSet;

/// the incremental scoreboard. vertices are block element ids, edges are
/// observed transitions; first sightings pay out on both score axes, reruns
/// only on the absolute one.
#[derive(Default)]
pub struct Coverage {
    graph: DiGraph<ElementId, ()>,
    vertices: BTreeMap<ElementId, NodeIndex>,
    reached_functions: BTreeSet<ElementId>,
    covered_goals: BTreeSet<ElementId>,
    local: BTreeMap<ElementId, u32>,
    edge_scores: ScoreMap,
    goal_scores: ScoreMap,
    terminals: BTreeMap<TestcaseId, TraceKind>,
}

// integration
impl Coverage {
    /// fold a complete trace into the scoreboard under the testcase id
    pub fn add_trace(&mut self, model: &impl Model, testcase: TestcaseId, trace: &[TraceRecord]) {
        for record in trace {
            self.add_record(model, testcase, record);
        }
        log::info!(
            "coverage: testcase_id={} trace_size={}",
            testcase,
            trace.len()
        );
    }

    fn add_record(&mut self, model: &impl Model, testcase: TestcaseId, record: &TraceRecord) {
        if record.kind.is_terminal() {
            self.terminals.insert(testcase, record.kind);
            return;
        }
        if record.cur == 0 {
            // function boundaries carry no block transition
            if record.function != crate::ERROR_ID {
                self.touch(record.function);
                if self.reached_functions.insert(record.function) {
                    self.edge_scores.entry(testcase).or_default().bump(2, 1);
                } else {
                    self.edge_scores.entry(testcase).or_default().bump(1, 0);
                }
            }
            return;
        }
        let pred = model.block_element(record.function, record.pred);
        let cur = model.block_element(record.function, record.cur);
        self.add_edge(model, testcase, pred, cur);
    }

    fn add_edge(
        &mut self,
        model: &impl Model,
        testcase: TestcaseId,
        source: ElementId,
        dest: ElementId,
    ) {
        self.touch(source);
        self.touch(dest);
        let from = self.vertex(source);
        let into = self.vertex(dest);
        if self.graph.find_edge(from, into).is_none() {
            log::info!(
                "reached new block from testcase #{} (element_ids {}->{})",
                testcase,
                source,
                dest
            );
            self.graph.add_edge(from, into, ());
            self.edge_scores.entry(testcase).or_default().bump(2, 1);
        } else {
            self.edge_scores.entry(testcase).or_default().bump(1, 0);
        }
        let goals = self.goal_score(model, dest);
        if goals.norm() > 0 {
            if goals.diff > 0 {
                log::info!(" [+] new goals from testcase #{}", testcase);
            }
            self.goal_scores
                .entry(testcase)
                .or_default()
                .bump(goals.absolute, goals.diff);
        }
    }

    /// score the goals attached to a block, marking first sightings in
    /// the covered set
    fn goal_score(&mut self, model: &impl Model, block: ElementId) -> Score {
        let mut score = Score::default();
        for (summary, weight) in model.goals(block) {
            let fresh = self.covered_goals.insert(summary);
            score.absolute += weight;
            if fresh {
                log::info!("reached new goal #{}", summary);
                score.diff += weight;
            }
        }
        score
    }

    fn vertex(&mut self, element: ElementId) -> NodeIndex {
        match self.vertices.get(&element) {
            Some(index) => *index,
            None => {
                let index = self.graph.add_node(element);
                self.vertices.insert(element, index);
                index
            }
        }
    }

    fn touch(&mut self, element: ElementId) {
        *self.local.entry(element).or_insert(0) += 1;
    }
}

// evaluation mode: identical scoring with no writes anywhere. used by the
// debug loop to ask "what would this trace be worth".
impl Coverage {
    pub fn evaluate_trace(
        &self,
        model: &impl Model,
        trace: &[TraceRecord],
    ) -> (Vec<ElementId>, Measure) {
        let mut walked = Vec::new();
        let mut edge = Score::default();
        let mut goal = Score::default();
        let mut functions = BTreeSet::new();
        let mut edges = BTreeSet::new();
        let mut goals = BTreeSet::new();
        for record in trace {
            if record.kind.is_terminal() {
                continue;
            }
            if record.cur == 0 {
                if record.function != crate::ERROR_ID {
                    let seen = self.reached_functions.contains(&record.function)
                        || !functions.insert(record.function);
                    if seen {
                        edge.bump(1, 0);
                    } else {
                        edge.bump(2, 1);
                    }
                }
                continue;
            }
            let source = model.block_element(record.function, record.pred);
            let dest = model.block_element(record.function, record.cur);
            walked.push(dest);
            let seen = self.has_edge(source, dest) || !edges.insert((source, dest));
            if seen {
                edge.bump(1, 0);
            } else {
                edge.bump(2, 1);
            }
            for (summary, weight) in model.goals(dest) {
                let fresh = !self.covered_goals.contains(&summary) && goals.insert(summary);
                goal.absolute += weight;
                if fresh {
                    goal.diff += weight;
                }
            }
        }
        (walked, Measure::new(goal, edge, 0))
    }

    fn has_edge(&self, source: ElementId, dest: ElementId) -> bool {
        match (self.vertices.get(&source), self.vertices.get(&dest)) {
            (Some(from), Some(into)) => self.graph.find_edge(*from, *into).is_some(),
            _ => false,
        }
    }
}

// observers
impl Coverage {
    pub fn coverage_scores(&self) -> &ScoreMap {
        &self.edge_scores
    }

    pub fn goal_scores(&self) -> &ScoreMap {
        &self.goal_scores
    }

    pub fn local_coverage(&self) -> &BTreeMap<ElementId, u32> {
        &self.local
    }

    pub fn terminal(&self, testcase: TestcaseId) -> Option<TraceKind> {
        self.terminals.get(&testcase).copied()
    }

    pub fn covered_goals(&self) -> &BTreeSet<ElementId> {
        &self.covered_goals
    }

    pub fn reached_functions(&self) -> &BTreeSet<ElementId> {
        &self.reached_functions
    }

    /// (vertices, edges)
    pub fn size(&self) -> (usize, usize) {
        (self.graph.node_count(), self.graph.edge_count())
    }

    /// scores are per-generation; the graph and the covered sets are not
    pub fn reset_scores(&mut self) {
        self.edge_scores.clear();
        self.goal_scores.clear();
        self.local.clear();
        self.terminals.clear();
    }

    pub fn to_dot(&self, path: &std::path::Path) -> std::io::Result<()> {
        use petgraph::dot::Config;
        use petgraph::dot::Dot;
        let rendered = format!(
            "{:?}",
            Dot::with_config(&self.graph, &[Config::EdgeNoLabel])
        );
        std::fs::write(path, rendered)
    }
}
