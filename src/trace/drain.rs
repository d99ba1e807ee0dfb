use super::record::TraceKind;
use super::record::TraceRecord;
use super::region::Region;
use crate::TestcaseId;
use std::collections::BTreeMap;

/// the reader half of the trace transport. polls the shared region and
/// buckets records per testcase, preserving append order within each id.
pub struct Drain {
    region: Region,
    pending: BTreeMap<TestcaseId, Vec<TraceRecord>>,
}

impl From<Region> for Drain {
    fn from(region: Region) -> Self {
        Self {
            region,
            pending: BTreeMap::new(),
        }
    }
}

impl Drain {
    /// pull everything currently in the region into the local buckets
    pub fn poll(&mut self) {
        match self.region.drain() {
            Ok(drained) => {
                for (testcase, record) in drained {
                    self.pending.entry(testcase).or_default().push(record);
                }
            }
            Err(e) => log::info!("trace region drain failed: {}", e),
        }
    }

    /// a trace is complete once its last record is terminal
    pub fn is_complete(&self, testcase: TestcaseId) -> bool {
        self.pending
            .get(&testcase)
            .and_then(|records| records.last())
            .map(|record| record.kind.is_terminal())
            .unwrap_or(false)
    }

    /// remove and return the trace; integration happens exactly once
    pub fn take(&mut self, testcase: TestcaseId) -> Option<Vec<TraceRecord>> {
        self.pending.remove(&testcase)
    }

    /// the target never flushed a terminal record within its window: the
    /// best-effort suffix is closed with a synthetic timeout marker
    pub fn force_timeout(&mut self, testcase: TestcaseId) {
        self.pending
            .entry(testcase)
            .or_default()
            .push(TraceRecord::marker(TraceKind::TimedOut));
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
