use crate::trace::TraceKind;
use crate::trace::TraceRecord;
use rand::Rng;
use rand::rngs::SmallRng;

/// synthesize a plausible trace for one testcase without calling any
/// target: a short walk through a handful of functions, closed with a
/// terminal marker. paired with blind knowledge this exercises the whole
/// scoring and evolution pipeline.
pub fn mock_trace(rng: &mut SmallRng) -> Vec<TraceRecord> {
    let mut records = Vec::new();
    let calls = rng.random_range(1..4);
    for _ in 0..calls {
        let function = rng.random_range(1..24u32);
        let thread = 0;
        records.push(TraceRecord::boundary(
            TraceKind::EnterFunction,
            thread,
            function,
        ));
        let mut pred = 0;
        for _ in 0..rng.random_range(1..12) {
            let cur = rng.random_range(1..10u32);
            records.push(TraceRecord::reach(thread, function, pred, cur));
            pred = cur;
        }
        records.push(TraceRecord::boundary(
            TraceKind::ExitFunction,
            thread,
            function,
        ));
    }
    records.push(TraceRecord::marker(TraceKind::Terminated));
    records
}
