//! Property-based tests for the trigger runtime.
//!
//! Covers: sliding window bounds, the majority threshold, out-of-order
//! rejection, merge idempotence, and watermark monotonicity.

use proptest::prelude::*;
use hitgate_runtime::bag::RequestBag;
use hitgate_runtime::{
    Hit, Interval, MergeEngine, MergePolicy, Payload, ReadoutRequestElement, ReadoutScope,
    RerunPolicy, SensorId, SimpleMajorityTrigger, SourceId, TriggerAlgorithm, TriggerError,
    TriggerKind, TriggerRequest, UtcTime, WatermarkError, WatermarkTracker,
};

/// Strictly increasing hit times built from positive gaps.
fn arb_times(max_len: usize) -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(1i64..60, 1..max_len).prop_map(|gaps| {
        gaps.iter()
            .scan(0i64, |t, gap| {
                *t += gap;
                Some(*t)
            })
            .collect()
    })
}

fn arb_interval() -> impl Strategy<Value = Interval> {
    (0i64..1000, 0i64..80).prop_map(|(start, len)| Interval::ticks(start, start + len))
}

/// Strategy for readout elements across every scope.
fn arb_element() -> impl Strategy<Value = ReadoutRequestElement> {
    let hub = (0u32..3).prop_map(SourceId::string_hub);
    prop_oneof![
        arb_interval().prop_map(|i| ReadoutRequestElement::global(
            ReadoutScope::Global,
            i,
            SourceId::GLOBAL_TRIGGER
        )),
        arb_interval().prop_map(|i| ReadoutRequestElement::global(
            ReadoutScope::InIceGlobal,
            i,
            SourceId::INICE_TRIGGER
        )),
        (arb_interval(), hub.clone()).prop_map(|(i, h)| ReadoutRequestElement::string(i, h)),
        (arb_interval(), hub, 0u64..4).prop_map(|(i, h, s)| ReadoutRequestElement::module(
            ReadoutScope::InIceModule,
            i,
            h,
            SensorId(s)
        )),
    ]
}

fn smt(threshold: u32, window: i64, rerun: RerunPolicy) -> SimpleMajorityTrigger {
    let mut smt = SimpleMajorityTrigger::new("smt", 1, SourceId::INICE_TRIGGER, rerun);
    smt.configure([
        ("threshold", threshold.to_string().as_str()),
        ("timeWindow", window.to_string().as_str()),
    ])
    .expect("valid parameters");
    smt
}

fn hit(sensor: u64, t: i64) -> Payload {
    Payload::Hit(Hit::new(
        SensorId(sensor),
        SourceId::string_hub(1),
        UtcTime::new(t),
        2,
    ))
}

proptest! {
    /// The window front never moves backwards and never spans more than its length.
    #[test]
    fn window_front_monotonic_and_span_bounded(times in arb_times(80), window in 1i64..200) {
        let mut smt = smt(3, window, RerunPolicy::Drop);
        let mut last_front = None;
        for (i, t) in times.iter().enumerate() {
            smt.process(&hit(i as u64, *t)).unwrap();
            let front = smt.window().start_time();
            prop_assert!(front >= last_front);
            prop_assert!(smt.window().span() <= window);
            last_front = front;
        }
    }

    /// Every emitted request carries at least `threshold` distinct sensors.
    #[test]
    fn majority_respects_threshold(
        times in arb_times(120),
        threshold in 2u32..6,
        window in 10i64..200,
        rerun in any::<bool>(),
    ) {
        let mut smt = smt(threshold, window, RerunPolicy::from_flag(rerun));
        for (i, t) in times.iter().enumerate() {
            smt.process(&hit(i as u64, *t)).unwrap();
        }
        smt.flush();
        for request in smt.take_ready() {
            prop_assert!(request.multiplicity() >= threshold as usize);
            prop_assert_eq!(request.kind, TriggerKind::SimpleMajority);
        }
    }

    /// A hit earlier than its predecessor is rejected without side effects.
    #[test]
    fn out_of_order_leaves_state_unchanged(times in arb_times(40), back in 1i64..50) {
        let mut smt = smt(2, 100, RerunPolicy::Drop);
        for (i, t) in times.iter().enumerate() {
            smt.process(&hit(i as u64, *t)).unwrap();
        }
        let last = *times.last().unwrap();
        let window_len = smt.window().len();
        let accumulated = smt.accumulated().len();
        let earliest = smt.earliest_time_of_interest();

        let result = smt.process(&hit(999, last - back));
        let is_out_of_order = matches!(result, Err(TriggerError::OutOfOrder { .. }));
        prop_assert!(is_out_of_order);
        prop_assert_eq!(smt.window().len(), window_len);
        prop_assert_eq!(smt.accumulated().len(), accumulated);
        prop_assert_eq!(smt.earliest_time_of_interest(), earliest);
    }

    /// merge_homogeneous(merge_homogeneous(x)) == merge_homogeneous(x)
    #[test]
    fn homogeneous_merge_idempotent(
        elements in prop::collection::vec(arb_element(), 0..40),
        gap in 0i64..20,
    ) {
        let engine = MergeEngine::new(MergePolicy::with_gap(gap));
        let once = engine.merge_homogeneous(&elements);
        let twice = engine.merge_homogeneous(&once);
        prop_assert_eq!(once, twice);
    }

    /// Re-merging the flattened groups yields the same groups.
    #[test]
    fn heterogeneous_merge_idempotent(
        elements in prop::collection::vec(arb_element(), 0..40),
        gap in 0i64..20,
    ) {
        let engine = MergeEngine::new(MergePolicy::with_gap(gap));
        let once = engine.merge(&elements);
        let flattened: Vec<_> = once.iter().flat_map(|g| g.elements.iter().copied()).collect();
        let twice = engine.merge(&flattened);
        prop_assert_eq!(&once, &twice);

        // Groups come out ordered and disjoint.
        for pair in once.windows(2) {
            prop_assert!(pair[0].interval.end.offset(gap) < pair[1].interval.start);
        }
    }

    /// Drained requests always end before the watermark; it never goes backwards.
    #[test]
    fn bag_drain_respects_watermark(
        intervals in prop::collection::vec(arb_interval(), 1..30),
        marks in prop::collection::vec(0i64..1200, 1..10),
    ) {
        let mut bag = RequestBag::new(MergePolicy::ZERO_GAP);
        for interval in &intervals {
            bag.add(TriggerRequest::new(
                0,
                TriggerKind::SimpleMajority,
                1,
                SourceId::INICE_TRIGGER,
                *interval,
            ));
        }

        let mut current: Option<UtcTime> = None;
        for mark in marks {
            let mark = UtcTime::new(mark);
            match (current, bag.set_watermark(mark)) {
                (Some(previous), Err(WatermarkError::Backward { .. })) => {
                    prop_assert!(mark < previous);
                }
                (_, Ok(())) => {
                    prop_assert!(current.map_or(true, |p| mark >= p));
                    current = Some(mark);
                }
                (None, Err(e)) => prop_assert!(false, "unexpected error {}", e),
            }
            for request in bag.drain() {
                prop_assert!(request.interval.end < current.unwrap());
            }
        }

        let remaining = bag.intervals();
        for pair in remaining.windows(2) {
            prop_assert!(pair[0].end < pair[1].start);
        }
    }

    /// The tracker's effective watermark is non-decreasing.
    #[test]
    fn tracker_watermark_monotonic(
        reports in prop::collection::vec((0usize..3, proptest::option::of(0i64..1000)), 1..50),
    ) {
        let names = ["smt", "minbias", "volume"];
        let mut tracker = WatermarkTracker::new();
        let mut last = None;
        for (source, time) in reports {
            tracker.observe(names[source], time.map(UtcTime::new));
            let effective = tracker.recompute();
            prop_assert!(effective >= last);
            last = effective;
        }
    }
}
