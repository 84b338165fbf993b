// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(missing_docs)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use proptest::prelude::*;
use switchyard_sched::TimeWheel;

/// Pops every bucket and returns `(time, event)` in delivery order.
fn drain<E>(wheel: &mut TimeWheel<E>) -> Vec<(u64, E)> {
    let mut out = Vec::new();
    let mut batch = Vec::new();
    while let Some(mut front) = wheel.front() {
        let time = front.time();
        front.drain_into(&mut batch);
        out.extend(batch.drain(..).map(|e| (time, e)));
        wheel.pop_front().unwrap();
    }
    out
}

#[test]
fn buckets_come_out_in_time_order() {
    let mut wheel = TimeWheel::new(8);
    wheel.schedule(10, "c").unwrap();
    wheel.schedule(3, "a").unwrap();
    wheel.schedule(5, "b").unwrap();
    assert_eq!(wheel.next_time(), Some(3));
    assert_eq!(drain(&mut wheel), vec![(3, "a"), (5, "b"), (10, "c")]);
    assert!(wheel.is_empty());
    assert_eq!(wheel.now(), 11);
}

#[test]
fn same_time_events_share_a_bucket_in_insertion_order() {
    let mut wheel = TimeWheel::new(4);
    for (time, name) in [(5, "five"), (3, "three-a"), (3, "three-b"), (10, "ten")] {
        wheel.schedule(time, name).unwrap();
    }
    assert_eq!(wheel.len(), 3);
    let front = wheel.front().unwrap();
    assert_eq!(front.time(), 3);
    assert_eq!(front.events(), &["three-a", "three-b"]);
    assert_eq!(
        drain(&mut wheel),
        vec![(3, "three-a"), (3, "three-b"), (5, "five"), (10, "ten")]
    );
    assert!(wheel.front().is_none());
}

#[test]
fn far_events_survive_the_walk_through_the_window() {
    let mut wheel = TimeWheel::new(4);
    wheel.schedule(10, "far").unwrap();
    for t in 0..4 {
        wheel.schedule(t, "near").unwrap();
    }
    for t in 0..4 {
        assert_eq!(wheel.pop_front().unwrap(), t);
    }
    assert_eq!(wheel.now(), 4);
    wheel.schedule(10, "later").unwrap();
    let front = wheel.front().unwrap();
    assert_eq!(front.time(), 10);
    assert_eq!(front.events(), &["far", "later"]);
    assert_eq!(wheel.now(), 10);
    assert_eq!(wheel.num_events(), 2);
}

#[test]
fn overflow_buckets_migrate_into_the_window() {
    let mut wheel = TimeWheel::new(4);
    for t in [0, 2, 7, 12, 5, 3] {
        wheel.schedule(t, t).unwrap();
    }
    assert_eq!(wheel.len(), 6);
    let times: Vec<u64> = wheel.iter().map(|(t, _)| t).collect();
    assert_eq!(times, vec![0, 2, 3, 5, 7, 12]);

    assert_eq!(wheel.pop_front().unwrap(), 0);
    assert_eq!(wheel.pop_front().unwrap(), 2);
    assert_eq!(wheel.now(), 3);
    let front = wheel.front().unwrap();
    assert_eq!((front.time(), front.events()), (3, &[3][..]));
    assert_eq!(
        drain(&mut wheel),
        vec![(3, 3), (5, 5), (7, 7), (12, 12)]
    );
}

#[test]
fn scheduling_between_pops_lands_in_order() {
    let mut wheel = TimeWheel::new(4);
    wheel.schedule(1, 'a').unwrap();
    wheel.schedule(20, 'z').unwrap();
    assert_eq!(wheel.pop_front().unwrap(), 1);
    wheel.schedule(2, 'b').unwrap();
    wheel.schedule(19, 'y').unwrap();
    wheel.schedule(20, 'Z').unwrap();
    assert_eq!(
        drain(&mut wheel),
        vec![(2, 'b'), (19, 'y'), (20, 'z'), (20, 'Z')]
    );
}

#[test]
fn past_insertions_and_empty_pops_are_fatal() {
    let capture = switchyard_dry_tests::FatalCapture::install();
    let mut wheel = TimeWheel::new(4);
    wheel.schedule(2, ()).unwrap();
    wheel.pop_front().unwrap();
    assert!(wheel.schedule(1, ()).is_err());
    assert!(wheel.schedule(3, ()).is_ok());
    wheel.pop_front().unwrap();
    assert!(wheel.pop_front().is_err());
    assert_eq!(
        capture.kinds(),
        vec!["scheduler_past_insertion", "scheduler_underflow"]
    );
}

proptest! {
    #[test]
    fn delivery_is_a_stable_sort_by_time(
        window in 1usize..16,
        times in prop::collection::vec(0u64..300, 0..200),
    ) {
        let mut wheel = TimeWheel::new(window);
        for (id, time) in times.iter().enumerate() {
            wheel.schedule(*time, id).unwrap();
        }
        prop_assert_eq!(wheel.num_events(), times.len());

        let mut expected: Vec<(u64, usize)> =
            times.iter().enumerate().map(|(id, time)| (*time, id)).collect();
        expected.sort_by_key(|(time, _)| *time);
        prop_assert_eq!(drain(&mut wheel), expected);
        prop_assert!(wheel.is_empty());
    }

    #[test]
    fn next_time_matches_the_earliest_scheduled(
        window in 1usize..8,
        times in prop::collection::vec(0u64..1000, 1..50),
    ) {
        let mut wheel = TimeWheel::new(window);
        for time in &times {
            wheel.schedule(*time, ()).unwrap();
        }
        prop_assert_eq!(wheel.next_time(), times.iter().min().copied());
        let front = wheel.front().map(|f| f.time());
        prop_assert_eq!(front, times.iter().min().copied());
    }
}
