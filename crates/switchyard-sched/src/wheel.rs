// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Discrete-time wheel: a dense window of buckets plus a sorted sparse
//! overflow.
//!
//! The dense window covers `[now, now + window)`; slot `i` holds the bucket
//! for time `now + i`. Later times live in the overflow, sorted by descending
//! time so the earliest bucket sits at the end. Every advance of `now` pulls
//! overflow buckets that fall inside the new window back into it. Retired
//! event vectors are kept in a pool and reused.

use std::collections::VecDeque;

use switchyard_core::fatal;
use switchyard_core::BusError;

use crate::config::WheelConfig;

struct Cycle<E> {
    time: u64,
    events: Vec<E>,
}

/// Earliest bucket, borrowed from the wheel.
///
/// Holding a `Front` borrows the wheel mutably, so nothing can be scheduled
/// or popped while it lives.
pub struct Front<'a, E> {
    time: u64,
    events: &'a mut Vec<E>,
}

impl<E> Front<'_, E> {
    /// Absolute time of the bucket.
    pub fn time(&self) -> u64 {
        self.time
    }

    /// Events in insertion order.
    pub fn events(&self) -> &[E] {
        &self.events[..]
    }

    /// Number of events still in the bucket.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True when every event has been drained.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Appends an event at this bucket's time.
    pub fn push(&mut self, event: E) {
        self.events.push(event);
    }

    /// Moves every event out, in insertion order, leaving the bucket in place.
    pub fn drain_into(&mut self, out: &mut Vec<E>) {
        out.append(&mut *self.events);
    }
}

/// Time-indexed queue of events.
pub struct TimeWheel<E> {
    dense: VecDeque<Option<Cycle<E>>>,
    sparse: Vec<Cycle<E>>,
    pool: Vec<Vec<E>>,
    pool_limit: usize,
    now: u64,
}

impl<E> Default for TimeWheel<E> {
    fn default() -> Self {
        Self::with_config(WheelConfig::default())
    }
}

impl<E> std::fmt::Debug for TimeWheel<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeWheel")
            .field("now", &self.now)
            .field("window", &self.dense.len())
            .field("buckets", &self.len())
            .field("pooled", &self.pool.len())
            .finish_non_exhaustive()
    }
}

impl<E> TimeWheel<E> {
    /// Wheel with a dense window of `window` buckets (at least one).
    pub fn new(window: usize) -> Self {
        Self::with_config(WheelConfig {
            dense_window: window,
            ..WheelConfig::default()
        })
    }

    /// Wheel built from `config`.
    pub fn with_config(config: WheelConfig) -> Self {
        let window = config.dense_window.max(1);
        Self {
            dense: (0..window).map(|_| None).collect(),
            sparse: Vec::new(),
            pool: Vec::new(),
            pool_limit: config.pool_limit,
            now: 0,
        }
    }

    /// Time of the first dense slot.
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Dense window size.
    pub fn window(&self) -> usize {
        self.dense.len()
    }

    /// Retired event vectors waiting for reuse.
    pub fn pooled(&self) -> usize {
        self.pool.len()
    }

    /// True when no bucket is tracked.
    pub fn is_empty(&self) -> bool {
        self.sparse.is_empty() && self.dense.iter().all(Option::is_none)
    }

    /// Number of tracked buckets (dense and overflow).
    pub fn len(&self) -> usize {
        self.sparse.len() + self.dense.iter().flatten().count()
    }

    /// Number of scheduled events across all buckets.
    pub fn num_events(&self) -> usize {
        self.iter().map(|(_, events)| events.len()).sum()
    }

    /// Buckets in time order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &[E])> + '_ {
        self.dense
            .iter()
            .flatten()
            .chain(self.sparse.iter().rev())
            .map(|cycle| (cycle.time, cycle.events.as_slice()))
    }

    /// Time of the earliest tracked bucket, without compacting.
    pub fn next_time(&self) -> Option<u64> {
        self.dense
            .iter()
            .flatten()
            .next()
            .or_else(|| self.sparse.last())
            .map(|cycle| cycle.time)
    }

    /// Schedules `event` at absolute time `time`.
    pub fn schedule(&mut self, time: u64, event: E) -> Result<(), BusError> {
        if time < self.now {
            return Err(fatal::raise(BusError::SchedulerPastInsertion {
                time,
                now: self.now,
            }));
        }
        self.bucket(time).push(event);
        Ok(())
    }

    /// Bucket for `time`, created on demand. Requires `time >= now`.
    fn bucket(&mut self, time: u64) -> &mut Vec<E> {
        let offset = usize::try_from(time - self.now)
            .ok()
            .filter(|offset| *offset < self.dense.len());
        if let Some(offset) = offset {
            let pool = &mut self.pool;
            let cycle = self.dense[offset].get_or_insert_with(|| Cycle {
                time,
                events: pool.pop().unwrap_or_default(),
            });
            return &mut cycle.events;
        }
        let at = self.sparse.partition_point(|c| c.time > time);
        if self.sparse.get(at).is_none_or(|c| c.time != time) {
            let events = self.pool.pop().unwrap_or_default();
            self.sparse.insert(at, Cycle { time, events });
        }
        &mut self.sparse[at].events
    }

    /// End of the dense window (exclusive).
    fn horizon(&self) -> u64 {
        self.now.saturating_add(self.dense.len() as u64)
    }

    /// Pulls overflow buckets that now fall inside the dense window.
    fn refill(&mut self) -> usize {
        let mut pulled = 0;
        while self.sparse.last().is_some_and(|c| c.time < self.horizon()) {
            let Some(cycle) = self.sparse.pop() else {
                break;
            };
            let Ok(offset) = usize::try_from(cycle.time - self.now) else {
                break;
            };
            let slot = &mut self.dense[offset];
            let stale = match slot {
                None => {
                    *slot = Some(cycle);
                    None
                }
                Some(existing) => {
                    // Overflow events were scheduled first.
                    let mut events = cycle.events;
                    events.append(&mut existing.events);
                    Some(std::mem::replace(&mut existing.events, events))
                }
            };
            if let Some(stale) = stale {
                self.retire(stale);
            }
            pulled += 1;
        }
        pulled
    }

    /// Moves `now` to the earliest tracked bucket.
    fn compact(&mut self) {
        if self.dense.front().is_some_and(Option::is_some) {
            return;
        }
        let Some(skip) = self.dense.iter().position(Option::is_some) else {
            let Some(target) = self.sparse.last().map(|c| c.time) else {
                return;
            };
            let jump = target - self.now;
            self.now = target;
            let pulled = self.refill();
            tracing::trace!(jump, pulled, now = self.now, "wheel jumped to overflow");
            return;
        };
        self.dense.rotate_left(skip);
        self.now += skip as u64;
        let pulled = self.refill();
        tracing::trace!(skip, pulled, now = self.now, "wheel compacted");
    }

    /// Earliest bucket, after moving `now` to it. `None` when the wheel is
    /// empty.
    pub fn front(&mut self) -> Option<Front<'_, E>> {
        self.compact();
        let time = self.now;
        self.dense
            .front_mut()
            .and_then(Option::as_mut)
            .map(|cycle| Front {
                time,
                events: &mut cycle.events,
            })
    }

    /// Retires the earliest bucket and advances the window by one step.
    ///
    /// Returns the retired bucket's time. Remaining events in it are dropped.
    /// `now` moves to `time + 1`, not to the next occupied time, so callers
    /// can still schedule anything at or after `time + 1`.
    pub fn pop_front(&mut self) -> Result<u64, BusError> {
        self.compact();
        let Some(cycle) = self.dense.pop_front().flatten() else {
            self.dense.push_front(None);
            return Err(fatal::raise(BusError::SchedulerUnderflow));
        };
        self.dense.push_back(None);
        self.now += 1;
        self.retire(cycle.events);
        self.refill();
        debug_assert!(self.sparse.last().is_none_or(|c| c.time >= self.horizon()));
        Ok(cycle.time)
    }

    fn retire(&mut self, mut events: Vec<E>) {
        events.clear();
        if self.pool.len() < self.pool_limit {
            self.pool.push(events);
        }
    }

    /// Drops every event, keeping `now`.
    pub fn clear(&mut self) {
        let dense: Vec<Cycle<E>> = self.dense.iter_mut().filter_map(Option::take).collect();
        let sparse = std::mem::take(&mut self.sparse);
        for cycle in dense.into_iter().chain(sparse) {
            self.retire(cycle.events);
        }
    }

    /// Drops every event and rewinds `now` to zero.
    pub fn reset(&mut self) {
        self.clear();
        self.now = 0;
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn drain(wheel: &mut TimeWheel<u32>) -> Vec<(u64, Vec<u32>)> {
        let mut out = Vec::new();
        while let Some(mut front) = wheel.front() {
            let mut events = Vec::new();
            front.drain_into(&mut events);
            out.push((front.time(), events));
            wheel.pop_front().unwrap();
        }
        out
    }

    #[test]
    fn pops_in_time_then_insertion_order() {
        let mut wheel = TimeWheel::new(8);
        wheel.schedule(5, 1).unwrap();
        wheel.schedule(3, 2).unwrap();
        wheel.schedule(3, 3).unwrap();
        wheel.schedule(10, 4).unwrap();
        assert_eq!(wheel.len(), 3);
        assert_eq!(
            drain(&mut wheel),
            vec![(3, vec![2, 3]), (5, vec![1]), (10, vec![4])]
        );
        assert!(wheel.is_empty());
    }

    #[test]
    fn overflow_merges_back_without_loss() {
        let mut wheel = TimeWheel::new(4);
        for t in 0..4 {
            wheel.schedule(t, 100 + u32::try_from(t).unwrap()).unwrap();
        }
        wheel.schedule(10, 1).unwrap();
        assert_eq!(wheel.iter().count(), 5);
        for expected in 0..4 {
            assert_eq!(wheel.pop_front().unwrap(), expected);
        }
        wheel.schedule(10, 2).unwrap();
        let front = wheel.front().unwrap();
        assert_eq!(front.time(), 10);
        assert_eq!(front.events(), &[1, 2]);
    }

    #[test]
    fn pop_advances_by_one_step() {
        let mut wheel = TimeWheel::new(4);
        wheel.schedule(2, 7).unwrap();
        wheel.schedule(9, 8).unwrap();
        assert_eq!(wheel.pop_front().unwrap(), 2);
        assert_eq!(wheel.now(), 3);
        wheel.schedule(3, 9).unwrap();
        assert_eq!(wheel.next_time(), Some(3));
    }

    #[test]
    fn past_insertion_and_underflow_are_fatal() {
        let mut wheel: TimeWheel<u8> = TimeWheel::new(2);
        assert_eq!(wheel.pop_front(), Err(BusError::SchedulerUnderflow));
        assert_eq!(wheel.window(), 2);
        wheel.schedule(4, 0).unwrap();
        wheel.pop_front().unwrap();
        assert_eq!(
            wheel.schedule(1, 0),
            Err(BusError::SchedulerPastInsertion { time: 1, now: 5 })
        );
    }

    #[test]
    fn retired_buckets_are_pooled() {
        let mut wheel = TimeWheel::with_config(WheelConfig {
            dense_window: 4,
            pool_limit: 1,
        });
        wheel.schedule(0, 1u8).unwrap();
        wheel.schedule(1, 2).unwrap();
        wheel.pop_front().unwrap();
        wheel.pop_front().unwrap();
        assert_eq!(wheel.pooled(), 1);
        wheel.schedule(3, 3).unwrap();
        assert_eq!(wheel.pooled(), 0);
    }

    #[test]
    fn clear_keeps_now_and_reset_rewinds() {
        let mut wheel = TimeWheel::new(2);
        wheel.schedule(1, 'a').unwrap();
        wheel.schedule(50, 'b').unwrap();
        wheel.pop_front().unwrap();
        wheel.clear();
        assert!(wheel.is_empty());
        assert_eq!(wheel.now(), 2);
        wheel.reset();
        assert_eq!(wheel.now(), 0);
        assert_eq!(wheel.front().map(|f| f.time()), None);
    }
}
