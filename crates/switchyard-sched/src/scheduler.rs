// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Run-to-completion event loop over a [`TimeWheel`].

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use switchyard_core::BusError;

use crate::config::WheelConfig;
use crate::wheel::TimeWheel;

/// Zero-argument deferred action.
pub type Event = Box<dyn FnOnce()>;

struct Inner {
    wheel: RefCell<TimeWheel<Event>>,
    scratch: RefCell<Vec<Event>>,
    executed: Cell<u64>,
}

/// Cloneable handle on a shared event loop.
///
/// Events may schedule further events through any clone, including at the
/// time currently being executed; those run within the same step.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<Inner>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::with_config(WheelConfig::default())
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("now", &self.now())
            .field("pending", &self.len())
            .field("executed", &self.events_executed())
            .finish()
    }
}

impl Scheduler {
    /// Scheduler with the default wheel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scheduler whose wheel is sized by `config`.
    pub fn with_config(config: WheelConfig) -> Self {
        Self {
            inner: Rc::new(Inner {
                wheel: RefCell::new(TimeWheel::with_config(config)),
                scratch: RefCell::new(Vec::new()),
                executed: Cell::new(0),
            }),
        }
    }

    /// Earliest time that may still be scheduled. While a step is running this
    /// is the time being executed.
    pub fn now(&self) -> u64 {
        self.inner.wheel.borrow().now()
    }

    /// Number of pending buckets.
    pub fn len(&self) -> usize {
        self.inner.wheel.borrow().len()
    }

    /// True when nothing is scheduled.
    pub fn is_empty(&self) -> bool {
        self.inner.wheel.borrow().is_empty()
    }

    /// Time of the next bucket to run.
    pub fn next_time(&self) -> Option<u64> {
        self.inner.wheel.borrow().next_time()
    }

    /// Total events run so far.
    pub fn events_executed(&self) -> u64 {
        self.inner.executed.get()
    }

    /// Runs `event` at absolute time `time`.
    pub fn schedule_at(&self, time: u64, event: impl FnOnce() + 'static) -> Result<(), BusError> {
        self.inner.wheel.borrow_mut().schedule(time, Box::new(event))
    }

    /// Runs `event` `delay` steps after [`Scheduler::now`].
    pub fn schedule_in(&self, delay: u64, event: impl FnOnce() + 'static) -> Result<(), BusError> {
        let time = self.now().saturating_add(delay);
        self.schedule_at(time, event)
    }

    /// Runs every event of the earliest bucket, including events scheduled
    /// into it while it runs, then retires it.
    ///
    /// Returns the bucket's time, or `None` when nothing was scheduled.
    pub fn step(&self) -> Result<Option<u64>, BusError> {
        let mut batch = std::mem::take(&mut *self.inner.scratch.borrow_mut());
        let mut time = None;
        loop {
            {
                let mut wheel = self.inner.wheel.borrow_mut();
                let Some(mut front) = wheel.front() else {
                    break;
                };
                // An event cleared the wheel; later buckets belong to later steps.
                if time.is_some_and(|t| t != front.time()) {
                    break;
                }
                time = Some(front.time());
                if front.is_empty() {
                    drop(front);
                    wheel.pop_front()?;
                    break;
                }
                front.drain_into(&mut batch);
            }
            let ran = batch.len() as u64;
            for event in batch.drain(..) {
                event();
            }
            self.inner.executed.set(self.inner.executed.get() + ran);
        }
        *self.inner.scratch.borrow_mut() = batch;
        Ok(time)
    }

    /// Steps while the next bucket is due at or before `until`.
    ///
    /// Returns the number of buckets run. Buckets later than `until` are left
    /// in place and `now` does not move past them.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn run_until(&self, until: u64) -> Result<usize, BusError> {
        let mut steps = 0;
        while self.next_time().is_some_and(|next| next <= until) {
            self.step()?;
            steps += 1;
        }
        tracing::trace!(steps, now = self.now(), "run_until finished");
        Ok(steps)
    }

    /// Steps until nothing is scheduled. Returns the number of buckets run.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn run(&self) -> Result<usize, BusError> {
        let mut steps = 0;
        while self.step()?.is_some() {
            steps += 1;
        }
        tracing::trace!(steps, executed = self.events_executed(), "run finished");
        Ok(steps)
    }

    /// Drops every pending event without running it.
    pub fn clear(&self) {
        self.inner.wheel.borrow_mut().clear();
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn same_time_events_run_in_the_current_step() {
        let sched = Scheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let (s, l) = (sched.clone(), Rc::clone(&log));
        sched
            .schedule_at(2, move || {
                l.borrow_mut().push("first");
                let l2 = Rc::clone(&l);
                s.schedule_in(0, move || l2.borrow_mut().push("again")).unwrap();
            })
            .unwrap();
        assert_eq!(sched.step().unwrap(), Some(2));
        assert_eq!(*log.borrow(), vec!["first", "again"]);
        assert_eq!(sched.events_executed(), 2);
        assert_eq!(sched.now(), 3);
        assert_eq!(sched.step().unwrap(), None);
    }

    #[test]
    fn run_until_stops_before_later_buckets() {
        let sched = Scheduler::new();
        let hits = Rc::new(Cell::new(0));
        for t in [1, 4, 9] {
            let h = Rc::clone(&hits);
            sched.schedule_at(t, move || h.set(h.get() + 1)).unwrap();
        }
        assert_eq!(sched.run_until(5).unwrap(), 2);
        assert_eq!(hits.get(), 2);
        assert_eq!(sched.now(), 5);
        sched.schedule_at(6, || {}).unwrap();
        assert_eq!(sched.run().unwrap(), 2);
        assert!(sched.is_empty());
    }
}
