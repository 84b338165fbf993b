// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Calls captured with their arguments for later delivery.

use std::fmt;
use std::rc::Rc;

use switchyard_core::{ArgList, BusError, ChannelHandle};

use crate::scheduler::{Event, Scheduler};

enum Target<A: ArgList, R: 'static> {
    Channel(ChannelHandle<A, R>),
    Function(Rc<dyn Fn(&A) -> R>),
}

/// A channel call (or plain function call) with its arguments bound.
pub struct DelayedCall<A: ArgList, R: 'static = ()> {
    target: Target<A, R>,
    args: A,
}

impl<A: ArgList, R: 'static> fmt::Debug for DelayedCall<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = match &self.target {
            Target::Channel(handle) => handle.name().to_owned(),
            Target::Function(_) => "<fn>".to_owned(),
        };
        f.debug_struct("DelayedCall")
            .field("target", &target)
            .field("args", &self.args)
            .finish()
    }
}

impl<A: ArgList, R: 'static> DelayedCall<A, R> {
    /// Binds `args` to a call through `handle`.
    pub fn new(handle: ChannelHandle<A, R>, args: A) -> Self {
        Self {
            target: Target::Channel(handle),
            args,
        }
    }

    /// Binds `args` to a call of `f`.
    pub fn from_fn(f: impl Fn(&A) -> R + 'static, args: A) -> Self {
        Self {
            target: Target::Function(Rc::new(f)),
            args,
        }
    }

    /// Bound arguments.
    pub fn args(&self) -> &A {
        &self.args
    }

    /// Performs the call now. Channel calls return one slot per subscriber;
    /// function calls return a single slot.
    pub fn call(self) -> Vec<Option<R>> {
        match self.target {
            Target::Channel(handle) => handle.call(self.args),
            Target::Function(f) => vec![Some(f(&self.args))],
        }
    }

    /// Wraps the call as a scheduler event; results are discarded.
    pub fn into_event(self) -> Event {
        Box::new(move || drop(self.call()))
    }
}

impl Scheduler {
    /// Schedules `call` at absolute time `time`.
    pub fn schedule_call<A: ArgList, R: 'static>(
        &self,
        time: u64,
        call: DelayedCall<A, R>,
    ) -> Result<(), BusError> {
        self.schedule_at(time, call.into_event())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use switchyard_core::Registrar;

    #[test]
    fn channel_call_is_delivered_at_its_time() {
        let reg = Registrar::new("reg");
        let ping = reg.publish::<(u32, String), ()>("ping", "timer").unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let sched = Scheduler::new();
        ping.observe("log", 0, move |(n, s)| {
            sink.borrow_mut().push(format!("{n}:{s}"));
        })
        .unwrap();
        sched
            .schedule_call(3, DelayedCall::new(ping, (7, "x".to_owned())))
            .unwrap();
        sched.run_until(2).unwrap();
        assert!(seen.borrow().is_empty());
        sched.run().unwrap();
        assert_eq!(*seen.borrow(), vec!["7:x"]);
    }

    #[test]
    fn function_call_returns_its_value() {
        let call = DelayedCall::from_fn(|(a, b): &(i32, i32)| a * b, (6, 7));
        assert_eq!(call.args(), &(6, 7));
        assert_eq!(call.call(), vec![Some(42)]);
    }
}
