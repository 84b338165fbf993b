// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared call logs for subscriber callbacks.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Append-only log shared between a test and the callbacks it installs.
pub struct Recorder<T> {
    log: Rc<RefCell<Vec<T>>>,
}

impl<T> Clone for Recorder<T> {
    fn clone(&self) -> Self {
        Self {
            log: Rc::clone(&self.log),
        }
    }
}

impl<T> Default for Recorder<T> {
    fn default() -> Self {
        Self {
            log: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Recorder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.log.borrow().iter()).finish()
    }
}

impl<T: 'static> Recorder<T> {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `value`.
    pub fn push(&self, value: T) {
        self.log.borrow_mut().push(value);
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.log.borrow().len()
    }

    /// True when nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.log.borrow().is_empty()
    }

    /// Empties the log.
    pub fn clear(&self) {
        self.log.borrow_mut().clear();
    }

    /// Closure that records `value` each time it runs, for subscribers whose
    /// arguments do not matter.
    pub fn mark<A: ?Sized + 'static>(&self, value: T) -> impl Fn(&A) + 'static
    where
        T: Clone,
    {
        let log = self.clone();
        move |_: &A| log.push(value.clone())
    }

    /// Closure that records `f(args)` each time it runs.
    pub fn map<A: ?Sized + 'static>(&self, f: impl Fn(&A) -> T + 'static) -> impl Fn(&A) + 'static {
        let log = self.clone();
        move |args: &A| log.push(f(args))
    }
}

impl<T: Clone> Recorder<T> {
    /// Copy of every entry.
    pub fn entries(&self) -> Vec<T> {
        self.log.borrow().clone()
    }

    /// Returns every entry and empties the log.
    pub fn take(&self) -> Vec<T> {
        std::mem::take(&mut *self.log.borrow_mut())
    }
}
