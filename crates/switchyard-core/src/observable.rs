// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Values that announce their own writes.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use crate::args::Arg;
use crate::error::BusError;
use crate::handle::ChannelHandle;
use crate::registrar::Registrar;

enum Notify<T: Arg> {
    Channel(ChannelHandle<(T,)>),
    Callback(Rc<dyn Fn(&T)>),
}

/// A value that is published on a `(T,)` channel, or handed to a callback,
/// every time a write guard is released.
pub struct Observable<T: Arg> {
    value: T,
    notify: Notify<T>,
}

impl<T: Arg> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = match &self.notify {
            Notify::Channel(handle) => handle.name().to_owned(),
            Notify::Callback(_) => "<callback>".to_owned(),
        };
        f.debug_struct("Observable")
            .field("value", &self.value)
            .field("notify", &target)
            .finish()
    }
}

impl<T: Arg> Observable<T> {
    /// Publishes writes through `handle`.
    pub fn on_channel(value: T, handle: ChannelHandle<(T,)>) -> Self {
        Self {
            value,
            notify: Notify::Channel(handle),
        }
    }

    /// Publishes writes on `registrar`'s `name` channel as `entity`.
    pub fn publish(
        registrar: &Registrar,
        name: &str,
        entity: &str,
        value: T,
    ) -> Result<Self, BusError> {
        Ok(Self::on_channel(value, registrar.publish(name, entity)?))
    }

    /// Hands every write to `f`.
    pub fn with_callback(value: T, f: impl Fn(&T) + 'static) -> Self {
        Self {
            value,
            notify: Notify::Callback(Rc::new(f)),
        }
    }

    /// Current value. Reading never notifies.
    pub fn read(&self) -> &T {
        &self.value
    }

    /// Mutable access; the new value is announced when the guard drops.
    pub fn write(&mut self) -> WriteGuard<'_, T> {
        WriteGuard { owner: self }
    }

    /// Replaces the value and announces it.
    pub fn set(&mut self, value: T) {
        *self.write() = value;
    }

    fn announce(&self) {
        match &self.notify {
            Notify::Channel(handle) => handle.emit((self.value.clone(),)),
            Notify::Callback(f) => f(&self.value),
        }
    }
}

/// Write access to an [`Observable`]. Announces the value on drop.
pub struct WriteGuard<'a, T: Arg> {
    owner: &'a mut Observable<T>,
}

impl<T: Arg> Deref for WriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.owner.value
    }
}

impl<T: Arg> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.owner.value
    }
}

impl<T: Arg> Drop for WriteGuard<'_, T> {
    fn drop(&mut self) {
        self.owner.announce();
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn guard_announces_once_on_drop() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut ob = Observable::with_callback(1, move |v: &i32| sink.borrow_mut().push(*v));
        {
            let mut w = ob.write();
            *w += 1;
            *w *= 10;
        }
        assert_eq!(*ob.read(), 20);
        ob.set(5);
        assert_eq!(*seen.borrow(), vec![20, 5]);
    }

    #[test]
    fn channel_subscribers_see_writes() {
        let reg = Registrar::new("reg");
        let mut speed = Observable::publish(&reg, "speed", "car", 0u32).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        reg.observe::<(u32,), ()>("speed", "dash", 0, move |(v,)| sink.borrow_mut().push(*v))
            .unwrap();
        speed.set(30);
        *speed.write() += 5;
        assert_eq!(*seen.borrow(), vec![30, 35]);
    }
}
