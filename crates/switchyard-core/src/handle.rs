// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Typed channel handles.

use std::fmt;
use std::rc::Rc;

use crate::args::{describe, ArgList, Projection};
use crate::channel::{Channel, ChannelInfo, Hook};
use crate::error::BusError;
use crate::fatal;
use crate::ident::{Label, Signature};
use crate::registrar::TraceNode;

/// Small, cloneable capability to call or subscribe to one channel.
///
/// `A` is the argument tuple, `R` the per-subscriber return type. Every call
/// made through the handle is tagged with its `source` label in debug output.
pub struct ChannelHandle<A: ArgList, R: 'static = ()> {
    source: Label,
    channel: Rc<Channel<A, R>>,
}

impl<A: ArgList, R: 'static> Clone for ChannelHandle<A, R> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            channel: Rc::clone(&self.channel),
        }
    }
}

impl<A: ArgList, R: 'static> PartialEq for ChannelHandle<A, R> {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && Rc::ptr_eq(&self.channel, &other.channel)
    }
}

impl<A: ArgList, R: 'static> Eq for ChannelHandle<A, R> {}

impl<A: ArgList, R: 'static> fmt::Debug for ChannelHandle<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("registrar", &self.channel.registrar())
            .field("name", &self.channel.name())
            .field("source", &self.source.as_str())
            .field("signature", &self.channel.signature().to_string())
            .finish()
    }
}

impl<A: ArgList, R: 'static> ChannelHandle<A, R> {
    pub(crate) fn new(source: Label, channel: Rc<Channel<A, R>>) -> Self {
        Self { source, channel }
    }

    pub(crate) fn channel(&self) -> &Rc<Channel<A, R>> {
        &self.channel
    }

    /// Invokes every subscriber and returns one slot per subscriber.
    ///
    /// Returns an empty vector when nobody is subscribed or `R` is `()`.
    pub fn call(&self, args: A) -> Vec<Option<R>> {
        self.channel.dispatch(&self.source, &args, true)
    }

    /// Invokes every subscriber and discards their results. Resolvers do not
    /// run.
    pub fn emit(&self, args: A) {
        self.channel.dispatch(&self.source, &args, false);
    }

    /// Label this handle stamps on its calls.
    pub fn source(&self) -> &str {
        self.source.as_str()
    }

    /// Channel name.
    pub fn name(&self) -> &str {
        self.channel.name()
    }

    /// Owning registrar's name.
    pub fn registrar(&self) -> &str {
        self.channel.registrar()
    }

    /// Declared signature.
    pub fn signature(&self) -> &Signature {
        self.channel.signature()
    }

    /// Number of live subscribers.
    pub fn num_subscribers(&self) -> usize {
        self.channel.num_subscribers()
    }

    /// Number of live resolvers.
    pub fn num_resolvers(&self) -> usize {
        self.channel.num_resolvers()
    }

    /// Subscriber labels in dispatch order.
    pub fn subscribers(&self) -> Vec<String> {
        self.channel.subscribers()
    }

    /// Whether calls are echoed to the registrar's log sink.
    pub fn debug(&self) -> bool {
        self.channel.debug()
    }

    /// Turns call echoing on or off for the whole channel.
    pub fn set_debug(&self, on: bool) {
        self.channel.set_debug(on);
    }

    /// Same handle with a different source label.
    pub fn with_source(&self, source: &str) -> Self {
        Self {
            source: self.channel.env().intern(source),
            channel: Rc::clone(&self.channel),
        }
    }

    /// True when both handles reach the same subscriber list (same channel,
    /// or aliased channels).
    pub fn shares_with(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.channel, &other.channel) || self.channel.shares_with(&other.channel)
    }

    pub(crate) fn attach(&self, label: &str, group: i32, hook: Hook<A, R>) -> Result<(), BusError> {
        let env = self.channel.env();
        let label = env.intern(label);
        self.channel.insert_hook(hook, label.clone(), group)?;
        env.trace(
            TraceNode::Channel(self.channel.name()),
            TraceNode::Entity(label.as_str()),
            self.channel.signature(),
        );
        Ok(())
    }

    /// Adds a subscriber whose return value is reported as-is.
    pub fn subscribe(
        &self,
        label: &str,
        group: i32,
        f: impl Fn(&A) -> R + 'static,
    ) -> Result<(), BusError> {
        self.attach(label, group, Rc::new(move |args: &A| Some(f(args))))
    }

    /// Adds a subscriber that may decline to answer by returning `None`.
    pub fn subscribe_opt(
        &self,
        label: &str,
        group: i32,
        f: impl Fn(&A) -> Option<R> + 'static,
    ) -> Result<(), BusError> {
        self.attach(label, group, Rc::new(f))
    }

    /// Adds a subscriber whose return value converts into `R`.
    pub fn subscribe_into<T: Into<R> + 'static>(
        &self,
        label: &str,
        group: i32,
        f: impl Fn(&A) -> T + 'static,
    ) -> Result<(), BusError> {
        self.attach(label, group, Rc::new(move |args: &A| Some(f(args).into())))
    }

    /// Adds a subscriber that returns nothing; its result slot is always
    /// `None`.
    pub fn observe(
        &self,
        label: &str,
        group: i32,
        f: impl Fn(&A) + 'static,
    ) -> Result<(), BusError> {
        self.attach(label, group, Rc::new(move |args: &A| {
            f(args);
            None
        }))
    }

    /// Adds a subscriber that takes an ordered subsequence `B` of the
    /// channel's arguments.
    pub fn subscribe_subset<B: ArgList>(
        &self,
        label: &str,
        group: i32,
        f: impl Fn(&B) -> R + 'static,
    ) -> Result<(), BusError> {
        let Some(projection) = Projection::of::<A, B>() else {
            return Err(fatal::raise(BusError::AdapterArityViolation {
                name: self.name().to_owned(),
                channel: describe::<A>(),
                requested: describe::<B>(),
            }));
        };
        self.attach(
            label,
            group,
            Rc::new(move |args: &A| projection.apply::<A, B>(args).map(|picked| f(&picked))),
        )
    }

    /// Removes the first subscriber labelled `label`.
    ///
    /// Unknown labels are a no-op (`Ok(false)`); an empty label is fatal.
    pub fn unsubscribe(&self, label: &str) -> Result<bool, BusError> {
        self.channel.remove_hook(label)
    }

    /// Removes the subscriber at dispatch position `index`.
    pub fn unsubscribe_at(&self, index: usize) -> bool {
        self.channel.remove_hook_at(index)
    }

    /// Adds an observer of the full result vector. Runs after a call that
    /// collected at least one result slot.
    pub fn resolve(
        &self,
        label: &str,
        group: i32,
        f: impl Fn(&[Option<R>]) + 'static,
    ) -> Result<(), BusError> {
        let label = self.channel.env().intern(label);
        self.channel.insert_resolver(Rc::new(f), label, group)
    }

    /// Removes the first resolver labelled `label`.
    pub fn unresolve(&self, label: &str) -> Result<bool, BusError> {
        self.channel.remove_resolver(label)
    }

    /// Drops every subscriber and resolver of the channel.
    pub fn clear(&self) -> Result<(), BusError> {
        self.channel.clear()
    }
}
