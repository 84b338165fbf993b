// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Registrar: the namespace that owns named channels and their views.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::args::{describe, ArgList, Projection};
use crate::channel::{Channel, ChannelEntry, ChannelInfo, Hook};
use crate::config::BusConfig;
use crate::error::BusError;
use crate::fatal;
use crate::handle::ChannelHandle;
use crate::ident::{Label, NameTable, Signature};
use crate::sink::{LogSink, TracingSink};
use crate::view::{view_key, PendingHook, PendingSubscription, View};

/// Endpoint reported to trace observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceNode<'a> {
    /// A named channel.
    Channel(&'a str),
    /// A publisher or subscriber label.
    Entity(&'a str),
}

impl TraceNode<'_> {
    /// Name carried by the node.
    pub fn name(&self) -> &str {
        match self {
            Self::Channel(name) | Self::Entity(name) => name,
        }
    }
}

/// Observer of every publish (`Entity -> Channel`) and subscribe
/// (`Channel -> Entity`) edge.
pub type Tracer = Rc<dyn Fn(TraceNode<'_>, TraceNode<'_>, &Signature)>;

/// State shared by a registrar and every channel it creates.
pub(crate) struct BusEnv {
    name: Rc<str>,
    config: Cell<BusConfig>,
    sink: RefCell<Rc<dyn LogSink>>,
    tracers: RefCell<Vec<Tracer>>,
    names: RefCell<NameTable>,
}

impl BusEnv {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn config(&self) -> BusConfig {
        self.config.get()
    }

    pub(crate) fn debug_line(&self, line: &str) {
        let sink = Rc::clone(&self.sink.borrow());
        sink.line(line);
    }

    pub(crate) fn intern(&self, text: &str) -> Label {
        self.names.borrow_mut().intern(text)
    }

    pub(crate) fn trace(&self, from: TraceNode<'_>, to: TraceNode<'_>, signature: &Signature) {
        let tracers = self.tracers.borrow().clone();
        for tracer in tracers {
            tracer(from, to, signature);
        }
    }
}

type ViewTable = FxHashMap<std::any::TypeId, Rc<dyn Any>>;

/// Owns a set of named channels.
///
/// The first use of a name fixes its signature; any later use with another
/// signature raises [`BusError::SignatureMismatch`]. Channels live as long as
/// the registrar or any handle to them.
pub struct Registrar {
    env: Rc<BusEnv>,
    channels: RefCell<BTreeMap<String, Rc<dyn ChannelEntry>>>,
    views: RefCell<FxHashMap<String, ViewTable>>,
    pending: RefCell<FxHashMap<String, Vec<Box<dyn PendingSubscription>>>>,
}

impl fmt::Debug for Registrar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registrar")
            .field("name", &self.name())
            .field("channels", &self.channels.borrow().len())
            .field("pending", &self.num_pending())
            .finish_non_exhaustive()
    }
}

impl Registrar {
    /// Empty registrar with default settings.
    pub fn new(name: &str) -> Self {
        Self::with_config(name, BusConfig::default())
    }

    /// Empty registrar with explicit settings.
    pub fn with_config(name: &str, config: BusConfig) -> Self {
        Self {
            env: Rc::new(BusEnv {
                name: Rc::from(name),
                config: Cell::new(config),
                sink: RefCell::new(Rc::new(TracingSink)),
                tracers: RefCell::new(Vec::new()),
                names: RefCell::new(NameTable::new()),
            }),
            channels: RefCell::new(BTreeMap::new()),
            views: RefCell::new(FxHashMap::default()),
            pending: RefCell::new(FxHashMap::default()),
        }
    }

    /// Registrar name, used in debug lines and errors.
    pub fn name(&self) -> &str {
        self.env.name()
    }

    /// Current settings.
    pub fn config(&self) -> BusConfig {
        self.env.config()
    }

    /// Replaces the settings. Affects channels created afterwards.
    pub fn set_config(&self, config: BusConfig) {
        self.env.config.set(config);
    }

    /// Routes channel debug lines to `sink`.
    pub fn set_sink(&self, sink: Rc<dyn LogSink>) {
        *self.env.sink.borrow_mut() = sink;
    }

    /// Registers a trace observer.
    pub fn trace(&self, tracer: impl Fn(TraceNode<'_>, TraceNode<'_>, &Signature) + 'static) {
        self.env.tracers.borrow_mut().push(Rc::new(tracer));
    }

    /// Drops every trace observer.
    pub fn clear_tracers(&self) {
        self.env.tracers.borrow_mut().clear();
    }

    /// Forgets interned labels. Existing handles keep their text.
    pub fn reset_names(&self) {
        self.env.names.borrow_mut().reset();
    }

    /// Number of interned labels.
    pub fn num_names(&self) -> usize {
        self.env.names.borrow().len()
    }

    /// Number of channels created so far.
    pub fn len(&self) -> usize {
        self.channels.borrow().len()
    }

    /// True before any channel has been created.
    pub fn is_empty(&self) -> bool {
        self.channels.borrow().is_empty()
    }

    /// True when `name` has a channel.
    pub fn contains(&self, name: &str) -> bool {
        self.channels.borrow().contains_key(name)
    }

    /// Looks up `name`, creating it with signature `A -> R` on first use.
    pub(crate) fn channel<A: ArgList, R: 'static>(
        &self,
        name: &str,
    ) -> Result<Rc<Channel<A, R>>, BusError> {
        let existing = self.channels.borrow().get(name).cloned();
        if let Some(entry) = existing {
            let registered = entry.signature().to_string();
            return Rc::clone(&entry).into_any().downcast::<Channel<A, R>>().map_err(|_| {
                fatal::raise(BusError::SignatureMismatch {
                    name: name.to_owned(),
                    registered,
                    requested: Signature::of::<A, R>().to_string(),
                })
            });
        }
        let channel = Rc::new(Channel::<A, R>::new(name, Rc::clone(&self.env)));
        tracing::debug!(
            registrar = %self.env.name(),
            channel = name,
            signature = %channel.signature(),
            id = %channel.signature().id(),
            "channel created"
        );
        let entry: Rc<dyn ChannelEntry> = channel.clone();
        self.channels.borrow_mut().insert(name.to_owned(), entry);
        Ok(channel)
    }

    fn owns<A: ArgList, R: 'static>(&self, handle: &ChannelHandle<A, R>) -> Result<(), BusError> {
        if Rc::ptr_eq(handle.channel().env(), &self.env) {
            return Ok(());
        }
        Err(fatal::raise(BusError::RegistrarMismatch {
            name: handle.name().to_owned(),
            owner: handle.registrar().to_owned(),
            registrar: self.name().to_owned(),
        }))
    }

    /// Handle on `name` without reporting to trace observers or registering a
    /// view.
    pub fn find<A: ArgList, R: 'static>(
        &self,
        name: &str,
        source: &str,
    ) -> Result<ChannelHandle<A, R>, BusError> {
        let channel = self.channel::<A, R>(name)?;
        Ok(ChannelHandle::new(self.env.intern(source), channel))
    }

    /// Producer handle on `name`, tagged with `source`.
    ///
    /// Also registers the channel's own signature as a view, which attaches
    /// any adapted subscription waiting for it.
    pub fn publish<A: ArgList, R: 'static>(
        &self,
        name: &str,
        source: &str,
    ) -> Result<ChannelHandle<A, R>, BusError> {
        let handle = self.find::<A, R>(name, source)?;
        if self.config().trace_publishers {
            self.env.trace(
                TraceNode::Entity(source),
                TraceNode::Channel(name),
                handle.signature(),
            );
        }
        self.register_view::<A, R, A, R>(&handle, name)?;
        Ok(handle)
    }

    /// Subscribes `f` to `name` at `group` and returns its interned label,
    /// the key for a later [`Registrar::unsubscribe`].
    pub fn subscribe<A: ArgList, R: 'static>(
        &self,
        name: &str,
        label: &str,
        group: i32,
        f: impl Fn(&A) -> R + 'static,
    ) -> Result<Label, BusError> {
        let handle = self.find::<A, R>(name, "")?;
        handle.subscribe(label, group, f)?;
        self.register_view::<A, R, A, R>(&handle, name)?;
        Ok(self.env.intern(label))
    }

    /// Subscribes a callback that returns nothing; its result slot is always
    /// `None`.
    pub fn observe<A: ArgList, R: 'static>(
        &self,
        name: &str,
        label: &str,
        group: i32,
        f: impl Fn(&A) + 'static,
    ) -> Result<Label, BusError> {
        let handle = self.find::<A, R>(name, "")?;
        handle.observe(label, group, f)?;
        self.register_view::<A, R, A, R>(&handle, name)?;
        Ok(self.env.intern(label))
    }

    /// Subscribes `f`, which takes an ordered subsequence `B` of the channel
    /// arguments `A`.
    pub fn subscribe_subset<A: ArgList, R: 'static, B: ArgList>(
        &self,
        name: &str,
        label: &str,
        group: i32,
        f: impl Fn(&B) -> R + 'static,
    ) -> Result<Label, BusError> {
        let handle = self.find::<A, R>(name, "")?;
        handle.subscribe_subset(label, group, f)?;
        self.register_view::<A, R, B, R>(&handle, name)?;
        Ok(self.env.intern(label))
    }

    /// Adds a resolver to `name`.
    pub fn resolve<A: ArgList, R: 'static>(
        &self,
        name: &str,
        label: &str,
        group: i32,
        f: impl Fn(&[Option<R>]) + 'static,
    ) -> Result<(), BusError> {
        self.find::<A, R>(name, "")?.resolve(label, group, f)
    }

    /// Removes the first subscriber of `name` labelled `label`.
    ///
    /// Unknown channels and labels are a no-op; an empty label is fatal.
    pub fn unsubscribe(&self, name: &str, label: &str) -> Result<bool, BusError> {
        let entry = self.channels.borrow().get(name).cloned();
        match entry {
            Some(entry) => entry.remove_label(label),
            None if label.is_empty() => Err(fatal::raise(BusError::UnnamedRemoval {
                name: name.to_owned(),
            })),
            None => Ok(false),
        }
    }

    /// Subscribes `f` through the view of `name` with signature `B -> R2`, or
    /// queues it until such a view is registered.
    ///
    /// Results reach the channel's callers only when `R2` is the channel's
    /// return type; otherwise the slot is `None`. Use
    /// [`Registrar::subscribe_adapted_into`] for a return type that converts.
    pub fn subscribe_adapted<B: ArgList, R2: 'static>(
        &self,
        name: &str,
        label: &str,
        group: i32,
        f: impl Fn(&B) -> R2 + 'static,
    ) -> Result<Label, BusError> {
        let hook: Hook<B, R2> = Rc::new(move |args: &B| Some(f(args)));
        let label = self.env.intern(label);
        let view = self
            .views
            .borrow()
            .get(name)
            .and_then(|table| table.get(&view_key::<B, R2>()))
            .cloned();
        match view.as_ref().and_then(|v| v.downcast_ref::<View<B, R2>>()) {
            Some(view) => {
                view.attach(hook, label.clone(), group)?;
                self.env.trace(
                    TraceNode::Channel(name),
                    TraceNode::Entity(label.as_str()),
                    view.signature(),
                );
            }
            None => {
                tracing::debug!(
                    registrar = %self.env.name(),
                    channel = name,
                    label = %label,
                    requested = %Signature::of::<B, R2>(),
                    "subscription pending"
                );
                self.pending
                    .borrow_mut()
                    .entry(name.to_owned())
                    .or_default()
                    .push(Box::new(PendingHook::new(hook, label.clone(), group)));
            }
        }
        Ok(label)
    }

    /// Subscribes `f` through the view of `name` with signature `B -> R`,
    /// converting each result into `R`, the channel's return type.
    pub fn subscribe_adapted_into<B: ArgList, R: 'static, T: Into<R> + 'static>(
        &self,
        name: &str,
        label: &str,
        group: i32,
        f: impl Fn(&B) -> T + 'static,
    ) -> Result<Label, BusError> {
        self.subscribe_adapted::<B, R>(name, label, group, move |args: &B| f(args).into())
    }

    /// Registers a view of `handle`'s channel under `name` for subscribers of
    /// signature `B -> R2`, where `B` is an ordered subsequence of `A`.
    ///
    /// An existing view for the same signature is kept.
    pub fn register_view<A: ArgList, R: 'static, B: ArgList, R2: 'static>(
        &self,
        handle: &ChannelHandle<A, R>,
        name: &str,
    ) -> Result<(), BusError> {
        self.owns(handle)?;
        let key = view_key::<B, R2>();
        let known = self
            .views
            .borrow()
            .get(name)
            .is_some_and(|table| table.contains_key(&key));
        if !known {
            let Some(projection) = Projection::of::<A, B>() else {
                return Err(fatal::raise(BusError::AdapterArityViolation {
                    name: name.to_owned(),
                    channel: describe::<A>(),
                    requested: describe::<B>(),
                }));
            };
            let view: View<B, R2> = View::projected(Rc::clone(handle.channel()), projection);
            self.insert_view(name, key, Rc::new(view));
        }
        self.match_pending(name)
    }

    /// Registers a view of `handle`'s channel under `name` whose subscribers
    /// receive `transform(args)`.
    ///
    /// Replaces an existing view for the same signature.
    pub fn register_transform<A: ArgList, R: 'static, B: ArgList, R2: 'static>(
        &self,
        handle: &ChannelHandle<A, R>,
        name: &str,
        transform: impl Fn(&A) -> B + 'static,
    ) -> Result<(), BusError> {
        self.owns(handle)?;
        let key = view_key::<B, R2>();
        let view: View<B, R2> = View::transformed(Rc::clone(handle.channel()), Rc::new(transform));
        if self.insert_view(name, key, Rc::new(view)) {
            tracing::warn!(
                registrar = %self.env.name(),
                channel = name,
                view = %Signature::of::<B, R2>(),
                "resetting view"
            );
        }
        self.match_pending(name)
    }

    /// True when `name` has a view for signature `B -> R2`.
    pub fn has_view<B: ArgList, R2: 'static>(&self, name: &str) -> bool {
        self.views
            .borrow()
            .get(name)
            .is_some_and(|table| table.contains_key(&view_key::<B, R2>()))
    }

    /// Number of subscriptions still waiting for a view.
    pub fn num_pending(&self) -> usize {
        self.pending.borrow().values().map(Vec::len).sum()
    }

    /// Returns `true` when a previous view was replaced.
    fn insert_view(&self, name: &str, key: std::any::TypeId, view: Rc<dyn Any>) -> bool {
        self.views
            .borrow_mut()
            .entry(name.to_owned())
            .or_default()
            .insert(key, view)
            .is_some()
    }

    /// Attaches every pending subscription of `name` that now has a view.
    fn match_pending(&self, name: &str) -> Result<(), BusError> {
        let Some(waiting) = self.pending.borrow_mut().remove(name) else {
            return Ok(());
        };
        let mut still_waiting = Vec::new();
        let mut outcome = Ok(());
        for pending in waiting {
            let view = self
                .views
                .borrow()
                .get(name)
                .and_then(|table| table.get(&pending.key()))
                .cloned();
            let Some(view) = view.filter(|_| outcome.is_ok()) else {
                still_waiting.push(pending);
                continue;
            };
            let label = pending.label().to_owned();
            match pending.attach(&view) {
                Ok(()) => tracing::debug!(
                    registrar = %self.env.name(),
                    channel = name,
                    label = %label,
                    "pending subscription attached"
                ),
                Err((pending, err)) => {
                    still_waiting.push(pending);
                    outcome = Err(err);
                }
            }
        }
        if !still_waiting.is_empty() {
            self.pending
                .borrow_mut()
                .entry(name.to_owned())
                .or_default()
                .extend(still_waiting);
        }
        outcome
    }

    /// Merges this registrar's `name` channel with `other`'s, so a call
    /// through either reaches both subscriber lists. Pairwise only: aliasing
    /// `a` with `b` and `b` with `c` does not link `a` with `c`.
    pub fn alias(&self, other: &Self, name: &str) -> Result<(), BusError> {
        let entry = self.channels.borrow().get(name).cloned();
        let Some(entry) = entry else {
            return Err(fatal::raise(BusError::UnknownChannel {
                name: name.to_owned(),
                registrar: self.name().to_owned(),
            }));
        };
        entry.alias_into(other)
    }

    /// Calls `f` on every channel in name order.
    pub fn visit(&self, mut f: impl FnMut(&dyn ChannelInfo)) {
        let entries: Vec<Rc<dyn ChannelEntry>> = self.channels.borrow().values().cloned().collect();
        for entry in &entries {
            f(entry.info());
        }
    }

    /// Sets the debug flag on every existing channel.
    pub fn set_debug(&self, on: bool) {
        self.visit(|channel| channel.set_debug(on));
    }

    /// Wrapper that stamps `entity` as source and label on every call.
    pub fn client(&self, entity: &str) -> Client<'_> {
        Client {
            registrar: self,
            entity: entity.to_owned(),
        }
    }
}

/// Registrar wrapper bound to one entity name.
#[derive(Debug)]
pub struct Client<'r> {
    registrar: &'r Registrar,
    entity: String,
}

impl Client<'_> {
    /// Entity name used as source and label.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// See [`Registrar::publish`].
    pub fn publish<A: ArgList, R: 'static>(
        &self,
        name: &str,
    ) -> Result<ChannelHandle<A, R>, BusError> {
        self.registrar.publish(name, &self.entity)
    }

    /// See [`Registrar::subscribe`].
    pub fn subscribe<A: ArgList, R: 'static>(
        &self,
        name: &str,
        group: i32,
        f: impl Fn(&A) -> R + 'static,
    ) -> Result<Label, BusError> {
        self.registrar.subscribe(name, &self.entity, group, f)
    }

    /// See [`Registrar::observe`].
    pub fn observe<A: ArgList, R: 'static>(
        &self,
        name: &str,
        group: i32,
        f: impl Fn(&A) + 'static,
    ) -> Result<Label, BusError> {
        self.registrar.observe::<A, R>(name, &self.entity, group, f)
    }

    /// See [`Registrar::subscribe_adapted`].
    pub fn subscribe_adapted<B: ArgList, R2: 'static>(
        &self,
        name: &str,
        group: i32,
        f: impl Fn(&B) -> R2 + 'static,
    ) -> Result<Label, BusError> {
        self.registrar.subscribe_adapted(name, &self.entity, group, f)
    }

    /// See [`Registrar::subscribe_adapted_into`].
    pub fn subscribe_adapted_into<B: ArgList, R: 'static, T: Into<R> + 'static>(
        &self,
        name: &str,
        group: i32,
        f: impl Fn(&B) -> T + 'static,
    ) -> Result<Label, BusError> {
        self.registrar
            .subscribe_adapted_into::<B, R, T>(name, &self.entity, group, f)
    }

    /// See [`Registrar::resolve`].
    pub fn resolve<A: ArgList, R: 'static>(
        &self,
        name: &str,
        group: i32,
        f: impl Fn(&[Option<R>]) + 'static,
    ) -> Result<(), BusError> {
        self.registrar.resolve::<A, R>(name, &self.entity, group, f)
    }

    /// Removes this entity's first subscription to `name`.
    pub fn unsubscribe(&self, name: &str) -> Result<bool, BusError> {
        self.registrar.unsubscribe(name, &self.entity)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn channels_are_created_lazily_and_reused() {
        let reg = Registrar::new("reg");
        assert!(reg.is_empty());
        let a = reg.publish::<(i32,), ()>("x", "p").unwrap();
        let b = reg.find::<(i32,), ()>("x", "p").unwrap();
        assert_eq!(reg.len(), 1);
        assert_eq!(a, b);
        assert!(a.shares_with(&b));
        let c = b.with_source("q");
        assert_ne!(a, c);
    }

    #[test]
    fn visit_walks_channels_in_name_order() {
        let reg = Registrar::new("reg");
        reg.publish::<(), ()>("b", "").unwrap();
        reg.publish::<(u8,), bool>("a", "").unwrap();
        let seen = RefCell::new(Vec::new());
        reg.visit(|c| seen.borrow_mut().push((c.name().to_owned(), c.signature().to_string())));
        assert_eq!(
            seen.into_inner(),
            vec![
                ("a".to_owned(), "fn(u8) -> bool".to_owned()),
                ("b".to_owned(), "fn()".to_owned()),
            ]
        );
    }

    #[test]
    fn set_debug_reaches_every_channel() {
        let reg = Registrar::new("reg");
        let a = reg.publish::<(), ()>("a", "").unwrap();
        let b = reg.publish::<(i32,), ()>("b", "").unwrap();
        reg.set_debug(true);
        assert!(a.debug() && b.debug());
        reg.set_debug(false);
        assert!(!a.debug() && !b.debug());
    }

    #[test]
    fn config_debug_applies_to_new_channels() {
        let reg = Registrar::with_config(
            "reg",
            BusConfig {
                debug: true,
                trace_publishers: false,
            },
        );
        assert!(reg.publish::<(), ()>("a", "").unwrap().debug());
    }

    #[test]
    fn subscribe_returns_the_label_it_was_filed_under() {
        let reg = Registrar::new("reg");
        let label = reg.subscribe::<(u8,), u8>("echo", "mirror", 0, |(x,)| *x).unwrap();
        assert_eq!(label.as_str(), "mirror");
        let watcher = reg.observe::<(u8,), u8>("echo", "watch", 1, |_| {}).unwrap();
        assert_eq!(watcher.to_string(), "watch");
        assert_eq!(reg.unsubscribe("echo", label.as_str()), Ok(true));
        let echo = reg.find::<(u8,), u8>("echo", "").unwrap();
        assert_eq!(echo.subscribers(), vec!["watch"]);
    }

    #[test]
    fn unknown_unsubscribe_is_a_no_op() {
        let reg = Registrar::new("reg");
        assert_eq!(reg.unsubscribe("nope", "who"), Ok(false));
    }

    #[test]
    fn client_stamps_its_entity() {
        let reg = Registrar::new("reg");
        let client = reg.client("engine");
        let handle = client.publish::<(u32,), ()>("rpm").unwrap();
        assert_eq!(handle.source(), "engine");
        client.observe::<(u32,), ()>("rpm", 0, |_| {}).unwrap();
        assert_eq!(handle.subscribers(), vec!["engine"]);
        assert_eq!(client.unsubscribe("rpm"), Ok(true));
        assert_eq!(handle.num_subscribers(), 0);
    }
}
