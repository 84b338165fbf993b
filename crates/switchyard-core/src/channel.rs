// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Channel: ordered subscriber list plus dispatch.
//!
//! Subscribers are kept sorted by ascending group; equal groups keep
//! subscription order. While a pass over a list is running, removals are
//! recorded by index and applied once the outermost pass finishes, and
//! insertions are rejected. A subscriber removed mid-pass therefore still runs
//! in the current pass and is gone from the next one.

use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::args::ArgList;
use crate::error::BusError;
use crate::fatal;
use crate::ident::{Label, Signature};
use crate::registrar::{BusEnv, Registrar};

/// Stored subscriber: `None` means "no value this call".
pub(crate) type Hook<A, R> = Rc<dyn Fn(&A) -> Option<R>>;

/// Observer of the full result vector of one dispatch.
pub(crate) type Resolver<R> = Rc<dyn Fn(&[Option<R>])>;

#[derive(Clone)]
pub(crate) struct Entry<C> {
    callback: C,
    label: Label,
    group: i32,
}

impl<C> Entry<C> {
    pub(crate) fn new(callback: C, label: Label, group: i32) -> Self {
        Self {
            callback,
            label,
            group,
        }
    }
}

/// Group-ordered list with deferred removal.
pub(crate) struct Roster<C> {
    entries: RefCell<Vec<Entry<C>>>,
    depth: Cell<u32>,
    doomed: RefCell<Vec<usize>>,
}

impl<C: Clone> Roster<C> {
    fn new() -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
            depth: Cell::new(0),
            doomed: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Entries not pending removal.
    pub(crate) fn live(&self) -> usize {
        self.len() - self.doomed.borrow().len()
    }

    /// True while at least one pass is iterating the list.
    pub(crate) fn busy(&self) -> bool {
        self.depth.get() > 0
    }

    /// Upper-bound insert on `group`. Callers check [`Roster::busy`] first.
    fn insert(&self, entry: Entry<C>) {
        let mut entries = self.entries.borrow_mut();
        let at = entries.partition_point(|e| e.group <= entry.group);
        entries.insert(at, entry);
    }

    fn get(&self, index: usize) -> Option<C> {
        self.entries.borrow().get(index).map(|e| e.callback.clone())
    }

    fn labels(&self) -> Vec<String> {
        let doomed = self.doomed.borrow();
        self.entries
            .borrow()
            .iter()
            .enumerate()
            .filter(|(index, _)| !doomed.contains(index))
            .map(|(_, e)| e.label.as_str().to_owned())
            .collect()
    }

    /// Removes the first live entry labelled `label`. Unknown labels are a
    /// no-op.
    fn remove_label(&self, label: &str) -> bool {
        self.remove_first(|e| e.label.as_str() == label)
    }

    /// Removes the first live entry matching `pred`.
    fn remove_first(&self, pred: impl Fn(&Entry<C>) -> bool) -> bool {
        let found = {
            let doomed = self.doomed.borrow();
            self.entries
                .borrow()
                .iter()
                .enumerate()
                .position(|(index, e)| pred(e) && !doomed.contains(&index))
        };
        found.is_some_and(|index| self.remove_at(index))
    }

    /// Removes the entry at `index` (snapshot position). Out-of-range or
    /// already-removed indices are a no-op.
    fn remove_at(&self, index: usize) -> bool {
        if index >= self.len() || self.doomed.borrow().contains(&index) {
            return false;
        }
        self.doomed.borrow_mut().push(index);
        if !self.busy() {
            self.compact();
        }
        true
    }

    fn compact(&self) {
        let mut doomed = std::mem::take(&mut *self.doomed.borrow_mut());
        if doomed.is_empty() {
            return;
        }
        doomed.sort_unstable_by(|a, b| b.cmp(a));
        let mut entries = self.entries.borrow_mut();
        for index in doomed {
            if index < entries.len() {
                entries.remove(index);
            }
        }
    }

    fn enter(&self) -> Pass<'_, C> {
        self.depth.set(self.depth.get() + 1);
        Pass { roster: self }
    }

    /// Merges `other`'s entries into this list, keeping group order.
    fn absorb(&self, other: &Self) {
        let incoming = other.entries.borrow().clone();
        for entry in incoming {
            self.insert(entry);
        }
    }

    fn clear(&self) {
        self.entries.borrow_mut().clear();
        self.doomed.borrow_mut().clear();
    }
}

/// Active iteration over a roster; compacts on exit from the outermost pass.
struct Pass<'a, C: Clone> {
    roster: &'a Roster<C>,
}

impl<C: Clone> Drop for Pass<'_, C> {
    fn drop(&mut self) {
        let depth = self.roster.depth.get().saturating_sub(1);
        self.roster.depth.set(depth);
        if depth == 0 {
            self.roster.compact();
        }
    }
}

/// Subscriber and resolver lists. Shared between aliased channels.
pub(crate) struct HookTable<A, R> {
    hooks: Roster<Hook<A, R>>,
    resolvers: Roster<Resolver<R>>,
}

impl<A: 'static, R: 'static> HookTable<A, R> {
    fn new() -> Self {
        Self {
            hooks: Roster::new(),
            resolvers: Roster::new(),
        }
    }

    /// True while either list is being iterated.
    fn dispatching(&self) -> bool {
        self.hooks.busy() || self.resolvers.busy()
    }
}

/// Read-only view of a channel, independent of its signature.
pub trait ChannelInfo {
    /// Channel name.
    fn name(&self) -> &str;
    /// Name of the owning registrar.
    fn registrar(&self) -> &str;
    /// Declared signature.
    fn signature(&self) -> &Signature;
    /// Number of live subscribers.
    fn num_subscribers(&self) -> usize;
    /// Subscriber labels in dispatch order.
    fn subscribers(&self) -> Vec<String>;
    /// Whether invocations are echoed to the log sink.
    fn debug(&self) -> bool;
    /// Sets the debug flag.
    fn set_debug(&self, on: bool);
    /// Removes the subscriber at `index`; `false` when there is none.
    fn erase(&self, index: usize) -> bool;
}

/// Registrar-side handle on a channel of unknown signature.
pub(crate) trait ChannelEntry: ChannelInfo {
    fn info(&self) -> &dyn ChannelInfo;
    fn into_any(self: Rc<Self>) -> Rc<dyn Any>;
    fn remove_label(&self, label: &str) -> Result<bool, BusError>;
    fn alias_into(&self, other: &Registrar) -> Result<(), BusError>;
}

/// One named, typed dispatch point. Built only by a [`Registrar`].
pub(crate) struct Channel<A, R> {
    name: Rc<str>,
    env: Rc<BusEnv>,
    signature: Signature,
    debug: Cell<bool>,
    table: RefCell<Rc<HookTable<A, R>>>,
}

impl<A: ArgList, R: 'static> Channel<A, R> {
    pub(crate) fn new(name: &str, env: Rc<BusEnv>) -> Self {
        let debug = env.config().debug;
        Self {
            name: Rc::from(name),
            env,
            signature: Signature::of::<A, R>(),
            debug: Cell::new(debug),
            table: RefCell::new(Rc::new(HookTable::new())),
        }
    }

    pub(crate) fn env(&self) -> &Rc<BusEnv> {
        &self.env
    }

    fn table(&self) -> Rc<HookTable<A, R>> {
        Rc::clone(&self.table.borrow())
    }

    fn reentrancy(&self, op: &'static str) -> BusError {
        fatal::raise(BusError::ReentrancyViolation {
            name: self.name.to_string(),
            op,
        })
    }

    /// Runs every subscriber, then the resolvers when results were collected.
    pub(crate) fn dispatch(&self, source: &Label, args: &A, collect: bool) -> Vec<Option<R>> {
        if self.debug.get() {
            self.env.debug_line(&format!(
                "{source} -> {}.{}({})",
                self.env.name(),
                self.name,
                args.render()
            ));
        }
        let table = self.table();
        if table.hooks.is_empty() {
            return Vec::new();
        }
        let collect = collect && TypeId::of::<R>() != TypeId::of::<()>();
        let mut results = Vec::with_capacity(if collect { table.hooks.len() } else { 0 });
        {
            let _pass = table.hooks.enter();
            for index in 0..table.hooks.len() {
                let Some(hook) = table.hooks.get(index) else {
                    break;
                };
                let out = hook(args);
                if collect {
                    results.push(out);
                }
            }
        }
        if !results.is_empty() && !table.resolvers.is_empty() {
            let _pass = table.resolvers.enter();
            for index in 0..table.resolvers.len() {
                if let Some(resolver) = table.resolvers.get(index) {
                    resolver(&results);
                }
            }
        }
        results
    }

    pub(crate) fn insert_hook(
        &self,
        hook: Hook<A, R>,
        label: Label,
        group: i32,
    ) -> Result<(), BusError> {
        let table = self.table();
        if table.dispatching() {
            return Err(self.reentrancy("subscribe"));
        }
        table.hooks.insert(Entry::new(hook, label, group));
        Ok(())
    }

    pub(crate) fn insert_resolver(
        &self,
        resolver: Resolver<R>,
        label: Label,
        group: i32,
    ) -> Result<(), BusError> {
        let table = self.table();
        if table.dispatching() {
            return Err(self.reentrancy("resolve"));
        }
        table.resolvers.insert(Entry::new(resolver, label, group));
        Ok(())
    }

    pub(crate) fn remove_hook(&self, label: &str) -> Result<bool, BusError> {
        if label.is_empty() {
            return Err(fatal::raise(BusError::UnnamedRemoval {
                name: self.name.to_string(),
            }));
        }
        Ok(self.table().hooks.remove_label(label))
    }

    /// Removes the subscriber whose callback is `hook` itself, wherever the
    /// list now lives (aliasing may have moved it).
    pub(crate) fn remove_hook_ref(&self, hook: &Hook<A, R>) -> bool {
        let target = Rc::as_ptr(hook).cast::<()>();
        self.table()
            .hooks
            .remove_first(|e| Rc::as_ptr(&e.callback).cast::<()>() == target)
    }

    pub(crate) fn remove_hook_at(&self, index: usize) -> bool {
        self.table().hooks.remove_at(index)
    }

    pub(crate) fn remove_resolver(&self, label: &str) -> Result<bool, BusError> {
        if label.is_empty() {
            return Err(fatal::raise(BusError::UnnamedRemoval {
                name: self.name.to_string(),
            }));
        }
        Ok(self.table().resolvers.remove_label(label))
    }

    pub(crate) fn num_resolvers(&self) -> usize {
        self.table().resolvers.live()
    }

    /// Drops every subscriber and resolver.
    pub(crate) fn clear(&self) -> Result<(), BusError> {
        let table = self.table();
        if table.dispatching() {
            return Err(self.reentrancy("clear"));
        }
        table.hooks.clear();
        table.resolvers.clear();
        Ok(())
    }

    /// Pulls `other`'s lists into ours and makes `other` share them.
    pub(crate) fn share_with(&self, other: &Self) -> Result<(), BusError> {
        let mine = self.table();
        let theirs = other.table();
        if Rc::ptr_eq(&mine, &theirs) {
            return Ok(());
        }
        if mine.dispatching() || theirs.dispatching() {
            return Err(self.reentrancy("alias"));
        }
        mine.hooks.absorb(&theirs.hooks);
        mine.resolvers.absorb(&theirs.resolvers);
        *other.table.borrow_mut() = mine;
        tracing::debug!(
            channel = %self.name,
            registrar = %self.env.name(),
            other = %other.env.name(),
            subscribers = self.table().hooks.len(),
            "channel aliased"
        );
        Ok(())
    }

    /// True when both channels dispatch through the same lists.
    pub(crate) fn shares_with(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.table(), &other.table())
    }
}

impl<A: ArgList, R: 'static> ChannelInfo for Channel<A, R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn registrar(&self) -> &str {
        self.env.name()
    }

    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn num_subscribers(&self) -> usize {
        self.table().hooks.live()
    }

    fn subscribers(&self) -> Vec<String> {
        self.table().hooks.labels()
    }

    fn debug(&self) -> bool {
        self.debug.get()
    }

    fn set_debug(&self, on: bool) {
        self.debug.set(on);
    }

    fn erase(&self, index: usize) -> bool {
        self.remove_hook_at(index)
    }
}

impl<A: ArgList, R: 'static> ChannelEntry for Channel<A, R> {
    fn info(&self) -> &dyn ChannelInfo {
        self
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }

    fn remove_label(&self, label: &str) -> Result<bool, BusError> {
        self.remove_hook(label)
    }

    fn alias_into(&self, other: &Registrar) -> Result<(), BusError> {
        let theirs = other.channel::<A, R>(&self.name)?;
        self.share_with(&theirs)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn roster(groups: &[(&str, i32)]) -> Roster<u32> {
        let roster = Roster::new();
        let mut table = crate::ident::NameTable::new();
        for (n, (label, group)) in groups.iter().enumerate() {
            roster.insert(Entry::new(u32::try_from(n).unwrap(), table.intern(label), *group));
        }
        roster
    }

    #[test]
    fn insert_is_stable_within_groups() {
        let r = roster(&[("a", 1), ("b", -1), ("c", 0), ("d", 0)]);
        assert_eq!(r.labels(), vec!["b", "c", "d", "a"]);
    }

    #[test]
    fn removal_inside_a_pass_is_deferred() {
        let r = roster(&[("a", 0), ("b", 0), ("c", 0)]);
        {
            let _pass = r.enter();
            assert!(r.remove_label("b"));
            assert!(!r.remove_label("b"));
            assert_eq!(r.len(), 3);
            assert_eq!(r.labels(), vec!["a", "c"]);
        }
        assert_eq!(r.len(), 2);
        assert_eq!(r.get(1), Some(2));
    }

    #[test]
    fn nested_passes_compact_once_at_the_outermost_exit() {
        let r = roster(&[("a", 0), ("b", 0)]);
        let outer = r.enter();
        {
            let _inner = r.enter();
            assert!(r.remove_at(0));
        }
        assert_eq!(r.len(), 2);
        drop(outer);
        assert_eq!(r.labels(), vec!["b"]);
    }

    #[test]
    fn removing_unknown_targets_is_a_no_op() {
        let r = roster(&[("a", 0)]);
        assert!(!r.remove_label("zzz"));
        assert!(!r.remove_at(7));
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn absorb_keeps_group_order() {
        let left = roster(&[("a", 0), ("b", 2)]);
        let right = roster(&[("c", 1), ("d", -1)]);
        left.absorb(&right);
        assert_eq!(left.labels(), vec!["d", "a", "c", "b"]);
    }
}
