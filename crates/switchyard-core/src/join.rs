// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Join combinator: fire once per round after every input has delivered.
//!
//! Each input channel gets an internal observer that stores its payload in a
//! flat slot array and sets its bit in the round mask. When the mask is full
//! the stored payloads are taken, the round is reset, and the downstream
//! callback receives the concatenation of every input's arguments in input
//! order. Redelivery before the round completes overwrites the input's slots.

use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::args::{describe, ArgList};
use crate::channel::{Channel, Hook};
use crate::error::BusError;
use crate::fatal;
use crate::handle::ChannelHandle;

/// Width of the round mask.
pub const MAX_JOIN_INPUTS: usize = 64;

trait JoinInput {
    fn type_ids(&self) -> Vec<TypeId>;
    fn type_names(&self) -> Vec<&'static str>;
    fn connect(
        &self,
        entity: &str,
        bit: u32,
        offset: usize,
        state: Weak<JoinState>,
    ) -> Result<Box<dyn Connection>, BusError>;
}

/// An internal observer attached to one input channel.
trait Connection {
    /// Unsubscribes the observer; `false` when it was already gone.
    fn disconnect(&self) -> bool;
}

struct Input<A: ArgList, R: 'static> {
    handle: ChannelHandle<A, R>,
}

impl<A: ArgList, R: 'static> JoinInput for Input<A, R> {
    fn type_ids(&self) -> Vec<TypeId> {
        A::type_ids()
    }

    fn type_names(&self) -> Vec<&'static str> {
        A::type_names()
    }

    fn connect(
        &self,
        entity: &str,
        bit: u32,
        offset: usize,
        state: Weak<JoinState>,
    ) -> Result<Box<dyn Connection>, BusError> {
        let hook: Hook<A, R> = Rc::new(move |args: &A| {
            if let Some(state) = state.upgrade() {
                state.deliver(bit, offset, args.clone().into_parts());
            }
            None
        });
        self.handle.attach(entity, 0, Rc::clone(&hook))?;
        Ok(Box::new(Wire {
            channel: Rc::clone(self.handle.channel()),
            hook,
        }))
    }
}

struct Wire<A: ArgList, R: 'static> {
    channel: Rc<Channel<A, R>>,
    hook: Hook<A, R>,
}

impl<A: ArgList, R: 'static> Connection for Wire<A, R> {
    fn disconnect(&self) -> bool {
        self.channel.remove_hook_ref(&self.hook)
    }
}

struct JoinState {
    mask: Cell<u64>,
    full: u64,
    slots: RefCell<Vec<Option<Box<dyn Any>>>>,
    fire: Box<dyn Fn(Vec<Box<dyn Any>>)>,
    on_complete: Option<Box<dyn Fn()>>,
    rounds: Cell<u64>,
}

impl JoinState {
    fn deliver(&self, bit: u32, offset: usize, parts: Vec<Box<dyn Any>>) {
        {
            let mut slots = self.slots.borrow_mut();
            for (index, part) in parts.into_iter().enumerate() {
                if let Some(slot) = slots.get_mut(offset + index) {
                    *slot = Some(part);
                }
            }
        }
        let mask = self.mask.get() | (1u64 << bit);
        self.mask.set(mask);
        if mask != self.full {
            return;
        }
        let payload = self.take();
        self.rounds.set(self.rounds.get() + 1);
        if let Some(payload) = payload {
            (self.fire)(payload);
        }
        if let Some(done) = &self.on_complete {
            done();
        }
    }

    /// Empties every slot and clears the mask; returns the payload when every
    /// slot was filled.
    fn take(&self) -> Option<Vec<Box<dyn Any>>> {
        self.mask.set(0);
        self.slots
            .borrow_mut()
            .iter_mut()
            .map(Option::take)
            .collect()
    }
}

/// Collects join inputs, then wires them to a downstream callback.
pub struct JoinBuilder {
    entity: String,
    inputs: Vec<Box<dyn JoinInput>>,
    on_complete: Option<Box<dyn Fn()>>,
}

impl fmt::Debug for JoinBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinBuilder")
            .field("entity", &self.entity)
            .field("inputs", &self.inputs.len())
            .finish_non_exhaustive()
    }
}

impl JoinBuilder {
    /// Starts a join whose internal observers are labelled `entity`.
    pub fn new(entity: &str) -> Self {
        Self {
            entity: entity.to_owned(),
            inputs: Vec::new(),
            on_complete: None,
        }
    }

    /// Adds an input channel. Its arguments follow the previous inputs'
    /// arguments in the downstream tuple.
    pub fn input<A: ArgList, R: 'static>(mut self, handle: &ChannelHandle<A, R>) -> Self {
        self.inputs.push(Box::new(Input {
            handle: handle.clone(),
        }));
        self
    }

    /// Callback run after each fire.
    pub fn on_complete(mut self, f: impl Fn() + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    /// Subscribes to every input and returns the join's handle.
    ///
    /// `T` must be exactly the concatenation of the inputs' argument lists.
    /// The join stays wired only while the returned handle is alive.
    pub fn build<T: ArgList>(self, f: impl Fn(T) + 'static) -> Result<JoinHandle, BusError> {
        self.check_capacity()?;
        let declared: Vec<TypeId> = self.inputs.iter().flat_map(|i| i.type_ids()).collect();
        if declared != T::type_ids() {
            let names: Vec<&str> = self.inputs.iter().flat_map(|i| i.type_names()).collect();
            return Err(fatal::raise(BusError::AdapterArityViolation {
                name: self.entity,
                channel: format!("({})", names.join(", ")),
                requested: describe::<T>(),
            }));
        }
        self.wire(Box::new(move |parts: Vec<Box<dyn Any>>| {
            if let Some(args) = T::from_boxes(parts) {
                f(args);
            }
        }))
    }

    /// Like [`JoinBuilder::build`], but hands the round's arguments over as a
    /// [`JoinPayload`] instead of one tuple. Use it when the combined
    /// argument list is wider than [`ArgList`] covers.
    pub fn build_payload(
        self,
        f: impl Fn(JoinPayload) + 'static,
    ) -> Result<JoinHandle, BusError> {
        self.check_capacity()?;
        self.wire(Box::new(move |parts: Vec<Box<dyn Any>>| f(JoinPayload { parts })))
    }

    fn check_capacity(&self) -> Result<(), BusError> {
        let count = self.inputs.len();
        if count > MAX_JOIN_INPUTS {
            return Err(fatal::raise(BusError::JoinCapacityExceeded {
                requested: count,
                max: MAX_JOIN_INPUTS,
            }));
        }
        Ok(())
    }

    fn wire(self, fire: Box<dyn Fn(Vec<Box<dyn Any>>)>) -> Result<JoinHandle, BusError> {
        let count = self.inputs.len();
        let width: usize = self.inputs.iter().map(|i| i.type_ids().len()).sum();
        let full = match count {
            0 => 0,
            MAX_JOIN_INPUTS => u64::MAX,
            n => (1u64 << n) - 1,
        };
        let state = Rc::new(JoinState {
            mask: Cell::new(0),
            full,
            slots: RefCell::new((0..width).map(|_| None).collect()),
            fire,
            on_complete: self.on_complete,
            rounds: Cell::new(0),
        });
        // Dropping the handle on an early return unwires the inputs done so far.
        let mut handle = JoinHandle {
            entity: self.entity,
            inputs: count,
            state,
            connections: Vec::with_capacity(count),
        };
        let mut offset = 0;
        for (bit, input) in (0u32..).zip(&self.inputs) {
            let weak = Rc::downgrade(&handle.state);
            handle
                .connections
                .push(input.connect(&handle.entity, bit, offset, weak)?);
            offset += input.type_ids().len();
        }
        tracing::debug!(entity = %handle.entity, inputs = count, slots = width, "join built");
        Ok(handle)
    }
}

/// Arguments of one completed round, in input order, for joins built with
/// [`JoinBuilder::build_payload`].
#[derive(Debug)]
pub struct JoinPayload {
    parts: Vec<Box<dyn Any>>,
}

impl JoinPayload {
    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// True when every input was zero-argument.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Argument `index`, or `None` when out of range or not a `T`.
    pub fn get<T: Any>(&self, index: usize) -> Option<&T> {
        self.parts.get(index)?.downcast_ref::<T>()
    }

    /// Owned arguments.
    pub fn into_parts(self) -> Vec<Box<dyn Any>> {
        self.parts
    }
}

/// Owner of a join's round state. Dropping it unsubscribes the internal
/// observers from every input channel.
pub struct JoinHandle {
    entity: String,
    inputs: usize,
    state: Rc<JoinState>,
    connections: Vec<Box<dyn Connection>>,
}

impl Drop for JoinHandle {
    fn drop(&mut self) {
        let removed = self.connections.iter().filter(|c| c.disconnect()).count();
        tracing::trace!(entity = %self.entity, removed, "join unwired");
    }
}

impl fmt::Debug for JoinHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinHandle")
            .field("entity", &self.entity)
            .field("inputs", &self.inputs)
            .field("state", &format_args!("{:#x}", self.state()))
            .field("rounds", &self.rounds())
            .finish()
    }
}

impl JoinHandle {
    /// Bitmask of inputs that have delivered in the current round.
    pub fn state(&self) -> u64 {
        self.state.mask.get()
    }

    /// Number of inputs.
    pub fn inputs(&self) -> usize {
        self.inputs
    }

    /// Label used for the internal observers.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Completed rounds so far.
    pub fn rounds(&self) -> u64 {
        self.state.rounds.get()
    }

    /// Discards the current partial round.
    pub fn reset(&self) {
        drop(self.state.take());
    }
}
