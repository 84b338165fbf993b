// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Views: subscription brokers that adapt a channel to another signature.
//!
//! A view for `(name, B -> R2)` accepts subscribers written against `B` and
//! attaches them to the underlying channel wrapped in a projection or a
//! transform. Subscriptions that arrive before a matching view exists are held
//! as pending and attached when the view is registered.

use std::any::{Any, TypeId};
use std::rc::Rc;

use crate::args::{ArgList, Projection};
use crate::channel::{Channel, Hook};
use crate::error::BusError;
use crate::ident::{Label, Signature};

/// Converts a subscriber's `Option<R2>` into the channel's `Option<R>`.
pub(crate) type Reconcile<R2, R> = fn(Option<R2>) -> Option<R>;

/// Chooses the return conversion once, at registration time: identical types
/// pass through, anything else reports "no value".
pub(crate) fn reconcile<R2: 'static, R: 'static>() -> Reconcile<R2, R> {
    if TypeId::of::<R2>() == TypeId::of::<R>() {
        let pass: Reconcile<R2, R> = |value| {
            let mut slot = value;
            (&mut slot as &mut dyn Any)
                .downcast_mut::<Option<R>>()
                .and_then(Option::take)
        };
        return pass;
    }
    |_| None
}

/// Lookup key for a view signature.
pub(crate) fn view_key<B: ArgList, R2: 'static>() -> TypeId {
    TypeId::of::<fn(B) -> R2>()
}

type AttachFn<B, R2> = Box<dyn Fn(Hook<B, R2>, Label, i32) -> Result<(), BusError>>;

/// Adapter from one channel onto subscribers of signature `B -> R2`.
pub(crate) struct View<B, R2> {
    signature: Signature,
    attach: AttachFn<B, R2>,
}

impl<B: ArgList, R2: 'static> View<B, R2> {
    /// Forwards the ordered subsequence of the channel arguments selected by
    /// `projection`.
    pub(crate) fn projected<A: ArgList, R: 'static>(
        channel: Rc<Channel<A, R>>,
        projection: Projection,
    ) -> Self {
        let convert = reconcile::<R2, R>();
        let identity = TypeId::of::<A>() == TypeId::of::<B>();
        let attach = move |hook: Hook<B, R2>, label: Label, group: i32| {
            let wrapped: Hook<A, R> = if identity {
                Rc::new(move |args: &A| {
                    let same = (args as &dyn Any).downcast_ref::<B>()?;
                    convert(hook(same))
                })
            } else {
                let projection = projection.clone();
                Rc::new(move |args: &A| {
                    let picked = projection.apply::<A, B>(args)?;
                    convert(hook(&picked))
                })
            };
            channel.insert_hook(wrapped, label, group)
        };
        Self {
            signature: Signature::of::<B, R2>(),
            attach: Box::new(attach),
        }
    }

    /// Forwards the output of `transform` applied to the channel arguments.
    pub(crate) fn transformed<A: ArgList, R: 'static>(
        channel: Rc<Channel<A, R>>,
        transform: Rc<dyn Fn(&A) -> B>,
    ) -> Self {
        let convert = reconcile::<R2, R>();
        let attach = move |hook: Hook<B, R2>, label: Label, group: i32| {
            let transform = Rc::clone(&transform);
            let wrapped: Hook<A, R> = Rc::new(move |args: &A| convert(hook(&transform(args))));
            channel.insert_hook(wrapped, label, group)
        };
        Self {
            signature: Signature::of::<B, R2>(),
            attach: Box::new(attach),
        }
    }

    pub(crate) fn signature(&self) -> &Signature {
        &self.signature
    }

    pub(crate) fn attach(&self, hook: Hook<B, R2>, label: Label, group: i32) -> Result<(), BusError> {
        (self.attach)(hook, label, group)
    }
}

/// Attach failure that hands the subscription back so it can keep waiting.
pub(crate) type Unattached = (Box<dyn PendingSubscription>, BusError);

/// Subscription waiting for a view of its signature.
pub(crate) trait PendingSubscription {
    fn key(&self) -> TypeId;
    fn label(&self) -> &str;
    /// Attaches through `view`, which must be an `Rc<View<B, R2>>` for this
    /// subscription's signature.
    fn attach(self: Box<Self>, view: &Rc<dyn Any>) -> Result<(), Unattached>;
}

pub(crate) struct PendingHook<B, R2> {
    hook: Hook<B, R2>,
    label: Label,
    group: i32,
}

impl<B, R2> PendingHook<B, R2> {
    pub(crate) fn new(hook: Hook<B, R2>, label: Label, group: i32) -> Self {
        Self { hook, label, group }
    }
}

impl<B: ArgList, R2: 'static> PendingSubscription for PendingHook<B, R2> {
    fn key(&self) -> TypeId {
        view_key::<B, R2>()
    }

    fn label(&self) -> &str {
        self.label.as_str()
    }

    fn attach(self: Box<Self>, view: &Rc<dyn Any>) -> Result<(), Unattached> {
        let Some(view) = view.downcast_ref::<View<B, R2>>() else {
            return Ok(());
        };
        match view.attach(Rc::clone(&self.hook), self.label.clone(), self.group) {
            Ok(()) => Ok(()),
            Err(err) => Err((self as Box<dyn PendingSubscription>, err)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn matching_returns_pass_through() {
        let same = reconcile::<u8, u8>();
        assert_eq!(same(Some(4)), Some(4));
        assert_eq!(same(None), None);
    }

    #[test]
    fn unrelated_returns_become_absent() {
        let other = reconcile::<String, u8>();
        assert_eq!(other(Some("x".to_owned())), None);
        let unit = reconcile::<(), bool>();
        assert_eq!(unit(Some(())), None);
    }
}
