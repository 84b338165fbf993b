// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Host-replaceable fatal hook.
//!
//! The core never chooses a failure policy. Every fatal condition is passed to
//! [`raise`], which notifies the handler installed for the current thread and
//! hands the error back so the caller can return it. The bus is
//! single-threaded, so the handler slot is thread-local: parallel test threads
//! each see their own policy.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::BusError;

/// Callback notified for every fatal condition.
pub type FatalHandler = Rc<dyn Fn(&BusError)>;

thread_local! {
    static HANDLER: RefCell<Option<FatalHandler>> = const { RefCell::new(None) };
}

/// Failure policies a host can install.
#[derive(Clone)]
pub enum FatalPolicy {
    /// Log through `tracing` and let the error propagate to the caller.
    Log,
    /// Log, then abort the process.
    Abort,
    /// Hand the error to a host-supplied handler (inspector, test capture, ...).
    Custom(FatalHandler),
}

impl core::fmt::Debug for FatalPolicy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Log => f.write_str("Log"),
            Self::Abort => f.write_str("Abort"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl FatalPolicy {
    fn into_handler(self) -> Option<FatalHandler> {
        match self {
            Self::Log => None,
            Self::Abort => Some(Rc::new(|err: &BusError| {
                log_fatal(err);
                std::process::abort();
            })),
            Self::Custom(handler) => Some(handler),
        }
    }
}

/// Restores the previously installed handler when dropped.
#[must_use = "dropping the guard immediately restores the previous policy"]
pub struct FatalGuard {
    previous: Option<FatalHandler>,
}

impl Drop for FatalGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        HANDLER.with(|slot| *slot.borrow_mut() = previous);
    }
}

/// Installs `policy` for the current thread until the returned guard drops.
pub fn install(policy: FatalPolicy) -> FatalGuard {
    let handler = policy.into_handler();
    let previous = HANDLER.with(|slot| std::mem::replace(&mut *slot.borrow_mut(), handler));
    FatalGuard { previous }
}

/// Installs a custom handler; shorthand for `install(FatalPolicy::Custom(..))`.
pub fn set_handler(handler: impl Fn(&BusError) + 'static) -> FatalGuard {
    install(FatalPolicy::Custom(Rc::new(handler)))
}

/// Drops whatever handler is installed on this thread and returns to
/// [`FatalPolicy::Log`]. Test suites call this between cases.
pub fn reset() {
    HANDLER.with(|slot| slot.borrow_mut().take());
}

/// Routes `err` through the installed handler and returns it for propagation.
///
/// The handler runs outside the slot borrow, so it may itself install or
/// reset policies.
pub fn raise(err: BusError) -> BusError {
    let handler = HANDLER.with(|slot| slot.borrow().clone());
    match handler {
        Some(handler) => handler(&err),
        None => log_fatal(&err),
    }
    err
}

fn log_fatal(err: &BusError) {
    tracing::error!(kind = err.kind(), error = %err, "fatal bus error");
}
