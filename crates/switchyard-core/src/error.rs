// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Error taxonomy for the bus and the scheduler.
//!
//! Every variant is a programmer or configuration error. None of them is
//! retried; each is routed exactly once through [`crate::fatal::raise`] before
//! the failing operation returns.

use thiserror::Error;

/// Fatal conditions raised by registrars, channels, views, joins, and the
/// time wheel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// A name was used with a signature other than the one it was created with.
    #[error("type mismatch for {name} (registered {registered}, requested {requested})")]
    SignatureMismatch {
        /// Channel name.
        name: String,
        /// Signature fixed at first use.
        registered: String,
        /// Signature supplied by the failing call.
        requested: String,
    },
    /// A structural change was attempted while the channel was dispatching.
    #[error("can't {op} {name} while it is dispatching")]
    ReentrancyViolation {
        /// Channel name.
        name: String,
        /// Operation that was rejected (`subscribe`, `resolve`, `clear`, `alias`).
        op: &'static str,
    },
    /// Removal by label was requested with an empty label.
    #[error("no unsubscribes of unnamed clients on {name}")]
    UnnamedRemoval {
        /// Channel name.
        name: String,
    },
    /// A requested view signature cannot be produced from the channel signature.
    #[error("incompatible mapping on {name}: {requested} is not reachable from {channel}")]
    AdapterArityViolation {
        /// Channel (or join) name.
        name: String,
        /// Declared argument list.
        channel: String,
        /// Requested argument list.
        requested: String,
    },
    /// A join was built over more inputs than the round bitmask can track.
    #[error("join supports a maximum of {max} channels ({requested} requested)")]
    JoinCapacityExceeded {
        /// Number of inputs supplied.
        requested: usize,
        /// Bitmask width.
        max: usize,
    },
    /// `pop_front` was called on an empty time wheel.
    #[error("pop_front on an empty time wheel")]
    SchedulerUnderflow,
    /// An event was scheduled before the wheel's current time.
    #[error("can't schedule at {time}; the wheel is already at {now}")]
    SchedulerPastInsertion {
        /// Requested absolute time.
        time: u64,
        /// Wheel time when the request was made.
        now: u64,
    },
    /// A handle or view belongs to a different registrar.
    #[error("registrar mismatch: {name} belongs to {owner}, not {registrar}")]
    RegistrarMismatch {
        /// Channel name.
        name: String,
        /// Registrar that owns the channel.
        owner: String,
        /// Registrar the call was made on.
        registrar: String,
    },
    /// An alias was requested for a channel the registrar has never created.
    #[error("alias channel {name} must already exist in {registrar}")]
    UnknownChannel {
        /// Channel name.
        name: String,
        /// Registrar the alias was requested on.
        registrar: String,
    },
}

impl BusError {
    /// Short, stable identifier for the error kind, used as a structured
    /// logging field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SignatureMismatch { .. } => "signature_mismatch",
            Self::ReentrancyViolation { .. } => "reentrancy_violation",
            Self::UnnamedRemoval { .. } => "unnamed_removal",
            Self::AdapterArityViolation { .. } => "adapter_arity_violation",
            Self::JoinCapacityExceeded { .. } => "join_capacity_exceeded",
            Self::SchedulerUnderflow => "scheduler_underflow",
            Self::SchedulerPastInsertion { .. } => "scheduler_past_insertion",
            Self::RegistrarMismatch { .. } => "registrar_mismatch",
            Self::UnknownChannel { .. } => "unknown_channel",
        }
    }
}
