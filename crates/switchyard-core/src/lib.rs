// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! switchyard-core: typed in-process publish/subscribe.
//!
//! Producers and consumers agree only on a channel name and a signature. A
//! [`Registrar`] resolves names to channels, checks every participant's
//! signature against the one fixed at first use, and hands out
//! [`ChannelHandle`]s. Channels dispatch to group-ordered subscribers,
//! collect per-subscriber results, and tolerate removal from inside a
//! callback. Views adapt a channel to a reduced or transformed signature, and
//! joins fire once per round after several channels have all delivered.
//!
//! The bus is single-threaded: handles and registrars are `!Send`.
#![forbid(unsafe_code)]

pub mod args;
pub mod config;
pub mod error;
pub mod fatal;
pub mod ident;
pub mod join;
pub mod observable;
pub mod sink;

mod channel;
mod handle;
mod registrar;
mod view;

pub use args::{Arg, ArgList, Projection};
pub use channel::ChannelInfo;
pub use config::{BusConfig, ConfigError, ConfigService, ConfigStore, Settings};
pub use error::BusError;
pub use fatal::{FatalGuard, FatalPolicy};
pub use handle::ChannelHandle;
pub use ident::{Label, NameId, NameTable, Signature, SignatureId};
pub use join::{JoinBuilder, JoinHandle, JoinPayload, MAX_JOIN_INPUTS};
pub use observable::{Observable, WriteGuard};
pub use registrar::{Client, Registrar, TraceNode, Tracer};
pub use sink::{LogSink, TracingSink};
