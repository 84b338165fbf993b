// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! switchyard-sched: discrete-time event scheduling.
//!
//! [`TimeWheel`] orders events by absolute time step with amortized O(1)
//! insert and pop. [`Scheduler`] owns a wheel of boxed closures and drives
//! the run-to-completion loop; [`DelayedCall`] binds a channel call to its
//! arguments so it can be delivered later.
#![forbid(unsafe_code)]

pub mod config;
pub mod delayed;
pub mod scheduler;
pub mod wheel;

pub use config::WheelConfig;
pub use delayed::DelayedCall;
pub use scheduler::{Event, Scheduler};
pub use wheel::{Front, TimeWheel};
