// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared test doubles for Switchyard crates.
#![forbid(unsafe_code)]
//!
//! # Modules
//!
//! - [`config`] - In-memory config store fake
//! - [`fatal`] - Fatal-hook capture guard
//! - [`recorder`] - Shared call logs for subscriber callbacks
//! - [`sink`] - In-memory debug-line sink

pub mod config;
pub mod fatal;
pub mod recorder;
pub mod sink;

pub use config::InMemoryConfigStore;
pub use fatal::FatalCapture;
pub use recorder::Recorder;
pub use sink::MemorySink;
