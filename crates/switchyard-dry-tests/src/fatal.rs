// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Fatal-hook capture for tests.

use switchyard_core::fatal::{self, FatalGuard};
use switchyard_core::BusError;

use crate::recorder::Recorder;

/// Installs a handler that records every fatal error raised on this thread.
/// The previous policy comes back when the capture is dropped.
pub struct FatalCapture {
    errors: Recorder<BusError>,
    _guard: FatalGuard,
}

impl FatalCapture {
    /// Starts capturing.
    pub fn install() -> Self {
        let errors = Recorder::new();
        let sink = errors.clone();
        let guard = fatal::set_handler(move |err| sink.push(err.clone()));
        Self {
            errors,
            _guard: guard,
        }
    }

    /// Errors raised so far.
    pub fn errors(&self) -> Vec<BusError> {
        self.errors.entries()
    }

    /// Error kinds raised so far (see [`BusError::kind`]).
    pub fn kinds(&self) -> Vec<&'static str> {
        self.errors().iter().map(BusError::kind).collect()
    }

    /// Number of errors raised so far.
    pub fn count(&self) -> usize {
        self.errors.len()
    }

    /// Forgets captured errors.
    pub fn clear(&self) {
        self.errors.clear();
    }
}
