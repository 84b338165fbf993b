// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Output port for channel debug lines.

/// Receives one formatted line per debug-enabled channel invocation.
pub trait LogSink {
    /// Writes a single line (no trailing newline).
    fn line(&self, line: &str);
}

/// Default sink: each line becomes a `tracing` event on target
/// `switchyard::debug`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn line(&self, line: &str) {
        tracing::info!(target: "switchyard::debug", "{line}");
    }
}

impl<F> LogSink for F
where
    F: Fn(&str),
{
    fn line(&self, line: &str) {
        self(line);
    }
}
