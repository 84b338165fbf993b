// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Log sink that keeps channel debug lines in memory.

use std::rc::Rc;

use switchyard_core::LogSink;

use crate::recorder::Recorder;

/// [`LogSink`] that stores every line. Clones share storage.
#[derive(Clone, Default, Debug)]
pub struct MemorySink {
    lines: Recorder<String>,
}

impl MemorySink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared trait object for `Registrar::set_sink`, backed by this sink.
    pub fn shared(&self) -> Rc<dyn LogSink> {
        Rc::new(self.clone())
    }

    /// Every line so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines.entries()
    }

    /// Returns every line and empties the sink.
    pub fn take(&self) -> Vec<String> {
        self.lines.take()
    }
}

impl LogSink for MemorySink {
    fn line(&self, line: &str) {
        self.lines.push(line.to_owned());
    }
}
