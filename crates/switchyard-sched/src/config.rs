// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Time-wheel sizing.

use serde::{Deserialize, Serialize};
use switchyard_core::Settings;

/// Dense window and pool sizing for a [`crate::TimeWheel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WheelConfig {
    /// Buckets in the dense window. Must be at least one when loaded through
    /// a `ConfigService`; direct construction treats zero as one.
    pub dense_window: usize,
    /// Retired event vectors kept for reuse.
    pub pool_limit: usize,
}

impl Default for WheelConfig {
    fn default() -> Self {
        Self {
            dense_window: 64,
            pool_limit: 256,
        }
    }
}

impl Settings for WheelConfig {
    const KEY: &'static str = "wheel";

    fn validate(&self) -> Result<(), String> {
        if self.dense_window == 0 {
            return Err("dense_window must be at least 1".to_owned());
        }
        Ok(())
    }
}
