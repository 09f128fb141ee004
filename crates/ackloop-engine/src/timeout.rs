//! Latency-scaled wait budgets.
//!
//! A budget is the measured round trip times a multiplier, never below a
//! fixed floor. Unknown latency falls back to a configured estimate.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::world::WorldState;

/// Compute `max(minimum_ms, latency_ms * multiplier)`.
///
/// Negative latency is treated as zero and the product saturates.
pub fn compute_budget(latency_ms: i64, minimum_ms: u64, multiplier: u64) -> u64 {
    let latency = latency_ms.max(0) as u64;
    minimum_ms.max(latency.saturating_mul(multiplier))
}

/// Wait budget for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutBudget {
    pub minimum_ms: u64,
    pub latency_multiplier: u64,
    /// Added to the scaled latency before the floor is applied.
    pub padding_ms: u64,
}

impl TimeoutBudget {
    /// A budget that ignores latency.
    pub const fn fixed(ms: u64) -> Self {
        Self {
            minimum_ms: ms,
            latency_multiplier: 0,
            padding_ms: 0,
        }
    }

    pub const fn scaled(minimum_ms: u64, latency_multiplier: u64) -> Self {
        Self {
            minimum_ms,
            latency_multiplier,
            padding_ms: 0,
        }
    }

    pub const fn with_padding(mut self, padding_ms: u64) -> Self {
        self.padding_ms = padding_ms;
        self
    }

    pub fn effective_ms(&self, latency_ms: u64) -> u64 {
        let scaled = latency_ms
            .saturating_mul(self.latency_multiplier)
            .saturating_add(self.padding_ms);
        self.minimum_ms.max(scaled)
    }

    pub fn effective(&self, latency_ms: u64) -> Duration {
        Duration::from_millis(self.effective_ms(latency_ms))
    }

    pub fn minimum(&self) -> Duration {
        Duration::from_millis(self.minimum_ms)
    }
}

/// Samples the world's latency estimate, clamped and with a fallback.
#[derive(Clone)]
pub struct LatencyProbe {
    world: Arc<dyn WorldState>,
    fallback_ms: u64,
}

impl LatencyProbe {
    pub fn new(world: Arc<dyn WorldState>, fallback_ms: u64) -> Self {
        Self { world, fallback_ms }
    }

    /// Current latency in milliseconds, never negative.
    pub fn sample_ms(&self) -> u64 {
        match self.world.latency_ms() {
            Some(ms) => ms.max(0) as u64,
            None => self.fallback_ms,
        }
    }
}

impl std::fmt::Debug for LatencyProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LatencyProbe")
            .field("fallback_ms", &self.fallback_ms)
            .finish()
    }
}
