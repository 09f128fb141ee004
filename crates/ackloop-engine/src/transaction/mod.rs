//! Confirmed transactions: one [`ActionSession`] per controlled character.
//!
//! Every transaction follows the same shape. Preconditions are read first and
//! a failing one returns `Ok(false)` without sending anything. The command is
//! then sent and its effect confirmed through the [`RetryController`]. World
//! faults and cancellation surface as `Err`.

pub mod commands;
mod interact;
mod item;
mod shop;
mod skill;

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use ackloop_core::config::{AckloopConfig, OpcodeTable};
use ackloop_core::types::EntityRef;

use crate::dispatcher::{Dispatcher, Transport};
use crate::error::EngineError;
use crate::poller::{CancelSignal, Poller};
use crate::retry::{AttemptPlan, RetryController};
use crate::timeout::{LatencyProbe, TimeoutBudget};
use crate::world::{Navigator, WorldState};

/// Runs confirmed transactions against one world and one outbound channel.
///
/// Transactions borrow the session immutably but are not meant to run
/// concurrently against the same character: the remote side processes one
/// menu, cursor or trade operation at a time.
pub struct ActionSession {
    id: Uuid,
    world: Arc<dyn WorldState>,
    navigator: Option<Arc<dyn Navigator>>,
    retry: RetryController,
    config: AckloopConfig,
}

impl std::fmt::Debug for ActionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionSession")
            .field("id", &self.id)
            .field("has_navigator", &self.navigator.is_some())
            .field("retry", &self.retry)
            .finish()
    }
}

impl ActionSession {
    pub fn new(
        config: AckloopConfig,
        world: Arc<dyn WorldState>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let timing = &config.timing;
        let latency = LatencyProbe::new(world.clone(), timing.fallback_latency_ms);
        let poller = Poller::new(Duration::from_millis(timing.poll_interval_ms));
        let settle = TimeoutBudget::scaled(timing.settle_floor_ms, timing.latency_multiplier);
        let retry = RetryController::new(Dispatcher::new(transport), latency, poller, settle);

        let id = Uuid::new_v4();
        tracing::debug!(session = %id, "Action session created");

        Self {
            id,
            world,
            navigator: None,
            retry,
            config,
        }
    }

    /// Use `navigator` to approach distant NPCs before interacting.
    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// Abort any in-flight wait with [`EngineError::Cancelled`] once `signal`
    /// fires.
    pub fn with_cancel(mut self, signal: CancelSignal) -> Self {
        self.retry = self.retry.with_cancel(signal);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        self.retry.dispatcher()
    }

    pub fn config(&self) -> &AckloopConfig {
        &self.config
    }

    fn ops(&self) -> &OpcodeTable {
        &self.config.opcodes
    }

    fn plan(
        &self,
        max_attempts: u32,
        poll_interval_ms: u64,
        budget: TimeoutBudget,
    ) -> Result<AttemptPlan, EngineError> {
        AttemptPlan::new(max_attempts, poll_interval_ms, budget)
    }

    /// Latency-scaled budget with the configured multiplier.
    fn scaled(&self, minimum_ms: u64) -> TimeoutBudget {
        TimeoutBudget::scaled(minimum_ms, self.config.timing.latency_multiplier)
    }

    /// Sleep `max(floor_ms, latency * multiplier)`, honouring cancellation.
    async fn settle(&self, floor_ms: u64) -> Result<(), EngineError> {
        let delay = self.scaled(floor_ms).effective(self.retry.latency().sample_ms());
        self.retry.poller().sleep(delay).await
    }

    async fn pause(&self, ms: u64) -> Result<(), EngineError> {
        self.retry.poller().sleep(Duration::from_millis(ms)).await
    }

    /// Precondition helper: log why a transaction is refused.
    fn refuse(&self, action: &'static str, subject: &EntityRef, reason: &str) -> bool {
        tracing::warn!(session = %self.id, action, %subject, reason, "Precondition not met");
        false
    }

    fn outcome(&self, action: &'static str, subject: &EntityRef, confirmed: bool) -> bool {
        if confirmed {
            tracing::info!(session = %self.id, action, %subject, "Action confirmed");
        } else {
            tracing::info!(session = %self.id, action, %subject, "Action not confirmed");
        }
        confirmed
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::sim::{SimTransport, SimWorld};

    /// A session over a fresh simulated world, with the transport kept
    /// around for assertions.
    pub fn session() -> (ActionSession, Arc<SimWorld>, Arc<SimTransport>) {
        let world = Arc::new(SimWorld::new());
        let transport = Arc::new(SimTransport::new(world.clone()));
        let session = ActionSession::new(AckloopConfig::default(), world.clone(), transport.clone());
        (session, world, transport)
    }
}
