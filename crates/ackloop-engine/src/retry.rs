//! Retry controller: bounded rounds of send, observe, correct.
//!
//! This is the only place a command is ever re-sent. The remote side does no
//! deduplication: a retried purchase double-applies if the first send landed
//! but its effect was observed late.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use ackloop_core::types::Command;

use crate::dispatcher::Dispatcher;
use crate::error::EngineError;
use crate::poller::{CancelSignal, Poller, Probe};
use crate::timeout::{LatencyProbe, TimeoutBudget};
use crate::world::WorldResult;

/// What an attempt's send step decided to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Send(Command),
    /// Send nothing this round but still observe.
    Skip,
    /// The subject is gone; stop without further attempts.
    Abort,
}

/// Attempt ceiling and per-attempt observation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptPlan {
    max_attempts: u32,
    poll_interval_ms: u64,
    budget: TimeoutBudget,
}

impl AttemptPlan {
    /// Build a plan, rejecting one that could never make progress.
    ///
    /// Requires at least one attempt and a non-zero poll interval. A budget
    /// with a non-zero floor also needs the interval to be below that floor.
    pub fn new(
        max_attempts: u32,
        poll_interval_ms: u64,
        budget: TimeoutBudget,
    ) -> Result<Self, EngineError> {
        if max_attempts == 0 {
            return Err(EngineError::InvalidPlan(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if poll_interval_ms == 0 {
            return Err(EngineError::InvalidPlan(
                "poll interval must be non-zero".to_string(),
            ));
        }
        if budget.minimum_ms > 0 && poll_interval_ms >= budget.minimum_ms {
            return Err(EngineError::InvalidPlan(format!(
                "poll interval {}ms must be below the {}ms budget floor",
                poll_interval_ms, budget.minimum_ms
            )));
        }
        Ok(Self {
            max_attempts,
            poll_interval_ms,
            budget,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn budget(&self) -> TimeoutBudget {
        self.budget
    }
}

type SendFn<'a> = Box<dyn FnMut() -> WorldResult<Step> + Send + 'a>;
type ProbeFn<'a> = Box<dyn FnMut(Duration) -> WorldResult<Probe> + Send + 'a>;
type CorrectiveFn<'a> = Box<dyn FnMut() -> WorldResult<Vec<Command>> + Send + 'a>;

/// The moving parts of one retried action.
pub struct Attempt<'a> {
    label: &'static str,
    send: SendFn<'a>,
    probe: ProbeFn<'a>,
    corrective: Option<CorrectiveFn<'a>>,
}

impl<'a> Attempt<'a> {
    /// An attempt confirmed by a plain predicate.
    pub fn new<S, C>(label: &'static str, send: S, mut confirm: C) -> Self
    where
        S: FnMut() -> WorldResult<Step> + Send + 'a,
        C: FnMut() -> WorldResult<bool> + Send + 'a,
    {
        Self::probing(label, send, move |_| confirm().map(Probe::from))
    }

    /// An attempt observed through a probe that may report desync.
    pub fn probing<S, P>(label: &'static str, send: S, probe: P) -> Self
    where
        S: FnMut() -> WorldResult<Step> + Send + 'a,
        P: FnMut(Duration) -> WorldResult<Probe> + Send + 'a,
    {
        Self {
            label,
            send: Box::new(send),
            probe: Box::new(probe),
            corrective: None,
        }
    }

    /// Commands to send between a failed attempt and the next one.
    pub fn with_corrective<K>(mut self, corrective: K) -> Self
    where
        K: FnMut() -> WorldResult<Vec<Command>> + Send + 'a,
    {
        self.corrective = Some(Box::new(corrective));
        self
    }
}

/// Runs [`Attempt`]s against an [`AttemptPlan`]. Holds no state across calls.
#[derive(Debug, Clone)]
pub struct RetryController {
    dispatcher: Dispatcher,
    latency: LatencyProbe,
    poller: Poller,
    settle: TimeoutBudget,
}

impl RetryController {
    pub fn new(
        dispatcher: Dispatcher,
        latency: LatencyProbe,
        poller: Poller,
        settle: TimeoutBudget,
    ) -> Self {
        Self {
            dispatcher,
            latency,
            poller,
            settle,
        }
    }

    /// Same controller, observing `signal` at every tick and round.
    pub fn with_cancel(mut self, signal: CancelSignal) -> Self {
        self.poller = self.poller.with_cancel(signal);
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn latency(&self) -> &LatencyProbe {
        &self.latency
    }

    pub fn poller(&self) -> &Poller {
        &self.poller
    }

    /// Delay applied after each corrective command.
    pub fn settle_delay(&self) -> Duration {
        self.settle.effective(self.latency.sample_ms())
    }

    /// Run up to `plan.max_attempts()` rounds.
    ///
    /// Returns `Ok(true)` on the first confirmed round, `Ok(false)` once the
    /// rounds are exhausted or the send step aborts. The corrective step runs
    /// only between rounds: never after success, never after the last round.
    pub async fn run(&self, plan: &AttemptPlan, mut attempt: Attempt<'_>) -> Result<bool, EngineError> {
        let poller = self.poller.with_interval(plan.poll_interval());
        let label = attempt.label;

        for round in 1..=plan.max_attempts() {
            poller.check_cancelled()?;

            match (attempt.send)()? {
                Step::Send(command) => self.dispatcher.send(&command),
                Step::Skip => tracing::debug!(action = label, round, "Send skipped this round"),
                Step::Abort => {
                    tracing::debug!(action = label, round, "Subject gone, aborting");
                    return Ok(false);
                }
            }

            let budget = plan.budget().effective(self.latency.sample_ms());
            let dispatcher = &self.dispatcher;
            let confirmed = poller
                .watch(
                    |elapsed| (attempt.probe)(elapsed),
                    budget,
                    |command| dispatcher.send(&command),
                )
                .await?;

            if confirmed {
                tracing::debug!(action = label, round, "Confirmed");
                return Ok(true);
            }

            tracing::debug!(
                action = label,
                round,
                budget_ms = budget.as_millis() as u64,
                "Not confirmed within budget"
            );

            if round < plan.max_attempts() {
                if let Some(corrective) = attempt.corrective.as_mut() {
                    for command in corrective()? {
                        self.dispatcher.send(&command);
                        poller.sleep(self.settle_delay()).await?;
                    }
                }
            }
        }

        tracing::debug!(
            action = label,
            attempts = plan.max_attempts(),
            "Attempts exhausted"
        );
        Ok(false)
    }
}
