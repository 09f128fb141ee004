//! Confirmation poller: observe a predicate at a fixed interval until it holds
//! or the budget runs out.
//!
//! Elapsed time is measured against a monotonic clock sampled once at entry,
//! never by counting intervals. Every sleep is raced against an optional
//! cancellation signal, which makes each tick a suspension point the rest of
//! the runtime can interleave with.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use ackloop_core::types::Command;

use crate::error::EngineError;
use crate::world::WorldResult;

/// One observation of an in-flight action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// The expected effect is visible.
    Confirmed,
    /// Nothing yet.
    Pending,
    /// The remote side is stuck in a state that will never confirm; the
    /// command describes how to unstick it. The probe only describes it,
    /// the caller decides whether to send.
    Desync(Command),
}

impl From<bool> for Probe {
    fn from(confirmed: bool) -> Self {
        if confirmed {
            Probe::Confirmed
        } else {
            Probe::Pending
        }
    }
}

/// Owner side of a cooperative cancellation flag.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// A signal that observes this handle.
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observer side of a [`CancelHandle`], checked at every poll tick.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled. Never resolves if the handle is dropped
    /// without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Fixed-interval poller with an optional cancellation signal.
#[derive(Debug, Clone)]
pub struct Poller {
    interval: Duration,
    cancel: Option<CancelSignal>,
}

impl Poller {
    /// Create a poller. A zero interval is raised to one millisecond so the
    /// loop always yields.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, signal: CancelSignal) -> Self {
        self.cancel = Some(signal);
        self
    }

    /// Same cancellation, different interval.
    pub fn with_interval(&self, interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            cancel: self.cancel.clone(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn check_cancelled(&self) -> Result<(), EngineError> {
        match &self.cancel {
            Some(signal) if signal.is_cancelled() => Err(EngineError::Cancelled),
            _ => Ok(()),
        }
    }

    /// Sleep for `duration` unless cancelled first.
    pub async fn sleep(&self, duration: Duration) -> Result<(), EngineError> {
        self.check_cancelled()?;
        match &self.cancel {
            Some(signal) => {
                tokio::select! {
                    _ = tokio::time::sleep(duration) => Ok(()),
                    _ = signal.cancelled() => Err(EngineError::Cancelled),
                }
            }
            None => {
                tokio::time::sleep(duration).await;
                Ok(())
            }
        }
    }

    /// Wait until `predicate` returns true or `budget` elapses.
    ///
    /// Returns `Ok(false)` on timeout. A failing predicate is a fault and
    /// propagates as [`EngineError::World`].
    pub async fn wait_until<P>(&self, mut predicate: P, budget: Duration) -> Result<bool, EngineError>
    where
        P: FnMut() -> WorldResult<bool>,
    {
        self.watch(|_| predicate().map(Probe::from), budget, |_| {})
            .await
    }

    /// Probe form of [`wait_until`](Self::wait_until).
    ///
    /// The probe receives the elapsed time since entry. A `Desync` result hands
    /// its command to `on_desync` and waiting continues.
    pub async fn watch<P, D>(
        &self,
        mut probe: P,
        budget: Duration,
        mut on_desync: D,
    ) -> Result<bool, EngineError>
    where
        P: FnMut(Duration) -> WorldResult<Probe>,
        D: FnMut(Command),
    {
        let start = Instant::now();
        loop {
            let remaining = budget.saturating_sub(start.elapsed());
            self.sleep(self.interval.min(remaining)).await?;

            match probe(start.elapsed())? {
                Probe::Confirmed => return Ok(true),
                Probe::Pending => {}
                Probe::Desync(command) => {
                    tracing::debug!(command = %command, "Desync observed, correcting");
                    on_desync(command);
                }
            }

            if start.elapsed() >= budget {
                return Ok(false);
            }
        }
    }
}
