//! Action-confirmation engine for ackloop.
//!
//! Sends fire-and-forget commands to a remote authority and confirms their
//! effect by polling local world state under latency-scaled budgets, with
//! bounded retries and corrective steps between them.

pub mod dispatcher;
pub mod error;
pub mod notify;
pub mod poller;
pub mod retry;
pub mod sim;
pub mod timeout;
pub mod transaction;
pub mod world;

pub use dispatcher::{ChannelTransport, Dispatcher, Transport};
pub use error::{EngineError, TransportError, WorldError};
pub use notify::{OpcodeSet, SubscriptionRegistry, SubscriptionToken};
pub use poller::{CancelHandle, CancelSignal, Poller, Probe};
pub use retry::{Attempt, AttemptPlan, RetryController, Step};
pub use timeout::{compute_budget, LatencyProbe, TimeoutBudget};
pub use transaction::ActionSession;
pub use world::{Navigator, WorldResult, WorldState};
