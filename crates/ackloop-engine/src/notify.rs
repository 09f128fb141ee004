//! Notification subscription registry.
//!
//! Independent of the request/confirm path: callers register interest in one
//! or more inbound opcodes and every matching message is handed to them.
//! Each subscription owns a bounded queue drained by its own task, so a slow
//! or panicking callback never stalls delivery to anyone else.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, Notify};

use ackloop_core::config::NotifyConfig;
use ackloop_core::types::{InboundMessage, Opcode};

/// Set of opcodes a subscription listens for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpcodeSet(BTreeSet<Opcode>);

impl OpcodeSet {
    pub fn contains(&self, opcode: Opcode) -> bool {
        self.0.contains(&opcode)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Opcode> + '_ {
        self.0.iter().copied()
    }
}

impl From<Opcode> for OpcodeSet {
    fn from(opcode: Opcode) -> Self {
        Self(BTreeSet::from([opcode]))
    }
}

impl<const N: usize> From<[Opcode; N]> for OpcodeSet {
    fn from(opcodes: [Opcode; N]) -> Self {
        Self(opcodes.into_iter().collect())
    }
}

impl From<&[Opcode]> for OpcodeSet {
    fn from(opcodes: &[Opcode]) -> Self {
        Self(opcodes.iter().copied().collect())
    }
}

impl From<Vec<Opcode>> for OpcodeSet {
    fn from(opcodes: Vec<Opcode>) -> Self {
        Self(opcodes.into_iter().collect())
    }
}

impl FromIterator<Opcode> for OpcodeSet {
    fn from_iter<I: IntoIterator<Item = Opcode>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Handle returned by [`SubscriptionRegistry::subscribe`].
///
/// Tokens increase monotonically, which fixes dispatch order to
/// registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionToken(u64);

struct Entry {
    opcodes: OpcodeSet,
    queue: mpsc::Sender<Arc<InboundMessage>>,
}

/// Registry of opcode subscriptions with an explicit lifecycle.
///
/// Must be used from within a tokio runtime: each subscription spawns the
/// task that drains its queue.
pub struct SubscriptionRegistry {
    entries: Mutex<BTreeMap<SubscriptionToken, Entry>>,
    next_token: AtomicU64,
    queue_capacity: usize,
    shutdown: Notify,
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("subscriptions", &self.len())
            .field("queue_capacity", &self.queue_capacity)
            .finish()
    }
}

impl SubscriptionRegistry {
    pub fn new(config: &NotifyConfig) -> Self {
        Self::with_capacity(config.queue_capacity)
    }

    /// A registry whose per-subscription queues hold `queue_capacity` messages.
    pub fn with_capacity(queue_capacity: usize) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            next_token: AtomicU64::new(1),
            queue_capacity: queue_capacity.max(1),
            shutdown: Notify::new(),
        }
    }

    /// Register `callback` for every inbound message whose opcode is in
    /// `opcodes`.
    pub fn subscribe<F>(&self, opcodes: impl Into<OpcodeSet>, mut callback: F) -> SubscriptionToken
    where
        F: FnMut(&InboundMessage) + Send + 'static,
    {
        let opcodes = opcodes.into();
        let token = SubscriptionToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        let (tx, mut rx) = mpsc::channel::<Arc<InboundMessage>>(self.queue_capacity);

        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                callback(&message);
            }
        });

        tracing::debug!(token = token.0, opcodes = ?opcodes, "Subscription registered");
        self.lock_entries().insert(token, Entry { opcodes, queue: tx });
        token
    }

    /// Revoke a subscription.
    ///
    /// No message dispatched after this returns reaches the callback;
    /// messages already queued for it still run. Returns `false` for an
    /// unknown or already revoked token.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let removed = self.lock_entries().remove(&token).is_some();
        if removed {
            tracing::debug!(token = token.0, "Subscription revoked");
        }
        removed
    }

    /// Hand `message` to every matching subscription, in registration order.
    ///
    /// Returns the number of queues that accepted it. A full queue drops the
    /// message for that subscriber only; a subscriber whose task has died is
    /// removed.
    pub fn dispatch(&self, message: InboundMessage) -> usize {
        let message = Arc::new(message);
        let mut entries = self.lock_entries();
        let mut delivered = 0;
        let mut dead = Vec::new();

        for (token, entry) in entries.iter() {
            if !entry.opcodes.contains(message.opcode) {
                continue;
            }
            match entry.queue.try_send(Arc::clone(&message)) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        token = token.0,
                        opcode = message.opcode,
                        "Subscriber queue full, message dropped"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::warn!(token = token.0, "Subscriber task gone, removing");
                    dead.push(*token);
                }
            }
        }

        for token in dead {
            entries.remove(&token);
        }
        delivered
    }

    /// Pump `inbound` into [`dispatch`](Self::dispatch) until the stream
    /// closes or [`shutdown`](Self::shutdown) is called.
    pub async fn run(&self, mut inbound: mpsc::UnboundedReceiver<InboundMessage>) {
        loop {
            tokio::select! {
                message = inbound.recv() => match message {
                    Some(message) => {
                        self.dispatch(message);
                    }
                    None => {
                        tracing::debug!("Inbound stream closed");
                        return;
                    }
                },
                _ = self.shutdown.notified() => {
                    tracing::debug!("Registry shut down");
                    return;
                }
            }
        }
    }

    /// Drop every subscription and stop [`run`](Self::run).
    pub fn shutdown(&self) {
        self.lock_entries().clear();
        self.shutdown.notify_one();
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Callbacks never run under this lock, so a poisoned map is still
    /// consistent and is used as is.
    fn lock_entries(&self) -> MutexGuard<'_, BTreeMap<SubscriptionToken, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn collector(tag: u32) -> (
        impl FnMut(&InboundMessage) + Send + 'static,
        mpsc::UnboundedReceiver<(u32, Opcode)>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            move |msg: &InboundMessage| {
                let _ = tx.send((tag, msg.opcode));
            },
            rx,
        )
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<(u32, Opcode)>) -> Option<(u32, Opcode)> {
        tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .ok()
            .flatten()
    }

    #[test]
    fn test_opcode_set_conversions() {
        assert!(OpcodeSet::from(0x9c_u8).contains(0x9c));
        let set = OpcodeSet::from([0x9c_u8, 0x9d]);
        assert!(set.contains(0x9d));
        assert!(!set.contains(0x9e));
        let set: OpcodeSet = vec![1_u8, 2, 2].into();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_dispatch_only_to_matching() {
        let registry = SubscriptionRegistry::with_capacity(8);
        let (cb_a, mut rx_a) = collector(1);
        let (cb_b, mut rx_b) = collector(2);
        registry.subscribe(0x9c_u8, cb_a);
        registry.subscribe([0x9c_u8, 0x15], cb_b);

        assert_eq!(registry.dispatch(InboundMessage::new(0x9c, vec![])), 2);
        assert_eq!(registry.dispatch(InboundMessage::new(0x15, vec![])), 1);
        assert_eq!(registry.dispatch(InboundMessage::new(0x01, vec![])), 0);

        assert_eq!(next(&mut rx_a).await, Some((1, 0x9c)));
        assert_eq!(next(&mut rx_b).await, Some((2, 0x9c)));
        assert_eq!(next(&mut rx_b).await, Some((2, 0x15)));
        assert_eq!(next(&mut rx_a).await, None);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_future_dispatch() {
        let registry = SubscriptionRegistry::with_capacity(8);
        let (cb, mut rx) = collector(1);
        let token = registry.subscribe(0x9c_u8, cb);

        assert_eq!(registry.dispatch(InboundMessage::new(0x9c, vec![1])), 1);
        assert!(registry.unsubscribe(token));
        assert_eq!(registry.dispatch(InboundMessage::new(0x9c, vec![2])), 0);

        // the message queued before revocation still arrives
        assert_eq!(next(&mut rx).await, Some((1, 0x9c)));
        assert_eq!(next(&mut rx).await, None);
        assert!(!registry.unsubscribe(token));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_full_queue_drops_for_that_subscriber_only() {
        let registry = SubscriptionRegistry::with_capacity(1);
        let (slow, _slow_rx) = collector(1);
        let (fast, _fast_rx) = collector(2);
        registry.subscribe(0x9c_u8, slow);
        registry.subscribe(0x15_u8, fast);

        // no await in between, so the worker tasks have not drained anything
        assert_eq!(registry.dispatch(InboundMessage::new(0x9c, vec![])), 1);
        assert_eq!(registry.dispatch(InboundMessage::new(0x9c, vec![])), 0);
        assert_eq!(registry.dispatch(InboundMessage::new(0x15, vec![])), 1);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_panicking_callback_is_isolated() {
        let registry = SubscriptionRegistry::with_capacity(4);
        registry.subscribe(0x9c_u8, |_msg: &InboundMessage| panic!("callback bug"));
        let (cb, mut rx) = collector(2);
        registry.subscribe(0x9c_u8, cb);

        registry.dispatch(InboundMessage::new(0x9c, vec![]));
        assert_eq!(next(&mut rx).await, Some((2, 0x9c)));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(registry.dispatch(InboundMessage::new(0x9c, vec![])), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(next(&mut rx).await, Some((2, 0x9c)));
    }

    #[tokio::test]
    async fn test_registry_recovers_from_poisoned_lock() {
        let registry = Arc::new(SubscriptionRegistry::with_capacity(4));
        let holder = registry.clone();
        let _ = std::thread::spawn(move || {
            let _entries = holder.entries.lock().unwrap();
            panic!("poisoned while holding the registry lock");
        })
        .join();
        assert!(registry.entries.is_poisoned());

        let (cb, mut rx) = collector(1);
        let token = registry.subscribe(0x9c_u8, cb);
        assert_eq!(registry.dispatch(InboundMessage::new(0x9c, vec![])), 1);
        assert_eq!(next(&mut rx).await, Some((1, 0x9c)));
        assert!(registry.unsubscribe(token));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_run_pumps_until_stream_closes() {
        let registry = Arc::new(SubscriptionRegistry::with_capacity(8));
        let (cb, mut rx) = collector(1);
        registry.subscribe(0x9c_u8, cb);

        let (tx, inbound) = mpsc::unbounded_channel();
        let pump = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.run(inbound).await })
        };

        tx.send(InboundMessage::new(0x9c, vec![])).unwrap();
        tx.send(InboundMessage::new(0x01, vec![])).unwrap();
        drop(tx);

        tokio::time::timeout(Duration::from_secs(1), pump)
            .await
            .expect("pump should stop when the stream closes")
            .unwrap();
        assert_eq!(next(&mut rx).await, Some((1, 0x9c)));
        assert_eq!(next(&mut rx).await, None);
    }

    #[tokio::test]
    async fn test_shutdown_clears_and_stops_run() {
        let registry = Arc::new(SubscriptionRegistry::with_capacity(8));
        let (cb, _rx) = collector(1);
        registry.subscribe(0x9c_u8, cb);

        let (_tx, inbound) = mpsc::unbounded_channel();
        registry.shutdown();
        assert!(registry.is_empty());

        tokio::time::timeout(Duration::from_secs(1), registry.run(inbound))
            .await
            .expect("run should return after shutdown");
    }
}
