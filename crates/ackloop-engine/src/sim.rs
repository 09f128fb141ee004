//! In-memory stand-ins for the remote world and the outbound transport.
//!
//! `SimWorld` is a mutable [`WorldState`]; `SimTransport` records every
//! command and can run a reaction that mutates the world, emulating the
//! remote side. Used by the test suites and the demo binary.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use ackloop_core::types::{
    Command, CursorState, EntityRef, Hand, InboundMessage, ItemSnapshot, Opcode, SkillId, UiFlag,
};

use crate::dispatcher::Transport;
use crate::error::{TransportError, WorldError};
use crate::world::{WorldResult, WorldState};

/// Everything the simulated world knows. Fields are public so scenarios can
/// set up and mutate state directly.
#[derive(Debug, Clone)]
pub struct SimState {
    pub latency_ms: Option<i64>,
    pub player: EntityRef,
    /// Live entities and their distance from the player.
    pub entities: HashMap<EntityRef, f64>,
    pub flags: HashSet<UiFlag>,
    pub interacted: Option<EntityRef>,
    pub dialog_active: bool,
    pub shop_items: HashMap<EntityRef, u32>,
    pub gold: u64,
    pub inventory_count: u32,
    pub items: HashMap<EntityRef, ItemSnapshot>,
    pub costs: HashMap<EntityRef, u64>,
    pub containers: HashMap<EntityRef, EntityRef>,
    pub cursor: CursorState,
    pub skills: HashMap<Hand, SkillId>,
    /// When set, every read fails with this error.
    pub fault: Option<WorldError>,
}

impl Default for SimState {
    fn default() -> Self {
        let player = EntityRef::player(1);
        let mut entities = HashMap::new();
        entities.insert(player, 0.0);
        Self {
            latency_ms: Some(50),
            player,
            entities,
            flags: HashSet::new(),
            interacted: None,
            dialog_active: false,
            shop_items: HashMap::new(),
            gold: 0,
            inventory_count: 0,
            items: HashMap::new(),
            costs: HashMap::new(),
            containers: HashMap::new(),
            cursor: CursorState::default(),
            skills: HashMap::new(),
            fault: None,
        }
    }
}

impl SimState {
    /// Add an item, registering it as a live entity next to the player.
    pub fn add_item(&mut self, item: ItemSnapshot) {
        self.entities.insert(item.entity, 0.0);
        self.items.insert(item.entity, item);
    }

    pub fn item_mut(&mut self, item: &EntityRef) -> Option<&mut ItemSnapshot> {
        self.items.get_mut(item)
    }

    pub fn set_flag(&mut self, flag: UiFlag, on: bool) {
        if on {
            self.flags.insert(flag);
        } else {
            self.flags.remove(&flag);
        }
    }
}

/// Thread-safe simulated world.
#[derive(Debug, Default)]
pub struct SimWorld {
    state: Mutex<SimState>,
}

impl SimWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: SimState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// Mutate the state under the lock.
    pub fn update<R>(&self, f: impl FnOnce(&mut SimState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    pub fn snapshot(&self) -> SimState {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_latency(&self, latency_ms: Option<i64>) {
        self.update(|s| s.latency_ms = latency_ms);
    }

    fn read<R>(&self, f: impl FnOnce(&SimState) -> R) -> WorldResult<R> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match &state.fault {
            Some(fault) => Err(fault.clone()),
            None => Ok(f(&state)),
        }
    }
}

impl WorldState for SimWorld {
    fn latency_ms(&self) -> Option<i64> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .latency_ms
    }

    fn player(&self) -> WorldResult<EntityRef> {
        self.read(|s| s.player)
    }

    fn entity_exists(&self, entity: &EntityRef) -> WorldResult<bool> {
        self.read(|s| s.entities.contains_key(entity))
    }

    fn distance_to(&self, entity: &EntityRef) -> WorldResult<Option<f64>> {
        self.read(|s| s.entities.get(entity).copied())
    }

    fn ui_flag(&self, flag: UiFlag) -> WorldResult<bool> {
        self.read(|s| s.flags.contains(&flag))
    }

    fn interacted_npc(&self) -> WorldResult<Option<EntityRef>> {
        self.read(|s| s.interacted)
    }

    fn dialog_active(&self) -> WorldResult<bool> {
        self.read(|s| s.dialog_active)
    }

    fn shop_item_count(&self, npc: &EntityRef) -> WorldResult<u32> {
        self.read(|s| s.shop_items.get(npc).copied().unwrap_or(0))
    }

    fn gold(&self) -> WorldResult<u64> {
        self.read(|s| s.gold)
    }

    fn inventory_count(&self) -> WorldResult<u32> {
        self.read(|s| s.inventory_count)
    }

    fn item(&self, item: &EntityRef) -> WorldResult<Option<ItemSnapshot>> {
        self.read(|s| s.items.get(item).cloned())
    }

    fn item_cost(&self, item: &EntityRef) -> WorldResult<u64> {
        self.read(|s| s.costs.get(item).copied().unwrap_or(0))
    }

    fn container_for(&self, item: &EntityRef) -> WorldResult<Option<EntityRef>> {
        self.read(|s| s.containers.get(item).copied())
    }

    fn cursor(&self) -> WorldResult<CursorState> {
        self.read(|s| s.cursor)
    }

    fn selected_skill(&self, hand: Hand) -> WorldResult<Option<SkillId>> {
        self.read(|s| s.skills.get(&hand).copied())
    }
}

/// Emulated remote behaviour: applied to the world on every send, may emit
/// inbound messages.
pub type Reaction = Box<dyn Fn(&Command, &mut SimState) -> Vec<InboundMessage> + Send + Sync>;

/// Transport that records commands and emulates the remote side.
pub struct SimTransport {
    world: Arc<SimWorld>,
    log: Mutex<Vec<Command>>,
    reaction: Mutex<Option<Reaction>>,
    inbound: Option<mpsc::UnboundedSender<InboundMessage>>,
}

impl std::fmt::Debug for SimTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimTransport")
            .field("sent", &self.sent())
            .field("has_inbound", &self.inbound.is_some())
            .finish()
    }
}

impl SimTransport {
    pub fn new(world: Arc<SimWorld>) -> Self {
        Self {
            world,
            log: Mutex::new(Vec::new()),
            reaction: Mutex::new(None),
            inbound: None,
        }
    }

    /// Forward inbound messages produced by reactions to `tx`.
    pub fn with_inbound(mut self, tx: mpsc::UnboundedSender<InboundMessage>) -> Self {
        self.inbound = Some(tx);
        self
    }

    /// Install the reaction run on every send, replacing any previous one.
    pub fn on_send<F>(&self, reaction: F)
    where
        F: Fn(&Command, &mut SimState) -> Vec<InboundMessage> + Send + Sync + 'static,
    {
        *self.reaction.lock().unwrap_or_else(PoisonError::into_inner) = Some(Box::new(reaction));
    }

    pub fn commands(&self) -> Vec<Command> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn sent(&self) -> usize {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Number of recorded commands with the given opcode.
    pub fn count(&self, opcode: Opcode) -> usize {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| c.opcode() == opcode)
            .count()
    }
}

impl Transport for SimTransport {
    fn send(&self, command: &Command) -> Result<(), TransportError> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command.clone());

        let emitted = {
            let reaction = self.reaction.lock().unwrap_or_else(PoisonError::into_inner);
            match reaction.as_ref() {
                Some(react) => self.world.update(|state| react(command, state)),
                None => Vec::new(),
            }
        };

        if let Some(tx) = &self.inbound {
            for message in emitted {
                tx.send(message).map_err(|_| TransportError::Closed)?;
            }
        }
        Ok(())
    }
}
