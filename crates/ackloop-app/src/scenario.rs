//! Scripted demo run: a vendor visit and some item housekeeping, executed
//! against the simulated world with an emulated remote side.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use uuid::Uuid;

use ackloop_core::config::{AckloopConfig, OpcodeTable};
use ackloop_core::types::{
    BuyMode, Command, CursorMode, EntityRef, Hand, InboundMessage, ItemCategory, ItemLocation,
    ItemSnapshot, Opcode, Point, SkillId, TradeMode, UiFlag,
};
use ackloop_engine::sim::{SimState, SimTransport, SimWorld};
use ackloop_engine::{ActionSession, EngineError, Navigator, SubscriptionRegistry, WorldResult};

/// Inbound opcode the emulated remote uses for item updates.
const ITEM_UPDATE: Opcode = 0x9c;
/// Inbound opcode the emulated remote uses for player position updates.
const PLAYER_MOVED: Opcode = 0x15;

const VENDOR: EntityRef = EntityRef::npc(20);
const SHOP_POTION: EntityRef = EntityRef::item(300);
const SHOP_SCROLL: EntityRef = EntityRef::item(301);
const JUNK: EntityRef = EntityRef::item(41);
const UNKNOWN_RING: EntityRef = EntityRef::item(42);
const SPARE_POTION: EntityRef = EntityRef::item(43);
const BELT_REJUV: EntityRef = EntityRef::item(44);
const TOME: EntityRef = EntityRef::item(50);

/// Knobs for the emulated remote side.
#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    pub latency_ms: Option<i64>,
    /// Sends of each opcode the remote ignores before reacting.
    pub drop_first: u32,
}

#[derive(Debug, Serialize)]
pub struct StepReport {
    pub name: &'static str,
    pub confirmed: bool,
    pub elapsed_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub session: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub steps: Vec<StepReport>,
    pub commands_sent: u64,
    pub notifications: usize,
    pub gold: u64,
}

impl RunReport {
    pub fn print_summary(&self) {
        println!("session {}", self.session);
        for step in &self.steps {
            let mark = if step.confirmed { "ok" } else { "FAILED" };
            println!("  {:<22} {:>6} ms  {}", step.name, step.elapsed_ms, mark);
        }
        println!(
            "{} commands sent, {} notifications received, {} gold left",
            self.commands_sent, self.notifications, self.gold
        );
    }
}

/// Moves the target next to the player after a short walk.
struct WalkingNavigator {
    world: Arc<SimWorld>,
}

#[async_trait]
impl Navigator for WalkingNavigator {
    async fn approach(&self, target: EntityRef, range: f64) -> WorldResult<bool> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        self.world.update(|s| {
            if let Some(distance) = s.entities.get_mut(&target) {
                *distance = (range - 1.0).max(0.0);
            }
        });
        Ok(true)
    }
}

fn carried(entity: EntityRef, category: ItemCategory, location: ItemLocation) -> ItemSnapshot {
    ItemSnapshot {
        entity,
        class_id: 0,
        category,
        location,
        sellable: true,
        identified: true,
        quantity: 0,
    }
}

fn initial_state(latency_ms: Option<i64>) -> SimState {
    let mut state = SimState {
        latency_ms,
        gold: 2000,
        inventory_count: 20,
        ..SimState::default()
    };
    state.entities.insert(VENDOR, 9.0);
    state.add_item(carried(SHOP_POTION, ItemCategory::HealingPotion, ItemLocation::Vendor));
    state.add_item(carried(SHOP_SCROLL, ItemCategory::Scroll, ItemLocation::Vendor));
    state.costs.insert(SHOP_POTION, 75);
    state.costs.insert(SHOP_SCROLL, 20);
    state.containers.insert(SHOP_SCROLL, TOME);

    let mut tome = carried(TOME, ItemCategory::Tome, ItemLocation::Inventory);
    tome.quantity = 5;
    state.add_item(tome);
    state.add_item(carried(JUNK, ItemCategory::Other, ItemLocation::Inventory));
    let mut ring = carried(UNKNOWN_RING, ItemCategory::Other, ItemLocation::Inventory);
    ring.identified = false;
    state.add_item(ring);
    state.add_item(carried(SPARE_POTION, ItemCategory::HealingPotion, ItemLocation::Inventory));
    state.add_item(carried(BELT_REJUV, ItemCategory::RejuvPotion, ItemLocation::Belt(3)));
    state
}

fn item_update(item: u32) -> InboundMessage {
    InboundMessage::new(ITEM_UPDATE, item.to_le_bytes().to_vec())
}

fn field(command: &Command, index: usize) -> u32 {
    command.fields().get(index).map_or(0, |f| f.value())
}

/// Emulated remote side: applies each command to the world the way the real
/// authority would, after ignoring the first `drop_first` sends per opcode.
fn remote(
    ops: OpcodeTable,
    drop_first: u32,
) -> impl Fn(&Command, &mut SimState) -> Vec<InboundMessage> + Send + Sync + 'static {
    let ignored: Mutex<HashMap<Opcode, u32>> = Mutex::new(HashMap::new());

    move |command: &Command, s: &mut SimState| {
        {
            let mut ignored = ignored.lock().unwrap_or_else(PoisonError::into_inner);
            let seen = ignored.entry(command.opcode()).or_insert(0);
            if *seen < drop_first {
                *seen += 1;
                return Vec::new();
            }
        }

        let op = command.opcode();
        if op == ops.interact_with_entity {
            s.set_flag(UiFlag::NpcMenu, true);
            s.interacted = Some(VENDOR);
        } else if op == ops.entity_action {
            s.set_flag(UiFlag::Shop, true);
            s.shop_items.insert(VENDOR, 30);
        } else if op == ops.npc_cancel {
            s.set_flag(UiFlag::NpcMenu, false);
            s.set_flag(UiFlag::Shop, false);
            s.interacted = None;
            s.dialog_active = false;
        } else if op == ops.npc_buy {
            let bought = EntityRef::item(field(command, 1));
            let cost = s.costs.get(&bought).copied().unwrap_or(0);
            s.gold = s.gold.saturating_sub(cost);
            match s.containers.get(&bought).copied() {
                Some(container) => {
                    if let Some(book) = s.item_mut(&container) {
                        book.quantity += 1;
                    }
                }
                None => s.inventory_count += 1,
            }
            return vec![item_update(bought.id)];
        } else if op == ops.npc_sell {
            let sold = EntityRef::item(field(command, 1));
            if s.items.remove(&sold).is_some() {
                s.entities.remove(&sold);
                s.inventory_count = s.inventory_count.saturating_sub(1);
                s.gold += 10;
                return vec![item_update(sold.id)];
            }
        } else if op == ops.identify_item {
            let target = EntityRef::item(field(command, 0));
            if s.cursor.mode == CursorMode::Identify {
                s.cursor.mode = CursorMode::Default;
                if let Some(item) = s.item_mut(&target) {
                    item.identified = true;
                }
                return vec![item_update(target.id)];
            }
            s.cursor.mode = CursorMode::Identify;
        } else if op == ops.pickup_buffer_item {
            let lifted = EntityRef::item(field(command, 0));
            if let Some(item) = s.item_mut(&lifted) {
                item.location = ItemLocation::Cursor;
            }
            if s.items.contains_key(&lifted) {
                s.cursor.item = Some(lifted);
            }
        } else if op == ops.item_to_belt {
            let belted = EntityRef::item(field(command, 0));
            let column = field(command, 1) as u8;
            if let Some(item) = s.item_mut(&belted) {
                item.location = ItemLocation::Belt(column);
            }
            if s.cursor.item == Some(belted) {
                s.cursor.item = None;
            }
        } else if op == ops.drop_item {
            if let Some(dropped) = s.cursor.item.take() {
                if let Some(item) = s.item_mut(&dropped) {
                    item.location = ItemLocation::Ground;
                }
                s.inventory_count = s.inventory_count.saturating_sub(1);
            }
        } else if op == ops.select_skill {
            let skill = SkillId(field(command, 0) as u16);
            let hand = if field(command, 2) == 0x80 {
                Hand::Left
            } else {
                Hand::Right
            };
            s.skills.insert(hand, skill);
        } else if op == ops.right_skill_on_location {
            return vec![InboundMessage::new(PLAYER_MOVED, Vec::new())];
        } else if op == ops.use_belt_item {
            let used = EntityRef::item(field(command, 0));
            s.items.remove(&used);
            s.entities.remove(&used);
        }
        Vec::new()
    }
}

struct Recorder {
    steps: Vec<StepReport>,
}

impl Recorder {
    fn record(&mut self, name: &'static str, started: Instant, confirmed: bool) {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(step = name, confirmed, elapsed_ms, "Step finished");
        self.steps.push(StepReport {
            name,
            confirmed,
            elapsed_ms,
        });
    }
}

/// Run the scripted session and report what happened.
pub async fn run(config: AckloopConfig, options: Options) -> Result<RunReport, EngineError> {
    let started_at = Utc::now();
    let world = Arc::new(SimWorld::with_state(initial_state(options.latency_ms)));

    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let transport = Arc::new(SimTransport::new(world.clone()).with_inbound(inbound_tx));
    transport.on_send(remote(config.opcodes.clone(), options.drop_first));

    let registry = Arc::new(SubscriptionRegistry::new(&config.notify));
    let notifications = Arc::new(AtomicUsize::new(0));
    {
        let notifications = notifications.clone();
        registry.subscribe([ITEM_UPDATE, PLAYER_MOVED], move |msg: &InboundMessage| {
            notifications.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(opcode = msg.opcode, bytes = msg.payload.len(), "Notification");
        });
    }
    let pump = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.run(inbound_rx).await })
    };

    let session = ActionSession::new(config, world.clone(), transport.clone()).with_navigator(
        Arc::new(WalkingNavigator {
            world: world.clone(),
        }),
    );
    tracing::info!(session = %session.id(), "Scripted run started");

    let mut recorder = Recorder { steps: Vec::new() };

    let t = Instant::now();
    let ok = session.start_trade(VENDOR, TradeMode::Trade).await?;
    recorder.record("start_trade", t, ok);

    let t = Instant::now();
    let ok = session.buy_item(SHOP_POTION, BuyMode::Single).await?;
    recorder.record("buy_item", t, ok);

    let t = Instant::now();
    let ok = session
        .buy_into_container(SHOP_SCROLL, None, BuyMode::Single)
        .await?;
    recorder.record("buy_into_container", t, ok);

    let t = Instant::now();
    let ok = session.sell_item(JUNK).await?;
    recorder.record("sell_item", t, ok);

    let t = Instant::now();
    let ok = session.cancel_npc(VENDOR)?;
    recorder.record("cancel_npc", t, ok);

    let t = Instant::now();
    let ok = session.identify_item(UNKNOWN_RING, Some(TOME)).await?;
    recorder.record("identify_item", t, ok);

    let t = Instant::now();
    let ok = session.place_in_belt(SPARE_POTION, 1).await?;
    recorder.record("place_in_belt", t, ok);

    let t = Instant::now();
    let ok = session.give_potion_to_merc(BELT_REJUV).await?;
    recorder.record("give_potion_to_merc", t, ok);

    let t = Instant::now();
    let ok = session.teleport(Point::new(5120, 4860)).await?;
    recorder.record("teleport", t, ok);

    let t = Instant::now();
    let ok = session.drop_item(UNKNOWN_RING).await?;
    recorder.record("drop_item", t, ok);

    session.refresh_quests();

    // let the last notifications drain before stopping the pump
    tokio::time::sleep(Duration::from_millis(50)).await;
    registry.shutdown();
    if let Err(e) = pump.await {
        tracing::warn!(error = %e, "Notification pump ended abnormally");
    }

    let gold = world.snapshot().gold;
    Ok(RunReport {
        session: session.id(),
        started_at,
        finished_at: Utc::now(),
        steps: recorder.steps,
        commands_sent: session.dispatcher().sent_count(),
        notifications: notifications.load(Ordering::Relaxed),
        gold,
    })
}
