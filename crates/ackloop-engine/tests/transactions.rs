//! End-to-end transaction scenarios against the simulated world.
//!
//! Each test builds its own world, transport and session, scripts the remote
//! side through a send reaction, and checks both the outcome and exactly what
//! went over the wire. Time is paused so multi-second budgets run instantly.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use ackloop_core::config::AckloopConfig;
use ackloop_core::types::{
    BuyMode, CursorMode, EntityRef, InboundMessage, ItemCategory, ItemLocation, ItemSnapshot,
    TradeMode, UiFlag,
};
use ackloop_engine::sim::{SimTransport, SimWorld};
use ackloop_engine::{
    compute_budget, ActionSession, CancelHandle, EngineError, SubscriptionRegistry, WorldState,
};

// =============================================================================
// Helpers
// =============================================================================

const NPC_BUY: u8 = 0x32;
const NPC_SELL: u8 = 0x33;
const IDENTIFY: u8 = 0x27;
const DROP_ITEM: u8 = 0x17;
const INTERACT: u8 = 0x13;
const ENTITY_ACTION: u8 = 0x38;

struct Harness {
    world: Arc<SimWorld>,
    transport: Arc<SimTransport>,
    session: ActionSession,
}

fn harness() -> Harness {
    let world = Arc::new(SimWorld::new());
    let transport = Arc::new(SimTransport::new(world.clone()));
    let session = ActionSession::new(AckloopConfig::default(), world.clone(), transport.clone());
    Harness {
        world,
        transport,
        session,
    }
}

fn item(id: u32, category: ItemCategory, location: ItemLocation) -> ItemSnapshot {
    ItemSnapshot {
        entity: EntityRef::item(id),
        class_id: 0,
        category,
        location,
        sellable: true,
        identified: true,
        quantity: 0,
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_buy_with_insufficient_funds_sends_nothing() {
    let h = harness();
    let npc = EntityRef::npc(20);
    let offered = EntityRef::item(300);
    h.world.update(|s| {
        s.entities.insert(npc, 1.0);
        s.interacted = Some(npc);
        s.gold = 100;
        s.add_item(item(300, ItemCategory::Other, ItemLocation::Vendor));
        s.costs.insert(offered, 150);
    });

    let start = Instant::now();
    assert!(!h.session.buy_item(offered, BuyMode::Single).await.unwrap());
    assert_eq!(h.transport.sent(), 0);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_identify_arms_on_second_send_and_applies_on_first() {
    let h = harness();
    let target = EntityRef::item(1);
    let tome = EntityRef::item(2);
    h.world.update(|s| {
        let mut unknown = item(1, ItemCategory::Other, ItemLocation::Inventory);
        unknown.identified = false;
        s.add_item(unknown);
        s.add_item(item(2, ItemCategory::Tome, ItemLocation::Inventory));
    });

    let sends = Arc::new(AtomicU32::new(0));
    let counter = sends.clone();
    h.transport.on_send(move |cmd, s| {
        if cmd.opcode() == IDENTIFY {
            match counter.fetch_add(1, Ordering::SeqCst) {
                0 => {}
                1 => s.cursor.mode = CursorMode::Identify,
                _ => {
                    s.cursor.mode = CursorMode::Default;
                    if let Some(snapshot) = s.item_mut(&target) {
                        snapshot.identified = true;
                    }
                }
            }
        }
        Vec::new()
    });

    assert!(h.session.identify_item(target, Some(tome)).await.unwrap());
    // two arming sends, one applying send
    assert_eq!(sends.load(Ordering::SeqCst), 3);
    assert_eq!(h.transport.count(IDENTIFY), 3);
}

#[tokio::test(start_paused = true)]
async fn test_drop_gives_up_after_fifteen_attempts() {
    let h = harness();
    let held = EntityRef::item(5);
    h.world.update(|s| {
        s.add_item(item(5, ItemCategory::Other, ItemLocation::Cursor));
        s.cursor.item = Some(held);
    });

    assert!(!h.session.drop_item(held).await.unwrap());
    assert_eq!(h.transport.count(DROP_ITEM), 15);
    assert_eq!(h.world.cursor().unwrap().item, Some(held));
}

#[tokio::test(start_paused = true)]
async fn test_unsellable_item_sends_nothing() {
    let h = harness();
    let npc = EntityRef::npc(20);
    let quest = EntityRef::item(9);
    h.world.update(|s| {
        s.entities.insert(npc, 1.0);
        s.interacted = Some(npc);
        let mut snapshot = item(9, ItemCategory::Other, ItemLocation::Inventory);
        snapshot.sellable = false;
        s.add_item(snapshot);
    });

    assert!(!h.session.sell_item(quest).await.unwrap());
    assert_eq!(h.transport.count(NPC_SELL), 0);
    assert_eq!(h.transport.sent(), 0);
}

#[test]
fn test_budget_floor_dominates_low_latency() {
    assert_eq!(compute_budget(300, 2000, 2), 2000);
}

#[tokio::test(start_paused = true)]
async fn test_full_vendor_round_trip() {
    let h = harness();
    let npc = EntityRef::npc(20);
    let offered = EntityRef::item(300);
    let junk = EntityRef::item(41);
    h.world.update(|s| {
        s.entities.insert(npc, 3.0);
        s.gold = 5000;
        s.inventory_count = 10;
        s.add_item(item(300, ItemCategory::HealingPotion, ItemLocation::Vendor));
        s.costs.insert(offered, 75);
        s.add_item(item(41, ItemCategory::Other, ItemLocation::Inventory));
    });
    h.transport.on_send(move |cmd, s| {
        match cmd.opcode() {
            INTERACT => {
                s.set_flag(UiFlag::NpcMenu, true);
                s.interacted = Some(npc);
            }
            ENTITY_ACTION => {
                s.set_flag(UiFlag::Shop, true);
                s.shop_items.insert(npc, 30);
            }
            NPC_BUY => {
                s.gold -= 75;
                s.inventory_count += 1;
            }
            NPC_SELL => {
                s.items.remove(&junk);
                s.inventory_count -= 1;
                s.gold += 10;
            }
            _ => {}
        }
        Vec::new()
    });

    assert!(h.session.start_trade(npc, TradeMode::Trade).await.unwrap());
    assert!(h.session.buy_item(offered, BuyMode::Single).await.unwrap());
    assert!(h.session.sell_item(junk).await.unwrap());

    let state = h.world.snapshot();
    assert_eq!(state.gold, 5000 - 75 + 10);
    assert_eq!(state.inventory_count, 10);
    assert_eq!(h.transport.sent(), 4);
    assert_eq!(h.session.dispatcher().sent_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_interrupts_a_long_wait() {
    let world = Arc::new(SimWorld::new());
    let transport = Arc::new(SimTransport::new(world.clone()));
    let handle = CancelHandle::new();
    let session = ActionSession::new(AckloopConfig::default(), world.clone(), transport.clone())
        .with_cancel(handle.signal());
    let npc = EntityRef::npc(12);
    world.update(|s| {
        s.entities.insert(npc, 1.0);
    });

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1200)).await;
        handle.cancel();
    });

    let start = Instant::now();
    let err = session.open_menu(npc).await.unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));
    assert!(start.elapsed() < Duration::from_millis(1300));
    assert_eq!(transport.count(INTERACT), 1);
}

#[tokio::test]
async fn test_inbound_notifications_reach_subscribers() {
    let world = Arc::new(SimWorld::new());
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let transport = Arc::new(SimTransport::new(world.clone()).with_inbound(inbound_tx));
    transport.on_send(|cmd, _| {
        if cmd.opcode() == INTERACT {
            vec![InboundMessage::new(0x27, vec![1, 2, 3])]
        } else {
            Vec::new()
        }
    });

    let registry = Arc::new(SubscriptionRegistry::with_capacity(8));
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    registry.subscribe(IDENTIFY, move |msg: &InboundMessage| {
        let _ = seen_tx.send(msg.payload.clone());
    });
    let pump = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.run(inbound_rx).await })
    };

    let session = ActionSession::new(AckloopConfig::default(), world.clone(), transport.clone());
    let npc = EntityRef::npc(3);
    world.update(|s| {
        s.entities.insert(npc, 1.0);
    });
    assert!(session.entity_interact(npc).unwrap());

    let payload = tokio::time::timeout(Duration::from_secs(1), seen_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payload, vec![1, 2, 3]);

    registry.shutdown();
    pump.await.unwrap();
}
