//! Vendor purchases and sales.
//!
//! All of these need an open session with a vendor, read through
//! [`WorldState::interacted_npc`](crate::world::WorldState::interacted_npc).

use ackloop_core::types::{BuyMode, EntityRef};

use super::{commands, ActionSession};
use crate::error::EngineError;
use crate::retry::{Attempt, Step};
use crate::timeout::TimeoutBudget;

impl ActionSession {
    /// Buy `item` from the vendor currently engaged.
    ///
    /// Confirmed when the player's item count rises or, for [`BuyMode::Fill`],
    /// when funds drop.
    pub async fn buy_item(&self, item: EntityRef, mode: BuyMode) -> Result<bool, EngineError> {
        self.purchase("buy_item", item, None, mode).await
    }

    /// Buy `item` into a carried container such as a tome.
    ///
    /// Without an explicit `container` the world is asked which one absorbs
    /// the item. Also confirmed when the container's quantity rises.
    pub async fn buy_into_container(
        &self,
        item: EntityRef,
        container: Option<EntityRef>,
        mode: BuyMode,
    ) -> Result<bool, EngineError> {
        let container = match container {
            Some(container) => Some(container),
            None => self.world.container_for(&item)?,
        };
        if let Some(container) = &container {
            if !container.capabilities().stackable {
                return Ok(self.refuse(
                    "buy_into_container",
                    container,
                    "container cannot hold a quantity",
                ));
            }
        }
        self.purchase("buy_into_container", item, container, mode)
            .await
    }

    async fn purchase(
        &self,
        action: &'static str,
        item: EntityRef,
        container: Option<EntityRef>,
        mode: BuyMode,
    ) -> Result<bool, EngineError> {
        let Some(npc) = self.world.interacted_npc()? else {
            return Ok(self.refuse(action, &item, "no vendor session"));
        };
        if !self.world.entity_exists(&item)? {
            return Ok(self.refuse(action, &item, "item not offered"));
        }

        let gold_before = self.world.gold()?;
        let cost = self.world.item_cost(&item)?;
        if gold_before < cost {
            tracing::info!(session = %self.id, %item, gold = gold_before, cost, "Insufficient funds");
            return Ok(false);
        }
        let count_before = self.world.inventory_count()?;
        let quantity_before = match &container {
            Some(container) => self.world.item(container)?.map_or(0, |c| c.quantity),
            None => 0,
        };

        let timing = &self.config.timing;
        let plan = self.plan(
            self.config.retry.buy_attempts,
            timing.poll_interval_ms,
            self.scaled(timing.shop_floor_ms)
                .with_padding(timing.shop_padding_ms),
        )?;

        let world = &self.world;
        let ops = self.ops();
        let attempt = Attempt::new(
            action,
            move || {
                Ok(if world.entity_exists(&item)? {
                    Step::Send(commands::npc_buy(ops, &npc, &item, mode))
                } else {
                    Step::Abort
                })
            },
            move || {
                if mode == BuyMode::Fill && world.gold()? < gold_before {
                    return Ok(true);
                }
                if world.inventory_count()? > count_before {
                    return Ok(true);
                }
                match &container {
                    Some(container) => {
                        let quantity = world.item(container)?.map_or(0, |c| c.quantity);
                        Ok(quantity > quantity_before)
                    }
                    None => Ok(false),
                }
            },
        );

        tracing::debug!(session = %self.id, %npc, %item, ?mode, cost, "Buying");
        let confirmed = self.retry.run(&plan, attempt).await?;
        Ok(self.outcome(action, &item, confirmed))
    }

    /// Sell a carried item to the vendor currently engaged.
    ///
    /// Confirmed when the player's item count drops. An item that vanishes
    /// between rounds is only observed, never re-sent.
    pub async fn sell_item(&self, item: EntityRef) -> Result<bool, EngineError> {
        const ACTION: &str = "sell_item";

        if !item.capabilities().sellable {
            return Ok(self.refuse(ACTION, &item, "subject cannot be sold"));
        }
        let Some(snapshot) = self.world.item(&item)? else {
            return Ok(self.refuse(ACTION, &item, "item not present"));
        };
        if !snapshot.sellable {
            return Ok(self.refuse(ACTION, &item, "item is not sellable"));
        }
        let Some(npc) = self.world.interacted_npc()? else {
            return Ok(self.refuse(ACTION, &item, "no vendor session"));
        };

        let count_before = self.world.inventory_count()?;
        let timing = &self.config.timing;
        let plan = self.plan(
            self.config.retry.sell_attempts,
            timing.poll_interval_ms,
            TimeoutBudget::fixed(timing.sell_window_ms),
        )?;

        let world = &self.world;
        let ops = self.ops();
        let attempt = Attempt::new(
            ACTION,
            move || {
                Ok(if world.item(&item)?.is_some() {
                    Step::Send(commands::npc_sell(ops, &npc, &item))
                } else {
                    Step::Skip
                })
            },
            move || Ok(world.inventory_count()? < count_before),
        );

        let confirmed = self.retry.run(&plan, attempt).await?;
        Ok(self.outcome(ACTION, &item, confirmed))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::session;
    use super::*;
    use crate::sim::{SimState, SimWorld};
    use ackloop_core::types::{ItemCategory, ItemLocation, ItemSnapshot};

    const NPC_BUY: u8 = 0x32;
    const NPC_SELL: u8 = 0x33;

    fn snapshot(id: u32, category: ItemCategory, location: ItemLocation) -> ItemSnapshot {
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

    /// A vendor session with one offered item at `cost`.
    fn vendor(world: &SimWorld, gold: u64, cost: u64) -> (EntityRef, EntityRef) {
        let npc = EntityRef::npc(20);
        let item = EntityRef::item(300);
        world.update(|s: &mut SimState| {
            s.entities.insert(npc, 2.0);
            s.interacted = Some(npc);
            s.gold = gold;
            s.inventory_count = 10;
            s.add_item(snapshot(300, ItemCategory::HealingPotion, ItemLocation::Vendor));
            s.costs.insert(item, cost);
        });
        (npc, item)
    }

    #[tokio::test(start_paused = true)]
    async fn test_buy_confirms_on_inventory_growth() {
        let (session, world, transport) = session();
        let (npc, item) = vendor(&world, 1000, 150);
        transport.on_send(|cmd, s| {
            if cmd.opcode() == NPC_BUY {
                s.gold -= 150;
                s.inventory_count += 1;
            }
            Vec::new()
        });

        assert!(session.buy_item(item, BuyMode::Single).await.unwrap());
        assert_eq!(transport.count(NPC_BUY), 1);
        assert_eq!(
            transport.commands()[0],
            commands::npc_buy(&Default::default(), &npc, &item, BuyMode::Single)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_fill_buy_confirms_on_gold_drop() {
        let (session, world, transport) = session();
        let (_npc, item) = vendor(&world, 1000, 150);
        transport.on_send(|cmd, s| {
            if cmd.opcode() == NPC_BUY {
                s.gold -= 450;
            }
            Vec::new()
        });

        assert!(session.buy_item(item, BuyMode::Fill).await.unwrap());
        assert_eq!(transport.count(NPC_BUY), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_buy_ignores_gold_drop() {
        let (session, world, transport) = session();
        let (_npc, item) = vendor(&world, 1000, 150);
        transport.on_send(|cmd, s| {
            if cmd.opcode() == NPC_BUY {
                s.gold -= 150;
            }
            Vec::new()
        });

        assert!(!session.buy_item(item, BuyMode::Single).await.unwrap());
        assert_eq!(transport.count(NPC_BUY), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_buy_without_funds_sends_nothing() {
        let (session, world, transport) = session();
        let (_npc, item) = vendor(&world, 100, 150);

        assert!(!session.buy_item(item, BuyMode::Single).await.unwrap());
        assert_eq!(transport.sent(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_buy_without_vendor_sends_nothing() {
        let (session, world, transport) = session();
        let (_npc, item) = vendor(&world, 1000, 150);
        world.update(|s| s.interacted = None);

        assert!(!session.buy_item(item, BuyMode::Single).await.unwrap());
        assert_eq!(transport.sent(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_buy_budget_scales_with_latency() {
        let (session, world, _transport) = session();
        let (_npc, item) = vendor(&world, 1000, 150);
        world.set_latency(Some(1500));

        let start = tokio::time::Instant::now();
        assert!(!session.buy_item(item, BuyMode::Single).await.unwrap());
        // three windows of max(2000, 1500 * 2 + 500)
        assert!(start.elapsed() >= std::time::Duration::from_millis(3 * 3500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_buy_into_container_confirms_on_quantity() {
        let (session, world, transport) = session();
        let (_npc, scroll) = vendor(&world, 1000, 20);
        let tome = EntityRef::item(77);
        world.update(|s| {
            let mut book = snapshot(77, ItemCategory::Tome, ItemLocation::Inventory);
            book.quantity = 4;
            s.add_item(book);
            s.containers.insert(scroll, tome);
        });
        transport.on_send(move |cmd, s| {
            if cmd.opcode() == NPC_BUY {
                if let Some(book) = s.item_mut(&tome) {
                    book.quantity += 1;
                }
            }
            Vec::new()
        });

        assert!(session
            .buy_into_container(scroll, None, BuyMode::Single)
            .await
            .unwrap());
        assert_eq!(transport.count(NPC_BUY), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_buy_into_non_stackable_container_sends_nothing() {
        let (session, world, transport) = session();
        let (_npc, scroll) = vendor(&world, 1000, 20);

        assert!(!session
            .buy_into_container(scroll, Some(EntityRef::npc(99)), BuyMode::Single)
            .await
            .unwrap());
        assert_eq!(transport.sent(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sell_confirms_on_inventory_drop() {
        let (session, world, transport) = session();
        let (_npc, _) = vendor(&world, 0, 0);
        let item = EntityRef::item(40);
        world.update(|s| s.add_item(snapshot(40, ItemCategory::Other, ItemLocation::Inventory)));
        transport.on_send(move |cmd, s| {
            if cmd.opcode() == NPC_SELL {
                s.items.remove(&item);
                s.inventory_count -= 1;
            }
            Vec::new()
        });

        assert!(session.sell_item(item).await.unwrap());
        assert_eq!(transport.count(NPC_SELL), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sell_unsellable_sends_nothing() {
        let (session, world, transport) = session();
        vendor(&world, 0, 0);
        let item = EntityRef::item(41);
        world.update(|s| {
            let mut quest = snapshot(41, ItemCategory::Other, ItemLocation::Inventory);
            quest.sellable = false;
            s.add_item(quest);
        });

        assert!(!session.sell_item(item).await.unwrap());
        assert_eq!(transport.sent(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sell_exhausts_attempts() {
        let (session, world, transport) = session();
        vendor(&world, 0, 0);
        let item = EntityRef::item(42);
        world.update(|s| s.add_item(snapshot(42, ItemCategory::Other, ItemLocation::Inventory)));

        assert!(!session.sell_item(item).await.unwrap());
        assert_eq!(transport.count(NPC_SELL), 5);
    }
}
