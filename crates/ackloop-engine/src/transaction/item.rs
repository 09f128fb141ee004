//! Cursor, identify, belt and mercenary item handling.

use std::time::Duration;

use ackloop_core::types::{CursorMode, EntityRef, ItemLocation};

use super::{commands, ActionSession};
use crate::error::EngineError;
use crate::retry::{Attempt, AttemptPlan, Step};
use crate::timeout::TimeoutBudget;

/// Pause after a confirmed identify before the item is touched again.
const IDENTIFY_SETTLE: Duration = Duration::from_millis(50);

impl ActionSession {
    /// Identify `item` with an identify `tool` (a scroll or tome).
    ///
    /// Two phases, each with its own attempts: first until the cursor enters
    /// identify mode, then until the item reports identified. The second
    /// phase only re-sends while the cursor is still in identify mode and the
    /// tool is still carried. Either phase stops if the item vanishes.
    pub async fn identify_item(
        &self,
        item: EntityRef,
        tool: Option<EntityRef>,
    ) -> Result<bool, EngineError> {
        const ACTION: &str = "identify_item";

        let Some(tool) = tool else {
            return Ok(self.refuse(ACTION, &item, "no identify tool given"));
        };
        let Some(snapshot) = self.world.item(&item)? else {
            return Ok(self.refuse(ACTION, &item, "item not present"));
        };
        if snapshot.identified {
            return Ok(self.refuse(ACTION, &item, "item already identified"));
        }
        if self.world.item(&tool)?.is_none() {
            return Ok(self.refuse(ACTION, &item, "identify tool not present"));
        }

        let timing = &self.config.timing;
        let plan = self.plan(
            self.config.retry.identify_attempts,
            timing.poll_interval_ms,
            TimeoutBudget::fixed(timing.identify_window_ms),
        )?;
        let world = &self.world;
        let command = commands::identify(self.ops(), &item, &tool);

        let arm = {
            let command = command.clone();
            Attempt::new(
                "identify_arm",
                move || {
                    if world.item(&item)?.is_none() || world.item(&tool)?.is_none() {
                        return Ok(Step::Abort);
                    }
                    Ok(Step::Send(command.clone()))
                },
                move || Ok(world.cursor()?.mode == CursorMode::Identify),
            )
        };
        if !self.retry.run(&plan, arm).await? {
            return Ok(self.outcome(ACTION, &item, false));
        }

        let apply = Attempt::new(
            "identify_apply",
            move || {
                if world.item(&item)?.is_none() {
                    return Ok(Step::Abort);
                }
                // a consumed scroll is observed, not re-sent
                let armed = world.cursor()?.mode == CursorMode::Identify;
                Ok(if armed && world.item(&tool)?.is_some() {
                    Step::Send(command.clone())
                } else {
                    Step::Skip
                })
            },
            move || Ok(world.item(&item)?.is_some_and(|i| i.identified)),
        );
        let confirmed = self.retry.run(&plan, apply).await?;
        if confirmed {
            self.retry.poller().sleep(IDENTIFY_SETTLE).await?;
        }
        Ok(self.outcome(ACTION, &item, confirmed))
    }

    /// Lift `item` onto the cursor.
    ///
    /// Succeeds at once if it is already there. Any other item on the cursor
    /// is dropped first; if that fails nothing is sent for `item`.
    pub async fn item_to_cursor(&self, item: EntityRef) -> Result<bool, EngineError> {
        const ACTION: &str = "item_to_cursor";

        match self.world.cursor()?.item {
            Some(held) if held == item => return Ok(true),
            Some(held) => {
                tracing::debug!(session = %self.id, %held, "Clearing cursor first");
                if !self.release_cursor(held).await? {
                    return Ok(self.refuse(ACTION, &item, "cursor holds another item"));
                }
            }
            None => {}
        }
        if self.world.item(&item)?.is_none() {
            return Ok(self.refuse(ACTION, &item, "item not present"));
        }

        let plan = self.cursor_plan()?;
        let world = &self.world;
        let ops = self.ops();
        let attempt = Attempt::new(
            ACTION,
            move || {
                Ok(match world.item(&item)? {
                    None => Step::Abort,
                    Some(snapshot) => match snapshot.equipped_slot() {
                        Some(slot) if item.capabilities().equippable => {
                            Step::Send(commands::pickup_body(ops, slot))
                        }
                        _ => Step::Send(commands::pickup_buffer(ops, &item)),
                    },
                })
            },
            move || Ok(world.cursor()?.item == Some(item)),
        );

        let confirmed = self.retry.run(&plan, attempt).await?;
        Ok(self.outcome(ACTION, &item, confirmed))
    }

    /// Drop `item` on the ground, lifting it onto the cursor first.
    pub async fn drop_item(&self, item: EntityRef) -> Result<bool, EngineError> {
        if !self.item_to_cursor(item).await? {
            return Ok(self.outcome("drop_item", &item, false));
        }
        let confirmed = self.release_cursor(item).await?;
        Ok(self.outcome("drop_item", &item, confirmed))
    }

    /// Send drops for the item on the cursor until the cursor is empty.
    ///
    /// Stops without sending once the cursor holds something else or the
    /// item is gone from the world.
    async fn release_cursor(&self, item: EntityRef) -> Result<bool, EngineError> {
        let plan = self.cursor_plan()?;
        let world = &self.world;
        let ops = self.ops();
        let attempt = Attempt::new(
            "release_cursor",
            move || {
                Ok(match world.cursor()?.item {
                    None => Step::Skip,
                    Some(held) if held != item => Step::Abort,
                    Some(_) => match world.item(&item)? {
                        Some(_) => Step::Send(commands::drop_item(ops, &item)),
                        None => Step::Abort,
                    },
                })
            },
            move || Ok(world.cursor()?.item.is_none()),
        );
        self.retry.run(&plan, attempt).await
    }

    fn cursor_plan(&self) -> Result<AttemptPlan, EngineError> {
        let timing = &self.config.timing;
        self.plan(
            self.config.retry.cursor_attempts,
            timing.poll_interval_ms,
            self.scaled(timing.cursor_floor_ms)
                .with_padding(timing.cursor_padding_ms),
        )
    }

    /// Move `item` into belt `column` by way of the cursor.
    ///
    /// The belt command is sent once and then observed for a short window.
    pub async fn place_in_belt(&self, item: EntityRef, column: u8) -> Result<bool, EngineError> {
        const ACTION: &str = "place_in_belt";

        if !self.item_to_cursor(item).await? {
            return Ok(self.outcome(ACTION, &item, false));
        }

        let timing = &self.config.timing;
        let plan = self.plan(
            1,
            timing.belt_poll_ms,
            TimeoutBudget::fixed(timing.belt_window_ms),
        )?;
        let world = &self.world;
        let ops = self.ops();
        let attempt = Attempt::new(
            ACTION,
            move || {
                Ok(match world.item(&item)? {
                    Some(_) => Step::Send(commands::item_to_belt(ops, &item, column)),
                    None => Step::Abort,
                })
            },
            move || Ok(world.item(&item)?.is_some_and(|i| i.is_in_belt())),
        );

        let confirmed = self.retry.run(&plan, attempt).await?;
        Ok(self.outcome(ACTION, &item, confirmed))
    }

    /// Click an item once, without confirmation.
    pub fn click_item(&self, item: EntityRef, to_cursor: bool) -> Result<bool, EngineError> {
        if !self.world.entity_exists(&item)? {
            return Ok(self.refuse("click_item", &item, "item not present"));
        }
        self.dispatcher()
            .send(&commands::pickup_item(self.ops(), &item, to_cursor));
        Ok(true)
    }

    /// Feed a potion to the mercenary.
    ///
    /// Belt potions are used directly; inventory potions go through the
    /// cursor first. The hand-off itself is not confirmed.
    pub async fn give_potion_to_merc(&self, item: EntityRef) -> Result<bool, EngineError> {
        const ACTION: &str = "give_potion_to_merc";

        let Some(snapshot) = self.world.item(&item)? else {
            return Ok(self.refuse(ACTION, &item, "item not present"));
        };
        if !snapshot.category.is_merc_potion() {
            return Ok(self.refuse(ACTION, &item, "not a mercenary potion"));
        }

        match snapshot.location {
            ItemLocation::Belt(_) => {
                self.dispatcher()
                    .send(&commands::use_belt_item_on_merc(self.ops(), &item));
                Ok(true)
            }
            ItemLocation::Inventory => {
                if !self.item_to_cursor(item).await? {
                    return Ok(self.outcome(ACTION, &item, false));
                }
                self.dispatcher().send(&commands::merc_item(self.ops()));
                Ok(true)
            }
            _ => Ok(self.refuse(ACTION, &item, "potion is neither belted nor carried")),
        }
    }
}
